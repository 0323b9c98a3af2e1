//! A scripted [`LocationPlatform`].
//!
//! Holds whatever the script says the OS currently reports (authorization,
//! foreground/background, the clock) and writes every request the engine
//! makes to the event sink.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::debug;

use locwatch_core::platform::DEFAULT_MAX_MONITORED_REGIONS;
use locwatch_core::{
    Activation, AuthorizationStatus, LocationPlatform, MonitoredRegion, MonitoringMode,
    UpdateSettings,
};

use crate::output::{EventSink, OutputRecord, PlatformCall};

/// Capabilities of the simulated device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformOptions {
    /// Status reported at startup.
    pub authorization: AuthorizationStatus,
    /// Answer starts with [`Activation::Deferred`]; the script confirms them.
    pub deferred_activation: bool,
    /// Whether significant-change monitoring exists.
    pub significant_change_available: bool,
    /// Maximum number of monitored regions.
    pub max_monitored_regions: usize,
}

impl Default for PlatformOptions {
    fn default() -> Self {
        Self {
            authorization: AuthorizationStatus::NotDetermined,
            deferred_activation: false,
            significant_change_available: true,
            max_monitored_regions: DEFAULT_MAX_MONITORED_REGIONS,
        }
    }
}

#[derive(Debug)]
struct DeviceState {
    authorization: AuthorizationStatus,
    in_background: bool,
    clock: Option<DateTime<Utc>>,
}

/// Platform whose state is set by script steps.
pub struct ScriptedPlatform {
    options: PlatformOptions,
    device: Mutex<DeviceState>,
    sink: EventSink,
}

impl ScriptedPlatform {
    /// Create a platform writing its requests to `sink`.
    #[must_use]
    pub fn new(options: PlatformOptions, sink: EventSink) -> Self {
        Self {
            device: Mutex::new(DeviceState {
                authorization: options.authorization,
                in_background: false,
                clock: None,
            }),
            options,
            sink,
        }
    }

    /// Change the status the OS reports.
    pub fn set_authorization(&self, status: AuthorizationStatus) {
        self.device.lock().authorization = status;
    }

    /// Move the simulated app to or from the background.
    pub fn set_background(&self, in_background: bool) {
        self.device.lock().in_background = in_background;
    }

    /// Pin the clock. Until called, the wall clock is used.
    pub fn set_clock(&self, at: DateTime<Utc>) {
        self.device.lock().clock = Some(at);
    }

    fn record(&self, call: PlatformCall) {
        debug!(call = ?call, "Platform request");
        self.sink.emit(&OutputRecord::Platform { call });
    }
}

impl LocationPlatform for ScriptedPlatform {
    fn authorization_status(&self) -> AuthorizationStatus {
        self.device.lock().authorization
    }

    fn request_authorization(&self, always: bool) {
        self.record(PlatformCall::RequestAuthorization { always });
    }

    fn significant_change_monitoring_available(&self) -> bool {
        self.options.significant_change_available
    }

    fn max_monitored_regions(&self) -> usize {
        self.options.max_monitored_regions
    }

    fn start_updates(
        &self,
        mode: MonitoringMode,
        _settings: &UpdateSettings,
        generation: u64,
    ) -> Activation {
        self.record(PlatformCall::StartUpdates { mode, generation });
        if self.options.deferred_activation {
            Activation::Deferred
        } else {
            Activation::Immediate
        }
    }

    fn stop_updates(&self, mode: MonitoringMode) {
        self.record(PlatformCall::StopUpdates { mode });
    }

    fn start_monitoring_region(&self, region: &MonitoredRegion) {
        self.record(PlatformCall::StartRegion {
            identifier: region.identifier.clone(),
            radius: region.radius,
        });
    }

    fn stop_monitoring_region(&self, identifier: &str) {
        self.record(PlatformCall::StopRegion {
            identifier: identifier.to_string(),
        });
    }

    fn is_in_background(&self) -> bool {
        self.device.lock().in_background
    }

    fn now(&self) -> DateTime<Utc> {
        self.device.lock().clock.unwrap_or_else(Utc::now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::read_records;

    #[test]
    fn test_clock_and_background_follow_script() {
        let (sink, _) = EventSink::memory();
        let platform = ScriptedPlatform::new(PlatformOptions::default(), sink);
        let at: DateTime<Utc> = "2025-03-01T12:00:00Z".parse().unwrap();

        platform.set_clock(at);
        platform.set_background(true);
        platform.set_authorization(AuthorizationStatus::AuthorizedAlways);

        assert_eq!(platform.now(), at);
        assert!(platform.is_in_background());
        assert_eq!(
            platform.authorization_status(),
            AuthorizationStatus::AuthorizedAlways
        );
    }

    #[test]
    fn test_requests_are_recorded() {
        let (sink, buffer) = EventSink::memory();
        let options = PlatformOptions {
            deferred_activation: true,
            ..PlatformOptions::default()
        };
        let platform = ScriptedPlatform::new(options, sink);
        let settings = locwatch_core::MonitorConfig::default().update_settings();

        let activation = platform.start_updates(MonitoringMode::Visits, &settings, 4);
        assert_eq!(activation, Activation::Deferred);
        platform.stop_monitoring_region("home");

        let records = read_records(&buffer).unwrap();
        assert_eq!(
            records,
            vec![
                OutputRecord::Platform {
                    call: PlatformCall::StartUpdates {
                        mode: MonitoringMode::Visits,
                        generation: 4,
                    }
                },
                OutputRecord::Platform {
                    call: PlatformCall::StopRegion {
                        identifier: "home".into()
                    }
                },
            ]
        );
    }
}
