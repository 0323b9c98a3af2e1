//! The platform capability surface consumed by the engine.
//!
//! The engine never talks to an OS location service directly. Whatever hosts
//! it (a mobile bridge, a simulator, a test) implements [`LocationPlatform`]
//! and feeds the engine raw callbacks built from the input types in this
//! module: [`RawFix`], [`RawVisit`] and [`RegionTransition`].
//!
//! Platform methods are invoked while the engine holds its state lock. An
//! implementation must issue its request and return; it must not call back
//! into the engine from inside these methods. Callbacks arrive later through
//! the engine's `handle_*` methods, from any thread.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{ActivityType, DesiredAccuracy};
use crate::geo::Coordinate;
use crate::region::MonitoredRegion;
use crate::types::{AuthorizationStatus, MonitoringMode};

/// Default platform limit on concurrently monitored regions.
pub const DEFAULT_MAX_MONITORED_REGIONS: usize = 20;

/// Default upper bound on a region radius, in meters.
pub const DEFAULT_MAX_REGION_RADIUS_METERS: f64 = 100_000.0;

/// How the platform acknowledged a start request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    /// Updates are flowing as soon as the call returns.
    Immediate,
    /// The platform will confirm later through `confirm_monitoring`.
    Deferred,
}

/// Settings the engine passes along with a start request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateSettings {
    /// Minimum movement between continuous updates, in meters. Zero disables
    /// the filter.
    pub distance_filter: f64,
    /// Requested accuracy.
    pub desired_accuracy: DesiredAccuracy,
    /// Activity hint for power management.
    pub activity_type: ActivityType,
}

/// Location capabilities provided by the host OS.
pub trait LocationPlatform: Send + Sync {
    /// Authorization status as the OS currently reports it.
    fn authorization_status(&self) -> AuthorizationStatus;

    /// Ask the user for authorization. The answer arrives later through
    /// `handle_authorization_change`.
    fn request_authorization(&self, always: bool);

    /// Whether the device-wide location switch is on.
    fn location_services_enabled(&self) -> bool {
        true
    }

    /// Whether significant-change monitoring exists on this device.
    fn significant_change_monitoring_available(&self) -> bool;

    /// Whether circular region monitoring exists on this device.
    fn region_monitoring_available(&self) -> bool {
        true
    }

    /// Whether visit monitoring refuses to run without "always" authorization.
    fn visits_require_always_authorization(&self) -> bool {
        false
    }

    /// Maximum number of regions monitored at once.
    fn max_monitored_regions(&self) -> usize {
        DEFAULT_MAX_MONITORED_REGIONS
    }

    /// Largest radius the platform accepts for a region, in meters.
    fn max_region_radius(&self) -> f64 {
        DEFAULT_MAX_REGION_RADIUS_METERS
    }

    /// Start updates for one of the explicit modes.
    ///
    /// A platform that answers [`Activation::Deferred`] confirms later by
    /// passing `generation` back to `confirm_monitoring`.
    fn start_updates(
        &self,
        mode: MonitoringMode,
        settings: &UpdateSettings,
        generation: u64,
    ) -> Activation;

    /// Stop updates for one of the explicit modes.
    fn stop_updates(&self, mode: MonitoringMode);

    /// Begin monitoring a circular region.
    fn start_monitoring_region(&self, region: &MonitoredRegion);

    /// Stop monitoring the region with this identifier.
    fn stop_monitoring_region(&self, identifier: &str);

    /// Whether the host application is currently in the background.
    fn is_in_background(&self) -> bool {
        false
    }

    /// Current time, used to age fixes.
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A raw position fix as delivered by the platform.
///
/// Negative accuracy, speed and course values mean the platform could not
/// determine them, matching how mobile location APIs report invalid readings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawFix {
    /// Position of the fix.
    pub coordinate: Coordinate,
    /// Horizontal accuracy radius in meters; negative marks an invalid fix.
    #[serde(default)]
    pub horizontal_accuracy: f64,
    /// Altitude in meters.
    #[serde(default)]
    pub altitude: f64,
    /// Vertical accuracy in meters; negative means altitude is invalid.
    #[serde(default = "invalid_reading")]
    pub vertical_accuracy: f64,
    /// Speed in meters per second; negative if unknown.
    #[serde(default = "invalid_reading")]
    pub speed: f64,
    /// Course in degrees from true north; negative if unknown.
    #[serde(default = "invalid_reading")]
    pub course: f64,
    /// When the fix was taken.
    pub timestamp: DateTime<Utc>,
}

fn invalid_reading() -> f64 {
    -1.0
}

impl RawFix {
    /// A fix with only a position and timestamp known.
    #[must_use]
    pub fn new(coordinate: Coordinate, timestamp: DateTime<Utc>) -> Self {
        Self {
            coordinate,
            horizontal_accuracy: 0.0,
            altitude: 0.0,
            vertical_accuracy: -1.0,
            speed: -1.0,
            course: -1.0,
            timestamp,
        }
    }

    /// Set the horizontal accuracy.
    #[must_use]
    pub fn with_accuracy(mut self, meters: f64) -> Self {
        self.horizontal_accuracy = meters;
        self
    }

    /// Set speed and course.
    #[must_use]
    pub fn with_motion(mut self, speed: f64, course: f64) -> Self {
        self.speed = speed;
        self.course = course;
        self
    }

    /// Set altitude and its accuracy.
    #[must_use]
    pub fn with_altitude(mut self, altitude: f64, vertical_accuracy: f64) -> Self {
        self.altitude = altitude;
        self.vertical_accuracy = vertical_accuracy;
        self
    }

    /// Whether the fix carries a usable position.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        self.coordinate.is_valid()
            && self.horizontal_accuracy.is_finite()
            && self.horizontal_accuracy >= 0.0
    }
}

/// A platform-detected visit.
///
/// A visit still in progress has no departure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawVisit {
    /// Centre of the visit.
    pub coordinate: Coordinate,
    /// Accuracy of the centre in meters.
    #[serde(default)]
    pub horizontal_accuracy: f64,
    /// Arrival time, if known.
    #[serde(default)]
    pub arrival: Option<DateTime<Utc>>,
    /// Departure time, if the visit has ended.
    #[serde(default)]
    pub departure: Option<DateTime<Utc>>,
}

impl RawVisit {
    /// Whether the visit has a valid centre and at least one of arrival or
    /// departure.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        self.coordinate.is_valid() && (self.arrival.is_some() || self.departure.is_some())
    }
}

/// Region state reported by an explicit state query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionState {
    /// Device is inside the region.
    Inside,
    /// Device is outside the region.
    Outside,
    /// The platform could not tell.
    Unknown,
}

/// What happened at a region boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionEvent {
    /// The device crossed into the region.
    Enter,
    /// The device left the region.
    Exit,
    /// The platform answered a state query.
    Determined(RegionState),
}

impl RegionEvent {
    /// `(did_enter, did_exit)` for this event.
    #[must_use]
    pub const fn flags(self) -> (bool, bool) {
        match self {
            Self::Enter | Self::Determined(RegionState::Inside) => (true, false),
            Self::Exit | Self::Determined(RegionState::Outside) => (false, true),
            Self::Determined(RegionState::Unknown) => (false, false),
        }
    }
}

/// A region callback from the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionTransition {
    /// Identifier of the region the platform is reporting on.
    pub identifier: String,
    /// The transition or state.
    pub event: RegionEvent,
    /// Fix that triggered the event, if the platform supplies one.
    #[serde(default)]
    pub location: Option<RawFix>,
}

/// A failure reported asynchronously by the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformFailure {
    /// Platform error description.
    pub message: String,
    /// Mode the failure applies to, if known.
    #[serde(default)]
    pub mode: Option<MonitoringMode>,
    /// Generation of the mode start this failure belongs to.
    #[serde(default)]
    pub generation: Option<u64>,
    /// Region the failure applies to, if any.
    #[serde(default)]
    pub region_identifier: Option<String>,
}
