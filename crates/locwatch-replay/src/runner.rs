//! Drives an engine through a script.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use serde::Serialize;
use tracing::{debug, info, info_span, warn};

use locwatch_core::{
    default_config_path, ConfigResult, LocationEngine, LocationError, ModeState, MonitorConfig,
    MonitoringMode,
};

use crate::output::{EventSink, JsonLinesDelegate, OutputRecord};
use crate::platform::{PlatformOptions, ScriptedPlatform};
use crate::script::ReplayStep;

/// Counts from a finished replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ReplaySummary {
    /// Steps executed.
    pub steps: usize,
    /// Steps whose direct call returned an error.
    pub step_errors: usize,
}

/// An engine wired to a scripted platform and a JSON-lines delegate.
pub struct Replay {
    engine: LocationEngine,
    platform: Arc<ScriptedPlatform>,
    sink: EventSink,
}

impl Replay {
    /// Build the engine.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the engine rejects `config`.
    pub fn new(config: MonitorConfig, options: PlatformOptions, sink: EventSink) -> ConfigResult<Self> {
        let platform = Arc::new(ScriptedPlatform::new(options, sink.clone()));
        let delegate = Arc::new(JsonLinesDelegate::new(sink.clone()));
        let engine = LocationEngine::new(config, platform.clone(), delegate)?;

        Ok(Self {
            engine,
            platform,
            sink,
        })
    }

    /// The engine being driven.
    #[must_use]
    pub const fn engine(&self) -> &LocationEngine {
        &self.engine
    }

    /// Run every step in order.
    ///
    /// A step whose direct call fails is reported as a `step_error` line and
    /// the run continues. A summary line is written at the end.
    pub fn run(&self, steps: &[ReplayStep]) -> ReplaySummary {
        let mut summary = ReplaySummary::default();

        for (index, step) in steps.iter().enumerate() {
            let span = info_span!("step", index, name = step.name());
            let _enter = span.enter();

            summary.steps += 1;
            if let Err(error) = self.apply(step) {
                summary.step_errors += 1;
                warn!(code = error.error_code(), error = %error, "Step failed");
                self.sink.emit(&OutputRecord::StepError {
                    step: index,
                    name: step.name().to_string(),
                    code: error.error_code().to_string(),
                    message: error.to_string(),
                });
            }
        }

        self.sink.emit(&OutputRecord::Summary {
            steps: summary.steps,
            step_errors: summary.step_errors,
        });
        summary
    }

    /// Apply one step.
    ///
    /// # Errors
    ///
    /// Returns the error of the engine call the step makes, if any.
    pub fn apply(&self, step: &ReplayStep) -> Result<(), LocationError> {
        let engine = &self.engine;
        match step {
            ReplayStep::AuthorizationChanged { status } => {
                self.platform.set_authorization(*status);
                engine.handle_authorization_change(*status);
            }
            ReplayStep::StartMonitoring => {
                let started = engine.start_monitoring()?;
                debug!(started, "Configured modes started");
            }
            ReplayStep::StartForeground { force } => {
                let state = engine.start_foreground_monitoring(*force)?;
                self.report_mode(MonitoringMode::Foreground, state);
            }
            ReplayStep::StartBackground { force } => {
                let state = engine.start_background_monitoring(*force)?;
                self.report_mode(MonitoringMode::SignificantChange, state);
            }
            ReplayStep::StartVisits { force } => {
                let state = engine.start_visit_monitoring(*force)?;
                self.report_mode(MonitoringMode::Visits, state);
            }
            ReplayStep::StopForeground => engine.stop_foreground_monitoring(),
            ReplayStep::StopBackground => engine.stop_background_monitoring(),
            ReplayStep::StopVisits => engine.stop_visit_monitoring(),
            ReplayStep::EnsureMonitoring => {
                let restarted = engine.ensure_monitoring();
                debug!(restarted, "Monitoring ensured");
            }
            ReplayStep::EnsureNotMonitoring => engine.ensure_not_monitoring(),
            ReplayStep::AddRegion(request) => {
                let region = match &request.identifier {
                    Some(identifier) => {
                        engine.add_region(identifier.clone(), request.center, request.radius)?
                    }
                    None => engine.add_anonymous_region(request.center, request.radius)?,
                };
                debug!(region = %region.identifier, radius = region.radius, "Region added");
            }
            ReplayStep::RemoveRegion { identifier } => {
                engine.remove_region(identifier)?;
            }
            ReplayStep::ClearRegions => {
                let removed = engine.clear_regions();
                debug!(count = removed.len(), "Regions cleared");
            }
            ReplayStep::Fixes { fixes } => engine.handle_location_update(fixes),
            ReplayStep::Visit(visit) => engine.handle_visit(visit),
            ReplayStep::Region(transition) => engine.handle_region_transition(transition),
            ReplayStep::Error(failure) => engine.handle_platform_error(failure.clone()),
            ReplayStep::Confirm { mode, generation } => {
                let generation = generation
                    .or_else(|| engine.mode_generation(*mode))
                    .unwrap_or_default();
                if !engine.confirm_monitoring(*mode, generation) {
                    debug!(mode = %mode, generation, "Confirmation ignored");
                }
            }
            ReplayStep::SetBackground { in_background } => {
                self.platform.set_background(*in_background);
            }
            ReplayStep::SetClock { at } => self.platform.set_clock(*at),
        }
        Ok(())
    }

    fn report_mode(&self, mode: MonitoringMode, state: ModeState) {
        self.sink.emit(&OutputRecord::ModeState { mode, state });
    }
}

/// Load the engine configuration.
///
/// An explicit path must exist. Without one, the user configuration file is
/// used if present, else the defaults.
///
/// # Errors
///
/// Returns an error if the file cannot be read, parsed or validated.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<MonitorConfig> {
    if let Some(path) = path {
        return MonitorConfig::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()));
    }

    match default_config_path() {
        Some(path) => {
            info!(path = %path.display(), "Using default configuration path");
            MonitorConfig::load_or_default(&path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))
        }
        None => Ok(MonitorConfig::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::read_records;
    use locwatch_core::AuthorizationStatus;

    fn replay(options: PlatformOptions) -> (Replay, crate::output::SharedBuffer) {
        let (sink, buffer) = EventSink::memory();
        let config = MonitorConfig {
            use_geo_fences: false,
            ..MonitorConfig::default()
        };
        (Replay::new(config, options, sink).unwrap(), buffer)
    }

    #[test]
    fn test_failed_step_does_not_stop_run() {
        let (replay, buffer) = replay(PlatformOptions {
            authorization: AuthorizationStatus::AuthorizedAlways,
            ..PlatformOptions::default()
        });

        let summary = replay.run(&[
            ReplayStep::RemoveRegion {
                identifier: "ghost".into(),
            },
            ReplayStep::StartForeground { force: false },
        ]);

        assert_eq!(
            summary,
            ReplaySummary {
                steps: 2,
                step_errors: 1
            }
        );
        let records = read_records(&buffer).unwrap();
        assert!(matches!(
            &records[0],
            OutputRecord::StepError { step: 0, code, .. } if code == "NOT_FOUND"
        ));
        assert!(records.contains(&OutputRecord::ModeState {
            mode: MonitoringMode::Foreground,
            state: ModeState::Active,
        }));
        assert!(matches!(records.last(), Some(OutputRecord::Summary { .. })));
    }

    #[test]
    fn test_confirm_uses_current_generation() {
        let (replay, _) = replay(PlatformOptions {
            authorization: AuthorizationStatus::AuthorizedAlways,
            deferred_activation: true,
            ..PlatformOptions::default()
        });

        replay.run(&[
            ReplayStep::StartVisits { force: false },
            ReplayStep::Confirm {
                mode: MonitoringMode::Visits,
                generation: None,
            },
        ]);
        assert_eq!(
            replay.engine().mode_state(MonitoringMode::Visits),
            ModeState::Active
        );
    }

    #[test]
    fn test_load_config_from_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "use_visit_monitoring = true\ngeo_radius = 75.0\n").unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert!(config.use_visit_monitoring);
        assert_eq!(config.geo_radius, 75.0);

        let missing = dir.path().join("missing.toml");
        assert!(load_config(Some(&missing)).is_err());
    }
}
