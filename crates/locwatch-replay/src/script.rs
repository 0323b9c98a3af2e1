//! Replay scripts.
//!
//! A script is a JSON array of steps, each tagged by its `step` field:
//!
//! ```json
//! [
//!   {"step": "start_background"},
//!   {"step": "authorization_changed", "status": "authorized_always"},
//!   {"step": "add_region", "identifier": "home",
//!    "center": {"latitude": -33.86, "longitude": 151.2}, "radius": 100},
//!   {"step": "fixes", "fixes": [{"coordinate": {"latitude": -33.86, "longitude": 151.2},
//!    "horizontal_accuracy": 10, "timestamp": "2025-01-15T03:29:50Z"}]}
//! ]
//! ```

use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use locwatch_core::{
    AuthorizationStatus, MonitoringMode, PlatformFailure, RawFix, RawVisit, RegionRequest,
    RegionTransition,
};

/// One scripted action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum ReplayStep {
    /// The OS reports a new authorization status.
    AuthorizationChanged {
        /// New status.
        status: AuthorizationStatus,
    },
    /// Start every configured mode.
    StartMonitoring,
    /// Start foreground updates.
    StartForeground {
        /// Restart if already running.
        #[serde(default)]
        force: bool,
    },
    /// Start significant-change monitoring.
    StartBackground {
        /// Restart if already running.
        #[serde(default)]
        force: bool,
    },
    /// Start visit monitoring.
    StartVisits {
        /// Restart if already running.
        #[serde(default)]
        force: bool,
    },
    /// Stop foreground updates.
    StopForeground,
    /// Stop significant-change monitoring.
    StopBackground,
    /// Stop visit monitoring.
    StopVisits,
    /// Restart whatever should be running.
    EnsureMonitoring,
    /// Stop everything.
    EnsureNotMonitoring,
    /// Add a region.
    AddRegion(RegionRequest),
    /// Remove a region.
    RemoveRegion {
        /// Region identifier.
        identifier: String,
    },
    /// Remove every region.
    ClearRegions,
    /// Deliver a batch of fixes.
    Fixes {
        /// The batch; may be empty.
        #[serde(default)]
        fixes: Vec<RawFix>,
    },
    /// Deliver a visit.
    Visit(RawVisit),
    /// Deliver a region event.
    Region(RegionTransition),
    /// Deliver a platform failure.
    Error(PlatformFailure),
    /// Confirm a deferred start.
    Confirm {
        /// Mode to confirm.
        mode: MonitoringMode,
        /// Generation to confirm; the mode's current generation if omitted.
        #[serde(default)]
        generation: Option<u64>,
    },
    /// Move the app to or from the background.
    SetBackground {
        /// New state.
        in_background: bool,
    },
    /// Pin the platform clock.
    SetClock {
        /// Time the platform reports from now on.
        at: DateTime<Utc>,
    },
}

impl ReplayStep {
    /// The step's tag.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::AuthorizationChanged { .. } => "authorization_changed",
            Self::StartMonitoring => "start_monitoring",
            Self::StartForeground { .. } => "start_foreground",
            Self::StartBackground { .. } => "start_background",
            Self::StartVisits { .. } => "start_visits",
            Self::StopForeground => "stop_foreground",
            Self::StopBackground => "stop_background",
            Self::StopVisits => "stop_visits",
            Self::EnsureMonitoring => "ensure_monitoring",
            Self::EnsureNotMonitoring => "ensure_not_monitoring",
            Self::AddRegion(_) => "add_region",
            Self::RemoveRegion { .. } => "remove_region",
            Self::ClearRegions => "clear_regions",
            Self::Fixes { .. } => "fixes",
            Self::Visit(_) => "visit",
            Self::Region(_) => "region",
            Self::Error(_) => "error",
            Self::Confirm { .. } => "confirm",
            Self::SetBackground { .. } => "set_background",
            Self::SetClock { .. } => "set_clock",
        }
    }
}

/// Parse a script.
///
/// # Errors
///
/// Returns the JSON error if the text is not an array of steps.
pub fn parse_script(json: &str) -> serde_json::Result<Vec<ReplayStep>> {
    serde_json::from_str(json)
}

/// Read and parse a script file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_script(path: impl AsRef<Path>) -> anyhow::Result<Vec<ReplayStep>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read script {}", path.display()))?;
    parse_script(&content).with_context(|| format!("Failed to parse script {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use locwatch_core::{Coordinate, RegionEvent};

    #[test]
    fn test_parse_mixed_script() {
        let json = r#"[
            {"step": "start_background", "force": true},
            {"step": "stop_visits"},
            {"step": "authorization_changed", "status": "authorized_always"},
            {"step": "add_region", "identifier": "home",
             "center": {"latitude": -33.86, "longitude": 151.2}},
            {"step": "region", "identifier": "home", "event": "enter"},
            {"step": "error", "message": "denied", "mode": "visits"},
            {"step": "confirm", "mode": "foreground"},
            {"step": "fixes"}
        ]"#;

        let steps = parse_script(json).unwrap();
        assert_eq!(steps.len(), 8);
        assert_eq!(steps[0], ReplayStep::StartBackground { force: true });
        assert_eq!(steps[1], ReplayStep::StopVisits);
        assert_eq!(
            steps[3],
            ReplayStep::AddRegion(RegionRequest::named(
                "home",
                Coordinate::new(-33.86, 151.2)
            ))
        );
        match &steps[4] {
            ReplayStep::Region(transition) => assert_eq!(transition.event, RegionEvent::Enter),
            other => panic!("unexpected step {other:?}"),
        }
        assert_eq!(
            steps[6],
            ReplayStep::Confirm {
                mode: MonitoringMode::Foreground,
                generation: None
            }
        );
        assert_eq!(steps[7], ReplayStep::Fixes { fixes: Vec::new() });
    }

    #[test]
    fn test_unknown_step_rejected() {
        assert!(parse_script(r#"[{"step": "teleport"}]"#).is_err());
    }

    #[test]
    fn test_step_names_match_tags() {
        let steps = parse_script(
            r#"[{"step": "ensure_not_monitoring"},
                {"step": "set_clock", "at": "2025-01-15T03:30:00Z"}]"#,
        )
        .unwrap();
        for step in &steps {
            let json = serde_json::to_value(step).unwrap();
            assert_eq!(json["step"], step.name());
        }
    }

    #[test]
    fn test_load_script_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("script.json");
        std::fs::write(&path, r#"[{"step": "ensure_monitoring"}]"#).unwrap();

        let steps = load_script(&path).unwrap();
        assert_eq!(steps, vec![ReplayStep::EnsureMonitoring]);

        let missing = load_script(dir.path().join("missing.json")).unwrap_err();
        assert!(missing.to_string().contains("Failed to read script"));
    }
}
