//! Shared enums used across the engine, its platform and its delegate.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A sensing mode the engine can run on the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitoringMode {
    /// Continuous location updates.
    Foreground,
    /// Low-power significant-change updates, delivered in the background.
    SignificantChange,
    /// Platform-detected visits (arrival/departure dwell events).
    Visits,
    /// Circular geofence regions.
    Regions,
}

impl MonitoringMode {
    /// The modes the engine starts and stops explicitly.
    ///
    /// Region monitoring is not listed: it follows the region set.
    pub const UPDATE_MODES: [Self; 3] = [Self::Foreground, Self::SignificantChange, Self::Visits];

    /// Stable label used in logs and error messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Foreground => "foreground",
            Self::SignificantChange => "significant-change",
            Self::Visits => "visit",
            Self::Regions => "region",
        }
    }

    /// Whether the mode keeps delivering while the app is in the background.
    #[must_use]
    pub const fn is_background_mode(self) -> bool {
        !matches!(self, Self::Foreground)
    }
}

impl fmt::Display for MonitoringMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a single monitoring mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeState {
    /// Not running.
    #[default]
    Stopped,
    /// Start issued, waiting for the platform to confirm.
    Starting,
    /// Running.
    Active,
}

impl ModeState {
    /// Whether the mode is running or on its way to running.
    #[must_use]
    pub const fn is_running(self) -> bool {
        !matches!(self, Self::Stopped)
    }
}

impl fmt::Display for ModeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => write!(f, "Stopped"),
            Self::Starting => write!(f, "Starting"),
            Self::Active => write!(f, "Active"),
        }
    }
}

/// Location permission level granted by the OS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationStatus {
    /// The user has not been asked yet.
    #[default]
    NotDetermined,
    /// Location access is blocked by policy (parental controls, MDM).
    Restricted,
    /// The user refused location access.
    Denied,
    /// Access while the app is in use.
    AuthorizedForeground,
    /// Access at all times, including in the background.
    AuthorizedAlways,
}

impl AuthorizationStatus {
    /// Whether any level of access is granted.
    #[must_use]
    pub const fn is_authorized(self) -> bool {
        matches!(self, Self::AuthorizedForeground | Self::AuthorizedAlways)
    }
}

impl fmt::Display for AuthorizationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(crate::authorization::status_name(*self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_labels_are_stable() {
        assert_eq!(MonitoringMode::Foreground.to_string(), "foreground");
        assert_eq!(MonitoringMode::SignificantChange.to_string(), "significant-change");
        assert_eq!(MonitoringMode::Visits.to_string(), "visit");
        assert_eq!(MonitoringMode::Regions.to_string(), "region");
    }

    #[test]
    fn test_mode_state_running() {
        assert!(!ModeState::Stopped.is_running());
        assert!(ModeState::Starting.is_running());
        assert!(ModeState::Active.is_running());
        assert_eq!(ModeState::default(), ModeState::Stopped);
    }

    #[test]
    fn test_authorization_status_serialization() {
        let json = serde_json::to_string(&AuthorizationStatus::AuthorizedAlways).unwrap();
        assert_eq!(json, "\"authorized_always\"");
        let status: AuthorizationStatus = serde_json::from_str("\"not_determined\"").unwrap();
        assert_eq!(status, AuthorizationStatus::NotDetermined);
    }

    #[test]
    fn test_background_modes() {
        assert!(!MonitoringMode::Foreground.is_background_mode());
        assert!(MonitoringMode::SignificantChange.is_background_mode());
        assert!(MonitoringMode::Visits.is_background_mode());
        assert!(MonitoringMode::Regions.is_background_mode());
    }
}
