//! Monitoring configuration.
//!
//! Handles loading and validating the engine configuration:
//! - Which monitoring modes to run
//! - Authorization level to ask for
//! - Update tuning (distance filter, accuracy, activity type)
//! - Fix staleness threshold
//! - Geofence defaults
//!
//! The engine only accepts a validated [`MonitorConfig`]; invalid combinations
//! are rejected up front instead of degrading at runtime.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geo::{distance_in_meters, is_using_metric, UnitSystem};
use crate::platform::{LocationPlatform, UpdateSettings};

/// Default geofence radius in meters.
pub const DEFAULT_GEO_RADIUS_METERS: f64 = 20.0;

/// Default maximum fix age in seconds.
pub const DEFAULT_STALE_LOCATION_THRESHOLD_SECS: u64 = 600;

/// Largest accepted staleness threshold (one year).
pub const MAX_STALE_LOCATION_THRESHOLD_SECS: u64 = 365 * 24 * 60 * 60;

/// Environment variable prefix for configuration overrides.
pub const ENV_PREFIX: &str = "LOCWATCH";

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file does not exist.
    #[error("Configuration file not found at: {}", .0.display())]
    NotFound(PathBuf),

    /// The configuration file could not be read.
    #[error("Failed to read {}: {source}", .path.display())]
    ReadError {
        /// File that failed to load.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// A single field holds an invalid value.
    #[error("Invalid value for '{field}': {message}")]
    ValidationError {
        /// Offending field.
        field: &'static str,
        /// What is wrong with it.
        message: String,
    },

    /// Several fields hold invalid values.
    #[error("Configuration has {} problems: {}", .0.len(), join_errors(.0))]
    MultipleValidationErrors(Vec<ConfigError>),
}

fn join_errors(errors: &[ConfigError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Accuracy requested from the positioning system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DesiredAccuracy {
    /// Highest accuracy with extra sensor data, for navigation.
    BestForNavigation,
    /// Highest accuracy available.
    Best,
    /// Within ten meters.
    NearestTenMeters,
    /// Within a hundred meters.
    #[default]
    HundredMeters,
    /// Within a kilometre.
    Kilometer,
    /// Within three kilometres.
    ThreeKilometers,
    /// Approximate location only.
    Reduced,
}

/// Activity hint that lets the platform pause updates to save power.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    /// No specific activity.
    #[default]
    Other,
    /// Driving.
    AutomotiveNavigation,
    /// Walking, running, cycling.
    Fitness,
    /// Other vehicular navigation (boat, train).
    OtherNavigation,
    /// Flying.
    Airborne,
}

/// Channels the host can deliver messages through.
///
/// Carried as a set of variants rather than a bitmask so impossible values
/// cannot be expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PushTarget {
    /// Apple push notifications.
    Apn,
    /// Firebase/Google cloud messaging.
    Gcm,
    /// Apple Wallet passes.
    AppleWallet,
    /// Google Wallet passes.
    Wallet,
    /// Email.
    Mail,
    /// SMS.
    Sms,
    /// No push; the host polls.
    Passive,
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Ask for "always" authorization and require it for background modes.
    pub require_always_authorization: bool,

    /// Minimum movement between continuous updates, in meters. Zero disables
    /// the filter.
    pub distance_filter: f64,

    /// Accuracy requested for continuous updates.
    pub desired_accuracy: DesiredAccuracy,

    /// Activity hint for continuous updates.
    pub activity_type: ActivityType,

    /// Fixes older than this many seconds when they arrive are discarded.
    pub stale_location_threshold: u64,

    /// Run significant-change monitoring.
    pub use_significant_location: bool,

    /// Run visit monitoring.
    pub use_visit_monitoring: bool,

    /// Run continuous foreground updates.
    pub use_foreground_monitoring: bool,

    /// Keep a tracking geofence centred on the latest fix.
    pub use_geo_fences: bool,

    /// Default region radius in meters.
    pub geo_radius: f64,

    /// Log per-fix decisions at debug level.
    pub log_loc_info: bool,

    /// Locale used for caller-facing distances (`en_US`, `en-GB`). Metric when
    /// unset.
    pub locale: Option<String>,

    /// Channels the host delivers through.
    pub push_targets: BTreeSet<PushTarget>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            require_always_authorization: true,
            distance_filter: 0.0,
            desired_accuracy: DesiredAccuracy::default(),
            activity_type: ActivityType::default(),
            stale_location_threshold: DEFAULT_STALE_LOCATION_THRESHOLD_SECS,
            use_significant_location: true,
            use_visit_monitoring: false,
            use_foreground_monitoring: false,
            use_geo_fences: true,
            geo_radius: DEFAULT_GEO_RADIUS_METERS,
            log_loc_info: false,
            locale: None,
            push_targets: BTreeSet::from([PushTarget::Gcm]),
        }
    }
}

impl MonitorConfig {
    /// Parse and validate a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ParseError`] for malformed TOML and a validation
    /// error for invalid values.
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file, applying `LOCWATCH_*` environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotFound`] if the file is missing, a parse error
    /// if it cannot be read as configuration and a validation error for
    /// invalid values.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;

        let settings = ::config::Config::builder()
            .add_source(::config::File::from_str(&content, ::config::FileFormat::Toml))
            .add_source(::config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        let config: Self = settings
            .try_deserialize()
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file, falling back to defaults if it does not exist.
    ///
    /// # Errors
    ///
    /// Same as [`MonitorConfig::load`], except a missing file is not an error.
    pub fn load_or_default(path: impl AsRef<Path>) -> ConfigResult<Self> {
        match Self::load(path) {
            Err(ConfigError::NotFound(_)) => Ok(Self::default()),
            other => other,
        }
    }

    /// Serialize to TOML.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ParseError`] if serialization fails.
    pub fn to_toml_string(&self) -> ConfigResult<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Check every field, collecting all problems.
    ///
    /// # Errors
    ///
    /// Returns the single error, or [`ConfigError::MultipleValidationErrors`].
    pub fn validate(&self) -> ConfigResult<()> {
        let mut errors = Vec::new();

        if !self.distance_filter.is_finite() || self.distance_filter < 0.0 {
            errors.push(ConfigError::ValidationError {
                field: "distance_filter",
                message: format!("{} must be zero or a positive number of meters", self.distance_filter),
            });
        }

        if self.stale_location_threshold == 0 {
            errors.push(ConfigError::ValidationError {
                field: "stale_location_threshold",
                message: "must be at least one second".into(),
            });
        } else if self.stale_location_threshold > MAX_STALE_LOCATION_THRESHOLD_SECS {
            errors.push(ConfigError::ValidationError {
                field: "stale_location_threshold",
                message: format!("must not exceed {MAX_STALE_LOCATION_THRESHOLD_SECS} seconds"),
            });
        }

        if !self.geo_radius.is_finite() || self.geo_radius <= 0.0 {
            errors.push(ConfigError::ValidationError {
                field: "geo_radius",
                message: format!("{} must be a positive number of meters", self.geo_radius),
            });
        }

        if let Some(locale) = &self.locale {
            if locale.trim().is_empty() {
                errors.push(ConfigError::ValidationError {
                    field: "locale",
                    message: "cannot be empty; leave unset for metric".into(),
                });
            }
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ConfigError::MultipleValidationErrors(errors)),
        }
    }

    /// Validate against what the platform can actually do.
    ///
    /// # Errors
    ///
    /// Everything [`MonitorConfig::validate`] reports, plus visit monitoring
    /// without "always" authorization on a platform that needs it.
    pub fn validate_for(&self, platform: &dyn LocationPlatform) -> ConfigResult<()> {
        self.validate()?;

        if self.use_visit_monitoring
            && !self.require_always_authorization
            && platform.visits_require_always_authorization()
        {
            return Err(ConfigError::ValidationError {
                field: "use_visit_monitoring",
                message: "this platform only delivers visits with always authorization; \
                          set require_always_authorization"
                    .into(),
            });
        }

        Ok(())
    }

    /// Whether the configuration asks for this mode.
    #[must_use]
    pub const fn enables(&self, mode: crate::types::MonitoringMode) -> bool {
        use crate::types::MonitoringMode;
        match mode {
            MonitoringMode::Foreground => self.use_foreground_monitoring,
            MonitoringMode::SignificantChange => self.use_significant_location,
            MonitoringMode::Visits => self.use_visit_monitoring,
            MonitoringMode::Regions => self.use_geo_fences,
        }
    }

    /// Staleness threshold as a duration.
    #[must_use]
    pub fn stale_threshold(&self) -> TimeDelta {
        i64::try_from(self.stale_location_threshold)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .unwrap_or(TimeDelta::MAX)
    }

    /// Settings passed to the platform when starting updates.
    #[must_use]
    pub const fn update_settings(&self) -> UpdateSettings {
        UpdateSettings {
            distance_filter: self.distance_filter,
            desired_accuracy: self.desired_accuracy,
            activity_type: self.activity_type,
        }
    }

    /// Unit system implied by the configured locale.
    #[must_use]
    pub fn unit_system(&self) -> UnitSystem {
        match &self.locale {
            Some(locale) if !is_using_metric(locale) => UnitSystem::Imperial,
            _ => UnitSystem::Metric,
        }
    }

    /// Convert a distance in the configured locale's units to meters.
    #[must_use]
    pub fn distance_in_meters(&self, distance: f64) -> f64 {
        distance_in_meters(distance, self.unit_system())
    }
}

/// Default location of the configuration file.
///
/// `~/.config/locwatch/config.toml` on Linux, the platform equivalent
/// elsewhere. `None` if no home directory can be determined.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "locwatch").map(|dirs| dirs.config_dir().join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MonitoringMode;

    #[test]
    fn test_default_config_is_valid() {
        let config = MonitorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.geo_radius, DEFAULT_GEO_RADIUS_METERS);
        assert!(config.require_always_authorization);
    }

    #[test]
    fn test_from_toml_str_partial() {
        let config = MonitorConfig::from_toml_str(
            r#"
            use_visit_monitoring = true
            stale_location_threshold = 120
            desired_accuracy = "nearest_ten_meters"
            push_targets = ["apn", "mail"]
            "#,
        )
        .unwrap();
        assert!(config.use_visit_monitoring);
        assert_eq!(config.stale_location_threshold, 120);
        assert_eq!(config.desired_accuracy, DesiredAccuracy::NearestTenMeters);
        assert!(config.push_targets.contains(&PushTarget::Apn));
        assert!(config.push_targets.contains(&PushTarget::Mail));
        assert_eq!(config.push_targets.len(), 2);
        // Untouched fields keep defaults.
        assert_eq!(config.geo_radius, DEFAULT_GEO_RADIUS_METERS);
    }

    #[test]
    fn test_unknown_push_target_is_rejected() {
        let err = MonitorConfig::from_toml_str(r#"push_targets = ["pager"]"#).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_validation_collects_all_errors() {
        let config = MonitorConfig {
            distance_filter: -5.0,
            stale_location_threshold: 0,
            geo_radius: 0.0,
            ..MonitorConfig::default()
        };
        match config.validate().unwrap_err() {
            ConfigError::MultipleValidationErrors(errors) => assert_eq!(errors.len(), 3),
            other => panic!("expected multiple errors, got {other:?}"),
        }
    }

    #[test]
    fn test_single_validation_error() {
        let config = MonitorConfig {
            geo_radius: f64::NAN,
            ..MonitorConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::ValidationError {
                field: "geo_radius",
                ..
            }
        ));
    }

    #[test]
    fn test_stale_threshold_duration() {
        let config = MonitorConfig {
            stale_location_threshold: 90,
            ..MonitorConfig::default()
        };
        assert_eq!(config.stale_threshold(), TimeDelta::seconds(90));
    }

    #[test]
    fn test_enables_follows_flags() {
        let config = MonitorConfig {
            use_foreground_monitoring: true,
            use_significant_location: false,
            ..MonitorConfig::default()
        };
        assert!(config.enables(MonitoringMode::Foreground));
        assert!(!config.enables(MonitoringMode::SignificantChange));
        assert!(!config.enables(MonitoringMode::Visits));
    }

    #[test]
    fn test_locale_distance_conversion() {
        let mut config = MonitorConfig::default();
        assert_eq!(config.distance_in_meters(1.5), 1500.0);

        config.locale = Some("en_US".into());
        assert_eq!(config.unit_system(), UnitSystem::Imperial);
        assert!((config.distance_in_meters(1.0) - 1609.344).abs() < 1e-9);
    }

    #[test]
    fn test_toml_round_trip() {
        let config = MonitorConfig {
            use_foreground_monitoring: true,
            locale: Some("en_AU".into()),
            ..MonitorConfig::default()
        };
        let text = config.to_toml_string().unwrap();
        assert_eq!(MonitorConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");
        assert!(matches!(
            MonitorConfig::load(&path),
            Err(ConfigError::NotFound(_))
        ));
        assert_eq!(
            MonitorConfig::load_or_default(&path).unwrap(),
            MonitorConfig::default()
        );
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "geo_radius = 75.0\nuse_foreground_monitoring = true\n").unwrap();

        let config = MonitorConfig::load(&path).unwrap();
        assert_eq!(config.geo_radius, 75.0);
        assert!(config.use_foreground_monitoring);
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "geo_radius = -1.0\n").unwrap();

        assert!(matches!(
            MonitorConfig::load(&path),
            Err(ConfigError::ValidationError { field: "geo_radius", .. })
        ));
    }

    #[test]
    fn test_default_config_path_ends_with_file_name() {
        if let Some(path) = default_config_path() {
            assert!(path.ends_with("config.toml"));
        }
    }
}
