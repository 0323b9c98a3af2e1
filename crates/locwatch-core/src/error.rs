//! Error types for the location monitoring engine.
//!
//! [`LocationError`] covers every failure the engine can report, whether it is
//! returned synchronously from a direct call (region bookkeeping, capability
//! checks) or recorded and forwarded to the delegate from an asynchronous
//! platform callback. None of these are fatal to the engine.
//!
//! Configuration problems use [`ConfigError`] from the [`config`](crate::config)
//! module since they surface before an engine exists.
//!
//! # Example
//!
//! ```rust
//! use locwatch_core::error::{LocationError, Result};
//!
//! fn require_region(known: bool, id: &str) -> Result<()> {
//!     if !known {
//!         return Err(LocationError::NotFound(id.to_string()));
//!     }
//!     Ok(())
//! }
//! ```

use thiserror::Error;

use crate::types::MonitoringMode;

/// The error type for all engine operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LocationError {
    // =========================================================================
    // AUTHORIZATION & CAPABILITY ERRORS
    // =========================================================================
    /// The current authorization status does not allow this mode.
    #[error("Location authorization does not permit {mode} monitoring. Grant location access to resume.")]
    AuthorizationDenied {
        /// The mode that could not start.
        mode: MonitoringMode,
    },

    /// The device cannot run this mode at all.
    #[error("{mode} monitoring is not available on this device")]
    CapabilityUnavailable {
        /// The mode that is unavailable.
        mode: MonitoringMode,
    },

    // =========================================================================
    // CALLBACK ERRORS
    // =========================================================================
    /// A fix delivery contained nothing usable.
    #[error("Location update contained no usable fixes")]
    EmptyLocation,

    /// A region callback named a region the engine is not tracking.
    #[error("Region transition for unknown region '{0}'")]
    UnknownRegion(String),

    /// The platform reported a monitoring failure.
    #[error("Location platform error: {message}")]
    Platform {
        /// Message reported by the platform.
        message: String,
        /// Mode affected by the failure, if the platform says.
        mode: Option<MonitoringMode>,
        /// Region affected by the failure, if any.
        region_identifier: Option<String>,
    },

    // =========================================================================
    // REGION SET ERRORS
    // =========================================================================
    /// The region set is full.
    #[error("Cannot monitor more than {capacity} regions at once")]
    CapacityExceeded {
        /// Maximum number of concurrently monitored regions.
        capacity: usize,
    },

    /// A region with this identifier is already monitored.
    #[error("Region '{0}' is already monitored")]
    DuplicateIdentifier(String),

    /// No region with this identifier is monitored.
    #[error("Region '{0}' is not monitored")]
    NotFound(String),

    /// The region definition is unusable.
    #[error("Invalid region: {0}")]
    InvalidRegion(String),
}

/// A specialized [`Result`] type for engine operations.
pub type Result<T> = std::result::Result<T, LocationError>;

impl LocationError {
    /// Returns `true` if this error concerns geofence regions.
    ///
    /// This is the `in_geo` flag passed to the delegate.
    #[inline]
    #[must_use]
    pub const fn is_geo_error(&self) -> bool {
        match self {
            Self::Platform {
                mode,
                region_identifier,
                ..
            } => region_identifier.is_some() || matches!(mode, Some(MonitoringMode::Regions)),
            Self::AuthorizationDenied { mode } | Self::CapabilityUnavailable { mode } => {
                matches!(mode, MonitoringMode::Regions)
            }
            _ => self.is_region_error(),
        }
    }

    /// Returns `true` if this error came from region bookkeeping.
    #[inline]
    #[must_use]
    pub const fn is_region_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownRegion(_)
                | Self::CapacityExceeded { .. }
                | Self::DuplicateIdentifier(_)
                | Self::NotFound(_)
                | Self::InvalidRegion(_)
        )
    }

    /// Returns `true` if the condition may clear without caller changes.
    ///
    /// Authorization can be granted later, a later fix batch may be usable and
    /// platform failures are often transient.
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::AuthorizationDenied { .. } | Self::EmptyLocation | Self::Platform { .. }
        )
    }

    /// Returns a machine-readable error code.
    #[inline]
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::AuthorizationDenied { .. } => "AUTHORIZATION_DENIED",
            Self::CapabilityUnavailable { .. } => "CAPABILITY_UNAVAILABLE",
            Self::EmptyLocation => "EMPTY_LOCATION",
            Self::UnknownRegion(_) => "UNKNOWN_REGION",
            Self::Platform { .. } => "PLATFORM_ERROR",
            Self::CapacityExceeded { .. } => "CAPACITY_EXCEEDED",
            Self::DuplicateIdentifier(_) => "DUPLICATE_IDENTIFIER",
            Self::NotFound(_) => "NOT_FOUND",
            Self::InvalidRegion(_) => "INVALID_REGION",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn platform(mode: Option<MonitoringMode>, region: Option<&str>) -> LocationError {
        LocationError::Platform {
            message: "kCLErrorDomain 5".into(),
            mode,
            region_identifier: region.map(str::to_string),
        }
    }

    #[test]
    fn test_region_error_classification() {
        assert!(LocationError::UnknownRegion("home".into()).is_region_error());
        assert!(LocationError::CapacityExceeded { capacity: 20 }.is_region_error());
        assert!(LocationError::DuplicateIdentifier("home".into()).is_region_error());
        assert!(LocationError::NotFound("home".into()).is_region_error());

        assert!(!LocationError::EmptyLocation.is_region_error());
        assert!(!platform(None, Some("home")).is_region_error());
    }

    #[test]
    fn test_geo_error_classification() {
        assert!(LocationError::UnknownRegion("home".into()).is_geo_error());
        assert!(platform(None, Some("home")).is_geo_error());
        assert!(platform(Some(MonitoringMode::Regions), None).is_geo_error());
        assert!(LocationError::CapabilityUnavailable {
            mode: MonitoringMode::Regions
        }
        .is_geo_error());

        assert!(!platform(Some(MonitoringMode::Foreground), None).is_geo_error());
        assert!(!LocationError::EmptyLocation.is_geo_error());
        assert!(!LocationError::AuthorizationDenied {
            mode: MonitoringMode::Visits
        }
        .is_geo_error());
    }

    #[test]
    fn test_recoverable_errors() {
        assert!(LocationError::AuthorizationDenied {
            mode: MonitoringMode::Foreground
        }
        .is_recoverable());
        assert!(LocationError::EmptyLocation.is_recoverable());
        assert!(!LocationError::CapabilityUnavailable {
            mode: MonitoringMode::SignificantChange
        }
        .is_recoverable());
        assert!(!LocationError::NotFound("x".into()).is_recoverable());
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(LocationError::EmptyLocation.error_code(), "EMPTY_LOCATION");
        assert_eq!(
            LocationError::CapacityExceeded { capacity: 20 }.error_code(),
            "CAPACITY_EXCEEDED"
        );
        assert_eq!(platform(None, None).error_code(), "PLATFORM_ERROR");
    }

    #[test]
    fn test_error_display_messages() {
        let err = LocationError::CapacityExceeded { capacity: 20 };
        assert!(err.to_string().contains("20 regions"));

        let err = LocationError::UnknownRegion("gf_123".into());
        assert!(err.to_string().contains("gf_123"));

        let err = LocationError::AuthorizationDenied {
            mode: MonitoringMode::SignificantChange,
        };
        assert!(err.to_string().contains("significant-change"));
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<LocationError>();
        assert_sync::<LocationError>();
    }
}
