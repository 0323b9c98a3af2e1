//! # locwatch-core
//!
//! Core engine of the locwatch location monitoring system.
//!
//! This crate provides:
//! - Monitoring mode lifecycle (foreground, significant-change, visits)
//! - Authorization tracking and authorization-gated starts
//! - Circular region (geofence) monitoring with a capacity-bounded set
//! - Fix normalization: staleness filtering, invalid readings, empty batches
//! - Distance math and locale-aware unit conversion
//!
//! ## Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`engine`] - The monitoring engine that owns all mutable state
//! - [`platform`] - The OS capability trait and raw callback inputs
//! - [`delegate`] - The trait normalized events are delivered through
//! - [`snapshot`] - Normalized location observations and their flat record
//! - [`region`] - Monitored regions and the bounded region set
//! - [`authorization`] - Authorization status tracking and mode permissions
//! - [`geo`] - Haversine distance and unit conversion
//! - [`config`] - Engine configuration loading and validation
//! - [`error`] - Error types for engine operations
//! - [`types`] - Shared enums (modes, mode states, authorization statuses)

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]

pub mod authorization;
pub mod config;
pub mod delegate;
pub mod engine;
pub mod error;
pub mod geo;
pub mod platform;
pub mod region;
pub mod snapshot;
pub mod types;

// Re-export primary types for convenience
pub use authorization::{permits, status_name, AuthorizationTracker};
pub use config::{
    default_config_path, ActivityType, ConfigError, ConfigResult, DesiredAccuracy,
    MonitorConfig, PushTarget,
};
pub use delegate::{LocationDelegate, NoopDelegate, TracingDelegate};
pub use engine::{LocationEngine, RegionRequest};
pub use error::{LocationError, Result};
pub use geo::{haversine_distance, is_using_metric, Coordinate, UnitSystem};
pub use platform::{
    Activation, LocationPlatform, PlatformFailure, RawFix, RawVisit, RegionEvent, RegionState,
    RegionTransition, UpdateSettings,
};
pub use region::{MonitoredRegion, RegionSet};
pub use snapshot::{LocationSnapshot, SnapshotKind, SnapshotRecord};
pub use types::{AuthorizationStatus, ModeState, MonitoringMode};
