//! The delegate boundary: where normalized events leave the engine.

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::LocationError;
use crate::region::MonitoredRegion;
use crate::snapshot::LocationSnapshot;
use crate::types::AuthorizationStatus;

/// Receiver of normalized engine events.
///
/// Methods are called after the engine has released its state lock, so an
/// implementation may call back into the engine.
pub trait LocationDelegate: Send + Sync {
    /// Accepted fixes or a visit.
    fn on_device_update(&self, snapshots: &[LocationSnapshot], in_background: bool);

    /// A region boundary event for a monitored region.
    fn on_region_update(
        &self,
        region: &MonitoredRegion,
        snapshot: &LocationSnapshot,
        in_background: bool,
    );

    /// The OS reported a new authorization status.
    fn on_authorization_change(&self, status: AuthorizationStatus);

    /// A non-fatal error from an asynchronous callback.
    fn on_error(&self, error: Option<&LocationError>, message: Option<&str>, in_geo: bool);
}

impl<T: LocationDelegate + ?Sized> LocationDelegate for Arc<T> {
    fn on_device_update(&self, snapshots: &[LocationSnapshot], in_background: bool) {
        (**self).on_device_update(snapshots, in_background);
    }

    fn on_region_update(
        &self,
        region: &MonitoredRegion,
        snapshot: &LocationSnapshot,
        in_background: bool,
    ) {
        (**self).on_region_update(region, snapshot, in_background);
    }

    fn on_authorization_change(&self, status: AuthorizationStatus) {
        (**self).on_authorization_change(status);
    }

    fn on_error(&self, error: Option<&LocationError>, message: Option<&str>, in_geo: bool) {
        (**self).on_error(error, message, in_geo);
    }
}

/// Delegate that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDelegate;

impl LocationDelegate for NoopDelegate {
    fn on_device_update(&self, _snapshots: &[LocationSnapshot], _in_background: bool) {}

    fn on_region_update(
        &self,
        _region: &MonitoredRegion,
        _snapshot: &LocationSnapshot,
        _in_background: bool,
    ) {
    }

    fn on_authorization_change(&self, _status: AuthorizationStatus) {}

    fn on_error(&self, _error: Option<&LocationError>, _message: Option<&str>, _in_geo: bool) {}
}

/// Delegate that writes every event to the `tracing` log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDelegate;

impl LocationDelegate for TracingDelegate {
    fn on_device_update(&self, snapshots: &[LocationSnapshot], in_background: bool) {
        for snapshot in snapshots {
            info!(
                latitude = snapshot.latitude(),
                longitude = snapshot.longitude(),
                accuracy = ?snapshot.accuracy(),
                fix_timestamp = %snapshot.fix_timestamp(),
                in_background,
                "Device location update"
            );
        }
    }

    fn on_region_update(
        &self,
        region: &MonitoredRegion,
        snapshot: &LocationSnapshot,
        in_background: bool,
    ) {
        info!(
            region = %region.identifier,
            did_enter = ?snapshot.did_enter(),
            did_exit = ?snapshot.did_exit(),
            in_background,
            "Region update"
        );
    }

    fn on_authorization_change(&self, status: AuthorizationStatus) {
        info!(status = %status, "Authorization changed");
    }

    fn on_error(&self, error: Option<&LocationError>, message: Option<&str>, in_geo: bool) {
        warn!(
            code = error.map(LocationError::error_code),
            error = error.map(tracing::field::display),
            message,
            in_geo,
            "Location error"
        );
    }
}
