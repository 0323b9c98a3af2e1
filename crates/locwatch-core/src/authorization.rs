//! Authorization state tracking.
//!
//! The OS grants location access at one of several levels. The tracker keeps
//! the latest status and answers whether a given mode may run under it.

use tracing::debug;

use crate::types::{AuthorizationStatus, MonitoringMode};

/// Holds the current OS authorization status.
#[derive(Debug, Clone)]
pub struct AuthorizationTracker {
    status: AuthorizationStatus,
    require_always: bool,
}

impl AuthorizationTracker {
    /// Create a tracker seeded with the status the platform reports at startup.
    #[must_use]
    pub const fn new(status: AuthorizationStatus, require_always: bool) -> Self {
        Self {
            status,
            require_always,
        }
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> AuthorizationStatus {
        self.status
    }

    /// Whether the user still has to be asked.
    #[must_use]
    pub const fn needs_request(&self) -> bool {
        matches!(self.status, AuthorizationStatus::NotDetermined)
    }

    /// Whether the user or policy has refused access outright.
    #[must_use]
    pub const fn is_denied(&self) -> bool {
        matches!(
            self.status,
            AuthorizationStatus::Denied | AuthorizationStatus::Restricted
        )
    }

    /// Whether `mode` may run under the current status.
    #[must_use]
    pub const fn allows(&self, mode: MonitoringMode) -> bool {
        permits(self.status, mode, self.require_always)
    }

    /// Record a new status.
    ///
    /// Returns `true` when at least one of `requested` was not permitted under
    /// the previous status and is permitted under the new one.
    pub fn record_status_change(
        &mut self,
        new_status: AuthorizationStatus,
        requested: &[MonitoringMode],
    ) -> bool {
        let previous = self.status;
        self.status = new_status;

        let newly_permitted = requested.iter().any(|&mode| {
            !permits(previous, mode, self.require_always)
                && permits(new_status, mode, self.require_always)
        });

        debug!(
            from = status_name(previous),
            to = status_name(new_status),
            newly_permitted,
            "Authorization status changed"
        );

        newly_permitted
    }
}

/// Whether `mode` may run under `status`.
///
/// Foreground updates need at least foreground authorization. Significant
/// change, visit and region monitoring need "always" authorization when
/// `require_always` is set, otherwise any granted level.
#[must_use]
pub const fn permits(status: AuthorizationStatus, mode: MonitoringMode, require_always: bool) -> bool {
    if !status.is_authorized() {
        return false;
    }
    !mode.is_background_mode()
        || !require_always
        || matches!(status, AuthorizationStatus::AuthorizedAlways)
}

/// Stable human-readable label for a status.
#[must_use]
pub const fn status_name(status: AuthorizationStatus) -> &'static str {
    match status {
        AuthorizationStatus::NotDetermined => "not determined",
        AuthorizationStatus::Restricted => "restricted",
        AuthorizationStatus::Denied => "denied",
        AuthorizationStatus::AuthorizedForeground => "authorized when in use",
        AuthorizationStatus::AuthorizedAlways => "authorized always",
    }
}
