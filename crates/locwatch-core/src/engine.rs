//! The monitoring engine.
//!
//! [`LocationEngine`] owns every piece of mutable state: authorization, the
//! lifecycle of each monitoring mode, the region set and the last known
//! location. All of it sits behind one lock.
//!
//! Platform requests are issued while the lock is held so they stay atomic
//! with the state change that caused them. Delegate callbacks are queued while
//! locked and delivered after the lock is released, so a delegate may call
//! back into the engine.
//!
//! # Mode lifecycle
//!
//! ```text
//! Stopped --start--> Active              (platform answered Immediate)
//! Stopped --start--> Starting --confirm--> Active
//! any     --stop---> Stopped             (generation bumped)
//! ```
//!
//! Every start and stop bumps the mode's generation. A confirmation or a
//! platform failure carrying an older generation is ignored.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::authorization::AuthorizationTracker;
use crate::config::{ConfigResult, MonitorConfig};
use crate::delegate::LocationDelegate;
use crate::error::{LocationError, Result};
use crate::geo::{haversine_distance, Coordinate, UnitSystem};
use crate::platform::{
    Activation, LocationPlatform, PlatformFailure, RawFix, RawVisit, RegionEvent,
    RegionTransition,
};
use crate::region::{generate_region_identifier, MonitoredRegion, RegionSet};
use crate::snapshot::LocationSnapshot;
use crate::types::{AuthorizationStatus, ModeState, MonitoringMode};

/// A region to add.
///
/// A missing identifier gets a generated one; a missing or negative radius
/// falls back to the configured `geo_radius`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionRequest {
    /// Identifier to register the region under.
    #[serde(default)]
    pub identifier: Option<String>,
    /// Centre of the circle.
    pub center: Coordinate,
    /// Radius in meters.
    #[serde(default)]
    pub radius: Option<f64>,
}

impl RegionRequest {
    /// Request a named region with the default radius.
    #[must_use]
    pub fn named(identifier: impl Into<String>, center: Coordinate) -> Self {
        Self {
            identifier: Some(identifier.into()),
            center,
            radius: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct ModeSlot {
    state: ModeState,
    requested: bool,
    generation: u64,
}

#[derive(Debug, Clone)]
struct RecordedError {
    error: LocationError,
    message: String,
    context: Option<LocationSnapshot>,
}

/// Everything the engine mutates, guarded by one lock.
#[derive(Debug)]
struct EngineState {
    authorization: AuthorizationTracker,
    authorization_requested: bool,
    modes: [ModeSlot; 3],
    regions: RegionSet,
    regions_engaged: bool,
    tracking_fence: Option<String>,
    last_location: Option<LocationSnapshot>,
    last_error: Option<RecordedError>,
}

impl EngineState {
    const fn slot_index(mode: MonitoringMode) -> Option<usize> {
        match mode {
            MonitoringMode::Foreground => Some(0),
            MonitoringMode::SignificantChange => Some(1),
            MonitoringMode::Visits => Some(2),
            MonitoringMode::Regions => None,
        }
    }

    fn slot(&self, mode: MonitoringMode) -> Option<&ModeSlot> {
        Self::slot_index(mode).map(|index| &self.modes[index])
    }

    fn slot_mut(&mut self, mode: MonitoringMode) -> Option<&mut ModeSlot> {
        Self::slot_index(mode).map(move |index| &mut self.modes[index])
    }

    /// Modes that were asked for, explicitly or by configuration.
    fn wanted_modes(&self, config: &MonitorConfig) -> Vec<MonitoringMode> {
        let mut wanted: Vec<_> = MonitoringMode::UPDATE_MODES
            .into_iter()
            .filter(|&mode| {
                config.enables(mode) || self.slot(mode).is_some_and(|slot| slot.requested)
            })
            .collect();
        if !self.regions.is_empty() {
            wanted.push(MonitoringMode::Regions);
        }
        wanted
    }

    /// Replace the last known location unless `snapshot` is older.
    fn remember(&mut self, snapshot: LocationSnapshot) {
        let newer = self
            .last_location
            .as_ref()
            .map_or(true, |last| snapshot.fix_timestamp() >= last.fix_timestamp());
        if newer {
            self.last_location = Some(snapshot);
        }
    }

    /// Store `error` as the last error without notifying the delegate.
    fn note_error(&mut self, error: LocationError, message: String, context: Option<LocationSnapshot>) {
        self.last_error = Some(RecordedError {
            error,
            message,
            context,
        });
    }

    /// Store `error` and build the delegate event for it.
    fn record_error(
        &mut self,
        error: LocationError,
        message: String,
        context: Option<LocationSnapshot>,
    ) -> EngineEvent {
        self.note_error(error.clone(), message.clone(), context);
        EngineEvent::Error {
            in_geo: error.is_geo_error(),
            error,
            message,
        }
    }
}

/// A delegate callback waiting for the lock to be released.
#[derive(Debug)]
enum EngineEvent {
    DeviceUpdate {
        snapshots: Vec<LocationSnapshot>,
        in_background: bool,
    },
    RegionUpdate {
        region: MonitoredRegion,
        snapshot: LocationSnapshot,
        in_background: bool,
    },
    AuthorizationChange(AuthorizationStatus),
    Error {
        error: LocationError,
        message: String,
        in_geo: bool,
    },
}

/// Location monitoring engine.
///
/// Cheap to share behind an `Arc`; every method takes `&self` and may be
/// called from any thread.
pub struct LocationEngine {
    config: MonitorConfig,
    platform: Arc<dyn LocationPlatform>,
    delegate: Arc<dyn LocationDelegate>,
    state: Mutex<EngineState>,
}

impl LocationEngine {
    /// Create an engine.
    ///
    /// The authorization status is seeded from the platform, and the region
    /// set is sized from the platform's limits.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::config::ConfigError`] if the configuration is
    /// invalid or asks for something the platform cannot do.
    pub fn new(
        config: MonitorConfig,
        platform: Arc<dyn LocationPlatform>,
        delegate: Arc<dyn LocationDelegate>,
    ) -> ConfigResult<Self> {
        config.validate_for(platform.as_ref())?;

        let status = platform.authorization_status();
        let regions = RegionSet::new(platform.max_monitored_regions(), platform.max_region_radius());

        info!(
            authorization = %status,
            foreground = config.use_foreground_monitoring,
            significant_change = config.use_significant_location,
            visits = config.use_visit_monitoring,
            geo_fences = config.use_geo_fences,
            region_capacity = regions.capacity(),
            "Location engine created"
        );

        let state = EngineState {
            authorization: AuthorizationTracker::new(status, config.require_always_authorization),
            authorization_requested: false,
            modes: [ModeSlot::default(); 3],
            regions,
            regions_engaged: false,
            tracking_fence: None,
            last_location: None,
            last_error: None,
        };

        Ok(Self {
            config,
            platform,
            delegate,
            state: Mutex::new(state),
        })
    }

    /// The configuration the engine was built with.
    #[must_use]
    pub const fn config(&self) -> &MonitorConfig {
        &self.config
    }

    // =========================================================================
    // Mode control
    // =========================================================================

    /// Start every mode enabled in the configuration and engage region
    /// monitoring, asking for authorization first if it is not determined.
    ///
    /// Returns whether anything started.
    ///
    /// # Errors
    ///
    /// Returns the first [`LocationError::CapabilityUnavailable`] hit; the
    /// remaining modes are still attempted.
    pub fn start_monitoring(&self) -> Result<bool> {
        let mut state = self.state.lock();
        if state.authorization.needs_request() {
            self.request_authorization(&mut state);
        }

        let mut started = false;
        let mut first_error = None;
        for mode in MonitoringMode::UPDATE_MODES {
            if !self.config.enables(mode) {
                continue;
            }
            match self.start_mode(&mut state, mode, false) {
                Ok(mode_state) => started |= mode_state.is_running(),
                Err(error) => {
                    warn!(mode = %mode, error = %error, "Could not start monitoring");
                    first_error.get_or_insert(error);
                }
            }
        }
        started |= self.sync_regions(&mut state);

        first_error.map_or(Ok(started), Err)
    }

    /// Start continuous foreground updates.
    ///
    /// Returns the mode's state afterwards. `Stopped` means the start is
    /// waiting on authorization: either a request was issued, or the status
    /// does not permit the mode and [`LocationError::AuthorizationDenied`] was
    /// recorded as the last error. The intent is kept in both cases.
    ///
    /// # Errors
    ///
    /// [`LocationError::CapabilityUnavailable`] if location services are off.
    pub fn start_foreground_monitoring(&self, force: bool) -> Result<ModeState> {
        let mut state = self.state.lock();
        self.start_mode(&mut state, MonitoringMode::Foreground, force)
    }

    /// Start significant-change monitoring.
    ///
    /// Behaves like [`Self::start_foreground_monitoring`], gated on "always"
    /// authorization when the configuration requires it.
    ///
    /// # Errors
    ///
    /// [`LocationError::CapabilityUnavailable`] if location services are off
    /// or the device has no significant-change monitoring.
    pub fn start_background_monitoring(&self, force: bool) -> Result<ModeState> {
        let mut state = self.state.lock();
        self.start_mode(&mut state, MonitoringMode::SignificantChange, force)
    }

    /// Start visit monitoring.
    ///
    /// # Errors
    ///
    /// [`LocationError::CapabilityUnavailable`] if location services are off.
    pub fn start_visit_monitoring(&self, force: bool) -> Result<ModeState> {
        let mut state = self.state.lock();
        self.start_mode(&mut state, MonitoringMode::Visits, force)
    }

    /// Stop continuous foreground updates.
    pub fn stop_foreground_monitoring(&self) {
        let mut state = self.state.lock();
        self.stop_mode(&mut state, MonitoringMode::Foreground);
    }

    /// Stop significant-change monitoring.
    pub fn stop_background_monitoring(&self) {
        let mut state = self.state.lock();
        self.stop_mode(&mut state, MonitoringMode::SignificantChange);
    }

    /// Stop visit monitoring.
    pub fn stop_visit_monitoring(&self) {
        let mut state = self.state.lock();
        self.stop_mode(&mut state, MonitoringMode::Visits);
    }

    /// Restart every stopped mode that is enabled or was requested, and
    /// re-engage region monitoring.
    ///
    /// Returns whether anything (re)started.
    pub fn ensure_monitoring(&self) -> bool {
        let mut state = self.state.lock();
        self.ensure_locked(&mut state)
    }

    /// Stop every mode and disengage region monitoring.
    ///
    /// Regions stay in the set and are re-engaged by a later
    /// [`Self::ensure_monitoring`].
    pub fn ensure_not_monitoring(&self) {
        let mut state = self.state.lock();
        for mode in MonitoringMode::UPDATE_MODES {
            self.stop_mode(&mut state, mode);
        }
        self.disengage_regions(&mut state);
    }

    /// Confirm a deferred start.
    ///
    /// Moves `mode` from `Starting` to `Active` if `generation` is the one
    /// handed to the platform by the latest start. Returns whether it did.
    pub fn confirm_monitoring(&self, mode: MonitoringMode, generation: u64) -> bool {
        let mut state = self.state.lock();
        let Some(slot) = state.slot_mut(mode) else {
            return false;
        };

        if slot.generation != generation || slot.state != ModeState::Starting {
            debug!(
                mode = %mode,
                generation,
                current = slot.generation,
                state = %slot.state,
                "Ignoring stale monitoring confirmation"
            );
            return false;
        }

        slot.state = ModeState::Active;
        info!(mode = %mode, generation, "Monitoring confirmed");
        true
    }

    fn start_mode(
        &self,
        state: &mut EngineState,
        mode: MonitoringMode,
        force: bool,
    ) -> Result<ModeState> {
        let current = state
            .slot(mode)
            .map(|slot| slot.state)
            .ok_or(LocationError::CapabilityUnavailable { mode })?;

        if current.is_running() && !force {
            return Ok(current);
        }
        if !self.platform.location_services_enabled() {
            return Err(LocationError::CapabilityUnavailable { mode });
        }
        if mode == MonitoringMode::SignificantChange
            && !self.platform.significant_change_monitoring_available()
        {
            return Err(LocationError::CapabilityUnavailable { mode });
        }

        if let Some(slot) = state.slot_mut(mode) {
            slot.requested = true;
        }

        if state.authorization.needs_request() {
            self.request_authorization(state);
            return Ok(current);
        }
        if !state.authorization.allows(mode) {
            let status = state.authorization.status();
            let denied = state.authorization.is_denied();
            warn!(mode = %mode, status = %status, denied, "Monitoring not permitted");
            let error = LocationError::AuthorizationDenied { mode };
            let message = error.to_string();
            state.note_error(error, message, None);
            return Ok(current);
        }

        if current.is_running() {
            self.platform.stop_updates(mode);
        }

        let generation = state.slot(mode).map_or(0, |slot| slot.generation) + 1;
        let activation =
            self.platform
                .start_updates(mode, &self.config.update_settings(), generation);
        let new_state = match activation {
            Activation::Immediate => ModeState::Active,
            Activation::Deferred => ModeState::Starting,
        };
        if let Some(slot) = state.slot_mut(mode) {
            slot.generation = generation;
            slot.state = new_state;
        }

        info!(
            mode = %mode,
            state = %new_state,
            generation,
            restarted = current.is_running(),
            "Monitoring started"
        );
        Ok(new_state)
    }

    /// Stop a mode and forget that it was asked for.
    fn stop_mode(&self, state: &mut EngineState, mode: MonitoringMode) {
        let Some(slot) = state.slot_mut(mode) else {
            return;
        };
        let previous = slot.state;
        slot.state = ModeState::Stopped;
        slot.requested = false;
        slot.generation += 1;

        if previous.is_running() {
            self.platform.stop_updates(mode);
            info!(mode = %mode, "Monitoring stopped");
        }
    }

    /// Stop a running mode but keep its intent, so `ensure_monitoring` can
    /// bring it back.
    fn halt_mode(&self, state: &mut EngineState, mode: MonitoringMode, reason: &str) {
        let Some(slot) = state.slot_mut(mode) else {
            return;
        };
        if !slot.state.is_running() {
            return;
        }
        slot.state = ModeState::Stopped;
        slot.generation += 1;
        self.platform.stop_updates(mode);
        warn!(mode = %mode, reason, "Monitoring halted");
    }

    fn ensure_locked(&self, state: &mut EngineState) -> bool {
        let mut started = false;

        for mode in MonitoringMode::UPDATE_MODES {
            let Some(slot) = state.slot(mode).copied() else {
                continue;
            };
            if slot.state != ModeState::Stopped
                || !(slot.requested || self.config.enables(mode))
            {
                continue;
            }
            match self.start_mode(state, mode, false) {
                Ok(mode_state) => started |= mode_state.is_running(),
                Err(error) => warn!(mode = %mode, error = %error, "Could not restart monitoring"),
            }
        }

        started | self.sync_regions(state)
    }

    fn request_authorization(&self, state: &mut EngineState) {
        if state.authorization_requested {
            return;
        }
        state.authorization_requested = true;
        let always = self.config.require_always_authorization;
        info!(always, "Requesting location authorization");
        self.platform.request_authorization(always);
    }

    // =========================================================================
    // Regions
    // =========================================================================

    /// Add a region and start monitoring it.
    ///
    /// A missing or negative `radius` means the configured `geo_radius`.
    ///
    /// # Errors
    ///
    /// Any [`RegionSet::add`] error; nothing changes in that case.
    pub fn add_region(
        &self,
        identifier: impl Into<String>,
        center: Coordinate,
        radius: Option<f64>,
    ) -> Result<MonitoredRegion> {
        let mut state = self.state.lock();
        let region = self.insert_region(&mut state, identifier.into(), center, radius)?;
        self.sync_regions(&mut state);
        Ok(region)
    }

    /// Add a region under a generated `gf_` identifier.
    ///
    /// # Errors
    ///
    /// Any [`RegionSet::add`] error.
    pub fn add_anonymous_region(
        &self,
        center: Coordinate,
        radius: Option<f64>,
    ) -> Result<MonitoredRegion> {
        self.add_region(generate_region_identifier(), center, radius)
    }

    /// Add several regions under one lock.
    ///
    /// Each request succeeds or fails independently; region monitoring is
    /// engaged at most once for the whole batch.
    pub fn add_regions(
        &self,
        requests: impl IntoIterator<Item = RegionRequest>,
    ) -> Vec<Result<MonitoredRegion>> {
        let mut state = self.state.lock();
        let results = requests
            .into_iter()
            .map(|request| {
                let identifier = request
                    .identifier
                    .unwrap_or_else(generate_region_identifier);
                self.insert_region(&mut state, identifier, request.center, request.radius)
            })
            .collect();
        self.sync_regions(&mut state);
        results
    }

    /// Stop monitoring a region and remove it.
    ///
    /// # Errors
    ///
    /// [`LocationError::NotFound`] if no such region exists.
    pub fn remove_region(&self, identifier: &str) -> Result<MonitoredRegion> {
        let mut state = self.state.lock();
        let region = state.regions.remove(identifier)?;

        if state.regions_engaged {
            self.platform.stop_monitoring_region(identifier);
        }
        if state.tracking_fence.as_deref() == Some(identifier) {
            state.tracking_fence = None;
        }
        debug!(region = identifier, "Region removed");

        self.sync_regions(&mut state);
        Ok(region)
    }

    /// Remove every region, returning them.
    pub fn clear_regions(&self) -> Vec<MonitoredRegion> {
        let mut state = self.state.lock();
        self.disengage_regions(&mut state);
        state.tracking_fence = None;
        let removed = state.regions.clear();
        debug!(count = removed.len(), "Regions cleared");
        removed
    }

    fn insert_region(
        &self,
        state: &mut EngineState,
        identifier: String,
        center: Coordinate,
        radius: Option<f64>,
    ) -> Result<MonitoredRegion> {
        let radius = radius
            .filter(|radius| *radius >= 0.0)
            .unwrap_or(self.config.geo_radius);
        let region = state.regions.add(identifier, center, radius)?.clone();

        if state.regions_engaged {
            self.platform.start_monitoring_region(&region);
        }
        debug!(region = %region.identifier, radius = region.radius, "Region added");
        Ok(region)
    }

    /// Engage or disengage region monitoring to match the set and the current
    /// authorization. Returns `true` only on a fresh engage.
    fn sync_regions(&self, state: &mut EngineState) -> bool {
        let wanted = !state.regions.is_empty();
        if wanted && state.authorization.needs_request() {
            self.request_authorization(state);
        }

        let permitted = self.platform.location_services_enabled()
            && self.platform.region_monitoring_available()
            && state.authorization.allows(MonitoringMode::Regions);

        match (wanted && permitted, state.regions_engaged) {
            (true, false) => {
                for region in state.regions.iter() {
                    self.platform.start_monitoring_region(region);
                }
                state.regions_engaged = true;
                info!(regions = state.regions.len(), "Region monitoring engaged");
                true
            }
            (false, true) => {
                self.disengage_regions(state);
                false
            }
            _ => false,
        }
    }

    fn disengage_regions(&self, state: &mut EngineState) {
        if !state.regions_engaged {
            return;
        }
        for region in state.regions.iter() {
            self.platform.stop_monitoring_region(&region.identifier);
        }
        state.regions_engaged = false;
        info!(regions = state.regions.len(), "Region monitoring disengaged");
    }

    /// Move the engine-managed tracking fence to `center`.
    fn recenter_tracking_fence(
        &self,
        state: &mut EngineState,
        center: Coordinate,
        events: &mut Vec<EngineEvent>,
    ) {
        if let Some(previous) = state.tracking_fence.take() {
            if state.regions.remove(&previous).is_ok() && state.regions_engaged {
                self.platform.stop_monitoring_region(&previous);
            }
        }

        let identifier = generate_region_identifier();
        match self.insert_region(state, identifier.clone(), center, Some(self.config.geo_radius)) {
            Ok(_) => state.tracking_fence = Some(identifier),
            Err(error) => {
                warn!(error = %error, "Could not place tracking fence");
                let message = error.to_string();
                events.push(state.record_error(error, message, None));
            }
        }

        self.sync_regions(state);
    }

    // =========================================================================
    // Platform callbacks
    // =========================================================================

    /// Normalize a batch of fixes and forward the accepted ones.
    ///
    /// Unusable fixes are skipped. Fixes older than the staleness threshold
    /// are discarded: not forwarded and not remembered. A batch with no
    /// usable fix at all produces a [`LocationError::EmptyLocation`] error.
    pub fn handle_location_update(&self, fixes: &[RawFix]) {
        let mut events = Vec::new();
        {
            let mut state = self.state.lock();
            self.accept_fixes(&mut state, fixes, &mut events);
        }
        self.dispatch(events);
    }

    fn accept_fixes(
        &self,
        state: &mut EngineState,
        fixes: &[RawFix],
        events: &mut Vec<EngineEvent>,
    ) {
        let now = self.platform.now();
        let in_background = self.platform.is_in_background();
        let threshold = self.config.stale_threshold();
        let log = self.config.log_loc_info;

        let mut usable = 0usize;
        let mut accepted = Vec::with_capacity(fixes.len());
        for fix in fixes {
            if !fix.is_usable() {
                if log {
                    debug!(
                        latitude = fix.coordinate.latitude,
                        longitude = fix.coordinate.longitude,
                        accuracy = fix.horizontal_accuracy,
                        "Skipping unusable fix"
                    );
                }
                continue;
            }
            usable += 1;

            let age = now.signed_duration_since(fix.timestamp);
            if age > threshold {
                if log {
                    debug!(
                        age_secs = age.num_seconds(),
                        threshold_secs = threshold.num_seconds(),
                        "Discarding stale fix"
                    );
                }
                continue;
            }

            let snapshot = LocationSnapshot::from_fix(fix, in_background);
            if accepted
                .last()
                .is_some_and(|previous: &LocationSnapshot| previous.same_position(&snapshot))
            {
                if log {
                    debug!(
                        latitude = fix.coordinate.latitude,
                        longitude = fix.coordinate.longitude,
                        "Skipping repeated position"
                    );
                }
                continue;
            }

            if log {
                debug!(
                    latitude = fix.coordinate.latitude,
                    longitude = fix.coordinate.longitude,
                    accuracy = fix.horizontal_accuracy,
                    in_background,
                    "Accepted fix"
                );
            }
            accepted.push(snapshot);
        }

        if usable == 0 {
            warn!(fixes = fixes.len(), "Location callback carried no usable fix");
            let error = LocationError::EmptyLocation;
            let message = error.to_string();
            events.push(state.record_error(error, message, Some(LocationSnapshot::empty(now))));
            return;
        }

        let Some(newest) = accepted
            .iter()
            .max_by_key(|snapshot| snapshot.fix_timestamp())
            .cloned()
        else {
            return;
        };

        let center = newest.coordinate();
        state.remember(newest);
        events.push(EngineEvent::DeviceUpdate {
            snapshots: accepted,
            in_background,
        });

        if self.config.use_geo_fences {
            self.recenter_tracking_fence(state, center, events);
        }
    }

    /// Forward a platform-detected visit.
    pub fn handle_visit(&self, visit: &RawVisit) {
        let mut events = Vec::new();
        {
            let mut state = self.state.lock();
            let now = self.platform.now();
            let in_background = self.platform.is_in_background();

            if visit.is_usable() {
                let snapshot = LocationSnapshot::from_visit(visit, in_background, now);
                if self.config.log_loc_info {
                    debug!(
                        latitude = visit.coordinate.latitude,
                        longitude = visit.coordinate.longitude,
                        arrival = ?visit.arrival,
                        departure = ?visit.departure,
                        "Accepted visit"
                    );
                }
                state.remember(snapshot.clone());
                events.push(EngineEvent::DeviceUpdate {
                    snapshots: vec![snapshot],
                    in_background,
                });
            } else {
                warn!(
                    arrival = ?visit.arrival,
                    departure = ?visit.departure,
                    "Visit callback carried no usable position or times"
                );
                let error = LocationError::EmptyLocation;
                let message = error.to_string();
                events.push(state.record_error(error, message, Some(LocationSnapshot::empty(now))));
            }
        }
        self.dispatch(events);
    }

    /// Forward a region enter, exit or state determination.
    ///
    /// Events for identifiers not in the set are dropped with a single
    /// [`LocationError::UnknownRegion`] error. Leaving the tracking fence
    /// moves it to the exit position.
    pub fn handle_region_transition(&self, transition: &RegionTransition) {
        let mut events = Vec::new();
        {
            let mut state = self.state.lock();
            let now = self.platform.now();
            let in_background = self.platform.is_in_background();

            if let Some(region) = state.regions.get(&transition.identifier).cloned() {
                let snapshot = LocationSnapshot::from_region(&region, transition, in_background, now);
                debug!(
                    region = %region.identifier,
                    event = ?transition.event,
                    "Region event"
                );
                let exit_position = snapshot.coordinate();
                let left_tracking_fence = self.config.use_geo_fences
                    && transition.event == RegionEvent::Exit
                    && state.tracking_fence.as_deref() == Some(region.identifier.as_str());
                events.push(EngineEvent::RegionUpdate {
                    region,
                    snapshot,
                    in_background,
                });
                if left_tracking_fence {
                    self.recenter_tracking_fence(&mut state, exit_position, &mut events);
                }
            } else {
                warn!(region = %transition.identifier, "Dropping event for unknown region");
                let error = LocationError::UnknownRegion(transition.identifier.clone());
                let message = error.to_string();
                events.push(state.record_error(error, message, None));
            }
        }
        self.dispatch(events);
    }

    /// Record a new authorization status.
    ///
    /// Modes the new status no longer permits are halted but keep their
    /// intent. If a wanted mode became permitted, [`Self::ensure_monitoring`]
    /// runs. The status is always forwarded to the delegate.
    pub fn handle_authorization_change(&self, status: AuthorizationStatus) {
        {
            let mut state = self.state.lock();
            let wanted = state.wanted_modes(&self.config);
            let newly_permitted = state.authorization.record_status_change(status, &wanted);
            if status != AuthorizationStatus::NotDetermined {
                state.authorization_requested = false;
            }

            for mode in MonitoringMode::UPDATE_MODES {
                if !state.authorization.allows(mode) {
                    self.halt_mode(&mut state, mode, "authorization revoked");
                }
            }

            info!(status = %status, newly_permitted, "Authorization changed");
            if newly_permitted {
                self.ensure_locked(&mut state);
            } else {
                self.sync_regions(&mut state);
            }
        }
        self.dispatch(vec![EngineEvent::AuthorizationChange(status)]);
    }

    /// Record and forward an asynchronous platform failure.
    ///
    /// A failure tagged with a mode and that mode's current generation halts
    /// only that mode; other modes keep running.
    pub fn handle_platform_error(&self, failure: PlatformFailure) {
        let PlatformFailure {
            message,
            mode,
            generation,
            region_identifier,
        } = failure;

        let mut events = Vec::new();
        {
            let mut state = self.state.lock();

            if let (Some(mode), Some(generation)) = (mode, generation) {
                let current = state
                    .slot(mode)
                    .is_some_and(|slot| slot.generation == generation);
                if current {
                    self.halt_mode(&mut state, mode, "platform failure");
                }
            }

            let error = LocationError::Platform {
                message: message.clone(),
                mode,
                region_identifier,
            };
            warn!(
                code = error.error_code(),
                mode = mode.map(MonitoringMode::as_str),
                message = %message,
                "Platform reported an error"
            );
            events.push(state.record_error(error, message, None));
        }
        self.dispatch(events);
    }

    fn dispatch(&self, events: Vec<EngineEvent>) {
        for event in events {
            match event {
                EngineEvent::DeviceUpdate {
                    snapshots,
                    in_background,
                } => self.delegate.on_device_update(&snapshots, in_background),
                EngineEvent::RegionUpdate {
                    region,
                    snapshot,
                    in_background,
                } => self
                    .delegate
                    .on_region_update(&region, &snapshot, in_background),
                EngineEvent::AuthorizationChange(status) => {
                    self.delegate.on_authorization_change(status);
                }
                EngineEvent::Error {
                    error,
                    message,
                    in_geo,
                } => self.delegate.on_error(Some(&error), Some(&message), in_geo),
            }
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Distance in meters from the last known location to `point`.
    #[must_use]
    pub fn distance_from_current_location(&self, point: Coordinate) -> Option<f64> {
        self.state
            .lock()
            .last_location
            .as_ref()
            .map(|last| haversine_distance(last.coordinate(), point))
    }

    /// Distance in meters from `location` to `point`.
    #[must_use]
    pub fn distance_from_location(location: &LocationSnapshot, point: Coordinate) -> f64 {
        haversine_distance(location.coordinate(), point)
    }

    /// Whether the last known location is older than the staleness threshold.
    ///
    /// `true` when nothing is known yet.
    #[must_use]
    pub fn is_location_stale(&self) -> bool {
        let last_fix = self
            .state
            .lock()
            .last_location
            .as_ref()
            .map(LocationSnapshot::fix_timestamp);
        last_fix.map_or(true, |at| self.age(at) > self.config.stale_threshold())
    }

    fn age(&self, at: DateTime<Utc>) -> chrono::TimeDelta {
        self.platform.now().signed_duration_since(at)
    }

    /// Convert a distance in the configured locale's units to meters.
    #[must_use]
    pub fn distance_in_meters(&self, distance: f64) -> f64 {
        self.config.distance_in_meters(distance)
    }

    /// Whether the configured locale uses metric units.
    #[must_use]
    pub fn is_using_metric(&self) -> bool {
        self.config.unit_system() == UnitSystem::Metric
    }

    /// Whether the host application is in the background.
    #[must_use]
    pub fn is_in_background(&self) -> bool {
        self.platform.is_in_background()
    }

    /// Whether the device-wide location switch is on.
    #[must_use]
    pub fn location_services_enabled(&self) -> bool {
        self.platform.location_services_enabled()
    }

    /// The newest accepted location, if any.
    #[must_use]
    pub fn last_location(&self) -> Option<LocationSnapshot> {
        self.state.lock().last_location.clone()
    }

    /// The most recent error, until cleared.
    #[must_use]
    pub fn last_error(&self) -> Option<LocationError> {
        self.state
            .lock()
            .last_error
            .as_ref()
            .map(|recorded| recorded.error.clone())
    }

    /// Human-readable text of the most recent error.
    #[must_use]
    pub fn last_error_message(&self) -> Option<String> {
        self.state
            .lock()
            .last_error
            .as_ref()
            .map(|recorded| recorded.message.clone())
    }

    /// Location attached to the most recent error. For
    /// [`LocationError::EmptyLocation`] this is the empty sentinel.
    #[must_use]
    pub fn last_error_location(&self) -> Option<LocationSnapshot> {
        self.state
            .lock()
            .last_error
            .as_ref()
            .and_then(|recorded| recorded.context.clone())
    }

    /// Forget the most recent error.
    pub fn clear_error(&self) {
        self.state.lock().last_error = None;
    }

    /// Current state of `mode`. Region monitoring is `Active` while engaged.
    #[must_use]
    pub fn mode_state(&self, mode: MonitoringMode) -> ModeState {
        let state = self.state.lock();
        match state.slot(mode) {
            Some(slot) => slot.state,
            None if state.regions_engaged => ModeState::Active,
            None => ModeState::Stopped,
        }
    }

    /// Generation of the latest start or stop of `mode`.
    #[must_use]
    pub fn mode_generation(&self, mode: MonitoringMode) -> Option<u64> {
        self.state.lock().slot(mode).map(|slot| slot.generation)
    }

    /// Authorization status last reported by the platform.
    #[must_use]
    pub fn authorization_status(&self) -> AuthorizationStatus {
        self.state.lock().authorization.status()
    }

    /// Number of regions in the set.
    #[must_use]
    pub fn region_count(&self) -> usize {
        self.state.lock().regions.len()
    }

    /// Copy of a region.
    #[must_use]
    pub fn region(&self, identifier: &str) -> Option<MonitoredRegion> {
        self.state.lock().regions.get(identifier).cloned()
    }

    /// Copies of every region, in insertion order.
    #[must_use]
    pub fn regions(&self) -> Vec<MonitoredRegion> {
        self.state.lock().regions.iter().cloned().collect()
    }

    /// Identifier of the engine-managed tracking fence, if one is placed.
    #[must_use]
    pub fn tracking_fence(&self) -> Option<String> {
        self.state.lock().tracking_fence.clone()
    }

    /// Whether the platform is currently monitoring the region set.
    #[must_use]
    pub fn is_region_monitoring_active(&self) -> bool {
        self.state.lock().regions_engaged
    }
}
