//! End-to-end scenarios driven through the public engine API.

use std::sync::Arc;
use std::thread;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;

use locwatch_core::{
    Activation, AuthorizationStatus, Coordinate, LocationDelegate, LocationEngine, LocationError,
    LocationPlatform, LocationSnapshot, ModeState, MonitorConfig, MonitoredRegion, MonitoringMode,
    RawFix, RegionEvent, RegionRequest, RegionTransition, SnapshotRecord, UpdateSettings,
};

const HOME: Coordinate = Coordinate::new(51.5007, -0.1246);
const OFFICE: Coordinate = Coordinate::new(51.5155, -0.0922);

fn clock() -> DateTime<Utc> {
    "2025-06-01T09:00:00Z".parse().unwrap()
}

/// Platform that grants whatever status it was built with.
struct StubPlatform {
    status: AuthorizationStatus,
    max_regions: usize,
    requests: Mutex<Vec<bool>>,
}

impl StubPlatform {
    fn new(status: AuthorizationStatus) -> Arc<Self> {
        Arc::new(Self {
            status,
            max_regions: 20,
            requests: Mutex::new(Vec::new()),
        })
    }
}

impl LocationPlatform for StubPlatform {
    fn authorization_status(&self) -> AuthorizationStatus {
        self.status
    }

    fn request_authorization(&self, always: bool) {
        self.requests.lock().push(always);
    }

    fn significant_change_monitoring_available(&self) -> bool {
        true
    }

    fn max_monitored_regions(&self) -> usize {
        self.max_regions
    }

    fn start_updates(&self, _: MonitoringMode, _: &UpdateSettings, _: u64) -> Activation {
        Activation::Immediate
    }

    fn stop_updates(&self, _: MonitoringMode) {}

    fn start_monitoring_region(&self, _: &MonitoredRegion) {}

    fn stop_monitoring_region(&self, _: &str) {}

    fn now(&self) -> DateTime<Utc> {
        clock()
    }
}

#[derive(Default)]
struct Recorder {
    updates: Mutex<Vec<Vec<SnapshotRecord>>>,
    regions: Mutex<Vec<SnapshotRecord>>,
    statuses: Mutex<Vec<AuthorizationStatus>>,
    errors: Mutex<Vec<(String, bool)>>,
}

impl LocationDelegate for Recorder {
    fn on_device_update(&self, snapshots: &[LocationSnapshot], _in_background: bool) {
        self.updates
            .lock()
            .push(snapshots.iter().map(LocationSnapshot::to_record).collect());
    }

    fn on_region_update(&self, _: &MonitoredRegion, snapshot: &LocationSnapshot, _: bool) {
        self.regions.lock().push(snapshot.to_record());
    }

    fn on_authorization_change(&self, status: AuthorizationStatus) {
        self.statuses.lock().push(status);
    }

    fn on_error(&self, error: Option<&LocationError>, _message: Option<&str>, in_geo: bool) {
        let code = error.map_or("NONE", LocationError::error_code);
        self.errors.lock().push((code.to_string(), in_geo));
    }
}

fn config() -> MonitorConfig {
    MonitorConfig {
        use_geo_fences: false,
        ..MonitorConfig::default()
    }
}

fn fix(coordinate: Coordinate, age_secs: i64) -> RawFix {
    RawFix::new(coordinate, clock() - TimeDelta::seconds(age_secs))
        .with_accuracy(8.0)
        .with_motion(1.4, 90.0)
}

#[test]
fn test_background_monitoring_after_authorization_prompt() {
    let platform = StubPlatform::new(AuthorizationStatus::NotDetermined);
    let recorder = Arc::new(Recorder::default());
    let engine = LocationEngine::new(config(), platform.clone(), recorder.clone()).unwrap();

    assert_eq!(engine.start_background_monitoring(false).unwrap(), ModeState::Stopped);
    assert_eq!(*platform.requests.lock(), vec![true]);
    assert!(engine.last_error().is_none());

    engine.handle_authorization_change(AuthorizationStatus::AuthorizedAlways);

    assert_eq!(
        engine.mode_state(MonitoringMode::SignificantChange),
        ModeState::Active
    );
    assert_eq!(
        *recorder.statuses.lock(),
        vec![AuthorizationStatus::AuthorizedAlways]
    );
}

#[test]
fn test_fix_records_carry_wire_fields() {
    let platform = StubPlatform::new(AuthorizationStatus::AuthorizedAlways);
    let recorder = Arc::new(Recorder::default());
    let engine = LocationEngine::new(config(), platform, recorder.clone()).unwrap();

    engine.handle_location_update(&[fix(HOME, 20), fix(OFFICE, 2000)]);

    let updates = recorder.updates.lock().clone();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].len(), 1);

    let json = serde_json::to_value(&updates[0][0]).unwrap();
    assert_eq!(json["latitude"], 51.5007);
    assert_eq!(json["speed"], 1.4);
    assert!(json.get("did_enter").is_none());
}

#[test]
fn test_region_lifecycle_and_events() {
    let platform = StubPlatform::new(AuthorizationStatus::AuthorizedAlways);
    let recorder = Arc::new(Recorder::default());
    let engine = LocationEngine::new(config(), platform, recorder.clone()).unwrap();

    let results = engine.add_regions([
        RegionRequest::named("home", HOME),
        RegionRequest {
            identifier: None,
            center: OFFICE,
            radius: Some(250.0),
        },
    ]);
    assert!(results.iter().all(Result::is_ok));
    assert!(engine.is_region_monitoring_active());

    engine.handle_region_transition(&RegionTransition {
        identifier: "home".into(),
        event: RegionEvent::Exit,
        location: Some(fix(HOME, 1)),
    });
    engine.handle_region_transition(&RegionTransition {
        identifier: "gym".into(),
        event: RegionEvent::Enter,
        location: None,
    });

    let regions = recorder.regions.lock().clone();
    assert_eq!(regions.len(), 1);
    assert_eq!(regions[0].did_exit, Some(true));
    assert_eq!(
        *recorder.errors.lock(),
        vec![("UNKNOWN_REGION".to_string(), true)]
    );

    assert_eq!(engine.clear_regions().len(), 2);
    assert!(!engine.is_region_monitoring_active());
}

#[test]
fn test_empty_batch_reports_error_only() {
    let platform = StubPlatform::new(AuthorizationStatus::AuthorizedAlways);
    let recorder = Arc::new(Recorder::default());
    let engine = LocationEngine::new(config(), platform, recorder.clone()).unwrap();

    engine.handle_location_update(&[]);

    assert!(recorder.updates.lock().is_empty());
    assert_eq!(
        *recorder.errors.lock(),
        vec![("EMPTY_LOCATION".to_string(), false)]
    );
}

#[test]
fn test_concurrent_adds_respect_capacity() {
    let platform = Arc::new(StubPlatform {
        status: AuthorizationStatus::AuthorizedAlways,
        max_regions: 8,
        requests: Mutex::new(Vec::new()),
    });
    let engine = Arc::new(
        LocationEngine::new(config(), platform, Arc::new(Recorder::default())).unwrap(),
    );

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                (0..5)
                    .filter(|i| {
                        engine
                            .add_region(format!("w{worker}-{i}"), HOME, None)
                            .is_ok()
                    })
                    .count()
            })
        })
        .collect();

    let added: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(added, 8);
    assert_eq!(engine.region_count(), 8);
}
