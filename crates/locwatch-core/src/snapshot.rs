//! Normalized location observations.
//!
//! Every fix, visit and region event the engine accepts becomes a
//! [`LocationSnapshot`]. A snapshot has exactly one shape, carried by
//! [`SnapshotKind`], so visit and region fields can never leak onto a plain
//! fix.
//!
//! Snapshots serialize to a flat record with the field names hosts already
//! consume (`fix_timestamp`, `in_background`, `did_enter`, ...). Fields that
//! do not belong to the snapshot's shape are omitted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geo::Coordinate;
use crate::platform::{RawFix, RawVisit, RegionTransition};
use crate::region::MonitoredRegion;

/// Which kind of observation a snapshot describes.
#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotKind {
    /// A plain position fix.
    Fix,
    /// A visit, with whichever of arrival/departure the platform resolved.
    Visit {
        /// Arrival time.
        arrival: Option<DateTime<Utc>>,
        /// Departure time; absent while the visit is ongoing.
        departure: Option<DateTime<Utc>>,
    },
    /// A region boundary event.
    Region {
        /// Region the event belongs to.
        identifier: String,
        /// The device is inside the region.
        did_enter: bool,
        /// The device is outside the region.
        did_exit: bool,
    },
    /// Placeholder for "no usable location".
    Empty,
}

/// An immutable, normalized location observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "SnapshotRecord", try_from = "SnapshotRecord")]
pub struct LocationSnapshot {
    coordinate: Coordinate,
    accuracy: Option<f64>,
    speed: Option<f64>,
    course: Option<f64>,
    altitude: Option<f64>,
    fix_timestamp: DateTime<Utc>,
    in_background: bool,
    kind: SnapshotKind,
}

/// Negative readings mean "unknown" on every mobile location API.
fn valid_reading(value: f64) -> Option<f64> {
    (value.is_finite() && value >= 0.0).then_some(value)
}

impl LocationSnapshot {
    /// Normalize a raw fix.
    #[must_use]
    pub fn from_fix(fix: &RawFix, in_background: bool) -> Self {
        Self {
            coordinate: fix.coordinate,
            accuracy: valid_reading(fix.horizontal_accuracy),
            speed: valid_reading(fix.speed),
            course: valid_reading(fix.course),
            altitude: valid_reading(fix.vertical_accuracy).map(|_| fix.altitude),
            fix_timestamp: fix.timestamp,
            in_background,
            kind: SnapshotKind::Fix,
        }
    }

    /// Normalize a visit.
    ///
    /// The fix timestamp is the arrival, or the departure when the arrival is
    /// unknown, or `received_at` when neither is.
    #[must_use]
    pub fn from_visit(visit: &RawVisit, in_background: bool, received_at: DateTime<Utc>) -> Self {
        Self {
            coordinate: visit.coordinate,
            accuracy: valid_reading(visit.horizontal_accuracy),
            speed: None,
            course: None,
            altitude: None,
            fix_timestamp: visit.arrival.or(visit.departure).unwrap_or(received_at),
            in_background,
            kind: SnapshotKind::Visit {
                arrival: visit.arrival,
                departure: visit.departure,
            },
        }
    }

    /// Normalize a region transition.
    ///
    /// Position and motion come from the triggering fix when the platform
    /// supplied a usable one, otherwise the region centre stands in.
    #[must_use]
    pub fn from_region(
        region: &MonitoredRegion,
        transition: &RegionTransition,
        in_background: bool,
        received_at: DateTime<Utc>,
    ) -> Self {
        let (did_enter, did_exit) = transition.event.flags();
        let kind = SnapshotKind::Region {
            identifier: region.identifier.clone(),
            did_enter,
            did_exit,
        };

        match transition.location.as_ref().filter(|fix| fix.is_usable()) {
            Some(fix) => Self {
                kind,
                ..Self::from_fix(fix, in_background)
            },
            None => Self {
                coordinate: region.center,
                accuracy: None,
                speed: None,
                course: None,
                altitude: None,
                fix_timestamp: received_at,
                in_background,
                kind,
            },
        }
    }

    /// The "no usable location" sentinel.
    #[must_use]
    pub fn empty(at: DateTime<Utc>) -> Self {
        Self {
            coordinate: Coordinate::new(0.0, 0.0),
            accuracy: None,
            speed: None,
            course: None,
            altitude: None,
            fix_timestamp: at,
            in_background: false,
            kind: SnapshotKind::Empty,
        }
    }

    /// Position.
    #[must_use]
    pub const fn coordinate(&self) -> Coordinate {
        self.coordinate
    }

    /// Latitude in degrees.
    #[must_use]
    pub const fn latitude(&self) -> f64 {
        self.coordinate.latitude
    }

    /// Longitude in degrees.
    #[must_use]
    pub const fn longitude(&self) -> f64 {
        self.coordinate.longitude
    }

    /// Horizontal accuracy in meters.
    #[must_use]
    pub const fn accuracy(&self) -> Option<f64> {
        self.accuracy
    }

    /// Speed in meters per second.
    #[must_use]
    pub const fn speed(&self) -> Option<f64> {
        self.speed
    }

    /// Course in degrees.
    #[must_use]
    pub const fn course(&self) -> Option<f64> {
        self.course
    }

    /// Altitude in meters.
    #[must_use]
    pub const fn altitude(&self) -> Option<f64> {
        self.altitude
    }

    /// When the observation was made.
    #[must_use]
    pub const fn fix_timestamp(&self) -> DateTime<Utc> {
        self.fix_timestamp
    }

    /// Whether the app was in the background when the observation arrived.
    #[must_use]
    pub const fn in_background(&self) -> bool {
        self.in_background
    }

    /// Shape of the observation.
    #[must_use]
    pub const fn kind(&self) -> &SnapshotKind {
        &self.kind
    }

    /// Visit arrival time.
    #[must_use]
    pub const fn arrival(&self) -> Option<DateTime<Utc>> {
        match &self.kind {
            SnapshotKind::Visit { arrival, .. } => *arrival,
            _ => None,
        }
    }

    /// Visit departure time.
    #[must_use]
    pub const fn departure(&self) -> Option<DateTime<Utc>> {
        match &self.kind {
            SnapshotKind::Visit { departure, .. } => *departure,
            _ => None,
        }
    }

    /// Whether a region event reports the device inside.
    #[must_use]
    pub const fn did_enter(&self) -> Option<bool> {
        match &self.kind {
            SnapshotKind::Region { did_enter, .. } => Some(*did_enter),
            _ => None,
        }
    }

    /// Whether a region event reports the device outside.
    #[must_use]
    pub const fn did_exit(&self) -> Option<bool> {
        match &self.kind {
            SnapshotKind::Region { did_exit, .. } => Some(*did_exit),
            _ => None,
        }
    }

    /// Identifier of the region a region event belongs to.
    #[must_use]
    pub fn region_identifier(&self) -> Option<&str> {
        match &self.kind {
            SnapshotKind::Region { identifier, .. } => Some(identifier),
            _ => None,
        }
    }

    /// Whether this is the empty sentinel.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self.kind, SnapshotKind::Empty)
    }

    /// Whether both snapshots report exactly the same position.
    #[must_use]
    pub fn same_position(&self, other: &Self) -> bool {
        self.coordinate == other.coordinate
    }

    /// Flatten into the wire record.
    #[must_use]
    pub fn to_record(&self) -> SnapshotRecord {
        self.clone().into()
    }
}

/// Flat representation of a snapshot, as hosts exchange it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    /// Longitude in degrees.
    pub longitude: f64,
    /// Latitude in degrees.
    pub latitude: f64,
    /// Horizontal accuracy; `-1` marks the empty sentinel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    /// Speed in meters per second.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    /// Course in degrees.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course: Option<f64>,
    /// Altitude in meters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    /// Observation time (RFC 3339).
    pub fix_timestamp: DateTime<Utc>,
    /// Delivered while the app was in the background.
    #[serde(default)]
    pub in_background: bool,
    /// Visit arrival.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arrival: Option<DateTime<Utc>>,
    /// Visit departure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub departure: Option<DateTime<Utc>>,
    /// Region entered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub did_enter: Option<bool>,
    /// Region exited.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub did_exit: Option<bool>,
    /// Region identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region_identifier: Option<String>,
}

/// Reasons a record cannot become a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotRecordError {
    /// Visit and region fields are both set.
    #[error("record mixes visit and region fields")]
    MixedShapes,

    /// Region flags without the region they belong to.
    #[error("record has region flags but no region_identifier")]
    MissingRegionIdentifier,

    /// Latitude or longitude out of range.
    #[error("record coordinate is out of range")]
    InvalidCoordinate,
}

impl From<LocationSnapshot> for SnapshotRecord {
    fn from(snapshot: LocationSnapshot) -> Self {
        let mut record = Self {
            longitude: snapshot.coordinate.longitude,
            latitude: snapshot.coordinate.latitude,
            accuracy: snapshot.accuracy,
            speed: snapshot.speed,
            course: snapshot.course,
            altitude: snapshot.altitude,
            fix_timestamp: snapshot.fix_timestamp,
            in_background: snapshot.in_background,
            arrival: None,
            departure: None,
            did_enter: None,
            did_exit: None,
            region_identifier: None,
        };

        match snapshot.kind {
            SnapshotKind::Fix => {}
            SnapshotKind::Visit { arrival, departure } => {
                record.arrival = arrival;
                record.departure = departure;
            }
            SnapshotKind::Region {
                identifier,
                did_enter,
                did_exit,
            } => {
                record.region_identifier = Some(identifier);
                record.did_enter = Some(did_enter);
                record.did_exit = Some(did_exit);
            }
            SnapshotKind::Empty => {
                record.accuracy = Some(-1.0);
                record.speed = Some(-1.0);
                record.course = Some(-1.0);
            }
        }

        record
    }
}

impl TryFrom<SnapshotRecord> for LocationSnapshot {
    type Error = SnapshotRecordError;

    fn try_from(record: SnapshotRecord) -> Result<Self, Self::Error> {
        let coordinate = Coordinate::new(record.latitude, record.longitude);
        if !coordinate.is_valid() {
            return Err(SnapshotRecordError::InvalidCoordinate);
        }

        let is_visit = record.arrival.is_some() || record.departure.is_some();
        let has_region_flags = record.did_enter.is_some() || record.did_exit.is_some();
        let is_region = record.region_identifier.is_some() || has_region_flags;

        if is_visit && is_region {
            return Err(SnapshotRecordError::MixedShapes);
        }

        let kind = if is_visit {
            SnapshotKind::Visit {
                arrival: record.arrival,
                departure: record.departure,
            }
        } else if is_region {
            SnapshotKind::Region {
                identifier: record
                    .region_identifier
                    .ok_or(SnapshotRecordError::MissingRegionIdentifier)?,
                did_enter: record.did_enter.unwrap_or(false),
                did_exit: record.did_exit.unwrap_or(false),
            }
        } else if record.accuracy.is_some_and(|a| a < 0.0) {
            SnapshotKind::Empty
        } else {
            SnapshotKind::Fix
        };

        if matches!(kind, SnapshotKind::Empty) {
            return Ok(Self {
                in_background: record.in_background,
                ..Self::empty(record.fix_timestamp)
            });
        }

        Ok(Self {
            coordinate,
            accuracy: record.accuracy.and_then(valid_reading),
            speed: record.speed.and_then(valid_reading),
            course: record.course.and_then(valid_reading),
            altitude: record.altitude,
            fix_timestamp: record.fix_timestamp,
            in_background: record.in_background,
            kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{RegionEvent, RegionState};

    fn ts(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    fn fix() -> RawFix {
        RawFix::new(Coordinate::new(-33.8, 151.2), ts("2025-01-15T03:30:00Z"))
            .with_accuracy(8.0)
            .with_motion(1.5, 270.0)
            .with_altitude(42.0, 3.0)
    }

    fn home() -> MonitoredRegion {
        MonitoredRegion {
            identifier: "home".into(),
            center: Coordinate::new(-33.81, 151.21),
            radius: 20.0,
        }
    }

    #[test]
    fn test_fix_snapshot_has_only_fix_shape() {
        let snapshot = LocationSnapshot::from_fix(&fix(), true);
        assert_eq!(snapshot.accuracy(), Some(8.0));
        assert_eq!(snapshot.speed(), Some(1.5));
        assert_eq!(snapshot.course(), Some(270.0));
        assert_eq!(snapshot.altitude(), Some(42.0));
        assert!(snapshot.in_background());
        assert!(snapshot.arrival().is_none());
        assert!(snapshot.departure().is_none());
        assert!(snapshot.did_enter().is_none());
        assert!(snapshot.region_identifier().is_none());
    }

    #[test]
    fn test_invalid_readings_become_none() {
        let raw = RawFix::new(Coordinate::new(1.0, 2.0), ts("2025-01-15T03:30:00Z"));
        let snapshot = LocationSnapshot::from_fix(&raw, false);
        assert_eq!(snapshot.speed(), None);
        assert_eq!(snapshot.course(), None);
        assert_eq!(snapshot.altitude(), None);
    }

    #[test]
    fn test_visit_without_departure_carries_only_arrival() {
        let visit = RawVisit {
            coordinate: Coordinate::new(-33.8, 151.2),
            horizontal_accuracy: 30.0,
            arrival: Some(ts("2025-01-15T03:00:00Z")),
            departure: None,
        };
        let snapshot = LocationSnapshot::from_visit(&visit, false, ts("2025-01-15T04:00:00Z"));
        assert_eq!(snapshot.arrival(), Some(ts("2025-01-15T03:00:00Z")));
        assert_eq!(snapshot.departure(), None);
        assert_eq!(snapshot.fix_timestamp(), ts("2025-01-15T03:00:00Z"));
        assert!(snapshot.did_exit().is_none());
    }

    #[test]
    fn test_visit_timestamp_falls_back_to_departure_then_receipt() {
        let mut visit = RawVisit {
            coordinate: Coordinate::new(-33.8, 151.2),
            horizontal_accuracy: 30.0,
            arrival: None,
            departure: Some(ts("2025-01-15T05:00:00Z")),
        };
        let received = ts("2025-01-15T06:00:00Z");
        assert_eq!(
            LocationSnapshot::from_visit(&visit, false, received).fix_timestamp(),
            ts("2025-01-15T05:00:00Z")
        );
        visit.departure = None;
        assert_eq!(
            LocationSnapshot::from_visit(&visit, false, received).fix_timestamp(),
            received
        );
    }

    #[test]
    fn test_region_snapshot_uses_triggering_fix() {
        let transition = RegionTransition {
            identifier: "home".into(),
            event: RegionEvent::Enter,
            location: Some(fix()),
        };
        let snapshot =
            LocationSnapshot::from_region(&home(), &transition, true, ts("2025-01-15T04:00:00Z"));
        assert_eq!(snapshot.did_enter(), Some(true));
        assert_eq!(snapshot.did_exit(), Some(false));
        assert_eq!(snapshot.region_identifier(), Some("home"));
        assert_eq!(snapshot.coordinate(), fix().coordinate);
        assert_eq!(snapshot.fix_timestamp(), fix().timestamp);
        assert!(snapshot.arrival().is_none());
    }

    #[test]
    fn test_region_snapshot_without_fix_uses_center() {
        let transition = RegionTransition {
            identifier: "home".into(),
            event: RegionEvent::Determined(RegionState::Outside),
            location: None,
        };
        let received = ts("2025-01-15T04:00:00Z");
        let snapshot = LocationSnapshot::from_region(&home(), &transition, false, received);
        assert_eq!(snapshot.coordinate(), home().center);
        assert_eq!(snapshot.fix_timestamp(), received);
        assert_eq!(snapshot.did_exit(), Some(true));
    }

    #[test]
    fn test_region_record_serialization() {
        let transition = RegionTransition {
            identifier: "home".into(),
            event: RegionEvent::Exit,
            location: None,
        };
        let snapshot =
            LocationSnapshot::from_region(&home(), &transition, false, ts("2025-01-15T04:00:00Z"));
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["region_identifier"], "home");
        assert_eq!(json["did_exit"], true);
        assert_eq!(json["did_enter"], false);
        assert_eq!(json["fix_timestamp"], "2025-01-15T04:00:00Z");
        assert!(json.get("arrival").is_none());
        assert!(json.get("accuracy").is_none());
    }

    #[test]
    fn test_empty_sentinel_survives_serialization() {
        let empty = LocationSnapshot::empty(ts("2025-01-15T04:00:00Z"));
        assert!(empty.is_empty());
        let json = serde_json::to_string(&empty).unwrap();
        assert!(json.contains("\"accuracy\":-1.0"));

        let parsed: LocationSnapshot = serde_json::from_str(&json).unwrap();
        assert!(parsed.is_empty());
        assert_eq!(parsed.accuracy(), None);
    }

    #[test]
    fn test_record_with_mixed_shapes_is_rejected() {
        let json = r#"{
            "longitude": 151.2, "latitude": -33.8,
            "fix_timestamp": "2025-01-15T04:00:00Z",
            "arrival": "2025-01-15T03:00:00Z",
            "region_identifier": "home"
        }"#;
        assert!(serde_json::from_str::<LocationSnapshot>(json).is_err());
    }

    #[test]
    fn test_record_with_flags_but_no_identifier_is_rejected() {
        let record = SnapshotRecord {
            did_enter: Some(true),
            region_identifier: None,
            ..LocationSnapshot::from_fix(&fix(), false).to_record()
        };
        assert_eq!(
            LocationSnapshot::try_from(record).unwrap_err(),
            SnapshotRecordError::MissingRegionIdentifier
        );
    }

    #[test]
    fn test_fix_record_parses_from_host_dictionary() {
        let json = r#"{
            "longitude": 151.2, "latitude": -33.8, "accuracy": 5.0,
            "fix_timestamp": "2025-01-15T04:00:00Z", "in_background": true
        }"#;
        let snapshot: LocationSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.kind(), &SnapshotKind::Fix);
        assert!(snapshot.in_background());
        assert_eq!(snapshot.accuracy(), Some(5.0));
    }

    #[test]
    fn test_same_position() {
        let a = LocationSnapshot::from_fix(&fix(), false);
        let b = LocationSnapshot::from_fix(&fix().with_accuracy(100.0), true);
        assert!(a.same_position(&b));
        assert!(!a.same_position(&LocationSnapshot::empty(fix().timestamp)));
    }
}
