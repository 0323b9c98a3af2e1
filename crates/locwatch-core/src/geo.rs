//! Distance and unit conversion helpers.
//!
//! Everything here is a pure function over [`Coordinate`] values. Distances are
//! great-circle distances on a sphere with the WGS84 equatorial radius.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Earth radius used for great-circle distances, in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_378_137.0;

/// Meters in one statute mile.
pub const METERS_PER_MILE: f64 = 1609.344;

/// Meters in one kilometre.
pub const METERS_PER_KM: f64 = 1000.0;

/// Regions that still use imperial distances.
const IMPERIAL_REGIONS: [&str; 3] = ["US", "LR", "MM"];

/// Locale identifiers: language, optional script, optional region.
/// Accepts both `_` and `-` as separators (`en_US`, `zh-Hans-CN`, `es-419`).
static LOCALE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<lang>[A-Za-z]{2,3})(?:[_-](?P<script>[A-Za-z]{4}))?(?:[_-](?P<region>[A-Za-z]{2}|[0-9]{3}))?(?:[_.@-].*)?$")
        .expect("locale regex is valid")
});

/// A WGS84 position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Latitude in degrees, -90 to 90.
    pub latitude: f64,
    /// Longitude in degrees, -180 to 180.
    pub longitude: f64,
}

impl Coordinate {
    /// Create a coordinate from latitude and longitude in degrees.
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Whether both components are finite and within their valid ranges.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Measurement system used for caller-facing distances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitSystem {
    /// Distances in kilometres.
    Metric,
    /// Distances in miles.
    Imperial,
}

impl UnitSystem {
    /// Pick the unit system for a locale identifier.
    #[must_use]
    pub fn for_locale(locale: &str) -> Self {
        if is_using_metric(locale) {
            Self::Metric
        } else {
            Self::Imperial
        }
    }

    /// Meters in one unit of this system.
    #[must_use]
    pub const fn meters_per_unit(self) -> f64 {
        match self {
            Self::Metric => METERS_PER_KM,
            Self::Imperial => METERS_PER_MILE,
        }
    }
}

/// Convert a distance in locale units (kilometres or miles) to meters.
#[must_use]
pub fn distance_in_meters(distance: f64, from_unit: UnitSystem) -> f64 {
    distance * from_unit.meters_per_unit()
}

/// Convert meters to locale units (kilometres or miles).
#[must_use]
pub fn meters_to_unit(meters: f64, unit: UnitSystem) -> f64 {
    meters / unit.meters_per_unit()
}

/// Great-circle distance between two points, in meters.
///
/// Uses the haversine formula, which stays accurate for the short distances
/// geofencing cares about.
///
/// # Example
///
/// ```
/// use locwatch_core::geo::{haversine_distance, Coordinate};
///
/// let sydney = Coordinate::new(-33.8688, 151.2093);
/// let melbourne = Coordinate::new(-37.8136, 144.9631);
/// let d = haversine_distance(sydney, melbourne);
/// assert!((d - 714_000.0).abs() < 5_000.0);
/// ```
#[must_use]
pub fn haversine_distance(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let delta_lat = (b.latitude - a.latitude).to_radians();
    let delta_lon = (b.longitude - a.longitude).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);
    // Rounding can push h a hair past 1.0 for antipodal points.
    let c = 2.0 * h.clamp(0.0, 1.0).sqrt().asin();

    EARTH_RADIUS_METERS * c
}

/// Whether a locale identifier uses metric distances.
///
/// Only the region subtag matters. A locale without a region (or one that does
/// not parse) is treated as metric.
#[must_use]
pub fn is_using_metric(locale: &str) -> bool {
    LOCALE_REGEX
        .captures(locale.trim())
        .and_then(|caps| caps.name("region"))
        .map_or(true, |region| {
            let region = region.as_str().to_ascii_uppercase();
            !IMPERIAL_REGIONS.contains(&region.as_str())
        })
}
