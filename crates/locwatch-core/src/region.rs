//! Bounded set of monitored circular regions.
//!
//! The platform can only watch a fixed number of regions at once, so the set
//! refuses inserts past its capacity instead of evicting older regions.

use serde::{Deserialize, Serialize};

use crate::error::{LocationError, Result};
use crate::geo::Coordinate;

/// Smallest radius the set accepts, in meters.
pub const MIN_REGION_RADIUS_METERS: f64 = 1.0;

/// Prefix of generated region identifiers.
pub const GENERATED_REGION_PREFIX: &str = "gf_";

/// A circular region being monitored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoredRegion {
    /// Identifier, unique within the set.
    pub identifier: String,
    /// Centre of the circle.
    pub center: Coordinate,
    /// Radius in meters.
    pub radius: f64,
}

/// Generate an identifier for a region added without one.
#[must_use]
pub fn generate_region_identifier() -> String {
    format!("{GENERATED_REGION_PREFIX}{}", uuid::Uuid::new_v4())
}

/// Capacity-bounded collection of regions keyed by identifier.
///
/// Iteration follows insertion order.
#[derive(Debug, Clone)]
pub struct RegionSet {
    regions: Vec<MonitoredRegion>,
    capacity: usize,
    max_radius: f64,
}

impl RegionSet {
    /// Create an empty set.
    ///
    /// `max_radius` is raised to [`MIN_REGION_RADIUS_METERS`] if smaller.
    #[must_use]
    pub fn new(capacity: usize, max_radius: f64) -> Self {
        Self {
            regions: Vec::with_capacity(capacity),
            capacity,
            max_radius: max_radius.max(MIN_REGION_RADIUS_METERS),
        }
    }

    /// Insert a region.
    ///
    /// The radius is clamped into `[MIN_REGION_RADIUS_METERS, max_radius]`.
    ///
    /// # Errors
    ///
    /// - [`LocationError::InvalidRegion`] for an empty identifier, an invalid
    ///   centre or a non-finite radius
    /// - [`LocationError::DuplicateIdentifier`] if the identifier is present
    /// - [`LocationError::CapacityExceeded`] if the set is full
    pub fn add(
        &mut self,
        identifier: impl Into<String>,
        center: Coordinate,
        radius: f64,
    ) -> Result<&MonitoredRegion> {
        let identifier = identifier.into();
        if identifier.trim().is_empty() {
            return Err(LocationError::InvalidRegion(
                "identifier cannot be empty".into(),
            ));
        }
        if !center.is_valid() {
            return Err(LocationError::InvalidRegion(format!(
                "center ({}, {}) is out of range",
                center.latitude, center.longitude
            )));
        }
        if !radius.is_finite() {
            return Err(LocationError::InvalidRegion(format!(
                "radius {radius} is not a number of meters"
            )));
        }
        if self.contains(&identifier) {
            return Err(LocationError::DuplicateIdentifier(identifier));
        }
        if self.regions.len() >= self.capacity {
            return Err(LocationError::CapacityExceeded {
                capacity: self.capacity,
            });
        }

        self.regions.push(MonitoredRegion {
            identifier,
            center,
            radius: radius.clamp(MIN_REGION_RADIUS_METERS, self.max_radius),
        });
        Ok(&self.regions[self.regions.len() - 1])
    }

    /// Remove a region.
    ///
    /// # Errors
    ///
    /// Returns [`LocationError::NotFound`] if the identifier is absent. Removing
    /// twice is reported, not ignored.
    pub fn remove(&mut self, identifier: &str) -> Result<MonitoredRegion> {
        let index = self
            .regions
            .iter()
            .position(|r| r.identifier == identifier)
            .ok_or_else(|| LocationError::NotFound(identifier.to_string()))?;
        Ok(self.regions.remove(index))
    }

    /// Remove every region, returning them.
    pub fn clear(&mut self) -> Vec<MonitoredRegion> {
        std::mem::take(&mut self.regions)
    }

    /// Whether a region with this identifier is present.
    #[must_use]
    pub fn contains(&self, identifier: &str) -> bool {
        self.get(identifier).is_some()
    }

    /// Look up a region.
    #[must_use]
    pub fn get(&self, identifier: &str) -> Option<&MonitoredRegion> {
        self.regions.iter().find(|r| r.identifier == identifier)
    }

    /// Number of regions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Maximum number of regions.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Regions in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &MonitoredRegion> {
        self.regions.iter()
    }
}
