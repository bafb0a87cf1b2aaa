//! Geodesy helpers: great-circle distance and accuracy-weighted centroid

use chrono::{DateTime, Utc};

use crate::types::{Coordinate, EstimateMethod, LocationEstimate};
use crate::{EARTH_RADIUS_METERS, MIN_WEIGHT_ACCURACY_METERS};

/// Haversine distance between two points (meters)
pub fn haversine_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_METERS * c
}

/// Haversine distance between two coordinates (meters)
pub fn distance_meters(a: &Coordinate, b: &Coordinate) -> f64 {
    haversine_meters(a.latitude, a.longitude, b.latitude, b.longitude)
}

/// Point displaced `north_m` / `east_m` meters from (lat, lon).
/// Exact along a meridian, small-offset approximation for east.
pub fn offset_meters(lat: f64, lon: f64, north_m: f64, east_m: f64) -> (f64, f64) {
    let d_lat = (north_m / EARTH_RADIUS_METERS).to_degrees();
    let d_lon = (east_m / (EARTH_RADIUS_METERS * lat.to_radians().cos())).to_degrees();
    (lat + d_lat, lon + d_lon)
}

/// Incremental inverse-accuracy²-weighted centroid.
///
/// weight_i = 1 / accuracy_i²; the position is Σ(x·w)/Σw and the
/// reported accuracy is the plain mean of accuracies, a conservative
/// bound rather than the (tighter) weighted figure.
#[derive(Debug, Clone, Default)]
pub struct WeightedCentroid {
    sum_weight: f64,
    sum_lat: f64,
    sum_lon: f64,
    sum_accuracy: f64,
    count: usize,
    best: Option<Coordinate>,
    latest_at: Option<DateTime<Utc>>,
}

impl WeightedCentroid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one reading in, in arrival order
    pub fn push(&mut self, coord: &Coordinate) {
        let acc = coord.accuracy_meters.max(MIN_WEIGHT_ACCURACY_METERS);
        let weight = 1.0 / (acc * acc);

        self.sum_weight += weight;
        self.sum_lat += coord.latitude * weight;
        self.sum_lon += coord.longitude * weight;
        self.sum_accuracy += coord.accuracy_meters;
        self.count += 1;

        if self
            .best
            .map_or(true, |b| coord.accuracy_meters < b.accuracy_meters)
        {
            self.best = Some(*coord);
        }
        if self.latest_at.map_or(true, |t| coord.captured_at > t) {
            self.latest_at = Some(coord.captured_at);
        }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Weighted-centroid estimate, None before the first reading
    pub fn estimate(&self) -> Option<LocationEstimate> {
        let captured_at = self.latest_at?;
        if self.count == 0 || self.sum_weight <= 0.0 {
            return None;
        }
        Some(LocationEstimate {
            latitude: self.sum_lat / self.sum_weight,
            longitude: self.sum_lon / self.sum_weight,
            accuracy_meters: self.sum_accuracy / self.count as f64,
            captured_at,
            sample_count: self.count,
            method: EstimateMethod::WeightedCentroid,
        })
    }

    /// Lowest-accuracy single reading, None before the first reading
    pub fn best_of_n(&self) -> Option<LocationEstimate> {
        let best = self.best?;
        Some(LocationEstimate {
            latitude: best.latitude,
            longitude: best.longitude,
            accuracy_meters: best.accuracy_meters,
            captured_at: best.captured_at,
            sample_count: self.count,
            method: EstimateMethod::BestOfN,
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================
