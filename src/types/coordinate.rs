//! Location readings and converged estimates

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::APPROXIMATE_ACCURACY_METERS;

/// One location reading as reported by a device
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
    /// Radius of uncertainty (meters). Lower is better, never negative.
    pub accuracy_meters: f64,
    pub captured_at: DateTime<Utc>,
}

impl Coordinate {
    /// Build a reading, rejecting impossible values.
    /// Returns None for NaN, out-of-range lat/lon or negative accuracy.
    pub fn new(
        latitude: f64,
        longitude: f64,
        accuracy_meters: f64,
        captured_at: DateTime<Utc>,
    ) -> Option<Self> {
        let coord = Self {
            latitude,
            longitude,
            accuracy_meters,
            captured_at,
        };
        coord.is_valid().then_some(coord)
    }

    /// Check the coordinate invariants
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.accuracy_meters.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
            && self.accuracy_meters >= 0.0
    }
}

/// How an estimate was derived from its readings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimateMethod {
    /// A single reading met the desired accuracy
    SingleFix,
    /// Lowest-accuracy reading out of N
    BestOfN,
    /// Inverse-accuracy²-weighted centroid of all readings
    WeightedCentroid,
}

impl std::fmt::Display for EstimateMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::SingleFix => "single-fix",
            Self::BestOfN => "best-of-n",
            Self::WeightedCentroid => "weighted-centroid",
        };
        write!(f, "{}", name)
    }
}

/// Converged location. Immutable once produced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationEstimate {
    pub latitude: f64,
    pub longitude: f64,
    /// Conservative bound: mean of observed accuracies for centroids
    pub accuracy_meters: f64,
    /// Timestamp of the newest reading that contributed
    pub captured_at: DateTime<Utc>,
    pub sample_count: usize,
    pub method: EstimateMethod,
}

impl LocationEstimate {
    /// View the estimate as a plain coordinate
    pub fn coordinate(&self) -> Coordinate {
        Coordinate {
            latitude: self.latitude,
            longitude: self.longitude,
            accuracy_meters: self.accuracy_meters,
            captured_at: self.captured_at,
        }
    }
}

/// Progress classification of a single reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccuracyTier {
    /// Worse than 100 m
    Approximate,
    /// Usable but above the desired accuracy
    Improving,
    /// At or below the desired accuracy
    High,
}

impl AccuracyTier {
    pub fn classify(accuracy_meters: f64, desired_accuracy_meters: f64) -> Self {
        if accuracy_meters <= desired_accuracy_meters {
            Self::High
        } else if accuracy_meters > APPROXIMATE_ACCURACY_METERS {
            Self::Approximate
        } else {
            Self::Improving
        }
    }

    /// Short progress message for a UI
    pub fn message(&self) -> &'static str {
        match self {
            Self::Approximate => "Getting approximate location",
            Self::Improving => "Improving location accuracy",
            Self::High => "High accuracy achieved",
        }
    }
}
