//! Integration tests for geolocation sampling
//!
//! Scripted providers stand in for device GPS; budgets are short real
//! durations so every test finishes well under a second.

use std::time::Duration;

use rollcall::config::{ConvergenceStrategy, GeolocationConfig};
use rollcall::core::sampler::sample;
use rollcall::core::{distance_meters, offset_meters, GeolocationSampler};
use rollcall::sensors::{ProviderFailure, ScriptStep, ScriptedLocationProvider};
use rollcall::types::{EstimateMethod, LocationError};

const LAT: f64 = 12.9716;
const LON: f64 = 77.5946;

#[tokio::test]
async fn test_centroid_stays_inside_reading_hull() {
    // Square of readings 40 m around the true position
    let mut steps = Vec::new();
    for (north, east, acc) in [(40.0, 40.0, 30.0), (-40.0, 40.0, 12.0), (-40.0, -40.0, 20.0), (40.0, -40.0, 45.0)] {
        let (lat, lon) = offset_meters(LAT, LON, north, east);
        steps.push(ScriptStep::fix(lat, lon, acc));
    }
    let provider = ScriptedLocationProvider::new(steps.clone()).closing_when_done();

    let est = sample(&provider, Duration::from_secs(2), 5.0, 10).await.unwrap();

    let lats: Vec<f64> = steps
        .iter()
        .filter_map(|s| match s {
            ScriptStep::Fix { latitude, .. } => Some(*latitude),
            _ => None,
        })
        .collect();
    let lons: Vec<f64> = steps
        .iter()
        .filter_map(|s| match s {
            ScriptStep::Fix { longitude, .. } => Some(*longitude),
            _ => None,
        })
        .collect();
    let min = |v: &[f64]| v.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = |v: &[f64]| v.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

    assert_eq!(est.method, EstimateMethod::WeightedCentroid);
    assert_eq!(est.sample_count, 4);
    assert!(est.latitude >= min(&lats) && est.latitude <= max(&lats));
    assert!(est.longitude >= min(&lons) && est.longitude <= max(&lons));
    // Mean of accuracies, not the weighted figure
    assert!((est.accuracy_meters - 26.75).abs() < 1e-9);
    // Pulled toward the 12 m reading (south-east corner)
    assert!(est.latitude < LAT && est.longitude > LON);
}

#[tokio::test]
async fn test_precise_fix_short_circuits_sampling() {
    let provider = ScriptedLocationProvider::new(vec![
        ScriptStep::fix(LAT + 0.001, LON, 80.0),
        ScriptStep::fix(LAT, LON, 4.0),
        ScriptStep::fix(LAT + 0.002, LON, 90.0),
    ]);
    let sampler = GeolocationSampler::from_config(&GeolocationConfig::default());

    let started = std::time::Instant::now();
    let est = sampler.sample(&provider).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(est.method, EstimateMethod::SingleFix);
    assert_eq!(est.latitude, LAT);
    assert_eq!(est.sample_count, 2);
    assert_eq!(provider.active_subscriptions(), 0);
}

#[tokio::test]
async fn test_slow_provider_returns_best_so_far_at_budget() {
    let provider = ScriptedLocationProvider::new(vec![
        ScriptStep::fix(LAT, LON, 30.0),
        ScriptStep::fix_after(LAT, LON, 2.0, Duration::from_secs(10)),
    ]);

    let est = sample(&provider, Duration::from_millis(150), 5.0, 10).await.unwrap();
    assert_eq!(est.accuracy_meters, 30.0);
    assert_eq!(est.sample_count, 1);
    assert_eq!(provider.active_subscriptions(), 0);
}

#[tokio::test]
async fn test_fallback_to_network_location() {
    let provider = ScriptedLocationProvider::new(vec![ScriptStep::fail(ProviderFailure::PositionUnavailable(
        "gps cold".to_string(),
    ))])
    .with_low_accuracy(vec![ScriptStep::fix(LAT, LON, 60.0), ScriptStep::fix(LAT, LON, 40.0)])
    .closing_when_done();

    let est = sample(&provider, Duration::from_secs(2), 5.0, 10).await.unwrap();
    assert_eq!(est.sample_count, 2);
    assert_eq!(est.accuracy_meters, 50.0);
    assert_eq!(provider.total_subscriptions(), 2);
}

#[tokio::test]
async fn test_best_of_n_from_config() {
    let config = GeolocationConfig {
        time_budget_ms: 2_000,
        strategy: ConvergenceStrategy::BestOfN,
        max_samples: 3,
        ..GeolocationConfig::default()
    };
    let provider = ScriptedLocationProvider::new(vec![
        ScriptStep::fix(LAT + 0.001, LON, 50.0),
        ScriptStep::fix(LAT, LON, 9.0),
        ScriptStep::fix(LAT + 0.002, LON, 70.0),
    ]);

    let est = GeolocationSampler::from_config(&config).sample(&provider).await.unwrap();
    assert_eq!(est.method, EstimateMethod::BestOfN);
    assert_eq!(est.accuracy_meters, 9.0);
    assert_eq!(est.sample_count, 3);
}

#[tokio::test]
async fn test_denied_and_silent_providers() {
    let denied = sample(&ScriptedLocationProvider::denied(), Duration::from_secs(1), 5.0, 10).await;
    assert!(matches!(denied, Err(LocationError::Unavailable(_))));

    let silent = sample(&ScriptedLocationProvider::new(vec![]), Duration::from_millis(100), 5.0, 10).await;
    assert_eq!(silent, Err(LocationError::Timeout { budget_ms: 100 }));
}

#[tokio::test]
async fn test_estimate_distance_to_anchor() {
    let (lat, lon) = offset_meters(LAT, LON, 60.0, 0.0);
    let anchor = ScriptedLocationProvider::new(vec![ScriptStep::fix(LAT, LON, 3.0)]);
    let participant = ScriptedLocationProvider::new(vec![ScriptStep::fix(lat, lon, 3.0)]);

    let a = sample(&anchor, Duration::from_secs(1), 5.0, 10).await.unwrap();
    let b = sample(&participant, Duration::from_secs(1), 5.0, 10).await.unwrap();
    let d = distance_meters(&a.coordinate(), &b.coordinate());
    assert!((d - 60.0).abs() < 0.5, "distance {}", d);
}
