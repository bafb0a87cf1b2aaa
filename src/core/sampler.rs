//! Geolocation sampler
//!
//! Pulls readings from a location provider until one of:
//! - a reading meets the desired accuracy (fast path, returned as-is)
//! - max_samples readings were collected
//! - the time budget elapses
//! - the caller stops it
//!
//! Readings are folded into an inverse-accuracy²-weighted centroid in
//! arrival order. Whatever stops the loop, best-so-far data is returned;
//! only an empty run is an error. The provider subscription is dropped,
//! and therefore released, on every exit path.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::config::{ConvergenceStrategy, GeolocationConfig};
use crate::core::geo::WeightedCentroid;
use crate::sensors::{AccuracyMode, LocationEvent, LocationProvider, ProviderFailure};
use crate::types::{AccuracyTier, Coordinate, EstimateMethod, LocationError, LocationEstimate};

/// Sampling limits for one run
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerParams {
    pub time_budget: Duration,
    pub desired_accuracy_meters: f64,
    pub max_samples: usize,
    pub strategy: ConvergenceStrategy,
    pub fallback_to_low_accuracy: bool,
}

impl SamplerParams {
    pub fn new(time_budget: Duration, desired_accuracy_meters: f64, max_samples: usize) -> Self {
        Self {
            time_budget,
            desired_accuracy_meters,
            max_samples: max_samples.max(1),
            strategy: ConvergenceStrategy::WeightedCentroid,
            fallback_to_low_accuracy: true,
        }
    }
}

impl From<&GeolocationConfig> for SamplerParams {
    fn from(config: &GeolocationConfig) -> Self {
        Self {
            time_budget: config.time_budget(),
            desired_accuracy_meters: config.desired_accuracy_meters,
            max_samples: config.max_samples.max(1),
            strategy: config.strategy,
            fallback_to_low_accuracy: config.fallback_to_low_accuracy,
        }
    }
}

/// Why the sampling loop ended without a fast-path fix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    MaxSamples,
    Budget,
    Cancelled,
    ProviderClosed,
    ProviderFailed,
}

/// Converges noisy location readings to one estimate
#[derive(Debug, Clone)]
pub struct GeolocationSampler {
    params: SamplerParams,
}

impl GeolocationSampler {
    pub fn new(params: SamplerParams) -> Self {
        Self { params }
    }

    pub fn from_config(config: &GeolocationConfig) -> Self {
        Self::new(SamplerParams::from(config))
    }

    pub fn params(&self) -> &SamplerParams {
        &self.params
    }

    /// Sample until accuracy, sample count or budget stops the run
    pub async fn sample<P>(&self, provider: &P) -> Result<LocationEstimate, LocationError>
    where
        P: LocationProvider + ?Sized,
    {
        self.sample_until(provider, std::future::pending::<()>()).await
    }

    /// Like `sample`, but also ends when `stop` completes.
    /// Stopping keeps best-so-far data; `Cancelled` only if there is none.
    pub async fn sample_until<P, F>(
        &self,
        provider: &P,
        stop: F,
    ) -> Result<LocationEstimate, LocationError>
    where
        P: LocationProvider + ?Sized,
        F: Future<Output = ()>,
    {
        let deadline = Instant::now() + self.params.time_budget;
        let mut readings = WeightedCentroid::new();
        let mut mode = AccuracyMode::High;
        tokio::pin!(stop);

        let reason = 'subscribe: loop {
            let mut subscription = provider.subscribe(mode)?;
            debug!(?mode, "location subscription opened");

            loop {
                let event = tokio::select! {
                    biased;
                    _ = &mut stop => break 'subscribe StopReason::Cancelled,
                    _ = sleep_until(deadline) => break 'subscribe StopReason::Budget,
                    event = subscription.next() => event,
                };

                match event {
                    None => break 'subscribe StopReason::ProviderClosed,
                    Some(LocationEvent::Sample(coord)) => {
                        if !coord.is_valid() {
                            warn!(?coord, "discarding invalid location reading");
                            continue;
                        }
                        readings.push(&coord);
                        let tier = AccuracyTier::classify(
                            coord.accuracy_meters,
                            self.params.desired_accuracy_meters,
                        );
                        debug!(
                            accuracy = coord.accuracy_meters,
                            samples = readings.len(),
                            tier = tier.message(),
                            "location reading"
                        );

                        if tier == AccuracyTier::High {
                            info!(accuracy = coord.accuracy_meters, "desired accuracy reached");
                            return Ok(single_fix(&coord, readings.len()));
                        }
                        if readings.len() >= self.params.max_samples {
                            break 'subscribe StopReason::MaxSamples;
                        }
                    }
                    Some(LocationEvent::Failed(ProviderFailure::PermissionDenied)) => {
                        return Err(LocationError::Unavailable("permission denied".to_string()));
                    }
                    Some(LocationEvent::Failed(ProviderFailure::PositionUnavailable(msg))) => {
                        let can_fall_back = readings.is_empty()
                            && mode == AccuracyMode::High
                            && self.params.fallback_to_low_accuracy;
                        if can_fall_back {
                            warn!(%msg, "high accuracy unavailable, falling back to low accuracy");
                            mode = AccuracyMode::Low;
                            continue 'subscribe;
                        }
                        if readings.is_empty() {
                            return Err(LocationError::Unavailable(msg));
                        }
                        warn!(%msg, "provider failed, keeping readings gathered so far");
                        break 'subscribe StopReason::ProviderFailed;
                    }
                }
            }
        };

        self.finish(&readings, reason)
    }

    /// Reduce gathered readings, or explain why there are none
    fn finish(
        &self,
        readings: &WeightedCentroid,
        reason: StopReason,
    ) -> Result<LocationEstimate, LocationError> {
        let estimate = match self.params.strategy {
            ConvergenceStrategy::WeightedCentroid => readings.estimate(),
            ConvergenceStrategy::BestOfN => readings.best_of_n(),
        };

        match estimate {
            Some(estimate) => {
                info!(
                    ?reason,
                    samples = estimate.sample_count,
                    accuracy = estimate.accuracy_meters,
                    method = %estimate.method,
                    "location estimate ready"
                );
                Ok(estimate)
            }
            None => Err(match reason {
                StopReason::Cancelled => LocationError::Cancelled,
                StopReason::ProviderClosed | StopReason::ProviderFailed => {
                    LocationError::Unavailable("provider stopped without a reading".to_string())
                }
                StopReason::Budget | StopReason::MaxSamples => LocationError::Timeout {
                    budget_ms: self.params.time_budget.as_millis() as u64,
                },
            }),
        }
    }
}

fn single_fix(coord: &Coordinate, sample_count: usize) -> LocationEstimate {
    LocationEstimate {
        latitude: coord.latitude,
        longitude: coord.longitude,
        accuracy_meters: coord.accuracy_meters,
        captured_at: coord.captured_at,
        sample_count,
        method: EstimateMethod::SingleFix,
    }
}

/// One-shot sampling with explicit limits
pub async fn sample<P>(
    provider: &P,
    time_budget: Duration,
    desired_accuracy_meters: f64,
    max_samples: usize,
) -> Result<LocationEstimate, LocationError>
where
    P: LocationProvider + ?Sized,
{
    GeolocationSampler::new(SamplerParams::new(time_budget, desired_accuracy_meters, max_samples))
        .sample(provider)
        .await
}

// =============================================================================
// TESTS
// =============================================================================
