//! Device-side pipelines
//!
//! Instructor: locate, issue a challenge, start the tone, open the session.
//! Participant: locate and listen at the same time, then hand the report
//! to the evaluator.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::{EmissionConfig, RollcallConfig};
use crate::core::clock::SharedClock;
use crate::core::evaluator::PresenceEvaluator;
use crate::core::frequency::{Emission, FrequencyDetector, FrequencyEmitter};
use crate::core::registry::SessionRegistry;
use crate::core::sampler::GeolocationSampler;
use crate::sensors::{AudioCapture, AudioOutput, LocationProvider};
use crate::types::{
    ChallengeError, DetectedSignal, FrequencyBand, FrequencyChallengeSpec, LaunchError,
    LocationError, LocationEstimate, Session, Verdict,
};

// =============================================================================
// INSTRUCTOR
// =============================================================================

/// An open session and the tone backing it
#[derive(Debug)]
pub struct LaunchedSession {
    pub session: Session,
    pub anchor: LocationEstimate,
    /// None when the session was opened without a challenge
    pub emission: Option<Emission>,
}

/// Opens sessions from the instructor's device
pub struct SessionLauncher {
    sampler: GeolocationSampler,
    emitter: FrequencyEmitter,
    band: FrequencyBand,
    emission: EmissionConfig,
}

impl SessionLauncher {
    pub fn new(
        sampler: GeolocationSampler,
        emitter: FrequencyEmitter,
        band: FrequencyBand,
        emission: EmissionConfig,
    ) -> Self {
        Self {
            sampler,
            emitter,
            band,
            emission,
        }
    }

    pub fn from_config(config: &RollcallConfig, emitter: FrequencyEmitter) -> Result<Self, ChallengeError> {
        Ok(Self::new(
            GeolocationSampler::from_config(&config.geolocation),
            emitter,
            config.frequency.band()?,
            config.frequency.emission.clone(),
        ))
    }

    /// Locate the instructor and open a session.
    ///
    /// With a speaker, a challenge is issued and its tone started before
    /// the session opens; a speaker failure aborts the launch. Without
    /// one, the session carries no challenge.
    pub async fn launch<P>(
        &self,
        registry: &SessionRegistry,
        course_id: &str,
        owner_id: &str,
        provider: &P,
        speaker: Option<Arc<dyn AudioOutput>>,
    ) -> Result<LaunchedSession, LaunchError>
    where
        P: LocationProvider + ?Sized,
    {
        let anchor = self.sampler.sample(provider).await?;

        let (challenge, emission) = match speaker {
            Some(output) => {
                let challenge = self.emitter.issue(self.band)?;
                let emission = self.emitter.start(&challenge, output, &self.emission)?;
                (Some(challenge), Some(emission))
            }
            None => (None, None),
        };

        let session = registry.open(course_id, owner_id, anchor.coordinate(), challenge)?;
        info!(
            session_id = %session.id,
            anchor_accuracy = anchor.accuracy_meters,
            samples = anchor.sample_count,
            "session launched"
        );
        Ok(LaunchedSession {
            session,
            anchor,
            emission,
        })
    }
}

// =============================================================================
// PARTICIPANT
// =============================================================================

/// What the participant's device observed
#[derive(Debug, Clone, PartialEq)]
pub struct CheckInReport {
    pub location: LocationEstimate,
    pub signal: Option<DetectedSignal>,
}

impl CheckInReport {
    /// Judge this report against the session it was made for
    pub fn evaluate(&self, session: &Session, evaluator: &PresenceEvaluator) -> Verdict {
        evaluator.evaluate(
            &session.anchor_location,
            &self.location.coordinate(),
            self.signal.as_ref(),
            session.challenge.as_ref(),
        )
    }
}

/// Runs location sampling and tone detection on the participant device
pub struct CheckIn {
    sampler: GeolocationSampler,
    detector: FrequencyDetector,
    listen_window: Duration,
    threshold_db: f64,
}

impl CheckIn {
    pub fn new(
        sampler: GeolocationSampler,
        detector: FrequencyDetector,
        listen_window: Duration,
        threshold_db: f64,
    ) -> Self {
        Self {
            sampler,
            detector,
            listen_window,
            threshold_db,
        }
    }

    pub fn from_config(config: &RollcallConfig) -> Result<Self, ChallengeError> {
        Ok(Self::new(
            GeolocationSampler::from_config(&config.geolocation),
            FrequencyDetector::from_config(&config.frequency)?,
            config.frequency.listen_window(),
            config.frequency.magnitude_threshold_db,
        ))
    }

    /// Stamp detections with `clock` instead of wall time
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.detector = self.detector.with_clock(clock);
        self
    }

    /// Sample location and, when the session carries a challenge, listen
    /// for it concurrently.
    ///
    /// Only a location failure is an error. A microphone failure is
    /// reported as no signal, which the evaluator flags for review.
    pub async fn run<P, C>(
        &self,
        provider: &P,
        microphone: &C,
        challenge: Option<&FrequencyChallengeSpec>,
    ) -> Result<CheckInReport, LocationError>
    where
        P: LocationProvider + ?Sized,
        C: AudioCapture + ?Sized,
    {
        let listen = async {
            let challenge = challenge?;
            match self
                .detector
                .listen(microphone, &challenge.band, self.listen_window, self.threshold_db)
                .await
            {
                Ok(signal) => signal,
                Err(err) => {
                    warn!(%err, "microphone unavailable, continuing without signal");
                    None
                }
            }
        };

        let (location, signal) = tokio::join!(self.sampler.sample(provider), listen);
        Ok(CheckInReport {
            location: location?,
            signal,
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EmissionMode, FrequencyConfig, GeolocationConfig};
    use crate::core::evaluator::PresenceThresholds;
    use crate::sensors::{RecordingAudioOutput, ScriptStep, ScriptedLocationProvider, ToneAudioCapture};
    use crate::types::{AttendanceStatus, EstimateMethod, PresenceReason};

    fn config() -> RollcallConfig {
        RollcallConfig {
            geolocation: GeolocationConfig {
                time_budget_ms: 200,
                ..GeolocationConfig::default()
            },
            frequency: FrequencyConfig {
                transform_size: 8192,
                listen_window_ms: 2_000,
                emission: EmissionConfig {
                    mode: EmissionMode::Continuous,
                    ..EmissionConfig::default()
                },
                ..FrequencyConfig::default()
            },
            ..RollcallConfig::default()
        }
    }

    #[tokio::test]
    async fn test_launch_with_speaker_issues_challenge() {
        let config = config();
        let launcher = SessionLauncher::from_config(&config, FrequencyEmitter::default()).unwrap();
        let registry = SessionRegistry::default();
        let provider = ScriptedLocationProvider::new(vec![ScriptStep::fix(12.9716, 77.5946, 4.0)]);
        let speaker = Arc::new(RecordingAudioOutput::new());

        let launched = launcher
            .launch(&registry, "CS101", "t-1", &provider, Some(speaker.clone() as Arc<dyn AudioOutput>))
            .await
            .unwrap();

        let challenge = launched.session.challenge.unwrap();
        assert_eq!(launched.anchor.method, EstimateMethod::SingleFix);
        assert_eq!(speaker.played()[0].hz, challenge.chosen_hz);
        assert!(launched.emission.is_some());
    }

    #[tokio::test]
    async fn test_launch_without_speaker_has_no_challenge() {
        let config = config();
        let launcher = SessionLauncher::from_config(&config, FrequencyEmitter::default()).unwrap();
        let registry = SessionRegistry::default();
        let provider = ScriptedLocationProvider::new(vec![ScriptStep::fix(12.9716, 77.5946, 4.0)]);

        let launched = launcher
            .launch(&registry, "CS101", "t-1", &provider, None)
            .await
            .unwrap();
        assert!(launched.session.challenge.is_none());
        assert!(launched.emission.is_none());
    }

    #[tokio::test]
    async fn test_launch_fails_without_location() {
        let config = config();
        let launcher = SessionLauncher::from_config(&config, FrequencyEmitter::default()).unwrap();
        let registry = SessionRegistry::default();

        let result = launcher
            .launch(&registry, "CS101", "t-1", &ScriptedLocationProvider::denied(), None)
            .await;
        assert!(matches!(result, Err(LaunchError::Location(_))));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_check_in_hears_challenge() {
        let config = config();
        let emitter = FrequencyEmitter::default();
        let challenge = emitter.issue(config.frequency.band().unwrap()).unwrap();
        let check_in = CheckIn::from_config(&config).unwrap();

        let provider = ScriptedLocationProvider::new(vec![ScriptStep::fix(12.9716, 77.5946, 3.0)]);
        let microphone = ToneAudioCapture::tone(challenge.chosen_hz, 0.3)
            .with_noise(0.001)
            .with_total_samples(16_384);

        let report = check_in.run(&provider, &microphone, Some(&challenge)).await.unwrap();
        let signal = report.signal.expect("tone should be heard");
        assert!((signal.peak_hz - challenge.chosen_hz).abs() <= config.frequency.tolerance_hz() * 4.0);
    }

    #[tokio::test]
    async fn test_check_in_without_microphone_is_flagged() {
        let config = config();
        let registry = SessionRegistry::default();
        let anchor = crate::types::Coordinate::new(12.9716, 77.5946, 5.0, chrono::Utc::now()).unwrap();
        let emitter = FrequencyEmitter::default();
        let challenge = emitter.issue(config.frequency.band().unwrap()).unwrap();
        let session = registry.open("CS101", "t-1", anchor, Some(challenge)).unwrap();

        let check_in = CheckIn::from_config(&config).unwrap();
        let provider = ScriptedLocationProvider::new(vec![ScriptStep::fix(12.9716, 77.5946, 3.0)]);
        let report = check_in
            .run(&provider, &ToneAudioCapture::unavailable(), session.challenge.as_ref())
            .await
            .unwrap();
        assert!(report.signal.is_none());

        let evaluator = PresenceEvaluator::new(PresenceThresholds::from(&config));
        let verdict = report.evaluate(&session, &evaluator);
        assert_eq!(verdict.status, AttendanceStatus::Present);
        assert!(verdict.potential_proxy);
        assert_eq!(verdict.reason, PresenceReason::R102_PRESENT_SIGNAL_ABSENT);
    }

    #[tokio::test]
    async fn test_check_in_location_failure_is_error() {
        let check_in = CheckIn::from_config(&config()).unwrap();
        let result = check_in
            .run(&ScriptedLocationProvider::denied(), &ToneAudioCapture::silence(), None)
            .await;
        assert!(matches!(result, Err(LocationError::Unavailable(_))));
    }
}
