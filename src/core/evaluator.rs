//! Presence evaluator
//!
//! Pure decision function: distance decides the status, the acoustic
//! signal only decides whether a PRESENT verdict needs review.
//!
//! | distance       | signal                  | status  | potential_proxy |
//! |----------------|-------------------------|---------|-----------------|
//! | > threshold    | any                     | ABSENT  | true            |
//! | <= threshold   | matched / no challenge  | PRESENT | false           |
//! | <= threshold   | absent / off / weak     | PRESENT | true            |
//!
//! A missing signal never downgrades PRESENT to ABSENT: signal loss is
//! treated as possible hardware trouble, not proof of absence.

use crate::config::{FrequencyConfig, PresenceConfig, RollcallConfig};
use crate::core::geo::distance_meters;
use crate::types::{
    AttendanceStatus, Coordinate, DetectedSignal, FrequencyChallengeSpec, PresenceReason,
    SignalMatch, Verdict,
};
use crate::{DEFAULT_DISTANCE_THRESHOLD_METERS, DEFAULT_MAGNITUDE_THRESHOLD_DB};

/// Decision thresholds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PresenceThresholds {
    pub distance_threshold_meters: f64,
    /// Accepted |peak - challenge| (Hz)
    pub frequency_tolerance_hz: f64,
    pub magnitude_threshold_db: f64,
}

impl Default for PresenceThresholds {
    fn default() -> Self {
        let freq = FrequencyConfig::default();
        Self {
            distance_threshold_meters: DEFAULT_DISTANCE_THRESHOLD_METERS,
            frequency_tolerance_hz: freq.tolerance_hz(),
            magnitude_threshold_db: DEFAULT_MAGNITUDE_THRESHOLD_DB,
        }
    }
}

impl PresenceThresholds {
    pub fn from_config(presence: &PresenceConfig, frequency: &FrequencyConfig) -> Self {
        Self {
            distance_threshold_meters: presence.distance_threshold_meters,
            frequency_tolerance_hz: frequency.tolerance_hz(),
            magnitude_threshold_db: frequency.magnitude_threshold_db,
        }
    }
}

impl From<&RollcallConfig> for PresenceThresholds {
    fn from(config: &RollcallConfig) -> Self {
        Self::from_config(&config.presence, &config.frequency)
    }
}

/// Stateless presence evaluator
#[derive(Debug, Clone, Copy, Default)]
pub struct PresenceEvaluator {
    thresholds: PresenceThresholds,
}

impl PresenceEvaluator {
    pub fn new(thresholds: PresenceThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &PresenceThresholds {
        &self.thresholds
    }

    /// Decide presence for one participant
    pub fn evaluate(
        &self,
        anchor: &Coordinate,
        participant: &Coordinate,
        signal: Option<&DetectedSignal>,
        challenge: Option<&FrequencyChallengeSpec>,
    ) -> Verdict {
        let distance = distance_meters(anchor, participant);
        let signal_match = match challenge {
            None => SignalMatch::NoChallenge,
            Some(c) => c.assess(
                signal,
                self.thresholds.frequency_tolerance_hz,
                self.thresholds.magnitude_threshold_db,
            ),
        };

        if !(distance <= self.thresholds.distance_threshold_meters) {
            let reason = PresenceReason::R110_ABSENT_OUT_OF_RANGE;
            return Verdict {
                status: AttendanceStatus::Absent,
                potential_proxy: reason.needs_review(),
                distance_meters: distance,
                signal: signal_match,
                reason,
            };
        }

        let reason = match signal_match {
            SignalMatch::Matched => PresenceReason::R100_PRESENT_VERIFIED,
            SignalMatch::NoChallenge => PresenceReason::R101_PRESENT_NO_CHALLENGE,
            SignalMatch::Absent => PresenceReason::R102_PRESENT_SIGNAL_ABSENT,
            SignalMatch::OffFrequency => PresenceReason::R103_PRESENT_SIGNAL_OFF_FREQUENCY,
            SignalMatch::Weak => PresenceReason::R104_PRESENT_SIGNAL_WEAK,
        };
        Verdict {
            status: AttendanceStatus::Present,
            potential_proxy: reason.needs_review(),
            distance_meters: distance,
            signal: signal_match,
            reason,
        }
    }
}

/// Evaluate with explicit thresholds
pub fn evaluate(
    anchor: &Coordinate,
    participant: &Coordinate,
    signal: Option<&DetectedSignal>,
    challenge: Option<&FrequencyChallengeSpec>,
    thresholds: &PresenceThresholds,
) -> Verdict {
    PresenceEvaluator::new(*thresholds).evaluate(anchor, participant, signal, challenge)
}

// =============================================================================
// TESTS
// =============================================================================
