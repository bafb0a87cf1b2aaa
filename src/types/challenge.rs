//! Acoustic challenge types
//!
//! A challenge is one tone inside a reserved ultrasonic band. The
//! channel only proves proximity to the emitting speaker; it carries no
//! other message.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::ChallengeError;
use crate::{ULTRASONIC_MAX_HZ, ULTRASONIC_MIN_HZ};

/// Frequency band, low < high, inside 18-20 kHz
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrequencyBand {
    pub low_hz: f64,
    pub high_hz: f64,
}

impl FrequencyBand {
    pub fn new(low_hz: f64, high_hz: f64) -> Result<Self, ChallengeError> {
        let band = Self { low_hz, high_hz };
        band.validate()?;
        Ok(band)
    }

    pub fn validate(&self) -> Result<(), ChallengeError> {
        let ok = self.low_hz.is_finite()
            && self.high_hz.is_finite()
            && self.low_hz < self.high_hz
            && self.low_hz >= ULTRASONIC_MIN_HZ
            && self.high_hz <= ULTRASONIC_MAX_HZ;
        if ok {
            Ok(())
        } else {
            Err(ChallengeError::InvalidBand {
                low_hz: self.low_hz,
                high_hz: self.high_hz,
                min_hz: ULTRASONIC_MIN_HZ,
                max_hz: ULTRASONIC_MAX_HZ,
            })
        }
    }

    /// Closed-interval membership
    pub fn contains(&self, hz: f64) -> bool {
        hz >= self.low_hz && hz <= self.high_hz
    }

    /// Open-interval membership (challenge frequencies)
    pub fn strictly_contains(&self, hz: f64) -> bool {
        hz > self.low_hz && hz < self.high_hz
    }

    pub fn width_hz(&self) -> f64 {
        self.high_hz - self.low_hz
    }
}

/// An issued challenge
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrequencyChallengeSpec {
    pub band: FrequencyBand,
    /// band.low_hz < chosen_hz < band.high_hz
    pub chosen_hz: f64,
    pub issued_at: DateTime<Utc>,
}

impl FrequencyChallengeSpec {
    /// Judge a detection against this challenge.
    ///
    /// The detector reports the strongest in-band peak; matching is a
    /// separate step so unrelated ultrasonic noise is not accepted.
    pub fn assess(
        &self,
        signal: Option<&DetectedSignal>,
        tolerance_hz: f64,
        magnitude_threshold_db: f64,
    ) -> SignalMatch {
        let Some(signal) = signal else {
            return SignalMatch::Absent;
        };
        // Both checks fail closed on NaN
        if !(signal.magnitude_db > magnitude_threshold_db) {
            return SignalMatch::Weak;
        }
        if !((signal.peak_hz - self.chosen_hz).abs() <= tolerance_hz) {
            return SignalMatch::OffFrequency;
        }
        SignalMatch::Matched
    }
}

/// Strongest in-band peak heard during a listening window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectedSignal {
    pub peak_hz: f64,
    pub magnitude_db: f64,
    pub detected_at: DateTime<Utc>,
}

/// Outcome of comparing a detection to a challenge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalMatch {
    /// Peak within tolerance and above threshold
    Matched,
    /// Session carries no challenge, nothing to prove
    NoChallenge,
    /// Nothing detected in the band
    Absent,
    /// Peak outside tolerance of the challenge frequency
    OffFrequency,
    /// Peak below the magnitude threshold
    Weak,
}
