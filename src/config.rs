//! Runtime configuration
//!
//! Every tunable lives here with its default taken from the constants in
//! `lib.rs`. A JSON file may override any subset of fields.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{ChallengeError, ConfigError, FrequencyBand};
use crate::{
    DEFAULT_BAND_HIGH_HZ, DEFAULT_BAND_LOW_HZ, DEFAULT_COOLDOWN_HOURS, DEFAULT_DESIRED_ACCURACY_METERS,
    DEFAULT_DISTANCE_THRESHOLD_METERS, DEFAULT_LISTEN_WINDOW_MS, DEFAULT_LOCATION_BUDGET_MS,
    DEFAULT_MAGNITUDE_THRESHOLD_DB, DEFAULT_MAX_SAMPLES, DEFAULT_PULSE_GAP_MS, DEFAULT_PULSE_TONE_MS,
    DEFAULT_SAMPLE_RATE, DEFAULT_SERVER_ADDR, DEFAULT_SESSION_LIFETIME_SECS, DEFAULT_TOLERANCE_BINS,
    DEFAULT_TRANSFORM_SIZE, MAX_COOLDOWN_HOURS, MAX_SESSION_LIFETIME_SECS,
};

/// How sampled readings are reduced to one estimate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvergenceStrategy {
    WeightedCentroid,
    BestOfN,
}

/// Geolocation sampling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeolocationConfig {
    /// Wall-clock budget per sampling run
    pub time_budget_ms: u64,
    /// A reading at or below this accuracy ends sampling at once (meters)
    pub desired_accuracy_meters: f64,
    /// Stop after this many readings
    pub max_samples: usize,
    pub strategy: ConvergenceStrategy,
    /// Retry once in low-accuracy mode if high accuracy is unavailable
    pub fallback_to_low_accuracy: bool,
}

impl Default for GeolocationConfig {
    fn default() -> Self {
        Self {
            time_budget_ms: DEFAULT_LOCATION_BUDGET_MS,
            desired_accuracy_meters: DEFAULT_DESIRED_ACCURACY_METERS,
            max_samples: DEFAULT_MAX_SAMPLES,
            strategy: ConvergenceStrategy::WeightedCentroid,
            fallback_to_low_accuracy: true,
        }
    }
}

impl GeolocationConfig {
    pub fn time_budget(&self) -> Duration {
        Duration::from_millis(self.time_budget_ms)
    }
}

/// Tone cadence on the emitting side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmissionMode {
    Continuous,
    PulseTrain,
}

/// Challenge emission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmissionConfig {
    pub mode: EmissionMode,
    /// Pulse length (pulse train only)
    pub tone_ms: u64,
    /// Silence between pulses (pulse train only)
    pub gap_ms: u64,
    /// Stop emitting after this long; None = until stopped
    pub window_ms: Option<u64>,
}

impl Default for EmissionConfig {
    fn default() -> Self {
        Self {
            mode: EmissionMode::PulseTrain,
            tone_ms: DEFAULT_PULSE_TONE_MS,
            gap_ms: DEFAULT_PULSE_GAP_MS,
            window_ms: None,
        }
    }
}

/// Acoustic challenge and detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrequencyConfig {
    pub band_low_hz: f64,
    pub band_high_hz: f64,
    pub sample_rate: u32,
    /// Power of two; bin width = sample_rate / transform_size
    pub transform_size: usize,
    pub listen_window_ms: u64,
    /// Peaks below this are noise (dBFS)
    pub magnitude_threshold_db: f64,
    /// Accepted |peak - challenge| in bins
    pub tolerance_bins: f64,
    pub emission: EmissionConfig,
}

impl Default for FrequencyConfig {
    fn default() -> Self {
        Self {
            band_low_hz: DEFAULT_BAND_LOW_HZ,
            band_high_hz: DEFAULT_BAND_HIGH_HZ,
            sample_rate: DEFAULT_SAMPLE_RATE,
            transform_size: DEFAULT_TRANSFORM_SIZE,
            listen_window_ms: DEFAULT_LISTEN_WINDOW_MS,
            magnitude_threshold_db: DEFAULT_MAGNITUDE_THRESHOLD_DB,
            tolerance_bins: DEFAULT_TOLERANCE_BINS,
            emission: EmissionConfig::default(),
        }
    }
}

impl FrequencyConfig {
    pub fn band(&self) -> Result<FrequencyBand, ChallengeError> {
        FrequencyBand::new(self.band_low_hz, self.band_high_hz)
    }

    pub fn bin_width_hz(&self) -> f64 {
        self.sample_rate as f64 / self.transform_size as f64
    }

    pub fn tolerance_hz(&self) -> f64 {
        self.tolerance_bins * self.bin_width_hz()
    }

    pub fn listen_window(&self) -> Duration {
        Duration::from_millis(self.listen_window_ms)
    }
}

/// Session tokens
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// expires_at - created_at
    pub lifetime_secs: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            lifetime_secs: DEFAULT_SESSION_LIFETIME_SECS,
        }
    }
}

impl SessionConfig {
    /// Lifetime as a duration, rejected outside 1 s ..= 1 day
    pub fn lifetime(&self) -> Result<chrono::Duration, ConfigError> {
        if !(1..=MAX_SESSION_LIFETIME_SECS).contains(&self.lifetime_secs) {
            return Err(invalid(&format!(
                "session.lifetime_secs must be in 1..={}",
                MAX_SESSION_LIFETIME_SECS
            )));
        }
        chrono::Duration::try_seconds(self.lifetime_secs)
            .ok_or_else(|| invalid("session.lifetime_secs out of range"))
    }
}

/// Presence decision thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceConfig {
    /// Participants at or under this distance from the anchor are present
    pub distance_threshold_meters: f64,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            distance_threshold_meters: DEFAULT_DISTANCE_THRESHOLD_METERS,
        }
    }
}

/// Verdict recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttendanceConfig {
    /// Duplicate submissions inside this window are rejected
    pub cooldown_hours: i64,
}

impl Default for AttendanceConfig {
    fn default() -> Self {
        Self {
            cooldown_hours: DEFAULT_COOLDOWN_HOURS,
        }
    }
}

impl AttendanceConfig {
    /// Cooldown as a duration, rejected outside 1 h ..= 1 year
    pub fn cooldown(&self) -> Result<chrono::Duration, ConfigError> {
        if !(1..=MAX_COOLDOWN_HOURS).contains(&self.cooldown_hours) {
            return Err(invalid(&format!(
                "attendance.cooldown_hours must be in 1..={}",
                MAX_COOLDOWN_HOURS
            )));
        }
        chrono::Duration::try_hours(self.cooldown_hours)
            .ok_or_else(|| invalid("attendance.cooldown_hours out of range"))
    }
}

/// HTTP server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_SERVER_ADDR.to_string(),
        }
    }
}

/// Complete configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RollcallConfig {
    pub geolocation: GeolocationConfig,
    pub frequency: FrequencyConfig,
    pub session: SessionConfig,
    pub presence: PresenceConfig,
    pub attendance: AttendanceConfig,
    pub server: ServerConfig,
}

impl RollcallConfig {
    /// Load from a JSON file and validate
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Parse JSON (missing fields take defaults) and validate
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let geo = &self.geolocation;
        if geo.time_budget_ms == 0 {
            return Err(invalid("geolocation.time_budget_ms must be positive"));
        }
        if geo.max_samples == 0 {
            return Err(invalid("geolocation.max_samples must be positive"));
        }
        if !(geo.desired_accuracy_meters >= 0.0) {
            return Err(invalid("geolocation.desired_accuracy_meters must be >= 0"));
        }

        let freq = &self.frequency;
        let band = freq.band()?;
        if !freq.transform_size.is_power_of_two() || freq.transform_size < 256 {
            return Err(ChallengeError::InvalidTransformSize(freq.transform_size).into());
        }
        if band.high_hz * 2.0 >= freq.sample_rate as f64 {
            return Err(ChallengeError::AboveNyquist {
                high_hz: band.high_hz,
                sample_rate: freq.sample_rate,
            }
            .into());
        }
        if freq.listen_window_ms == 0 {
            return Err(invalid("frequency.listen_window_ms must be positive"));
        }
        if !(freq.tolerance_bins >= 0.0) {
            return Err(invalid("frequency.tolerance_bins must be >= 0"));
        }
        if freq.emission.mode == EmissionMode::PulseTrain && freq.emission.tone_ms == 0 {
            return Err(invalid("frequency.emission.tone_ms must be positive"));
        }

        self.session.lifetime()?;
        if !(self.presence.distance_threshold_meters > 0.0) {
            return Err(invalid("presence.distance_threshold_meters must be positive"));
        }
        self.attendance.cooldown()?;
        Ok(())
    }
}

fn invalid(msg: &str) -> ConfigError {
    ConfigError::Invalid(msg.to_string())
}

// =============================================================================
// TESTS
// =============================================================================
