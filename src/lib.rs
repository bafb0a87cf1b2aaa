//! Rollcall: proxy-resistant classroom presence verification
//!
//! Fuses two weak signals into one presence decision:
//! device geolocation (accuracy-weighted) and a locally emitted
//! ultrasonic challenge, bounded by a short-lived session token.

pub mod config;
pub mod core;
pub mod sensors;
pub mod types;

// =============================================================================
// GEOLOCATION DEFAULTS
// =============================================================================

/// Mean earth radius used by the haversine distance (meters)
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Wall-clock budget for one sampling run (milliseconds)
pub const DEFAULT_LOCATION_BUDGET_MS: u64 = 13_000;

/// A single fix at or below this accuracy ends sampling immediately (meters)
pub const DEFAULT_DESIRED_ACCURACY_METERS: f64 = 5.0;

/// Upper bound on readings collected per run
pub const DEFAULT_MAX_SAMPLES: usize = 30;

/// Readings worse than this are only "approximate" (meters)
pub const APPROXIMATE_ACCURACY_METERS: f64 = 100.0;

/// Floor applied to accuracy before squaring it into a weight.
/// Keeps a reported 0 m fix from producing an infinite weight.
pub const MIN_WEIGHT_ACCURACY_METERS: f64 = 0.01;

// =============================================================================
// ACOUSTIC CHALLENGE DEFAULTS
// =============================================================================

/// Lower edge of the reserved ultrasonic range (Hz)
pub const ULTRASONIC_MIN_HZ: f64 = 18_000.0;

/// Upper edge of the reserved ultrasonic range (Hz)
pub const ULTRASONIC_MAX_HZ: f64 = 20_000.0;

/// Default challenge band (Hz)
pub const DEFAULT_BAND_LOW_HZ: f64 = 18_999.0;
pub const DEFAULT_BAND_HIGH_HZ: f64 = 19_401.0;

/// Capture sample rate (Hz)
pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;

/// Transform size; bin width = sample rate / transform size (~1.46 Hz)
pub const DEFAULT_TRANSFORM_SIZE: usize = 32_768;

/// Listening window on the participant side (milliseconds)
pub const DEFAULT_LISTEN_WINDOW_MS: u64 = 7_000;

/// Peaks quieter than this are treated as noise (dBFS)
pub const DEFAULT_MAGNITUDE_THRESHOLD_DB: f64 = -80.0;

/// Accepted distance between detected peak and challenge, in bins
pub const DEFAULT_TOLERANCE_BINS: f64 = 1.0;

/// Pulse train cadence (milliseconds)
pub const DEFAULT_PULSE_TONE_MS: u64 = 100;
pub const DEFAULT_PULSE_GAP_MS: u64 = 100;

// =============================================================================
// SESSION / ATTENDANCE DEFAULTS
// =============================================================================

/// Session lifetime: expires_at - created_at (seconds)
pub const DEFAULT_SESSION_LIFETIME_SECS: i64 = 300;

/// Longest accepted session lifetime (seconds)
pub const MAX_SESSION_LIFETIME_SECS: i64 = 86_400;

/// Length of the human-shareable session code
pub const SESSION_CODE_LEN: usize = 13;

/// Distance at or under which a participant counts as present (meters).
/// Empirical, not derived; override through configuration.
pub const DEFAULT_DISTANCE_THRESHOLD_METERS: f64 = 100.0;

/// Window during which a second verdict for the same participant and
/// course is rejected (hours). Empirical, like the distance threshold.
pub const DEFAULT_COOLDOWN_HOURS: i64 = 16;

/// Longest accepted cooldown window (hours)
pub const MAX_COOLDOWN_HOURS: i64 = 8_760;

/// Default API bind address
pub const DEFAULT_SERVER_ADDR: &str = "127.0.0.1:3000";

// =============================================================================
// VERSION
// =============================================================================

pub const VERSION: &str = "1.0.0";
