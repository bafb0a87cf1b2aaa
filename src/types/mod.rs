//! Core types for Rollcall

mod challenge;
mod coordinate;
mod error;
mod reason;
mod session;
mod verdict;

pub use challenge::{DetectedSignal, FrequencyBand, FrequencyChallengeSpec, SignalMatch};
pub use coordinate::{AccuracyTier, Coordinate, EstimateMethod, LocationEstimate};
pub use error::{
    AudioError, ChallengeError, ConfigError, HandoffError, LaunchError, LocationError, RecordError,
    SessionError,
};
pub use reason::PresenceReason;
pub use session::{Session, SessionHandoff, SessionState};
pub use verdict::{
    AttendanceStatus, AttendanceSummary, AttendanceVerdict, ReviewState, Verdict,
    VerdictNotification,
};
