//! Error taxonomy
//!
//! Sensor errors are recovered locally where possible and only reach the
//! caller when no usable estimate exists. Session and record errors are
//! terminal business-rule violations and are never retried.
//! An absent acoustic signal is not an error anywhere in this crate.

use thiserror::Error;

/// Geolocation sampling failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LocationError {
    /// Permission denied or hardware/provider unavailable
    #[error("Location unavailable: {0}")]
    Unavailable(String),

    /// Budget elapsed without a single usable reading
    #[error("No location sample within {budget_ms} ms")]
    Timeout { budget_ms: u64 },

    /// Caller stopped sampling before any reading arrived
    #[error("Location sampling cancelled")]
    Cancelled,
}

impl LocationError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "LOCATION_UNAVAILABLE",
            Self::Timeout { .. } => "LOCATION_TIMEOUT",
            Self::Cancelled => "LOCATION_CANCELLED",
        }
    }
}

/// Session token failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Session expired: {0}")]
    Expired(String),

    #[error("Session revoked: {0}")]
    Revoked(String),

    /// A live session already exists for the course
    #[error("Course {course_id} already has live session {session_id}")]
    Conflict { course_id: String, session_id: String },

    #[error("Only the session owner may do this")]
    NotOwner,

    /// Handoff payload disagrees with the stored session
    #[error("Handoff field does not match session: {0}")]
    Mismatch(&'static str),
}

impl SessionError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "SESSION_NOT_FOUND",
            Self::Expired(_) => "SESSION_EXPIRED",
            Self::Revoked(_) => "SESSION_REVOKED",
            Self::Conflict { .. } => "SESSION_CONFLICT",
            Self::NotOwner => "SESSION_NOT_OWNER",
            Self::Mismatch(_) => "SESSION_MISMATCH",
        }
    }
}

/// Verdict recording failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("Participant {participant_id} is not enrolled in course {course_id}")]
    NotEnrolled {
        participant_id: String,
        course_id: String,
    },

    /// A verdict already exists inside the cooldown window
    #[error("Attendance already recorded for {participant_id} in course {course_id}")]
    AlreadyRecorded {
        participant_id: String,
        course_id: String,
    },

    #[error("Session expired before the verdict could be written")]
    SessionExpired,

    #[error("Session revoked before the verdict could be written")]
    SessionRevoked,

    #[error("Session belongs to course {session_course}, not {course_id}")]
    CourseMismatch {
        session_course: String,
        course_id: String,
    },
}

impl RecordError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotEnrolled { .. } => "NOT_ENROLLED",
            Self::AlreadyRecorded { .. } => "ALREADY_RECORDED",
            Self::SessionExpired => "SESSION_EXPIRED",
            Self::SessionRevoked => "SESSION_REVOKED",
            Self::CourseMismatch { .. } => "COURSE_MISMATCH",
        }
    }
}

/// Invalid challenge parameters
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChallengeError {
    #[error("Band {low_hz}-{high_hz} Hz must satisfy low < high inside {min_hz}-{max_hz} Hz")]
    InvalidBand {
        low_hz: f64,
        high_hz: f64,
        min_hz: f64,
        max_hz: f64,
    },

    #[error("Band upper edge {high_hz} Hz is above Nyquist for {sample_rate} Hz sampling")]
    AboveNyquist { high_hz: f64, sample_rate: u32 },

    #[error("Transform size {0} must be a power of two of at least 256")]
    InvalidTransformSize(usize),
}

/// Audio device failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AudioError {
    /// Microphone or speaker missing or permission denied
    #[error("Audio device unavailable: {0}")]
    Unavailable(String),

    #[error("Unsupported audio format: {0}")]
    InvalidFormat(String),
}

/// Handoff payload decoding failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandoffError {
    #[error("Payload is not valid base64: {0}")]
    Encoding(String),

    #[error("Payload checksum does not match")]
    Checksum,

    #[error("Payload is missing required field `{0}`")]
    MissingField(&'static str),

    #[error("Payload expiry is not ISO-8601: {0}")]
    InvalidExpiry(String),

    #[error("Payload is malformed: {0}")]
    Malformed(String),
}

impl HandoffError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Encoding(_) => "HANDOFF_ENCODING",
            Self::Checksum => "HANDOFF_CHECKSUM",
            Self::MissingField(_) => "HANDOFF_MISSING_FIELD",
            Self::InvalidExpiry(_) => "HANDOFF_INVALID_EXPIRY",
            Self::Malformed(_) => "HANDOFF_MALFORMED",
        }
    }
}

/// Instructor-side session launch failures
#[derive(Error, Debug)]
pub enum LaunchError {
    #[error(transparent)]
    Location(#[from] LocationError),

    #[error(transparent)]
    Challenge(#[from] ChallengeError),

    #[error(transparent)]
    Audio(#[from] AudioError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Configuration loading failures
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<ChallengeError> for ConfigError {
    fn from(err: ChallengeError) -> Self {
        ConfigError::Invalid(err.to_string())
    }
}
