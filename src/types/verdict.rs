//! Presence verdicts and attendance records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{Coordinate, PresenceReason, SignalMatch};

/// Final attendance status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttendanceStatus {
    Present,
    Absent,
}

impl std::fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Present => "PRESENT",
            Self::Absent => "ABSENT",
        };
        write!(f, "{}", name)
    }
}

/// Output of the presence evaluator (pure, not yet recorded)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub status: AttendanceStatus,
    /// Signals inconsistent or partially failed: review, don't reject
    pub potential_proxy: bool,
    /// Great-circle distance anchor → participant (meters)
    pub distance_meters: f64,
    pub signal: SignalMatch,
    pub reason: PresenceReason,
}

impl Verdict {
    /// Format for parseable output (no colors)
    pub fn to_parseable_string(&self) -> String {
        format!(
            "status={} | proxy={} | distance={:.1}m | signal={:?} | reason={}",
            self.status,
            self.potential_proxy,
            self.distance_meters,
            self.signal,
            self.reason.code()
        )
    }
}

/// How a UI should render a recorded verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewState {
    /// PRESENT with no suspicion
    Confirmed,
    /// PRESENT but potential proxy
    FlaggedForReview,
    Absent,
}

impl ReviewState {
    pub fn of(status: AttendanceStatus, potential_proxy: bool) -> Self {
        match (status, potential_proxy) {
            (AttendanceStatus::Absent, _) => Self::Absent,
            (AttendanceStatus::Present, true) => Self::FlaggedForReview,
            (AttendanceStatus::Present, false) => Self::Confirmed,
        }
    }
}

/// Permanent record of one presence decision. Never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceVerdict {
    pub participant_id: String,
    pub course_id: String,
    pub session_id: Uuid,
    pub status: AttendanceStatus,
    pub potential_proxy: bool,
    pub participant_location: Coordinate,
    pub distance_meters: f64,
    pub reason: PresenceReason,
    pub decided_at: DateTime<Utc>,
}

impl AttendanceVerdict {
    pub fn review_state(&self) -> ReviewState {
        ReviewState::of(self.status, self.potential_proxy)
    }
}

/// Broadcast after every successful record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerdictNotification {
    pub course_id: String,
    pub session_id: Uuid,
    pub participant_id: String,
    pub status: AttendanceStatus,
    pub potential_proxy: bool,
    pub review_state: ReviewState,
    pub reason: String,
    pub decided_at: DateTime<Utc>,
}

impl From<&AttendanceVerdict> for VerdictNotification {
    fn from(v: &AttendanceVerdict) -> Self {
        Self {
            course_id: v.course_id.clone(),
            session_id: v.session_id,
            participant_id: v.participant_id.clone(),
            status: v.status,
            potential_proxy: v.potential_proxy,
            review_state: v.review_state(),
            reason: v.reason.code().to_string(),
            decided_at: v.decided_at,
        }
    }
}

/// Per participant and course attendance totals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceSummary {
    pub participant_id: String,
    pub course_id: String,
    /// Sessions the course has held
    pub total_sessions: usize,
    pub present_sessions: usize,
    /// Present sessions that were flagged as potential proxy
    pub flagged_sessions: usize,
    /// present / total × 100, two decimals; 0 when no sessions held
    pub attendance_percentage: f64,
}

impl AttendanceSummary {
    pub fn new(
        participant_id: impl Into<String>,
        course_id: impl Into<String>,
        total_sessions: usize,
        present_sessions: usize,
        flagged_sessions: usize,
    ) -> Self {
        let attendance_percentage = if total_sessions == 0 {
            0.0
        } else {
            let raw = present_sessions as f64 / total_sessions as f64 * 100.0;
            (raw * 100.0).round() / 100.0
        };
        Self {
            participant_id: participant_id.into(),
            course_id: course_id.into(),
            total_sessions,
            present_sessions,
            flagged_sessions,
            attendance_percentage,
        }
    }
}
