//! Session tokens
//!
//! State machine: CREATED → LIVE → {EXPIRED | REVOKED}
//! Terminal states are absorbing. A session is immutable after creation
//! except for `revoked`, and is never deleted.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{Coordinate, FrequencyChallengeSpec};

/// Lifecycle state of a session at a given instant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    /// Constructed but not yet valid (created_at is in the future)
    Created,
    /// Accepting check-ins
    Live,
    /// now > expires_at
    Expired,
    /// Revoked by its owner
    Revoked,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Expired | Self::Revoked)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Created => "CREATED",
            Self::Live => "LIVE",
            Self::Expired => "EXPIRED",
            Self::Revoked => "REVOKED",
        };
        write!(f, "{}", name)
    }
}

/// Attendance session bound to an instructor's location snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub course_id: String,
    /// Instructor who opened the session
    pub owner_id: String,
    /// Short random code shared in the handoff link
    pub session_code: String,
    pub anchor_location: Coordinate,
    pub challenge: Option<FrequencyChallengeSpec>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
}

impl Session {
    /// State at `now`. Revocation wins over expiry.
    pub fn state_at(&self, now: DateTime<Utc>) -> SessionState {
        if self.revoked {
            SessionState::Revoked
        } else if now > self.expires_at {
            SessionState::Expired
        } else if now < self.created_at {
            SessionState::Created
        } else {
            SessionState::Live
        }
    }

    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.state_at(now) == SessionState::Live
    }

    /// Time left for a UI countdown, zero once terminal
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        if self.state_at(now).is_terminal() {
            return Duration::zero();
        }
        (self.expires_at - now).max(Duration::zero())
    }

    /// Build the participant-facing handoff payload
    pub fn handoff(&self) -> SessionHandoff {
        SessionHandoff {
            owner_id: self.owner_id.clone(),
            course_id: self.course_id.clone(),
            session_code: self.session_code.clone(),
            expires_at: self.expires_at,
            session_id: self.id,
            anchor_latitude: self.anchor_location.latitude,
            anchor_longitude: self.anchor_location.longitude,
        }
    }
}

/// Fields embedded in the participant link.
/// Encoded and decoded by `core::handoff`.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionHandoff {
    pub owner_id: String,
    pub course_id: String,
    pub session_code: String,
    pub expires_at: DateTime<Utc>,
    pub session_id: Uuid,
    pub anchor_latitude: f64,
    pub anchor_longitude: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(created_at: DateTime<Utc>) -> Session {
        Session {
            id: Uuid::new_v4(),
            course_id: "CS101".to_string(),
            owner_id: "t-1".to_string(),
            session_code: "abc".to_string(),
            anchor_location: Coordinate::new(12.9716, 77.5946, 5.0, created_at).unwrap(),
            challenge: None,
            created_at,
            expires_at: created_at + Duration::minutes(5),
            revoked: false,
        }
    }

    #[test]
    fn test_state_transitions() {
        let t0 = Utc::now();
        let mut s = session(t0);

        assert_eq!(s.state_at(t0 - Duration::seconds(1)), SessionState::Created);
        assert_eq!(s.state_at(t0), SessionState::Live);
        assert_eq!(s.state_at(s.expires_at), SessionState::Live);
        assert_eq!(s.state_at(s.expires_at + Duration::seconds(1)), SessionState::Expired);

        s.revoked = true;
        assert_eq!(s.state_at(t0), SessionState::Revoked);
        assert_eq!(s.state_at(s.expires_at + Duration::hours(1)), SessionState::Revoked);
    }

    #[test]
    fn test_remaining_countdown() {
        let t0 = Utc::now();
        let s = session(t0);
        assert_eq!(s.remaining(t0 + Duration::minutes(2)), Duration::minutes(3));
        assert_eq!(s.remaining(t0 + Duration::minutes(10)), Duration::zero());
    }
}
