//! Session registry
//!
//! Creates, validates and revokes session tokens. At most one session per
//! course is live at a time; a new one is refused while another is live.
//! Sessions are never deleted, so history stays available for the
//! attendance percentage.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::core::clock::{SharedClock, SystemClock};
use crate::types::{
    Coordinate, FrequencyChallengeSpec, Session, SessionError, SessionHandoff, SessionState,
};
use crate::{DEFAULT_SESSION_LIFETIME_SECS, SESSION_CODE_LEN};

#[derive(Default)]
struct Inner {
    sessions: HashMap<Uuid, Session>,
    /// Session ids per course, in creation order
    by_course: HashMap<String, Vec<Uuid>>,
}

/// Thread-safe session store
pub struct SessionRegistry {
    inner: Mutex<Inner>,
    clock: SharedClock,
    lifetime: Duration,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock), &SessionConfig::default())
    }
}

impl SessionRegistry {
    pub fn new(clock: SharedClock, config: &SessionConfig) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            clock,
            lifetime: config.lifetime().unwrap_or_else(|err| {
                warn!(%err, "unusable session lifetime, using default");
                Duration::seconds(DEFAULT_SESSION_LIFETIME_SECS)
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Open a session anchored at `anchor`. Refused while the course
    /// already has a live session.
    pub fn open(
        &self,
        course_id: &str,
        owner_id: &str,
        anchor: Coordinate,
        challenge: Option<FrequencyChallengeSpec>,
    ) -> Result<Session, SessionError> {
        let now = self.clock.now();
        let mut inner = self.lock();

        if let Some(live) = live_in(&inner, course_id, now) {
            return Err(SessionError::Conflict {
                course_id: course_id.to_string(),
                session_id: live.id.to_string(),
            });
        }

        let session = Session {
            id: Uuid::new_v4(),
            course_id: course_id.to_string(),
            owner_id: owner_id.to_string(),
            session_code: session_code(),
            anchor_location: anchor,
            challenge,
            created_at: now,
            expires_at: now.checked_add_signed(self.lifetime).unwrap_or(DateTime::<Utc>::MAX_UTC),
            revoked: false,
        };

        inner
            .by_course
            .entry(course_id.to_string())
            .or_default()
            .push(session.id);
        inner.sessions.insert(session.id, session.clone());

        info!(
            session_id = %session.id,
            course_id,
            owner_id,
            expires_at = %session.expires_at,
            challenge = session.challenge.is_some(),
            "session opened"
        );
        Ok(session)
    }

    /// Look up a session without judging its state
    pub fn get(&self, session_id: Uuid) -> Option<Session> {
        self.lock().sessions.get(&session_id).cloned()
    }

    /// The session if it is LIVE now, otherwise why not
    pub fn validate(&self, session_id: Uuid) -> Result<Session, SessionError> {
        let now = self.clock.now();
        let session = self
            .get(session_id)
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;

        match session.state_at(now) {
            SessionState::Live => Ok(session),
            SessionState::Expired => Err(SessionError::Expired(session_id.to_string())),
            SessionState::Revoked => Err(SessionError::Revoked(session_id.to_string())),
            // Not valid yet; indistinguishable from absent for a participant
            SessionState::Created => Err(SessionError::NotFound(session_id.to_string())),
        }
    }

    /// Validate a decoded handoff against the stored session
    pub fn validate_handoff(&self, handoff: &SessionHandoff) -> Result<Session, SessionError> {
        let session = self.validate(handoff.session_id)?;
        if session.owner_id != handoff.owner_id {
            return Err(SessionError::Mismatch("ownerId"));
        }
        if session.course_id != handoff.course_id {
            return Err(SessionError::Mismatch("courseId"));
        }
        if session.session_code != handoff.session_code {
            return Err(SessionError::Mismatch("sessionCode"));
        }
        Ok(session)
    }

    /// Revoke a session. Only its owner may; terminal states are absorbing.
    pub fn revoke(&self, session_id: Uuid, owner_id: &str) -> Result<Session, SessionError> {
        let now = self.clock.now();
        let mut inner = self.lock();
        let session = inner
            .sessions
            .get_mut(&session_id)
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;

        if session.owner_id != owner_id {
            return Err(SessionError::NotOwner);
        }
        match session.state_at(now) {
            SessionState::Revoked => return Err(SessionError::Revoked(session_id.to_string())),
            SessionState::Expired => return Err(SessionError::Expired(session_id.to_string())),
            SessionState::Created | SessionState::Live => {}
        }

        session.revoked = true;
        info!(session_id = %session_id, course_id = %session.course_id, "session revoked");
        Ok(session.clone())
    }

    /// The course's live session, if any
    pub fn live_for_course(&self, course_id: &str) -> Option<Session> {
        let now = self.clock.now();
        live_in(&self.lock(), course_id, now).cloned()
    }

    /// Every session the course has held, oldest first
    pub fn sessions_for_course(&self, course_id: &str) -> Vec<Session> {
        let inner = self.lock();
        inner
            .by_course
            .get(course_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.sessions.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn live_in<'a>(inner: &'a Inner, course_id: &str, now: DateTime<Utc>) -> Option<&'a Session> {
    inner
        .by_course
        .get(course_id)?
        .iter()
        .rev()
        .filter_map(|id| inner.sessions.get(id))
        .find(|s| s.is_live(now))
}

/// Random lowercase alphanumeric code
fn session_code() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SESSION_CODE_LEN)
        .map(|b| (b as char).to_ascii_lowercase())
        .collect()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;

    fn setup() -> (Arc<ManualClock>, SessionRegistry) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let registry = SessionRegistry::new(clock.clone(), &SessionConfig::default());
        (clock, registry)
    }

    fn anchor() -> Coordinate {
        Coordinate::new(12.9716, 77.5946, 5.0, Utc::now()).unwrap()
    }

    #[test]
    fn test_open_sets_lifetime_and_code() {
        let (_, registry) = setup();
        let s = registry.open("CS101", "t-1", anchor(), None).unwrap();
        assert_eq!(s.expires_at - s.created_at, Duration::minutes(5));
        assert_eq!(s.session_code.len(), SESSION_CODE_LEN);
        assert!(s.session_code.chars().all(|c| c.is_ascii_alphanumeric() && !c.is_ascii_uppercase()));
        assert_eq!(registry.validate(s.id).unwrap().id, s.id);
    }

    #[test]
    fn test_one_live_session_per_course() {
        let (clock, registry) = setup();
        let first = registry.open("CS101", "t-1", anchor(), None).unwrap();

        let err = registry.open("CS101", "t-1", anchor(), None).unwrap_err();
        assert_eq!(err.code(), "SESSION_CONFLICT");

        // Other courses are independent
        assert!(registry.open("CS102", "t-1", anchor(), None).is_ok());

        clock.advance(Duration::minutes(6));
        let second = registry.open("CS101", "t-1", anchor(), None).unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(registry.sessions_for_course("CS101").len(), 2);
    }

    #[test]
    fn test_expiry() {
        let (clock, registry) = setup();
        let s = registry.open("CS101", "t-1", anchor(), None).unwrap();

        clock.advance(Duration::minutes(5));
        assert!(registry.validate(s.id).is_ok());

        clock.advance(Duration::seconds(1));
        assert_eq!(registry.validate(s.id), Err(SessionError::Expired(s.id.to_string())));
        assert!(registry.live_for_course("CS101").is_none());
    }

    #[test]
    fn test_revoke_is_owner_only_and_terminal() {
        let (clock, registry) = setup();
        let s = registry.open("CS101", "t-1", anchor(), None).unwrap();

        assert_eq!(registry.revoke(s.id, "t-2"), Err(SessionError::NotOwner));
        assert!(registry.revoke(s.id, "t-1").unwrap().revoked);
        assert_eq!(registry.validate(s.id), Err(SessionError::Revoked(s.id.to_string())));
        assert_eq!(registry.revoke(s.id, "t-1"), Err(SessionError::Revoked(s.id.to_string())));

        // Revocation wins over later expiry
        clock.advance(Duration::hours(1));
        assert_eq!(registry.validate(s.id), Err(SessionError::Revoked(s.id.to_string())));

        // A revoked session frees the course
        assert!(registry.open("CS101", "t-1", anchor(), None).is_ok());
    }

    #[test]
    fn test_handoff_mismatch() {
        let (_, registry) = setup();
        let s = registry.open("CS101", "t-1", anchor(), None).unwrap();

        assert!(registry.validate_handoff(&s.handoff()).is_ok());

        let mut forged = s.handoff();
        forged.session_code = "zzzzzzzzzzzzz".to_string();
        assert_eq!(registry.validate_handoff(&forged), Err(SessionError::Mismatch("sessionCode")));

        let mut forged = s.handoff();
        forged.course_id = "CS999".to_string();
        assert_eq!(registry.validate_handoff(&forged), Err(SessionError::Mismatch("courseId")));
    }

    #[test]
    fn test_unknown_session() {
        let (_, registry) = setup();
        let id = Uuid::new_v4();
        assert_eq!(registry.validate(id), Err(SessionError::NotFound(id.to_string())));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unusable_lifetime_falls_back_to_default() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let config = SessionConfig {
            lifetime_secs: 10_000_000_000_000,
        };
        let registry = SessionRegistry::new(clock, &config);
        let s = registry.open("CS101", "t-1", anchor(), None).unwrap();
        assert_eq!(s.expires_at - s.created_at, Duration::seconds(DEFAULT_SESSION_LIFETIME_SECS));
    }

    #[test]
    fn test_expiry_saturates_at_end_of_time() {
        let (clock, registry) = setup();
        clock.set(DateTime::<Utc>::MAX_UTC - Duration::seconds(10));

        let s = registry.open("CS101", "t-1", anchor(), None).unwrap();
        assert_eq!(s.expires_at, DateTime::<Utc>::MAX_UTC);
        assert!(registry.validate(s.id).is_ok());
    }

    #[test]
    fn test_concurrent_open_admits_one_session() {
        let (_, registry) = setup();
        let registry = Arc::new(registry);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = registry.clone();
                std::thread::spawn(move || registry.open("CS101", &format!("t-{}", i), anchor(), None))
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let opened = results.iter().filter(|r| r.is_ok()).count();
        let refused = results
            .iter()
            .filter(|r| matches!(r, Err(SessionError::Conflict { .. })))
            .count();
        assert_eq!(opened, 1);
        assert_eq!(refused, 7);
        assert_eq!(registry.sessions_for_course("CS101").len(), 1);
    }
}
