//! Attendance recorder
//!
//! Persists verdicts exactly once per participant and course inside the
//! cooldown window. Check and insert happen under one lock so two
//! concurrent submissions cannot both succeed. Every successful write is
//! broadcast to live subscribers (the instructor dashboard).

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::AttendanceConfig;
use crate::core::clock::{SharedClock, SystemClock};
use crate::types::{
    AttendanceStatus, AttendanceSummary, AttendanceVerdict, Coordinate, RecordError, Session,
    SessionState, Verdict, VerdictNotification,
};
use crate::DEFAULT_COOLDOWN_HOURS;

/// Capacity of the notification channel
const NOTIFY_CAPACITY: usize = 256;

/// Course membership lookup
pub trait EnrollmentStore: Send + Sync {
    fn is_enrolled(&self, participant_id: &str, course_id: &str) -> bool;
}

/// Enrollment held in memory
#[derive(Debug, Default)]
pub struct InMemoryEnrollment {
    courses: RwLock<HashMap<String, HashSet<String>>>,
}

impl InMemoryEnrollment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enroll(&self, participant_id: &str, course_id: &str) {
        if let Ok(mut courses) = self.courses.write() {
            courses
                .entry(course_id.to_string())
                .or_default()
                .insert(participant_id.to_string());
        }
    }
}

impl EnrollmentStore for InMemoryEnrollment {
    fn is_enrolled(&self, participant_id: &str, course_id: &str) -> bool {
        self.courses
            .read()
            .map(|c| c.get(course_id).map_or(false, |p| p.contains(participant_id)))
            .unwrap_or(false)
    }
}

/// Idempotent verdict store
pub struct AttendanceRecorder {
    enrollment: Arc<dyn EnrollmentStore>,
    clock: SharedClock,
    cooldown: Duration,
    ledger: Mutex<Vec<AttendanceVerdict>>,
    notify: broadcast::Sender<VerdictNotification>,
}

impl AttendanceRecorder {
    pub fn new(enrollment: Arc<dyn EnrollmentStore>, clock: SharedClock, config: &AttendanceConfig) -> Self {
        let (notify, _) = broadcast::channel(NOTIFY_CAPACITY);
        Self {
            enrollment,
            clock,
            cooldown: config.cooldown().unwrap_or_else(|err| {
                warn!(%err, "unusable cooldown, using default");
                Duration::hours(DEFAULT_COOLDOWN_HOURS)
            }),
            ledger: Mutex::new(Vec::new()),
            notify,
        }
    }

    /// Recorder over `enrollment` with the system clock and default cooldown
    pub fn with_enrollment(enrollment: Arc<dyn EnrollmentStore>) -> Self {
        Self::new(enrollment, Arc::new(SystemClock), &AttendanceConfig::default())
    }

    fn ledger(&self) -> MutexGuard<'_, Vec<AttendanceVerdict>> {
        match self.ledger.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Write one verdict.
    ///
    /// Rejected when the participant is not enrolled, the session belongs
    /// to another course, the session stopped being live before the write,
    /// or a verdict already exists for this session or inside the cooldown.
    pub fn record(
        &self,
        participant_id: &str,
        course_id: &str,
        session: &Session,
        verdict: &Verdict,
        participant_location: Coordinate,
    ) -> Result<AttendanceVerdict, RecordError> {
        if !self.enrollment.is_enrolled(participant_id, course_id) {
            warn!(participant_id, course_id, "verdict from non-enrolled participant");
            return Err(RecordError::NotEnrolled {
                participant_id: participant_id.to_string(),
                course_id: course_id.to_string(),
            });
        }
        if session.course_id != course_id {
            return Err(RecordError::CourseMismatch {
                session_course: session.course_id.clone(),
                course_id: course_id.to_string(),
            });
        }

        let mut ledger = self.ledger();
        let now = self.clock.now();

        // Re-checked at write time: the session may have lapsed while sensing
        match session.state_at(now) {
            SessionState::Expired => return Err(RecordError::SessionExpired),
            SessionState::Revoked => return Err(RecordError::SessionRevoked),
            SessionState::Created | SessionState::Live => {}
        }

        let window_start = now.checked_sub_signed(self.cooldown).unwrap_or(DateTime::<Utc>::MIN_UTC);
        let duplicate = ledger.iter().any(|v| {
            v.participant_id == participant_id
                && v.course_id == course_id
                && (v.session_id == session.id || v.decided_at > window_start)
        });
        if duplicate {
            info!(participant_id, course_id, "attendance already recorded");
            return Err(RecordError::AlreadyRecorded {
                participant_id: participant_id.to_string(),
                course_id: course_id.to_string(),
            });
        }

        let record = AttendanceVerdict {
            participant_id: participant_id.to_string(),
            course_id: course_id.to_string(),
            session_id: session.id,
            status: verdict.status,
            potential_proxy: verdict.potential_proxy,
            participant_location,
            distance_meters: verdict.distance_meters,
            reason: verdict.reason,
            decided_at: now,
        };
        ledger.push(record.clone());
        drop(ledger);

        info!(
            participant_id,
            course_id,
            session_id = %session.id,
            status = %record.status,
            potential_proxy = record.potential_proxy,
            reason = record.reason.code(),
            "verdict recorded"
        );
        // No subscribers is fine
        let _ = self.notify.send(VerdictNotification::from(&record));
        Ok(record)
    }

    /// Live feed of recorded verdicts
    pub fn subscribe(&self) -> broadcast::Receiver<VerdictNotification> {
        self.notify.subscribe()
    }

    /// Every verdict recorded for one session
    pub fn verdicts_for_session(&self, session_id: Uuid) -> Vec<AttendanceVerdict> {
        self.ledger()
            .iter()
            .filter(|v| v.session_id == session_id)
            .cloned()
            .collect()
    }

    /// Every verdict for a participant in a course, oldest first
    pub fn verdicts_for(&self, participant_id: &str, course_id: &str) -> Vec<AttendanceVerdict> {
        self.ledger()
            .iter()
            .filter(|v| v.participant_id == participant_id && v.course_id == course_id)
            .cloned()
            .collect()
    }

    /// Attendance totals against the number of sessions the course held
    pub fn summary(&self, participant_id: &str, course_id: &str, total_sessions: usize) -> AttendanceSummary {
        let verdicts = self.verdicts_for(participant_id, course_id);
        let present: Vec<_> = verdicts
            .iter()
            .filter(|v| v.status == AttendanceStatus::Present)
            .collect();
        let flagged = present.iter().filter(|v| v.potential_proxy).count();
        AttendanceSummary::new(
            participant_id,
            course_id,
            total_sessions.max(verdicts.len()),
            present.len(),
            flagged,
        )
    }

    pub fn len(&self) -> usize {
        self.ledger().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// TESTS
// =============================================================================
