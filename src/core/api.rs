//! HTTP + WebSocket API for Rollcall
//!
//! Endpoints:
//! - GET /health - Health check
//! - POST /sessions - Open a session
//! - GET /sessions/{id} - Session status and countdown
//! - POST /sessions/{id}/revoke - Revoke a session
//! - GET /sessions/{id}/verdicts - Verdicts recorded against a session
//! - GET /courses/{course_id}/live - Live session for a course
//! - POST /courses/{course_id}/enrollments - Enroll a participant
//! - POST /attendance - Submit a participant check-in
//! - GET /courses/{course_id}/participants/{participant_id}/summary - Attendance totals
//! - WS /ws/{course_id} - Live verdicts for a course

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::RollcallConfig;
use crate::core::clock::{SharedClock, SystemClock};
use crate::core::evaluator::{PresenceEvaluator, PresenceThresholds};
use crate::core::frequency::FrequencyEmitter;
use crate::core::handoff;
use crate::core::recorder::{AttendanceRecorder, InMemoryEnrollment};
use crate::core::registry::SessionRegistry;
use crate::types::{
    AttendanceStatus, AttendanceSummary, AttendanceVerdict, ChallengeError, Coordinate, DetectedSignal, HandoffError,
    RecordError, ReviewState, Session, SessionError, SessionState, VerdictNotification,
};

/// App state
pub struct AppState {
    pub config: RollcallConfig,
    pub clock: SharedClock,
    pub registry: SessionRegistry,
    pub recorder: AttendanceRecorder,
    pub enrollment: Arc<InMemoryEnrollment>,
    pub evaluator: PresenceEvaluator,
    pub emitter: FrequencyEmitter,
}

impl AppState {
    pub fn new(config: RollcallConfig, clock: SharedClock) -> Self {
        let enrollment = Arc::new(InMemoryEnrollment::new());
        Self {
            registry: SessionRegistry::new(clock.clone(), &config.session),
            recorder: AttendanceRecorder::new(enrollment.clone(), clock.clone(), &config.attendance),
            evaluator: PresenceEvaluator::new(PresenceThresholds::from(&config)),
            emitter: FrequencyEmitter::new(clock.clone()),
            enrollment,
            clock,
            config,
        }
    }
}

// =============================================================================
// REQUESTS / RESPONSES
// =============================================================================

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub sessions_total: usize,
    pub verdicts_total: usize,
}

/// Open session request
#[derive(Debug, Deserialize)]
pub struct OpenSessionRequest {
    pub course_id: String,
    pub owner_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy_meters: f64,
    /// Issue an acoustic challenge (default true)
    #[serde(default = "default_true")]
    pub challenge: bool,
}

fn default_true() -> bool {
    true
}

/// Open session response
#[derive(Debug, Serialize)]
pub struct OpenSessionResponse {
    pub session_id: String,
    pub session_code: String,
    pub handoff: String,
    pub challenge_hz: Option<f64>,
    pub expires_at: DateTime<Utc>,
    pub expires_in_secs: i64,
    pub websocket_url: String,
}

/// Session status response
#[derive(Debug, Serialize)]
pub struct SessionStatusResponse {
    pub session_id: String,
    pub course_id: String,
    pub state: SessionState,
    pub expires_at: DateTime<Utc>,
    pub expires_in_secs: i64,
    pub has_challenge: bool,
}

impl SessionStatusResponse {
    fn of(session: &Session, now: DateTime<Utc>) -> Self {
        Self {
            session_id: session.id.to_string(),
            course_id: session.course_id.clone(),
            state: session.state_at(now),
            expires_at: session.expires_at,
            expires_in_secs: session.remaining(now).num_seconds(),
            has_challenge: session.challenge.is_some(),
        }
    }
}

/// Revoke request
#[derive(Debug, Deserialize)]
pub struct RevokeRequest {
    pub owner_id: String,
}

/// Enrollment request
#[derive(Debug, Deserialize)]
pub struct EnrollRequest {
    pub participant_id: String,
}

/// Signal heard by the participant device
#[derive(Debug, Deserialize)]
pub struct SignalReport {
    pub peak_hz: f64,
    pub magnitude_db: f64,
}

/// Attendance submission
#[derive(Debug, Deserialize)]
pub struct AttendanceRequest {
    pub participant_id: String,
    pub handoff: String,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy_meters: f64,
    pub signal: Option<SignalReport>,
}

/// Attendance result
#[derive(Debug, Serialize)]
pub struct AttendanceResponse {
    pub session_id: String,
    pub status: AttendanceStatus,
    pub potential_proxy: bool,
    pub review_state: ReviewState,
    pub reason: String,
    pub description: String,
    pub distance_meters: f64,
}

/// Error body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

// =============================================================================
// ERRORS
// =============================================================================

/// Everything a handler can fail with
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Handoff(HandoffError),
    Session(SessionError),
    Record(RecordError),
    Challenge(ChallengeError),
}

impl From<HandoffError> for ApiError {
    fn from(err: HandoffError) -> Self {
        Self::Handoff(err)
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        Self::Session(err)
    }
}

impl From<RecordError> for ApiError {
    fn from(err: RecordError) -> Self {
        Self::Record(err)
    }
}

impl From<ChallengeError> for ApiError {
    fn from(err: ChallengeError) -> Self {
        Self::Challenge(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::Handoff(_) => StatusCode::BAD_REQUEST,
            Self::Challenge(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Session(err) => match err {
                SessionError::NotFound(_) => StatusCode::NOT_FOUND,
                SessionError::Expired(_) | SessionError::Revoked(_) => StatusCode::GONE,
                SessionError::Conflict { .. } | SessionError::Mismatch(_) => StatusCode::CONFLICT,
                SessionError::NotOwner => StatusCode::FORBIDDEN,
            },
            Self::Record(err) => match err {
                RecordError::NotEnrolled { .. } => StatusCode::FORBIDDEN,
                RecordError::AlreadyRecorded { .. } | RecordError::CourseMismatch { .. } => {
                    StatusCode::CONFLICT
                }
                RecordError::SessionExpired | RecordError::SessionRevoked => StatusCode::GONE,
            },
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Handoff(err) => err.code(),
            Self::Session(err) => err.code(),
            Self::Record(err) => err.code(),
            Self::Challenge(_) => "CHALLENGE_CONFIG",
        }
    }

    fn message(&self) -> String {
        match self {
            Self::BadRequest(msg) => msg.clone(),
            Self::Handoff(err) => err.to_string(),
            Self::Session(err) => err.to_string(),
            Self::Record(err) => err.to_string(),
            Self::Challenge(err) => err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(error = self.code(), message = %self.message(), "request failed");
        } else {
            debug!(error = self.code(), message = %self.message(), "request rejected");
        }
        let body = ErrorResponse {
            error: self.code().to_string(),
            message: self.message(),
        };
        (status, Json(body)).into_response()
    }
}

// =============================================================================
// ROUTER
// =============================================================================

/// Create the API router with fresh state
pub fn create_router(config: RollcallConfig) -> Router {
    create_router_with(Arc::new(AppState::new(config, Arc::new(SystemClock))))
}

/// Create the API router over existing state
pub fn create_router_with(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/sessions", post(open_session))
        .route("/sessions/:id", get(get_session))
        .route("/sessions/:id/revoke", post(revoke_session))
        .route("/sessions/:id/verdicts", get(session_verdicts))
        .route("/courses/:course_id/live", get(live_session))
        .route("/courses/:course_id/enrollments", post(enroll))
        .route(
            "/courses/:course_id/participants/:participant_id/summary",
            get(summary),
        )
        .route("/attendance", post(submit_attendance))
        .route("/ws/:course_id", get(websocket_handler))
        .with_state(state)
}

/// Health check endpoint
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: crate::VERSION.to_string(),
        sessions_total: state.registry.len(),
        verdicts_total: state.recorder.len(),
    })
}

/// Open a session anchored at the instructor's reported location
async fn open_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<OpenSessionRequest>,
) -> Result<Json<OpenSessionResponse>, ApiError> {
    let anchor = coordinate(req.latitude, req.longitude, req.accuracy_meters, state.clock.now())?;
    let challenge = if req.challenge {
        Some(state.emitter.issue(state.config.frequency.band()?)?)
    } else {
        None
    };

    let session = state
        .registry
        .open(&req.course_id, &req.owner_id, anchor, challenge)?;
    let handoff = handoff::encode(&session.handoff())?;
    let now = state.clock.now();

    Ok(Json(OpenSessionResponse {
        session_id: session.id.to_string(),
        session_code: session.session_code.clone(),
        handoff,
        challenge_hz: session.challenge.map(|c| c.chosen_hz),
        expires_at: session.expires_at,
        expires_in_secs: session.remaining(now).num_seconds(),
        websocket_url: format!("/ws/{}", session.course_id),
    }))
}

/// Validate a session and report its countdown
async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionStatusResponse>, ApiError> {
    let session = state.registry.validate(parse_id(&id)?)?;
    Ok(Json(SessionStatusResponse::of(&session, state.clock.now())))
}

/// Revoke a session (owner only)
async fn revoke_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<RevokeRequest>,
) -> Result<Json<SessionStatusResponse>, ApiError> {
    let session = state.registry.revoke(parse_id(&id)?, &req.owner_id)?;
    Ok(Json(SessionStatusResponse::of(&session, state.clock.now())))
}

/// Roster of a session, in recording order. Works after expiry.
async fn session_verdicts(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<AttendanceVerdict>>, ApiError> {
    let session_id = parse_id(&id)?;
    if state.registry.get(session_id).is_none() {
        return Err(SessionError::NotFound(id).into());
    }
    Ok(Json(state.recorder.verdicts_for_session(session_id)))
}

/// Live session for a course
async fn live_session(
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<String>,
) -> Result<Json<SessionStatusResponse>, ApiError> {
    let session = state
        .registry
        .live_for_course(&course_id)
        .ok_or_else(|| SessionError::NotFound(format!("live session for {}", course_id)))?;
    Ok(Json(SessionStatusResponse::of(&session, state.clock.now())))
}

/// Enroll a participant in a course
async fn enroll(
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<String>,
    Json(req): Json<EnrollRequest>,
) -> StatusCode {
    state.enrollment.enroll(&req.participant_id, &course_id);
    info!(participant_id = %req.participant_id, course_id = %course_id, "participant enrolled");
    StatusCode::NO_CONTENT
}

/// Decode the handoff, validate the session, evaluate and record
async fn submit_attendance(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AttendanceRequest>,
) -> Result<Json<AttendanceResponse>, ApiError> {
    let handoff = handoff::decode(&req.handoff)?;
    let session = state.registry.validate_handoff(&handoff)?;

    let now = state.clock.now();
    let participant = coordinate(req.latitude, req.longitude, req.accuracy_meters, now)?;
    let signal = req.signal.map(|s| DetectedSignal {
        peak_hz: s.peak_hz,
        magnitude_db: s.magnitude_db,
        detected_at: now,
    });

    let verdict = state.evaluator.evaluate(
        &session.anchor_location,
        &participant,
        signal.as_ref(),
        session.challenge.as_ref(),
    );
    debug!(
        participant_id = %req.participant_id,
        session_id = %session.id,
        verdict = %verdict.to_parseable_string(),
        "presence evaluated"
    );
    let record = state.recorder.record(
        &req.participant_id,
        &session.course_id,
        &session,
        &verdict,
        participant,
    )?;

    Ok(Json(AttendanceResponse {
        session_id: session.id.to_string(),
        status: record.status,
        potential_proxy: record.potential_proxy,
        review_state: record.review_state(),
        reason: record.reason.code().to_string(),
        description: record.reason.description().to_string(),
        distance_meters: record.distance_meters,
    }))
}

/// Attendance totals for one participant
async fn summary(
    State(state): State<Arc<AppState>>,
    Path((course_id, participant_id)): Path<(String, String)>,
) -> Json<AttendanceSummary> {
    let total = state.registry.sessions_for_course(&course_id).len();
    Json(state.recorder.summary(&participant_id, &course_id, total))
}

/// WebSocket handler for live verdicts
async fn websocket_handler(
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let rx = state.recorder.subscribe();
    ws.on_upgrade(move |socket| handle_websocket(socket, course_id, rx))
}

/// Forward this course's verdicts until either side goes away
async fn handle_websocket(
    socket: WebSocket,
    course_id: String,
    mut rx: broadcast::Receiver<VerdictNotification>,
) {
    let (mut sender, mut receiver) = socket.split();
    loop {
        tokio::select! {
            update = rx.recv() => match update {
                Ok(note) if note.course_id == course_id => {
                    let json = serde_json::to_string(&note).unwrap_or_default();
                    if sender.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, course_id = %course_id, "websocket client lagging");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
        }
    }
    debug!(course_id = %course_id, "websocket closed");
}

fn parse_id(id: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(id).map_err(|_| ApiError::BadRequest(format!("invalid session id: {}", id)))
}

fn coordinate(
    latitude: f64,
    longitude: f64,
    accuracy_meters: f64,
    captured_at: DateTime<Utc>,
) -> Result<Coordinate, ApiError> {
    Coordinate::new(latitude, longitude, accuracy_meters, captured_at)
        .ok_or_else(|| ApiError::BadRequest("invalid coordinate".to_string()))
}

/// Run the API server
pub async fn run_server(addr: &str, config: RollcallConfig) -> Result<(), Box<dyn std::error::Error>> {
    let router = create_router(config);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "rollcall API listening");
    axum::serve(listener, router).await?;
    Ok(())
}
