//! Integration tests for the HTTP API
//!
//! Drives the router with tower's oneshot; no socket is bound.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{Duration, TimeZone, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;

use rollcall::config::RollcallConfig;
use rollcall::core::{create_router, create_router_with, AppState, ManualClock};

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn open(app: &Router, course: &str) -> Value {
    let (status, json) = send(
        app,
        "POST",
        "/sessions",
        Some(json!({
            "course_id": course,
            "owner_id": "t-1",
            "latitude": 12.9716,
            "longitude": 77.5946,
            "accuracy_meters": 5.0
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", json);
    json
}

async fn enroll(app: &Router, course: &str, participant: &str) {
    let (status, _) = send(
        app,
        "POST",
        &format!("/courses/{}/enrollments", course),
        Some(json!({ "participant_id": participant })),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = create_router(RollcallConfig::default());
    let (status, json) = send(&app, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
    assert_eq!(json["sessions_total"], 0);
}

#[tokio::test]
async fn test_open_session_returns_handoff_and_challenge() {
    let app = create_router(RollcallConfig::default());
    let json = open(&app, "CS101").await;

    assert!(json["session_id"].is_string());
    assert_eq!(json["session_code"].as_str().unwrap().len(), 13);
    assert!(json["handoff"].as_str().unwrap().contains('.'));
    let hz = json["challenge_hz"].as_f64().unwrap();
    assert!(hz > 18_999.0 && hz < 19_401.0);
    let expires_in = json["expires_in_secs"].as_i64().unwrap();
    assert!((299..=300).contains(&expires_in));
    assert_eq!(json["websocket_url"], "/ws/CS101");
}

#[tokio::test]
async fn test_second_live_session_conflicts() {
    let app = create_router(RollcallConfig::default());
    open(&app, "CS101").await;

    let (status, json) = send(
        &app,
        "POST",
        "/sessions",
        Some(json!({
            "course_id": "CS101",
            "owner_id": "t-2",
            "latitude": 12.9716,
            "longitude": 77.5946,
            "accuracy_meters": 5.0
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"], "SESSION_CONFLICT");
}

#[tokio::test]
async fn test_unknown_session_is_not_found() {
    let app = create_router(RollcallConfig::default());
    let (status, _) = send(&app, "GET", "/sessions/6f0f6a3e-44b1-4a52-9a59-0b8e6f3b2f10", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, "GET", "/sessions/not-a-uuid", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_attendance_confirmed_then_duplicate() {
    let app = create_router(RollcallConfig::default());
    let session = open(&app, "CS101").await;
    enroll(&app, "CS101", "s-1").await;

    let submission = json!({
        "participant_id": "s-1",
        "handoff": session["handoff"],
        "latitude": 12.9717,
        "longitude": 77.5946,
        "accuracy_meters": 4.0,
        "signal": { "peak_hz": session["challenge_hz"], "magnitude_db": -40.0 }
    });

    let (status, json) = send(&app, "POST", "/attendance", Some(submission.clone())).await;
    assert_eq!(status, StatusCode::OK, "{}", json);
    assert_eq!(json["status"], "PRESENT");
    assert_eq!(json["potential_proxy"], false);
    assert_eq!(json["reason"], "R100_PRESENT_VERIFIED");
    assert!(json["distance_meters"].as_f64().unwrap() < 15.0);

    let (status, json) = send(&app, "POST", "/attendance", Some(submission)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"], "ALREADY_RECORDED");
}

#[tokio::test]
async fn test_attendance_without_signal_is_flagged() {
    let app = create_router(RollcallConfig::default());
    let session = open(&app, "CS101").await;
    enroll(&app, "CS101", "s-1").await;

    let (status, json) = send(
        &app,
        "POST",
        "/attendance",
        Some(json!({
            "participant_id": "s-1",
            "handoff": session["handoff"],
            "latitude": 12.9716,
            "longitude": 77.5946,
            "accuracy_meters": 4.0
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["potential_proxy"], true);
    assert_eq!(json["review_state"], "FLAGGED_FOR_REVIEW");
}

#[tokio::test]
async fn test_attendance_rejects_bad_handoff_and_unenrolled() {
    let app = create_router(RollcallConfig::default());
    let session = open(&app, "CS101").await;

    let (status, json) = send(
        &app,
        "POST",
        "/attendance",
        Some(json!({
            "participant_id": "s-1",
            "handoff": "garbage",
            "latitude": 12.9716,
            "longitude": 77.5946,
            "accuracy_meters": 4.0
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].is_string());

    let (status, json) = send(
        &app,
        "POST",
        "/attendance",
        Some(json!({
            "participant_id": "s-unknown",
            "handoff": session["handoff"],
            "latitude": 12.9716,
            "longitude": 77.5946,
            "accuracy_meters": 4.0
        })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["error"], "NOT_ENROLLED");
}

#[tokio::test]
async fn test_expired_session_is_gone() {
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap()));
    let state = Arc::new(AppState::new(RollcallConfig::default(), clock.clone()));
    let app = create_router_with(state);
    let session = open(&app, "CS101").await;
    enroll(&app, "CS101", "s-1").await;

    clock.advance(Duration::seconds(301));

    let id = session["session_id"].as_str().unwrap();
    let (status, json) = send(&app, "GET", &format!("/sessions/{}", id), None).await;
    assert_eq!(status, StatusCode::GONE);
    assert_eq!(json["error"], "SESSION_EXPIRED");

    let (status, _) = send(&app, "GET", "/courses/CS101/live", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_revoke_requires_owner() {
    let app = create_router(RollcallConfig::default());
    let session = open(&app, "CS101").await;
    let uri = format!("/sessions/{}/revoke", session["session_id"].as_str().unwrap());

    let (status, _) = send(&app, "POST", &uri, Some(json!({ "owner_id": "t-2" }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, json) = send(&app, "POST", &uri, Some(json!({ "owner_id": "t-1" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["state"], "REVOKED");

    // Course is free again
    open(&app, "CS101").await;
}

#[tokio::test]
async fn test_summary_counts_sessions() {
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap()));
    let app = create_router_with(Arc::new(AppState::new(RollcallConfig::default(), clock.clone())));
    enroll(&app, "CS101", "s-1").await;

    let first = open(&app, "CS101").await;
    let (status, _) = send(
        &app,
        "POST",
        "/attendance",
        Some(json!({
            "participant_id": "s-1",
            "handoff": first["handoff"],
            "latitude": 12.9716,
            "longitude": 77.5946,
            "accuracy_meters": 4.0,
            "signal": { "peak_hz": first["challenge_hz"], "magnitude_db": -50.0 }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Next day, missed
    clock.advance(Duration::hours(24));
    open(&app, "CS101").await;

    let (status, json) = send(&app, "GET", "/courses/CS101/participants/s-1/summary", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total_sessions"], 2);
    assert_eq!(json["present_sessions"], 1);
    assert_eq!(json["attendance_percentage"], 50.0);
}

#[tokio::test]
async fn test_session_roster_outlives_expiry() {
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap()));
    let app = create_router_with(Arc::new(AppState::new(RollcallConfig::default(), clock.clone())));
    enroll(&app, "CS101", "s-1").await;
    enroll(&app, "CS101", "s-2").await;
    let session = open(&app, "CS101").await;
    let roster_uri = format!("/sessions/{}/verdicts", session["session_id"].as_str().unwrap());

    let (status, json) = send(&app, "GET", &roster_uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!([]));

    for (participant, latitude) in [("s-1", 12.9716), ("s-2", 12.9816)] {
        let (status, _) = send(
            &app,
            "POST",
            "/attendance",
            Some(json!({
                "participant_id": participant,
                "handoff": session["handoff"],
                "latitude": latitude,
                "longitude": 77.5946,
                "accuracy_meters": 4.0
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    clock.advance(Duration::minutes(10));
    let (status, json) = send(&app, "GET", &roster_uri, None).await;
    assert_eq!(status, StatusCode::OK);
    let roster = json.as_array().unwrap();
    assert_eq!(roster.len(), 2);
    assert_eq!(roster[0]["participant_id"], "s-1");
    assert_eq!(roster[0]["status"], "PRESENT");
    assert_eq!(roster[1]["participant_id"], "s-2");
    assert_eq!(roster[1]["status"], "ABSENT");

    let (status, _) = send(&app, "GET", "/sessions/6f0f6a3e-44b1-4a52-9a59-0b8e6f3b2f10/verdicts", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
