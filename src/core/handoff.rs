//! Session handoff payload
//!
//! Carries the session from instructor to participant as a compact,
//! URL-safe string:
//!
//! ```text
//! base64url(json) "." hex(sha256(json)[..8])
//! ```
//!
//! JSON keys are camelCase: ownerId, courseId, sessionCode, expiresAt
//! (ISO-8601), sessionId, anchorLatitude, anchorLongitude.
//! The checksum catches truncated or mangled links. It is not a
//! signature; the registry re-validates every field on check-in.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::types::{HandoffError, SessionHandoff};

/// Checksum bytes appended to the payload
const CHECKSUM_BYTES: usize = 8;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WirePayload<'a> {
    owner_id: &'a str,
    course_id: &'a str,
    session_code: &'a str,
    expires_at: String,
    session_id: String,
    anchor_latitude: f64,
    anchor_longitude: f64,
}

/// Lenient mirror of the wire format so a missing field gets a precise error
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPayload {
    owner_id: Option<String>,
    course_id: Option<String>,
    session_code: Option<String>,
    expires_at: Option<String>,
    session_id: Option<String>,
    anchor_latitude: Option<f64>,
    anchor_longitude: Option<f64>,
}

/// Encode a handoff for embedding in a link or QR code
pub fn encode(handoff: &SessionHandoff) -> Result<String, HandoffError> {
    let wire = WirePayload {
        owner_id: &handoff.owner_id,
        course_id: &handoff.course_id,
        session_code: &handoff.session_code,
        expires_at: handoff.expires_at.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        session_id: handoff.session_id.to_string(),
        anchor_latitude: handoff.anchor_latitude,
        anchor_longitude: handoff.anchor_longitude,
    };
    let json = serde_json::to_string(&wire).map_err(|e| HandoffError::Malformed(e.to_string()))?;
    Ok(seal(&json))
}

/// Wrap raw JSON text into the checksummed wire format
pub fn seal(json: &str) -> String {
    format!("{}.{}", URL_SAFE_NO_PAD.encode(json.as_bytes()), checksum(json.as_bytes()))
}

/// Decode and check a payload. Does not consult the registry.
pub fn decode(payload: &str) -> Result<SessionHandoff, HandoffError> {
    let payload = payload.trim();
    let (body, sum) = payload
        .rsplit_once('.')
        .ok_or_else(|| HandoffError::Malformed("missing checksum".to_string()))?;

    let bytes = URL_SAFE_NO_PAD
        .decode(body)
        .map_err(|e| HandoffError::Encoding(e.to_string()))?;
    if !sum.eq_ignore_ascii_case(&checksum(&bytes)) {
        return Err(HandoffError::Checksum);
    }

    let raw: RawPayload =
        serde_json::from_slice(&bytes).map_err(|e| HandoffError::Malformed(e.to_string()))?;

    let owner_id = raw.owner_id.ok_or(HandoffError::MissingField("ownerId"))?;
    let course_id = raw.course_id.ok_or(HandoffError::MissingField("courseId"))?;
    let session_code = raw.session_code.ok_or(HandoffError::MissingField("sessionCode"))?;
    let expires_at = raw.expires_at.ok_or(HandoffError::MissingField("expiresAt"))?;
    let session_id = raw.session_id.ok_or(HandoffError::MissingField("sessionId"))?;
    let anchor_latitude = raw.anchor_latitude.ok_or(HandoffError::MissingField("anchorLatitude"))?;
    let anchor_longitude = raw
        .anchor_longitude
        .ok_or(HandoffError::MissingField("anchorLongitude"))?;

    let expires_at = DateTime::parse_from_rfc3339(&expires_at)
        .map_err(|_| HandoffError::InvalidExpiry(expires_at.clone()))?
        .with_timezone(&Utc);
    let session_id = Uuid::parse_str(&session_id)
        .map_err(|e| HandoffError::Malformed(format!("sessionId: {}", e)))?;

    Ok(SessionHandoff {
        owner_id,
        course_id,
        session_code,
        expires_at,
        session_id,
        anchor_latitude,
        anchor_longitude,
    })
}

fn checksum(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest[..CHECKSUM_BYTES]
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

// =============================================================================
// TESTS
// =============================================================================
