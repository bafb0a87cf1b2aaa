//! Reason codes for presence decisions
//! R1xx: every verdict names the rule that produced it

use serde::{Deserialize, Serialize};

/// Why a verdict came out the way it did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[allow(non_camel_case_types)]
pub enum PresenceReason {
    // =========================================================================
    // R10x: In range
    // =========================================================================
    /// Within distance, acoustic challenge matched
    R100_PRESENT_VERIFIED,
    /// Within distance, session has no acoustic challenge
    R101_PRESENT_NO_CHALLENGE,
    /// Within distance, no in-band peak heard
    R102_PRESENT_SIGNAL_ABSENT,
    /// Within distance, peak too far from the challenge frequency
    R103_PRESENT_SIGNAL_OFF_FREQUENCY,
    /// Within distance, peak below the magnitude threshold
    R104_PRESENT_SIGNAL_WEAK,

    // =========================================================================
    // R11x: Out of range
    // =========================================================================
    /// Distance above threshold, signal not consulted
    R110_ABSENT_OUT_OF_RANGE,
}

impl PresenceReason {
    /// Get the code string (for logging)
    pub fn code(&self) -> &'static str {
        match self {
            Self::R100_PRESENT_VERIFIED => "R100_PRESENT_VERIFIED",
            Self::R101_PRESENT_NO_CHALLENGE => "R101_PRESENT_NO_CHALLENGE",
            Self::R102_PRESENT_SIGNAL_ABSENT => "R102_PRESENT_SIGNAL_ABSENT",
            Self::R103_PRESENT_SIGNAL_OFF_FREQUENCY => "R103_PRESENT_SIGNAL_OFF_FREQUENCY",
            Self::R104_PRESENT_SIGNAL_WEAK => "R104_PRESENT_SIGNAL_WEAK",
            Self::R110_ABSENT_OUT_OF_RANGE => "R110_ABSENT_OUT_OF_RANGE",
        }
    }

    /// Get human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            Self::R100_PRESENT_VERIFIED => "Location and acoustic challenge verified",
            Self::R101_PRESENT_NO_CHALLENGE => "Location verified, no acoustic challenge configured",
            Self::R102_PRESENT_SIGNAL_ABSENT => "Location plausible, challenge tone not heard",
            Self::R103_PRESENT_SIGNAL_OFF_FREQUENCY => "Location plausible, heard tone does not match challenge",
            Self::R104_PRESENT_SIGNAL_WEAK => "Location plausible, challenge tone too faint",
            Self::R110_ABSENT_OUT_OF_RANGE => "Too far from the session location",
        }
    }

    /// Does this reason call for manual review?
    pub fn needs_review(&self) -> bool {
        !matches!(self, Self::R100_PRESENT_VERIFIED | Self::R101_PRESENT_NO_CHALLENGE)
    }
}

impl std::fmt::Display for PresenceReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code(), self.description())
    }
}
