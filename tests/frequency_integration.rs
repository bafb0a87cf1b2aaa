//! Integration tests for the acoustic challenge
//!
//! Emit on a recording speaker, feed the played frequency to a synthetic
//! microphone, detect, then judge the detection against the challenge.

use std::sync::Arc;

use chrono::Utc;

use rollcall::config::{EmissionConfig, EmissionMode, FrequencyConfig};
use rollcall::core::{FrequencyDetector, FrequencyEmitter, PresenceEvaluator, PresenceThresholds};
use rollcall::sensors::{AudioOutput, RecordingAudioOutput, ToneAudioCapture};
use rollcall::types::{Coordinate, FrequencyBand, FrequencyChallengeSpec, PresenceReason, SignalMatch};

fn challenge_at(hz: f64) -> FrequencyChallengeSpec {
    FrequencyChallengeSpec {
        band: FrequencyBand::new(18_999.0, 19_401.0).unwrap(),
        chosen_hz: hz,
        issued_at: Utc::now(),
    }
}

fn here() -> Coordinate {
    Coordinate::new(12.9716, 77.5946, 5.0, Utc::now()).unwrap()
}

#[tokio::test]
async fn test_emitted_tone_is_detected_and_matched() {
    let config = FrequencyConfig::default();
    let emitter = FrequencyEmitter::default();
    let challenge = emitter.issue(config.band().unwrap()).unwrap();

    let speaker = Arc::new(RecordingAudioOutput::new());
    let emission = emitter
        .start(
            &challenge,
            speaker.clone() as Arc<dyn AudioOutput>,
            &EmissionConfig {
                mode: EmissionMode::Continuous,
                ..EmissionConfig::default()
            },
        )
        .unwrap();
    let played_hz = speaker.played()[0].hz;
    assert_eq!(played_hz, emission.hz());

    let microphone = ToneAudioCapture::tone(played_hz, 0.2).with_noise(0.001);
    let detector = FrequencyDetector::from_config(&config).unwrap();
    let signal = detector
        .listen(&microphone, &challenge.band, config.listen_window(), config.magnitude_threshold_db)
        .await
        .unwrap()
        .expect("tone should be heard");

    assert!(
        (signal.peak_hz - challenge.chosen_hz).abs() <= config.tolerance_hz(),
        "peak {} vs chosen {}",
        signal.peak_hz,
        challenge.chosen_hz
    );
    assert!(signal.magnitude_db > -30.0);
    assert_eq!(
        challenge.assess(Some(&signal), config.tolerance_hz(), config.magnitude_threshold_db),
        SignalMatch::Matched
    );
    assert_eq!(microphone.active_streams(), 0);

    emission.stop();
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert_eq!(speaker.playing(), 0);
}

#[tokio::test]
async fn test_replayed_tone_from_another_session_is_flagged() {
    let config = FrequencyConfig::default();
    let today = challenge_at(19_100.0);
    // A recording of an earlier session's tone
    let microphone = ToneAudioCapture::tone(19_300.0, 0.2).with_noise(0.001);

    let detector = FrequencyDetector::from_config(&config).unwrap();
    let signal = detector
        .listen(&microphone, &today.band, config.listen_window(), config.magnitude_threshold_db)
        .await
        .unwrap();
    assert!(signal.is_some());

    let evaluator = PresenceEvaluator::new(PresenceThresholds::default());
    let verdict = evaluator.evaluate(&here(), &here(), signal.as_ref(), Some(&today));
    assert!(verdict.potential_proxy);
    assert_eq!(verdict.signal, SignalMatch::OffFrequency);
    assert_eq!(verdict.reason, PresenceReason::R103_PRESENT_SIGNAL_OFF_FREQUENCY);
}

#[tokio::test]
async fn test_silent_room_is_flagged_not_rejected() {
    let config = FrequencyConfig::default();
    let challenge = challenge_at(19_200.0);
    let detector = FrequencyDetector::from_config(&config).unwrap();

    let signal = detector
        .listen(
            &ToneAudioCapture::silence().with_noise(0.001),
            &challenge.band,
            config.listen_window(),
            config.magnitude_threshold_db,
        )
        .await
        .unwrap();
    assert_eq!(signal, None);

    let verdict = PresenceEvaluator::new(PresenceThresholds::default()).evaluate(
        &here(),
        &here(),
        None,
        Some(&challenge),
    );
    assert!(verdict.potential_proxy);
    assert_eq!(verdict.reason, PresenceReason::R102_PRESENT_SIGNAL_ABSENT);
}

#[tokio::test]
async fn test_audible_tone_outside_band_is_ignored() {
    let config = FrequencyConfig::default();
    let challenge = challenge_at(19_200.0);
    let microphone = ToneAudioCapture::tone(1_000.0, 0.5).with_noise(0.001);

    let signal = FrequencyDetector::from_config(&config)
        .unwrap()
        .listen(&microphone, &challenge.band, config.listen_window(), config.magnitude_threshold_db)
        .await
        .unwrap();
    assert_eq!(signal, None);
}

#[tokio::test]
async fn test_muted_speaker_reports_error() {
    let emitter = FrequencyEmitter::default();
    let challenge = challenge_at(19_200.0);
    let result = emitter.start(
        &challenge,
        Arc::new(RecordingAudioOutput::muted()),
        &EmissionConfig::default(),
    );
    assert!(result.is_err());
}
