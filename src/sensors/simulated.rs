//! Simulated sensors for testing, demos and development

use std::f64::consts::PI;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;

use crate::core::clock::{SharedClock, SystemClock};
use crate::sensors::{
    AccuracyMode, AudioCapture, AudioOutput, AudioStream, LocationEvent, LocationProvider,
    LocationSubscription, ProviderFailure, ReleaseGuard, ToneDuration, ToneHandle,
};
use crate::types::{AudioError, Coordinate, LocationError};

// =============================================================================
// LOCATION
// =============================================================================

/// One scripted provider event
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptStep {
    /// Reading delivered after `delay`
    Fix {
        latitude: f64,
        longitude: f64,
        accuracy_meters: f64,
        delay: Duration,
    },
    /// Hard failure delivered after `delay`
    Fail {
        failure: ProviderFailure,
        delay: Duration,
    },
}

impl ScriptStep {
    pub fn fix(latitude: f64, longitude: f64, accuracy_meters: f64) -> Self {
        Self::Fix {
            latitude,
            longitude,
            accuracy_meters,
            delay: Duration::ZERO,
        }
    }

    pub fn fix_after(latitude: f64, longitude: f64, accuracy_meters: f64, delay: Duration) -> Self {
        Self::Fix {
            latitude,
            longitude,
            accuracy_meters,
            delay,
        }
    }

    pub fn fail(failure: ProviderFailure) -> Self {
        Self::Fail {
            failure,
            delay: Duration::ZERO,
        }
    }
}

/// Location provider that replays a fixed script per accuracy mode
pub struct ScriptedLocationProvider {
    high: Vec<ScriptStep>,
    low: Vec<ScriptStep>,
    permission_denied: bool,
    /// Close the channel after the script; otherwise keep it open silently
    close_when_done: bool,
    clock: SharedClock,
    active: Arc<AtomicUsize>,
    subscribed: Arc<AtomicUsize>,
}

impl ScriptedLocationProvider {
    /// Provider replaying `high` in high-accuracy mode
    pub fn new(high: Vec<ScriptStep>) -> Self {
        Self {
            high,
            low: Vec::new(),
            permission_denied: false,
            close_when_done: false,
            clock: Arc::new(SystemClock),
            active: Arc::new(AtomicUsize::new(0)),
            subscribed: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Script used when the sampler falls back to low accuracy
    pub fn with_low_accuracy(mut self, low: Vec<ScriptStep>) -> Self {
        self.low = low;
        self
    }

    /// Refuse every subscription, like a denied permission prompt
    pub fn denied() -> Self {
        let mut provider = Self::new(Vec::new());
        provider.permission_denied = true;
        provider
    }

    pub fn closing_when_done(mut self) -> Self {
        self.close_when_done = true;
        self
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Subscriptions currently held
    pub fn active_subscriptions(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Subscriptions ever handed out
    pub fn total_subscriptions(&self) -> usize {
        self.subscribed.load(Ordering::SeqCst)
    }
}

impl LocationProvider for ScriptedLocationProvider {
    fn subscribe(&self, mode: AccuracyMode) -> Result<LocationSubscription, LocationError> {
        if self.permission_denied {
            return Err(LocationError::Unavailable("permission denied".to_string()));
        }

        let script = match mode {
            AccuracyMode::High => self.high.clone(),
            AccuracyMode::Low => self.low.clone(),
        };
        let (tx, rx) = mpsc::unbounded_channel();
        let clock = self.clock.clone();
        let close_when_done = self.close_when_done;

        let task = tokio::spawn(async move {
            for step in script {
                let (delay, event) = match step {
                    ScriptStep::Fix {
                        latitude,
                        longitude,
                        accuracy_meters,
                        delay,
                    } => (
                        delay,
                        // Raw readings pass through unchecked; the sampler validates
                        LocationEvent::Sample(Coordinate {
                            latitude,
                            longitude,
                            accuracy_meters,
                            captured_at: clock.now(),
                        }),
                    ),
                    ScriptStep::Fail { failure, delay } => (delay, LocationEvent::Failed(failure)),
                };
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                if tx.send(event).is_err() {
                    return;
                }
            }
            if !close_when_done {
                tx.closed().await;
            }
        });

        self.active.fetch_add(1, Ordering::SeqCst);
        self.subscribed.fetch_add(1, Ordering::SeqCst);
        let active = self.active.clone();
        let release = ReleaseGuard::new(move || {
            task.abort();
            active.fetch_sub(1, Ordering::SeqCst);
        });

        Ok(LocationSubscription::new(rx, release))
    }
}

// =============================================================================
// AUDIO CAPTURE
// =============================================================================

/// Microphone that hears a sine tone over seeded white noise
pub struct ToneAudioCapture {
    tone_hz: Option<f64>,
    amplitude: f64,
    noise_amplitude: f64,
    buffer_len: usize,
    /// Total audio produced before the stream ends
    total_samples: usize,
    /// Sleep one buffer period between buffers
    realtime: bool,
    unavailable: bool,
    seed: u64,
    active: Arc<AtomicUsize>,
}

impl ToneAudioCapture {
    /// Capture hearing `tone_hz` at `amplitude` (full scale = 1.0)
    pub fn tone(tone_hz: f64, amplitude: f64) -> Self {
        Self {
            tone_hz: Some(tone_hz),
            amplitude,
            noise_amplitude: 0.0,
            buffer_len: 4096,
            total_samples: 65_536,
            realtime: false,
            unavailable: false,
            seed: 7,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Capture hearing only noise
    pub fn silence() -> Self {
        let mut capture = Self::tone(0.0, 0.0);
        capture.tone_hz = None;
        capture
    }

    /// Microphone missing or permission denied
    pub fn unavailable() -> Self {
        let mut capture = Self::silence();
        capture.unavailable = true;
        capture
    }

    pub fn with_noise(mut self, noise_amplitude: f64) -> Self {
        self.noise_amplitude = noise_amplitude;
        self
    }

    pub fn with_total_samples(mut self, total_samples: usize) -> Self {
        self.total_samples = total_samples;
        self
    }

    pub fn with_buffer_len(mut self, buffer_len: usize) -> Self {
        self.buffer_len = buffer_len.max(1);
        self
    }

    pub fn realtime(mut self) -> Self {
        self.realtime = true;
        self
    }

    /// Streams currently open
    pub fn active_streams(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

impl AudioCapture for ToneAudioCapture {
    fn open(&self, sample_rate: u32) -> Result<AudioStream, AudioError> {
        if self.unavailable {
            return Err(AudioError::Unavailable("microphone permission denied".to_string()));
        }
        if sample_rate == 0 {
            return Err(AudioError::InvalidFormat("sample rate must be positive".to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let tone_hz = self.tone_hz;
        let amplitude = self.amplitude;
        let noise_amplitude = self.noise_amplitude;
        let buffer_len = self.buffer_len;
        let total_samples = self.total_samples;
        let realtime = self.realtime;
        let seed = self.seed;
        let period = Duration::from_secs_f64(buffer_len as f64 / sample_rate as f64);

        let task = tokio::spawn(async move {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut n = 0usize;
            while n < total_samples {
                let len = buffer_len.min(total_samples - n);
                let buffer: Vec<f32> = (0..len)
                    .map(|i| {
                        let t = (n + i) as f64 / sample_rate as f64;
                        let tone = tone_hz.map_or(0.0, |hz| amplitude * (2.0 * PI * hz * t).sin());
                        let noise = if noise_amplitude > 0.0 {
                            rng.gen_range(-noise_amplitude..noise_amplitude)
                        } else {
                            0.0
                        };
                        (tone + noise) as f32
                    })
                    .collect();
                n += len;
                if tx.send(buffer).is_err() {
                    return;
                }
                if realtime {
                    tokio::time::sleep(period).await;
                }
            }
        });

        self.active.fetch_add(1, Ordering::SeqCst);
        let active = self.active.clone();
        let release = ReleaseGuard::new(move || {
            task.abort();
            active.fetch_sub(1, Ordering::SeqCst);
        });

        Ok(AudioStream::new(sample_rate, rx, release))
    }
}

// =============================================================================
// AUDIO OUTPUT
// =============================================================================

/// A tone the recording speaker was asked to play
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayedTone {
    pub hz: f64,
    pub duration: ToneDuration,
}

/// Speaker that records what it plays
#[derive(Default)]
pub struct RecordingAudioOutput {
    played: Arc<Mutex<Vec<PlayedTone>>>,
    playing: Arc<AtomicUsize>,
    muted: bool,
}

impl RecordingAudioOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Speaker that refuses to play
    pub fn muted() -> Self {
        Self {
            muted: true,
            ..Self::default()
        }
    }

    /// Every tone started so far
    pub fn played(&self) -> Vec<PlayedTone> {
        self.played.lock().map(|p| p.clone()).unwrap_or_default()
    }

    /// Tones still sounding
    pub fn playing(&self) -> usize {
        self.playing.load(Ordering::SeqCst)
    }
}

impl AudioOutput for RecordingAudioOutput {
    fn play_tone(&self, hz: f64, duration: ToneDuration) -> Result<ToneHandle, AudioError> {
        if self.muted {
            return Err(AudioError::Unavailable("speaker muted".to_string()));
        }
        if let Ok(mut played) = self.played.lock() {
            played.push(PlayedTone { hz, duration });
        }
        self.playing.fetch_add(1, Ordering::SeqCst);
        let playing = self.playing.clone();
        Ok(ToneHandle::new(
            hz,
            ReleaseGuard::new(move || {
                playing.fetch_sub(1, Ordering::SeqCst);
            }),
        ))
    }
}
