//! Acoustic challenge: emit a random ultrasonic tone, listen for it
//!
//! The emitter side picks a frequency inside the band and drives a
//! speaker. The detector side captures a listening window and reports
//! the strongest in-band peak above the magnitude threshold. Matching a
//! detection against the challenge happens later in the evaluator.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::config::{EmissionConfig, EmissionMode, FrequencyConfig};
use crate::core::clock::{SharedClock, SystemClock};
use crate::core::spectrum::SpectrumAnalyzer;
use crate::sensors::{AudioCapture, AudioOutput, ToneDuration, ToneHandle};
use crate::types::{AudioError, ChallengeError, DetectedSignal, FrequencyBand, FrequencyChallengeSpec};

/// Draws before falling back to the band center
const MAX_DRAWS: usize = 32;

// =============================================================================
// EMITTER
// =============================================================================

/// Issues challenges and plays them
pub struct FrequencyEmitter {
    clock: SharedClock,
}

impl Default for FrequencyEmitter {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl FrequencyEmitter {
    pub fn new(clock: SharedClock) -> Self {
        Self { clock }
    }

    /// Pick a frequency uniformly, strictly inside `band`
    pub fn issue(&self, band: FrequencyBand) -> Result<FrequencyChallengeSpec, ChallengeError> {
        band.validate()?;
        let mut rng = rand::thread_rng();
        let chosen_hz = (0..MAX_DRAWS)
            .map(|_| rng.gen_range(band.low_hz..band.high_hz))
            .find(|hz| band.strictly_contains(*hz))
            .unwrap_or(band.low_hz + band.width_hz() / 2.0);

        debug!(chosen_hz, low = band.low_hz, high = band.high_hz, "challenge issued");
        Ok(FrequencyChallengeSpec {
            band,
            chosen_hz,
            issued_at: self.clock.now(),
        })
    }

    /// Start playing `challenge` on `output`.
    ///
    /// The first tone is started before returning so a missing speaker
    /// surfaces as an error. Playback runs until the configured window
    /// ends or the returned `Emission` is stopped or dropped.
    pub fn start(
        &self,
        challenge: &FrequencyChallengeSpec,
        output: Arc<dyn AudioOutput>,
        config: &EmissionConfig,
    ) -> Result<Emission, AudioError> {
        let hz = challenge.chosen_hz;
        let window = config.window_ms.map(Duration::from_millis);

        let task = match config.mode {
            EmissionMode::Continuous => {
                let tone = output.play_tone(hz, ToneDuration::Continuous)?;
                tokio::spawn(async move {
                    let _tone = tone;
                    match window {
                        Some(window) => sleep(window).await,
                        None => std::future::pending::<()>().await,
                    }
                })
            }
            EmissionMode::PulseTrain => {
                let tone_len = Duration::from_millis(config.tone_ms);
                let gap = Duration::from_millis(config.gap_ms);
                let first = output.play_tone(hz, ToneDuration::Fixed(tone_len))?;
                let deadline = window.map(|w| Instant::now() + w);
                tokio::spawn(pulse_train(output, hz, tone_len, gap, deadline, first))
            }
        };

        info!(hz, mode = ?config.mode, "emission started");
        Ok(Emission { hz, task })
    }
}

async fn pulse_train(
    output: Arc<dyn AudioOutput>,
    hz: f64,
    tone_len: Duration,
    gap: Duration,
    deadline: Option<Instant>,
    first: ToneHandle,
) {
    let mut tone = Some(first);
    loop {
        sleep(tone_len).await;
        tone.take();
        sleep(gap).await;

        if deadline.map_or(false, |d| Instant::now() + tone_len > d) {
            debug!(hz, "emission window over");
            return;
        }
        match output.play_tone(hz, ToneDuration::Fixed(tone_len)) {
            Ok(handle) => tone = Some(handle),
            Err(err) => {
                warn!(%err, "speaker stopped mid-emission");
                return;
            }
        }
    }
}

/// A running emission. Stops on Drop.
#[derive(Debug)]
pub struct Emission {
    hz: f64,
    task: JoinHandle<()>,
}

impl Emission {
    pub fn hz(&self) -> f64 {
        self.hz
    }

    /// True once the window elapsed or the speaker failed
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn stop(self) {}
}

impl Drop for Emission {
    fn drop(&mut self) {
        self.task.abort();
    }
}

// =============================================================================
// DETECTOR
// =============================================================================

/// Listens for the strongest in-band peak
pub struct FrequencyDetector {
    sample_rate: u32,
    transform_size: usize,
    clock: SharedClock,
}

impl FrequencyDetector {
    pub fn new(sample_rate: u32, transform_size: usize) -> Result<Self, ChallengeError> {
        if !transform_size.is_power_of_two() || transform_size < 256 {
            return Err(ChallengeError::InvalidTransformSize(transform_size));
        }
        Ok(Self {
            sample_rate,
            transform_size,
            clock: Arc::new(SystemClock),
        })
    }

    pub fn from_config(config: &FrequencyConfig) -> Result<Self, ChallengeError> {
        Self::new(config.sample_rate, config.transform_size)
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn bin_width_hz(&self) -> f64 {
        self.sample_rate as f64 / self.transform_size as f64
    }

    /// Capture for `window` and report the strongest in-band peak louder
    /// than `threshold_db`. `Ok(None)` means nothing was heard.
    pub async fn listen<C>(
        &self,
        capture: &C,
        band: &FrequencyBand,
        window: Duration,
        threshold_db: f64,
    ) -> Result<Option<DetectedSignal>, AudioError>
    where
        C: AudioCapture + ?Sized,
    {
        self.listen_until(capture, band, window, threshold_db, std::future::pending::<()>())
            .await
    }

    /// Like `listen`, but also ends early when `stop` completes.
    /// The device is released on every exit path.
    pub async fn listen_until<C, F>(
        &self,
        capture: &C,
        band: &FrequencyBand,
        window: Duration,
        threshold_db: f64,
        stop: F,
    ) -> Result<Option<DetectedSignal>, AudioError>
    where
        C: AudioCapture + ?Sized,
        F: Future<Output = ()>,
    {
        if band.high_hz * 2.0 >= self.sample_rate as f64 {
            return Err(AudioError::InvalidFormat(format!(
                "band edge {} Hz is above Nyquist for {} Hz",
                band.high_hz, self.sample_rate
            )));
        }
        let mut analyzer = SpectrumAnalyzer::new(self.sample_rate, self.transform_size)
            .map_err(|e| AudioError::InvalidFormat(e.to_string()))?;

        let mut stream = capture.open(self.sample_rate)?;
        if stream.sample_rate() != self.sample_rate {
            return Err(AudioError::InvalidFormat(format!(
                "device opened at {} Hz, expected {} Hz",
                stream.sample_rate(),
                self.sample_rate
            )));
        }

        let deadline = Instant::now() + window;
        let mut pending: Vec<f32> = Vec::with_capacity(self.transform_size * 2);
        let mut best: Option<DetectedSignal> = None;
        let mut frames = 0usize;
        tokio::pin!(stop);

        loop {
            let buffer = tokio::select! {
                biased;
                _ = &mut stop => {
                    debug!("listening stopped early");
                    break;
                }
                _ = sleep_until(deadline) => break,
                buffer = stream.next() => buffer,
            };
            let Some(buffer) = buffer else {
                debug!("capture stream ended");
                break;
            };

            pending.extend_from_slice(&buffer);
            while pending.len() >= self.transform_size {
                frames += 1;
                if let Some(peak) = analyzer.band_peak(&pending[..self.transform_size], band) {
                    let louder = best.map_or(true, |b| peak.magnitude_db > b.magnitude_db);
                    if peak.magnitude_db > threshold_db && louder {
                        best = Some(DetectedSignal {
                            peak_hz: peak.hz,
                            magnitude_db: peak.magnitude_db,
                            detected_at: self.clock.now(),
                        });
                    }
                }
                pending.drain(..self.transform_size);
            }
        }
        drop(stream);

        match &best {
            Some(signal) => info!(
                frames,
                peak_hz = signal.peak_hz,
                magnitude_db = signal.magnitude_db,
                "challenge tone detected"
            ),
            None => info!(frames, "no tone above threshold"),
        }
        Ok(best)
    }
}

// =============================================================================
// TESTS
// =============================================================================
