//! Sensor collaborators
//!
//! Callback-style device APIs are modelled as single-producer channels.
//! Each handle owns its device resource and releases it on Drop, so every
//! exit path of a consumer (success, error, timeout, dropped future)
//! unsubscribes from the provider and frees the microphone or speaker.

pub mod simulated;

use std::time::Duration;

use tokio::sync::mpsc;

use crate::types::{AudioError, Coordinate, LocationError};

pub use simulated::{
    PlayedTone, RecordingAudioOutput, ScriptStep, ScriptedLocationProvider, ToneAudioCapture,
};

/// Release action run exactly once when a handle is dropped
pub struct ReleaseGuard(Option<Box<dyn FnOnce() + Send>>);

impl ReleaseGuard {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self(Some(Box::new(release)))
    }
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        if let Some(release) = self.0.take() {
            release();
        }
    }
}

impl std::fmt::Debug for ReleaseGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ReleaseGuard").field(&self.0.is_some()).finish()
    }
}

// =============================================================================
// LOCATION
// =============================================================================

/// Provider accuracy mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccuracyMode {
    /// GPS-grade, slower to first fix
    High,
    /// Network/cached positions, used as fallback
    Low,
}

/// Hard provider failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderFailure {
    PermissionDenied,
    PositionUnavailable(String),
}

/// Push update from a location provider
#[derive(Debug, Clone, PartialEq)]
pub enum LocationEvent {
    Sample(Coordinate),
    Failed(ProviderFailure),
}

/// Live subscription to location updates. Unsubscribes on Drop.
#[derive(Debug)]
pub struct LocationSubscription {
    rx: mpsc::UnboundedReceiver<LocationEvent>,
    _release: ReleaseGuard,
}

impl LocationSubscription {
    pub fn new(rx: mpsc::UnboundedReceiver<LocationEvent>, release: ReleaseGuard) -> Self {
        Self {
            rx,
            _release: release,
        }
    }

    /// Next event in arrival order; None once the provider stops
    pub async fn next(&mut self) -> Option<LocationEvent> {
        self.rx.recv().await
    }
}

/// Source of device location updates
pub trait LocationProvider: Send + Sync {
    /// Start watching position. Fails fast if the provider is unusable.
    fn subscribe(&self, mode: AccuracyMode) -> Result<LocationSubscription, LocationError>;
}

// =============================================================================
// AUDIO
// =============================================================================

/// Open microphone stream of mono f32 buffers. Releases the device on Drop.
#[derive(Debug)]
pub struct AudioStream {
    sample_rate: u32,
    rx: mpsc::UnboundedReceiver<Vec<f32>>,
    _release: ReleaseGuard,
}

impl AudioStream {
    pub fn new(sample_rate: u32, rx: mpsc::UnboundedReceiver<Vec<f32>>, release: ReleaseGuard) -> Self {
        Self {
            sample_rate,
            rx,
            _release: release,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Next captured buffer; None once the device stops
    pub async fn next(&mut self) -> Option<Vec<f32>> {
        self.rx.recv().await
    }
}

/// Microphone
pub trait AudioCapture: Send + Sync {
    fn open(&self, sample_rate: u32) -> Result<AudioStream, AudioError>;
}

/// How long a tone plays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToneDuration {
    /// Until the handle is dropped
    Continuous,
    Fixed(Duration),
}

/// A playing tone. Stops on Drop.
#[derive(Debug)]
pub struct ToneHandle {
    hz: f64,
    _release: ReleaseGuard,
}

impl ToneHandle {
    pub fn new(hz: f64, release: ReleaseGuard) -> Self {
        Self {
            hz,
            _release: release,
        }
    }

    pub fn hz(&self) -> f64 {
        self.hz
    }
}

/// Speaker
pub trait AudioOutput: Send + Sync {
    fn play_tone(&self, hz: f64, duration: ToneDuration) -> Result<ToneHandle, AudioError>;
}
