//! Core modules for Rollcall

pub mod api;
pub mod checkin;
pub mod clock;
pub mod evaluator;
pub mod frequency;
pub mod geo;
pub mod handoff;
pub mod recorder;
pub mod registry;
pub mod sampler;
pub mod spectrum;

pub use api::{create_router, create_router_with, run_server, AppState};
pub use checkin::{CheckIn, CheckInReport, LaunchedSession, SessionLauncher};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use evaluator::{evaluate, PresenceEvaluator, PresenceThresholds};
pub use frequency::{Emission, FrequencyDetector, FrequencyEmitter};
pub use geo::{distance_meters, haversine_meters, offset_meters, WeightedCentroid};
pub use recorder::{AttendanceRecorder, EnrollmentStore, InMemoryEnrollment};
pub use registry::SessionRegistry;
pub use sampler::{GeolocationSampler, SamplerParams};
pub use spectrum::{SpectralPeak, SpectrumAnalyzer};
