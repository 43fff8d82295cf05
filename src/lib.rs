//! Road Analytics recorder
//!
//! This crate implements the on-device core that turns a live stream of camera frames
//! and object detections into a durable record of road hazards.
//!
//! # Architecture
//!
//! A detection is only recorded when all of the following hold:
//!
//! 1. **Armed session**: the user started a session, and the start was accepted
//!    because the position fix was trustworthy at that moment.
//! 2. **Rate limit**: at least the minimum save interval passed since the last
//!    accepted save.
//! 3. **Frame available**: the frame slot holds a captured frame.
//!
//! Persistence runs off the producer thread. Failures are reported and logged, and
//! never stop capture.
//!
//! # Module Structure
//!
//! - `fix`: Position fixes, the fix quality gate, the latest-fix cell
//! - `session`: Session state machine and the rate limiter it owns
//! - `frame`: Frames and the single-slot frame exchange
//! - `detect`: Raw detection shapes, normalization, detector backends
//! - `remap`: Overlay-space to frame-pixel remapping
//! - `render`: Annotated image rendering
//! - `detection_log`: Append-only CSV detection log
//! - `storage`: Image storage collaborators
//! - `persist`: Persistence orchestration
//! - `pipeline`: Producer-facing entry points
//! - `ingest`: Synthetic frame and position sources
//! - `config`: Recorder configuration (file, then env overrides)

use anyhow::Result;
use std::time::{SystemTime, UNIX_EPOCH};

pub mod config;
pub mod detect;
pub mod detection_log;
pub mod fix;
pub mod frame;
pub mod ingest;
pub mod persist;
pub mod pipeline;
pub mod rate_limit;
pub mod remap;
pub mod render;
pub mod session;
pub mod storage;

pub use detect::{
    normalize, Bounds, BoundsEncoding, CanonicalDetection, DetectionBatch, DetectorBackend,
    DetectorOutput, RawDetection, ReplayBackend, ScoreValue, SyntheticBackend,
};
pub use detection_log::{DetectionLog, DetectionRecord, LOG_HEADER};
pub use fix::{
    is_good_fix, FixGate, FixRejection, FixSource, FixStatus, FixVerdict, LatestFix, PositionFix,
};
pub use frame::{Frame, FrameSlot};
pub use ingest::{SimulatedFixSource, SourceConfig, SyntheticSource};
pub use persist::{PersistJob, PersistOutcome, PersistSettings, PersistStage, Persister};
pub use pipeline::{LiveOverlay, Pipeline};
pub use rate_limit::RateLimiter;
pub use remap::{remap, scale_factors, Dimensions, RemappedBox};
pub use render::{annotate, tag_text, RenderStyle};
pub use session::{SessionController, SessionError, SessionState};
pub use storage::{FilesystemImageStore, ImageStore, InMemoryImageStore, StoredImage};

/// Wall-clock time in milliseconds since the Unix epoch.
pub fn now_ms() -> Result<u64> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_millis() as u64)
}
