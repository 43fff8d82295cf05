//! Producer-facing entry points.
//!
//! `Pipeline` is what the capture loop talks to: frames go into the slot, detector
//! output updates the live overlay and, when the session admits the batch, spawns a
//! persistence task. None of these calls wait on persistence.

use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::detect::{normalize_batch, CanonicalDetection, DetectionBatch, DetectorOutput};
use crate::frame::{Frame, FrameSlot};
use crate::persist::{PersistJob, Persister};
use crate::remap::Dimensions;
use crate::session::SessionController;

/// What the display currently shows over the camera preview.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LiveOverlay {
    pub detections: Vec<CanonicalDetection>,
    pub inference: Duration,
}

pub struct Pipeline {
    session: Arc<SessionController>,
    frames: Arc<FrameSlot>,
    persister: Arc<Persister>,
    overlay_size: Mutex<Dimensions>,
    live: Mutex<LiveOverlay>,
}

impl Pipeline {
    pub fn new(
        session: Arc<SessionController>,
        frames: Arc<FrameSlot>,
        persister: Arc<Persister>,
        overlay_size: Dimensions,
    ) -> Self {
        Self {
            session,
            frames,
            persister,
            overlay_size: Mutex::new(overlay_size),
            live: Mutex::new(LiveOverlay::default()),
        }
    }

    pub fn session(&self) -> &Arc<SessionController> {
        &self.session
    }

    pub fn frames(&self) -> &Arc<FrameSlot> {
        &self.frames
    }

    pub fn on_frame(&self, frame: Frame) {
        self.frames.publish(frame);
    }

    /// The overlay view was resized; later batches are remapped against the new size.
    pub fn set_overlay_size(&self, size: Dimensions) {
        *self.overlay_size.lock().unwrap_or_else(PoisonError::into_inner) = size;
    }

    pub fn overlay_size(&self) -> Dimensions {
        *self.overlay_size.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn overlay_snapshot(&self) -> LiveOverlay {
        self.live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn on_output(&self, output: DetectorOutput, now_ms: u64) -> Option<JoinHandle<()>> {
        match output {
            DetectorOutput::Empty => {
                self.on_empty();
                None
            }
            DetectorOutput::Batch(batch) => self.on_detections(batch, now_ms),
        }
    }

    /// Update the live overlay and, if the session admits the batch, start a
    /// persistence task. Returns the task handle for callers that want to wait on it.
    pub fn on_detections(&self, batch: DetectionBatch, now_ms: u64) -> Option<JoinHandle<()>> {
        {
            let mut live = self.live.lock().unwrap_or_else(PoisonError::into_inner);
            live.detections = normalize_batch(&batch.detections);
            live.inference = batch.inference;
        }

        if !self.session.admit_batch(batch.detections.len(), now_ms) {
            return None;
        }
        let job = PersistJob {
            batch: batch.detections,
            overlay: self.overlay_size(),
            admitted_at_ms: now_ms,
        };
        self.persister.spawn(job)
    }

    /// The detector saw nothing; clear the overlay.
    pub fn on_empty(&self) {
        let mut live = self.live.lock().unwrap_or_else(PoisonError::into_inner);
        live.detections.clear();
        live.inference = Duration::ZERO;
    }
}
