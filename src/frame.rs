//! Frames and the single-slot frame exchange.
//!
//! - `Frame`: immutable RGBA pixel buffer plus capture time.
//! - `FrameSlot`: holds the most recent frame only. Every publish overwrites the
//!   previous frame; there is no queue and no backpressure.
//!
//! Frames are shared as `Arc<Frame>`. Publishing swaps the pointer under a short lock,
//! so a reader either sees the old frame or the new one, never a partial buffer, and
//! keeps its snapshot alive after later publishes.

use image::RgbaImage;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::remap::Dimensions;

/// Captured frame. There is no mutable access to the pixels after construction.
#[derive(Debug)]
pub struct Frame {
    image: RgbaImage,
    captured_at_ms: u64,
}

impl Frame {
    pub fn new(image: RgbaImage, captured_at_ms: u64) -> Self {
        Self {
            image,
            captured_at_ms,
        }
    }

    /// Build a frame from raw RGBA8 bytes. Returns `None` when the length does not
    /// match the dimensions.
    pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>, captured_at_ms: u64) -> Option<Self> {
        RgbaImage::from_raw(width, height, pixels).map(|image| Self::new(image, captured_at_ms))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width(), self.height())
    }

    pub fn captured_at_ms(&self) -> u64 {
        self.captured_at_ms
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Raw RGBA8 bytes, row-major. Read-only.
    pub fn pixels(&self) -> &[u8] {
        self.image.as_raw()
    }
}

/// Latest-frame exchange between the capture loop and persistence tasks.
#[derive(Debug, Default)]
pub struct FrameSlot {
    latest: Mutex<Option<Arc<Frame>>>,
    published: AtomicU64,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the held frame. The previous frame is dropped once its last reader
    /// releases it.
    pub fn publish(&self, frame: Frame) {
        let frame = Arc::new(frame);
        // The slot only ever holds a whole Arc, so a poisoned lock is still consistent.
        let previous = {
            let mut slot = self.latest.lock().unwrap_or_else(PoisonError::into_inner);
            slot.replace(frame)
        };
        drop(previous);
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot of whatever frame is present now, or `None` if nothing was captured.
    pub fn snapshot(&self) -> Option<Arc<Frame>> {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of frames published since creation.
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}
