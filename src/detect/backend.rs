use anyhow::Result;

use crate::detect::result::DetectorOutput;
use crate::frame::Frame;

/// Detector collaborator.
///
/// The model itself is opaque: a backend is invoked once per frame and returns either
/// `DetectorOutput::Empty` or a batch of raw detections in overlay coordinates, along
/// with the inference duration.
///
/// Implementations must treat the frame as read-only and must not retain it beyond the
/// `detect` call.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame.
    fn detect(&mut self, frame: &Frame) -> Result<DetectorOutput>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
