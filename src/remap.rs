//! Overlay-space to frame-pixel remapping.
//!
//! Detections arrive in the coordinate space of the display overlay. Saved images use
//! the source frame, so every box is scaled per axis, clamped into the frame and given
//! a minimum 1x1 size. Remapping never fails; degenerate or out-of-frame input collapses
//! to a small box at a clamped position.

use serde::{Deserialize, Serialize};

use crate::detect::CanonicalDetection;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Box in source-frame pixel coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct RemappedBox {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
    pub label: String,
    pub confidence: f32,
}

/// Independent per-axis scale factors. A zero overlay dimension scales by 1.0.
pub fn scale_factors(overlay: Dimensions, frame: Dimensions) -> (f32, f32) {
    let scale = |frame_dim: u32, overlay_dim: u32| {
        if overlay_dim == 0 {
            1.0
        } else {
            frame_dim as f32 / overlay_dim as f32
        }
    };
    (
        scale(frame.width, overlay.width),
        scale(frame.height, overlay.height),
    )
}

fn clamp_edge(value: f32, dim: u32) -> u32 {
    let max = dim.saturating_sub(1) as f32;
    // `max(0.0)` also maps NaN to 0.
    value.max(0.0).min(max) as u32
}

pub fn remap(det: &CanonicalDetection, overlay: Dimensions, frame: Dimensions) -> RemappedBox {
    let (sx, sy) = scale_factors(overlay, frame);
    let b = det.bounds;

    let left = clamp_edge(b.left * sx, frame.width);
    let top = clamp_edge(b.top * sy, frame.height);
    let right = clamp_edge(b.right * sx, frame.width);
    let bottom = clamp_edge(b.bottom * sy, frame.height);

    RemappedBox {
        x: left,
        y: top,
        w: right.saturating_sub(left).max(1),
        h: bottom.saturating_sub(top).max(1),
        label: det.label.clone(),
        confidence: det.confidence,
    }
}
