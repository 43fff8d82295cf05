//! Synthetic frame source.
//!
//! Produces frames for `stub://` URLs: sky over asphalt with lane marks that scroll
//! towards the viewer and a dark patch that drifts across the road every few seconds.

use anyhow::{bail, Result};
use image::{Rgba, RgbaImage};

use crate::frame::Frame;

/// Configuration for a frame source.
#[derive(Clone, Debug, PartialEq)]
pub struct SourceConfig {
    /// Source URL. Only `stub://` is supported.
    pub url: String,
    /// Target frame rate (frames per second).
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: "stub://road".to_string(),
            target_fps: 10,
            width: 640,
            height: 480,
        }
    }
}

/// Frame counters for health reporting.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub url: String,
}

pub struct SyntheticSource {
    config: SourceConfig,
    frame_count: u64,
    connected: bool,
}

const SKY: Rgba<u8> = Rgba([150, 190, 230, 255]);
const ASPHALT: Rgba<u8> = Rgba([70, 70, 74, 255]);
const LANE: Rgba<u8> = Rgba([235, 235, 235, 255]);
const HOLE: Rgba<u8> = Rgba([25, 22, 20, 255]);

impl SyntheticSource {
    pub fn new(config: SourceConfig) -> Result<Self> {
        if !config.url.starts_with("stub://") {
            bail!("unsupported source url {} (only stub:// is available)", config.url);
        }
        if config.width == 0 || config.height == 0 {
            bail!("source dimensions must be non-zero");
        }
        Ok(Self {
            config,
            frame_count: 0,
            connected: false,
        })
    }

    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    /// Synthetic sources are always reachable.
    pub fn connect(&mut self) -> Result<()> {
        log::info!("SyntheticSource: connected to {}", self.config.url);
        self.connected = true;
        Ok(())
    }

    pub fn next_frame(&mut self) -> Result<Frame> {
        if !self.connected {
            bail!("source {} is not connected", self.config.url);
        }
        self.frame_count += 1;
        let image = self.render_scene();
        Ok(Frame::new(image, crate::now_ms()?))
    }

    fn render_scene(&self) -> RgbaImage {
        let (w, h) = (self.config.width, self.config.height);
        let horizon = h / 3;
        let lane_x = w / 2;
        let dash = (h / 12).max(1);
        let scroll = (self.frame_count as u32).wrapping_mul(dash / 4 + 1);

        // A hazard crosses the lower road area once every 64 frames.
        let phase = (self.frame_count % 64) as u32;
        let hole_w = (w / 8).max(1);
        let hole_h = (h / 16).max(1);
        let hole_x = (phase * w / 64).min(w.saturating_sub(hole_w));
        let hole_y = h - h / 4;

        RgbaImage::from_fn(w, h, |x, y| {
            if y < horizon {
                return SKY;
            }
            if x >= hole_x && x < hole_x + hole_w && y >= hole_y && y < hole_y + hole_h {
                return HOLE;
            }
            let on_lane = x.abs_diff(lane_x) <= (w / 160).max(1);
            if on_lane && (y.wrapping_add(scroll) / dash) % 2 == 0 {
                return LANE;
            }
            ASPHALT
        })
    }

    pub fn is_healthy(&self) -> bool {
        self.connected
    }

    pub fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            url: self.config.url.clone(),
        }
    }
}
