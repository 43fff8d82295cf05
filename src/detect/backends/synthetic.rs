use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Instant;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{
    Bounds, BoundsEncoding, DetectionBatch, DetectorOutput, RawDetection, ScoreValue,
};
use crate::frame::Frame;
use crate::remap::Dimensions;

/// Synthetic detector for tests and demos.
///
/// Emits hazards at random positions in overlay coordinates, cycling through every
/// bounds encoding so the whole normalization path is exercised. About
/// `hit_rate` of frames yield a batch; the rest report `Empty`.
pub struct SyntheticBackend {
    overlay: Dimensions,
    hit_rate: f64,
    rng: StdRng,
    frames_seen: u64,
}

impl SyntheticBackend {
    pub fn new(overlay: Dimensions, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            overlay,
            hit_rate: 0.3,
            rng,
            frames_seen: 0,
        }
    }

    pub fn with_hit_rate(mut self, hit_rate: f64) -> Self {
        self.hit_rate = hit_rate.clamp(0.0, 1.0);
        self
    }

    fn random_detection(&mut self, index: u64) -> RawDetection {
        let w = self.overlay.width.max(2) as f32;
        let h = self.overlay.height.max(2) as f32;
        let box_w = self.rng.gen_range(w * 0.05..w * 0.3);
        let box_h = self.rng.gen_range(h * 0.05..h * 0.2);
        let left = self.rng.gen_range(0.0..w - box_w);
        // Road hazards sit in the lower half of the view.
        let top = self.rng.gen_range(h * 0.5..h - box_h);
        let confidence: f64 = self.rng.gen_range(0.35..0.99);

        let encoding = match index % 3 {
            0 => BoundsEncoding::EdgePair {
                left,
                top,
                right: left + box_w,
                bottom: top + box_h,
            },
            1 => BoundsEncoding::CenterSize {
                center_x: left + box_w / 2.0,
                center_y: top + box_h / 2.0,
                width: box_w,
                height: box_h,
            },
            _ => BoundsEncoding::Rect(Bounds {
                left,
                top,
                right: left + box_w,
                bottom: top + box_h,
            }),
        };

        let mut raw = RawDetection::default().with_encoding(encoding);
        if index % 2 == 0 {
            raw.labels.cls_name = Some("pothole".to_string());
            raw.scores.prob = Some(ScoreValue::Number(confidence));
        } else {
            raw.labels.label = Some("crack".to_string());
            raw.scores.score = Some(ScoreValue::Text(format!("{:.3}", confidence)));
        }
        raw
    }
}

impl DetectorBackend for SyntheticBackend {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    fn detect(&mut self, _frame: &Frame) -> Result<DetectorOutput> {
        let started = Instant::now();
        self.frames_seen += 1;

        if !self.rng.gen_bool(self.hit_rate) {
            return Ok(DetectorOutput::Empty);
        }

        let count = self.rng.gen_range(1..=3u64);
        let detections = (0..count)
            .map(|i| self.random_detection(self.frames_seen + i))
            .collect();

        Ok(DetectorOutput::Batch(DetectionBatch {
            detections,
            inference: started.elapsed(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::normalize_batch;
    use image::RgbaImage;

    #[test]
    fn synthetic_detections_always_normalize() {
        let overlay = Dimensions::new(320, 240);
        let mut backend = SyntheticBackend::new(overlay, Some(7)).with_hit_rate(1.0);
        let frame = Frame::new(RgbaImage::new(4, 4), 0);

        for _ in 0..50 {
            let DetectorOutput::Batch(batch) = backend.detect(&frame).unwrap() else {
                panic!("hit rate 1.0 must always produce a batch");
            };
            assert!(!batch.detections.is_empty());
            let canonical = normalize_batch(&batch.detections);
            assert_eq!(canonical.len(), batch.detections.len());
            for det in canonical {
                assert!(det.bounds.right <= overlay.width as f32);
                assert!(det.bounds.bottom <= overlay.height as f32);
                assert!(det.confidence > 0.0 && det.confidence <= 1.0);
            }
        }
    }

    #[test]
    fn zero_hit_rate_reports_empty() {
        let mut backend =
            SyntheticBackend::new(Dimensions::new(100, 100), Some(1)).with_hit_rate(0.0);
        let frame = Frame::new(RgbaImage::new(2, 2), 0);
        assert!(matches!(
            backend.detect(&frame).unwrap(),
            DetectorOutput::Empty
        ));
    }
}
