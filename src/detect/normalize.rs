use serde::Serialize;

use super::result::{Bounds, BoundsEncoding, RawDetection, ScoreValue};

/// Label used when a detection carries none.
pub const DEFAULT_LABEL: &str = "pothole";

/// Detector-independent detection in overlay coordinates.
///
/// `bounds.left < bounds.right` and `bounds.top < bounds.bottom` always hold.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CanonicalDetection {
    pub label: String,
    pub confidence: f32,
    pub bounds: Bounds,
}

pub fn resolve_label(raw: &RawDetection) -> String {
    let l = &raw.labels;
    [&l.cls_name, &l.label, &l.class_name, &l.name, &l.title]
        .into_iter()
        .find_map(|field| field.clone())
        .unwrap_or_else(|| DEFAULT_LABEL.to_string())
}

/// First score field that coerces to a number; 0.0 when none does.
pub fn resolve_confidence(raw: &RawDetection) -> f32 {
    let s = &raw.scores;
    [&s.prob, &s.confidence, &s.score]
        .into_iter()
        .find_map(|field| field.as_ref().and_then(ScoreValue::coerce))
        .map(|c| c.clamp(0.0, 1.0))
        .unwrap_or(0.0)
}

/// Bounds from the highest-priority encoding, or `None` when no encoding is present or
/// the chosen one is degenerate.
pub fn resolve_bounds(raw: &RawDetection) -> Option<Bounds> {
    let encoding = raw.encodings.iter().min_by_key(|e| e.priority())?;
    let bounds = match *encoding {
        BoundsEncoding::Rect(bounds) => bounds,
        BoundsEncoding::EdgePair {
            left,
            top,
            right,
            bottom,
        } => Bounds {
            left,
            top,
            right,
            bottom,
        },
        BoundsEncoding::CenterSize {
            center_x,
            center_y,
            width,
            height,
        } => Bounds {
            left: center_x - width / 2.0,
            top: center_y - height / 2.0,
            right: center_x + width / 2.0,
            bottom: center_y + height / 2.0,
        },
    };
    let finite = [bounds.left, bounds.top, bounds.right, bounds.bottom]
        .iter()
        .all(|v| v.is_finite());
    (finite && bounds.left < bounds.right && bounds.top < bounds.bottom).then_some(bounds)
}

pub fn normalize(raw: &RawDetection) -> Option<CanonicalDetection> {
    let bounds = resolve_bounds(raw)?;
    Some(CanonicalDetection {
        label: resolve_label(raw),
        confidence: resolve_confidence(raw),
        bounds,
    })
}

/// Normalize a batch, dropping detections that cannot be resolved.
pub fn normalize_batch(batch: &[RawDetection]) -> Vec<CanonicalDetection> {
    let resolved: Vec<_> = batch.iter().filter_map(normalize).collect();
    if resolved.len() < batch.len() {
        log::debug!(
            "dropped {} unrecognized detection(s) of {}",
            batch.len() - resolved.len(),
            batch.len()
        );
    }
    resolved
}
