use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

/// Axis-aligned rectangle in overlay coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Bounds {
    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }
}

/// One way a detector may describe where an object is.
#[derive(Clone, Debug, PartialEq)]
pub enum BoundsEncoding {
    /// A rectangle object carried as a single field.
    Rect(Bounds),
    /// Explicit corner edges (`x1/y1/x2/y2`, `left/top/right/bottom`).
    EdgePair {
        left: f32,
        top: f32,
        right: f32,
        bottom: f32,
    },
    /// Center point plus size.
    CenterSize {
        center_x: f32,
        center_y: f32,
        width: f32,
        height: f32,
    },
}

impl BoundsEncoding {
    /// Lower wins when a detection exposes more than one encoding.
    pub fn priority(&self) -> u8 {
        match self {
            BoundsEncoding::Rect(_) => 0,
            BoundsEncoding::EdgePair { .. } => 1,
            BoundsEncoding::CenterSize { .. } => 2,
        }
    }
}

/// A score as produced by the detector: numeric, or a numeric string.
#[derive(Clone, Debug, PartialEq)]
pub enum ScoreValue {
    Number(f64),
    Text(String),
}

impl ScoreValue {
    pub fn coerce(&self) -> Option<f32> {
        let value = match self {
            ScoreValue::Number(n) => *n,
            ScoreValue::Text(s) => s.trim().parse::<f64>().ok()?,
        };
        value.is_finite().then_some(value as f32)
    }
}

/// Label-like fields, in resolution priority order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LabelFields {
    pub cls_name: Option<String>,
    pub label: Option<String>,
    pub class_name: Option<String>,
    pub name: Option<String>,
    pub title: Option<String>,
}

/// Score-like fields, in resolution priority order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScoreFields {
    pub prob: Option<ScoreValue>,
    pub confidence: Option<ScoreValue>,
    pub score: Option<ScoreValue>,
}

/// Detection as handed over by a detector backend, before normalization.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawDetection {
    pub labels: LabelFields,
    pub scores: ScoreFields,
    pub encodings: Vec<BoundsEncoding>,
}

const LABEL_KEYS: [&str; 5] = ["clsName", "label", "className", "name", "title"];
const SCORE_KEYS: [&str; 3] = ["prob", "confidence", "score"];

impl RawDetection {
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.labels.label = Some(label.into());
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.scores.confidence = Some(ScoreValue::Number(confidence));
        self
    }

    pub fn with_encoding(mut self, encoding: BoundsEncoding) -> Self {
        self.encodings.push(encoding);
        self
    }

    /// Convert a loosely-shaped JSON object into typed fields.
    ///
    /// Recognized keys: `rect` (object or `[l, t, r, b]` array), `x1|left`, `y1|top`,
    /// `x2|right`, `y2|bottom`, `cx|centerX`, `cy|centerY`, `w|width`, `h|height`.
    /// Numbers may be given as numeric strings. An edge or center encoding is only
    /// recorded when all four of its fields are present. A `rect` field that is present
    /// but unreadable leaves the detection without any encoding.
    pub fn from_json(value: &Value) -> Self {
        let Some(obj) = value.as_object() else {
            return Self::default();
        };

        let labels = {
            let [cls_name, label, class_name, name, title] =
                LABEL_KEYS.map(|key| obj.get(key).and_then(Value::as_str).map(str::to_string));
            LabelFields {
                cls_name,
                label,
                class_name,
                name,
                title,
            }
        };
        let scores = {
            let [prob, confidence, score] = SCORE_KEYS.map(|key| obj.get(key).and_then(score_value));
            ScoreFields {
                prob,
                confidence,
                score,
            }
        };

        let mut encodings = Vec::new();
        if let Some(rect) = obj.get("rect") {
            if let Some(bounds) = rect_value(rect) {
                encodings.push(BoundsEncoding::Rect(bounds));
            }
            return Self {
                labels,
                scores,
                encodings,
            };
        }

        let edges = (
            number(obj, &["x1", "left"]),
            number(obj, &["y1", "top"]),
            number(obj, &["x2", "right"]),
            number(obj, &["y2", "bottom"]),
        );
        if let (Some(left), Some(top), Some(right), Some(bottom)) = edges {
            encodings.push(BoundsEncoding::EdgePair {
                left,
                top,
                right,
                bottom,
            });
        }
        let center = (
            number(obj, &["cx", "centerX"]),
            number(obj, &["cy", "centerY"]),
            number(obj, &["w", "width"]),
            number(obj, &["h", "height"]),
        );
        if let (Some(center_x), Some(center_y), Some(width), Some(height)) = center {
            encodings.push(BoundsEncoding::CenterSize {
                center_x,
                center_y,
                width,
                height,
            });
        }

        Self {
            labels,
            scores,
            encodings,
        }
    }
}

fn score_value(value: &Value) -> Option<ScoreValue> {
    match value {
        Value::Number(n) => n.as_f64().map(ScoreValue::Number),
        Value::String(s) => Some(ScoreValue::Text(s.clone())),
        _ => None,
    }
}

fn coerce_number(value: &Value) -> Option<f32> {
    score_value(value)?.coerce()
}

/// First alias that holds a usable number.
fn number(obj: &Map<String, Value>, aliases: &[&str]) -> Option<f32> {
    aliases
        .iter()
        .find_map(|key| obj.get(*key).and_then(coerce_number))
}

fn rect_value(value: &Value) -> Option<Bounds> {
    match value {
        Value::Object(rect) => Some(Bounds {
            left: number(rect, &["left"])?,
            top: number(rect, &["top"])?,
            right: number(rect, &["right"])?,
            bottom: number(rect, &["bottom"])?,
        }),
        Value::Array(items) if items.len() == 4 => {
            let mut edges = [0.0f32; 4];
            for (edge, item) in edges.iter_mut().zip(items) {
                *edge = coerce_number(item)?;
            }
            Some(Bounds {
                left: edges[0],
                top: edges[1],
                right: edges[2],
                bottom: edges[3],
            })
        }
        _ => None,
    }
}

/// All detections produced for one frame.
#[derive(Clone, Debug, Default)]
pub struct DetectionBatch {
    pub detections: Vec<RawDetection>,
    pub inference: Duration,
}

/// What a detector reports for a frame. `Empty` is signalled separately from a batch.
#[derive(Clone, Debug)]
pub enum DetectorOutput {
    Empty,
    Batch(DetectionBatch),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_edge_aliases_and_numeric_strings() {
        let raw = RawDetection::from_json(&json!({
            "clsName": "pothole",
            "prob": "0.91",
            "x1": 10, "top": "20.5", "x2": 30, "bottom": 40
        }));
        assert_eq!(raw.labels.cls_name.as_deref(), Some("pothole"));
        assert_eq!(raw.scores.prob, Some(ScoreValue::Text("0.91".into())));
        assert_eq!(
            raw.encodings,
            vec![BoundsEncoding::EdgePair {
                left: 10.0,
                top: 20.5,
                right: 30.0,
                bottom: 40.0
            }]
        );
    }

    #[test]
    fn records_every_complete_encoding() {
        let raw = RawDetection::from_json(&json!({
            "left": 1, "top": 2, "right": 3, "bottom": 4,
            "centerX": 10, "centerY": 10, "width": 4, "height": 4
        }));
        assert_eq!(raw.encodings.len(), 2);
        assert_eq!(raw.encodings[0].priority(), 1);
        assert_eq!(raw.encodings[1].priority(), 2);
    }

    #[test]
    fn incomplete_encoding_is_ignored() {
        let raw = RawDetection::from_json(&json!({ "x1": 1, "y1": 2, "x2": 3 }));
        assert!(raw.encodings.is_empty());
    }

    #[test]
    fn rect_takes_over_other_fields() {
        let raw = RawDetection::from_json(&json!({
            "rect": [1, 2, 3, 4],
            "x1": 100, "y1": 100, "x2": 200, "y2": 200
        }));
        assert_eq!(
            raw.encodings,
            vec![BoundsEncoding::Rect(Bounds {
                left: 1.0,
                top: 2.0,
                right: 3.0,
                bottom: 4.0
            })]
        );

        let bad_rect = RawDetection::from_json(&json!({
            "rect": "not a rect",
            "x1": 100, "y1": 100, "x2": 200, "y2": 200
        }));
        assert!(bad_rect.encodings.is_empty());
    }

    #[test]
    fn non_object_yields_empty_detection() {
        assert_eq!(RawDetection::from_json(&json!(42)), RawDetection::default());
    }

    #[test]
    fn score_coercion() {
        assert_eq!(ScoreValue::Number(0.5).coerce(), Some(0.5));
        assert_eq!(ScoreValue::Text(" 0.25 ".into()).coerce(), Some(0.25));
        assert_eq!(ScoreValue::Text("high".into()).coerce(), None);
        assert_eq!(ScoreValue::Text("NaN".into()).coerce(), None);
    }
}
