use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{DetectionBatch, DetectorOutput, RawDetection};
use crate::frame::Frame;

/// Replays recorded detector output from a JSON-lines file.
///
/// Each non-blank line describes one frame, either as an array of detection objects or as
/// `{"inference_ms": <n>, "detections": [...]}`. Detection objects may use any of the
/// shapes accepted by `RawDetection::from_json`. An empty array replays as `Empty`.
/// Playback wraps around at the end of the file.
#[derive(Debug)]
pub struct ReplayBackend {
    frames: Vec<Option<DetectionBatch>>,
    cursor: usize,
}

impl ReplayBackend {
    pub fn open(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read replay file {}", path.display()))?;
        Self::from_lines(&text).with_context(|| format!("invalid replay file {}", path.display()))
    }

    pub fn from_lines(text: &str) -> Result<Self> {
        let mut frames = Vec::new();
        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let value: Value = serde_json::from_str(line)
                .map_err(|e| anyhow!("line {}: {}", index + 1, e))?;
            frames.push(parse_frame(&value).map_err(|e| anyhow!("line {}: {}", index + 1, e))?);
        }
        if frames.is_empty() {
            return Err(anyhow!("replay file contains no frames"));
        }
        Ok(Self { frames, cursor: 0 })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

fn parse_frame(value: &Value) -> Result<Option<DetectionBatch>> {
    let (items, inference_ms) = match value {
        Value::Array(items) => (items, 0),
        Value::Object(obj) => {
            let items = obj
                .get("detections")
                .and_then(Value::as_array)
                .ok_or_else(|| anyhow!("expected a \"detections\" array"))?;
            let inference_ms = obj.get("inference_ms").and_then(Value::as_u64).unwrap_or(0);
            (items, inference_ms)
        }
        _ => return Err(anyhow!("expected an array or object")),
    };
    if items.is_empty() {
        return Ok(None);
    }
    Ok(Some(DetectionBatch {
        detections: items.iter().map(RawDetection::from_json).collect(),
        inference: Duration::from_millis(inference_ms),
    }))
}

impl DetectorBackend for ReplayBackend {
    fn name(&self) -> &'static str {
        "replay"
    }

    fn detect(&mut self, _frame: &Frame) -> Result<DetectorOutput> {
        let entry = self.frames[self.cursor % self.frames.len()].clone();
        self.cursor = (self.cursor + 1) % self.frames.len();
        Ok(match entry {
            Some(batch) => DetectorOutput::Batch(batch),
            None => DetectorOutput::Empty,
        })
    }
}
