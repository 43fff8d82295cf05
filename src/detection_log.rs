//! Append-only CSV detection log.
//!
//! One file, one header line written when the file is first created, one row per saved
//! detection. Appends are serialized through a lock and each row (plus the header, when
//! needed) goes out in a single write, so concurrent writers never interleave partial
//! lines and the header appears exactly once.

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

pub const LOG_HEADER: &str = "timestamp_ms,label,confidence,x,y,w,h,lat,lon,image";

const COLUMNS: usize = 10;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DetectionRecord {
    pub timestamp_ms: u64,
    pub label: String,
    pub confidence: f32,
    /// Box columns are reserved; saved records carry -1.
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub image_name: String,
}

impl DetectionRecord {
    pub fn new(
        timestamp_ms: u64,
        label: impl Into<String>,
        confidence: f32,
        position: Option<(f64, f64)>,
        image_name: impl Into<String>,
    ) -> Self {
        Self {
            timestamp_ms,
            label: label.into(),
            confidence,
            x: -1,
            y: -1,
            w: -1,
            h: -1,
            latitude: position.map(|(lat, _)| lat),
            longitude: position.map(|(_, lon)| lon),
            image_name: image_name.into(),
        }
    }

    /// CSV row without the trailing newline.
    pub fn to_row(&self) -> String {
        format!(
            "{},{},{:.3},{},{},{},{},{},{},{}",
            self.timestamp_ms,
            sanitize(&self.label),
            self.confidence,
            self.x,
            self.y,
            self.w,
            self.h,
            self.latitude.map(|v| v.to_string()).unwrap_or_default(),
            self.longitude.map(|v| v.to_string()).unwrap_or_default(),
            sanitize(&self.image_name),
        )
    }

    pub fn parse_row(line: &str) -> Result<Self> {
        let fields: Vec<&str> = line.trim_end_matches(['\r', '\n']).split(',').collect();
        if fields.len() != COLUMNS {
            return Err(anyhow!(
                "expected {} columns, found {}",
                COLUMNS,
                fields.len()
            ));
        }
        let int = |index: usize, name: &str| -> Result<i32> {
            fields[index]
                .trim()
                .parse()
                .map_err(|_| anyhow!("invalid {}: {:?}", name, fields[index]))
        };
        let coord = |index: usize, name: &str| -> Result<Option<f64>> {
            let raw = fields[index].trim();
            if raw.is_empty() {
                return Ok(None);
            }
            raw.parse()
                .map(Some)
                .map_err(|_| anyhow!("invalid {}: {:?}", name, raw))
        };
        Ok(Self {
            timestamp_ms: fields[0]
                .trim()
                .parse()
                .map_err(|_| anyhow!("invalid timestamp_ms: {:?}", fields[0]))?,
            label: fields[1].to_string(),
            confidence: fields[2]
                .trim()
                .parse()
                .map_err(|_| anyhow!("invalid confidence: {:?}", fields[2]))?,
            x: int(3, "x")?,
            y: int(4, "y")?,
            w: int(5, "w")?,
            h: int(6, "h")?,
            latitude: coord(7, "lat")?,
            longitude: coord(8, "lon")?,
            image_name: fields[9].to_string(),
        })
    }
}

/// Field separators and line breaks would corrupt the row layout.
fn sanitize(value: &str) -> String {
    value
        .chars()
        .map(|c| if matches!(c, ',' | '\n' | '\r') { ' ' } else { c })
        .collect()
}

#[derive(Debug)]
pub struct DetectionLog {
    path: PathBuf,
    writer: Mutex<()>,
}

impl DetectionLog {
    /// Prepare a log at `path`, creating its parent directory. The file itself is created
    /// on the first append.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create log directory {}", parent.display()))?;
        }
        Ok(Self {
            path,
            writer: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    pub fn append(&self, record: &DetectionRecord) -> Result<()> {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);

        let needs_header = std::fs::metadata(&self.path)
            .map(|meta| meta.len() == 0)
            .unwrap_or(true);
        let mut chunk = String::new();
        if needs_header {
            chunk.push_str(LOG_HEADER);
            chunk.push('\n');
        }
        chunk.push_str(&record.to_row());
        chunk.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open detection log {}", self.path.display()))?;
        file.write_all(chunk.as_bytes())
            .with_context(|| format!("failed to append to {}", self.path.display()))?;
        file.flush()?;
        Ok(())
    }

    /// Every record in the log, in append order. A missing file reads as empty.
    pub fn read_all(&self) -> Result<Vec<DetectionRecord>> {
        if !self.exists() {
            return Ok(Vec::new());
        }
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let text = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read detection log {}", self.path.display()))?;
        let mut lines = text.lines().filter(|line| !line.trim().is_empty());
        match lines.next() {
            Some(header) if header.trim() == LOG_HEADER => {}
            Some(header) => return Err(anyhow!("unexpected log header: {:?}", header)),
            None => return Ok(Vec::new()),
        }
        lines
            .enumerate()
            .map(|(index, line)| {
                DetectionRecord::parse_row(line).with_context(|| format!("row {}", index + 1))
            })
            .collect()
    }
}
