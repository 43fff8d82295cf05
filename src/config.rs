use anyhow::{anyhow, Result};
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::detect::{DetectorBackend, ReplayBackend, SyntheticBackend};
use crate::fix::{FixGate, DEFAULT_MAX_ACCURACY_M, DEFAULT_MAX_FIX_AGE};
use crate::ingest::SourceConfig;
use crate::persist::{PersistSettings, DEFAULT_ALBUM, DEFAULT_IMAGE_PREFIX, DEFAULT_SETTLE_DELAY};
use crate::rate_limit::{RateLimiter, DEFAULT_MIN_SAVE_INTERVAL};
use crate::remap::Dimensions;
use crate::render::RenderStyle;

const DEFAULT_DATA_DIR: &str = "detections";
const DEFAULT_LOG_FILE: &str = "detections.csv";
const DEFAULT_GALLERY_ROOT: &str = "Pictures";
const DEFAULT_SOURCE_URL: &str = "stub://road";
const DEFAULT_SOURCE_FPS: u32 = 10;
const DEFAULT_SOURCE_WIDTH: u32 = 640;
const DEFAULT_SOURCE_HEIGHT: u32 = 480;
const DEFAULT_OVERLAY_WIDTH: u32 = 640;
const DEFAULT_OVERLAY_HEIGHT: u32 = 480;
const DEFAULT_DETECTOR: &str = "synthetic";
const DEFAULT_HIT_RATE: f64 = 0.3;
const DEFAULT_GPS_INTERVAL_MS: u64 = 2_000;
const DEFAULT_START_LATITUDE: f64 = 52.5200;
const DEFAULT_START_LONGITUDE: f64 = 13.4050;

const NAME_PATTERN: &str = r"^[A-Za-z0-9_-]{1,64}$";

#[derive(Debug, Deserialize, Default)]
struct RecorderConfigFile {
    data_dir: Option<PathBuf>,
    log_file: Option<String>,
    gallery: Option<GalleryConfigFile>,
    session: Option<SessionConfigFile>,
    source: Option<SourceConfigFile>,
    overlay: Option<OverlayConfigFile>,
    detector: Option<DetectorConfigFile>,
    gps: Option<GpsConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct GalleryConfigFile {
    root: Option<PathBuf>,
    album: Option<String>,
    prefix: Option<String>,
    settle_delay_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct SessionConfigFile {
    min_save_interval_ms: Option<u64>,
    max_fix_accuracy_m: Option<f32>,
    max_fix_age_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    url: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct OverlayConfigFile {
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    kind: Option<String>,
    replay_path: Option<PathBuf>,
    seed: Option<u64>,
    hit_rate: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct GpsConfigFile {
    interval_ms: Option<u64>,
    start_latitude: Option<f64>,
    start_longitude: Option<f64>,
    seed: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct RecorderConfig {
    pub data_dir: PathBuf,
    pub log_file: String,
    pub gallery: GallerySettings,
    pub session: SessionSettings,
    pub source: SourceConfig,
    pub overlay: Dimensions,
    pub detector: DetectorSettings,
    pub gps: GpsSettings,
}

#[derive(Debug, Clone)]
pub struct GallerySettings {
    pub root: PathBuf,
    pub album: String,
    pub prefix: String,
    pub settle_delay: Duration,
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub min_save_interval: Duration,
    pub max_fix_accuracy_m: f32,
    pub max_fix_age: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorKind {
    Synthetic,
    Replay,
}

impl std::str::FromStr for DetectorKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "synthetic" => Ok(DetectorKind::Synthetic),
            "replay" => Ok(DetectorKind::Replay),
            other => Err(anyhow!("unknown detector {:?} (expected synthetic or replay)", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub kind: DetectorKind,
    pub replay_path: Option<PathBuf>,
    pub seed: Option<u64>,
    pub hit_rate: f64,
}

#[derive(Debug, Clone)]
pub struct GpsSettings {
    pub interval: Duration,
    pub start_latitude: f64,
    pub start_longitude: f64,
    pub seed: Option<u64>,
}

impl RecorderConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("ROAD_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: RecorderConfigFile) -> Result<Self> {
        let gallery = file.gallery.unwrap_or_default();
        let session = file.session.unwrap_or_default();
        let source = file.source.unwrap_or_default();
        let overlay = file.overlay.unwrap_or_default();
        let detector = file.detector.unwrap_or_default();
        let gps = file.gps.unwrap_or_default();

        let kind = match detector.kind.as_deref() {
            Some(kind) => kind.parse::<DetectorKind>()?,
            None => DEFAULT_DETECTOR.parse::<DetectorKind>()?,
        };

        Ok(Self {
            data_dir: file
                .data_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
            log_file: file
                .log_file
                .unwrap_or_else(|| DEFAULT_LOG_FILE.to_string()),
            gallery: GallerySettings {
                root: gallery
                    .root
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_GALLERY_ROOT)),
                album: gallery.album.unwrap_or_else(|| DEFAULT_ALBUM.to_string()),
                prefix: gallery
                    .prefix
                    .unwrap_or_else(|| DEFAULT_IMAGE_PREFIX.to_string()),
                settle_delay: gallery
                    .settle_delay_ms
                    .map(Duration::from_millis)
                    .unwrap_or(DEFAULT_SETTLE_DELAY),
            },
            session: SessionSettings {
                min_save_interval: session
                    .min_save_interval_ms
                    .map(Duration::from_millis)
                    .unwrap_or(DEFAULT_MIN_SAVE_INTERVAL),
                max_fix_accuracy_m: session
                    .max_fix_accuracy_m
                    .unwrap_or(DEFAULT_MAX_ACCURACY_M),
                max_fix_age: session
                    .max_fix_age_ms
                    .map(Duration::from_millis)
                    .unwrap_or(DEFAULT_MAX_FIX_AGE),
            },
            source: SourceConfig {
                url: source
                    .url
                    .unwrap_or_else(|| DEFAULT_SOURCE_URL.to_string()),
                target_fps: source.target_fps.unwrap_or(DEFAULT_SOURCE_FPS),
                width: source.width.unwrap_or(DEFAULT_SOURCE_WIDTH),
                height: source.height.unwrap_or(DEFAULT_SOURCE_HEIGHT),
            },
            overlay: Dimensions::new(
                overlay.width.unwrap_or(DEFAULT_OVERLAY_WIDTH),
                overlay.height.unwrap_or(DEFAULT_OVERLAY_HEIGHT),
            ),
            detector: DetectorSettings {
                kind,
                replay_path: detector.replay_path,
                seed: detector.seed,
                hit_rate: detector.hit_rate.unwrap_or(DEFAULT_HIT_RATE),
            },
            gps: GpsSettings {
                interval: Duration::from_millis(gps.interval_ms.unwrap_or(DEFAULT_GPS_INTERVAL_MS)),
                start_latitude: gps.start_latitude.unwrap_or(DEFAULT_START_LATITUDE),
                start_longitude: gps.start_longitude.unwrap_or(DEFAULT_START_LONGITUDE),
                seed: gps.seed,
            },
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(dir) = non_empty_env("ROAD_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(root) = non_empty_env("ROAD_GALLERY_DIR") {
            self.gallery.root = PathBuf::from(root);
        }
        if let Some(album) = non_empty_env("ROAD_ALBUM") {
            self.gallery.album = album;
        }
        if let Some(prefix) = non_empty_env("ROAD_IMAGE_PREFIX") {
            self.gallery.prefix = prefix;
        }
        if let Some(interval) = non_empty_env("ROAD_MIN_SAVE_INTERVAL_MS") {
            let ms: u64 = interval.parse().map_err(|_| {
                anyhow!("ROAD_MIN_SAVE_INTERVAL_MS must be an integer number of milliseconds")
            })?;
            self.session.min_save_interval = Duration::from_millis(ms);
        }
        if let Some(accuracy) = non_empty_env("ROAD_MAX_FIX_ACCURACY_M") {
            self.session.max_fix_accuracy_m = accuracy
                .parse()
                .map_err(|_| anyhow!("ROAD_MAX_FIX_ACCURACY_M must be a number of meters"))?;
        }
        if let Some(age) = non_empty_env("ROAD_MAX_FIX_AGE_MS") {
            let ms: u64 = age.parse().map_err(|_| {
                anyhow!("ROAD_MAX_FIX_AGE_MS must be an integer number of milliseconds")
            })?;
            self.session.max_fix_age = Duration::from_millis(ms);
        }
        if let Some(kind) = non_empty_env("ROAD_DETECTOR") {
            self.detector.kind = kind.parse::<DetectorKind>()?;
        }
        if let Some(path) = non_empty_env("ROAD_REPLAY_PATH") {
            self.detector.replay_path = Some(PathBuf::from(path));
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        let name = Regex::new(NAME_PATTERN)?;
        if !name.is_match(&self.gallery.album) {
            return Err(anyhow!(
                "album name {:?} must match {}",
                self.gallery.album,
                NAME_PATTERN
            ));
        }
        if !name.is_match(&self.gallery.prefix) {
            return Err(anyhow!(
                "image prefix {:?} must match {}",
                self.gallery.prefix,
                NAME_PATTERN
            ));
        }
        if self.log_file.trim().is_empty() || self.log_file.contains(['/', '\\']) {
            return Err(anyhow!("log_file must be a plain file name"));
        }
        if self.session.min_save_interval.is_zero() {
            return Err(anyhow!("min save interval must be greater than zero"));
        }
        if !(self.session.max_fix_accuracy_m > 0.0) {
            return Err(anyhow!("max fix accuracy must be a positive number of meters"));
        }
        if self.session.max_fix_age.is_zero() {
            return Err(anyhow!("max fix age must be greater than zero"));
        }
        if self.source.target_fps == 0 {
            return Err(anyhow!("source target_fps must be greater than zero"));
        }
        if !(0.0..=1.0).contains(&self.detector.hit_rate) {
            return Err(anyhow!("detector hit_rate must be between 0 and 1"));
        }
        if self.detector.kind == DetectorKind::Replay && self.detector.replay_path.is_none() {
            return Err(anyhow!("replay detector requires a replay_path"));
        }
        if self.gps.interval.is_zero() {
            return Err(anyhow!("gps interval must be greater than zero"));
        }
        Ok(())
    }

    pub fn log_path(&self) -> PathBuf {
        self.data_dir.join(&self.log_file)
    }

    pub fn fix_gate(&self) -> FixGate {
        FixGate::new(self.session.max_fix_accuracy_m, self.session.max_fix_age)
    }

    pub fn rate_limiter(&self) -> RateLimiter {
        RateLimiter::new(self.session.min_save_interval)
    }

    pub fn persist_settings(&self) -> PersistSettings {
        PersistSettings {
            album: self.gallery.album.clone(),
            prefix: self.gallery.prefix.clone(),
            settle_delay: self.gallery.settle_delay,
            style: RenderStyle::default(),
        }
    }

    pub fn build_detector(&self) -> Result<Box<dyn DetectorBackend>> {
        match self.detector.kind {
            DetectorKind::Synthetic => Ok(Box::new(
                SyntheticBackend::new(self.overlay, self.detector.seed)
                    .with_hit_rate(self.detector.hit_rate),
            )),
            DetectorKind::Replay => {
                let path = self
                    .detector
                    .replay_path
                    .as_deref()
                    .ok_or_else(|| anyhow!("replay detector requires a replay_path"))?;
                Ok(Box::new(ReplayBackend::open(path)?))
            }
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn read_config_file(path: &Path) -> Result<RecorderConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg = if is_toml {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() -> Result<()> {
        let mut cfg = RecorderConfig::from_file(RecorderConfigFile::default())?;
        cfg.validate()?;
        assert_eq!(cfg.log_path(), PathBuf::from("detections/detections.csv"));
        assert_eq!(cfg.gallery.album, "PotholeDetections");
        assert_eq!(cfg.gallery.prefix, "pothole");
        assert_eq!(cfg.session.min_save_interval, Duration::from_millis(2_000));
        assert_eq!(cfg.fix_gate(), FixGate::default());
        assert_eq!(cfg.overlay, Dimensions::new(640, 480));
        assert_eq!(cfg.detector.kind, DetectorKind::Synthetic);
        Ok(())
    }

    #[test]
    fn rejects_unsafe_album_names() -> Result<()> {
        let mut cfg = RecorderConfig::from_file(RecorderConfigFile::default())?;
        cfg.gallery.album = "../escape".to_string();
        assert!(cfg.validate().is_err());

        let mut cfg = RecorderConfig::from_file(RecorderConfigFile::default())?;
        cfg.gallery.prefix = String::new();
        assert!(cfg.validate().is_err());
        Ok(())
    }

    #[test]
    fn replay_needs_a_path() -> Result<()> {
        let mut cfg = RecorderConfig::from_file(RecorderConfigFile::default())?;
        cfg.detector.kind = DetectorKind::Replay;
        assert!(cfg.validate().is_err());
        Ok(())
    }

    #[test]
    fn detector_kind_parses() {
        assert_eq!("Replay".parse::<DetectorKind>().unwrap(), DetectorKind::Replay);
        assert!("onnx".parse::<DetectorKind>().is_err());
    }
}
