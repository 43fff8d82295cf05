//! Persistence orchestration.
//!
//! One `PersistJob` per admitted detection batch. The job runs off the producer thread:
//! settle, snapshot the frame slot, normalize and remap the batch, render, store the
//! image, append one log row. Every attempt ends in exactly one `PersistOutcome`, which
//! is logged and, when an observer is attached, sent to it. Nothing here panics or
//! propagates into the capture loop.

use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::detect::{normalize_batch, resolve_confidence, resolve_label, RawDetection};
use crate::detection_log::{DetectionLog, DetectionRecord};
use crate::fix::FixSource;
use crate::frame::FrameSlot;
use crate::remap::{remap, Dimensions};
use crate::render::{annotate, RenderStyle};
use crate::storage::{ImageStore, StoredImage};

pub const DEFAULT_ALBUM: &str = "PotholeDetections";
pub const DEFAULT_IMAGE_PREFIX: &str = "pothole";
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(10);

#[derive(Clone, Debug)]
pub struct PersistSettings {
    pub album: String,
    pub prefix: String,
    /// Pause before the frame snapshot to let an in-progress publish finish.
    pub settle_delay: Duration,
    pub style: RenderStyle,
}

impl Default for PersistSettings {
    fn default() -> Self {
        Self {
            album: DEFAULT_ALBUM.to_string(),
            prefix: DEFAULT_IMAGE_PREFIX.to_string(),
            settle_delay: DEFAULT_SETTLE_DELAY,
            style: RenderStyle::default(),
        }
    }
}

/// An admitted batch, with the overlay size captured at admission.
#[derive(Clone, Debug)]
pub struct PersistJob {
    pub batch: Vec<RawDetection>,
    pub overlay: Dimensions,
    pub admitted_at_ms: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PersistStage {
    Store,
    Log,
    Spawn,
}

impl std::fmt::Display for PersistStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PersistStage::Store => "image store",
            PersistStage::Log => "detection log",
            PersistStage::Spawn => "task spawn",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum PersistOutcome {
    Saved {
        record: DetectionRecord,
        image: StoredImage,
    },
    /// No frame had been captured yet; nothing was written.
    SkippedNoFrame,
    Failed { stage: PersistStage, error: String },
}

impl PersistOutcome {
    pub fn is_saved(&self) -> bool {
        matches!(self, PersistOutcome::Saved { .. })
    }
}

pub struct Persister {
    frames: Arc<FrameSlot>,
    images: Arc<dyn ImageStore>,
    log: Arc<DetectionLog>,
    fixes: Arc<dyn FixSource>,
    settings: PersistSettings,
    observer: Option<Mutex<Sender<PersistOutcome>>>,
}

impl Persister {
    pub fn new(
        frames: Arc<FrameSlot>,
        images: Arc<dyn ImageStore>,
        log: Arc<DetectionLog>,
        fixes: Arc<dyn FixSource>,
        settings: PersistSettings,
    ) -> Self {
        Self {
            frames,
            images,
            log,
            fixes,
            settings,
            observer: None,
        }
    }

    /// Report every outcome to `observer` as well as the log.
    pub fn with_observer(mut self, observer: Sender<PersistOutcome>) -> Self {
        self.observer = Some(Mutex::new(observer));
        self
    }

    pub fn settings(&self) -> &PersistSettings {
        &self.settings
    }

    pub fn log(&self) -> &DetectionLog {
        &self.log
    }

    /// Run one persistence attempt to completion on the calling thread.
    pub fn persist(&self, job: PersistJob) -> PersistOutcome {
        let outcome = self.run(&job);
        self.report(&outcome);
        outcome
    }

    /// Run the attempt on a background thread. The producer never waits on the handle.
    pub fn spawn(self: &Arc<Self>, job: PersistJob) -> Option<JoinHandle<()>> {
        let persister = Arc::clone(self);
        let spawned = std::thread::Builder::new()
            .name("persist".to_string())
            .spawn(move || {
                persister.persist(job);
            });
        match spawned {
            Ok(handle) => Some(handle),
            Err(err) => {
                self.report(&PersistOutcome::Failed {
                    stage: PersistStage::Spawn,
                    error: err.to_string(),
                });
                None
            }
        }
    }

    fn run(&self, job: &PersistJob) -> PersistOutcome {
        if !self.settings.settle_delay.is_zero() {
            std::thread::sleep(self.settings.settle_delay);
        }
        let Some(frame) = self.frames.snapshot() else {
            return PersistOutcome::SkippedNoFrame;
        };

        let frame_dims = frame.dimensions();
        let boxes: Vec<_> = normalize_batch(&job.batch)
            .iter()
            .map(|det| remap(det, job.overlay, frame_dims))
            .collect();
        let annotated = annotate(&frame, &boxes, &self.settings.style);
        drop(frame);

        let image = match self
            .images
            .store(&annotated, &self.settings.prefix, &self.settings.album)
        {
            Ok(image) => image,
            Err(err) => {
                return PersistOutcome::Failed {
                    stage: PersistStage::Store,
                    error: format!("{:#}", err),
                }
            }
        };

        // The row describes the saved image, so it takes the first detection as sent.
        let (label, confidence) = match job.batch.first() {
            Some(first) => (resolve_label(first), resolve_confidence(first)),
            None => (crate::detect::DEFAULT_LABEL.to_string(), 0.0),
        };
        let position = self
            .fixes
            .latest()
            .map(|fix| (fix.latitude, fix.longitude));
        // Rows carry the time the rate limiter admitted, not the time of the write.
        let record = DetectionRecord::new(
            job.admitted_at_ms,
            label,
            confidence,
            position,
            image.name.clone(),
        );

        if let Err(err) = self.log.append(&record) {
            return PersistOutcome::Failed {
                stage: PersistStage::Log,
                error: format!("{:#}", err),
            };
        }
        PersistOutcome::Saved { record, image }
    }

    fn report(&self, outcome: &PersistOutcome) {
        match outcome {
            PersistOutcome::Saved { record, image } => log::info!(
                "saved detection {} ({:.0}%) as {}",
                record.label,
                record.confidence * 100.0,
                image.name
            ),
            PersistOutcome::SkippedNoFrame => {
                log::warn!("no frame captured yet; detection batch not saved")
            }
            PersistOutcome::Failed { stage, error } => {
                log::error!("failed to save detection ({}): {}", stage, error)
            }
        }
        if let Some(observer) = &self.observer {
            let sender = observer.lock().unwrap_or_else(PoisonError::into_inner);
            // A dropped receiver only means nobody is listening any more.
            let _ = sender.send(outcome.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundsEncoding;
    use crate::fix::{LatestFix, PositionFix};
    use crate::frame::Frame;
    use crate::storage::InMemoryImageStore;
    use anyhow::{anyhow, Result};
    use image::{Rgba, RgbaImage};
    use std::sync::mpsc;
    use tempfile::tempdir;

    struct BrokenStore;

    impl ImageStore for BrokenStore {
        fn store(&self, _: &RgbaImage, _: &str, _: &str) -> Result<StoredImage> {
            Err(anyhow!("storage unavailable"))
        }
    }

    fn settings() -> PersistSettings {
        PersistSettings {
            settle_delay: Duration::ZERO,
            ..PersistSettings::default()
        }
    }

    fn job() -> PersistJob {
        PersistJob {
            batch: vec![
                RawDetection::default()
                    .with_label("crack")
                    .with_confidence(0.42),
                RawDetection::default()
                    .with_label("pothole")
                    .with_confidence(0.9)
                    .with_encoding(BoundsEncoding::EdgePair {
                        left: 30.0,
                        top: 30.0,
                        right: 60.0,
                        bottom: 60.0,
                    }),
            ],
            overlay: Dimensions::new(300, 300),
            admitted_at_ms: 1,
        }
    }

    fn frame_slot() -> Arc<FrameSlot> {
        let slot = Arc::new(FrameSlot::new());
        slot.publish(Frame::new(
            RgbaImage::from_pixel(1200, 900, Rgba([0, 0, 0, 255])),
            0,
        ));
        slot
    }

    #[test]
    fn saves_image_and_row_from_first_detection() -> Result<()> {
        let dir = tempdir()?;
        let images = Arc::new(InMemoryImageStore::new());
        let fixes = Arc::new(LatestFix::new());
        fixes.update(PositionFix {
            latitude: 48.1,
            longitude: 11.5,
            accuracy_m: Some(5.0),
            timestamp_ms: 0,
        });
        let log = Arc::new(DetectionLog::open(dir.path().join("detections.csv"))?);
        let persister = Persister::new(frame_slot(), images.clone(), log.clone(), fixes, settings());

        let (record, image) = match persister.persist(job()) {
            PersistOutcome::Saved { record, image } => (record, image),
            other => panic!("expected a saved outcome, got {:?}", other),
        };
        // First detection in the batch is unresolvable but still names the row.
        assert_eq!(record.label, "crack");
        assert!((record.confidence - 0.42).abs() < 1e-6);
        assert_eq!((record.x, record.y, record.w, record.h), (-1, -1, -1, -1));
        assert_eq!(record.latitude, Some(48.1));
        assert_eq!(record.image_name, image.name);
        assert!(image.name.starts_with("pothole_"));

        assert_eq!(images.len(), 1);
        let (_, saved) = &images.stored()[0];
        assert_eq!(saved.dimensions(), (1200, 900));
        // Box remapped from (30,30)-(60,60) in 300x300 to (120,90) in 1200x900.
        assert_eq!(saved.get_pixel(120, 90), &RenderStyle::default().box_color);

        assert_eq!(log.read_all()?, vec![record]);
        Ok(())
    }

    #[test]
    fn missing_frame_skips_everything() -> Result<()> {
        let dir = tempdir()?;
        let images = Arc::new(InMemoryImageStore::new());
        let log = Arc::new(DetectionLog::open(dir.path().join("detections.csv"))?);
        let persister = Persister::new(
            Arc::new(FrameSlot::new()),
            images.clone(),
            log.clone(),
            Arc::new(LatestFix::new()),
            settings(),
        );
        assert_eq!(persister.persist(job()), PersistOutcome::SkippedNoFrame);
        assert!(images.is_empty());
        assert!(!log.exists());
        Ok(())
    }

    #[test]
    fn storage_failure_is_reported_and_leaves_no_row() -> Result<()> {
        let dir = tempdir()?;
        let log = Arc::new(DetectionLog::open(dir.path().join("detections.csv"))?);
        let (tx, rx) = mpsc::channel();
        let persister = Arc::new(
            Persister::new(
                frame_slot(),
                Arc::new(BrokenStore),
                log.clone(),
                Arc::new(LatestFix::new()),
                settings(),
            )
            .with_observer(tx),
        );

        let handle = persister.spawn(job()).expect("spawned");
        handle.join().expect("persist thread");

        match rx.recv()? {
            PersistOutcome::Failed { stage, error } => {
                assert_eq!(stage, PersistStage::Store);
                assert!(error.contains("storage unavailable"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(!log.exists());
        Ok(())
    }

    #[test]
    fn log_failure_is_reported_and_leaves_no_row() -> Result<()> {
        let dir = tempdir()?;
        // A directory where the log file should be makes every append fail.
        let log_path = dir.path().join("detections.csv");
        std::fs::create_dir(&log_path)?;
        let log = Arc::new(DetectionLog::open(&log_path)?);
        let images = Arc::new(InMemoryImageStore::new());
        let (tx, rx) = mpsc::channel();
        let persister = Persister::new(
            frame_slot(),
            images.clone(),
            log.clone(),
            Arc::new(LatestFix::new()),
            settings(),
        )
        .with_observer(tx);

        let outcome = persister.persist(job());
        match &outcome {
            PersistOutcome::Failed { stage, error } => {
                assert_eq!(*stage, PersistStage::Log);
                assert!(error.contains("detection log"), "{}", error);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(rx.recv()?, outcome);
        assert!(!log.exists());
        assert!(log.read_all()?.is_empty());
        Ok(())
    }

    #[test]
    fn row_carries_admission_time() -> Result<()> {
        let dir = tempdir()?;
        let log = Arc::new(DetectionLog::open(dir.path().join("detections.csv"))?);
        let persister = Persister::new(
            frame_slot(),
            Arc::new(InMemoryImageStore::new()),
            log.clone(),
            Arc::new(LatestFix::new()),
            settings(),
        );
        let outcome = persister.persist(PersistJob {
            admitted_at_ms: 1_234_567,
            ..job()
        });
        assert!(outcome.is_saved());
        assert_eq!(log.read_all()?[0].timestamp_ms, 1_234_567);
        Ok(())
    }

    #[test]
    fn missing_fix_leaves_coordinates_empty() -> Result<()> {
        let dir = tempdir()?;
        let log = Arc::new(DetectionLog::open(dir.path().join("detections.csv"))?);
        let persister = Persister::new(
            frame_slot(),
            Arc::new(InMemoryImageStore::new()),
            log,
            Arc::new(LatestFix::new()),
            settings(),
        );
        let PersistOutcome::Saved { record, .. } = persister.persist(job()) else {
            panic!("expected a saved outcome");
        };
        assert_eq!(record.latitude, None);
        assert_eq!(record.longitude, None);
        Ok(())
    }
}
