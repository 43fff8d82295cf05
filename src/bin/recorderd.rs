//! recorderd - road hazard recorder daemon
//!
//! This daemon:
//! 1. Captures frames from the configured source into the frame slot
//! 2. Runs the detector on every frame and updates the live overlay
//! 3. Feeds simulated position fixes into the session controller
//! 4. Reads `start` / `stop` / `status` commands from stdin
//! 5. Saves annotated images and log rows while a session is running

use anyhow::{anyhow, Result};
use clap::Parser;
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use road_analytics::config::RecorderConfig;
use road_analytics::{
    now_ms, DetectionLog, FilesystemImageStore, FixSource, FixStatus, FrameSlot, Persister,
    Pipeline, SessionController, SimulatedFixSource, SyntheticSource,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Start a session as soon as the position fix is good.
    #[arg(long)]
    auto_start: bool,
    /// Stop after this many seconds (runs until Ctrl-C when omitted).
    #[arg(long)]
    seconds: Option<u64>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let cfg = RecorderConfig::load()?;

    let frames = Arc::new(FrameSlot::new());
    let fixes = Arc::new(SimulatedFixSource::new(
        cfg.gps.start_latitude,
        cfg.gps.start_longitude,
        cfg.gps.seed,
    ));
    let detection_log = Arc::new(DetectionLog::open(cfg.log_path())?);
    let images = Arc::new(FilesystemImageStore::new(&cfg.gallery.root));
    let persister = Arc::new(Persister::new(
        frames.clone(),
        images,
        detection_log.clone(),
        fixes.clone(),
        cfg.persist_settings(),
    ));
    let session = Arc::new(SessionController::new(cfg.fix_gate(), cfg.rate_limiter()));
    let pipeline = Pipeline::new(session.clone(), frames, persister, cfg.overlay);

    let mut source = SyntheticSource::new(cfg.source.clone())?;
    source.connect()?;
    let mut detector = cfg.build_detector()?;
    detector.warm_up()?;

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || shutdown.store(true, Ordering::SeqCst))
            .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;
    }

    spawn_fix_updates(
        fixes.clone(),
        session.clone(),
        cfg.gps.interval,
        args.auto_start,
        shutdown.clone(),
    );
    spawn_command_reader(
        fixes.clone(),
        session.clone(),
        detection_log.clone(),
        shutdown.clone(),
    );

    log::info!(
        "recorderd running. writing to {}",
        detection_log.path().display()
    );
    log::info!(
        "source={} detector={} album={}",
        cfg.source.url,
        detector.name(),
        cfg.gallery.root.join(&cfg.gallery.album).display()
    );

    let frame_interval = Duration::from_millis(1000 / u64::from(cfg.source.target_fps.max(1)));
    let deadline = args.seconds.map(|s| Instant::now() + Duration::from_secs(s));
    let mut last_health_log = Instant::now();

    while !shutdown.load(Ordering::SeqCst) {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            break;
        }
        let tick = Instant::now();

        let frame = source.next_frame()?;
        let output = match detector.detect(&frame) {
            Ok(output) => Some(output),
            Err(e) => {
                log::warn!("detector {} failed: {}", detector.name(), e);
                None
            }
        };
        pipeline.on_frame(frame);
        if let Some(output) = output {
            // Persistence runs detached; the handle is not needed here.
            let _ = pipeline.on_output(output, now_ms()?);
        }

        if last_health_log.elapsed() >= Duration::from_secs(5) {
            let stats = source.stats();
            let overlay = pipeline.overlay_snapshot();
            log::info!(
                "source health={} frames={} url={} session={} overlay_boxes={} inference={}ms",
                source.is_healthy(),
                stats.frames_captured,
                stats.url,
                session.state(),
                overlay.detections.len(),
                overlay.inference.as_millis()
            );
            last_health_log = Instant::now();
        }

        if let Some(rest) = frame_interval.checked_sub(tick.elapsed()) {
            std::thread::sleep(rest);
        }
    }

    session.request_stop();
    log::info!("recorderd stopped");
    Ok(())
}

fn spawn_fix_updates(
    fixes: Arc<SimulatedFixSource>,
    session: Arc<SessionController>,
    interval: Duration,
    auto_start: bool,
    shutdown: Arc<AtomicBool>,
) {
    std::thread::spawn(move || {
        while !shutdown.load(Ordering::SeqCst) {
            let now = match now_ms() {
                Ok(now) => now,
                Err(e) => {
                    log::error!("clock error: {}", e);
                    break;
                }
            };
            let fix = fixes.next_fix(now);
            let state = session.on_fix_update(Some(&fix), now);
            log::debug!(
                "{} -> session {}",
                FixStatus::describe(session.gate(), Some(&fix), now),
                state
            );
            if auto_start && session.can_start(Some(&fix), now) {
                if let Err(e) = session.request_start(Some(&fix), now) {
                    log::warn!("auto start rejected: {}", e);
                }
            }
            std::thread::sleep(interval);
        }
    });
}

fn spawn_command_reader(
    fixes: Arc<SimulatedFixSource>,
    session: Arc<SessionController>,
    detection_log: Arc<DetectionLog>,
    shutdown: Arc<AtomicBool>,
) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            let now = match now_ms() {
                Ok(now) => now,
                Err(e) => {
                    log::error!("clock error: {}", e);
                    continue;
                }
            };
            let fix = fixes.latest();
            match line.trim() {
                "start" => match session.request_start(fix.as_ref(), now) {
                    Ok(state) => println!("session {}", state),
                    Err(e) => println!("{}", e),
                },
                "stop" => println!("session {}", session.request_stop()),
                "status" => {
                    println!("session {}", session.state());
                    println!("{}", FixStatus::describe(session.gate(), fix.as_ref(), now));
                    if session.can_export() && !detection_log.exists() {
                        println!("no detections yet");
                    } else if session.can_export() {
                        println!("log ready for export: {}", detection_log.path().display());
                    }
                }
                "quit" | "exit" => {
                    shutdown.store(true, Ordering::SeqCst);
                    break;
                }
                "" => {}
                other => println!("unknown command {:?} (start, stop, status, quit)", other),
            }
        }
    });
}
