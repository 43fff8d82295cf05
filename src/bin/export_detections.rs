//! export_detections - write the detection log out as a JSON array

use anyhow::{anyhow, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;

use road_analytics::config::RecorderConfig;
use road_analytics::DetectionLog;

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Detection log to export. Defaults to the configured log path.
    #[arg(long, env = "ROAD_LOG_PATH")]
    log_path: Option<PathBuf>,
    /// Output file path for the JSON export.
    #[arg(long, default_value = "detections_export.json")]
    output: PathBuf,
    /// How progress is shown on stderr.
    #[arg(long, value_enum, default_value_t = ui::UiMode::Auto, value_name = "MODE")]
    ui: ui::UiMode,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let progress = ui::ExportProgress::start(
        args.ui,
        std::io::stderr().is_terminal(),
        std::io::stdout().is_terminal(),
    );

    let log_path = match args.log_path {
        Some(path) => path,
        None => RecorderConfig::load()?.log_path(),
    };
    let log = DetectionLog::open(&log_path)?;
    if !log.exists() {
        return Err(anyhow!("no detections yet ({} does not exist)", log_path.display()));
    }

    progress.step("reading detection log");
    let records = log.read_all()?;
    progress.step("encoding export");
    let json = serde_json::to_vec_pretty(&records)?;
    progress.step("writing export");
    std::fs::write(&args.output, json)
        .map_err(|e| anyhow!("failed to write {}: {}", args.output.display(), e))?;
    progress.finish(records.len(), &args.output);
    Ok(())
}
