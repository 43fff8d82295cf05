//! Stderr progress for the export tool.

use clap::ValueEnum;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::path::Path;
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

impl UiMode {
    /// `Auto` animates only when stderr is a terminal and stdout is not piped.
    fn animated(self, stderr_tty: bool, stdout_tty: bool) -> bool {
        stderr_tty
            && match self {
                UiMode::Pretty => true,
                UiMode::Auto => stdout_tty,
                UiMode::Plain => false,
            }
    }
}

/// One line of progress per export step, ending in a summary line.
pub struct ExportProgress {
    spinner: Option<ProgressBar>,
    started: Instant,
}

impl ExportProgress {
    pub fn start(mode: UiMode, stderr_tty: bool, stdout_tty: bool) -> Self {
        let spinner = mode.animated(stderr_tty, stdout_tty).then(|| {
            let spinner = ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr());
            spinner.set_style(
                ProgressStyle::with_template("{spinner} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            spinner.enable_steady_tick(Duration::from_millis(120));
            spinner
        });
        Self {
            spinner,
            started: Instant::now(),
        }
    }

    pub fn step(&self, message: &str) {
        match &self.spinner {
            Some(spinner) => spinner.set_message(message.to_string()),
            None => eprintln!("==> {}", message),
        }
    }

    pub fn finish(self, records: usize, output: &Path) {
        let summary = format!(
            "exported {} detection(s) to {} in {}ms",
            records,
            output.display(),
            self.started.elapsed().as_millis()
        );
        match self.spinner {
            Some(spinner) => spinner.finish_with_message(summary),
            None => eprintln!("{}", summary),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn animation_needs_an_interactive_stderr() {
        assert!(!UiMode::Pretty.animated(false, true));
        assert!(UiMode::Pretty.animated(true, false));
        assert!(UiMode::Auto.animated(true, true));
        assert!(!UiMode::Auto.animated(true, false));
        assert!(!UiMode::Plain.animated(true, true));
    }
}
