//! Position fixes and the fix quality gate.
//!
//! A session may only begin while the latest fix is trustworthy: it must carry an
//! accuracy estimate within `max_accuracy_m` and be no older than `max_age`.
//! The gate is evaluated fresh on every call and never caches a verdict.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Maximum horizontal accuracy (meters) for a fix to be considered good.
pub const DEFAULT_MAX_ACCURACY_M: f32 = 30.0;

/// Maximum fix age for a fix to be considered good.
pub const DEFAULT_MAX_FIX_AGE: Duration = Duration::from_millis(15_000);

/// A single position estimate.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PositionFix {
    pub latitude: f64,
    pub longitude: f64,
    /// Horizontal accuracy radius in meters, when the provider reports one.
    pub accuracy_m: Option<f32>,
    pub timestamp_ms: u64,
}

impl PositionFix {
    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.timestamp_ms)
    }
}

/// Why a fix failed the gate.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FixRejection {
    Missing,
    NoAccuracy,
    Inaccurate { meters: f32 },
    Stale { age_ms: u64 },
}

impl std::fmt::Display for FixRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FixRejection::Missing => write!(f, "no position fix yet"),
            FixRejection::NoAccuracy => write!(f, "position fix has no accuracy estimate"),
            FixRejection::Inaccurate { meters } => {
                write!(f, "position accuracy {:.0}m is too coarse", meters)
            }
            FixRejection::Stale { age_ms } => write!(f, "position fix is {}ms old", age_ms),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FixVerdict {
    Good,
    Rejected(FixRejection),
}

impl FixVerdict {
    pub fn is_good(&self) -> bool {
        matches!(self, FixVerdict::Good)
    }
}

/// Freshness + accuracy thresholds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FixGate {
    pub max_accuracy_m: f32,
    pub max_age: Duration,
}

impl Default for FixGate {
    fn default() -> Self {
        Self {
            max_accuracy_m: DEFAULT_MAX_ACCURACY_M,
            max_age: DEFAULT_MAX_FIX_AGE,
        }
    }
}

impl FixGate {
    pub fn new(max_accuracy_m: f32, max_age: Duration) -> Self {
        Self {
            max_accuracy_m,
            max_age,
        }
    }

    pub fn evaluate(&self, fix: Option<&PositionFix>, now_ms: u64) -> FixVerdict {
        let Some(fix) = fix else {
            return FixVerdict::Rejected(FixRejection::Missing);
        };
        let Some(meters) = fix.accuracy_m else {
            return FixVerdict::Rejected(FixRejection::NoAccuracy);
        };
        // NaN accuracy fails this comparison and is rejected with it.
        if !(meters <= self.max_accuracy_m) {
            return FixVerdict::Rejected(FixRejection::Inaccurate { meters });
        }
        let age_ms = fix.age_ms(now_ms);
        if u128::from(age_ms) > self.max_age.as_millis() {
            return FixVerdict::Rejected(FixRejection::Stale { age_ms });
        }
        FixVerdict::Good
    }

    pub fn is_good(&self, fix: Option<&PositionFix>, now_ms: u64) -> bool {
        self.evaluate(fix, now_ms).is_good()
    }
}

/// Gate check with the default thresholds.
pub fn is_good_fix(fix: Option<&PositionFix>, now_ms: u64) -> bool {
    FixGate::default().is_good(fix, now_ms)
}

/// User-facing summary of the current fix.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FixStatus {
    pub headline: &'static str,
    pub accuracy: String,
    pub age: String,
}

impl FixStatus {
    pub fn describe(gate: &FixGate, fix: Option<&PositionFix>, now_ms: u64) -> Self {
        let headline = if gate.is_good(fix, now_ms) {
            "GPS ready"
        } else {
            "Waiting for GPS fix"
        };
        let accuracy = fix
            .and_then(|f| f.accuracy_m)
            .map(|m| format!("{}m", m as i64))
            .unwrap_or_else(|| "-".to_string());
        let age = fix
            .map(|f| format_age(f.age_ms(now_ms)))
            .unwrap_or_else(|| "-".to_string());
        Self {
            headline,
            accuracy,
            age,
        }
    }
}

impl std::fmt::Display for FixStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (accuracy: {}, age: {})",
            self.headline, self.accuracy, self.age
        )
    }
}

fn format_age(age_ms: u64) -> String {
    let secs = age_ms / 1000;
    if secs < 60 {
        format!("{}s ago", secs)
    } else {
        format!("{}m ago", secs / 60)
    }
}

/// Position-fix collaborator: exposes the most recent fix synchronously.
pub trait FixSource: Send + Sync {
    fn latest(&self) -> Option<PositionFix>;
}

/// Holds only the latest fix; every update replaces it wholesale.
#[derive(Debug, Default)]
pub struct LatestFix {
    fix: Mutex<Option<PositionFix>>,
}

impl LatestFix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, fix: PositionFix) {
        *self.fix.lock().unwrap_or_else(PoisonError::into_inner) = Some(fix);
    }
}

impl FixSource for LatestFix {
    fn latest(&self) -> Option<PositionFix> {
        *self.fix.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: u64 = 1_700_000_000_000;

    fn fix(accuracy_m: Option<f32>, age_ms: u64) -> PositionFix {
        PositionFix {
            latitude: 52.37,
            longitude: 4.89,
            accuracy_m,
            timestamp_ms: NOW - age_ms,
        }
    }

    #[test]
    fn accurate_fresh_fix_is_good() {
        assert!(is_good_fix(Some(&fix(Some(10.0), 500)), NOW));
    }

    #[test]
    fn coarse_fix_is_rejected() {
        let gate = FixGate::default();
        assert_eq!(
            gate.evaluate(Some(&fix(Some(50.0), 500)), NOW),
            FixVerdict::Rejected(FixRejection::Inaccurate { meters: 50.0 })
        );
    }

    #[test]
    fn stale_fix_is_rejected() {
        let gate = FixGate::default();
        assert_eq!(
            gate.evaluate(Some(&fix(Some(10.0), 20_000)), NOW),
            FixVerdict::Rejected(FixRejection::Stale { age_ms: 20_000 })
        );
    }

    #[test]
    fn missing_fix_or_accuracy_is_never_good() {
        let gate = FixGate::default();
        assert_eq!(
            gate.evaluate(None, NOW),
            FixVerdict::Rejected(FixRejection::Missing)
        );
        assert_eq!(
            gate.evaluate(Some(&fix(None, 0)), NOW),
            FixVerdict::Rejected(FixRejection::NoAccuracy)
        );
        assert!(!gate.is_good(Some(&fix(Some(f32::NAN), 0)), NOW));
    }

    #[test]
    fn thresholds_are_inclusive() {
        assert!(is_good_fix(Some(&fix(Some(30.0), 15_000)), NOW));
        assert!(!is_good_fix(Some(&fix(Some(30.01), 0)), NOW));
        assert!(!is_good_fix(Some(&fix(Some(5.0), 15_001)), NOW));
    }

    #[test]
    fn future_timestamp_counts_as_fresh() {
        let mut f = fix(Some(5.0), 0);
        f.timestamp_ms = NOW + 3_000;
        assert!(is_good_fix(Some(&f), NOW));
    }

    #[test]
    fn status_describes_fix() {
        let gate = FixGate::default();
        let status = FixStatus::describe(&gate, Some(&fix(Some(12.7), 3_400)), NOW);
        assert_eq!(status.headline, "GPS ready");
        assert_eq!(status.accuracy, "12m");
        assert_eq!(status.age, "3s ago");

        let waiting = FixStatus::describe(&gate, None, NOW);
        assert_eq!(waiting.headline, "Waiting for GPS fix");
        assert_eq!(waiting.accuracy, "-");
        assert_eq!(waiting.age, "-");
    }

    #[test]
    fn latest_fix_keeps_only_newest() {
        let cell = LatestFix::new();
        assert!(cell.latest().is_none());
        cell.update(fix(Some(40.0), 1_000));
        cell.update(fix(Some(8.0), 0));
        assert_eq!(cell.latest().and_then(|f| f.accuracy_m), Some(8.0));
    }
}
