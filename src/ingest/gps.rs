//! Simulated position provider.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Mutex, PoisonError};

use crate::fix::{FixSource, LatestFix, PositionFix};

/// Accuracy of the very first fix, in meters.
const COLD_START_ACCURACY_M: f32 = 120.0;
/// Best accuracy the simulation settles at.
const SETTLED_ACCURACY_M: f32 = 6.0;
/// Share of the remaining error removed per fix.
const CONVERGENCE: f32 = 0.35;

/// Emits fixes along a slow walk. Accuracy starts poor and converges, the way a
/// receiver behaves after a cold start.
pub struct SimulatedFixSource {
    state: Mutex<WalkState>,
    latest: LatestFix,
}

struct WalkState {
    latitude: f64,
    longitude: f64,
    accuracy_m: f32,
    rng: StdRng,
}

impl SimulatedFixSource {
    pub fn new(latitude: f64, longitude: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            state: Mutex::new(WalkState {
                latitude,
                longitude,
                accuracy_m: COLD_START_ACCURACY_M,
                rng,
            }),
            latest: LatestFix::new(),
        }
    }

    /// Advance the walk, publish and return the new fix.
    pub fn next_fix(&self, now_ms: u64) -> PositionFix {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        // Roughly 1-2 m per step.
        let d_lat = state.rng.gen_range(-0.000_015..0.000_015);
        let d_lon = state.rng.gen_range(-0.000_015..0.000_015);
        state.latitude += d_lat;
        state.longitude += d_lon;

        let fix = PositionFix {
            latitude: state.latitude,
            longitude: state.longitude,
            accuracy_m: Some(state.accuracy_m),
            timestamp_ms: now_ms,
        };
        state.accuracy_m = (state.accuracy_m
            - (state.accuracy_m - SETTLED_ACCURACY_M) * CONVERGENCE)
            .max(SETTLED_ACCURACY_M);
        drop(state);

        self.latest.update(fix);
        fix
    }
}

impl FixSource for SimulatedFixSource {
    fn latest(&self) -> Option<PositionFix> {
        self.latest.latest()
    }
}
