//! Synthetic input sources.
//!
//! Stand-ins for the camera and the position provider, so the recorder can run and be
//! tested without hardware:
//! - `SyntheticSource`: `stub://` frame source producing road-like RGBA frames
//! - `SimulatedFixSource`: walking position whose accuracy converges from poor to good

pub mod gps;
pub mod synthetic;

pub use gps::SimulatedFixSource;
pub use synthetic::{SourceConfig, SourceStats, SyntheticSource};
