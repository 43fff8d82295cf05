mod backend;
mod backends;
mod normalize;
mod result;

pub use backend::DetectorBackend;
pub use backends::{ReplayBackend, SyntheticBackend};
pub use normalize::{
    normalize, normalize_batch, resolve_bounds, resolve_confidence, resolve_label,
    CanonicalDetection, DEFAULT_LABEL,
};
pub use result::{
    Bounds, BoundsEncoding, DetectionBatch, DetectorOutput, LabelFields, RawDetection,
    ScoreFields, ScoreValue,
};
