//! facewatch-core: face deduplication engine.
//!
//! Normalizes detected face crops into fixed-size grayscale templates,
//! scores them with normalized cross-correlation, and keeps the registry
//! of faces accepted so far. Face localization uses the SeetaFace cascade
//! via `rustface`.

pub mod config;
pub mod detector;
pub mod normalize;
pub mod registry;
pub mod similarity;
pub mod types;

pub use config::Config;
pub use detector::{DetectorParams, FaceLocalizer, SeetaDetector};
pub use registry::{Assessment, FaceRegistry, MatchPolicy};
pub use similarity::{NccScorer, Similarity};
pub use types::{FaceGrid, FaceRect, FaceTemplate, TEMPLATE_SIZE};
