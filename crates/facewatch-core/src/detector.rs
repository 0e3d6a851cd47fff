//! Face localization via the SeetaFace funnel cascade (`rustface`).
//!
//! The cascade runs on a grayscale copy of the frame and reports
//! axis-aligned boxes; everything about the classifier itself is the
//! library's business.

use crate::types::FaceRect;
use image::{DynamicImage, RgbImage};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use thiserror::Error;

// --- SeetaFace limits ---
const SEETA_MIN_FACE_SIZE: u32 = 20;
const SEETA_MIN_PYRAMID_SCALE: f32 = 0.1;
const SEETA_MAX_PYRAMID_SCALE: f32 = 0.99;
const SEETA_SCORE_PER_NEIGHBOR: f64 = 0.4;
const SEETA_WINDOW_STEP: u32 = 4;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0} (get seeta_fd_frontal_v1.0.bin from rustface)")]
    ModelNotFound(String),
    #[error("failed to load model {path}: {source}")]
    ModelLoad {
        path: String,
        source: std::io::Error,
    },
}

/// Detector tuning, expressed the way cascade detectors are usually tuned.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorParams {
    /// SeetaFace frontal model file.
    pub model_path: PathBuf,
    /// Size ratio between consecutive pyramid levels (> 1).
    pub scale_factor: f32,
    /// Higher values demand more evidence before reporting a face.
    pub min_neighbors: u32,
    /// Smallest face side, in pixels.
    pub min_size: u32,
}

impl Default for DetectorParams {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("model/seeta_fd_frontal_v1.0.bin"),
            scale_factor: 1.1,
            min_neighbors: 5,
            min_size: 30,
        }
    }
}

/// Anything that finds faces in a frame.
pub trait FaceLocalizer {
    fn detect(&mut self, frame: &RgbImage, params: &DetectorParams) -> Vec<FaceRect>;
}

/// `rustface` settings derived from [`DetectorParams`].
#[derive(Debug, Clone, Copy, PartialEq)]
struct SeetaSettings {
    min_face_size: u32,
    pyramid_scale: f32,
    score_thresh: f64,
}

impl SeetaSettings {
    fn from_params(params: &DetectorParams) -> Self {
        // The pyramid shrinks the image by 1/scale_factor per level.
        let pyramid_scale = (1.0 / params.scale_factor.max(1.0 + f32::EPSILON))
            .clamp(SEETA_MIN_PYRAMID_SCALE, SEETA_MAX_PYRAMID_SCALE);

        Self {
            min_face_size: params.min_size.max(SEETA_MIN_FACE_SIZE),
            pyramid_scale,
            score_thresh: f64::from(params.min_neighbors) * SEETA_SCORE_PER_NEIGHBOR,
        }
    }
}

/// SeetaFace-based face localizer.
pub struct SeetaDetector {
    detector: Box<dyn rustface::Detector>,
    applied: Option<SeetaSettings>,
}

impl SeetaDetector {
    /// Load the SeetaFace model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, DetectorError> {
        let path_str = model_path.display().to_string();
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(path_str));
        }

        let file = File::open(model_path).map_err(|source| DetectorError::ModelLoad {
            path: path_str.clone(),
            source,
        })?;
        let model = rustface::read_model(BufReader::new(file)).map_err(|source| {
            DetectorError::ModelLoad {
                path: path_str.clone(),
                source,
            }
        })?;

        tracing::info!(path = %path_str, "loaded SeetaFace model");

        let mut detector = rustface::create_detector_with_model(model);
        detector.set_slide_window_step(SEETA_WINDOW_STEP, SEETA_WINDOW_STEP);

        Ok(Self {
            detector,
            applied: None,
        })
    }

    fn apply(&mut self, params: &DetectorParams) {
        let settings = SeetaSettings::from_params(params);
        if self.applied == Some(settings) {
            return;
        }

        tracing::debug!(?settings, "applying detector settings");
        self.detector.set_min_face_size(settings.min_face_size);
        self.detector.set_pyramid_scale_factor(settings.pyramid_scale);
        self.detector.set_score_thresh(settings.score_thresh);
        self.applied = Some(settings);
    }
}

impl FaceLocalizer for SeetaDetector {
    fn detect(&mut self, frame: &RgbImage, params: &DetectorParams) -> Vec<FaceRect> {
        self.apply(params);

        let gray = DynamicImage::ImageRgb8(frame.clone()).to_luma8();
        let (width, height) = gray.dimensions();
        let faces = self
            .detector
            .detect(&rustface::ImageData::new(gray.as_raw(), width, height));

        faces
            .iter()
            .map(|face| {
                let bbox = face.bbox();
                FaceRect::new(bbox.x(), bbox.y(), bbox.width(), bbox.height())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_match_seeta_defaults() {
        let settings = SeetaSettings::from_params(&DetectorParams::default());
        assert_eq!(settings.min_face_size, 30);
        assert!((settings.pyramid_scale - 1.0 / 1.1).abs() < 1e-6);
        assert!((settings.score_thresh - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_min_size_floor() {
        let params = DetectorParams {
            min_size: 8,
            ..DetectorParams::default()
        };
        assert_eq!(SeetaSettings::from_params(&params).min_face_size, SEETA_MIN_FACE_SIZE);
    }

    #[test]
    fn test_pyramid_scale_is_clamped() {
        let params = DetectorParams {
            scale_factor: 1.0,
            ..DetectorParams::default()
        };
        assert_eq!(SeetaSettings::from_params(&params).pyramid_scale, SEETA_MAX_PYRAMID_SCALE);

        let params = DetectorParams {
            scale_factor: 50.0,
            ..DetectorParams::default()
        };
        assert_eq!(SeetaSettings::from_params(&params).pyramid_scale, SEETA_MIN_PYRAMID_SCALE);
    }

    #[test]
    fn test_missing_model() {
        let result = SeetaDetector::load(Path::new("/nonexistent/seeta.bin"));
        assert!(matches!(result, Err(DetectorError::ModelNotFound(_))));
    }

    #[test]
    fn test_truncated_model_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("seeta.bin");
        std::fs::write(&model, b"").unwrap();

        match SeetaDetector::load(&model).err() {
            Some(DetectorError::ModelLoad { path, .. }) => assert!(path.ends_with("seeta.bin")),
            other => panic!("expected ModelLoad, got {other:?}"),
        }
    }
}
