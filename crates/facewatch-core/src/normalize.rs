//! Crop extraction and template normalization.
//!
//! Every template the registry holds goes through [`normalize`], whether it
//! came from a live crop or from the persistence backend at startup.

use crate::types::{FaceGrid, FaceRect, FaceTemplate, TemplateError, TEMPLATE_SIZE};
use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbImage};

/// Cut the face region out of a frame.
///
/// The rectangle is clamped to the frame first. Returns `None` for a
/// degenerate region (zero area or entirely outside the frame).
pub fn crop_face(frame: &RgbImage, rect: &FaceRect) -> Option<RgbImage> {
    let (width, height) = frame.dimensions();
    let clamped = rect.clamp_to(width, height)?;
    let view = imageops::crop_imm(
        frame,
        clamped.x as u32,
        clamped.y as u32,
        clamped.width,
        clamped.height,
    );
    Some(view.to_image())
}

/// Resize to 100×100 (bilinear) and then desaturate.
pub fn normalize(image: &DynamicImage) -> Result<FaceGrid, TemplateError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(TemplateError::Empty);
    }

    let resized = image.resize_exact(TEMPLATE_SIZE, TEMPLATE_SIZE, FilterType::Triangle);
    FaceGrid::new(resized.to_luma8())
}

/// [`normalize`] for a color crop taken from a live frame.
pub fn normalize_crop(crop: &RgbImage) -> Result<FaceGrid, TemplateError> {
    if crop.width() == 0 || crop.height() == 0 {
        return Err(TemplateError::Empty);
    }

    let resized = imageops::resize(crop, TEMPLATE_SIZE, TEMPLATE_SIZE, FilterType::Triangle);
    FaceGrid::new(DynamicImage::ImageRgb8(resized).to_luma8())
}

/// Build a template from an image previously stored under `id`.
pub fn template_from_stored(id: &str, image: &DynamicImage) -> Result<FaceTemplate, TemplateError> {
    Ok(FaceTemplate::new(id, normalize(image)?))
}
