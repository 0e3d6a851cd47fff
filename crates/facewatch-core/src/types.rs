use image::GrayImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Side length of a normalized face template, in pixels.
pub const TEMPLATE_SIZE: u32 = 100;

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("template must be {TEMPLATE_SIZE}x{TEMPLATE_SIZE}, got {width}x{height}")]
    WrongDimensions { width: u32, height: u32 },
    #[error("image has no pixels")]
    Empty,
}

/// Axis-aligned face rectangle in frame coordinates, as reported by a localizer.
///
/// `x`/`y` may be negative when the localizer extends a box past the frame edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl FaceRect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Intersect with a `frame_width` × `frame_height` frame.
    ///
    /// Returns `None` when nothing of the rectangle lies inside the frame.
    pub fn clamp_to(&self, frame_width: u32, frame_height: u32) -> Option<FaceRect> {
        let x0 = i64::from(self.x).max(0);
        let y0 = i64::from(self.y).max(0);
        let x1 = (i64::from(self.x) + i64::from(self.width)).min(i64::from(frame_width));
        let y1 = (i64::from(self.y) + i64::from(self.height)).min(i64::from(frame_height));

        if x1 <= x0 || y1 <= y0 {
            return None;
        }

        Some(FaceRect {
            x: x0 as i32,
            y: y0 as i32,
            width: (x1 - x0) as u32,
            height: (y1 - y0) as u32,
        })
    }

    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

/// A normalized 100×100 grayscale face grid.
///
/// Only constructible with the template dimensions, so any two grids can be
/// compared pixel for pixel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaceGrid(GrayImage);

impl FaceGrid {
    pub fn new(image: GrayImage) -> Result<Self, TemplateError> {
        let (width, height) = image.dimensions();
        if width != TEMPLATE_SIZE || height != TEMPLATE_SIZE {
            return Err(TemplateError::WrongDimensions { width, height });
        }
        Ok(Self(image))
    }

    /// Row-major pixel data (`TEMPLATE_SIZE * TEMPLATE_SIZE` bytes).
    pub fn pixels(&self) -> &[u8] {
        self.0.as_raw()
    }

    pub fn as_image(&self) -> &GrayImage {
        &self.0
    }

    pub fn into_image(self) -> GrayImage {
        self.0
    }
}

/// An accepted face: backend identifier plus its normalized template.
#[derive(Debug, Clone)]
pub struct FaceTemplate {
    id: String,
    grid: FaceGrid,
}

impl FaceTemplate {
    pub fn new(id: impl Into<String>, grid: FaceGrid) -> Self {
        Self { id: id.into(), grid }
    }

    /// Identifier assigned by the persistence backend.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn grid(&self) -> &FaceGrid {
        &self.grid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_face_grid_rejects_wrong_size() {
        let result = FaceGrid::new(GrayImage::new(64, 100));
        assert!(matches!(
            result,
            Err(TemplateError::WrongDimensions { width: 64, height: 100 })
        ));
    }

    #[test]
    fn test_face_grid_accepts_template_size() {
        let grid = FaceGrid::new(GrayImage::new(TEMPLATE_SIZE, TEMPLATE_SIZE)).unwrap();
        assert_eq!(grid.pixels().len(), (TEMPLATE_SIZE * TEMPLATE_SIZE) as usize);
    }

    #[test]
    fn test_clamp_inside_frame_is_unchanged() {
        let rect = FaceRect::new(10, 20, 30, 40);
        assert_eq!(rect.clamp_to(640, 480), Some(rect));
    }

    #[test]
    fn test_clamp_trims_overhang() {
        let rect = FaceRect::new(-5, 470, 20, 20);
        assert_eq!(rect.clamp_to(640, 480), Some(FaceRect::new(0, 470, 15, 10)));
    }

    #[test]
    fn test_clamp_outside_frame() {
        assert_eq!(FaceRect::new(700, 10, 20, 20).clamp_to(640, 480), None);
        assert_eq!(FaceRect::new(10, 10, 0, 20).clamp_to(640, 480), None);
    }
}
