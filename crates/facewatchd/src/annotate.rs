//! Operator preview: the last processed frame with face boxes drawn on it.

use crate::engine::{FaceOutcome, FrameReport};
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use std::path::{Path, PathBuf};

/// Outline of every detected face.
pub const DETECTED: Rgb<u8> = Rgb([0, 255, 0]);
/// Inner outline of a face stored in this frame.
pub const ACCEPTED: Rgb<u8> = Rgb([255, 255, 0]);

const ACCEPTED_INSET: u32 = 2;

/// Draw the report's rectangles onto `frame`.
pub fn draw(frame: &mut RgbImage, report: &FrameReport) {
    let (width, height) = frame.dimensions();
    for (rect, outcome) in &report.faces {
        let Some(clamped) = rect.clamp_to(width, height) else {
            continue;
        };
        draw_hollow_rect_mut(
            frame,
            Rect::at(clamped.x, clamped.y).of_size(clamped.width, clamped.height),
            DETECTED,
        );

        let inset = ACCEPTED_INSET;
        if matches!(outcome, FaceOutcome::Accepted { .. })
            && clamped.width > 2 * inset
            && clamped.height > 2 * inset
        {
            draw_hollow_rect_mut(
                frame,
                Rect::at(clamped.x + inset as i32, clamped.y + inset as i32)
                    .of_size(clamped.width - 2 * inset, clamped.height - 2 * inset),
                ACCEPTED,
            );
        }
    }
}

/// Overwrites a single image file with the latest annotated frame.
pub struct Preview {
    path: PathBuf,
    failing: bool,
}

impl Preview {
    pub fn new(path: &Path) -> Self {
        tracing::info!(path = %path.display(), "writing annotated preview");
        Self {
            path: path.to_path_buf(),
            failing: false,
        }
    }

    /// Save `frame`. Failures are logged once per streak and never stop capture.
    pub fn write(&mut self, frame: &RgbImage) {
        match frame.save(&self.path) {
            Ok(()) => {
                if self.failing {
                    tracing::info!(path = %self.path.display(), "preview writable again");
                }
                self.failing = false;
            }
            Err(e) => {
                if !self.failing {
                    tracing::warn!(
                        path = %self.path.display(),
                        error = %e,
                        "failed to write preview"
                    );
                }
                self.failing = true;
            }
        }
    }
}
