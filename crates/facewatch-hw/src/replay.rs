//! Replay a directory of still images as a frame stream.

use crate::frame::Frame;
use crate::source::{CaptureError, FrameSource};
use std::path::{Path, PathBuf};

/// Plays back every decodable image in a directory, in file-name order.
pub struct ReplaySource {
    dir: PathBuf,
    paths: Vec<PathBuf>,
    cursor: usize,
    looping: bool,
    sequence: u32,
}

impl ReplaySource {
    pub fn open(dir: &Path, looping: bool) -> Result<Self, CaptureError> {
        let entries = std::fs::read_dir(dir)
            .map_err(|e| CaptureError::Unavailable(format!("{}: {e}", dir.display())))?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && image::ImageFormat::from_path(path).is_ok())
            .collect();
        paths.sort();

        tracing::info!(dir = %dir.display(), frames = paths.len(), looping, "replay source opened");

        Ok(Self {
            dir: dir.to_path_buf(),
            paths,
            cursor: 0,
            looping,
            sequence: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl FrameSource for ReplaySource {
    fn next_frame(&mut self) -> Result<Frame, CaptureError> {
        // Bounded so a directory of undecodable files cannot spin forever.
        for _ in 0..self.paths.len() {
            if self.cursor >= self.paths.len() {
                if !self.looping {
                    return Err(CaptureError::EndOfStream);
                }
                self.cursor = 0;
            }

            let path = &self.paths[self.cursor];
            self.cursor += 1;

            match image::open(path) {
                Ok(img) => {
                    let frame = Frame::new(img.to_rgb8(), self.sequence);
                    self.sequence = self.sequence.wrapping_add(1);
                    return Ok(frame);
                }
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "skipping undecodable frame"
                    );
                }
            }
        }

        Err(CaptureError::EndOfStream)
    }

    fn describe(&self) -> String {
        format!("replay:{}", self.dir.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn write_frame(dir: &Path, name: &str, shade: u8) {
        RgbImage::from_pixel(8, 6, Rgb([shade, shade, shade]))
            .save(dir.join(name))
            .unwrap();
    }

    #[test]
    fn test_replays_in_name_order_then_ends() {
        let dir = tempfile::tempdir().unwrap();
        write_frame(dir.path(), "b.png", 20);
        write_frame(dir.path(), "a.png", 10);
        std::fs::write(dir.path().join("notes.txt"), "not a frame").unwrap();

        let mut source = ReplaySource::open(dir.path(), false).unwrap();
        assert_eq!(source.len(), 2);

        let first = source.next_frame().unwrap();
        assert_eq!(first.image.get_pixel(0, 0).0, [10, 10, 10]);
        assert_eq!(first.sequence, 0);

        let second = source.next_frame().unwrap();
        assert_eq!(second.image.get_pixel(0, 0).0, [20, 20, 20]);
        assert_eq!(second.sequence, 1);

        assert!(matches!(source.next_frame(), Err(CaptureError::EndOfStream)));
    }

    #[test]
    fn test_looping_restarts() {
        let dir = tempfile::tempdir().unwrap();
        write_frame(dir.path(), "only.png", 42);

        let mut source = ReplaySource::open(dir.path(), true).unwrap();
        for seq in 0..3 {
            let frame = source.next_frame().unwrap();
            assert_eq!(frame.sequence, seq);
        }
    }

    #[test]
    fn test_skips_corrupt_image() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.png"), b"garbage").unwrap();
        write_frame(dir.path(), "b.png", 99);

        let mut source = ReplaySource::open(dir.path(), false).unwrap();
        let frame = source.next_frame().unwrap();
        assert_eq!(frame.image.get_pixel(0, 0).0, [99, 99, 99]);
    }

    #[test]
    fn test_empty_directory_ends_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = ReplaySource::open(dir.path(), true).unwrap();
        assert!(source.is_empty());
        assert!(matches!(source.next_frame(), Err(CaptureError::EndOfStream)));
    }

    #[test]
    fn test_missing_directory() {
        let result = ReplaySource::open(Path::new("/nonexistent/frames"), false);
        assert!(matches!(result, Err(CaptureError::Unavailable(_))));
    }
}
