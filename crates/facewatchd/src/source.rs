use facewatch_core::config::{SourceConfig, SourceKind};
use facewatch_hw::{CaptureError, FrameSource, ReplaySource};

/// Open the frame source selected by the configuration.
pub fn open(config: &SourceConfig) -> Result<Box<dyn FrameSource>, CaptureError> {
    match config.kind {
        SourceKind::Replay => {
            let dir = config
                .replay_dir
                .as_deref()
                .ok_or_else(|| CaptureError::Unavailable("replay source has no directory".into()))?;
            Ok(Box::new(ReplaySource::open(dir, config.replay_loop)?))
        }
        SourceKind::Camera => open_camera(config),
    }
}

#[cfg(feature = "v4l")]
fn open_camera(config: &SourceConfig) -> Result<Box<dyn FrameSource>, CaptureError> {
    let camera = facewatch_hw::Camera::open(&config.device, config.width, config.height)?;
    tracing::info!(
        device = %config.device,
        width = camera.width,
        height = camera.height,
        fourcc = ?camera.fourcc,
        "camera opened"
    );
    Ok(Box::new(camera))
}

#[cfg(not(feature = "v4l"))]
fn open_camera(config: &SourceConfig) -> Result<Box<dyn FrameSource>, CaptureError> {
    Err(CaptureError::Unavailable(format!(
        "{}: built without camera support (rebuild with --features v4l)",
        config.device
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_opens_replay_directory() {
        let dir = tempfile::tempdir().unwrap();
        RgbImage::from_pixel(16, 12, Rgb([10, 20, 30]))
            .save(dir.path().join("0001.png"))
            .unwrap();

        let config = SourceConfig {
            kind: SourceKind::Replay,
            replay_dir: Some(dir.path().to_path_buf()),
            ..SourceConfig::default()
        };
        let mut source = open(&config).unwrap();
        assert_eq!(source.next_frame().unwrap().width(), 16);
        assert!(matches!(source.next_frame(), Err(CaptureError::EndOfStream)));
    }

    #[test]
    fn test_replay_without_directory_fails() {
        let config = SourceConfig {
            kind: SourceKind::Replay,
            ..SourceConfig::default()
        };
        assert!(matches!(open(&config), Err(CaptureError::Unavailable(_))));
    }
}
