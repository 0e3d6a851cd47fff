//! V4L2 camera source.

use crate::frame::{self, Frame};
use crate::source::{CaptureError, FrameSource};
use std::path::Path;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::{Format, FourCC};

const STREAM_BUFFERS: u32 = 4;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("no such camera: {0}")]
    NotFound(String),
    #[error("camera {0} is in use by another process")]
    Busy(String),
    #[error("{0} cannot capture video")]
    NotACaptureDevice(String),
    #[error("format negotiation failed: {0}")]
    Format(String),
    #[error("frame dequeue failed: {0}")]
    Dequeue(String),
    #[error("frame decode failed: {0}")]
    Decode(String),
}

impl From<CameraError> for CaptureError {
    fn from(err: CameraError) -> Self {
        match err {
            CameraError::Dequeue(_) | CameraError::Decode(_) => {
                CaptureError::Failed(err.to_string())
            }
            other => CaptureError::Unavailable(other.to_string()),
        }
    }
}

/// Pixel layouts the camera source can turn into RGB.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Yuyv,
    Mjpg,
    Grey,
}

impl PixelFormat {
    fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        match &fourcc.repr {
            b"YUYV" => Some(Self::Yuyv),
            b"MJPG" => Some(Self::Mjpg),
            b"GREY" => Some(Self::Grey),
            _ => None,
        }
    }

    fn decode(self, buf: &[u8], width: u32, height: u32) -> Result<image::RgbImage, CameraError> {
        let decoded = match self {
            Self::Yuyv => frame::yuyv_to_rgb(buf, width, height).map_err(|e| e.to_string()),
            Self::Grey => frame::grey_to_rgb(buf, width, height).map_err(|e| e.to_string()),
            Self::Mjpg => image::load_from_memory_with_format(buf, image::ImageFormat::Jpeg)
                .map(|img| img.to_rgb8())
                .map_err(|e| e.to_string()),
        };
        decoded.map_err(|e| CameraError::Decode(format!("{self:?}: {e}")))
    }
}

/// A streaming V4L2 capture device.
pub struct Camera {
    stream: MmapStream<'static>,
    pub width: u32,
    pub height: u32,
    pub device_path: String,
    pub fourcc: FourCC,
    pixel_format: PixelFormat,
}

impl Camera {
    /// Open `device_path` and request `width`×`height` YUYV.
    ///
    /// Keeps whatever size and supported format the driver answers with.
    pub fn open(device_path: &str, width: u32, height: u32) -> Result<Self, CameraError> {
        if !Path::new(device_path).exists() {
            return Err(CameraError::NotFound(device_path.to_string()));
        }

        let device = Device::with_path(device_path).map_err(|e| match e.raw_os_error() {
            Some(16) => CameraError::Busy(device_path.to_string()),
            _ => CameraError::NotFound(format!("{device_path}: {e}")),
        })?;

        let caps = device
            .query_caps()
            .map_err(|e| CameraError::NotFound(format!("{device_path}: {e}")))?;
        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CameraError::NotACaptureDevice(device_path.to_string()));
        }
        tracing::debug!(
            device = device_path,
            driver = %caps.driver,
            card = %caps.card,
            "camera capabilities"
        );

        let format = negotiate(&device, width, height)?;
        let pixel_format = PixelFormat::from_fourcc(format.fourcc).ok_or_else(|| {
            CameraError::Format(format!(
                "driver chose {:?}; supported are YUYV, MJPG and GREY",
                format.fourcc
            ))
        })?;
        if (format.width, format.height) != (width, height) {
            tracing::warn!(
                requested = %format!("{width}x{height}"),
                actual = %format!("{}x{}", format.width, format.height),
                "camera picked a different frame size"
            );
        }

        let stream = MmapStream::with_buffers(&device, BufType::VideoCapture, STREAM_BUFFERS)
            .map_err(|e| CameraError::Format(format!("cannot start streaming: {e}")))?;

        Ok(Self {
            stream,
            width: format.width,
            height: format.height,
            device_path: device_path.to_string(),
            fourcc: format.fourcc,
            pixel_format,
        })
    }

    /// Block until the next frame and return it as RGB.
    pub fn capture_frame(&mut self) -> Result<Frame, CameraError> {
        let (buf, meta) = self
            .stream
            .next()
            .map_err(|e| CameraError::Dequeue(e.to_string()))?;
        let image = self.pixel_format.decode(buf, self.width, self.height)?;
        Ok(Frame::new(image, meta.sequence))
    }
}

fn negotiate(device: &Device, width: u32, height: u32) -> Result<Format, CameraError> {
    let mut wanted = device
        .format()
        .map_err(|e| CameraError::Format(format!("cannot read current format: {e}")))?;
    wanted.fourcc = FourCC::new(b"YUYV");
    wanted.width = width;
    wanted.height = height;
    device
        .set_format(&wanted)
        .map_err(|e| CameraError::Format(format!("cannot set format: {e}")))
}

impl FrameSource for Camera {
    fn next_frame(&mut self) -> Result<Frame, CaptureError> {
        Ok(self.capture_frame()?)
    }

    fn describe(&self) -> String {
        format!("camera:{} {}x{} {}", self.device_path, self.width, self.height, self.fourcc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_format_from_fourcc() {
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"YUYV")), Some(PixelFormat::Yuyv));
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"MJPG")), Some(PixelFormat::Mjpg));
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"GREY")), Some(PixelFormat::Grey));
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"NV12")), None);
    }

    #[test]
    fn test_grey_decode() {
        let image = PixelFormat::Grey.decode(&[7; 6], 3, 2).unwrap();
        assert_eq!(image.dimensions(), (3, 2));
        assert_eq!(image.get_pixel(2, 1).0, [7, 7, 7]);
    }

    #[test]
    fn test_short_buffer_is_decode_error() {
        let err = PixelFormat::Yuyv.decode(&[0; 3], 2, 2).unwrap_err();
        assert!(matches!(CaptureError::from(err), CaptureError::Failed(_)));
    }

    #[test]
    fn test_missing_device() {
        let err = Camera::open("/dev/video-does-not-exist", 640, 480).err().unwrap();
        assert!(matches!(err, CameraError::NotFound(_)));
    }
}
