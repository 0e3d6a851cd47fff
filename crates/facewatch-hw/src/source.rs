//! The frame source contract consumed by the capture loop.

use crate::frame::Frame;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("end of stream")]
    EndOfStream,
    #[error("capture failed: {0}")]
    Failed(String),
    #[error("source unavailable: {0}")]
    Unavailable(String),
}

/// A lazy, potentially endless sequence of color frames.
///
/// Any error ends the stream; callers treat it as a shutdown, not a crash.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Frame, CaptureError>;

    /// Short human-readable name for logs.
    fn describe(&self) -> String;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn next_frame(&mut self) -> Result<Frame, CaptureError> {
        (**self).next_frame()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
