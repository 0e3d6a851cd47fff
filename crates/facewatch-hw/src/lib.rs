//! facewatch-hw: frame sources for the capture loop.
//!
//! Provides V4L2 camera capture (behind the `v4l` feature) and a replay
//! source that plays back a directory of still images.

#[cfg(feature = "v4l")]
pub mod camera;
pub mod frame;
pub mod replay;
pub mod source;

#[cfg(feature = "v4l")]
pub use camera::{Camera, CameraError, PixelFormat};
pub use frame::Frame;
pub use replay::ReplaySource;
pub use source::{CaptureError, FrameSource};
