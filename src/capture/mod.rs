pub mod decoder;
pub mod frame;
pub mod synthetic;
#[cfg(feature = "v4l2")]
pub mod v4l2;

pub use frame::{Frame, FrameError, FrameMetadata, PixelFormat, RawCapture};
pub use synthetic::TestPatternSource;
#[cfg(feature = "v4l2")]
pub use v4l2::V4l2Capture;
