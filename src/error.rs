use thiserror::Error;

use crate::capture::PixelFormat;

/// Errors surfaced to callers at setup time or by renderers.
///
/// Per-frame conversion problems never reach this type; the producer swallows
/// them (see [`crate::capture::FrameError`]).
#[derive(Error, Debug)]
pub enum Error {
    #[error("no capture device available")]
    NoCaptureDevice,

    #[error("could not create capture input: {0}")]
    CaptureInput(String),

    #[error("could not add capture output: {0}")]
    CaptureOutput(String),

    #[error("unsupported pixel format: {0:?}")]
    UnsupportedFormat(PixelFormat),

    #[error("display setup failed: {0}")]
    Display(String),

    #[error("render failed: {0}")]
    Render(String),

    #[error("decode failed: {0}")]
    Decode(String),

    #[error("invalid configuration: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
