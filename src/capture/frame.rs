use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Captured frame, immutable once built
#[derive(Clone)]
pub struct Frame {
    /// Pixel payload - refcounted, moving a Frame never copies pixels
    pub data: Bytes,

    /// Frame metadata
    pub meta: Arc<FrameMetadata>,

    /// Host capture timestamp for latency tracking
    pub timestamp: Instant,
}

/// Frame metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameMetadata {
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    /// Bytes per row of the first plane, 0 for compressed formats
    pub stride: u32,
    pub format: PixelFormat,
    pub device_timestamp: Option<Duration>, // Hardware timestamp if available
}

/// Pixel formats we accept from capture facilities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    Rgb24,
    Bgr24,
    Rgba32,
    Bgra32,
    Yuyv4,
    Nv12,
    Mjpeg,
}

impl PixelFormat {
    /// Minimum bytes in one row of the first plane, `None` for compressed formats.
    pub fn bytes_per_row(self, width: u32) -> Option<usize> {
        let width = width as usize;
        match self {
            PixelFormat::Rgb24 | PixelFormat::Bgr24 => Some(width * 3),
            PixelFormat::Rgba32 | PixelFormat::Bgra32 => Some(width * 4),
            // Macropixels cover two horizontal pixels
            PixelFormat::Yuyv4 => Some(width.div_ceil(2) * 4),
            PixelFormat::Nv12 => Some(width),
            PixelFormat::Mjpeg => None,
        }
    }

    /// Smallest buffer that can hold a `width` x `height` image laid out with
    /// `stride` bytes per row. The last row need not be padded.
    pub fn min_len(self, stride: usize, width: u32, height: u32) -> Option<usize> {
        let row = self.bytes_per_row(width)?;
        let rows = match self {
            // Luma plane followed by interleaved half-height chroma plane
            PixelFormat::Nv12 => height as usize + (height as usize).div_ceil(2),
            _ => height as usize,
        };
        let last_row = match self {
            PixelFormat::Nv12 => (width as usize).div_ceil(2) * 2,
            _ => row,
        };
        stride
            .checked_mul(rows.saturating_sub(1))
            .and_then(|n| n.checked_add(last_row))
    }

    pub fn is_compressed(self) -> bool {
        matches!(self, PixelFormat::Mjpeg)
    }
}

/// Borrowed view of one buffer handed over by a capture facility.
///
/// Only valid for the duration of the delivery callback.
#[derive(Debug, Clone, Copy)]
pub struct RawCapture<'a> {
    pub data: &'a [u8],
    pub width: u32,
    pub height: u32,
    /// Bytes per row; tightly packed when `None`
    pub stride: Option<u32>,
    pub format: PixelFormat,
    pub device_timestamp: Option<Duration>,
}

impl<'a> RawCapture<'a> {
    pub fn new(data: &'a [u8], width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            data,
            width,
            height,
            stride: None,
            format,
            device_timestamp: None,
        }
    }

    pub fn with_stride(mut self, stride: u32) -> Self {
        self.stride = Some(stride);
        self
    }

    pub fn with_device_timestamp(mut self, ts: Duration) -> Self {
        self.device_timestamp = Some(ts);
        self
    }

    /// Check the buffer can hold the image it claims to.
    ///
    /// Returns the effective row stride, 0 for compressed payloads.
    pub fn validate(&self) -> Result<u32, FrameError> {
        if self.data.is_empty() {
            return Err(FrameError::EmptyBuffer);
        }
        if self.width == 0 || self.height == 0 {
            return Err(FrameError::ZeroDimensions);
        }

        let Some(min) = self.format.bytes_per_row(self.width) else {
            if !self.data.starts_with(&[0xFF, 0xD8]) {
                return Err(FrameError::NotJpeg);
            }
            return Ok(0);
        };

        let stride = self.stride.map(|s| s as usize).unwrap_or(min);
        if stride < min {
            return Err(FrameError::BadStride { stride, min });
        }
        let expected = self
            .format
            .min_len(stride, self.width, self.height)
            .unwrap_or(usize::MAX);
        if self.data.len() < expected {
            return Err(FrameError::Truncated {
                expected,
                actual: self.data.len(),
            });
        }
        Ok(stride as u32)
    }
}

/// Reasons a raw capture buffer cannot become a [`Frame`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("capture buffer is empty")]
    EmptyBuffer,

    #[error("frame has zero width or height")]
    ZeroDimensions,

    #[error("stride {stride} is smaller than a {min}-byte row")]
    BadStride { stride: usize, min: usize },

    #[error("buffer holds {actual} bytes, {expected} required")]
    Truncated { expected: usize, actual: usize },

    #[error("payload does not start with a JPEG SOI marker")]
    NotJpeg,
}

impl Frame {
    pub fn new(data: Bytes, meta: FrameMetadata) -> Self {
        Self {
            data,
            meta: Arc::new(meta),
            timestamp: Instant::now(),
        }
    }

    /// Validate a borrowed capture buffer and copy it into an owned frame.
    pub fn from_raw(raw: &RawCapture<'_>, sequence: u64) -> Result<Self, FrameError> {
        let stride = raw.validate()?;
        Ok(Self::copy_from(raw, stride, sequence))
    }

    /// Copy an already validated buffer
    pub(crate) fn copy_from(raw: &RawCapture<'_>, stride: u32, sequence: u64) -> Self {
        Self::new(
            Bytes::copy_from_slice(raw.data),
            FrameMetadata {
                sequence,
                width: raw.width,
                height: raw.height,
                stride,
                format: raw.format,
                device_timestamp: raw.device_timestamp,
            },
        )
    }

    pub fn width(&self) -> u32 {
        self.meta.width
    }

    pub fn height(&self) -> u32 {
        self.meta.height
    }

    pub fn format(&self) -> PixelFormat {
        self.meta.format
    }

    pub fn sequence(&self) -> u64 {
        self.meta.sequence
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("len", &self.data.len())
            .field("meta", &self.meta)
            .finish()
    }
}
