//! V4L2 camera capture feeding a [`CaptureSink`]

use std::io::ErrorKind;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, info, instrument};
use v4l::buffer::Type;
use v4l::capability::Flags as CapFlags;
use v4l::io::traits::CaptureStream;
use v4l::prelude::MmapStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use crate::capture::{PixelFormat, RawCapture};
use crate::error::{Error, Result};
use crate::pipeline::CaptureSink;
use crate::CaptureConfig;

/// Opened and configured V4L2 device
pub struct V4l2Capture {
    device: Device,
    path: String,
    width: u32,
    height: u32,
    stride: u32,
    format: PixelFormat,
    buffer_count: u32,
}

fn fourcc_for(format: PixelFormat) -> Option<FourCC> {
    match format {
        PixelFormat::Mjpeg => Some(FourCC::new(b"MJPG")),
        PixelFormat::Yuyv4 => Some(FourCC::new(b"YUYV")),
        PixelFormat::Nv12 => Some(FourCC::new(b"NV12")),
        PixelFormat::Rgb24 => Some(FourCC::new(b"RGB3")),
        PixelFormat::Bgr24 => Some(FourCC::new(b"BGR3")),
        _ => None,
    }
}

fn format_for(fourcc: FourCC) -> Option<PixelFormat> {
    [
        PixelFormat::Mjpeg,
        PixelFormat::Yuyv4,
        PixelFormat::Nv12,
        PixelFormat::Rgb24,
        PixelFormat::Bgr24,
    ]
    .into_iter()
    .find(|&f| fourcc_for(f) == Some(fourcc))
}

impl V4l2Capture {
    /// Open the configured device (or the first usable one) and negotiate
    /// the requested format.
    #[instrument(skip(config))]
    pub fn open(config: &CaptureConfig) -> Result<Self> {
        let path = match &config.device {
            Some(path) => path.clone(),
            None => auto_detect_device()?,
        };
        info!("Initializing V4L2 capture: {}", path);

        let device = Device::with_path(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => Error::NoCaptureDevice,
            _ => Error::CaptureInput(format!("{}: {}", path, e)),
        })?;

        let caps = device
            .query_caps()
            .map_err(|e| Error::CaptureInput(e.to_string()))?;
        info!("Device: {} ({})", caps.card, caps.driver);

        if !caps.capabilities.contains(CapFlags::VIDEO_CAPTURE) {
            return Err(Error::CaptureInput(format!(
                "{} doesn't support video capture",
                path
            )));
        }

        let fourcc = fourcc_for(config.format).ok_or(Error::UnsupportedFormat(config.format))?;
        let mut fmt = device
            .format()
            .map_err(|e| Error::CaptureOutput(e.to_string()))?;
        fmt.width = config.width;
        fmt.height = config.height;
        fmt.fourcc = fourcc;

        // Drivers may adjust the request; trust what comes back
        let fmt = device
            .set_format(&fmt)
            .map_err(|e| Error::CaptureOutput(e.to_string()))?;
        let format = format_for(fmt.fourcc).ok_or(Error::UnsupportedFormat(config.format))?;

        info!(
            "Negotiated {}x{} {:?} (stride {})",
            fmt.width, fmt.height, format, fmt.stride
        );

        Ok(Self {
            device,
            path,
            width: fmt.width,
            height: fmt.height,
            stride: fmt.stride,
            format,
            buffer_count: config.buffer_count,
        })
    }

    /// Pump frames into `sink` until `stop` is set. Blocks the calling thread.
    pub fn run<S: CaptureSink>(&self, sink: &S, stop: &AtomicBool) -> Result<u64> {
        let mut stream = MmapStream::with_buffers(&self.device, Type::VideoCapture, self.buffer_count)
            .map_err(|e| Error::CaptureOutput(e.to_string()))?;
        info!(
            "Capture stream started on {} with {} buffers",
            self.path, self.buffer_count
        );

        let mut delivered = 0u64;
        while !stop.load(Ordering::Acquire) {
            let (buf, meta) = stream.next()?;
            let used = (meta.bytesused as usize).min(buf.len());
            let timestamp = Duration::from_secs(meta.timestamp.sec as u64)
                + Duration::from_micros(meta.timestamp.usec as u64);

            let mut raw = RawCapture::new(&buf[..used], self.width, self.height, self.format)
                .with_device_timestamp(timestamp);
            if !self.format.is_compressed() && self.stride > 0 {
                raw = raw.with_stride(self.stride);
            }
            sink.deliver(raw);
            delivered += 1;
        }

        debug!(delivered, "capture stream stopped");
        Ok(delivered)
    }
}

/// Find the first device node that can capture video in a format we accept
pub fn auto_detect_device() -> Result<String> {
    info!("Auto-detecting capture devices...");

    for i in 0..10 {
        let path = format!("/dev/video{}", i);
        if !Path::new(&path).exists() {
            continue;
        }

        let Ok(dev) = Device::with_path(&path) else {
            continue;
        };
        let Ok(caps) = dev.query_caps() else {
            continue;
        };
        if !caps.capabilities.contains(CapFlags::VIDEO_CAPTURE) {
            continue;
        }
        if let Ok(formats) = dev.enum_formats() {
            if let Some(fmt) = formats.iter().find(|f| format_for(f.fourcc).is_some()) {
                info!("Found {} device: {} - {}", fmt.fourcc, path, caps.card);
                return Ok(path);
            }
        }
    }

    Err(Error::NoCaptureDevice)
}
