//! Test-pattern capture facility
//!
//! Stands in for a camera: scrolls colour bars across an RGB24 buffer at a
//! fixed rate and delivers each buffer to a [`CaptureSink`]. The buffer is
//! reused between deliveries, so sinks must copy what they keep, exactly as
//! with a real device.

use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::capture::{PixelFormat, RawCapture};
use crate::pipeline::CaptureSink;

const BARS: [[u8; 3]; 8] = [
    [255, 255, 255],
    [255, 255, 0],
    [0, 255, 255],
    [0, 255, 0],
    [255, 0, 255],
    [255, 0, 0],
    [0, 0, 255],
    [0, 0, 0],
];

#[derive(Debug, Clone)]
pub struct TestPatternSource {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Stop on its own after this many frames
    pub frame_limit: Option<u64>,
}

impl TestPatternSource {
    pub fn new(width: u32, height: u32, fps: u32) -> Self {
        Self {
            width,
            height,
            fps,
            frame_limit: None,
        }
    }

    pub fn with_frame_limit(mut self, limit: u64) -> Self {
        self.frame_limit = Some(limit);
        self
    }

    /// Draw frame `n` of the pattern into `buf` (RGB24, tightly packed)
    pub fn fill(&self, buf: &mut [u8], n: u64) {
        let width = self.width as usize;
        if width == 0 {
            return;
        }
        let bar_width = width.div_ceil(BARS.len()).max(1);
        let shift = (n % width as u64) as usize;
        for row in buf.chunks_exact_mut(width * 3) {
            for (x, px) in row.chunks_exact_mut(3).enumerate() {
                let bar = ((x + shift) % width) / bar_width;
                px.copy_from_slice(&BARS[bar % BARS.len()]);
            }
        }
    }

    /// Deliver frames on the current tokio runtime until `shutdown` flips to
    /// true, the frame limit is reached, or the sender side is dropped.
    ///
    /// The task resolves to the number of frames delivered.
    pub fn spawn<S>(self, sink: S, mut shutdown: watch::Receiver<bool>) -> JoinHandle<u64>
    where
        S: CaptureSink + 'static,
    {
        tokio::spawn(async move {
            let period = Duration::from_nanos(1_000_000_000 / self.fps.max(1) as u64);
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            let mut buf = vec![0u8; self.width as usize * self.height as usize * 3];
            let started = Instant::now();
            let mut delivered = 0u64;

            info!(
                "Test pattern source started: {}x{} @ {} fps",
                self.width, self.height, self.fps
            );

            loop {
                if self.frame_limit.is_some_and(|limit| delivered >= limit) {
                    break;
                }
                tokio::select! {
                    _ = ticker.tick() => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                        continue;
                    }
                }

                self.fill(&mut buf, delivered);
                let raw = RawCapture::new(&buf, self.width, self.height, PixelFormat::Rgb24)
                    .with_device_timestamp(started.elapsed());
                sink.deliver(raw);
                delivered += 1;
            }

            debug!(delivered, "test pattern source stopped");
            delivered
        })
    }
}
