//! Offscreen renderer: decodes frames and keeps the last presented image
//!
//! Used when no window system is wanted, and by tests to observe exactly what
//! reached the screen.

use std::time::Instant;

use tracing::trace;

use crate::capture::decoder::{decode_frame, RgbImage};
use crate::capture::Frame;
use crate::error::{Error, Result};
use crate::pipeline::Renderer;

#[derive(Debug, Default)]
pub struct HeadlessRenderer {
    back: Option<(u64, RgbImage)>,
    front: Option<(u64, RgbImage)>,
    presents: u64,
}

impl HeadlessRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Image currently on screen
    pub fn front(&self) -> Option<&RgbImage> {
        self.front.as_ref().map(|(_, img)| img)
    }

    /// Capture sequence number of the image on screen
    pub fn front_sequence(&self) -> Option<u64> {
        self.front.as_ref().map(|(seq, _)| *seq)
    }

    pub fn presents(&self) -> u64 {
        self.presents
    }
}

impl Renderer for HeadlessRenderer {
    fn render(&mut self, frame: &Frame) -> Result<()> {
        let render_start = Instant::now();
        let image = decode_frame(frame)?;
        self.back = Some((frame.sequence(), image));

        let render_time = render_start.elapsed();
        metrics::histogram!("framelatch_render_time_us").record(render_time.as_micros() as f64);
        trace!(sequence = frame.sequence(), ?render_time, "rendered offscreen");
        Ok(())
    }

    fn present(&mut self) -> Result<()> {
        let back = self
            .back
            .take()
            .ok_or_else(|| Error::Render("present without a rendered frame".into()))?;
        self.front = Some(back);
        self.presents += 1;
        Ok(())
    }
}
