//! Redraw-side adapter: pulls the newest frame and hands it to a renderer

use std::sync::Arc;

use tracing::{trace, warn};

use crate::capture::Frame;
use crate::error::Result;
use crate::pipeline::slot::LatestFrameSlot;

/// External render/present facility
pub trait Renderer {
    /// Draw `frame` into the current target surface
    fn render(&mut self, frame: &Frame) -> Result<()>;

    /// Present whatever was last rendered
    fn present(&mut self) -> Result<()>;

    /// Called when a redraw opportunity passes without a frame, so
    /// windowed renderers can keep servicing their event queue.
    fn poll(&mut self) {}
}

impl<R: Renderer + ?Sized> Renderer for Box<R> {
    fn render(&mut self, frame: &Frame) -> Result<()> {
        (**self).render(frame)
    }

    fn present(&mut self) -> Result<()> {
        (**self).present()
    }

    fn poll(&mut self) {
        (**self).poll()
    }
}

/// Where the consumer is within one redraw opportunity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Idle,
    Consuming,
    Rendering,
}

/// Outcome of one redraw opportunity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redraw {
    /// Nothing new in the slot, renderer untouched
    Skipped,
    Presented { generation: u64 },
    /// Frame was taken but render or present failed
    Failed { generation: u64 },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub presented: u64,
    pub skipped: u64,
    pub failed: u64,
    /// Publishes that were overwritten before this consumer could take them
    pub dropped: u64,
}

pub struct ConsumerAdapter<R> {
    slot: Arc<LatestFrameSlot>,
    renderer: R,
    state: ConsumerState,
    last_generation: u64,
    stats: ConsumerStats,
}

impl<R: Renderer> ConsumerAdapter<R> {
    pub fn new(slot: Arc<LatestFrameSlot>, renderer: R) -> Self {
        Self {
            slot,
            renderer,
            state: ConsumerState::Idle,
            last_generation: 0,
            stats: ConsumerStats::default(),
        }
    }

    /// Handle one redraw opportunity.
    ///
    /// An empty slot is the normal "nothing new" case and never reaches the
    /// renderer. Render failures are logged and reported, never propagated.
    pub fn on_redraw(&mut self) -> Redraw {
        self.state = ConsumerState::Consuming;
        let Some(stamped) = self.slot.consume_latest() else {
            self.state = ConsumerState::Idle;
            self.stats.skipped += 1;
            trace!("slot empty, skipping redraw");
            return Redraw::Skipped;
        };

        let generation = stamped.generation;
        if generation > self.last_generation {
            self.stats.dropped += generation - self.last_generation - 1;
            self.last_generation = generation;
        }

        // The frame is out of the slot now; producers are free while we render
        self.state = ConsumerState::Rendering;
        let frame = stamped.into_inner();
        metrics::histogram!("framelatch_frame_latency_ms")
            .record(frame.timestamp.elapsed().as_secs_f64() * 1000.0);

        let result = self
            .renderer
            .render(&frame)
            .and_then(|()| self.renderer.present());
        self.state = ConsumerState::Idle;

        match result {
            Ok(()) => {
                self.stats.presented += 1;
                metrics::counter!("framelatch_frames_presented_total").increment(1);
                Redraw::Presented { generation }
            }
            Err(err) => {
                self.stats.failed += 1;
                metrics::counter!("framelatch_render_failures_total").increment(1);
                warn!(%err, generation, "failed to render frame");
                Redraw::Failed { generation }
            }
        }
    }

    /// Let the renderer service its event queue between frames
    pub fn poll_renderer(&mut self) {
        self.renderer.poll();
    }

    pub fn state(&self) -> ConsumerState {
        self.state
    }

    pub fn stats(&self) -> ConsumerStats {
        self.stats
    }

    /// Generation of the newest frame this consumer has taken
    pub fn last_generation(&self) -> u64 {
        self.last_generation
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    pub fn into_renderer(self) -> R {
        self.renderer
    }
}
