//! Capture-side adapter: turns raw deliveries into published frames

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam::utils::CachePadded;
use flume::{Receiver, Sender, TrySendError};
use tracing::debug;

use crate::capture::{Frame, FrameError, RawCapture};
use crate::pipeline::slot::LatestFrameSlot;

/// Anything a capture facility can hand its buffers to.
///
/// Implementations must return quickly and may be called from several
/// delivery threads at once.
pub trait CaptureSink: Send + Sync {
    fn deliver(&self, raw: RawCapture<'_>);
}

impl<S: CaptureSink + ?Sized> CaptureSink for Arc<S> {
    fn deliver(&self, raw: RawCapture<'_>) {
        (**self).deliver(raw)
    }
}

type SkipObserver = Box<dyn Fn(&FrameError) + Send + Sync>;

/// Coalescing "a redraw is needed" signal.
///
/// Capacity one: while a request is pending further requests are absorbed, so
/// a burst of publishes results in a single redraw.
#[derive(Clone)]
pub struct RedrawNotifier {
    tx: Sender<()>,
}

impl RedrawNotifier {
    pub fn channel() -> (Self, Receiver<()>) {
        let (tx, rx) = flume::bounded(1);
        (Self { tx }, rx)
    }

    /// Returns false once the redraw side has gone away.
    pub fn request_redraw(&self) -> bool {
        match self.tx.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => true,
            Err(TrySendError::Disconnected(())) => false,
        }
    }
}

#[derive(Default)]
struct Counters {
    sequence: AtomicU64,
    skipped: AtomicU64,
}

/// Publishes every well-formed capture buffer into the shared slot
pub struct ProducerAdapter {
    slot: Arc<LatestFrameSlot>,
    notifier: Option<RedrawNotifier>,
    on_skip: Option<SkipObserver>,
    counters: CachePadded<Counters>,
}

impl ProducerAdapter {
    pub fn new(slot: Arc<LatestFrameSlot>) -> Self {
        Self {
            slot,
            notifier: None,
            on_skip: None,
            counters: CachePadded::new(Counters::default()),
        }
    }

    /// Request a redraw after each successful publish
    pub fn with_notifier(mut self, notifier: RedrawNotifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Observe buffers that were dropped as malformed
    pub fn on_skip<F>(mut self, observer: F) -> Self
    where
        F: Fn(&FrameError) + Send + Sync + 'static,
    {
        self.on_skip = Some(Box::new(observer));
        self
    }

    pub fn slot(&self) -> &Arc<LatestFrameSlot> {
        &self.slot
    }

    /// Number of frames this adapter has published
    pub fn published(&self) -> u64 {
        self.counters.sequence.load(Ordering::Relaxed)
    }

    /// Number of buffers rejected as malformed
    pub fn skipped(&self) -> u64 {
        self.counters.skipped.load(Ordering::Relaxed)
    }

    fn skip(&self, err: &FrameError) {
        let total = self.counters.skipped.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(%err, total, "skipping capture buffer");
        metrics::counter!("framelatch_frames_skipped_total").increment(1);
        if let Some(observer) = &self.on_skip {
            observer(err);
        }
    }
}

impl CaptureSink for ProducerAdapter {
    fn deliver(&self, raw: RawCapture<'_>) {
        let stride = match raw.validate() {
            Ok(stride) => stride,
            Err(err) => {
                self.skip(&err);
                return;
            }
        };

        let sequence = self.counters.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let frame = Frame::copy_from(&raw, stride, sequence);

        self.slot.publish(frame);
        metrics::counter!("framelatch_frames_published_total").increment(1);

        if let Some(notifier) = &self.notifier {
            notifier.request_redraw();
        }
    }
}
