//! Lock-free single-slot mailbox with "latest value wins" semantics
//!
//! A producer overwrites, a consumer takes. Nothing queues: publishing while a
//! value is still pending drops the pending one on the spot. Every publish bumps
//! a generation counter, so gaps seen by the consumer are exactly the dropped
//! values.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use crossbeam::utils::CachePadded;
use tracing::trace;

use crate::capture::Frame;

/// A value together with the generation its publish produced
#[derive(Debug)]
pub struct Stamped<T> {
    pub generation: u64,
    pub value: T,
}

impl<T> Stamped<T> {
    pub fn into_inner(self) -> T {
        self.value
    }
}

/// Counters describing slot traffic
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotStats {
    pub published: u64,
    pub consumed: u64,
    pub overwritten: u64,
}

#[derive(Default)]
struct Counters {
    generation: AtomicU64,
    consumed: AtomicU64,
    overwritten: AtomicU64,
}

/// Thread-safe single-slot mailbox
pub struct LatestSlot<T> {
    slot: ArcSwapOption<Stamped<T>>,

    /// Hot counters kept off the slot's cache line
    counters: CachePadded<Counters>,
}

/// The slot shared between capture delivery and redraw
pub type LatestFrameSlot = LatestSlot<Frame>;

impl<T> LatestSlot<T> {
    pub fn new() -> Self {
        Self {
            slot: ArcSwapOption::empty(),
            counters: CachePadded::new(Counters::default()),
        }
    }

    /// Store `value`, discarding whatever was pending.
    ///
    /// Returns the generation assigned to this publish. Never blocks: the
    /// exchange is a single atomic swap and the displaced value is released
    /// after it.
    pub fn publish(&self, value: T) -> u64 {
        let generation = self.counters.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let stamped = Arc::new(Stamped { generation, value });

        if let Some(stale) = self.slot.swap(Some(stamped)) {
            self.counters.overwritten.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("framelatch_frames_overwritten_total").increment(1);
            trace!(stale = stale.generation, generation, "overwrote pending value");
        }

        generation
    }

    /// Take the pending value, leaving the slot empty.
    ///
    /// `None` means nothing was published since the last take.
    pub fn consume_latest(&self) -> Option<Stamped<T>> {
        let taken = self.slot.swap(None)?;
        self.counters.consumed.fetch_add(1, Ordering::Relaxed);
        Some(unwrap_stamped(taken))
    }

    /// Current generation counter; equals the number of publishes so far.
    pub fn peek_generation(&self) -> u64 {
        self.counters.generation.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.slot.load().is_none()
    }

    pub fn stats(&self) -> SlotStats {
        SlotStats {
            published: self.counters.generation.load(Ordering::Acquire),
            consumed: self.counters.consumed.load(Ordering::Relaxed),
            overwritten: self.counters.overwritten.load(Ordering::Relaxed),
        }
    }
}

impl<T> Default for LatestSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// The swapped-out Arc is the last owner unless a concurrent `is_empty` guard
/// still holds it; wait that guard out instead of cloning `T`.
fn unwrap_stamped<T>(mut arc: Arc<Stamped<T>>) -> Stamped<T> {
    loop {
        match Arc::try_unwrap(arc) {
            Ok(stamped) => return stamped,
            Err(shared) => {
                arc = shared;
                std::hint::spin_loop();
            }
        }
    }
}
