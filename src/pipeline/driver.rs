//! Redraw loop driving a [`ConsumerAdapter`]
//!
//! Two trigger models are supported: redraw when the producer asks for it
//! (invalidation), or redraw on a fixed cadence. Either way each opportunity
//! takes at most one frame from the slot.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use flume::{Receiver, RecvTimeoutError};
use tracing::{debug, info};

use crate::pipeline::consumer::{ConsumerAdapter, Redraw, Renderer};

pub enum RedrawTrigger {
    /// Redraw whenever a publish notification arrives
    Invalidation(Receiver<()>),
    /// Redraw every period regardless of publishes
    Cadence(Duration),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverReport {
    pub opportunities: u64,
    pub presented: u64,
    pub skipped: u64,
    pub failed: u64,
}

impl DriverReport {
    fn record(&mut self, outcome: Redraw) {
        self.opportunities += 1;
        match outcome {
            Redraw::Presented { .. } => self.presented += 1,
            Redraw::Skipped => self.skipped += 1,
            Redraw::Failed { .. } => self.failed += 1,
        }
    }
}

enum Wait {
    Redraw,
    Idle,
    Closed,
}

pub struct RedrawDriver<R> {
    consumer: ConsumerAdapter<R>,
    trigger: RedrawTrigger,
    poll_interval: Duration,
    next_tick: Instant,
    report: DriverReport,
}

impl<R: Renderer> RedrawDriver<R> {
    pub fn new(consumer: ConsumerAdapter<R>, trigger: RedrawTrigger) -> Self {
        Self {
            consumer,
            trigger,
            poll_interval: Duration::from_millis(50),
            next_tick: Instant::now(),
            report: DriverReport::default(),
        }
    }

    /// Upper bound on how long the loop goes without checking its stop flag
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Run until `stop` is set or the notification channel closes.
    pub fn run(&mut self, stop: &AtomicBool) -> DriverReport {
        info!("Redraw loop started");
        while !stop.load(Ordering::Acquire) {
            match self.wait(self.poll_interval) {
                Wait::Redraw => self.redraw(),
                Wait::Idle => self.consumer.poll_renderer(),
                Wait::Closed => {
                    debug!("redraw notifications closed");
                    break;
                }
            }
        }
        info!(report = ?self.report, "Redraw loop stopped");
        self.report
    }

    /// Wait for and handle exactly `n` redraw opportunities, or fewer if the
    /// notification channel closes.
    pub fn run_for(&mut self, n: u64) -> DriverReport {
        let mut handled = 0;
        while handled < n {
            match self.wait(Duration::MAX) {
                Wait::Redraw => {
                    self.redraw();
                    handled += 1;
                }
                Wait::Idle => self.consumer.poll_renderer(),
                Wait::Closed => break,
            }
        }
        self.report
    }

    fn redraw(&mut self) {
        let outcome = self.consumer.on_redraw();
        if outcome == Redraw::Skipped {
            self.consumer.poll_renderer();
        }
        self.report.record(outcome);
    }

    fn wait(&mut self, limit: Duration) -> Wait {
        match &self.trigger {
            RedrawTrigger::Invalidation(rx) => {
                let result = if limit == Duration::MAX {
                    rx.recv().map_err(|_| RecvTimeoutError::Disconnected)
                } else {
                    rx.recv_timeout(limit)
                };
                match result {
                    Ok(()) => Wait::Redraw,
                    Err(RecvTimeoutError::Timeout) => Wait::Idle,
                    Err(RecvTimeoutError::Disconnected) => Wait::Closed,
                }
            }
            RedrawTrigger::Cadence(period) => {
                let now = Instant::now();
                if now < self.next_tick {
                    let remaining = self.next_tick - now;
                    if remaining > limit {
                        std::thread::sleep(limit);
                        return Wait::Idle;
                    }
                    std::thread::sleep(remaining);
                }
                // Fell behind: restart the cadence from now instead of bursting
                self.next_tick = (self.next_tick + *period).max(Instant::now());
                Wait::Redraw
            }
        }
    }

    pub fn report(&self) -> DriverReport {
        self.report
    }

    pub fn consumer(&self) -> &ConsumerAdapter<R> {
        &self.consumer
    }

    pub fn into_consumer(self) -> ConsumerAdapter<R> {
        self.consumer
    }
}
