//! Latest-frame handoff between capture delivery and redraw

pub mod consumer;
pub mod driver;
pub mod producer;
pub mod slot;

pub use consumer::{ConsumerAdapter, ConsumerState, ConsumerStats, Redraw, Renderer};
pub use driver::{DriverReport, RedrawDriver, RedrawTrigger};
pub use producer::{CaptureSink, ProducerAdapter, RedrawNotifier};
pub use slot::{LatestFrameSlot, LatestSlot, SlotStats, Stamped};
