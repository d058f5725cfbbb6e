use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use framelatch::capture::{PixelFormat, RawCapture};
use framelatch::pipeline::{CaptureSink, LatestSlot, ProducerAdapter};
use framelatch::LatestFrameSlot;

const PRODUCERS: usize = 4;
const PER_PRODUCER: usize = 250;

/// Payload that tracks how many instances are alive
struct Tracked {
    producer: usize,
    seq: usize,
    live: Arc<AtomicUsize>,
}

impl Tracked {
    fn new(producer: usize, seq: usize, live: &Arc<AtomicUsize>) -> Self {
        live.fetch_add(1, Ordering::SeqCst);
        Self {
            producer,
            seq,
            live: live.clone(),
        }
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

#[test]
fn test_concurrent_publish_and_consume() {
    let live = Arc::new(AtomicUsize::new(0));
    let slot = Arc::new(LatestSlot::new());
    let start = Arc::new(Barrier::new(PRODUCERS + 1));
    let done = Arc::new(AtomicBool::new(false));

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let slot = slot.clone();
            let live = live.clone();
            let start = start.clone();
            thread::spawn(move || {
                start.wait();
                for seq in 0..PER_PRODUCER {
                    slot.publish(Tracked::new(p, seq, &live));
                }
            })
        })
        .collect();

    let consumer = {
        let slot = slot.clone();
        let start = start.clone();
        let done = done.clone();
        thread::spawn(move || {
            start.wait();
            let mut last_seen = [None::<usize>; PRODUCERS];
            let mut taken = 0u64;
            let mut calls = 0usize;
            while calls < PRODUCERS * PER_PRODUCER || !done.load(Ordering::Acquire) {
                calls += 1;
                if let Some(stamped) = slot.consume_latest() {
                    let value = stamped.into_inner();
                    // One producer's publishes are never seen out of order
                    if let Some(prev) = last_seen[value.producer] {
                        assert!(value.seq > prev, "producer {} went backwards", value.producer);
                    }
                    last_seen[value.producer] = Some(value.seq);
                    taken += 1;
                }
            }
            taken
        })
    };

    for handle in producers {
        handle.join().unwrap();
    }
    done.store(true, Ordering::Release);
    let taken = consumer.join().unwrap();

    let total = (PRODUCERS * PER_PRODUCER) as u64;
    assert_eq!(slot.peek_generation(), total);

    let stats = slot.stats();
    let leftover = slot.consume_latest().map(|_| 1).unwrap_or(0);
    assert_eq!(stats.consumed, taken);
    assert_eq!(stats.consumed + stats.overwritten + leftover, total);

    // Every payload was released exactly once
    assert_eq!(live.load(Ordering::SeqCst), 0);
}

#[test]
fn test_publish_never_retains_more_than_one_value() {
    let live = Arc::new(AtomicUsize::new(0));
    let slot = LatestSlot::new();

    for seq in 0..100_000 {
        slot.publish(Tracked::new(0, seq, &live));
        assert_eq!(live.load(Ordering::SeqCst), 1);
    }

    assert_eq!(slot.peek_generation(), 100_000);
    let latest = slot.consume_latest().expect("pending value");
    assert_eq!(latest.generation, 100_000);
    assert_eq!(latest.value.seq, 99_999);
}

#[test]
fn test_generation_counts_every_publish_under_contention() {
    let slot = Arc::new(LatestSlot::<u64>::new());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let slot = slot.clone();
            thread::spawn(move || {
                let mut generations = Vec::with_capacity(1000);
                for i in 0..1000 {
                    generations.push(slot.publish(i));
                }
                generations
            })
        })
        .collect();

    let mut all: Vec<u64> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    all.sort_unstable();

    // Each publish got its own generation, no gaps and no repeats
    assert_eq!(all, (1..=8000).collect::<Vec<_>>());
    assert_eq!(slot.peek_generation(), 8000);
}

#[test]
fn test_concurrent_deliveries_through_producer() {
    let slot = Arc::new(LatestFrameSlot::new());
    let producer = Arc::new(ProducerAdapter::new(slot.clone()));

    let handles: Vec<_> = (0..PRODUCERS)
        .map(|t| {
            let producer = producer.clone();
            thread::spawn(move || {
                let good = vec![t as u8; 2 * 2 * 3];
                for i in 0..100 {
                    if i % 10 == 0 {
                        // Short buffer, must be skipped
                        producer.deliver(RawCapture::new(&good[..5], 2, 2, PixelFormat::Rgb24));
                    } else {
                        producer.deliver(RawCapture::new(&good, 2, 2, PixelFormat::Rgb24));
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(producer.skipped(), (PRODUCERS * 10) as u64);
    assert_eq!(producer.published(), (PRODUCERS * 90) as u64);
    assert_eq!(slot.peek_generation(), producer.published());

    let frame = slot.consume_latest().expect("last frame").into_inner();
    assert_eq!(frame.data.len(), 12);
    assert!(slot.consume_latest().is_none());
}

#[test]
fn test_is_empty_racing_consume_hands_out_every_value_once() {
    const PUBLISHES: usize = 20_000;

    let live = Arc::new(AtomicUsize::new(0));
    let slot = Arc::new(LatestSlot::new());
    let start = Arc::new(Barrier::new(3));
    let done = Arc::new(AtomicBool::new(false));

    // Keeps load guards on the pending value while the consumer swaps it out
    let watcher = {
        let slot = slot.clone();
        let start = start.clone();
        let done = done.clone();
        thread::spawn(move || {
            start.wait();
            let mut checks = 0u64;
            while !done.load(Ordering::Acquire) {
                std::hint::black_box(slot.is_empty());
                checks += 1;
            }
            checks
        })
    };

    let producer = {
        let slot = slot.clone();
        let live = live.clone();
        let start = start.clone();
        thread::spawn(move || {
            start.wait();
            for seq in 0..PUBLISHES {
                slot.publish(Tracked::new(0, seq, &live));
            }
        })
    };

    start.wait();
    let mut last = None::<usize>;
    let mut taken = 0u64;
    while !producer.is_finished() || !slot.is_empty() {
        if let Some(stamped) = slot.consume_latest() {
            let value = stamped.into_inner();
            if let Some(prev) = last {
                assert!(value.seq > prev);
            }
            last = Some(value.seq);
            taken += 1;
        }
    }
    producer.join().unwrap();
    if let Some(stamped) = slot.consume_latest() {
        last = Some(stamped.value.seq);
        taken += 1;
    }
    done.store(true, Ordering::Release);
    watcher.join().unwrap();

    let stats = slot.stats();
    assert_eq!(last, Some(PUBLISHES - 1));
    assert_eq!(stats.consumed, taken);
    assert_eq!(stats.published, PUBLISHES as u64);
    assert_eq!(stats.consumed + stats.overwritten, PUBLISHES as u64);
    assert_eq!(live.load(Ordering::SeqCst), 0);
}
