//! framelatch: camera feed to display through a latest-frame slot

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use color_eyre::{eyre::eyre, Result};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use framelatch::capture::TestPatternSource;
use framelatch::display::HeadlessRenderer;
use framelatch::pipeline::{
    ConsumerAdapter, LatestFrameSlot, ProducerAdapter, RedrawDriver, RedrawNotifier,
    RedrawTrigger, Renderer,
};
use framelatch::{CaptureSource, Config, DisplayBackend, RedrawMode};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("framelatch=debug")),
        )
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    info!("framelatch launching...");

    // Load configuration
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    framelatch::CONFIG.store(Arc::new(Config::load(config_path.as_deref())?));
    let config = Config::current();
    info!(?config, "Configuration loaded");

    let slot = Arc::new(LatestFrameSlot::new());
    let (notifier, redraws) = RedrawNotifier::channel();
    let producer = Arc::new(ProducerAdapter::new(slot.clone()).with_notifier(notifier));

    let stop = Arc::new(AtomicBool::new(false));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Start capture
    let capture_handle = match config.capture.source {
        CaptureSource::TestPattern => {
            let mut source = TestPatternSource::new(
                config.capture.width,
                config.capture.height,
                config.capture.fps,
            );
            source.frame_limit = config.capture.frame_limit;
            let task = source.spawn(producer.clone(), shutdown_rx);
            tokio::spawn(async move {
                match task.await {
                    Ok(delivered) => info!(delivered, "Capture finished"),
                    Err(e) => warn!("Capture task failed: {}", e),
                }
            })
        }
        CaptureSource::V4l2 => spawn_v4l2(&config, producer.clone(), stop.clone())?,
    };
    drop(producer);

    // Stop redrawing once capture ends or on Ctrl-C
    {
        let stop = stop.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = capture_handle => {}
                _ = tokio::signal::ctrl_c() => info!("Ctrl-C received"),
            }
            stop.store(true, Ordering::Release);
            let _ = shutdown_tx.send(true);
        });
    }

    let trigger = match config.pipeline.redraw {
        RedrawMode::Invalidation => RedrawTrigger::Invalidation(redraws),
        RedrawMode::Cadence => RedrawTrigger::Cadence(config.pipeline.cadence_period()),
    };

    let renderer = make_renderer(&config, stop.clone())?;
    let mut driver = RedrawDriver::new(ConsumerAdapter::new(slot.clone(), renderer), trigger)
        .with_poll_interval(config.pipeline.poll_interval());

    // Display must stay on the main thread
    let report = driver.run(&stop);
    let consumer = driver.consumer().stats();

    info!(?report, ?consumer, slot = ?slot.stats(), "framelatch shutting down");
    Ok(())
}

#[cfg_attr(not(feature = "sdl-display"), allow(unused_variables))]
fn make_renderer(config: &Config, quit: Arc<AtomicBool>) -> Result<Box<dyn Renderer>> {
    match config.display.backend {
        DisplayBackend::Headless => Ok(Box::new(HeadlessRenderer::new())),
        #[cfg(feature = "sdl-display")]
        DisplayBackend::Sdl => {
            let renderer = framelatch::display::Sdl2Renderer::new(
                config.display.width,
                config.display.height,
                quit,
            )?;
            Ok(Box::new(renderer))
        }
        #[cfg(not(feature = "sdl-display"))]
        DisplayBackend::Sdl => Err(eyre!("built without the sdl-display feature")),
    }
}

#[cfg(feature = "v4l2")]
fn spawn_v4l2(
    config: &Config,
    producer: Arc<ProducerAdapter>,
    stop: Arc<AtomicBool>,
) -> Result<tokio::task::JoinHandle<()>> {
    let capture = framelatch::capture::V4l2Capture::open(&config.capture)?;
    Ok(tokio::task::spawn_blocking(move || {
        match capture.run(&producer, &stop) {
            Ok(delivered) => info!(delivered, "Capture finished"),
            Err(e) => warn!("Capture error: {}", e),
        }
    }))
}

#[cfg(not(feature = "v4l2"))]
fn spawn_v4l2(
    _config: &Config,
    _producer: Arc<ProducerAdapter>,
    _stop: Arc<AtomicBool>,
) -> Result<tokio::task::JoinHandle<()>> {
    Err(eyre!("built without the v4l2 feature"))
}
