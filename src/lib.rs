pub mod capture;
pub mod display;
pub mod error;
pub mod pipeline;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use capture::frame::PixelFormat;
use serde::{Deserialize, Serialize};

pub use capture::Frame;
pub use error::{Error, Result};
pub use pipeline::{ConsumerAdapter, LatestFrameSlot, ProducerAdapter};

/// Global configuration that can be atomically swapped at runtime
pub static CONFIG: once_cell::sync::Lazy<ArcSwap<Config>> =
    once_cell::sync::Lazy::new(|| ArcSwap::from_pointee(Config::default()));

/// Environment variables override file values, e.g. `FRAMELATCH__CAPTURE__FPS=60`
pub const ENV_PREFIX: &str = "FRAMELATCH";

/// System configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub capture: CaptureConfig,
    pub display: DisplayConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureSource {
    TestPattern,
    V4l2,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureConfig {
    pub source: CaptureSource,
    /// Device node; auto-detected when unset
    pub device: Option<String>,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub format: PixelFormat,
    pub buffer_count: u32,
    /// Stop capturing after this many frames
    pub frame_limit: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayBackend {
    Headless,
    Sdl,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayConfig {
    pub backend: DisplayBackend,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedrawMode {
    /// Redraw only after a publish requested it
    Invalidation,
    /// Redraw at `cadence_fps` whether or not anything was published
    Cadence,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub redraw: RedrawMode,
    pub cadence_fps: u32,
    pub poll_interval_ms: u64,
}

impl PipelineConfig {
    pub fn cadence_period(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / self.cadence_fps.max(1) as u64)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capture: CaptureConfig {
                source: CaptureSource::TestPattern,
                device: None,
                width: 640,
                height: 480,
                fps: 30,
                format: PixelFormat::Rgb24,
                buffer_count: 4,
                frame_limit: None,
            },
            display: DisplayConfig {
                backend: DisplayBackend::Headless,
                width: 640,
                height: 480,
            },
            pipeline: PipelineConfig {
                redraw: RedrawMode::Invalidation,
                cadence_fps: 60,
                poll_interval_ms: 50,
            },
        }
    }
}

impl Config {
    /// Layer defaults, an optional TOML file, then `FRAMELATCH__*` variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Config::default())?);

        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(true),
            );
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Snapshot of the active global configuration
    pub fn current() -> Arc<Config> {
        CONFIG.load_full()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_defaults_without_file() {
        let config = Config::load(None).unwrap();
        assert_eq!(config.capture.source, CaptureSource::TestPattern);
        assert_eq!(config.pipeline.redraw, RedrawMode::Invalidation);
        assert_eq!(config.capture.frame_limit, None);
    }

    #[test]
    fn test_load_toml_overrides() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[capture]
width = 320
height = 240
format = "yuyv4"
frame_limit = 10

[pipeline]
redraw = "cadence"
"#
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.capture.width, 320);
        assert_eq!(config.capture.format, PixelFormat::Yuyv4);
        assert_eq!(config.capture.frame_limit, Some(10));
        assert_eq!(config.pipeline.redraw, RedrawMode::Cadence);
        // Untouched keys keep their defaults
        assert_eq!(config.capture.fps, 30);
        assert_eq!(config.display.backend, DisplayBackend::Headless);
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = Config::load(Some(Path::new("/nonexistent/framelatch.toml"))).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_cadence_period() {
        let pipeline = PipelineConfig {
            redraw: RedrawMode::Cadence,
            cadence_fps: 50,
            poll_interval_ms: 0,
        };
        assert_eq!(pipeline.cadence_period(), Duration::from_millis(20));
        assert_eq!(pipeline.poll_interval(), Duration::from_millis(1));
    }

    #[test]
    fn test_current_sees_stored_config() {
        let mut config = Config::default();
        config.pipeline.cadence_fps = 24;
        CONFIG.store(Arc::new(config.clone()));

        assert_eq!(*Config::current(), config);
        CONFIG.store(Arc::new(Config::default()));
    }
}
