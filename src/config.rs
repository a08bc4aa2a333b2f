//! Configuration for the capture binaries.
//!
//! Settings come from an optional JSON config file (`SCOPECAM_CONFIG` or a
//! CLI flag), with environment-variable overrides on top, then validation.

use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;

use crate::decode::CaptureMode;

const DEFAULT_MODE: CaptureMode = CaptureMode::Rgb24;
const DEFAULT_WIDTH: u32 = 1280;
const DEFAULT_HEIGHT: u32 = 960;
const DEFAULT_FPS: u32 = 30;
const DEFAULT_EXPOSURE_US: i32 = 0;
const DEFAULT_EXPOSURE_GAIN: i32 = 100;

#[derive(Debug, Deserialize, Default)]
struct StreamConfigFile {
    capture: Option<CaptureConfigFile>,
    controls: Option<ControlsConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CaptureConfigFile {
    mode: Option<CaptureMode>,
    width: Option<u32>,
    height: Option<u32>,
    fps: Option<u32>,
    frames: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct ControlsConfigFile {
    auto_exposure: Option<bool>,
    exposure_us: Option<i32>,
    exposure_gain: Option<i32>,
    hflip: Option<bool>,
    vflip: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub mode: CaptureMode,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Stop after this many frames; `None` streams until interrupted.
    pub frame_limit: Option<u64>,
    pub controls: ControlSettings,
}

#[derive(Debug, Clone)]
pub struct ControlSettings {
    pub auto_exposure: bool,
    pub exposure_us: i32,
    pub exposure_gain: i32,
    pub hflip: bool,
    pub vflip: bool,
}

impl StreamConfig {
    /// Load from `SCOPECAM_CONFIG` (if set) plus environment overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load with an explicit config path taking precedence over the env var.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var("SCOPECAM_CONFIG").ok();
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => match env_path.as_deref() {
                Some(path) => Some(read_config_file(Path::new(path))?),
                None => None,
            },
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: StreamConfigFile) -> Self {
        let capture = file.capture.unwrap_or_default();
        let controls = file.controls.unwrap_or_default();
        Self {
            mode: capture.mode.unwrap_or(DEFAULT_MODE),
            width: capture.width.unwrap_or(DEFAULT_WIDTH),
            height: capture.height.unwrap_or(DEFAULT_HEIGHT),
            fps: capture.fps.unwrap_or(DEFAULT_FPS),
            frame_limit: capture.frames,
            controls: ControlSettings {
                auto_exposure: controls.auto_exposure.unwrap_or(true),
                exposure_us: controls.exposure_us.unwrap_or(DEFAULT_EXPOSURE_US),
                exposure_gain: controls.exposure_gain.unwrap_or(DEFAULT_EXPOSURE_GAIN),
                hflip: controls.hflip.unwrap_or(false),
                vflip: controls.vflip.unwrap_or(false),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(mode) = std::env::var("SCOPECAM_MODE") {
            if !mode.trim().is_empty() {
                self.mode = mode.parse().map_err(|e| anyhow!("SCOPECAM_MODE: {e}"))?;
            }
        }
        if let Ok(fps) = std::env::var("SCOPECAM_FPS") {
            self.fps = fps
                .parse()
                .map_err(|_| anyhow!("SCOPECAM_FPS must be an integer"))?;
        }
        if let Ok(frames) = std::env::var("SCOPECAM_FRAMES") {
            let frames: u64 = frames
                .parse()
                .map_err(|_| anyhow!("SCOPECAM_FRAMES must be an integer"))?;
            self.frame_limit = Some(frames);
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.fps == 0 {
            return Err(anyhow!("fps must be >= 1"));
        }
        if self.width == 0 || self.height == 0 {
            return Err(anyhow!("frame geometry must be non-zero"));
        }
        if self.frame_limit == Some(0) {
            return Err(anyhow!("frame limit must be >= 1 when set"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<StreamConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
