use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::control::LoopSettings;
use crate::filter::CategorySet;
use crate::ingest::{device_path_for_index, CameraConfig};
use crate::labels;
use crate::signal::SerialConfig;

const DEFAULT_CONFIDENCE: f32 = 0.3;
const DEFAULT_CAMERA_INDEX: u32 = 0;
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const DEFAULT_CAMERA_FPS: u32 = 30;
const DEFAULT_SCENE_PERIOD: u64 = 30;
const DEFAULT_SERIAL_PORT: &str = "/dev/ttyUSB0";
const DEFAULT_SERIAL_BAUD: u32 = 115_200;
const DEFAULT_WRITE_TIMEOUT_MS: u64 = 100;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct TriggerConfigFile {
    model: Option<ModelConfigFile>,
    confidence: Option<f32>,
    camera: Option<CameraConfigFile>,
    serial: Option<SerialConfigFile>,
    categories: Option<Vec<String>>,
    prefetch: Option<bool>,
    max_frames: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ModelConfigFile {
    weights: Option<String>,
    config: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CameraConfigFile {
    index: Option<u32>,
    device: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    target_fps: Option<u32>,
    frame_limit: Option<u64>,
    scene_period: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SerialConfigFile {
    port: Option<String>,
    baud_rate: Option<u32>,
    write_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct TriggerConfig {
    pub model: ModelSettings,
    /// Inclusive detection confidence threshold.
    pub confidence: f32,
    pub camera: CameraSettings,
    pub serial: SerialConfig,
    /// Categories of interest, as label names or numeric ids.
    pub categories: Vec<String>,
    pub prefetch: bool,
    pub max_frames: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ModelSettings {
    /// ONNX weights path, or `stub://<class>`.
    pub weights: String,
    /// Model description (topology/config) file.
    pub description: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub index: u32,
    /// Explicit device path; overrides `index`.
    pub device: Option<String>,
    pub width: u32,
    pub height: u32,
    pub target_fps: u32,
    pub frame_limit: Option<u64>,
    pub scene_period: u64,
}

impl CameraSettings {
    /// Select capture device `/dev/video<index>`, dropping any explicit path.
    pub fn select_index(&mut self, index: u32) {
        self.index = index;
        self.device = None;
    }

    pub fn device_path(&self) -> String {
        self.device
            .clone()
            .unwrap_or_else(|| device_path_for_index(self.index))
    }

    pub fn to_camera_config(&self) -> CameraConfig {
        CameraConfig {
            device: self.device_path(),
            width: self.width,
            height: self.height,
            target_fps: self.target_fps,
            frame_limit: self.frame_limit,
            scene_period: self.scene_period,
        }
    }
}

impl TriggerConfig {
    /// Load from `TRIGGER_CONFIG` (if set), apply environment overrides and
    /// validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("TRIGGER_CONFIG").ok().map(PathBuf::from);
        let mut cfg = Self::from_sources(config_path.as_deref())?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// File (if any) plus environment overrides, not yet validated.
    ///
    /// Callers layering further overrides on top must call `validate` after.
    pub fn from_sources(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => TriggerConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        Ok(cfg)
    }

    fn from_file(file: TriggerConfigFile) -> Self {
        let model_file = file.model.unwrap_or_default();
        let camera_file = file.camera.unwrap_or_default();
        let serial_file = file.serial.unwrap_or_default();

        let model = ModelSettings {
            weights: model_file.weights.unwrap_or_default(),
            description: model_file.config,
        };
        let camera = CameraSettings {
            index: camera_file.index.unwrap_or(DEFAULT_CAMERA_INDEX),
            device: camera_file.device,
            width: camera_file.width.unwrap_or(DEFAULT_CAMERA_WIDTH),
            height: camera_file.height.unwrap_or(DEFAULT_CAMERA_HEIGHT),
            target_fps: camera_file.target_fps.unwrap_or(DEFAULT_CAMERA_FPS),
            frame_limit: camera_file.frame_limit,
            scene_period: camera_file.scene_period.unwrap_or(DEFAULT_SCENE_PERIOD),
        };
        let serial = SerialConfig {
            port: serial_file
                .port
                .unwrap_or_else(|| DEFAULT_SERIAL_PORT.to_string()),
            baud_rate: serial_file.baud_rate.unwrap_or(DEFAULT_SERIAL_BAUD),
            write_timeout: Duration::from_millis(
                serial_file
                    .write_timeout_ms
                    .unwrap_or(DEFAULT_WRITE_TIMEOUT_MS),
            ),
        };
        let categories = file.categories.unwrap_or_else(|| {
            labels::DEFAULT_CATEGORIES
                .iter()
                .map(|&id| labels::display_label(id))
                .collect()
        });

        Self {
            model,
            confidence: file.confidence.unwrap_or(DEFAULT_CONFIDENCE),
            camera,
            serial,
            categories,
            prefetch: file.prefetch.unwrap_or(false),
            max_frames: file.max_frames,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(weights) = env_nonempty("TRIGGER_MODEL_WEIGHTS") {
            self.model.weights = weights;
        }
        if let Some(path) = env_nonempty("TRIGGER_MODEL_CONFIG") {
            self.model.description = Some(PathBuf::from(path));
        }
        if let Some(confidence) = env_nonempty("TRIGGER_CONFIDENCE") {
            self.confidence = confidence
                .parse()
                .map_err(|_| anyhow!("TRIGGER_CONFIDENCE must be a number between 0 and 1"))?;
        }
        if let Some(index) = env_nonempty("TRIGGER_CAMERA_INDEX") {
            self.camera.index = index
                .parse()
                .map_err(|_| anyhow!("TRIGGER_CAMERA_INDEX must be a non-negative integer"))?;
        }
        if let Some(device) = env_nonempty("TRIGGER_CAMERA_DEVICE") {
            self.camera.device = Some(device);
        }
        if let Some(port) = env_nonempty("TRIGGER_SERIAL_PORT") {
            self.serial.port = port;
        }
        if let Some(baud) = env_nonempty("TRIGGER_SERIAL_BAUD") {
            self.serial.baud_rate = baud
                .parse()
                .map_err(|_| anyhow!("TRIGGER_SERIAL_BAUD must be an integer baud rate"))?;
        }
        if let Some(categories) = env_nonempty("TRIGGER_CATEGORIES") {
            let parsed = split_csv(&categories);
            if !parsed.is_empty() {
                self.categories = parsed;
            }
        }
        Ok(())
    }

    pub fn validate(&mut self) -> Result<()> {
        self.model.weights = self.model.weights.trim().to_string();
        if self.model.weights.is_empty() {
            return Err(anyhow!("model weights path is required"));
        }
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(anyhow!(
                "confidence threshold must be between 0 and 1, got {}",
                self.confidence
            ));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera width and height must be greater than zero"));
        }
        if self.serial.port.trim().is_empty() {
            return Err(anyhow!("serial port path is required"));
        }
        if self.serial.baud_rate == 0 {
            return Err(anyhow!("serial baud rate must be greater than zero"));
        }
        if self.serial.write_timeout.is_zero() {
            return Err(anyhow!("serial write timeout must be greater than zero"));
        }
        if self.max_frames == Some(0) {
            return Err(anyhow!("max_frames must be at least 1 when set"));
        }
        self.category_set()?;
        Ok(())
    }

    pub fn category_set(&self) -> Result<CategorySet> {
        CategorySet::from_entries(&self.categories)
    }

    pub fn loop_settings(&self) -> Result<LoopSettings> {
        Ok(LoopSettings {
            categories: self.category_set()?,
            threshold: self.confidence,
            max_frames: self.max_frames,
            ..LoopSettings::default()
        })
    }
}

fn read_config_file(path: &Path) -> Result<TriggerConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

pub fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}
