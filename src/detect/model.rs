//! Model description file.
//!
//! ONNX weights carry their own graph, but not how frames must be prepared
//! for it or how its outputs are laid out. That lives in a small TOML file
//! next to the weights:
//!
//! ```toml
//! input_width = 300
//! input_height = 300
//! layout = "nhwc"
//! input_type = "u8"
//! output = "tf_object_detection"
//! ```
//!
//! Defaults match a 300x300 MobileNet-SSD fed raw 0..255 RGB values.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::frame::rgb_len;

use super::backend::MAX_DETECTIONS;

/// Largest accepted input width or height.
const MAX_INPUT_SIDE: u32 = 8192;

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TensorLayout {
    #[default]
    Nchw,
    Nhwc,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InputType {
    #[default]
    F32,
    U8,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutputLayout {
    /// Single `[1, 1, N, 7]` tensor.
    #[default]
    DetectionOutput,
    /// Outputs in order: boxes, classes, scores, num_detections.
    TfObjectDetection,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ModelDescription {
    pub input_width: u32,
    pub input_height: u32,
    pub layout: TensorLayout,
    pub input_type: InputType,
    /// Multiplier applied after mean subtraction (f32 inputs only).
    pub scale: f32,
    /// Per-channel mean in RGB order (f32 inputs only).
    pub mean: [f32; 3],
    /// Feed BGR instead of RGB.
    pub swap_rb: bool,
    pub output: OutputLayout,
    pub max_detections: usize,
}

impl Default for ModelDescription {
    fn default() -> Self {
        Self {
            input_width: 300,
            input_height: 300,
            layout: TensorLayout::Nchw,
            input_type: InputType::F32,
            scale: 1.0,
            mean: [0.0; 3],
            swap_rb: false,
            output: OutputLayout::DetectionOutput,
            max_detections: MAX_DETECTIONS,
        }
    }
}

impl ModelDescription {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read model description {}", path.display()))?;
        let description: Self = toml::from_str(&raw)
            .with_context(|| format!("invalid model description {}", path.display()))?;
        description.validate()
    }

    fn validate(mut self) -> Result<Self> {
        if self.input_width == 0 || self.input_height == 0 {
            return Err(anyhow!(
                "model input size must be non-zero, got {}x{}",
                self.input_width,
                self.input_height
            ));
        }
        if self.input_width > MAX_INPUT_SIDE || self.input_height > MAX_INPUT_SIDE {
            return Err(anyhow!(
                "model input size {}x{} exceeds {} pixels per side",
                self.input_width,
                self.input_height,
                MAX_INPUT_SIDE
            ));
        }
        rgb_len(self.input_width, self.input_height)?;
        if !self.scale.is_finite() || self.scale == 0.0 {
            return Err(anyhow!("model input scale must be finite and non-zero"));
        }
        if self.max_detections == 0 {
            return Err(anyhow!("max_detections must be at least 1"));
        }
        self.max_detections = self.max_detections.min(MAX_DETECTIONS);
        Ok(self)
    }

    /// Input tensor shape for this layout.
    pub fn input_shape(&self) -> [usize; 4] {
        let (w, h) = (self.input_width as usize, self.input_height as usize);
        match self.layout {
            TensorLayout::Nchw => [1, 3, h, w],
            TensorLayout::Nhwc => [1, h, w, 3],
        }
    }

    /// Channel value as fed to the network for one RGB byte.
    pub fn normalize(&self, channel: usize, value: u8) -> f32 {
        (value as f32 - self.mean[channel]) * self.scale
    }

    /// Source channel index for output channel `channel`.
    pub fn source_channel(&self, channel: usize) -> usize {
        if self.swap_rb {
            2 - channel
        } else {
            channel
        }
    }
}
