#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use image::RgbImage;
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::model::{InputType, ModelDescription, OutputLayout, TensorLayout};
use crate::detect::result::Detection;
use crate::detect::ssd::{decode_detection_output, decode_tf_outputs};
use crate::frame::{rgb_len, Frame};

/// Tract-based backend for ONNX object detectors.
///
/// Loads a local model file, resizes each frame to the model input and
/// decodes SSD-style outputs. No network I/O, nothing written to disk.
pub struct TractBackend {
    model: TypedRunnableModel<TypedModel>,
    description: ModelDescription,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, description: ModelDescription) -> Result<Self> {
        let model_path = model_path.as_ref();
        let shape = description.input_shape();
        let datum = match description.input_type {
            InputType::F32 => f32::datum_type(),
            InputType::U8 => u8::datum_type(),
        };
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(datum, tvec!(shape[0], shape[1], shape[2], shape[3])),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self { model, description })
    }

    fn resize(&self, frame: &Frame) -> Result<RgbImage> {
        let image = RgbImage::from_raw(frame.width, frame.height, frame.pixels().to_vec())
            .ok_or_else(|| {
                anyhow!("frame buffer does not match {}x{}", frame.width, frame.height)
            })?;
        let (w, h) = (self.description.input_width, self.description.input_height);
        if image.width() == w && image.height() == h {
            return Ok(image);
        }
        Ok(imageops::resize(&image, w, h, FilterType::Triangle))
    }

    fn build_input(&self, frame: &Frame) -> Result<Tensor> {
        let image = self.resize(frame)?;
        let d = &self.description;
        let pixel = |y: usize, x: usize, channel: usize| {
            image.get_pixel(x as u32, y as u32).0[d.source_channel(channel)]
        };
        let shape = d.input_shape();
        let shape = (shape[0], shape[1], shape[2], shape[3]);

        let tensor = match (d.input_type, d.layout) {
            (InputType::F32, TensorLayout::Nchw) => {
                tract_ndarray::Array4::from_shape_fn(shape, |(_, c, y, x)| {
                    d.normalize(c, pixel(y, x, c))
                })
                .into_tensor()
            }
            (InputType::F32, TensorLayout::Nhwc) => {
                tract_ndarray::Array4::from_shape_fn(shape, |(_, y, x, c)| {
                    d.normalize(c, pixel(y, x, c))
                })
                .into_tensor()
            }
            (InputType::U8, TensorLayout::Nchw) => {
                tract_ndarray::Array4::from_shape_fn(shape, |(_, c, y, x)| pixel(y, x, c))
                    .into_tensor()
            }
            (InputType::U8, TensorLayout::Nhwc) => {
                tract_ndarray::Array4::from_shape_fn(shape, |(_, y, x, c)| pixel(y, x, c))
                    .into_tensor()
            }
        };
        Ok(tensor)
    }

    fn decode(&self, outputs: TVec<TValue>) -> Result<Vec<Detection>> {
        let max = self.description.max_detections;
        match self.description.output {
            OutputLayout::DetectionOutput => {
                let values = output_values(&outputs, 0)?;
                decode_detection_output(&values, max)
            }
            OutputLayout::TfObjectDetection => {
                let boxes = output_values(&outputs, 0)?;
                let classes = output_values(&outputs, 1)?;
                let scores = output_values(&outputs, 2)?;
                let count = output_values(&outputs, 3).ok().and_then(|v| v.first().copied());
                decode_tf_outputs(&boxes, &classes, &scores, count, max)
            }
        }
    }
}

fn output_values(outputs: &TVec<TValue>, index: usize) -> Result<Vec<f32>> {
    let output = outputs
        .get(index)
        .ok_or_else(|| anyhow!("model produced no output #{}", index))?;
    let output = output
        .cast_to::<f32>()
        .with_context(|| format!("model output #{} is not numeric", index))?;
    let view = output.to_array_view::<f32>()?;
    Ok(view.iter().copied().collect())
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let input = self.build_input(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode(outputs)
    }

    fn warm_up(&mut self) -> Result<()> {
        let (w, h) = (self.description.input_width, self.description.input_height);
        let blank = Frame::new(vec![0u8; rgb_len(w, h)?], w, h, 0)?;
        self.detect(&blank).map(|_| ())
    }
}
