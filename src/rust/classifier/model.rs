use std::collections::HashMap;
use std::fmt::Debug;
use std::path::Path;

use log::{debug, info};
use ndarray::Array4;
use ort::session::Session;
use ort::value::{Tensor, ValueType};

use super::error::ClassifierError;
use super::preprocess::TensorLayout;
use crate::runtime::{create_session_builder, RuntimeConfig};

/// The forward pass of a pretrained image classifier.
///
/// The classifier facade only needs three things from a model: how wide its output
/// vector is, how it wants its input laid out, and a way to turn one input tensor into
/// one output vector. Any backend that can do that plugs in here.
pub trait ImageModel: Send + Sync + Debug {
    /// Number of values in one output vector (one per class).
    fn output_width(&self) -> usize;

    /// Memory order the model expects for its input tensor.
    fn input_layout(&self) -> TensorLayout {
        TensorLayout::Nhwc
    }

    /// Input shape as declared by the model, if known. Negative entries are dynamic.
    fn input_dimensions(&self) -> Option<&[i64]> {
        None
    }

    /// Runs one batch-of-one input through the model and copies the outputs out.
    fn forward(&self, input: &Array4<f32>) -> Result<Vec<f32>, ClassifierError>;
}

/// An image classifier running on ONNX Runtime.
///
/// The model is expected to:
/// - Accept one `f32` input of shape `[1, H, W, C]` or `[1, C, H, W]`
/// - Produce one `f32` output whose last dimension is the number of classes
#[derive(Debug)]
pub struct OnnxModel {
    session: Session,
    input_name: String,
    input_dimensions: Vec<i64>,
    output_width: usize,
    layout: TensorLayout,
}

impl OnnxModel {
    /// Loads a model from an `.onnx` file.
    pub fn from_file(path: impl AsRef<Path>, config: &RuntimeConfig) -> Result<Self, ClassifierError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ClassifierError::ModelLoad(format!(
                "Model file not found: {}",
                path.display()
            )));
        }
        let session = create_session_builder(config)?
            .commit_from_file(path)
            .map_err(|e| ClassifierError::ModelLoad(format!("{}: {}", path.display(), e)))?;
        info!("Loaded ONNX model from {}", path.display());
        Self::from_session(session)
    }

    /// Loads a model from the bytes of an `.onnx` file.
    pub fn from_bytes(bytes: &[u8], config: &RuntimeConfig) -> Result<Self, ClassifierError> {
        let session = create_session_builder(config)?
            .commit_from_memory(bytes)
            .map_err(|e| ClassifierError::ModelLoad(e.to_string()))?;
        info!("Loaded ONNX model from {} bytes", bytes.len());
        Self::from_session(session)
    }

    fn from_session(session: Session) -> Result<Self, ClassifierError> {
        let (input_name, input_dimensions, layout) = Self::validate_input(&session)?;
        let output_width = Self::validate_output(&session)?;
        debug!(
            "Model input '{}' ({:?}), {} output classes",
            input_name, layout, output_width
        );

        Ok(Self {
            session,
            input_name,
            input_dimensions,
            output_width,
            layout,
        })
    }

    /// Checks the model has one image-shaped input and works out its layout.
    fn validate_input(session: &Session) -> Result<(String, Vec<i64>, TensorLayout), ClassifierError> {
        let input = session.inputs.first().ok_or_else(|| {
            ClassifierError::ModelLoad("Model must have at least 1 input for the image".to_string())
        })?;

        let (dimensions, layout) = match &input.input_type {
            ValueType::Tensor { dimensions, .. } if dimensions.len() == 4 => {
                (dimensions.clone(), layout_from_dimensions(dimensions))
            }
            ValueType::Tensor { dimensions, .. } => {
                return Err(ClassifierError::ModelLoad(format!(
                    "Model input '{}' must be 4-dimensional, found {} dimensions",
                    input.name,
                    dimensions.len()
                )))
            }
            other => {
                return Err(ClassifierError::ModelLoad(format!(
                    "Model input '{}' must be a tensor, found {:?}",
                    input.name, other
                )))
            }
        };

        Ok((input.name.clone(), dimensions, layout))
    }

    /// Reads the class count from the declared shape of the first output.
    fn validate_output(session: &Session) -> Result<usize, ClassifierError> {
        let output = session.outputs.first().ok_or_else(|| {
            ClassifierError::ModelLoad("Model must have at least 1 output for class scores".to_string())
        })?;

        match &output.output_type {
            ValueType::Tensor { dimensions, .. } => match output_width_from_dimensions(dimensions) {
                Some(width) => Ok(width),
                None => Err(ClassifierError::ModelLoad(format!(
                    "Model output '{}' does not declare a fixed class dimension: {:?}",
                    output.name, dimensions
                ))),
            },
            other => Err(ClassifierError::ModelLoad(format!(
                "Model output '{}' must be a tensor, found {:?}",
                output.name, other
            ))),
        }
    }
}

/// Channels-first when dimension 1 looks like a channel count and dimension 3 does not.
fn layout_from_dimensions(dimensions: &[i64]) -> TensorLayout {
    let is_channels = |d: i64| d == 1 || d == 3;
    if is_channels(dimensions[1]) && !is_channels(dimensions[3]) {
        TensorLayout::Nchw
    } else {
        TensorLayout::Nhwc
    }
}

/// Number of values per batch entry: the product of every dimension after the batch one.
///
/// `[1, N]` and `[1, N, 1, 1]` both give `N`. A rank-1 output is taken as unbatched. Any
/// dynamic or zero dimension past the batch gives `None`.
fn output_width_from_dimensions(dimensions: &[i64]) -> Option<usize> {
    let per_entry = match dimensions {
        [] => return None,
        [width] => std::slice::from_ref(width),
        [_, rest @ ..] => rest,
    };
    per_entry.iter().try_fold(1usize, |width, &d| {
        if d > 0 {
            width.checked_mul(d as usize)
        } else {
            None
        }
    })
}

impl ImageModel for OnnxModel {
    fn output_width(&self) -> usize {
        self.output_width
    }

    fn input_layout(&self) -> TensorLayout {
        self.layout
    }

    fn input_dimensions(&self) -> Option<&[i64]> {
        Some(&self.input_dimensions)
    }

    fn forward(&self, input: &Array4<f32>) -> Result<Vec<f32>, ClassifierError> {
        let input_dyn = input.view().into_dyn();
        let input_array = input_dyn.as_standard_layout();

        let mut input_tensors = HashMap::new();
        input_tensors.insert(
            self.input_name.as_str(),
            Tensor::from_array(&input_array)
                .map_err(|e| ClassifierError::Prediction(format!("Failed to create input tensor: {}", e)))?,
        );

        let outputs = self
            .session
            .run(input_tensors)
            .map_err(|e| ClassifierError::Prediction(format!("Failed to run model: {}", e)))?;
        let output_tensor = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ClassifierError::Prediction(format!("Failed to extract output tensor: {}", e)))?;

        Ok(output_tensor.iter().copied().collect())
    }
}
