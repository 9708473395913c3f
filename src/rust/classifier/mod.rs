use serde::Serialize;

mod error;
mod classifier;
mod model;
pub mod builder;
pub mod preprocess;
pub mod scope;
mod source;
mod utils;

pub use error::ClassifierError;
pub use classifier::{dir_locations, Classifier, DEFAULT_MAX_PREDICTIONS};
pub use builder::ClassifierBuilder;
pub use model::{ImageModel, OnnxModel};
pub use source::{ImageSource, VideoFrame};

/// One class paired with the probability the model assigned to it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    pub class_name: String,
    pub probability: f32,
}

/// Information about the current state and configuration of a classifier
#[derive(Debug, Clone)]
pub struct ClassifierInfo {
    /// Model name from the metadata
    pub model_name: String,
    /// Number of classes predictions are reported for
    pub num_classes: usize,
    /// Labels of the classes
    pub class_labels: Vec<String>,
    /// Side length of the square crop fed to the model
    pub image_size: u32,
    /// Whether crops are collapsed to one luminance channel
    pub grayscale: bool,
    /// Shape of the input tensor, batch dimension included
    pub input_shape: [usize; 4],
}
