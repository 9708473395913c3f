use ort::Error as OrtError;

use crate::model_manager::ModelError;

/// Represents the different types of errors that can occur in the image classifier.
#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    /// The metadata argument was not a location nor an object with a `labels` array
    #[error("Invalid metadata: {0}")]
    InvalidMetadata(String),
    /// Network, I/O or parse failure while fetching a metadata document
    #[error("Metadata fetch error: {0}")]
    MetadataFetch(String),
    /// The ONNX runtime failed to load the model definition or weights
    #[error("Model load error: {0}")]
    ModelLoad(String),
    /// The label list does not line up with the model's output width
    #[error("Metadata mismatch: {labels} labels for a model with {classes} output classes")]
    MetadataMismatch { labels: usize, classes: usize },
    /// The crop size or channel count from metadata does not fit the model's declared input
    #[error("Input mismatch: model declares input {declared:?} but metadata produces {produced:?}")]
    InputMismatch { declared: Vec<i64>, produced: [usize; 4] },
    /// Error occurred while running the forward pass or reading its output
    #[error("Prediction error: {0}")]
    Prediction(String),
    /// Error occurred due to invalid input parameters
    #[error("Validation error: {0}")]
    Validation(String),
    /// Error occurred during the build phase
    #[error("Build error: {0}")]
    Build(String),
}

impl From<OrtError> for ClassifierError {
    fn from(err: OrtError) -> Self {
        ClassifierError::ModelLoad(err.to_string())
    }
}

impl From<ModelError> for ClassifierError {
    fn from(err: ModelError) -> Self {
        ClassifierError::ModelLoad(err.to_string())
    }
}
