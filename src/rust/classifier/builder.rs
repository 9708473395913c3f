use std::path::Path;

use log::{info, warn};

use super::classifier::Classifier;
use super::error::ClassifierError;
use super::model::{ImageModel, OnnxModel};
use super::preprocess::Preprocessor;
use crate::metadata::Metadata;
use crate::runtime::RuntimeConfig;

/// A builder for constructing a Classifier with a fluent interface.
#[derive(Default, Debug)]
pub struct ClassifierBuilder {
    model: Option<Box<dyn ImageModel>>,
    metadata: Option<Metadata>,
    runtime_config: RuntimeConfig,
    allow_label_mismatch: bool,
}

impl ClassifierBuilder {
    /// Creates a new empty ClassifierBuilder instance with default configuration
    ///
    /// # Example
    /// ```
    /// use glimpse::ClassifierBuilder;
    ///
    /// let builder = ClassifierBuilder::new();
    /// ```
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the runtime configuration for ONNX model execution.
    ///
    /// Only affects models loaded after this call.
    pub fn with_runtime_config(mut self, config: RuntimeConfig) -> Self {
        self.runtime_config = config;
        self
    }

    /// Loads the model from an `.onnx` file
    ///
    /// # Returns
    /// * `Result<Self, ClassifierError>` - The builder instance if successful, or an error if:
    ///   - A model is already set
    ///   - The file does not exist
    ///   - The model failed to load or has an unusable structure
    pub fn with_model_path(mut self, model_path: impl AsRef<Path>) -> Result<Self, ClassifierError> {
        self.ensure_no_model()?;
        let model = OnnxModel::from_file(model_path, &self.runtime_config)?;
        self.model = Some(Box::new(model));
        Ok(self)
    }

    /// Loads the model from the bytes of an `.onnx` file
    pub fn with_model_bytes(mut self, bytes: &[u8]) -> Result<Self, ClassifierError> {
        self.ensure_no_model()?;
        if bytes.is_empty() {
            return Err(ClassifierError::ModelLoad("Model bytes cannot be empty".to_string()));
        }
        let model = OnnxModel::from_bytes(bytes, &self.runtime_config)?;
        self.model = Some(Box::new(model));
        Ok(self)
    }

    /// Uses any [`ImageModel`] implementation as the backend
    pub fn with_image_model(mut self, model: impl ImageModel + 'static) -> Result<Self, ClassifierError> {
        self.ensure_no_model()?;
        self.model = Some(Box::new(model));
        Ok(self)
    }

    /// Sets the metadata describing the model's labels and input
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Accepts label lists whose length differs from the model's output width.
    ///
    /// Predictions then only cover the first `min(labels, outputs)` classes. Off by
    /// default: a mismatch fails `build` with `MetadataMismatch`.
    pub fn allow_label_mismatch(mut self, allow: bool) -> Self {
        self.allow_label_mismatch = allow;
        self
    }

    /// Builds and returns the final Classifier instance
    ///
    /// # Returns
    /// * `Result<Classifier, ClassifierError>` - The constructed Classifier if successful, or an error if:
    ///   - No model is set
    ///   - No metadata is set
    ///   - The label count differs from the model's output width and mismatches are not allowed
    ///   - The model declares a fixed input size or channel count the metadata does not produce
    pub fn build(self) -> Result<Classifier, ClassifierError> {
        let model = self
            .model
            .ok_or_else(|| ClassifierError::Build("A model must be set".to_string()))?;
        let metadata = self
            .metadata
            .ok_or_else(|| ClassifierError::Build("Metadata must be set".to_string()))?;

        let labels = metadata.labels.len();
        let classes = model.output_width();
        if labels != classes {
            if !self.allow_label_mismatch {
                return Err(ClassifierError::MetadataMismatch { labels, classes });
            }
            warn!(
                "Metadata has {} labels but the model has {} outputs; reporting only the first {}",
                labels,
                classes,
                labels.min(classes)
            );
        }

        let preprocessor = Preprocessor::new(metadata.image_size, metadata.grayscale, model.input_layout());
        if let Some(declared) = model.input_dimensions() {
            let produced = preprocessor.tensor_shape();
            if !accepts_shape(declared, &produced) {
                return Err(ClassifierError::InputMismatch {
                    declared: declared.to_vec(),
                    produced,
                });
            }
        }
        info!(
            "Classifier '{}' ready: {} classes, {}x{} input{}",
            metadata.model_name,
            labels.min(classes),
            metadata.image_size,
            metadata.image_size,
            if metadata.grayscale { " (grayscale)" } else { "" }
        );

        let class_count = labels.min(classes);
        Ok(Classifier::from_parts(model, metadata, preprocessor, class_count))
    }

    fn ensure_no_model(&self) -> Result<(), ClassifierError> {
        if self.model.is_some() {
            return Err(ClassifierError::Build("Model already set".to_string()));
        }
        Ok(())
    }
}

/// True when every fixed dimension in `declared` equals the matching one in `produced`.
fn accepts_shape(declared: &[i64], produced: &[usize; 4]) -> bool {
    declared.len() == produced.len()
        && declared
            .iter()
            .zip(produced.iter())
            .all(|(&want, &have)| want <= 0 || want as usize == have)
}
