use std::path::{Path, PathBuf};

use log::{debug, info};

use super::error::ClassifierError;
use super::model::ImageModel;
use super::preprocess::Preprocessor;
use super::scope::{AllocationTracker, Scoped};
use super::source::ImageSource;
use super::utils::top_k;
use super::{ClassifierInfo, Prediction};
use crate::metadata::{is_remote, load_metadata, Metadata, MetadataSource};
use crate::model_manager::ModelManager;
use crate::runtime::RuntimeConfig;

/// Number of predictions [`Classifier::predict_top_k`] callers usually ask for.
pub const DEFAULT_MAX_PREDICTIONS: usize = 10;

const MODEL_FILE_NAME: &str = "model.onnx";
const METADATA_FILE_NAME: &str = "metadata.json";

/// A thread-safe image classifier pairing one pretrained model with its metadata.
///
/// # Thread Safety
///
/// Predictions take `&self` and allocate their own scratch buffers, so a classifier
/// can be shared across threads with `Arc`:
///
/// ```rust,no_run
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// use glimpse::{Classifier, ImageSource};
/// use std::sync::Arc;
///
/// let classifier = Arc::new(Classifier::load("model.onnx", "metadata.json").await?);
/// let image = image::open("cat.jpg")?;
///
/// let classifier_clone = Arc::clone(&classifier);
/// std::thread::spawn(move || {
///     classifier_clone.predict(&ImageSource::Image(&image), false).unwrap();
/// });
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Classifier {
    model: Box<dyn ImageModel>,
    metadata: Metadata,
    preprocessor: Preprocessor,
    tracker: AllocationTracker,
    class_count: usize,
}

// Compile-time verification of thread-safety
const _: () = {
    fn assert_send_sync<T: Send + Sync>() {}
    fn verify_thread_safety() {
        assert_send_sync::<Classifier>();
    }
};

impl Classifier {
    /// Creates a new ClassifierBuilder for fluent construction
    pub fn builder() -> super::builder::ClassifierBuilder {
        super::builder::ClassifierBuilder::new()
    }

    pub(crate) fn from_parts(
        model: Box<dyn ImageModel>,
        metadata: Metadata,
        preprocessor: Preprocessor,
        class_count: usize,
    ) -> Self {
        Self {
            model,
            metadata,
            preprocessor,
            tracker: AllocationTracker::new(),
            class_count,
        }
    }

    /// Loads a model and its metadata.
    ///
    /// # Arguments
    /// * `model_location` - Path to an `.onnx` file, or an `http(s)` URL that is downloaded
    ///   into the local model cache first
    /// * `metadata` - Anything convertible into a [`MetadataSource`]: a path, a URL, a JSON
    ///   value or resolved [`Metadata`]
    ///
    /// # Errors
    /// * `InvalidMetadata` / `MetadataFetch` from metadata resolution
    /// * `ModelLoad` if the model cannot be downloaded or loaded
    /// * `MetadataMismatch` if the labels do not match the model's output width
    pub async fn load(
        model_location: &str,
        metadata: impl Into<MetadataSource>,
    ) -> Result<Self, ClassifierError> {
        Self::load_with_config(model_location, metadata, RuntimeConfig::default()).await
    }

    /// Same as [`Classifier::load`], with explicit ONNX Runtime settings.
    pub async fn load_with_config(
        model_location: &str,
        metadata: impl Into<MetadataSource>,
        config: RuntimeConfig,
    ) -> Result<Self, ClassifierError> {
        let metadata = load_metadata(metadata).await?;
        let model_path = resolve_model_location(model_location).await?;

        Self::builder()
            .with_runtime_config(config)
            .with_model_path(&model_path)?
            .with_metadata(metadata)
            .build()
    }

    /// Loads `model.onnx` and `metadata.json` from the same directory or base URL.
    pub async fn load_from_dir(base: &str) -> Result<Self, ClassifierError> {
        let (model_location, metadata_location) = dir_locations(base);
        Self::load(&model_location, metadata_location).await
    }

    /// Width of the model's output vector.
    pub fn total_classes(&self) -> usize {
        self.model.output_width()
    }

    /// Labels in output order.
    pub fn class_labels(&self) -> &[String] {
        &self.metadata.labels
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Returns information about the classifier's current state
    pub fn info(&self) -> ClassifierInfo {
        ClassifierInfo {
            model_name: self.metadata.model_name.clone(),
            num_classes: self.class_count,
            class_labels: self.metadata.labels[..self.class_count].to_vec(),
            image_size: self.preprocessor.size(),
            grayscale: self.metadata.grayscale,
            input_shape: self.preprocessor.tensor_shape(),
        }
    }

    /// Number of prediction temporaries still alive. Zero whenever no prediction is running.
    pub fn live_intermediates(&self) -> usize {
        self.tracker.live()
    }

    /// Scores every class for the given image.
    ///
    /// # Arguments
    /// * `source` - The image to classify
    /// * `flipped` - Mirror the crop horizontally first, e.g. for a selfie camera
    ///
    /// # Returns
    /// One [`Prediction`] per label, in label order.
    ///
    /// # Example
    /// ```rust,no_run
    /// # use glimpse::{Classifier, ImageSource};
    /// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
    /// # let classifier = Classifier::load("model.onnx", "metadata.json").await?;
    /// let image = image::open("photo.jpg")?;
    /// for prediction in classifier.predict(&ImageSource::Image(&image), false)? {
    ///     println!("{}: {:.2}", prediction.class_name, prediction.probability);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub fn predict(
        &self,
        source: &ImageSource<'_>,
        flipped: bool,
    ) -> Result<Vec<Prediction>, ClassifierError> {
        let scores = self.infer(source, flipped)?;
        Ok(scores[..self.class_count]
            .iter()
            .enumerate()
            .map(|(index, &probability)| self.prediction(index, probability))
            .collect())
    }

    /// Scores the image and keeps the `max_predictions` most probable classes.
    ///
    /// Results are ordered by descending probability; equal probabilities keep label
    /// order. Asking for more predictions than there are classes returns every class.
    pub fn predict_top_k(
        &self,
        source: &ImageSource<'_>,
        max_predictions: usize,
        flipped: bool,
    ) -> Result<Vec<Prediction>, ClassifierError> {
        let scores = self.infer(source, flipped)?;
        Ok(top_k(&scores[..self.class_count], max_predictions)
            .into_iter()
            .map(|(index, probability)| self.prediction(index, probability))
            .collect())
    }

    /// Releases the model. The classifier cannot be used afterwards.
    pub fn dispose(self) {
        info!("Disposing classifier '{}'", self.metadata.model_name);
        drop(self);
    }

    /// Preprocesses the source and runs the forward pass. All temporaries are scoped to
    /// this call; the returned guard holds only the output values.
    fn infer(
        &self,
        source: &ImageSource<'_>,
        flipped: bool,
    ) -> Result<Scoped<Vec<f32>>, ClassifierError> {
        let input = self.preprocessor.process(source, flipped, &self.tracker)?;
        let output = self.tracker.track(self.model.forward(&input)?);

        if output.len() < self.class_count {
            return Err(ClassifierError::Prediction(format!(
                "Model returned {} values, expected {}",
                output.len(),
                self.class_count
            )));
        }
        debug!("Forward pass produced {} values", output.len());
        Ok(output)
    }

    fn prediction(&self, index: usize, probability: f32) -> Prediction {
        Prediction {
            class_name: self.metadata.labels[index].clone(),
            probability,
        }
    }
}

/// Model and metadata locations inside a directory or under a base URL.
///
/// ```
/// assert_eq!(
///     glimpse::dir_locations("https://host/pets/"),
///     ("https://host/pets/model.onnx".to_string(), "https://host/pets/metadata.json".to_string())
/// );
/// ```
pub fn dir_locations(base: &str) -> (String, String) {
    if is_remote(base) {
        let base = base.trim_end_matches('/');
        (
            format!("{}/{}", base, MODEL_FILE_NAME),
            format!("{}/{}", base, METADATA_FILE_NAME),
        )
    } else {
        let base = Path::new(base);
        (
            base.join(MODEL_FILE_NAME).to_string_lossy().to_string(),
            base.join(METADATA_FILE_NAME).to_string_lossy().to_string(),
        )
    }
}

async fn resolve_model_location(location: &str) -> Result<PathBuf, ClassifierError> {
    if location.trim().is_empty() {
        return Err(ClassifierError::ModelLoad("Model location cannot be empty".into()));
    }
    if is_remote(location) {
        let manager = ModelManager::new_default().map_err(|e| {
            ClassifierError::ModelLoad(format!("Failed to create model manager: {}", e))
        })?;
        Ok(manager.ensure_cached(location, None).await?)
    } else {
        Ok(PathBuf::from(location))
    }
}
