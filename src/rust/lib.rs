//! A thread-safe image classifier for pretrained ONNX models.
//!
//! Images are center-cropped to the model's square input, optionally mirrored and
//! converted to grayscale, normalized into `[-1, 1]` and fed through ONNX Runtime. The
//! output vector is paired with the labels from the model's metadata.
//!
//! # Basic Usage
//!
//! ```rust,no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use glimpse::{Classifier, ImageSource};
//!
//! let classifier = Classifier::load("my_model/model.onnx", "my_model/metadata.json").await?;
//!
//! let image = image::open("photo.jpg")?;
//! for prediction in classifier.predict_top_k(&ImageSource::Image(&image), 3, false)? {
//!     println!("{}: {:.1}%", prediction.class_name, prediction.probability * 100.0);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Metadata
//!
//! Metadata can come from a file, a URL, inline JSON or be built in code:
//!
//! ```rust
//! use glimpse::Metadata;
//! use serde_json::json;
//!
//! let metadata = Metadata::from_value(json!({"labels": ["cat", "dog"]})).unwrap();
//! assert_eq!(metadata.image_size, 224);
//! assert_eq!(metadata.model_name, "untitled");
//! ```

pub mod classifier;
pub mod metadata;
mod runtime;
pub mod model_manager;

pub use classifier::{
    dir_locations, Classifier, ClassifierBuilder, ClassifierError, ClassifierInfo, ImageModel, ImageSource,
    OnnxModel, Prediction, VideoFrame, DEFAULT_MAX_PREDICTIONS,
};
pub use classifier::preprocess::{CropGeometry, Preprocessor, TensorLayout};
pub use classifier::scope::AllocationTracker;
pub use metadata::{is_remote, load_metadata, Metadata, MetadataSource};
pub use runtime::{RuntimeConfig, create_session_builder};
pub use ort::session::builder::GraphOptimizationLevel;
pub use model_manager::{ModelManager, ModelError};

pub fn init_logger() {
    env_logger::init();
}
