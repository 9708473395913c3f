//! Model metadata: the label list and preprocessing hints that travel with a model.
//!
//! Metadata documents are small JSON objects of the form
//!
//! ```json
//! {"labels": ["cat", "dog"], "imageSize": 224, "grayscale": false, "modelName": "pets"}
//! ```
//!
//! Only `labels` is required. Every other field is filled with a default when absent.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use log::{debug, info};

use crate::classifier::ClassifierError;

/// Side length of the square crop fed to the model when metadata does not say otherwise.
pub const DEFAULT_IMAGE_SIZE: u32 = 224;

/// Model name used when metadata does not carry one.
pub const DEFAULT_MODEL_NAME: &str = "untitled";

/// Fully resolved model descriptor.
///
/// Built once at load time and never mutated afterwards. `labels[i]` names output unit `i`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub labels: Vec<String>,
    pub image_size: u32,
    pub grayscale: bool,
    pub model_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_stamp: Option<String>,
    pub user_metadata: Map<String, Value>,
    pub package_name: String,
    pub package_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tm_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tfjs_version: Option<String>,
}

/// Metadata as it appears on the wire, before defaults are applied.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMetadata {
    labels: Vec<String>,
    image_size: Option<u32>,
    grayscale: Option<bool>,
    model_name: Option<String>,
    time_stamp: Option<String>,
    user_metadata: Option<Map<String, Value>>,
    package_name: Option<String>,
    package_version: Option<String>,
    tm_version: Option<String>,
    tfjs_version: Option<String>,
}

impl Metadata {
    /// Creates metadata for the given labels with every optional field defaulted.
    pub fn new(labels: Vec<impl Into<String>>) -> Self {
        Self::from_raw(RawMetadata {
            labels: labels.into_iter().map(Into::into).collect(),
            image_size: None,
            grayscale: None,
            model_name: None,
            time_stamp: None,
            user_metadata: None,
            package_name: None,
            package_version: None,
            tm_version: None,
            tfjs_version: None,
        })
    }

    /// Sets the crop size. Zero falls back to [`DEFAULT_IMAGE_SIZE`].
    pub fn with_image_size(mut self, image_size: u32) -> Self {
        self.image_size = if image_size == 0 { DEFAULT_IMAGE_SIZE } else { image_size };
        self
    }

    /// Sets whether crops are collapsed to a single luminance channel.
    pub fn with_grayscale(mut self, grayscale: bool) -> Self {
        self.grayscale = grayscale;
        self
    }

    /// Sets the model name.
    pub fn with_model_name(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = model_name.into();
        self
    }

    /// Validates an already-parsed JSON value and fills in defaults.
    ///
    /// # Errors
    /// * `InvalidMetadata` if the value is not an object, has no `labels` array,
    ///   or carries an optional field of the wrong type
    pub fn from_value(value: Value) -> Result<Self, ClassifierError> {
        let object = value.as_object().ok_or_else(|| {
            ClassifierError::InvalidMetadata("metadata must be a JSON object".into())
        })?;

        match object.get("labels") {
            Some(Value::Array(_)) => {}
            Some(_) => {
                return Err(ClassifierError::InvalidMetadata(
                    "`labels` must be an array of strings".into(),
                ))
            }
            None => {
                return Err(ClassifierError::InvalidMetadata(
                    "metadata is missing the `labels` array".into(),
                ))
            }
        }

        let raw: RawMetadata = serde_json::from_value(value)
            .map_err(|e| ClassifierError::InvalidMetadata(e.to_string()))?;
        Ok(Self::from_raw(raw))
    }

    /// Parses a metadata document.
    ///
    /// Text that is not JSON at all is reported as `MetadataFetch`, since it can only
    /// come from a document that failed to arrive intact.
    pub fn from_json_str(text: &str) -> Result<Self, ClassifierError> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| ClassifierError::MetadataFetch(format!("Failed to parse metadata: {}", e)))?;
        Self::from_value(value)
    }

    fn from_raw(raw: RawMetadata) -> Self {
        Self {
            labels: raw.labels,
            image_size: raw.image_size.filter(|&size| size > 0).unwrap_or(DEFAULT_IMAGE_SIZE),
            grayscale: raw.grayscale.unwrap_or(false),
            model_name: raw
                .model_name
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| DEFAULT_MODEL_NAME.to_string()),
            time_stamp: raw.time_stamp,
            user_metadata: raw.user_metadata.unwrap_or_default(),
            package_name: raw
                .package_name
                .unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string()),
            package_version: raw
                .package_version
                .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string()),
            tm_version: raw.tm_version,
            tfjs_version: raw.tfjs_version,
        }
    }
}

/// Where metadata comes from.
#[derive(Debug, Clone)]
pub enum MetadataSource {
    /// A local file path or an `http(s)://` URL pointing at a JSON document
    Location(String),
    /// An already-parsed JSON value
    Json(Value),
    /// Metadata that has already been resolved
    Resolved(Metadata),
}

impl From<&str> for MetadataSource {
    fn from(location: &str) -> Self {
        MetadataSource::Location(location.to_string())
    }
}

impl From<String> for MetadataSource {
    fn from(location: String) -> Self {
        MetadataSource::Location(location)
    }
}

impl From<Value> for MetadataSource {
    fn from(value: Value) -> Self {
        MetadataSource::Json(value)
    }
}

impl From<Metadata> for MetadataSource {
    fn from(metadata: Metadata) -> Self {
        MetadataSource::Resolved(metadata)
    }
}

/// True for `http://` and `https://` locations.
pub fn is_remote(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

/// Resolves metadata from any supported source.
///
/// # Errors
/// * `InvalidMetadata` for an empty location or a document that is not metadata-shaped
/// * `MetadataFetch` when the document cannot be read, downloaded or parsed
pub async fn load_metadata(source: impl Into<MetadataSource>) -> Result<Metadata, ClassifierError> {
    match source.into() {
        MetadataSource::Resolved(metadata) => Ok(metadata),
        MetadataSource::Json(value) => Metadata::from_value(value),
        MetadataSource::Location(location) => {
            if location.trim().is_empty() {
                return Err(ClassifierError::InvalidMetadata(
                    "metadata location cannot be empty".into(),
                ));
            }
            let text = fetch_document(&location).await?;
            let metadata = Metadata::from_json_str(&text)?;
            info!(
                "Loaded metadata for '{}' with {} labels from {}",
                metadata.model_name,
                metadata.labels.len(),
                location
            );
            Ok(metadata)
        }
    }
}

async fn fetch_document(location: &str) -> Result<String, ClassifierError> {
    if is_remote(location) {
        debug!("Fetching metadata from {}", location);
        let response = reqwest::get(location)
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| ClassifierError::MetadataFetch(format!("{}: {}", location, e)))?;
        response
            .text()
            .await
            .map_err(|e| ClassifierError::MetadataFetch(format!("{}: {}", location, e)))
    } else {
        debug!("Reading metadata from {}", location);
        tokio::fs::read_to_string(location)
            .await
            .map_err(|e| ClassifierError::MetadataFetch(format!("{}: {}", location, e)))
    }
}
