//! Local cache for model files fetched over HTTP.
//!
//! Each URL maps to `<models_dir>/<first 16 hex chars of sha256(url)>/<file name>`, so the
//! same URL is only downloaded once and different URLs never collide.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

const CACHE_ENV_VAR: &str = "GLIMPSE_CACHE";

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Invalid model location: {0}")]
    InvalidLocation(String),
    #[error("Download error: {0}")]
    DownloadError(#[from] reqwest::Error),
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("Model verification failed")]
    VerificationFailed,
    #[error("Hash mismatch: expected {expected}, got {actual} for {location}")]
    HashMismatch {
        location: String,
        expected: String,
        actual: String,
    },
}

#[derive(Clone, Debug)]
pub struct ModelManager {
    models_dir: PathBuf,
    download_lock: Arc<Mutex<()>>,
}

impl ModelManager {
    /// Creates a new ModelManager with the default models directory
    pub fn new_default() -> io::Result<Self> {
        Self::new(Self::get_default_models_dir())
    }

    /// Returns the default models directory path
    pub fn get_default_models_dir() -> PathBuf {
        // 1. Check environment variable
        if let Ok(path) = env::var(CACHE_ENV_VAR) {
            return PathBuf::from(path).join("models");
        }

        // 2. Use platform-specific cache directory
        if let Some(cache_dir) = dirs::cache_dir() {
            return cache_dir.join("glimpse").join("models");
        }

        // 3. Fallback to user's home directory
        if let Some(home_dir) = dirs::home_dir() {
            return home_dir.join(".cache").join("glimpse").join("models");
        }

        // 4. If all else fails, use system temp directory (platform agnostic)
        env::temp_dir().join("glimpse").join("models")
    }

    pub fn new<P: AsRef<Path>>(models_dir: P) -> io::Result<Self> {
        let models_dir = models_dir.as_ref().to_path_buf();
        fs::create_dir_all(&models_dir)?;
        Ok(Self {
            models_dir,
            download_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    /// Where the file behind `url` is (or would be) cached.
    pub fn get_cache_path(&self, url: &str) -> PathBuf {
        let key = sha256_hex(url.as_bytes());
        self.models_dir.join(&key[..16]).join(file_name_from_url(url))
    }

    pub fn is_cached(&self, url: &str) -> bool {
        let path = self.get_cache_path(url);
        log::debug!("Cache path for {}: {:?} (exists: {})", url, path, path.exists());
        path.exists()
    }

    /// Checks a file against an expected lowercase hex SHA-256 digest.
    pub fn verify_file(&self, path: &Path, expected_hash: &str) -> Result<bool, ModelError> {
        log::info!("Verifying file: {:?}", path);
        let bytes = fs::read(path)?;
        let hash = sha256_hex(&bytes);
        log::debug!("Calculated hash: {}", hash);
        log::debug!("Expected hash:   {}", expected_hash);
        Ok(hash.eq_ignore_ascii_case(expected_hash))
    }

    /// Downloads `url` into the cache, replacing any existing copy.
    pub async fn download(&self, url: &str, expected_hash: Option<&str>) -> Result<PathBuf, ModelError> {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ModelError::InvalidLocation(url.to_string()));
        }

        let _lock = self.download_lock.lock().await;
        let path = self.get_cache_path(url);

        log::info!("Downloading {} to {:?}", url, path);
        let response = reqwest::get(url).await?.error_for_status()?;
        log::info!("Download response status: {}", response.status());
        let bytes = response.bytes().await?;
        log::info!("Downloaded {} bytes", bytes.len());

        if let Some(expected) = expected_hash {
            let actual = sha256_hex(&bytes);
            if !actual.eq_ignore_ascii_case(expected) {
                log::error!("Hash mismatch for {}: expected {}, got {}", url, expected, actual);
                return Err(ModelError::HashMismatch {
                    location: url.to_string(),
                    expected: expected.to_string(),
                    actual,
                });
            }
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, &bytes)?;

        if let Some(expected) = expected_hash {
            if !self.verify_file(&path, expected)? {
                let _ = fs::remove_file(&path);
                return Err(ModelError::VerificationFailed);
            }
        }

        log::info!("{} cached at {:?}", url, path);
        Ok(path)
    }

    /// Ensures `url` is cached and, when a hash is given, that the cached copy matches it.
    /// A copy that fails verification is downloaded again.
    pub async fn ensure_cached(&self, url: &str, expected_hash: Option<&str>) -> Result<PathBuf, ModelError> {
        let path = self.get_cache_path(url);
        if !path.exists() {
            log::info!("{} not cached, downloading...", url);
            return self.download(url, expected_hash).await;
        }

        if let Some(expected) = expected_hash {
            if !self.verify_file(&path, expected)? {
                log::warn!("Cached copy of {} failed verification, re-downloading", url);
                self.remove(url)?;
                return self.download(url, expected_hash).await;
            }
        }

        log::info!("Using cached copy of {}", url);
        Ok(path)
    }

    /// Removes the cached copy of `url`, if any.
    pub fn remove(&self, url: &str) -> Result<(), ModelError> {
        let path = self.get_cache_path(url);
        if path.exists() {
            fs::remove_file(&path)?;
        }
        Ok(())
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Last path segment of a URL, ignoring any query or fragment.
fn file_name_from_url(url: &str) -> String {
    let without_query = url.split(&['?', '#'][..]).next().unwrap_or(url);
    let without_scheme = without_query
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(without_query);
    let path = without_scheme.split_once('/').map(|(_, path)| path).unwrap_or("");
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .unwrap_or("download")
        .to_string()
}
