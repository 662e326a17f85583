//! Whole-file YAML load and store.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{info, warn};

use super::StorageError;

/// Loads a cache file, falling back to the default on any read or parse error.
pub(super) async fn load<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return T::default(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Error reading cache file");
            return T::default();
        }
    };

    if content.trim().is_empty() {
        return T::default();
    }

    match serde_yaml::from_str(&content) {
        Ok(value) => value,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Error parsing cache file");
            T::default()
        }
    }
}

/// Encodes and overwrites a cache file.
pub(super) async fn store<T>(path: &Path, value: &T) -> Result<(), StorageError>
where
    T: Serialize,
{
    let encoded = serde_yaml::to_string(value).map_err(|source| StorageError::Encode {
        path: path.display().to_string(),
        source,
    })?;

    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        info!(path = %path.display(), "Creating cache file");
    }

    tokio::fs::write(path, encoded)
        .await
        .map_err(|source| StorageError::Write {
            path: path.display().to_string(),
            source,
        })
}
