//! JSON state persistence for trained models.
//!
//! The on-disk format is just the serde representation of the owning
//! struct; the contract is that save-then-load reproduces identical
//! detect/recommend output, not any particular layout.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("state file not found: {path}")]
    Missing { path: String },

    #[error("refusing to save untrained state")]
    Untrained,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt state file: {0}")]
    Format(#[from] serde_json::Error),
}

/// Write `value` as pretty JSON, creating parent directories as needed.
pub fn save_json<T: Serialize>(value: &T, path: &Path) -> Result<(), PersistError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)?;
    tracing::info!(path = %path.display(), "State saved");
    Ok(())
}

/// Read a value back. A missing or unparsable file surfaces as an error;
/// no partial state is ever adopted.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, PersistError> {
    if !path.exists() {
        return Err(PersistError::Missing {
            path: path.display().to_string(),
        });
    }
    let content = fs::read_to_string(path)?;
    let value = serde_json::from_str(&content)?;
    tracing::info!(path = %path.display(), "State loaded");
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_reported() {
        let err = load_json::<Vec<u8>>(Path::new("/nonexistent/state.json")).unwrap_err();
        assert!(matches!(err, PersistError::Missing { .. }));
    }

    #[test]
    fn test_corrupt_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = load_json::<Vec<u8>>(&path).unwrap_err();
        assert!(matches!(err, PersistError::Format(_)));
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/state.json");
        save_json(&vec![1u32, 2, 3], &path).unwrap();
        let back: Vec<u32> = load_json(&path).unwrap();
        assert_eq!(back, vec![1, 2, 3]);
    }
}
