//! References to the media items a run operates on.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A source item queued for processing.
///
/// Immutable for the duration of a run: executors only read the path and
/// echo the identifier back in every event they emit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaItemRef {
    /// Stable catalog identifier
    pub id: String,

    /// Path of the source file
    pub path: PathBuf,
}

impl MediaItemRef {
    /// Create a reference with an identifier assigned by the catalog
    pub fn new(id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
        }
    }

    /// Create a reference whose identifier is derived from the source path
    /// (first 12 hex chars of its SHA-256).
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let id = path_id(&path);
        Self { id, path }
    }

    /// File name of the source, lossy
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

fn path_id(path: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.to_string_lossy().as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..12].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_is_stable_per_path() {
        let a = MediaItemRef::from_path("/photos/a.jpg");
        let b = MediaItemRef::from_path("/photos/a.jpg");
        let c = MediaItemRef::from_path("/photos/b.jpg");

        assert_eq!(a.id, b.id);
        assert_ne!(a.id, c.id);
        assert_eq!(a.id.len(), 12);
    }

    #[test]
    fn test_file_name() {
        let item = MediaItemRef::new("42", "/photos/trip/beach.png");
        assert_eq!(item.file_name(), "beach.png");
    }
}
