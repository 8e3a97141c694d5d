//! Artifacts handed from one step to the next.

use std::path::{Path, PathBuf};

use image::DynamicImage;

/// Extension appended to an artifact path to name its sidecar file
pub const SIDECAR_EXTENSION: &str = "xmp";

/// The output of a step: an in-memory image plus its backing file.
///
/// Owned by exactly one executor at a time; each step invocation consumes the
/// previous artifact and returns the next one. The backing file only exists
/// when the producing step actually wrote it (last step or format change).
#[derive(Debug, Clone)]
pub struct TransientArtifact {
    /// Decoded image, if already loaded
    pub image: Option<DynamicImage>,

    /// Backing file (source file for the first step)
    pub path: PathBuf,

    /// Sidecar metadata to be written next to the final output
    pub sidecar: Option<String>,
}

impl TransientArtifact {
    /// Artifact for a source file that has not been decoded yet
    pub fn source(path: impl Into<PathBuf>) -> Self {
        Self {
            image: None,
            path: path.into(),
            sidecar: None,
        }
    }

    /// Lowercased extension of the backing file, if any
    pub fn suffix(&self) -> Option<String> {
        self.path
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
    }

    pub fn is_loaded(&self) -> bool {
        self.image.is_some()
    }
}

/// Path of the sidecar belonging to `path` (`photo.jpg` -> `photo.jpg.xmp`)
pub fn sidecar_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(SIDECAR_EXTENSION);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_artifact() {
        let artifact = TransientArtifact::source("/photos/Beach.JPG");

        assert!(!artifact.is_loaded());
        assert_eq!(artifact.suffix().as_deref(), Some("jpg"));
    }

    #[test]
    fn test_sidecar_path() {
        assert_eq!(
            sidecar_path(Path::new("/out/photo.jpg")),
            PathBuf::from("/out/photo.jpg.xmp")
        );
    }
}
