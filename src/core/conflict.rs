//! Destination conflict resolution and temporary artifact cleanup.
//!
//! These helpers run concurrently from many executors against the same
//! directory. Names are claimed with an exclusive create and outputs moved
//! with an atomic rename; there is never an existence check followed by a
//! create.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tokio::fs::{self, OpenOptions};
use tracing::{debug, warn};

use crate::domain::{sidecar_path, ConflictPolicy};

/// Highest numeric suffix claimed per base name during a run.
///
/// Only chooses where probing starts, so a suffix freed during the run is not
/// handed out again; whether a name is actually free is decided by the
/// exclusive create.
#[derive(Debug, Default)]
pub struct UniqueNames {
    claimed: Mutex<HashMap<PathBuf, u32>>,
}

impl UniqueNames {
    pub fn new() -> Self {
        Self::default()
    }

    fn first_candidate(&self, base: &Path) -> u32 {
        let claimed = self.claimed.lock().unwrap_or_else(PoisonError::into_inner);
        claimed.get(base).map_or(0, |n| n.saturating_add(1))
    }

    fn record(&self, base: &Path, suffix: u32) {
        let mut claimed = self.claimed.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = claimed.entry(base.to_path_buf()).or_insert(suffix);
        *entry = (*entry).max(suffix);
    }
}

/// `photo.jpg` with suffix 2 -> `photo_2.jpg`; suffix 0 is the base itself
pub fn numbered_name(base: &Path, suffix: u32) -> PathBuf {
    if suffix == 0 {
        return base.to_path_buf();
    }

    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match base.extension() {
        Some(ext) => format!("{}_{}.{}", stem, suffix, ext.to_string_lossy()),
        None => format!("{}_{}", stem, suffix),
    };

    base.with_file_name(name)
}

/// Where a chain's output will land
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub path: PathBuf,

    /// An empty placeholder was created at `path` to reserve the name
    pub claimed: bool,

    /// A placeholder was also created at the sidecar path
    pub sidecar_claimed: bool,
}

impl Destination {
    /// Remove the placeholders this destination created
    pub async fn release(&self) {
        if self.claimed {
            if let Err(e) = remove_file_if_exists(&self.path).await {
                warn!(path = %self.path.display(), error = %e, "Failed to release claimed name");
            }
        }
        if self.sidecar_claimed {
            self.release_sidecar().await;
        }
    }

    /// Remove the sidecar placeholder, if this destination created one
    pub async fn release_sidecar(&self) {
        if !self.sidecar_claimed {
            return;
        }
        let sidecar = sidecar_path(&self.path);
        if let Err(e) = remove_file_if_exists(&sidecar).await {
            warn!(path = %sidecar.display(), error = %e, "Failed to release claimed sidecar name");
        }
    }
}

/// Exclusively create an empty file at `path`; `false` when it already exists
async fn create_placeholder(path: &Path) -> io::Result<bool> {
    match OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
    {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e),
    }
}

/// Reserve `candidate` and, with `sidecar`, its sidecar name as one unit
async fn try_claim(candidate: &Path, sidecar: bool) -> io::Result<bool> {
    if !create_placeholder(candidate).await? {
        return Ok(false);
    }
    if !sidecar {
        return Ok(true);
    }

    match create_placeholder(&sidecar_path(candidate)).await {
        Ok(true) => Ok(true),
        Ok(false) => {
            remove_file_if_exists(candidate).await?;
            Ok(false)
        }
        Err(e) => {
            remove_file_if_exists(candidate).await?;
            Err(e)
        }
    }
}

/// Claim the first free `stem_<n>.ext` name for `base` with exclusive creates.
///
/// With `sidecar`, `<name>.xmp` must be free too: the output and its sidecar
/// always share one stem.
pub async fn claim_unique(base: &Path, names: &UniqueNames, sidecar: bool) -> io::Result<PathBuf> {
    let mut suffix = names.first_candidate(base);

    loop {
        let candidate = numbered_name(base, suffix);
        if try_claim(&candidate, sidecar).await? {
            names.record(base, suffix);
            debug!(path = %candidate.display(), sidecar, "Claimed destination name");
            return Ok(candidate);
        }

        suffix = suffix.checked_add(1).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::Other,
                format!("no free name left for {}", base.display()),
            )
        })?;
    }
}

/// Resolve `directory/file_name` under the conflict policy.
///
/// `sidecar` tells whether a sidecar will be moved along with the output.
pub async fn resolve_destination(
    directory: &Path,
    file_name: &str,
    policy: ConflictPolicy,
    names: &UniqueNames,
    sidecar: bool,
) -> io::Result<Destination> {
    let base = directory.join(file_name);

    match policy {
        ConflictPolicy::Overwrite => Ok(Destination {
            path: base,
            claimed: false,
            sidecar_claimed: false,
        }),
        ConflictPolicy::GenerateUniqueName => Ok(Destination {
            path: claim_unique(&base, names, sidecar).await?,
            claimed: true,
            sidecar_claimed: sidecar,
        }),
    }
}

/// Atomically rename `temp` onto `destination`
pub async fn move_into_place(temp: &Path, destination: &Path) -> io::Result<()> {
    fs::rename(temp, destination).await
}

/// Rename the sidecar of `temp` onto the sidecar of `destination`; a missing
/// sidecar is not an error
pub async fn move_sidecar(temp: &Path, destination: &Path) -> io::Result<()> {
    match fs::rename(sidecar_path(temp), sidecar_path(destination)).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Delete a file; "already absent" is success
pub async fn remove_file_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Delete a temporary artifact and its sidecar
pub async fn remove_artifact(path: &Path) -> io::Result<()> {
    remove_file_if_exists(path).await?;
    remove_file_if_exists(&sidecar_path(path)).await
}

/// Best-effort removal of temporary artifacts; failures are logged only
pub async fn cleanup_artifacts(paths: &[PathBuf]) {
    for path in paths {
        if let Err(e) = remove_artifact(path).await {
            warn!(path = %path.display(), error = %e, "Failed to remove temporary artifact");
        }
    }
}
