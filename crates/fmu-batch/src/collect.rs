//! Filesystem bookkeeping around dispatch: scratch slots before it, staging
//! tree, consolidation and cleanup after it.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{BatchError, Result};
use crate::layout::{ARTIFACT_EXTENSION, Layout};

/// Create every scratch slot directory. Existing slots are reused, but
/// artifacts left in them by an earlier run are removed so they cannot be
/// mistaken for output of this one.
pub fn create_scratch_slots(layout: &Layout<'_>) -> Result<Vec<PathBuf>> {
    let slots = layout.slot_dirs();
    for dir in &slots {
        fs::create_dir_all(dir).map_err(BatchError::io("create", dir))?;
        for stale in artifacts_in(dir)? {
            warn!(path = %stale.display(), "removing stale artifact");
            fs::remove_file(&stale).map_err(BatchError::io("remove", &stale))?;
        }
    }
    Ok(slots)
}

/// Create `tmp/tmp<i>` for every index of the run.
pub fn create_staging_tree(layout: &Layout<'_>, indices: impl IntoIterator<Item = u32>) -> Result<()> {
    for index in indices {
        let dir = layout.staging_dir(index);
        fs::create_dir_all(&dir).map_err(BatchError::io("create", &dir))?;
    }
    Ok(())
}

/// Move every artifact found in any scratch slot into the output folder.
///
/// Returns the new paths, sorted by file name. A file of the same name
/// already in the output folder is replaced. A file name seen in two slots
/// is an error, detected before anything is moved.
pub fn consolidate(layout: &Layout<'_>) -> Result<Vec<PathBuf>> {
    let output_dir = layout.output_dir();
    fs::create_dir_all(&output_dir).map_err(BatchError::io("create", &output_dir))?;

    let mut pending = Vec::new();
    let mut seen = HashSet::new();
    for slot_dir in layout.slot_dirs() {
        for artifact in artifacts_in(&slot_dir)? {
            let Some(name) = artifact.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                continue;
            };
            if !seen.insert(name.clone()) {
                return Err(BatchError::DuplicateArtifact { name });
            }
            pending.push((artifact, output_dir.join(&name)));
        }
    }

    pending.sort_by(|a, b| a.1.cmp(&b.1));
    let mut moved = Vec::with_capacity(pending.len());
    for (from, to) in pending {
        if to.exists() {
            info!(path = %to.display(), "replacing existing artifact");
        }
        move_file(&from, &to)?;
        debug!(from = %from.display(), to = %to.display(), "moved artifact");
        moved.push(to);
    }

    info!(count = moved.len(), dir = %output_dir.display(), "consolidated artifacts");
    Ok(moved)
}

/// Remove scratch slots, the package, the helper and every compile script.
/// Paths that are already gone are skipped.
pub fn cleanup(layout: &Layout<'_>) -> Result<()> {
    for dir in layout.slot_dirs() {
        match fs::remove_dir_all(&dir) {
            Ok(()) => debug!(dir = %dir.display(), "removed slot"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(BatchError::io("remove", &dir)(e)),
        }
    }
    for file in layout.intermediate_files() {
        match fs::remove_file(&file) {
            Ok(()) => debug!(file = %file.display(), "removed"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(BatchError::io("remove", &file)(e)),
        }
    }
    Ok(())
}

/// Artifacts directly inside `dir`. A missing directory has none.
fn artifacts_in(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            warn!(dir = %dir.display(), "scratch slot missing");
            return Ok(Vec::new());
        }
        Err(e) => return Err(BatchError::io("read", dir)(e)),
    };

    let mut artifacts = Vec::new();
    for entry in entries {
        let path = entry.map_err(BatchError::io("read", dir))?.path();
        let is_artifact = path.is_file()
            && path
                .extension()
                .is_some_and(|ext| ext == ARTIFACT_EXTENSION);
        if is_artifact {
            artifacts.push(path);
        }
    }
    Ok(artifacts)
}

/// Rename over `to`, falling back to copy and delete when `from` and `to`
/// are on different filesystems or the platform refuses to rename onto an
/// existing file.
fn move_file(from: &Path, to: &Path) -> Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    fs::copy(from, to).map_err(BatchError::io("copy", from))?;
    fs::remove_file(from).map_err(BatchError::io("remove", from))?;
    Ok(())
}
