use crate::CoreError;
use modorder_schema::ContentHash;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// File-level differences between a source package and a local copy of it.
#[derive(Debug, Serialize)]
pub struct DriftReport {
    /// Present in the copy only.
    pub added: Vec<String>,
    pub modified: Vec<String>,
    /// Present in the source only.
    pub removed: Vec<String>,
    pub has_drift: bool,
}

/// blake3 digest over every file under `root`: relative paths and contents,
/// in sorted path order. Timestamps and permissions are ignored.
pub fn content_hash(root: &Path) -> Result<ContentHash, CoreError> {
    if !root.is_dir() {
        return Err(CoreError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("package directory {} does not exist", root.display()),
        )));
    }
    let files = collect_files(root)?;
    let mut hasher = blake3::Hasher::new();
    for (rel, path) in &files {
        let data = fs::read(path)?;
        hasher.update(rel.as_bytes());
        hasher.update(&[0]);
        hasher.update(&(data.len() as u64).to_le_bytes());
        hasher.update(&data);
    }
    let hash = hasher.finalize().to_hex().to_string();
    debug!("hashed {} files under {}: {hash}", files.len(), root.display());
    Ok(ContentHash::new(hash))
}

/// Compare a local copy against its source.
pub fn diff_trees(source: &Path, copy: &Path) -> Result<DriftReport, CoreError> {
    let source_files = if source.is_dir() {
        collect_files(source)?
    } else {
        BTreeMap::new()
    };
    let copy_files = if copy.is_dir() {
        collect_files(copy)?
    } else {
        BTreeMap::new()
    };

    let mut added = Vec::new();
    let mut modified = Vec::new();
    let mut removed = Vec::new();

    for (rel, copy_path) in &copy_files {
        match source_files.get(rel) {
            Some(source_path) => {
                if file_digest(source_path)? != file_digest(copy_path)? {
                    modified.push(rel.clone());
                }
            }
            None => added.push(rel.clone()),
        }
    }
    for rel in source_files.keys() {
        if !copy_files.contains_key(rel) {
            removed.push(rel.clone());
        }
    }

    let has_drift = !added.is_empty() || !modified.is_empty() || !removed.is_empty();

    Ok(DriftReport {
        added,
        modified,
        removed,
        has_drift,
    })
}

/// Replace `dest` with a fresh copy of `source`, except for the files named
/// in `keep` (relative paths), which retain their current `dest` content.
/// The copy is staged next to `dest` and swapped in once complete. Returns
/// the number of files copied from `source`.
pub fn sync_copy(source: &Path, dest: &Path, keep: &[&str]) -> Result<usize, CoreError> {
    let parent = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let staged = tempfile::Builder::new()
        .prefix(".modorder-sync-")
        .tempdir_in(parent)?;
    let mut count = 0;
    copy_recursive(source, staged.path(), &mut count)?;
    for rel in keep {
        let current = dest.join(rel);
        if current.is_file() {
            let target = staged.path().join(rel);
            if let Some(dir) = target.parent() {
                fs::create_dir_all(dir)?;
            }
            fs::copy(&current, &target)?;
        }
    }

    swap_dir(staged.path(), dest, parent)?;
    // Already moved into place; nothing left for the guard to clean up.
    let _ = staged.keep();
    debug!(
        "synced {count} files from {} to {}",
        source.display(),
        dest.display()
    );
    Ok(count)
}

/// Move `staged` to `dest`. An existing `dest` is parked in a scratch
/// directory under `parent` and only discarded once the swap succeeded; if
/// the swap fails it is moved back.
fn swap_dir(staged: &Path, dest: &Path, parent: &Path) -> Result<(), CoreError> {
    if !dest.exists() {
        fs::rename(staged, dest)?;
        return Ok(());
    }
    let backup = tempfile::Builder::new()
        .prefix(".modorder-backup-")
        .tempdir_in(parent)?;
    let parked = backup.path().join("previous");
    fs::rename(dest, &parked)?;
    if let Err(e) = fs::rename(staged, dest) {
        if let Err(restore) = fs::rename(&parked, dest) {
            let kept = backup.keep();
            warn!(
                "cannot restore {} ({restore}); previous copy left in {}",
                dest.display(),
                kept.display()
            );
        }
        return Err(e.into());
    }
    Ok(())
}

fn copy_recursive(src: &Path, dst: &Path, count: &mut usize) -> Result<(), CoreError> {
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        if src_path.is_dir() {
            fs::create_dir_all(&dst_path)?;
            copy_recursive(&src_path, &dst_path, count)?;
        } else {
            fs::copy(&src_path, &dst_path)?;
            *count += 1;
        }
    }
    Ok(())
}

/// Relative path (`/`-separated) to absolute path for every file under `base`.
fn collect_files(base: &Path) -> Result<BTreeMap<String, std::path::PathBuf>, CoreError> {
    let mut out = BTreeMap::new();
    walk(base, base, &mut out)?;
    Ok(out)
}

fn walk(
    base: &Path,
    current: &Path,
    out: &mut BTreeMap<String, std::path::PathBuf>,
) -> Result<(), CoreError> {
    for entry in fs::read_dir(current)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            walk(base, &path, out)?;
        } else {
            let rel = path
                .strip_prefix(base)
                .unwrap_or(&path)
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            out.insert(rel, path);
        }
    }
    Ok(())
}

fn file_digest(path: &Path) -> Result<blake3::Hash, CoreError> {
    Ok(blake3::hash(&fs::read(path)?))
}
