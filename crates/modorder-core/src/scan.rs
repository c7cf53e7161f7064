//! Directory host: a mods folder plus an active-order file.

use crate::catalog::{LegacyDeclarations, ModList, Package};
use crate::CoreError;
use modorder_schema::{parse_descriptor_file, PackageId, Version, DESCRIPTOR_PATH};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// On-disk active order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModListFile {
    pub active: Vec<String>,
}

/// Every package under `dir`, sorted by folder name.
///
/// Subdirectories without a readable descriptor, with an invalid id, or
/// repeating an id already seen are skipped with a warning.
pub fn scan_mods_dir(dir: &Path) -> Result<Vec<Package>, CoreError> {
    let mut entries: Vec<_> = fs::read_dir(dir)?
        .filter_map(Result::ok)
        .filter(|e| e.path().is_dir())
        .collect();
    entries.sort_by_key(|e| e.file_name());

    let mut seen = HashSet::new();
    let mut packages = Vec::new();
    for entry in entries {
        let root = entry.path();
        let folder = entry.file_name().to_string_lossy().into_owned();
        if folder.starts_with('.') {
            continue;
        }
        let descriptor_path = root.join(DESCRIPTOR_PATH);
        if !descriptor_path.is_file() {
            debug!("skipping {folder}: no {DESCRIPTOR_PATH}");
            continue;
        }
        let descriptor = match parse_descriptor_file(&descriptor_path) {
            Ok(d) => d,
            Err(e) => {
                warn!("skipping {folder}: {e}");
                continue;
            }
        };
        let Some(id) = PackageId::parse(&descriptor.id) else {
            warn!("skipping {folder}: invalid package id '{}'", descriptor.id);
            continue;
        };
        if !seen.insert(id.clone()) {
            warn!("skipping {folder}: duplicate package id {id}");
            continue;
        }

        let mut package = Package::new(id, root).with_folder(folder.as_str());
        if let Some(name) = descriptor.name {
            package = package.with_name(name);
        }
        if let Some(raw) = descriptor.version.as_deref() {
            match Version::parse_loose(raw) {
                Ok(v) => package = package.with_version(v),
                Err(e) => warn!("{folder}: ignoring version '{raw}': {e}"),
            }
        }
        if descriptor.core {
            package = package.core();
        }
        package.legacy = LegacyDeclarations {
            load_before: descriptor.load_before,
            load_after: descriptor.load_after,
            incompatible_with: descriptor.incompatible_with,
            dependencies: descriptor.dependencies,
        };
        packages.push(package);
    }
    debug!("found {} packages in {}", packages.len(), dir.display());
    Ok(packages)
}

/// Read the active order. A missing file is an empty order.
pub fn load_modlist(path: &Path) -> Result<ModListFile, CoreError> {
    if !path.exists() {
        return Ok(ModListFile::default());
    }
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Write the active order atomically.
pub fn save_modlist(path: &Path, list: &ModListFile) -> Result<(), CoreError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;
    let content = serde_json::to_string_pretty(list)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content.as_bytes())?;
    tmp.write_all(b"\n")?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| CoreError::Io(e.error))?;
    Ok(())
}

/// Scan `mods_dir` and activate the packages listed in `modlist_path`.
/// Listed ids that are not installed are dropped with a warning.
pub fn load_catalog(mods_dir: &Path, modlist_path: &Path) -> Result<ModList, CoreError> {
    let packages = scan_mods_dir(mods_dir)?;
    let file = load_modlist(modlist_path)?;
    let installed: HashSet<PackageId> = packages.iter().map(|p| p.id.clone()).collect();

    let mut active = Vec::new();
    for raw in &file.active {
        match PackageId::parse(raw) {
            Some(id) if installed.contains(&id) => active.push(id),
            _ => warn!("active package '{raw}' is not installed"),
        }
    }
    Ok(ModList::new(packages).with_active(active))
}

impl From<&ModList> for ModListFile {
    fn from(list: &ModList) -> Self {
        use crate::catalog::Catalog;
        Self {
            active: list
                .active_order()
                .iter()
                .map(|id| id.to_string())
                .collect(),
        }
    }
}
