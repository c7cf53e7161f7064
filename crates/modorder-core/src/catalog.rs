//! The host's view of installed packages and the active load order.

use modorder_schema::{strip_name, PackageId, Version};
use std::path::PathBuf;

/// Requirements carried by the host in its own single-field format.
///
/// Entries are whole tokens (ids or display names) that always accept any
/// version, normalized into the same requirement kinds as manifest
/// declarations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LegacyDeclarations {
    pub load_before: Vec<String>,
    pub load_after: Vec<String>,
    pub incompatible_with: Vec<String>,
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    pub id: PackageId,
    /// Display name.
    pub name: String,
    /// Directory name under the mods root.
    pub folder: String,
    /// Version declared by the host, if any.
    pub version: Option<Version>,
    pub root: PathBuf,
    /// Core packages must be first in the active order.
    pub is_core: bool,
    pub legacy: LegacyDeclarations,
}

impl Package {
    /// A package whose name and folder default to its id.
    pub fn new(id: impl Into<PackageId>, root: impl Into<PathBuf>) -> Self {
        let id = id.into();
        Self {
            name: id.to_string(),
            folder: id.to_string(),
            id,
            version: None,
            root: root.into(),
            is_core: false,
            legacy: LegacyDeclarations::default(),
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn with_folder(mut self, folder: impl Into<String>) -> Self {
        self.folder = folder.into();
        self
    }

    #[must_use]
    pub fn with_version(mut self, version: Version) -> Self {
        self.version = Some(version);
        self
    }

    #[must_use]
    pub fn core(mut self) -> Self {
        self.is_core = true;
        self
    }

    /// Whether `token` names this package by id, folder, or display name.
    /// Names compare with whitespace stripped, case-insensitively.
    pub fn answers_to(&self, token: &str) -> bool {
        if let Some(id) = PackageId::parse(token) {
            if id == self.id {
                return true;
            }
        }
        let stripped = strip_name(token);
        !stripped.is_empty()
            && (strip_name(&self.folder) == stripped || strip_name(&self.name) == stripped)
    }
}

/// Installed packages plus the ordered active subset.
///
/// Mutators return `false` when the request does not apply (unknown id,
/// wrong activation state). Callers that mutate a catalog directly must
/// notify the engine afterwards; the engine does not observe the catalog.
pub trait Catalog {
    fn installed(&self) -> &[Package];

    fn active_order(&self) -> &[PackageId];

    fn get(&self, id: &PackageId) -> Option<&Package> {
        self.installed().iter().find(|p| &p.id == id)
    }

    fn position(&self, id: &PackageId) -> Option<usize> {
        self.active_order().iter().position(|a| a == id)
    }

    fn is_active(&self, id: &PackageId) -> bool {
        self.position(id).is_some()
    }

    /// Activate (appending to the order) or deactivate a package.
    fn set_active(&mut self, id: &PackageId, active: bool) -> bool;

    /// Activate an inactive package at `index`, shifting later entries back.
    fn insert_active(&mut self, id: &PackageId, index: usize) -> bool;

    /// Place `id` immediately before `anchor`. Both must be active.
    fn move_before(&mut self, id: &PackageId, anchor: &PackageId) -> bool;

    /// Place `id` immediately after `anchor`. Both must be active.
    fn move_after(&mut self, id: &PackageId, anchor: &PackageId) -> bool;

    fn move_to_front(&mut self, id: &PackageId) -> bool;

    /// Inactive installed packages that answer to `query`.
    fn find_candidates(&self, query: &str) -> Vec<&Package> {
        self.installed()
            .iter()
            .filter(|p| !self.is_active(&p.id) && p.answers_to(query))
            .collect()
    }
}

/// In-memory catalog.
#[derive(Debug, Clone, Default)]
pub struct ModList {
    packages: Vec<Package>,
    active: Vec<PackageId>,
}

impl ModList {
    pub fn new(packages: Vec<Package>) -> Self {
        Self {
            packages,
            active: Vec::new(),
        }
    }

    /// Set the active order. Unknown and repeated ids are dropped.
    #[must_use]
    pub fn with_active<I, T>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<PackageId>,
    {
        self.active.clear();
        for id in ids {
            let id = id.into();
            if self.get(&id).is_some() && !self.active.contains(&id) {
                self.active.push(id);
            }
        }
        self
    }

    pub fn add(&mut self, package: Package) -> bool {
        if self.get(&package.id).is_some() {
            return false;
        }
        self.packages.push(package);
        true
    }

    pub fn remove(&mut self, id: &PackageId) -> Option<Package> {
        let at = self.packages.iter().position(|p| &p.id == id)?;
        self.active.retain(|a| a != id);
        Some(self.packages.remove(at))
    }

    fn take_active(&mut self, id: &PackageId) -> bool {
        match self.position(id) {
            Some(at) => {
                self.active.remove(at);
                true
            }
            None => false,
        }
    }

    fn relocate(&mut self, id: &PackageId, anchor: &PackageId, after: bool) -> bool {
        if id == anchor || !self.is_active(anchor) || !self.take_active(id) {
            return false;
        }
        let Some(at) = self.position(anchor) else {
            return false;
        };
        let at = if after { at + 1 } else { at };
        self.active.insert(at, id.clone());
        true
    }
}

impl Catalog for ModList {
    fn installed(&self) -> &[Package] {
        &self.packages
    }

    fn active_order(&self) -> &[PackageId] {
        &self.active
    }

    fn set_active(&mut self, id: &PackageId, active: bool) -> bool {
        if self.get(id).is_none() {
            return false;
        }
        match (active, self.is_active(id)) {
            (true, false) => {
                self.active.push(id.clone());
                true
            }
            (false, true) => self.take_active(id),
            _ => false,
        }
    }

    fn insert_active(&mut self, id: &PackageId, index: usize) -> bool {
        if self.get(id).is_none() || self.is_active(id) {
            return false;
        }
        let at = index.min(self.active.len());
        self.active.insert(at, id.clone());
        true
    }

    fn move_before(&mut self, id: &PackageId, anchor: &PackageId) -> bool {
        self.relocate(id, anchor, false)
    }

    fn move_after(&mut self, id: &PackageId, anchor: &PackageId) -> bool {
        self.relocate(id, anchor, true)
    }

    fn move_to_front(&mut self, id: &PackageId) -> bool {
        if !self.take_active(id) {
            return false;
        }
        self.active.insert(0, id.clone());
        true
    }
}
