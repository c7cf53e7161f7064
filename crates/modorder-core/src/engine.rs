use crate::catalog::{Catalog, ModList, Package};
use crate::drift::{content_hash, sync_copy};
use crate::issues::{self, Issue, IssueGroup};
use crate::manifest::Manifest;
use crate::requirement::{Context, Requirement};
use crate::resolution::{Action, Outcome, SearchSite};
use crate::userdata::UserDataStore;
use crate::{CoreError, SEVERITY_CRITICAL, SEVERITY_NONE};
use modorder_remote::{FetchOutcome, FetchPool, HttpSource, ManifestSource, RemoteConfig};
use modorder_schema::{PackageId, UserData, Version, DESCRIPTOR_PATH};
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Developer mode: failed version checks are critical.
    pub verbose: bool,
    /// Create and start remote version checks for packages that declare one.
    pub check_versions: bool,
    pub remote: RemoteConfig,
    /// Directory of per-package user data; source sync needs one.
    pub data_dir: Option<PathBuf>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            verbose: false,
            check_versions: true,
            remote: RemoteConfig::default(),
            data_dir: None,
        }
    }
}

/// Evaluation context for one catalog.
///
/// Owns the manifest cache and the memoized issue list. All evaluation and
/// mutation happens on the thread that owns the engine; version checks run
/// in the background and are applied only by [`Engine::poll`] or
/// [`Engine::wait_for_version_checks`].
///
/// Mutations made through [`Engine::apply`] invalidate caches themselves.
/// Mutations made through [`Engine::catalog_mut`] must be followed by the
/// matching `notify_*` call.
pub struct Engine<C: Catalog = ModList> {
    catalog: C,
    options: EngineOptions,
    user_data: Option<UserDataStore>,
    fetches: FetchPool,
    manifests: RefCell<HashMap<PackageId, Rc<Manifest>>>,
    issues: RefCell<Option<Rc<[Issue]>>>,
}

impl<C: Catalog> Engine<C> {
    /// Create an engine that fetches remote manifests over HTTP.
    pub fn new(catalog: C, options: EngineOptions) -> Self {
        let source = Arc::new(HttpSource::new(options.remote.clone()));
        Self::with_source(catalog, options, source)
    }

    pub fn with_source(
        catalog: C,
        options: EngineOptions,
        source: Arc<dyn ManifestSource>,
    ) -> Self {
        let user_data = options.data_dir.clone().map(UserDataStore::new);
        Self {
            catalog,
            options,
            user_data,
            fetches: FetchPool::new(source),
            manifests: RefCell::new(HashMap::new()),
            issues: RefCell::new(None),
        }
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    /// Direct catalog access. Notify the engine after mutating.
    pub fn catalog_mut(&mut self) -> &mut C {
        &mut self.catalog
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn user_data(&self) -> Option<&UserDataStore> {
        self.user_data.as_ref()
    }

    /// The manifest of an installed package, built on first use.
    pub fn manifest(&self, id: &PackageId) -> Option<Rc<Manifest>> {
        let cached = self.manifests.borrow().get(id).cloned();
        if cached.is_some() {
            return cached;
        }
        let package = self.catalog.get(id)?;
        let user_data = self.load_user_data(id);
        let manifest = Rc::new(Manifest::build(
            package,
            &self.catalog,
            user_data.as_ref(),
            self.options.check_versions,
        ));
        self.manifests
            .borrow_mut()
            .insert(id.clone(), Rc::clone(&manifest));
        self.start_check(&manifest);
        Some(manifest)
    }

    fn load_user_data(&self, id: &PackageId) -> Option<UserData> {
        let store = self.user_data.as_ref()?;
        match store.get(id) {
            Ok(data) => data,
            Err(e) => {
                warn!("ignoring user data for {id}: {e}");
                None
            }
        }
    }

    fn start_check(&self, manifest: &Manifest) {
        let Some(check) = manifest.version_check() else {
            return;
        };
        if let Err(e) = check.begin() {
            debug!("{}: version check not restarted: {e}", manifest.id);
            return;
        }
        if !self.fetches.request(manifest.id.as_str(), &check.uri) {
            debug!(
                "{}: reusing in-flight fetch of {}",
                manifest.id, check.uri
            );
        }
    }

    /// Applicable requirements of a package.
    pub fn requirements(&self, id: &PackageId) -> Vec<Rc<Requirement>> {
        self.manifest(id)
            .map(|m| {
                m.requirements()
                    .iter()
                    .filter(|r| r.is_applicable(self))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every applicable requirement with non-zero severity across the active
    /// packages, in active order. Cached until the next notification.
    pub fn issues(&self) -> Rc<[Issue]> {
        if let Some(cached) = self.issues.borrow().as_ref() {
            return Rc::clone(cached);
        }
        let active: Vec<PackageId> = self.catalog.active_order().to_vec();
        let mut found = Vec::new();
        for id in &active {
            let Some(manifest) = self.manifest(id) else {
                continue;
            };
            for requirement in manifest.requirements() {
                if !requirement.is_applicable(self) {
                    continue;
                }
                let severity = requirement.severity(self);
                if severity == SEVERITY_NONE {
                    continue;
                }
                found.push(Issue {
                    requirement: Rc::clone(requirement),
                    severity,
                    description: requirement.description(self),
                });
            }
        }
        debug!("evaluated {} active packages: {} issues", active.len(), found.len());
        let issues: Rc<[Issue]> = found.into();
        *self.issues.borrow_mut() = Some(Rc::clone(&issues));
        issues
    }

    pub fn any_issue(&self, min_severity: u8) -> bool {
        self.issues().iter().any(|i| i.severity >= min_severity)
    }

    /// Worst severity among a package's applicable requirements; zero for
    /// packages without any.
    pub fn severity_of(&self, id: &PackageId) -> u8 {
        self.manifest(id).map_or(SEVERITY_NONE, |m| {
            m.requirements()
                .iter()
                .filter(|r| r.is_applicable(self))
                .map(|r| r.severity(self))
                .max()
                .unwrap_or(SEVERITY_NONE)
        })
    }

    /// Issues grouped by owning package, worst first.
    pub fn report(&self) -> Vec<IssueGroup> {
        issues::group(&self.issues(), |id| self.display_name(id))
    }

    /// Issues that should block applying the mod list.
    pub fn blocking_issues(&self) -> Vec<Issue> {
        self.issues()
            .iter()
            .filter(|i| i.severity >= SEVERITY_CRITICAL)
            .cloned()
            .collect()
    }

    /// Apply the first actionable resolution of `requirement`, if it has one.
    pub fn resolve_first(
        &mut self,
        requirement: &Requirement,
    ) -> Result<Option<Outcome>, CoreError> {
        let first = requirement
            .resolutions(&*self)
            .into_iter()
            .find(|r| r.action.is_actionable());
        match first {
            Some(resolution) => {
                info!("resolving '{}': {}", requirement.declared(), resolution.label);
                self.apply(&resolution.action).map(Some)
            }
            None => Ok(None),
        }
    }

    pub fn apply(&mut self, action: &Action) -> Result<Outcome, CoreError> {
        debug!("applying {action:?}");
        match action {
            Action::Activate { id, at, replace } => {
                self.package(id)?;
                let anchor = at.as_ref().filter(|a| *a != id && self.catalog.is_active(a));
                if self.catalog.is_active(id) {
                    if let Some(anchor) = anchor {
                        self.catalog.move_before(id, anchor);
                    }
                } else {
                    let index = anchor
                        .and_then(|a| self.catalog.position(a))
                        .unwrap_or(self.catalog.active_order().len());
                    self.catalog.insert_active(id, index);
                }
                if let Some(old) = replace.as_ref().filter(|r| *r != id) {
                    self.catalog.set_active(old, false);
                }
                info!("activated {id}");
                self.notify_mod_list_applied();
                Ok(Outcome::OrderChanged)
            }
            Action::Deactivate { id } => {
                self.package(id)?;
                if !self.catalog.set_active(id, false) {
                    return Err(CoreError::NotActive(id.to_string()));
                }
                info!("deactivated {id}");
                self.notify_mod_list_applied();
                Ok(Outcome::OrderChanged)
            }
            Action::MoveBefore { id, anchor } => {
                self.require_active(id)?;
                self.require_active(anchor)?;
                if !self.catalog.move_before(id, anchor) {
                    return Ok(Outcome::Nothing);
                }
                info!("moved {id} before {anchor}");
                self.notify_mod_order_changed();
                Ok(Outcome::OrderChanged)
            }
            Action::MoveAfter { id, anchor } => {
                self.require_active(id)?;
                self.require_active(anchor)?;
                if !self.catalog.move_after(id, anchor) {
                    return Ok(Outcome::Nothing);
                }
                info!("moved {id} after {anchor}");
                self.notify_mod_order_changed();
                Ok(Outcome::OrderChanged)
            }
            Action::MoveToFront { id } => {
                self.require_active(id)?;
                self.catalog.move_to_front(id);
                info!("moved {id} to the top");
                self.notify_mod_order_changed();
                Ok(Outcome::OrderChanged)
            }
            Action::SearchWorkshop { query } => Ok(Outcome::Search {
                site: SearchSite::Workshop,
                query: query.clone(),
            }),
            Action::SearchForum { query } => Ok(Outcome::Search {
                site: SearchSite::Forum,
                query: query.clone(),
            }),
            Action::OpenUrl { url } => Ok(Outcome::Open { url: url.clone() }),
            Action::SyncFromSource { id, source } => {
                let store = self.user_data.as_ref().ok_or(CoreError::NoUserDataStore)?;
                let dest = self.package(id)?.root.clone();
                let origin = self.package(source)?.root.clone();
                let files = sync_copy(&origin, &dest, &[DESCRIPTOR_PATH])?;
                store.set_source(id, source, content_hash(&origin)?)?;
                info!("updated {id} from {source} ({files} files)");
                self.notify_recache_package(id);
                Ok(Outcome::SourceUpdated { files })
            }
            Action::RecordSourceHash { id, source } => {
                let store = self.user_data.as_ref().ok_or(CoreError::NoUserDataStore)?;
                self.package(id)?;
                let origin = self.package(source)?.root.clone();
                store.set_source(id, source, content_hash(&origin)?)?;
                info!("recorded current {source} as baseline for {id}");
                self.notify_recache_package(id);
                Ok(Outcome::SourceUpdated { files: 0 })
            }
            Action::RetryVersionCheck { id } => {
                let manifest = self
                    .manifest(id)
                    .ok_or_else(|| CoreError::PackageNotFound(id.to_string()))?;
                let Some(check) = manifest.version_check() else {
                    return Ok(Outcome::Nothing);
                };
                if !check.is_downloading() {
                    self.start_check(&manifest);
                    self.invalidate_version_check(&manifest);
                }
                Ok(Outcome::VersionCheckStarted)
            }
            Action::NoMatchingInstalled { .. } => Ok(Outcome::Nothing),
        }
    }

    fn package(&self, id: &PackageId) -> Result<&Package, CoreError> {
        self.catalog
            .get(id)
            .ok_or_else(|| CoreError::PackageNotFound(id.to_string()))
    }

    fn require_active(&self, id: &PackageId) -> Result<(), CoreError> {
        self.package(id)?;
        if self.catalog.is_active(id) {
            Ok(())
        } else {
            Err(CoreError::NotActive(id.to_string()))
        }
    }

    fn display_name(&self, id: &PackageId) -> String {
        self.catalog
            .get(id)
            .map_or_else(|| id.to_string(), |p| p.name.clone())
    }

    /// Apply finished version checks. Never blocks. Returns how many checks
    /// changed state.
    pub fn poll(&self) -> usize {
        self.fetches
            .poll()
            .into_iter()
            .filter(|outcome| self.apply_fetch(outcome))
            .count()
    }

    /// Block until running version checks finish or `timeout` elapses, then
    /// apply them. Checks still running at the deadline are marked failed.
    pub fn wait_for_version_checks(&self, timeout: Duration) -> usize {
        self.fetches
            .wait_idle(timeout)
            .into_iter()
            .filter(|outcome| self.apply_fetch(outcome))
            .count()
    }

    pub fn pending_version_checks(&self) -> usize {
        self.fetches.pending()
    }

    /// Apply one fetch result, unless the manifest it was started for has
    /// been discarded or its check has moved on.
    fn apply_fetch(&self, outcome: &FetchOutcome) -> bool {
        let id = PackageId::new(outcome.key.as_str());
        let current = self.manifests.borrow().get(&id).cloned();
        let Some(manifest) = current else {
            debug!("{id}: dropping version check result, manifest discarded");
            return false;
        };
        let Some(check) = manifest.version_check() else {
            return false;
        };
        if !check.is_downloading() {
            debug!("{id}: dropping version check result, check is {}", check.phase());
            return false;
        }
        if check.uri != outcome.url {
            debug!("{id}: dropping result for stale uri {}", outcome.url);
            self.fetches.request(id.as_str(), &check.uri);
            return false;
        }

        let applied = match &outcome.result {
            Ok(body) => check.complete(body),
            Err(e) => check.fail(e.to_string()),
        };
        if let Err(e) = applied {
            warn!("{id}: cannot apply version check result: {e}");
            return false;
        }
        debug!("{id}: version check {}", check.phase());
        self.invalidate_version_check(&manifest);
        true
    }

    fn invalidate_version_check(&self, manifest: &Manifest) {
        for r in manifest.requirements() {
            if r.as_version_check().is_some() {
                r.notify_recache();
            }
        }
        *self.issues.borrow_mut() = None;
    }

    /// Clear every memoized evaluation. Manifests stay cached.
    pub fn notify_recache(&self) {
        for manifest in self.manifests.borrow().values() {
            for r in manifest.requirements() {
                r.notify_recache();
            }
        }
        *self.issues.borrow_mut() = None;
    }

    /// Rebuild the manifest of `id` on next use and clear every memo. Use
    /// after the package's files or user data changed.
    pub fn notify_recache_package(&self, id: &PackageId) {
        self.manifests.borrow_mut().remove(id);
        self.notify_recache();
    }

    /// The active order changed.
    pub fn notify_mod_order_changed(&self) {
        for manifest in self.manifests.borrow().values() {
            for r in manifest.requirements() {
                r.notify_order_changed();
            }
        }
        *self.issues.borrow_mut() = None;
    }

    /// A batch of activations or deactivations was applied.
    pub fn notify_mod_list_applied(&self) {
        self.notify_mod_order_changed();
    }

    /// Packages were installed or removed. Manifests of removed packages
    /// are dropped, along with any manifest holding an unresolved target
    /// that a new package might now satisfy.
    pub fn notify_packages_changed(&self) {
        self.manifests.borrow_mut().retain(|id, manifest| {
            self.catalog.get(id).is_some()
                && !manifest
                    .requirements()
                    .iter()
                    .any(|r| r.target_id().is_invalid())
        });
        self.notify_recache();
    }
}

impl<C: Catalog> Context for Engine<C> {
    fn catalog(&self) -> &dyn Catalog {
        &self.catalog
    }

    /// The manifest's resolved version; zero counts as unknown.
    fn version_of(&self, id: &PackageId) -> Option<Version> {
        self.manifest(id)
            .map(|m| m.version)
            .filter(|v| !v.is_zero())
    }

    fn verbose(&self) -> bool {
        self.options.verbose
    }
}
