//! Requirements and their evaluation against a catalog snapshot.
//!
//! A requirement is owned by one package and usually names one target. Its
//! satisfaction and resolved target are memoized; the memo is only cleared
//! by [`Requirement::notify_recache`], so callers must recache after every
//! catalog mutation. The engine does this for mutations it performs itself.

use crate::catalog::Catalog;
use crate::drift::content_hash;
use crate::resolution::{Action, Resolution};
use crate::version_check::{CheckState, VersionCheck};
use crate::{SEVERITY_CRITICAL, SEVERITY_MINOR, SEVERITY_NONE, SEVERITY_NOTICE};
use modorder_schema::{ContentHash, PackageId, Range, Version};
use std::cell::{Cell, RefCell};

/// What a requirement needs to see while it is evaluated.
pub trait Context {
    fn catalog(&self) -> &dyn Catalog;

    /// Resolved version of an installed package, `None` when unknown.
    fn version_of(&self, id: &PackageId) -> Option<Version>;

    /// Developer mode: failed version checks become critical.
    fn verbose(&self) -> bool;
}

/// Outcome of comparing a local copy against its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatus {
    InSync,
    Drifted,
    /// The local copy has no recorded baseline to compare against.
    Unrecorded,
    SourceMissing,
    HashFailed(String),
}

#[derive(Debug)]
pub enum Kind {
    /// Target must be active with a version in `range`.
    Dependency { range: Range },
    /// Target must not be active with a version in `range`.
    Incompatible { range: Range },
    LoadBefore,
    LoadAfter,
    /// Only core packages may precede the owner.
    LoadFirst,
    /// Target is the source package the owner was copied from.
    SourceSync {
        recorded: Option<ContentHash>,
        status: RefCell<Option<SyncStatus>>,
    },
    /// Target is the owner itself.
    VersionCheck(VersionCheck),
}

impl Kind {
    pub fn name(&self) -> &'static str {
        match self {
            Kind::Dependency { .. } => "dependency",
            Kind::Incompatible { .. } => "incompatible",
            Kind::LoadBefore => "load-before",
            Kind::LoadAfter => "load-after",
            Kind::LoadFirst => "load-first",
            Kind::SourceSync { .. } => "source-sync",
            Kind::VersionCheck(_) => "version-check",
        }
    }
}

#[derive(Debug)]
pub struct Requirement {
    owner: PackageId,
    target_id: PackageId,
    /// Target token as written in the declaration.
    declared: String,
    kind: Kind,
    satisfied: Cell<Option<bool>>,
    target: RefCell<Option<Option<PackageId>>>,
}

impl Requirement {
    pub fn new(
        owner: PackageId,
        target_id: PackageId,
        declared: impl Into<String>,
        kind: Kind,
    ) -> Self {
        Self {
            owner,
            target_id,
            declared: declared.into(),
            kind,
            satisfied: Cell::new(None),
            target: RefCell::new(None),
        }
    }

    pub fn load_first(owner: PackageId) -> Self {
        let declared = owner.to_string();
        Self::new(owner.clone(), owner, declared, Kind::LoadFirst)
    }

    pub fn source_sync(
        owner: PackageId,
        source: PackageId,
        recorded: Option<ContentHash>,
    ) -> Self {
        let declared = source.to_string();
        Self::new(
            owner,
            source,
            declared,
            Kind::SourceSync {
                recorded,
                status: RefCell::new(None),
            },
        )
    }

    pub fn version_check(owner: PackageId, check: VersionCheck) -> Self {
        let declared = check.uri.clone();
        Self::new(owner.clone(), owner, declared, Kind::VersionCheck(check))
    }

    pub fn owner(&self) -> &PackageId {
        &self.owner
    }

    /// The resolved target id, possibly the invalid sentinel.
    pub fn target_id(&self) -> &PackageId {
        &self.target_id
    }

    pub fn declared(&self) -> &str {
        &self.declared
    }

    pub fn kind(&self) -> &Kind {
        &self.kind
    }

    pub fn as_version_check(&self) -> Option<&VersionCheck> {
        match &self.kind {
            Kind::VersionCheck(check) => Some(check),
            _ => None,
        }
    }

    /// Clear memoized satisfaction and target.
    pub fn notify_recache(&self) {
        self.satisfied.set(None);
        *self.target.borrow_mut() = None;
        if let Kind::SourceSync { status, .. } = &self.kind {
            *status.borrow_mut() = None;
        }
    }

    /// Clear memos that depend on activation or order only. Cached source
    /// hashes survive.
    pub fn notify_order_changed(&self) {
        self.satisfied.set(None);
        *self.target.borrow_mut() = None;
    }

    /// The installed target package, if any. Memoized.
    pub fn target(&self, cx: &dyn Context) -> Option<PackageId> {
        if let Some(cached) = self.target.borrow().as_ref() {
            return cached.clone();
        }
        let resolved = if self.target_id.is_invalid() {
            None
        } else {
            cx.catalog().get(&self.target_id).map(|p| p.id.clone())
        };
        *self.target.borrow_mut() = Some(resolved.clone());
        resolved
    }

    /// Memoized satisfaction against the current catalog.
    pub fn is_satisfied(&self, cx: &dyn Context) -> bool {
        if let Some(cached) = self.satisfied.get() {
            return cached;
        }
        let value = self.check_satisfied(cx);
        self.satisfied.set(Some(value));
        value
    }

    fn check_satisfied(&self, cx: &dyn Context) -> bool {
        let catalog = cx.catalog();
        match &self.kind {
            Kind::Dependency { range } => self
                .target(cx)
                .is_some_and(|t| catalog.is_active(&t) && in_range(cx, &t, range, false)),
            Kind::Incompatible { range } => !self
                .target(cx)
                .is_some_and(|t| catalog.is_active(&t) && in_range(cx, &t, range, false)),
            Kind::LoadBefore => self.order(cx).is_some_and(|(own, tgt)| own < tgt),
            Kind::LoadAfter => self.order(cx).is_some_and(|(own, tgt)| own > tgt),
            Kind::LoadFirst => match catalog.position(&self.owner) {
                Some(at) => catalog.active_order()[..at]
                    .iter()
                    .all(|id| catalog.get(id).is_some_and(|p| p.is_core)),
                None => false,
            },
            Kind::SourceSync { .. } => self.sync_status(cx) == Some(SyncStatus::InSync),
            Kind::VersionCheck(check) => check.is_outdated() == Some(false),
        }
    }

    /// Positions of owner and target when both are active.
    fn order(&self, cx: &dyn Context) -> Option<(usize, usize)> {
        let target = self.target(cx)?;
        let catalog = cx.catalog();
        Some((catalog.position(&self.owner)?, catalog.position(&target)?))
    }

    /// Drift status for source sync requirements. Memoized with satisfaction.
    pub fn sync_status(&self, cx: &dyn Context) -> Option<SyncStatus> {
        let Kind::SourceSync { recorded, status } = &self.kind else {
            return None;
        };
        if let Some(cached) = status.borrow().as_ref() {
            return Some(cached.clone());
        }
        let computed = match cx.catalog().get(&self.target_id) {
            None => SyncStatus::SourceMissing,
            Some(source) => match content_hash(&source.root) {
                Err(e) => SyncStatus::HashFailed(e.to_string()),
                Ok(current) => match recorded {
                    None => SyncStatus::Unrecorded,
                    Some(r) if *r == current => SyncStatus::InSync,
                    Some(_) => SyncStatus::Drifted,
                },
            },
        };
        *status.borrow_mut() = Some(computed.clone());
        Some(computed)
    }

    /// Whether this requirement currently matters.
    pub fn is_applicable(&self, cx: &dyn Context) -> bool {
        let catalog = cx.catalog();
        match &self.kind {
            Kind::Dependency { .. } | Kind::Incompatible { .. } | Kind::LoadFirst => {
                catalog.is_active(&self.owner)
            }
            Kind::LoadBefore | Kind::LoadAfter => self.order(cx).is_some(),
            Kind::SourceSync { .. } | Kind::VersionCheck(_) => true,
        }
    }

    pub fn severity(&self, cx: &dyn Context) -> u8 {
        if !self.is_applicable(cx) || self.is_satisfied(cx) {
            return SEVERITY_NONE;
        }
        match &self.kind {
            Kind::Dependency { .. } => match self.target(cx) {
                Some(t) if cx.catalog().is_active(&t) => SEVERITY_MINOR,
                _ => SEVERITY_CRITICAL,
            },
            Kind::Incompatible { .. } | Kind::LoadBefore | Kind::LoadAfter | Kind::LoadFirst => {
                SEVERITY_CRITICAL
            }
            Kind::SourceSync { .. } => match self.sync_status(cx) {
                Some(SyncStatus::Drifted | SyncStatus::Unrecorded) => SEVERITY_MINOR,
                _ => SEVERITY_NOTICE,
            },
            Kind::VersionCheck(check) => match check.state() {
                CheckState::NotStarted | CheckState::Downloading => SEVERITY_NOTICE,
                CheckState::Completed { .. } => SEVERITY_MINOR,
                CheckState::Failed { .. } if cx.verbose() => SEVERITY_CRITICAL,
                CheckState::Failed { .. } => SEVERITY_NONE,
            },
        }
    }

    /// Human-readable explanation of the current state.
    pub fn description(&self, cx: &dyn Context) -> String {
        let target = display_name(cx, &self.target_id, &self.declared);
        let satisfied = self.is_satisfied(cx);
        match &self.kind {
            Kind::Dependency { range } => {
                let wanted = format!("{target}{}", range_suffix(range));
                if satisfied {
                    return format!("requires {wanted}: satisfied");
                }
                if self.target_id.is_invalid() {
                    return format!(
                        "requires '{}', which does not name an installed package",
                        self.declared
                    );
                }
                match self.target(cx) {
                    None => format!("requires {wanted}, which is not installed"),
                    Some(t) if !cx.catalog().is_active(&t) => {
                        format!("requires {wanted}, which is not active")
                    }
                    Some(t) => match cx.version_of(&t) {
                        Some(v) => format!("requires {wanted}, but version {v} is active"),
                        None => format!("requires {wanted}, but the active version is unknown"),
                    },
                }
            }
            Kind::Incompatible { range } => {
                let other = format!("{target}{}", range_suffix(range));
                if satisfied {
                    format!("incompatible with {other}: not active")
                } else {
                    format!("incompatible with {other}, which is active")
                }
            }
            Kind::LoadBefore => {
                if satisfied || !self.is_applicable(cx) {
                    format!("must load before {target}")
                } else {
                    format!("must load before {target}, but loads after it")
                }
            }
            Kind::LoadAfter => {
                if satisfied || !self.is_applicable(cx) {
                    format!("must load after {target}")
                } else {
                    format!("must load after {target}, but loads before it")
                }
            }
            Kind::LoadFirst => {
                if satisfied || !self.is_applicable(cx) {
                    "core package, must load first".to_owned()
                } else {
                    "core package, must load first, but other packages load before it".to_owned()
                }
            }
            Kind::SourceSync { .. } => match self.sync_status(cx) {
                Some(SyncStatus::InSync) | None => format!("local copy of {target} is up to date"),
                Some(SyncStatus::Drifted) => {
                    format!("local copy of {target} is out of date: source content has changed")
                }
                Some(SyncStatus::Unrecorded) => {
                    format!("local copy of {target} has no recorded source hash")
                }
                Some(SyncStatus::SourceMissing) => {
                    format!("source package {target} is not installed")
                }
                Some(SyncStatus::HashFailed(e)) => {
                    format!("cannot hash source package {target}: {e}")
                }
            },
            Kind::VersionCheck(check) => match check.state() {
                CheckState::NotStarted => "version check not started".to_owned(),
                CheckState::Downloading => format!("checking {} for updates", check.uri),
                CheckState::Completed { remote } if remote > check.local => {
                    format!("version {remote} is available (installed {})", check.local)
                }
                CheckState::Completed { .. } => format!("up to date ({})", check.local),
                CheckState::Failed { error } => format!("version check failed: {error}"),
            },
        }
    }

    /// Remediation options, most useful first. Empty when nothing is wrong.
    pub fn resolutions(&self, cx: &dyn Context) -> Vec<Resolution> {
        if !self.is_applicable(cx) || self.is_satisfied(cx) {
            return Vec::new();
        }
        let owner_name = display_name(cx, &self.owner, self.owner.as_str());
        let target_name = display_name(cx, &self.target_id, &self.declared);
        match &self.kind {
            Kind::Dependency { range } => self.dependency_resolutions(cx, range),
            Kind::Incompatible { .. } => vec![
                Resolution::new(
                    format!("Deactivate {owner_name}"),
                    Action::Deactivate {
                        id: self.owner.clone(),
                    },
                ),
                Resolution::new(
                    format!("Deactivate {target_name}"),
                    Action::Deactivate {
                        id: self.target_id.clone(),
                    },
                ),
            ],
            Kind::LoadBefore => vec![
                Resolution::new(
                    format!("Move {owner_name} before {target_name}"),
                    Action::MoveBefore {
                        id: self.owner.clone(),
                        anchor: self.target_id.clone(),
                    },
                ),
                Resolution::new(
                    format!("Move {target_name} after {owner_name}"),
                    Action::MoveAfter {
                        id: self.target_id.clone(),
                        anchor: self.owner.clone(),
                    },
                ),
            ],
            Kind::LoadAfter => vec![
                Resolution::new(
                    format!("Move {owner_name} after {target_name}"),
                    Action::MoveAfter {
                        id: self.owner.clone(),
                        anchor: self.target_id.clone(),
                    },
                ),
                Resolution::new(
                    format!("Move {target_name} before {owner_name}"),
                    Action::MoveBefore {
                        id: self.target_id.clone(),
                        anchor: self.owner.clone(),
                    },
                ),
            ],
            Kind::LoadFirst => vec![Resolution::new(
                format!("Move {owner_name} to the top"),
                Action::MoveToFront {
                    id: self.owner.clone(),
                },
            )],
            Kind::SourceSync { .. } => match self.sync_status(cx) {
                Some(SyncStatus::Drifted | SyncStatus::Unrecorded) => vec![
                    Resolution::new(
                        format!("Update local copy from {target_name}"),
                        Action::SyncFromSource {
                            id: self.owner.clone(),
                            source: self.target_id.clone(),
                        },
                    ),
                    Resolution::new(
                        format!("Accept current {target_name} as baseline"),
                        Action::RecordSourceHash {
                            id: self.owner.clone(),
                            source: self.target_id.clone(),
                        },
                    ),
                ],
                Some(SyncStatus::SourceMissing) => vec![Resolution::new(
                    format!("Search the workshop for {target_name}"),
                    Action::SearchWorkshop {
                        query: self.declared.clone(),
                    },
                )],
                _ => Vec::new(),
            },
            Kind::VersionCheck(check) => match check.state() {
                CheckState::Failed { .. } => vec![Resolution::new(
                    "Retry version check",
                    Action::RetryVersionCheck {
                        id: self.owner.clone(),
                    },
                )],
                CheckState::Completed { remote } => check
                    .download_uri
                    .iter()
                    .map(|url| {
                        Resolution::new(
                            format!("Download version {remote}"),
                            Action::OpenUrl { url: url.clone() },
                        )
                    })
                    .collect(),
                CheckState::NotStarted | CheckState::Downloading => Vec::new(),
            },
        }
    }

    fn dependency_resolutions(&self, cx: &dyn Context, range: &Range) -> Vec<Resolution> {
        let catalog = cx.catalog();
        let query = if self.target_id.is_invalid() {
            self.declared.clone()
        } else {
            self.target_id.to_string()
        };
        let replacing = self.target(cx).filter(|t| catalog.is_active(t));

        let mut out: Vec<Resolution> = catalog
            .find_candidates(&query)
            .into_iter()
            .filter(|p| in_range(cx, &p.id, range, true))
            .map(|p| match &replacing {
                Some(current) => Resolution::new(
                    format!("Replace {current} with {}", p.name),
                    Action::Activate {
                        id: p.id.clone(),
                        at: Some(current.clone()),
                        replace: Some(current.clone()),
                    },
                ),
                None => Resolution::new(
                    format!("Activate {}", p.name),
                    Action::Activate {
                        id: p.id.clone(),
                        at: Some(self.owner.clone()),
                        replace: None,
                    },
                ),
            })
            .collect();

        if out.is_empty() {
            out.push(Resolution::new(
                format!("No installed package satisfies {query}{}", range_suffix(range)),
                Action::NoMatchingInstalled {
                    query: query.clone(),
                },
            ));
        }
        out.push(Resolution::new(
            format!("Search the workshop for {query}"),
            Action::SearchWorkshop {
                query: query.clone(),
            },
        ));
        out.push(Resolution::new(
            format!("Search the forum for {query}"),
            Action::SearchForum { query },
        ));
        out
    }
}

/// Whether `id`'s version falls in `range`. An unknown version only passes
/// when `unknown_passes` is set, which is reserved for candidate searches.
fn in_range(cx: &dyn Context, id: &PackageId, range: &Range, unknown_passes: bool) -> bool {
    if range.is_any() {
        return true;
    }
    match cx.version_of(id) {
        Some(v) => range.matches(&v),
        None => unknown_passes,
    }
}

fn range_suffix(range: &Range) -> String {
    if range.is_any() {
        String::new()
    } else {
        format!(" {range}")
    }
}

fn display_name(cx: &dyn Context, id: &PackageId, fallback: &str) -> String {
    cx.catalog()
        .get(id)
        .map_or_else(|| fallback.to_owned(), |p| p.name.clone())
}
