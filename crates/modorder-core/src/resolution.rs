use modorder_schema::PackageId;
use serde::Serialize;
use std::fmt;

/// A remediation the engine can carry out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Activate `id`, placed at `at`'s position when given (else at the end),
    /// optionally deactivating `replace`.
    Activate {
        id: PackageId,
        at: Option<PackageId>,
        replace: Option<PackageId>,
    },
    Deactivate {
        id: PackageId,
    },
    MoveBefore {
        id: PackageId,
        anchor: PackageId,
    },
    MoveAfter {
        id: PackageId,
        anchor: PackageId,
    },
    MoveToFront {
        id: PackageId,
    },
    SearchWorkshop {
        query: String,
    },
    SearchForum {
        query: String,
    },
    OpenUrl {
        url: String,
    },
    /// Replace the local copy `id` with the current content of `source`.
    SyncFromSource {
        id: PackageId,
        source: PackageId,
    },
    /// Accept the current content of `source` as the new baseline for `id`.
    RecordSourceHash {
        id: PackageId,
        source: PackageId,
    },
    RetryVersionCheck {
        id: PackageId,
    },
    /// Nothing installed can satisfy the requirement.
    NoMatchingInstalled {
        query: String,
    },
}

impl Action {
    /// Whether applying this action does anything.
    pub fn is_actionable(&self) -> bool {
        !matches!(self, Action::NoMatchingInstalled { .. })
    }
}

/// A labelled remediation option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub label: String,
    #[serde(flatten)]
    pub action: Action,
}

impl Resolution {
    pub fn new(label: impl Into<String>, action: Action) -> Self {
        Self {
            label: label.into(),
            action,
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchSite {
    Workshop,
    Forum,
}

/// What applying an action did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// The active order changed.
    OrderChanged,
    /// A local copy or its recorded baseline changed.
    SourceUpdated { files: usize },
    VersionCheckStarted,
    /// The host should run a search; the engine does no browsing itself.
    Search { site: SearchSite, query: String },
    /// The host should open a URL.
    Open { url: String },
    Nothing,
}
