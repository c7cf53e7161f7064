use crate::CoreError;
use modorder_schema::{parse_manifest_str, Version};
use std::cell::RefCell;
use std::fmt;

/// Progress of a remote version check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckState {
    NotStarted,
    Downloading,
    Completed { remote: Version },
    Failed { error: String },
}

/// Data-free view of [`CheckState`] for transition checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckPhase {
    NotStarted,
    Downloading,
    Completed,
    Failed,
}

impl CheckState {
    pub fn phase(&self) -> CheckPhase {
        match self {
            CheckState::NotStarted => CheckPhase::NotStarted,
            CheckState::Downloading => CheckPhase::Downloading,
            CheckState::Completed { .. } => CheckPhase::Completed,
            CheckState::Failed { .. } => CheckPhase::Failed,
        }
    }
}

impl fmt::Display for CheckPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckPhase::NotStarted => write!(f, "not-started"),
            CheckPhase::Downloading => write!(f, "downloading"),
            CheckPhase::Completed => write!(f, "completed"),
            CheckPhase::Failed => write!(f, "failed"),
        }
    }
}

pub fn validate_transition(from: CheckPhase, to: CheckPhase) -> Result<(), CoreError> {
    let valid = matches!(
        (from, to),
        (
            CheckPhase::NotStarted | CheckPhase::Completed | CheckPhase::Failed,
            CheckPhase::Downloading
        ) | (
            CheckPhase::Downloading,
            CheckPhase::Completed | CheckPhase::Failed
        )
    );

    if valid {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

/// Comparison of the installed version against the one published at `uri`.
#[derive(Debug)]
pub struct VersionCheck {
    pub uri: String,
    pub download_uri: Option<String>,
    pub local: Version,
    state: RefCell<CheckState>,
}

impl VersionCheck {
    pub fn new(uri: impl Into<String>, download_uri: Option<String>, local: Version) -> Self {
        Self {
            uri: uri.into(),
            download_uri,
            local,
            state: RefCell::new(CheckState::NotStarted),
        }
    }

    pub fn state(&self) -> CheckState {
        self.state.borrow().clone()
    }

    pub fn phase(&self) -> CheckPhase {
        self.state.borrow().phase()
    }

    pub fn is_downloading(&self) -> bool {
        self.phase() == CheckPhase::Downloading
    }

    /// `Some(true)` when a newer version is published, `None` until the
    /// check has completed.
    pub fn is_outdated(&self) -> Option<bool> {
        match &*self.state.borrow() {
            CheckState::Completed { remote } => Some(*remote > self.local),
            _ => None,
        }
    }

    pub(crate) fn transition(&self, next: CheckState) -> Result<(), CoreError> {
        validate_transition(self.phase(), next.phase())?;
        *self.state.borrow_mut() = next;
        Ok(())
    }

    pub(crate) fn begin(&self) -> Result<(), CoreError> {
        self.transition(CheckState::Downloading)
    }

    /// Finish the check from a fetched remote manifest body.
    pub(crate) fn complete(&self, body: &[u8]) -> Result<(), CoreError> {
        let next = match remote_version(body) {
            Ok(remote) => CheckState::Completed { remote },
            Err(error) => CheckState::Failed { error },
        };
        self.transition(next)
    }

    pub(crate) fn fail(&self, error: impl Into<String>) -> Result<(), CoreError> {
        self.transition(CheckState::Failed {
            error: error.into(),
        })
    }
}

/// The published version, resolved the way local manifests are minus the
/// binary probe: the explicit `version` field, else zero.
fn remote_version(body: &[u8]) -> Result<Version, String> {
    let text = std::str::from_utf8(body).map_err(|e| format!("remote manifest is not UTF-8: {e}"))?;
    let file = parse_manifest_str(text).map_err(|e| e.to_string())?;
    Ok(Version::resolve(file.version.as_deref(), None))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_transitions() {
        assert!(validate_transition(CheckPhase::NotStarted, CheckPhase::Downloading).is_ok());
        assert!(validate_transition(CheckPhase::Downloading, CheckPhase::Completed).is_ok());
        assert!(validate_transition(CheckPhase::Downloading, CheckPhase::Failed).is_ok());
        assert!(validate_transition(CheckPhase::Failed, CheckPhase::Downloading).is_ok()); // retry
        assert!(validate_transition(CheckPhase::Completed, CheckPhase::Downloading).is_ok());
    }

    #[test]
    fn invalid_transitions() {
        assert!(validate_transition(CheckPhase::NotStarted, CheckPhase::Completed).is_err());
        assert!(validate_transition(CheckPhase::NotStarted, CheckPhase::Failed).is_err());
        assert!(validate_transition(CheckPhase::Downloading, CheckPhase::Downloading).is_err());
        assert!(validate_transition(CheckPhase::Completed, CheckPhase::Failed).is_err());
        assert!(validate_transition(CheckPhase::Failed, CheckPhase::NotStarted).is_err());
    }

    #[test]
    fn completes_with_remote_version() {
        let check = VersionCheck::new("https://x/m.toml", None, Version::new(1, 0, 0));
        check.begin().unwrap();
        check.complete(b"version = \"1.2.0\"\n").unwrap();
        assert_eq!(
            check.state(),
            CheckState::Completed {
                remote: Version::new(1, 2, 0)
            }
        );
        assert_eq!(check.is_outdated(), Some(true));
    }

    #[test]
    fn same_or_older_remote_is_current() {
        let check = VersionCheck::new("https://x/m.toml", None, Version::new(1, 2, 0));
        check.begin().unwrap();
        check.complete(b"version = \"1.2\"\n").unwrap();
        assert_eq!(check.is_outdated(), Some(false));
    }

    #[test]
    fn unparseable_remote_manifest_fails_the_check() {
        let check = VersionCheck::new("https://x/m.toml", None, Version::ZERO);
        check.begin().unwrap();
        check.complete(b"not = [valid").unwrap();
        assert_eq!(check.phase(), CheckPhase::Failed);
        assert_eq!(check.is_outdated(), None);
    }

    #[test]
    fn completion_without_download_is_rejected() {
        let check = VersionCheck::new("https://x/m.toml", None, Version::ZERO);
        assert!(matches!(
            check.complete(b"version = \"1.0.0\""),
            Err(CoreError::InvalidTransition { .. })
        ));
        assert_eq!(check.phase(), CheckPhase::NotStarted);
    }
}
