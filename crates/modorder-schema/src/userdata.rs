use crate::types::{ContentHash, PackageId};
use serde::{Deserialize, Serialize};

/// Per-user, per-package preferences.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserData {
    /// Display color tag chosen by the user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Package this one is a local copy of.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<PackageId>,
    /// Content hash of `source` at the time the local copy was made.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_hash: Option<ContentHash>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    /// blake3 checksum for integrity verification. `None` for hand-written files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

impl UserData {
    /// Compute the checksum over the record content (excluding the checksum field itself).
    pub fn compute_checksum(&self) -> Result<String, serde_json::Error> {
        let mut copy = self.clone();
        copy.checksum = None;
        let json = serde_json::to_string_pretty(&copy)?;
        Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
    }

    pub fn is_empty(&self) -> bool {
        self.color.is_none() && self.source.is_none() && self.source_hash.is_none()
    }
}
