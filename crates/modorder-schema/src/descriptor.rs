use crate::manifest::ManifestError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Location of the host package descriptor relative to a package root.
pub const DESCRIPTOR_PATH: &str = "About/Package.toml";

/// Host-side description of an installed package.
///
/// This is the simple metadata every package carries. The `load_before`,
/// `load_after`, `incompatible_with` and `dependencies` lists are the older
/// single-field requirement format; they are merged into the richer manifest
/// when that does not already declare the same target.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PackageDescriptor {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    /// Core packages must load before everything else.
    #[serde(default)]
    pub core: bool,
    #[serde(default)]
    pub load_before: Vec<String>,
    #[serde(default)]
    pub load_after: Vec<String>,
    #[serde(default)]
    pub incompatible_with: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

pub fn parse_descriptor_str(input: &str) -> Result<PackageDescriptor, ManifestError> {
    Ok(toml::from_str(input)?)
}

pub fn parse_descriptor_file(path: impl AsRef<Path>) -> Result<PackageDescriptor, ManifestError> {
    let content = fs::read_to_string(path)?;
    parse_descriptor_str(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_descriptor_with_legacy_lists() {
        let input = r#"
id = "Author.Mod"
name = "Some Mod"
version = "1.0"
load_after = ["core.base"]
incompatible_with = ["other.mod"]
"#;
        let d = parse_descriptor_str(input).unwrap();
        assert_eq!(d.id, "Author.Mod");
        assert_eq!(d.name.as_deref(), Some("Some Mod"));
        assert!(!d.core);
        assert_eq!(d.load_after, vec!["core.base".to_owned()]);
        assert!(d.load_before.is_empty());
    }

    #[test]
    fn requires_id() {
        assert!(parse_descriptor_str("name = \"x\"\n").is_err());
    }

    #[test]
    fn core_flag() {
        let d = parse_descriptor_str("id = \"core.base\"\ncore = true\n").unwrap();
        assert!(d.core);
    }
}
