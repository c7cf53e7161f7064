use crate::range::{Range, RangeError};
use crate::types::PackageId;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Location of the manifest file relative to a package root.
pub const MANIFEST_PATH: &str = "About/Manifest.toml";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse manifest: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("empty requirement declaration")]
    EmptyDeclaration,
    #[error("invalid range in declaration '{declaration}': {source}")]
    InvalidRange {
        declaration: String,
        source: RangeError,
    },
}

/// Declarative per-package metadata, read from `About/Manifest.toml`.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ManifestFile {
    #[serde(default)]
    pub identifier: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub incompatible_with: Vec<String>,
    #[serde(default)]
    pub load_before: Vec<String>,
    #[serde(default)]
    pub load_after: Vec<String>,
    /// Location of the authoritative copy of this manifest, used to check
    /// whether a newer version has been published.
    #[serde(default)]
    pub manifest_uri: Option<String>,
    #[serde(default)]
    pub download_uri: Option<String>,
}

/// One requirement line: a package id token optionally followed by a range,
/// e.g. `author.lib >= 1.2`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    /// The target as written. May not satisfy the strict id grammar.
    pub id_token: String,
    pub range: Range,
}

pub fn parse_manifest_str(input: &str) -> Result<ManifestFile, ManifestError> {
    Ok(toml::from_str(input)?)
}

pub fn parse_manifest_file(path: impl AsRef<Path>) -> Result<ManifestFile, ManifestError> {
    let content = fs::read_to_string(path)?;
    parse_manifest_str(&content)
}

/// Split a declaration into its id token and range.
///
/// When the first whitespace-free run is a package id, everything after it
/// is the range, so `author.lib 1.0 - 2.0` and `author.lib 1.x || 3.x` keep
/// their full expression. Otherwise the token is a display name that may
/// contain spaces: the range starts at the first comparator character
/// (`<>=^~`) or, without one, is a trailing token that looks like a version,
/// so `Some Lib 1.2` means `1.2.x`. Parentheses around the range are ignored.
pub fn parse_declaration(input: &str) -> Result<Declaration, ManifestError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ManifestError::EmptyDeclaration);
    }

    let (id_part, range_part) = match trimmed.split_once(char::is_whitespace) {
        Some((head, tail)) if PackageId::parse(head).is_some() => (head, tail),
        _ => split_display_name(trimmed),
    };

    let id_token = id_part.trim().trim_end_matches('(').trim();
    if id_token.is_empty() {
        return Err(ManifestError::EmptyDeclaration);
    }
    let range_text = range_part
        .trim()
        .trim_start_matches('(')
        .trim_end_matches(')');
    let range = Range::parse(range_text).map_err(|source| ManifestError::InvalidRange {
        declaration: trimmed.to_owned(),
        source,
    })?;

    Ok(Declaration {
        id_token: id_token.to_owned(),
        range,
    })
}

fn split_display_name(trimmed: &str) -> (&str, &str) {
    match trimmed.find(['<', '>', '=', '^', '~']) {
        Some(at) => (&trimmed[..at], &trimmed[at..]),
        None => match trimmed.rsplit_once(char::is_whitespace) {
            Some((head, tail)) if looks_like_version(tail) => (head, tail),
            _ => (trimmed, ""),
        },
    }
}

fn looks_like_version(token: &str) -> bool {
    let token = token.trim_start_matches('(').trim_start_matches(['v', 'V']);
    token.starts_with(|c: char| c.is_ascii_digit())
        && token
            .trim_end_matches(')')
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '+' | '*'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_manifest() {
        let input = r#"
identifier = "author.mod"
version = "1.2.3"
dependencies = ["author.lib >= 1.0.0", "other.mod"]
incompatible_with = ["bad.mod < 2.0"]
load_before = ["x.y"]
load_after = ["a.b", "c.d"]
manifest_uri = "https://example.com/Manifest.toml"
download_uri = "https://example.com/download"
"#;
        let manifest = parse_manifest_str(input).expect("should parse");
        assert_eq!(manifest.identifier.as_deref(), Some("author.mod"));
        assert_eq!(manifest.version.as_deref(), Some("1.2.3"));
        assert_eq!(manifest.dependencies.len(), 2);
        assert_eq!(manifest.load_after.len(), 2);
        assert!(manifest.manifest_uri.is_some());
    }

    #[test]
    fn parses_empty_manifest() {
        let manifest = parse_manifest_str("").expect("should parse");
        assert_eq!(manifest, ManifestFile::default());
    }

    #[test]
    fn rejects_unknown_fields() {
        assert!(parse_manifest_str("unknown_field = true\n").is_err());
    }

    #[test]
    fn rejects_wrong_types() {
        assert!(parse_manifest_str("dependencies = \"a.b\"\n").is_err());
    }

    #[test]
    fn declaration_with_operator_range() {
        let decl = parse_declaration("mod.b >= 2.0.0").unwrap();
        assert_eq!(decl.id_token, "mod.b");
        assert!(decl.range.satisfied_by("2.0.0", false));
        assert!(!decl.range.satisfied_by("1.9.0", false));
    }

    #[test]
    fn declaration_without_range_matches_anything() {
        let decl = parse_declaration("  mod.b ").unwrap();
        assert_eq!(decl.id_token, "mod.b");
        assert!(decl.range.is_any());
    }

    #[test]
    fn declaration_with_bare_version() {
        let decl = parse_declaration("mod.b 1.2").unwrap();
        assert_eq!(decl.id_token, "mod.b");
        assert!(decl.range.satisfied_by("1.2.9", false));
        assert!(!decl.range.satisfied_by("1.3.0", false));
    }

    #[test]
    fn declaration_after_id_takes_whole_range() {
        let hyphen = parse_declaration("mod.b 1.0.0 - 2.0.0").unwrap();
        assert_eq!(hyphen.id_token, "mod.b");
        assert!(hyphen.range.satisfied_by("1.5.0", false));
        assert!(hyphen.range.satisfied_by("2.0.0", false));
        assert!(!hyphen.range.satisfied_by("2.0.1", false));

        let union = parse_declaration("mod.b 1.x || 3.x").unwrap();
        assert_eq!(union.id_token, "mod.b");
        assert!(union.range.satisfied_by("3.2.0", false));
        assert!(!union.range.satisfied_by("2.0.0", false));

        let star = parse_declaration("mod.b *").unwrap();
        assert_eq!(star.id_token, "mod.b");
        assert!(star.range.is_any());

        let pair = parse_declaration("mod.b 1.0 <2.0").unwrap();
        assert_eq!(pair.id_token, "mod.b");
        assert!(pair.range.satisfied_by("1.9.0", false));
        assert!(!pair.range.satisfied_by("2.0.0", false));

        let paren = parse_declaration("mod.b (>=1.1)").unwrap();
        assert_eq!(paren.id_token, "mod.b");
        assert!(paren.range.satisfied_by("1.1.0", false));
    }

    #[test]
    fn declaration_with_oversized_version_is_an_error() {
        assert!(matches!(
            parse_declaration("mod.b <=1.18446744073709551615"),
            Err(ManifestError::InvalidRange { .. })
        ));
    }

    #[test]
    fn declaration_keeps_display_names_with_spaces() {
        let decl = parse_declaration("Better Pawn Control (>=1.1)").unwrap();
        assert_eq!(decl.id_token, "Better Pawn Control");
        assert!(decl.range.satisfied_by("1.1.0", false));

        let plain = parse_declaration("Better Pawn Control").unwrap();
        assert_eq!(plain.id_token, "Better Pawn Control");
    }

    #[test]
    fn declaration_errors() {
        assert!(matches!(
            parse_declaration("   "),
            Err(ManifestError::EmptyDeclaration)
        ));
        assert!(matches!(
            parse_declaration(">= 1.0"),
            Err(ManifestError::EmptyDeclaration)
        ));
        assert!(matches!(
            parse_declaration("mod.b >= banana"),
            Err(ManifestError::InvalidRange { .. })
        ));
    }

    #[test]
    fn parse_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Manifest.toml");
        fs::write(&path, "version = \"0.4\"\n").unwrap();
        let manifest = parse_manifest_file(&path).unwrap();
        assert_eq!(manifest.version.as_deref(), Some("0.4"));
        assert!(parse_manifest_file(dir.path().join("missing.toml")).is_err());
    }
}
