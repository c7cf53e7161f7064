use crate::catalog::{Catalog, Package};
use crate::requirement::{Kind, Requirement};
use crate::version_check::VersionCheck;
use modorder_schema::{
    parse_declaration, parse_manifest_file, probe_file_version, strip_name, Declaration,
    ManifestFile, PackageId, Range, UserData, Version, MANIFEST_PATH,
};
use std::fs;
use std::path::Path;
use std::rc::Rc;
use tracing::{debug, warn};

/// Directory scanned for bundled binaries when no version is declared.
const ASSEMBLIES_DIR: &str = "Assemblies";

/// Requirements and resolved version of one package.
#[derive(Debug)]
pub struct Manifest {
    pub id: PackageId,
    pub version: Version,
    pub download_uri: Option<String>,
    requirements: Vec<Rc<Requirement>>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Category {
    Dependency,
    Incompatible,
    LoadBefore,
    LoadAfter,
}

impl Manifest {
    pub fn requirements(&self) -> &[Rc<Requirement>] {
        &self.requirements
    }

    pub fn version_check(&self) -> Option<&VersionCheck> {
        self.requirements.iter().find_map(|r| r.as_version_check())
    }

    /// Build the manifest for `package`. Never fails: an unreadable manifest
    /// file is logged and treated as empty.
    pub fn build(
        package: &Package,
        catalog: &dyn Catalog,
        user_data: Option<&UserData>,
        check_versions: bool,
    ) -> Self {
        let file = load_manifest_file(&package.root);
        let owner = package.id.clone();
        if let Some(declared) = file.identifier.as_deref() {
            if PackageId::parse(declared).as_ref() != Some(&owner) {
                debug!("{owner}: manifest identifier '{declared}' differs from package id");
            }
        }

        let mut requirements: Vec<Requirement> = Vec::new();
        let categories = [
            (Category::Dependency, &file.dependencies, &package.legacy.dependencies),
            (
                Category::Incompatible,
                &file.incompatible_with,
                &package.legacy.incompatible_with,
            ),
            (Category::LoadBefore, &file.load_before, &package.legacy.load_before),
            (Category::LoadAfter, &file.load_after, &package.legacy.load_after),
        ];
        for (category, declared, legacy) in categories {
            let mut seen: Vec<PackageId> = Vec::new();
            for line in declared {
                if let Some(req) = declaration(&owner, line, category, catalog) {
                    seen.push(req.target_id().clone());
                    requirements.push(req);
                }
            }
            for token in legacy {
                let Some(req) = legacy_declaration(&owner, token, category, catalog) else {
                    continue;
                };
                if !req.target_id().is_invalid() && seen.contains(req.target_id()) {
                    debug!("{owner}: legacy {token} already declared in manifest");
                    continue;
                }
                seen.push(req.target_id().clone());
                requirements.push(req);
            }
        }

        if let Some(data) = user_data {
            if let Some(source) = &data.source {
                requirements.push(Requirement::source_sync(
                    owner.clone(),
                    source.clone(),
                    data.source_hash.clone(),
                ));
            }
        }

        if package.is_core {
            requirements.push(Requirement::load_first(owner.clone()));
        }

        let probed = probe_assemblies(&package.root).or(package.version);
        let version = Version::resolve(file.version.as_deref(), probed);

        if let Some(uri) = file.manifest_uri.as_deref().filter(|_| check_versions) {
            requirements.push(Requirement::version_check(
                owner.clone(),
                VersionCheck::new(uri, file.download_uri.clone(), version),
            ));
        }

        debug!(
            "{owner}: built manifest with {} requirements, version {version}",
            requirements.len()
        );
        Self {
            id: owner,
            version,
            download_uri: file.download_uri,
            requirements: requirements.into_iter().map(Rc::new).collect(),
        }
    }
}

fn load_manifest_file(root: &Path) -> ManifestFile {
    let path = root.join(MANIFEST_PATH);
    if !path.exists() {
        return ManifestFile::default();
    }
    match parse_manifest_file(&path) {
        Ok(file) => file,
        Err(e) => {
            warn!("ignoring {}: {e}", path.display());
            ManifestFile::default()
        }
    }
}

fn declaration(
    owner: &PackageId,
    line: &str,
    category: Category,
    catalog: &dyn Catalog,
) -> Option<Requirement> {
    let Declaration { id_token, range } = match parse_declaration(line) {
        Ok(d) => d,
        Err(e) => {
            warn!("{owner}: skipping declaration '{line}': {e}");
            return None;
        }
    };
    requirement(owner, id_token, range, category, catalog)
}

/// Host-supplied entries are a bare id or display name, never a range.
fn legacy_declaration(
    owner: &PackageId,
    token: &str,
    category: Category,
    catalog: &dyn Catalog,
) -> Option<Requirement> {
    let token = token.trim();
    if token.is_empty() {
        return None;
    }
    requirement(owner, token.to_owned(), Range::any(), category, catalog)
}

fn requirement(
    owner: &PackageId,
    id_token: String,
    range: Range,
    category: Category,
    catalog: &dyn Catalog,
) -> Option<Requirement> {
    let target = resolve_token(&id_token, catalog);
    if &target == owner {
        debug!("{owner}: ignoring declaration on itself");
        return None;
    }
    let kind = match category {
        Category::Dependency => Kind::Dependency { range },
        Category::Incompatible => Kind::Incompatible { range },
        Category::LoadBefore => Kind::LoadBefore,
        Category::LoadAfter => Kind::LoadAfter,
    };
    Some(Requirement::new(owner.clone(), target, id_token, kind))
}

/// Map a declared token to a package id.
///
/// Tokens that fit the id grammar are taken as-is, installed or not. Others
/// are matched against installed folder and display names with whitespace
/// removed; the first match wins, so two packages sharing a stripped name
/// are indistinguishable here. No match yields the invalid sentinel.
pub fn resolve_token(token: &str, catalog: &dyn Catalog) -> PackageId {
    if let Some(id) = PackageId::parse(token) {
        return id;
    }
    let stripped = strip_name(token);
    let found = catalog
        .installed()
        .iter()
        .find(|p| strip_name(&p.folder) == stripped || strip_name(&p.name) == stripped);
    match found {
        Some(p) => {
            debug!("resolved '{token}' to {} by name", p.id);
            p.id.clone()
        }
        None => {
            warn!("'{token}' does not name an installed package");
            PackageId::invalid()
        }
    }
}

/// File version of the first bundled binary that carries one.
fn probe_assemblies(root: &Path) -> Option<Version> {
    let entries = fs::read_dir(root.join(ASSEMBLIES_DIR)).ok()?;
    let mut dlls: Vec<_> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| {
            p.extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("dll"))
        })
        .collect();
    dlls.sort();
    dlls.iter().find_map(|p| {
        let bytes = fs::read(p).ok()?;
        probe_file_version(&bytes)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ModList;
    use modorder_schema::ContentHash;

    fn package_with_manifest(dir: &Path, id: &str, manifest: Option<&str>) -> Package {
        let root = dir.join(id);
        fs::create_dir_all(root.join("About")).unwrap();
        if let Some(content) = manifest {
            fs::write(root.join(MANIFEST_PATH), content).unwrap();
        }
        Package::new(id, root)
    }

    fn kinds(m: &Manifest) -> Vec<(&'static str, String)> {
        m.requirements()
            .iter()
            .map(|r| (r.kind().name(), r.target_id().to_string()))
            .collect()
    }

    #[test]
    fn builds_requirements_from_manifest_file() {
        let dir = tempfile::tempdir().unwrap();
        let pkg = package_with_manifest(
            dir.path(),
            "mod.a",
            Some(
                r#"
version = "1.4"
dependencies = ["mod.b >= 2.0.0"]
incompatible_with = ["mod.c"]
load_before = ["mod.d"]
load_after = ["mod.e"]
"#,
            ),
        );
        let catalog = ModList::new(vec![pkg.clone()]);
        let m = Manifest::build(&pkg, &catalog, None, true);

        assert_eq!(m.version, Version::new(1, 4, 0));
        assert_eq!(
            kinds(&m),
            vec![
                ("dependency", "mod.b".to_owned()),
                ("incompatible", "mod.c".to_owned()),
                ("load-before", "mod.d".to_owned()),
                ("load-after", "mod.e".to_owned()),
            ]
        );
        assert!(m.requirements().iter().all(|r| r.owner() == "mod.a"));
    }

    #[test]
    fn malformed_manifest_falls_back_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let pkg = package_with_manifest(dir.path(), "mod.a", Some("dependencies = 12\n"));
        let catalog = ModList::new(vec![pkg.clone()]);
        let m = Manifest::build(&pkg, &catalog, None, true);
        assert!(m.requirements().is_empty());
        assert_eq!(m.version, Version::ZERO);
    }

    #[test]
    fn legacy_declarations_do_not_duplicate_manifest_ones() {
        let dir = tempfile::tempdir().unwrap();
        let mut pkg = package_with_manifest(
            dir.path(),
            "mod.a",
            Some("load_after = [\"mod.core\"]\nincompatible_with = [\"mod.x\"]\n"),
        );
        pkg.legacy.load_after = vec!["Mod.Core".to_owned(), "mod.extra".to_owned()];
        pkg.legacy.incompatible_with = vec!["mod.x".to_owned()];
        pkg.legacy.load_before = vec!["mod.x".to_owned()];
        let catalog = ModList::new(vec![pkg.clone()]);

        let m = Manifest::build(&pkg, &catalog, None, true);
        assert_eq!(
            kinds(&m),
            vec![
                ("incompatible", "mod.x".to_owned()),
                ("load-before", "mod.x".to_owned()),
                ("load-after", "mod.core".to_owned()),
                ("load-after", "mod.extra".to_owned()),
            ]
        );
    }

    #[test]
    fn fuzzy_tokens_resolve_by_folder_or_display_name() {
        let dir = tempfile::tempdir().unwrap();
        let pkg = package_with_manifest(
            dir.path(),
            "mod.a",
            Some(r#"dependencies = ["Better Pawn Control", "HugsLib", "Nothing Like This"]"#),
        );
        let catalog = ModList::new(vec![
            pkg.clone(),
            Package::new("author.pawns", dir.path().join("bpc")).with_name("Better Pawn Control"),
            Package::new("unlimitedhugs.hugslib", dir.path().join("HugsLib"))
                .with_folder("HugsLib"),
        ]);

        let m = Manifest::build(&pkg, &catalog, None, true);
        let targets: Vec<String> = m
            .requirements()
            .iter()
            .map(|r| r.target_id().to_string())
            .collect();
        assert_eq!(
            targets,
            ["author.pawns", "unlimitedhugs.hugslib", "invalid.package.id"]
        );
        assert_eq!(m.requirements()[2].declared(), "Nothing Like This");
    }

    #[test]
    fn legacy_tokens_are_whole_names_with_any_range() {
        let dir = tempfile::tempdir().unwrap();
        let mut pkg = package_with_manifest(dir.path(), "mod.a", None);
        pkg.legacy.dependencies = vec!["Combat Extended 2".to_owned()];
        let catalog = ModList::new(vec![
            pkg.clone(),
            Package::new("author.ce", dir.path().join("ce")).with_name("Combat Extended 2"),
        ]);

        let m = Manifest::build(&pkg, &catalog, None, true);
        let req = &m.requirements()[0];
        assert_eq!(req.target_id(), "author.ce");
        assert_eq!(req.declared(), "Combat Extended 2");
        assert!(matches!(req.kind(), Kind::Dependency { range } if range.is_any()));
    }

    #[test]
    fn self_references_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let pkg = package_with_manifest(dir.path(), "mod.a", Some("load_after = [\"mod.a\"]\n"));
        let catalog = ModList::new(vec![pkg.clone()]);
        assert!(Manifest::build(&pkg, &catalog, None, true)
            .requirements()
            .is_empty());
    }

    #[test]
    fn source_mapping_synthesizes_source_sync() {
        let dir = tempfile::tempdir().unwrap();
        let pkg = package_with_manifest(dir.path(), "mod.copy", None);
        let catalog = ModList::new(vec![pkg.clone()]);
        let data = UserData {
            source: Some(PackageId::new("mod.src")),
            source_hash: Some(ContentHash::new("abc")),
            ..Default::default()
        };
        let m = Manifest::build(&pkg, &catalog, Some(&data), true);
        assert_eq!(kinds(&m), vec![("source-sync", "mod.src".to_owned())]);
    }

    #[test]
    fn core_packages_get_load_first() {
        let dir = tempfile::tempdir().unwrap();
        let pkg = package_with_manifest(dir.path(), "game.core", None).core();
        let catalog = ModList::new(vec![pkg.clone()]);
        let m = Manifest::build(&pkg, &catalog, None, true);
        assert_eq!(kinds(&m), vec![("load-first", "game.core".to_owned())]);
    }

    #[test]
    fn version_check_only_when_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let pkg = package_with_manifest(
            dir.path(),
            "mod.a",
            Some("version = \"1.0.0\"\nmanifest_uri = \"https://example.com/m.toml\"\n"),
        );
        let catalog = ModList::new(vec![pkg.clone()]);

        let m = Manifest::build(&pkg, &catalog, None, true);
        let check = m.version_check().unwrap();
        assert_eq!(check.uri, "https://example.com/m.toml");
        assert_eq!(check.local, Version::new(1, 0, 0));

        assert!(Manifest::build(&pkg, &catalog, None, false)
            .version_check()
            .is_none());
    }

    fn fixed_info_dll(major: u32, minor: u32, patch: u32) -> Vec<u8> {
        let mut blob = b"MZ".to_vec();
        blob.extend_from_slice(&[0u8; 30]);
        blob.extend_from_slice(&0xFEEF_04BDu32.to_le_bytes());
        blob.extend_from_slice(&0x0001_0000u32.to_le_bytes());
        blob.extend_from_slice(&((major << 16) | minor).to_le_bytes());
        blob.extend_from_slice(&(patch << 16).to_le_bytes());
        blob.extend_from_slice(&[0u8; 32]);
        blob
    }

    #[test]
    fn version_tiers_explicit_then_binary_then_host_then_zero() {
        let dir = tempfile::tempdir().unwrap();

        let explicit = package_with_manifest(dir.path(), "v.explicit", Some("version = \"3.0\""));
        fs::create_dir_all(explicit.root.join(ASSEMBLIES_DIR)).unwrap();
        fs::write(
            explicit.root.join(ASSEMBLIES_DIR).join("Mod.dll"),
            fixed_info_dll(9, 9, 9),
        )
        .unwrap();

        let binary = package_with_manifest(dir.path(), "v.binary", None)
            .with_version(Version::new(5, 0, 0));
        fs::create_dir_all(binary.root.join(ASSEMBLIES_DIR)).unwrap();
        fs::write(
            binary.root.join(ASSEMBLIES_DIR).join("Mod.DLL"),
            fixed_info_dll(2, 1, 7),
        )
        .unwrap();

        let host = package_with_manifest(dir.path(), "v.host", None)
            .with_version(Version::new(5, 0, 0));
        let zero = package_with_manifest(dir.path(), "v.zero", None);

        let catalog = ModList::new(vec![
            explicit.clone(),
            binary.clone(),
            host.clone(),
            zero.clone(),
        ]);
        let version = |p: &Package| Manifest::build(p, &catalog, None, true).version;
        assert_eq!(version(&explicit), Version::new(3, 0, 0));
        assert_eq!(version(&binary), Version::new(2, 1, 7));
        assert_eq!(version(&host), Version::new(5, 0, 0));
        assert_eq!(version(&zero), Version::ZERO);
    }
}
