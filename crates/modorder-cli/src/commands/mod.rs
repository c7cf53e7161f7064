pub mod check;
pub mod fix;
pub mod hash;
pub mod list;
pub mod source;

use indicatif::{ProgressBar, ProgressStyle};
use modorder_core::{
    load_catalog, save_modlist, Catalog, Engine, EngineOptions, IssueGroup, ModListFile,
    Resolution, SEVERITY_CRITICAL, SEVERITY_MINOR, SEVERITY_NOTICE,
};
use modorder_remote::RemoteConfig;
use modorder_schema::PackageId;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_MANIFEST_ERROR: u8 = 2;
pub const EXIT_ISSUES: u8 = 3;

/// Paths and flags shared by every command.
#[derive(Debug, Clone)]
pub struct Session {
    pub mods: PathBuf,
    pub modlist: PathBuf,
    pub data: PathBuf,
    pub json: bool,
    pub developer: bool,
    pub offline: bool,
}

impl Session {
    pub fn engine(&self) -> Result<Engine, String> {
        if !self.mods.is_dir() {
            return Err(format!("mods directory not found: {}", self.mods.display()));
        }
        let catalog = load_catalog(&self.mods, &self.modlist).map_err(|e| e.to_string())?;
        let remote = RemoteConfig::load_default().unwrap_or_else(|e| {
            tracing::warn!("using default remote settings: {e}");
            RemoteConfig::default()
        });
        let options = EngineOptions {
            verbose: self.developer,
            check_versions: !self.offline,
            remote,
            data_dir: Some(self.data.clone()),
        };
        Ok(Engine::new(catalog, options))
    }

    pub fn save(&self, engine: &Engine) -> Result<(), String> {
        save_modlist(&self.modlist, &ModListFile::from(engine.catalog())).map_err(|e| e.to_string())
    }
}

/// Resolve a user-supplied id or name to an installed package.
pub fn find_package(engine: &Engine, input: &str) -> Result<PackageId, String> {
    let installed = engine.catalog().installed();
    if let Some(id) = PackageId::parse(input) {
        if installed.iter().any(|p| p.id == id) {
            return Ok(id);
        }
    }
    installed
        .iter()
        .find(|p| p.answers_to(input))
        .map(|p| p.id.clone())
        .ok_or_else(|| format!("no installed package matching '{input}'"))
}

pub fn json_pretty(value: &impl Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
        pb.set_style(style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]));
    }
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn spin_done(pb: &ProgressBar, ok: bool, msg: &str) {
    if let Ok(style) = ProgressStyle::with_template("{msg}") {
        pb.set_style(style);
    }
    let mark = if ok { "✓" } else { "✗" };
    pb.finish_with_message(format!("{mark} {msg}"));
}

/// Block on outstanding version checks, with a spinner on a terminal.
pub fn wait_for_checks(engine: &Engine, wait: Duration, quiet: bool) {
    let pending = engine.pending_version_checks();
    if pending == 0 {
        return;
    }
    if quiet {
        engine.wait_for_version_checks(wait);
        return;
    }
    let pb = spinner(&format!("checking {pending} packages for updates"));
    engine.wait_for_version_checks(wait);
    let left = engine.pending_version_checks();
    spin_done(&pb, left == 0, "version checks finished");
}

pub fn severity_label(severity: u8) -> &'static str {
    match severity {
        SEVERITY_CRITICAL => "critical",
        SEVERITY_MINOR => "minor",
        SEVERITY_NOTICE => "notice",
        _ => "ok",
    }
}

pub fn colorize_severity(severity: u8) -> String {
    use console::Style;
    let label = severity_label(severity);
    match severity {
        SEVERITY_CRITICAL => Style::new().red().bold().apply_to(label).to_string(),
        SEVERITY_MINOR => Style::new().yellow().apply_to(label).to_string(),
        SEVERITY_NOTICE => Style::new().cyan().apply_to(label).to_string(),
        _ => Style::new().green().apply_to(label).to_string(),
    }
}

#[derive(Debug, Serialize)]
pub struct IssueView {
    pub kind: &'static str,
    pub severity: u8,
    pub description: String,
    pub resolutions: Vec<Resolution>,
}

#[derive(Debug, Serialize)]
pub struct GroupView {
    pub id: String,
    pub name: String,
    pub severity: u8,
    pub issues: Vec<IssueView>,
}

pub fn group_view(engine: &Engine, group: &IssueGroup) -> GroupView {
    GroupView {
        id: group.owner.to_string(),
        name: group.name.clone(),
        severity: group.severity,
        issues: group
            .issues
            .iter()
            .map(|issue| IssueView {
                kind: issue.kind(),
                severity: issue.severity,
                description: issue.description.clone(),
                resolutions: issue.requirement.resolutions(engine),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_pretty_serializes_object() {
        let val = serde_json::json!({"key": "value"});
        let result = json_pretty(&val).unwrap();
        assert!(result.contains("\"key\""));
        assert!(result.contains("\"value\""));
    }

    #[test]
    fn severity_labels() {
        assert_eq!(severity_label(0), "ok");
        assert_eq!(severity_label(1), "notice");
        assert_eq!(severity_label(2), "minor");
        assert_eq!(severity_label(3), "critical");
    }

    #[test]
    fn colorized_severity_keeps_label() {
        for s in 0..=3 {
            assert!(colorize_severity(s).contains(severity_label(s)));
        }
    }

    #[test]
    fn find_package_by_id_or_name() {
        let dir = tempfile::tempdir().unwrap();
        let about = dir.path().join("mods/Hugs Lib/About");
        std::fs::create_dir_all(&about).unwrap();
        std::fs::write(
            about.join("Package.toml"),
            "id = \"unlimitedhugs.hugslib\"\nname = \"HugsLib\"\n",
        )
        .unwrap();
        let session = Session {
            mods: dir.path().join("mods"),
            modlist: dir.path().join("modlist.json"),
            data: dir.path().join("data"),
            json: false,
            developer: false,
            offline: true,
        };
        let engine = session.engine().unwrap();

        let expected = PackageId::new("unlimitedhugs.hugslib");
        assert_eq!(find_package(&engine, "UnlimitedHugs.HugsLib").unwrap(), expected);
        assert_eq!(find_package(&engine, "hugs lib").unwrap(), expected);
        assert!(find_package(&engine, "other.mod").is_err());
    }

    #[test]
    fn missing_mods_dir_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let session = Session {
            mods: dir.path().join("nope"),
            modlist: dir.path().join("modlist.json"),
            data: dir.path().join("data"),
            json: false,
            developer: false,
            offline: true,
        };
        match session.engine() {
            Err(msg) => assert!(msg.contains("not found"), "{msg}"),
            Ok(_) => panic!("engine opened without a mods directory"),
        }
    }
}
