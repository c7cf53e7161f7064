//! CLI subprocess integration tests.
//!
//! These tests invoke the `modorder` binary as a subprocess against a
//! temporary mods directory and verify exit codes, stdout content, and the
//! saved active order.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

struct Workspace {
    dir: tempfile::TempDir,
}

impl Workspace {
    fn new() -> Self {
        let ws = Self {
            dir: tempfile::tempdir().unwrap(),
        };
        fs::create_dir_all(ws.mods()).unwrap();
        ws
    }

    fn mods(&self) -> PathBuf {
        self.dir.path().join("mods")
    }

    fn modlist(&self) -> PathBuf {
        self.dir.path().join("modlist.json")
    }

    fn package(&self, folder: &str, descriptor: &str, manifest: Option<&str>) -> PathBuf {
        let root = self.mods().join(folder);
        fs::create_dir_all(root.join("About")).unwrap();
        fs::write(root.join("About/Package.toml"), descriptor).unwrap();
        if let Some(m) = manifest {
            fs::write(root.join("About/Manifest.toml"), m).unwrap();
        }
        root
    }

    fn activate(&self, ids: &[&str]) {
        let json = serde_json::json!({ "active": ids });
        fs::write(self.modlist(), json.to_string()).unwrap();
    }

    fn active(&self) -> Vec<String> {
        let text = fs::read_to_string(self.modlist()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        value["active"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap().to_owned())
            .collect()
    }

    fn run(&self, args: &[&str]) -> Output {
        modorder_bin()
            .arg("--mods")
            .arg(self.mods())
            .arg("--modlist")
            .arg(self.modlist())
            .arg("--data")
            .arg(self.dir.path().join("data"))
            .arg("--offline")
            .args(args)
            .output()
            .unwrap()
    }
}

fn modorder_bin() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_modorder"));
    cmd.env_remove("MODORDER_LOG");
    cmd
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn write_file(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

#[test]
fn cli_version_exits_zero() {
    let output = modorder_bin().arg("--version").output().unwrap();
    assert!(output.status.success());
    assert!(stdout(&output).contains("modorder"));
}

#[test]
fn cli_help_lists_commands() {
    let output = modorder_bin().arg("--help").output().unwrap();
    assert!(output.status.success());
    let out = stdout(&output);
    for cmd in ["list", "check", "fix", "hash", "source", "completions"] {
        assert!(out.contains(cmd), "help must list '{cmd}': {out}");
    }
}

#[test]
fn cli_completions_bash() {
    let output = modorder_bin().args(["completions", "bash"]).output().unwrap();
    assert!(output.status.success());
    assert!(stdout(&output).contains("modorder"));
}

#[test]
fn cli_missing_mods_dir_fails() {
    let dir = tempfile::tempdir().unwrap();
    let output = modorder_bin()
        .arg("--mods")
        .arg(dir.path().join("absent"))
        .args(["--offline", "check"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("error:"));
}

#[test]
fn cli_check_clean_list_exits_zero() {
    let ws = Workspace::new();
    ws.package("A", "id = \"mod.a\"\n", Some("load_after = [\"mod.b\"]\n"));
    ws.package("B", "id = \"mod.b\"\n", None);
    ws.activate(&["mod.b", "mod.a"]);

    let output = ws.run(&["check"]);
    assert_eq!(output.status.code(), Some(0), "{}", stdout(&output));
    assert!(stdout(&output).contains("no problems found"));
}

#[test]
fn cli_check_json_reports_missing_dependency() {
    let ws = Workspace::new();
    ws.package(
        "A",
        "id = \"mod.a\"\nname = \"Mod A\"\n",
        Some("dependencies = [\"mod.b >= 2.0.0\"]\n"),
    );
    ws.package("B", "id = \"mod.b\"\nversion = \"1.9.0\"\n", None);
    ws.activate(&["mod.a"]);

    let output = ws.run(&["--json", "check"]);
    assert_eq!(output.status.code(), Some(3));
    let groups: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    let group = &groups[0];
    assert_eq!(group["id"], "mod.a");
    assert_eq!(group["name"], "Mod A");
    assert_eq!(group["severity"], 3);
    let issue = &group["issues"][0];
    assert_eq!(issue["kind"], "dependency");
    let actions: Vec<&str> = issue["resolutions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["action"].as_str().unwrap())
        .collect();
    assert_eq!(actions, ["no_matching_installed", "search_workshop", "search_forum"]);
}

#[test]
fn cli_fail_on_lowers_threshold() {
    let ws = Workspace::new();
    let origin = ws.package("Origin", "id = \"orig.mod\"\n", None);
    write_file(&origin, "Defs/a.xml", "<a/>");
    let copy = ws.package("Copy", "id = \"copy.mod\"\n", None);
    write_file(&copy, "Defs/a.xml", "<a/>");
    ws.activate(&["copy.mod"]);
    assert!(ws.run(&["source", "set", "copy.mod", "orig.mod"]).status.success());

    write_file(&origin, "Defs/a.xml", "<b/>");
    assert_eq!(ws.run(&["check"]).status.code(), Some(0));
    assert_eq!(ws.run(&["check", "--fail-on", "2"]).status.code(), Some(3));
}

#[test]
fn cli_fix_reorders_and_saves() {
    let ws = Workspace::new();
    ws.package("Core", "id = \"game.core\"\ncore = true\n", None);
    ws.package("A", "id = \"mod.a\"\nload_after = [\"mod.b\"]\n", None);
    ws.package("B", "id = \"mod.b\"\n", None);
    ws.activate(&["mod.a", "mod.b", "game.core"]);

    let dry = ws.run(&["fix", "--dry-run"]);
    assert_eq!(dry.status.code(), Some(0));
    assert!(stdout(&dry).contains("would apply"));
    assert_eq!(ws.active(), ["mod.a", "mod.b", "game.core"]);

    let output = ws.run(&["fix"]);
    assert_eq!(output.status.code(), Some(0), "{}", stdout(&output));
    assert_eq!(ws.active(), ["game.core", "mod.b", "mod.a"]);
    assert!(ws.run(&["check"]).status.success());
}

#[test]
fn cli_fix_leaves_unfixable_issues() {
    let ws = Workspace::new();
    ws.package("A", "id = \"mod.a\"\n", Some("dependencies = [\"mod.missing\"]\n"));
    ws.activate(&["mod.a"]);

    let output = ws.run(&["--json", "fix"]);
    assert_eq!(output.status.code(), Some(3));
    let report: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(report["remaining"], 1);
    assert_eq!(report["saved"], false);
    assert!(report["applied"].as_array().unwrap().is_empty());
}

#[test]
fn cli_list_json_orders_active_first() {
    let ws = Workspace::new();
    ws.package("Zed", "id = \"mod.z\"\nname = \"Zed\"\nversion = \"1.2\"\n", None);
    ws.package("Alpha", "id = \"mod.alpha\"\nname = \"Alpha\"\n", None);
    ws.activate(&["mod.z"]);

    let output = ws.run(&["--json", "list"]);
    assert!(output.status.success());
    let rows: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(rows[0]["id"], "mod.z");
    assert_eq!(rows[0]["position"], 0);
    assert_eq!(rows[0]["version"], "1.2.0");
    assert_eq!(rows[1]["id"], "mod.alpha");
    assert!(rows[1]["position"].is_null());

    let active = ws.run(&["--json", "list", "--active"]);
    let rows: serde_json::Value = serde_json::from_str(&stdout(&active)).unwrap();
    assert_eq!(rows.as_array().unwrap().len(), 1);
}

#[test]
fn cli_hash_is_stable() {
    let ws = Workspace::new();
    let root = ws.package("A", "id = \"mod.a\"\n", None);
    write_file(&root, "Defs/x.xml", "<x/>");

    let first = stdout(&ws.run(&["hash", "mod.a"]));
    let second = stdout(&ws.run(&["hash", "A"]));
    assert_eq!(first, second);
    assert!(first.ends_with("  mod.a\n"), "{first}");

    assert_eq!(ws.run(&["hash", "nothing.here"]).status.code(), Some(1));
}

#[test]
fn cli_source_diff_and_sync() {
    let ws = Workspace::new();
    let origin = ws.package("Origin", "id = \"orig.mod\"\n", None);
    write_file(&origin, "Defs/a.xml", "<a v=\"1\"/>");
    let copy = ws.package("Copy", "id = \"copy.mod\"\n", None);
    write_file(&copy, "Defs/a.xml", "<a v=\"1\"/>");
    ws.activate(&["copy.mod"]);

    assert!(ws.run(&["source", "set", "copy.mod", "orig.mod"]).status.success());
    assert!(stdout(&ws.run(&["source", "diff", "copy.mod"])).contains("matches"));

    write_file(&origin, "Defs/a.xml", "<a v=\"2\"/>");
    write_file(&origin, "Defs/b.xml", "<b/>");
    let diff = stdout(&ws.run(&["source", "diff", "copy.mod"]));
    assert!(diff.contains("~ Defs/a.xml"), "{diff}");
    assert!(diff.contains("- Defs/b.xml"), "{diff}");

    let sync = ws.run(&["source", "sync", "copy.mod"]);
    assert!(sync.status.success(), "{}", String::from_utf8_lossy(&sync.stderr));
    assert_eq!(
        fs::read_to_string(copy.join("Defs/b.xml")).unwrap(),
        "<b/>"
    );
    assert_eq!(
        fs::read_to_string(copy.join("About/Package.toml")).unwrap(),
        "id = \"copy.mod\"\n"
    );
    assert_eq!(ws.run(&["check", "--fail-on", "1"]).status.code(), Some(0));

    assert!(ws.run(&["source", "clear", "copy.mod"]).status.success());
    assert_eq!(ws.run(&["source", "sync", "copy.mod"]).status.code(), Some(1));
}
