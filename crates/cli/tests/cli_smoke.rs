//! CLI smoke tests for fsprov.
//!
//! These tests verify that the commands that need no network run without
//! panicking and return appropriate exit codes.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

/// Get a Command for the fsprov binary with prefix and cache inside `temp`.
fn fsprov_cmd(temp: &TempDir) -> Command {
  let mut cmd = cargo_bin_cmd!("fsprov");
  cmd.env("FSPROV_PREFIX", temp.path().join("prefix"));
  cmd.env("FSPROV_DOWNLOAD_DIR", temp.path().join("downloads"));
  cmd.env_remove("RUST_LOG");
  cmd
}

// =============================================================================
// Help & Version
// =============================================================================

#[test]
fn help_flag_works() {
  let temp = TempDir::new().unwrap();
  fsprov_cmd(&temp)
    .arg("--help")
    .assert()
    .success()
    .stdout(predicate::str::contains("Usage"));
}

#[test]
fn version_flag_works() {
  let temp = TempDir::new().unwrap();
  fsprov_cmd(&temp)
    .arg("--version")
    .assert()
    .success()
    .stdout(predicate::str::contains("fsprov"));
}

#[test]
fn subcommand_help_works() {
  let temp = TempDir::new().unwrap();
  for cmd in &["install", "plan", "fetch", "check", "init", "run"] {
    fsprov_cmd(&temp)
      .arg(cmd)
      .arg("--help")
      .assert()
      .success()
      .stdout(predicate::str::contains("Usage"));
  }
}

// =============================================================================
// init
// =============================================================================

#[test]
fn init_writes_builtin_manifest() {
  let temp = TempDir::new().unwrap();
  let path = temp.path().join("fsprov.toml");

  fsprov_cmd(&temp).arg("init").arg(&path).assert().success();

  let content = std::fs::read_to_string(&path).unwrap();
  assert!(content.contains("name = \"fastStructure\""));
  assert!(content.contains("name = \"gsl\""));
}

#[test]
fn init_defaults_to_current_directory() {
  let temp = TempDir::new().unwrap();

  fsprov_cmd(&temp).current_dir(temp.path()).arg("init").assert().success();

  assert!(temp.path().join("fsprov.toml").is_file());
}

#[test]
fn init_refuses_to_overwrite() {
  let temp = TempDir::new().unwrap();
  let path = temp.path().join("fsprov.toml");
  std::fs::write(&path, "mine").unwrap();

  fsprov_cmd(&temp)
    .arg("init")
    .arg(&path)
    .assert()
    .code(1)
    .stderr(predicate::str::contains("already exists"));

  assert_eq!(std::fs::read_to_string(&path).unwrap(), "mine");
}

// =============================================================================
// plan
// =============================================================================

#[test]
fn plan_lists_builtin_chain_in_order() {
  let temp = TempDir::new().unwrap();

  let output = fsprov_cmd(&temp).args(["plan", "--output", "json"]).output().unwrap();
  assert!(output.status.success());

  let plan: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  let names: Vec<&str> = plan["packages"]
    .as_array()
    .unwrap()
    .iter()
    .map(|p| p["name"].as_str().unwrap())
    .collect();
  assert_eq!(
    names,
    vec!["lapack", "cython", "nose", "numpy", "scipy", "gsl", "fastStructure"]
  );
  assert_eq!(plan["packages"][6]["target"], true);
  assert!(!temp.path().join("prefix").exists());
}

#[test]
fn plan_text_shows_commands() {
  let temp = TempDir::new().unwrap();

  fsprov_cmd(&temp)
    .args(["plan", "--prefix"])
    .arg(temp.path().join("custom"))
    .assert()
    .success()
    .stdout(predicate::str::contains("fastStructure-1.0 (target)"))
    .stdout(predicate::str::contains("$ make"))
    .stdout(predicate::str::contains("Archives to download: 7 of 7"));
}

#[test]
fn plan_rejects_invalid_manifest() {
  let temp = TempDir::new().unwrap();
  let path = temp.path().join("bad.toml");
  std::fs::write(&path, "version = 99\n").unwrap();

  fsprov_cmd(&temp)
    .arg("plan")
    .arg("--manifest")
    .arg(&path)
    .assert()
    .code(1)
    .stderr(predicate::str::contains("Failed to load manifest"));
}

// =============================================================================
// check
// =============================================================================

#[test]
fn check_fails_without_installation() {
  let temp = TempDir::new().unwrap();

  fsprov_cmd(&temp)
    .arg("check")
    .assert()
    .code(1)
    .stdout(predicate::str::contains("does not exist"))
    .stderr(predicate::str::contains("check(s) failed"));
}

#[test]
fn check_json_reports_items() {
  let temp = TempDir::new().unwrap();
  std::fs::create_dir_all(temp.path().join("prefix/bin")).unwrap();

  let output = fsprov_cmd(&temp).args(["check", "--output", "json"]).output().unwrap();
  assert_eq!(output.status.code(), Some(1));

  let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  let items = report["items"].as_array().unwrap();
  assert_eq!(items.len(), 5);
  assert_eq!(items[0]["ok"], true);
  assert_eq!(items[1]["name"], "bin");
  assert_eq!(items[1]["ok"], false);
}

// =============================================================================
// run
// =============================================================================

#[test]
fn run_without_installation_fails() {
  let temp = TempDir::new().unwrap();
  std::fs::write(temp.path().join("data.str"), "ind1 pop1 1 2\n").unwrap();

  fsprov_cmd(&temp)
    .args(["run", "-K", "2", "-i"])
    .arg(temp.path().join("data.str"))
    .arg("-o")
    .arg(temp.path().join("results"))
    .assert()
    .code(1)
    .stderr(predicate::str::contains("No usable installation"))
    .stderr(predicate::str::contains("fastStructure is not installed"));

  assert!(!temp.path().join("results").exists());
}
