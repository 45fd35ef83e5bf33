//! Install command integration tests.

use std::os::unix::fs::PermissionsExt;

use predicates::prelude::*;

use super::common::{CHAIN_MANIFEST, TestEnv, serve_chain, tar_gz};

#[test]
fn install_produces_runnable_entry_point() {
  let mut env = TestEnv::new();
  let _mocks = serve_chain(&mut env);
  env.write_manifest(CHAIN_MANIFEST);

  env
    .fsprov_cmd()
    .arg("install")
    .arg("--manifest")
    .arg(&env.manifest_path)
    .arg("--quiet-builds")
    .assert()
    .success()
    .stdout(predicate::str::contains("Install complete"));

  let prefix = env.prefix();
  assert!(prefix.join("lib/libfoo.so").is_file());
  assert!(prefix.join("bin/footool").is_file());
  assert!(prefix.join("app-1.0/built").is_file());

  let entry = prefix.join("bin/app.py");
  let mode = std::fs::metadata(&entry).unwrap().permissions().mode();
  assert!(mode & 0o111 != 0);
  std::process::Command::new(&entry)
    .output()
    .map(|out| assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "app"))
    .unwrap();
}

#[test]
fn check_passes_after_install() {
  let mut env = TestEnv::new();
  let _mocks = serve_chain(&mut env);
  env.write_manifest(CHAIN_MANIFEST);

  env
    .fsprov_cmd()
    .args(["install", "--quiet-builds", "--manifest"])
    .arg(&env.manifest_path)
    .assert()
    .success();

  env
    .fsprov_cmd()
    .args(["check", "--manifest"])
    .arg(&env.manifest_path)
    .assert()
    .success()
    .stdout(predicate::str::contains("Installation is complete"));
}

#[test]
fn failing_step_exit_code_propagates() {
  let mut env = TestEnv::new();
  let _lib = env.serve("/libfoo-0.1.tar.gz", tar_gz(&[("libfoo-0.1/x", "")]));
  let target = env.server.mock("GET", "/app-1.0.tar.gz").expect(0).create();
  env.write_manifest(
    r#"
version = 1

[[package]]
name = "libfoo"
version = "0.1"
url = "{base}/libfoo-0.1.tar.gz"
steps = [{ cmd = "exit 7" }, { cmd = "touch $${prefix}/second-step" }]

[target]
name = "app"
version = "1.0"
url = "{base}/app-1.0.tar.gz"
steps = [{ cmd = "touch $${prefix}/target-step" }]
"#,
  );

  env
    .fsprov_cmd()
    .args(["install", "--quiet-builds", "--manifest"])
    .arg(&env.manifest_path)
    .assert()
    .code(7)
    .stderr(predicate::str::contains("build failed for libfoo-0.1"));

  assert!(!env.prefix().join("second-step").exists());
  assert!(!env.prefix().join("target-step").exists());
  target.assert();
}

#[test]
fn missing_archive_exits_one() {
  let mut env = TestEnv::new();
  let _missing = env.server.mock("GET", "/app-1.0.tar.gz").with_status(404).create();
  env.write_manifest(
    r#"
version = 1

[target]
name = "app"
version = "1.0"
url = "{base}/app-1.0.tar.gz"
steps = [{ cmd = "true" }]
"#,
  );

  env
    .fsprov_cmd()
    .args(["install", "--manifest"])
    .arg(&env.manifest_path)
    .assert()
    .code(1)
    .stderr(predicate::str::contains("fetch failed for app-1.0"))
    .stderr(predicate::str::contains("404"));
}

#[test]
fn second_install_uses_cache() {
  let mut env = TestEnv::new();
  let mocks = serve_chain(&mut env);
  env.write_manifest(CHAIN_MANIFEST);

  for _ in 0..2 {
    env
      .fsprov_cmd()
      .args(["install", "--quiet-builds", "--manifest"])
      .arg(&env.manifest_path)
      .assert()
      .success();
  }

  for mock in &mocks {
    mock.assert();
  }
}
