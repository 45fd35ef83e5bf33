//! Fetch command integration tests.

use predicates::prelude::*;

use super::common::{CHAIN_MANIFEST, TestEnv, serve_chain, tar_gz};

#[test]
fn fetch_fills_cache_and_lock() {
  let mut env = TestEnv::new();
  let _mocks = serve_chain(&mut env);
  env.write_manifest(CHAIN_MANIFEST);

  env
    .fsprov_cmd()
    .args(["fetch", "--manifest"])
    .arg(&env.manifest_path)
    .assert()
    .success()
    .stdout(predicate::str::contains("Archives downloaded: 3"));

  let downloads = env.download_dir();
  assert!(downloads.join("libfoo-0.1.tar.gz").is_file());
  assert!(downloads.join("footool-2.0.tar.gz").is_file());
  assert!(downloads.join("app-1.0.tar.gz").is_file());

  let lock: serde_json::Value =
    serde_json::from_str(&std::fs::read_to_string(downloads.join("checksums.lock")).unwrap()).unwrap();
  let entry = &lock["entries"][env.url("/libfoo-0.1.tar.gz")];
  assert_eq!(entry["file"], "libfoo-0.1.tar.gz");
  assert_eq!(entry["sha256"].as_str().unwrap().len(), 64);
}

#[test]
fn prepopulated_archive_is_not_downloaded() {
  let mut env = TestEnv::new();
  let body = tar_gz(&[("app-1.0/app.py", "")]);
  let mock = env.server.mock("GET", "/app-1.0.tar.gz").expect(0).create();
  std::fs::create_dir_all(env.download_dir()).unwrap();
  std::fs::write(env.download_dir().join("app-1.0.tar.gz"), &body).unwrap();
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
    .args(["fetch", "--manifest"])
    .arg(&env.manifest_path)
    .assert()
    .success()
    .stdout(predicate::str::contains("Archives cached: 1"));

  mock.assert();
}

#[test]
fn pinned_checksum_mismatch_fails() {
  let mut env = TestEnv::new();
  let _mock = env.serve("/app-1.0.tar.gz", tar_gz(&[("app-1.0/app.py", "")]));
  let manifest = format!(
    r#"
version = 1

[target]
name = "app"
version = "1.0"
url = "{{base}}/app-1.0.tar.gz"
sha256 = "{}"
steps = [{{ cmd = "true" }}]
"#,
    "f".repeat(64)
  );
  env.write_manifest(&manifest);

  env
    .fsprov_cmd()
    .args(["fetch", "--manifest"])
    .arg(&env.manifest_path)
    .assert()
    .code(1)
    .stderr(predicate::str::contains("fetch failed for app-1.0"));

  assert!(!env.download_dir().join("app-1.0.tar.gz").exists());
}
