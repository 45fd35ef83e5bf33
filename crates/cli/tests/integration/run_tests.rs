//! Run command integration tests: install a stand-in fastStructure, then
//! sweep K over it.

use predicates::prelude::*;

use super::common::{TestEnv, tar_gz};

/// Writes the result files fastStructure leaves behind; fails for `FAIL_K`.
const FAKE_STRUCTURE: &str = r#"#!/bin/sh
while [ $# -gt 0 ]; do
  case "$1" in
    -K) K=$2; shift 2 ;;
    --output) OUT=$2; shift 2 ;;
    *) shift ;;
  esac
done
if [ "$K" = "$FAIL_K" ]; then echo "diverged at K=$K"; exit 1; fi
echo "Marginal Likelihood = -0.$((90 - K))" > "$OUT.$K.log"
: > "$OUT.$K.meanQ"
for i in 1 2 3 4 5 6 7 8 9 10; do echo "0.5 0.5" >> "$OUT.$K.meanQ"; done
"#;

const MANIFEST: &str = r#"
version = 1

[target]
name = "fastStructure"
version = "1.0"
url = "{base}/fastStructure-1.0.tar.gz"
entry_point = "structure.py"
steps = [{ cmd = "true" }]
"#;

fn installed() -> (TestEnv, std::path::PathBuf) {
  let mut env = TestEnv::new();
  let _mock = env.serve(
    "/fastStructure-1.0.tar.gz",
    tar_gz(&[("fastStructure-1.0/structure.py", FAKE_STRUCTURE)]),
  );
  env.write_manifest(MANIFEST);
  env
    .fsprov_cmd()
    .args(["install", "--quiet-builds", "--manifest"])
    .arg(&env.manifest_path)
    .assert()
    .success();

  let input = env.temp.path().join("samples.str");
  std::fs::write(&input, "ind1 pop1 1 2\n").unwrap();
  (env, input)
}

#[test]
fn sweep_reports_best_k() {
  let (env, input) = installed();
  let results = env.temp.path().join("results");

  env
    .fsprov_cmd()
    .args(["run", "-K", "3", "-t", "2", "--python", "/bin/sh", "--manifest"])
    .arg(&env.manifest_path)
    .arg("-i")
    .arg(&input)
    .arg("-o")
    .arg(&results)
    .assert()
    .success()
    .stdout(predicate::str::contains("All 3 runs finished successfully"))
    .stdout(predicate::str::contains("Best K (marginal likelihood): 3"))
    .stdout(predicate::str::contains("Best K (components used): 2"));

  let choice = std::fs::read_to_string(results.join("bestK/chooseK.txt")).unwrap();
  assert!(choice.contains("maximizes marginal likelihood = 3"));
  assert!(!results.join("K1.stlog").exists());
}

#[test]
fn failed_run_points_at_its_log() {
  let (env, input) = installed();
  let results = env.temp.path().join("results");

  env
    .fsprov_cmd()
    .env("FAIL_K", "2")
    .args(["run", "-K", "3", "--no-tests", "--python", "/bin/sh", "--manifest"])
    .arg(&env.manifest_path)
    .arg("-i")
    .arg(&input)
    .arg("-o")
    .arg(&results)
    .assert()
    .code(1)
    .stdout(predicate::str::contains("K2.stlog"))
    .stderr(predicate::str::contains("1 of 3 fastStructure runs failed"));

  let log = std::fs::read_to_string(results.join("K2.stlog")).unwrap();
  assert!(log.contains("diverged at K=2"));
  assert!(results.join("fS_run_K.3.log").is_file());
  assert!(!results.join("bestK").exists());
}
