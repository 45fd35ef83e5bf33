use std::fs;

use tempfile::TempDir;

use super::*;

/// Stands in for `structure.py`: writes the files a real run leaves behind,
/// and fails for the K named in `FAIL_K`.
const FAKE_STRUCTURE: &str = r#"
while [ $# -gt 0 ]; do
  case "$1" in
    -K) K=$2; shift 2 ;;
    --input) IN=$2; shift 2 ;;
    --output) OUT=$2; shift 2 ;;
    --format) FMT=$2; shift 2 ;;
    *) EXTRA="$EXTRA $1"; shift ;;
  esac
done
[ -f "$IN.$FMT" ] || { echo "cannot read $IN.$FMT"; exit 3; }
if [ "$K" = "$FAIL_K" ]; then
  echo "numerical failure at K=$K"
  echo "Traceback (most recent call last)" >&2
  exit 2
fi
echo "Marginal Likelihood = -0.9$K" > "$OUT.$K.log"
: > "$OUT.$K.meanQ"
i=0
while [ $i -lt 10 ]; do echo "0.98 0.02" >> "$OUT.$K.meanQ"; i=$((i + 1)); done
echo "$EXTRA" > "$OUT.$K.args"
echo "finished K=$K"
"#;

struct Sweep {
  temp: TempDir,
}

impl Sweep {
  fn new() -> Self {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("structure.py"), FAKE_STRUCTURE).unwrap();
    fs::write(temp.path().join("data.str"), "ind1 pop1 1 2\n").unwrap();
    Self { temp }
  }

  fn output(&self) -> PathBuf {
    self.temp.path().join("results")
  }

  fn options(&self, max_k: u32) -> RunOptions {
    let mut env = BTreeMap::new();
    env.insert("PATH".to_string(), "/usr/bin:/bin".to_string());
    RunOptions {
      python: "/bin/sh".to_string(),
      entry_point: self.temp.path().join("structure.py"),
      input: self.temp.path().join("data.str"),
      output: self.output(),
      min_k: 1,
      max_k,
      threads: 2,
      log_all: false,
      extra_args: Vec::new(),
      env,
    }
  }
}

#[tokio::test]
async fn sweep_runs_every_k_in_order() {
  let sweep = Sweep::new();

  let report = run_all(&sweep.options(3)).await.unwrap();

  assert!(report.ok());
  assert_eq!(report.format, InputFormat::Str);
  let ks: Vec<u32> = report.runs.iter().map(|r| r.k).collect();
  assert_eq!(ks, vec![1, 2, 3]);
  for k in 1..=3 {
    assert!(sweep.output().join(format!("fS_run_K.{k}.meanQ")).is_file());
    assert!(!sweep.output().join(format!("K{k}.stlog")).exists());
  }
  assert!(report.runs.iter().all(|r| r.exit_code == Some(0) && r.log.is_none()));

  let choice = choose_k(&report.output).unwrap();
  assert_eq!(choice.likelihood_k, 1);
  assert_eq!(choice.components_k, 1);
}

#[tokio::test]
async fn failed_run_is_logged_and_the_rest_finish() {
  let sweep = Sweep::new();
  let mut options = sweep.options(3);
  options.env.insert("FAIL_K".to_string(), "2".to_string());

  let report = run_all(&options).await.unwrap();

  assert!(!report.ok());
  let failed: Vec<u32> = report.failures().map(|r| r.k).collect();
  assert_eq!(failed, vec![2]);

  let run = &report.runs[1];
  assert_eq!(run.exit_code, Some(2));
  let log = run.log.as_ref().unwrap();
  assert!(log.ends_with("results/K2.stlog"));
  let text = fs::read_to_string(log).unwrap();
  assert!(text.starts_with("$ /bin/sh "));
  assert!(text.contains("exit code: 2"));
  assert!(text.contains("numerical failure at K=2"));
  assert!(text.contains("Traceback"));

  assert!(sweep.output().join("fS_run_K.1.log").is_file());
  assert!(sweep.output().join("fS_run_K.3.log").is_file());
  assert!(!sweep.output().join("K1.stlog").exists());
}

#[tokio::test]
async fn log_all_keeps_every_log() {
  let sweep = Sweep::new();
  let mut options = sweep.options(2);
  options.log_all = true;

  let report = run_all(&options).await.unwrap();

  assert!(report.ok());
  for run in &report.runs {
    let text = fs::read_to_string(run.log.as_ref().unwrap()).unwrap();
    assert!(text.contains(&format!("finished K={}", run.k)));
  }
}

#[tokio::test]
async fn extra_arguments_reach_every_run() {
  let sweep = Sweep::new();
  let mut options = sweep.options(2);
  options.extra_args = vec!["--prior=logistic".to_string(), "--seed=7".to_string()];

  run_all(&options).await.unwrap();

  for k in 1..=2 {
    let args = fs::read_to_string(sweep.output().join(format!("fS_run_K.{k}.args"))).unwrap();
    assert_eq!(args.trim(), "--prior=logistic --seed=7");
  }
}

#[tokio::test]
async fn missing_interpreter_fails_every_run() {
  let sweep = Sweep::new();
  let mut options = sweep.options(2);
  options.python = sweep.temp.path().join("no-python").display().to_string();

  let report = run_all(&options).await.unwrap();

  assert_eq!(report.failures().count(), 2);
  let run = &report.runs[0];
  assert_eq!(run.exit_code, None);
  assert!(fs::read_to_string(run.log.as_ref().unwrap()).unwrap().contains("failed to start"));
}

#[tokio::test]
async fn invalid_sweeps_are_rejected() {
  let sweep = Sweep::new();

  let mut options = sweep.options(3);
  options.min_k = 0;
  assert!(matches!(run_all(&options).await, Err(RunError::ZeroK)));

  let mut options = sweep.options(2);
  options.min_k = 3;
  assert!(matches!(
    run_all(&options).await,
    Err(RunError::EmptyRange { min: 3, max: 2 })
  ));

  let mut options = sweep.options(2);
  options.entry_point = sweep.temp.path().join("missing.py");
  assert!(matches!(run_all(&options).await, Err(RunError::NotInstalled(_))));

  let mut options = sweep.options(2);
  options.input = sweep.temp.path().join("absent.str");
  assert!(matches!(run_all(&options).await, Err(RunError::MissingInput(_))));

  fs::write(sweep.output(), "").unwrap();
  assert!(matches!(
    run_all(&sweep.options(2)).await,
    Err(RunError::OutputIsFile(_))
  ));
}

#[test]
fn structure_input_without_extension_is_linked() {
  let temp = TempDir::new().unwrap();
  let input = temp.path().join("samples.txt");
  fs::write(&input, "ind1 pop1 1 2\n").unwrap();

  let (stem, format) = prepare_input(&input).unwrap();

  assert_eq!(format, InputFormat::Str);
  assert_eq!(stem, input);
  let linked = temp.path().join("samples.txt.str");
  assert_eq!(fs::read_to_string(&linked).unwrap(), "ind1 pop1 1 2\n");

  // Second call reuses the link.
  prepare_input(&input).unwrap();
}

#[test]
fn plink_input_uses_the_stem() {
  let temp = TempDir::new().unwrap();
  for ext in ["bed", "bim", "fam"] {
    fs::write(temp.path().join(format!("cohort.{ext}")), "").unwrap();
  }

  let (stem, format) = prepare_input(&temp.path().join("cohort.bim")).unwrap();

  assert_eq!(format, InputFormat::Bed);
  assert_eq!(stem, temp.path().join("cohort"));
}

#[tokio::test]
async fn plink_sweep_passes_bed_format() {
  let sweep = Sweep::new();
  fs::write(sweep.temp.path().join("cohort.bed"), "").unwrap();
  let mut options = sweep.options(1);
  options.input = sweep.temp.path().join("cohort.bed");

  let report = run_all(&options).await.unwrap();

  assert!(report.ok(), "{:?}", report.runs);
  assert_eq!(report.format, InputFormat::Bed);
}

#[test]
fn installed_entry_point_lookup() {
  let temp = TempDir::new().unwrap();
  let manifest = Manifest::builtin().unwrap();

  assert!(matches!(
    installed_entry_point(temp.path(), &manifest),
    Err(RunError::NotInstalled(_))
  ));

  let tree = temp.path().join("fastStructure-1.0");
  fs::create_dir_all(&tree).unwrap();
  fs::write(tree.join("structure.py"), "").unwrap();
  assert_eq!(
    installed_entry_point(temp.path(), &manifest).unwrap(),
    tree.join("structure.py")
  );

  let mut no_entry = manifest.clone();
  no_entry.target.entry_point = None;
  assert!(matches!(
    installed_entry_point(temp.path(), &no_entry),
    Err(RunError::NoEntryPoint)
  ));
}
