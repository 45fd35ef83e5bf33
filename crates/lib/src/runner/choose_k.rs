//! Model choice over completed fastStructure runs.
//!
//! Two answers come out of a K sweep. The K whose run reached the highest
//! marginal likelihood, and the number of ancestry components actually used
//! to explain the data, taken as the most common count across all runs.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::consts::{BEST_K_DIR, CHOOSE_K_FILENAME, RUN_OUTPUT_STEM};

#[derive(Debug, Error)]
pub enum ChooseKError {
  #[error("no fastStructure results found in {}", .0.display())]
  NoResults(PathBuf),

  #[error("{} has no marginal likelihood line", .0.display())]
  MissingLikelihood(PathBuf),

  #[error("malformed ancestry proportions in {}: {message}", path.display())]
  MalformedMeanQ { path: PathBuf, message: String },

  #[error("I/O error at {}: {source}", path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> ChooseKError + '_ {
  move |source| ChooseKError::Io {
    path: path.to_path_buf(),
    source,
  }
}

/// What was learned from one K.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KSummary {
  pub k: u32,
  pub marginal_likelihood: Option<f64>,
  pub components: Option<usize>,
}

/// Result of model choice, also written to `bestK/chooseK.txt`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChooseK {
  /// K that maximizes the marginal likelihood.
  pub likelihood_k: u32,
  /// Components used to explain structure in the data.
  pub components_k: usize,
  pub per_k: Vec<KSummary>,
  pub path: PathBuf,
}

/// Marginal likelihood reported in a fastStructure log.
pub fn parse_marginal_likelihood(log: &str) -> Option<f64> {
  log
    .lines()
    .find(|line| line.contains("Marginal Likelihood"))
    .and_then(|line| line.split('=').nth(1))
    .and_then(|value| value.trim().parse().ok())
}

/// Number of components needed to explain the ancestry proportions in a
/// `.meanQ` matrix (one row per sample, one column per component).
///
/// Rows are normalized, column totals sorted in descending order, and the
/// count is the number of leading columns whose running total stays below
/// `N - 1`, plus one.
pub fn count_components(mean_q: &str) -> Result<usize, String> {
  let mut rows = Vec::new();
  for (i, line) in mean_q.lines().enumerate().filter(|(_, l)| !l.trim().is_empty()) {
    let row = line
      .split_whitespace()
      .map(str::parse::<f64>)
      .collect::<Result<Vec<_>, _>>()
      .map_err(|e| format!("line {}: {e}", i + 1))?;
    rows.push(row);
  }

  let Some(width) = rows.first().map(Vec::len) else {
    return Err("no samples".to_string());
  };
  if width == 0 || rows.iter().any(|r| r.len() != width) {
    return Err("rows have different numbers of components".to_string());
  }

  let mut totals = vec![0.0; width];
  for row in &rows {
    let sum: f64 = row.iter().sum();
    if sum <= 0.0 {
      return Err("a sample has no ancestry mass".to_string());
    }
    for (total, q) in totals.iter_mut().zip(row) {
      *total += q / sum;
    }
  }
  totals.sort_by(|a, b| b.total_cmp(a));

  let threshold = rows.len() as f64 - 1.0;
  let mut running = 0.0;
  let below = totals
    .iter()
    .take_while(|&&t| {
      running += t;
      running < threshold
    })
    .count();

  Ok(below + 1)
}

/// K encoded in a result file name such as `fS_run_K.3.meanQ`.
fn result_k(name: &str, extension: &str) -> Option<u32> {
  name
    .strip_prefix(RUN_OUTPUT_STEM)?
    .strip_prefix('.')?
    .strip_suffix(extension)?
    .strip_suffix('.')?
    .parse()
    .ok()
}

/// Read every run's `.log` and `.meanQ` in `results` and write the choice
/// into `results/bestK/chooseK.txt`.
pub fn choose_k(results: &Path) -> Result<ChooseK, ChooseKError> {
  let mut per_k: BTreeMap<u32, KSummary> = BTreeMap::new();

  for entry in fs::read_dir(results).map_err(io_err(results))? {
    let path = entry.map_err(io_err(results))?.path();
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
      continue;
    };

    if let Some(k) = result_k(name, "log") {
      let text = fs::read_to_string(&path).map_err(io_err(&path))?;
      let likelihood = parse_marginal_likelihood(&text).ok_or_else(|| ChooseKError::MissingLikelihood(path.clone()))?;
      summary(&mut per_k, k).marginal_likelihood = Some(likelihood);
    } else if let Some(k) = result_k(name, "meanQ") {
      let text = fs::read_to_string(&path).map_err(io_err(&path))?;
      let count = count_components(&text).map_err(|message| ChooseKError::MalformedMeanQ {
        path: path.clone(),
        message,
      })?;
      summary(&mut per_k, k).components = Some(count);
    }
  }

  let likelihood_k = per_k
    .values()
    .filter_map(|s| s.marginal_likelihood.map(|m| (s.k, m)))
    .fold(None, |best: Option<(u32, f64)>, (k, m)| match best {
      Some((_, top)) if top >= m => best,
      _ => Some((k, m)),
    })
    .map(|(k, _)| k);

  let mut counts: BTreeMap<usize, usize> = BTreeMap::new();
  for components in per_k.values().filter_map(|s| s.components) {
    *counts.entry(components).or_default() += 1;
  }
  let components_k = counts
    .iter()
    .fold(None, |best: Option<(usize, usize)>, (&value, &seen)| match best {
      Some((_, top)) if top >= seen => best,
      _ => Some((value, seen)),
    })
    .map(|(value, _)| value);

  let (Some(likelihood_k), Some(components_k)) = (likelihood_k, components_k) else {
    return Err(ChooseKError::NoResults(results.to_path_buf()));
  };

  let dir = results.join(BEST_K_DIR);
  fs::create_dir_all(&dir).map_err(io_err(&dir))?;
  let path = dir.join(CHOOSE_K_FILENAME);
  let text = format!(
    "Model complexity that maximizes marginal likelihood = {likelihood_k}\n\
     Model components used to explain structure in data = {components_k}\n"
  );
  fs::write(&path, text).map_err(io_err(&path))?;

  debug!(runs = per_k.len(), "harvested fastStructure results");
  info!(likelihood_k, components_k, path = ?path, "model choice written");

  Ok(ChooseK {
    likelihood_k,
    components_k,
    per_k: per_k.into_values().collect(),
    path,
  })
}

fn summary(per_k: &mut BTreeMap<u32, KSummary>, k: u32) -> &mut KSummary {
  per_k.entry(k).or_insert(KSummary {
    k,
    marginal_likelihood: None,
    components: None,
  })
}
