//! Verification of an existing installation.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::install::join_inside;
use crate::manifest::Manifest;
use crate::platform;
use crate::receipt::Receipt;
use crate::util::hash::Hashable;

#[derive(Debug, Clone, Serialize)]
pub struct CheckItem {
  pub name: String,
  pub ok: bool,
  pub detail: String,
}

impl CheckItem {
  fn pass(name: &str, detail: impl Into<String>) -> Self {
    Self {
      name: name.to_string(),
      ok: true,
      detail: detail.into(),
    }
  }

  fn fail(name: &str, detail: impl Into<String>) -> Self {
    Self {
      name: name.to_string(),
      ok: false,
      detail: detail.into(),
    }
  }
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
  pub prefix: PathBuf,
  pub items: Vec<CheckItem>,
}

impl CheckReport {
  pub fn ok(&self) -> bool {
    self.items.iter().all(|item| item.ok)
  }

  pub fn failures(&self) -> impl Iterator<Item = &CheckItem> {
    self.items.iter().filter(|item| !item.ok)
  }
}

/// Inspect `prefix` against what `manifest` would have produced.
///
/// Never fails: every problem becomes a failed item. A missing prefix
/// short-circuits the remaining checks.
pub fn check_installation(prefix: &Path, manifest: &Manifest) -> CheckReport {
  let prefix = dunce::canonicalize(prefix).unwrap_or_else(|_| prefix.to_path_buf());
  let mut items = Vec::new();

  if !prefix.is_dir() {
    items.push(CheckItem::fail("prefix", format!("{} does not exist", prefix.display())));
    return CheckReport { prefix, items };
  }
  items.push(CheckItem::pass("prefix", prefix.display().to_string()));

  items.push(non_empty_dir(&prefix, "bin"));
  items.push(non_empty_dir(&prefix, "lib"));
  items.push(target_tree(&prefix, manifest));
  items.push(receipt(&prefix, manifest));

  debug!(prefix = ?prefix, failed = items.iter().filter(|i| !i.ok).count(), "installation checked");
  CheckReport { prefix, items }
}

fn non_empty_dir(prefix: &Path, name: &str) -> CheckItem {
  let dir = prefix.join(name);
  match fs::read_dir(&dir).map(|mut entries| entries.next().is_some()) {
    Ok(true) => CheckItem::pass(name, dir.display().to_string()),
    Ok(false) => CheckItem::fail(name, format!("{} is empty", dir.display())),
    Err(_) => CheckItem::fail(name, format!("{} is missing", dir.display())),
  }
}

fn target_tree(prefix: &Path, manifest: &Manifest) -> CheckItem {
  const NAME: &str = "target";
  let target = &manifest.target;
  let tree = match join_inside(prefix, &target.dir_name()) {
    Ok(tree) => tree,
    Err(err) => return CheckItem::fail(NAME, err.to_string()),
  };
  if !tree.is_dir() {
    return CheckItem::fail(NAME, format!("{} is missing", tree.display()));
  }

  let Some(entry) = &target.entry_point else {
    return CheckItem::pass(NAME, tree.display().to_string());
  };
  let entry = match join_inside(&tree, entry) {
    Ok(entry) => entry,
    Err(err) => return CheckItem::fail(NAME, err.to_string()),
  };
  if !entry.is_file() {
    return CheckItem::fail(NAME, format!("entry point {} is missing", entry.display()));
  }
  if !platform::is_executable(&entry) {
    return CheckItem::fail(NAME, format!("entry point {} is not executable", entry.display()));
  }
  CheckItem::pass(NAME, entry.display().to_string())
}

fn receipt(prefix: &Path, manifest: &Manifest) -> CheckItem {
  const NAME: &str = "receipt";
  let receipt = match Receipt::load(prefix) {
    Ok(Some(receipt)) => receipt,
    Ok(None) => return CheckItem::fail(NAME, "no install receipt"),
    Err(err) => return CheckItem::fail(NAME, err.to_string()),
  };
  let expected = match manifest.compute_hash() {
    Ok(hash) => hash,
    Err(err) => return CheckItem::fail(NAME, format!("failed to hash manifest: {err}")),
  };
  if receipt.manifest_hash != expected {
    return CheckItem::fail(
      NAME,
      format!("installed from manifest {}, current is {expected}", receipt.manifest_hash),
    );
  }
  CheckItem::pass(NAME, format!("{} packages from manifest {expected}", receipt.packages.len()))
}
