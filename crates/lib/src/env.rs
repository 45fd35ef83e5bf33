//! Build environment threaded through the provisioning steps.
//!
//! Subordinate build systems (cmake, distutils, autoconf) take their compiler
//! and linker flags from environment variables. Instead of mutating the
//! process environment, the provisioner owns a [`BuildEnv`]: a baseline
//! captured once at prepare time plus the current variable map. Package
//! environment operations edit the current map and stay in effect for every
//! later package. `restore` returns a variable to its baseline.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

fn default_sep() -> String {
  " ".to_string()
}

/// One environment edit declared by a manifest package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum EnvOp {
  /// Replace the variable's value.
  Set { var: String, value: String },
  /// Remove the variable.
  Unset { var: String },
  /// Add `value` after the current value, joined by `sep`.
  Append {
    var: String,
    value: String,
    #[serde(default = "default_sep")]
    sep: String,
  },
  /// Add `value` before the current value, joined by `sep`.
  Prepend {
    var: String,
    value: String,
    #[serde(default = "default_sep")]
    sep: String,
  },
  /// Return the variable to its baseline value, or remove it if it had none.
  Restore { var: String },
}

impl EnvOp {
  /// The variable this operation edits.
  pub fn var(&self) -> &str {
    match self {
      EnvOp::Set { var, .. }
      | EnvOp::Unset { var }
      | EnvOp::Append { var, .. }
      | EnvOp::Prepend { var, .. }
      | EnvOp::Restore { var } => var.as_str(),
    }
  }

  /// The templated value, for operations that carry one.
  pub fn value(&self) -> Option<&str> {
    match self {
      EnvOp::Set { value, .. } | EnvOp::Append { value, .. } | EnvOp::Prepend { value, .. } => Some(value.as_str()),
      EnvOp::Unset { .. } | EnvOp::Restore { .. } => None,
    }
  }

  /// Same operation with its value replaced, used after placeholder substitution.
  pub fn with_value(&self, new_value: String) -> EnvOp {
    match self {
      EnvOp::Set { var, .. } => EnvOp::Set {
        var: var.clone(),
        value: new_value,
      },
      EnvOp::Append { var, sep, .. } => EnvOp::Append {
        var: var.clone(),
        value: new_value,
        sep: sep.clone(),
      },
      EnvOp::Prepend { var, sep, .. } => EnvOp::Prepend {
        var: var.clone(),
        value: new_value,
        sep: sep.clone(),
      },
      other => other.clone(),
    }
  }
}

/// Environment handed to every build command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildEnv {
  baseline: BTreeMap<String, String>,
  current: BTreeMap<String, String>,
}

impl BuildEnv {
  /// Capture the current process environment as the baseline.
  ///
  /// Variables whose name or value is not valid UTF-8 are dropped, and the
  /// build steps never see them.
  pub fn capture() -> Self {
    Self::from_vars(
      std::env::vars_os().filter_map(|(k, v)| match (k.into_string(), v.into_string()) {
        (Ok(k), Ok(v)) => Some((k, v)),
        (k, _) => {
          let name = k.unwrap_or_else(|k| k.to_string_lossy().into_owned());
          debug!(var = %name, "dropping non-UTF-8 environment variable");
          None
        }
      }),
    )
  }

  /// Build from an explicit set of variables.
  pub fn from_vars<I, K, V>(vars: I) -> Self
  where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
  {
    let baseline: BTreeMap<String, String> = vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
    Self {
      current: baseline.clone(),
      baseline,
    }
  }

  pub fn get(&self, var: &str) -> Option<&str> {
    self.current.get(var).map(String::as_str)
  }

  /// Value captured at prepare time, before any package edited it.
  fn baseline(&self, var: &str) -> Option<&str> {
    self.baseline.get(var).map(String::as_str)
  }

  /// Apply a single operation. Values must already be substituted.
  pub fn apply(&mut self, op: &EnvOp) {
    match op {
      EnvOp::Set { var, value } => {
        self.current.insert(var.clone(), value.clone());
      }
      EnvOp::Unset { var } => {
        self.current.remove(var);
      }
      EnvOp::Append { var, value, sep } => {
        let joined = match self.current.get(var) {
          Some(existing) if !existing.is_empty() => format!("{existing}{sep}{value}"),
          _ => value.clone(),
        };
        self.current.insert(var.clone(), joined);
      }
      EnvOp::Prepend { var, value, sep } => {
        let joined = match self.current.get(var) {
          Some(existing) if !existing.is_empty() => format!("{value}{sep}{existing}"),
          _ => value.clone(),
        };
        self.current.insert(var.clone(), joined);
      }
      EnvOp::Restore { var } => match self.baseline(var).map(str::to_string) {
        Some(original) => {
          self.current.insert(var.clone(), original);
        }
        None => {
          self.current.remove(var);
        }
      },
    }

    debug!(var = %op.var(), value = ?self.get(op.var()), "environment updated");
  }

  /// The current variables, for handing to a child process.
  pub fn into_vars(self) -> BTreeMap<String, String> {
    self.current
  }

  /// Layer step-local variables over the current map without keeping them.
  pub fn overlay(&self, extra: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut vars = self.current.clone();
    vars.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
    vars
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn append(var: &str, value: &str, sep: &str) -> EnvOp {
    EnvOp::Append {
      var: var.to_string(),
      value: value.to_string(),
      sep: sep.to_string(),
    }
  }

  fn restore(var: &str) -> EnvOp {
    EnvOp::Restore { var: var.to_string() }
  }

  #[test]
  fn restore_reproduces_value_captured_before_mutation() {
    let mut env = BuildEnv::from_vars([("LDFLAGS", "-L/usr/local/lib"), ("PATH", "/usr/bin")]);
    let before_numpy = env.get("LDFLAGS").map(str::to_string);

    env.apply(&append("LDFLAGS", "-shared", " "));
    assert_eq!(env.get("LDFLAGS"), Some("-L/usr/local/lib -shared"));
    env.apply(&append("LDFLAGS", "-lgfortran", " "));

    env.apply(&restore("LDFLAGS"));

    assert_eq!(env.get("LDFLAGS").map(str::to_string), before_numpy);
  }

  #[test]
  fn restore_removes_variable_absent_from_baseline() {
    let mut env = BuildEnv::from_vars([("PATH", "/usr/bin")]);

    env.apply(&append("LDFLAGS", "-shared", " "));
    assert_eq!(env.get("LDFLAGS"), Some("-shared"));

    env.apply(&restore("LDFLAGS"));
    assert_eq!(env.get("LDFLAGS"), None);
  }

  #[test]
  fn append_to_empty_value_has_no_leading_separator() {
    let mut env = BuildEnv::from_vars([("LD_LIBRARY_PATH", "")]);
    env.apply(&append("LD_LIBRARY_PATH", "/opt/fs/lib", ":"));
    assert_eq!(env.get("LD_LIBRARY_PATH"), Some("/opt/fs/lib"));
  }

  #[test]
  fn prepend_uses_separator() {
    let mut env = BuildEnv::from_vars([("PYTHONPATH", "/usr/lib/python")]);
    env.apply(&EnvOp::Prepend {
      var: "PYTHONPATH".to_string(),
      value: "/opt/fs/lib/python".to_string(),
      sep: ":".to_string(),
    });
    assert_eq!(env.get("PYTHONPATH"), Some("/opt/fs/lib/python:/usr/lib/python"));
  }

  #[test]
  fn set_and_unset() {
    let mut env = BuildEnv::from_vars([("ATLAS", "/usr/lib/atlas")]);
    env.apply(&EnvOp::Set {
      var: "ATLAS".to_string(),
      value: "None".to_string(),
    });
    assert_eq!(env.get("ATLAS"), Some("None"));
    assert_eq!(env.baseline("ATLAS"), Some("/usr/lib/atlas"));

    env.apply(&EnvOp::Unset {
      var: "ATLAS".to_string(),
    });
    assert_eq!(env.get("ATLAS"), None);
  }

  #[cfg(unix)]
  #[test]
  #[serial_test::serial]
  #[tracing_test::traced_test]
  fn capture_reports_dropped_non_utf8_variables() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    temp_env::with_vars(
      [
        ("FSPROV_LATIN1_VALUE", Some(OsStr::from_bytes(b"caf\xe9"))),
        ("FSPROV_PLAIN_VALUE", Some(OsStr::new("cafe"))),
      ],
      || {
        let env = BuildEnv::capture();
        assert_eq!(env.get("FSPROV_LATIN1_VALUE"), None);
        assert_eq!(env.get("FSPROV_PLAIN_VALUE"), Some("cafe"));
      },
    );

    assert!(logs_contain("dropping non-UTF-8 environment variable"));
    assert!(logs_contain("FSPROV_LATIN1_VALUE"));
  }

  #[test]
  fn into_vars_returns_current_values() {
    let mut env = BuildEnv::from_vars([("CFLAGS", "-O2")]);
    env.apply(&append("CFLAGS", "-g", " "));

    let vars = env.into_vars();

    assert_eq!(vars.get("CFLAGS").map(String::as_str), Some("-O2 -g"));
  }

  #[test]
  fn overlay_does_not_stick() {
    let env = BuildEnv::from_vars([("CFLAGS", "-O2")]);
    let mut extra = BTreeMap::new();
    extra.insert("CFLAGS".to_string(), "-O0".to_string());

    let vars = env.overlay(&extra);

    assert_eq!(vars.get("CFLAGS").map(String::as_str), Some("-O0"));
    assert_eq!(env.get("CFLAGS"), Some("-O2"));
  }

  #[test]
  fn ops_deserialize_from_toml() {
    #[derive(Deserialize)]
    struct Doc {
      env: Vec<EnvOp>,
    }

    let doc: Doc = toml::from_str(
      r#"
        env = [
          { op = "append", var = "LD_LIBRARY_PATH", value = "$${prefix}/lib", sep = ":" },
          { op = "append", var = "LDFLAGS", value = "-shared" },
          { op = "restore", var = "LDFLAGS" },
        ]
      "#,
    )
    .unwrap();

    assert_eq!(doc.env[0], append("LD_LIBRARY_PATH", "$${prefix}/lib", ":"));
    assert_eq!(doc.env[1], append("LDFLAGS", "-shared", " "));
    assert_eq!(doc.env[2], restore("LDFLAGS"));
  }

  #[test]
  fn with_value_keeps_separator() {
    let op = append("LD_LIBRARY_PATH", "$${prefix}/lib", ":");
    assert_eq!(
      op.with_value("/opt/fs/lib".to_string()),
      append("LD_LIBRARY_PATH", "/opt/fs/lib", ":")
    );
    assert_eq!(restore("LDFLAGS").with_value("ignored".to_string()), restore("LDFLAGS"));
  }
}
