//! Shared utilities.

pub mod hash;

use std::path::{Component, Path};

/// True when `value` names exactly one entry inside a directory.
///
/// Rejects empty values, `.`, `..`, absolute paths and anything with a
/// separator on either platform.
pub fn is_plain_name(value: &str) -> bool {
  if value.contains(['/', '\\']) {
    return false;
  }
  let mut components = Path::new(value).components();
  matches!(
    (components.next(), components.next()),
    (Some(Component::Normal(_)), None)
  )
}
