//! Placeholder parsing and substitution for manifest templates.
//!
//! Build steps, environment values and install paths in a manifest are
//! templates. Values that are only known at provisioning time (the prefix,
//! the unpacked source tree, the interpreter) are written as placeholders and
//! substituted right before use.
//!
//! # Placeholder Formats
//!
//! - `$${prefix}` - the installation directory
//! - `$${staging}` - the staging directory holding unpacked sources
//! - `$${src}` - the current package's unpacked source tree
//! - `$${archive}` - the current package's downloaded archive
//! - `$${name}` / `$${version}` - the current package's identity
//! - `$${python}` - the Python interpreter used for `setup.py` builds
//! - `$${jobs}` - the parallelism handed to `make -j`
//!
//! # Shell Variables
//!
//! Single `$` characters pass through unchanged, so shell variables like
//! `$HOME` and `$LDFLAGS` work naturally without any escaping.
//!
//! # Escaping
//!
//! Use `$$$` before `{` to produce a literal `$${` sequence.
//!
//! # Example
//!
//! ```
//! use fsprov_lib::placeholder::{parse, Segment, Placeholder};
//!
//! let segments = parse("$${prefix}/lib:$LD_LIBRARY_PATH").unwrap();
//! assert_eq!(segments, vec![
//!     Segment::Placeholder(Placeholder::Prefix),
//!     Segment::Literal("/lib:$LD_LIBRARY_PATH".to_string()),
//! ]);
//! ```

use std::fmt;

use thiserror::Error;

/// A parsed placeholder reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
  Prefix,
  Staging,
  Src,
  Archive,
  Name,
  Version,
  Python,
  Jobs,
}

impl Placeholder {
  fn from_name(name: &str) -> Option<Self> {
    let placeholder = match name {
      "prefix" => Placeholder::Prefix,
      "staging" => Placeholder::Staging,
      "src" => Placeholder::Src,
      "archive" => Placeholder::Archive,
      "name" => Placeholder::Name,
      "version" => Placeholder::Version,
      "python" => Placeholder::Python,
      "jobs" => Placeholder::Jobs,
      _ => return None,
    };
    Some(placeholder)
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Placeholder::Prefix => "prefix",
      Placeholder::Staging => "staging",
      Placeholder::Src => "src",
      Placeholder::Archive => "archive",
      Placeholder::Name => "name",
      Placeholder::Version => "version",
      Placeholder::Python => "python",
      Placeholder::Jobs => "jobs",
    }
  }
}

impl fmt::Display for Placeholder {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A segment of parsed text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
  /// Literal text (no placeholders)
  Literal(String),

  /// A placeholder to be resolved
  Placeholder(Placeholder),
}

/// Errors that can occur during placeholder parsing or resolution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaceholderError {
  #[error("unclosed placeholder at position {0}")]
  Unclosed(usize),

  #[error("unknown placeholder: {0}")]
  Unknown(String),

  #[error("placeholder '{0}' has no value in this context")]
  Unresolved(Placeholder),
}

/// Trait for resolving placeholder values during provisioning.
pub trait Resolver {
  /// Resolve a placeholder to its value.
  fn resolve(&self, placeholder: Placeholder) -> Result<&str, PlaceholderError>;
}

/// Parse a string containing placeholders into segments.
///
/// # Errors
///
/// Returns an error if a placeholder is unclosed or names an unknown value.
pub fn parse(input: &str) -> Result<Vec<Segment>, PlaceholderError> {
  let mut segments = Vec::new();
  let mut literal = String::new();
  let mut chars = input.char_indices().peekable();

  while let Some((pos, ch)) = chars.next() {
    if ch != '$' {
      literal.push(ch);
      continue;
    }

    match chars.peek() {
      Some((_, '$')) => {
        chars.next();

        match chars.peek() {
          Some((_, '$')) => {
            chars.next();

            match chars.peek() {
              Some((_, '{')) => {
                // $$${ -> literal $${
                literal.push_str("$${");
                chars.next();
              }
              _ => literal.push_str("$$$"),
            }
          }
          Some((_, '{')) => {
            chars.next();

            if !literal.is_empty() {
              segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }

            let mut name = String::new();
            let mut found_close = false;

            for (_, c) in chars.by_ref() {
              if c == '}' {
                found_close = true;
                break;
              }
              name.push(c);
            }

            if !found_close {
              return Err(PlaceholderError::Unclosed(pos));
            }

            let placeholder = Placeholder::from_name(name.trim()).ok_or(PlaceholderError::Unknown(name))?;
            segments.push(Segment::Placeholder(placeholder));
          }
          _ => literal.push_str("$$"),
        }
      }
      // Lone $: shell variable, pass through
      _ => literal.push('$'),
    }
  }

  if !literal.is_empty() {
    segments.push(Segment::Literal(literal));
  }

  Ok(segments)
}

/// Check that a template parses, without resolving anything.
pub fn validate(input: &str) -> Result<(), PlaceholderError> {
  parse(input).map(|_| ())
}

/// Substitute all placeholders in a string using the provided resolver.
///
/// # Errors
///
/// Returns an error if parsing fails or if any placeholder cannot be resolved.
pub fn substitute(input: &str, resolver: &impl Resolver) -> Result<String, PlaceholderError> {
  let segments = parse(input)?;
  substitute_segments(&segments, resolver)
}

/// Substitute placeholders in pre-parsed segments.
pub fn substitute_segments(segments: &[Segment], resolver: &impl Resolver) -> Result<String, PlaceholderError> {
  let mut result = String::new();

  for segment in segments {
    match segment {
      Segment::Literal(s) => result.push_str(s),
      Segment::Placeholder(p) => result.push_str(resolver.resolve(*p)?),
    }
  }

  Ok(result)
}
