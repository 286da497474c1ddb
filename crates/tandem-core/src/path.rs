//! Field-tree paths and the prefix algebra used to route change events.
//!
//! A path addresses a value inside a document snapshot, e.g.
//! `["fields", "title", "en-US"]`. The empty path addresses the whole
//! document.

use std::fmt;

use serde::{Deserialize, Serialize};

// ─── Segment ─────────────────────────────────────────────────────────────────

/// One step into a JSON value: an object key or a list index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Segment {
  Index(usize),
  Key(String),
}

impl Segment {
  /// The segment as a list index. Numeric keys are accepted so that paths
  /// round-tripped through string-only transports still address lists.
  pub fn as_index(&self) -> Option<usize> {
    match self {
      Self::Index(i) => Some(*i),
      Self::Key(k) => k.parse().ok(),
    }
  }

  /// The segment as an object key.
  pub fn as_key(&self) -> String {
    match self {
      Self::Index(i) => i.to_string(),
      Self::Key(k) => k.clone(),
    }
  }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      Self::Key(k) => Some(k),
      Self::Index(_) => None,
    }
  }
}

impl fmt::Display for Segment {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Index(i) => write!(f, "{i}"),
      Self::Key(k) => f.write_str(k),
    }
  }
}

impl From<&str> for Segment {
  fn from(key: &str) -> Self { Self::Key(key.to_owned()) }
}

impl From<String> for Segment {
  fn from(key: String) -> Self { Self::Key(key) }
}

impl From<usize> for Segment {
  fn from(index: usize) -> Self { Self::Index(index) }
}

// ─── Path ────────────────────────────────────────────────────────────────────

/// The key under which entity field values live in a snapshot.
pub const FIELDS_KEY: &str = "fields";

/// An ordered list of segments from the document root.
#[derive(
  Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Path(Vec<Segment>);

impl Path {
  /// The empty path, addressing the whole document.
  pub fn root() -> Self { Self(Vec::new()) }

  /// `["fields"]`.
  pub fn fields() -> Self { Self(vec![Segment::from(FIELDS_KEY)]) }

  /// `["fields", field_id, locale_code]`.
  pub fn field_locale(field_id: &str, locale_code: &str) -> Self {
    Self(vec![
      Segment::from(FIELDS_KEY),
      Segment::from(field_id),
      Segment::from(locale_code),
    ])
  }

  pub fn segments(&self) -> &[Segment] { &self.0 }

  pub fn len(&self) -> usize { self.0.len() }

  pub fn is_empty(&self) -> bool { self.0.is_empty() }

  /// A new path with `segment` appended.
  pub fn child(&self, segment: impl Into<Segment>) -> Self {
    let mut segments = self.0.clone();
    segments.push(segment.into());
    Self(segments)
  }

  /// Split into the parent path and the final segment. `None` for the root.
  pub fn split_last(&self) -> Option<(&[Segment], &Segment)> {
    self.0.split_last().map(|(last, parent)| (parent, last))
  }

  /// The field id when this path points into the `fields` subtree.
  pub fn field_id(&self) -> Option<&str> {
    match self.0.as_slice() {
      [Segment::Key(root), field, ..] if root == FIELDS_KEY => field.as_str(),
      _ => None,
    }
  }

  /// The locale code when this path points at or below a field locale.
  pub fn locale_code(&self) -> Option<&str> {
    match self.0.as_slice() {
      [Segment::Key(root), _, locale, ..] if root == FIELDS_KEY => {
        locale.as_str()
      }
      _ => None,
    }
  }

  /// Stable string form used to memoize per-path state.
  pub fn memo_key(&self) -> String {
    serde_json::to_string(&self.0).unwrap_or_else(|_| self.to_string())
  }
}

impl fmt::Display for Path {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("[")?;
    for (i, segment) in self.0.iter().enumerate() {
      if i > 0 {
        f.write_str(".")?;
      }
      write!(f, "{segment}")?;
    }
    f.write_str("]")
  }
}

impl From<Vec<Segment>> for Path {
  fn from(segments: Vec<Segment>) -> Self { Self(segments) }
}

impl<S: Into<Segment>, const N: usize> From<[S; N]> for Path {
  fn from(segments: [S; N]) -> Self {
    Self(segments.into_iter().map(Into::into).collect())
  }
}

impl FromIterator<Segment> for Path {
  fn from_iter<I: IntoIterator<Item = Segment>>(iter: I) -> Self {
    Self(iter.into_iter().collect())
  }
}

// ─── Prefix algebra ──────────────────────────────────────────────────────────

/// True if `prefix` is a (non-strict) prefix of `path`.
pub fn is_prefix(prefix: &Path, path: &Path) -> bool {
  path.0.starts_with(&prefix.0)
}

/// True if a change at `changed` can alter the value visible at `observed`,
/// i.e. one path is a prefix of the other.
pub fn is_affecting(changed: &Path, observed: &Path) -> bool {
  is_prefix(changed, observed) || is_prefix(observed, changed)
}

/// The longest prefix shared by every path. Empty if `paths` is empty or the
/// paths diverge at the root.
pub fn find_common_prefix(paths: &[Path]) -> Path {
  let Some((first, rest)) = paths.split_first() else {
    return Path::root();
  };
  let shared = rest.iter().fold(first.len(), |len, path| {
    first
      .0
      .iter()
      .zip(&path.0)
      .take(len)
      .take_while(|(a, b)| a == b)
      .count()
  });
  Path(first.0[..shared].to_vec())
}
