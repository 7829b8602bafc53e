use std::fmt;

use serde::{Deserialize, Serialize};

use super::LabelError;
use crate::codec::{deserialize_sentinel_string, serialize_sentinel};
use crate::consts::LABEL_PATH_SENTINEL;

/// A slash-separated path relative to some label, used inside depmaps.
///
/// `"."` and `""` both denote the root.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LabelPath(String);

impl LabelPath {
  pub fn new(repr: impl Into<String>) -> LabelPath {
    let repr = repr.into();
    if repr == "." {
      LabelPath(String::new())
    } else {
      LabelPath(repr)
    }
  }

  pub fn root() -> LabelPath {
    LabelPath(String::new())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  pub fn is_root(&self) -> bool {
    self.0.is_empty()
  }

  pub fn is_absolute(&self) -> bool {
    self.0.starts_with('/')
  }

  /// Non-empty components, with `.` segments still present.
  pub fn components(&self) -> impl Iterator<Item = &str> {
    self.0.split('/').filter(|c| !c.is_empty())
  }

  /// The final component, or `""` for the root.
  pub fn name(&self) -> &str {
    self.components().last().unwrap_or("")
  }

  pub fn parent(&self) -> LabelPath {
    let mut components: Vec<&str> = self.components().collect();
    components.pop();
    let joined = components.join("/");
    if self.is_absolute() {
      LabelPath(format!("/{}", joined))
    } else {
      LabelPath(joined)
    }
  }

  pub fn join(&self, rhs: &LabelPath) -> LabelPath {
    if rhs.is_absolute() || self.is_root() {
      return rhs.clone();
    }
    if rhs.is_root() {
      return self.clone();
    }
    LabelPath(format!("{}/{}", self.0.trim_end_matches('/'), rhs.0))
  }

  /// Strip `base` from the front of this path, component-wise.
  pub fn relative_to(&self, base: &LabelPath) -> Option<LabelPath> {
    if self.is_absolute() != base.is_absolute() {
      return None;
    }
    let mut own = self.components();
    for expected in base.components() {
      if own.next() != Some(expected) {
        return None;
      }
    }
    Some(LabelPath(own.collect::<Vec<_>>().join("/")))
  }

  /// Lexically collapse `.` and `..` segments.
  ///
  /// Leading `..` segments of a relative path are kept; `..` at the root of an
  /// absolute path is dropped.
  pub fn normalize(&self) -> LabelPath {
    let mut stack: Vec<&str> = Vec::new();
    for component in self.components() {
      match component {
        "." => {}
        ".." => match stack.last() {
          Some(&last) if last != ".." => {
            stack.pop();
          }
          _ if self.is_absolute() => {}
          _ => stack.push(".."),
        },
        other => stack.push(other),
      }
    }
    let joined = stack.join("/");
    if self.is_absolute() {
      LabelPath(format!("/{}", joined))
    } else {
      LabelPath(joined)
    }
  }

  /// Normalize, rejecting absolute paths and paths that climb above their root.
  pub fn normalize_require_descending(&self) -> Result<LabelPath, LabelError> {
    if self.is_absolute() {
      return Err(LabelError::AbsolutePath(self.0.clone()));
    }
    let normalized = self.normalize();
    if normalized.components().any(|c| c == "..") {
      return Err(LabelError::EscapesRoot(self.0.clone()));
    }
    Ok(normalized)
  }
}

impl fmt::Display for LabelPath {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl fmt::Debug for LabelPath {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "LabelPath({:?})", self.0)
  }
}

impl From<&str> for LabelPath {
  fn from(s: &str) -> Self {
    LabelPath::new(s)
  }
}

impl From<String> for LabelPath {
  fn from(s: String) -> Self {
    LabelPath::new(s)
  }
}

impl AsRef<str> for LabelPath {
  fn as_ref(&self) -> &str {
    &self.0
  }
}

impl Serialize for LabelPath {
  fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
  where
    S: serde::Serializer,
  {
    serialize_sentinel(serializer, LABEL_PATH_SENTINEL, &self.0)
  }
}

impl<'de> Deserialize<'de> for LabelPath {
  fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
  where
    D: serde::Deserializer<'de>,
  {
    deserialize_sentinel_string(deserializer, LABEL_PATH_SENTINEL).map(LabelPath::new)
  }
}
