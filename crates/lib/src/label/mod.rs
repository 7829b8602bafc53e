//! Addressing values: [`Label`] for targets, packages and files, and
//! [`LabelPath`] for slash-separated paths inside a depmap.
//!
//! A label is one of three forms, decided entirely by its prefix:
//!
//! - workspace-absolute: `@workspace//package:target`
//! - workspace-relative: `//package:target`
//! - package-relative: anything else, e.g. `:file.txt` or `sub/dir`
//!
//! Every operation here is a pure function of the label's string form.

mod path;

pub use path::LabelPath;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codec::{deserialize_sentinel_string, serialize_sentinel};
use crate::consts::{BUILTIN_WORKSPACE, LABEL_SENTINEL};
use crate::workspace::WorkspaceLayout;

/// Malformed addresses and paths.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LabelError {
  #[error("labels must not be empty")]
  Empty,

  #[error("label {label:?} contains invalid character {character:?}")]
  InvalidCharacter { label: String, character: char },

  #[error("label {0:?} has a malformed workspace prefix, expected @name//")]
  MalformedWorkspace(String),

  #[error("label {0:?} must not start with a single slash")]
  LeadingSlash(String),

  #[error("label {0:?} must be workspace absolute")]
  NotWorkspaceAbsolute(String),

  #[error("label {label:?} is not beneath {ancestor:?}")]
  NotDescendant { label: String, ancestor: String },

  #[error("path {0:?} escapes the root")]
  EscapesRoot(String),

  #[error("path {0:?} must be relative")]
  AbsolutePath(String),

  #[error("unsupported glob pattern {0:?}")]
  InvalidGlob(String),
}

/// Which of the three label forms a label takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LabelKind {
  PackageRelative,
  WorkspaceRelative,
  WorkspaceAbsolute,
}

/// An immutable, string-backed build address.
///
/// Labels compare and hash by their string form.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Label(String);

impl Label {
  /// Parse and validate a label.
  pub fn new(repr: impl Into<String>) -> Result<Label, LabelError> {
    let repr = repr.into();
    if repr.is_empty() {
      return Err(LabelError::Empty);
    }
    if let Some(character) = repr.chars().find(|c| c.is_whitespace() || c.is_control()) {
      return Err(LabelError::InvalidCharacter { label: repr, character });
    }
    if repr.starts_with('@') {
      let name_len = match repr.find("//") {
        Some(idx) => idx - 1,
        None => return Err(LabelError::MalformedWorkspace(repr)),
      };
      let name = &repr[1..1 + name_len];
      if name.is_empty() || name.contains(['/', ':']) {
        return Err(LabelError::MalformedWorkspace(repr));
      }
    } else if repr.starts_with('/') && !repr.starts_with("//") {
      return Err(LabelError::LeadingSlash(repr));
    }
    Ok(Label(repr))
  }

  /// Wrap a string already known to be a valid label.
  fn from_joined(repr: String) -> Label {
    Label(repr)
  }

  /// `@trellis.builtin//:<file>`
  pub(crate) fn builtin_file(file: &str) -> Label {
    Label(format!("@{}//:{}", BUILTIN_WORKSPACE, file))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  pub fn kind(&self) -> LabelKind {
    if self.0.starts_with('@') {
      LabelKind::WorkspaceAbsolute
    } else if self.0.starts_with("//") {
      LabelKind::WorkspaceRelative
    } else {
      LabelKind::PackageRelative
    }
  }

  pub fn is_package_relative(&self) -> bool {
    self.kind() == LabelKind::PackageRelative
  }

  pub fn is_workspace_relative(&self) -> bool {
    self.kind() == LabelKind::WorkspaceRelative
  }

  pub fn is_workspace_absolute(&self) -> bool {
    self.kind() == LabelKind::WorkspaceAbsolute
  }

  /// The workspace name of a workspace-absolute label.
  pub fn workspace_name(&self) -> Option<&str> {
    if !self.is_workspace_absolute() {
      return None;
    }
    self.0.find("//").map(|idx| &self.0[1..idx])
  }

  /// Length of the `@name//` or `//` prefix.
  fn root_len(&self) -> usize {
    match self.kind() {
      LabelKind::WorkspaceAbsolute => self.0.find("//").map_or(0, |idx| idx + 2),
      LabelKind::WorkspaceRelative => 2,
      LabelKind::PackageRelative => 0,
    }
  }

  /// The last `/`- or `:`-separated segment.
  pub fn file_name(&self) -> &str {
    let rest = &self.0[self.root_len()..];
    match rest.rfind(is_separator) {
      Some(idx) => &rest[idx + 1..],
      None => rest,
    }
  }

  /// Resolve `rhs` against this label.
  ///
  /// Workspace-absolute right-hand sides are returned verbatim, workspace-relative
  /// ones are re-anchored to this label's workspace, and anything else is appended
  /// with exactly one separator.
  pub fn join(&self, rhs: &Label) -> Label {
    match rhs.kind() {
      LabelKind::WorkspaceAbsolute => rhs.clone(),
      LabelKind::WorkspaceRelative => match self.workspace_name() {
        Some(workspace) => Label::from_joined(format!("@{}{}", workspace, rhs.0)),
        None => rhs.clone(),
      },
      LabelKind::PackageRelative => {
        if rhs.0.starts_with(':') {
          Label::from_joined(format!("{}{}", self.trim_trailing_slashes(), rhs.0))
        } else if self.0.ends_with(is_separator) {
          Label::from_joined(format!("{}{}", self.0, rhs.0))
        } else {
          Label::from_joined(format!("{}/{}", self.0, rhs.0))
        }
      }
    }
  }

  /// Parse `rhs` and [`join`](Self::join) it.
  pub fn join_str(&self, rhs: &str) -> Result<Label, LabelError> {
    Ok(self.join(&Label::new(rhs)?))
  }

  /// Address of the output tree of the action `action_id` owned by this target.
  pub fn join_action(&self, action_id: &str) -> Label {
    if self.0.ends_with('/') && !self.0.ends_with("//") {
      Label::from_joined(format!("{}:{}", &self.0[..self.0.len() - 1], action_id))
    } else {
      Label::from_joined(format!("{}:{}", self.0, action_id))
    }
  }

  fn trim_trailing_slashes(&self) -> &str {
    let root = self.root_len();
    let mut end = self.0.len();
    while end > root && self.0[..end].ends_with('/') {
      end -= 1;
    }
    &self.0[..end]
  }

  /// The label with its last segment removed.
  ///
  /// The parent of a top-level package is its workspace root (`//` or `@name//`).
  pub fn parent(&self) -> Option<Label> {
    let root = self.root_len();
    let rest = &self.0[root..];
    if rest.is_empty() {
      return None;
    }
    match rest.rfind(is_separator) {
      Some(idx) => Some(Label::from_joined(self.0[..root + idx].to_string())),
      None if root > 0 => Some(Label::from_joined(self.0[..root].to_string())),
      None => None,
    }
  }

  /// The package portion of a target label (everything before the first `:`).
  pub fn package(&self) -> Option<Label> {
    let root = self.root_len();
    self.0[root..]
      .find(':')
      .map(|idx| Label::from_joined(self.0[..root + idx].to_string()))
  }

  /// Map a workspace-absolute label to where its source file lives on disk.
  pub fn to_source_file_path(&self, layout: &WorkspaceLayout) -> Result<PathBuf, LabelError> {
    let workspace = self
      .workspace_name()
      .ok_or_else(|| LabelError::NotWorkspaceAbsolute(self.0.clone()))?;
    let relative = self.0[self.root_len()..].replace(':', "/");
    let relative = relative.trim_start_matches('/');

    let base = if workspace == BUILTIN_WORKSPACE {
      layout.builtin_root.clone()
    } else {
      layout.workspaces_root.join(workspace)
    };
    if relative.is_empty() {
      Ok(base)
    } else {
      Ok(base.join(relative))
    }
  }

  /// Express this label as a package-relative label beneath `ancestor`.
  pub fn relative_to(&self, ancestor: &Label, layout: &WorkspaceLayout) -> Result<Label, LabelError> {
    let own = self.to_source_file_path(layout)?;
    let base = ancestor.to_source_file_path(layout)?;
    let not_descendant = || LabelError::NotDescendant {
      label: self.0.clone(),
      ancestor: ancestor.0.clone(),
    };
    let relative = own.strip_prefix(&base).map_err(|_| not_descendant())?;
    let relative = relative.to_str().ok_or_else(not_descendant)?;
    Label::new(relative)
  }
}

fn is_separator(c: char) -> bool {
  c == '/' || c == ':'
}

impl fmt::Display for Label {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl fmt::Debug for Label {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Label({:?})", self.0)
  }
}

impl FromStr for Label {
  type Err = LabelError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Label::new(s)
  }
}

impl TryFrom<&str> for Label {
  type Error = LabelError;

  fn try_from(s: &str) -> Result<Self, Self::Error> {
    Label::new(s)
  }
}

impl TryFrom<String> for Label {
  type Error = LabelError;

  fn try_from(s: String) -> Result<Self, Self::Error> {
    Label::new(s)
  }
}

impl AsRef<str> for Label {
  fn as_ref(&self) -> &str {
    &self.0
  }
}

impl Serialize for Label {
  fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
  where
    S: serde::Serializer,
  {
    serialize_sentinel(serializer, LABEL_SENTINEL, &self.0)
  }
}

impl<'de> Deserialize<'de> for Label {
  fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
  where
    D: serde::Deserializer<'de>,
  {
    let repr = deserialize_sentinel_string(deserializer, LABEL_SENTINEL)?;
    Label::new(repr).map_err(serde::de::Error::custom)
  }
}
