//! Where workspaces live on disk.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::consts::{
  BUILTIN_ROOT_ENV, BUILTIN_WORKSPACE, DEFAULT_BUILTIN_ROOT, DEFAULT_WORKSPACES_ROOT, WORKSPACES_ROOT_ENV,
};
use crate::label::{Label, LabelError};

/// Filesystem roots used to map workspace-absolute labels to source paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceLayout {
  /// Directory containing one subdirectory per named workspace.
  pub workspaces_root: PathBuf,
  /// Installation directory of the builtin workspace.
  pub builtin_root: PathBuf,
}

impl Default for WorkspaceLayout {
  fn default() -> Self {
    WorkspaceLayout {
      workspaces_root: PathBuf::from(DEFAULT_WORKSPACES_ROOT),
      builtin_root: PathBuf::from(DEFAULT_BUILTIN_ROOT),
    }
  }
}

impl WorkspaceLayout {
  /// The default layout, with each root overridable through its environment variable.
  pub fn from_env() -> Self {
    let mut layout = WorkspaceLayout::default();
    if let Some(root) = std::env::var_os(WORKSPACES_ROOT_ENV) {
      layout.workspaces_root = PathBuf::from(root);
    }
    if let Some(root) = std::env::var_os(BUILTIN_ROOT_ENV) {
      layout.builtin_root = PathBuf::from(root);
    }
    layout
  }

  /// Map a source file path back to a workspace-absolute label.
  ///
  /// The whole path below the workspace directory becomes the target part of
  /// the label, e.g. `/workspaces/ws/rules/copy.rs` is `@ws//:rules/copy.rs`.
  pub fn label_for_path(&self, path: &Path) -> Result<Label, LabelError> {
    let outside = || LabelError::NotWorkspaceAbsolute(path.display().to_string());

    let (workspace, relative) = if let Ok(relative) = path.strip_prefix(&self.builtin_root) {
      (BUILTIN_WORKSPACE.to_string(), relative.to_path_buf())
    } else {
      let relative = path.strip_prefix(&self.workspaces_root).map_err(|_| outside())?;
      let mut components = relative.components();
      let workspace = components
        .next()
        .and_then(|c| c.as_os_str().to_str())
        .ok_or_else(outside)?
        .to_string();
      (workspace, components.as_path().to_path_buf())
    };

    let relative = relative.to_str().ok_or_else(outside)?;
    if relative.is_empty() {
      Label::new(format!("@{}//", workspace))
    } else {
      Label::new(format!("@{}//:{}", workspace, relative))
    }
  }
}
