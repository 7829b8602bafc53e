//! References to rule, provider and option types.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::label::Label;

/// Identifies a type by where it is defined and its qualified name.
///
/// Types are compared by reference rather than by value so that definitions
/// loaded independently in different processes still compare equal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TypeRef {
  pub source_label: Label,
  pub qualname: String,
}

impl TypeRef {
  pub fn new(source_label: Label, qualname: impl Into<String>) -> Self {
    TypeRef {
      source_label,
      qualname: qualname.into(),
    }
  }

  /// A type defined in the builtin workspace.
  pub fn builtin(file: &str, qualname: impl Into<String>) -> Self {
    TypeRef::new(Label::builtin_file(file), qualname)
  }
}

impl fmt::Display for TypeRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} in {}", self.qualname, self.source_label)
  }
}
