//! Content-addressed build actions.
//!
//! An [`Action`] is declarative: analysis records it and the host engine runs
//! it later. Its id is the SHA-256 of its canonical JSON form with the id
//! field itself held empty, so identical work always gets the same id and the
//! host can deduplicate it across targets.
//!
//! Actions are recorded on a [`RuleContext`](crate::rule::RuleContext), which
//! is also where their outputs are awaited.

mod types;

pub use types::*;

use std::cell::OnceCell;

use serde::{Deserialize, Serialize};

use crate::depmap::ConcreteDepmap;
use crate::error::AnalysisResult;
use crate::label::Label;
use crate::provider::Provider;
use crate::protocol::{HostFile, Request, Response};
use crate::task::request;
use crate::util::hash::{HashError, Hashable};

/// A declared unit of build work.
///
/// # Identity
///
/// When no explicit id is given, [`id`](Action::id) hashes the action's
/// discriminant, mnemonic, progress message and every variant field. The hash
/// is cached until a field changes, so it always matches the wire form.
#[derive(Debug, Clone)]
pub struct Action {
  explicit_id: Option<String>,
  computed_id: OnceCell<String>,
  mnemonic: String,
  progress_message: String,
  data: ActionData,
}

/// Wire form shared by serialization and id hashing.
#[derive(Serialize)]
struct ActionRepr<'a> {
  id: &'a str,
  mnemonic: &'a str,
  progress_message: &'a str,
  #[serde(flatten)]
  data: &'a ActionData,
}

impl Hashable for ActionRepr<'_> {}

#[derive(Deserialize)]
struct ActionOwned {
  #[serde(default)]
  id: String,
  mnemonic: String,
  progress_message: String,
  #[serde(flatten)]
  data: ActionData,
}

impl Action {
  /// An action with the default mnemonic and progress message for its kind.
  pub fn new(data: impl Into<ActionData>) -> Self {
    let data = data.into();
    Action {
      explicit_id: None,
      computed_id: OnceCell::new(),
      mnemonic: data.default_mnemonic(),
      progress_message: data.default_progress_message(),
      data,
    }
  }

  /// Pin the id instead of deriving it from content.
  pub fn with_id(mut self, id: impl Into<String>) -> Self {
    self.explicit_id = Some(id.into());
    self
  }

  pub fn with_mnemonic(mut self, mnemonic: impl Into<String>) -> Self {
    self.mnemonic = mnemonic.into();
    self.computed_id = OnceCell::new();
    self
  }

  pub fn with_progress_message(mut self, message: impl Into<String>) -> Self {
    self.progress_message = message.into();
    self.computed_id = OnceCell::new();
    self
  }

  pub fn kind(&self) -> &'static str {
    self.data.kind()
  }

  pub fn mnemonic(&self) -> &str {
    &self.mnemonic
  }

  pub fn progress_message(&self) -> &str {
    &self.progress_message
  }

  pub fn data(&self) -> &ActionData {
    &self.data
  }

  /// The effective id: explicit if given, otherwise the content hash.
  pub fn id(&self) -> Result<&str, HashError> {
    if let Some(id) = &self.explicit_id {
      return Ok(id.as_str());
    }
    if let Some(id) = self.computed_id.get() {
      return Ok(id.as_str());
    }
    let hash = ActionRepr {
      id: "",
      mnemonic: &self.mnemonic,
      progress_message: &self.progress_message,
      data: &self.data,
    }
    .compute_hash()?;
    Ok(self.computed_id.get_or_init(|| hash.0).as_str())
  }

  /// Address of this action's output tree for the target `owner`.
  pub fn files(&self, owner: &Label) -> Result<Label, HashError> {
    Ok(owner.join_action(self.id()?))
  }

  /// Whether this is a `Run` action still waiting for an execution platform.
  pub(crate) fn needs_platform(&self) -> bool {
    matches!(&self.data, ActionData::Run(run) if run.platform.is_none())
  }

  /// Fill in the execution platform of a `Run` action that has none.
  ///
  /// The platform is part of the content, so a derived id is recomputed.
  pub(crate) fn fill_platform(&mut self, platform: Provider) {
    if let ActionData::Run(run) = &mut self.data {
      if run.platform.is_none() {
        run.platform = Some(platform);
        self.computed_id = OnceCell::new();
      }
    }
  }
}

impl PartialEq for Action {
  fn eq(&self, other: &Self) -> bool {
    self.id().ok() == other.id().ok()
      && self.mnemonic == other.mnemonic
      && self.progress_message == other.progress_message
      && self.data == other.data
  }
}

impl Serialize for Action {
  fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    let id = self.id().map_err(serde::ser::Error::custom)?;
    ActionRepr {
      id,
      mnemonic: &self.mnemonic,
      progress_message: &self.progress_message,
      data: &self.data,
    }
    .serialize(serializer)
  }
}

impl<'de> Deserialize<'de> for Action {
  fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let owned = ActionOwned::deserialize(deserializer)?;
    Ok(Action {
      explicit_id: (!owned.id.is_empty()).then_some(owned.id),
      computed_id: OnceCell::new(),
      mnemonic: owned.mnemonic,
      progress_message: owned.progress_message,
      data: owned.data,
    })
  }
}

/// What the host reports once an action has run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionOutput {
  /// The output tree.
  pub files: ConcreteDepmap,
  /// Content reference of captured stdout, if any.
  pub stdout: Option<String>,
  /// Content reference of captured stderr, if any.
  pub stderr: Option<String>,
}

impl ActionOutput {
  /// Open captured stdout. `None` if nothing was captured.
  pub async fn open_stdout(&self) -> AnalysisResult<Option<HostFile>> {
    open_content_ref(self.stdout.as_deref()).await
  }

  /// Open captured stderr. `None` if nothing was captured.
  pub async fn open_stderr(&self) -> AnalysisResult<Option<HostFile>> {
    open_content_ref(self.stderr.as_deref()).await
  }
}

async fn open_content_ref(hash: Option<&str>) -> AnalysisResult<Option<HostFile>> {
  let Some(hash) = hash else {
    return Ok(None);
  };
  match request(Request::ContentRefOpen { hash: hash.to_string() }).await? {
    Response::FileHandle { fileno } => Ok(Some(HostFile::adopt(fileno))),
    other => Err(other.unexpected("content_ref_open").into()),
  }
}
