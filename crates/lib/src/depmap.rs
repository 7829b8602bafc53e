//! Depmaps: declarative overlay trees used as action inputs and outputs.
//!
//! A [`DepmapBuilder`] collects `(path, entry)` pairs in order and turns them
//! into a `BuildDepmap` action; later entries overlay earlier ones. Once the
//! host has materialized a depmap it is visible to analysis as a read-only
//! [`ConcreteDepmap`].

use serde::{Deserialize, Serialize};

use crate::error::{AnalysisResult, LabelError, ResolveError};
use crate::label::{Label, LabelPath};
use crate::protocol::{HostFile, Request, Response};
use crate::rule::RuleContext;
use crate::task::request;

/// One overlay applied at a path of a depmap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepmapEntry {
  /// The whole tree addressed by a label.
  Reference(Label),
  /// An empty directory.
  Directory {},
  /// A file with literal contents.
  File { content: String, executable: bool },
  Symlink { target: String },
  /// The entries of `base` whose paths match any of `patterns`, placed under
  /// `prefix`. Patterns are anchored regular expressions.
  Filter {
    base: Label,
    prefix: LabelPath,
    patterns: Vec<String>,
  },
}

impl DepmapEntry {
  pub fn directory() -> Self {
    DepmapEntry::Directory {}
  }

  pub fn file(content: impl Into<String>, executable: bool) -> Self {
    DepmapEntry::File {
      content: content.into(),
      executable,
    }
  }

  pub fn symlink(target: impl Into<String>) -> Self {
    DepmapEntry::Symlink { target: target.into() }
  }

  /// Files of `base` matching simple glob patterns.
  ///
  /// Supported forms are `*suffix`, `prefix*` and literal names. Patterns are
  /// translated here, so a malformed one fails before the depmap is built.
  pub fn glob<I, S>(base: Label, patterns: I) -> Result<Self, LabelError>
  where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
  {
    let patterns = patterns
      .into_iter()
      .map(|pattern| translate_glob(pattern.as_ref()))
      .collect::<Result<Vec<_>, _>>()?;
    Ok(DepmapEntry::Filter {
      base,
      prefix: LabelPath::root(),
      patterns,
    })
  }
}

impl From<Label> for DepmapEntry {
  fn from(label: Label) -> Self {
    DepmapEntry::Reference(label)
  }
}

fn translate_glob(glob: &str) -> Result<String, LabelError> {
  let invalid = || LabelError::InvalidGlob(glob.to_string());
  if let Some(suffix) = glob.strip_prefix('*') {
    if suffix.is_empty() || suffix.contains('*') {
      return Err(invalid());
    }
    Ok(format!("{}$", regex::escape(suffix)))
  } else if let Some(prefix) = glob.strip_suffix('*') {
    if prefix.is_empty() || prefix.contains('*') {
      return Err(invalid());
    }
    Ok(format!("^{}", regex::escape(prefix)))
  } else if !glob.is_empty() && !glob.contains('*') {
    Ok(format!("^{}$", regex::escape(glob)))
  } else {
    Err(invalid())
  }
}

/// Accumulates depmap entries for one target.
#[derive(Debug)]
pub struct DepmapBuilder<'a> {
  cx: &'a RuleContext,
  id: Option<String>,
  entries: Vec<(LabelPath, DepmapEntry)>,
}

impl<'a> DepmapBuilder<'a> {
  pub(crate) fn new(cx: &'a RuleContext, id: Option<&str>) -> Self {
    DepmapBuilder {
      cx,
      id: id.map(str::to_string),
      entries: Vec::new(),
    }
  }

  /// Place `entry` at `path`.
  ///
  /// Fails if `path` is absolute or climbs out of the depmap root.
  pub fn insert(&mut self, path: impl Into<LabelPath>, entry: impl Into<DepmapEntry>) -> Result<&mut Self, LabelError> {
    let path = path.into().normalize_require_descending()?;
    self.entries.push((path, entry.into()));
    Ok(self)
  }

  /// Overlay `entry` at the root.
  pub fn merge(&mut self, entry: impl Into<DepmapEntry>) -> &mut Self {
    self.entries.push((LabelPath::root(), entry.into()));
    self
  }

  pub fn entries(&self) -> &[(LabelPath, DepmapEntry)] {
    &self.entries
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Record the `BuildDepmap` action and return the address of its output.
  pub fn build(self) -> AnalysisResult<Label> {
    self.cx.record_depmap(self.id, self.entries)
  }
}

/// A depmap the host has materialized, addressed by content hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConcreteDepmap {
  hash: String,
}

impl ConcreteDepmap {
  pub fn new(hash: impl Into<String>) -> Self {
    ConcreteDepmap { hash: hash.into() }
  }

  pub fn hash(&self) -> &str {
    &self.hash
  }

  /// Open the file at `path`.
  pub async fn open_file(&self, path: impl Into<LabelPath>) -> AnalysisResult<HostFile> {
    let filename = path.into();
    let response = request(Request::ConcreteDepmapFileOpen {
      depmap: self.hash.clone(),
      filename: filename.clone(),
    })
    .await?;
    match response {
      Response::FileHandle { fileno } => Ok(HostFile::adopt(fileno)),
      Response::None => Err(
        ResolveError::DepmapFileNotFound {
          depmap: self.hash.clone(),
          path: filename.to_string(),
        }
        .into(),
      ),
      other => Err(other.unexpected("concrete_depmap_file_open").into()),
    }
  }

  /// Read the file at `path` as UTF-8.
  pub async fn file_contents(&self, path: impl Into<LabelPath>) -> AnalysisResult<String> {
    Ok(self.open_file(path).await?.read_to_string()?)
  }

  /// List the names in the directory at `path`.
  pub async fn iterdir(&self, path: impl Into<LabelPath>) -> AnalysisResult<Vec<LabelPath>> {
    let filename = path.into();
    let response = request(Request::ConcreteDepmapDirectoryList {
      depmap: self.hash.clone(),
      filename: filename.clone(),
    })
    .await?;
    match response {
      Response::FilenameList { filenames } => Ok(filenames),
      Response::None => Err(
        ResolveError::DepmapDirectoryNotFound {
          depmap: self.hash.clone(),
          path: filename.to_string(),
        }
        .into(),
      ),
      other => Err(other.unexpected("concrete_depmap_directory_list").into()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::codec::canonical_json;
  use crate::error::AnalysisError;
  use crate::task::{Step, Task};
  use crate::util::testutil::context;

  fn label(s: &str) -> Label {
    Label::new(s).unwrap()
  }

  mod globs {
    use super::*;

    #[test]
    fn star_prefix_anchors_at_end() {
      assert_eq!(translate_glob("*.rs").unwrap(), r"\.rs$");
    }

    #[test]
    fn star_suffix_anchors_at_start() {
      assert_eq!(translate_glob("lib*").unwrap(), "^lib");
    }

    #[test]
    fn literal_matches_exactly() {
      assert_eq!(translate_glob("BUILD").unwrap(), "^BUILD$");
    }

    #[test]
    fn other_patterns_fail_at_creation() {
      for pattern in ["*", "a*b*", "*a*", ""] {
        assert!(
          matches!(translate_glob(pattern), Err(LabelError::InvalidGlob(_))),
          "{:?} should be rejected",
          pattern
        );
      }
      assert!(DepmapEntry::glob(label("//src"), ["*.c", "**"]).is_err());
    }
  }

  #[test]
  fn entry_wire_forms() {
    assert_eq!(canonical_json(&DepmapEntry::directory()).unwrap(), r#"{"directory":{}}"#);
    assert_eq!(
      canonical_json(&DepmapEntry::from(label("//a"))).unwrap(),
      r#"{"reference":{"$trellis_label":"//a"}}"#
    );
    assert_eq!(
      canonical_json(&DepmapEntry::file("hi", true)).unwrap(),
      r#"{"file":{"content":"hi","executable":true}}"#
    );
    assert_eq!(
      canonical_json(&DepmapEntry::glob(label("//src"), ["*.c"]).unwrap()).unwrap(),
      r#"{"filter":{"base":{"$trellis_label":"//src"},"patterns":["\\.c$"],"prefix":{"$trellis_label_path":""}}}"#
    );
  }

  mod builder {
    use super::*;

    #[test]
    fn escaping_path_is_rejected_before_build() {
      let cx = context("//pkg:lib");
      let mut depmap = cx.new_depmap(None);
      assert!(matches!(
        depmap.insert("../x", DepmapEntry::directory()),
        Err(LabelError::EscapesRoot(_))
      ));
      assert!(matches!(
        depmap.insert("/etc/passwd", DepmapEntry::directory()),
        Err(LabelError::AbsolutePath(_))
      ));
      assert!(depmap.is_empty());
    }

    #[test]
    fn paths_are_normalized_and_merges_land_at_root() {
      let cx = context("//pkg:lib");
      let mut depmap = cx.new_depmap(None);
      depmap
        .insert("include/./a.h", DepmapEntry::file("", false))
        .unwrap()
        .merge(label("//dep:out"));
      assert_eq!(depmap.entries()[0].0, LabelPath::new("include/a.h"));
      assert_eq!(depmap.entries()[1].0, LabelPath::root());
    }

    #[test]
    fn build_records_action_and_returns_files() {
      let cx = context("//pkg:lib");
      let mut depmap = cx.new_depmap(Some("headers"));
      depmap.insert("a.h", DepmapEntry::file("", false)).unwrap();
      let files = depmap.build().unwrap();
      assert_eq!(files.as_str(), "//pkg:lib:headers");

      let actions = cx.actions();
      assert_eq!(actions.len(), 1);
      assert_eq!(actions[0].kind(), "build_depmap");
      assert_eq!(actions[0].mnemonic(), "BuildDepmap");
      assert_eq!(actions[0].progress_message(), "");
    }
  }

  mod concrete {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn file_contents_reads_host_descriptor() {
      let depmap = ConcreteDepmap::new("d1");
      let mut task = Task::new(async move { depmap.file_contents("lib/a.h").await });
      assert!(matches!(task.resume(vec![]).unwrap(), Step::Pending(_)));
      let fileno = crate::util::testutil::host_fd(b"#pragma once\n");
      match task.resume(vec![Response::FileHandle { fileno }]).unwrap() {
        Step::Done(Ok(contents)) => assert_eq!(contents, "#pragma once\n"),
        other => panic!("unexpected step {:?}", other),
      }
    }

    #[test]
    fn missing_file_is_not_found() {
      let depmap = ConcreteDepmap::new("d1");
      let mut task = Task::new(async move { depmap.open_file("missing.txt").await });
      assert!(matches!(task.resume(vec![]).unwrap(), Step::Pending(_)));
      match task.resume(vec![Response::None]).unwrap() {
        Step::Done(Err(AnalysisError::Resolve(ResolveError::DepmapFileNotFound { depmap, path }))) => {
          assert_eq!(depmap, "d1");
          assert_eq!(path, "missing.txt");
        }
        other => panic!("unexpected step {:?}", other),
      }
    }

    #[test]
    fn iterdir_returns_filenames() {
      let depmap = ConcreteDepmap::new("d1");
      let mut task = Task::new(async move { depmap.iterdir("lib").await });
      assert_eq!(
        task.resume(vec![]).unwrap(),
        Step::Pending(vec![Request::ConcreteDepmapDirectoryList {
          depmap: "d1".to_string(),
          filename: LabelPath::new("lib"),
        }])
      );
      let names = vec![LabelPath::new("a.so"), LabelPath::new("b.so")];
      assert_eq!(
        task.resume(vec![Response::FilenameList { filenames: names.clone() }]).unwrap(),
        Step::Done(Ok(names))
      );
    }

    #[test]
    fn wrong_response_kind_is_protocol_error() {
      let depmap = ConcreteDepmap::new("d1");
      let mut task = Task::new(async move { depmap.iterdir("lib").await });
      task.resume(vec![]).unwrap();
      assert!(matches!(
        task.resume(vec![Response::Boolean { value: true }]).unwrap(),
        Step::Done(Err(AnalysisError::Protocol(_)))
      ));
    }
  }
}
