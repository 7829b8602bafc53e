use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::consts::APP_NAME;
use crate::depmap::DepmapEntry;
use crate::exec::Executable;
use crate::label::{Label, LabelPath};
use crate::provider::Provider;
use crate::reference::TypeRef;

/// The variant-specific payload of an [`Action`](super::Action).
///
/// # Variants
///
/// - [`Run`](ActionData::Run): Execute a program inside a sandbox
/// - [`Download`](ActionData::Download): Fetch a file from one of several mirrors
/// - [`GitClone`](ActionData::GitClone): Check out a git revision
/// - [`DockerDownload`](ActionData::DockerDownload): Pull a container image
/// - [`Extract`](ActionData::Extract): Unpack an archive
/// - [`BuildDepmap`](ActionData::BuildDepmap): Materialize a depmap
/// - [`Transition`](ActionData::Transition): Re-analyze a target under changed options
///
/// The discriminant is carried under the `$trellis_action` key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "$trellis_action", rename_all = "snake_case")]
pub enum ActionData {
  Run(Run),
  Download(Download),
  GitClone(GitClone),
  DockerDownload(DockerDownload),
  Extract(Extract),
  BuildDepmap(BuildDepmap),
  Transition(Transition),
}

impl ActionData {
  pub fn kind(&self) -> &'static str {
    match self {
      ActionData::Run(_) => "run",
      ActionData::Download(_) => "download",
      ActionData::GitClone(_) => "git_clone",
      ActionData::DockerDownload(_) => "docker_download",
      ActionData::Extract(_) => "extract",
      ActionData::BuildDepmap(_) => "build_depmap",
      ActionData::Transition(_) => "transition",
    }
  }

  /// Mnemonic used when none is given explicitly.
  pub fn default_mnemonic(&self) -> String {
    match self {
      ActionData::Run(run) => run.executable.file_name().to_string(),
      ActionData::Download(_) => "Download".to_string(),
      ActionData::GitClone(_) => "GitClone".to_string(),
      ActionData::DockerDownload(_) => "DockerPull".to_string(),
      ActionData::Extract(_) => "Extract".to_string(),
      ActionData::BuildDepmap(_) => "BuildDepmap".to_string(),
      ActionData::Transition(_) => "Transition".to_string(),
    }
  }

  /// Progress message used when none is given explicitly.
  pub fn default_progress_message(&self) -> String {
    match self {
      ActionData::Run(run) => run.quoted_args(),
      ActionData::Download(download) => download.urls.first().cloned().unwrap_or_default(),
      ActionData::GitClone(clone) => format!("{}#{}", clone.url, clone.revision),
      ActionData::DockerDownload(docker) => docker.image.clone(),
      ActionData::Extract(extract) => extract.archive.to_string(),
      ActionData::BuildDepmap(_) | ActionData::Transition(_) => String::new(),
    }
  }
}

macro_rules! impl_into_action_data {
  ($($variant:ident),*) => {
    $(
      impl From<$variant> for ActionData {
        fn from(data: $variant) -> Self {
          ActionData::$variant(data)
        }
      }
    )*
  };
}

impl_into_action_data!(Run, Download, GitClone, DockerDownload, Extract, BuildDepmap, Transition);

/// One command-line argument of a [`Run`] action.
///
/// Templated and respfile arguments are expanded by the host once the
/// contents of `source` are known.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Argument {
  Literal(String),
  /// `template` with `$1` replaced by the path of `source`.
  Templated {
    #[serde(rename = "$trellis_argument_templated")]
    template: String,
    source: Label,
  },
  /// `template` written to a response file built from `source`.
  Respfile {
    #[serde(rename = "$trellis_argument_respfile")]
    template: String,
    source: Label,
  },
  Label(Label),
}

impl Argument {
  pub fn templated(template: impl Into<String>, source: Label) -> Self {
    Argument::Templated {
      template: template.into(),
      source,
    }
  }

  pub fn respfile(template: impl Into<String>, source: Label) -> Self {
    Argument::Respfile {
      template: template.into(),
      source,
    }
  }
}

impl fmt::Display for Argument {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Argument::Literal(s) => write!(f, "{}", s),
      Argument::Label(label) => write!(f, "{}", label),
      Argument::Templated { template, .. } | Argument::Respfile { template, .. } => write!(f, "{}", template),
    }
  }
}

impl From<&str> for Argument {
  fn from(s: &str) -> Self {
    Argument::Literal(s.to_string())
  }
}

impl From<String> for Argument {
  fn from(s: String) -> Self {
    Argument::Literal(s)
  }
}

impl From<Label> for Argument {
  fn from(label: Label) -> Self {
    Argument::Label(label)
  }
}

/// How the host should interpret structured (JSON lines) output of a program.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuredMessageConfig {
  /// Maps a message's level field to a log level.
  pub level_map: BTreeMap<String, String>,
  /// Fields whose values are shown to humans.
  pub human_messages: Vec<String>,
}

/// Execute a program.
///
/// # Fields
///
/// - `executable`: The program, with its run-time context
/// - `args`: Arguments, not including the program itself
/// - `input`: Depmap mounted as the working tree
/// - `platform`: Execution platform; filled in by `prepare` when absent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
  pub executable: Executable,
  pub args: Vec<Argument>,
  pub input: Option<Label>,
  pub cwd: Option<String>,
  pub append_env: BTreeMap<String, String>,
  pub append_env_files: Vec<Label>,
  pub platform: Option<Provider>,
  pub hide_stdout: bool,
  pub hide_stderr: bool,
  pub structured_messages: Option<StructuredMessageConfig>,
}

impl Run {
  pub fn new<I, A>(executable: Executable, args: I) -> Self
  where
    I: IntoIterator<Item = A>,
    A: Into<Argument>,
  {
    Run {
      executable,
      args: args.into_iter().map(Into::into).collect(),
      input: None,
      cwd: None,
      append_env: BTreeMap::new(),
      append_env_files: Vec::new(),
      platform: None,
      hide_stdout: false,
      hide_stderr: false,
      structured_messages: None,
    }
  }

  pub fn input(mut self, input: Label) -> Self {
    self.input = Some(input);
    self
  }

  pub fn cwd(mut self, cwd: impl Into<String>) -> Self {
    self.cwd = Some(cwd.into());
    self
  }

  pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.append_env.insert(key.into(), value.into());
    self
  }

  pub fn env_file(mut self, file: Label) -> Self {
    self.append_env_files.push(file);
    self
  }

  pub fn platform(mut self, platform: Provider) -> Self {
    self.platform = Some(platform);
    self
  }

  pub fn hide_output(mut self, stdout: bool, stderr: bool) -> Self {
    self.hide_stdout = stdout;
    self.hide_stderr = stderr;
    self
  }

  pub fn structured_messages(mut self, config: StructuredMessageConfig) -> Self {
    self.structured_messages = Some(config);
    self
  }

  /// Arguments joined as a shell command line.
  fn quoted_args(&self) -> String {
    let args: Vec<String> = self.args.iter().map(ToString::to_string).collect();
    shlex::try_join(args.iter().map(String::as_str)).unwrap_or_else(|_| args.join(" "))
  }
}

/// Download a file, trying each URL in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Download {
  pub urls: Vec<String>,
  /// Expected content hash, if pinned.
  pub hash: Option<String>,
  pub filename: Option<String>,
  pub executable: bool,
  pub user_agent: String,
}

impl Download {
  pub fn new<I, S>(urls: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Download {
      urls: urls.into_iter().map(Into::into).collect(),
      hash: None,
      filename: None,
      executable: false,
      user_agent: APP_NAME.to_string(),
    }
  }

  pub fn hash(mut self, hash: impl Into<String>) -> Self {
    self.hash = Some(hash.into());
    self
  }

  pub fn filename(mut self, filename: impl Into<String>) -> Self {
    self.filename = Some(filename.into());
    self
  }

  pub fn executable(mut self, executable: bool) -> Self {
    self.executable = executable;
    self
  }

  pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
    self.user_agent = user_agent.into();
    self
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitClone {
  pub url: String,
  pub revision: String,
}

impl GitClone {
  pub fn new(url: impl Into<String>, revision: impl Into<String>) -> Self {
    GitClone {
      url: url.into(),
      revision: revision.into(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DockerDownload {
  pub image: String,
  pub architecture: String,
}

impl DockerDownload {
  pub fn new(image: impl Into<String>, architecture: impl Into<String>) -> Self {
    DockerDownload {
      image: image.into(),
      architecture: architecture.into(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extract {
  pub archive: Label,
  pub strip_prefix: Option<String>,
}

impl Extract {
  pub fn new(archive: Label) -> Self {
    Extract {
      archive,
      strip_prefix: None,
    }
  }

  pub fn strip_prefix(mut self, prefix: impl Into<String>) -> Self {
    self.strip_prefix = Some(prefix.into());
    self
  }
}

/// Materialize a depmap from its ordered entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildDepmap {
  pub entries: Vec<(LabelPath, DepmapEntry)>,
}

/// Analyze `label` again with some options changed.
///
/// Options are carried as type references so that option types loaded
/// separately by different processes still compare equal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
  pub label: Label,
  pub changed_options: Vec<(TypeRef, TypeRef)>,
}

impl Transition {
  pub fn new(label: Label, changed_options: Vec<(TypeRef, TypeRef)>) -> Self {
    Transition { label, changed_options }
  }
}
