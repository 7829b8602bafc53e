use std::cell::{Cell, Ref, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::rc::Rc;

use tracing::debug;

use super::{Phase, RuleClass, RuleInvocation};
use crate::action::{
  Action, ActionOutput, BuildDepmap, DockerDownload, Download, Extract, GitClone, Run, Transition,
};
use crate::config::{BuildConfig, ConfigOption, OptionFamily};
use crate::depmap::{DepmapBuilder, DepmapEntry};
use crate::error::{AnalysisError, AnalysisResult, ResolveError};
use crate::exec::{Executable, LinuxExecutePlatform};
use crate::label::{Label, LabelPath};
use crate::platform::Os;
use crate::protocol::{HostFile, Request, Response};
use crate::provider::Provider;
use crate::reference::TypeRef;
use crate::script::Script;
use crate::task::{group, request};
use crate::value::{FromValue, Value};

/// Live state of one target's analysis.
///
/// Owned by the single task analyzing the target. Sub-tasks of a group share
/// it by reference; they interleave but never run at the same time, so plain
/// `RefCell`s suffice as long as no borrow is held across an `.await`.
pub struct RuleContext {
  class: Rc<RuleClass>,
  name: String,
  label: Label,
  attributes_input: BTreeMap<String, Value>,
  build_config: BuildConfig,
  resolved: RefCell<BTreeMap<String, Value>>,
  actions: RefCell<Vec<Action>>,
  execute_platform: RefCell<Option<Provider>>,
  synthetic_targets: RefCell<Vec<RuleInvocation>>,
  phase: Cell<Phase>,
}

impl fmt::Debug for RuleContext {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("RuleContext")
      .field("rule", self.class.reference())
      .field("label", &self.label)
      .field("phase", &self.phase.get())
      .finish_non_exhaustive()
  }
}

impl RuleContext {
  pub fn new(
    class: Rc<RuleClass>,
    name: impl Into<String>,
    label: Label,
    attributes_input: BTreeMap<String, Value>,
    build_config: BuildConfig,
  ) -> Self {
    RuleContext {
      class,
      name: name.into(),
      label,
      attributes_input,
      build_config,
      resolved: RefCell::new(BTreeMap::new()),
      actions: RefCell::new(Vec::new()),
      execute_platform: RefCell::new(None),
      synthetic_targets: RefCell::new(Vec::new()),
      phase: Cell::new(Phase::Instantiated),
    }
  }

  pub fn class(&self) -> Rc<RuleClass> {
    self.class.clone()
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn label(&self) -> &Label {
    &self.label
  }

  /// The package of this target, against which relative file labels resolve.
  pub fn package(&self) -> Label {
    self.label.package().unwrap_or_else(|| self.label.clone())
  }

  pub fn build_config(&self) -> &BuildConfig {
    &self.build_config
  }

  pub fn phase(&self) -> Phase {
    self.phase.get()
  }

  pub(crate) fn set_phase(&self, phase: Phase) {
    debug!(target = %self.label, ?phase, "rule phase");
    self.phase.set(phase);
  }

  /// Actions recorded so far.
  pub fn actions(&self) -> Vec<Action> {
    self.actions.borrow().clone()
  }

  pub fn synthetic_targets(&self) -> Vec<RuleInvocation> {
    self.synthetic_targets.borrow().clone()
  }

  // Attributes

  /// Resolve every declared attribute concurrently.
  pub(crate) async fn resolve_attributes(&self) -> AnalysisResult<()> {
    let class = self.class.clone();
    let results = group(
      class
        .attributes()
        .iter()
        .map(|attribute| attribute.resolve_from_source(self.attributes_input.get(attribute.name()), self)),
    )
    .await?;

    let mut resolved = self.resolved.borrow_mut();
    for (attribute, value) in class.attributes().iter().zip(results) {
      resolved.insert(attribute.name().to_string(), value?);
    }
    Ok(())
  }

  /// The resolved value of an attribute.
  pub fn attr(&self, name: &str) -> AnalysisResult<Value> {
    self
      .resolved
      .borrow()
      .get(name)
      .cloned()
      .ok_or_else(|| ResolveError::UnresolvedAttribute {
        attribute: name.to_string(),
      })
      .map_err(AnalysisError::from)
  }

  /// The resolved value of an attribute as `T`.
  pub fn attr_as<T: FromValue>(&self, name: &str) -> AnalysisResult<T> {
    Ok(self.attr(name)?.extract(&format!("attribute {:?}", name))?)
  }

  // Host queries

  /// Open a source file. Relative labels resolve against this target's package.
  pub async fn open_file(&self, label: &Label) -> AnalysisResult<HostFile> {
    let label = self.package().join(label);
    match request(Request::LabelOpen { label: label.clone() }).await? {
      Response::FileHandle { fileno } => Ok(HostFile::adopt(fileno)),
      Response::None => Err(ResolveError::FileNotFound { label: label.to_string() }.into()),
      other => Err(other.unexpected("label_open").into()),
    }
  }

  /// Read a source file as UTF-8.
  pub async fn build_file_contents(&self, label: &Label) -> AnalysisResult<String> {
    Ok(self.open_file(label).await?.read_to_string()?)
  }

  /// All providers of `target`, under the host configuration if `host`.
  pub async fn load_providers(&self, target: &Label, host: bool) -> AnalysisResult<Vec<Provider>> {
    let response = request(Request::LoadProviders {
      target: target.clone(),
      build_config: self.build_config.for_request(host),
    })
    .await?;
    match response {
      Response::Providers { providers } => Ok(providers),
      other => Err(other.unexpected("load_providers").into()),
    }
  }

  /// The single provider of type `provider` returned by `target`.
  pub async fn resolve_provider(&self, provider: &TypeRef, target: &Label, host: bool) -> AnalysisResult<Provider> {
    let mut matching: Vec<Provider> = self
      .load_providers(target, host)
      .await?
      .into_iter()
      .filter(|p| p.is_instance_of(provider))
      .collect();
    match matching.len() {
      0 => Err(
        ResolveError::NoMatchingProvider {
          provider: provider.to_string(),
          target: target.to_string(),
        }
        .into(),
      ),
      1 => Ok(matching.remove(0)),
      _ => Err(
        ResolveError::AmbiguousProvider {
          provider: provider.to_string(),
          target: target.to_string(),
        }
        .into(),
      ),
    }
  }

  /// The first executable named `name` provided by `target`.
  pub async fn resolve_executable(&self, target: &Label, name: &str, host: bool) -> AnalysisResult<Executable> {
    let reference = Executable::reference();
    for provider in self.load_providers(target, host).await? {
      if !provider.is_instance_of(&reference) {
        continue;
      }
      let executable = Executable::from_provider(&provider)?;
      if executable.name.as_deref() == Some(name) {
        return Ok(executable);
      }
    }
    Err(
      ResolveError::NoMatchingExecutable {
        target: target.to_string(),
        name: name.to_string(),
      }
      .into(),
    )
  }

  /// The globally registered provider of type `provider`.
  pub async fn resolve_global_provider(&self, provider: &TypeRef, host: bool) -> AnalysisResult<Provider> {
    let response = request(Request::LoadGlobalProvider {
      provider: provider.clone(),
      build_config: self.build_config.for_request(host),
    })
    .await?;
    match response {
      Response::Provider { provider } => Ok(provider),
      Response::None => Err(
        ResolveError::GlobalProviderNotFound {
          provider: provider.to_string(),
        }
        .into(),
      ),
      other => Err(other.unexpected("load_global_provider").into()),
    }
  }

  async fn probe(&self, request_kind: &'static str, req: Request) -> AnalysisResult<bool> {
    match request(req).await? {
      Response::Boolean { value } => Ok(value),
      other => Err(other.unexpected(request_kind).into()),
    }
  }

  pub async fn file_exists(&self, label: &Label) -> AnalysisResult<bool> {
    self
      .probe("file_exists", Request::FileExists { label: label.clone() })
      .await
  }

  pub async fn is_file(&self, label: &Label) -> AnalysisResult<bool> {
    self.probe("is_file", Request::IsFile { label: label.clone() }).await
  }

  pub async fn target_exists(&self, label: &Label) -> AnalysisResult<bool> {
    self
      .probe("target_exists", Request::TargetExists { label: label.clone() })
      .await
  }

  /// The execution platform provider of the host OS, asked for once.
  async fn host_execute_platform(&self) -> AnalysisResult<Provider> {
    let cached = self.execute_platform.borrow().clone();
    if let Some(platform) = cached {
      return Ok(platform);
    }
    let os = self.build_config.get_host(&Os::family()).and_then(Os::from_reference);
    let provider = os
      .and_then(|os| os.execute_platform_provider())
      .ok_or_else(|| ResolveError::NoExecutePlatform {
        os: os.map_or("unset", |os| os.as_str()).to_string(),
      })?;
    let platform = self.resolve_global_provider(&provider, true).await?;
    *self.execute_platform.borrow_mut() = Some(platform.clone());
    Ok(platform)
  }

  /// Replace sandbox markers such as `%[srcdir]` with host execution paths.
  pub async fn substitute_for_execution(&self, value: &str) -> AnalysisResult<String> {
    let provider = self
      .resolve_global_provider(&LinuxExecutePlatform::reference(), true)
      .await?;
    Ok(LinuxExecutePlatform::from_provider(&provider)?.substitute(value))
  }

  // Actions

  /// Record `action`.
  ///
  /// Its id is settled once it is prepared, which happens the first time the
  /// returned reference is asked for its id or files, or at the end of analysis.
  pub fn add_action(&self, action: Action) -> ActionRef<'_> {
    debug!(target = %self.label, kind = action.kind(), "recorded action");
    let mut actions = self.actions.borrow_mut();
    actions.push(action);
    ActionRef {
      cx: self,
      index: actions.len() - 1,
    }
  }

  pub fn run(&self, run: Run) -> ActionRef<'_> {
    self.add_action(Action::new(run))
  }

  pub fn download(&self, download: Download) -> ActionRef<'_> {
    self.add_action(Action::new(download))
  }

  pub fn git_clone(&self, url: impl Into<String>, revision: impl Into<String>) -> ActionRef<'_> {
    self.add_action(Action::new(GitClone::new(url, revision)))
  }

  pub fn docker_download(
    &self,
    image: impl Into<String>,
    architecture: impl Into<String>,
  ) -> ActionRef<'_> {
    self.add_action(Action::new(DockerDownload::new(image, architecture)))
  }

  pub fn extract(&self, extract: Extract) -> ActionRef<'_> {
    self.add_action(Action::new(extract))
  }

  /// Analyze `label` again with `changed_options` applied on top of either
  /// this target's configuration or, with `host`, the host configuration.
  pub fn transition(&self, label: Label, changed_options: &[ConfigOption], host: bool) -> ActionRef<'_> {
    let mut options: Vec<(TypeRef, TypeRef)> = Vec::new();
    if host {
      options.extend(self.build_config.host_options.iter().cloned());
    }
    options.extend(
      changed_options
        .iter()
        .map(|option| (option.family.clone(), option.option.clone())),
    );
    self.add_action(Action::new(Transition::new(label, options)))
  }

  pub fn new_depmap(&self, id: Option<&str>) -> DepmapBuilder<'_> {
    DepmapBuilder::new(self, id)
  }

  pub(crate) fn record_depmap(&self, id: Option<String>, entries: Vec<(LabelPath, DepmapEntry)>) -> AnalysisResult<Label> {
    let mut action = Action::new(BuildDepmap { entries });
    if let Some(id) = id {
      action = action.with_id(id);
    }
    // Nothing to prepare, so the id is final already.
    let files = action.files(&self.label)?;
    self.add_action(action);
    Ok(files)
  }

  /// Chain `Run` actions, each seeing the outputs of the previous ones.
  pub fn script(&self, input: Option<Label>, append_env: BTreeMap<String, String>) -> Script<'_> {
    Script::new(self, input, append_env)
  }

  /// Declare a target discovered during analysis and return its label.
  pub fn synthetic_target<I, K, V>(&self, class: &RuleClass, name: &str, attributes: I) -> AnalysisResult<Label>
  where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
  {
    let invocation = class.invoke(name, attributes, None)?;
    let label = self.label.join_str(name)?;
    debug!(target = %self.label, synthetic = %label, "declared synthetic target");
    self.synthetic_targets.borrow_mut().push(invocation);
    Ok(label)
  }

  /// Fill in defaults of every recorded action. Safe to call repeatedly.
  pub(crate) async fn prepare_actions(&self) -> AnalysisResult<()> {
    let pending: Vec<usize> = self
      .actions
      .borrow()
      .iter()
      .enumerate()
      .filter(|(_, action)| action.needs_platform())
      .map(|(index, _)| index)
      .collect();
    self.fill_platforms(pending).await
  }

  async fn prepare_action(&self, index: usize) -> AnalysisResult<()> {
    let pending = self.actions.borrow().get(index).is_some_and(Action::needs_platform);
    if pending {
      self.fill_platforms(vec![index]).await?;
    }
    Ok(())
  }

  async fn fill_platforms(&self, indices: Vec<usize>) -> AnalysisResult<()> {
    if indices.is_empty() {
      return Ok(());
    }
    let platform = self.host_execute_platform().await?;
    let mut actions = self.actions.borrow_mut();
    for index in indices {
      if let Some(action) = actions.get_mut(index) {
        action.fill_platform(platform.clone());
      }
    }
    Ok(())
  }

  // Groups

  /// Await all `futures` together, batching their host requests.
  ///
  /// Every future runs to completion; the first error in submission order is
  /// returned afterwards.
  pub async fn gather<F, T>(&self, futures: impl IntoIterator<Item = F>) -> AnalysisResult<Vec<T>>
  where
    F: Future<Output = AnalysisResult<T>>,
  {
    group(futures).await?.into_iter().collect()
  }

  /// [`gather`](Self::gather) over a keyed collection.
  pub async fn gather_map<K, F, T>(&self, futures: BTreeMap<K, F>) -> AnalysisResult<BTreeMap<K, T>>
  where
    K: Ord,
    F: Future<Output = AnalysisResult<T>>,
  {
    let (keys, futures): (Vec<K>, Vec<F>) = futures.into_iter().unzip();
    let results = group(futures).await?;
    keys
      .into_iter()
      .zip(results)
      .map(|(key, result)| result.map(|value| (key, value)))
      .collect()
  }
}

/// A recorded action, as seen by the analysis that recorded it.
#[derive(Debug, Clone)]
pub struct ActionRef<'a> {
  cx: &'a RuleContext,
  index: usize,
}

impl ActionRef<'_> {
  /// The action's id, preparing it first so the id covers its final content.
  pub async fn id(&self) -> AnalysisResult<String> {
    self.cx.prepare_action(self.index).await?;
    let actions = self.cx.actions.borrow();
    let action = actions.get(self.index).ok_or_else(|| self.missing())?;
    Ok(action.id()?.to_string())
  }

  /// Address of the action's output tree.
  pub async fn files(&self) -> AnalysisResult<Label> {
    let id = self.id().await?;
    Ok(self.cx.label.join_action(&id))
  }

  fn missing(&self) -> AnalysisError {
    AnalysisError::rule(format!("action #{} is no longer recorded", self.index))
  }

  pub fn action(&self) -> Option<Ref<'_, Action>> {
    Ref::filter_map(self.cx.actions.borrow(), |actions| actions.get(self.index)).ok()
  }

  /// Wait for the host to run the action.
  ///
  /// All actions recorded so far are prepared and sent along, so the host can
  /// schedule whatever this one depends on.
  pub async fn output(&self) -> AnalysisResult<ActionOutput> {
    self.cx.prepare_actions().await?;
    let (action, partial_actions) = {
      let actions = self.cx.actions.borrow();
      let action = actions.get(self.index).cloned().ok_or_else(|| self.missing())?;
      (action, actions.clone())
    };
    match request(Request::ActionOutput { action, partial_actions }).await? {
      Response::ActionOutput(output) => Ok(output),
      other => Err(other.unexpected("action_output").into()),
    }
  }
}
