//! The host-facing entry points.
//!
//! The host engine talks to one [`Driver`] per analysis worker. A target is
//! analyzed in a session: [`Driver::start`] binds the invocation and build
//! configuration, then [`Driver::poll`] is called repeatedly, each time with
//! the answers to the previous request batch, until it reports the final
//! [`Analysis`].
//!
//! ```text
//! start(...)                      -> ()
//! poll({"type":"first_poll"})     -> {"requests":[...]}
//! poll([<response>, ...])         -> {"requests":[...]} | {"done":{...}}
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::rc::Rc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::codec::{decode, encode};
use crate::config::BuildConfig;
use crate::error::{AnalysisError, AnalysisResult, LabelError, ProtocolError, SchemaError};
use crate::label::Label;
use crate::protocol::{PollEvent, PollOutcome};
use crate::reference::TypeRef;
use crate::rule::{run_analysis, Analysis, Phase, RuleClass, RuleContext};
use crate::task::{Step, Task};
use crate::value::Value;
use crate::workspace::WorkspaceLayout;

/// Errors surfaced to the host at the driver boundary.
#[derive(Debug, Error)]
pub enum DriverError {
  /// No rule class is registered under the requested reference.
  #[error("no rule {rule} is registered")]
  UnknownRule { rule: String },

  /// A rule module or target label could not be parsed.
  #[error("invalid address: {0}")]
  Label(#[from] LabelError),

  /// The invocation data did not match the rule's attributes.
  #[error("invalid invocation: {0}")]
  Schema(#[from] SchemaError),

  /// `poll` was called without a session started by `start`.
  #[error("no analysis in progress")]
  NoActiveSession,

  /// A message from the host could not be decoded, or a response batch did
  /// not match the requests it answers.
  #[error("protocol error: {0}")]
  Protocol(#[from] ProtocolError),

  /// The analysis itself failed. The session is over.
  #[error("analysis failed: {0}")]
  Analysis(#[from] AnalysisError),
}

/// The rule classes a driver can analyze, keyed by reference.
#[derive(Debug, Default)]
pub struct RuleRegistry {
  rules: HashMap<TypeRef, Rc<RuleClass>>,
}

impl RuleRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register `class`, replacing any class with the same reference.
  pub fn register(&mut self, class: RuleClass) -> &mut Self {
    let reference = class.reference().clone();
    debug!(rule = %reference, "registered rule");
    if self.rules.insert(reference.clone(), Rc::new(class)).is_some() {
      warn!(rule = %reference, "rule registered twice, keeping the last definition");
    }
    self
  }

  pub fn get(&self, reference: &TypeRef) -> Option<Rc<RuleClass>> {
    self.rules.get(reference).cloned()
  }

  pub fn len(&self) -> usize {
    self.rules.len()
  }

  pub fn is_empty(&self) -> bool {
    self.rules.is_empty()
  }
}

struct Session {
  task: Task<'static, AnalysisResult<Analysis>>,
  context: Rc<RuleContext>,
}

/// Analyzes one target at a time on behalf of the host.
pub struct Driver {
  registry: RuleRegistry,
  layout: WorkspaceLayout,
  session: Option<Session>,
}

impl Driver {
  /// A driver over `registry`, resolving module paths with
  /// [`WorkspaceLayout::from_env`].
  pub fn new(registry: RuleRegistry) -> Self {
    Self::with_layout(registry, WorkspaceLayout::from_env())
  }

  pub fn with_layout(registry: RuleRegistry, layout: WorkspaceLayout) -> Self {
    Driver {
      registry,
      layout,
      session: None,
    }
  }

  pub fn registry(&self) -> &RuleRegistry {
    &self.registry
  }

  /// Look up a rule class without analyzing anything.
  ///
  /// `rule_module` is either a label (`@ws//:rules/copy.rs`) or an absolute
  /// path below one of the layout's roots (`/workspaces/ws/rules/copy.rs`).
  pub fn prepare(&self, rule_module: &str, class_name: &str) -> Result<Rc<RuleClass>, DriverError> {
    let module = if rule_module.starts_with('/') {
      self.layout.label_for_path(Path::new(rule_module))?
    } else {
      Label::new(rule_module)?
    };
    let reference = TypeRef::new(module, class_name);
    self.registry.get(&reference).ok_or_else(|| DriverError::UnknownRule {
      rule: reference.to_string(),
    })
  }

  /// Begin analyzing `target_label` as an instance of the given rule.
  ///
  /// Nothing runs until the first [`poll`](Self::poll). A session still in
  /// progress is abandoned.
  pub fn start(
    &mut self,
    rule_module: &str,
    class_name: &str,
    target_name: &str,
    target_label: &str,
    attributes_json: &str,
    build_config_json: &str,
  ) -> Result<(), DriverError> {
    let class = self.prepare(rule_module, class_name)?;
    let label = Label::new(target_label)?;
    let attributes: BTreeMap<String, Value> = decode(attributes_json)?;
    let build_config: BuildConfig = decode(build_config_json)?;

    let package = label.package();
    let invocation = class.invoke(target_name, attributes, package.as_ref())?;

    if let Some(previous) = self.session.take() {
      warn!(target = %previous.context.label(), "abandoning unfinished analysis");
    }

    info!(target = %label, rule = %class.reference(), "starting analysis");
    let context = Rc::new(RuleContext::new(
      class,
      invocation.name,
      label,
      invocation.attributes_input,
      build_config,
    ));
    self.session = Some(Session {
      task: Task::new(run_analysis(context.clone())),
      context,
    });
    Ok(())
  }

  /// Phase of the session in progress, if any.
  pub fn phase(&self) -> Option<Phase> {
    self.session.as_ref().map(|session| session.context.phase())
  }

  /// Advance the session by exactly one step.
  ///
  /// The session ends when the analysis finishes or fails; polling again then
  /// returns [`DriverError::NoActiveSession`].
  pub fn poll_event(&mut self, event: PollEvent) -> Result<PollOutcome, DriverError> {
    let session = self.session.as_mut().ok_or(DriverError::NoActiveSession)?;
    let step = session.task.resume(event.into_responses());

    match step {
      Ok(Step::Pending(requests)) => {
        debug!(
          target = %session.context.label(),
          count = requests.len(),
          "emitting request batch"
        );
        Ok(PollOutcome::Requests(requests))
      }
      Ok(Step::Done(result)) => {
        self.session = None;
        Ok(PollOutcome::Done(result?))
      }
      Err(err) => {
        self.session = None;
        Err(err.into())
      }
    }
  }

  /// [`poll_event`](Self::poll_event) over the wire encoding.
  pub fn poll(&mut self, event_json: &str) -> Result<String, DriverError> {
    let event: PollEvent = decode(event_json)?;
    let outcome = self.poll_event(event)?;
    Ok(encode(&outcome)?)
  }
}
