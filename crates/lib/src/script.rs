//! Sequences of `Run` actions sharing a working tree.

use std::collections::BTreeMap;

use crate::action::Run;
use crate::error::AnalysisResult;
use crate::label::Label;
use crate::rule::{ActionRef, RuleContext};

/// Runs programs one after another, each on the previous step's tree.
///
/// After every step the working tree becomes a new depmap: the previous input
/// overlaid with the step's outputs.
#[derive(Debug)]
pub struct Script<'a> {
  cx: &'a RuleContext,
  append_env: BTreeMap<String, String>,
  current_input: Option<Label>,
}

impl<'a> Script<'a> {
  pub(crate) fn new(cx: &'a RuleContext, input: Option<Label>, append_env: BTreeMap<String, String>) -> Self {
    Script {
      cx,
      append_env,
      current_input: input,
    }
  }

  /// Record `run` as the next step.
  ///
  /// Its input is replaced by the current tree, and its environment is layered
  /// over the script's. The step is prepared right away, since the next tree
  /// refers to its outputs.
  pub async fn run(&mut self, mut run: Run) -> AnalysisResult<ActionRef<'a>> {
    let mut env = self.append_env.clone();
    env.append(&mut run.append_env);
    run.append_env = env;
    run.input = self.current_input.clone();

    let step = self.cx.run(run);
    let outputs = step.files().await?;

    let mut next = self.cx.new_depmap(None);
    if let Some(input) = &self.current_input {
      next.merge(input.clone());
    }
    next.merge(outputs);
    self.current_input = Some(next.build()?);

    Ok(step)
  }

  /// The current working tree.
  pub fn files(&self) -> Option<&Label> {
    self.current_input.as_ref()
  }
}
