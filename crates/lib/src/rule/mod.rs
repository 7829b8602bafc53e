//! Rules: attribute schemas plus analysis logic.
//!
//! A [`RuleClass`] is declared once with its attributes and an [`Analyze`]
//! implementation. Invoking it from a package produces a serializable
//! [`RuleInvocation`]; the driver later analyzes that invocation through a
//! [`RuleContext`], which walks the lifecycle in [`Phase`] order:
//!
//! ```text
//! Instantiated -> ResolvingAttributes -> Analyzing -> PreparingActions -> Done
//! ```
//!
//! Any error aborts the walk; nothing is retried or rolled back.

mod context;

pub use context::{ActionRef, RuleContext};

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::action::Action;
use crate::attribute::Attribute;
use crate::error::{AnalysisResult, SchemaError};
use crate::label::Label;
use crate::provider::Provider;
use crate::reference::TypeRef;
use crate::value::Value;

/// The analysis routine of a rule.
///
/// Implementations read resolved attributes from the context, record actions
/// and synthetic targets on it, and return the providers of the target.
#[async_trait(?Send)]
pub trait Analyze {
  async fn analyze(&self, cx: &RuleContext) -> AnalysisResult<Vec<Provider>>;
}

/// Analysis for rules that only carry attributes.
struct NoAnalysis;

#[async_trait(?Send)]
impl Analyze for NoAnalysis {
  async fn analyze(&self, _cx: &RuleContext) -> AnalysisResult<Vec<Provider>> {
    Ok(Vec::new())
  }
}

/// A rule type: its reference, declared attributes and analysis routine.
pub struct RuleClass {
  reference: TypeRef,
  attributes: Vec<Attribute>,
  analyze: Rc<dyn Analyze>,
}

impl fmt::Debug for RuleClass {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("RuleClass")
      .field("reference", &self.reference)
      .field("attributes", &self.attributes)
      .finish_non_exhaustive()
  }
}

impl RuleClass {
  pub fn builder(reference: TypeRef) -> RuleClassBuilder {
    RuleClassBuilder {
      reference,
      attributes: Vec::new(),
      analyze: None,
    }
  }

  pub fn reference(&self) -> &TypeRef {
    &self.reference
  }

  pub fn attributes(&self) -> &[Attribute] {
    &self.attributes
  }

  pub fn attribute(&self, name: &str) -> Option<&Attribute> {
    self.attributes.iter().find(|a| a.name() == name)
  }

  pub(crate) fn analyzer(&self) -> &dyn Analyze {
    self.analyze.as_ref()
  }

  /// Instantiate the rule as target `name`, invoked from `package`.
  ///
  /// Every supplied value is coerced immediately; omitted attributes must be
  /// optional and get their coerced default.
  pub fn invoke<I, K, V>(&self, name: &str, attributes: I, package: Option<&Label>) -> Result<RuleInvocation, SchemaError>
  where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
  {
    if name.is_empty() {
      return Err(SchemaError::InvalidName {
        rule: self.reference.qualname.clone(),
      });
    }

    let mut attributes_input = BTreeMap::new();
    for (key, value) in attributes {
      let key = key.into();
      let attribute = self.attribute(&key).ok_or_else(|| SchemaError::UnknownAttribute {
        rule: self.reference.qualname.clone(),
        attribute: key.clone(),
      })?;
      let value = attribute.coerce_source(value.into(), package)?;
      attributes_input.insert(key, value);
    }

    for attribute in &self.attributes {
      if attributes_input.contains_key(attribute.name()) {
        continue;
      }
      if !attribute.is_optional() {
        return Err(SchemaError::MissingAttribute {
          rule: self.reference.qualname.clone(),
          attribute: attribute.name().to_string(),
        });
      }
      if let Some(default) = attribute.default() {
        let value = attribute.coerce_source(default.clone(), package)?;
        attributes_input.insert(attribute.name().to_string(), value);
      }
    }

    debug!(rule = %self.reference, target = name, "invoked rule");
    Ok(RuleInvocation {
      name: name.to_string(),
      rule: self.reference.clone(),
      attributes_input,
      output_mounts: BTreeMap::new(),
    })
  }
}

/// Declares a [`RuleClass`].
pub struct RuleClassBuilder {
  reference: TypeRef,
  attributes: Vec<Attribute>,
  analyze: Option<Rc<dyn Analyze>>,
}

impl RuleClassBuilder {
  pub fn attribute(mut self, attribute: Attribute) -> Self {
    self.attributes.push(attribute);
    self
  }

  /// Set the analysis routine. Without one, analysis returns no providers.
  pub fn analyze(mut self, analyze: impl Analyze + 'static) -> Self {
    self.analyze = Some(Rc::new(analyze));
    self
  }

  pub fn build(self) -> Result<RuleClass, SchemaError> {
    for (idx, attribute) in self.attributes.iter().enumerate() {
      if self.attributes[..idx].iter().any(|a| a.name() == attribute.name()) {
        return Err(SchemaError::DuplicateAttribute {
          rule: self.reference.qualname.clone(),
          attribute: attribute.name().to_string(),
        });
      }
    }
    Ok(RuleClass {
      reference: self.reference,
      attributes: self.attributes,
      analyze: self.analyze.unwrap_or_else(|| Rc::new(NoAnalysis)),
    })
  }
}

/// The record of a target instantiating a rule with coerced attribute values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleInvocation {
  pub name: String,
  pub rule: TypeRef,
  pub attributes_input: BTreeMap<String, Value>,
  pub output_mounts: BTreeMap<String, String>,
}

impl RuleInvocation {
  /// Mount outputs of the target at paths of the source tree.
  pub fn with_output_mounts(mut self, output_mounts: BTreeMap<String, String>) -> Self {
    self.output_mounts = output_mounts;
    self
  }
}

/// Where a rule is in its analysis lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
  Instantiated,
  ResolvingAttributes,
  Analyzing,
  PreparingActions,
  Done,
}

/// The result of analyzing one target.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Analysis {
  pub actions: Vec<Action>,
  pub synthetic_targets: Vec<RuleInvocation>,
  pub providers: Vec<Provider>,
}

/// Run the whole lifecycle of `cx` as one task.
pub async fn run_analysis(cx: Rc<RuleContext>) -> AnalysisResult<Analysis> {
  info!(target = %cx.label(), rule = %cx.class().reference(), "analyzing target");

  cx.set_phase(Phase::ResolvingAttributes);
  cx.resolve_attributes().await?;

  cx.set_phase(Phase::Analyzing);
  let class = cx.class();
  let providers = class.analyzer().analyze(&cx).await?;

  cx.set_phase(Phase::PreparingActions);
  cx.prepare_actions().await?;

  cx.set_phase(Phase::Done);
  let analysis = Analysis {
    actions: cx.actions(),
    synthetic_targets: cx.synthetic_targets(),
    providers,
  };
  info!(
    target = %cx.label(),
    actions = analysis.actions.len(),
    providers = analysis.providers.len(),
    "analysis complete"
  );
  Ok(analysis)
}
