//! Typed rule attributes.
//!
//! An attribute is resolved in two phases:
//!
//! 1. Coercion ([`Attribute::coerce_source`]) runs when a rule is invoked. It
//!    is pure: strings become labels, package-relative file names are anchored
//!    to the invoking package, and glob lists are parsed. Values that depend on
//!    the build configuration are passed through untouched.
//! 2. Resolution ([`Attribute::resolve_from_source`]) runs during analysis. It
//!    picks the branch of every selection that matches the configuration,
//!    substitutes defaults, and may ask the host for providers.

use std::collections::BTreeMap;

use crate::config::BuildConfig;
use crate::error::{AnalysisResult, SchemaError};
use crate::glob::GlobSet;
use crate::label::Label;
use crate::reference::TypeRef;
use crate::rule::RuleContext;
use crate::value::Value;

/// What an attribute holds and how it is coerced and resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeKind {
  /// Any value, unchecked.
  Any,
  Label,
  /// A label naming a file; bare names refer to files in the invoking package.
  File,
  LabelList,
  /// Map of names to labels or lists of labels.
  LabelMap,
  /// The provider of type `provider` returned by the labeled target.
  Provider { provider: TypeRef, host: bool },
  /// A provider of type `provider`, taken from the globally registered one
  /// unless a target is named explicitly.
  GlobalProvider { provider: TypeRef, host: bool },
  GlobSet,
}

/// One declared attribute of a rule.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
  name: String,
  kind: AttributeKind,
  default: Option<Value>,
}

impl Attribute {
  pub fn new(name: impl Into<String>, kind: AttributeKind) -> Self {
    Attribute {
      name: name.into(),
      kind,
      default: None,
    }
  }

  pub fn any(name: impl Into<String>) -> Self {
    Self::new(name, AttributeKind::Any)
  }

  pub fn label(name: impl Into<String>) -> Self {
    Self::new(name, AttributeKind::Label)
  }

  pub fn file(name: impl Into<String>) -> Self {
    Self::new(name, AttributeKind::File)
  }

  pub fn label_list(name: impl Into<String>) -> Self {
    Self::new(name, AttributeKind::LabelList)
  }

  pub fn label_map(name: impl Into<String>) -> Self {
    Self::new(name, AttributeKind::LabelMap)
  }

  pub fn provider(name: impl Into<String>, provider: TypeRef) -> Self {
    Self::new(name, AttributeKind::Provider { provider, host: false })
  }

  pub fn global_provider(name: impl Into<String>, provider: TypeRef) -> Self {
    Self::new(name, AttributeKind::GlobalProvider { provider, host: false })
  }

  pub fn glob_set(name: impl Into<String>) -> Self {
    Self::new(name, AttributeKind::GlobSet)
  }

  pub fn with_default(mut self, default: impl Into<Value>) -> Self {
    self.default = Some(default.into());
    self
  }

  /// Resolve providers under the host configuration. No effect on other kinds.
  pub fn host(mut self) -> Self {
    if let AttributeKind::Provider { host, .. } | AttributeKind::GlobalProvider { host, .. } = &mut self.kind {
      *host = true;
    }
    self
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn kind(&self) -> &AttributeKind {
    &self.kind
  }

  pub fn default(&self) -> Option<&Value> {
    self.default.as_ref()
  }

  /// Whether the attribute may be omitted from an invocation.
  pub fn is_optional(&self) -> bool {
    matches!(self.kind, AttributeKind::GlobalProvider { .. }) || self.default.is_some()
  }

  fn wrong_shape(&self, expected: &'static str, actual: &Value) -> SchemaError {
    SchemaError::WrongShape {
      context: format!("attribute {:?}", self.name),
      expected,
      actual: actual.type_name(),
    }
  }

  /// Invocation-time coercion of a supplied value.
  ///
  /// `package` is the package the rule is invoked from, if any.
  pub fn coerce_source(&self, value: Value, package: Option<&Label>) -> Result<Value, SchemaError> {
    if value.is_unresolved() {
      return Ok(value);
    }
    match &self.kind {
      AttributeKind::Label
      | AttributeKind::File
      | AttributeKind::Provider { .. }
      | AttributeKind::GlobalProvider { .. } => Ok(Value::Label(self.coerce_label(&value, package)?)),
      AttributeKind::LabelList => self.coerce_label_list(&value, package),
      AttributeKind::LabelMap => {
        let Value::Map(entries) = &value else {
          return Err(self.wrong_shape("map of labels", &value));
        };
        let mut coerced = BTreeMap::new();
        for (key, item) in entries {
          let item = match item {
            Value::List(_) => self.coerce_label_list(item, package)?,
            other => Value::Label(self.coerce_label(other, package)?),
          };
          coerced.insert(key.clone(), item);
        }
        Ok(Value::Map(coerced))
      }
      AttributeKind::Any | AttributeKind::GlobSet => self.coerce_value(value),
    }
  }

  /// Coercion applied to a resolved value.
  pub fn coerce_value(&self, value: Value) -> Result<Value, SchemaError> {
    match &self.kind {
      AttributeKind::GlobSet => match value {
        Value::GlobSet(_) => Ok(value),
        Value::List(items) => {
          let patterns = items
            .iter()
            .map(|item| item.as_str().ok_or_else(|| self.wrong_shape("glob pattern", item)))
            .collect::<Result<Vec<_>, _>>()?;
          Ok(Value::GlobSet(GlobSet::new(patterns)?))
        }
        other => Err(self.wrong_shape("glob set or list of patterns", &other)),
      },
      AttributeKind::Label | AttributeKind::File => match value {
        Value::String(_) => Ok(Value::Label(self.coerce_label(&value, None)?)),
        other => Ok(other),
      },
      _ => Ok(value),
    }
  }

  fn coerce_label(&self, value: &Value, package: Option<&Label>) -> Result<Label, SchemaError> {
    let label = match value {
      Value::Label(label) => label.clone(),
      Value::String(s) => Label::new(s.as_str())?,
      other => return Err(self.wrong_shape("label", other)),
    };
    let Some(package) = package else {
      return Ok(label);
    };
    let label = if label.is_package_relative() && !label.as_str().contains(':') {
      Label::new(format!(":{}", label))?
    } else {
      label
    };
    Ok(package.join(&label))
  }

  fn coerce_label_list(&self, value: &Value, package: Option<&Label>) -> Result<Value, SchemaError> {
    let Value::List(items) = value else {
      return Err(self.wrong_shape("list of labels", value));
    };
    let labels = items
      .iter()
      .map(|item| self.coerce_label(item, package).map(Value::Label))
      .collect::<Result<Vec<_>, _>>()?;
    Ok(Value::List(labels))
  }

  /// Analysis-time resolution of the stored value, `None` if it was omitted.
  pub async fn resolve_from_source(&self, source: Option<&Value>, cx: &RuleContext) -> AnalysisResult<Value> {
    let value = match source {
      Some(source) => Some(resolve_selections(source, cx.build_config())),
      None => self.default.clone(),
    };

    match &self.kind {
      AttributeKind::Provider { provider, host } => {
        let value = value.unwrap_or_default();
        let target = self.coerce_label(&value, None)?;
        Ok(Value::from(cx.resolve_provider(provider, &target, *host).await?))
      }
      AttributeKind::GlobalProvider { provider, host } => match value {
        None | Some(Value::Null) => Ok(Value::from(cx.resolve_global_provider(provider, *host).await?)),
        Some(Value::Provider(provider)) => Ok(Value::Provider(provider)),
        Some(value) => {
          let target = self.coerce_label(&value, None)?;
          Ok(Value::from(cx.resolve_provider(provider, &target, *host).await?))
        }
      },
      _ => Ok(self.coerce_value(value.unwrap_or_default())?),
    }
  }
}

/// Replace every selection inside `value` by its branch for `config`.
fn resolve_selections(value: &Value, config: &BuildConfig) -> Value {
  match value {
    Value::Selection(selection) => resolve_selections(selection.resolve(config), config),
    Value::List(items) if value.is_unresolved() => {
      Value::List(items.iter().map(|item| resolve_selections(item, config)).collect())
    }
    Value::Map(entries) if value.is_unresolved() => Value::Map(
      entries
        .iter()
        .map(|(k, v)| (k.clone(), resolve_selections(v, config)))
        .collect(),
    ),
    other => other.clone(),
  }
}
