//! Dynamically typed values carried by attributes and provider fields.
//!
//! JSON scalars and containers map onto their obvious variants. Every other
//! variant crosses the wire as a sentinel-wrapped object, and decoding
//! dispatches on whichever sentinel key is present.

use std::collections::BTreeMap;

use serde::de::Error as _;
use serde::{Deserialize, Serialize};

use crate::codec::serialize_sentinel;
use crate::config::{OptionKey, Selection};
use crate::consts::{
  ACTION_SENTINEL, GLOBSET_SENTINEL, LABEL_PATH_SENTINEL, LABEL_SENTINEL, OPTION_SENTINEL, PROVIDER_SENTINEL,
  SELECTION_SENTINEL,
};
use crate::error::SchemaError;
use crate::glob::GlobSet;
use crate::label::{Label, LabelPath};
use crate::provider::Provider;
use crate::reference::TypeRef;

#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
  #[default]
  Null,
  Bool(bool),
  Number(serde_json::Number),
  String(String),
  List(Vec<Value>),
  Map(BTreeMap<String, Value>),
  Label(Label),
  LabelPath(LabelPath),
  Provider(Box<Provider>),
  /// A reference to an option type.
  Option(TypeRef),
  Selection(Box<Selection>),
  GlobSet(GlobSet),
}

impl Value {
  /// Short name of the variant, for error messages.
  pub fn type_name(&self) -> &'static str {
    match self {
      Value::Null => "null",
      Value::Bool(_) => "bool",
      Value::Number(_) => "number",
      Value::String(_) => "string",
      Value::List(_) => "list",
      Value::Map(_) => "map",
      Value::Label(_) => "label",
      Value::LabelPath(_) => "label path",
      Value::Provider(_) => "provider",
      Value::Option(_) => "option",
      Value::Selection(_) => "selection",
      Value::GlobSet(_) => "glob set",
    }
  }

  pub fn is_null(&self) -> bool {
    matches!(self, Value::Null)
  }

  /// Whether the value depends on the build configuration.
  ///
  /// A selection is unresolved, and so is any list or map containing one.
  pub fn is_unresolved(&self) -> bool {
    match self {
      Value::Selection(_) => true,
      Value::List(items) => items.iter().any(Value::is_unresolved),
      Value::Map(entries) => entries.values().any(Value::is_unresolved),
      _ => false,
    }
  }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      Value::String(s) => Some(s),
      _ => None,
    }
  }

  pub fn as_label(&self) -> Option<&Label> {
    match self {
      Value::Label(label) => Some(label),
      _ => None,
    }
  }

  pub fn as_provider(&self) -> Option<&Provider> {
    match self {
      Value::Provider(provider) => Some(provider),
      _ => None,
    }
  }

  /// Convert to `T`, reporting a shape error against `context` on mismatch.
  pub fn extract<T: FromValue>(&self, context: &str) -> Result<T, SchemaError> {
    T::from_value(self).ok_or_else(|| SchemaError::WrongShape {
      context: context.to_string(),
      expected: T::EXPECTED,
      actual: self.type_name(),
    })
  }

  /// Decode a plain JSON tree, recognising sentinel-wrapped objects.
  pub fn from_json(json: serde_json::Value) -> Result<Value, serde_json::Error> {
    Ok(match json {
      serde_json::Value::Null => Value::Null,
      serde_json::Value::Bool(b) => Value::Bool(b),
      serde_json::Value::Number(n) => Value::Number(n),
      serde_json::Value::String(s) => Value::String(s),
      serde_json::Value::Array(items) => Value::List(items.into_iter().map(Value::from_json).collect::<Result<_, _>>()?),
      serde_json::Value::Object(object) => {
        if object.contains_key(LABEL_SENTINEL) {
          Value::Label(serde_json::from_value(object.into())?)
        } else if object.contains_key(LABEL_PATH_SENTINEL) {
          Value::LabelPath(serde_json::from_value(object.into())?)
        } else if object.contains_key(PROVIDER_SENTINEL) {
          Value::Provider(Box::new(serde_json::from_value(object.into())?))
        } else if object.contains_key(GLOBSET_SENTINEL) {
          Value::GlobSet(serde_json::from_value(object.into())?)
        } else if object.contains_key(OPTION_SENTINEL) {
          Value::Option(serde_json::from_value::<OptionKey>(object.into())?.0)
        } else if object.contains_key(SELECTION_SENTINEL) {
          Value::Selection(Box::new(serde_json::from_value(object.into())?))
        } else if object.contains_key(ACTION_SENTINEL) {
          return Err(serde_json::Error::custom("actions cannot be used as values"));
        } else {
          Value::Map(
            object
              .into_iter()
              .map(|(k, v)| Ok((k, Value::from_json(v)?)))
              .collect::<Result<_, serde_json::Error>>()?,
          )
        }
      }
    })
  }
}

impl Serialize for Value {
  fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    match self {
      Value::Null => serializer.serialize_unit(),
      Value::Bool(b) => serializer.serialize_bool(*b),
      Value::Number(n) => n.serialize(serializer),
      Value::String(s) => serializer.serialize_str(s),
      Value::List(items) => serializer.collect_seq(items),
      Value::Map(entries) => serializer.collect_map(entries),
      Value::Label(label) => label.serialize(serializer),
      Value::LabelPath(path) => path.serialize(serializer),
      Value::Provider(provider) => provider.serialize(serializer),
      Value::Option(reference) => serialize_sentinel(serializer, OPTION_SENTINEL, reference),
      Value::Selection(selection) => selection.serialize(serializer),
      Value::GlobSet(set) => set.serialize(serializer),
    }
  }
}

impl<'de> Deserialize<'de> for Value {
  fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let json = serde_json::Value::deserialize(deserializer)?;
    Value::from_json(json).map_err(D::Error::custom)
  }
}

impl From<&str> for Value {
  fn from(s: &str) -> Self {
    Value::String(s.to_string())
  }
}

impl From<String> for Value {
  fn from(s: String) -> Self {
    Value::String(s)
  }
}

impl From<bool> for Value {
  fn from(b: bool) -> Self {
    Value::Bool(b)
  }
}

impl From<i64> for Value {
  fn from(n: i64) -> Self {
    Value::Number(n.into())
  }
}

impl From<u32> for Value {
  fn from(n: u32) -> Self {
    Value::Number(n.into())
  }
}

impl From<Label> for Value {
  fn from(label: Label) -> Self {
    Value::Label(label)
  }
}

impl From<LabelPath> for Value {
  fn from(path: LabelPath) -> Self {
    Value::LabelPath(path)
  }
}

impl From<Provider> for Value {
  fn from(provider: Provider) -> Self {
    Value::Provider(Box::new(provider))
  }
}

impl From<Selection> for Value {
  fn from(selection: Selection) -> Self {
    Value::Selection(Box::new(selection))
  }
}

impl From<GlobSet> for Value {
  fn from(set: GlobSet) -> Self {
    Value::GlobSet(set)
  }
}

impl<T: Into<Value>> From<Option<T>> for Value {
  fn from(value: Option<T>) -> Self {
    value.map_or(Value::Null, Into::into)
  }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
  fn from(items: Vec<T>) -> Self {
    Value::List(items.into_iter().map(Into::into).collect())
  }
}

impl<T: Into<Value>> From<BTreeMap<String, T>> for Value {
  fn from(entries: BTreeMap<String, T>) -> Self {
    Value::Map(entries.into_iter().map(|(k, v)| (k, v.into())).collect())
  }
}

/// Typed access to a [`Value`].
pub trait FromValue: Sized {
  /// Shape name reported when conversion fails.
  const EXPECTED: &'static str;

  fn from_value(value: &Value) -> Option<Self>;
}

impl FromValue for Value {
  const EXPECTED: &'static str = "any value";

  fn from_value(value: &Value) -> Option<Self> {
    Some(value.clone())
  }
}

impl FromValue for String {
  const EXPECTED: &'static str = "string";

  fn from_value(value: &Value) -> Option<Self> {
    value.as_str().map(str::to_string)
  }
}

impl FromValue for bool {
  const EXPECTED: &'static str = "bool";

  fn from_value(value: &Value) -> Option<Self> {
    match value {
      Value::Bool(b) => Some(*b),
      _ => None,
    }
  }
}

impl FromValue for i64 {
  const EXPECTED: &'static str = "integer";

  fn from_value(value: &Value) -> Option<Self> {
    match value {
      Value::Number(n) => n.as_i64(),
      _ => None,
    }
  }
}

impl FromValue for u32 {
  const EXPECTED: &'static str = "unsigned integer";

  fn from_value(value: &Value) -> Option<Self> {
    match value {
      Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
      _ => None,
    }
  }
}

impl FromValue for Label {
  const EXPECTED: &'static str = "label";

  fn from_value(value: &Value) -> Option<Self> {
    value.as_label().cloned()
  }
}

impl FromValue for LabelPath {
  const EXPECTED: &'static str = "label path";

  fn from_value(value: &Value) -> Option<Self> {
    match value {
      Value::LabelPath(path) => Some(path.clone()),
      Value::String(s) => Some(LabelPath::new(s.as_str())),
      _ => None,
    }
  }
}

impl FromValue for Provider {
  const EXPECTED: &'static str = "provider";

  fn from_value(value: &Value) -> Option<Self> {
    value.as_provider().cloned()
  }
}

impl FromValue for GlobSet {
  const EXPECTED: &'static str = "glob set";

  fn from_value(value: &Value) -> Option<Self> {
    match value {
      Value::GlobSet(set) => Some(set.clone()),
      _ => None,
    }
  }
}

impl<T: FromValue> FromValue for Option<T> {
  const EXPECTED: &'static str = T::EXPECTED;

  fn from_value(value: &Value) -> Option<Self> {
    match value {
      Value::Null => Some(None),
      other => T::from_value(other).map(Some),
    }
  }
}

impl<T: FromValue> FromValue for Vec<T> {
  const EXPECTED: &'static str = "list";

  fn from_value(value: &Value) -> Option<Self> {
    match value {
      Value::List(items) => items.iter().map(T::from_value).collect(),
      _ => None,
    }
  }
}

impl<T: FromValue> FromValue for BTreeMap<String, T> {
  const EXPECTED: &'static str = "map";

  fn from_value(value: &Value) -> Option<Self> {
    match value {
      Value::Map(entries) => entries
        .iter()
        .map(|(k, v)| T::from_value(v).map(|v| (k.clone(), v)))
        .collect(),
      _ => None,
    }
  }
}
