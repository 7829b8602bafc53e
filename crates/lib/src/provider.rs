//! Providers: typed, immutable records produced by one rule's analysis and
//! consumed by others.
//!
//! A [`ProviderSchema`] declares a provider type's fields once; instances are
//! created through [`ProviderSchema::instantiate`], which rejects unknown
//! fields and fills in declared defaults.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::codec::{deserialize_sentinel, serialize_sentinel};
use crate::consts::PROVIDER_SENTINEL;
use crate::error::SchemaError;
use crate::label::Label;
use crate::reference::TypeRef;
use crate::value::{FromValue, Value};

/// One declared field of a provider type.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
  pub name: String,
  /// `None` means the field is required.
  pub default: Option<Value>,
}

/// The field table of a provider type.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSchema {
  reference: TypeRef,
  fields: Vec<Field>,
}

impl ProviderSchema {
  pub fn builder(reference: TypeRef) -> ProviderSchemaBuilder {
    ProviderSchemaBuilder {
      reference,
      fields: Vec::new(),
    }
  }

  pub fn reference(&self) -> &TypeRef {
    &self.reference
  }

  pub fn fields(&self) -> &[Field] {
    &self.fields
  }

  pub fn field(&self, name: &str) -> Option<&Field> {
    self.fields.iter().find(|f| f.name == name)
  }

  /// Validate `data` against the schema and build an instance.
  pub fn instantiate<I, K>(&self, data: I) -> Result<Provider, SchemaError>
  where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
  {
    let mut values = BTreeMap::new();
    for (name, value) in data {
      let name = name.into();
      if self.field(&name).is_none() {
        return Err(SchemaError::UnknownField {
          provider: self.reference.qualname.clone(),
          field: name,
        });
      }
      values.insert(name, value);
    }
    for field in &self.fields {
      if values.contains_key(&field.name) {
        continue;
      }
      match &field.default {
        Some(default) => {
          values.insert(field.name.clone(), default.clone());
        }
        None => {
          return Err(SchemaError::MissingField {
            provider: self.reference.qualname.clone(),
            field: field.name.clone(),
          });
        }
      }
    }
    Ok(Provider {
      reference: self.reference.clone(),
      data: values,
    })
  }
}

/// Declares a provider type's fields.
#[derive(Debug)]
pub struct ProviderSchemaBuilder {
  reference: TypeRef,
  fields: Vec<Field>,
}

impl ProviderSchemaBuilder {
  /// A required field.
  pub fn field(mut self, name: impl Into<String>) -> Self {
    self.fields.push(Field {
      name: name.into(),
      default: None,
    });
    self
  }

  /// An optional field, defaulting to `default`.
  pub fn field_with_default(mut self, name: impl Into<String>, default: impl Into<Value>) -> Self {
    self.fields.push(Field {
      name: name.into(),
      default: Some(default.into()),
    });
    self
  }

  pub fn build(self) -> Result<ProviderSchema, SchemaError> {
    for (idx, field) in self.fields.iter().enumerate() {
      if self.fields[..idx].iter().any(|f| f.name == field.name) {
        return Err(SchemaError::DuplicateField {
          provider: self.reference.qualname.clone(),
          field: field.name.clone(),
        });
      }
    }
    Ok(self.finish())
  }

  /// Build without duplicate checking, for schemas defined by the engine itself.
  pub(crate) fn finish(self) -> ProviderSchema {
    ProviderSchema {
      reference: self.reference,
      fields: self.fields,
    }
  }
}

/// A provider instance: its type reference plus field values.
#[derive(Debug, Clone, PartialEq)]
pub struct Provider {
  reference: TypeRef,
  data: BTreeMap<String, Value>,
}

impl Provider {
  /// Assemble an instance whose data is already known to match its schema.
  pub(crate) fn from_parts(reference: TypeRef, data: BTreeMap<String, Value>) -> Provider {
    Provider { reference, data }
  }

  pub fn reference(&self) -> &TypeRef {
    &self.reference
  }

  pub fn data(&self) -> &BTreeMap<String, Value> {
    &self.data
  }

  pub fn is_instance_of(&self, reference: &TypeRef) -> bool {
    &self.reference == reference
  }

  pub fn get(&self, name: &str) -> Option<&Value> {
    self.data.get(name)
  }

  /// Read a field as `T`.
  pub fn field<T: FromValue>(&self, name: &str) -> Result<T, SchemaError> {
    let value = self.get(name).ok_or_else(|| SchemaError::MissingField {
      provider: self.reference.qualname.clone(),
      field: name.to_string(),
    })?;
    value.extract(&format!("field {:?} of provider {}", name, self.reference.qualname))
  }
}

impl fmt::Display for Provider {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}(", self.reference.qualname)?;
    for (idx, (name, value)) in self.data.iter().enumerate() {
      if idx > 0 {
        write!(f, ", ")?;
      }
      write!(f, "{}={:?}", name, value)?;
    }
    write!(f, ")")
  }
}

#[derive(Serialize)]
struct ProviderBodyRef<'a> {
  source_label: &'a Label,
  qualname: &'a str,
  data: &'a BTreeMap<String, Value>,
}

#[derive(Deserialize)]
struct ProviderBody {
  source_label: Label,
  qualname: String,
  #[serde(default)]
  data: BTreeMap<String, Value>,
}

impl Serialize for Provider {
  fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    let body = ProviderBodyRef {
      source_label: &self.reference.source_label,
      qualname: &self.reference.qualname,
      data: &self.data,
    };
    serialize_sentinel(serializer, PROVIDER_SENTINEL, &body)
  }
}

impl<'de> Deserialize<'de> for Provider {
  fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let body: ProviderBody = deserialize_sentinel(deserializer, PROVIDER_SENTINEL)?;
    Ok(Provider {
      reference: TypeRef::new(body.source_label, body.qualname),
      data: body.data,
    })
  }
}
