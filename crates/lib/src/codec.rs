//! Canonical wire encoding.
//!
//! Everything that crosses the host boundary, and everything that is hashed
//! into an action id, goes through [`canonical_json`]: keys sorted, no
//! whitespace. Polymorphic values are wrapped in single-key objects whose key
//! is one of the sentinels in [`crate::consts`].

use std::fmt;
use std::marker::PhantomData;

use serde::de::{self, DeserializeOwned, IgnoredAny, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ProtocolError;

/// Serialize `value` in canonical form.
///
/// Going through [`serde_json::Value`] sorts every object's keys, so two
/// structurally equal values always encode to the same bytes.
pub fn canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
  let value = serde_json::to_value(value)?;
  serde_json::to_string(&value)
}

/// Encode a message for the host.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<String, ProtocolError> {
  Ok(canonical_json(value)?)
}

/// Decode a message from the host.
pub fn decode<T: DeserializeOwned>(data: &str) -> Result<T, ProtocolError> {
  Ok(serde_json::from_str(data)?)
}

/// Write `{sentinel: value}`.
pub(crate) fn serialize_sentinel<S, T>(serializer: S, sentinel: &'static str, value: &T) -> Result<S::Ok, S::Error>
where
  S: Serializer,
  T: Serialize + ?Sized,
{
  let mut map = serializer.serialize_map(Some(1))?;
  map.serialize_entry(sentinel, value)?;
  map.end()
}

/// Read `{sentinel: value}`, rejecting any other key.
pub(crate) fn deserialize_sentinel<'de, D, T>(deserializer: D, sentinel: &'static str) -> Result<T, D::Error>
where
  D: Deserializer<'de>,
  T: Deserialize<'de>,
{
  deserializer.deserialize_map(SentinelVisitor {
    sentinel,
    marker: PhantomData,
  })
}

pub(crate) fn deserialize_sentinel_string<'de, D>(deserializer: D, sentinel: &'static str) -> Result<String, D::Error>
where
  D: Deserializer<'de>,
{
  deserialize_sentinel(deserializer, sentinel)
}

struct SentinelVisitor<T> {
  sentinel: &'static str,
  marker: PhantomData<T>,
}

impl<'de, T: Deserialize<'de>> Visitor<'de> for SentinelVisitor<T> {
  type Value = T;

  fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "an object with the single key {:?}", self.sentinel)
  }

  fn visit_map<A>(self, mut map: A) -> Result<T, A::Error>
  where
    A: MapAccess<'de>,
  {
    let key: String = map.next_key()?.ok_or_else(|| de::Error::missing_field(self.sentinel))?;
    if key != self.sentinel {
      return Err(de::Error::custom(format!(
        "expected sentinel key {:?}, found {:?}",
        self.sentinel, key
      )));
    }
    let value = map.next_value()?;
    if map.next_key::<IgnoredAny>()?.is_some() {
      return Err(de::Error::custom(format!(
        "unexpected key alongside sentinel {:?}",
        self.sentinel
      )));
    }
    Ok(value)
  }
}
