//! Sets of shell-style filename patterns.

use ::glob::Pattern;
use serde::{Deserialize, Serialize};

use crate::codec::{deserialize_sentinel, serialize_sentinel};
use crate::consts::GLOBSET_SENTINEL;
use crate::label::LabelError;

/// Matches a filename if any of its patterns does.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct GlobSet {
  patterns: Vec<Pattern>,
}

impl GlobSet {
  pub fn new<I, S>(patterns: I) -> Result<GlobSet, LabelError>
  where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
  {
    let patterns = patterns
      .into_iter()
      .map(|p| Pattern::new(p.as_ref()).map_err(|_| LabelError::InvalidGlob(p.as_ref().to_string())))
      .collect::<Result<Vec<_>, _>>()?;
    Ok(GlobSet { patterns })
  }

  pub fn patterns(&self) -> impl Iterator<Item = &str> {
    self.patterns.iter().map(Pattern::as_str)
  }

  pub fn is_match(&self, item: &str) -> bool {
    self.patterns.iter().any(|p| p.matches(item))
  }
}

impl Serialize for GlobSet {
  fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    let patterns: Vec<&str> = self.patterns().collect();
    serialize_sentinel(serializer, GLOBSET_SENTINEL, &patterns)
  }
}

impl<'de> Deserialize<'de> for GlobSet {
  fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let patterns: Vec<String> = deserialize_sentinel(deserializer, GLOBSET_SENTINEL)?;
    GlobSet::new(patterns).map_err(serde::de::Error::custom)
  }
}
