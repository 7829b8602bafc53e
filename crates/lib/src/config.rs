//! Build configuration: option families, their selected options, and
//! configuration-conditioned values.
//!
//! An option family (e.g. [`CompilationMode`]) is a set of mutually exclusive
//! options. A [`BuildConfig`] selects one option per family, separately for
//! the target configuration and the host (tool) configuration.

use serde::{Deserialize, Serialize};

use crate::codec::{deserialize_sentinel, serialize_sentinel};
use crate::consts::{OPTION_SENTINEL, SELECTION_SENTINEL};
use crate::reference::TypeRef;
use crate::value::Value;

/// A selected option together with the family it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConfigOption {
  pub family: TypeRef,
  pub option: TypeRef,
}

impl ConfigOption {
  pub fn new(family: TypeRef, option: TypeRef) -> Self {
    ConfigOption { family, option }
  }
}

/// Resolved option selections for one target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildConfig {
  pub options: Vec<(TypeRef, TypeRef)>,
  pub host_options: Vec<(TypeRef, TypeRef)>,
}

impl BuildConfig {
  pub fn new(
    options: impl IntoIterator<Item = ConfigOption>,
    host_options: impl IntoIterator<Item = ConfigOption>,
  ) -> Self {
    let mut config = BuildConfig::default();
    for option in options {
      set_option(&mut config.options, option);
    }
    for option in host_options {
      set_option(&mut config.host_options, option);
    }
    config
  }

  /// A configuration for the machine running the analysis, used for both
  /// target and host.
  pub fn for_current_host() -> Self {
    let mut options = vec![CompilationMode::Fastbuild.option()];
    if let Some(platform) = crate::platform::Platform::current() {
      options.extend(platform.options());
    }
    BuildConfig::new(options.clone(), options)
  }

  /// The selected option of `family` in the target configuration.
  pub fn get(&self, family: &TypeRef) -> Option<&TypeRef> {
    lookup(&self.options, family)
  }

  /// The selected option of `family` in the host configuration.
  pub fn get_host(&self, family: &TypeRef) -> Option<&TypeRef> {
    lookup(&self.host_options, family)
  }

  /// Whether `option` is currently selected for its family.
  pub fn is_selected(&self, option: &TypeRef) -> bool {
    self.options.iter().any(|(_, selected)| selected == option)
  }

  /// Replace the selection for one family in the target configuration.
  pub fn set(&mut self, option: ConfigOption) {
    set_option(&mut self.options, option);
  }

  /// The configuration tools built for this target are analyzed under.
  pub fn transition_to_host(&self) -> BuildConfig {
    BuildConfig {
      options: self.host_options.clone(),
      host_options: self.host_options.clone(),
    }
  }

  /// The configuration sent along with a host request.
  pub fn for_request(&self, host: bool) -> BuildConfig {
    if host { self.transition_to_host() } else { self.clone() }
  }
}

fn lookup<'a>(options: &'a [(TypeRef, TypeRef)], family: &TypeRef) -> Option<&'a TypeRef> {
  options.iter().find(|(f, _)| f == family).map(|(_, option)| option)
}

fn set_option(options: &mut Vec<(TypeRef, TypeRef)>, option: ConfigOption) {
  match options.iter_mut().find(|(family, _)| *family == option.family) {
    Some(entry) => entry.1 = option.option,
    None => options.push((option.family, option.option)),
  }
}

/// A closed set of options known to the engine itself.
pub trait OptionFamily: Sized + Copy + 'static {
  /// Builtin source file defining the family.
  const SOURCE: &'static str;
  /// Qualified name of the family type.
  const FAMILY: &'static str;

  fn all() -> &'static [Self];

  fn qualname(self) -> &'static str;

  fn family() -> TypeRef {
    TypeRef::builtin(Self::SOURCE, Self::FAMILY)
  }

  fn reference(self) -> TypeRef {
    TypeRef::builtin(Self::SOURCE, self.qualname())
  }

  fn option(self) -> ConfigOption {
    ConfigOption::new(Self::family(), self.reference())
  }

  fn from_reference(reference: &TypeRef) -> Option<Self> {
    Self::all().iter().copied().find(|o| &o.reference() == reference)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompilationMode {
  Fastbuild,
  Optimized,
  Debug,
}

impl OptionFamily for CompilationMode {
  const SOURCE: &'static str = "config";
  const FAMILY: &'static str = "CompilationMode";

  fn all() -> &'static [Self] {
    &[Self::Fastbuild, Self::Optimized, Self::Debug]
  }

  fn qualname(self) -> &'static str {
    match self {
      Self::Fastbuild => "Fastbuild",
      Self::Optimized => "Optimized",
      Self::Debug => "Debug",
    }
  }
}

/// A value conditioned on the build configuration.
///
/// Resolves to the value of the first key whose option is selected, or to
/// `default` when none is.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
  pub mapping: Vec<(TypeRef, Value)>,
  pub default: Value,
}

impl Selection {
  pub fn resolve(&self, config: &BuildConfig) -> &Value {
    self
      .mapping
      .iter()
      .find(|(option, _)| config.is_selected(option))
      .map(|(_, value)| value)
      .unwrap_or(&self.default)
  }
}

/// Build a [`Selection`].
pub fn select<I, V>(mapping: I, default: impl Into<Value>) -> Selection
where
  I: IntoIterator<Item = (TypeRef, V)>,
  V: Into<Value>,
{
  Selection {
    mapping: mapping.into_iter().map(|(k, v)| (k, v.into())).collect(),
    default: default.into(),
  }
}

/// An option type reference in its wrapped wire form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct OptionKey(pub TypeRef);

impl Serialize for OptionKey {
  fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serialize_sentinel(serializer, OPTION_SENTINEL, &self.0)
  }
}

impl<'de> Deserialize<'de> for OptionKey {
  fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    deserialize_sentinel(deserializer, OPTION_SENTINEL).map(OptionKey)
  }
}

#[derive(Serialize)]
struct SelectionBodyRef<'a> {
  mapping: Vec<(OptionKey, &'a Value)>,
  default: &'a Value,
}

#[derive(Deserialize)]
struct SelectionBody {
  mapping: Vec<(OptionKey, Value)>,
  default: Value,
}

impl Serialize for Selection {
  fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    let body = SelectionBodyRef {
      mapping: self
        .mapping
        .iter()
        .map(|(option, value)| (OptionKey(option.clone()), value))
        .collect(),
      default: &self.default,
    };
    serialize_sentinel(serializer, SELECTION_SENTINEL, &body)
  }
}

impl<'de> Deserialize<'de> for Selection {
  fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let body: SelectionBody = deserialize_sentinel(deserializer, SELECTION_SENTINEL)?;
    Ok(Selection {
      mapping: body.mapping.into_iter().map(|(k, v)| (k.0, v)).collect(),
      default: body.default,
    })
  }
}
