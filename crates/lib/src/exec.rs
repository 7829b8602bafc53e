//! Builtin providers describing how programs are executed.
//!
//! - [`Executable`]: a runnable program plus the depmap it needs at run time
//! - [`LinuxExecutePlatform`]: the sandbox layout actions run inside on Linux
//! - [`MacOsExecutePlatform`]: extra sysroot content for actions on macOS
//!
//! All of them travel over the wire as ordinary providers of builtin types, so any
//! rule can consume or produce them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{AnalysisResult, SchemaError};
use crate::label::Label;
use crate::provider::{Provider, ProviderSchema};
use crate::reference::TypeRef;
use crate::rule::RuleContext;
use crate::value::Value;

const EXEC_SOURCE: &str = "exec";

fn check_type(provider: &Provider, expected: &TypeRef) -> Result<(), SchemaError> {
  if provider.is_instance_of(expected) {
    Ok(())
  } else {
    Err(SchemaError::WrongShape {
      context: format!("provider {}", provider.reference()),
      expected: "provider of a builtin execution type",
      actual: "provider",
    })
  }
}

/// A program that can be invoked by a `Run` action.
///
/// # Fields
///
/// - `name`: Optional name used by [`RuleContext::resolve_executable`]
/// - `context`: Depmap mounted alongside the program when it runs
/// - `executable_path`: Path of the program inside its context
/// - `search_paths`: Entries prepended to `PATH`
/// - `library_search_paths`: Entries prepended to the dynamic loader path
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Executable {
  pub name: Option<String>,
  pub context: Option<Label>,
  pub executable_path: String,
  pub search_paths: Vec<String>,
  pub library_search_paths: Vec<String>,
}

impl Executable {
  pub fn new(executable_path: impl Into<String>) -> Self {
    Executable {
      executable_path: executable_path.into(),
      ..Default::default()
    }
  }

  pub fn with_name(mut self, name: impl Into<String>) -> Self {
    self.name = Some(name.into());
    self
  }

  pub fn with_context(mut self, context: Label) -> Self {
    self.context = Some(context);
    self
  }

  pub fn reference() -> TypeRef {
    TypeRef::builtin(EXEC_SOURCE, "Executable")
  }

  pub fn schema() -> ProviderSchema {
    ProviderSchema::builder(Self::reference())
      .field_with_default("name", Value::Null)
      .field_with_default("context", Value::Null)
      .field("executable_path")
      .field_with_default("search_paths", Vec::<String>::new())
      .field_with_default("library_search_paths", Vec::<String>::new())
      .finish()
  }

  /// The final path component of the program.
  pub fn file_name(&self) -> &str {
    self.executable_path.rsplit('/').next().unwrap_or(&self.executable_path)
  }

  pub fn to_provider(&self) -> Provider {
    let mut data = BTreeMap::new();
    data.insert("name".to_string(), Value::from(self.name.clone()));
    data.insert("context".to_string(), Value::from(self.context.clone()));
    data.insert("executable_path".to_string(), Value::from(self.executable_path.as_str()));
    data.insert("search_paths".to_string(), Value::from(self.search_paths.clone()));
    data.insert(
      "library_search_paths".to_string(),
      Value::from(self.library_search_paths.clone()),
    );
    Provider::from_parts(Self::reference(), data)
  }

  pub fn from_provider(provider: &Provider) -> Result<Executable, SchemaError> {
    check_type(provider, &Self::reference())?;
    Ok(Executable {
      name: provider.field("name")?,
      context: provider.field("context")?,
      executable_path: provider.field("executable_path")?,
      search_paths: provider.field::<Option<Vec<String>>>("search_paths")?.unwrap_or_default(),
      library_search_paths: provider
        .field::<Option<Vec<String>>>("library_search_paths")?
        .unwrap_or_default(),
    })
  }

  /// An executable whose context also contains the contexts of `executables`.
  ///
  /// Search paths are concatenated in order: this executable's first, then
  /// each dependency's.
  pub fn add_dependency_executable(
    &self,
    cx: &RuleContext,
    executables: &[Executable],
    context_id: Option<&str>,
  ) -> AnalysisResult<Executable> {
    let mut search_paths = self.search_paths.clone();
    let mut library_search_paths = self.library_search_paths.clone();

    let mut context = cx.new_depmap(context_id);
    if let Some(own) = &self.context {
      context.merge(own.clone());
    }
    for executable in executables {
      if let Some(dependency) = &executable.context {
        context.merge(dependency.clone());
      }
      search_paths.extend(executable.search_paths.iter().cloned());
      library_search_paths.extend(executable.library_search_paths.iter().cloned());
    }

    Ok(Executable {
      name: None,
      context: Some(context.build()?),
      executable_path: self.executable_path.clone(),
      search_paths,
      library_search_paths,
    })
  }
}

impl Serialize for Executable {
  fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    self.to_provider().serialize(serializer)
  }
}

impl<'de> Deserialize<'de> for Executable {
  fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let provider = Provider::deserialize(deserializer)?;
    Executable::from_provider(&provider).map_err(serde::de::Error::custom)
  }
}

/// Sandbox layout used to execute actions on a Linux host.
#[derive(Debug, Clone, PartialEq)]
pub struct LinuxExecutePlatform {
  pub execution_sysroot: Label,
  pub execution_sysroot_input_dest: String,
  pub execution_sysroot_output_dest: String,
  pub execution_sysroot_exec_context_dest: String,
  pub uid: u32,
  pub gid: u32,
  pub standard_environment_variables: BTreeMap<String, String>,
  pub use_fuse: bool,
  pub use_interceptor: bool,
}

impl LinuxExecutePlatform {
  pub fn reference() -> TypeRef {
    TypeRef::builtin(EXEC_SOURCE, "LinuxExecutePlatform")
  }

  pub fn schema() -> ProviderSchema {
    ProviderSchema::builder(Self::reference())
      .field("execution_sysroot")
      .field("execution_sysroot_input_dest")
      .field("execution_sysroot_output_dest")
      .field("execution_sysroot_exec_context_dest")
      .field("uid")
      .field("gid")
      .field("standard_environment_variables")
      .field_with_default("use_fuse", true)
      .field_with_default("use_interceptor", true)
      .finish()
  }

  pub fn from_provider(provider: &Provider) -> Result<LinuxExecutePlatform, SchemaError> {
    check_type(provider, &Self::reference())?;
    Ok(LinuxExecutePlatform {
      execution_sysroot: provider.field("execution_sysroot")?,
      execution_sysroot_input_dest: provider.field("execution_sysroot_input_dest")?,
      execution_sysroot_output_dest: provider.field("execution_sysroot_output_dest")?,
      execution_sysroot_exec_context_dest: provider.field("execution_sysroot_exec_context_dest")?,
      uid: provider.field("uid")?,
      gid: provider.field("gid")?,
      standard_environment_variables: provider.field("standard_environment_variables")?,
      use_fuse: provider.field::<Option<bool>>("use_fuse")?.unwrap_or(true),
      use_interceptor: provider.field::<Option<bool>>("use_interceptor")?.unwrap_or(true),
    })
  }

  pub fn to_provider(&self) -> Provider {
    let mut data = BTreeMap::new();
    data.insert("execution_sysroot".to_string(), Value::from(self.execution_sysroot.clone()));
    data.insert(
      "execution_sysroot_input_dest".to_string(),
      Value::from(self.execution_sysroot_input_dest.as_str()),
    );
    data.insert(
      "execution_sysroot_output_dest".to_string(),
      Value::from(self.execution_sysroot_output_dest.as_str()),
    );
    data.insert(
      "execution_sysroot_exec_context_dest".to_string(),
      Value::from(self.execution_sysroot_exec_context_dest.as_str()),
    );
    data.insert("uid".to_string(), Value::from(self.uid));
    data.insert("gid".to_string(), Value::from(self.gid));
    data.insert(
      "standard_environment_variables".to_string(),
      Value::from(self.standard_environment_variables.clone()),
    );
    data.insert("use_fuse".to_string(), Value::from(self.use_fuse));
    data.insert("use_interceptor".to_string(), Value::from(self.use_interceptor));
    Provider::from_parts(Self::reference(), data)
  }

  /// Replace `%[srcdir]` and `%[execdir]` with their locations inside the sandbox.
  pub fn substitute(&self, value: &str) -> String {
    value
      .replace("%[srcdir]", &self.execution_sysroot_input_dest)
      .replace("%[execdir]", &self.execution_sysroot_exec_context_dest)
  }
}

/// Execution setup on a macOS host, where actions run without a sandbox
/// sysroot of their own.
#[derive(Debug, Clone, PartialEq)]
pub struct MacOsExecutePlatform {
  /// Depmap laid over the host system for every action.
  pub execution_sysroot_extra: Label,
}

impl MacOsExecutePlatform {
  pub fn reference() -> TypeRef {
    TypeRef::builtin(EXEC_SOURCE, "MacOSExecutePlatform")
  }

  pub fn schema() -> ProviderSchema {
    ProviderSchema::builder(Self::reference())
      .field("execution_sysroot_extra")
      .finish()
  }

  pub fn from_provider(provider: &Provider) -> Result<MacOsExecutePlatform, SchemaError> {
    check_type(provider, &Self::reference())?;
    Ok(MacOsExecutePlatform {
      execution_sysroot_extra: provider.field("execution_sysroot_extra")?,
    })
  }

  pub fn to_provider(&self) -> Provider {
    let data = BTreeMap::from([(
      "execution_sysroot_extra".to_string(),
      Value::from(self.execution_sysroot_extra.clone()),
    )]);
    Provider::from_parts(Self::reference(), data)
  }
}
