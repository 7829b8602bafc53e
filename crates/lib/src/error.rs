//! Error taxonomy for rule invocation and analysis.
//!
//! Every failure here is one-shot: nothing at this layer retries, degrades or
//! continues past an error. Analysis of a target aborts on the first error and
//! the host decides what to do with it.
//!
//! - [`SchemaError`]: invocation-time validation (attributes, provider fields)
//! - [`LabelError`]: malformed addresses and escaping paths
//! - [`ResolveError`]: failed lookups during analysis
//! - [`ProtocolError`]: host/driver mismatches
//! - [`AnalysisError`]: union of the above, returned by every suspension point

use thiserror::Error;

pub use crate::label::LabelError;

/// Validation failures raised before any host interaction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
  /// The target name was missing or empty.
  #[error("expected a non-empty target name for rule {rule}")]
  InvalidName { rule: String },

  /// An attribute was supplied that the rule does not declare.
  #[error("rule {rule} has no attribute named {attribute:?}")]
  UnknownAttribute { rule: String, attribute: String },

  /// A required attribute was not supplied.
  #[error("rule {rule} expects a value for attribute {attribute:?}")]
  MissingAttribute { rule: String, attribute: String },

  /// The same attribute was declared twice on a rule.
  #[error("attribute {attribute:?} declared more than once on rule {rule}")]
  DuplicateAttribute { rule: String, attribute: String },

  /// The same field was declared twice on a provider.
  #[error("field {field:?} declared more than once on provider {provider}")]
  DuplicateField { provider: String, field: String },

  /// A value had the wrong shape for where it was used.
  #[error("{context}: expected {expected}, got {actual}")]
  WrongShape {
    context: String,
    expected: &'static str,
    actual: &'static str,
  },

  /// A provider was constructed with a field it does not declare.
  #[error("provider {provider} has no field {field:?}")]
  UnknownField { provider: String, field: String },

  /// A provider was constructed without one of its required fields.
  #[error("provider {provider} requires field {field:?}")]
  MissingField { provider: String, field: String },

  /// An address inside an attribute or entry was invalid.
  #[error(transparent)]
  Label(#[from] LabelError),
}

/// Lookups that failed while a rule was being analyzed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
  /// No provider of the requested type was returned for the target.
  #[error("no provider of type {provider} found for {target}")]
  NoMatchingProvider { provider: String, target: String },

  /// More than one provider of the requested type was returned.
  #[error("more than one provider of type {provider} found for {target}")]
  AmbiguousProvider { provider: String, target: String },

  /// The host has no globally registered provider of the requested type.
  #[error("failed to find global provider for {provider}")]
  GlobalProviderNotFound { provider: String },

  /// No executable with the requested name was provided by the target.
  #[error("no executable named {name:?} provided by {target}")]
  NoMatchingExecutable { target: String, name: String },

  /// The host configuration selects an OS with no known execution platform.
  #[error("no execution platform is known for host os {os}")]
  NoExecutePlatform { os: String },

  /// A labeled source file does not exist.
  #[error("no file with label {label}")]
  FileNotFound { label: String },

  /// A file was missing from a materialized depmap.
  #[error("depmap {depmap} has no file {path:?}")]
  DepmapFileNotFound { depmap: String, path: String },

  /// A directory was missing from a materialized depmap.
  #[error("depmap {depmap} has no directory {path:?}")]
  DepmapDirectoryNotFound { depmap: String, path: String },

  /// An attribute was read before or outside attribute resolution.
  #[error("attribute {attribute:?} has not been resolved")]
  UnresolvedAttribute { attribute: String },
}

/// The host and the engine disagree about the request/response protocol.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
  /// A response of the wrong kind arrived for a request.
  #[error("invalid response to {request} request: got {response}")]
  UnexpectedResponse {
    request: &'static str,
    response: &'static str,
  },

  /// The response batch did not match the request batch in length.
  #[error("expected {expected} responses, got {actual}")]
  ResponseCount { expected: usize, actual: usize },

  /// A task suspended without issuing any host request.
  #[error("task suspended without issuing a host request")]
  Stalled,

  /// A host call was awaited outside of any scheduler task.
  #[error("host request issued outside of a running task")]
  OutsideTask,

  /// A task was resumed after it had already completed.
  #[error("task resumed after completion")]
  Finished,

  /// A message could not be encoded or decoded.
  #[error("codec error: {0}")]
  Codec(String),

  /// A file descriptor handed over by the host could not be read.
  #[error("failed to read host file descriptor {fileno}: {message}")]
  FileHandle { fileno: i32, message: String },
}

impl From<serde_json::Error> for ProtocolError {
  fn from(err: serde_json::Error) -> Self {
    ProtocolError::Codec(err.to_string())
  }
}

/// Any failure that aborts a rule's analysis.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalysisError {
  #[error("schema error: {0}")]
  Schema(#[from] SchemaError),

  #[error("address error: {0}")]
  Label(#[from] LabelError),

  #[error("resolution error: {0}")]
  Resolve(#[from] ResolveError),

  #[error("protocol error: {0}")]
  Protocol(#[from] ProtocolError),

  /// A failure reported by a rule's own analysis logic.
  #[error("{0}")]
  Rule(String),
}

impl AnalysisError {
  /// Build an error from a rule's own analysis logic.
  pub fn rule(message: impl Into<String>) -> Self {
    AnalysisError::Rule(message.into())
  }
}

impl From<serde_json::Error> for AnalysisError {
  fn from(err: serde_json::Error) -> Self {
    AnalysisError::Protocol(err.into())
  }
}

pub type AnalysisResult<T> = Result<T, AnalysisError>;
