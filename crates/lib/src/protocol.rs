//! Messages exchanged with the host engine while a target is analyzed.
//!
//! Each suspension of the analysis task yields a batch of [`Request`]s; the
//! host answers with a batch of [`Response`]s of the same length and order.

use serde::{Deserialize, Serialize};

use crate::action::{Action, ActionOutput};
use crate::config::BuildConfig;
use crate::error::ProtocolError;
use crate::label::{Label, LabelPath};
use crate::provider::Provider;
use crate::reference::TypeRef;
use crate::rule::Analysis;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
  /// Open a source file.
  LabelOpen { label: Label },
  /// Open captured stdout/stderr of an action.
  ContentRefOpen { hash: String },
  ConcreteDepmapFileOpen { depmap: String, filename: LabelPath },
  ConcreteDepmapDirectoryList { depmap: String, filename: LabelPath },
  FileExists { label: Label },
  IsFile { label: Label },
  TargetExists { label: Label },
  /// All providers of a target under a configuration.
  LoadProviders { target: Label, build_config: BuildConfig },
  /// The globally registered provider of a type under a configuration.
  LoadGlobalProvider { provider: TypeRef, build_config: BuildConfig },
  /// Record actions and wait for the output of one of them.
  ActionOutput { action: Action, partial_actions: Vec<Action> },
}

impl Request {
  pub fn kind(&self) -> &'static str {
    match self {
      Request::LabelOpen { .. } => "label_open",
      Request::ContentRefOpen { .. } => "content_ref_open",
      Request::ConcreteDepmapFileOpen { .. } => "concrete_depmap_file_open",
      Request::ConcreteDepmapDirectoryList { .. } => "concrete_depmap_directory_list",
      Request::FileExists { .. } => "file_exists",
      Request::IsFile { .. } => "is_file",
      Request::TargetExists { .. } => "target_exists",
      Request::LoadProviders { .. } => "load_providers",
      Request::LoadGlobalProvider { .. } => "load_global_provider",
      Request::ActionOutput { .. } => "action_output",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
  FileHandle { fileno: i32 },
  FilenameList { filenames: Vec<LabelPath> },
  Boolean { value: bool },
  Providers { providers: Vec<Provider> },
  Provider { provider: Provider },
  ActionOutput(ActionOutput),
  None,
}

impl Response {
  pub fn kind(&self) -> &'static str {
    match self {
      Response::FileHandle { .. } => "file_handle",
      Response::FilenameList { .. } => "filename_list",
      Response::Boolean { .. } => "boolean",
      Response::Providers { .. } => "providers",
      Response::Provider { .. } => "provider",
      Response::ActionOutput(_) => "action_output",
      Response::None => "none",
    }
  }

  /// The error for receiving this response to `request`.
  pub(crate) fn unexpected(&self, request: &'static str) -> ProtocolError {
    ProtocolError::UnexpectedResponse {
      request,
      response: self.kind(),
    }
  }
}

/// A file descriptor opened by the host and handed to the analysis.
///
/// The handle owns its descriptor: it closes on drop, and reading it consumes
/// the handle, so the same descriptor can never be used twice.
///
/// ```compile_fail
/// # fn twice(handle: trellis_lib::protocol::HostFile) {
/// let copy = handle;
/// let _ = handle.read_to_string();
/// let _ = copy.read_to_string();
/// # }
/// ```
#[derive(Debug)]
pub struct HostFile {
  #[cfg(unix)]
  fd: std::os::fd::OwnedFd,
  #[cfg(not(unix))]
  fileno: i32,
}

impl HostFile {
  /// Adopt the descriptor named by a `file_handle` response.
  ///
  /// Called exactly once per decoded response.
  #[cfg(unix)]
  pub(crate) fn adopt(fileno: i32) -> Self {
    use std::os::fd::FromRawFd;

    // SAFETY: the host opens a fresh descriptor for every file handle response
    // and hands it over; each response is consumed by a single adopt call.
    let fd = unsafe { std::os::fd::OwnedFd::from_raw_fd(fileno) };
    HostFile { fd }
  }

  #[cfg(not(unix))]
  pub(crate) fn adopt(fileno: i32) -> Self {
    HostFile { fileno }
  }

  #[cfg(unix)]
  pub fn fileno(&self) -> i32 {
    use std::os::fd::AsRawFd;

    self.fd.as_raw_fd()
  }

  #[cfg(not(unix))]
  pub fn fileno(&self) -> i32 {
    self.fileno
  }

  /// Take ownership of the descriptor.
  #[cfg(unix)]
  pub fn into_file(self) -> std::fs::File {
    std::fs::File::from(self.fd)
  }

  /// Read the whole file as UTF-8, closing the descriptor.
  #[cfg(unix)]
  pub fn read_to_string(self) -> Result<String, ProtocolError> {
    use std::io::Read;

    let fileno = self.fileno();
    let mut contents = String::new();
    self
      .into_file()
      .read_to_string(&mut contents)
      .map_err(|e| ProtocolError::FileHandle {
        fileno,
        message: e.to_string(),
      })?;
    Ok(contents)
  }

  #[cfg(not(unix))]
  pub fn read_to_string(self) -> Result<String, ProtocolError> {
    Err(ProtocolError::FileHandle {
      fileno: self.fileno,
      message: "file descriptors are only supported on unix hosts".to_string(),
    })
  }
}

/// Input to one step of the driver.
#[derive(Debug, Clone, PartialEq)]
pub enum PollEvent {
  /// The initial step, delivered to the task as an empty resumption.
  FirstPoll,
  /// Answers to the previously emitted request batch.
  Responses(Vec<Response>),
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum PollMarker {
  FirstPoll,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum PollEventRepr {
  Marker(PollMarker),
  Responses(Vec<Response>),
}

impl Serialize for PollEvent {
  fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    match self {
      PollEvent::FirstPoll => PollEventRepr::Marker(PollMarker::FirstPoll).serialize(serializer),
      PollEvent::Responses(responses) => responses.serialize(serializer),
    }
  }
}

impl<'de> Deserialize<'de> for PollEvent {
  fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    Ok(match PollEventRepr::deserialize(deserializer)? {
      PollEventRepr::Marker(PollMarker::FirstPoll) => PollEvent::FirstPoll,
      PollEventRepr::Responses(responses) => PollEvent::Responses(responses),
    })
  }
}

impl PollEvent {
  pub(crate) fn into_responses(self) -> Vec<Response> {
    match self {
      PollEvent::FirstPoll => Vec::new(),
      PollEvent::Responses(responses) => responses,
    }
  }
}

/// Output of one step of the driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollOutcome {
  Requests(Vec<Request>),
  Done(Analysis),
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::codec::{canonical_json, decode};

  fn label(s: &str) -> Label {
    Label::new(s).unwrap()
  }

  #[test]
  fn requests_are_tagged_by_type() {
    let request = Request::FileExists { label: label("//pkg:a") };
    assert_eq!(
      canonical_json(&request).unwrap(),
      r#"{"label":{"$trellis_label":"//pkg:a"},"type":"file_exists"}"#
    );
    assert_eq!(request.kind(), "file_exists");
  }

  #[test]
  fn decodes_responses() {
    let response: Response = decode(r#"{"type":"boolean","value":true}"#).unwrap();
    assert_eq!(response, Response::Boolean { value: true });
    let response: Response = decode(r#"{"type":"none"}"#).unwrap();
    assert_eq!(response, Response::None);
    let response: Response =
      decode(r#"{"type":"filename_list","filenames":[{"$trellis_label_path":"a.txt"}]}"#).unwrap();
    assert_eq!(
      response,
      Response::FilenameList {
        filenames: vec![LabelPath::new("a.txt")]
      }
    );
  }

  #[test]
  fn decodes_action_output_response() {
    let response: Response = decode(r#"{"type":"action_output","files":"abc","stdout":"def","stderr":null}"#).unwrap();
    match response {
      Response::ActionOutput(output) => {
        assert_eq!(output.files.hash(), "abc");
        assert_eq!(output.stdout.as_deref(), Some("def"));
        assert_eq!(output.stderr, None);
      }
      other => panic!("unexpected response {:?}", other),
    }
  }

  #[test]
  fn poll_events_have_two_wire_forms() {
    assert_eq!(decode::<PollEvent>(r#"{"type":"first_poll"}"#).unwrap(), PollEvent::FirstPoll);
    assert_eq!(
      decode::<PollEvent>(r#"[{"type":"boolean","value":false}]"#).unwrap(),
      PollEvent::Responses(vec![Response::Boolean { value: false }])
    );
    assert_eq!(decode::<PollEvent>("[]").unwrap(), PollEvent::Responses(vec![]));
    assert_eq!(canonical_json(&PollEvent::FirstPoll).unwrap(), r#"{"type":"first_poll"}"#);
  }

  #[test]
  fn poll_outcome_wire_form() {
    let outcome = PollOutcome::Requests(vec![Request::TargetExists { label: label("//x") }]);
    assert_eq!(
      canonical_json(&outcome).unwrap(),
      r#"{"requests":[{"label":{"$trellis_label":"//x"},"type":"target_exists"}]}"#
    );
  }

  #[cfg(unix)]
  mod host_file {
    use super::*;
    use crate::util::testutil::host_fd;

    #[test]
    fn reads_and_closes_descriptor() {
      let handle = HostFile::adopt(host_fd(b"hello from the host"));
      assert_eq!(handle.read_to_string().unwrap(), "hello from the host");
    }

    // Another thread may reuse the number once it is closed, so compare what
    // the descriptor points at rather than whether it exists.
    #[cfg(target_os = "linux")]
    fn fd_target(fileno: i32) -> Option<std::path::PathBuf> {
      std::fs::read_link(format!("/proc/self/fd/{}", fileno)).ok()
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn descriptor_is_released_exactly_once() {
      let fileno = host_fd(b"once");
      let handle = HostFile::adopt(fileno);
      assert_eq!(handle.fileno(), fileno);
      let target = fd_target(fileno);
      assert!(target.is_some());

      let moved = handle;
      assert_eq!(moved.read_to_string().unwrap(), "once");
      assert_ne!(fd_target(fileno), target);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn dropping_unread_handle_closes_descriptor() {
      let fileno = host_fd(b"unread");
      let target = fd_target(fileno);
      drop(HostFile::adopt(fileno));
      assert_ne!(fd_target(fileno), target);
    }
  }
}
