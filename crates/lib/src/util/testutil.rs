//! Test utilities for trellis-lib.
//!
//! Helpers to build rule contexts without a driver, and to run tasks against
//! a scripted host.

use std::collections::BTreeMap;
use std::future::Future;
use std::rc::Rc;

use crate::config::{BuildConfig, CompilationMode, OptionFamily};
use crate::exec::LinuxExecutePlatform;
use crate::label::Label;
use crate::platform::Os;
use crate::protocol::{Request, Response};
use crate::provider::Provider;
use crate::reference::TypeRef;
use crate::rule::{RuleClass, RuleContext};
use crate::task::{Step, Task};

/// A target and host configuration on Linux in fastbuild mode.
pub fn linux_config() -> BuildConfig {
  let options = [CompilationMode::Fastbuild.option(), Os::Linux.option()];
  BuildConfig::new(options.clone(), options)
}

/// A Linux execution platform provider, as the host would return it.
pub fn execute_platform() -> Provider {
  LinuxExecutePlatform {
    execution_sysroot: Label::new("@sysroot//:root").expect("valid sysroot label"),
    execution_sysroot_input_dest: "/src".to_string(),
    execution_sysroot_output_dest: "/out".to_string(),
    execution_sysroot_exec_context_dest: "/exec".to_string(),
    uid: 0,
    gid: 0,
    standard_environment_variables: BTreeMap::new(),
    use_fuse: false,
    use_interceptor: false,
  }
  .to_provider()
}

/// A context for an attribute-less rule analyzing `label`.
pub fn context(label: &str) -> RuleContext {
  let class = RuleClass::builder(TypeRef::builtin("test", "Empty"))
    .build()
    .expect("empty rule class");
  RuleContext::new(
    Rc::new(class),
    "test",
    Label::new(label).expect("valid test label"),
    BTreeMap::new(),
    linux_config(),
  )
}

/// A descriptor over a fresh temporary file holding `contents`, as the host
/// would hand it over in a file handle response.
#[cfg(unix)]
pub fn host_fd(contents: &[u8]) -> i32 {
  use std::io::{Seek, Write};
  use std::os::fd::IntoRawFd;

  let mut file = tempfile::tempfile().expect("temporary file");
  file.write_all(contents).expect("write temporary file");
  file.rewind().expect("rewind temporary file");
  file.into_raw_fd()
}

/// Run `future` to completion, answering each request with `host`.
///
/// Returns the output and every request batch in the order it was emitted.
pub fn drive<'a, T, F, H>(future: F, mut host: H) -> (T, Vec<Vec<Request>>)
where
  F: Future<Output = T> + 'a,
  H: FnMut(&Request) -> Response,
{
  let mut task = Task::new(future);
  let mut batches = Vec::new();
  let mut responses = Vec::new();
  loop {
    match task.resume(responses).expect("protocol error while driving task") {
      Step::Done(output) => return (output, batches),
      Step::Pending(requests) => {
        responses = requests.iter().map(&mut host).collect();
        batches.push(requests);
      }
    }
  }
}
