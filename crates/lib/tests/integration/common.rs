//! Shared helpers for trellis-lib integration tests.

use std::collections::BTreeMap;
use std::future::Future;

use trellis_lib::codec::{canonical_json, decode, encode};
use trellis_lib::config::{BuildConfig, CompilationMode, OptionFamily};
use trellis_lib::exec::LinuxExecutePlatform;
use trellis_lib::platform::Os;
use trellis_lib::protocol::{PollOutcome, Request, Response};
use trellis_lib::provider::Provider;
use trellis_lib::rule::{Analysis, RuleClass, RuleContext};
use trellis_lib::task::{Step, Task};
use trellis_lib::{Driver, DriverError, Label};

/// Module every test rule is declared in.
pub const RULES_MODULE: &str = "@ws//:rules/test.rs";

/// Fastbuild on Linux, for both target and host.
pub fn linux_config() -> BuildConfig {
  let options = [CompilationMode::Fastbuild.option(), Os::Linux.option()];
  BuildConfig::new(options.clone(), options)
}

pub fn linux_config_json() -> String {
  canonical_json(&linux_config()).unwrap()
}

pub fn label(s: &str) -> Label {
  Label::new(s).unwrap()
}

/// The Linux execution platform the fake host hands out.
pub fn sysroot() -> Provider {
  LinuxExecutePlatform {
    execution_sysroot: label("@sysroot//:root"),
    execution_sysroot_input_dest: "/src".to_string(),
    execution_sysroot_output_dest: "/out".to_string(),
    execution_sysroot_exec_context_dest: "/exec".to_string(),
    uid: 1000,
    gid: 1000,
    standard_environment_variables: BTreeMap::new(),
    use_fuse: true,
    use_interceptor: true,
  }
  .to_provider()
}

/// A context for analyzing `target` outside of a driver.
pub fn context(class: RuleClass, target: &str) -> RuleContext {
  RuleContext::new(
    std::rc::Rc::new(class),
    "test",
    label(target),
    BTreeMap::new(),
    linux_config(),
  )
}

/// A scripted host that answers every request through a closure and keeps
/// each batch it was sent.
pub struct FakeHost<H> {
  respond: H,
  pub batches: Vec<Vec<Request>>,
}

impl<H> FakeHost<H>
where
  H: FnMut(&Request) -> Response,
{
  pub fn new(respond: H) -> Self {
    FakeHost {
      respond,
      batches: Vec::new(),
    }
  }

  /// Poll `driver` over the wire encoding until its session finishes.
  pub fn run(&mut self, driver: &mut Driver) -> Result<Analysis, DriverError> {
    let mut event = r#"{"type":"first_poll"}"#.to_string();
    loop {
      let outcome: PollOutcome = decode(&driver.poll(&event)?)?;
      match outcome {
        PollOutcome::Done(analysis) => return Ok(analysis),
        PollOutcome::Requests(requests) => {
          let responses: Vec<Response> = requests.iter().map(&mut self.respond).collect();
          event = encode(&responses)?;
          self.batches.push(requests);
        }
      }
    }
  }

  /// Run `future` as a task outside of any driver session.
  pub fn drive<'a, T>(&mut self, future: impl Future<Output = T> + 'a) -> T {
    let mut task = Task::new(future);
    let mut responses = Vec::new();
    loop {
      match task.resume(responses).unwrap() {
        Step::Done(output) => return output,
        Step::Pending(requests) => {
          responses = requests.iter().map(&mut self.respond).collect();
          self.batches.push(requests);
        }
      }
    }
  }
}

/// A host that fails the test on any request.
pub fn silent_host() -> FakeHost<impl FnMut(&Request) -> Response> {
  FakeHost::new(|request: &Request| -> Response { panic!("unexpected request {:?}", request) })
}
