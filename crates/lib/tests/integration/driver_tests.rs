use async_trait::async_trait;
use trellis_lib::action::{ActionData, ActionOutput, Argument, Run};
use trellis_lib::attribute::Attribute;
use trellis_lib::codec::canonical_json;
use trellis_lib::depmap::ConcreteDepmap;
use trellis_lib::exec::Executable;
use trellis_lib::protocol::{Request, Response};
use trellis_lib::provider::{Provider, ProviderSchema};
use trellis_lib::reference::TypeRef;
use trellis_lib::rule::Analysis;
use trellis_lib::value::Value;
use trellis_lib::workspace::WorkspaceLayout;
use trellis_lib::{AnalysisResult, Analyze, Driver, DriverError, Label, RuleClass, RuleContext, RuleRegistry};

use super::common::{FakeHost, RULES_MODULE, label, linux_config, linux_config_json, silent_host, sysroot};

fn rule_ref(name: &str) -> TypeRef {
  TypeRef::new(label(RULES_MODULE), name)
}

fn driver(classes: Vec<RuleClass>) -> Driver {
  let mut registry = RuleRegistry::new();
  for class in classes {
    registry.register(class);
  }
  Driver::with_layout(registry, WorkspaceLayout::default())
}

fn copy_rule() -> RuleClass {
  RuleClass::builder(rule_ref("Copy"))
    .attribute(Attribute::file("src"))
    .attribute(Attribute::file("dest"))
    .build()
    .unwrap()
}

mod copy {
  use super::*;

  #[test]
  fn invocation_anchors_files_to_package() {
    let invocation = copy_rule()
      .invoke("copy", [("src", ":a.txt"), ("dest", ":b.txt")], Some(&label("//pkg")))
      .unwrap();
    let json: serde_json::Value = serde_json::from_str(&canonical_json(&invocation).unwrap()).unwrap();
    let attributes = json["attributes_input"].as_object().unwrap();
    assert_eq!(attributes.len(), 2);
    assert_eq!(attributes["src"]["$trellis_label"], "//pkg:a.txt");
    assert_eq!(attributes["dest"]["$trellis_label"], "//pkg:b.txt");
  }

  #[test]
  fn analysis_needs_no_host_round_trips() {
    let mut driver = driver(vec![copy_rule()]);
    driver
      .start(
        "/workspaces/ws/rules/test.rs",
        "Copy",
        "copy",
        "//pkg:copy",
        r#"{"dest":":b.txt","src":":a.txt"}"#,
        &linux_config_json(),
      )
      .unwrap();

    let mut host = silent_host();
    let analysis = host.run(&mut driver).unwrap();
    assert_eq!(analysis, Analysis::default());
    assert!(host.batches.is_empty());
  }

  #[test]
  fn unknown_class_is_rejected_at_start() {
    let mut driver = driver(vec![copy_rule()]);
    let err = driver
      .start(RULES_MODULE, "Move", "m", "//pkg:m", "{}", &linux_config_json())
      .unwrap_err();
    assert!(matches!(err, DriverError::UnknownRule { .. }));
  }
}

mod defaults {
  use super::*;

  struct Echo;

  #[async_trait(?Send)]
  impl Analyze for Echo {
    async fn analyze(&self, cx: &RuleContext) -> AnalysisResult<Vec<Provider>> {
      let schema = ProviderSchema::builder(rule_ref("EchoInfo")).field("level").build()?;
      Ok(vec![schema.instantiate([("level", cx.attr("level")?)])?])
    }
  }

  #[test]
  fn omitted_attribute_resolves_to_its_default() {
    let echo = RuleClass::builder(rule_ref("Echo"))
      .attribute(Attribute::any("level").with_default("-O2"))
      .analyze(Echo)
      .build()
      .unwrap();
    let mut driver = driver(vec![echo]);
    driver
      .start(RULES_MODULE, "Echo", "echo", "//pkg:echo", "{}", &linux_config_json())
      .unwrap();

    let analysis = silent_host().run(&mut driver).unwrap();
    assert_eq!(analysis.providers.len(), 1);
    assert_eq!(analysis.providers[0].get("level"), Some(&Value::from("-O2")));
  }
}

#[cfg(unix)]
mod compile {
  use std::io::{Seek, SeekFrom, Write};
  use std::os::fd::IntoRawFd;

  use super::*;

  /// Checks its sources, compiles them and reports the compiler's output.
  struct Compile;

  #[async_trait(?Send)]
  impl Analyze for Compile {
    async fn analyze(&self, cx: &RuleContext) -> AnalysisResult<Vec<Provider>> {
      let compiler = Executable::from_provider(&cx.attr_as::<Provider>("compiler")?)?;
      let srcs: Vec<Label> = cx.attr_as("srcs")?;

      let present = cx.gather(srcs.iter().map(|src| cx.file_exists(src))).await?;
      if present.iter().any(|exists| !exists) {
        return Err(trellis_lib::AnalysisError::rule("missing source"));
      }

      let args = std::iter::once(Argument::from("-c")).chain(srcs.iter().cloned().map(Argument::from));
      let step = cx.run(Run::new(compiler, args));
      let output = step.output().await?;
      let log = match output.open_stdout().await? {
        Some(file) => file.read_to_string()?,
        None => String::new(),
      };

      let info = ProviderSchema::builder(rule_ref("CompileInfo"))
        .field("objects")
        .field("log")
        .build()?;
      Ok(vec![info.instantiate([
        ("objects", Value::from(step.files().await?)),
        ("log", Value::from(log)),
      ])?])
    }
  }

  fn compile_rule() -> RuleClass {
    RuleClass::builder(rule_ref("Compile"))
      .attribute(Attribute::provider("compiler", Executable::reference()).host())
      .attribute(Attribute::label_list("srcs"))
      .analyze(Compile)
      .build()
      .unwrap()
  }

  fn captured_stdout(contents: &str) -> i32 {
    let mut file = tempfile::tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.seek(SeekFrom::Start(0)).unwrap();
    file.into_raw_fd()
  }

  #[test]
  fn compile_rule_round_trips_through_host() {
    let mut driver = driver(vec![compile_rule()]);
    driver
      .start(
        RULES_MODULE,
        "Compile",
        "lib",
        "//pkg:lib",
        r#"{"compiler":"//toolchain:cc","srcs":["a.c","b.c"]}"#,
        &linux_config_json(),
      )
      .unwrap();

    let mut host = FakeHost::new(|request: &Request| match request {
      Request::LoadProviders { target, build_config } => {
        assert_eq!(target, &label("//toolchain:cc"));
        assert_eq!(build_config, &linux_config().transition_to_host());
        Response::Providers {
          providers: vec![Executable::new("bin/cc").with_name("cc").to_provider()],
        }
      }
      Request::FileExists { .. } => Response::Boolean { value: true },
      Request::LoadGlobalProvider { .. } => Response::Provider { provider: sysroot() },
      Request::ActionOutput { partial_actions, .. } => {
        assert_eq!(partial_actions.len(), 1);
        Response::ActionOutput(ActionOutput {
          files: ConcreteDepmap::new("objects-hash"),
          stdout: Some("stdout-hash".to_string()),
          stderr: None,
        })
      }
      Request::ContentRefOpen { hash } => {
        assert_eq!(hash, "stdout-hash");
        Response::FileHandle {
          fileno: captured_stdout("compiled 2 files\n"),
        }
      }
      other => panic!("unexpected request {:?}", other),
    });
    let analysis = host.run(&mut driver).unwrap();

    let kinds: Vec<Vec<&str>> = host
      .batches
      .iter()
      .map(|batch| batch.iter().map(Request::kind).collect())
      .collect();
    assert_eq!(
      kinds,
      vec![
        vec!["load_providers"],
        vec!["file_exists", "file_exists"],
        vec!["load_global_provider"],
        vec!["action_output"],
        vec!["content_ref_open"],
      ]
    );

    assert_eq!(analysis.actions.len(), 1);
    let ActionData::Run(run) = analysis.actions[0].data() else {
      panic!("expected a run action");
    };
    assert_eq!(run.platform, Some(sysroot()));
    assert_eq!(
      run.args.iter().map(ToString::to_string).collect::<Vec<_>>(),
      vec!["-c", "//pkg:a.c", "//pkg:b.c"]
    );

    let info = &analysis.providers[0];
    assert_eq!(info.field::<String>("log").unwrap(), "compiled 2 files\n");
    let objects: Label = info.field("objects").unwrap();
    assert_eq!(objects, label("//pkg:lib").join_action(analysis.actions[0].id().unwrap()));
  }

  #[test]
  fn missing_source_fails_the_analysis() {
    let mut driver = driver(vec![compile_rule()]);
    driver
      .start(
        RULES_MODULE,
        "Compile",
        "lib",
        "//pkg:lib",
        r#"{"compiler":"//toolchain:cc","srcs":["a.c"]}"#,
        &linux_config_json(),
      )
      .unwrap();

    let mut host = FakeHost::new(|request: &Request| match request {
      Request::LoadProviders { .. } => Response::Providers {
        providers: vec![Executable::new("bin/cc").to_provider()],
      },
      Request::FileExists { .. } => Response::Boolean { value: false },
      other => panic!("unexpected request {:?}", other),
    });
    let err = host.run(&mut driver).unwrap_err();
    assert!(matches!(err, DriverError::Analysis(trellis_lib::AnalysisError::Rule(message)) if message == "missing source"));
    assert!(matches!(driver.poll(r#"{"type":"first_poll"}"#), Err(DriverError::NoActiveSession)));
  }
}
