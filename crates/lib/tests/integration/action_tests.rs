use trellis_lib::action::{Action, ActionData, Argument, Download, Run};
use trellis_lib::codec::{canonical_json, decode};
use trellis_lib::depmap::DepmapEntry;
use trellis_lib::exec::Executable;
use trellis_lib::label::LabelError;
use trellis_lib::protocol::{Request, Response};
use trellis_lib::reference::TypeRef;
use trellis_lib::rule::RuleClass;

use super::common::{FakeHost, context, label, silent_host, sysroot};

fn compile() -> Run {
  Run::new(Executable::new("bin/cc"), ["-c", "main.c"])
    .cwd("src")
    .env("LANG", "C")
}

fn empty_rule() -> RuleClass {
  RuleClass::builder(TypeRef::new(label("@ws//:rules/test.rs"), "Empty"))
    .build()
    .unwrap()
}

mod identity {
  use super::*;

  #[test]
  fn identical_runs_share_an_id() {
    let a = Action::new(compile());
    let b = Action::new(compile());
    assert_eq!(a.id().unwrap(), b.id().unwrap());
    assert_eq!(a.id().unwrap().len(), 64);
  }

  #[test]
  fn every_field_contributes_to_the_id() {
    let base = Action::new(compile()).id().unwrap().to_string();
    let variants = [
      Action::new(compile().env("LANG", "en_US")),
      Action::new(compile().cwd("build")),
      Action::new(compile().input(label("//pkg:srcs"))),
      Action::new(compile().hide_output(true, false)),
      Action::new(Run::new(Executable::new("bin/cc"), ["-c", "util.c"]).cwd("src").env("LANG", "C")),
      Action::new(Run::new(
        Executable::new("bin/cc"),
        [Argument::from("-c"), Argument::templated("-I{}", label("//pkg:include"))],
      )),
      Action::new(compile()).with_mnemonic("Compile"),
      Action::new(compile()).with_progress_message("compiling main.c"),
    ];
    for variant in &variants {
      assert_ne!(variant.id().unwrap(), base, "{:?}", variant.data());
    }
  }

  #[test]
  fn explicit_id_wins() {
    let action = Action::new(Download::new(["https://example.com/a.tar.gz"])).with_id("archive");
    assert_eq!(action.id().unwrap(), "archive");
    assert_eq!(action.files(&label("//third_party:a")).unwrap(), label("//third_party:a:archive"));
  }
}

mod recording {
  use super::*;

  fn platform_host() -> FakeHost<impl FnMut(&Request) -> Response> {
    FakeHost::new(|request: &Request| match request {
      Request::LoadGlobalProvider { .. } => Response::Provider { provider: sysroot() },
      other => panic!("unexpected request {:?}", other),
    })
  }

  #[test]
  fn recorded_files_are_addressed_by_prepared_id() {
    let cx = context(empty_rule(), "//pkg:lib");
    let recorded = cx.run(compile());
    let mut host = platform_host();
    let files = host.drive(recorded.files()).unwrap();
    assert_eq!(host.batches.len(), 1);

    let prepared = cx.actions().remove(0);
    let ActionData::Run(run) = prepared.data() else {
      panic!("expected run");
    };
    assert_eq!(run.platform, Some(sysroot()));
    assert_ne!(prepared.id().unwrap(), Action::new(compile()).id().unwrap());
    assert_eq!(files, label("//pkg:lib").join_action(prepared.id().unwrap()));
  }

  #[test]
  fn prepared_id_matches_wire_form_without_id() {
    let cx = context(empty_rule(), "//pkg:lib");
    let recorded = cx.run(compile());
    let id = platform_host().drive(recorded.id()).unwrap();

    let mut wire: serde_json::Value = serde_json::from_str(&canonical_json(&cx.actions()[0]).unwrap()).unwrap();
    assert_eq!(wire["id"], serde_json::Value::from(id.as_str()));
    wire["id"] = serde_json::Value::from("");
    let rehashed: Action = decode(&wire.to_string()).unwrap();
    assert_eq!(rehashed.id().unwrap(), id);
  }

  #[test]
  fn download_needs_no_host_round_trip() {
    let cx = context(empty_rule(), "//third_party:a");
    let fetched = cx.download(Download::new(["https://example.com/a.tar.gz"]));
    let mut host = silent_host();
    let files = host.drive(fetched.files()).unwrap();
    assert!(host.batches.is_empty());
    let expected = Action::new(Download::new(["https://example.com/a.tar.gz"]));
    assert_eq!(files, label("//third_party:a").join_action(expected.id().unwrap()));
  }

  #[test]
  fn depmap_rejects_escaping_paths_before_build() {
    let cx = context(empty_rule(), "//pkg:lib");
    let mut depmap = cx.new_depmap(None);
    let err = depmap
      .insert("../x", DepmapEntry::file("data", false))
      .map(|_| ())
      .unwrap_err();
    assert!(matches!(err, LabelError::EscapesRoot(_)));
    assert!(depmap.is_empty());
    assert!(cx.actions().is_empty());
  }

  #[test]
  fn depmap_build_records_an_action() {
    let cx = context(empty_rule(), "//pkg:lib");
    let mut depmap = cx.new_depmap(Some("tree"));
    depmap
      .insert("bin/tool", DepmapEntry::file("#!/bin/sh\n", true))
      .unwrap()
      .insert("include/./a.h", label("//pkg:a.h"))
      .unwrap();
    let files = depmap.build().unwrap();
    assert_eq!(files, label("//pkg:lib:tree"));

    let actions = cx.actions();
    assert_eq!(actions.len(), 1);
    let ActionData::BuildDepmap(tree) = actions[0].data() else {
      panic!("expected a depmap action");
    };
    assert_eq!(tree.entries[1].0.as_str(), "include/a.h");
  }

  #[test]
  fn dependency_executables_merge_contexts() {
    let cx = context(empty_rule(), "//pkg:lib");
    let compiler = Executable::new("bin/cc")
      .with_name("cc")
      .with_context(label("//toolchain:cc_files"));
    let mut linker = Executable::new("bin/ld").with_context(label("//toolchain:ld_files"));
    linker.search_paths = vec!["bin".to_string()];

    let merged = compiler.add_dependency_executable(&cx, &[linker], None).unwrap();
    assert_eq!(merged.executable_path, "bin/cc");
    assert_eq!(merged.search_paths, vec!["bin".to_string()]);

    let actions = cx.actions();
    let ActionData::BuildDepmap(tree) = actions[0].data() else {
      panic!("expected a depmap action");
    };
    assert_eq!(
      tree.entries.iter().map(|(_, entry)| entry.clone()).collect::<Vec<_>>(),
      vec![
        DepmapEntry::Reference(label("//toolchain:cc_files")),
        DepmapEntry::Reference(label("//toolchain:ld_files")),
      ]
    );
    assert_eq!(merged.context, Some(actions[0].files(&label("//pkg:lib")).unwrap()));
  }
}
