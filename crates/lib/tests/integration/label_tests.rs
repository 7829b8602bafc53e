use trellis_lib::codec::{decode, encode};
use trellis_lib::glob::GlobSet;
use trellis_lib::label::{LabelError, LabelKind, LabelPath};
use trellis_lib::provider::{Provider, ProviderSchema};
use trellis_lib::reference::TypeRef;
use trellis_lib::value::Value;

use super::common::label;

#[test]
fn join_returns_workspace_absolute_rhs_verbatim() {
  for base in ["//pkg", "@ws//pkg", ":local"] {
    assert_eq!(label(base).join(&label("@other//lib:x")), label("@other//lib:x"));
  }
}

#[test]
fn join_reanchors_workspace_relative_rhs() {
  assert_eq!(label("@ws//pkg:a").join(&label("//lib:b")), label("@ws//lib:b"));
  assert_eq!(label("//pkg").join(&label("//lib:b")), label("//lib:b"));
}

#[test]
fn join_concatenates_with_one_separator() {
  assert_eq!(label("//pkg").join(&label("sub")), label("//pkg/sub"));
  assert_eq!(label("//pkg/").join(&label("sub")), label("//pkg/sub"));
  assert_eq!(label("//pkg").join(&label(":a.txt")), label("//pkg:a.txt"));
  assert_eq!(label("@ws//pkg").join(&label("sub:b")).kind(), LabelKind::WorkspaceAbsolute);
}

#[test]
fn descending_paths_reject_escapes() {
  assert!(matches!(
    LabelPath::new("a/../../b").normalize_require_descending(),
    Err(LabelError::EscapesRoot(_))
  ));
  assert_eq!(
    LabelPath::new("a/./b").normalize_require_descending().unwrap(),
    LabelPath::new("a/b")
  );
  assert!(matches!(
    LabelPath::new("/etc/passwd").normalize_require_descending(),
    Err(LabelError::AbsolutePath(_))
  ));
}

mod wire {
  use super::*;

  #[test]
  fn label_round_trip() {
    let original = label("@ws//pkg/sub:file.txt");
    let encoded = encode(&original).unwrap();
    assert_eq!(encoded, r#"{"$trellis_label":"@ws//pkg/sub:file.txt"}"#);
    assert_eq!(decode::<trellis_lib::Label>(&encoded).unwrap(), original);
  }

  #[test]
  fn provider_round_trip() {
    let schema = ProviderSchema::builder(TypeRef::new(label("@ws//:rules/cc.rs"), "CcInfo"))
      .field("headers")
      .field_with_default("defines", Vec::<String>::new())
      .build()
      .unwrap();
    let original = schema
      .instantiate([(
        "headers",
        Value::from(vec![label("//lib:a.h"), label("//lib:b.h")]),
      )])
      .unwrap();

    let encoded = encode(&original).unwrap();
    assert!(encoded.starts_with(r#"{"$trellis_provider":"#));
    let decoded: Provider = decode(&encoded).unwrap();
    assert_eq!(decoded, original);
    assert_eq!(
      decoded.field::<Vec<trellis_lib::Label>>("headers").unwrap(),
      vec![label("//lib:a.h"), label("//lib:b.h")]
    );
  }

  #[test]
  fn globset_round_trip() {
    let original = GlobSet::new(["*.rs", "src/**/*.toml"]).unwrap();
    let decoded: GlobSet = decode(&encode(&original).unwrap()).unwrap();
    assert_eq!(decoded, original);
    assert!(decoded.is_match("main.rs"));
  }
}
