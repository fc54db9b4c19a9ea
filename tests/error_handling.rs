//! Error handling and edge case tests.

use serde_json::json;
use statetree::{NodeSchema, PathKey, StateError, StateTree, StateView, TreeConfig, Value};

// --- Path Errors ---

#[test]
fn test_malformed_paths_fail_before_touching_tree() {
    let tree = StateTree::new();
    let node = tree.create_node(json!({"a": {"b": 1}}));
    let before = node.snapshot().unwrap();

    for bad in ["a..b", ".a", "a.", "a[", "a[x]", "a[1]b", "a[]"] {
        let err = node.set(bad, 2).unwrap_err();
        assert!(
            matches!(err, StateError::InvalidPath { ref path, .. } if path == bad),
            "{bad:?} gave {err}"
        );
        assert!(node.get(bad).is_err());
        assert!(node.subscribe(bad, |_, _| {}).is_err());
    }

    assert!(node.snapshot().unwrap().same(&before));
    assert_eq!(node.trie_node_count().unwrap(), 1);
}

#[test]
fn test_quoted_bracket_keys() {
    let tree = StateTree::new();
    let node = tree.create_node(json!({"files": {"a.txt": 1}}));
    assert_eq!(node.get(r#"files["a.txt"]"#).unwrap(), Value::from(1));

    let path = PathKey::parse(r#"files["a.txt"]"#).unwrap();
    assert_eq!(path.len(), 2);
    assert_eq!(PathKey::parse(&path.to_string()).unwrap(), path);
}

// --- Reads ---

#[test]
fn test_get_missing_paths_returns_null() {
    let tree = StateTree::new();
    let node = tree.create_node(json!({"a": 1, "list": [1, 2], "s": "héllo"}));

    assert_eq!(node.get("nope").unwrap(), Value::Null);
    assert_eq!(node.get("a.b.c").unwrap(), Value::Null);
    assert_eq!(node.get("list[9]").unwrap(), Value::Null);
    assert_eq!(node.get("list.other").unwrap(), Value::Null);
    assert_eq!(node.get("s.length").unwrap(), Value::from(5));
}

#[test]
fn test_null_root_node() {
    let tree = StateTree::new();
    let node = tree.create_node(Value::Null);
    assert_eq!(node.get("a").unwrap(), Value::Null);
    assert!(!node.set("a", 1).unwrap());
    assert!(node.set("", json!({"a": 1})).unwrap());
    assert_eq!(node.get("a").unwrap(), Value::from(1));
}

// --- Writes ---

#[test]
fn test_patch_requires_mapping() {
    let tree = StateTree::new();
    let node = tree.create_node(json!({"a": {}}));
    let err = node.patch("a", json!([1, 2])).unwrap_err();
    assert!(matches!(err, StateError::InvalidPatch("list")));
    assert!(matches!(
        node.patch("a", 3),
        Err(StateError::InvalidPatch(_))
    ));
}

#[test]
fn test_patch_list_by_index() {
    let tree = StateTree::new();
    let node = tree.create_node(json!({"list": ["a", "b"]}));
    assert!(node.patch("list", json!({"1": "B", "2": "c"})).unwrap());
    assert_eq!(node.get("list").unwrap(), json!(["a", "B", "c"]));
}

#[test]
fn test_set_pads_lists_with_null() {
    let tree = StateTree::new();
    let node = tree.create_node(json!({"list": []}));
    assert!(node.set("list[2]", "x").unwrap());
    assert_eq!(node.get("list").unwrap(), json!([null, null, "x"]));
    assert!(!node.unset("list[5]").unwrap());
}

#[test]
fn test_huge_list_index_is_rejected() {
    let tree = StateTree::new();
    let node = tree.create_node(json!({"items": []}));
    let before = node.snapshot().unwrap();

    let err = node.set(format!("items[{}]", usize::MAX), 1).unwrap_err();
    assert!(matches!(err, StateError::IndexOutOfRange { index, len: 0 } if index == usize::MAX));
    assert!(matches!(
        node.patch("items", Value::map([(usize::MAX.to_string(), Value::from(1))])),
        Err(StateError::IndexOutOfRange { .. })
    ));
    assert!(node.snapshot().unwrap().same(&before));
}

#[test]
fn test_list_padding_limit_is_configurable() {
    let tree = StateTree::with_config(TreeConfig {
        max_list_padding: 2,
        ..Default::default()
    });
    let node = tree.create_node(json!({"items": []}));
    assert!(node.set("items[2]", "x").unwrap());
    assert!(matches!(
        node.set("items[6]", "y"),
        Err(StateError::IndexOutOfRange { index: 6, len: 3 })
    ));
    assert_eq!(node.get("items").unwrap(), json!([null, null, "x"]));
}

#[test]
fn test_child_owned_keys_are_protected() {
    let tree = StateTree::new();
    let page = tree.create_node(json!({}));
    let child = tree.create_node(json!({"v": 1}));
    page.set_child("c", &child).unwrap();

    let err = page.set("", json!({"c": {"v": 1}})).unwrap_err();
    assert!(matches!(err, StateError::ChildOwned(ref key) if key == "c"));
    assert!(matches!(page.set("", 5), Err(StateError::ChildOwned(_))));

    // Passing the mirror itself is accepted.
    let mirror = page.get("c").unwrap();
    assert!(page.set("", Value::map([("c", mirror), ("x", Value::from(1))])).unwrap());
    assert_eq!(page.get("x").unwrap(), Value::from(1));
}

// --- Disposed nodes ---

#[test]
fn test_operations_on_disposed_node() {
    let tree = StateTree::new();
    let node = tree.create_node(json!({}));
    node.dispose().unwrap();

    assert!(matches!(node.get("a"), Err(StateError::NodeDisposed(_))));
    assert!(matches!(node.set("a", 1), Err(StateError::NodeDisposed(_))));
    assert!(matches!(node.patch("", json!({})), Err(StateError::NodeDisposed(_))));
    assert!(matches!(
        node.subscribe("a", |_, _| {}),
        Err(StateError::NodeDisposed(_))
    ));
    assert!(matches!(node.notify("e", 1), Err(StateError::NodeDisposed(_))));
    assert!(matches!(node.dispose(), Err(StateError::NodeDisposed(_))));

    // A new node may reuse the slot but not the identity.
    let fresh = tree.create_node(json!({}));
    assert_ne!(fresh.id(), node.id());
    assert!(matches!(node.get("a"), Err(StateError::NodeDisposed(_))));
}

// --- Actions, schemas and views ---

#[test]
fn test_action_errors_propagate() {
    let tree = StateTree::new();
    let node = tree
        .build(&NodeSchema::new().action("fail", |_, args| {
            Err(StateError::Action(format!("rejected {args}")))
        }))
        .unwrap();

    let err = node.invoke("fail", "input").unwrap_err();
    assert_eq!(err.to_string(), "Action failed: rejected \"input\"");
    assert!(matches!(
        node.invoke("missing", Value::Null),
        Err(StateError::UnknownAction(_))
    ));
}

#[test]
fn test_view_rejects_bad_paths_and_fields() {
    let tree = StateTree::new();
    let node = tree.create_node(json!({"a": 1}));
    assert!(matches!(
        StateView::new(&node, [("a", "a..b")]),
        Err(StateError::InvalidPath { .. })
    ));
    assert_eq!(node.subscription_count().unwrap(), 0);

    let view = StateView::new(&node, [("a", "a")]).unwrap();
    assert!(matches!(view.set("b", 1), Err(StateError::UnknownField(_))));
}

// --- Serialization boundary ---

#[test]
fn test_snapshot_round_trips_through_serde() {
    let tree = StateTree::new();
    let node = tree.create_node(json!({"n": 1.5, "tags": ["x"], "deep": {"ok": true}}));

    let text = serde_json::to_string(&node.snapshot().unwrap()).unwrap();
    let back: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(back, node.snapshot().unwrap());

    let err: StateError = serde_json::from_str::<serde_json::Value>("{oops")
        .unwrap_err()
        .into();
    assert!(matches!(err, StateError::Serialization(_)));
}

#[test]
fn test_unicode_keys() {
    let tree = StateTree::new();
    let node = tree.create_node(json!({"日本": {"名前": "x"}}));
    assert_eq!(node.get("日本.名前").unwrap(), Value::from("x"));
    assert!(node.set("日本.名前", "y").unwrap());
    assert_eq!(PathKey::parse("日本.名前").unwrap().to_string(), "日本.名前");
}
