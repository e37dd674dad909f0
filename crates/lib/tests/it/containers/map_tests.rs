use serde_json::json;
use zdoc::{Doc, Entry, TypedBuffer, Value};

#[test]
fn test_overwrite_keeps_single_entry() {
    let doc = Doc::new();
    let map = doc.get_map("root").unwrap();
    map.set("key", "original").unwrap();
    map.set("key", "modified").unwrap();

    assert_eq!(map.len(), 1);
    assert_eq!(
        map.get("key").and_then(Entry::into_value).as_ref().and_then(Value::as_text),
        Some("modified")
    );
}

#[test]
fn test_delete_absent_key_is_still_an_event() {
    let doc = Doc::new();
    let map = doc.get_map("root").unwrap();
    map.delete("nothing").unwrap();
    assert_eq!(doc.clock(), 1);
    assert!(map.is_empty());
}

#[test]
fn test_entries_in_key_order() {
    let doc = Doc::new();
    let map = doc.get_map("root").unwrap();
    map.set("b", 2).unwrap();
    map.set("a", 1).unwrap();
    map.set("c", Value::Null).unwrap();

    let entries: Vec<(String, Entry)> = map.entries().collect();
    assert_eq!(
        entries,
        vec![
            ("a".to_string(), Entry::from(1)),
            ("b".to_string(), Entry::from(2)),
            ("c".to_string(), Entry::Value(Value::Null)),
        ]
    );
}

#[test]
fn test_nested_containers() {
    let doc = Doc::new();
    let root = doc.get_map("root").unwrap();
    let profile = doc.create_map();
    let tags = doc.create_array();
    profile.set("name", "Ada").unwrap();
    tags.push(["admin"]).unwrap();
    profile.set("tags", &tags).unwrap();

    root.set("profile", &profile).unwrap();
    tags.push(["ops"]).unwrap();

    assert_eq!(
        doc.to_json(),
        json!({"root": {"profile": {"name": "Ada", "tags": ["admin", "ops"]}}})
    );
    assert_eq!(root.get_map("profile").unwrap().get_array("tags").unwrap(), tags);
    assert_eq!(tags.key_path().unwrap().to_string(), "/root/profile/tags");
    // Only the attach and the push after it were transacted.
    assert_eq!(doc.clock(), 2);
}

#[test]
fn test_typed_buffers_are_leaves() {
    let doc = Doc::new();
    let map = doc.get_map("root").unwrap();
    map.set("samples", TypedBuffer::from_f32(&[1.0, 2.5])).unwrap();

    let value = map.get("samples").and_then(Entry::into_value).unwrap();
    let buffer = value.as_buffer().unwrap();
    assert_eq!(buffer.len(), 2);
    assert_eq!(doc.to_json(), json!({"root": {"samples": [1.0, 2.5]}}));
}

#[test]
fn test_wrappers_for_same_binding_are_equal() {
    let doc = Doc::new();
    let root = doc.get_map("root").unwrap();
    root.set("child", doc.create_map()).unwrap();

    let first = root.get_map("child").unwrap();
    let second = root.get_map("child").unwrap();
    assert_eq!(first, second);

    first.set("k", 1).unwrap();
    assert_eq!(second.get("k"), Some(Entry::from(1)));
}
