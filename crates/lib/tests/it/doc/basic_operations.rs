use serde_json::json;
use zdoc::doc::CrdtError;
use zdoc::path::KeyType;
use zdoc::{Doc, Entry, Error, KeyPath};

#[test]
fn test_new_doc_is_empty() {
    let doc = Doc::new();
    assert_eq!(doc.clock(), 0);
    assert_eq!(doc.history_len(), 0);
    assert_eq!(doc.to_json(), json!({}));
}

#[test]
fn test_root_containers_render_as_json() {
    let doc = Doc::new();
    let settings = doc.get_map("settings").unwrap();
    let log = doc.get_array("log").unwrap();

    settings.set("theme", "dark").unwrap();
    settings.set("volume", 0.5).unwrap();
    log.push(["started"]).unwrap();

    assert_eq!(
        doc.to_json(),
        json!({"settings": {"theme": "dark", "volume": 0.5}, "log": ["started"]})
    );
    assert_eq!(doc.clock(), 3);
}

#[test]
fn test_root_kind_is_fixed_once_created() {
    let doc = Doc::new();
    doc.get_array("items").unwrap();
    let err = doc.get_map("items").unwrap_err();
    assert!(err.is_type_mismatch());
    assert_eq!(err.module(), "doc");
}

#[test]
fn test_get_by_key_path() {
    let doc = Doc::new();
    let root = doc.get_map("root").unwrap();
    let child = doc.create_map();
    root.set("child", &child).unwrap();
    child.set("depth", 2).unwrap();

    let value_path = KeyPath::new()
        .with("root", KeyType::Map)
        .with("child", KeyType::Map)
        .with("depth", KeyType::Value);
    assert_eq!(doc.get_by_key_path(&value_path), Some(Entry::from(2)));
    assert_eq!(doc.get_by_key_path(&value_path.parent()), Some(Entry::Map(child)));

    // The tag has to agree with what is stored.
    let wrong = KeyPath::new().with("root", KeyType::Array);
    assert!(doc.get_by_key_path(&wrong).is_none());
}

#[test]
fn test_nesting_a_container_inside_itself_fails() {
    let doc = Doc::new();
    let outer = doc.create_map();
    let inner = doc.create_map();
    outer.set("inner", &inner).unwrap();

    let err = inner.set("outer", &outer).unwrap_err();
    assert!(matches!(err, Error::Crdt(CrdtError::CyclicBinding { .. })));
    assert!(err.is_integrity_error());
    assert!(!inner.has("outer"));
}

#[test]
fn test_wrappers_from_another_doc_are_rejected() {
    let first = Doc::new();
    let second = Doc::new();
    let foreign = second.create_map();

    let err = first.get_map("root").unwrap().set("x", &foreign).unwrap_err();
    assert!(err.is_detached_error());
    assert_eq!(first.clock(), 0);
}

#[test]
fn test_deleted_container_releases_its_wrapper() {
    let doc = Doc::new();
    let root = doc.get_map("root").unwrap();
    root.set("child", doc.create_map()).unwrap();
    let child = root.get_map("child").unwrap();
    child.set("k", 1).unwrap();

    root.delete("child").unwrap();

    assert!(!child.is_live());
    assert!(child.is_empty());
    assert_eq!(child.to_json(), json!({}));
    let err = child.set("k", 2).unwrap_err();
    assert!(matches!(err, Error::Crdt(CrdtError::Released)));
}

#[test]
fn test_replacing_a_container_releases_the_old_one() {
    let doc = Doc::new();
    let root = doc.get_map("root").unwrap();
    root.set("slot", doc.create_array()).unwrap();
    let old = root.get_array("slot").unwrap();

    root.set("slot", doc.create_array()).unwrap();
    let new = root.get_array("slot").unwrap();

    assert!(!old.is_live());
    assert!(new.is_live());
    assert_ne!(old, new);
}
