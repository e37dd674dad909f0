use std::cell::Cell;
use std::rc::Rc;

use serde_json::json;
use zdoc::{Entry, TypedBuffer, apply_update};

use crate::helpers::Peer;

#[test]
fn test_clone_is_independent() {
    let original = Peer::new(3);
    let root = original.doc.get_map("root").unwrap();
    root.set("x", 1).unwrap();

    let copy = original.doc.clone();
    assert_eq!(copy.clock(), original.doc.clock());
    assert_eq!(copy.to_json(), original.doc.to_json());

    copy.get_map("root").unwrap().set("x", 2).unwrap();
    assert_eq!(root.get("x"), Some(Entry::from(1)));
    assert_eq!(copy.to_json(), json!({"root": {"x": 2}}));
}

#[test]
fn test_clone_does_not_share_observers() {
    let original = Peer::new(3);
    let root = original.doc.get_map("root").unwrap();
    let hits = Rc::new(Cell::new(0));
    let counter = hits.clone();
    root.observe(move |_| counter.set(counter.get() + 1));

    let copy = original.doc.clone();
    copy.get_map("root").unwrap().set("y", true).unwrap();

    assert_eq!(hits.get(), 0);
    assert_eq!(original.pending(), 0);
}

#[test]
fn test_clone_can_sync_with_original() {
    let original = Peer::new(3);
    original.doc.get_map("root").unwrap().set("x", 1).unwrap();
    let copy = Peer::from_doc(original.doc.clone());

    copy.doc.get_map("root").unwrap().set("from_copy", "hi").unwrap();
    for update in copy.take_updates() {
        apply_update(&original.doc, &update, None).unwrap();
    }

    assert_eq!(original.doc.to_json(), copy.doc.to_json());
    assert_eq!(original.doc.clock(), 2);
}

#[test]
fn test_clone_keeps_zids_and_buffers() {
    let original = Peer::new(3);
    let list = original.doc.get_array("list").unwrap();
    list.push([TypedBuffer::from_f32(&[1.0, 2.5])]).unwrap();
    let zid = list.push([original.doc.create_map()]).unwrap();
    list.get_map_by_id(zid).unwrap().set("k", 1).unwrap();

    let copy = original.doc.try_clone().unwrap();
    let replica = copy.get_array("list").unwrap();

    assert_eq!(replica.zids(), list.zids());
    assert_eq!(replica.get(0), list.get(0));
    assert_eq!(replica.get_map_by_id(zid).unwrap().get("k"), Some(Entry::from(1)));
    assert_eq!(copy.history_len(), original.doc.history_len());
    assert_eq!(copy.clock(), original.doc.clock());

    // Elements of the copy are separate bindings.
    replica.get_map_by_id(zid).unwrap().set("k", 2).unwrap();
    assert_eq!(list.get_map_by_id(zid).unwrap().get("k"), Some(Entry::from(1)));
}
