use std::cell::RefCell;
use std::rc::Rc;

use serde_json::json;
use zdoc::binding::State;
use zdoc::doc::CrdtError;
use zdoc::{Action, Change, Doc, Entry, Error, Member, Value, encode_state_as_update};

use crate::helpers::Peer;

fn record(observe: impl FnOnce(Box<dyn Fn(&Change)>)) -> Rc<RefCell<Vec<Change>>> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    observe(Box::new(move |change: &Change| sink.borrow_mut().push(change.clone())));
    seen
}

#[test]
fn test_reset_keeps_root_wrappers_and_notifies() {
    let source = Peer::new(1);
    source.doc.get_map("root").unwrap().set("x", 5).unwrap();

    let target = Peer::new(2);
    let root = target.doc.get_map("root").unwrap();
    root.set("y", 1).unwrap();
    let seen = record(|f| {
        root.observe(f);
    });

    source.reset(&target).unwrap();

    assert!(root.is_live());
    assert_eq!(root.get("x"), Some(Entry::from(5)));
    assert!(!root.has("y"));

    let seen = seen.borrow();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].deleted, vec![Member::Key("y".to_string())]);
    assert_eq!(seen[0].key_action("y"), Some(Action::Delete));
    assert_eq!(seen[1].added, vec![Member::Key("x".to_string())]);
    assert_eq!(seen[1].key_action("x"), Some(Action::Add));
}

#[test]
fn test_element_wrapper_follows_its_zid() {
    let source = Peer::new(1);
    let list = source.doc.get_array("list").unwrap();
    list.push(["first"]).unwrap();
    let zid = list.push([source.doc.create_map()]).unwrap();
    list.get_map_by_id(zid).unwrap().set("v", 1).unwrap();

    let target = Peer::new(2);
    source.reset(&target).unwrap();
    let element = target.doc.get_array("list").unwrap().get_map_by_id(zid).unwrap();
    let seen = record(|f| {
        element.observe(f);
    });

    // The element moves to index 0 and changes content on the source.
    list.delete(0, 1).unwrap();
    list.get_map_by_id(zid).unwrap().set("v", 2).unwrap();
    source.reset(&target).unwrap();

    assert!(element.is_live());
    assert_eq!(element.get("v"), Some(Entry::from(2)));
    assert_eq!(target.doc.get_array("list").unwrap().get(0), Some(Entry::Map(element.clone())));

    let seen = seen.borrow();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].key_action("v"), Some(Action::Delete));
    assert_eq!(seen[1].key_action("v"), Some(Action::Add));
}

#[test]
fn test_array_reset_reports_values() {
    let source = Peer::new(1);
    source.doc.get_array("list").unwrap().push(["new"]).unwrap();

    let target = Peer::new(2);
    let list = target.doc.get_array("list").unwrap();
    list.push(["old"]).unwrap();
    let seen = record(|f| {
        list.observe(f);
    });

    source.reset(&target).unwrap();

    let seen = seen.borrow();
    assert_eq!(seen[0].deleted, vec![Member::Value(Entry::from("old"))]);
    assert_eq!(seen[1].changes.values, vec![(Entry::from("new"), Action::Add)]);
}

#[test]
fn test_vanished_binding_releases_its_wrapper() {
    let source = Peer::new(1);
    source.doc.get_map("root").unwrap();

    let target = Peer::new(2);
    let root = target.doc.get_map("root").unwrap();
    root.set("gone", target.doc.create_map()).unwrap();
    let gone = root.get_map("gone").unwrap();

    source.reset(&target).unwrap();

    assert!(root.is_live());
    assert!(!gone.is_live());
    assert!(matches!(gone.set("k", 1).unwrap_err(), Error::Crdt(CrdtError::Released)));
}

#[test]
fn test_kind_change_does_not_remap() {
    let source = Peer::new(1);
    source.doc.get_map("root").unwrap().set("slot", source.doc.create_array()).unwrap();

    let target = Peer::new(2);
    let root = target.doc.get_map("root").unwrap();
    root.set("slot", target.doc.create_map()).unwrap();
    let slot = root.get_map("slot").unwrap();

    source.reset(&target).unwrap();

    assert!(!slot.is_live());
    assert!(root.get_array("slot").is_ok());
}

#[test]
fn test_reset_clears_history_and_sets_clock() {
    let target = Doc::new();
    target.get_map("root").unwrap().set("a", 1).unwrap();
    assert_eq!(target.history_len(), 1);

    let mut record = std::collections::BTreeMap::new();
    let mut root = std::collections::BTreeMap::new();
    root.insert("b".to_string(), State::Value(Value::from("two")));
    record.insert("root".to_string(), State::Map(root));
    target.set_clock_state(42, State::Map(record)).unwrap();

    assert_eq!(target.clock(), 42);
    assert_eq!(target.history_len(), 0);
    assert_eq!(target.to_json(), json!({"root": {"b": "two"}}));
}

#[test]
fn test_reset_rejections() {
    let doc = Doc::new();
    let err = doc.set_clock_state(1, State::Value(Value::Int(3))).unwrap_err();
    assert!(err.is_malformed_update());

    let source = Doc::new();
    let update = encode_state_as_update(&source).unwrap();
    let err = doc
        .transact(|| zdoc::apply_update(&doc, &update, None))
        .unwrap_err();
    assert!(matches!(err, Error::Crdt(CrdtError::TransactionInProgress)));
}
