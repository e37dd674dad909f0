use serde_json::json;
use zdoc::{DocOptions, Entry};

use crate::helpers::{Peer, exchange, synced_pair};

#[test]
fn test_lower_priority_wins_concurrent_set() {
    let (a, b) = synced_pair(5, 10);
    a.doc.get_map("root").unwrap().set("x", "from a").unwrap();
    b.doc.get_map("root").unwrap().set("x", "from b").unwrap();

    exchange(&a, &b).unwrap();

    for peer in [&a, &b] {
        assert_eq!(peer.doc.get_map("root").unwrap().get("x"), Some(Entry::from("from a")));
    }
    assert_eq!(a.doc.clock(), b.doc.clock());
}

#[test]
fn test_convergence_does_not_depend_on_arrival_order() {
    let (a, b) = synced_pair(10, 5);
    a.doc.get_map("root").unwrap().set("x", 1).unwrap();
    b.doc.get_map("root").unwrap().set("x", 2).unwrap();

    // b's write reaches a first here; exchange() delivers in the other order.
    b.send_to(&a).unwrap();
    a.send_to(&b).unwrap();

    assert_eq!(a.doc.to_json(), b.doc.to_json());
    assert_eq!(a.doc.get_map("root").unwrap().get("x"), Some(Entry::from(2)));
}

#[test]
fn test_losing_write_leaves_a_null_in_history() {
    let (a, b) = synced_pair(5, 10);
    a.doc.get_map("root").unwrap().set("x", 1).unwrap();
    b.doc.get_map("root").unwrap().set("x", 2).unwrap();

    exchange(&a, &b).unwrap();

    // b's own write lost on b, a's incoming write lost on a.
    let b_history = b.doc.history();
    assert!(b_history[b_history.len() - 2].is_null());
    let a_history = a.doc.history();
    assert!(a_history.last().unwrap().is_null());
}

#[test]
fn test_set_against_delete_conflict() {
    let (a, b) = synced_pair(1, 2);
    let root = a.doc.get_map("root").unwrap();
    root.set("x", "initial").unwrap();
    a.send_to(&b).unwrap();

    root.delete("x").unwrap();
    b.doc.get_map("root").unwrap().set("x", "revived").unwrap();
    exchange(&a, &b).unwrap();

    // a has the lower priority, so its delete wins everywhere.
    assert!(!root.has("x"));
    assert!(!b.doc.get_map("root").unwrap().has("x"));
}

#[test]
fn test_write_under_deleted_ancestor_is_a_no_op() {
    let (a, b) = synced_pair(10, 1);
    let root = a.doc.get_map("root").unwrap();
    let config = a.doc.create_map();
    config.set("depth", 1).unwrap();
    root.set("config", &config).unwrap();
    a.send_to(&b).unwrap();

    root.delete("config").unwrap();
    // b has the winning priority, but its target is gone on a.
    b.doc
        .get_map("root")
        .unwrap()
        .get_map("config")
        .unwrap()
        .set("depth", 3)
        .unwrap();

    exchange(&a, &b).unwrap();

    assert_eq!(a.doc.to_json(), json!({"root": {"seed": true}}));
    assert_eq!(b.doc.to_json(), a.doc.to_json());
    assert_eq!(a.doc.clock(), b.doc.clock());
}

#[test]
fn test_concurrent_pushes_both_survive() {
    let (a, b) = synced_pair(1, 2);
    let list = a.doc.get_array("list").unwrap();
    list.push(["base"]).unwrap();
    a.send_to(&b).unwrap();

    list.push(["from a"]).unwrap();
    b.doc.get_array("list").unwrap().push(["from b"]).unwrap();
    exchange(&a, &b).unwrap();

    let mut ours = list.zids();
    let mut theirs = b.doc.get_array("list").unwrap().zids();
    assert_eq!(ours.len(), 3);
    // Concurrent appends land in arrival order, so only the element sets match.
    ours.sort_unstable();
    theirs.sort_unstable();
    assert_eq!(ours, theirs);
}

#[test]
fn test_concurrent_delete_of_same_element() {
    let (a, b) = synced_pair(1, 2);
    let list = a.doc.get_array("list").unwrap();
    list.push(["doomed"]).unwrap();
    list.push(["kept"]).unwrap();
    a.send_to(&b).unwrap();

    list.delete(0, 1).unwrap();
    b.doc.get_array("list").unwrap().delete(0, 1).unwrap();
    exchange(&a, &b).unwrap();

    for peer in [&a, &b] {
        let list = peer.doc.get_array("list").unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list.get(0), Some(Entry::from("kept")));
    }
    assert_eq!(a.doc.clock(), b.doc.clock());
}

#[test]
fn test_push_into_replaced_array_is_dropped() {
    let (a, b) = synced_pair(1, 2);
    let root = a.doc.get_map("root").unwrap();
    root.set("items", a.doc.create_array()).unwrap();
    a.send_to(&b).unwrap();

    root.set("items", a.doc.create_array()).unwrap();
    b.doc
        .get_map("root")
        .unwrap()
        .get_array("items")
        .unwrap()
        .push(["orphan"])
        .unwrap();
    exchange(&a, &b).unwrap();

    assert_eq!(a.doc.to_json(), b.doc.to_json());
    assert!(root.get_array("items").unwrap().is_empty());
}

#[test]
fn test_rebase_beyond_retained_history_needs_reset() {
    let a = Peer::from_doc(zdoc::Doc::with_options(
        DocOptions::new().with_resolve_priority(1).with_history_limit(1),
    ));
    let b = Peer::new(2);
    a.reset(&b).unwrap();

    let root = a.doc.get_map("root").unwrap();
    root.set("one", 1).unwrap();
    root.set("two", 2).unwrap();
    a.take_updates();
    b.doc.get_map("root").unwrap().set("late", true).unwrap();

    let err = b.send_to(&a).unwrap_err();
    assert!(err.is_desync());

    a.reset(&b).unwrap();
    assert_eq!(b.doc.to_json(), a.doc.to_json());
}
