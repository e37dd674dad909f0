use std::cell::RefCell;
use std::rc::Rc;

use zdoc::{Action, Change, Doc, Entry, Map, Member};

fn record(map: &Map) -> Rc<RefCell<Vec<Change>>> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    map.observe(move |change| sink.borrow_mut().push(change.clone()));
    seen
}

#[test]
fn test_map_writes_report_key_updates() {
    let doc = Doc::new();
    let map = doc.get_map("root").unwrap();
    let seen = record(&map);

    map.set("x", 1).unwrap();
    map.delete("x").unwrap();

    let seen = seen.borrow();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].key_action("x"), Some(Action::Update));
    assert_eq!(seen[1].key_action("x"), Some(Action::Update));
    assert!(seen[0].added.is_empty() && seen[0].deleted.is_empty());
}

#[test]
fn test_array_events_report_values() {
    let doc = Doc::new();
    let list = doc.get_array("list").unwrap();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    list.observe(move |change| sink.borrow_mut().push(change.clone()));

    list.push(["a"]).unwrap();
    list.delete(0, 1).unwrap();

    let seen = seen.borrow();
    assert_eq!(seen[0].added, vec![Member::Value(Entry::from("a"))]);
    assert_eq!(seen[0].changes.values, vec![(Entry::from("a"), Action::Add)]);
    assert_eq!(seen[1].deleted, vec![Member::Value(Entry::from("a"))]);
    assert_eq!(seen[1].changes.values, vec![(Entry::from("a"), Action::Delete)]);
}

#[test]
fn test_observers_fire_before_the_call_returns_in_order() {
    let doc = Doc::new();
    let map = doc.get_map("root").unwrap();
    let order = Rc::new(RefCell::new(Vec::new()));
    for name in ["first", "second"] {
        let order = order.clone();
        map.observe(move |_| order.borrow_mut().push(name));
    }

    doc.transact(|| {
        map.set("x", 1)?;
        assert_eq!(*order.borrow(), vec!["first", "second"]);
        Ok(())
    })
    .unwrap();
}

#[test]
fn test_every_handle_shares_observers() {
    let doc = Doc::new();
    let root = doc.get_map("root").unwrap();
    let seen = record(&root);

    let other_handle = doc.get_map("root").unwrap();
    other_handle.set("y", 2).unwrap();

    assert_eq!(seen.borrow().len(), 1);
}

#[test]
fn test_unobserve_stops_delivery() {
    let doc = Doc::new();
    let map = doc.get_map("root").unwrap();
    let hits = Rc::new(RefCell::new(0));
    let counter = hits.clone();
    let id = map.observe(move |_| *counter.borrow_mut() += 1);

    map.set("a", 1).unwrap();
    assert!(map.unobserve(id));
    map.set("b", 2).unwrap();

    assert_eq!(*hits.borrow(), 1);
    assert!(!map.unobserve(id));
}

#[test]
fn test_observer_may_mutate_the_document() {
    let doc = Rc::new(Doc::new());
    let source = doc.get_map("source").unwrap();
    let mirror = doc.get_map("mirror").unwrap();

    let target = mirror.clone();
    let reader = source.clone();
    source.observe(move |change| {
        for key in change.changes.keys.keys() {
            match reader.get(key) {
                Some(entry) => target.set(key.clone(), entry).unwrap(),
                None => target.delete(key.clone()).unwrap(),
            }
        }
    });

    source.set("a", 1).unwrap();
    source.set("b", 2).unwrap();
    source.delete("a").unwrap();

    assert_eq!(mirror.to_json(), serde_json::json!({"b": 2}));
    assert_eq!(doc.clock(), 6);
}

#[test]
fn test_observer_sees_container_values() {
    let doc = Doc::new();
    let list = doc.get_array("list").unwrap();
    let seen = Rc::new(RefCell::new(None));
    let sink = seen.clone();
    list.observe(move |change| {
        if let Some(Member::Value(Entry::Map(map))) = change.added.first() {
            *sink.borrow_mut() = Some(map.clone());
        }
    });

    let zid = list.push([doc.create_map()]).unwrap();
    let observed = seen.borrow().clone().unwrap();
    assert_eq!(observed, list.get_map_by_id(zid).unwrap());
}
