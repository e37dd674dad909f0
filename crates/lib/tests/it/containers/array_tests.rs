use serde_json::json;
use zdoc::{Doc, Entry};

#[test]
fn test_iteration_in_push_order() {
    let doc = Doc::new();
    let list = doc.get_array("list").unwrap();
    for i in 0..4 {
        list.push([i]).unwrap();
    }

    let values: Vec<Entry> = list.iter().collect();
    assert_eq!(values, (0..4).map(Entry::from).collect::<Vec<_>>());
    assert_eq!(list.get(2), Some(Entry::from(2)));
    assert_eq!(list.get(4), None);
}

#[test]
fn test_zids_survive_deletion_of_neighbours() {
    let doc = Doc::new();
    let list = doc.get_array("list").unwrap();
    let first = list.push(["first"]).unwrap();
    let second = list.push(["second"]).unwrap();
    let third = list.push(["third"]).unwrap();

    list.delete(0, 1).unwrap();

    assert_eq!(list.zids(), vec![second, third]);
    assert_eq!(list.get_by_id(third), Some(Entry::from("third")));
    assert_eq!(list.get_by_id(first), None);
    assert!(list.get_map_by_id(first).unwrap_err().is_not_found());
}

#[test]
fn test_element_wrappers_follow_their_zid() {
    let doc = Doc::new();
    let list = doc.get_array("list").unwrap();
    list.push(["padding"]).unwrap();
    let zid = list.push([doc.create_map()]).unwrap();
    let element = list.get_map_by_id(zid).unwrap();
    element.set("k", "v").unwrap();

    list.delete(0, 1).unwrap();

    assert_eq!(list.get(0), Some(Entry::Map(element.clone())));
    assert_eq!(element.key_path().unwrap().to_string(), format!("/list/#{zid}"));
    assert_eq!(doc.to_json(), json!({"list": [{"k": "v"}]}));
}

#[test]
fn test_deleting_an_element_releases_it() {
    let doc = Doc::new();
    let list = doc.get_array("list").unwrap();
    let zid = list.push([doc.create_array()]).unwrap();
    let nested = list.get_array_by_id(zid).unwrap();
    nested.push([1]).unwrap();

    list.delete(0, 1).unwrap();

    assert!(!nested.is_live());
    assert!(nested.is_empty());
    assert!(nested.push([2]).unwrap_err().is_detached_error());
}

#[test]
fn test_iteration_skips_concurrently_deleted_elements() {
    let doc = Doc::new();
    let list = doc.get_array("list").unwrap();
    for v in ["a", "b", "c"] {
        list.push([v]).unwrap();
    }

    let mut seen = Vec::new();
    for entry in list.iter() {
        if seen.is_empty() {
            list.delete(1, 1).unwrap();
        }
        seen.push(entry);
    }
    assert_eq!(seen, vec![Entry::from("a"), Entry::from("c")]);
}
