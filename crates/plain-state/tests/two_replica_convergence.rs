mod common;

use common::{create_replicas, flush_all, Spy};
use plain_state::{ChangeOrigin, Document};
use serde_json::json;

#[test]
fn nested_map_reaches_the_other_replica() {
    let (hub, docs) = create_replicas(2);
    docs[0]
        .root()
        .set("child", json!({"a": 1}))
        .expect("set must succeed");
    flush_all(&hub, &docs);
    assert_eq!(docs[1].root().get("child"), Some(json!({"a": 1})));
}

#[test]
fn increment_after_flush_is_seen_remotely() {
    let (hub, docs) = create_replicas(2);
    let a = docs[0].root();
    a.set("child", json!({"x": 4})).expect("set must succeed");
    flush_all(&hub, &docs);

    a.map("child")
        .and_then(|child| child.increment("x", 1))
        .expect("increment must succeed");
    flush_all(&hub, &docs);

    let b_child = docs[1].root().map("child").expect("child is a map");
    assert_eq!(b_child.get("x"), Some(json!(5)));
}

#[test]
fn remote_changes_fire_remote_events() {
    let (hub, docs) = create_replicas(2);
    let spy = Spy::default();
    docs[1].root().on_change(spy.handler());
    let origins = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
    let sink = origins.clone();
    docs[1]
        .root()
        .on_change(move |e| sink.borrow_mut().push(e.origin));

    docs[0].root().set("k", 1).expect("set must succeed");
    assert_eq!(spy.calls(), 0);
    flush_all(&hub, &docs);
    assert_eq!(spy.calls(), 1);
    assert_eq!(*origins.borrow(), vec![ChangeOrigin::Remote]);
}

#[test]
fn concurrent_writes_to_one_key_converge() {
    let (hub, docs) = create_replicas(2);
    docs[0].root().set("k", "from a").expect("set must succeed");
    docs[1].root().set("k", "from b").expect("set must succeed");
    flush_all(&hub, &docs);
    assert_eq!(docs[0].view(), docs[1].view());
    let winner = docs[0].root().get("k");
    assert!(winner == Some(json!("from a")) || winner == Some(json!("from b")));
}

#[test]
fn concurrent_sequence_inserts_keep_both_elements() {
    let (hub, docs) = create_replicas(2);
    docs[0].root().set("xs", json!([0])).expect("set must succeed");
    flush_all(&hub, &docs);

    let a = docs[0].root().seq("xs").expect("xs is a sequence");
    let b = docs[1].root().seq("xs").expect("xs is a sequence");
    a.push("a1").expect("push must succeed");
    a.push("a2").expect("push must succeed");
    b.push("b1").expect("push must succeed");
    b.unshift("b0").expect("unshift must succeed");
    flush_all(&hub, &docs);

    assert_eq!(docs[0].view(), docs[1].view());
    assert_eq!(a.len(), 5);
    let view = a.value();
    let items = view.as_array().expect("array");
    assert_eq!(items[0], json!("b0"));
    assert_eq!(items[1], json!(0));
    let a1 = items.iter().position(|v| v == "a1");
    let a2 = items.iter().position(|v| v == "a2");
    assert!(a1 < a2, "a replica's own pushes keep their order");
}

#[test]
fn concurrent_delete_and_update_converge() {
    let (hub, docs) = create_replicas(2);
    docs[0]
        .root()
        .set("xs", json!([1, 2, 3]))
        .expect("set must succeed");
    flush_all(&hub, &docs);

    let a = docs[0].root().seq("xs").expect("xs is a sequence");
    let b = docs[1].root().seq("xs").expect("xs is a sequence");
    a.remove(1).expect("remove must succeed");
    b.set(1, 20).expect("set must succeed");
    flush_all(&hub, &docs);

    assert_eq!(docs[0].view(), docs[1].view());
    assert_eq!(a.value(), json!([1, 3]));
}

#[test]
fn concurrent_increments_are_last_writer_wins() {
    let (hub, docs) = create_replicas(2);
    docs[0].root().set("n", 0).expect("set must succeed");
    flush_all(&hub, &docs);

    docs[0].root().increment("n", 1).expect("increment must succeed");
    docs[1].root().increment("n", 1).expect("increment must succeed");
    flush_all(&hub, &docs);

    assert_eq!(docs[0].view(), docs[1].view());
    assert_eq!(docs[0].root().get("n"), Some(json!(1)));
}

#[test]
fn three_replicas_converge_on_mixed_edits() {
    let (hub, docs) = create_replicas(3);
    docs[0]
        .root()
        .set("doc", json!({"title": "a", "tags": []}))
        .expect("set must succeed");
    flush_all(&hub, &docs);

    let tags = |i: usize| {
        docs[i]
            .root()
            .map("doc")
            .and_then(|d| d.seq("tags"))
            .expect("tags is a sequence")
    };
    tags(0).push("x").expect("push must succeed");
    tags(1).push("y").expect("push must succeed");
    docs[2]
        .root()
        .map("doc")
        .and_then(|d| d.set("title", "c"))
        .expect("set must succeed");
    docs[1].root().delete("missing").expect("delete must succeed");
    flush_all(&hub, &docs);

    let view = docs[0].view();
    assert_eq!(docs[1].view(), view);
    assert_eq!(docs[2].view(), view);
    assert_eq!(view["doc"]["title"], json!("c"));
    assert_eq!(view["doc"]["tags"].as_array().map(Vec::len), Some(2));
}

#[test]
fn late_joiner_catches_up_from_history() {
    let (hub, docs) = create_replicas(1);
    docs[0].root().set("k", json!([1, 2])).expect("set must succeed");
    docs[0].root().set("m", json!({"z": 0})).expect("set must succeed");
    hub.flush();

    let late = Document::with_sid(200_001);
    late.connect(&hub);
    hub.flush();
    assert_eq!(late.view(), docs[0].view());
}

#[test]
fn offline_edits_are_replayed_on_reconnect() {
    let (hub, docs) = create_replicas(2);
    docs[1].disconnect();
    assert!(!docs[1].is_connected());
    docs[1].root().set("offline", true).expect("set must succeed");
    docs[0].root().set("online", true).expect("set must succeed");
    flush_all(&hub, &docs);
    assert_eq!(docs[0].root().get("offline"), None);

    docs[1].connect(&hub);
    flush_all(&hub, &docs);
    assert_eq!(docs[0].view(), json!({"online": true, "offline": true}));
    assert_eq!(docs[0].view(), docs[1].view());
}
