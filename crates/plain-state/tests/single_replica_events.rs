mod common;

use common::Spy;
use plain_state::{ChangeOrigin, Document, SeqProxy};
use serde_json::{json, Value};

fn assert_one_event_for(value: Value) {
    let doc = Document::with_sid(100_001);
    let root = doc.root();
    let spy = Spy::default();
    root.on_change(spy.handler());

    root.set("k", value.clone()).expect("set must succeed");
    assert_eq!(root.get("k"), Some(value.clone()));
    assert_eq!(spy.calls(), 0, "handlers must not run inside the statement");

    doc.flush_events();
    assert_eq!(spy.calls(), 1, "event count for {value}");
}

fn assert_composite_events_for(value: Value) {
    let doc = Document::with_sid(100_001);
    let root = doc.root();
    let spy = Spy::default();
    root.on_change(spy.handler());

    root.set("k", value.clone()).expect("set must succeed");
    assert_eq!(root.get("k"), Some(value.clone()));
    doc.flush_events();
    assert!(
        (1..=2).contains(&spy.calls()),
        "event count {} for {value}",
        spy.calls()
    );
}

fn seq_with(items: Value) -> (Document, SeqProxy, Spy) {
    let doc = Document::with_sid(100_001);
    doc.root().set("xs", items).expect("set must succeed");
    doc.flush_events();
    let xs = doc.root().seq("xs").expect("xs is a sequence");
    let spy = Spy::default();
    xs.on_change(spy.handler());
    (doc, xs, spy)
}

#[test]
fn primitive_string_fires_once() {
    assert_one_event_for(json!("Ann"));
}

#[test]
fn primitive_number_fires_once() {
    assert_one_event_for(json!(42));
}

#[test]
fn primitive_bool_and_null_fire_once() {
    assert_one_event_for(json!(true));
    assert_one_event_for(Value::Null);
}

#[test]
fn empty_map_assignment() {
    assert_composite_events_for(json!({}));
}

#[test]
fn empty_sequence_assignment() {
    assert_composite_events_for(json!([]));
}

#[test]
fn map_assignment() {
    assert_composite_events_for(json!({"a": 1}));
}

#[test]
fn sequence_assignment() {
    assert_composite_events_for(json!([1, 2, 5, 42, 8]));
}

#[test]
fn deep_assignment() {
    assert_composite_events_for(json!({"a": {"b": {"c": [1, {"d": null}]}}}));
}

#[test]
fn overwrite_and_delete_fire_once_each() {
    let doc = Document::with_sid(100_001);
    let root = doc.root();
    root.set("k", 1).expect("set must succeed");
    doc.flush_events();

    let spy = Spy::default();
    root.on_change(spy.handler());
    root.set("k", "two").expect("overwrite must succeed");
    doc.flush_events();
    assert_eq!(spy.calls(), 1);

    assert!(root.delete("k").expect("delete must succeed"));
    assert_eq!(root.get("k"), None);
    doc.flush_events();
    assert_eq!(spy.calls(), 2);

    assert!(!root.delete("k").expect("delete must succeed"));
    doc.flush_events();
    assert_eq!(spy.calls(), 2, "deleting an absent key changes nothing");
}

#[test]
fn increment_fires_once() {
    let doc = Document::with_sid(100_001);
    let root = doc.root();
    root.set("count", 1).expect("set must succeed");
    doc.flush_events();

    let spy = Spy::default();
    root.on_change(spy.handler());
    assert_eq!(root.increment("count", 1).expect("increment"), json!(2));
    assert_eq!(root.get("count"), Some(json!(2)));
    doc.flush_events();
    assert_eq!(spy.calls(), 1);
}

#[test]
fn push_on_empty() {
    let (doc, xs, spy) = seq_with(json!([]));
    xs.push("apple").expect("push must succeed");
    assert_eq!(xs.value(), json!(["apple"]));
    doc.flush_events();
    assert_eq!(spy.calls(), 1);
}

#[test]
fn pop() {
    let (doc, xs, spy) = seq_with(json!([1, 2, 3]));
    assert_eq!(xs.pop().expect("pop must succeed"), Some(json!(3)));
    assert_eq!(xs.value(), json!([1, 2]));
    doc.flush_events();
    assert_eq!(spy.calls(), 1);
}

#[test]
fn pop_on_empty_is_silent() {
    let (doc, xs, spy) = seq_with(json!([]));
    assert_eq!(xs.pop().expect("pop must succeed"), None);
    assert_eq!(xs.shift().expect("shift must succeed"), None);
    doc.flush_events();
    assert_eq!(spy.calls(), 0);
}

#[test]
fn shift() {
    let (doc, xs, spy) = seq_with(json!([1, 2, 3]));
    assert_eq!(xs.shift().expect("shift must succeed"), Some(json!(1)));
    assert_eq!(xs.value(), json!([2, 3]));
    doc.flush_events();
    assert_eq!(spy.calls(), 1);
}

#[test]
fn unshift() {
    let (doc, xs, spy) = seq_with(json!([1, 2, 3]));
    xs.unshift(19).expect("unshift must succeed");
    assert_eq!(xs.value(), json!([19, 1, 2, 3]));
    doc.flush_events();
    assert_eq!(spy.calls(), 1);
}

#[test]
fn push_composite() {
    let (doc, xs, spy) = seq_with(json!([]));
    xs.push(json!({"a": [1]})).expect("push must succeed");
    assert_eq!(xs.value(), json!([{"a": [1]}]));
    doc.flush_events();
    assert!((1..=2).contains(&spy.calls()));
}

#[test]
fn events_are_local_and_carry_a_delivery_time_snapshot() {
    let doc = Document::with_sid(100_001);
    let root = doc.root();
    let seen = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
    let sink = seen.clone();
    root.on_change(move |e| sink.borrow_mut().push((e.origin, e.snapshot.clone())));

    root.set("a", 1).expect("set must succeed");
    root.set("b", 2).expect("set must succeed");
    assert_eq!(doc.pending_events(), 2);
    assert_eq!(doc.flush_events(), 2);

    let seen = seen.borrow();
    assert_eq!(seen.len(), 2);
    for (origin, snapshot) in seen.iter() {
        assert_eq!(*origin, ChangeOrigin::Local);
        assert_eq!(*snapshot, json!({"a": 1, "b": 2}));
    }
}

#[test]
fn handler_may_mutate_and_its_events_are_delivered_in_the_same_drain() {
    let doc = Document::with_sid(100_001);
    let root = doc.root();
    let mirror = root.clone();
    root.on_change(move |e| {
        if e.snapshot.get("echo").is_none() {
            mirror.set("echo", true).expect("nested set must succeed");
        }
    });

    root.set("a", 1).expect("set must succeed");
    assert_eq!(doc.flush_events(), 2);
    assert_eq!(doc.view(), json!({"a": 1, "echo": true}));
    assert_eq!(doc.pending_events(), 0);
}
