//! Tests for SharedState writes, subscriptions and broadcast.

use std::sync::Arc;

use serde_json::json;
use sharedstate::{
    SharedState,
    config::EchoPolicy,
    path::PathBuf,
    state::{BroadcastReport, Lifecycle},
    transport::Connection,
};

use crate::helpers::{FailingConnection, RecordingConnection};

#[test]
fn test_read_root_and_path() {
    let state = SharedState::new("/foo");
    state.write_path("person.name", json!("Ada"), None).unwrap();

    assert_eq!(state.read_root().unwrap(), json!({ "person": { "name": "Ada" } }));
    assert_eq!(state.read_path("person.name").unwrap(), json!("Ada"));
    assert!(state.read_path("person.age").unwrap_err().is_not_found());
}

#[test]
fn test_write_returns_post_write_root() {
    let state = SharedState::new("/foo");
    state.write_path("a", json!(1), None).unwrap();
    let root = state.write_path("b.c", json!(2), None).unwrap();
    assert_eq!(root, json!({ "a": 1, "b": { "c": 2 } }));
}

#[test]
fn test_replace_root() {
    let state = SharedState::new("/foo");
    state.write_path("a", json!(1), None).unwrap();
    let root = state.replace_root(json!({ "fresh": true }), None).unwrap();
    assert_eq!(root, json!({ "fresh": true }));
    assert_eq!(state.read_root().unwrap(), json!({ "fresh": true }));
}

#[test]
fn test_failed_write_changes_nothing_and_notifies_nobody() {
    let state = SharedState::new("/foo");
    let conn = RecordingConnection::new();
    state.subscribe(conn.clone()).unwrap();
    state.write_path("person.age", json!(40), None).unwrap();
    let before = state.read_root().unwrap();

    let err = state
        .write_path("person.age.fake", json!("30"), None)
        .unwrap_err();
    assert!(err.is_invalid_path());
    assert_eq!(err.to_string(), "Invalid property: 'person.age.fake'");
    assert_eq!(state.read_root().unwrap(), before);
    assert_eq!(state.read_path("person.age").unwrap(), json!(40));
    assert_eq!(conn.received_count(), 1);
}

#[test]
fn test_subscribe_is_idempotent() {
    let state = SharedState::new("/foo");
    let conn = RecordingConnection::new();
    state
        .subscribe(conn.clone())
        .unwrap()
        .subscribe(conn.clone())
        .unwrap();
    assert_eq!(state.subscriber_count(), 1);

    state.write_path("a", json!(1), None).unwrap();
    assert_eq!(conn.received_count(), 1);
}

#[test]
fn test_unsubscribe() {
    let state = SharedState::new("/foo");
    let conn = RecordingConnection::new();
    state.subscribe(conn.clone()).unwrap();

    assert!(state.unsubscribe(conn.id()));
    assert!(!state.unsubscribe(conn.id()));
    assert!(!state.is_subscribed(conn.id()));

    state.write_path("a", json!(1), None).unwrap();
    assert_eq!(conn.received_count(), 0);
}

#[test]
fn test_broadcast_reaches_every_subscriber_in_order() {
    let state = SharedState::new("/foo");
    let conns: Vec<_> = (0..3).map(|_| RecordingConnection::new()).collect();
    for conn in &conns {
        state.subscribe(conn.clone()).unwrap();
    }
    let expected: Vec<_> = conns.iter().map(|c| c.id().clone()).collect();
    assert_eq!(state.subscriber_ids(), expected);

    state.write_path("foo.bar", json!("baz"), None).unwrap();

    for conn in &conns {
        let received = conn.received();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].name, "/foo");
        assert_eq!(received[0].changed_path, Some(PathBuf::from("foo.bar")));
        assert_eq!(received[0].data, json!({ "foo": { "bar": "baz" } }));
    }
}

#[test]
fn test_root_replacement_has_no_changed_path() {
    let state = SharedState::new("/foo");
    let conn = RecordingConnection::new();
    state.subscribe(conn.clone()).unwrap();
    state.replace_root(json!([1, 2]), None).unwrap();
    assert_eq!(conn.received()[0].changed_path, None);
    assert_eq!(conn.received()[0].data, json!([1, 2]));
}

#[test]
fn test_delivery_failure_is_isolated() {
    let state = SharedState::new("/foo");
    let before = RecordingConnection::new();
    let failing = FailingConnection::new();
    let after = RecordingConnection::new();
    state.subscribe(before.clone()).unwrap();
    state.subscribe(failing.clone()).unwrap();
    state.subscribe(after.clone()).unwrap();

    let root = state.write_path("a", json!(1), None).unwrap();
    assert_eq!(root, json!({ "a": 1 }));
    assert_eq!(before.received_count(), 1);
    assert_eq!(after.received_count(), 1);

    let report = state.broadcast("a", None).unwrap();
    assert_eq!(
        report,
        BroadcastReport {
            delivered: 2,
            skipped: 0,
            failed: vec![failing.id().clone()],
        }
    );
}

#[test]
fn test_exclude_origin_skips_writer() {
    let state = SharedState::with_echo("/foo", EchoPolicy::ExcludeOrigin);
    let writer = RecordingConnection::new();
    let reader = RecordingConnection::new();
    state.subscribe(writer.clone()).unwrap();
    state.subscribe(reader.clone()).unwrap();

    state.write_path("a", json!(1), Some(writer.id())).unwrap();
    assert_eq!(writer.received_count(), 0);
    assert_eq!(reader.received_count(), 1);
    assert_eq!(reader.received()[0].origin.as_ref(), Some(writer.id()));

    let report = state.broadcast("a", Some(writer.id())).unwrap();
    assert_eq!(report.delivered, 1);
    assert_eq!(report.skipped, 1);
}

#[test]
fn test_include_origin_echoes_writer() {
    let state = SharedState::new("/foo");
    let writer = RecordingConnection::new();
    state.subscribe(writer.clone()).unwrap();
    state.write_path("a", json!(1), Some(writer.id())).unwrap();
    assert_eq!(writer.received_count(), 1);
}

#[test]
fn test_lifecycle() {
    let state = SharedState::new("/foo");
    assert_eq!(state.lifecycle(), Lifecycle::Created);
    let conn: Arc<dyn Connection> = RecordingConnection::new();
    state.subscribe(conn.clone()).unwrap();
    assert_eq!(state.lifecycle(), Lifecycle::Active);
    state.unsubscribe(conn.id());
    assert_eq!(state.lifecycle(), Lifecycle::Created);
}

#[test]
fn test_concurrent_writers_see_consistent_broadcasts() {
    let state = Arc::new(SharedState::new("/foo"));
    let conn = RecordingConnection::new();
    state.subscribe(conn.clone()).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let state = state.clone();
            std::thread::spawn(move || {
                for j in 0..25 {
                    state
                        .write_path(format!("w{i}.n{j}"), json!(j), None)
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let received = conn.received();
    assert_eq!(received.len(), 200);
    assert_eq!(received.last().unwrap().data, state.read_root().unwrap());
}
