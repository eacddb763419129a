//! Tests for registry object lifecycle and connection departure.

use std::sync::{Arc, Mutex};

use serde_json::json;
use sharedstate::{
    Registry, Result,
    config::{EchoPolicy, RegistryConfig},
    protocol::{Request, Response},
    registry::{ObjectEvent, RegistryHook},
    transport::{Connection, ConnectionId},
};

use crate::helpers::RecordingConnection;

#[derive(Default)]
struct LifecycleLog {
    events: Mutex<Vec<String>>,
}

impl RegistryHook for LifecycleLog {
    fn on_object_created(&self, event: &ObjectEvent) -> Result<()> {
        self.events
            .lock()
            .unwrap()
            .push(format!("created {}", event.name));
        Ok(())
    }

    fn on_object_collected(&self, event: &ObjectEvent) -> Result<()> {
        self.events
            .lock()
            .unwrap()
            .push(format!("collected {}", event.name));
        Ok(())
    }
}

#[test]
fn test_two_connections_share_one_object() {
    let registry = Registry::default();
    let a = registry.on_connection_arrive(RecordingConnection::new());
    let b = registry.on_connection_arrive(RecordingConnection::new());

    let response = a.handle(&Request::connect("/foo", true));
    assert_eq!(response, Response::data(json!({}), 0));
    let first = registry.get("/foo").unwrap();

    let response = b.handle(&Request::connect("/foo", true));
    assert_eq!(response, Response::data(json!({}), 0));
    let second = registry.get("/foo").unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.subscriber_count(), 2);

    let report = a.depart();
    assert_eq!(report.unsubscribed, vec!["/foo"]);
    assert!(report.collected.is_empty());
    assert_eq!(first.subscriber_count(), 1);
    assert_eq!(registry.object_names(), vec!["/foo"]);

    let report = b.depart();
    assert_eq!(report.collected, vec!["/foo"]);
    assert!(registry.get("/foo").unwrap_err().is_not_found());
    assert!(first.is_collected());
}

#[test]
fn test_departure_visits_every_object() {
    let registry = Registry::default();
    let leaving = registry.on_connection_arrive(RecordingConnection::new());
    let staying = registry.on_connection_arrive(RecordingConnection::new());
    let leaving_id = leaving.connection_id().clone();

    for name in ["/a", "/b", "/c"] {
        registry.connect_to_object(&leaving_id, name, true).unwrap();
    }
    registry
        .connect_to_object(staying.connection_id(), "/b", true)
        .unwrap();

    let report = leaving.depart();
    assert_eq!(report.unsubscribed, vec!["/a", "/b", "/c"]);
    assert_eq!(report.collected, vec!["/a", "/c"]);
    assert_eq!(registry.object_names(), vec!["/b"]);

    for state in registry.status() {
        assert!(!registry.get(&state.name).unwrap().is_subscribed(&leaving_id));
    }
    assert!(!registry.is_connected(&leaving_id));
    assert_eq!(registry.connection_count(), 1);
}

#[test]
fn test_departed_connection_stops_receiving() {
    let registry = Registry::default();
    let watcher = RecordingConnection::new();
    let writer = RecordingConnection::new();
    let watcher_scope = registry.on_connection_arrive(watcher.clone());
    let writer_scope = registry.on_connection_arrive(writer.clone());

    watcher_scope.handle(&Request::connect("/foo", true));
    writer_scope.handle(&Request::connect("/foo", true));
    writer_scope.handle(&Request::write("/foo", "n", json!(1)));
    assert_eq!(watcher.received_count(), 1);

    watcher_scope.depart();
    writer_scope.handle(&Request::write("/foo", "n", json!(2)));
    assert_eq!(watcher.received_count(), 1);
    assert_eq!(writer.received_count(), 2);
}

#[test]
fn test_connect_missing_object_without_create() {
    let registry = Registry::default();
    let scope = registry.on_connection_arrive(RecordingConnection::new());

    let response = scope.handle(&Request::connect("bar", false));
    let err = response.into_result().unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.to_string(), "No such object: 'bar'");
    assert_eq!(registry.object_count(), 0);
}

#[test]
fn test_write_requires_live_connection() {
    let registry = Registry::default();
    registry.get_or_create("/foo");
    let err = registry
        .write(&ConnectionId::new(), "/foo", "a", json!(1))
        .unwrap_err();
    assert!(err.to_string().contains("Unknown connection"));
    assert_eq!(registry.get("/foo").unwrap().read_root().unwrap(), json!({}));
}

#[test]
fn test_write_tags_origin() {
    let registry = Registry::default();
    let conn = RecordingConnection::new();
    let scope = registry.on_connection_arrive(conn.clone());
    scope.handle(&Request::connect("/foo", true));

    let root = registry
        .write(scope.connection_id(), "/foo", "a", json!(1))
        .unwrap();
    assert_eq!(root, json!({ "a": 1 }));
    assert_eq!(conn.received()[0].origin.as_ref(), Some(conn.id()));
}

#[test]
fn test_failed_write_reports_error_to_writer_only() {
    let registry = Registry::default();
    let watcher = RecordingConnection::new();
    let watcher_scope = registry.on_connection_arrive(watcher.clone());
    let writer_scope = registry.on_connection_arrive(RecordingConnection::new());
    watcher_scope.handle(&Request::connect("/foo", true));
    writer_scope.handle(&Request::write("/foo", "person.age", json!(40)));

    let response = writer_scope.handle(&Request::write("/foo", "person.age.fake", json!("30")));
    let err = response.into_result().unwrap_err();
    assert!(err.is_invalid_path());
    assert_eq!(err.to_string(), "Invalid property: 'person.age.fake'");
    assert_eq!(watcher.received_count(), 1);
}

#[test]
fn test_exclude_origin_config() {
    let registry = Registry::new(RegistryConfig::default().with_echo(EchoPolicy::ExcludeOrigin));
    let writer = RecordingConnection::new();
    let reader = RecordingConnection::new();
    let writer_scope = registry.on_connection_arrive(writer.clone());
    let reader_scope = registry.on_connection_arrive(reader.clone());
    writer_scope.handle(&Request::connect("/foo", true));
    reader_scope.handle(&Request::connect("/foo", true));

    let response = writer_scope.handle(&Request::write("/foo", "a", json!(1)));
    assert_eq!(response, Response::data(json!({ "a": 1 }), 1));
    assert_eq!(writer.received_count(), 0);
    assert_eq!(reader.received_count(), 1);
}

#[test]
fn test_hooks_observe_lifecycle() {
    let registry = Registry::default();
    let log = Arc::new(LifecycleLog::default());
    registry.add_hook(log.clone());

    let scope = registry.on_connection_arrive(RecordingConnection::new());
    scope.handle(&Request::connect("/foo", true));
    scope.handle(&Request::connect("/foo", true));
    scope.depart();

    assert_eq!(
        *log.events.lock().unwrap(),
        vec!["created /foo", "collected /foo"]
    );
}

#[test]
fn test_unsubscribed_objects_are_collected() {
    let registry = Registry::default();
    let created = registry.get_or_create("/orphan");
    assert!(Arc::ptr_eq(&created, &registry.get_or_create("/orphan")));

    let scope = registry.on_connection_arrive(RecordingConnection::new());
    scope.handle(&Request::connect("/kept", true));

    assert_eq!(registry.collect_idle(), vec!["/orphan"]);
    assert_eq!(registry.object_names(), vec!["/kept"]);
    assert!(created.write_path("a", json!(1), None).unwrap_err().is_collected());
}

#[test]
fn test_collected_name_is_recreated_fresh() {
    let registry = Registry::default();
    let scope = registry.on_connection_arrive(RecordingConnection::new());
    scope.handle(&Request::connect("/foo", true));
    scope.handle(&Request::write("/foo", "a", json!(1)));
    let old = registry.get("/foo").unwrap();
    scope.depart();

    let scope = registry.on_connection_arrive(RecordingConnection::new());
    let response = scope.handle(&Request::connect("/foo", true));
    assert_eq!(response, Response::data(json!({}), 0));
    assert!(!Arc::ptr_eq(&old, &registry.get("/foo").unwrap()));
}

#[test]
fn test_connections_tracked_in_arrival_order() {
    let registry = Registry::default();
    let conns: Vec<Arc<dyn Connection>> = (0..3)
        .map(|_| RecordingConnection::new() as Arc<dyn Connection>)
        .collect();
    let scopes: Vec<_> = conns
        .iter()
        .map(|c| registry.on_connection_arrive(c.clone()))
        .collect();

    let expected: Vec<_> = conns.iter().map(|c| c.id().clone()).collect();
    assert_eq!(registry.connection_ids(), expected);

    drop(scopes);
    assert_eq!(registry.connection_count(), 0);
}

#[test]
fn test_status_reports_subscribers() {
    let registry = Registry::default();
    let a = registry.on_connection_arrive(RecordingConnection::new());
    let b = registry.on_connection_arrive(RecordingConnection::new());
    a.handle(&Request::connect("/x", true));
    b.handle(&Request::connect("/x", true));
    b.handle(&Request::connect("/y", true));

    let status = registry.status();
    assert_eq!(status.len(), 2);
    assert_eq!((status[0].name.as_str(), status[0].subscribers), ("/x", 2));
    assert_eq!((status[1].name.as_str(), status[1].subscribers), ("/y", 1));
}

#[test]
fn test_concurrent_departures_leave_nothing_behind() {
    let registry = Registry::default();
    let scopes: Vec<_> = (0..16)
        .map(|_| registry.on_connection_arrive(RecordingConnection::new()))
        .collect();

    let handles: Vec<_> = scopes
        .into_iter()
        .enumerate()
        .map(|(i, scope)| {
            std::thread::spawn(move || {
                for n in 0..4 {
                    let name = format!("/obj{}", (i + n) % 5);
                    scope.handle(&Request::connect(name.clone(), true));
                    scope.handle(&Request::write(name, "n", json!(i)));
                }
                scope.depart();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(registry.connection_count(), 0);
    assert_eq!(registry.object_count(), 0);
}
