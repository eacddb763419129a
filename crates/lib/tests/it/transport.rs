//! End-to-end tests for the memory and TCP transports.

use std::{sync::Arc, time::Duration};

use serde_json::json;
use sharedstate::{
    Mirror, Registry,
    constants::MAX_FRAME_BYTES,
    path::Path,
    protocol::Request,
    transport::{
        ClientTransport,
        memory::MemoryTransport,
        tcp::{TcpClient, TcpServer},
    },
};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::TcpStream,
};

use crate::helpers::wait_until;

async fn start_server(registry: &Registry) -> (TcpServer, String) {
    let mut server = TcpServer::new(registry.clone());
    server.start("127.0.0.1:0").await.unwrap();
    let address = server.address().unwrap();
    (server, address)
}

#[tokio::test]
async fn test_memory_updates_reach_other_clients() {
    let registry = Registry::default();
    let writer = MemoryTransport::connect(&registry);
    let watcher = MemoryTransport::connect(&registry);
    let mut updates = watcher.subscribe_updates();

    writer.connect_object("/foo", true).await.unwrap();
    watcher.connect_object("/foo", true).await.unwrap();
    writer
        .write_object("/foo", Path::new("a"), json!(1))
        .await
        .unwrap();

    let update = updates.recv().await.unwrap();
    assert_eq!(update.name, "/foo");
    assert_eq!(update.data, json!({ "a": 1 }));
    assert_eq!(update.origin.as_ref(), Some(writer.connection_id()));
}

#[tokio::test]
async fn test_memory_requests_answered_in_order() {
    let registry = Registry::default();
    let client = Arc::new(MemoryTransport::connect(&registry));
    client.connect_object("/foo", true).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..20 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            client
                .request(Request::write("/foo", format!("k{i}"), json!(i)))
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap().into_result().unwrap();
    }
    let root = registry.get("/foo").unwrap().read_root().unwrap();
    assert_eq!(root.as_object().unwrap().len(), 20);
}

#[tokio::test]
async fn test_memory_drop_departs() {
    let registry = Registry::default();
    let client = MemoryTransport::connect(&registry);
    client.connect_object("/foo", true).await.unwrap();
    assert_eq!(registry.object_count(), 1);

    drop(client);
    wait_until(|| registry.connection_count() == 0).await;
    assert_eq!(registry.object_count(), 0);
}

#[tokio::test]
async fn test_tcp_scenario() {
    let registry = Registry::default();
    let (_server, address) = start_server(&registry).await;

    let a = TcpClient::connect(&address).await.unwrap();
    let b = TcpClient::connect(&address).await.unwrap();
    assert_eq!(a.transport_type(), "tcp");

    assert_eq!(a.connect_object("/foo", true).await.unwrap(), json!({}));
    assert_eq!(b.connect_object("/foo", true).await.unwrap(), json!({}));
    let object = registry.get("/foo").unwrap();
    assert_eq!(object.subscriber_count(), 2);

    a.disconnect();
    wait_until(|| object.subscriber_count() == 1).await;
    assert_eq!(registry.object_names(), vec!["/foo"]);

    b.disconnect();
    wait_until(|| registry.object_count() == 0).await;
    assert!(object.is_collected());
}

#[tokio::test]
async fn test_tcp_mirrors_converge() {
    let registry = Registry::default();
    let (_server, address) = start_server(&registry).await;

    let a = Mirror::new("/foo");
    let b = Mirror::new("/foo");
    a.connect(Arc::new(TcpClient::connect(&address).await.unwrap()))
        .await
        .unwrap();
    b.connect(Arc::new(TcpClient::connect(&address).await.unwrap()))
        .await
        .unwrap();

    let acked = a.set("foo.bar.baz", json!("w00t!")).await.unwrap();
    wait_until(|| b.data() == acked).await;

    let err = b.set("foo.bar.baz.qux", json!(1)).await.unwrap_err();
    assert!(err.is_invalid_path());
    assert_eq!(err.to_string(), "Invalid property: 'foo.bar.baz.qux'");
    assert_eq!(b.data(), acked);
    assert_eq!(a.data(), acked);
}

#[tokio::test]
async fn test_tcp_missing_object_error() {
    let registry = Registry::default();
    let (_server, address) = start_server(&registry).await;
    let client = TcpClient::connect(&address).await.unwrap();

    let err = client.connect_object("bar", false).await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.to_string(), "No such object: 'bar'");
}

#[tokio::test]
async fn test_tcp_abrupt_disconnect_departs() {
    let registry = Registry::default();
    let (_server, address) = start_server(&registry).await;

    let mut stream = TcpStream::connect(&address).await.unwrap();
    stream
        .write_all(b"{\"id\":1,\"request\":{\"connect\":{\"name\":\"/foo\",\"create_if_missing\":true}}}\n")
        .await
        .unwrap();
    let (read_half, write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();
    let line = lines.next_line().await.unwrap().unwrap();
    let frame: serde_json::Value = serde_json::from_str(&line).unwrap();
    assert_eq!(frame, json!({ "type": "response", "id": 1, "response": { "data": {} } }));
    assert_eq!(registry.object_count(), 1);

    drop(lines);
    drop(write_half);
    wait_until(|| registry.connection_count() == 0).await;
    assert_eq!(registry.object_count(), 0);
}

#[tokio::test]
async fn test_tcp_malformed_frame_is_skipped() {
    let registry = Registry::default();
    let (_server, address) = start_server(&registry).await;

    let mut stream = TcpStream::connect(&address).await.unwrap();
    stream.write_all(b"this is not json\n").await.unwrap();
    stream
        .write_all(b"{\"id\":2,\"request\":{\"connect\":{\"name\":\"/foo\",\"create_if_missing\":true}}}\n")
        .await
        .unwrap();

    let mut lines = BufReader::new(stream).lines();
    let line = tokio::time::timeout(Duration::from_secs(2), lines.next_line())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(line.contains("\"id\":2"));
}

#[tokio::test]
async fn test_tcp_oversize_frame_closes_connection() {
    let registry = Registry::default();
    let (_server, address) = start_server(&registry).await;

    let stream = TcpStream::connect(&address).await.unwrap();
    let (read_half, mut write_half) = stream.into_split();
    write_half
        .write_all(b"{\"id\":1,\"request\":{\"connect\":{\"name\":\"/foo\",\"create_if_missing\":true}}}\n")
        .await
        .unwrap();
    let mut lines = BufReader::new(read_half).lines();
    let line = tokio::time::timeout(Duration::from_secs(2), lines.next_line())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(line.contains("\"id\":1"));
    assert_eq!(registry.connection_count(), 1);

    // No newline: the server must give up without waiting for the end of the line.
    let oversize = vec![b'x'; MAX_FRAME_BYTES + 1];
    let _ = write_half.write_all(&oversize).await;

    wait_until(|| registry.connection_count() == 0).await;
    assert_eq!(registry.object_count(), 0);

    let closed = tokio::time::timeout(Duration::from_secs(2), lines.next_line())
        .await
        .unwrap();
    assert!(!matches!(closed, Ok(Some(_))));
}

#[tokio::test]
async fn test_tcp_stopped_server_refuses() {
    let registry = Registry::default();
    let (mut server, address) = start_server(&registry).await;
    server.stop().unwrap();

    // The accept loop exits asynchronously; poll until connecting fails.
    let mut refused = false;
    for _ in 0..100 {
        if TcpClient::connect(&address).await.is_err() {
            refused = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(refused);
}
