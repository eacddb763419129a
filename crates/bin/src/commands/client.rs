//! Client commands - read, write and follow objects on a running server.

use std::{sync::Arc, time::Duration};

use serde_json::Value;
use sharedstate::{
    Mirror, constants::CHANGE_EVENT, mirror::ChangeEvent, transport::tcp::TcpClient,
};
use tokio::sync::mpsc;

use crate::cli::{GetArgs, ServerArgs, SetArgs, WatchArgs};
use crate::output::{OutputFormat, print_value};

/// Connect `mirror` over TCP, returning the client and the initial snapshot.
async fn connect(
    mirror: &Mirror,
    server: &ServerArgs,
    create_if_missing: bool,
) -> Result<(Arc<TcpClient>, Value), Box<dyn std::error::Error>> {
    let client = Arc::new(TcpClient::connect(&server.address()).await?);
    let snapshot = mirror.connect_with(client.clone(), create_if_missing).await?;
    Ok((client, snapshot))
}

/// Forward every change `mirror` applies into a channel.
///
/// Call before connecting: changes applied between the initial snapshot and the
/// first poll of the receiver are still delivered.
fn follow(mirror: &Mirror) -> mpsc::UnboundedReceiver<ChangeEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    mirror.on(CHANGE_EVENT, move |event| {
        let _ = tx.send(event.clone());
    });
    rx
}

/// Parse a command-line value as JSON, keeping it as a string when it is not.
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Run the get command
pub async fn get(args: &GetArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mirror = Mirror::new(&args.name);
    let (client, _) = connect(&mirror, &args.server, false).await?;

    let value = match &args.path {
        Some(path) => mirror.get(path.as_str())?,
        None => mirror.data(),
    };
    print_value(&value, OutputFormat::Human)?;

    mirror.disconnect();
    client.disconnect();
    Ok(())
}

/// Run the set command
pub async fn set(args: &SetArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mirror = Mirror::new(&args.name);
    let (client, _) = connect(&mirror, &args.server, true).await?;

    let data = mirror
        .set(args.path.as_str(), parse_value(&args.value))
        .await?;
    print_value(&data, OutputFormat::Human)?;

    mirror.disconnect();
    client.disconnect();
    Ok(())
}

/// Run the watch command
///
/// Prints the snapshot, then one compact JSON line per change until Ctrl+C or
/// until the server closes the connection.
pub async fn watch(args: &WatchArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mirror = Mirror::new(&args.name);
    let mut rx = follow(&mirror);

    let (client, snapshot) = connect(&mirror, &args.server, args.create).await?;
    print_value(&snapshot, OutputFormat::Human)?;

    let mut liveness = tokio::time::interval(Duration::from_millis(500));
    loop {
        tokio::select! {
            Some(event) = rx.recv() => {
                let path = event
                    .changed_path
                    .as_ref()
                    .map_or_else(|| "<root>".to_string(), |p| p.to_string());
                println!("{path}: {}", serde_json::to_string(&event.data)?);
            }
            _ = liveness.tick() => {
                if !mirror.is_connected() {
                    eprintln!("Connection to {} closed", client.address());
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received SIGINT, stopping watch");
                break;
            }
        }
    }

    mirror.disconnect();
    client.disconnect();
    Ok(())
}
