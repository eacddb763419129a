//! Shared utilities for transport implementations.
//!
//! This module provides the pieces every transport needs: server lifecycle state,
//! frame encoding, a channel-backed [`Connection`], and request/response
//! correlation for clients.

use std::{
    collections::HashMap,
    sync::{
        Mutex,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, warn};

use super::{Connection, ConnectionId, TransportError};
use crate::{
    Result,
    constants::MAX_FRAME_BYTES,
    protocol::{ClientFrame, Request, Response, ServerFrame, UpdateNotification},
};

/// Number of updates buffered per client before slow receivers start lagging.
pub const UPDATE_BUFFER: usize = 256;

/// Manages server state common to all transport implementations.
/// Servers are owned exclusively and all lifecycle operations take `&mut self`,
/// so no internal locking is needed.
pub struct ServerState {
    /// Whether the server is running.
    running: bool,
    /// Shutdown signal for the accept loop.
    shutdown: Option<oneshot::Sender<()>>,
    /// The server's bound address.
    address: Option<String>,
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerState {
    /// Create a new server state manager.
    pub fn new() -> Self {
        Self {
            running: false,
            shutdown: None,
            address: None,
        }
    }

    /// Check if the server is currently running.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Get the server address if available.
    pub fn get_address(&self) -> std::result::Result<String, TransportError> {
        self.address.clone().ok_or(TransportError::ServerNotRunning)
    }

    /// Mark the server as running on `address`, keeping its shutdown sender.
    pub fn server_started(&mut self, address: String, shutdown_sender: oneshot::Sender<()>) {
        self.running = true;
        self.address = Some(address);
        self.shutdown = Some(shutdown_sender);
    }

    /// Trigger shutdown and clear state.
    pub fn stop_server(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.running = false;
        self.address = None;
    }
}

/// JSON encoding of protocol frames, one frame per line.
pub struct FrameCodec;

impl FrameCodec {
    /// Encode a frame as a single newline-terminated JSON line.
    pub fn encode_line<T: Serialize>(frame: &T) -> std::result::Result<Vec<u8>, TransportError> {
        let mut bytes = serde_json::to_vec(frame)
            .map_err(|e| TransportError::InvalidFrame(format!("Failed to encode frame: {e}")))?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    /// Decode a client frame from one line.
    pub fn decode_client(line: &str) -> std::result::Result<ClientFrame, TransportError> {
        Self::check_size(line)?;
        serde_json::from_str(line)
            .map_err(|e| TransportError::InvalidFrame(format!("Failed to decode request: {e}")))
    }

    /// Decode a server frame from one line.
    pub fn decode_server(line: &str) -> std::result::Result<ServerFrame, TransportError> {
        Self::check_size(line)?;
        serde_json::from_str(line)
            .map_err(|e| TransportError::InvalidFrame(format!("Failed to decode response: {e}")))
    }

    fn check_size(line: &str) -> std::result::Result<(), TransportError> {
        if line.len() > MAX_FRAME_BYTES {
            return Err(TransportError::FrameTooLarge {
                size: line.len(),
                limit: MAX_FRAME_BYTES,
            });
        }
        Ok(())
    }
}

/// A [`Connection`] that queues outgoing frames on an unbounded channel.
///
/// The channel is drained by a per-connection writer, so queueing never blocks the
/// broadcasting shared state.
pub struct ChannelConnection {
    id: ConnectionId,
    outgoing: mpsc::UnboundedSender<ServerFrame>,
}

impl ChannelConnection {
    /// Create a connection with a fresh id feeding `outgoing`.
    pub fn new(outgoing: mpsc::UnboundedSender<ServerFrame>) -> Self {
        Self {
            id: ConnectionId::new(),
            outgoing,
        }
    }
}

impl Connection for ChannelConnection {
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    fn send_update(&self, update: &UpdateNotification) -> Result<()> {
        self.outgoing
            .send(ServerFrame::Update(update.clone()))
            .map_err(|_| {
                TransportError::DeliveryFailed {
                    connection: self.id.to_string(),
                    reason: "connection writer has shut down".to_string(),
                }
                .into()
            })
    }
}

/// Client-side correlation of responses to requests, plus update fan-out.
///
/// A transport's reader feeds every incoming [`ServerFrame`] to [`dispatch`](Self::dispatch)
/// and calls [`close`](Self::close) when the stream ends.
pub struct PendingRequests {
    next_id: AtomicU64,
    pending: Mutex<HashMap<u64, oneshot::Sender<Response>>>,
    updates: broadcast::Sender<UpdateNotification>,
    closed: AtomicBool,
}

impl Default for PendingRequests {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingRequests {
    /// Create an empty tracker.
    pub fn new() -> Self {
        let (updates, _) = broadcast::channel(UPDATE_BUFFER);
        Self {
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
            updates,
            closed: AtomicBool::new(false),
        }
    }

    /// Send `request` through `outgoing` and wait for the matching response.
    pub async fn request(
        &self,
        outgoing: &mpsc::UnboundedSender<ClientFrame>,
        request: Request,
    ) -> Result<Response> {
        let (id, rx) = self.register()?;
        if outgoing.send(ClientFrame { id, request }).is_err() {
            self.pending.lock().unwrap().remove(&id);
            return Err(TransportError::Closed.into());
        }
        rx.await.map_err(|_| TransportError::Closed.into())
    }

    fn register(&self) -> std::result::Result<(u64, oneshot::Receiver<Response>), TransportError> {
        // Checked under the lock so a concurrent close() cannot miss this entry.
        let mut pending = self.pending.lock().unwrap();
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        pending.insert(id, tx);
        Ok((id, rx))
    }

    /// Route one incoming frame to its waiting request or to update subscribers.
    pub fn dispatch(&self, frame: ServerFrame) {
        match frame {
            ServerFrame::Response { id, response } => {
                let waiter = self.pending.lock().unwrap().remove(&id);
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(response);
                    }
                    None => warn!(request_id = id, "Response for unknown request"),
                }
            }
            ServerFrame::Update(update) => {
                // No receivers just means nobody is mirroring right now.
                if self.updates.send(update).is_err() {
                    debug!("Dropped update with no listening mirror");
                }
            }
        }
    }

    /// Mark the connection closed and fail every request still waiting.
    pub fn close(&self) {
        let mut pending = self.pending.lock().unwrap();
        self.closed.store(true, Ordering::SeqCst);
        pending.clear();
    }

    /// Check whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Receive updates dispatched from now on.
    pub fn subscribe_updates(&self) -> broadcast::Receiver<UpdateNotification> {
        self.updates.subscribe()
    }

    /// Number of requests still waiting for a response.
    pub fn in_flight(&self) -> usize {
        self.pending.lock().unwrap().len()
    }
}
