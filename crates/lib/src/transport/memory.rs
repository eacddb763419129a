//! In-process transport over tokio channels.
//!
//! Each [`MemoryClient`] is paired with a server task that feeds its requests, in
//! order, through a [`ConnectionScope`](crate::registry::ConnectionScope).
//! Dropping or disconnecting the client closes the request channel, which ends the
//! server task and reports the departure.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};
use tracing::debug;

use super::{
    ClientTransport, Connection, ConnectionId, TransportError,
    shared::{ChannelConnection, PendingRequests},
};
use crate::{
    Registry, Result,
    protocol::{ClientFrame, Request, Response, ServerFrame, UpdateNotification},
};

/// Factory for in-process connections to a registry.
pub struct MemoryTransport;

impl MemoryTransport {
    /// Open a new connection to `registry`.
    ///
    /// Must be called from within a tokio runtime; the connection's tasks are
    /// spawned on it.
    pub fn connect(registry: &Registry) -> MemoryClient {
        let (request_tx, mut request_rx) = mpsc::unbounded_channel::<ClientFrame>();
        let (frame_tx, mut frame_rx) = mpsc::unbounded_channel::<ServerFrame>();

        let connection = Arc::new(ChannelConnection::new(frame_tx.clone()));
        let id = connection.id().clone();
        let scope = registry.on_connection_arrive(connection);

        tokio::spawn(async move {
            while let Some(ClientFrame { id, request }) = request_rx.recv().await {
                let response = scope.handle(&request);
                if frame_tx.send(ServerFrame::Response { id, response }).is_err() {
                    break;
                }
            }
            let report = scope.depart();
            debug!(
                unsubscribed = report.unsubscribed.len(),
                collected = report.collected.len(),
                "Memory connection closed"
            );
        });

        let pending = Arc::new(PendingRequests::new());
        let reader = pending.clone();
        tokio::spawn(async move {
            while let Some(frame) = frame_rx.recv().await {
                reader.dispatch(frame);
            }
            reader.close();
        });

        MemoryClient {
            id,
            requests: Mutex::new(Some(request_tx)),
            pending,
        }
    }
}

/// Client end of an in-process connection.
pub struct MemoryClient {
    id: ConnectionId,
    requests: Mutex<Option<mpsc::UnboundedSender<ClientFrame>>>,
    pending: Arc<PendingRequests>,
}

impl MemoryClient {
    /// The id the server knows this connection by.
    pub fn connection_id(&self) -> &ConnectionId {
        &self.id
    }

    /// Close the connection. The server reports the departure once it has
    /// answered every request already sent.
    pub fn disconnect(&self) {
        self.requests.lock().unwrap().take();
    }
}

#[async_trait]
impl ClientTransport for MemoryClient {
    fn transport_type(&self) -> &'static str {
        "memory"
    }

    async fn request(&self, request: Request) -> Result<Response> {
        let sender = self
            .requests
            .lock()
            .unwrap()
            .clone()
            .ok_or(TransportError::Closed)?;
        self.pending.request(&sender, request).await
    }

    fn subscribe_updates(&self) -> broadcast::Receiver<UpdateNotification> {
        self.pending.subscribe_updates()
    }

    fn is_closed(&self) -> bool {
        self.requests.lock().unwrap().is_none() || self.pending.is_closed()
    }
}
