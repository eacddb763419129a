//! Newline-delimited JSON transport over TCP.
//!
//! Every frame is one JSON document followed by `\n`. Clients send
//! [`ClientFrame`]s; the server answers each with a [`ServerFrame::Response`] carrying
//! the same id and interleaves [`ServerFrame::Update`]s for subscribed objects.
//!
//! The server runs one reader loop and one writer task per connection. The reader
//! handles requests in arrival order; the writer drains the connection's outgoing
//! queue, so a slow socket never blocks a broadcast. When the socket closes, cleanly
//! or not, the reader loop ends and reports the departure exactly once.
//!
//! Lines longer than [`MAX_FRAME_BYTES`] are never buffered in full: the reader
//! gives up on the connection as soon as the limit is passed.

use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::{
    io::AsyncWriteExt,
    net::{
        TcpListener, TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    sync::{broadcast, mpsc, oneshot},
};
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tracing::{debug, info, warn};

use super::{
    ClientTransport, TransportError,
    shared::{ChannelConnection, FrameCodec, PendingRequests, ServerState},
};
use crate::{
    Registry, Result,
    constants::MAX_FRAME_BYTES,
    protocol::{ClientFrame, Request, Response, ServerFrame, UpdateNotification},
};

/// TCP server exposing a registry.
pub struct TcpServer {
    registry: Registry,
    server_state: ServerState,
}

impl TcpServer {
    /// Create a stopped server for `registry`.
    pub fn new(registry: Registry) -> Self {
        Self {
            registry,
            server_state: ServerState::new(),
        }
    }

    /// Bind to `addr` and start accepting connections.
    ///
    /// Port 0 binds an ephemeral port; [`address`](Self::address) reports the one
    /// actually bound.
    pub async fn start(&mut self, addr: &str) -> Result<()> {
        if self.server_state.is_running() {
            return Err(TransportError::ServerAlreadyRunning {
                address: addr.to_string(),
            }
            .into());
        }

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| TransportError::ServerBind {
                address: addr.to_string(),
                reason: e.to_string(),
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| TransportError::ServerBind {
                address: addr.to_string(),
                reason: format!("Failed to get local address: {e}"),
            })?;

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let registry = self.registry.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    accepted = listener.accept() => match accepted {
                        Ok((stream, peer)) => {
                            tokio::spawn(serve_connection(registry.clone(), stream, peer));
                        }
                        Err(e) => warn!(error = %e, "Failed to accept connection"),
                    },
                }
            }
            info!(address = %local_addr, "TCP server stopped accepting connections");
        });

        info!(address = %local_addr, "TCP server listening");
        self.server_state
            .server_started(local_addr.to_string(), shutdown_tx);
        Ok(())
    }

    /// Stop accepting connections. Connections already open keep running until
    /// their peers close them.
    pub fn stop(&mut self) -> Result<()> {
        if !self.server_state.is_running() {
            return Err(TransportError::ServerNotRunning.into());
        }
        self.server_state.stop_server();
        Ok(())
    }

    /// Check whether the server is accepting connections.
    pub fn is_running(&self) -> bool {
        self.server_state.is_running()
    }

    /// The bound address.
    pub fn address(&self) -> Result<String> {
        Ok(self.server_state.get_address()?)
    }

    /// The registry this server exposes.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl Drop for TcpServer {
    fn drop(&mut self) {
        self.server_state.stop_server();
    }
}

async fn serve_connection(registry: Registry, stream: TcpStream, peer: SocketAddr) {
    let (read_half, write_half) = stream.into_split();
    let (frame_tx, frame_rx) = mpsc::unbounded_channel::<ServerFrame>();

    let scope = registry.on_connection_arrive(Arc::new(ChannelConnection::new(frame_tx.clone())));
    let connection = scope.connection_id().clone();
    debug!(peer = %peer, connection = %connection, "Accepted TCP connection");

    let writer = tokio::spawn(write_frames(write_half, frame_rx));

    let peer_label = peer.to_string();
    let mut lines = frame_lines(read_half);
    while let Some(line) = next_line(&mut lines, &peer_label).await {
        if line.trim().is_empty() {
            continue;
        }
        match FrameCodec::decode_client(&line) {
            Ok(ClientFrame { id, request }) => {
                let response = scope.handle(&request);
                if frame_tx.send(ServerFrame::Response { id, response }).is_err() {
                    break;
                }
            }
            Err(e) => warn!(connection = %connection, error = %e, "Skipping malformed frame"),
        }
    }

    let report = scope.depart();
    debug!(
        peer = %peer,
        unsubscribed = report.unsubscribed.len(),
        collected = report.collected.len(),
        "TCP connection closed"
    );

    // The writer finishes once every queued frame is flushed.
    drop(frame_tx);
    let _ = writer.await;
}

/// Split a read half into lines of at most [`MAX_FRAME_BYTES`].
fn frame_lines(read_half: OwnedReadHalf) -> FramedRead<OwnedReadHalf, LinesCodec> {
    FramedRead::new(read_half, LinesCodec::new_with_max_length(MAX_FRAME_BYTES))
}

/// Next line from `lines`, or `None` once the connection should be dropped: on
/// end of stream, on a read error, or when a line exceeds the frame limit.
async fn next_line(
    lines: &mut FramedRead<OwnedReadHalf, LinesCodec>,
    peer: &str,
) -> Option<String> {
    match lines.next().await? {
        Ok(line) => Some(line),
        Err(LinesCodecError::MaxLineLengthExceeded) => {
            warn!(
                peer = %peer,
                limit = MAX_FRAME_BYTES,
                "Frame exceeds size limit; closing connection"
            );
            None
        }
        Err(LinesCodecError::Io(e)) => {
            debug!(peer = %peer, error = %e, "TCP read failed");
            None
        }
    }
}

async fn write_frames<T: serde::Serialize>(
    mut write_half: OwnedWriteHalf,
    mut frames: mpsc::UnboundedReceiver<T>,
) {
    while let Some(frame) = frames.recv().await {
        let bytes = match FrameCodec::encode_line(&frame) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "Dropping frame that failed to encode");
                continue;
            }
        };
        if let Err(e) = write_half.write_all(&bytes).await {
            debug!(error = %e, "TCP write failed");
            return;
        }
    }
    let _ = write_half.shutdown().await;
}

/// Client end of a TCP connection.
pub struct TcpClient {
    address: String,
    requests: Mutex<Option<mpsc::UnboundedSender<ClientFrame>>>,
    pending: Arc<PendingRequests>,
}

impl TcpClient {
    /// Connect to a server at `addr`.
    pub async fn connect(addr: &str) -> Result<Self> {
        let stream =
            TcpStream::connect(addr)
                .await
                .map_err(|e| TransportError::ConnectionFailed {
                    address: addr.to_string(),
                    reason: e.to_string(),
                })?;
        let (read_half, write_half) = stream.into_split();
        let (request_tx, request_rx) = mpsc::unbounded_channel::<ClientFrame>();

        tokio::spawn(write_frames(write_half, request_rx));

        let pending = Arc::new(PendingRequests::new());
        let reader = pending.clone();
        let address = addr.to_string();
        tokio::spawn(async move {
            let mut lines = frame_lines(read_half);
            while let Some(line) = next_line(&mut lines, &address).await {
                if line.trim().is_empty() {
                    continue;
                }
                match FrameCodec::decode_server(&line) {
                    Ok(frame) => reader.dispatch(frame),
                    Err(e) => warn!(address = %address, error = %e, "Skipping malformed frame"),
                }
            }
            reader.close();
            debug!(address = %address, "TCP client connection closed");
        });

        Ok(Self {
            address: addr.to_string(),
            requests: Mutex::new(Some(request_tx)),
            pending,
        })
    }

    /// The address this client connected to.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Close the connection after flushing requests already sent.
    pub fn disconnect(&self) {
        self.requests.lock().unwrap().take();
    }
}

#[async_trait]
impl ClientTransport for TcpClient {
    fn transport_type(&self) -> &'static str {
        "tcp"
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
