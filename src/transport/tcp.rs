// Copyright (c) 2025 - Cowboy AI, Inc.
//! Line-delimited JSON RPC over TCP
//!
//! Each frame is one JSON document followed by `\n`. A single connection
//! carries many calls at once: requests are tagged with an id and replies
//! may come back in any order.
//!
//! ```text
//! client                                 server
//!   │ {"id":1,"method":"M","params":..}\n  │
//!   │────────────────────────────────────→│  spawn handler(1)
//!   │ {"id":2,"method":"M","params":..}\n  │
//!   │────────────────────────────────────→│  spawn handler(2)
//!   │            {"id":2,"result":..}\n    │
//!   │←────────────────────────────────────│
//!   │            {"id":1,"fault":..}\n     │
//!   │←────────────────────────────────────│
//! ```

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{dispatch, RequestHandler, RpcRequest, RpcResponse, Transport};
use crate::config::TransportConfig;
use crate::errors::{QuorumError, QuorumResult};

/// Pause after a failed `accept` before trying again
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Calls waiting for a reply on one connection
#[derive(Default)]
struct InFlight {
    closed: bool,
    waiters: HashMap<u64, oneshot::Sender<RpcResponse>>,
}

/// RPC client multiplexing calls over one TCP connection
pub struct TcpTransport {
    peer: SocketAddr,
    writer: tokio::sync::Mutex<OwnedWriteHalf>,
    in_flight: Arc<Mutex<InFlight>>,
    next_id: AtomicU64,
    reader: JoinHandle<()>,
}

impl TcpTransport {
    /// Connect using the address and timeout from `config`
    pub async fn connect(config: &TransportConfig) -> QuorumResult<Self> {
        let stream = tokio::time::timeout(
            config.connect_timeout(),
            TcpStream::connect(config.addr.as_str()),
        )
        .await
        .map_err(|_| QuorumError::Timeout(format!("connecting to {}", config.addr)))??;

        Self::from_stream(stream)
    }

    /// Wrap an already connected stream
    pub fn from_stream(stream: TcpStream) -> QuorumResult<Self> {
        let peer = stream.peer_addr()?;
        stream.set_nodelay(true)?;
        let (read_half, write_half) = stream.into_split();

        let in_flight = Arc::new(Mutex::new(InFlight::default()));
        let reader = tokio::spawn(read_replies(read_half, Arc::clone(&in_flight), peer));

        info!("Connected to RPC peer at {}", peer);

        Ok(Self {
            peer,
            writer: tokio::sync::Mutex::new(write_half),
            in_flight,
            next_id: AtomicU64::new(1),
            reader,
        })
    }

    /// Address of the connected peer
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Number of calls still waiting for a reply
    pub fn in_flight(&self) -> usize {
        self.in_flight
            .lock()
            .map(|calls| calls.waiters.len())
            .unwrap_or(0)
    }

    fn register(&self, id: u64) -> QuorumResult<oneshot::Receiver<RpcResponse>> {
        let mut calls = self
            .in_flight
            .lock()
            .map_err(|_| QuorumError::Connection("in-flight table poisoned".to_string()))?;
        if calls.closed {
            return Err(QuorumError::Disconnected);
        }
        let (tx, rx) = oneshot::channel();
        calls.waiters.insert(id, tx);
        Ok(rx)
    }

    fn forget(&self, id: u64) {
        if let Ok(mut calls) = self.in_flight.lock() {
            calls.waiters.remove(&id);
        }
    }
}

/// Removes a call's waiter however the call ends, including when the
/// caller drops the call future before the reply arrives
struct PendingCall<'a> {
    transport: &'a TcpTransport,
    id: u64,
}

impl Drop for PendingCall<'_> {
    fn drop(&mut self) {
        self.transport.forget(self.id);
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn call(&self, method: &str, params: Value) -> QuorumResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest {
            id,
            method: method.to_string(),
            params,
        };
        let mut frame = serde_json::to_vec(&request)?;
        frame.push(b'\n');

        let reply = self.register(id)?;
        let _pending = PendingCall { transport: self, id };

        let written = {
            let mut writer = self.writer.lock().await;
            writer.write_all(&frame).await
        };
        if let Err(e) = written {
            return Err(QuorumError::Connection(format!(
                "sending {} to {}: {}",
                method, self.peer, e
            )));
        }

        debug!("Sent request {} ({}) to {}", id, method, self.peer);

        // The reader drops every waiter when the connection closes
        let response = reply.await.map_err(|_| QuorumError::Disconnected)?;
        response.into_result()
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

impl std::fmt::Debug for TcpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpTransport")
            .field("peer", &self.peer)
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

async fn read_replies(read_half: OwnedReadHalf, in_flight: Arc<Mutex<InFlight>>, peer: SocketAddr) {
    let mut lines = BufReader::new(read_half).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                let response: RpcResponse = match serde_json::from_str(&line) {
                    Ok(response) => response,
                    Err(e) => {
                        warn!("Dropping undecodable reply from {}: {}", peer, e);
                        continue;
                    }
                };
                let waiter = in_flight
                    .lock()
                    .ok()
                    .and_then(|mut calls| calls.waiters.remove(&response.id));
                match waiter {
                    // The caller may have stopped listening; that is fine
                    Some(waiter) => {
                        let _ = waiter.send(response);
                    }
                    None => debug!("Reply {} from {} has no waiter", response.id, peer),
                }
            }
            Ok(None) => {
                debug!("RPC peer {} closed the connection", peer);
                break;
            }
            Err(e) => {
                error!("Reading from RPC peer {} failed: {}", peer, e);
                break;
            }
        }
    }

    if let Ok(mut calls) = in_flight.lock() {
        calls.closed = true;
        // Dropping the senders fails every outstanding call
        calls.waiters.clear();
    }
}

/// RPC server answering one method with a [`RequestHandler`]
///
/// Every request runs on its own task, so a handler that never returns
/// only stalls its own caller.
pub struct RpcServer {
    local_addr: SocketAddr,
    acceptor: JoinHandle<()>,
}

impl RpcServer {
    /// Bind to `addr` and start serving `handler`
    pub async fn bind<A, H>(addr: A, handler: H) -> QuorumResult<Self>
    where
        A: ToSocketAddrs,
        H: RequestHandler,
    {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let handler = Arc::new(handler);

        info!("Serving {} on {}", handler.method(), local_addr);

        let acceptor = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        debug!("Accepted RPC connection from {}", peer);
                        tokio::spawn(serve_connection(stream, peer, Arc::clone(&handler)));
                    }
                    Err(e) => {
                        warn!("Accept failed on {}: {}", local_addr, e);
                        // Errors like EMFILE persist for a while
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                }
            }
        });

        Ok(Self {
            local_addr,
            acceptor,
        })
    }

    /// Address the server is listening on
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting connections
    ///
    /// Connections already accepted keep being served until their client
    /// hangs up.
    pub fn shutdown(self) {
        drop(self);
    }
}

impl Drop for RpcServer {
    fn drop(&mut self) {
        self.acceptor.abort();
    }
}

impl std::fmt::Debug for RpcServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcServer")
            .field("local_addr", &self.local_addr)
            .finish()
    }
}

async fn serve_connection<H>(stream: TcpStream, peer: SocketAddr, handler: Arc<H>)
where
    H: RequestHandler,
{
    let (read_half, mut write_half) = stream.into_split();
    let (replies, mut outgoing) = mpsc::unbounded_channel::<RpcResponse>();

    let writer = tokio::spawn(async move {
        while let Some(response) = outgoing.recv().await {
            let mut frame = match serde_json::to_vec(&response) {
                Ok(frame) => frame,
                Err(e) => {
                    error!("Failed to encode reply {}: {}", response.id, e);
                    continue;
                }
            };
            frame.push(b'\n');
            if let Err(e) = write_half.write_all(&frame).await {
                debug!("Writing to {} failed: {}", peer, e);
                break;
            }
        }
    });

    let mut lines = BufReader::new(read_half).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                let request: RpcRequest = match serde_json::from_str(&line) {
                    Ok(request) => request,
                    Err(e) => {
                        // Without an id there is nobody to answer
                        warn!("Dropping undecodable request from {}: {}", peer, e);
                        continue;
                    }
                };
                let handler = Arc::clone(&handler);
                let replies = replies.clone();
                tokio::spawn(async move {
                    let response = dispatch(handler.as_ref(), request).await;
                    let _ = replies.send(response);
                });
            }
            Ok(None) => break,
            Err(e) => {
                debug!("Reading from {} failed: {}", peer, e);
                break;
            }
        }
    }

    debug!("RPC connection from {} closed", peer);
    drop(replies);
    // Replies still being produced keep the writer alive until they finish
    let _ = writer.await;
}
