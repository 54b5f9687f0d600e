// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Relay hub: accepts worker connections, reconciles each reported strategy
//! set against the tracked global view, and rebroadcasts changes to every
//! other worker.
//!
//! A single task owns the connection registry and the tracked set. Each
//! accepted socket gets a reader task (frames in, forwarded as events) and
//! a writer task (queued frames out). Writes are fire-and-forget.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ClusterConfig;
use crate::error::WriteError;
use crate::frame::{self, FrameDecoder};
use crate::reconcile::{reconcile, Reconciled};
use crate::set::StrategySet;

/// Opaque token identifying one accepted worker connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Observable relay state, republished after every registry change or report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayStatus {
    /// Currently registered connections.
    pub connections: usize,
    /// Well-formed reports processed since start.
    pub reports: u64,
    /// The tracked global strategy set.
    pub tracked: StrategySet,
}

/// Messages from connection tasks to the hub.
#[derive(Debug)]
enum RelayEvent {
    Report { id: ConnectionId, payload: Bytes },
    Closed { id: ConnectionId },
}

/// Outbound side of a registered connection.
#[derive(Debug)]
struct Peer {
    tx: mpsc::UnboundedSender<Bytes>,
    addr: SocketAddr,
}

impl Peer {
    fn send(&self, id: ConnectionId, frame: Bytes) -> Result<(), WriteError> {
        self.tx.send(frame).map_err(|_| WriteError::Closed(id))
    }
}

/// Connection registry and tracked set. Owned by the relay task only.
struct Hub {
    peers: HashMap<ConnectionId, Peer>,
    tracked: StrategySet,
    reports: u64,
    status: watch::Sender<RelayStatus>,
}

impl Hub {
    fn new(status: watch::Sender<RelayStatus>) -> Self {
        Self { peers: HashMap::new(), tracked: StrategySet::new(), reports: 0, status }
    }

    /// Fresh id that no registered connection uses.
    fn next_id(&self) -> ConnectionId {
        loop {
            let id = ConnectionId::new();
            if !self.peers.contains_key(&id) {
                return id;
            }
        }
    }

    fn register(&mut self, id: ConnectionId, peer: Peer) {
        info!(conn_id = %id, addr = %peer.addr, "new connection established");
        self.peers.insert(id, peer);
        self.publish_status();
    }

    fn deregister(&mut self, id: ConnectionId) {
        if let Some(peer) = self.peers.remove(&id) {
            info!(conn_id = %id, addr = %peer.addr, "closing client connection");
            self.publish_status();
        }
    }

    /// Apply one frame payload reported by `origin`.
    fn report(&mut self, origin: ConnectionId, payload: &[u8]) {
        let reported = match frame::parse_payload(payload) {
            Ok(set) => set,
            Err(e) => {
                warn!(conn_id = %origin, err = %e, "dropping malformed frame");
                return;
            }
        };

        let Reconciled { merged, changed } = reconcile(&self.tracked, reported);
        if changed {
            debug!(conn_id = %origin, strategies = %merged, "strategies changed");
            match frame::encode(&merged) {
                Ok(frame) => {
                    let delivered = self.broadcast(origin, frame);
                    debug!(conn_id = %origin, delivered, "rebroadcast strategies");
                }
                Err(e) => warn!(conn_id = %origin, err = %e, "failed to encode strategies"),
            }
        }

        self.tracked = merged;
        self.reports += 1;
        self.publish_status();
    }

    /// Queue `frame` for every connection except `origin`. Targets whose
    /// writer has gone away are deregistered. Returns the delivery count.
    fn broadcast(&mut self, origin: ConnectionId, frame: Bytes) -> usize {
        let mut dead = Vec::new();
        let mut delivered = 0;

        for (&id, peer) in &self.peers {
            if id == origin {
                continue;
            }
            match peer.send(id, frame.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    debug!(err = %e, "skipping broadcast target");
                    dead.push(id);
                }
            }
        }

        for id in dead {
            self.deregister(id);
        }
        delivered
    }

    fn publish_status(&self) {
        self.status.send_replace(RelayStatus {
            connections: self.peers.len(),
            reports: self.reports,
            tracked: self.tracked.clone(),
        });
    }
}

/// A bound but not yet running relay.
pub struct Relay {
    listener: TcpListener,
}

impl Relay {
    /// Bind the relay listener.
    pub async fn bind(config: &ClusterConfig) -> std::io::Result<Self> {
        let listener = TcpListener::bind(config.addr()).await?;
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Spawn the relay task. It runs until [`RelayHandle::stop`] is called
    /// or the handle is dropped.
    pub fn start(self) -> std::io::Result<RelayHandle> {
        let addr = self.listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let (status_tx, status_rx) = watch::channel(RelayStatus::default());
        let hub = Hub::new(status_tx);

        info!(%addr, "strategy relay listening");
        let task = tokio::spawn(run(self.listener, hub, shutdown.clone()));

        Ok(RelayHandle { addr, shutdown, status: status_rx, task: Some(task) })
    }
}

/// Handle to a running relay.
pub struct RelayHandle {
    addr: SocketAddr,
    shutdown: CancellationToken,
    status: watch::Receiver<RelayStatus>,
    task: Option<JoinHandle<()>>,
}

impl RelayHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Subscribe to relay status updates.
    pub fn status(&self) -> watch::Receiver<RelayStatus> {
        self.status.clone()
    }

    /// Signal the relay to stop. Open connections are closed.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    /// Wait for the relay task to exit.
    pub async fn join(mut self) -> anyhow::Result<()> {
        if let Some(task) = self.task.take() {
            task.await?;
        }
        Ok(())
    }
}

impl Drop for RelayHandle {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn run(listener: TcpListener, mut hub: Hub, shutdown: CancellationToken) {
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!(%addr, err = %e, "failed to disable nagle");
                    }
                    let id = hub.next_id();
                    let tx = spawn_connection(id, stream, events_tx.clone(), shutdown.child_token());
                    hub.register(id, Peer { tx, addr });
                }
                Err(e) => {
                    warn!(err = %e, "accept failed");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            },
            Some(event) = events_rx.recv() => match event {
                RelayEvent::Report { id, payload } => hub.report(id, &payload),
                RelayEvent::Closed { id } => hub.deregister(id),
            },
        }
    }

    info!("strategy relay stopped");
}

/// Spawn reader and writer tasks for one connection and return its
/// outbound queue.
fn spawn_connection(
    id: ConnectionId,
    stream: TcpStream,
    events: mpsc::UnboundedSender<RelayEvent>,
    cancel: CancellationToken,
) -> mpsc::UnboundedSender<Bytes> {
    let (read_half, mut write_half) = stream.into_split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Bytes>();

    let reader_events = events.clone();
    let reader_cancel = cancel.clone();
    tokio::spawn(async move {
        let mut frames = FramedRead::new(read_half, FrameDecoder);
        loop {
            tokio::select! {
                _ = reader_cancel.cancelled() => break,
                next = frames.next() => match next {
                    Some(Ok(payload)) => {
                        if reader_events.send(RelayEvent::Report { id, payload }).is_err() {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        warn!(conn_id = %id, err = %e, "connection error");
                        break;
                    }
                    None => break,
                }
            }
        }
        let _ = reader_events.send(RelayEvent::Closed { id });
        reader_cancel.cancel();
    });

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                frame = rx.recv() => match frame {
                    Some(frame) => {
                        if let Err(e) = write_half.write_all(&frame).await {
                            warn!(conn_id = %id, err = %e, "write failed");
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
        let _ = events.send(RelayEvent::Closed { id });
        cancel.cancel();
    });

    tx
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
