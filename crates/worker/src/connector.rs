// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker side of the strategy relay.
//!
//! The connector owns this worker's strategy set. Local mutations replace
//! the set and, when asked to propagate, send the full snapshot to the
//! relay. Snapshots arriving from the relay are reconciled into the local
//! set and fire the change listeners; they are never echoed back.
//!
//! There is no reconnect: once the link drops, mutations stay local.

use std::sync::{Arc, Weak};

use bytes::Bytes;
use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use authmesh_relay::config::ClusterConfig;
use authmesh_relay::frame::{self, FrameDecoder};
use authmesh_relay::{reconcile, Reconciled, StrategySet};

/// Callback fired once per remotely applied change.
pub type ChangeListener = Arc<dyn Fn() + Send + Sync>;

/// Callback given the names a remote snapshot removed from the local set.
pub type DropHook = Arc<dyn Fn(&[String]) + Send + Sync>;

struct Local {
    strategies: StrategySet,
    /// Outbound frame queue while connected to the relay.
    link: Option<mpsc::UnboundedSender<Bytes>>,
}

/// Owns the local strategy set and the link to the relay.
pub struct Connector {
    local: Mutex<Local>,
    listeners: Mutex<Vec<ChangeListener>>,
    drop_hooks: Mutex<Vec<DropHook>>,
    cancel: CancellationToken,
}

impl Connector {
    pub fn new(initial: StrategySet) -> Arc<Self> {
        Arc::new(Self {
            local: Mutex::new(Local { strategies: initial, link: None }),
            listeners: Mutex::new(Vec::new()),
            drop_hooks: Mutex::new(Vec::new()),
            cancel: CancellationToken::new(),
        })
    }

    /// Open the link to the relay and send the current set if non-empty.
    /// Does nothing while a link is already up.
    pub async fn connect(self: &Arc<Self>, config: &ClusterConfig) -> std::io::Result<()> {
        if self.is_connected() {
            debug!("already linked to strategy relay");
            return Ok(());
        }

        let stream = TcpStream::connect(config.addr()).await?;
        stream.set_nodelay(true)?;
        info!(addr = %config.addr(), "connected to strategy relay");

        let (read_half, write_half) = stream.into_split();
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = self.cancel.child_token();

        {
            let mut local = self.local.lock();
            if local.link.is_some() {
                // Lost a race with a concurrent connect; keep the first link.
                return Ok(());
            }
            local.link = Some(tx);
            if !local.strategies.is_empty() {
                send(&local);
            }
        }

        tokio::spawn(write_loop(Arc::downgrade(self), write_half, rx, cancel.clone()));
        tokio::spawn(read_loop(Arc::downgrade(self), read_half, cancel));
        Ok(())
    }

    /// Whether the relay link is currently up.
    pub fn is_connected(&self) -> bool {
        self.local.lock().link.is_some()
    }

    /// Close the relay link. Mutations stay local afterwards.
    pub fn disconnect(&self) {
        self.cancel.cancel();
        self.local.lock().link = None;
    }

    /// Replace the set. Returns the names that are no longer present.
    pub fn set_strategies(&self, names: StrategySet, propagate: bool) -> Vec<String> {
        let mut local = self.local.lock();
        let dropped = local.strategies.missing_from(&names);
        local.strategies = names;
        if propagate {
            send(&local);
        }
        dropped
    }

    /// Add names. Returns the names that were not already present.
    pub fn add_strategies<I, S>(&self, names: I, propagate: bool) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut local = self.local.lock();
        let mut added = Vec::new();
        for name in names {
            let name = name.into();
            if local.strategies.insert(name.clone()) {
                added.push(name);
            }
        }
        if propagate {
            send(&local);
        }
        added
    }

    /// Remove names. Returns the names that were actually present.
    pub fn remove_strategies<I, S>(&self, names: I, propagate: bool) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut local = self.local.lock();
        let mut removed = Vec::new();
        for name in names {
            let name = name.into();
            if local.strategies.remove(&name) {
                removed.push(name);
            }
        }
        if propagate {
            send(&local);
        }
        removed
    }

    /// Ordered snapshot of the active strategy names.
    pub fn loaded_strategies(&self) -> Vec<String> {
        self.local.lock().strategies.to_vec()
    }

    pub fn has(&self, name: &str) -> bool {
        self.local.lock().strategies.contains(name)
    }

    /// Register a listener for remotely applied changes.
    pub fn on_change<F>(&self, listener: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.listeners.lock().push(Arc::new(listener));
    }

    /// Register a hook for names removed by a remote snapshot. Hooks run
    /// before the change listeners.
    pub fn on_remote_drop<F>(&self, hook: F)
    where
        F: Fn(&[String]) + Send + Sync + 'static,
    {
        self.drop_hooks.lock().push(Arc::new(hook));
    }

    /// Apply a snapshot received from the relay.
    fn apply_remote(&self, reported: StrategySet) {
        let (changed, dropped) = {
            let mut local = self.local.lock();
            let Reconciled { merged, changed } = reconcile(&local.strategies, reported);
            let dropped = local.strategies.missing_from(&merged);
            local.strategies = merged;
            (changed, dropped)
        };
        if !changed {
            return;
        }

        debug!(dropped = dropped.len(), "strategies changed by relay");
        if !dropped.is_empty() {
            let hooks: Vec<DropHook> = self.drop_hooks.lock().clone();
            for hook in hooks {
                hook(&dropped);
            }
        }
        let listeners: Vec<ChangeListener> = self.listeners.lock().clone();
        for listener in listeners {
            listener();
        }
    }

    fn drop_link(&self) {
        self.local.lock().link = None;
    }
}

impl Drop for Connector {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Queue the current set for the relay, if linked.
fn send(local: &Local) {
    let Some(link) = local.link.as_ref() else {
        return;
    };
    match frame::encode(&local.strategies) {
        Ok(frame) => {
            if link.send(frame).is_err() {
                debug!("relay link closed, change stays local");
            }
        }
        Err(e) => warn!(err = %e, "failed to encode strategies"),
    }
}

async fn read_loop(connector: Weak<Connector>, read_half: OwnedReadHalf, cancel: CancellationToken) {
    let mut frames = FramedRead::new(read_half, FrameDecoder);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            next = frames.next() => match next {
                Some(Ok(payload)) => {
                    let Some(connector) = connector.upgrade() else { break };
                    match frame::parse_payload(&payload) {
                        Ok(reported) => connector.apply_remote(reported),
                        Err(e) => warn!(err = %e, "dropping malformed frame from relay"),
                    }
                }
                Some(Err(e)) => {
                    warn!(err = %e, "relay connection error");
                    break;
                }
                None => {
                    info!("relay closed the connection");
                    break;
                }
            }
        }
    }
    if let Some(connector) = connector.upgrade() {
        connector.drop_link();
    }
    cancel.cancel();
}

async fn write_loop(
    connector: Weak<Connector>,
    mut write_half: OwnedWriteHalf,
    mut rx: mpsc::UnboundedReceiver<Bytes>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            frame = rx.recv() => match frame {
                Some(frame) => {
                    if let Err(e) = write_half.write_all(&frame).await {
                        warn!(err = %e, "write to relay failed");
                        break;
                    }
                }
                None => break,
            }
        }
    }
    if let Some(connector) = connector.upgrade() {
        connector.drop_link();
    }
    cancel.cancel();
}

#[cfg(test)]
#[path = "connector_tests.rs"]
mod tests;
