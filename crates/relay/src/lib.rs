// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authmesh relay: keeps the active authentication strategy set consistent
//! across worker processes.

pub mod config;
pub mod error;
pub mod frame;
pub mod reconcile;
pub mod server;
pub mod set;

pub use crate::reconcile::{reconcile, Reconciled};
pub use crate::server::{ConnectionId, Relay, RelayHandle, RelayStatus};
pub use crate::set::StrategySet;

use crate::config::RelayConfig;

/// Run the relay until Ctrl-C.
pub async fn run(config: RelayConfig) -> anyhow::Result<()> {
    let relay = Relay::bind(&config.cluster).await?;
    let handle = relay.start()?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested");

    handle.stop();
    handle.join().await
}
