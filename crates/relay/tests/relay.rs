// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Relay tests over real loopback sockets.

use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio_util::codec::FramedRead;

use authmesh_relay::config::ClusterConfig;
use authmesh_relay::frame::{self, FrameDecoder};
use authmesh_relay::{Relay, RelayHandle, RelayStatus, StrategySet};

const WAIT: Duration = Duration::from_secs(5);
const QUIET: Duration = Duration::from_millis(200);

struct Client {
    reader: FramedRead<OwnedReadHalf, FrameDecoder>,
    writer: OwnedWriteHalf,
}

impl Client {
    async fn connect(relay: &RelayHandle) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(relay.local_addr()).await?;
        stream.set_nodelay(true)?;
        let (read_half, writer) = stream.into_split();
        Ok(Self { reader: FramedRead::new(read_half, FrameDecoder), writer })
    }

    async fn send(&mut self, names: &[&str]) -> anyhow::Result<()> {
        let frame = frame::encode(&set(names))?;
        self.writer.write_all(&frame).await?;
        Ok(())
    }

    async fn send_raw(&mut self, bytes: &[u8]) -> anyhow::Result<()> {
        self.writer.write_all(bytes).await?;
        Ok(())
    }

    async fn recv(&mut self) -> anyhow::Result<StrategySet> {
        let payload: Bytes = tokio::time::timeout(WAIT, self.reader.next())
            .await?
            .ok_or_else(|| anyhow::anyhow!("relay closed the connection"))??;
        Ok(frame::parse_payload(&payload)?)
    }

    /// True if nothing arrives within a short quiet period.
    async fn is_quiet(&mut self) -> bool {
        tokio::time::timeout(QUIET, self.reader.next()).await.is_err()
    }
}

fn set(names: &[&str]) -> StrategySet {
    names.iter().copied().collect()
}

async fn start_relay() -> anyhow::Result<RelayHandle> {
    let config = ClusterConfig { host: "127.0.0.1".to_owned(), port: 0 };
    Ok(Relay::bind(&config).await?.start()?)
}

async fn wait_status(
    relay: &RelayHandle,
    pred: impl FnMut(&RelayStatus) -> bool,
) -> anyhow::Result<()> {
    let mut status = relay.status();
    tokio::time::timeout(WAIT, status.wait_for(pred)).await??;
    Ok(())
}

#[tokio::test]
async fn change_is_rebroadcast_to_other_clients_only() -> anyhow::Result<()> {
    let relay = start_relay().await?;
    let mut a = Client::connect(&relay).await?;
    let mut b = Client::connect(&relay).await?;
    wait_status(&relay, |s| s.connections == 2).await?;

    a.send(&["local", "facebook"]).await?;

    assert_eq!(b.recv().await?, set(&["local", "facebook"]));
    assert!(a.is_quiet().await, "origin must not receive its own change");
    Ok(())
}

#[tokio::test]
async fn unchanged_report_is_not_rebroadcast() -> anyhow::Result<()> {
    let relay = start_relay().await?;
    let mut a = Client::connect(&relay).await?;
    let mut b = Client::connect(&relay).await?;
    wait_status(&relay, |s| s.connections == 2).await?;

    a.send(&["local"]).await?;
    assert_eq!(b.recv().await?, set(&["local"]));

    b.send(&["local"]).await?;
    wait_status(&relay, |s| s.reports == 2).await?;
    assert!(a.is_quiet().await);
    Ok(())
}

#[tokio::test]
async fn frame_split_across_writes_is_reassembled() -> anyhow::Result<()> {
    let relay = start_relay().await?;
    let mut a = Client::connect(&relay).await?;
    let mut b = Client::connect(&relay).await?;
    wait_status(&relay, |s| s.connections == 2).await?;

    let frame = frame::encode(&set(&["local", "github"]))?;
    a.send_raw(&frame[..3]).await?;
    tokio::time::sleep(Duration::from_millis(50)).await;
    a.send_raw(&frame[3..9]).await?;
    tokio::time::sleep(Duration::from_millis(50)).await;
    a.send_raw(&frame[9..]).await?;

    assert_eq!(b.recv().await?, set(&["local", "github"]));
    Ok(())
}

#[tokio::test]
async fn malformed_frame_does_not_break_connection() -> anyhow::Result<()> {
    let relay = start_relay().await?;
    let mut a = Client::connect(&relay).await?;
    let mut b = Client::connect(&relay).await?;
    wait_status(&relay, |s| s.connections == 2).await?;

    let junk = b"{oops";
    let mut bad = (junk.len() as u32).to_be_bytes().to_vec();
    bad.extend_from_slice(junk);
    a.send_raw(&bad).await?;
    a.send(&["local"]).await?;

    assert_eq!(b.recv().await?, set(&["local"]));
    Ok(())
}

#[tokio::test]
async fn dropped_client_is_deregistered_and_others_keep_receiving() -> anyhow::Result<()> {
    let relay = start_relay().await?;
    let mut a = Client::connect(&relay).await?;
    let b = Client::connect(&relay).await?;
    let mut c = Client::connect(&relay).await?;
    wait_status(&relay, |s| s.connections == 3).await?;

    drop(b);
    a.send(&["local", "facebook"]).await?;
    assert_eq!(c.recv().await?, set(&["local", "facebook"]));

    wait_status(&relay, |s| s.connections == 2).await?;

    a.send(&["facebook"]).await?;
    assert_eq!(c.recv().await?, set(&["facebook"]));
    Ok(())
}

#[tokio::test]
async fn stop_closes_client_connections() -> anyhow::Result<()> {
    let relay = start_relay().await?;
    let mut a = Client::connect(&relay).await?;
    wait_status(&relay, |s| s.connections == 1).await?;

    relay.stop();
    relay.join().await?;

    let next = tokio::time::timeout(WAIT, a.reader.next()).await?;
    assert!(!matches!(next, Some(Ok(_))), "expected the relay to close the socket");
    Ok(())
}
