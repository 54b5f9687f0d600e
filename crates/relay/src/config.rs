// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;

/// Default relay port shared by the relay and every worker.
pub const DEFAULT_PORT: u16 = 4321;

/// Default relay host. The relay channel is unauthenticated, so it stays
/// on loopback unless explicitly overridden.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Address of the strategy relay.
#[derive(Debug, Clone, PartialEq, Eq, clap::Args)]
pub struct ClusterConfig {
    /// Host the relay listens on / workers connect to.
    #[arg(long = "cluster-host", default_value = DEFAULT_HOST, env = "CLUSTER_HOST")]
    pub host: String,

    /// Port the relay listens on / workers connect to.
    #[arg(long = "cluster-port", default_value_t = DEFAULT_PORT, env = "CLUSTER_PORT")]
    pub port: u16,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self { host: DEFAULT_HOST.to_owned(), port: DEFAULT_PORT }
    }
}

impl ClusterConfig {
    /// Read `CLUSTER_HOST` / `CLUSTER_PORT` from the process environment.
    pub fn from_env() -> Self {
        Self::from_env_with(|name| std::env::var(name).ok())
    }

    /// Like [`from_env`](Self::from_env) with an injectable lookup.
    pub fn from_env_with(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let host = lookup("CLUSTER_HOST")
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| DEFAULT_HOST.to_owned());

        let port = match lookup("CLUSTER_PORT") {
            Some(raw) => match raw.trim().parse::<u16>() {
                Ok(port) => port,
                Err(_) => {
                    tracing::warn!(value = %raw, "invalid CLUSTER_PORT, defaulting to {DEFAULT_PORT}");
                    DEFAULT_PORT
                }
            },
            None => {
                tracing::debug!("defaulting cluster port to {DEFAULT_PORT}");
                DEFAULT_PORT
            }
        };

        Self { host, port }
    }

    /// `host:port` string suitable for bind/connect.
    pub fn addr(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Strategy relay hub for authmesh workers.
#[derive(Debug, Clone, Parser)]
#[command(name = "authmesh-relay", version, about)]
pub struct RelayConfig {
    #[command(flatten)]
    pub cluster: ClusterConfig,

    /// Log format (json or text).
    #[arg(long, env = "AUTHMESH_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "AUTHMESH_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl RelayConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        match self.log_format.as_str() {
            "json" | "text" => {}
            other => anyhow::bail!("invalid log format: {other}"),
        }
        if self.cluster.host.is_empty() {
            anyhow::bail!("cluster host must not be empty");
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
