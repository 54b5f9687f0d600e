// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Host-facing strategy controller.

use std::sync::Arc;

use axum::Router;
use parking_lot::RwLock;
use tracing::{debug, warn};

use authmesh_relay::config::ClusterConfig;
use authmesh_relay::StrategySet;

use crate::connector::Connector;
use crate::error::LoadError;
use crate::roles::RolesConfig;
use crate::routes::RouteTable;
use crate::strategy::StrategyLoader;

/// Options accepted by [`Authentication::configure`]. Unset fields leave the
/// current setting alone.
pub struct AuthConfig {
    /// Replace the active strategy set.
    pub strategies: Option<Vec<String>>,
    /// Where strategy names are resolved from.
    pub loader: Option<Arc<dyn StrategyLoader>>,
    /// Join the relay cluster. Only the first request has an effect.
    pub cluster: bool,
    /// Relay address used when `cluster` is set.
    pub cluster_addr: ClusterConfig,
    pub roles: Option<RolesConfig>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            strategies: None,
            loader: None,
            cluster: false,
            cluster_addr: ClusterConfig::from_env(),
            roles: None,
        }
    }
}

/// Snapshot of the configured options.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub cluster: bool,
    pub cluster_addr: Option<ClusterConfig>,
    pub roles: RolesConfig,
}

/// Dynamic authentication strategies for one worker process.
pub struct Authentication {
    connector: Arc<Connector>,
    loader: Arc<RwLock<Arc<dyn StrategyLoader>>>,
    settings: RwLock<Settings>,
    pub(crate) routes: RouteTable,
}

impl Authentication {
    pub fn new(loader: Arc<dyn StrategyLoader>) -> Arc<Self> {
        debug!("creating authentication controller");
        Arc::new(Self {
            connector: Connector::new(StrategySet::new()),
            loader: Arc::new(RwLock::new(loader)),
            settings: RwLock::new(Settings::default()),
            routes: RouteTable::new(),
        })
    }

    /// Apply `config`. Strategy load failures are returned after every other
    /// option has been applied.
    pub async fn configure(&self, config: AuthConfig) -> Result<(), LoadError> {
        if let Some(loader) = config.loader {
            *self.loader.write() = loader;
            self.routes.mark_reload();
        }

        if let Some(roles) = config.roles {
            self.settings.write().roles = roles;
        }

        let loaded = match config.strategies {
            Some(names) => self.set_strategies(names),
            None => Ok(()),
        };

        if config.cluster {
            self.enable_cluster(config.cluster_addr).await;
        }

        loaded
    }

    /// Join the relay cluster at the address given by the environment.
    pub async fn setup_cluster(&self) {
        self.enable_cluster(ClusterConfig::from_env()).await;
    }

    async fn enable_cluster(&self, addr: ClusterConfig) {
        {
            let mut settings = self.settings.write();
            if settings.cluster {
                return;
            }
            settings.cluster = true;
            settings.cluster_addr = Some(addr.clone());
        }

        // Unload modules for names another worker removed.
        let loader = Arc::clone(&self.loader);
        self.connector.on_remote_drop(move |names| {
            let loader = loader.read().clone();
            for name in names {
                loader.unload(name);
            }
        });

        let reload = self.routes.reload_flag();
        self.connector.on_change(move || reload.set());

        if let Err(e) = self.connector.connect(&addr).await {
            warn!(addr = %addr.addr(), err = %e, "strategy relay unreachable, clustering inactive");
        }
    }

    /// Replace the active strategies. Modules for names that are no longer
    /// active are unloaded; new names are loaded eagerly.
    pub fn set_strategies<I, S>(&self, names: I) -> Result<(), LoadError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: StrategySet = names.into_iter().collect();
        self.routes.mark_reload();

        let dropped = self.connector.set_strategies(names.clone(), self.clustered());
        let loader = self.loader();
        for name in &dropped {
            loader.unload(name);
        }
        load_all(loader.as_ref(), names.iter())
    }

    /// Activate one or more strategies.
    pub fn add_strategies<I, S>(&self, names: I) -> Result<(), LoadError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        self.routes.mark_reload();

        self.connector.add_strategies(names.iter().cloned(), self.clustered());
        load_all(self.loader().as_ref(), names.iter().map(String::as_str))
    }

    /// Deactivate one or more strategies. Returns the names that were active.
    pub fn remove_strategies<I, S>(&self, names: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.routes.mark_reload();

        let removed = self.connector.remove_strategies(names, self.clustered());
        let loader = self.loader();
        for name in &removed {
            loader.unload(name);
        }
        removed
    }

    /// Active strategy names in activation order.
    pub fn loaded_strategies(&self) -> Vec<String> {
        self.connector.loaded_strategies()
    }

    pub fn has(&self, name: &str) -> bool {
        self.connector.has(name)
    }

    /// Run `listener` whenever another worker changes the strategy set.
    pub fn on_change<F>(&self, listener: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.connector.on_change(listener);
    }

    /// Whether the relay link is up.
    pub fn is_connected(&self) -> bool {
        self.connector.is_connected()
    }

    pub fn settings(&self) -> Settings {
        self.settings.read().clone()
    }

    pub fn loader(&self) -> Arc<dyn StrategyLoader> {
        self.loader.read().clone()
    }

    /// Router serving the active strategies plus the admin load/unload
    /// routes. Rebuilt lazily on the first request after a change.
    pub fn router(self: &Arc<Self>) -> Router {
        crate::routes::router(Arc::clone(self))
    }

    fn clustered(&self) -> bool {
        self.settings.read().cluster
    }
}

/// Load every name, returning the first failure.
fn load_all<'a>(
    loader: &dyn StrategyLoader,
    names: impl IntoIterator<Item = &'a str>,
) -> Result<(), LoadError> {
    let mut first = None;
    for name in names {
        if let Err(e) = loader.load(name) {
            warn!(strategy = name, err = %e, "failed to load strategy");
            first.get_or_insert(e);
        }
    }
    first.map_or(Ok(()), Err)
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
