// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Strategy modules and the loader that resolves names to them.

use std::collections::HashMap;
use std::sync::Arc;

use axum::Router;
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::error::LoadError;

/// A pluggable authentication method that can be mounted as routes.
pub trait Strategy: Send + Sync {
    /// Routes this strategy serves (e.g. `POST /login`).
    fn routes(&self) -> Router;
}

impl<F> Strategy for F
where
    F: Fn() -> Router + Send + Sync,
{
    fn routes(&self) -> Router {
        self()
    }
}

/// Resolves strategy names to handlers.
pub trait StrategyLoader: Send + Sync {
    /// Resolve `name`. Repeated calls return the same instance until it is
    /// unloaded.
    fn load(&self, name: &str) -> Result<Arc<dyn Strategy>, LoadError>;

    /// Drop any cached instance for `name`. Never fails.
    fn unload(&self, name: &str);
}

type Factory = Arc<dyn Fn() -> Result<Arc<dyn Strategy>, LoadError> + Send + Sync>;
type Resolver = Arc<dyn Fn(&str) -> Result<Arc<dyn Strategy>, LoadError> + Send + Sync>;

/// Name → factory map with per-name instance caching.
///
/// Explicit registrations win; names without one fall through to the
/// optional resolver.
#[derive(Default)]
pub struct StrategyRegistry {
    factories: RwLock<HashMap<String, Factory>>,
    resolver: Option<Resolver>,
    loaded: Mutex<HashMap<String, Arc<dyn Strategy>>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry that resolves unregistered names with `resolver`.
    pub fn with_resolver<F>(resolver: F) -> Self
    where
        F: Fn(&str) -> Result<Arc<dyn Strategy>, LoadError> + Send + Sync + 'static,
    {
        Self { resolver: Some(Arc::new(resolver)), ..Self::default() }
    }

    /// Register a factory for `name`, replacing any previous one.
    pub fn register<S, F>(&self, name: impl Into<String>, factory: F)
    where
        S: Strategy + 'static,
        F: Fn() -> Result<S, LoadError> + Send + Sync + 'static,
    {
        let factory: Factory = Arc::new(move || factory().map(|s| Arc::new(s) as Arc<dyn Strategy>));
        self.factories.write().insert(name.into(), factory);
    }

    /// Whether an instance for `name` is currently cached.
    pub fn is_loaded(&self, name: &str) -> bool {
        self.loaded.lock().contains_key(name)
    }

    /// Names with a cached instance, sorted.
    pub fn loaded_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.loaded.lock().keys().cloned().collect();
        names.sort();
        names
    }

    fn construct(&self, name: &str) -> Result<Arc<dyn Strategy>, LoadError> {
        let factory = self.factories.read().get(name).cloned();
        match (factory, &self.resolver) {
            (Some(factory), _) => factory(),
            (None, Some(resolver)) => resolver(name),
            (None, None) => Err(LoadError::NotFound(name.to_owned())),
        }
    }
}

impl StrategyLoader for StrategyRegistry {
    fn load(&self, name: &str) -> Result<Arc<dyn Strategy>, LoadError> {
        if let Some(strategy) = self.loaded.lock().get(name) {
            return Ok(Arc::clone(strategy));
        }

        // Construct outside the lock; factories may be slow.
        let strategy = self.construct(name)?;
        debug!(strategy = name, "loaded strategy module");
        let mut loaded = self.loaded.lock();
        Ok(Arc::clone(loaded.entry(name.to_owned()).or_insert(strategy)))
    }

    fn unload(&self, name: &str) {
        if self.loaded.lock().remove(name).is_some() {
            debug!(strategy = name, "unloaded strategy module");
        }
    }
}

#[cfg(test)]
#[path = "strategy_tests.rs"]
mod tests;
