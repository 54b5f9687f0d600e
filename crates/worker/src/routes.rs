// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lazily rebuilt strategy routes and the admin load/unload endpoints.
//!
//! Any change to the strategy set only raises the reload flag. The next
//! request rebuilds the table: active strategies are loaded and their
//! routers tried in activation order until one of them matches.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, Request, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use bytes::Bytes;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tower::ServiceExt;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use crate::auth::Authentication;
use crate::roles::require_admin;

/// Largest request body buffered for strategy dispatch.
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Shared "routes need reload" flag.
#[derive(Debug, Clone)]
pub struct ReloadFlag(Arc<AtomicBool>);

impl ReloadFlag {
    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub(crate) fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

#[derive(Default)]
struct Mounted {
    names: Vec<String>,
    routers: Arc<Vec<Router>>,
}

/// The current strategy routers, rebuilt on demand.
pub struct RouteTable {
    pub(crate) reload: ReloadFlag,
    mounted: Mutex<Mounted>,
}

impl RouteTable {
    pub(crate) fn new() -> Self {
        Self { reload: ReloadFlag(Arc::new(AtomicBool::new(true))), mounted: Mutex::default() }
    }

    pub fn mark_reload(&self) {
        self.reload.set();
    }

    pub fn needs_reload(&self) -> bool {
        self.reload.is_set()
    }

    pub fn reload_flag(&self) -> ReloadFlag {
        self.reload.clone()
    }

    /// Names of the strategies in the current table.
    pub fn mounted(&self) -> Vec<String> {
        self.mounted.lock().names.clone()
    }

    /// Current routers, rebuilding first if the flag is raised.
    fn current(&self, auth: &Authentication) -> Arc<Vec<Router>> {
        let mut mounted = self.mounted.lock();
        if self.reload.take() {
            debug!("reloading strategy routes");
            *mounted = build(auth, &mounted.names);
        }
        Arc::clone(&mounted.routers)
    }
}

/// Load every active strategy and unload ones that went away since the
/// last build. Strategies that fail to load are left out.
fn build(auth: &Authentication, previous: &[String]) -> Mounted {
    let active = auth.loaded_strategies();
    let loader = auth.loader();

    for name in previous.iter().filter(|name| !active.contains(name)) {
        loader.unload(name);
    }

    let mut names = Vec::with_capacity(active.len());
    let mut routers = Vec::with_capacity(active.len());
    for name in active {
        match loader.load(&name) {
            Ok(strategy) => {
                routers.push(strategy.routes().fallback(unmatched));
                names.push(name);
            }
            Err(e) => warn!(strategy = %name, err = %e, "skipping strategy routes"),
        }
    }

    Mounted { names, routers: Arc::new(routers) }
}

/// Marks a response produced by a strategy router's fallback.
#[derive(Debug, Clone, Copy)]
struct Unmatched;

async fn unmatched() -> Response {
    let mut res = StatusCode::NOT_FOUND.into_response();
    res.extensions_mut().insert(Unmatched);
    res
}

/// Body of the admin endpoint responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyResponse {
    pub message: String,
    pub status: String,
}

impl StrategyResponse {
    fn new(message: String, status: &str) -> Json<Self> {
        Json(Self { message, status: status.to_owned() })
    }
}

/// Build the router for `auth`.
pub fn router(auth: Arc<Authentication>) -> Router {
    Router::new()
        .route("/load/{strategy}", get(load_strategy))
        .route("/unload/{strategy}", get(unload_strategy))
        .route_layer(middleware::from_fn_with_state(Arc::clone(&auth), require_admin))
        .fallback(dispatch)
        .layer(TraceLayer::new_for_http())
        .with_state(auth)
}

/// `GET /load/{strategy}`: activate a strategy.
async fn load_strategy(
    State(auth): State<Arc<Authentication>>,
    Path(strategy): Path<String>,
) -> Response {
    let result = if auth.has(&strategy) {
        auth.loader().load(&strategy).map(|_| ())
    } else {
        auth.add_strategies([strategy.as_str()])
    };

    match result {
        Ok(()) => {
            debug!(%strategy, "enabled strategy");
            StrategyResponse::new(format!("{strategy} authentication enabled"), "ok")
                .into_response()
        }
        Err(e) => e.into_response(),
    }
}

/// `GET /unload/{strategy}`: deactivate a strategy.
async fn unload_strategy(
    State(auth): State<Arc<Authentication>>,
    Path(strategy): Path<String>,
) -> Json<StrategyResponse> {
    if auth.remove_strategies([strategy.as_str()]).is_empty() {
        return StrategyResponse::new(format!("{strategy} authentication not found"), "not found");
    }
    debug!(%strategy, "removed strategy");
    StrategyResponse::new(format!("{strategy} authentication removed"), "ok")
}

/// Fallback: run the request through each strategy router in turn.
async fn dispatch(State(auth): State<Arc<Authentication>>, req: Request) -> Response {
    let routers = auth.routes.current(&auth);
    if routers.is_empty() {
        return StatusCode::NOT_FOUND.into_response();
    }

    let (parts, body) = req.into_parts();
    let body = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(body) => body,
        Err(e) => {
            debug!(err = %e, "failed to buffer request body");
            return StatusCode::PAYLOAD_TOO_LARGE.into_response();
        }
    };

    // A path owned by one strategy under another method must not hide a
    // later strategy serving that method. The 405 only wins if none does.
    let mut wrong_method = None;
    for router in routers.iter() {
        let res = match router.clone().oneshot(rebuild_request(&parts, &body)).await {
            Ok(res) => res,
            Err(never) => match never {},
        };
        if res.extensions().get::<Unmatched>().is_some() {
            continue;
        }
        if res.status() == StatusCode::METHOD_NOT_ALLOWED {
            wrong_method.get_or_insert(res);
            continue;
        }
        return res;
    }

    wrong_method.unwrap_or_else(|| StatusCode::NOT_FOUND.into_response())
}

fn rebuild_request(parts: &Parts, body: &Bytes) -> Request {
    let mut req = Request::new(Body::from(body.clone()));
    *req.method_mut() = parts.method.clone();
    *req.uri_mut() = parts.uri.clone();
    *req.version_mut() = parts.version;
    *req.headers_mut() = parts.headers.clone();
    *req.extensions_mut() = parts.extensions.clone();
    req
}

#[cfg(test)]
#[path = "routes_tests.rs"]
mod tests;
