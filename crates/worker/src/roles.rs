// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Admin role check for the strategy management routes.
//!
//! Session handling lives in the host. Its session layer is expected to put
//! an [`AuthenticatedUser`] into the request extensions once the caller is
//! logged in.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::Authentication;
use crate::error::ErrorCode;

/// Which role grants admin rights, and where to find it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolesConfig {
    /// Field to read from object-shaped roles. `None` means roles are strings.
    #[serde(default)]
    pub property: Option<String>,
    /// Role name that grants admin rights.
    #[serde(default = "default_admin_role")]
    pub admin_role: String,
}

fn default_admin_role() -> String {
    "admin".to_owned()
}

impl Default for RolesConfig {
    fn default() -> Self {
        Self { property: None, admin_role: default_admin_role() }
    }
}

/// The logged-in caller, as resolved by the host's session layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    #[serde(default)]
    pub roles: Vec<Value>,
}

impl RolesConfig {
    /// Whether any of `user`'s roles is the admin role.
    pub fn is_admin(&self, user: &AuthenticatedUser) -> bool {
        user.roles.iter().any(|role| {
            let name = match &self.property {
                Some(property) => role.get(property).and_then(Value::as_str),
                None => role.as_str(),
            };
            name == Some(self.admin_role.as_str())
        })
    }
}

/// Axum middleware that only lets admins through.
pub async fn require_admin(
    State(auth): State<Arc<Authentication>>,
    req: Request,
    next: Next,
) -> Response {
    let allowed = match req.extensions().get::<AuthenticatedUser>() {
        Some(user) => auth.settings().roles.is_admin(user),
        None => false,
    };

    if !allowed {
        return ErrorCode::Unauthorized.respond("Unauthorized");
    }
    next.run(req).await
}

#[cfg(test)]
#[path = "roles_tests.rs"]
mod tests;
