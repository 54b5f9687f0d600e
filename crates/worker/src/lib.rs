// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authmesh: runtime-switchable authentication strategies, kept in sync
//! across worker processes through the authmesh relay.

pub mod auth;
pub mod connector;
pub mod error;
pub mod roles;
pub mod routes;
pub mod strategy;

pub use authmesh_relay::config::ClusterConfig;
pub use authmesh_relay::StrategySet;

pub use crate::auth::{AuthConfig, Authentication, Settings};
pub use crate::connector::Connector;
pub use crate::error::LoadError;
pub use crate::roles::{AuthenticatedUser, RolesConfig};
pub use crate::strategy::{Strategy, StrategyLoader, StrategyRegistry};
