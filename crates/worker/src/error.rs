// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A strategy name the loader could not turn into a handler.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    #[error("no strategy module for {0:?}")]
    NotFound(String),
    #[error("strategy {name:?} failed to initialise: {reason}")]
    Init { name: String, reason: String },
}

impl LoadError {
    pub fn name(&self) -> &str {
        match self {
            Self::NotFound(name) | Self::Init { name, .. } => name,
        }
    }
}

/// Machine-readable codes the admin routes answer with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Unauthorized,
    StrategyNotFound,
}

impl ErrorCode {
    pub fn status(self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::StrategyNotFound => StatusCode::NOT_FOUND,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::StrategyNotFound => "STRATEGY_NOT_FOUND",
        }
    }

    /// JSON error envelope with this code's status.
    pub fn respond(self, message: impl Into<String>) -> Response {
        let body = ErrorResponse {
            error: ErrorBody { code: self.as_str().to_owned(), message: message.into() },
        };
        (self.status(), Json(body)).into_response()
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl IntoResponse for LoadError {
    fn into_response(self) -> Response {
        ErrorCode::StrategyNotFound.respond(self.to_string())
    }
}

/// `{"error": {...}}` as returned by the admin routes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
