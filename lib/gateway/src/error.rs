// SPDX-FileCopyrightText: Copyright (c) 2024-2025 Archway Contributors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Gateway error kinds and their HTTP projections.
//!
//! Per-request failures are translated into HTTP responses at the routing
//! layer; background-loop failures are logged and absorbed; startup failures
//! propagate to the process entry point.

use axum::http::StatusCode;
use tonic::{Code, Status};

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Lookup for a logical service produced no match.
    #[error("service not found: {0}")]
    ServiceNotFound(String),

    /// Path, query, or body binding failed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The muxer for this service holds no live connections.
    #[error("no available connection")]
    NoAvailableConnection,

    /// A service with the same name was registered twice.
    #[error("service already registered: {0}")]
    DuplicateRegistration(String),

    /// A user-supplied binder or client constructor did not match the
    /// expected shape at registration time.
    #[error("contract violation: {0}")]
    ContractViolation(String),

    /// The downstream RPC failed.
    #[error("transport error: {0}")]
    Transport(#[from] Status),

    /// A discovery provider failed a poll; the loop continues.
    #[error("provider error: {0}")]
    ProviderTransient(String),
}

impl GatewayError {
    /// The HTTP status this error maps to when it surfaces on a request path.
    pub fn http_status(&self) -> StatusCode {
        match self {
            GatewayError::ServiceNotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            GatewayError::NoAvailableConnection => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Transport(status) => status_to_http(status.code()),
            GatewayError::DuplicateRegistration(_)
            | GatewayError::ContractViolation(_)
            | GatewayError::ProviderTransient(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Project this error into a gRPC status, for surfaces that speak
    /// status codes (e.g. the muxer's `RpcConn` impl).
    pub fn to_status(&self) -> Status {
        match self {
            GatewayError::ServiceNotFound(name) => Status::not_found(name.clone()),
            GatewayError::InvalidArgument(msg) => Status::invalid_argument(msg.clone()),
            GatewayError::NoAvailableConnection => Status::unavailable(self.to_string()),
            GatewayError::Transport(status) => status.clone(),
            other => Status::internal(other.to_string()),
        }
    }
}

/// The standard gRPC-status to HTTP-status table.
pub fn status_to_http(code: Code) -> StatusCode {
    match code {
        Code::Ok => StatusCode::OK,
        Code::InvalidArgument => StatusCode::BAD_REQUEST,
        Code::Unauthenticated => StatusCode::UNAUTHORIZED,
        Code::PermissionDenied => StatusCode::FORBIDDEN,
        Code::NotFound => StatusCode::NOT_FOUND,
        Code::AlreadyExists => StatusCode::CONFLICT,
        Code::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_table() {
        assert_eq!(status_to_http(Code::Ok), StatusCode::OK);
        assert_eq!(status_to_http(Code::InvalidArgument), StatusCode::BAD_REQUEST);
        assert_eq!(status_to_http(Code::Unauthenticated), StatusCode::UNAUTHORIZED);
        assert_eq!(status_to_http(Code::PermissionDenied), StatusCode::FORBIDDEN);
        assert_eq!(status_to_http(Code::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_to_http(Code::AlreadyExists), StatusCode::CONFLICT);
        assert_eq!(status_to_http(Code::Unavailable), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status_to_http(Code::Internal), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(status_to_http(Code::DataLoss), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_error_http_projection() {
        assert_eq!(
            GatewayError::NoAvailableConnection.http_status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            GatewayError::InvalidArgument("bad id".into()).http_status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            GatewayError::Transport(Status::not_found("missing")).http_status(),
            StatusCode::NOT_FOUND
        );
    }
}
