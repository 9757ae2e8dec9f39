// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication and authorization errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Authentication error type.
///
/// The `Display` text is for logs only. Clients receive the generic
/// [`public_message`](AuthError::public_message) and [`error_code`](AuthError::error_code),
/// which never name key identifiers or store failures.
#[derive(Debug)]
pub enum AuthError {
    /// No authorization header present
    MissingAuthHeader,
    /// Invalid authorization header format
    InvalidAuthHeader,
    /// Token cannot be parsed
    Malformed,
    /// Key identifier not present in the key ring
    UnknownKey(String),
    /// Signature does not verify against the key
    BadSignature,
    /// Token is past its expiry
    Expired,
    /// Access token where a refresh token is required, or the reverse
    WrongTokenKind,
    /// Subject lacks the capability required by the route
    Forbidden,
    /// Identity provider key fetch failed
    UpstreamUnavailable(String),
    /// Permission store read or write failed
    StoreFailure(String),
    /// Internal error
    Internal(String),
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: &'static str,
    error_code: &'static str,
}

impl AuthError {
    /// Get the client-facing error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self.status_code() {
            StatusCode::UNAUTHORIZED => "unauthorized",
            StatusCode::FORBIDDEN => "forbidden",
            _ => "internal_error",
        }
    }

    /// Get the client-facing message for this error.
    pub fn public_message(&self) -> &'static str {
        match self.status_code() {
            StatusCode::UNAUTHORIZED => "Authentication required",
            StatusCode::FORBIDDEN => "Insufficient permissions for this operation",
            _ => "Internal server error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MissingAuthHeader
            | AuthError::InvalidAuthHeader
            | AuthError::Malformed
            | AuthError::UnknownKey(_)
            | AuthError::BadSignature
            | AuthError::Expired
            | AuthError::WrongTokenKind => StatusCode::UNAUTHORIZED,
            AuthError::Forbidden => StatusCode::FORBIDDEN,
            AuthError::UpstreamUnavailable(_)
            | AuthError::StoreFailure(_)
            | AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::MissingAuthHeader => write!(f, "Authorization header is required"),
            AuthError::InvalidAuthHeader => {
                write!(f, "Invalid authorization header format (expected 'Bearer <token>')")
            }
            AuthError::Malformed => write!(f, "Token is malformed"),
            AuthError::UnknownKey(kid) => write!(f, "No trusted key with id {kid}"),
            AuthError::BadSignature => write!(f, "Token signature is invalid"),
            AuthError::Expired => write!(f, "Token has expired"),
            AuthError::WrongTokenKind => write!(f, "Token kind not accepted here"),
            AuthError::Forbidden => write!(f, "Subject lacks the required capability"),
            AuthError::UpstreamUnavailable(msg) => {
                write!(f, "Identity provider unavailable: {msg}")
            }
            AuthError::StoreFailure(msg) => write!(f, "Permission store failure: {msg}"),
            AuthError::Internal(msg) => write!(f, "Internal authentication error: {msg}"),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<crate::storage::StorageError> for AuthError {
    fn from(e: crate::storage::StorageError) -> Self {
        AuthError::StoreFailure(e.to_string())
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request rejected by auth pipeline");
        } else {
            tracing::debug!(error = %self, status = %status, "Request rejected by auth pipeline");
        }
        let body = Json(AuthErrorBody {
            error: self.public_message(),
            error_code: self.error_code(),
        });
        (status, body).into_response()
    }
}
