// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token claims and authenticated user representation.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Which flavor of token a claim set belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    /// Session credential accepted by protected routes
    Access,
    /// Renewal credential accepted only by the refresh endpoint
    Refresh,
}

/// Claims carried by every token this service issues or accepts.
///
/// `sub` is the decimal subject id (JWT subjects are strings).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject (user ID)
    pub sub: String,
    /// Issued at timestamp
    pub iat: i64,
    /// Expiration timestamp
    pub exp: i64,
    /// Token flavor
    pub kind: TokenKind,
}

/// Result of a successful token validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedToken {
    pub subject_id: u64,
    pub kind: TokenKind,
    pub issued_at: i64,
    pub expires_at: i64,
    /// Key identifier that verified the signature
    pub key_id: String,
}

/// Authenticated user information attached to the request.
///
/// This is the subject identity every later pipeline stage and handler reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AuthenticatedUser {
    /// Subject id from the verified token
    pub user_id: u64,

    /// Token expiration (Unix timestamp)
    pub expires_at: i64,
}

impl From<VerifiedToken> for AuthenticatedUser {
    fn from(token: VerifiedToken) -> Self {
        Self {
            user_id: token.subject_id,
            expires_at: token.expires_at,
        }
    }
}
