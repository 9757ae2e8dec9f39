// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token issuance and validation.
//!
//! ## Validation order
//!
//! 1. Decode the header and read its `kid` (nothing else is looked at yet).
//! 2. Resolve the key in the [`KeyRing`] (`UnknownKey`).
//! 3. Verify the signature over the whole token (`BadSignature`).
//! 4. Only now deserialize the claims and compare `exp` with the clock
//!    (`Expired` unless `now < exp`).

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, Validation};
use serde::Serialize;
use utoipa::ToSchema;

use super::claims::{TokenClaims, TokenKind, VerifiedToken};
use super::error::AuthError;
use super::keyring::KeyRing;

/// Default access token lifetime (16 hours).
pub const DEFAULT_SESSION_LIFETIME: Duration = Duration::from_secs(16 * 60 * 60);

/// Default renewal window (15 minutes).
pub const DEFAULT_REFRESH_WINDOW: Duration = Duration::from_secs(15 * 60);

/// Lifetimes applied when minting tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenPolicy {
    /// Access token lifetime
    pub session_lifetime: Duration,
    /// Extra lifetime a refresh token gets past the access token it pairs with
    pub refresh_window: Duration,
}

impl Default for TokenPolicy {
    fn default() -> Self {
        Self {
            session_lifetime: DEFAULT_SESSION_LIFETIME,
            refresh_window: DEFAULT_REFRESH_WINDOW,
        }
    }
}

impl TokenPolicy {
    fn lifetime_secs(&self, kind: TokenKind) -> Option<i64> {
        let lifetime = match kind {
            TokenKind::Access => Some(self.session_lifetime),
            TokenKind::Refresh => self.session_lifetime.checked_add(self.refresh_window),
        }?;
        i64::try_from(lifetime.as_secs()).ok()
    }
}

/// A freshly minted token.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct IssuedToken {
    /// Signed bearer token
    pub token: String,
    pub kind: TokenKind,
    /// Expiration (Unix timestamp)
    pub expires_at: i64,
}

/// Issues and validates bearer tokens against the shared key ring.
#[derive(Clone)]
pub struct TokenVerifier {
    ring: Arc<KeyRing>,
    policy: TokenPolicy,
}

impl TokenVerifier {
    pub fn new(ring: Arc<KeyRing>, policy: TokenPolicy) -> Self {
        Self { ring, policy }
    }

    pub fn ring(&self) -> &Arc<KeyRing> {
        &self.ring
    }

    pub fn policy(&self) -> TokenPolicy {
        self.policy
    }

    /// Mint a token for `subject_id` signed with the service key.
    pub fn issue(&self, subject_id: u64, kind: TokenKind) -> Result<IssuedToken, AuthError> {
        self.issue_at(subject_id, kind, Utc::now().timestamp())
    }

    /// Mint a token as if the clock read `now`.
    pub fn issue_at(
        &self,
        subject_id: u64,
        kind: TokenKind,
        now: i64,
    ) -> Result<IssuedToken, AuthError> {
        let exp = self
            .policy
            .lifetime_secs(kind)
            .and_then(|lifetime| now.checked_add(lifetime))
            .ok_or_else(|| AuthError::Internal(format!("{kind:?} token expiry overflows")))?;
        let claims = TokenClaims {
            sub: subject_id.to_string(),
            iat: now,
            exp,
            kind,
        };
        let token = self.ring.sign(&claims)?;
        Ok(IssuedToken {
            token,
            kind,
            expires_at: claims.exp,
        })
    }

    /// Validate a token against the current time.
    pub async fn validate(&self, token: &str) -> Result<VerifiedToken, AuthError> {
        self.validate_at(token, Utc::now().timestamp()).await
    }

    /// Validate a token as if the clock read `now`.
    pub async fn validate_at(&self, token: &str, now: i64) -> Result<VerifiedToken, AuthError> {
        let header = decode_header(token).map_err(|_| AuthError::Malformed)?;
        let key_id = header.kid.ok_or(AuthError::Malformed)?;

        let entry = self.ring.verifying_key(&key_id).await?;

        // Expiry is checked below with a strict `now < exp`, after the
        // signature has been verified.
        let mut validation = Validation::new(entry.algorithm);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let data = decode::<TokenClaims>(token, &entry.key, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                    AuthError::BadSignature
                }
                _ => AuthError::Malformed,
            }
        })?;
        let claims = data.claims;

        if now >= claims.exp {
            return Err(AuthError::Expired);
        }

        let subject_id = claims.sub.parse::<u64>().map_err(|_| AuthError::Malformed)?;

        Ok(VerifiedToken {
            subject_id,
            kind: claims.kind,
            issued_at: claims.iat,
            expires_at: claims.exp,
            key_id,
        })
    }

    /// Validate and require a particular token kind.
    pub async fn validate_kind(
        &self,
        token: &str,
        expected: TokenKind,
    ) -> Result<VerifiedToken, AuthError> {
        let verified = self.validate(token).await?;
        if verified.kind != expected {
            return Err(AuthError::WrongTokenKind);
        }
        Ok(verified)
    }
}
