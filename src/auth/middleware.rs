// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication middleware for Axum.
//!
//! Two pipeline stages, both installed with
//! `axum::middleware::from_fn_with_state(state, ...)`:
//!
//! - [`require_auth`]: the request must carry a valid access token. On
//!   success the [`AuthenticatedUser`] is inserted into the request
//!   extensions; on failure the request is rejected with 401 and the handler
//!   never runs.
//! - [`optional_auth`]: identity is attached when a valid access token is
//!   present. A missing or bad token is logged and ignored.
//!
//! ```rust,ignore
//! let protected = Router::new()
//!     .route("/v1/users/me", get(me))
//!     .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));
//! ```

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::debug;

use super::claims::TokenKind;
use super::{AuthError, AuthenticatedUser};
use crate::state::AppState;

/// Pull the bearer token out of the `Authorization` header.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let auth_header = headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingAuthHeader)?
        .to_str()
        .map_err(|_| AuthError::InvalidAuthHeader)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .ok_or(AuthError::InvalidAuthHeader)?;

    if token.is_empty() {
        return Err(AuthError::InvalidAuthHeader);
    }
    Ok(token)
}

/// Validate the request's access token against the key ring.
pub async fn authenticate(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<AuthenticatedUser, AuthError> {
    let token = bearer_token(headers)?;
    let verified = state.verifier.validate_kind(token, TokenKind::Access).await?;
    Ok(AuthenticatedUser::from(verified))
}

/// Reject the request unless it carries a valid access token.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    match authenticate(&state, request.headers()).await {
        Ok(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

/// Attach identity when present; never reject.
pub async fn optional_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    match authenticate(&state, request.headers()).await {
        Ok(user) => {
            request.extensions_mut().insert(user);
        }
        Err(AuthError::MissingAuthHeader) => {}
        Err(e) => debug!(reason = %e, "Ignoring invalid credentials on public route"),
    }
    next.run(request).await
}
