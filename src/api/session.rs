// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token renewal endpoint.

use axum::{extract::State, http::HeaderMap, Json};
use tracing::info;

use crate::auth::middleware::bearer_token;
use crate::auth::{AuthError, TokenKind};
use crate::models::RefreshResponse;
use crate::state::AppState;

/// Exchange a refresh token for a new access token.
///
/// The refresh token goes in the `Authorization` header. Access tokens are
/// refused here, and refresh tokens are refused everywhere else.
#[utoipa::path(
    post,
    path = "/v1/auth/refresh",
    tag = "Session",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "New access token", body = RefreshResponse),
        (status = 401, description = "Missing, invalid, expired or non-refresh token"),
    )
)]
pub async fn refresh_session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<RefreshResponse>, AuthError> {
    let token = bearer_token(&headers)?;
    let verified = state
        .verifier
        .validate_kind(token, TokenKind::Refresh)
        .await?;

    let access_token = state.verifier.issue(verified.subject_id, TokenKind::Access)?;
    info!(user_id = verified.subject_id, "Access token renewed");

    Ok(Json(RefreshResponse { access_token }))
}
