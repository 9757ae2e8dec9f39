// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use tracing::{debug, info};

use crate::auth::{Auth, OptionalAuth, Target, TokenKind};
use crate::error::ApiError;
use crate::models::{RegisterRequest, SessionResponse, UpdateUserRequest, UserProfile};
use crate::state::AppState;
use crate::storage::{NewUser, StoredUser, UserPatch};

fn user_id(target: &Target) -> Result<u64, ApiError> {
    target
        .numeric_id()
        .ok_or_else(|| ApiError::not_found(format!("User {} not found", target.id)))
}

/// Register a new user.
///
/// The user record, its owner grants over itself (`can_edit`, `can_delete`)
/// and its public flag are written in one transaction. A token pair is
/// issued once that transaction has committed.
#[utoipa::path(
    post,
    path = "/v1/users",
    tag = "Users",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered", body = SessionResponse),
        (status = 409, description = "Username or email already registered"),
        (status = 422, description = "Invalid registration data"),
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<SessionResponse>), ApiError> {
    request.validate()?;

    let storage = &state.storage;
    let txn = storage.begin_write()?;
    let user = storage.users().insert(
        &txn,
        NewUser {
            username: request.username,
            email: request.email,
            name: request.name,
        },
    )?;
    storage
        .permissions()
        .grant_owner(&txn, user.id, &Target::user(user.id), true)?;
    storage.commit(txn)?;

    info!(user_id = user.id, username = %user.username, "User registered");

    let access_token = state.verifier.issue(user.id, TokenKind::Access)?;
    let refresh_token = state.verifier.issue(user.id, TokenKind::Refresh)?;

    Ok((
        StatusCode::CREATED,
        Json(SessionResponse {
            user,
            access_token,
            refresh_token,
        }),
    ))
}

/// Get the current authenticated user's record.
#[utoipa::path(
    get,
    path = "/v1/users/me",
    tag = "Users",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "User information", body = StoredUser),
        (status = 401, description = "Unauthorized - invalid or missing token"),
        (status = 404, description = "Token subject has no user record"),
    )
)]
pub async fn get_current_user(
    Auth(user): Auth,
    State(state): State<AppState>,
) -> Result<Json<StoredUser>, ApiError> {
    Ok(Json(state.storage.users().get(user.user_id)?))
}

/// Get a user's public profile. Authentication is optional.
#[utoipa::path(
    get,
    path = "/v1/users/{id}",
    tag = "Users",
    params(("id" = u64, Path, description = "User id")),
    responses(
        (status = 200, description = "Public profile", body = UserProfile),
        (status = 404, description = "User not found"),
    )
)]
pub async fn get_user(
    OptionalAuth(viewer): OptionalAuth,
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<UserProfile>, ApiError> {
    let user = state.storage.users().get(id)?;
    debug!(
        user_id = id,
        viewer = viewer.map(|v| v.user_id),
        "Profile read"
    );
    Ok(Json(user.into()))
}

/// Update a user's profile. Requires `can_edit` on the user.
#[utoipa::path(
    patch,
    path = "/v1/users/{id}",
    tag = "Users",
    security(("bearer" = [])),
    params(("id" = u64, Path, description = "User id")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "Updated user", body = StoredUser),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Caller lacks can_edit on this user"),
        (status = 409, description = "Email already registered"),
    )
)]
pub async fn update_user(
    State(state): State<AppState>,
    Extension(target): Extension<Target>,
    Json(request): Json<UpdateUserRequest>,
) -> Result<Json<StoredUser>, ApiError> {
    request.validate()?;
    let id = user_id(&target)?;

    let storage = &state.storage;
    let txn = storage.begin_write()?;
    let user = storage.users().update(
        &txn,
        id,
        UserPatch {
            email: request.email,
            name: request.name,
            bio: request.bio,
        },
    )?;
    storage.commit(txn)?;

    Ok(Json(user))
}

/// Delete a user. Requires `can_delete` on the user.
///
/// Every grant on the user and its public flag are removed in the same
/// transaction as the record. Images the user owns keep their grants, and
/// tokens already issued to the user stay valid until they expire: they
/// still pass authentication and those image grants, but can no longer
/// create images.
#[utoipa::path(
    delete,
    path = "/v1/users/{id}",
    tag = "Users",
    security(("bearer" = [])),
    params(("id" = u64, Path, description = "User id")),
    responses(
        (status = 204, description = "User deleted"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Caller lacks can_delete on this user"),
    )
)]
pub async fn delete_user(
    Auth(caller): Auth,
    State(state): State<AppState>,
    Extension(target): Extension<Target>,
) -> Result<StatusCode, ApiError> {
    let id = user_id(&target)?;

    let storage = &state.storage;
    let txn = storage.begin_write()?;
    storage.users().delete(&txn, id)?;
    let cleared = storage.permissions().clear_target(&txn, &target)?;
    storage.commit(txn)?;

    info!(user_id = id, deleted_by = caller.user_id, grants_cleared = cleared, "User deleted");
    Ok(StatusCode::NO_CONTENT)
}
