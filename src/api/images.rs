// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Image metadata endpoints.
//!
//! Every route below except creation sits behind a capability gate that has
//! already resolved the image target into the request extensions.

use axum::{extract::State, http::StatusCode, Extension, Json};
use tracing::{debug, info};

use crate::auth::{Auth, Target};
use crate::error::ApiError;
use crate::models::{
    CreateImageRequest, GrantRequest, GrantsResponse, ImageResponse, UpdateImageRequest,
    VisibilityRequest,
};
use crate::state::AppState;
use crate::storage::{ImagePatch, NewImage, StorageError, StoredImage};

fn image_id(target: &Target) -> Result<u64, ApiError> {
    target
        .numeric_id()
        .ok_or_else(|| ApiError::not_found(format!("Image {} not found", target.id)))
}

fn require_owner(image: &StoredImage, caller_id: u64) -> Result<(), ApiError> {
    if image.owner_id == caller_id {
        Ok(())
    } else {
        debug!(image_id = image.id, caller = caller_id, "Grant change by non-owner refused");
        Err(ApiError::forbidden("Only the owner can change grants"))
    }
}

fn load(state: &AppState, target: &Target) -> Result<(StoredImage, bool), ApiError> {
    let image = state.storage.images().get(image_id(target)?)?;
    let public = state.storage.permissions().is_public(target)?;
    Ok((image, public))
}

/// Create image metadata owned by the caller.
///
/// The record, the owner's grants and the public flag commit together.
/// The caller needs a user record: a token that outlived its user (deleted
/// account) cannot create images.
#[utoipa::path(
    post,
    path = "/v1/images",
    tag = "Images",
    security(("bearer" = [])),
    request_body = CreateImageRequest,
    responses(
        (status = 201, description = "Image created", body = ImageResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Caller has no user record"),
        (status = 422, description = "Invalid image data"),
    )
)]
pub async fn create_image(
    Auth(user): Auth,
    State(state): State<AppState>,
    Json(request): Json<CreateImageRequest>,
) -> Result<(StatusCode, Json<ImageResponse>), ApiError> {
    request.validate()?;

    let storage = &state.storage;
    if let Err(e) = storage.users().get(user.user_id) {
        return Err(match e {
            StorageError::NotFound(_) => ApiError::forbidden("Caller has no user record"),
            other => other.into(),
        });
    }

    let txn = storage.begin_write()?;
    let image = storage.images().insert(
        &txn,
        user.user_id,
        NewImage {
            title: request.title.trim().to_string(),
            tags: request.tags,
        },
    )?;
    storage
        .permissions()
        .grant_owner(&txn, user.user_id, &Target::image(image.id), request.public)?;
    storage.commit(txn)?;

    info!(image_id = image.id, owner_id = user.user_id, public = request.public, "Image created");
    Ok((
        StatusCode::CREATED,
        Json(ImageResponse::new(image, request.public)),
    ))
}

/// Get image metadata. Requires `can_view`; anonymous callers only see
/// public images.
#[utoipa::path(
    get,
    path = "/v1/images/{id}",
    tag = "Images",
    params(("id" = u64, Path, description = "Image id")),
    responses(
        (status = 200, description = "Image metadata", body = ImageResponse),
        (status = 401, description = "Private image and no credentials"),
        (status = 403, description = "Caller lacks can_view on this image"),
    )
)]
pub async fn get_image(
    State(state): State<AppState>,
    Extension(target): Extension<Target>,
) -> Result<Json<ImageResponse>, ApiError> {
    let (image, public) = load(&state, &target)?;
    Ok(Json(ImageResponse::new(image, public)))
}

/// Update image metadata. Requires `can_edit`.
#[utoipa::path(
    patch,
    path = "/v1/images/{id}",
    tag = "Images",
    security(("bearer" = [])),
    params(("id" = u64, Path, description = "Image id")),
    request_body = UpdateImageRequest,
    responses(
        (status = 200, description = "Updated image", body = ImageResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Caller lacks can_edit on this image"),
    )
)]
pub async fn update_image(
    State(state): State<AppState>,
    Extension(target): Extension<Target>,
    Json(request): Json<UpdateImageRequest>,
) -> Result<Json<ImageResponse>, ApiError> {
    request.validate()?;
    let id = image_id(&target)?;

    let storage = &state.storage;
    let txn = storage.begin_write()?;
    let image = storage.images().update(
        &txn,
        id,
        ImagePatch {
            title: request.title.map(|t| t.trim().to_string()),
            tags: request.tags,
        },
    )?;
    storage.commit(txn)?;

    let public = storage.permissions().is_public(&target)?;
    Ok(Json(ImageResponse::new(image, public)))
}

/// Make an image public or private. Requires `can_edit`.
#[utoipa::path(
    put,
    path = "/v1/images/{id}/visibility",
    tag = "Images",
    security(("bearer" = [])),
    params(("id" = u64, Path, description = "Image id")),
    request_body = VisibilityRequest,
    responses(
        (status = 200, description = "Image with its new visibility", body = ImageResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Caller lacks can_edit on this image"),
    )
)]
pub async fn set_visibility(
    State(state): State<AppState>,
    Extension(target): Extension<Target>,
    Json(request): Json<VisibilityRequest>,
) -> Result<Json<ImageResponse>, ApiError> {
    let image = state.storage.images().get(image_id(&target)?)?;

    let storage = &state.storage;
    let txn = storage.begin_write()?;
    storage
        .permissions()
        .set_public(&txn, &target, request.public)?;
    storage.commit(txn)?;

    info!(image_id = image.id, public = request.public, "Image visibility changed");
    Ok(Json(ImageResponse::new(image, request.public)))
}

/// Grant a capability on an image to another user.
///
/// Passing the `can_edit` gate is not enough: only the owner may change
/// grants, so an editor cannot hand itself `can_delete`.
#[utoipa::path(
    post,
    path = "/v1/images/{id}/grants",
    tag = "Images",
    security(("bearer" = [])),
    params(("id" = u64, Path, description = "Image id")),
    request_body = GrantRequest,
    responses(
        (status = 200, description = "All grants on the image", body = GrantsResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Caller is not the image owner"),
        (status = 404, description = "Subject does not exist"),
    )
)]
pub async fn add_grant(
    Auth(caller): Auth,
    State(state): State<AppState>,
    Extension(target): Extension<Target>,
    Json(request): Json<GrantRequest>,
) -> Result<Json<GrantsResponse>, ApiError> {
    let storage = &state.storage;
    let image = storage.images().get(image_id(&target)?)?;
    require_owner(&image, caller.user_id)?;
    storage.users().get(request.subject_id)?;

    let txn = storage.begin_write()?;
    storage
        .permissions()
        .grant(&txn, request.subject_id, &target, request.capability)?;
    storage.commit(txn)?;

    info!(
        target = %target,
        subject = request.subject_id,
        capability = %request.capability,
        granted_by = caller.user_id,
        "Capability granted"
    );
    Ok(Json(GrantsResponse {
        grants: storage.permissions().grants_for(&target)?,
    }))
}

/// Revoke a capability on an image. Only the owner may revoke, and the
/// owner's own grants cannot be revoked this way.
#[utoipa::path(
    delete,
    path = "/v1/images/{id}/grants",
    tag = "Images",
    security(("bearer" = [])),
    params(("id" = u64, Path, description = "Image id")),
    request_body = GrantRequest,
    responses(
        (status = 200, description = "All grants on the image", body = GrantsResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Caller is not the image owner"),
        (status = 409, description = "Attempt to revoke the owner's grants"),
    )
)]
pub async fn remove_grant(
    Auth(caller): Auth,
    State(state): State<AppState>,
    Extension(target): Extension<Target>,
    Json(request): Json<GrantRequest>,
) -> Result<Json<GrantsResponse>, ApiError> {
    let storage = &state.storage;
    let image = storage.images().get(image_id(&target)?)?;
    require_owner(&image, caller.user_id)?;
    if request.subject_id == image.owner_id {
        return Err(ApiError::conflict("The owner's grants cannot be revoked"));
    }

    let txn = storage.begin_write()?;
    storage
        .permissions()
        .revoke(&txn, request.subject_id, &target, request.capability)?;
    storage.commit(txn)?;

    info!(
        target = %target,
        subject = request.subject_id,
        capability = %request.capability,
        revoked_by = caller.user_id,
        "Capability revoked"
    );
    Ok(Json(GrantsResponse {
        grants: storage.permissions().grants_for(&target)?,
    }))
}

/// Delete an image. Requires `can_delete`; removes every grant on it.
#[utoipa::path(
    delete,
    path = "/v1/images/{id}",
    tag = "Images",
    security(("bearer" = [])),
    params(("id" = u64, Path, description = "Image id")),
    responses(
        (status = 204, description = "Image deleted"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Caller lacks can_delete on this image"),
    )
)]
pub async fn delete_image(
    Auth(caller): Auth,
    State(state): State<AppState>,
    Extension(target): Extension<Target>,
) -> Result<StatusCode, ApiError> {
    let id = image_id(&target)?;

    let storage = &state.storage;
    let txn = storage.begin_write()?;
    storage.images().delete(&txn, id)?;
    let cleared = storage.permissions().clear_target(&txn, &target)?;
    storage.commit(txn)?;

    info!(image_id = id, deleted_by = caller.user_id, grants_cleared = cleared, "Image deleted");
    Ok(StatusCode::NO_CONTENT)
}
