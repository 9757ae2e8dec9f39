// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # API Data Models
//!
//! Request and response bodies of the REST API. All types derive
//! `Serialize` or `Deserialize` plus `ToSchema` for automatic JSON handling
//! and OpenAPI documentation.
//!
//! Requests validate themselves with a `validate()` method that returns a
//! 422 [`ApiError`] describing the first problem found.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::{Capability, IssuedToken};
use crate::error::ApiError;
use crate::storage::{Grant, StoredImage, StoredUser};

const USERNAME_MAX_LEN: usize = 32;
const TITLE_MAX_LEN: usize = 200;
const MAX_TAGS: usize = 32;

fn validate_username(username: &str) -> Result<(), ApiError> {
    let username = username.trim();
    if username.len() < 3 || username.len() > USERNAME_MAX_LEN {
        return Err(ApiError::unprocessable(format!(
            "username must be 3 to {USERNAME_MAX_LEN} characters"
        )));
    }
    if !username
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    {
        return Err(ApiError::unprocessable(
            "username may only contain letters, digits, '_' and '-'",
        ));
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<(), ApiError> {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(ApiError::unprocessable("email address is invalid")),
    }
}

fn validate_title(title: &str) -> Result<(), ApiError> {
    let title = title.trim();
    if title.is_empty() || title.len() > TITLE_MAX_LEN {
        return Err(ApiError::unprocessable(format!(
            "title must be 1 to {TITLE_MAX_LEN} characters"
        )));
    }
    Ok(())
}

fn validate_tags(tags: &[String]) -> Result<(), ApiError> {
    if tags.len() > MAX_TAGS {
        return Err(ApiError::unprocessable(format!(
            "at most {MAX_TAGS} tags are allowed"
        )));
    }
    if tags.iter().any(|t| t.trim().is_empty()) {
        return Err(ApiError::unprocessable("tags must not be empty"));
    }
    Ok(())
}

// =============================================================================
// Session
// =============================================================================

/// Request body for `POST /v1/users`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    /// Display name
    #[serde(default)]
    pub name: Option<String>,
}

impl RegisterRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        validate_username(&self.username)?;
        validate_email(&self.email)
    }
}

/// A new user's record plus its first token pair.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SessionResponse {
    pub user: StoredUser,
    pub access_token: IssuedToken,
    pub refresh_token: IssuedToken,
}

/// Response for `POST /v1/auth/refresh`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RefreshResponse {
    pub access_token: IssuedToken,
}

// =============================================================================
// Users
// =============================================================================

/// Publicly visible part of a user record.
#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
pub struct UserProfile {
    pub id: u64,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<StoredUser> for UserProfile {
    fn from(user: StoredUser) -> Self {
        Self {
            id: user.id,
            username: user.username,
            name: user.name,
            bio: user.bio,
            created_at: user.created_at,
        }
    }
}

/// Request body for `PATCH /v1/users/{id}`. Absent fields are unchanged.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct UpdateUserRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
}

impl UpdateUserRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        match &self.email {
            Some(email) => validate_email(email),
            None => Ok(()),
        }
    }
}

// =============================================================================
// Images
// =============================================================================

/// Request body for `POST /v1/images`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateImageRequest {
    pub title: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Whether anyone may view the image
    #[serde(default)]
    pub public: bool,
}

impl CreateImageRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        validate_title(&self.title)?;
        validate_tags(&self.tags)
    }
}

/// Request body for `PATCH /v1/images/{id}`. Absent fields are unchanged.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct UpdateImageRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

impl UpdateImageRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        if let Some(title) = &self.title {
            validate_title(title)?;
        }
        if let Some(tags) = &self.tags {
            validate_tags(tags)?;
        }
        Ok(())
    }
}

/// Request body for `PUT /v1/images/{id}/visibility`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct VisibilityRequest {
    pub public: bool,
}

/// Request body for granting or revoking a capability on an image.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct GrantRequest {
    /// User receiving or losing the capability
    pub subject_id: u64,
    pub capability: Capability,
}

/// Image metadata plus its visibility.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ImageResponse {
    pub id: u64,
    pub owner_id: u64,
    pub title: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub public: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ImageResponse {
    pub fn new(image: StoredImage, public: bool) -> Self {
        Self {
            id: image.id,
            owner_id: image.owner_id,
            title: image.title,
            tags: image.tags,
            public,
            created_at: image.created_at,
            updated_at: image.updated_at,
        }
    }
}

/// Every explicit grant on an image.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GrantsResponse {
    pub grants: Vec<Grant>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_rules() {
        let ok = |u: &str| {
            RegisterRequest {
                username: u.into(),
                email: "a@example.com".into(),
                name: None,
            }
            .validate()
            .is_ok()
        };
        assert!(ok("alice"));
        assert!(ok("a_b-c"));
        assert!(!ok("al"));
        assert!(!ok("alice smith"));
        assert!(!ok(&"x".repeat(33)));
    }

    #[test]
    fn email_rules() {
        assert!(validate_email("a@example.com").is_ok());
        assert!(validate_email("a@localhost").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("example.com").is_err());
    }

    #[test]
    fn image_requests_validate_title_and_tags() {
        let request: CreateImageRequest =
            serde_json::from_str(r#"{"title":"Harbour at dusk"}"#).unwrap();
        assert!(request.validate().is_ok());
        assert!(!request.public);
        assert!(request.tags.is_empty());

        let blank: CreateImageRequest = serde_json::from_str(r#"{"title":"   "}"#).unwrap();
        assert_eq!(
            blank.validate().unwrap_err().status,
            axum::http::StatusCode::UNPROCESSABLE_ENTITY
        );

        let patch = UpdateImageRequest {
            tags: Some(vec!["".into()]),
            ..Default::default()
        };
        assert!(patch.validate().is_err());
    }

    #[test]
    fn grant_request_uses_snake_case_capabilities() {
        let request: GrantRequest =
            serde_json::from_str(r#"{"subject_id":7,"capability":"can_edit"}"#).unwrap();
        assert_eq!(request.subject_id, 7);
        assert_eq!(request.capability, Capability::CanEdit);
    }
}
