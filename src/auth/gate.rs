// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-route capability gate.
//!
//! Each mutating route declares the `(TargetType, Capability)` it needs. The
//! gate resolves the target from the `{id}` path segment, asks the permission
//! store, and either rejects the request or records the resolved [`Target`]
//! in the request extensions for the handler.
//!
//! ```rust,ignore
//! .route(
//!     "/v1/images/{id}",
//!     patch(update_image).layer(middleware::from_fn_with_state(
//!         PermissionGate::new(storage.permissions(), TargetType::Image, Capability::CanEdit),
//!         require_capability,
//!     )),
//! )
//! ```
//!
//! The gate must sit inside [`require_auth`](super::middleware::require_auth)
//! or [`optional_auth`](super::middleware::optional_auth) so the subject is
//! already known. Anonymous callers only pass a `CanView` gate on a public
//! target; everything else is `Unauthorized` for them.
//!
//! A target that does not exist holds no grants, so asking about it yields
//! `Forbidden` rather than leaking whether it exists.

use std::collections::HashMap;

use axum::{
    extract::{Path, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, warn};

use super::scope::{Capability, Target, TargetId, TargetType};
use super::{AuthError, AuthenticatedUser};
use crate::error::ApiError;
use crate::storage::PermissionStore;

/// Path parameter naming the target.
const TARGET_PARAM: &str = "id";

/// What a route requires of its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requirement {
    pub target_type: TargetType,
    pub capability: Capability,
}

/// Middleware state: the store to ask and the route's requirement.
#[derive(Clone)]
pub struct PermissionGate {
    permissions: PermissionStore,
    requirement: Requirement,
}

impl PermissionGate {
    pub fn new(
        permissions: PermissionStore,
        target_type: TargetType,
        capability: Capability,
    ) -> Self {
        Self {
            permissions,
            requirement: Requirement {
                target_type,
                capability,
            },
        }
    }

    pub fn requirement(&self) -> Requirement {
        self.requirement
    }

    /// Decide whether `subject` may proceed against `target`.
    pub fn check(&self, subject: Option<&AuthenticatedUser>, target: &Target) -> Result<(), AuthError> {
        let capability = self.requirement.capability;
        match subject {
            Some(user) => {
                if self.permissions.has(user.user_id, target, capability)? {
                    Ok(())
                } else {
                    debug!(
                        subject = user.user_id,
                        target = %target,
                        capability = %capability,
                        "Capability check failed"
                    );
                    Err(AuthError::Forbidden)
                }
            }
            None => {
                if capability == Capability::CanView && self.permissions.is_public(target)? {
                    Ok(())
                } else {
                    Err(AuthError::MissingAuthHeader)
                }
            }
        }
    }
}

/// Reject the request unless the caller holds the route's capability over
/// the target named in the path.
pub async fn require_capability(
    State(gate): State<PermissionGate>,
    Path(params): Path<HashMap<String, String>>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(raw_id) = params.get(TARGET_PARAM) else {
        warn!(path = %request.uri().path(), "Permission gate on a route without an id segment");
        return AuthError::Internal("permission gate without target parameter".into())
            .into_response();
    };

    let id = match raw_id.parse::<TargetId>() {
        Ok(id) => id,
        Err(e) => return ApiError::bad_request(e.to_string()).into_response(),
    };
    let target = Target::new(gate.requirement.target_type, id);

    let subject = request.extensions().get::<AuthenticatedUser>();
    if let Err(e) = gate.check(subject, &target) {
        return e.into_response();
    }

    request.extensions_mut().insert(target);
    next.run(request).await
}
