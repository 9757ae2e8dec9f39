// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! HTTP surface.
//!
//! ## Pipeline
//!
//! Outermost first, every request passes through:
//!
//! 1. request id (`x-request-id`, generated when absent)
//! 2. tracing span
//! 3. processing timeout (408 once exceeded)
//! 4. CORS
//! 5. per-route auth stage: `require_auth` or `optional_auth`
//! 6. per-route capability gate: `(TargetType, Capability)`
//! 7. handler
//!
//! A rejection in stage 5 or 6 ends the request; the handler never runs.

use std::time::Duration;

use axum::{
    http::StatusCode,
    middleware,
    routing::{delete, get, patch, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    auth::{
        optional_auth, require_auth, require_capability, Capability, IssuedToken,
        PermissionGate, TargetType, TokenKind,
    },
    models::{
        CreateImageRequest, GrantRequest, GrantsResponse, ImageResponse, RefreshResponse,
        RegisterRequest, SessionResponse, UpdateImageRequest, UpdateUserRequest, UserProfile,
        VisibilityRequest,
    },
    state::AppState,
    storage::{Grant, StoredUser},
};

pub mod health;
pub mod images;
pub mod session;
pub mod users;

/// Capability gate layer for one route.
macro_rules! gate {
    ($state:expr, $target_type:expr, $capability:expr) => {
        middleware::from_fn_with_state(
            PermissionGate::new($state.storage.permissions(), $target_type, $capability),
            require_capability,
        )
    };
}

pub fn router(state: AppState, request_timeout: Duration) -> Router {
    // Routes that require a valid access token.
    let authenticated = Router::new()
        .route("/users/me", get(users::get_current_user))
        // One route per method: a MethodRouter layer wraps every method
        // registered before it, and each method needs its own capability.
        .route(
            "/users/{id}",
            patch(users::update_user).layer(gate!(state, TargetType::User, Capability::CanEdit)),
        )
        .route(
            "/users/{id}",
            delete(users::delete_user)
                .layer(gate!(state, TargetType::User, Capability::CanDelete)),
        )
        .route("/images", post(images::create_image))
        .route(
            "/images/{id}",
            patch(images::update_image)
                .layer(gate!(state, TargetType::Image, Capability::CanEdit)),
        )
        .route(
            "/images/{id}",
            delete(images::delete_image)
                .layer(gate!(state, TargetType::Image, Capability::CanDelete)),
        )
        .route(
            "/images/{id}/visibility",
            put(images::set_visibility)
                .layer(gate!(state, TargetType::Image, Capability::CanEdit)),
        )
        .route(
            "/images/{id}/grants",
            post(images::add_grant)
                .delete(images::remove_grant)
                .layer(gate!(state, TargetType::Image, Capability::CanEdit)),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    // Routes where identity is optional.
    let public = Router::new()
        .route("/users/{id}", get(users::get_user))
        .route(
            "/images/{id}",
            get(images::get_image).layer(gate!(state, TargetType::Image, Capability::CanView)),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), optional_auth));

    // Routes that handle credentials themselves.
    let open = Router::new()
        .route("/users", post(users::register))
        .route("/auth/refresh", post(session::refresh_session));

    let v1_routes = authenticated.merge(public).merge(open);

    let app = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .nest("/v1", v1_routes)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()));

    with_middleware(app, request_timeout)
}

/// Outer stages shared by every route. The timeout wraps the per-route auth
/// stage and capability gate as well as the handler.
fn with_middleware(app: Router, request_timeout: Duration) -> Router {
    app.layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TimeoutLayer::with_status_code(
                StatusCode::REQUEST_TIMEOUT,
                request_timeout,
            ))
            .layer(CorsLayer::permissive()),
    )
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        health::liveness,
        health::readiness,
        session::refresh_session,
        users::register,
        users::get_current_user,
        users::get_user,
        users::update_user,
        users::delete_user,
        images::create_image,
        images::get_image,
        images::update_image,
        images::set_visibility,
        images::add_grant,
        images::remove_grant,
        images::delete_image
    ),
    components(
        schemas(
            Capability,
            Grant,
            GrantRequest,
            GrantsResponse,
            CreateImageRequest,
            ImageResponse,
            IssuedToken,
            RefreshResponse,
            RegisterRequest,
            SessionResponse,
            StoredUser,
            TokenKind,
            UpdateImageRequest,
            UpdateUserRequest,
            UserProfile,
            VisibilityRequest,
            health::HealthResponse,
            health::ReadyResponse
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Liveness and readiness"),
        (name = "Session", description = "Token renewal"),
        (name = "Users", description = "Registration and profiles"),
        (name = "Images", description = "Image metadata, visibility and grants")
    )
)]
struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;
    use axum::{
        body::Body,
        http::{header::AUTHORIZATION, Method, Request},
    };
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app(state: &AppState) -> Router {
        router(state.clone(), Duration::from_secs(5))
    }

    async fn send(
        app: Router,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    /// Register a user and return `(id, access_token, refresh_token)`.
    async fn register(state: &AppState, username: &str) -> (u64, String, String) {
        let (status, body) = send(
            app(state),
            Method::POST,
            "/v1/users",
            None,
            Some(json!({ "username": username, "email": format!("{username}@example.com") })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        (
            body["user"]["id"].as_u64().unwrap(),
            body["access_token"]["token"].as_str().unwrap().to_string(),
            body["refresh_token"]["token"].as_str().unwrap().to_string(),
        )
    }

    #[tokio::test]
    async fn router_builds_with_all_routes() {
        let (state, _dir) = testutil::app_state();
        let _ = app(&state).into_make_service();
    }

    #[tokio::test]
    async fn openapi_document_is_served() {
        let (state, _dir) = testutil::app_state();
        let (status, body) = send(app(&state), Method::GET, "/api-doc/openapi.json", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["paths"]["/v1/images/{id}"].is_object());
        assert!(body["components"]["securitySchemes"]["bearer"].is_object());
    }

    #[tokio::test]
    async fn responses_carry_request_id() {
        let (state, _dir) = testutil::app_state();
        let response = app(&state)
            .oneshot(Request::builder().uri("/health/live").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn registration_grants_self_edit_and_public_view() {
        let (state, _dir) = testutil::app_state();
        let (alice, alice_token, _) = register(&state, "alice").await;
        let (_bob, bob_token, _) = register(&state, "bob").await;

        let (status, body) = send(app(&state), Method::GET, "/v1/users/me", Some(&alice_token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["username"], "alice");

        // Anyone can read the profile, without credentials.
        let path = format!("/v1/users/{alice}");
        let (status, body) = send(app(&state), Method::GET, &path, None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["username"], "alice");
        assert!(body.get("email").is_none());

        // Bob cannot edit Alice, and nothing changes.
        let (status, _) = send(
            app(&state),
            Method::PATCH,
            &path,
            Some(&bob_token),
            Some(json!({ "bio": "hijacked" })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(state.storage.users().get(alice).unwrap().bio.is_none());

        // Alice can.
        let (status, body) = send(
            app(&state),
            Method::PATCH,
            &path,
            Some(&alice_token),
            Some(json!({ "bio": "street photography" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["bio"], "street photography");
    }

    #[tokio::test]
    async fn duplicate_registration_conflicts_without_partial_state() {
        let (state, _dir) = testutil::app_state();
        register(&state, "alice").await;

        let (status, _) = send(
            app(&state),
            Method::POST,
            "/v1/users",
            None,
            Some(json!({ "username": "alice", "email": "other@example.com" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let perms = state.storage.permissions();
        assert!(perms.grants_for(&crate::auth::Target::user(2)).unwrap().is_empty());
    }

    #[tokio::test]
    async fn token_from_unknown_key_is_unauthorized() {
        let (state, _dir) = testutil::app_state();
        state
            .verifier
            .ring()
            .merge([testutil::provider_entry("k2", testutil::PROVIDER_K2_PUBLIC_PEM)])
            .await;
        let token =
            testutil::sign_external(testutil::PROVIDER_K1_PEM, "k1", &testutil::claims(1, 600));

        let (status, body) = send(app(&state), Method::GET, "/v1/users/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error_code"], "unauthorized");
        assert!(!body.to_string().contains("k1"));
    }

    #[tokio::test]
    async fn refresh_endpoint_only_takes_refresh_tokens() {
        let (state, _dir) = testutil::app_state();
        let (alice, access, refresh) = register(&state, "alice").await;

        let (status, body) = send(app(&state), Method::POST, "/v1/auth/refresh", Some(&refresh), None).await;
        assert_eq!(status, StatusCode::OK);
        let renewed = body["access_token"]["token"].as_str().unwrap().to_string();
        assert_eq!(body["access_token"]["kind"], "access");

        let verified = state.verifier.validate(&renewed).await.unwrap();
        assert_eq!(verified.subject_id, alice);

        let (status, _) = send(app(&state), Method::POST, "/v1/auth/refresh", Some(&access), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(app(&state), Method::GET, "/v1/users/me", Some(&refresh), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(app(&state), Method::POST, "/v1/auth/refresh", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn image_visibility_and_grants() {
        let (state, _dir) = testutil::app_state();
        let (_alice, alice_token, _) = register(&state, "alice").await;
        let (bob, bob_token, _) = register(&state, "bob").await;

        let (status, body) = send(
            app(&state),
            Method::POST,
            "/v1/images",
            Some(&alice_token),
            Some(json!({ "title": "Harbour", "tags": ["sea"] })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["public"], false);
        let path = format!("/v1/images/{}", body["id"].as_u64().unwrap());

        let (status, _) = send(app(&state), Method::GET, &path, Some(&alice_token), None).await;
        assert_eq!(status, StatusCode::OK);

        // Private: anonymous needs credentials, Bob is refused.
        let (status, _) = send(app(&state), Method::GET, &path, None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = send(app(&state), Method::GET, &path, Some(&bob_token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        // Alice shares it with Bob.
        let grants = format!("{path}/grants");
        let (status, body) = send(
            app(&state),
            Method::POST,
            &grants,
            Some(&alice_token),
            Some(json!({ "subject_id": bob, "capability": "can_view" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["grants"].as_array().unwrap().len(), 4);
        let (status, _) = send(app(&state), Method::GET, &path, Some(&bob_token), None).await;
        assert_eq!(status, StatusCode::OK);

        // Bob still cannot edit.
        let (status, _) = send(
            app(&state),
            Method::PATCH,
            &path,
            Some(&bob_token),
            Some(json!({ "title": "Mine now" })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        // Public: anonymous can read.
        let (status, body) = send(
            app(&state),
            Method::PUT,
            &format!("{path}/visibility"),
            Some(&alice_token),
            Some(json!({ "public": true })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["public"], true);
        let (status, body) = send(app(&state), Method::GET, &path, None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["title"], "Harbour");
    }

    #[tokio::test]
    async fn edit_grant_does_not_allow_delete() {
        let (state, _dir) = testutil::app_state();
        let (alice, alice_token, _) = register(&state, "alice").await;
        let (bob, bob_token, _) = register(&state, "bob").await;

        let (_, body) = send(
            app(&state),
            Method::POST,
            "/v1/images",
            Some(&alice_token),
            Some(json!({ "title": "Harbour" })),
        )
        .await;
        let id = body["id"].as_u64().unwrap();
        let path = format!("/v1/images/{id}");

        send(
            app(&state),
            Method::POST,
            &format!("{path}/grants"),
            Some(&alice_token),
            Some(json!({ "subject_id": bob, "capability": "can_edit" })),
        )
        .await;

        let (status, _) = send(
            app(&state),
            Method::PATCH,
            &path,
            Some(&bob_token),
            Some(json!({ "title": "Harbour at dusk" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(app(&state), Method::DELETE, &path, Some(&bob_token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(state.storage.images().get(id).is_ok());

        // The owner's grants are not revocable through the API.
        let (status, _) = send(
            app(&state),
            Method::DELETE,
            &format!("{path}/grants"),
            Some(&alice_token),
            Some(json!({ "subject_id": alice, "capability": "can_edit" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = send(app(&state), Method::DELETE, &path, Some(&alice_token), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(state
            .storage
            .permissions()
            .grants_for(&crate::auth::Target::image(id))
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn deleting_user_cascades_grants() {
        let (state, _dir) = testutil::app_state();
        let (alice, alice_token, _) = register(&state, "alice").await;
        let (_bob, bob_token, _) = register(&state, "bob").await;
        let path = format!("/v1/users/{alice}");

        let (status, _) = send(app(&state), Method::DELETE, &path, Some(&bob_token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send(app(&state), Method::DELETE, &path, Some(&alice_token), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let target = crate::auth::Target::user(alice);
        assert!(state.storage.permissions().grants_for(&target).unwrap().is_empty());
        assert!(!state.storage.permissions().is_public(&target).unwrap());

        let (status, _) = send(app(&state), Method::GET, &path, None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn only_owner_changes_grants() {
        let (state, _dir) = testutil::app_state();
        let (_alice, alice_token, _) = register(&state, "alice").await;
        let (bob, bob_token, _) = register(&state, "bob").await;
        let (carol, _, _) = register(&state, "carol").await;

        let (_, body) = send(
            app(&state),
            Method::POST,
            "/v1/images",
            Some(&alice_token),
            Some(json!({ "title": "Harbour" })),
        )
        .await;
        let id = body["id"].as_u64().unwrap();
        let path = format!("/v1/images/{id}");
        let grants = format!("{path}/grants");

        for (subject, capability) in [(bob, "can_edit"), (carol, "can_view")] {
            let (status, _) = send(
                app(&state),
                Method::POST,
                &grants,
                Some(&alice_token),
                Some(json!({ "subject_id": subject, "capability": capability })),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
        }
        let before = state.storage.permissions().grants_for(&crate::auth::Target::image(id)).unwrap();

        // An editor cannot hand itself can_delete.
        let (status, _) = send(
            app(&state),
            Method::POST,
            &grants,
            Some(&bob_token),
            Some(json!({ "subject_id": bob, "capability": "can_delete" })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        // Nor revoke somebody else's grant.
        let (status, _) = send(
            app(&state),
            Method::DELETE,
            &grants,
            Some(&bob_token),
            Some(json!({ "subject_id": carol, "capability": "can_view" })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        assert_eq!(
            state.storage.permissions().grants_for(&crate::auth::Target::image(id)).unwrap(),
            before
        );

        let (status, _) = send(app(&state), Method::DELETE, &path, Some(&bob_token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(state.storage.images().get(id).is_ok());
    }

    #[tokio::test]
    async fn deleted_user_cannot_create_images() {
        let (state, _dir) = testutil::app_state();
        let (alice, alice_token, _) = register(&state, "alice").await;

        let (status, _) = send(
            app(&state),
            Method::DELETE,
            &format!("/v1/users/{alice}"),
            Some(&alice_token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = send(
            app(&state),
            Method::POST,
            "/v1/images",
            Some(&alice_token),
            Some(json!({ "title": "Orphan" })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(matches!(
            state.storage.images().get(1),
            Err(crate::storage::StorageError::NotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_request_times_out_behind_auth_and_gate() {
        let (state, _dir) = testutil::app_state();
        let txn = state.storage.begin_write().unwrap();
        state
            .storage
            .permissions()
            .grant_owner(&txn, 1, &crate::auth::Target::image(7), false)
            .unwrap();
        txn.commit().unwrap();
        let token = state.verifier.issue(1, TokenKind::Access).unwrap().token;

        let started = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicBool::new(false));
        let (started_in, finished_in) = (started.clone(), finished.clone());

        let slow = Router::new()
            .route(
                "/images/{id}",
                patch(move || {
                    let started = started_in.clone();
                    let finished = finished_in.clone();
                    async move {
                        started.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_secs(60)).await;
                        finished.store(true, Ordering::SeqCst);
                        StatusCode::OK
                    }
                })
                .layer(gate!(state, TargetType::Image, Capability::CanEdit)),
            )
            .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
            .with_state(state.clone());
        let app = with_middleware(slow, Duration::from_millis(50));

        let (status, _) = send(app, Method::PATCH, "/images/7", Some(&token), None).await;
        assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
        assert_eq!(started.load(Ordering::SeqCst), 1);

        // The handler future was dropped, so it never completes.
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(!finished.load(Ordering::SeqCst));
    }
}
