// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Bearer token authentication and per-resource authorization.
//!
//! ## Auth Flow
//!
//! 1. A client obtains a token pair from registration or `/v1/auth/refresh`,
//!    or a token from the external identity provider.
//! 2. The client sends `Authorization: Bearer <token>`.
//! 3. The server:
//!    - resolves the token's `kid` in the [`KeyRing`] (its own signing key
//!      plus every key the provider has ever published)
//!    - verifies the signature, then the expiry
//!    - attaches the subject as [`AuthenticatedUser`]
//!    - checks the route's declared `(TargetType, Capability)` against the
//!      permission store
//!
//! ## Security
//!
//! - Rejections carry a generic reason; key ids and store errors are only
//!   logged
//! - Provider keys are fetched over HTTPS and never dropped by a refresh
//! - The service's own key is always trusted, so self-issued tokens keep
//!   working through a provider outage

pub mod claims;
pub mod error;
pub mod extractor;
pub mod gate;
pub mod keyring;
pub mod middleware;
pub mod provider;
pub mod refresher;
pub mod scope;
pub mod token;

pub use claims::{AuthenticatedUser, TokenKind};
pub use error::AuthError;
pub use extractor::{Auth, OptionalAuth};
pub use gate::{require_capability, PermissionGate};
pub use keyring::{KeyEntry, KeyRing, SigningKey};
pub use middleware::{optional_auth, require_auth};
pub use provider::{HttpKeyProvider, KeyProvider};
pub use refresher::KeyRefresher;
pub use scope::{Capability, Target, TargetId, TargetType};
pub use token::{IssuedToken, TokenPolicy, TokenVerifier};
