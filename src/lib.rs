// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Photoshare Server - authentication and permission core of a photo-sharing
//! backend.
//!
//! Every request carrying a bearer token is verified against a key ring that
//! holds the service's own signing key plus the public keys of an external
//! identity provider. Mutating routes are additionally gated on per-resource
//! capability grants kept in an embedded database.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers and router (Axum)
//! - `auth` - Key ring, token verification, auth middleware and permission gate
//! - `config` - Environment configuration
//! - `scheduler` - Periodic background tasks (key ring refresh)
//! - `storage` - Permission grants and domain records (redb)

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod scheduler;
pub mod state;
pub mod storage;

#[cfg(test)]
pub mod testutil;
