// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::auth::TokenVerifier;
use crate::storage::Storage;

/// Shared request state. Everything in here is internally synchronized.
#[derive(Clone)]
pub struct AppState {
    pub verifier: Arc<TokenVerifier>,
    pub storage: Storage,
}

impl AppState {
    pub fn new(verifier: TokenVerifier, storage: Storage) -> Self {
        Self {
            verifier: Arc::new(verifier),
            storage,
        }
    }
}
