// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Key Ring Refresher
//!
//! Loads the provider's key set once at startup and re-merges it on every
//! scheduled run.
//!
//! ## Failure policy
//!
//! - **Startup**: a failed fetch, or a fetch with no usable key, is fatal.
//!   The process must not serve traffic without an external trust anchor.
//! - **Scheduled run**: a failed fetch is reported to the scheduler, which
//!   logs and swallows it. The ring is left exactly as it was.
//!
//! The network call happens before the ring's write lock is taken; the lock
//! only covers publishing the merged entries.

use std::sync::Arc;

use tracing::{info, warn};

use super::error::AuthError;
use super::keyring::{KeyRing, MergeOutcome, SigningKey};
use super::provider::KeyProvider;
use crate::scheduler::PeriodicTask;

/// Keeps a [`KeyRing`] in sync with an identity provider.
pub struct KeyRefresher<P> {
    ring: Arc<KeyRing>,
    provider: P,
}

impl<P: KeyProvider> KeyRefresher<P> {
    /// Build the key ring from the signing key plus a first provider snapshot.
    pub async fn bootstrap(signing: SigningKey, provider: P) -> Result<Self, AuthError> {
        let entries = provider.fetch().await?;
        if entries.is_empty() {
            return Err(AuthError::UpstreamUnavailable(format!(
                "{} returned no usable keys",
                provider.describe()
            )));
        }

        let ring = Arc::new(KeyRing::new(signing));
        let outcome = ring.merge(entries).await;
        info!(
            provider = %provider.describe(),
            self_key_id = ring.self_key_id(),
            external_keys = outcome.added,
            "Key ring loaded"
        );

        Ok(Self { ring, provider })
    }

    /// Wrap an existing ring.
    pub fn new(ring: Arc<KeyRing>, provider: P) -> Self {
        Self { ring, provider }
    }

    pub fn ring(&self) -> Arc<KeyRing> {
        self.ring.clone()
    }

    /// Fetch the provider's current keys and merge them into the ring.
    pub async fn refresh(&self) -> Result<MergeOutcome, AuthError> {
        let entries = self.provider.fetch().await?;
        if entries.is_empty() {
            warn!(
                provider = %self.provider.describe(),
                "Provider returned no usable keys; key ring left unchanged"
            );
            return Ok(MergeOutcome::default());
        }

        let outcome = self.ring.merge(entries).await;
        info!(
            added = outcome.added,
            replaced = outcome.replaced,
            rejected = outcome.rejected,
            "Key ring refreshed"
        );
        Ok(outcome)
    }
}

impl<P: KeyProvider> PeriodicTask for KeyRefresher<P> {
    type Error = AuthError;

    fn name(&self) -> &'static str {
        "key-ring-refresh"
    }

    async fn run_once(&self) -> Result<(), AuthError> {
        self.refresh().await.map(|_| ())
    }
}
