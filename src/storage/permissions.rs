// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Capability grants over targets.
//!
//! A grant is the tuple `(subject, target, capability)`; storing it twice is
//! the same as storing it once. A target may additionally be marked public,
//! which is read as "every subject holds `CanView`".
//!
//! ## Key encoding
//!
//! ```text
//! target  = type_tag:u8 | id
//! id      = 0x00 | u64_be                  (numeric)
//!         | 0x01 | len:u8 | ascii bytes    (short code)
//! grant   = target | subject:u64_be | capability_tag:u8
//! ```
//!
//! The id encoding is length-prefixed, so no target key is a prefix of
//! another and a range scan over one target never leaks into the next.

use std::sync::Arc;

use chrono::Utc;
use redb::{
    Database, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction,
};
use serde::Serialize;
use utoipa::ToSchema;

use super::{StorageError, StorageResult};
use crate::auth::scope::{Capability, Target, TargetId};

// =============================================================================
// Table Definitions
// =============================================================================

/// grant key → granted_at (unix seconds)
const GRANTS: TableDefinition<&[u8], i64> = TableDefinition::new("grants");

/// target key → marked_at (unix seconds)
const PUBLIC_TARGETS: TableDefinition<&[u8], i64> = TableDefinition::new("public_targets");

pub(super) fn create_tables(txn: &WriteTransaction) -> StorageResult<()> {
    let _ = txn.open_table(GRANTS)?;
    let _ = txn.open_table(PUBLIC_TARGETS)?;
    Ok(())
}

// =============================================================================
// Key Helpers
// =============================================================================

const NUMERIC_ID: u8 = 0;
const SHORT_CODE_ID: u8 = 1;

fn target_key(target: &Target) -> StorageResult<Vec<u8>> {
    let mut key = Vec::with_capacity(1 + 1 + 65);
    key.push(target.target_type.tag());
    match &target.id {
        TargetId::Numeric(id) => {
            key.push(NUMERIC_ID);
            key.extend_from_slice(&id.to_be_bytes());
        }
        TargetId::ShortCode(code) => {
            let len = u8::try_from(code.len())
                .map_err(|_| StorageError::InvalidKey(format!("short code of {} bytes", code.len())))?;
            key.push(SHORT_CODE_ID);
            key.push(len);
            key.extend_from_slice(code.as_bytes());
        }
    }
    Ok(key)
}

fn grant_key(subject_id: u64, target: &Target, capability: Capability) -> StorageResult<Vec<u8>> {
    let mut key = target_key(target)?;
    key.extend_from_slice(&subject_id.to_be_bytes());
    key.push(capability.tag());
    Ok(key)
}

/// Upper bound for a range scan over every grant of one target.
fn target_range_end(prefix: &[u8]) -> Vec<u8> {
    let mut end = Vec::with_capacity(prefix.len() + 9);
    end.extend_from_slice(prefix);
    end.extend_from_slice(&[0xFF; 9]);
    end
}

/// Split the `subject | capability` suffix off a grant key.
fn decode_grant_suffix(key: &[u8], prefix_len: usize) -> StorageResult<(u64, Capability)> {
    let suffix = key
        .get(prefix_len..)
        .filter(|s| s.len() == 9)
        .ok_or_else(|| StorageError::Corrupt(format!("grant key of {} bytes", key.len())))?;
    let mut subject = [0u8; 8];
    subject.copy_from_slice(&suffix[..8]);
    let capability = Capability::from_tag(suffix[8])
        .ok_or_else(|| StorageError::Corrupt(format!("capability tag {}", suffix[8])))?;
    Ok((u64::from_be_bytes(subject), capability))
}

// =============================================================================
// PermissionStore
// =============================================================================

/// One stored grant, as listed by [`PermissionStore::grants_for`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Grant {
    pub subject_id: u64,
    pub capability: Capability,
    /// When the grant was first written (Unix timestamp)
    pub granted_at: i64,
}

/// Capability grants and public markers.
///
/// Mutations run inside the caller's write transaction; reads open their own
/// snapshot.
#[derive(Clone)]
pub struct PermissionStore {
    db: Arc<Database>,
}

impl PermissionStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Grant `capability` on `target` to `subject_id`. Idempotent: an existing
    /// grant keeps its original timestamp.
    pub fn grant(
        &self,
        txn: &WriteTransaction,
        subject_id: u64,
        target: &Target,
        capability: Capability,
    ) -> StorageResult<()> {
        let key = grant_key(subject_id, target, capability)?;
        let mut table = txn.open_table(GRANTS)?;
        let exists = table.get(key.as_slice())?.is_some();
        if !exists {
            table.insert(key.as_slice(), Utc::now().timestamp())?;
        }
        Ok(())
    }

    /// Remove a grant. Revoking something never granted is a no-op.
    pub fn revoke(
        &self,
        txn: &WriteTransaction,
        subject_id: u64,
        target: &Target,
        capability: Capability,
    ) -> StorageResult<()> {
        let key = grant_key(subject_id, target, capability)?;
        let mut table = txn.open_table(GRANTS)?;
        table.remove(key.as_slice())?;
        Ok(())
    }

    /// Mark or unmark `target` as readable by everyone.
    pub fn set_public(
        &self,
        txn: &WriteTransaction,
        target: &Target,
        public: bool,
    ) -> StorageResult<()> {
        let key = target_key(target)?;
        let mut table = txn.open_table(PUBLIC_TARGETS)?;
        if public {
            let exists = table.get(key.as_slice())?.is_some();
            if !exists {
                table.insert(key.as_slice(), Utc::now().timestamp())?;
            }
        } else {
            table.remove(key.as_slice())?;
        }
        Ok(())
    }

    /// Provision a freshly created resource: its owner gets `CanEdit`,
    /// `CanDelete` and `CanView`, and the public flag is set as requested.
    pub fn grant_owner(
        &self,
        txn: &WriteTransaction,
        owner_id: u64,
        target: &Target,
        public: bool,
    ) -> StorageResult<()> {
        self.grant(txn, owner_id, target, Capability::CanEdit)?;
        self.grant(txn, owner_id, target, Capability::CanDelete)?;
        self.grant(txn, owner_id, target, Capability::CanView)?;
        self.set_public(txn, target, public)
    }

    /// Remove every grant on `target` and its public flag. Used when the
    /// resource itself is deleted.
    pub fn clear_target(&self, txn: &WriteTransaction, target: &Target) -> StorageResult<usize> {
        let prefix = target_key(target)?;
        let end = target_range_end(&prefix);

        let mut table = txn.open_table(GRANTS)?;
        let keys: Vec<Vec<u8>> = {
            let mut keys = Vec::new();
            for entry in table.range(prefix.as_slice()..end.as_slice())? {
                let (key, _) = entry?;
                keys.push(key.value().to_vec());
            }
            keys
        };
        for key in &keys {
            table.remove(key.as_slice())?;
        }

        let mut public = txn.open_table(PUBLIC_TARGETS)?;
        public.remove(prefix.as_slice())?;

        Ok(keys.len())
    }

    /// Whether `subject_id` may exercise `capability` on `target`: an explicit
    /// grant, or `CanView` on a public target.
    pub fn has(
        &self,
        subject_id: u64,
        target: &Target,
        capability: Capability,
    ) -> StorageResult<bool> {
        let read_txn = self.db.begin_read()?;

        if capability == Capability::CanView {
            let public = read_txn.open_table(PUBLIC_TARGETS)?;
            if public.get(target_key(target)?.as_slice())?.is_some() {
                return Ok(true);
            }
        }

        let grants = read_txn.open_table(GRANTS)?;
        let key = grant_key(subject_id, target, capability)?;
        Ok(grants.get(key.as_slice())?.is_some())
    }

    pub fn is_public(&self, target: &Target) -> StorageResult<bool> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PUBLIC_TARGETS)?;
        Ok(table.get(target_key(target)?.as_slice())?.is_some())
    }

    /// List every explicit grant on `target`, ordered by subject.
    pub fn grants_for(&self, target: &Target) -> StorageResult<Vec<Grant>> {
        let prefix = target_key(target)?;
        let end = target_range_end(&prefix);

        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(GRANTS)?;

        let mut grants = Vec::new();
        for entry in table.range(prefix.as_slice()..end.as_slice())? {
            let (key, value) = entry?;
            let (subject_id, capability) = decode_grant_suffix(key.value(), prefix.len())?;
            grants.push(Grant {
                subject_id,
                capability,
                granted_at: value.value(),
            });
        }
        Ok(grants)
    }
}
