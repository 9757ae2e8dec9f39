// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Module
//!
//! One embedded redb database (pure Rust, ACID, MVCC snapshot reads) holds
//! both the permission grants and the thin domain records that own them.
//!
//! ## Transactions
//!
//! Mutations take a caller-supplied [`WriteTransaction`] so that creating a
//! resource and granting its owner's capabilities commit together:
//!
//! ```ignore
//! let txn = storage.begin_write()?;
//! let image = storage.images().insert(&txn, owner, new_image)?;
//! storage.permissions().grant_owner(&txn, owner, &Target::image(image.id), true)?;
//! storage.commit(txn)?;
//! ```
//!
//! Dropping a `WriteTransaction` without committing aborts it, so any `?`
//! between `begin_write` and `commit` leaves no partial state behind.
//!
//! ## Table Layout
//!
//! - `grants`: target | subject | capability → granted_at
//! - `public_targets`: target → marked_at
//! - `users`: user_id → serialized StoredUser
//! - `usernames` / `emails`: normalized value → user_id
//! - `images`: image_id → serialized StoredImage
//! - `counters`: name → last issued id

pub mod permissions;
pub mod repository;

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, WriteTransaction};

pub use permissions::{Grant, PermissionStore};
pub use repository::{
    ImagePatch, ImageRepository, NewImage, NewUser, StoredImage, StoredUser, UserPatch,
    UserRepository,
};

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

// =============================================================================
// Storage
// =============================================================================

/// Handle to the shared database. Cheap to clone.
#[derive(Clone)]
pub struct Storage {
    db: Arc<Database>,
}

impl Storage {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        permissions::create_tables(&write_txn)?;
        repository::create_tables(&write_txn)?;
        write_txn.commit()?;

        tracing::info!(path = %path.display(), "Database opened");

        Ok(Self { db: Arc::new(db) })
    }

    /// Start a write transaction. Commit it explicitly; dropping it aborts.
    pub fn begin_write(&self) -> StorageResult<WriteTransaction> {
        Ok(self.db.begin_write()?)
    }

    /// Commit `txn`, converting the error into a [`StorageError`].
    pub fn commit(&self, txn: WriteTransaction) -> StorageResult<()> {
        txn.commit()?;
        Ok(())
    }

    pub fn permissions(&self) -> PermissionStore {
        PermissionStore::new(self.db.clone())
    }

    pub fn users(&self) -> UserRepository {
        UserRepository::new(self.db.clone())
    }

    pub fn images(&self) -> ImageRepository {
        ImageRepository::new(self.db.clone())
    }

    /// Check that a read snapshot can be opened.
    pub fn ping(&self) -> StorageResult<()> {
        let _ = self.db.begin_read()?;
        Ok(())
    }
}
