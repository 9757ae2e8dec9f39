// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User repository.
//!
//! Usernames and emails are unique, compared case-insensitively through the
//! `usernames` and `emails` index tables.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::super::{StorageError, StorageResult};

const USERS: TableDefinition<u64, &[u8]> = TableDefinition::new("users");
const USERNAMES: TableDefinition<&str, u64> = TableDefinition::new("usernames");
const EMAILS: TableDefinition<&str, u64> = TableDefinition::new("emails");

pub(super) fn create_tables(txn: &WriteTransaction) -> StorageResult<()> {
    let _ = txn.open_table(USERS)?;
    let _ = txn.open_table(USERNAMES)?;
    let _ = txn.open_table(EMAILS)?;
    Ok(())
}

/// User record.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct StoredUser {
    pub id: u64,
    pub username: String,
    pub email: String,
    /// Display name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied at registration.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub name: Option<String>,
}

impl NewUser {
    pub fn new(username: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            name: None,
        }
    }
}

/// Partial profile update. `None` leaves the field as it is.
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub email: Option<String>,
    pub name: Option<String>,
    pub bio: Option<String>,
}

fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Repository for user records.
#[derive(Clone)]
pub struct UserRepository {
    db: Arc<Database>,
}

impl UserRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a user, allocating its id.
    ///
    /// Fails with [`StorageError::Conflict`] if the username or email is taken.
    pub fn insert(&self, txn: &WriteTransaction, new: NewUser) -> StorageResult<StoredUser> {
        let username_key = normalize(&new.username);
        let email_key = normalize(&new.email);

        {
            let usernames = txn.open_table(USERNAMES)?;
            if usernames.get(username_key.as_str())?.is_some() {
                return Err(StorageError::Conflict(format!(
                    "username {} is taken",
                    new.username
                )));
            }
            let emails = txn.open_table(EMAILS)?;
            if emails.get(email_key.as_str())?.is_some() {
                return Err(StorageError::Conflict("email is already registered".into()));
            }
        }

        let id = super::next_id(txn, "users")?;
        let now = Utc::now();
        let user = StoredUser {
            id,
            username: new.username.trim().to_string(),
            email: new.email.trim().to_string(),
            name: new.name,
            bio: None,
            created_at: now,
            updated_at: now,
        };

        let json = serde_json::to_vec(&user)?;
        txn.open_table(USERS)?.insert(id, json.as_slice())?;
        txn.open_table(USERNAMES)?.insert(username_key.as_str(), id)?;
        txn.open_table(EMAILS)?.insert(email_key.as_str(), id)?;

        Ok(user)
    }

    /// Get a user by id.
    pub fn get(&self, user_id: u64) -> StorageResult<StoredUser> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(USERS)?;
        match table.get(user_id)? {
            Some(value) => Ok(serde_json::from_slice(value.value())?),
            None => Err(StorageError::NotFound(format!("User {user_id}"))),
        }
    }

    pub fn find_by_username(&self, username: &str) -> StorageResult<Option<StoredUser>> {
        let id = {
            let read_txn = self.db.begin_read()?;
            let table = read_txn.open_table(USERNAMES)?;
            let id = table.get(normalize(username).as_str())?.map(|v| v.value());
            id
        };
        id.map(|id| self.get(id)).transpose()
    }

    /// Apply a partial update inside `txn`.
    pub fn update(
        &self,
        txn: &WriteTransaction,
        user_id: u64,
        patch: UserPatch,
    ) -> StorageResult<StoredUser> {
        let mut user = load(txn, user_id)?;

        if let Some(email) = patch.email {
            let new_key = normalize(&email);
            let old_key = normalize(&user.email);
            if new_key != old_key {
                let mut emails = txn.open_table(EMAILS)?;
                if emails.get(new_key.as_str())?.is_some() {
                    return Err(StorageError::Conflict("email is already registered".into()));
                }
                emails.remove(old_key.as_str())?;
                emails.insert(new_key.as_str(), user_id)?;
            }
            user.email = email.trim().to_string();
        }
        if let Some(name) = patch.name {
            user.name = Some(name);
        }
        if let Some(bio) = patch.bio {
            user.bio = Some(bio);
        }
        user.updated_at = Utc::now();

        let json = serde_json::to_vec(&user)?;
        txn.open_table(USERS)?.insert(user_id, json.as_slice())?;
        Ok(user)
    }

    /// Delete a user and its index entries.
    pub fn delete(&self, txn: &WriteTransaction, user_id: u64) -> StorageResult<StoredUser> {
        let user = load(txn, user_id)?;
        txn.open_table(USERS)?.remove(user_id)?;
        txn.open_table(USERNAMES)?
            .remove(normalize(&user.username).as_str())?;
        txn.open_table(EMAILS)?.remove(normalize(&user.email).as_str())?;
        Ok(user)
    }
}

/// Read a user through a write transaction so the caller sees its own writes.
fn load(txn: &WriteTransaction, user_id: u64) -> StorageResult<StoredUser> {
    let table = txn.open_table(USERS)?;
    let bytes = table
        .get(user_id)?
        .ok_or_else(|| StorageError::NotFound(format!("User {user_id}")))?
        .value()
        .to_vec();
    Ok(serde_json::from_slice(&bytes)?)
}
