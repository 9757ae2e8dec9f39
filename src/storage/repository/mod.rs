// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Repository layer providing typed access to the domain tables.
//!
//! Reads open their own snapshot. Writes take the caller's
//! [`WriteTransaction`](redb::WriteTransaction) so they can commit together
//! with the permission grants of the same operation.

pub mod images;
pub mod users;

use redb::{ReadableTable, TableDefinition, WriteTransaction};

use super::StorageResult;

pub use images::{ImagePatch, ImageRepository, NewImage, StoredImage};
pub use users::{NewUser, StoredUser, UserPatch, UserRepository};

/// Counter name → last issued id.
const COUNTERS: TableDefinition<&str, u64> = TableDefinition::new("counters");

pub(super) fn create_tables(txn: &WriteTransaction) -> StorageResult<()> {
    let _ = txn.open_table(COUNTERS)?;
    users::create_tables(txn)?;
    images::create_tables(txn)?;
    Ok(())
}

/// Allocate the next id for `counter`, starting at 1. The increment belongs
/// to `txn` and is rolled back with it.
fn next_id(txn: &WriteTransaction, counter: &str) -> StorageResult<u64> {
    let mut table = txn.open_table(COUNTERS)?;
    let last = table.get(counter)?.map(|v| v.value()).unwrap_or(0);
    let next = last + 1;
    table.insert(counter, next)?;
    Ok(next)
}
