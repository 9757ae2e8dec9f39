// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Image metadata repository.
//!
//! Only metadata lives here. Visibility is not stored on the record; it is
//! the public flag of the image's target in the permission store.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::super::{StorageError, StorageResult};

const IMAGES: TableDefinition<u64, &[u8]> = TableDefinition::new("images");

pub(super) fn create_tables(txn: &WriteTransaction) -> StorageResult<()> {
    let _ = txn.open_table(IMAGES)?;
    Ok(())
}

/// Image metadata record.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct StoredImage {
    pub id: u64,
    /// User who uploaded the image
    pub owner_id: u64,
    pub title: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewImage {
    pub title: String,
    pub tags: Vec<String>,
}

/// Partial metadata update. `None` leaves the field as it is.
#[derive(Debug, Clone, Default)]
pub struct ImagePatch {
    pub title: Option<String>,
    pub tags: Option<Vec<String>>,
}

/// Repository for image metadata.
#[derive(Clone)]
pub struct ImageRepository {
    db: Arc<Database>,
}

impl ImageRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn insert(
        &self,
        txn: &WriteTransaction,
        owner_id: u64,
        new: NewImage,
    ) -> StorageResult<StoredImage> {
        let id = super::next_id(txn, "images")?;
        let now = Utc::now();
        let image = StoredImage {
            id,
            owner_id,
            title: new.title,
            tags: new.tags,
            created_at: now,
            updated_at: now,
        };
        let json = serde_json::to_vec(&image)?;
        txn.open_table(IMAGES)?.insert(id, json.as_slice())?;
        Ok(image)
    }

    pub fn get(&self, image_id: u64) -> StorageResult<StoredImage> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(IMAGES)?;
        match table.get(image_id)? {
            Some(value) => Ok(serde_json::from_slice(value.value())?),
            None => Err(StorageError::NotFound(format!("Image {image_id}"))),
        }
    }

    pub fn update(
        &self,
        txn: &WriteTransaction,
        image_id: u64,
        patch: ImagePatch,
    ) -> StorageResult<StoredImage> {
        let mut table = txn.open_table(IMAGES)?;
        let bytes = table
            .get(image_id)?
            .ok_or_else(|| StorageError::NotFound(format!("Image {image_id}")))?
            .value()
            .to_vec();
        let mut image: StoredImage = serde_json::from_slice(&bytes)?;

        if let Some(title) = patch.title {
            image.title = title;
        }
        if let Some(tags) = patch.tags {
            image.tags = tags;
        }
        image.updated_at = Utc::now();

        let json = serde_json::to_vec(&image)?;
        table.insert(image_id, json.as_slice())?;
        Ok(image)
    }

    pub fn delete(&self, txn: &WriteTransaction, image_id: u64) -> StorageResult<()> {
        let mut table = txn.open_table(IMAGES)?;
        let removed = table.remove(image_id)?.is_some();
        if !removed {
            return Err(StorageError::NotFound(format!("Image {image_id}")));
        }
        Ok(())
    }
}
