// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Capabilities and permission targets.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A named permission grantable to a subject over one target resource.
///
/// Capabilities are independent: holding `CanEdit` says nothing about
/// `CanDelete`, and routes declare exactly which one they need.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Modify the resource
    CanEdit,
    /// Delete the resource
    CanDelete,
    /// Read the resource (implied for every subject when the target is public)
    CanView,
}

impl Capability {
    /// Stable single-byte tag used in storage keys.
    pub(crate) fn tag(self) -> u8 {
        match self {
            Capability::CanEdit => 1,
            Capability::CanDelete => 2,
            Capability::CanView => 3,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Option<Capability> {
        match tag {
            1 => Some(Capability::CanEdit),
            2 => Some(Capability::CanDelete),
            3 => Some(Capability::CanView),
            _ => None,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::CanEdit => write!(f, "can_edit"),
            Capability::CanDelete => write!(f, "can_delete"),
            Capability::CanView => write!(f, "can_view"),
        }
    }
}

/// Kind of resource a grant applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    User,
    Image,
    Collection,
}

impl TargetType {
    pub(crate) fn tag(self) -> u8 {
        match self {
            TargetType::User => 1,
            TargetType::Image => 2,
            TargetType::Collection => 3,
        }
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetType::User => write!(f, "user"),
            TargetType::Image => write!(f, "image"),
            TargetType::Collection => write!(f, "collection"),
        }
    }
}

/// Identifier of a target: numeric row id or an alphanumeric shortcode.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetId {
    Numeric(u64),
    ShortCode(String),
}

/// Maximum shortcode length accepted from request paths.
const MAX_SHORTCODE_LEN: usize = 64;

impl FromStr for TargetId {
    type Err = InvalidTargetId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(id) = s.parse::<u64>() {
            return Ok(TargetId::Numeric(id));
        }
        if s.is_empty()
            || s.len() > MAX_SHORTCODE_LEN
            || !s.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        {
            return Err(InvalidTargetId(s.to_string()));
        }
        Ok(TargetId::ShortCode(s.to_string()))
    }
}

impl From<u64> for TargetId {
    fn from(id: u64) -> Self {
        TargetId::Numeric(id)
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetId::Numeric(id) => write!(f, "{id}"),
            TargetId::ShortCode(code) => f.write_str(code),
        }
    }
}

/// Path segment that is neither a numeric id nor a valid shortcode.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid target identifier: {0:?}")]
pub struct InvalidTargetId(pub String);

/// A concrete resource: type plus identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    pub target_type: TargetType,
    pub id: TargetId,
}

impl Target {
    pub fn new(target_type: TargetType, id: impl Into<TargetId>) -> Self {
        Self {
            target_type,
            id: id.into(),
        }
    }

    pub fn user(id: u64) -> Self {
        Self::new(TargetType::User, id)
    }

    pub fn image(id: u64) -> Self {
        Self::new(TargetType::Image, id)
    }

    /// Numeric id, if the target is addressed by one.
    pub fn numeric_id(&self) -> Option<u64> {
        match self.id {
            TargetId::Numeric(id) => Some(id),
            TargetId::ShortCode(_) => None,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.target_type, self.id)
    }
}
