//! Content item domain model.
//!
//! # Responsibility
//! - Define the snapshot of one item version handed out by the tree store.
//! - Name the well-known fields the creation core reads and writes.
//!
//! # Invariants
//! - `version` is 1-based and scoped to `(id, language)`.
//! - `fields` holds effective values: own values overlay standard values.
//! - `lock` belongs to this version only, never to sibling versions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Stable identifier of one content item across versions and languages.
pub type ItemId = Uuid;

/// Inheritable field naming the workflow a new item is started in.
pub const DEFAULT_WORKFLOW_FIELD: &str = "__Default workflow";
/// Field naming the workflow currently assigned to an item.
pub const WORKFLOW_FIELD: &str = "__Workflow";
/// Field naming the workflow state of one item version.
pub const WORKFLOW_STATE_FIELD: &str = "__Workflow state";
/// Lock-capable field. Templates without it cannot be locked.
pub const LOCK_FIELD: &str = "__Lock";

/// Exclusive editing lock held on one item version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemLock {
    /// Identity name that acquired the lock.
    pub owner: String,
    /// Epoch ms acquisition timestamp.
    pub locked_at: i64,
}

/// Snapshot of one item version in one language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: ItemId,
    /// `None` for tree roots.
    pub parent_id: Option<ItemId>,
    pub name: String,
    pub template_id: Uuid,
    /// Branch the item was created from, when created from a branch root.
    pub branch_id: Option<Uuid>,
    pub language: String,
    pub version: u32,
    pub fields: BTreeMap<String, String>,
    pub lock: Option<ItemLock>,
    /// Epoch ms creation timestamp.
    pub created_at: i64,
    /// Epoch ms update timestamp.
    pub updated_at: i64,
}

impl ContentItem {
    /// Returns the effective value of `name`, treating blank values as unset.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    /// Returns whether this version is locked by anyone.
    pub fn is_locked(&self) -> bool {
        self.lock.is_some()
    }

    /// Returns whether this version is locked by `identity`.
    pub fn is_locked_by(&self, identity: &str) -> bool {
        self.lock
            .as_ref()
            .is_some_and(|lock| lock.owner == identity)
    }
}
