//! Create-rights gate consumed by the creation core.
//!
//! ACL evaluation itself lives outside this crate; the core only asks a
//! yes/no question before mutating the tree.

use crate::model::context::ActingIdentity;
use crate::model::item::{ContentItem, ItemId};
use std::collections::HashSet;

/// Boolean capability check for item creation.
pub trait AccessPolicy {
    /// Returns whether `identity` may create children under `parent`.
    fn can_create(&self, parent: &ContentItem, identity: &ActingIdentity) -> bool;
}

/// Grants create rights everywhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AccessPolicy for AllowAll {
    fn can_create(&self, _parent: &ContentItem, _identity: &ActingIdentity) -> bool {
        true
    }
}

/// Denies create rights under listed parents for non-administrators.
#[derive(Debug, Clone, Default)]
pub struct ReadOnlyParents {
    parents: HashSet<ItemId>,
}

impl ReadOnlyParents {
    pub fn new(parents: impl IntoIterator<Item = ItemId>) -> Self {
        Self {
            parents: parents.into_iter().collect(),
        }
    }
}

impl AccessPolicy for ReadOnlyParents {
    fn can_create(&self, parent: &ContentItem, identity: &ActingIdentity) -> bool {
        identity.is_administrator || !self.parents.contains(&parent.id)
    }
}
