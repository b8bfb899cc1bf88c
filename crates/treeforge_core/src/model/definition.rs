//! Creation blueprints: templates, branches and command masters.
//!
//! # Invariants
//! - Definitions are immutable snapshots during one creation call.
//! - A branch always names the template of the root item it spawns.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Token in branch child names replaced with the created root's name.
pub const BRANCH_NAME_TOKEN: &str = "$name";

/// Field schema blueprint for one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateDefinition {
    pub id: Uuid,
    pub name: String,
    /// Field names declared by the template.
    pub fields: Vec<String>,
    /// Whether items of this template can get additional versions.
    pub versioning_enabled: bool,
    /// Item holding the template's default field values.
    pub standard_values_id: Option<Uuid>,
}

/// One child item spawned beneath a branch root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchChild {
    /// Child name; may contain [`BRANCH_NAME_TOKEN`].
    pub name: String,
    pub template_id: Uuid,
}

impl BranchChild {
    /// Resolves the child name for a root named `root_name`.
    pub fn resolved_name(&self, root_name: &str) -> String {
        self.name.replace(BRANCH_NAME_TOKEN, root_name)
    }
}

/// Subtree blueprint: one root item plus child stubs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchDefinition {
    pub id: Uuid,
    pub name: String,
    /// Template of the root item.
    pub template_id: Uuid,
    /// Children in creation order.
    pub children: Vec<BranchChild>,
}

/// Definition kind used to key audit records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefinitionKind {
    Branch,
    Template,
}

impl DefinitionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Branch => "branch",
            Self::Template => "template",
        }
    }
}

impl Display for DefinitionKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input to item creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefinitionSource {
    Branch(BranchDefinition),
    Template(TemplateDefinition),
}

impl DefinitionSource {
    pub fn kind(&self) -> DefinitionKind {
        match self {
            Self::Branch(_) => DefinitionKind::Branch,
            Self::Template(_) => DefinitionKind::Template,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Self::Branch(branch) => branch.id,
            Self::Template(template) => template.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Branch(branch) => branch.name.as_str(),
            Self::Template(template) => template.name.as_str(),
        }
    }

    /// Template of the item created directly under the parent.
    pub fn root_template_id(&self) -> Uuid {
        match self {
            Self::Branch(branch) => branch.template_id,
            Self::Template(template) => template.id,
        }
    }
}

/// Anything an "add from master" request can point at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MasterDefinition {
    Definition(DefinitionSource),
    /// Master that dispatches a shell command instead of creating an item.
    Command { id: Uuid, name: String, command: String },
}
