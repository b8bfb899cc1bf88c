//! Request-scoped editing context.
//!
//! # Responsibility
//! - Carry who is acting, on which site, and the workflow engagement
//!   override into the creation core as explicit values.
//!
//! # Invariants
//! - The context is read, never mutated, by the creation core.

use serde::{Deserialize, Serialize};

/// Identity performing the operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActingIdentity {
    /// Fully qualified identity name, e.g. `extranet\editor`.
    pub name: String,
    /// Administrators bypass lock-before-edit entirely.
    pub is_administrator: bool,
}

impl ActingIdentity {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_administrator: false,
        }
    }

    pub fn administrator(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_administrator: true,
        }
    }
}

/// Site-level settings relevant to workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteSettings {
    pub name: String,
    pub enable_workflow: bool,
}

/// Override of the site's workflow switch for the current operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowEngagement {
    /// Defer to the current site.
    #[default]
    Default,
    Enabled,
    Disabled,
}

/// Everything the decision chain reads besides the item itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditContext {
    pub identity: ActingIdentity,
    /// Operation runs against administrative (system) data.
    pub administrative_context: bool,
    pub site: Option<SiteSettings>,
    pub engagement: WorkflowEngagement,
    pub require_lock_before_editing: bool,
}

impl EditContext {
    /// Context for `identity` with lock-before-edit on and no site.
    pub fn new(identity: ActingIdentity) -> Self {
        Self {
            identity,
            administrative_context: false,
            site: None,
            engagement: WorkflowEngagement::Default,
            require_lock_before_editing: true,
        }
    }

    pub fn with_site(mut self, site: SiteSettings) -> Self {
        self.site = Some(site);
        self
    }

    pub fn with_engagement(mut self, engagement: WorkflowEngagement) -> Self {
        self.engagement = engagement;
        self
    }

    pub fn with_administrative_context(mut self, administrative: bool) -> Self {
        self.administrative_context = administrative;
        self
    }

    pub fn with_lock_before_editing(mut self, required: bool) -> Self {
        self.require_lock_before_editing = required;
        self
    }
}
