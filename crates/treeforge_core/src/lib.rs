//! Core domain logic for TreeForge item creation.
//! This crate owns the creation, workflow and locking invariants of the content tree.

pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod security;
pub mod service;
pub mod settings;

pub use db::{open_db, open_db_in_memory, DbError};
pub use logging::{default_log_level, init_logging, logging_status, LogDestination, LoggingError};
pub use model::context::{ActingIdentity, EditContext, SiteSettings, WorkflowEngagement};
pub use model::definition::{
    BranchChild, BranchDefinition, DefinitionKind, DefinitionSource, MasterDefinition,
    TemplateDefinition,
};
pub use model::item::{ContentItem, ItemId, ItemLock};
pub use model::workflow::{WorkflowHandle, WorkflowState};
pub use repo::item_repo::{ItemRepoError, ItemStore, SqliteItemRepository};
pub use repo::template_repo::{SqliteTemplateRepository, TemplateRepoError, TemplateRepository};
pub use repo::workflow_repo::{SqliteWorkflowProvider, WorkflowProvider, WorkflowRepoError};
pub use repo::ContentDatabase;
pub use security::{AccessPolicy, AllowAll, ReadOnlyParents};
pub use service::audit::{AuditEntry, AuditSink, LogAuditSink};
pub use service::creation_service::{
    AddFromMasterRequest, CommandState, CreationError, CreationOutcome, CreationService,
    ItemCreatedListener, MasterOutcome,
};
pub use service::workflow_context::{
    EngagementCause, Prepared, UnpreparedReason, WorkflowContext, WorkflowEngagementError,
};
pub use settings::{ItemNameValidator, Settings, SettingsError};

/// Minimal health-check API for linkage probes.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
