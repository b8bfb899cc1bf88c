//! Post-creation lock/version/workflow resolution.
//!
//! # Responsibility
//! - Decide whether a freshly created item is left alone, locked, or
//!   versioned and locked, and apply that decision through the tree store.
//! - Answer workflow predicates against the explicit `EditContext`.
//!
//! # Invariants
//! - Checks run in fixed order; the first match decides.
//! - Predicates have no side effects.
//! - A version is only added for items with an active, non-approved workflow,
//!   and the added version is the one that gets locked.
//! - A template without the lock field counts as locked without writing a lock.

use crate::model::context::{EditContext, WorkflowEngagement};
use crate::model::item::{
    ContentItem, DEFAULT_WORKFLOW_FIELD, LOCK_FIELD, WORKFLOW_FIELD, WORKFLOW_STATE_FIELD,
};
use crate::model::workflow::WorkflowHandle;
use crate::repo::item_repo::ItemRepoError;
use crate::repo::template_repo::TemplateRepoError;
use crate::repo::workflow_repo::WorkflowRepoError;
use crate::repo::ContentDatabase;
use log::{debug, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Why a created item could not be brought into an editable state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnpreparedReason {
    /// Another identity holds the lock.
    LockHeld,
    /// The template does not support additional versions.
    VersionUnavailable,
}

/// Final editing state of a created item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prepared {
    /// Returned as-is: lock-before-edit is off or the identity is an administrator.
    Unchanged(ContentItem),
    /// Locked by the acting identity, or its template has no lock field.
    Locked(ContentItem),
    /// A new version was added and that version is locked.
    VersionedAndLocked(ContentItem),
    /// Created, but not preparable. Not a deletion.
    Unprepared(UnpreparedReason),
}

impl Prepared {
    pub fn item(&self) -> Option<&ContentItem> {
        match self {
            Self::Unchanged(item) | Self::Locked(item) | Self::VersionedAndLocked(item) => {
                Some(item)
            }
            Self::Unprepared(_) => None,
        }
    }

    /// Stable decision label used in log events.
    pub fn decision(&self) -> &'static str {
        match self {
            Self::Unchanged(_) => "unchanged",
            Self::Locked(_) => "locked",
            Self::VersionedAndLocked(_) => "versioned_and_locked",
            Self::Unprepared(UnpreparedReason::LockHeld) => "lock_held",
            Self::Unprepared(UnpreparedReason::VersionUnavailable) => "version_unavailable",
        }
    }
}

/// Underlying failure of a workflow engagement.
#[derive(Debug)]
pub enum EngagementCause {
    Store(ItemRepoError),
    Template(TemplateRepoError),
    Workflow(WorkflowRepoError),
    /// Default workflow names a workflow that does not exist.
    WorkflowNotFound(Uuid),
    /// Workflow declares no usable initial state.
    MissingInitialState {
        workflow_id: Uuid,
        workflow_name: String,
    },
    /// Default workflow field does not hold a workflow id.
    InvalidWorkflowReference(String),
}

impl Display for EngagementCause {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store(err) => write!(f, "{err}"),
            Self::Template(err) => write!(f, "{err}"),
            Self::Workflow(err) => write!(f, "{err}"),
            Self::WorkflowNotFound(id) => write!(f, "workflow not found: {id}"),
            Self::MissingInitialState { workflow_name, .. } => {
                write!(f, "workflow `{workflow_name}` has no initial state")
            }
            Self::InvalidWorkflowReference(value) => {
                write!(f, "default workflow `{value}` is not a valid workflow id")
            }
        }
    }
}

/// Workflow-layer rejection raised while creating or preparing an item.
///
/// Carries the partially created item, if any, so the caller can compensate.
#[derive(Debug)]
pub struct WorkflowEngagementError {
    item: Option<ContentItem>,
    cause: EngagementCause,
}

impl WorkflowEngagementError {
    pub fn new(cause: EngagementCause) -> Self {
        Self { item: None, cause }
    }

    /// Attaches `item` unless an item is already attached.
    pub fn with_item(mut self, item: &ContentItem) -> Self {
        if self.item.is_none() {
            self.item = Some(item.clone());
        }
        self
    }

    pub fn item(&self) -> Option<&ContentItem> {
        self.item.as_ref()
    }

    pub fn cause(&self) -> &EngagementCause {
        &self.cause
    }
}

impl Display for WorkflowEngagementError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.cause)
    }
}

impl Error for WorkflowEngagementError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.cause {
            EngagementCause::Store(err) => Some(err),
            EngagementCause::Template(err) => Some(err),
            EngagementCause::Workflow(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ItemRepoError> for WorkflowEngagementError {
    fn from(value: ItemRepoError) -> Self {
        Self::new(EngagementCause::Store(value))
    }
}

impl From<TemplateRepoError> for WorkflowEngagementError {
    fn from(value: TemplateRepoError) -> Self {
        Self::new(EngagementCause::Template(value))
    }
}

impl From<WorkflowRepoError> for WorkflowEngagementError {
    fn from(value: WorkflowRepoError) -> Self {
        Self::new(EngagementCause::Workflow(value))
    }
}

fn attach<E>(item: &ContentItem) -> impl FnOnce(E) -> WorkflowEngagementError + '_
where
    E: Into<WorkflowEngagementError>,
{
    move |err| err.into().with_item(item)
}

/// Decision chain for one content database and one edit context.
pub struct WorkflowContext<'a> {
    db: ContentDatabase<'a>,
    context: &'a EditContext,
}

impl<'a> WorkflowContext<'a> {
    pub fn new(db: ContentDatabase<'a>, context: &'a EditContext) -> Self {
        Self { db, context }
    }

    pub fn edit_context(&self) -> &EditContext {
        self.context
    }

    /// Brings a freshly created item into its editing state.
    pub fn prepare(&self, item: ContentItem) -> Result<Prepared, WorkflowEngagementError> {
        let prepared = self.decide(item)?;
        debug!(
            "event=item_prepare module=workflow status=ok decision={} identity={}",
            prepared.decision(),
            self.context.identity.name
        );
        Ok(prepared)
    }

    fn decide(&self, item: ContentItem) -> Result<Prepared, WorkflowEngagementError> {
        let identity = &self.context.identity;
        if !self.context.require_lock_before_editing || identity.is_administrator {
            return Ok(Prepared::Unchanged(item));
        }
        if self.context.administrative_context {
            return self.lock(item);
        }
        if self
            .db
            .templates
            .is_standard_values_holder(&item)
            .map_err(attach(&item))?
        {
            return self.lock(item);
        }
        if !self.has_workflow(&item).map_err(attach(&item))? && !self.has_default_workflow(&item)
        {
            return self.lock(item);
        }
        if self.is_approved(&item, None).map_err(attach(&item))? {
            return self.lock(item);
        }

        let Some(version) = self.db.items.add_version(&item).map_err(attach(&item))? else {
            warn!(
                "event=item_prepare module=workflow status=error error_code=version_unavailable item_id={}",
                item.id
            );
            return Ok(Prepared::Unprepared(UnpreparedReason::VersionUnavailable));
        };
        let version = self.restart_in_initial_state(version)?;
        match self.lock(version)? {
            Prepared::Locked(locked) => Ok(Prepared::VersionedAndLocked(locked)),
            other => Ok(other),
        }
    }

    /// Locks `item` for the acting identity.
    ///
    /// Templates without the lock field have nothing to lock; the item is
    /// returned as `Locked` without a lock being written.
    pub fn lock(&self, item: ContentItem) -> Result<Prepared, WorkflowEngagementError> {
        let lockable = self
            .db
            .templates
            .is_field_part_of_template(LOCK_FIELD, &item)
            .map_err(attach(&item))?;
        if !lockable {
            return Ok(Prepared::Locked(item));
        }

        match self.db.items.try_lock(&item, &self.context.identity.name) {
            Ok(Some(locked)) => Ok(Prepared::Locked(locked)),
            Ok(None) => {
                warn!(
                    "event=item_lock module=workflow status=error error_code=lock_held item_id={} version={}",
                    item.id, item.version
                );
                Ok(Prepared::Unprepared(UnpreparedReason::LockHeld))
            }
            Err(err) => Err(WorkflowEngagementError::from(err).with_item(&item)),
        }
    }

    /// Returns whether workflow applies to the current operation.
    pub fn workflow_enabled(&self) -> bool {
        match self.context.engagement {
            WorkflowEngagement::Disabled => false,
            WorkflowEngagement::Enabled => true,
            WorkflowEngagement::Default => self
                .context
                .site
                .as_ref()
                .is_some_and(|site| site.enable_workflow),
        }
    }

    /// Returns whether `item` inherits a non-empty default workflow.
    pub fn has_default_workflow(&self, item: &ContentItem) -> bool {
        self.workflow_enabled() && item.field(DEFAULT_WORKFLOW_FIELD).is_some()
    }

    /// Returns whether a workflow resolves for `item`.
    pub fn has_workflow(&self, item: &ContentItem) -> Result<bool, WorkflowEngagementError> {
        if !self.workflow_enabled() {
            return Ok(false);
        }
        Ok(self.get_workflow(item)?.is_some())
    }

    /// Returns whether `item` is approved, optionally for `target` only.
    ///
    /// Items without a workflow are approved.
    pub fn is_approved(
        &self,
        item: &ContentItem,
        target: Option<&str>,
    ) -> Result<bool, WorkflowEngagementError> {
        Ok(match self.get_workflow(item)? {
            Some(workflow) => workflow.is_approved(item, target),
            None => true,
        })
    }

    /// Resolves the workflow of `item` through the database's provider.
    pub fn get_workflow(
        &self,
        item: &ContentItem,
    ) -> Result<Option<WorkflowHandle>, WorkflowEngagementError> {
        if !self.workflow_enabled() {
            return Ok(None);
        }
        let Some(provider) = self.db.workflows else {
            return Ok(None);
        };
        Ok(provider.get_workflow(item)?)
    }

    /// Starts `item` in its inherited default workflow.
    ///
    /// No-op when workflow is off, the database has no provider, a workflow
    /// is already assigned, or no default workflow is inherited.
    pub fn start_default_workflow(
        &self,
        item: ContentItem,
    ) -> Result<ContentItem, WorkflowEngagementError> {
        if !self.workflow_enabled() || item.field(WORKFLOW_FIELD).is_some() {
            return Ok(item);
        }
        let Some(provider) = self.db.workflows else {
            return Ok(item);
        };
        let Some(reference) = item.field(DEFAULT_WORKFLOW_FIELD) else {
            return Ok(item);
        };

        let workflow_id = Uuid::parse_str(reference).map_err(|_| {
            WorkflowEngagementError::new(EngagementCause::InvalidWorkflowReference(
                reference.to_string(),
            ))
            .with_item(&item)
        })?;
        let workflow = provider
            .workflow_by_id(workflow_id)
            .map_err(attach(&item))?
            .ok_or_else(|| {
                WorkflowEngagementError::new(EngagementCause::WorkflowNotFound(workflow_id))
                    .with_item(&item)
            })?;
        let state_id = initial_state_id(&workflow).map_err(|err| err.with_item(&item))?;

        let item = self
            .db
            .items
            .set_field(&item, WORKFLOW_FIELD, &workflow.id.to_string())
            .map_err(attach(&item))?;
        let item = self
            .db
            .items
            .set_field(&item, WORKFLOW_STATE_FIELD, &state_id.to_string())
            .map_err(attach(&item))?;

        info!(
            "event=workflow_start module=workflow status=ok item_id={} workflow_id={} state_id={}",
            item.id, workflow.id, state_id
        );
        Ok(item)
    }

    fn restart_in_initial_state(
        &self,
        version: ContentItem,
    ) -> Result<ContentItem, WorkflowEngagementError> {
        let Some(workflow) = self.get_workflow(&version).map_err(attach(&version))? else {
            return Ok(version);
        };
        let state_id = initial_state_id(&workflow).map_err(|err| err.with_item(&version))?;
        self.db
            .items
            .set_field(&version, WORKFLOW_STATE_FIELD, &state_id.to_string())
            .map_err(attach(&version))
    }
}

fn initial_state_id(workflow: &WorkflowHandle) -> Result<Uuid, WorkflowEngagementError> {
    workflow
        .initial_state()
        .map(|state| state.id)
        .ok_or_else(|| {
            WorkflowEngagementError::new(EngagementCause::MissingInitialState {
                workflow_id: workflow.id,
                workflow_name: workflow.name.clone(),
            })
        })
}
