//! Item creation use-case service.
//!
//! # Responsibility
//! - Create items from template/branch definitions under a parent.
//! - Engage the default workflow and hand the item to the post-creation
//!   resolver.
//! - Own compensation: delete a partially created item when workflow
//!   engagement fails.
//!
//! # Invariants
//! - Create rights are checked before any store mutation.
//! - A partially created item is never returned; on engagement failure it
//!   is deleted and the original error is reported.
//! - Compensation failures are logged, never reported in place of the
//!   original error.

use crate::model::context::EditContext;
use crate::model::definition::{DefinitionKind, DefinitionSource, MasterDefinition};
use crate::model::item::{ContentItem, ItemId};
use crate::repo::item_repo::ItemRepoError;
use crate::repo::template_repo::TemplateRepoError;
use crate::repo::ContentDatabase;
use crate::security::AccessPolicy;
use crate::service::audit::{AuditEntry, AuditSink};
use crate::service::workflow_context::{Prepared, WorkflowContext, WorkflowEngagementError};
use crate::settings::ItemNameValidator;
use log::{error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use uuid::Uuid;

/// Errors from item creation use-cases.
#[derive(Debug)]
pub enum CreationError {
    /// Required input is missing or malformed.
    InvalidArgument(String),
    /// Identity lacks create rights under the parent.
    PermissionDenied { parent_id: ItemId },
    /// Parent does not exist in the requested language.
    ParentNotFound(ItemId),
    /// Master id resolves to no branch, template or command.
    DefinitionNotFound(Uuid),
    /// Creation or preparation was rejected; compensation already ran.
    WorkflowEngagement(WorkflowEngagementError),
    /// Store lookup failure outside the create path.
    Store(ItemRepoError),
    /// Definition lookup failure.
    Template(TemplateRepoError),
}

impl Display for CreationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidArgument(message) => write!(f, "{message}"),
            Self::PermissionDenied { .. } => {
                write!(f, "You do not have permission to create items here.")
            }
            Self::ParentNotFound(_) => write!(f, "Parent item not found."),
            Self::DefinitionNotFound(id) => write!(f, "Branch \"{id}\" not found."),
            Self::WorkflowEngagement(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
            Self::Template(err) => write!(f, "{err}"),
        }
    }
}

impl Error for CreationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::WorkflowEngagement(err) => Some(err),
            Self::Store(err) => Some(err),
            Self::Template(err) => Some(err),
            _ => None,
        }
    }
}

impl From<WorkflowEngagementError> for CreationError {
    fn from(value: WorkflowEngagementError) -> Self {
        Self::WorkflowEngagement(value)
    }
}

impl From<ItemRepoError> for CreationError {
    fn from(value: ItemRepoError) -> Self {
        Self::Store(value)
    }
}

impl From<TemplateRepoError> for CreationError {
    fn from(value: TemplateRepoError) -> Self {
        Self::Template(value)
    }
}

/// Result of a successful creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreationOutcome {
    /// Created item; exists even when `prepared` is `Unprepared`.
    pub item_id: ItemId,
    pub kind: DefinitionKind,
    pub prepared: Prepared,
}

impl CreationOutcome {
    pub fn item(&self) -> Option<&ContentItem> {
        self.prepared.item()
    }
}

/// "Add from master" request, as resumed after the name prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddFromMasterRequest {
    pub master_id: Uuid,
    pub parent_id: ItemId,
    pub language: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MasterOutcome {
    Created(CreationOutcome),
    /// Command master: nothing was created; the caller dispatches the command.
    Command(String),
}

/// Availability of the "add from master" command for a selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandState {
    Hidden,
    Disabled,
    Enabled,
}

/// Receives created items after they are prepared.
pub trait ItemCreatedListener {
    fn item_created(&self, item: &ContentItem);
}

/// Item creation coordinator.
pub struct CreationService<'a> {
    db: ContentDatabase<'a>,
    access: &'a dyn AccessPolicy,
    audit: &'a dyn AuditSink,
    names: ItemNameValidator,
    listeners: Vec<Arc<dyn ItemCreatedListener>>,
}

impl<'a> CreationService<'a> {
    pub fn new(
        db: ContentDatabase<'a>,
        access: &'a dyn AccessPolicy,
        audit: &'a dyn AuditSink,
    ) -> Self {
        Self {
            db,
            access,
            audit,
            names: ItemNameValidator::default(),
            listeners: Vec::new(),
        }
    }

    pub fn with_name_validator(mut self, names: ItemNameValidator) -> Self {
        self.names = names;
        self
    }

    /// Registers a listener notified for every prepared item.
    pub fn subscribe(&mut self, listener: Arc<dyn ItemCreatedListener>) {
        self.listeners.push(listener);
    }

    /// Returns whether "add from master" is offered for `selection`.
    pub fn query_state(&self, context: &EditContext, selection: &[ContentItem]) -> CommandState {
        let [parent] = selection else {
            return CommandState::Hidden;
        };
        if !self.access.can_create(parent, &context.identity) {
            return CommandState::Disabled;
        }
        CommandState::Enabled
    }

    /// Resolves master and parent, then creates the item.
    pub fn add_from_master(
        &self,
        context: &EditContext,
        request: &AddFromMasterRequest,
    ) -> Result<MasterOutcome, CreationError> {
        let master = self
            .db
            .templates
            .find_master(request.master_id)?
            .ok_or(CreationError::DefinitionNotFound(request.master_id))?;
        let source = match master {
            MasterDefinition::Command { id, command, .. } => {
                info!(
                    "event=master_command module=creation status=ok master_id={} command={}",
                    id, command
                );
                return Ok(MasterOutcome::Command(command));
            }
            MasterDefinition::Definition(source) => source,
        };

        let parent = self
            .db
            .items
            .get_item(request.parent_id, &request.language)?
            .ok_or(CreationError::ParentNotFound(request.parent_id))?;

        self.create_from_definition(context, &request.name, &source, &parent)
            .map(MasterOutcome::Created)
    }

    /// Creates `name` from `source` under `parent` and prepares it for editing.
    ///
    /// # Errors
    /// - `InvalidArgument` for blank or rule-violating names.
    /// - `PermissionDenied` before any store mutation.
    /// - `WorkflowEngagement` after the partially created item was deleted.
    pub fn create_from_definition(
        &self,
        context: &EditContext,
        name: &str,
        source: &DefinitionSource,
        parent: &ContentItem,
    ) -> Result<CreationOutcome, CreationError> {
        let name = self.validate_name(name)?;
        if !self.access.can_create(parent, &context.identity) {
            warn!(
                "event=item_create module=creation status=error error_code=permission_denied parent_id={} identity={}",
                parent.id, context.identity.name
            );
            return Err(CreationError::PermissionDenied {
                parent_id: parent.id,
            });
        }

        let workflow = WorkflowContext::new(self.db, context);
        let outcome = match self.add_and_prepare(&workflow, name, source, parent) {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(
                    "event=item_create module=creation status=error error_code=workflow_engagement parent_id={} kind={} error={}",
                    parent.id,
                    source.kind(),
                    err
                );
                self.compensate(&err);
                return Err(err.into());
            }
        };

        self.audit.record(&AuditEntry::item_added(
            &context.identity.name,
            source,
            outcome.item_id,
        ));
        info!(
            "event=item_create module=creation status=ok item_id={} kind={} decision={}",
            outcome.item_id,
            outcome.kind,
            outcome.prepared.decision()
        );

        if let Some(item) = outcome.item() {
            for listener in &self.listeners {
                listener.item_created(item);
            }
        }
        Ok(outcome)
    }

    fn add_and_prepare(
        &self,
        workflow: &WorkflowContext<'_>,
        name: &str,
        source: &DefinitionSource,
        parent: &ContentItem,
    ) -> Result<CreationOutcome, WorkflowEngagementError> {
        let item = self.db.items.add_item(parent, name, source)?;
        let item = workflow.start_default_workflow(item)?;
        let item_id = item.id;
        let prepared = workflow.prepare(item)?;
        Ok(CreationOutcome {
            item_id,
            kind: source.kind(),
            prepared,
        })
    }

    fn compensate(&self, err: &WorkflowEngagementError) {
        let Some(item) = err.item() else {
            return;
        };
        // No access check: the caller may hold create but not delete rights.
        match self.db.items.delete_item(item.id) {
            Ok(()) => info!(
                "event=item_compensate module=creation status=ok item_id={} elevated=true",
                item.id
            ),
            Err(delete_err) => error!(
                "event=item_compensate module=creation status=error item_id={} elevated=true error={}",
                item.id, delete_err
            ),
        }
    }

    fn validate_name<'n>(&self, name: &'n str) -> Result<&'n str, CreationError> {
        if name.trim().is_empty() {
            return Err(CreationError::InvalidArgument(
                "item name must not be empty".to_string(),
            ));
        }
        // The pattern sees the raw input; surrounding whitespace is not stripped.
        if !self.names.is_valid(name) {
            return Err(CreationError::InvalidArgument(format!(
                "'{name}' is not a valid name."
            )));
        }
        Ok(name)
    }
}
