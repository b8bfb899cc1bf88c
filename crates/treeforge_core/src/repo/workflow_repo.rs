//! Workflow definition lookup and SQLite implementation.
//!
//! # Responsibility
//! - Resolve the workflow assigned to an item into a read-only handle.
//! - Register workflow definitions and their states.
//!
//! # Invariants
//! - Lookups never mutate items or workflows.
//! - States are returned in declaration order.

use crate::db::DbError;
use crate::model::item::{ContentItem, WORKFLOW_FIELD};
use crate::model::workflow::{WorkflowHandle, WorkflowState};
use crate::repo::{ensure_connection_ready, parse_flag, parse_uuid, SchemaError};
use rusqlite::{params, Connection, OptionalExtension};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type WorkflowRepoResult<T> = Result<T, WorkflowRepoError>;

#[derive(Debug)]
pub enum WorkflowRepoError {
    Db(DbError),
    Schema(SchemaError),
    WorkflowNotFound(Uuid),
    /// State does not belong to the workflow it is used with.
    StateNotInWorkflow {
        workflow_id: Uuid,
        state_id: Uuid,
    },
    InvalidData(String),
}

impl Display for WorkflowRepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Schema(err) => write!(f, "workflow repository: {err}"),
            Self::WorkflowNotFound(id) => write!(f, "workflow not found: {id}"),
            Self::StateNotInWorkflow {
                workflow_id,
                state_id,
            } => write!(f, "state {state_id} is not part of workflow {workflow_id}"),
            Self::InvalidData(message) => write!(f, "invalid workflow data: {message}"),
        }
    }
}

impl Error for WorkflowRepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Schema(err) => Some(err),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for WorkflowRepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<SchemaError> for WorkflowRepoError {
    fn from(value: SchemaError) -> Self {
        Self::Schema(value)
    }
}

/// Workflow lookup exposed by a content database.
pub trait WorkflowProvider {
    /// Returns the workflow assigned to `item`, if any.
    fn get_workflow(&self, item: &ContentItem) -> WorkflowRepoResult<Option<WorkflowHandle>>;
    /// Loads one workflow definition by id.
    fn workflow_by_id(&self, id: Uuid) -> WorkflowRepoResult<Option<WorkflowHandle>>;
}

/// SQLite-backed workflow provider.
pub struct SqliteWorkflowProvider<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteWorkflowProvider<'conn> {
    pub fn try_new(conn: &'conn Connection) -> WorkflowRepoResult<Self> {
        ensure_connection_ready(conn, &["workflows", "workflow_states"])?;
        Ok(Self { conn })
    }

    /// Registers an empty workflow.
    pub fn create_workflow(&self, name: &str) -> WorkflowRepoResult<WorkflowHandle> {
        let id = Uuid::new_v4();
        self.conn.execute(
            "INSERT INTO workflows (workflow_uuid, name) VALUES (?1, ?2);",
            params![id.to_string(), name.trim()],
        )?;
        self.require_workflow(id)
    }

    /// Appends one state to `workflow_id`.
    pub fn add_state(
        &self,
        workflow_id: Uuid,
        name: &str,
        is_final: bool,
        preview_targets: &[&str],
    ) -> WorkflowRepoResult<WorkflowState> {
        self.require_workflow(workflow_id)?;
        let id = Uuid::new_v4();
        let targets = preview_targets
            .iter()
            .map(|target| target.trim())
            .filter(|target| !target.is_empty())
            .collect::<Vec<_>>();
        self.conn.execute(
            "INSERT INTO workflow_states (
                state_uuid,
                workflow_uuid,
                name,
                is_final,
                preview_targets,
                sort_order
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5,
                (SELECT COALESCE(MAX(sort_order), -1) + 1
                 FROM workflow_states
                 WHERE workflow_uuid = ?2)
            );",
            params![
                id.to_string(),
                workflow_id.to_string(),
                name.trim(),
                i64::from(is_final),
                targets.join(","),
            ],
        )?;
        Ok(WorkflowState {
            id,
            name: name.trim().to_string(),
            is_final,
            preview_targets: targets.into_iter().map(str::to_string).collect(),
        })
    }

    /// Sets the state new items are started in.
    pub fn set_initial_state(
        &self,
        workflow_id: Uuid,
        state_id: Uuid,
    ) -> WorkflowRepoResult<WorkflowHandle> {
        let workflow = self.require_workflow(workflow_id)?;
        if workflow.state(state_id).is_none() {
            return Err(WorkflowRepoError::StateNotInWorkflow {
                workflow_id,
                state_id,
            });
        }
        self.conn.execute(
            "UPDATE workflows SET initial_state_uuid = ?2 WHERE workflow_uuid = ?1;",
            params![workflow_id.to_string(), state_id.to_string()],
        )?;
        self.require_workflow(workflow_id)
    }

    fn require_workflow(&self, id: Uuid) -> WorkflowRepoResult<WorkflowHandle> {
        self.workflow_by_id(id)?
            .ok_or(WorkflowRepoError::WorkflowNotFound(id))
    }

    fn load_states(&self, workflow_id: Uuid) -> WorkflowRepoResult<Vec<WorkflowState>> {
        let mut stmt = self.conn.prepare(
            "SELECT state_uuid, name, is_final, preview_targets
             FROM workflow_states
             WHERE workflow_uuid = ?1
             ORDER BY sort_order ASC, state_uuid ASC;",
        )?;
        let mut rows = stmt.query([workflow_id.to_string()])?;
        let mut states = Vec::new();
        while let Some(row) = rows.next()? {
            let id_text: String = row.get(0)?;
            let targets: String = row.get(3)?;
            states.push(WorkflowState {
                id: parse_uuid(&id_text, "workflow_states.state_uuid")
                    .map_err(WorkflowRepoError::InvalidData)?,
                name: row.get(1)?,
                is_final: parse_flag(row.get(2)?, "workflow_states.is_final")
                    .map_err(WorkflowRepoError::InvalidData)?,
                preview_targets: targets
                    .split(',')
                    .map(str::trim)
                    .filter(|target| !target.is_empty())
                    .map(str::to_string)
                    .collect(),
            });
        }
        Ok(states)
    }
}

impl WorkflowProvider for SqliteWorkflowProvider<'_> {
    fn get_workflow(&self, item: &ContentItem) -> WorkflowRepoResult<Option<WorkflowHandle>> {
        let Some(value) = item.field(WORKFLOW_FIELD) else {
            return Ok(None);
        };
        let workflow_id = parse_uuid(value, "item_fields.__Workflow")
            .map_err(WorkflowRepoError::InvalidData)?;
        self.workflow_by_id(workflow_id)
    }

    fn workflow_by_id(&self, id: Uuid) -> WorkflowRepoResult<Option<WorkflowHandle>> {
        let row: Option<(String, Option<String>)> = self
            .conn
            .query_row(
                "SELECT name, initial_state_uuid
                 FROM workflows
                 WHERE workflow_uuid = ?1;",
                [id.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((name, initial_state)) = row else {
            return Ok(None);
        };

        Ok(Some(WorkflowHandle {
            id,
            name,
            initial_state_id: initial_state
                .map(|value| parse_uuid(&value, "workflows.initial_state_uuid"))
                .transpose()
                .map_err(WorkflowRepoError::InvalidData)?,
            states: self.load_states(id)?,
        }))
    }
}
