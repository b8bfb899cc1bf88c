//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the collaborator contracts consumed by the creation core: tree
//!   store, template introspection and workflow lookup.
//! - Isolate SQLite query details from service orchestration.
//!
//! # Invariants
//! - SQLite repositories refuse connections that are not fully migrated.
//! - Repository APIs return semantic errors (`*NotFound`) in addition to DB
//!   transport errors.

pub mod item_repo;
pub mod template_repo;
pub mod workflow_repo;

use crate::db::migrations::{latest_version, schema_version};
use item_repo::ItemStore;
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};
use template_repo::TemplateRepository;
use workflow_repo::WorkflowProvider;

/// Collaborators of one content database, borrowed for one operation.
///
/// `workflows` is `None` when the database exposes no workflow provider.
#[derive(Clone, Copy)]
pub struct ContentDatabase<'a> {
    pub items: &'a dyn ItemStore,
    pub templates: &'a dyn TemplateRepository,
    pub workflows: Option<&'a dyn WorkflowProvider>,
}

impl<'a> ContentDatabase<'a> {
    pub fn new(
        items: &'a dyn ItemStore,
        templates: &'a dyn TemplateRepository,
        workflows: Option<&'a dyn WorkflowProvider>,
    ) -> Self {
        Self {
            items,
            templates,
            workflows,
        }
    }
}

/// Schema readiness failures shared by SQLite repositories.
#[derive(Debug)]
pub enum SchemaError {
    Sqlite(rusqlite::Error),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
}

impl Display for SchemaError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "repository requires table `{table}`")
            }
        }
    }
}

impl Error for SchemaError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for SchemaError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

pub(crate) fn ensure_connection_ready(
    conn: &Connection,
    tables: &[&'static str],
) -> Result<(), SchemaError> {
    let expected_version = latest_version();
    let actual_version = schema_version(conn)?;
    if actual_version != expected_version {
        return Err(SchemaError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for table in tables {
        let exists: i64 = conn.query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table],
            |row| row.get(0),
        )?;
        if exists != 1 {
            return Err(SchemaError::MissingRequiredTable(table));
        }
    }
    Ok(())
}

pub(crate) fn parse_uuid(value: &str, column: &'static str) -> Result<uuid::Uuid, String> {
    uuid::Uuid::parse_str(value).map_err(|_| format!("invalid uuid `{value}` in {column}"))
}

pub(crate) fn parse_flag(value: i64, column: &'static str) -> Result<bool, String> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(format!("invalid flag value `{other}` in {column}")),
    }
}
