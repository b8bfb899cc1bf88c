//! Ordered schema migrations for the content tree.
//!
//! # Responsibility
//! - Register each schema step with a version and a short name.
//! - Report and apply the steps a connection has not seen yet.
//!
//! # Invariants
//! - Versions are strictly increasing, starting at 1.
//! - All pending steps run in one transaction; a failing step leaves
//!   `PRAGMA user_version` where it was.

use crate::db::{DbError, DbResult};
use log::{error, info};
use rusqlite::Connection;

#[derive(Debug, Clone, Copy)]
struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "content_tree",
        sql: include_str!("0001_content_tree.sql"),
    },
    Migration {
        version: 2,
        name: "workflows",
        sql: include_str!("0002_workflows.sql"),
    },
];

/// Version and name of one registered migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationStep {
    pub version: u32,
    pub name: &'static str,
}

impl Migration {
    fn step(&self) -> MigrationStep {
        MigrationStep {
            version: self.version,
            name: self.name,
        }
    }
}

/// Returns the latest migration version known by this binary.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |migration| migration.version)
}

/// Schema version recorded on `conn`.
pub fn schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))
}

/// Lists the migrations `conn` still needs, in application order.
pub fn pending_migrations(conn: &Connection) -> DbResult<Vec<MigrationStep>> {
    let current = checked_version(conn)?;
    Ok(MIGRATIONS
        .iter()
        .filter(|migration| migration.version > current)
        .map(Migration::step)
        .collect())
}

/// Applies pending migrations and returns the steps that ran.
///
/// # Errors
/// - [`DbError::UnsupportedSchemaVersion`] when the database is newer than this binary.
/// - [`DbError::Migration`] naming the step whose SQL failed.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<Vec<MigrationStep>> {
    let current = checked_version(conn)?;
    let pending: Vec<&Migration> = MIGRATIONS
        .iter()
        .filter(|migration| migration.version > current)
        .collect();
    if pending.is_empty() {
        return Ok(Vec::new());
    }

    let tx = conn.transaction()?;
    for migration in &pending {
        let applied = tx.execute_batch(migration.sql).and_then(|()| {
            tx.execute_batch(&format!("PRAGMA user_version = {};", migration.version))
        });
        if let Err(source) = applied {
            error!(
                "event=db_migrate module=db status=error version={} name={} error={}",
                migration.version, migration.name, source
            );
            return Err(DbError::Migration {
                version: migration.version,
                name: migration.name,
                source,
            });
        }
        info!(
            "event=db_migrate module=db status=ok version={} name={}",
            migration.version, migration.name
        );
    }
    tx.commit()?;

    Ok(pending.into_iter().map(|migration| migration.step()).collect())
}

fn checked_version(conn: &Connection) -> DbResult<u32> {
    let current = schema_version(conn)?;
    let latest = latest_version();
    if current > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: current,
            latest_supported: latest,
        });
    }
    Ok(current)
}
