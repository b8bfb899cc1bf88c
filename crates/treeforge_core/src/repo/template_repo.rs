//! Template, branch and command master repository.
//!
//! # Responsibility
//! - Load creation blueprints by id.
//! - Answer template introspection questions for the creation core.
//!
//! # Invariants
//! - Master ids are unique across templates, branches and command masters.
//! - A template has at most one standard values holder.

use crate::db::DbError;
use crate::model::definition::{
    BranchChild, BranchDefinition, DefinitionSource, MasterDefinition, TemplateDefinition,
};
use crate::model::item::{ContentItem, ItemId};
use crate::repo::{ensure_connection_ready, parse_flag, parse_uuid, SchemaError};
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type TemplateRepoResult<T> = Result<T, TemplateRepoError>;

#[derive(Debug)]
pub enum TemplateRepoError {
    Db(DbError),
    Schema(SchemaError),
    TemplateNotFound(Uuid),
    /// Name is blank after trim.
    InvalidName,
    InvalidData(String),
}

impl Display for TemplateRepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Schema(err) => write!(f, "template repository: {err}"),
            Self::TemplateNotFound(id) => write!(f, "template not found: {id}"),
            Self::InvalidName => write!(f, "definition name must not be blank"),
            Self::InvalidData(message) => write!(f, "invalid template data: {message}"),
        }
    }
}

impl Error for TemplateRepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Schema(err) => Some(err),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for TemplateRepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<SchemaError> for TemplateRepoError {
    fn from(value: SchemaError) -> Self {
        Self::Schema(value)
    }
}

/// Template introspection consumed by the creation core.
pub trait TemplateRepository {
    fn get_template(&self, id: Uuid) -> TemplateRepoResult<Option<TemplateDefinition>>;
    fn get_branch(&self, id: Uuid) -> TemplateRepoResult<Option<BranchDefinition>>;
    /// Resolves an "add from master" target of any kind.
    fn find_master(&self, id: Uuid) -> TemplateRepoResult<Option<MasterDefinition>>;
    /// Returns whether `item`'s template declares `field`.
    fn is_field_part_of_template(&self, field: &str, item: &ContentItem)
        -> TemplateRepoResult<bool>;
    /// Returns whether `item` carries its template's standard values.
    fn is_standard_values_holder(&self, item: &ContentItem) -> TemplateRepoResult<bool>;
}

/// SQLite-backed template repository.
pub struct SqliteTemplateRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTemplateRepository<'conn> {
    pub fn try_new(conn: &'conn Connection) -> TemplateRepoResult<Self> {
        ensure_connection_ready(
            conn,
            &[
                "templates",
                "template_fields",
                "branches",
                "branch_children",
                "command_masters",
            ],
        )?;
        Ok(Self { conn })
    }

    /// Registers one template with its declared fields.
    pub fn create_template(
        &self,
        name: &str,
        fields: &[&str],
        versioning_enabled: bool,
    ) -> TemplateRepoResult<TemplateDefinition> {
        let name = normalize_name(name)?;
        let id = Uuid::new_v4();
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT INTO templates (template_uuid, name, versioning_enabled)
             VALUES (?1, ?2, ?3);",
            params![id.to_string(), name, i64::from(versioning_enabled)],
        )?;
        for field in fields {
            tx.execute(
                "INSERT OR IGNORE INTO template_fields (template_uuid, field_name)
                 VALUES (?1, ?2);",
                params![id.to_string(), field],
            )?;
        }
        tx.commit()?;
        self.require_template(id)
    }

    /// Marks `holder_id` as the standard values holder of `template_id`.
    pub fn set_standard_values(
        &self,
        template_id: Uuid,
        holder_id: ItemId,
    ) -> TemplateRepoResult<TemplateDefinition> {
        let changed = self.conn.execute(
            "UPDATE templates
             SET standard_values_uuid = ?2
             WHERE template_uuid = ?1;",
            params![template_id.to_string(), holder_id.to_string()],
        )?;
        if changed == 0 {
            return Err(TemplateRepoError::TemplateNotFound(template_id));
        }
        self.require_template(template_id)
    }

    /// Registers one branch rooted at `template_id`.
    pub fn create_branch(
        &self,
        name: &str,
        template_id: Uuid,
        children: &[BranchChild],
    ) -> TemplateRepoResult<BranchDefinition> {
        let name = normalize_name(name)?;
        self.require_template(template_id)?;
        for child in children {
            self.require_template(child.template_id)?;
        }

        let id = Uuid::new_v4();
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT INTO branches (branch_uuid, name, template_uuid)
             VALUES (?1, ?2, ?3);",
            params![id.to_string(), name, template_id.to_string()],
        )?;
        for (index, child) in children.iter().enumerate() {
            tx.execute(
                "INSERT INTO branch_children (branch_uuid, name, template_uuid, sort_order)
                 VALUES (?1, ?2, ?3, ?4);",
                params![
                    id.to_string(),
                    child.name,
                    child.template_id.to_string(),
                    index as i64
                ],
            )?;
        }
        tx.commit()?;

        self.get_branch(id)?
            .ok_or_else(|| TemplateRepoError::InvalidData(format!("branch {id} vanished")))
    }

    /// Registers one command master.
    pub fn create_command_master(
        &self,
        name: &str,
        command: &str,
    ) -> TemplateRepoResult<MasterDefinition> {
        let name = normalize_name(name)?;
        let id = Uuid::new_v4();
        self.conn.execute(
            "INSERT INTO command_masters (master_uuid, name, command)
             VALUES (?1, ?2, ?3);",
            params![id.to_string(), name, command],
        )?;
        Ok(MasterDefinition::Command {
            id,
            name,
            command: command.to_string(),
        })
    }

    fn require_template(&self, id: Uuid) -> TemplateRepoResult<TemplateDefinition> {
        self.get_template(id)?
            .ok_or(TemplateRepoError::TemplateNotFound(id))
    }
}

impl TemplateRepository for SqliteTemplateRepository<'_> {
    fn get_template(&self, id: Uuid) -> TemplateRepoResult<Option<TemplateDefinition>> {
        let row: Option<(String, i64, Option<String>)> = self
            .conn
            .query_row(
                "SELECT name, versioning_enabled, standard_values_uuid
                 FROM templates
                 WHERE template_uuid = ?1;",
                [id.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;
        let Some((name, versioning_enabled, standard_values)) = row else {
            return Ok(None);
        };

        let mut stmt = self.conn.prepare(
            "SELECT field_name
             FROM template_fields
             WHERE template_uuid = ?1
             ORDER BY field_name ASC;",
        )?;
        let mut rows = stmt.query([id.to_string()])?;
        let mut fields = Vec::new();
        while let Some(row) = rows.next()? {
            fields.push(row.get(0)?);
        }

        Ok(Some(TemplateDefinition {
            id,
            name,
            fields,
            versioning_enabled: parse_flag(versioning_enabled, "templates.versioning_enabled")
                .map_err(TemplateRepoError::InvalidData)?,
            standard_values_id: standard_values
                .map(|value| parse_uuid(&value, "templates.standard_values_uuid"))
                .transpose()
                .map_err(TemplateRepoError::InvalidData)?,
        }))
    }

    fn get_branch(&self, id: Uuid) -> TemplateRepoResult<Option<BranchDefinition>> {
        let row: Option<(String, String)> = self
            .conn
            .query_row(
                "SELECT name, template_uuid
                 FROM branches
                 WHERE branch_uuid = ?1;",
                [id.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((name, template_text)) = row else {
            return Ok(None);
        };

        let mut stmt = self.conn.prepare(
            "SELECT name, template_uuid
             FROM branch_children
             WHERE branch_uuid = ?1
             ORDER BY sort_order ASC;",
        )?;
        let mut rows = stmt.query([id.to_string()])?;
        let mut children = Vec::new();
        while let Some(row) = rows.next()? {
            let child_template: String = row.get(1)?;
            children.push(BranchChild {
                name: row.get(0)?,
                template_id: parse_uuid(&child_template, "branch_children.template_uuid")
                    .map_err(TemplateRepoError::InvalidData)?,
            });
        }

        Ok(Some(BranchDefinition {
            id,
            name,
            template_id: parse_uuid(&template_text, "branches.template_uuid")
                .map_err(TemplateRepoError::InvalidData)?,
            children,
        }))
    }

    fn find_master(&self, id: Uuid) -> TemplateRepoResult<Option<MasterDefinition>> {
        if let Some(branch) = self.get_branch(id)? {
            return Ok(Some(MasterDefinition::Definition(DefinitionSource::Branch(
                branch,
            ))));
        }
        if let Some(template) = self.get_template(id)? {
            return Ok(Some(MasterDefinition::Definition(
                DefinitionSource::Template(template),
            )));
        }

        let command: Option<(String, String)> = self
            .conn
            .query_row(
                "SELECT name, command
                 FROM command_masters
                 WHERE master_uuid = ?1;",
                [id.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(command.map(|(name, command)| MasterDefinition::Command { id, name, command }))
    }

    fn is_field_part_of_template(
        &self,
        field: &str,
        item: &ContentItem,
    ) -> TemplateRepoResult<bool> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM template_fields
                WHERE template_uuid = ?1
                  AND field_name = ?2
            );",
            params![item.template_id.to_string(), field],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }

    fn is_standard_values_holder(&self, item: &ContentItem) -> TemplateRepoResult<bool> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM templates
                WHERE template_uuid = ?1
                  AND standard_values_uuid = ?2
            );",
            params![item.template_id.to_string(), item.id.to_string()],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }
}

fn normalize_name(value: &str) -> TemplateRepoResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(TemplateRepoError::InvalidName);
    }
    Ok(trimmed.to_string())
}
