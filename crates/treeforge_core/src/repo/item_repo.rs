//! Content tree store contracts and SQLite implementation.
//!
//! # Responsibility
//! - Materialize items from template/branch definitions under a parent.
//! - Provide version, lock and field primitives over item versions.
//! - Keep SQL details and ordering behavior inside repository boundary.
//!
//! # Invariants
//! - Only active (`is_deleted=0`) items are returned.
//! - Active siblings have distinct names.
//! - A branch subtree is created atomically: root and children or nothing.
//! - A lock held by one identity is never overwritten by another.

use crate::db::{is_constraint_violation, DbError};
use crate::model::definition::DefinitionSource;
use crate::model::item::{ContentItem, ItemId, ItemLock};
use crate::repo::{ensure_connection_ready, parse_flag, parse_uuid, SchemaError};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Result type used by tree store operations.
pub type ItemRepoResult<T> = Result<T, ItemRepoError>;

/// Errors from tree store operations.
#[derive(Debug)]
pub enum ItemRepoError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Connection is not usable by this repository.
    Schema(SchemaError),
    /// Target item does not exist or is soft-deleted.
    ItemNotFound(ItemId),
    /// Target item has no such version in the requested language.
    VersionNotFound {
        item_id: ItemId,
        language: String,
        version: u32,
    },
    /// Definition references a template that does not exist.
    TemplateNotFound(Uuid),
    /// An active sibling already uses the requested name.
    DuplicateName {
        parent_id: Option<ItemId>,
        name: String,
    },
    /// Persisted data cannot be converted to valid read model.
    InvalidData(String),
}

impl Display for ItemRepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Schema(err) => write!(f, "item store: {err}"),
            Self::ItemNotFound(id) => write!(f, "item not found: {id}"),
            Self::VersionNotFound {
                item_id,
                language,
                version,
            } => write!(f, "item version not found: {item_id} {language}#{version}"),
            Self::TemplateNotFound(id) => write!(f, "template not found: {id}"),
            Self::DuplicateName { name, .. } => {
                write!(f, "an item named `{name}` already exists at this level")
            }
            Self::InvalidData(message) => write!(f, "invalid item data: {message}"),
        }
    }
}

impl Error for ItemRepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Schema(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for ItemRepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for ItemRepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<SchemaError> for ItemRepoError {
    fn from(value: SchemaError) -> Self {
        Self::Schema(value)
    }
}

/// Tree store primitives consumed by the creation core.
pub trait ItemStore {
    /// Creates one item (or branch subtree) under `parent` in the parent's language.
    fn add_item(
        &self,
        parent: &ContentItem,
        name: &str,
        source: &DefinitionSource,
    ) -> ItemRepoResult<ContentItem>;
    /// Loads the latest version of one item in `language`.
    fn get_item(&self, id: ItemId, language: &str) -> ItemRepoResult<Option<ContentItem>>;
    /// Loads one specific version.
    fn get_version(
        &self,
        id: ItemId,
        language: &str,
        version: u32,
    ) -> ItemRepoResult<Option<ContentItem>>;
    /// Lists latest versions of children that exist in `language`.
    fn list_children(&self, parent_id: ItemId, language: &str)
        -> ItemRepoResult<Vec<ContentItem>>;
    /// Soft-deletes one item and its subtree.
    fn delete_item(&self, id: ItemId) -> ItemRepoResult<()>;
    /// Adds a version copied from `item`; `None` when the template is unversioned.
    fn add_version(&self, item: &ContentItem) -> ItemRepoResult<Option<ContentItem>>;
    /// Locks `item` for `owner`; `None` when another identity holds the lock.
    fn try_lock(&self, item: &ContentItem, owner: &str) -> ItemRepoResult<Option<ContentItem>>;
    /// Writes one field value on `item`'s version.
    fn set_field(&self, item: &ContentItem, field: &str, value: &str)
        -> ItemRepoResult<ContentItem>;
}

/// SQLite-backed tree store.
pub struct SqliteItemRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteItemRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> ItemRepoResult<Self> {
        ensure_connection_ready(conn, &["items", "item_versions", "item_fields", "templates"])?;
        Ok(Self { conn })
    }

    /// Creates one tree root from a template.
    pub fn create_root(
        &self,
        name: &str,
        template_id: Uuid,
        language: &str,
    ) -> ItemRepoResult<ContentItem> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        ensure_template_exists(&tx, template_id)?;
        let item_id = insert_item(&tx, None, name, template_id, None, language)?;
        tx.commit()?;
        load_latest(self.conn, item_id, language)?.ok_or(ItemRepoError::ItemNotFound(item_id))
    }
}

impl ItemStore for SqliteItemRepository<'_> {
    fn add_item(
        &self,
        parent: &ContentItem,
        name: &str,
        source: &DefinitionSource,
    ) -> ItemRepoResult<ContentItem> {
        let language = parent.language.as_str();
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        if !is_active_item(&tx, parent.id)? {
            return Err(ItemRepoError::ItemNotFound(parent.id));
        }

        let template_id = source.root_template_id();
        ensure_template_exists(&tx, template_id)?;
        let branch_id = match source {
            DefinitionSource::Branch(branch) => Some(branch.id),
            DefinitionSource::Template(_) => None,
        };
        let item_id = insert_item(&tx, Some(parent.id), name, template_id, branch_id, language)?;

        if let DefinitionSource::Branch(branch) = source {
            for child in &branch.children {
                ensure_template_exists(&tx, child.template_id)?;
                insert_item(
                    &tx,
                    Some(item_id),
                    child.resolved_name(name).as_str(),
                    child.template_id,
                    None,
                    language,
                )?;
            }
        }

        tx.commit()?;
        load_latest(self.conn, item_id, language)?.ok_or(ItemRepoError::ItemNotFound(item_id))
    }

    fn get_item(&self, id: ItemId, language: &str) -> ItemRepoResult<Option<ContentItem>> {
        load_latest(self.conn, id, language)
    }

    fn get_version(
        &self,
        id: ItemId,
        language: &str,
        version: u32,
    ) -> ItemRepoResult<Option<ContentItem>> {
        load_version(self.conn, id, language, version)
    }

    fn list_children(
        &self,
        parent_id: ItemId,
        language: &str,
    ) -> ItemRepoResult<Vec<ContentItem>> {
        let mut stmt = self.conn.prepare(
            "SELECT item_uuid
             FROM items
             WHERE parent_uuid = ?1
               AND is_deleted = 0
             ORDER BY sort_order ASC, item_uuid ASC;",
        )?;
        let mut rows = stmt.query([parent_id.to_string()])?;
        let mut ids = Vec::new();
        while let Some(row) = rows.next()? {
            let value: String = row.get(0)?;
            ids.push(parse_uuid(&value, "items.item_uuid").map_err(ItemRepoError::InvalidData)?);
        }

        let mut children = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(child) = load_latest(self.conn, id, language)? {
                children.push(child);
            }
        }
        Ok(children)
    }

    fn delete_item(&self, id: ItemId) -> ItemRepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        if !is_active_item(&tx, id)? {
            return Err(ItemRepoError::ItemNotFound(id));
        }

        tx.execute(
            "WITH RECURSIVE subtree(item_uuid) AS (
                SELECT item_uuid
                FROM items
                WHERE item_uuid = ?1
                  AND is_deleted = 0
                UNION ALL
                SELECT child.item_uuid
                FROM items child
                INNER JOIN subtree parent ON child.parent_uuid = parent.item_uuid
                WHERE child.is_deleted = 0
            )
            UPDATE items
            SET is_deleted = 1,
                updated_at = (strftime('%s', 'now') * 1000)
            WHERE item_uuid IN (SELECT item_uuid FROM subtree)
              AND is_deleted = 0;",
            [id.to_string()],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn add_version(&self, item: &ContentItem) -> ItemRepoResult<Option<ContentItem>> {
        let versioning_enabled: Option<i64> = self
            .conn
            .query_row(
                "SELECT versioning_enabled
                 FROM templates
                 WHERE template_uuid = ?1;",
                [item.template_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        let versioning_enabled = versioning_enabled
            .ok_or(ItemRepoError::TemplateNotFound(item.template_id))
            .and_then(|value| {
                parse_flag(value, "templates.versioning_enabled")
                    .map_err(ItemRepoError::InvalidData)
            })?;
        if !versioning_enabled {
            return Ok(None);
        }

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        ensure_version_exists(&tx, item)?;

        let next_version: u32 = tx.query_row(
            "SELECT COALESCE(MAX(version), 0) + 1
             FROM item_versions
             WHERE item_uuid = ?1
               AND language = ?2;",
            params![item.id.to_string(), item.language],
            |row| row.get(0),
        )?;
        tx.execute(
            "INSERT INTO item_versions (item_uuid, language, version)
             VALUES (?1, ?2, ?3);",
            params![item.id.to_string(), item.language, next_version],
        )?;
        tx.execute(
            "INSERT INTO item_fields (item_uuid, language, version, field_name, value)
             SELECT item_uuid, language, ?4, field_name, value
             FROM item_fields
             WHERE item_uuid = ?1
               AND language = ?2
               AND version = ?3;",
            params![item.id.to_string(), item.language, item.version, next_version],
        )?;
        touch_item(&tx, item.id)?;
        tx.commit()?;

        load_version(self.conn, item.id, &item.language, next_version)
    }

    fn try_lock(&self, item: &ContentItem, owner: &str) -> ItemRepoResult<Option<ContentItem>> {
        let current_owner: Option<Option<String>> = self
            .conn
            .query_row(
                "SELECT v.lock_owner
                 FROM item_versions v
                 INNER JOIN items i ON i.item_uuid = v.item_uuid
                 WHERE v.item_uuid = ?1
                   AND v.language = ?2
                   AND v.version = ?3
                   AND i.is_deleted = 0;",
                params![item.id.to_string(), item.language, item.version],
                |row| row.get(0),
            )
            .optional()?;

        match current_owner {
            None => Err(version_not_found(item)),
            Some(Some(existing)) if existing != owner => Ok(None),
            Some(Some(_)) => load_version(self.conn, item.id, &item.language, item.version),
            Some(None) => {
                let changed = self.conn.execute(
                    "UPDATE item_versions
                     SET lock_owner = ?4,
                         locked_at = (strftime('%s', 'now') * 1000)
                     WHERE item_uuid = ?1
                       AND language = ?2
                       AND version = ?3
                       AND lock_owner IS NULL;",
                    params![item.id.to_string(), item.language, item.version, owner],
                )?;
                if changed == 0 {
                    return Ok(None);
                }
                load_version(self.conn, item.id, &item.language, item.version)
            }
        }
    }

    fn set_field(
        &self,
        item: &ContentItem,
        field: &str,
        value: &str,
    ) -> ItemRepoResult<ContentItem> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        ensure_version_exists(&tx, item)?;
        tx.execute(
            "INSERT INTO item_fields (item_uuid, language, version, field_name, value)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (item_uuid, language, version, field_name)
             DO UPDATE SET value = excluded.value;",
            params![
                item.id.to_string(),
                item.language,
                item.version,
                field,
                value
            ],
        )?;
        touch_item(&tx, item.id)?;
        tx.commit()?;

        load_version(self.conn, item.id, &item.language, item.version)?
            .ok_or_else(|| version_not_found(item))
    }
}

fn version_not_found(item: &ContentItem) -> ItemRepoError {
    ItemRepoError::VersionNotFound {
        item_id: item.id,
        language: item.language.clone(),
        version: item.version,
    }
}

fn insert_item(
    conn: &Connection,
    parent_id: Option<ItemId>,
    name: &str,
    template_id: Uuid,
    branch_id: Option<Uuid>,
    language: &str,
) -> ItemRepoResult<ItemId> {
    let duplicate = || ItemRepoError::DuplicateName {
        parent_id,
        name: name.to_string(),
    };

    // Unique indexes treat NULL parents as distinct, so roots are checked here.
    if parent_id.is_none() {
        let exists: i64 = conn.query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM items
                WHERE parent_uuid IS NULL
                  AND name = ?1
                  AND is_deleted = 0
            );",
            [name],
            |row| row.get(0),
        )?;
        if exists == 1 {
            return Err(duplicate());
        }
    }

    let item_id = Uuid::new_v4();
    let sort_order = next_sort_order(conn, parent_id)?;
    conn.execute(
        "INSERT INTO items (
            item_uuid,
            parent_uuid,
            name,
            template_uuid,
            branch_uuid,
            sort_order,
            is_deleted
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0);",
        params![
            item_id.to_string(),
            parent_id.map(|value| value.to_string()),
            name,
            template_id.to_string(),
            branch_id.map(|value| value.to_string()),
            sort_order,
        ],
    )
    .map_err(|err| {
        if is_constraint_violation(&err) {
            duplicate()
        } else {
            err.into()
        }
    })?;

    conn.execute(
        "INSERT INTO item_versions (item_uuid, language, version)
         VALUES (?1, ?2, 1);",
        params![item_id.to_string(), language],
    )?;
    Ok(item_id)
}

fn next_sort_order(conn: &Connection, parent_id: Option<ItemId>) -> ItemRepoResult<i64> {
    let next = match parent_id {
        Some(parent_id) => conn.query_row(
            "SELECT COALESCE(MAX(sort_order), -1) + 1
             FROM items
             WHERE parent_uuid = ?1
               AND is_deleted = 0;",
            [parent_id.to_string()],
            |row| row.get(0),
        )?,
        None => conn.query_row(
            "SELECT COALESCE(MAX(sort_order), -1) + 1
             FROM items
             WHERE parent_uuid IS NULL
               AND is_deleted = 0;",
            [],
            |row| row.get(0),
        )?,
    };
    Ok(next)
}

fn is_active_item(conn: &Connection, id: ItemId) -> ItemRepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM items
            WHERE item_uuid = ?1
              AND is_deleted = 0
        );",
        [id.to_string()],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn ensure_template_exists(conn: &Connection, template_id: Uuid) -> ItemRepoResult<()> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM templates WHERE template_uuid = ?1);",
        [template_id.to_string()],
        |row| row.get(0),
    )?;
    if exists != 1 {
        return Err(ItemRepoError::TemplateNotFound(template_id));
    }
    Ok(())
}

fn ensure_version_exists(conn: &Connection, item: &ContentItem) -> ItemRepoResult<()> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM item_versions v
            INNER JOIN items i ON i.item_uuid = v.item_uuid
            WHERE v.item_uuid = ?1
              AND v.language = ?2
              AND v.version = ?3
              AND i.is_deleted = 0
        );",
        params![item.id.to_string(), item.language, item.version],
        |row| row.get(0),
    )?;
    if exists != 1 {
        return Err(version_not_found(item));
    }
    Ok(())
}

fn touch_item(conn: &Connection, id: ItemId) -> ItemRepoResult<()> {
    conn.execute(
        "UPDATE items
         SET updated_at = (strftime('%s', 'now') * 1000)
         WHERE item_uuid = ?1;",
        [id.to_string()],
    )?;
    Ok(())
}

fn load_latest(
    conn: &Connection,
    id: ItemId,
    language: &str,
) -> ItemRepoResult<Option<ContentItem>> {
    let latest: Option<u32> = conn.query_row(
        "SELECT MAX(v.version)
         FROM item_versions v
         INNER JOIN items i ON i.item_uuid = v.item_uuid
         WHERE v.item_uuid = ?1
           AND v.language = ?2
           AND i.is_deleted = 0;",
        params![id.to_string(), language],
        |row| row.get(0),
    )?;
    match latest {
        Some(version) => load_version(conn, id, language, version),
        None => Ok(None),
    }
}

fn load_version(
    conn: &Connection,
    id: ItemId,
    language: &str,
    version: u32,
) -> ItemRepoResult<Option<ContentItem>> {
    let mut stmt = conn.prepare(
        "SELECT
            i.item_uuid AS item_uuid,
            i.parent_uuid AS parent_uuid,
            i.name AS name,
            i.template_uuid AS template_uuid,
            i.branch_uuid AS branch_uuid,
            i.created_at AS created_at,
            i.updated_at AS updated_at,
            v.language AS language,
            v.version AS version,
            v.lock_owner AS lock_owner,
            v.locked_at AS locked_at
         FROM items i
         INNER JOIN item_versions v ON v.item_uuid = i.item_uuid
         WHERE i.item_uuid = ?1
           AND i.is_deleted = 0
           AND v.language = ?2
           AND v.version = ?3;",
    )?;
    let mut rows = stmt.query(params![id.to_string(), language, version])?;
    let Some(row) = rows.next()? else {
        return Ok(None);
    };
    let mut item = parse_item_row(row)?;
    item.fields = load_effective_fields(conn, &item)?;
    Ok(Some(item))
}

fn parse_item_row(row: &Row<'_>) -> ItemRepoResult<ContentItem> {
    let invalid = ItemRepoError::InvalidData;
    let id_text: String = row.get("item_uuid")?;
    let template_text: String = row.get("template_uuid")?;
    let parent_id = row
        .get::<_, Option<String>>("parent_uuid")?
        .map(|value| parse_uuid(&value, "items.parent_uuid"))
        .transpose()
        .map_err(invalid)?;
    let branch_id = row
        .get::<_, Option<String>>("branch_uuid")?
        .map(|value| parse_uuid(&value, "items.branch_uuid"))
        .transpose()
        .map_err(invalid)?;

    let lock = match (
        row.get::<_, Option<String>>("lock_owner")?,
        row.get::<_, Option<i64>>("locked_at")?,
    ) {
        (Some(owner), Some(locked_at)) => Some(ItemLock { owner, locked_at }),
        (None, None) => None,
        _ => {
            return Err(ItemRepoError::InvalidData(format!(
                "half-written lock on item {id_text}"
            )));
        }
    };

    Ok(ContentItem {
        id: parse_uuid(&id_text, "items.item_uuid").map_err(invalid)?,
        parent_id,
        name: row.get("name")?,
        template_id: parse_uuid(&template_text, "items.template_uuid").map_err(invalid)?,
        branch_id,
        language: row.get("language")?,
        version: row.get("version")?,
        fields: BTreeMap::new(),
        lock,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

/// Standard values of the item's template, overlaid with the version's own values.
fn load_effective_fields(
    conn: &Connection,
    item: &ContentItem,
) -> ItemRepoResult<BTreeMap<String, String>> {
    let mut fields = BTreeMap::new();

    let standard_values: Option<Option<String>> = conn
        .query_row(
            "SELECT standard_values_uuid
             FROM templates
             WHERE template_uuid = ?1;",
            [item.template_id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    if let Some(Some(holder_text)) = standard_values {
        let holder_id = parse_uuid(&holder_text, "templates.standard_values_uuid")
            .map_err(ItemRepoError::InvalidData)?;
        if holder_id != item.id {
            let holder_version: Option<u32> = conn.query_row(
                "SELECT MAX(v.version)
                 FROM item_versions v
                 INNER JOIN items i ON i.item_uuid = v.item_uuid
                 WHERE v.item_uuid = ?1
                   AND v.language = ?2
                   AND i.is_deleted = 0;",
                params![holder_id.to_string(), item.language],
                |row| row.get(0),
            )?;
            if let Some(version) = holder_version {
                read_fields_into(conn, holder_id, &item.language, version, &mut fields)?;
            }
        }
    }

    read_fields_into(conn, item.id, &item.language, item.version, &mut fields)?;
    Ok(fields)
}

fn read_fields_into(
    conn: &Connection,
    id: ItemId,
    language: &str,
    version: u32,
    fields: &mut BTreeMap<String, String>,
) -> ItemRepoResult<()> {
    let mut stmt = conn.prepare(
        "SELECT field_name, value
         FROM item_fields
         WHERE item_uuid = ?1
           AND language = ?2
           AND version = ?3;",
    )?;
    let mut rows = stmt.query(params![id.to_string(), language, version])?;
    while let Some(row) = rows.next()? {
        fields.insert(row.get(0)?, row.get(1)?);
    }
    Ok(())
}
