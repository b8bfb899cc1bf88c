//! Audit records emitted by item creation.
//!
//! # Invariants
//! - One record per successful store add, keyed by definition kind.
//! - Sinks must not fail the operation that produced the record.

use crate::model::definition::{DefinitionKind, DefinitionSource};
use crate::model::item::ItemId;
use log::info;
use uuid::Uuid;

/// Log target used by [`LogAuditSink`].
pub const AUDIT_LOG_TARGET: &str = "audit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    pub actor: String,
    pub kind: DefinitionKind,
    pub definition_id: Uuid,
    pub item_id: ItemId,
    /// `Add from branch: <name>` or `Add from template: <name>`.
    pub message: String,
}

impl AuditEntry {
    pub fn item_added(actor: &str, source: &DefinitionSource, item_id: ItemId) -> Self {
        Self {
            actor: actor.to_string(),
            kind: source.kind(),
            definition_id: source.id(),
            item_id,
            message: format!("Add from {}: {}", source.kind(), source.name()),
        }
    }
}

/// Destination for audit records.
pub trait AuditSink {
    fn record(&self, entry: &AuditEntry);
}

/// Writes audit records to the `audit` log target.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAuditSink;

impl AuditSink for LogAuditSink {
    fn record(&self, entry: &AuditEntry) {
        info!(
            target: AUDIT_LOG_TARGET,
            "event=audit module=creation actor={} kind={} definition_id={} item_id={} message={}",
            entry.actor,
            entry.kind,
            entry.definition_id,
            entry.item_id,
            entry.message
        );
    }
}
