//! Domain model for the content tree and item creation.
//!
//! # Responsibility
//! - Define item, definition, workflow and context shapes shared by
//!   repositories and services.
//!
//! # Invariants
//! - Every item is identified by a stable `ItemId`.
//! - Deletion is a soft-delete tombstone in storage, never exposed here.

pub mod context;
pub mod definition;
pub mod item;
pub mod workflow;
