//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate store, template and workflow calls into creation use-cases.
//! - Keep callers decoupled from storage details.

pub mod audit;
pub mod creation_service;
pub mod workflow_context;
