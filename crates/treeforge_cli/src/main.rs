//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `treeforge_core` linkage with a ping/version probe.
//! - Run one item creation against an in-memory database.
//!
//! Usage: `treeforge_cli [settings.toml]`

use log::info;
use std::error::Error;
use std::process::ExitCode;
use treeforge_core::{
    ActingIdentity, ContentDatabase, CreationService, DefinitionSource, LogAuditSink, Settings,
    SqliteItemRepository, SqliteTemplateRepository, SqliteWorkflowProvider,
};

fn main() -> ExitCode {
    println!("treeforge_core ping={}", treeforge_core::ping());
    println!("treeforge_core version={}", treeforge_core::core_version());

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("smoke creation failed: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let settings = match std::env::args().nth(1) {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    treeforge_core::init_logging(&settings.logging)?;

    let conn = treeforge_core::open_db_in_memory()?;
    let items = SqliteItemRepository::try_new(&conn)?;
    let templates = SqliteTemplateRepository::try_new(&conn)?;
    let workflows = SqliteWorkflowProvider::try_new(&conn)?;

    let folder = templates.create_template("Folder", &[], false)?;
    let page = templates.create_template("Sample Item", &["Title", "__Lock"], true)?;
    let root = items.create_root("content", folder.id, "en")?;

    let db = ContentDatabase::new(&items, &templates, Some(&workflows));
    let audit = LogAuditSink;
    let access = treeforge_core::AllowAll;
    let service =
        CreationService::new(db, &access, &audit).with_name_validator(settings.name_validator()?);

    let context = settings.edit_context(ActingIdentity::new("cli\\smoke"), None);
    let outcome = service.create_from_definition(
        &context,
        "Smoke Item",
        &DefinitionSource::Template(page),
        &root,
    )?;

    info!(
        "event=cli_smoke module=cli status=ok item_id={} decision={}",
        outcome.item_id,
        outcome.prepared.decision()
    );
    println!(
        "created item_id={} decision={}",
        outcome.item_id,
        outcome.prepared.decision()
    );
    Ok(())
}
