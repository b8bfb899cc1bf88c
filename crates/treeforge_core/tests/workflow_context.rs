mod common;

use common::{editor_context, setup, Repos, EDITOR, LANGUAGE};
use treeforge_core::model::item::{WORKFLOW_FIELD, WORKFLOW_STATE_FIELD};
use treeforge_core::{
    ActingIdentity, ContentItem, DefinitionSource, EditContext, EngagementCause, ItemStore,
    Prepared, UnpreparedReason, WorkflowContext, WorkflowEngagement,
};

/// Adds `Home` under a fresh root and engages its default workflow.
fn created_item(repos: &Repos<'_>, context: &EditContext, source: DefinitionSource) -> ContentItem {
    let root = repos.root();
    let item = repos.items.add_item(&root, "Home", &source).unwrap();
    WorkflowContext::new(repos.db(), context)
        .start_default_workflow(item)
        .unwrap()
}

#[test]
fn workflow_disabled_locks_without_adding_a_version() {
    let conn = setup();
    let repos = Repos::new(&conn);
    let workflow = repos.workflow("Sample Workflow", false, &[]);
    let template = repos.page_template("Page", true, true, Some(workflow.id));
    let context = editor_context(false);
    let item = created_item(&repos, &context, DefinitionSource::Template(template));

    let prepared = WorkflowContext::new(repos.db(), &context)
        .prepare(item.clone())
        .unwrap();

    let Prepared::Locked(locked) = prepared else {
        panic!("expected locked item, got {prepared:?}");
    };
    assert_eq!(locked.id, item.id);
    assert_eq!(locked.version, 1);
    assert!(locked.is_locked_by(EDITOR));
    assert!(locked.field(WORKFLOW_FIELD).is_none());
    assert!(repos
        .items
        .get_version(item.id, LANGUAGE, 2)
        .unwrap()
        .is_none());
}

#[test]
fn active_unapproved_workflow_adds_one_version_and_locks_it() {
    let conn = setup();
    let repos = Repos::new(&conn);
    let workflow = repos.workflow("Sample Workflow", false, &[]);
    let template = repos.page_template("Page", true, true, Some(workflow.id));
    let context = editor_context(true);
    let item = created_item(&repos, &context, DefinitionSource::Template(template));
    let initial_state = workflow.initial_state_id.unwrap().to_string();
    assert_eq!(item.field(WORKFLOW_FIELD), Some(workflow.id.to_string().as_str()));
    assert_eq!(item.field(WORKFLOW_STATE_FIELD), Some(initial_state.as_str()));

    let prepared = WorkflowContext::new(repos.db(), &context)
        .prepare(item.clone())
        .unwrap();

    let Prepared::VersionedAndLocked(version) = prepared else {
        panic!("expected versioned item, got {prepared:?}");
    };
    assert_eq!(version.id, item.id);
    assert_eq!(version.version, 2);
    assert!(version.is_locked_by(EDITOR));
    assert_eq!(version.field(WORKFLOW_STATE_FIELD), Some(initial_state.as_str()));

    let original = repos.items.get_version(item.id, LANGUAGE, 1).unwrap().unwrap();
    assert!(!original.is_locked());
    assert!(repos
        .items
        .get_version(item.id, LANGUAGE, 3)
        .unwrap()
        .is_none());
}

#[test]
fn new_version_restarts_in_initial_state() {
    let conn = setup();
    let repos = Repos::new(&conn);
    let workflow = repos.workflows.create_workflow("Review Workflow").unwrap();
    let draft = repos
        .workflows
        .add_state(workflow.id, "Draft", false, &[])
        .unwrap();
    let review = repos
        .workflows
        .add_state(workflow.id, "Review", false, &[])
        .unwrap();
    repos
        .workflows
        .add_state(workflow.id, "Done", true, &[])
        .unwrap();
    let workflow = repos
        .workflows
        .set_initial_state(workflow.id, draft.id)
        .unwrap();
    let template = repos.page_template("Page", true, true, Some(workflow.id));
    let context = editor_context(true);
    let item = created_item(&repos, &context, DefinitionSource::Template(template));
    let review_state = review.id.to_string();
    let item = repos
        .items
        .set_field(&item, WORKFLOW_STATE_FIELD, &review_state)
        .unwrap();

    let prepared = WorkflowContext::new(repos.db(), &context)
        .prepare(item.clone())
        .unwrap();

    let Prepared::VersionedAndLocked(version) = prepared else {
        panic!("expected versioned item, got {prepared:?}");
    };
    assert_eq!(version.version, 2);
    assert_eq!(
        version.field(WORKFLOW_STATE_FIELD),
        Some(draft.id.to_string().as_str())
    );
    let stored = repos.items.get_version(item.id, LANGUAGE, 2).unwrap().unwrap();
    assert_eq!(stored.field(WORKFLOW_STATE_FIELD), version.field(WORKFLOW_STATE_FIELD));
    let original = repos.items.get_version(item.id, LANGUAGE, 1).unwrap().unwrap();
    assert_eq!(original.field(WORKFLOW_STATE_FIELD), Some(review_state.as_str()));
}

#[test]
fn approved_item_is_locked_in_place() {
    let conn = setup();
    let repos = Repos::new(&conn);
    let workflow = repos.workflow("Instant Approval", true, &[]);
    let template = repos.page_template("Page", true, true, Some(workflow.id));
    let context = editor_context(true);
    let item = created_item(&repos, &context, DefinitionSource::Template(template));

    let prepared = WorkflowContext::new(repos.db(), &context)
        .prepare(item)
        .unwrap();

    let Prepared::Locked(locked) = prepared else {
        panic!("expected locked item, got {prepared:?}");
    };
    assert_eq!(locked.version, 1);
    assert!(locked.is_locked_by(EDITOR));
}

#[test]
fn lock_before_edit_disabled_returns_item_unchanged() {
    let conn = setup();
    let repos = Repos::new(&conn);
    let workflow = repos.workflow("Sample Workflow", false, &[]);
    let template = repos.page_template("Page", true, true, Some(workflow.id));
    let context = editor_context(true).with_lock_before_editing(false);
    let item = created_item(&repos, &context, DefinitionSource::Template(template));

    let prepared = WorkflowContext::new(repos.db(), &context)
        .prepare(item.clone())
        .unwrap();

    assert_eq!(prepared, Prepared::Unchanged(item.clone()));
    let stored = repos.items.get_item(item.id, LANGUAGE).unwrap().unwrap();
    assert_eq!(stored.version, 1);
    assert!(!stored.is_locked());
}

#[test]
fn administrator_bypasses_locking() {
    let conn = setup();
    let repos = Repos::new(&conn);
    let workflow = repos.workflow("Sample Workflow", false, &[]);
    let template = repos.page_template("Page", true, true, Some(workflow.id));
    let context =
        EditContext::new(ActingIdentity::administrator("admin")).with_site(common::site(true));
    let item = created_item(&repos, &context, DefinitionSource::Template(template));

    let prepared = WorkflowContext::new(repos.db(), &context)
        .prepare(item.clone())
        .unwrap();

    assert_eq!(prepared, Prepared::Unchanged(item));
}

#[test]
fn administrative_context_locks_even_with_active_workflow() {
    let conn = setup();
    let repos = Repos::new(&conn);
    let workflow = repos.workflow("Sample Workflow", false, &[]);
    let template = repos.page_template("Page", true, true, Some(workflow.id));
    let context = editor_context(true).with_administrative_context(true);
    let item = created_item(&repos, &context, DefinitionSource::Template(template));

    let prepared = WorkflowContext::new(repos.db(), &context)
        .prepare(item)
        .unwrap();

    assert_eq!(prepared.decision(), "locked");
    assert_eq!(prepared.item().unwrap().version, 1);
}

#[test]
fn standard_values_holder_is_locked_not_versioned() {
    let conn = setup();
    let repos = Repos::new(&conn);
    let workflow = repos.workflow("Sample Workflow", false, &[]);
    let template = repos.page_template("Page", true, true, Some(workflow.id));
    let holder = repos.standard_values(&template);
    let context = editor_context(true);

    let prepared = WorkflowContext::new(repos.db(), &context)
        .prepare(holder)
        .unwrap();

    let Prepared::Locked(locked) = prepared else {
        panic!("expected locked holder, got {prepared:?}");
    };
    assert_eq!(locked.version, 1);
    assert!(locked.is_locked_by(EDITOR));
}

#[test]
fn unversioned_template_reports_version_unavailable_and_keeps_item() {
    let conn = setup();
    let repos = Repos::new(&conn);
    let workflow = repos.workflow("Sample Workflow", false, &[]);
    let template = repos.page_template("Folder Page", false, true, Some(workflow.id));
    let context = editor_context(true);
    let item = created_item(&repos, &context, DefinitionSource::Template(template));

    let prepared = WorkflowContext::new(repos.db(), &context)
        .prepare(item.clone())
        .unwrap();

    assert_eq!(
        prepared,
        Prepared::Unprepared(UnpreparedReason::VersionUnavailable)
    );
    assert!(prepared.item().is_none());
    assert!(repos.items.get_item(item.id, LANGUAGE).unwrap().is_some());
}

#[test]
fn template_without_lock_field_counts_as_locked() {
    let conn = setup();
    let repos = Repos::new(&conn);
    let template = repos.page_template("Plain Page", true, false, None);
    let context = editor_context(false);
    let item = created_item(&repos, &context, DefinitionSource::Template(template));

    let prepared = WorkflowContext::new(repos.db(), &context)
        .prepare(item.clone())
        .unwrap();

    let Prepared::Locked(returned) = prepared else {
        panic!("expected locked item, got {prepared:?}");
    };
    assert!(!returned.is_locked());
    let stored = repos.items.get_item(item.id, LANGUAGE).unwrap().unwrap();
    assert!(stored.lock.is_none());
}

#[test]
fn lock_held_by_another_identity_reports_unprepared() {
    let conn = setup();
    let repos = Repos::new(&conn);
    let template = repos.page_template("Page", true, true, None);
    let context = editor_context(false);
    let item = created_item(&repos, &context, DefinitionSource::Template(template));
    repos
        .items
        .try_lock(&item, "extranet\\colleague")
        .unwrap()
        .unwrap();

    let prepared = WorkflowContext::new(repos.db(), &context)
        .prepare(item.clone())
        .unwrap();

    assert_eq!(prepared, Prepared::Unprepared(UnpreparedReason::LockHeld));
    let stored = repos.items.get_item(item.id, LANGUAGE).unwrap().unwrap();
    assert!(stored.is_locked_by("extranet\\colleague"));
}

#[test]
fn engagement_override_takes_precedence_over_site() {
    let conn = setup();
    let repos = Repos::new(&conn);
    let workflow = repos.workflow("Sample Workflow", false, &[]);
    let template = repos.page_template("Page", true, true, Some(workflow.id));
    let root = repos.root();

    let enabled = EditContext::new(ActingIdentity::new(EDITOR))
        .with_engagement(WorkflowEngagement::Enabled);
    let resolver = WorkflowContext::new(repos.db(), &enabled);
    assert!(resolver.workflow_enabled());
    let item = repos
        .items
        .add_item(&root, "Enabled", &DefinitionSource::Template(template.clone()))
        .unwrap();
    let item = resolver.start_default_workflow(item).unwrap();
    assert_eq!(resolver.prepare(item).unwrap().decision(), "versioned_and_locked");

    let disabled = common::editor_context(true).with_engagement(WorkflowEngagement::Disabled);
    let resolver = WorkflowContext::new(repos.db(), &disabled);
    assert!(!resolver.workflow_enabled());
    let item = repos
        .items
        .add_item(&root, "Disabled", &DefinitionSource::Template(template))
        .unwrap();
    let item = resolver.start_default_workflow(item).unwrap();
    assert!(item.field(WORKFLOW_FIELD).is_none());
    assert_eq!(resolver.prepare(item).unwrap().decision(), "locked");
}

#[test]
fn preview_target_approves_only_that_target() {
    let conn = setup();
    let repos = Repos::new(&conn);
    let workflow = repos.workflow("Preview Workflow", false, &["web"]);
    let template = repos.page_template("Page", true, true, Some(workflow.id));
    let context = editor_context(true);
    let item = created_item(&repos, &context, DefinitionSource::Template(template));
    let resolver = WorkflowContext::new(repos.db(), &context);

    assert!(resolver.has_workflow(&item).unwrap());
    assert!(resolver.has_default_workflow(&item));
    assert!(resolver.is_approved(&item, Some("WEB")).unwrap());
    assert!(!resolver.is_approved(&item, Some("print")).unwrap());
    assert!(!resolver.is_approved(&item, None).unwrap());
    assert_eq!(resolver.prepare(item).unwrap().decision(), "versioned_and_locked");
}

#[test]
fn predicates_without_workflow_provider_treat_items_as_approved() {
    let conn = setup();
    let repos = Repos::new(&conn);
    let workflow = repos.workflow("Sample Workflow", false, &[]);
    let template = repos.page_template("Page", true, true, Some(workflow.id));
    let context = editor_context(true);
    let item = created_item(&repos, &context, DefinitionSource::Template(template));

    let mut db = repos.db();
    db.workflows = None;
    let resolver = WorkflowContext::new(db, &context);

    assert!(!resolver.has_workflow(&item).unwrap());
    assert!(resolver.get_workflow(&item).unwrap().is_none());
    assert!(resolver.is_approved(&item, None).unwrap());
    assert_eq!(resolver.prepare(item).unwrap().decision(), "locked");
}

#[test]
fn default_workflow_without_initial_state_fails_with_item_attached() {
    let conn = setup();
    let repos = Repos::new(&conn);
    let workflow = repos.broken_workflow("Broken");
    let template = repos.page_template("Page", true, true, Some(workflow.id));
    let context = editor_context(true);
    let root = repos.root();
    let item = repos
        .items
        .add_item(&root, "Home", &DefinitionSource::Template(template))
        .unwrap();

    let err = WorkflowContext::new(repos.db(), &context)
        .start_default_workflow(item.clone())
        .unwrap_err();

    assert!(matches!(
        err.cause(),
        EngagementCause::MissingInitialState { workflow_id, .. } if *workflow_id == workflow.id
    ));
    assert_eq!(err.item().map(|attached| attached.id), Some(item.id));
    assert_eq!(err.to_string(), "workflow `Broken` has no initial state");
}
