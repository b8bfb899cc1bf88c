#![allow(dead_code)]

use rusqlite::Connection;
use treeforge_core::model::item::{DEFAULT_WORKFLOW_FIELD, LOCK_FIELD};
use treeforge_core::{
    ActingIdentity, ContentDatabase, ContentItem, EditContext, ItemStore, SiteSettings,
    SqliteItemRepository, SqliteTemplateRepository, SqliteWorkflowProvider, TemplateDefinition,
    WorkflowHandle, WorkflowProvider,
};
use uuid::Uuid;

pub const EDITOR: &str = "extranet\\editor";
pub const LANGUAGE: &str = "en";

pub fn setup() -> Connection {
    treeforge_core::open_db_in_memory().unwrap()
}

pub struct Repos<'c> {
    pub items: SqliteItemRepository<'c>,
    pub templates: SqliteTemplateRepository<'c>,
    pub workflows: SqliteWorkflowProvider<'c>,
}

impl<'c> Repos<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self {
            items: SqliteItemRepository::try_new(conn).unwrap(),
            templates: SqliteTemplateRepository::try_new(conn).unwrap(),
            workflows: SqliteWorkflowProvider::try_new(conn).unwrap(),
        }
    }

    pub fn db(&self) -> ContentDatabase<'_> {
        ContentDatabase::new(&self.items, &self.templates, Some(&self.workflows))
    }

    /// `content` root under a plain folder template.
    pub fn root(&self) -> ContentItem {
        let folder = self.templates.create_template("Folder", &[], false).unwrap();
        self.items.create_root("content", folder.id, LANGUAGE).unwrap()
    }

    /// Draft (initial) and Done (final) states; Draft previews on `web` when asked.
    pub fn workflow(&self, name: &str, initial_is_final: bool, preview: &[&str]) -> WorkflowHandle {
        let workflow = self.workflows.create_workflow(name).unwrap();
        let draft = self
            .workflows
            .add_state(workflow.id, "Draft", initial_is_final, preview)
            .unwrap();
        self.workflows
            .add_state(workflow.id, "Done", true, &[])
            .unwrap();
        self.workflows
            .set_initial_state(workflow.id, draft.id)
            .unwrap()
    }

    /// Workflow with states but no initial state.
    pub fn broken_workflow(&self, name: &str) -> WorkflowHandle {
        let workflow = self.workflows.create_workflow(name).unwrap();
        self.workflows
            .add_state(workflow.id, "Draft", false, &[])
            .unwrap();
        self.workflows.workflow_by_id(workflow.id).unwrap().unwrap()
    }

    /// Page template, optionally lockable and with a default workflow on its
    /// standard values.
    pub fn page_template(
        &self,
        name: &str,
        versioning_enabled: bool,
        lockable: bool,
        default_workflow: Option<Uuid>,
    ) -> TemplateDefinition {
        let mut fields = vec!["Title"];
        if lockable {
            fields.push(LOCK_FIELD);
        }
        let template = self
            .templates
            .create_template(name, &fields, versioning_enabled)
            .unwrap();
        let Some(workflow_id) = default_workflow else {
            return template;
        };

        let holder = self
            .items
            .create_root(&format!("{name} Standard Values"), template.id, LANGUAGE)
            .unwrap();
        self.items
            .set_field(&holder, DEFAULT_WORKFLOW_FIELD, &workflow_id.to_string())
            .unwrap();
        self.templates
            .set_standard_values(template.id, holder.id)
            .unwrap()
    }

    pub fn standard_values(&self, template: &TemplateDefinition) -> ContentItem {
        let holder_id = template.standard_values_id.unwrap();
        self.items.get_item(holder_id, LANGUAGE).unwrap().unwrap()
    }
}

pub fn site(enable_workflow: bool) -> SiteSettings {
    SiteSettings {
        name: "website".to_string(),
        enable_workflow,
    }
}

/// Editor on the `website` site with lock-before-edit on.
pub fn editor_context(enable_workflow: bool) -> EditContext {
    EditContext::new(ActingIdentity::new(EDITOR)).with_site(site(enable_workflow))
}
