//! Read-only workflow snapshots.
//!
//! # Responsibility
//! - Answer "is this item version approved" against a loaded workflow.
//!
//! # Invariants
//! - Handles are never mutated by the creation core.
//! - An item version without a known state is never approved.

use crate::model::item::{ContentItem, WORKFLOW_STATE_FIELD};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One state of a workflow definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub id: Uuid,
    pub name: String,
    /// Final states are publishable.
    pub is_final: bool,
    /// Target databases this state may be previewed on before approval.
    pub preview_targets: Vec<String>,
}

/// Workflow definition bound to an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowHandle {
    pub id: Uuid,
    pub name: String,
    pub initial_state_id: Option<Uuid>,
    pub states: Vec<WorkflowState>,
}

impl WorkflowHandle {
    /// Looks up one state of this workflow.
    pub fn state(&self, state_id: Uuid) -> Option<&WorkflowState> {
        self.states.iter().find(|state| state.id == state_id)
    }

    /// Returns the initial state, if it is declared and belongs to this workflow.
    pub fn initial_state(&self) -> Option<&WorkflowState> {
        self.initial_state_id.and_then(|id| self.state(id))
    }

    /// Returns the state `item` is in, if it names a state of this workflow.
    pub fn state_of(&self, item: &ContentItem) -> Option<&WorkflowState> {
        let state_id = item
            .field(WORKFLOW_STATE_FIELD)
            .and_then(|value| Uuid::parse_str(value).ok())?;
        self.state(state_id)
    }

    /// Returns whether `item` is approved.
    ///
    /// With `target` set, a non-final state listing that target counts as
    /// approved for staged checks against that database.
    pub fn is_approved(&self, item: &ContentItem, target: Option<&str>) -> bool {
        let Some(state) = self.state_of(item) else {
            return false;
        };
        if state.is_final {
            return true;
        }
        target.is_some_and(|target| {
            state
                .preview_targets
                .iter()
                .any(|candidate| candidate.eq_ignore_ascii_case(target))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{WorkflowHandle, WorkflowState};
    use crate::model::item::{ContentItem, WORKFLOW_STATE_FIELD};
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn workflow() -> WorkflowHandle {
        let draft = WorkflowState {
            id: Uuid::new_v4(),
            name: "Draft".to_string(),
            is_final: false,
            preview_targets: Vec::new(),
        };
        let review = WorkflowState {
            id: Uuid::new_v4(),
            name: "Awaiting Approval".to_string(),
            is_final: false,
            preview_targets: vec!["preview".to_string()],
        };
        let approved = WorkflowState {
            id: Uuid::new_v4(),
            name: "Approved".to_string(),
            is_final: true,
            preview_targets: Vec::new(),
        };
        WorkflowHandle {
            id: Uuid::new_v4(),
            name: "Sample Workflow".to_string(),
            initial_state_id: Some(draft.id),
            states: vec![draft, review, approved],
        }
    }

    fn item_in_state(state: Option<Uuid>) -> ContentItem {
        let mut fields = BTreeMap::new();
        if let Some(state) = state {
            fields.insert(WORKFLOW_STATE_FIELD.to_string(), state.to_string());
        }
        ContentItem {
            id: Uuid::new_v4(),
            parent_id: None,
            name: "Article".to_string(),
            template_id: Uuid::new_v4(),
            branch_id: None,
            language: "en".to_string(),
            version: 1,
            fields,
            lock: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn final_state_is_approved_for_any_target() {
        let workflow = workflow();
        let item = item_in_state(Some(workflow.states[2].id));
        assert!(workflow.is_approved(&item, None));
        assert!(workflow.is_approved(&item, Some("web")));
    }

    #[test]
    fn preview_target_approves_only_that_target() {
        let workflow = workflow();
        let item = item_in_state(Some(workflow.states[1].id));
        assert!(!workflow.is_approved(&item, None));
        assert!(workflow.is_approved(&item, Some("Preview")));
        assert!(!workflow.is_approved(&item, Some("web")));
    }

    #[test]
    fn unknown_or_missing_state_is_not_approved() {
        let workflow = workflow();
        assert!(!workflow.is_approved(&item_in_state(None), None));
        assert!(!workflow.is_approved(&item_in_state(Some(Uuid::new_v4())), None));
    }

    #[test]
    fn initial_state_must_belong_to_workflow() {
        let mut workflow = workflow();
        assert_eq!(workflow.initial_state().map(|s| s.name.as_str()), Some("Draft"));

        workflow.initial_state_id = Some(Uuid::new_v4());
        assert!(workflow.initial_state().is_none());
    }
}
