use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::task::{Task, TaskFields, TaskId};

/// Time-ordered (UUIDv7), so ids sort by creation.
pub type WorkspaceId = Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Workspace {
    pub id: WorkspaceId,

    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub tasks: Vec<Task>,

    #[serde(default)]
    next_task_id: TaskId,
}

impl Workspace {
    pub fn new(name: String, description: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            name,
            description,
            created_at: now,
            tasks: vec![],
            next_task_id: 1,
        }
    }

    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn task_mut(&mut self, id: TaskId) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    /// Fails with a validation error once the id space is used up.
    pub fn add_task(&mut self, fields: TaskFields) -> StoreResult<TaskId> {
        let (id, after) = self.next_id().ok_or_else(|| {
            StoreError::validation(format!("workspace \"{}\" has no task ids left", self.name))
        })?;
        self.next_task_id = after;
        self.tasks.push(Task::new(id, fields));
        Ok(id)
    }

    pub fn remove_task(&mut self, id: TaskId) -> Option<Task> {
        let idx = self.tasks.iter().position(|t| t.id == id)?;
        Some(self.tasks.remove(idx))
    }

    /// Ends the workspace, handing back every task it owned.
    pub fn into_tasks(self) -> Vec<Task> {
        self.tasks
    }

    pub fn has_duplicate_task_ids(&self) -> bool {
        let mut seen = std::collections::BTreeSet::new();
        !self.tasks.iter().all(|t| seen.insert(t.id))
    }

    pub fn has_exhausted_ids(&self) -> bool {
        self.next_id().is_none()
    }

    /// Documents written without a counter (or edited by hand) get one that
    /// clears every id already in use.
    pub(crate) fn repair_counter(&mut self) {
        if let Some((id, _)) = self.next_id() {
            self.next_task_id = id;
        }
    }

    // The id to hand out and the counter value after it. Both must fit.
    fn next_id(&self) -> Option<(TaskId, TaskId)> {
        let floor = match self.tasks.iter().map(|t| t.id).max() {
            Some(max) => max.checked_add(1)?,
            None => 1,
        };
        let id = self.next_task_id.max(floor);
        Some((id, id.checked_add(1)?))
    }
}
