use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::Serialize;

use crate::due::{
  DateFormatter,
  DueStatus,
  classify_task,
  format_relative_due_date,
  sort_active_tasks
};
use crate::filter::{
  TaskFilter,
  filter_tasks,
  partition_by_completion
};
use crate::task::{
  Priority,
  Status,
  Task,
  TaskId
};
use crate::workspace::{
  Workspace,
  WorkspaceId
};

#[derive(Debug, Clone, Serialize)]
pub struct TaskRow {
  pub id:         TaskId,
  pub name:       String,
  pub owner:      String,
  pub status:     Status,
  pub priority:   Priority,
  pub due_date:   Option<NaiveDate>,
  pub due_label:  String,
  #[serde(skip)]
  pub due_status: DueStatus,
  pub notes:      String
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskBoard {
  pub workspace_id:   WorkspaceId,
  pub workspace_name: String,
  pub active:         Vec<TaskRow>,
  pub completed:      Vec<TaskRow>
}

impl TaskBoard {
  pub fn active_count(&self) -> usize {
    self.active.len()
  }

  pub fn completed_count(
    &self
  ) -> usize {
    self.completed.len()
  }
}

/// Every non-empty owner across all
/// workspaces, sorted and deduplicated.
pub fn collect_distinct_owners(
  workspaces: &[Workspace]
) -> Vec<String> {
  workspaces
    .iter()
    .flat_map(|ws| ws.tasks.iter())
    .filter(|task| {
      !task.owner.trim().is_empty()
    })
    .map(|task| task.owner.clone())
    .collect::<BTreeSet<_>>()
    .into_iter()
    .collect()
}

#[tracing::instrument(skip_all, fields(workspace = %workspace.id))]
pub fn build_task_board(
  workspace: &Workspace,
  filter: &TaskFilter,
  today: NaiveDate,
  formatter: &dyn DateFormatter
) -> TaskBoard {
  let matched =
    filter_tasks(&workspace.tasks, filter);
  let (mut active, completed) =
    partition_by_completion(&matched);
  sort_active_tasks(&mut active, today);

  let row = |task: &Task| {
    to_row(task, today, formatter)
  };

  TaskBoard {
    workspace_id:   workspace.id,
    workspace_name: workspace
      .name
      .clone(),
    active:         active
      .into_iter()
      .map(row)
      .collect(),
    completed:      completed
      .into_iter()
      .map(row)
      .collect()
  }
}

fn to_row(
  task: &Task,
  today: NaiveDate,
  formatter: &dyn DateFormatter
) -> TaskRow {
  let due_label = task
    .due_date
    .map(|due| {
      format_relative_due_date(
        due, today, formatter
      )
    })
    .unwrap_or_else(|| "-".to_string());
  let notes = if task.notes.is_empty() {
    "-".to_string()
  } else {
    task.notes.clone()
  };

  TaskRow {
    id: task.id,
    name: task.name.clone(),
    owner: task.owner.clone(),
    status: task.status,
    priority: task.priority,
    due_date: task.due_date,
    due_label,
    due_status: classify_task(
      task, today
    ),
    notes
  }
}
