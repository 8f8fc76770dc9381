use tracing::trace;

use crate::task::{
  Status,
  Task
};

/// Search box plus the two dropdown
/// filters. Empty values match
/// everything.
#[derive(
  Debug, Clone, Default, PartialEq, Eq,
)]
pub struct TaskFilter {
  pub search: String,
  pub status: Option<Status>,
  pub owner:  Option<String>
}

impl TaskFilter {
  pub fn search(
    mut self,
    term: impl Into<String>
  ) -> Self {
    self.search = term.into();
    self
  }

  pub fn status(
    mut self,
    status: Status
  ) -> Self {
    self.status = Some(status);
    self
  }

  pub fn owner(
    mut self,
    owner: impl Into<String>
  ) -> Self {
    self.owner = Some(owner.into());
    self
  }

  pub fn is_empty(&self) -> bool {
    self.search.is_empty()
      && self.status.is_none()
      && self
        .owner
        .as_deref()
        .is_none_or(str::is_empty)
  }

  pub fn matches(
    &self,
    task: &Task
  ) -> bool {
    let needle =
      self.search.to_lowercase();
    self.matches_lowered(task, &needle)
  }

  fn matches_lowered(
    &self,
    task: &Task,
    needle: &str
  ) -> bool {
    let search_ok = needle.is_empty()
      || [
        task.name.as_str(),
        task.owner.as_str(),
        task.notes.as_str()
      ]
      .iter()
      .any(|field| {
        field
          .to_lowercase()
          .contains(needle)
      });

    let status_ok = self
      .status
      .is_none_or(|s| s == task.status);

    let owner_ok = match self
      .owner
      .as_deref()
    {
      | None | Some("") => true,
      | Some(owner) => task.owner == owner
    };

    search_ok && status_ok && owner_ok
  }
}

/// Tasks matching `filter`, in input
/// order.
#[tracing::instrument(skip(
  tasks, filter
), fields(total = tasks.len()))]
pub fn filter_tasks<'a>(
  tasks: &'a [Task],
  filter: &TaskFilter
) -> Vec<&'a Task> {
  let needle =
    filter.search.to_lowercase();
  let out: Vec<&Task> = tasks
    .iter()
    .filter(|task| {
      filter
        .matches_lowered(task, &needle)
    })
    .collect();
  trace!(
    matched = out.len(),
    "filtered tasks"
  );
  out
}

/// Splits into (active, completed),
/// keeping relative order in both.
pub fn partition_by_completion<'a>(
  tasks: &[&'a Task]
) -> (Vec<&'a Task>, Vec<&'a Task>) {
  tasks
    .iter()
    .copied()
    .partition(|task| !task.is_complete())
}
