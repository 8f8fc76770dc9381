use std::collections::BTreeSet;

use chrono::{
  DateTime,
  Utc
};
use tracing::{
  debug,
  error,
  info,
  warn
};

use crate::error::{
  PersistenceError,
  StoreError,
  StoreResult
};
use crate::storage::Storage;
use crate::task::{
  TaskFields,
  TaskId
};
use crate::workspace::{
  Workspace,
  WorkspaceId
};

/// Owns the workspace collection and
/// writes it through to `S` after every
/// mutation.
#[derive(Debug)]
pub struct Store<S: Storage> {
  workspaces: Vec<Workspace>,
  current:    Option<WorkspaceId>,
  storage:    S
}

impl<S: Storage> Store<S> {
  /// Loads the stored collection. A
  /// document that does not decode into
  /// a valid collection is discarded and
  /// the store starts empty; a storage
  /// backend that cannot be read at all
  /// is an error.
  #[tracing::instrument(skip(storage))]
  pub fn open(
    storage: S
  ) -> StoreResult<Self> {
    let workspaces = match storage
      .load()?
    {
      | Some(raw) => {
        decode_workspaces(&raw)
          .unwrap_or_else(|| {
            error!(
              bytes = raw.len(),
              "stored document is \
               malformed; starting \
               with an empty collection"
            );
            Vec::new()
          })
      }
      | None => {
        debug!(
          "no stored document; \
           starting empty"
        );
        Vec::new()
      }
    };

    info!(
      workspaces = workspaces.len(),
      tasks = workspaces
        .iter()
        .map(|ws| ws.tasks.len())
        .sum::<usize>(),
      "opened store"
    );

    Ok(Self::from_workspaces(
      workspaces, storage
    ))
  }

  /// Wraps an in-memory collection
  /// without touching storage.
  pub fn from_workspaces(
    mut workspaces: Vec<Workspace>,
    storage: S
  ) -> Self {
    for ws in &mut workspaces {
      ws.repair_counter();
    }
    let current = workspaces
      .first()
      .map(|ws| ws.id);
    Self {
      workspaces,
      current,
      storage
    }
  }

  pub fn workspaces(
    &self
  ) -> &[Workspace] {
    &self.workspaces
  }

  pub fn workspace(
    &self,
    id: WorkspaceId
  ) -> Option<&Workspace> {
    self
      .workspaces
      .iter()
      .find(|ws| ws.id == id)
  }

  pub fn find_workspace_by_name(
    &self,
    name: &str
  ) -> Option<&Workspace> {
    let wanted = name.trim();
    self.workspaces.iter().find(|ws| {
      names_collide(&ws.name, wanted)
    })
  }

  pub fn current_id(
    &self
  ) -> Option<WorkspaceId> {
    self.current
  }

  pub fn current(
    &self
  ) -> Option<&Workspace> {
    self
      .current
      .and_then(|id| self.workspace(id))
  }

  pub fn storage(&self) -> &S {
    &self.storage
  }

  pub fn storage_mut(
    &mut self
  ) -> &mut S {
    &mut self.storage
  }

  #[tracing::instrument(skip(
    self,
    description,
    now
  ))]
  pub fn create_workspace(
    &mut self,
    name: &str,
    description: Option<&str>,
    now: DateTime<Utc>
  ) -> StoreResult<WorkspaceId> {
    let name = name.trim();
    if name.is_empty() {
      return Err(StoreError::validation(
        "workspace name cannot be empty"
      ));
    }
    if let Some(existing) =
      self.find_workspace_by_name(name)
    {
      return Err(StoreError::validation(
        format!(
          "workspace \"{}\" already \
           exists",
          existing.name
        )
      ));
    }

    let description = description
      .map(str::trim)
      .filter(|d| !d.is_empty())
      .map(ToString::to_string);
    let workspace = Workspace::new(
      name.to_string(),
      description,
      now
    );
    let id = workspace.id;
    self.workspaces.push(workspace);

    info!(%id, "workspace created");
    self.persist()?;
    Ok(id)
  }

  /// Removes the workspace together with
  /// all of its tasks and returns it.
  #[tracing::instrument(skip(self))]
  pub fn delete_workspace(
    &mut self,
    id: WorkspaceId
  ) -> StoreResult<Workspace> {
    let idx = self
      .workspaces
      .iter()
      .position(|ws| ws.id == id)
      .ok_or_else(|| {
        StoreError::not_found(format!(
          "workspace {id}"
        ))
      })?;

    let removed =
      self.workspaces.remove(idx);
    if self.current == Some(id) {
      self.current = self
        .workspaces
        .first()
        .map(|ws| ws.id);
      debug!(
        current = ?self.current,
        "current workspace reassigned"
      );
    }

    info!(
      %id,
      removed_tasks = removed.tasks.len(),
      "workspace deleted"
    );
    self.persist()?;
    Ok(removed)
  }

  #[tracing::instrument(skip(self))]
  pub fn select_workspace(
    &mut self,
    id: WorkspaceId
  ) -> StoreResult<()> {
    if self.workspace(id).is_none() {
      return Err(StoreError::not_found(
        format!("workspace {id}")
      ));
    }
    self.current = Some(id);
    Ok(())
  }

  #[tracing::instrument(skip(
    self, fields
  ))]
  pub fn create_task(
    &mut self,
    workspace_id: WorkspaceId,
    fields: TaskFields
  ) -> StoreResult<TaskId> {
    let fields = fields.normalized()?;
    let ws =
      self.workspace_mut(workspace_id)?;
    let id = ws.add_task(fields)?;

    debug!(
      task_id = id,
      task_count = ws.tasks.len(),
      "task created"
    );
    self.persist()?;
    Ok(id)
  }

  #[tracing::instrument(skip(
    self, fields
  ))]
  pub fn update_task(
    &mut self,
    workspace_id: WorkspaceId,
    task_id: TaskId,
    fields: TaskFields
  ) -> StoreResult<()> {
    let fields = fields.normalized()?;
    let ws =
      self.workspace_mut(workspace_id)?;
    let task = ws
      .task_mut(task_id)
      .ok_or_else(|| {
        StoreError::not_found(format!(
          "task {task_id} in \
           workspace {workspace_id}"
        ))
      })?;
    task.replace_fields(fields);

    debug!(task_id, "task updated");
    self.persist()
  }

  /// `Ok(false)` when the task was
  /// already gone; nothing is written.
  #[tracing::instrument(skip(self))]
  pub fn delete_task(
    &mut self,
    workspace_id: WorkspaceId,
    task_id: TaskId
  ) -> StoreResult<bool> {
    let ws =
      self.workspace_mut(workspace_id)?;
    if ws.remove_task(task_id).is_none()
    {
      debug!(
        task_id,
        "task already absent"
      );
      return Ok(false);
    }

    debug!(task_id, "task deleted");
    self.persist()?;
    Ok(true)
  }

  pub fn to_json(
    &self
  ) -> Result<String, PersistenceError>
  {
    Ok(serde_json::to_string(
      &self.workspaces
    )?)
  }

  fn workspace_mut(
    &mut self,
    id: WorkspaceId
  ) -> StoreResult<&mut Workspace> {
    self
      .workspaces
      .iter_mut()
      .find(|ws| ws.id == id)
      .ok_or_else(|| {
        StoreError::not_found(format!(
          "workspace {id}"
        ))
      })
  }

  // In-memory state is kept when the
  // write fails.
  fn persist(
    &mut self
  ) -> StoreResult<()> {
    let payload = self.to_json()?;
    if let Err(err) =
      self.storage.save(&payload)
    {
      warn!(
        error = %err,
        bytes = payload.len(),
        "failed to persist workspaces; \
         changes kept in memory only"
      );
      return Err(err.into());
    }
    Ok(())
  }
}

fn names_collide(
  a: &str,
  b: &str
) -> bool {
  a.trim().to_lowercase()
    == b.trim().to_lowercase()
}

/// Decodes and validates a stored
/// collection. `None` when the JSON does
/// not match the expected shape or
/// breaks a collection invariant.
pub fn decode_workspaces(
  raw: &str
) -> Option<Vec<Workspace>> {
  let workspaces = match serde_json::from_str::<
    Vec<Workspace>
  >(raw)
  {
    | Ok(workspaces) => workspaces,
    | Err(err) => {
      warn!(
        error = %err,
        "stored document does not \
         match the workspace schema"
      );
      return None;
    }
  };

  let mut ids = BTreeSet::new();
  let mut names = BTreeSet::new();
  for ws in &workspaces {
    let name =
      ws.name.trim().to_lowercase();
    if name.is_empty() {
      warn!(id = %ws.id, "stored workspace has an empty name");
      return None;
    }
    if !names.insert(name) {
      warn!(name = %ws.name, "stored workspace name is duplicated");
      return None;
    }
    if !ids.insert(ws.id) {
      warn!(id = %ws.id, "stored workspace id is duplicated");
      return None;
    }
    if ws.has_duplicate_task_ids() {
      warn!(id = %ws.id, "stored workspace has duplicate task ids");
      return None;
    }
    if ws.has_exhausted_ids() {
      warn!(id = %ws.id, "stored workspace has no task ids left");
      return None;
    }
  }

  Some(workspaces)
}

#[cfg(test)]
mod tests {
  use chrono::{
    NaiveDate,
    TimeZone,
    Utc
  };

  use super::{
    Store,
    decode_workspaces
  };
  use crate::storage::MemoryStorage;
  use crate::task::{
    Status,
    TaskFields
  };

  fn now() -> chrono::DateTime<Utc> {
    Utc
      .with_ymd_and_hms(
        2025, 1, 13, 8, 0, 0
      )
      .single()
      .expect("valid now")
  }

  fn empty_store()
  -> Store<MemoryStorage> {
    Store::open(MemoryStorage::new())
      .expect("open store")
  }

  #[test]
  fn create_trims_and_rejects_duplicates()
  {
    let mut store = empty_store();
    let id = store
      .create_workspace(
        "  Q1 Planning ",
        Some("  "),
        now()
      )
      .expect("create");
    let ws = store
      .workspace(id)
      .expect("lookup");
    assert_eq!(ws.name, "Q1 Planning");
    assert_eq!(ws.description, None);
    assert!(ws.tasks.is_empty());

    let before =
      store.to_json().expect("json");
    let err = store
      .create_workspace(
        "q1 planning",
        None,
        now()
      )
      .expect_err("duplicate");
    assert!(err.is_validation());
    assert_eq!(
      store.to_json().expect("json"),
      before
    );
    assert_eq!(
      store.storage().writes(),
      1
    );
  }

  #[test]
  fn blank_workspace_name_is_rejected()
  {
    let mut store = empty_store();
    assert!(
      store
        .create_workspace(
          "   ",
          None,
          now()
        )
        .expect_err("blank")
        .is_validation()
    );
    assert!(
      store.workspaces().is_empty()
    );
  }

  #[test]
  fn deleting_current_moves_selection()
  {
    let mut store = empty_store();
    let a = store
      .create_workspace("A", None, now())
      .expect("a");
    let b = store
      .create_workspace("B", None, now())
      .expect("b");
    store
      .select_workspace(b)
      .expect("select b");

    store
      .delete_workspace(b)
      .expect("delete b");
    assert_eq!(
      store.current_id(),
      Some(a)
    );

    store
      .delete_workspace(a)
      .expect("delete a");
    assert_eq!(store.current_id(), None);
  }

  #[test]
  fn deleting_other_keeps_selection() {
    let mut store = empty_store();
    let a = store
      .create_workspace("A", None, now())
      .expect("a");
    let b = store
      .create_workspace("B", None, now())
      .expect("b");
    store
      .select_workspace(b)
      .expect("select b");
    store
      .delete_workspace(a)
      .expect("delete a");
    assert_eq!(
      store.current_id(),
      Some(b)
    );
  }

  #[test]
  fn delete_workspace_cascades() {
    let mut store = empty_store();
    let ws = store
      .create_workspace("A", None, now())
      .expect("a");
    store
      .create_task(
        ws,
        TaskFields::new("one")
      )
      .expect("task one");
    store
      .create_task(
        ws,
        TaskFields::new("two")
      )
      .expect("task two");

    let removed = store
      .delete_workspace(ws)
      .expect("delete");
    assert_eq!(
      removed.into_tasks().len(),
      2
    );
    assert_eq!(
      store.to_json().expect("json"),
      "[]"
    );
  }

  #[test]
  fn missing_ids_are_not_found() {
    let mut store = empty_store();
    let ghost = uuid::Uuid::now_v7();
    assert!(
      store
        .delete_workspace(ghost)
        .expect_err("ghost")
        .is_not_found()
    );
    assert!(
      store
        .select_workspace(ghost)
        .expect_err("ghost")
        .is_not_found()
    );
    assert!(
      store
        .create_task(
          ghost,
          TaskFields::new("x")
        )
        .expect_err("ghost")
        .is_not_found()
    );

    let ws = store
      .create_workspace("A", None, now())
      .expect("a");
    assert!(
      store
        .update_task(
          ws,
          42,
          TaskFields::new("x")
        )
        .expect_err("no task")
        .is_not_found()
    );
    assert_eq!(
      store.storage().writes(),
      1
    );
  }

  #[test]
  fn update_replaces_fields_keeps_id() {
    let mut store = empty_store();
    let ws = store
      .create_workspace("A", None, now())
      .expect("a");
    let id = store
      .create_task(
        ws,
        TaskFields::new("draft")
          .owner("Sari")
          .notes("first pass")
      )
      .expect("task");

    let due =
      NaiveDate::from_ymd_opt(2025, 2, 1)
        .expect("valid date");
    store
      .update_task(
        ws,
        id,
        TaskFields::new("final")
          .status(Status::Complete)
          .due(due)
      )
      .expect("update");

    let task = store
      .workspace(ws)
      .and_then(|w| w.task(id))
      .expect("task");
    assert_eq!(task.id, id);
    assert_eq!(task.name, "final");
    assert_eq!(task.owner, "");
    assert_eq!(task.notes, "");
    assert_eq!(task.due_date, Some(due));
  }

  #[test]
  fn delete_absent_task_is_noop() {
    let mut store = empty_store();
    let ws = store
      .create_workspace("A", None, now())
      .expect("a");
    let writes = store.storage().writes();
    assert!(
      !store
        .delete_task(ws, 99)
        .expect("noop")
    );
    assert_eq!(
      store.storage().writes(),
      writes
    );
  }

  #[test]
  fn failed_save_keeps_memory_state() {
    let mut store = Store::open(
      MemoryStorage::new().with_quota(2)
    )
    .expect("open");
    let err = store
      .create_workspace("A", None, now())
      .expect_err("quota");
    assert!(err.is_persistence());
    assert!(
      store
        .find_workspace_by_name("a")
        .is_some()
    );
    assert_eq!(
      store.storage().value(),
      None
    );

    // The next successful write carries
    // the earlier change with it.
    store.storage_mut().set_quota(None);
    store
      .create_workspace("B", None, now())
      .expect("write after quota lifted");
    let saved = store
      .storage()
      .value()
      .expect("saved document");
    assert!(saved.contains("\"A\""));
    assert!(saved.contains("\"B\""));
  }

  #[test]
  fn failed_update_keeps_memory_state()
  {
    let mut store = empty_store();
    let ws = store
      .create_workspace("A", None, now())
      .expect("a");
    let id = store
      .create_task(
        ws,
        TaskFields::new("draft")
      )
      .expect("task");

    store.storage_mut().set_quota(Some(2));
    let err = store
      .update_task(
        ws,
        id,
        TaskFields::new("final")
          .status(Status::Complete)
      )
      .expect_err("quota");
    assert!(err.is_persistence());

    let task = store
      .workspace(ws)
      .and_then(|w| w.task(id))
      .expect("task");
    assert_eq!(task.name, "final");
    assert_eq!(task.status, Status::Complete);
    let saved = store
      .storage()
      .value()
      .expect("earlier document");
    assert!(saved.contains("\"draft\""));
  }

  #[test]
  fn failed_workspace_delete_keeps_memory_state()
   {
    let mut store = empty_store();
    let a = store
      .create_workspace("A", None, now())
      .expect("a");
    let b = store
      .create_workspace("B", None, now())
      .expect("b");
    store
      .create_task(b, TaskFields::new("t"))
      .expect("task");
    store.select_workspace(b).expect("select");

    store.storage_mut().set_quota(Some(2));
    let err = store
      .delete_workspace(b)
      .expect_err("quota");
    assert!(err.is_persistence());
    assert!(store.workspace(b).is_none());
    assert_eq!(store.workspaces().len(), 1);
    assert_eq!(store.current_id(), Some(a));
    let saved = store
      .storage()
      .value()
      .expect("earlier document");
    assert!(saved.contains("\"B\""));
  }

  #[test]
  fn malformed_document_opens_empty() {
    for raw in [
      "not json",
      "{\"workspaces\": []}",
      "[{\"id\": 5}]",
      r#"[{"id":"01890000-0000-7000-8000-000000000001","name":"Home","createdAt":"2025-01-01T00:00:00Z","tasks":[{"id":18446744073709551615,"name":"x","status":"Not Started","priority":"Low","dueDate":""}]}]"#,
      r#"[{"id":"01890000-0000-7000-8000-000000000001","name":"Home","createdAt":"2025-01-01T00:00:00Z","tasks":[],"nextTaskId":18446744073709551615}]"#
    ] {
      let store = Store::open(
        MemoryStorage::with_value(raw)
      )
      .expect("open");
      assert!(
        store.workspaces().is_empty(),
        "{raw}"
      );
      assert_eq!(
        store.current_id(),
        None
      );
    }
  }

  #[test]
  fn duplicate_names_in_document_are_rejected()
   {
    let raw = r#"[
      {"id":"01890000-0000-7000-8000-000000000001","name":"Home","createdAt":"2025-01-01T00:00:00Z","tasks":[]},
      {"id":"01890000-0000-7000-8000-000000000002","name":"home","createdAt":"2025-01-01T00:00:00Z","tasks":[]}
    ]"#;
    assert!(
      decode_workspaces(raw).is_none()
    );
  }

  #[test]
  fn open_selects_first_workspace() {
    let mut source = empty_store();
    let first = source
      .create_workspace("A", None, now())
      .expect("a");
    source
      .create_workspace("B", None, now())
      .expect("b");
    let json =
      source.to_json().expect("json");

    let reopened = Store::open(
      MemoryStorage::with_value(json)
    )
    .expect("reopen");
    assert_eq!(
      reopened.current_id(),
      Some(first)
    );
    assert_eq!(
      reopened.workspaces(),
      source.workspaces()
    );
  }
}
