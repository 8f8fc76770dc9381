use std::sync::Arc;

use chrono::NaiveDate;
use chrono_tz::Tz;
use tracing::{
  debug,
  info,
  instrument,
  warn
};

use crate::clock::Clock;
use crate::datetime::today_in;
use crate::due::DateFormatter;
use crate::error::{
  StoreError,
  StoreResult
};
use crate::filter::TaskFilter;
use crate::storage::Storage;
use crate::store::Store;
use crate::task::{
  Status,
  TaskFields,
  TaskForm,
  TaskId
};
use crate::view::{
  TaskBoard,
  build_task_board,
  collect_distinct_owners
};
use crate::workspace::WorkspaceId;

/// One user gesture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
  CreateWorkspace {
    name:        String,
    description: Option<String>
  },
  DeleteWorkspace {
    id: WorkspaceId
  },
  SelectWorkspace {
    id: WorkspaceId
  },
  OpenTaskEditor {
    task_id: Option<TaskId>
  },
  CloseTaskEditor,
  SubmitTask {
    form: TaskForm
  },
  DeleteTask {
    task_id: TaskId
  },
  SetSearch(String),
  SetStatusFilter(Option<Status>),
  SetOwnerFilter(Option<String>),
  ToggleSidebar
}

impl Command {
  pub fn name(&self) -> &'static str {
    match self {
      | Command::CreateWorkspace {
        ..
      } => "create_workspace",
      | Command::DeleteWorkspace {
        ..
      } => "delete_workspace",
      | Command::SelectWorkspace {
        ..
      } => "select_workspace",
      | Command::OpenTaskEditor {
        ..
      } => "open_task_editor",
      | Command::CloseTaskEditor => {
        "close_task_editor"
      }
      | Command::SubmitTask {
        ..
      } => "submit_task",
      | Command::DeleteTask {
        ..
      } => "delete_task",
      | Command::SetSearch(_) => {
        "set_search"
      }
      | Command::SetStatusFilter(_) => {
        "set_status_filter"
      }
      | Command::SetOwnerFilter(_) => {
        "set_owner_filter"
      }
      | Command::ToggleSidebar => {
        "toggle_sidebar"
      }
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
  WorkspaceCreated(WorkspaceId),
  WorkspaceDeleted {
    id:            WorkspaceId,
    removed_tasks: usize
  },
  WorkspaceSelected(WorkspaceId),
  EditorOpened {
    task_id: Option<TaskId>,
    form:    TaskForm
  },
  EditorClosed,
  TaskCreated(TaskId),
  TaskUpdated(TaskId),
  TaskDeleted {
    task_id: TaskId,
    existed: bool
  },
  ViewChanged
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
)]
pub enum Editor {
  #[default]
  Closed,
  New,
  Existing(TaskId)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewState {
  pub editor:          Editor,
  pub filter:          TaskFilter,
  pub sidebar_visible: bool
}

impl Default for ViewState {
  fn default() -> Self {
    Self {
      editor:          Editor::Closed,
      filter:          TaskFilter::default(),
      sidebar_visible: true
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceItem {
  pub id:         WorkspaceId,
  pub name:       String,
  pub active:     bool,
  pub task_count: usize
}

#[derive(Debug, Clone)]
pub struct Screen {
  pub workspaces:      Vec<WorkspaceItem>,
  pub board:           Option<TaskBoard>,
  pub owners:          Vec<String>,
  pub editor:          Editor,
  pub sidebar_visible: bool
}

/// Single owner of the store and of all
/// UI state around it.
pub struct Session<S: Storage> {
  store: Store<S>,
  view:  ViewState,
  clock: Arc<dyn Clock>,
  tz:    Tz
}

impl<S: Storage> Session<S> {
  pub fn new(
    store: Store<S>,
    clock: Arc<dyn Clock>,
    tz: Tz
  ) -> Self {
    Self {
      store,
      view: ViewState::default(),
      clock,
      tz
    }
  }

  pub fn store(&self) -> &Store<S> {
    &self.store
  }

  pub fn view(&self) -> &ViewState {
    &self.view
  }

  pub fn today(&self) -> NaiveDate {
    today_in(self.clock.now(), &self.tz)
  }

  #[instrument(skip(self, command), fields(command = command.name()))]
  pub fn dispatch(
    &mut self,
    command: Command
  ) -> StoreResult<Outcome> {
    debug!("dispatching command");
    match command {
      | Command::CreateWorkspace {
        name,
        description
      } => {
        self.create_workspace(
          &name,
          description.as_deref()
        )
      }
      | Command::DeleteWorkspace {
        id
      } => {
        let was_current =
          self.store.current_id() == Some(id);
        let removed =
          self.store.delete_workspace(id);
        if self.store.workspace(id).is_none()
          && was_current
        {
          self.view.filter =
            TaskFilter::default();
          self.view.editor =
            Editor::Closed;
        }
        let removed = removed?;
        Ok(Outcome::WorkspaceDeleted {
          id,
          removed_tasks: removed
            .into_tasks()
            .len()
        })
      }
      | Command::SelectWorkspace {
        id
      } => {
        self.select(id)?;
        Ok(Outcome::WorkspaceSelected(id))
      }
      | Command::OpenTaskEditor {
        task_id
      } => self.open_editor(task_id),
      | Command::CloseTaskEditor => {
        self.view.editor = Editor::Closed;
        Ok(Outcome::EditorClosed)
      }
      | Command::SubmitTask {
        form
      } => self.submit_task(&form),
      | Command::DeleteTask {
        task_id
      } => {
        let ws = self.require_current()?;
        let existed = self
          .store
          .delete_task(ws, task_id)?;
        if self.view.editor
          == Editor::Existing(task_id)
        {
          self.view.editor =
            Editor::Closed;
        }
        Ok(Outcome::TaskDeleted {
          task_id,
          existed
        })
      }
      | Command::SetSearch(term) => {
        self.view.filter.search = term;
        Ok(Outcome::ViewChanged)
      }
      | Command::SetStatusFilter(
        status
      ) => {
        self.view.filter.status = status;
        Ok(Outcome::ViewChanged)
      }
      | Command::SetOwnerFilter(owner) => {
        self.view.filter.owner = owner
          .filter(|o| !o.is_empty());
        Ok(Outcome::ViewChanged)
      }
      | Command::ToggleSidebar => {
        self.view.sidebar_visible =
          !self.view.sidebar_visible;
        Ok(Outcome::ViewChanged)
      }
    }
  }

  /// Everything a front end needs to
  /// draw one frame.
  pub fn render(
    &self,
    today: NaiveDate,
    formatter: &dyn DateFormatter
  ) -> Screen {
    let current = self.store.current_id();
    let workspaces = self
      .store
      .workspaces()
      .iter()
      .map(|ws| WorkspaceItem {
        id:         ws.id,
        name:       ws.name.clone(),
        active:     Some(ws.id) == current,
        task_count: ws.tasks.len()
      })
      .collect();

    let board =
      self.store.current().map(|ws| {
        build_task_board(
          ws,
          &self.view.filter,
          today,
          formatter
        )
      });

    Screen {
      workspaces,
      board,
      owners: collect_distinct_owners(
        self.store.workspaces()
      ),
      editor: self.view.editor,
      sidebar_visible: self
        .view
        .sidebar_visible
    }
  }

  fn create_workspace(
    &mut self,
    name: &str,
    description: Option<&str>
  ) -> StoreResult<Outcome> {
    let now = self.clock.now();
    let result = self
      .store
      .create_workspace(
        name,
        description,
        now
      );

    // A failed write still leaves the
    // new workspace in memory.
    let created = match &result {
      | Ok(id) => Some(*id),
      | Err(err) if err.is_persistence() => {
        self
          .store
          .find_workspace_by_name(name)
          .map(|ws| ws.id)
      }
      | Err(_) => None
    };
    if let Some(id) = created {
      self.select(id)?;
    }

    result.map(Outcome::WorkspaceCreated)
  }

  fn select(
    &mut self,
    id: WorkspaceId
  ) -> StoreResult<()> {
    self.store.select_workspace(id)?;
    self.view.filter =
      TaskFilter::default();
    self.view.editor = Editor::Closed;
    info!(%id, "workspace selected");
    Ok(())
  }

  fn open_editor(
    &mut self,
    task_id: Option<TaskId>
  ) -> StoreResult<Outcome> {
    let form = match task_id {
      | Some(id) => {
        let ws = self.require_current()?;
        let task = self
          .store
          .workspace(ws)
          .and_then(|w| w.task(id))
          .ok_or_else(|| {
            StoreError::not_found(
              format!("task {id}")
            )
          })?;
        self.view.editor =
          Editor::Existing(id);
        TaskForm::from(task)
      }
      | None => {
        self.view.editor = Editor::New;
        TaskForm::default()
      }
    };

    Ok(Outcome::EditorOpened {
      task_id,
      form
    })
  }

  fn submit_task(
    &mut self,
    form: &TaskForm
  ) -> StoreResult<Outcome> {
    let ws = self.require_current()?;
    let fields = TaskFields::from_form(
      form,
      self.today()
    )?;

    let result = match self.view.editor
    {
      | Editor::Existing(id) => self
        .store
        .update_task(ws, id, fields)
        .map(|()| Outcome::TaskUpdated(id)),
      | Editor::New | Editor::Closed => {
        self
          .store
          .create_task(ws, fields)
          .map(Outcome::TaskCreated)
      }
    };

    match &result {
      | Ok(_) => {
        self.view.editor = Editor::Closed;
      }
      | Err(err) if err.is_persistence() => {
        warn!(
          error = %err,
          "task saved in memory only"
        );
        self.view.editor = Editor::Closed;
      }
      | Err(_) => {}
    }
    result
  }

  fn require_current(
    &self
  ) -> StoreResult<WorkspaceId> {
    self.store.current_id().ok_or_else(
      || {
        StoreError::validation(
          "select a workspace first"
        )
      }
    )
  }
}
