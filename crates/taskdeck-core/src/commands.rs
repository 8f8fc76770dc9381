use std::sync::Arc;

use anyhow::{Context, anyhow};
use chrono::NaiveDate;
use chrono_tz::Tz;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::cli::{AddArgs, CliCommand, EditArgs, FilterArgs, ListArgs, WorkspaceCommand};
use crate::clock::{Clock, SystemClock, format_clock};
use crate::config::Config;
use crate::datetime::project_timezone;
use crate::due::PatternFormatter;
use crate::render::Renderer;
use crate::scheduler::{RefreshScheduler, Tick};
use crate::session::{Command, Outcome, Session};
use crate::storage::{FileStorage, Storage};
use crate::task::{Status, TaskId};
use crate::view::{TaskBoard, build_task_board, collect_distinct_owners};
use crate::workspace::WorkspaceId;

/// Storage key of the file remembering the selected workspace between runs.
pub const SELECTION_KEY: &str = "current";

#[instrument(skip_all)]
pub fn dispatch<S: Storage>(
    session: &mut Session<S>,
    selection: &mut FileStorage,
    cfg: &Config,
    renderer: &Renderer,
    command: Option<CliCommand>,
) -> anyhow::Result<()> {
    let command = command.unwrap_or(CliCommand::List(ListArgs::default()));
    debug!(?command, "dispatching command");

    match command {
        CliCommand::Workspace(cmd) => cmd_workspace(session, selection, cfg, renderer, cmd),
        CliCommand::Add(args) => cmd_add(session, renderer, &args),
        CliCommand::Edit(args) => cmd_edit(session, renderer, &args),
        CliCommand::Remove { id, workspace } => {
            cmd_remove(session, renderer, id, workspace.as_deref())
        }
        CliCommand::List(args) => cmd_list(session, cfg, renderer, &args),
        CliCommand::Owners => {
            renderer.print_owners(&collect_distinct_owners(session.store().workspaces()))
        }
        CliCommand::Watch(args) => cmd_watch(session, cfg, renderer, &args),
    }
}

/// Re-selects the workspace remembered from the last run, if it still exists.
#[instrument(skip_all)]
pub fn restore_selection<S: Storage>(
    session: &mut Session<S>,
    selection: &FileStorage,
) -> anyhow::Result<()> {
    let Some(raw) = selection.load()? else {
        return Ok(());
    };
    let id: WorkspaceId = match serde_json::from_str(&raw) {
        Ok(id) => id,
        Err(err) => {
            warn!(error = %err, "ignoring unreadable workspace selection");
            return Ok(());
        }
    };
    if session.store().workspace(id).is_none() {
        debug!(%id, "remembered workspace no longer exists");
        return Ok(());
    }
    session.dispatch(Command::SelectWorkspace { id })?;
    Ok(())
}

fn save_selection<S: Storage>(
    session: &Session<S>,
    selection: &mut FileStorage,
) -> anyhow::Result<()> {
    let payload = match session.store().current_id() {
        Some(id) => serde_json::to_string(&id)?,
        None => String::new(),
    };
    selection
        .save(&payload)
        .context("failed to remember the selected workspace")
}

/// Accepts a workspace id or its case-insensitive name.
pub fn resolve_workspace<S: Storage>(
    session: &Session<S>,
    token: &str,
) -> anyhow::Result<WorkspaceId> {
    let store = session.store();
    if let Ok(id) = Uuid::parse_str(token.trim())
        && store.workspace(id).is_some()
    {
        return Ok(id);
    }
    store
        .find_workspace_by_name(token)
        .map(|ws| ws.id)
        .ok_or_else(|| anyhow!("no workspace named or identified by \"{token}\""))
}

fn target_workspace<S: Storage>(
    session: &mut Session<S>,
    token: Option<&str>,
) -> anyhow::Result<()> {
    if let Some(token) = token {
        let id = resolve_workspace(session, token)?;
        session.dispatch(Command::SelectWorkspace { id })?;
    }
    Ok(())
}

fn workspace_name<S: Storage>(session: &Session<S>) -> String {
    session
        .store()
        .current()
        .map(|ws| ws.name.clone())
        .unwrap_or_default()
}

#[instrument(skip(session, selection, cfg, renderer))]
fn cmd_workspace<S: Storage>(
    session: &mut Session<S>,
    selection: &mut FileStorage,
    cfg: &Config,
    renderer: &Renderer,
    cmd: WorkspaceCommand,
) -> anyhow::Result<()> {
    match cmd {
        WorkspaceCommand::Add { name, description } => {
            let outcome = session.dispatch(Command::CreateWorkspace { name, description });
            // The new workspace is selected even if it could not be written.
            save_selection(session, selection)?;
            if let Outcome::WorkspaceCreated(id) = outcome? {
                info!(%id, "workspace created");
                renderer.message(&format!(
                    "Created workspace \"{}\" ({id}).",
                    workspace_name(session)
                ));
            }
            Ok(())
        }
        WorkspaceCommand::Remove { workspace } => {
            let id = resolve_workspace(session, &workspace)?;
            let name = session
                .store()
                .workspace(id)
                .map(|ws| ws.name.clone())
                .unwrap_or_default();
            let outcome = session.dispatch(Command::DeleteWorkspace { id });
            save_selection(session, selection)?;
            if let Outcome::WorkspaceDeleted { removed_tasks, .. } = outcome? {
                renderer.message(&format!(
                    "Deleted workspace \"{name}\" and {removed_tasks} task(s)."
                ));
            }
            Ok(())
        }
        WorkspaceCommand::Use { workspace } => {
            let id = resolve_workspace(session, &workspace)?;
            session.dispatch(Command::SelectWorkspace { id })?;
            save_selection(session, selection)?;
            renderer.message(&format!("Now using \"{}\".", workspace_name(session)));
            Ok(())
        }
        WorkspaceCommand::List => {
            let screen = session.render(session.today(), &cfg.date_formatter());
            renderer.print_workspaces(&screen.workspaces)
        }
    }
}

#[instrument(skip(session, renderer, args))]
fn cmd_add<S: Storage>(
    session: &mut Session<S>,
    renderer: &Renderer,
    args: &AddArgs,
) -> anyhow::Result<()> {
    info!("command add");
    target_workspace(session, args.workspace.as_deref())?;

    let form = args.to_form();
    if let Outcome::TaskCreated(id) = session.dispatch(Command::SubmitTask { form })? {
        renderer.message(&format!(
            "Created task {id} in \"{}\".",
            workspace_name(session)
        ));
    }
    Ok(())
}

#[instrument(skip(session, renderer, args), fields(task_id = args.id))]
fn cmd_edit<S: Storage>(
    session: &mut Session<S>,
    renderer: &Renderer,
    args: &EditArgs,
) -> anyhow::Result<()> {
    info!("command edit");
    target_workspace(session, args.workspace.as_deref())?;

    let opened = session.dispatch(Command::OpenTaskEditor {
        task_id: Some(args.id),
    })?;
    let Outcome::EditorOpened { mut form, .. } = opened else {
        return Err(anyhow!("task {} could not be opened for editing", args.id));
    };
    args.apply_to(&mut form);

    if let Outcome::TaskUpdated(id) = session.dispatch(Command::SubmitTask { form })? {
        renderer.message(&format!("Updated task {id}."));
    }
    Ok(())
}

#[instrument(skip(session, renderer))]
fn cmd_remove<S: Storage>(
    session: &mut Session<S>,
    renderer: &Renderer,
    task_id: TaskId,
    workspace: Option<&str>,
) -> anyhow::Result<()> {
    info!("command remove");
    target_workspace(session, workspace)?;

    match session.dispatch(Command::DeleteTask { task_id })? {
        Outcome::TaskDeleted { existed: true, .. } => {
            renderer.message(&format!("Deleted task {task_id}."));
        }
        _ => {
            renderer.message(&format!("No task {task_id}; nothing deleted."));
        }
    }
    Ok(())
}

fn apply_filter_args<S: Storage>(
    session: &mut Session<S>,
    args: &FilterArgs,
) -> anyhow::Result<()> {
    target_workspace(session, args.workspace.as_deref())?;

    let status = args
        .status
        .as_deref()
        .map(str::parse::<Status>)
        .transpose()?;
    session.dispatch(Command::SetSearch(args.search.clone().unwrap_or_default()))?;
    session.dispatch(Command::SetStatusFilter(status))?;
    session.dispatch(Command::SetOwnerFilter(args.owner.clone()))?;
    Ok(())
}

#[instrument(skip(session, cfg, renderer, args))]
fn cmd_list<S: Storage>(
    session: &mut Session<S>,
    cfg: &Config,
    renderer: &Renderer,
    args: &ListArgs,
) -> anyhow::Result<()> {
    apply_filter_args(session, &args.filter)?;
    let today = session.today();
    let formatter = cfg.date_formatter();

    let boards: Vec<TaskBoard> = if args.all {
        let filter = &session.view().filter;
        session
            .store()
            .workspaces()
            .iter()
            .map(|ws| build_task_board(ws, filter, today, &formatter))
            .collect()
    } else {
        session.render(today, &formatter).board.into_iter().collect()
    };

    if args.json {
        return renderer.print_json(&boards);
    }
    if boards.is_empty() {
        renderer.message(
            "No workspace selected. Create one with `taskdeck workspace add <name>`.",
        );
        return Ok(());
    }

    for (idx, board) in boards.iter().enumerate() {
        if idx > 0 {
            renderer.message("");
        }
        renderer.print_board(board)?;
    }
    Ok(())
}

#[instrument(skip(session, cfg, renderer, args))]
fn cmd_watch<S: Storage>(
    session: &mut Session<S>,
    cfg: &Config,
    renderer: &Renderer,
    args: &FilterArgs,
) -> anyhow::Result<()> {
    apply_filter_args(session, args)?;
    if session.store().current().is_none() {
        return Err(anyhow!("select a workspace before watching"));
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start timer runtime")?;
    runtime.block_on(watch_board(
        session,
        cfg,
        renderer,
        *project_timezone(),
    ))
}

async fn watch_board<S: Storage>(
    session: &Session<S>,
    cfg: &Config,
    renderer: &Renderer,
    tz: Tz,
) -> anyhow::Result<()> {
    let formatter = cfg.date_formatter();
    let locale = cfg.clock_locale();
    let hour12 = cfg.hour12();

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let scheduler = RefreshScheduler::start(clock, tz, tx);

    draw_board(session, renderer, &formatter, session.today())?;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            signal = &mut shutdown => {
                signal.context("failed to listen for Ctrl-C")?;
                info!("watch interrupted");
                break;
            }
            tick = rx.recv() => {
                match tick {
                    Some(Tick::Clock(now)) => {
                        let local = now.with_timezone(&tz).naive_local();
                        renderer.print_clock(&format_clock(local, locale, hour12))?;
                    }
                    Some(Tick::DueRefresh(today)) => {
                        draw_board(session, renderer, &formatter, today)?;
                    }
                    None => break,
                }
            }
        }
    }

    scheduler.join().await;
    renderer.message("");
    Ok(())
}

fn draw_board<S: Storage>(
    session: &Session<S>,
    renderer: &Renderer,
    formatter: &PatternFormatter,
    today: NaiveDate,
) -> anyhow::Result<()> {
    let screen = session.render(today, formatter);
    renderer.message("");
    match screen.board {
        Some(board) => renderer.print_board(&board),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    use super::{SELECTION_KEY, resolve_workspace, restore_selection, save_selection};
    use crate::clock::FixedClock;
    use crate::session::{Command, Session};
    use crate::storage::{FileStorage, MemoryStorage};
    use crate::store::Store;

    fn session() -> Session<MemoryStorage> {
        let now = Utc
            .with_ymd_and_hms(2025, 1, 13, 8, 0, 0)
            .single()
            .expect("valid now");
        Session::new(
            Store::open(MemoryStorage::new()).expect("open"),
            Arc::new(FixedClock::new(now)),
            chrono_tz::UTC,
        )
    }

    fn create(session: &mut Session<MemoryStorage>, name: &str) {
        session
            .dispatch(Command::CreateWorkspace {
                name: name.to_string(),
                description: None,
            })
            .expect("create workspace");
    }

    #[test]
    fn workspaces_resolve_by_name_or_id() {
        let mut s = session();
        create(&mut s, "Q1 Planning");
        create(&mut s, "Ops");
        let id = resolve_workspace(&s, "q1 planning").expect("by name");
        assert_eq!(resolve_workspace(&s, &id.to_string()).expect("by id"), id);
        assert!(resolve_workspace(&s, "missing").is_err());
    }

    #[test]
    fn selection_survives_restart() {
        let temp = tempdir().expect("tempdir");
        let mut selection = FileStorage::open(temp.path(), SELECTION_KEY).expect("open");

        let mut s = session();
        create(&mut s, "A");
        create(&mut s, "B");
        let a = resolve_workspace(&s, "A").expect("a");
        s.dispatch(Command::SelectWorkspace { id: a }).expect("select");
        save_selection(&s, &mut selection).expect("save");

        // Move away from A so the restore has something to undo.
        let b = resolve_workspace(&s, "B").expect("b");
        s.dispatch(Command::SelectWorkspace { id: b }).expect("select b");
        restore_selection(&mut s, &selection).expect("restore");
        assert_eq!(s.store().current_id(), Some(a));
    }

    #[test]
    fn unreadable_selection_is_ignored() {
        let temp = tempdir().expect("tempdir");
        std::fs::write(temp.path().join("current.json"), "not json").expect("write");
        let selection = FileStorage::open(temp.path(), SELECTION_KEY).expect("open");

        let mut s = session();
        create(&mut s, "A");
        let before = s.store().current_id();
        restore_selection(&mut s, &selection).expect("restore");
        assert_eq!(s.store().current_id(), before);
    }
}
