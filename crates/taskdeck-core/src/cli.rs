use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::task::TaskForm;

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "taskdeck",
    version,
    about = "Workspace task board with urgency-sorted due dates",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append,
        global = true
    )]
    pub rc_overrides: Vec<KeyVal>,

    /// Settings file (defaults to $TASKDECKRC or ~/.taskdeckrc).
    #[arg(long = "config", global = true)]
    pub config: Option<PathBuf>,

    #[arg(long = "data", global = true)]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum CliCommand {
    /// Create, remove, select or list workspaces.
    #[command(subcommand)]
    Workspace(WorkspaceCommand),
    /// Add a task to the current workspace.
    Add(AddArgs),
    /// Change fields of an existing task.
    Edit(EditArgs),
    /// Delete a task.
    Remove {
        id: u64,
        #[arg(short = 'w', long = "workspace")]
        workspace: Option<String>,
    },
    /// Show the task board.
    List(ListArgs),
    /// Every owner named on any task.
    Owners,
    /// Live board with a ticking clock; Ctrl-C to quit.
    Watch(FilterArgs),
}

#[derive(Subcommand, Debug, Clone)]
pub enum WorkspaceCommand {
    Add {
        name: String,
        #[arg(short = 'd', long = "description")]
        description: Option<String>,
    },
    Remove {
        workspace: String,
    },
    Use {
        workspace: String,
    },
    List,
}

#[derive(Args, Debug, Clone)]
pub struct AddArgs {
    pub name: String,
    #[arg(short = 'o', long)]
    pub owner: Option<String>,
    #[arg(short = 's', long)]
    pub status: Option<String>,
    #[arg(short = 'p', long)]
    pub priority: Option<String>,
    /// YYYY-MM-DD, today, tomorrow, a weekday or +Nd / +Nw.
    #[arg(long)]
    pub due: Option<String>,
    #[arg(short = 'n', long)]
    pub notes: Option<String>,
    #[arg(short = 'w', long = "workspace")]
    pub workspace: Option<String>,
}

impl AddArgs {
    pub fn to_form(&self) -> TaskForm {
        TaskForm {
            name: self.name.clone(),
            owner: self.owner.clone().unwrap_or_default(),
            status: self.status.clone().unwrap_or_default(),
            priority: self.priority.clone().unwrap_or_default(),
            due_date: self.due.clone().unwrap_or_default(),
            notes: self.notes.clone().unwrap_or_default(),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct EditArgs {
    pub id: u64,
    #[arg(long)]
    pub name: Option<String>,
    #[arg(short = 'o', long)]
    pub owner: Option<String>,
    #[arg(short = 's', long)]
    pub status: Option<String>,
    #[arg(short = 'p', long)]
    pub priority: Option<String>,
    /// Pass an empty string to clear the due date.
    #[arg(long)]
    pub due: Option<String>,
    #[arg(short = 'n', long)]
    pub notes: Option<String>,
    #[arg(short = 'w', long = "workspace")]
    pub workspace: Option<String>,
}

impl EditArgs {
    /// Overlays the given flags on a prefilled form.
    pub fn apply_to(&self, form: &mut TaskForm) {
        let overlay = [
            (&self.name, &mut form.name),
            (&self.owner, &mut form.owner),
            (&self.status, &mut form.status),
            (&self.priority, &mut form.priority),
            (&self.due, &mut form.due_date),
            (&self.notes, &mut form.notes),
        ];
        for (given, slot) in overlay {
            if let Some(value) = given {
                *slot = value.clone();
            }
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    #[arg(short = 'f', long)]
    pub search: Option<String>,
    #[arg(short = 's', long)]
    pub status: Option<String>,
    #[arg(short = 'o', long)]
    pub owner: Option<String>,
    #[arg(short = 'w', long = "workspace")]
    pub workspace: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ListArgs {
    #[command(flatten)]
    pub filter: FilterArgs,
    /// Show the board of every workspace.
    #[arg(long)]
    pub all: bool,
    #[arg(long)]
    pub json: bool,
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(true)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

/// Pulls `rc.key=value` (or `rc.key:value`) tokens out of the argument
/// list so they can sit anywhere on the command line.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides: Vec<(String, String)> = Vec::new();

    let mut iter = raw.iter().cloned();
    if let Some(bin) = iter.next() {
        cleaned.push(bin);
    }

    for arg in iter {
        let s = arg.to_string_lossy();
        if let Some(rest) = s.strip_prefix("rc.") {
            let parsed = if let Some((k, v)) = rest.split_once('=') {
                Some((format!("rc.{k}"), v.to_string()))
            } else {
                rest.split_once(':')
                    .map(|(k, v)| (format!("rc.{k}"), v.to_string()))
            };

            if let Some((k, v)) = parsed {
                debug!(key = %k, value = %v, "captured positional rc override");
                overrides.push((k, v));
                continue;
            }
        }

        cleaned.push(arg);
    }

    Ok(PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    })
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;

    use clap::Parser;

    use super::{CliCommand, GlobalCli, WorkspaceCommand, preprocess_args};
    use crate::task::TaskForm;

    fn args(list: &[&str]) -> Vec<OsString> {
        list.iter().map(OsString::from).collect()
    }

    #[test]
    fn rc_tokens_are_lifted_out() {
        let pre = preprocess_args(&args(&[
            "taskdeck",
            "list",
            "rc.color=off",
            "rc.clock.locale:id",
        ]))
        .expect("preprocess");
        assert_eq!(pre.cleaned_args, args(&["taskdeck", "list"]));
        assert_eq!(
            pre.rc_overrides,
            vec![
                ("rc.color".to_string(), "off".to_string()),
                ("rc.clock.locale".to_string(), "id".to_string()),
            ]
        );
    }

    #[test]
    fn parses_nested_workspace_command() {
        let cli = GlobalCli::parse_from(["taskdeck", "-vv", "workspace", "add", "Q1 Planning"]);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Some(CliCommand::Workspace(WorkspaceCommand::Add { name, description })) => {
                assert_eq!(name, "Q1 Planning");
                assert!(description.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn edit_overlays_only_given_fields() {
        let cli = GlobalCli::parse_from(["taskdeck", "edit", "3", "--status", "done", "--due", ""]);
        let Some(CliCommand::Edit(edit)) = cli.command else {
            panic!("expected edit");
        };
        let mut form = TaskForm {
            name: "Draft budget".to_string(),
            owner: "Sari".to_string(),
            due_date: "2025-01-20".to_string(),
            ..TaskForm::default()
        };
        edit.apply_to(&mut form);
        assert_eq!(form.name, "Draft budget");
        assert_eq!(form.owner, "Sari");
        assert_eq!(form.status, "done");
        assert_eq!(form.due_date, "");
    }
}
