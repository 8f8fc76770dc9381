use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use serde::Serialize;
use unicode_width::UnicodeWidthStr;

use crate::clock::ClockDisplay;
use crate::config::Config;
use crate::due::DueStatus;
use crate::session::WorkspaceItem;
use crate::view::{TaskBoard, TaskRow};

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => io::stdout().is_terminal(),
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self { color })
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    #[tracing::instrument(skip(self, board), fields(workspace = %board.workspace_name))]
    pub fn print_board(&self, board: &TaskBoard) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        self.write_board(&mut out, board)
    }

    pub fn write_board<W: Write>(&self, mut out: W, board: &TaskBoard) -> anyhow::Result<()> {
        writeln!(out, "{}", self.paint(&board.workspace_name, "1"))?;
        writeln!(out)?;

        writeln!(out, "Active ({})", board.active_count())?;
        if board.active.is_empty() {
            writeln!(out, "  no active tasks")?;
        } else {
            self.write_rows(&mut out, &board.active)?;
        }
        writeln!(out)?;

        writeln!(out, "Completed ({})", board.completed_count())?;
        if board.completed.is_empty() {
            writeln!(out, "  nothing completed yet")?;
        } else {
            self.write_rows(&mut out, &board.completed)?;
        }
        Ok(())
    }

    fn write_rows<W: Write>(&self, out: W, rows: &[TaskRow]) -> anyhow::Result<()> {
        let headers = vec![
            "ID".to_string(),
            "Task".to_string(),
            "Owner".to_string(),
            "Status".to_string(),
            "Priority".to_string(),
            "Due".to_string(),
            "".to_string(),
            "Notes".to_string(),
        ];

        let cells = rows
            .iter()
            .map(|row| {
                let code = due_color(row.due_status);
                let due = match code {
                    Some(code) => self.paint(&row.due_label, code),
                    None => row.due_label.clone(),
                };
                let urgency = match row.due_status {
                    DueStatus::Completed => String::new(),
                    other => other.label(),
                };
                vec![
                    row.id.to_string(),
                    row.name.clone(),
                    row.owner.clone(),
                    row.status.to_string(),
                    row.priority.to_string(),
                    due,
                    urgency,
                    row.notes.clone(),
                ]
            })
            .collect();

        write_table(out, headers, cells)
    }

    #[tracing::instrument(skip_all)]
    pub fn print_workspaces(&self, items: &[WorkspaceItem]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        if items.is_empty() {
            writeln!(out, "No workspaces. Create one with `taskdeck workspace add <name>`.")?;
            return Ok(());
        }

        let headers = vec![
            "".to_string(),
            "Workspace".to_string(),
            "Tasks".to_string(),
            "ID".to_string(),
        ];
        let rows = items
            .iter()
            .map(|item| {
                let marker = if item.active {
                    self.paint("*", "32")
                } else {
                    String::new()
                };
                vec![
                    marker,
                    item.name.clone(),
                    item.task_count.to_string(),
                    item.id.to_string(),
                ]
            })
            .collect();
        write_table(&mut out, headers, rows)
    }

    pub fn print_owners(&self, owners: &[String]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        for owner in owners {
            writeln!(out, "{owner}")?;
        }
        Ok(())
    }

    pub fn print_clock(&self, clock: &ClockDisplay) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "{}  {}", self.paint(&clock.time, "1"), clock.date)?;
        Ok(())
    }

    pub fn print_json<T: Serialize + ?Sized>(&self, value: &T) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        serde_json::to_writer_pretty(&mut out, value)?;
        writeln!(out)?;
        Ok(())
    }

    pub fn message(&self, text: &str) {
        println!("{text}");
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || text.is_empty() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn due_color(status: DueStatus) -> Option<&'static str> {
    match status {
        DueStatus::Overdue { .. } => Some("31"),
        DueStatus::Today => Some("33"),
        DueStatus::Soon { .. } => Some("36"),
        DueStatus::Future { .. } | DueStatus::Unscheduled | DueStatus::Completed => None,
    }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    let mut line = String::new();
    for idx in 0..column_count {
        line.push_str(&format!("{:width$} ", headers[idx], width = widths[idx]));
    }
    writeln!(writer, "{}", line.trim_end())?;

    line.clear();
    for width in &widths {
        line.push_str(&format!("{:-<width$} ", "", width = *width));
    }
    writeln!(writer, "{}", line.trim_end())?;

    for row in rows {
        line.clear();
        for (idx, cell) in row.iter().enumerate() {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            line.push_str(cell);
            line.push_str(&" ".repeat(padding + 1));
        }
        writeln!(writer, "{}", line.trim_end())?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
