use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::datetime::{due_date_serde, format_due_date, parse_due_date};
use crate::error::StoreError;

pub type TaskId = u64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum Status {
    #[default]
    #[serde(rename = "Not Started")]
    NotStarted,
    #[serde(rename = "In Progress")]
    InProgress,
    #[serde(rename = "Complete")]
    Complete,
}

impl Status {
    pub const ALL: [Status; 3] = [Status::NotStarted, Status::InProgress, Status::Complete];

    pub fn as_str(self) -> &'static str {
        match self {
            Status::NotStarted => "Not Started",
            Status::InProgress => "In Progress",
            Status::Complete => "Complete",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase().replace(['-', '_'], " ");
        match key.as_str() {
            "not started" | "notstarted" | "todo" => Ok(Status::NotStarted),
            "in progress" | "inprogress" | "doing" => Ok(Status::InProgress),
            "complete" | "completed" | "done" => Ok(Status::Complete),
            _ => {
                let expected: Vec<&str> = Status::ALL.iter().map(|st| st.as_str()).collect();
                Err(anyhow!(
                    "unknown status: {s} (expected one of: {})",
                    expected.join(", ")
                ))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "Low",
            Priority::Medium => "Medium",
            Priority::High => "High",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" | "l" => Ok(Priority::Low),
            "medium" | "med" | "m" => Ok(Priority::Medium),
            "high" | "h" => Ok(Priority::High),
            _ => Err(anyhow!("unknown priority: {s}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,

    pub name: String,

    #[serde(default)]
    pub owner: String,

    pub status: Status,

    pub priority: Priority,

    #[serde(default, with = "due_date_serde")]
    pub due_date: Option<NaiveDate>,

    #[serde(default)]
    pub notes: String,
}

impl Task {
    pub fn new(id: TaskId, fields: TaskFields) -> Self {
        let mut task = Self {
            id,
            name: String::new(),
            owner: String::new(),
            status: Status::default(),
            priority: Priority::default(),
            due_date: None,
            notes: String::new(),
        };
        task.replace_fields(fields);
        task
    }

    /// Overwrites everything except `id`.
    pub fn replace_fields(&mut self, fields: TaskFields) {
        self.name = fields.name;
        self.owner = fields.owner;
        self.status = fields.status;
        self.priority = fields.priority;
        self.due_date = fields.due_date;
        self.notes = fields.notes;
    }

    pub fn is_complete(&self) -> bool {
        self.status == Status::Complete
    }

    pub fn fields(&self) -> TaskFields {
        TaskFields {
            name: self.name.clone(),
            owner: self.owner.clone(),
            status: self.status,
            priority: self.priority,
            due_date: self.due_date,
            notes: self.notes.clone(),
        }
    }
}

/// Validated, user-editable part of a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFields {
    pub name: String,
    pub owner: String,
    pub status: Status,
    pub priority: Priority,
    pub due_date: Option<NaiveDate>,
    pub notes: String,
}

impl TaskFields {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            owner: String::new(),
            status: Status::default(),
            priority: Priority::default(),
            due_date: None,
            notes: String::new(),
        }
    }

    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = owner.into();
        self
    }

    pub fn status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn due(mut self, due_date: NaiveDate) -> Self {
        self.due_date = Some(due_date);
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    /// Trims text fields and enforces the required name.
    pub fn normalized(mut self) -> Result<Self, StoreError> {
        self.name = self.name.trim().to_string();
        self.owner = self.owner.trim().to_string();
        self.notes = self.notes.trim().to_string();
        if self.name.is_empty() {
            return Err(StoreError::validation("task name is required"));
        }
        Ok(self)
    }

    #[tracing::instrument(skip(form, today), fields(name_len = form.name.len()))]
    pub fn from_form(form: &TaskForm, today: NaiveDate) -> Result<Self, StoreError> {
        let status = if form.status.trim().is_empty() {
            Status::default()
        } else {
            form.status
                .parse()
                .map_err(|err: anyhow::Error| StoreError::validation(err.to_string()))?
        };
        let priority = if form.priority.trim().is_empty() {
            Priority::default()
        } else {
            form.priority
                .parse()
                .map_err(|err: anyhow::Error| StoreError::validation(err.to_string()))?
        };
        let due_date = parse_due_date(&form.due_date, today)
            .map_err(|err| StoreError::validation(format!("{err:#}")))?;

        TaskFields {
            name: form.name.clone(),
            owner: form.owner.clone(),
            status,
            priority,
            due_date,
            notes: form.notes.clone(),
        }
        .normalized()
    }
}

/// Raw string values as they come from an input form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub priority: String,
    #[serde(default)]
    pub due_date: String,
    #[serde(default)]
    pub notes: String,
}

impl From<&Task> for TaskForm {
    fn from(task: &Task) -> Self {
        Self {
            name: task.name.clone(),
            owner: task.owner.clone(),
            status: task.status.to_string(),
            priority: task.priority.to_string(),
            due_date: task.due_date.map(format_due_date).unwrap_or_default(),
            notes: task.notes.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{Priority, Status, Task, TaskFields, TaskForm};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 13).expect("valid date")
    }

    #[test]
    fn status_parses_form_spellings() {
        assert_eq!("Not Started".parse::<Status>().expect("parse"), Status::NotStarted);
        assert_eq!("in-progress".parse::<Status>().expect("parse"), Status::InProgress);
        assert_eq!("DONE".parse::<Status>().expect("parse"), Status::Complete);
        assert!("blocked".parse::<Status>().is_err());
    }

    #[test]
    fn status_serializes_with_display_names() {
        let json = serde_json::to_string(&Status::InProgress).expect("serialize");
        assert_eq!(json, "\"In Progress\"");
    }

    #[test]
    fn form_is_trimmed_and_defaulted() {
        let form = TaskForm {
            name: "  Draft budget ".to_string(),
            owner: " Sari ".to_string(),
            due_date: "2025-01-20".to_string(),
            ..TaskForm::default()
        };
        let fields = TaskFields::from_form(&form, today()).expect("valid form");
        assert_eq!(fields.name, "Draft budget");
        assert_eq!(fields.owner, "Sari");
        assert_eq!(fields.status, Status::NotStarted);
        assert_eq!(fields.priority, Priority::Medium);
        assert_eq!(fields.due_date, NaiveDate::from_ymd_opt(2025, 1, 20));
    }

    #[test]
    fn form_without_name_is_rejected() {
        let form = TaskForm {
            name: "   ".to_string(),
            ..TaskForm::default()
        };
        let err = TaskFields::from_form(&form, today()).expect_err("blank name");
        assert!(err.is_validation());
    }

    #[test]
    fn form_with_bad_priority_is_rejected() {
        let form = TaskForm {
            name: "x".to_string(),
            priority: "urgent".to_string(),
            ..TaskForm::default()
        };
        assert!(TaskFields::from_form(&form, today())
            .expect_err("bad priority")
            .is_validation());
    }

    #[test]
    fn replace_keeps_id() {
        let mut task = Task::new(7, TaskFields::new("old"));
        task.replace_fields(TaskFields::new("new").status(Status::Complete));
        assert_eq!(task.id, 7);
        assert_eq!(task.name, "new");
        assert!(task.is_complete());
    }

    #[test]
    fn task_form_prefill_round_trips() {
        let task = Task::new(
            1,
            TaskFields::new("Ship")
                .owner("Budi")
                .priority(Priority::High)
                .due(today())
                .notes("before lunch"),
        );
        let form = TaskForm::from(&task);
        assert_eq!(form.due_date, "2025-01-13");
        let fields = TaskFields::from_form(&form, today()).expect("valid form");
        assert_eq!(fields, task.fields());
    }

    #[test]
    fn missing_optional_fields_deserialize() {
        let task: Task = serde_json::from_str(
            r#"{"id":3,"name":"n","status":"Complete","priority":"Low","dueDate":""}"#,
        )
        .expect("deserialize");
        assert_eq!(task.due_date, None);
        assert!(task.owner.is_empty());
        assert!(task.notes.is_empty());
    }
}
