use std::fmt;

use chrono::NaiveDate;

use crate::task::Task;

/// Tasks due within this many days (and
/// not today) count as `Soon`.
pub const SOON_WINDOW_DAYS: i64 = 3;

/// Urgency derived from a due date, never
/// stored on the task.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum DueStatus {
  Overdue {
    days_late: i64
  },
  Today,
  Soon {
    days_left: i64
  },
  Future {
    days_left: i64
  },
  Unscheduled,
  Completed
}

impl DueStatus {
  /// Sort rank for active tasks; lower
  /// is more urgent.
  pub fn rank(self) -> u8 {
    match self {
      | DueStatus::Overdue {
        ..
      } => 1,
      | DueStatus::Today => 2,
      | DueStatus::Soon {
        ..
      } => 3,
      | DueStatus::Future {
        ..
      } => 4,
      | DueStatus::Unscheduled
      | DueStatus::Completed => 5
    }
  }

  pub fn category(self) -> &'static str {
    match self {
      | DueStatus::Overdue {
        ..
      } => "overdue",
      | DueStatus::Today => "today",
      | DueStatus::Soon {
        ..
      } => "soon",
      | DueStatus::Future {
        ..
      } => "future",
      | DueStatus::Unscheduled => {
        "unscheduled"
      }
      | DueStatus::Completed => {
        "completed"
      }
    }
  }

  pub fn label(self) -> String {
    match self {
      | DueStatus::Overdue {
        days_late
      } => {
        format!(
          "Overdue by {}",
          plural_days(days_late)
        )
      }
      | DueStatus::Today => {
        "Due today".to_string()
      }
      | DueStatus::Soon {
        days_left: 1
      } => "Due tomorrow".to_string(),
      | DueStatus::Soon {
        days_left
      }
      | DueStatus::Future {
        days_left
      } => {
        format!(
          "Due in {}",
          plural_days(days_left)
        )
      }
      | DueStatus::Unscheduled => {
        "No due date".to_string()
      }
      | DueStatus::Completed => {
        "Completed".to_string()
      }
    }
  }
}

impl fmt::Display for DueStatus {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(self.category())
  }
}

fn plural_days(n: i64) -> String {
  if n == 1 {
    "1 day".to_string()
  } else {
    format!("{n} days")
  }
}

#[must_use]
pub fn classify_due_date(
  due: Option<NaiveDate>,
  is_completed: bool,
  today: NaiveDate
) -> DueStatus {
  if is_completed {
    return DueStatus::Completed;
  }
  let Some(due) = due else {
    return DueStatus::Unscheduled;
  };

  let delta =
    (due - today).num_days();
  match delta {
    | d if d < 0 => {
      DueStatus::Overdue {
        days_late: -d
      }
    }
    | 0 => DueStatus::Today,
    | d if d <= SOON_WINDOW_DAYS => {
      DueStatus::Soon {
        days_left: d
      }
    }
    | d => {
      DueStatus::Future {
        days_left: d
      }
    }
  }
}

#[must_use]
pub fn classify_task(
  task: &Task,
  today: NaiveDate
) -> DueStatus {
  classify_due_date(
    task.due_date,
    task.is_complete(),
    today
  )
}

/// Stable: ties keep their input order.
pub fn sort_active_tasks(
  tasks: &mut [&Task],
  today: NaiveDate
) {
  tasks.sort_by_key(|task| {
    (
      classify_task(task, today).rank(),
      task
        .due_date
        .unwrap_or(NaiveDate::MAX)
    )
  });
}

/// Locale-specific rendering of an
/// absolute date.
pub trait DateFormatter {
  fn format_date(
    &self,
    date: NaiveDate
  ) -> String;
}

/// strftime-style pattern, e.g.
/// `%-d %b %Y` → `5 Jan 2025`.
#[derive(Debug, Clone)]
pub struct PatternFormatter {
  pattern: String
}

impl PatternFormatter {
  pub const DEFAULT_PATTERN: &'static str =
    "%-d %b %Y";

  pub fn new(
    pattern: impl Into<String>
  ) -> Self {
    Self {
      pattern: pattern.into()
    }
  }
}

impl Default for PatternFormatter {
  fn default() -> Self {
    Self::new(Self::DEFAULT_PATTERN)
  }
}

impl DateFormatter for PatternFormatter {
  fn format_date(
    &self,
    date: NaiveDate
  ) -> String {
    use std::fmt::Write;

    let mut out = String::new();
    // Invalid patterns surface as a
    // formatting error instead of a
    // panic.
    if write!(
      out,
      "{}",
      date.format(&self.pattern)
    )
    .is_err()
    {
      return crate::datetime::format_due_date(
        date
      );
    }
    out
  }
}

#[must_use]
pub fn format_relative_due_date(
  due: NaiveDate,
  today: NaiveDate,
  formatter: &dyn DateFormatter
) -> String {
  match (due - today).num_days() {
    | 0 => "Today".to_string(),
    | 1 => "Tomorrow".to_string(),
    | -1 => "Yesterday".to_string(),
    | _ => formatter.format_date(due)
  }
}

#[cfg(test)]
mod tests {
  use chrono::NaiveDate;

  use super::{
    DueStatus,
    PatternFormatter,
    classify_due_date,
    format_relative_due_date,
    sort_active_tasks
  };
  use crate::task::{
    Task,
    TaskFields
  };

  fn date(
    y: i32,
    m: u32,
    d: u32
  ) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d)
      .expect("valid date")
  }

  #[test]
  fn classifies_reference_dates() {
    let today = date(2025, 1, 13);
    let overdue = classify_due_date(
      Some(date(2025, 1, 10)),
      false,
      today
    );
    assert_eq!(
      overdue,
      DueStatus::Overdue {
        days_late: 3
      }
    );
    assert_eq!(
      overdue.label(),
      "Overdue by 3 days"
    );
    assert_eq!(
      classify_due_date(
        Some(today),
        false,
        today
      ),
      DueStatus::Today
    );
    assert_eq!(
      classify_due_date(
        Some(date(2025, 1, 16)),
        false,
        today
      ),
      DueStatus::Soon {
        days_left: 3
      }
    );
    assert_eq!(
      classify_due_date(
        Some(date(2025, 1, 17)),
        false,
        today
      ),
      DueStatus::Future {
        days_left: 4
      }
    );
  }

  #[test]
  fn completed_wins_over_any_date() {
    let today = date(2025, 1, 13);
    for due in [
      Some(date(2024, 12, 1)),
      Some(today),
      Some(date(2026, 1, 1)),
      None
    ] {
      assert_eq!(
        classify_due_date(
          due, true, today
        ),
        DueStatus::Completed
      );
    }
  }

  #[test]
  fn classification_is_repeatable() {
    let today = date(2025, 1, 13);
    let a = classify_due_date(
      Some(date(2025, 1, 14)),
      false,
      today
    );
    let b = classify_due_date(
      Some(date(2025, 1, 14)),
      false,
      today
    );
    assert_eq!(a, b);
    assert_eq!(a.label(), b.label());
    assert_eq!(a.label(), "Due tomorrow");
  }

  #[test]
  fn sort_orders_by_urgency_then_date() {
    let today = date(2025, 1, 13);
    let make = |id: u64, due: Option<NaiveDate>| {
      let mut fields =
        TaskFields::new(format!("t{id}"));
      fields.due_date = due;
      Task::new(id, fields)
    };
    let tasks = vec![
      make(1, Some(date(2025, 1, 30))),
      make(2, None),
      make(3, Some(date(2025, 1, 12))),
      make(4, Some(today)),
      make(5, Some(date(2025, 1, 15))),
      make(6, Some(date(2025, 1, 1))),
      make(7, Some(today)),
    ];
    let mut refs: Vec<&Task> =
      tasks.iter().collect();
    sort_active_tasks(&mut refs, today);

    let ids: Vec<u64> =
      refs.iter().map(|t| t.id).collect();
    assert_eq!(
      ids,
      vec![6, 3, 4, 7, 5, 1, 2]
    );
  }

  #[test]
  fn relative_names_for_adjacent_days()
  {
    let today = date(2025, 1, 13);
    let fmt = PatternFormatter::default();
    assert_eq!(
      format_relative_due_date(
        today, today, &fmt
      ),
      "Today"
    );
    assert_eq!(
      format_relative_due_date(
        date(2025, 1, 14),
        today,
        &fmt
      ),
      "Tomorrow"
    );
    assert_eq!(
      format_relative_due_date(
        date(2025, 1, 12),
        today,
        &fmt
      ),
      "Yesterday"
    );
    assert_eq!(
      format_relative_due_date(
        date(2025, 1, 20),
        today,
        &fmt
      ),
      "20 Jan 2025"
    );
    assert_eq!(
      format_relative_due_date(
        date(2025, 2, 5),
        today,
        &fmt
      ),
      "5 Feb 2025"
    );
  }

  #[test]
  fn bad_pattern_falls_back_to_iso() {
    let fmt = PatternFormatter::new("%Q");
    assert_eq!(
      format_relative_due_date(
        date(2025, 3, 1),
        date(2025, 1, 13),
        &fmt
      ),
      "2025-03-01"
    );
  }
}
