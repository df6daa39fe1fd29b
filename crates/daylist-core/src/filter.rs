use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::NaiveDate;

use crate::task::{
  Schedule,
  Task
};

#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  Hash,
)]
pub enum StatusFilter {
  #[default]
  All,
  Active,
  Completed
}

impl StatusFilter {
  #[must_use]
  pub fn as_str(&self) -> &'static str {
    match self {
      | Self::All => "all",
      | Self::Active => "active",
      | Self::Completed => "completed"
    }
  }

  #[must_use]
  pub fn accepts(
    &self,
    completed: bool
  ) -> bool {
    match self {
      | Self::All => true,
      | Self::Active => !completed,
      | Self::Completed => completed
    }
  }
}

impl fmt::Display for StatusFilter {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for StatusFilter {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "all" => Ok(Self::All),
      | "active" | "pending" => {
        Ok(Self::Active)
      }
      | "completed" | "done" => {
        Ok(Self::Completed)
      }
      | other => {
        Err(anyhow!(
          "unknown status filter: \
           {other} (expected all, \
           active or completed)"
        ))
      }
    }
  }
}

/// What the user is currently looking
/// at. Never persisted.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub struct ViewContext {
  pub viewed_date:   NaiveDate,
  pub status_filter: StatusFilter
}

impl ViewContext {
  #[must_use]
  pub fn new(
    viewed_date: NaiveDate,
    status_filter: StatusFilter
  ) -> Self {
    Self {
      viewed_date,
      status_filter
    }
  }

  #[must_use]
  pub fn matches(
    &self,
    task: &Task
  ) -> bool {
    is_scheduled_on(
      task,
      self.viewed_date
    ) && self.status_filter.accepts(
      task.is_completed_on(
        self.viewed_date
      )
    )
  }
}

/// Date/recurrence stage of the view
/// filter. A one-shot task only shows on
/// its own due date; a recurring task
/// shows on its weekdays once started.
#[must_use]
pub fn is_scheduled_on(
  task: &Task,
  date: NaiveDate
) -> bool {
  match &task.schedule {
    | Schedule::OneShot { .. } => {
      task.due_date == date
    }
    | Schedule::Recurring {
      repeat_days,
      ..
    } => {
      repeat_days.contains_date(date)
        && date >= task.due_date
    }
  }
}
