use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::datetime::WeekdaySet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TaskId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        raw.parse::<u64>()
            .map(TaskId)
            .with_context(|| format!("invalid task id: {raw}"))
    }
}

/// Which completion state is authoritative for a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Schedule {
    OneShot {
        completed: bool,
    },
    Recurring {
        repeat_days: WeekdaySet,
        completed_dates: BTreeSet<NaiveDate>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "TaskRecord", into = "TaskRecord")]
pub struct Task {
    pub id: TaskId,
    pub text: String,
    /// Due date for a one-shot task, first possible occurrence for a recurring one.
    pub due_date: NaiveDate,
    pub schedule: Schedule,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn new(
        id: TaskId,
        text: String,
        due_date: NaiveDate,
        repeat_days: WeekdaySet,
        now: DateTime<Utc>,
    ) -> Self {
        let schedule = if repeat_days.is_empty() {
            Schedule::OneShot { completed: false }
        } else {
            Schedule::Recurring {
                repeat_days,
                completed_dates: BTreeSet::new(),
            }
        };

        Self {
            id,
            text,
            due_date,
            schedule,
            created_at: now,
        }
    }

    pub fn is_recurring(&self) -> bool {
        matches!(self.schedule, Schedule::Recurring { .. })
    }

    pub fn repeat_days(&self) -> WeekdaySet {
        match &self.schedule {
            Schedule::OneShot { .. } => WeekdaySet::EMPTY,
            Schedule::Recurring { repeat_days, .. } => *repeat_days,
        }
    }

    /// One-shot tasks ignore `date`.
    pub fn is_completed_on(&self, date: NaiveDate) -> bool {
        match &self.schedule {
            Schedule::OneShot { completed } => *completed,
            Schedule::Recurring {
                completed_dates, ..
            } => completed_dates.contains(&date),
        }
    }

    /// Flips the completion state that applies to `date` and returns the new state.
    pub fn toggle_on(&mut self, date: NaiveDate) -> bool {
        match &mut self.schedule {
            Schedule::OneShot { completed } => {
                *completed = !*completed;
                *completed
            }
            Schedule::Recurring {
                completed_dates, ..
            } => {
                if completed_dates.remove(&date) {
                    false
                } else {
                    completed_dates.insert(date);
                    true
                }
            }
        }
    }
}

/// Flat shape persisted to storage. Both completion fields are always
/// written; on read only the one selected by `repeatDays` is used.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskRecord {
    id: TaskId,
    text: String,
    #[serde(default)]
    completed: bool,
    created_at: DateTime<Utc>,
    #[serde(default)]
    repeat_days: Option<WeekdaySet>,
    due_date: NaiveDate,
    #[serde(default)]
    daily_completed_dates: Option<BTreeSet<NaiveDate>>,
}

impl From<TaskRecord> for Task {
    fn from(record: TaskRecord) -> Self {
        let repeat_days = record.repeat_days.unwrap_or_default();
        let schedule = if repeat_days.is_empty() {
            Schedule::OneShot {
                completed: record.completed,
            }
        } else {
            Schedule::Recurring {
                repeat_days,
                completed_dates: record.daily_completed_dates.unwrap_or_default(),
            }
        };

        Self {
            id: record.id,
            text: record.text,
            due_date: record.due_date,
            schedule,
            created_at: record.created_at,
        }
    }
}

impl From<Task> for TaskRecord {
    fn from(task: Task) -> Self {
        let (completed, repeat_days, daily_completed_dates) = match task.schedule {
            Schedule::OneShot { completed } => (completed, WeekdaySet::EMPTY, BTreeSet::new()),
            Schedule::Recurring {
                repeat_days,
                completed_dates,
            } => (false, repeat_days, completed_dates),
        };

        Self {
            id: task.id,
            text: task.text,
            completed,
            created_at: task.created_at,
            repeat_days: Some(repeat_days),
            due_date: task.due_date,
            daily_completed_dates: Some(daily_completed_dates),
        }
    }
}
