use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, error, info, instrument};

use crate::datetime::WeekdaySet;
use crate::error::{StoreError, ValidationError};
use crate::filter::{StatusFilter, ViewContext};
use crate::task::{Task, TaskId};

/// Receives the full collection after every successful mutation.
///
/// Errors are logged by the store and never surface to the caller of the
/// mutation; the in-memory collection stays authoritative.
pub trait StoreObserver {
    fn on_change(&mut self, tasks: &[Task]) -> anyhow::Result<()>;
}

/// Owned task collection in insertion order.
#[derive(Default)]
pub struct TaskStore {
    tasks: Vec<Task>,
    observers: Vec<Box<dyn StoreObserver>>,
}

impl fmt::Debug for TaskStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskStore")
            .field("tasks", &self.tasks)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tasks(tasks: Vec<Task>) -> Self {
        debug!(count = tasks.len(), "seeded task store");
        Self {
            tasks,
            observers: Vec::new(),
        }
    }

    pub fn subscribe(&mut self, observer: Box<dyn StoreObserver>) {
        self.observers.push(observer);
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    #[instrument(skip(self, text, now), fields(due = %due_date, repeat = repeat_days.len()))]
    pub fn add_task(
        &mut self,
        text: &str,
        due_date: NaiveDate,
        repeat_days: WeekdaySet,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Task, StoreError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ValidationError::EmptyText.into());
        }
        if due_date < today {
            return Err(ValidationError::DueDateInPast {
                due: due_date,
                today,
            }
            .into());
        }

        let task = Task::new(
            self.next_id(now)?,
            text.to_string(),
            due_date,
            repeat_days,
            now,
        );
        info!(id = %task.id, recurring = task.is_recurring(), "added task");

        self.tasks.push(task.clone());
        self.notify();
        Ok(task)
    }

    /// Idempotent: removing an unknown id is a no-op.
    #[instrument(skip(self), fields(id = %id))]
    pub fn remove_task(&mut self, id: TaskId) -> Option<Task> {
        let Some(idx) = self.tasks.iter().position(|t| t.id == id) else {
            debug!("remove of unknown id ignored");
            return None;
        };

        let removed = self.tasks.remove(idx);
        info!(remaining = self.tasks.len(), "removed task");
        self.notify();
        Some(removed)
    }

    /// Returns the completion state after the toggle.
    #[instrument(skip(self), fields(id = %id, date = %viewed_date))]
    pub fn toggle_completion(
        &mut self,
        id: TaskId,
        viewed_date: NaiveDate,
    ) -> Result<bool, StoreError> {
        let task = self
            .tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(StoreError::NotFound { id })?;

        let completed = task.toggle_on(viewed_date);
        info!(completed, recurring = task.is_recurring(), "toggled completion");
        self.notify();
        Ok(completed)
    }

    pub fn is_completed_on(task: &Task, date: NaiveDate) -> bool {
        task.is_completed_on(date)
    }

    pub fn visible_tasks(&self, viewed_date: NaiveDate, status_filter: StatusFilter) -> Vec<&Task> {
        self.visible_in(&ViewContext::new(viewed_date, status_filter))
    }

    pub fn visible_in(&self, view: &ViewContext) -> Vec<&Task> {
        self.tasks.iter().filter(|t| view.matches(t)).collect()
    }

    /// Creation time in milliseconds, bumped past the newest id on collision.
    fn next_id(&self, now: DateTime<Utc>) -> Result<TaskId, StoreError> {
        let stamp = u64::try_from(now.timestamp_millis()).unwrap_or(0);
        let newest = self.tasks.iter().map(|t| t.id.0).max();
        match newest {
            Some(max) if stamp <= max => max
                .checked_add(1)
                .map(TaskId)
                .ok_or(StoreError::IdsExhausted { newest: TaskId(max) }),
            _ => Ok(TaskId(stamp)),
        }
    }

    fn notify(&mut self) {
        for observer in &mut self.observers {
            if let Err(err) = observer.on_change(&self.tasks) {
                error!(
                    error = %format!("{err:#}"),
                    "store observer failed; keeping in-memory state"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use anyhow::anyhow;
    use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};

    use super::{StoreObserver, TaskStore};
    use crate::datetime::WeekdaySet;
    use crate::error::{StoreError, ValidationError};
    use crate::filter::StatusFilter;
    use crate::task::{Task, TaskId};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap()
    }

    fn texts(tasks: &[&Task]) -> Vec<String> {
        tasks.iter().map(|t| t.text.clone()).collect()
    }

    struct Recorder(Rc<RefCell<Vec<usize>>>);

    impl StoreObserver for Recorder {
        fn on_change(&mut self, tasks: &[Task]) -> anyhow::Result<()> {
            self.0.borrow_mut().push(tasks.len());
            Ok(())
        }
    }

    struct Broken;

    impl StoreObserver for Broken {
        fn on_change(&mut self, _tasks: &[Task]) -> anyhow::Result<()> {
            Err(anyhow!("storage full"))
        }
    }

    #[test]
    fn added_one_shot_task_is_visible_once_on_its_date() {
        let mut store = TaskStore::new();
        let today = date(2024, 1, 1);
        let task = store
            .add_task("Buy milk", today, WeekdaySet::EMPTY, today, now())
            .unwrap();

        let visible = store.visible_tasks(today, StatusFilter::All);
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, task.id);
    }

    #[test]
    fn past_due_date_is_rejected_without_changes() {
        let mut store = TaskStore::new();
        let err = store
            .add_task(
                "Too late",
                date(2023, 12, 31),
                WeekdaySet::EMPTY,
                date(2024, 1, 1),
                now(),
            )
            .unwrap_err();

        assert_eq!(
            err,
            StoreError::Validation(ValidationError::DueDateInPast {
                due: date(2023, 12, 31),
                today: date(2024, 1, 1),
            })
        );
        assert!(store.is_empty());
    }

    #[test]
    fn blank_text_is_rejected() {
        let mut store = TaskStore::new();
        let today = date(2024, 1, 1);
        for text in ["", "   ", "\t\n"] {
            let err = store
                .add_task(text, today, WeekdaySet::EMPTY, today, now())
                .unwrap_err();
            assert_eq!(err, StoreError::Validation(ValidationError::EmptyText));
        }
        assert!(store.is_empty());
    }

    #[test]
    fn text_is_trimmed_and_ids_stay_unique() {
        let mut store = TaskStore::new();
        let today = date(2024, 1, 1);
        let a = store
            .add_task("  a  ", today, WeekdaySet::EMPTY, today, now())
            .unwrap();
        let b = store
            .add_task("b", today, WeekdaySet::EMPTY, today, now())
            .unwrap();
        let c = store
            .add_task(
                "c",
                today,
                WeekdaySet::EMPTY,
                today,
                now() - Duration::seconds(5),
            )
            .unwrap();

        assert_eq!(a.text, "a");
        assert_eq!(a.id, TaskId(now().timestamp_millis() as u64));
        assert!(b.id > a.id);
        assert!(c.id > b.id);
    }

    #[test]
    fn remove_is_idempotent() {
        let mut store = TaskStore::new();
        let today = date(2024, 1, 1);
        let keep = store
            .add_task("keep", today, WeekdaySet::EMPTY, today, now())
            .unwrap();
        let gone = store
            .add_task("gone", today, WeekdaySet::EMPTY, today, now())
            .unwrap();

        assert!(store.remove_task(gone.id).is_some());
        let after_first = store.tasks().to_vec();
        assert!(store.remove_task(gone.id).is_none());
        assert_eq!(store.tasks(), after_first.as_slice());
        assert_eq!(store.get(keep.id).map(|t| t.text.as_str()), Some("keep"));
    }

    #[test]
    fn toggle_is_self_inverse() {
        let mut store = TaskStore::new();
        let today = date(2024, 1, 1);
        let one_shot = store
            .add_task("once", today, WeekdaySet::EMPTY, today, now())
            .unwrap();
        let recurring = store
            .add_task(
                "weekly",
                today,
                WeekdaySet::from_indices([1, 3]).unwrap(),
                today,
                now(),
            )
            .unwrap();

        let monday = date(2024, 1, 8);
        assert!(store.toggle_completion(one_shot.id, monday).unwrap());
        assert!(!store.toggle_completion(one_shot.id, today).unwrap());
        assert!(store.toggle_completion(recurring.id, monday).unwrap());
        assert!(!store.toggle_completion(recurring.id, monday).unwrap());

        let tasks = store.tasks();
        assert!(!TaskStore::is_completed_on(&tasks[0], today));
        assert!(!TaskStore::is_completed_on(&tasks[1], monday));
    }

    #[test]
    fn toggle_of_unknown_id_reports_not_found() {
        let mut store = TaskStore::new();
        let err = store
            .toggle_completion(TaskId(99), date(2024, 1, 1))
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn recurring_visibility_follows_weekdays_and_start() {
        let mut store = TaskStore::new();
        let start = date(2024, 1, 1);
        store
            .add_task(
                "Gym",
                start,
                WeekdaySet::from_indices([1, 3]).unwrap(),
                start,
                now(),
            )
            .unwrap();

        assert_eq!(store.visible_tasks(date(2024, 1, 8), StatusFilter::All).len(), 1);
        assert!(store.visible_tasks(date(2023, 12, 25), StatusFilter::All).is_empty());
        assert!(store.visible_tasks(date(2024, 1, 2), StatusFilter::All).is_empty());
    }

    #[test]
    fn active_and_completed_partition_all() {
        let mut store = TaskStore::new();
        let today = date(2024, 1, 1);
        let weekly = WeekdaySet::from_indices([1]).unwrap();
        let a = store
            .add_task("a", today, WeekdaySet::EMPTY, today, now())
            .unwrap();
        store
            .add_task("b", today, WeekdaySet::EMPTY, today, now())
            .unwrap();
        let c = store.add_task("c", today, weekly, today, now()).unwrap();
        store.add_task("d", today, weekly, today, now()).unwrap();
        store
            .add_task("e", date(2024, 1, 2), WeekdaySet::EMPTY, today, now())
            .unwrap();

        store.toggle_completion(a.id, today).unwrap();
        store.toggle_completion(c.id, today).unwrap();

        let all = texts(&store.visible_tasks(today, StatusFilter::All));
        let active = texts(&store.visible_tasks(today, StatusFilter::Active));
        let completed = texts(&store.visible_tasks(today, StatusFilter::Completed));

        assert_eq!(all, vec!["a", "b", "c", "d"]);
        assert_eq!(active, vec!["b", "d"]);
        assert_eq!(completed, vec!["a", "c"]);
        for text in &all {
            assert_eq!(
                active.contains(text) as u8 + completed.contains(text) as u8,
                1
            );
        }
    }

    #[test]
    fn buy_milk_end_to_end() {
        let mut store = TaskStore::new();
        let today = date(2024, 1, 1);
        let milk = store
            .add_task("Buy milk", today, WeekdaySet::EMPTY, today, now())
            .unwrap();

        assert_eq!(texts(&store.visible_tasks(today, StatusFilter::All)), vec!["Buy milk"]);

        store.toggle_completion(milk.id, today).unwrap();

        assert_eq!(
            texts(&store.visible_tasks(today, StatusFilter::Completed)),
            vec!["Buy milk"]
        );
        assert!(store.visible_tasks(today, StatusFilter::Active).is_empty());
    }

    #[test]
    fn add_after_the_largest_id_fails_without_changes() {
        let today = date(2024, 1, 1);
        let seeded = Task::new(
            TaskId(u64::MAX),
            "last".to_string(),
            today,
            WeekdaySet::EMPTY,
            now(),
        );
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut store = TaskStore::from_tasks(vec![seeded]);
        store.subscribe(Box::new(Recorder(Rc::clone(&seen))));

        let err = store
            .add_task("y", today, WeekdaySet::EMPTY, today, now())
            .unwrap_err();

        assert_eq!(
            err,
            StoreError::IdsExhausted {
                newest: TaskId(u64::MAX)
            }
        );
        assert_eq!(store.len(), 1);
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn observers_see_every_successful_mutation() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut store = TaskStore::new();
        store.subscribe(Box::new(Recorder(Rc::clone(&seen))));

        let today = date(2024, 1, 1);
        let task = store
            .add_task("a", today, WeekdaySet::EMPTY, today, now())
            .unwrap();
        store
            .add_task("", today, WeekdaySet::EMPTY, today, now())
            .unwrap_err();
        store.toggle_completion(task.id, today).unwrap();
        assert!(store.remove_task(TaskId(1)).is_none());
        store.remove_task(task.id).unwrap();

        assert_eq!(*seen.borrow(), vec![1, 1, 0]);
    }

    #[test]
    fn failing_observer_does_not_break_the_store() {
        let mut store = TaskStore::new();
        store.subscribe(Box::new(Broken));

        let today = date(2024, 1, 1);
        let task = store
            .add_task("still works", today, WeekdaySet::EMPTY, today, now())
            .unwrap();
        assert!(store.toggle_completion(task.id, today).unwrap());
        assert_eq!(store.visible_tasks(today, StatusFilter::Completed).len(), 1);
    }
}
