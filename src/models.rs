//! Core models for the studyhub library
//!
//! This module contains the task record types and the copy-on-write task store
//! that the interaction controller mutates.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Opaque task identity, derived from the creation timestamp in milliseconds
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct TaskId(u64);

impl TaskId {
    /// Wraps a raw id value
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the inner value of the id.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transient AI request status of a task
///
/// `Querying` and `Summarizing` act as the per-task mutual exclusion flag: while
/// a task is in either state no further request may be issued for it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Idle,
    Querying,
    Summarizing,
    Error,
}

impl TaskStatus {
    /// True while a request for the task is outstanding
    pub fn is_pending(&self) -> bool {
        matches!(self, TaskStatus::Querying | TaskStatus::Summarizing)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TaskStatus::Idle => "idle",
            TaskStatus::Querying => "querying",
            TaskStatus::Summarizing => "summarizing",
            TaskStatus::Error => "error",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" | "h" => Ok(Priority::High),
            "medium" | "m" => Ok(Priority::Medium),
            "low" | "l" => Ok(Priority::Low),
            other => Err(format!("unknown priority '{}'", other)),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Priority::High => "High",
            Priority::Medium => "Medium",
            Priority::Low => "Low",
        };
        f.write_str(label)
    }
}

/// A checklist item owned by a task
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Subtask {
    name: String,
    completed: bool,
}

impl Subtask {
    pub fn new(name: String) -> Self {
        Self {
            name,
            completed: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub(crate) fn toggle(&mut self) {
        self.completed = !self.completed;
    }
}

/// A learning goal with optional AI-derived content and due date
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    id: TaskId,
    title: String,
    query: String,
    image_ref: Option<String>,
    due_date: Option<DateTime<Utc>>,
    priority: Priority,
    completed: bool,
    ai_content: String,
    status: TaskStatus,
    subtasks: Vec<Subtask>,
}

impl Task {
    fn from_new(id: TaskId, new_task: NewTask) -> Self {
        Self {
            id,
            title: new_task.title.trim().to_string(),
            query: new_task.query,
            image_ref: new_task.image_ref,
            due_date: new_task.due_date,
            priority: new_task.priority,
            completed: false,
            ai_content: String::new(),
            status: TaskStatus::Idle,
            subtasks: Vec::new(),
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Free-text question the user wants the model to answer for this task
    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn image_ref(&self) -> Option<&str> {
        self.image_ref.as_deref()
    }

    pub fn due_date(&self) -> Option<DateTime<Utc>> {
        self.due_date
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Last successful AI output for this task, empty until the first analyze
    pub fn ai_content(&self) -> &str {
        &self.ai_content
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn subtasks(&self) -> &[Subtask] {
        &self.subtasks
    }

    /// Returns (completed, total) for the subtask checklist
    pub fn subtask_progress(&self) -> (usize, usize) {
        let done = self.subtasks.iter().filter(|s| s.is_completed()).count();
        (done, self.subtasks.len())
    }
}

/// Input for creating a task
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub image_ref: Option<String>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub priority: Priority,
}

impl NewTask {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    pub fn with_image_ref(mut self, image_ref: impl Into<String>) -> Self {
        self.image_ref = Some(image_ref.into());
        self
    }

    pub fn with_due_date(mut self, due_date: DateTime<Utc>) -> Self {
        self.due_date = Some(due_date);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}

// Distinguishes a missing field (None) from an explicit null (Some(None)).
fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Partial update for the editable fields of a task
///
/// `None` leaves a field untouched. For the optional fields `Some(None)` clears
/// the value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub image_ref: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub due_date: Option<Option<DateTime<Utc>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
}

impl TaskPatch {
    /// Seeds a patch with the current values of a task, as an edit form would
    pub fn from_task(task: &Task) -> Self {
        Self {
            title: Some(task.title.clone()),
            query: Some(task.query.clone()),
            image_ref: Some(task.image_ref.clone()),
            due_date: Some(task.due_date),
            priority: Some(task.priority),
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &TaskPatch::default()
    }

    /// Layers `other` on top of this patch; fields set in `other` win
    pub fn merge(&mut self, other: TaskPatch) {
        if other.title.is_some() {
            self.title = other.title;
        }
        if other.query.is_some() {
            self.query = other.query;
        }
        if other.image_ref.is_some() {
            self.image_ref = other.image_ref;
        }
        if other.due_date.is_some() {
            self.due_date = other.due_date;
        }
        if other.priority.is_some() {
            self.priority = other.priority;
        }
    }

    /// Applies the patch, returning whether anything changed.
    /// A blank title is ignored so the non-empty title invariant holds.
    fn apply(&self, task: &mut Task) -> bool {
        let before = task.clone();

        if let Some(title) = &self.title {
            let title = title.trim();
            if !title.is_empty() {
                task.title = title.to_string();
            }
        }
        if let Some(query) = &self.query {
            task.query = query.clone();
        }
        if let Some(image_ref) = &self.image_ref {
            task.image_ref = image_ref.clone();
        }
        if let Some(due_date) = self.due_date {
            task.due_date = due_date;
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }

        *task != before
    }
}

/// List filters offered by the task view
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Filter {
    #[default]
    All,
    Completed,
    Pending,
    HighPriority,
}

impl Filter {
    fn matches(&self, task: &Task) -> bool {
        match self {
            Filter::All => true,
            Filter::Completed => task.completed,
            Filter::Pending => !task.completed,
            Filter::HighPriority => task.priority == Priority::High,
        }
    }
}

impl FromStr for Filter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Filter::All),
            "completed" | "done" => Ok(Filter::Completed),
            "pending" => Ok(Filter::Pending),
            "high" | "high_priority" => Ok(Filter::HighPriority),
            other => Err(format!("unknown filter '{}'", other)),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Filter::All => "all",
            Filter::Completed => "completed",
            Filter::Pending => "pending",
            Filter::HighPriority => "high_priority",
        };
        f.write_str(label)
    }
}

/// Completion ratio over the whole task list
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
    pub percent: f64,
}

impl Progress {
    fn new(completed: usize, total: usize) -> Self {
        let percent = if total == 0 {
            0.0
        } else {
            completed as f64 / total as f64 * 100.0
        };
        Self {
            completed,
            total,
            percent,
        }
    }
}

/// Immutable snapshot of the task collection
///
/// Every mutating operation returns a new snapshot. A mutation that changes
/// nothing (unknown id, blank input) hands back a snapshot sharing the same
/// allocation, so [`TaskStore::changed_from`] can detect change by identity.
#[derive(Debug, Clone, Default)]
pub struct TaskStore {
    tasks: Arc<Vec<Task>>,
    last_id: u64,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self, now: DateTime<Utc>) -> TaskId {
        let millis = u64::try_from(now.timestamp_millis()).unwrap_or(0);
        TaskId(millis.max(self.last_id + 1))
    }

    fn with_tasks(&self, tasks: Vec<Task>) -> Self {
        Self {
            tasks: Arc::new(tasks),
            last_id: self.last_id,
        }
    }

    /// Applies `f` to a copy of the task with the given id. `f` reports whether
    /// it changed anything; unknown ids and unchanged tasks return `self`.
    fn modify<F>(&self, id: TaskId, f: F) -> Self
    where
        F: FnOnce(&mut Task) -> bool,
    {
        let Some(position) = self.position(id) else {
            return self.clone();
        };

        let mut tasks = self.tasks.as_ref().clone();
        if f(&mut tasks[position]) {
            self.with_tasks(tasks)
        } else {
            self.clone()
        }
    }

    fn position(&self, id: TaskId) -> Option<usize> {
        self.tasks.iter().position(|t| t.id == id)
    }

    /// Adds a task in front of the list. A blank title is a no-op.
    pub fn add(&self, new_task: NewTask) -> (TaskStore, Option<TaskId>) {
        self.add_at(new_task, Utc::now())
    }

    /// Adds a task using `now` as the creation time
    pub fn add_at(&self, new_task: NewTask, now: DateTime<Utc>) -> (TaskStore, Option<TaskId>) {
        if new_task.title.trim().is_empty() {
            return (self.clone(), None);
        }

        let id = self.next_id(now);
        let mut tasks = Vec::with_capacity(self.tasks.len() + 1);
        tasks.push(Task::from_new(id, new_task));
        tasks.extend(self.tasks.iter().cloned());

        let store = TaskStore {
            tasks: Arc::new(tasks),
            last_id: id.0,
        };
        (store, Some(id))
    }

    /// Removes a task together with its subtasks
    pub fn remove(&self, id: TaskId) -> TaskStore {
        if self.position(id).is_none() {
            return self.clone();
        }
        let tasks = self.tasks.iter().filter(|t| t.id != id).cloned().collect();
        self.with_tasks(tasks)
    }

    pub fn update(&self, id: TaskId, patch: &TaskPatch) -> TaskStore {
        self.modify(id, |task| patch.apply(task))
    }

    pub fn toggle_complete(&self, id: TaskId) -> TaskStore {
        self.modify(id, |task| {
            task.completed = !task.completed;
            true
        })
    }

    /// Appends a subtask. A blank name is a no-op.
    pub fn add_subtask(&self, id: TaskId, name: &str) -> TaskStore {
        let name = name.trim();
        if name.is_empty() {
            return self.clone();
        }
        self.modify(id, |task| {
            task.subtasks.push(Subtask::new(name.to_string()));
            true
        })
    }

    pub fn toggle_subtask(&self, id: TaskId, index: usize) -> TaskStore {
        self.modify(id, |task| match task.subtasks.get_mut(index) {
            Some(subtask) => {
                subtask.toggle();
                true
            }
            None => false,
        })
    }

    /// Drops every completed task
    pub fn clear_completed(&self) -> TaskStore {
        if !self.tasks.iter().any(|t| t.completed) {
            return self.clone();
        }
        let tasks = self.tasks.iter().filter(|t| !t.completed).cloned().collect();
        self.with_tasks(tasks)
    }

    pub(crate) fn set_status(&self, id: TaskId, status: TaskStatus) -> TaskStore {
        self.modify(id, |task| {
            if task.status == status {
                return false;
            }
            task.status = status;
            true
        })
    }

    pub(crate) fn set_ai_content(&self, id: TaskId, content: String) -> TaskStore {
        self.modify(id, |task| {
            task.ai_content = content;
            true
        })
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.position(id).is_some()
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Tasks matching the filter whose title contains `search` (case-insensitive)
    pub fn filtered(&self, filter: Filter, search: &str) -> Vec<&Task> {
        let needle = search.trim().to_lowercase();
        self.tasks
            .iter()
            .filter(|t| filter.matches(t))
            .filter(|t| needle.is_empty() || t.title.to_lowercase().contains(&needle))
            .collect()
    }

    pub fn progress(&self) -> Progress {
        let completed = self.tasks.iter().filter(|t| t.completed).count();
        Progress::new(completed, self.tasks.len())
    }

    /// True when `other` is a different collection than this snapshot
    pub fn changed_from(&self, other: &TaskStore) -> bool {
        !Arc::ptr_eq(&self.tasks, &other.tasks)
    }
}

/// Parses a due date given either as RFC 3339 or as a plain `YYYY-MM-DD` date
/// (interpreted as midnight UTC)
pub fn parse_due_date(input: &str) -> Result<DateTime<Utc>, Box<dyn std::error::Error>> {
    let input = input.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(input) {
        return Ok(parsed.with_timezone(&Utc));
    }

    let date = NaiveDate::parse_from_str(input, "%Y-%m-%d")?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| format!("invalid date '{}'", input))?;
    Ok(Utc.from_utc_datetime(&midnight))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(millis: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(millis).unwrap()
    }

    #[test]
    fn test_add_places_newest_first() {
        let store = TaskStore::new();
        let (store, first) = store.add_at(NewTask::new("Read Ch.1"), at(1_000));
        let (store, second) = store.add_at(NewTask::new("Read Ch.2"), at(2_000));

        assert_eq!(store.len(), 2);
        assert_eq!(store.tasks()[0].id(), second.unwrap());
        assert_eq!(store.tasks()[1].id(), first.unwrap());
        assert_eq!(store.tasks()[0].status(), TaskStatus::Idle);
        assert_eq!(store.tasks()[0].ai_content(), "");
    }

    #[test]
    fn test_ids_stay_unique_within_same_millisecond() {
        let store = TaskStore::new();
        let (store, a) = store.add_at(NewTask::new("a"), at(5_000));
        let (store, b) = store.add_at(NewTask::new("b"), at(5_000));
        assert!(b.unwrap() > a.unwrap());

        // Deleting the newest task must not let its id be issued again
        let store = store.remove(b.unwrap());
        let (_, c) = store.add_at(NewTask::new("c"), at(5_000));
        assert!(c.unwrap() > b.unwrap());
    }

    #[test]
    fn test_blank_title_is_noop() {
        let store = TaskStore::new();
        let (next, id) = store.add(NewTask::new("   "));
        assert!(id.is_none());
        assert!(!next.changed_from(&store));
    }

    #[test]
    fn test_unknown_id_is_noop() {
        let (store, _) = TaskStore::new().add(NewTask::new("task"));
        let missing = TaskId::new(1);

        assert!(!store.remove(missing).changed_from(&store));
        assert!(!store.toggle_complete(missing).changed_from(&store));
        assert!(!store.add_subtask(missing, "sub").changed_from(&store));
        assert!(!store.toggle_subtask(missing, 0).changed_from(&store));
        let patch = TaskPatch {
            title: Some("new".to_string()),
            ..Default::default()
        };
        assert!(!store.update(missing, &patch).changed_from(&store));
    }

    #[test]
    fn test_mutations_leave_previous_snapshot_untouched() {
        let (before, id) = TaskStore::new().add(NewTask::new("task"));
        let id = id.unwrap();
        let after = before.toggle_complete(id);

        assert!(after.changed_from(&before));
        assert!(!before.get(id).unwrap().is_completed());
        assert!(after.get(id).unwrap().is_completed());

        let back = after.toggle_complete(id);
        assert!(!back.get(id).unwrap().is_completed());
    }

    #[test]
    fn test_subtasks() {
        let (store, id) = TaskStore::new().add(NewTask::new("task"));
        let id = id.unwrap();
        let store = store.add_subtask(id, "first").add_subtask(id, "second");
        let store = store.add_subtask(id, "  ");

        let task = store.get(id).unwrap();
        assert_eq!(task.subtasks().len(), 2);
        assert_eq!(task.subtasks()[1].name(), "second");

        let toggled = store.toggle_subtask(id, 1);
        assert_eq!(toggled.get(id).unwrap().subtask_progress(), (1, 2));
        assert!(!toggled.get(id).unwrap().is_completed());

        // Out of range index changes nothing
        assert!(!toggled.toggle_subtask(id, 7).changed_from(&toggled));
    }

    #[test]
    fn test_remove_discards_subtasks() {
        let (store, id) = TaskStore::new().add(NewTask::new("task"));
        let id = id.unwrap();
        let store = store.add_subtask(id, "sub").remove(id);
        assert!(store.get(id).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_update_patch() {
        let due = at(86_400_000);
        let (store, id) = TaskStore::new().add(
            NewTask::new("task")
                .with_query("what")
                .with_image_ref("http://img")
                .with_due_date(due),
        );
        let id = id.unwrap();

        let patch = TaskPatch {
            title: Some("  ".to_string()),
            query: Some("why".to_string()),
            image_ref: Some(None),
            priority: Some(Priority::High),
            ..Default::default()
        };
        let store = store.update(id, &patch);
        let task = store.get(id).unwrap();

        assert_eq!(task.title(), "task");
        assert_eq!(task.query(), "why");
        assert_eq!(task.image_ref(), None);
        assert_eq!(task.due_date(), Some(due));
        assert_eq!(task.priority(), Priority::High);
    }

    #[test]
    fn test_patch_deserialization_distinguishes_null() {
        let patch: TaskPatch =
            serde_json::from_str(r#"{"image_ref": null, "title": "x"}"#).unwrap();
        assert_eq!(patch.image_ref, Some(None));
        assert_eq!(patch.due_date, None);
        assert_eq!(patch.title.as_deref(), Some("x"));
    }

    #[test]
    fn test_filter_search_and_progress() {
        let store = TaskStore::new();
        let (store, a) = store.add(NewTask::new("Learn Rust").with_priority(Priority::High));
        let (store, _) = store.add(NewTask::new("Learn Go"));
        let (store, _) = store.add(NewTask::new("Read paper"));
        let store = store.toggle_complete(a.unwrap());

        assert_eq!(store.filtered(Filter::Completed, "").len(), 1);
        assert_eq!(store.filtered(Filter::Pending, "").len(), 2);
        assert_eq!(store.filtered(Filter::HighPriority, "").len(), 1);
        assert_eq!(store.filtered(Filter::All, "learn").len(), 2);
        assert_eq!(store.filtered(Filter::Pending, "LEARN").len(), 1);

        let progress = store.progress();
        assert_eq!(progress.completed, 1);
        assert_eq!(progress.total, 3);
        assert!((progress.percent - 100.0 / 3.0).abs() < 1e-9);

        let cleared = store.clear_completed();
        assert_eq!(cleared.len(), 2);
        assert!(!cleared.clear_completed().changed_from(&cleared));
    }

    #[test]
    fn test_empty_progress() {
        let progress = TaskStore::new().progress();
        assert_eq!(progress.total, 0);
        assert_eq!(progress.percent, 0.0);
    }

    #[test]
    fn test_status_changes() {
        let (store, id) = TaskStore::new().add(NewTask::new("task"));
        let id = id.unwrap();
        let querying = store.set_status(id, TaskStatus::Querying);
        assert!(querying.get(id).unwrap().status().is_pending());
        assert!(!querying
            .set_status(id, TaskStatus::Querying)
            .changed_from(&querying));
    }

    #[test]
    fn test_parse_due_date() {
        let date = parse_due_date("2024-05-01").unwrap();
        assert_eq!(date, Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap());

        let precise = parse_due_date("2024-05-01T12:30:00+02:00").unwrap();
        assert_eq!(
            precise,
            Utc.with_ymd_and_hms(2024, 5, 1, 10, 30, 0).unwrap()
        );

        assert!(parse_due_date("tomorrow").is_err());
    }

    #[test]
    fn test_priority_and_filter_parsing() {
        assert_eq!("HIGH".parse::<Priority>().unwrap(), Priority::High);
        assert!("urgent".parse::<Priority>().is_err());
        assert_eq!("done".parse::<Filter>().unwrap(), Filter::Completed);
    }
}
