use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::utils::{day_of, get_current_date_string};

/// Position assigned to routine instances and other tasks that should sort
/// to the front of their context.
pub const FIRST_POSITION: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Open,
    Done,
    Cancelled,
    Archived,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Open => "open",
            TaskStatus::Done => "done",
            TaskStatus::Cancelled => "cancelled",
            TaskStatus::Archived => "archived",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Todo,
    Event,
    Routine,
}

impl TaskKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::Todo => "todo",
            TaskKind::Event => "event",
            TaskKind::Routine => "routine",
        }
    }
}

/// Status filter accepted by task listings. `All` is the union of
/// open/done/cancelled; archived tasks are only returned when asked
/// for explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    Only(TaskStatus),
    All,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Context {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub color: String,
    pub owner: String,
}

/// A task record as stored in the backend. Date fields keep the store's
/// text form ("YYYY-MM-DD" or "YYYY-MM-DD HH:MM:SS.000Z"); the backend
/// returns empty strings for unset fields, so accessors below treat
/// empty as absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub status: TaskStatus,
    pub kind: TaskKind,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub position: f64,
    #[serde(default)]
    pub context: String,
    pub owner: String,
    #[serde(default)]
    pub journal_date: String,
    #[serde(default)]
    pub scheduled_for: String,
    #[serde(default)]
    pub due_date: String,
    #[serde(default)]
    pub start_at: String,
    #[serde(default)]
    pub end_at: String,
    #[serde(default)]
    pub recurrence: String,
    #[serde(default)]
    pub migrated_count: i64,
    #[serde(default)]
    pub parent_task: String,
}

impl Task {
    /// Calendar day this task is journaled on, if any.
    pub fn journal_day(&self) -> Option<NaiveDate> {
        day_of(&self.journal_date)
    }

    pub fn due_day(&self) -> Option<NaiveDate> {
        day_of(&self.due_date)
    }

    pub fn has_recurrence(&self) -> bool {
        !self.recurrence.trim().is_empty()
    }

    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.due_day().is_some_and(|due| due < today)
    }
}

/// The per-day anchor record. Exactly one exists per (owner, date).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalPage {
    pub id: String,
    pub date: String,
    pub owner: String,
}

/// Payload for creating a task. Optional fields are omitted from the
/// request body entirely when unset.
#[derive(Debug, Clone, Serialize)]
pub struct TaskDraft {
    pub title: String,
    pub status: TaskStatus,
    pub kind: TaskKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub priority: i64,
    pub position: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    pub owner: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub journal_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurrence: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_task: Option<String>,
}

impl TaskDraft {
    /// New plain todo with the defaults the backend expects: status open,
    /// journaled on today's page.
    pub fn new(title: String, context_id: String, owner: String, kind: TaskKind) -> Self {
        Self {
            title,
            status: TaskStatus::Open,
            kind,
            notes: None,
            priority: 0,
            position: FIRST_POSITION,
            context: Some(context_id),
            owner,
            journal_date: Some(get_current_date_string()),
            due_date: None,
            start_at: None,
            end_at: None,
            recurrence: None,
            parent_task: None,
        }
    }

    /// Concrete instance of a routine template for `date`. The instance is
    /// an ordinary open todo pointing back at its template via parent_task;
    /// the template itself is never completed directly.
    pub fn instance_of(routine: &Task, date: NaiveDate) -> Self {
        Self {
            title: routine.title.clone(),
            status: TaskStatus::Open,
            kind: TaskKind::Todo,
            notes: (!routine.notes.is_empty()).then(|| routine.notes.clone()),
            priority: routine.priority,
            position: FIRST_POSITION,
            context: (!routine.context.is_empty()).then(|| routine.context.clone()),
            owner: routine.owner.clone(),
            journal_date: Some(date.format("%Y-%m-%d").to_string()),
            due_date: None,
            start_at: None,
            end_at: None,
            recurrence: None,
            parent_task: Some(routine.id.clone()),
        }
    }
}

/// Sparse partial update for a task: only fields that are set are sent,
/// so an untouched field is never clobbered server-side.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub journal_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurrence: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub migrated_count: Option<i64>,
}

impl TaskPatch {
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Patch that carries an unfinished task forward to `date`, bumping the
    /// staleness counter.
    pub fn migrate_to(date: NaiveDate, previous_count: i64) -> Self {
        Self {
            journal_date: Some(date.format("%Y-%m-%d").to_string()),
            migrated_count: Some(previous_count + 1),
            ..Self::default()
        }
    }

    /// Patch that moves a task onto `date`'s journal page without touching
    /// the migration counter (event reconciliation).
    pub fn journal_on(date: NaiveDate) -> Self {
        Self {
            journal_date: Some(date.format("%Y-%m-%d").to_string()),
            ..Self::default()
        }
    }
}
