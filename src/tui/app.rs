use std::time::{Duration, Instant};

use ratatui::widgets::ListState;

use crate::config::Config;
use crate::models::{Context, StatusFilter, Task, TaskDraft, TaskKind, TaskPatch, TaskStatus};
use crate::rollover::Rollover;
use crate::store::{Store, StoreError};
use crate::tui::error::TuiError;

/// Contexts seeded for a user who has none yet.
const DEFAULT_CONTEXTS: [(&str, &str); 2] = [("Laboral", "#2E86DE"), ("Personal", "#27AE60")];

/// How long a status message stays on screen
const STATUS_MESSAGE_TIMEOUT: Duration = Duration::from_secs(6);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Browse,
    AddTask,
    ConfirmArchive,
}

pub struct App {
    pub config: Config,
    pub store: Store,

    /// One tab per context; tab_index selects into contexts.
    pub contexts: Vec<Context>,
    pub tab_index: usize,
    /// Open tasks of the selected context, board order.
    pub tasks: Vec<Task>,
    pub list_state: ListState,

    pub mode: Mode,
    /// Quick-add input buffer (AddTask mode)
    pub input: String,

    pub status_message: Option<String>,
    message_time: Option<Instant>,
    last_sync: Option<Instant>,

    pub should_quit: bool,
}

impl App {
    pub fn new(config: Config, store: Store) -> Result<Self, TuiError> {
        let contexts = Self::load_contexts(&store)?;

        let mut app = Self {
            config,
            store,
            contexts,
            tab_index: 0,
            tasks: Vec::new(),
            list_state: ListState::default(),
            mode: Mode::Browse,
            input: String::new(),
            status_message: None,
            message_time: None,
            last_sync: None,
            should_quit: false,
        };
        app.refresh()?;
        Ok(app)
    }

    /// Contexts for the tab bar, seeding the defaults on first run.
    fn load_contexts(store: &Store) -> Result<Vec<Context>, StoreError> {
        let contexts = store.list_contexts()?;
        if !contexts.is_empty() {
            return Ok(contexts);
        }
        for (name, color) in DEFAULT_CONTEXTS {
            store.ensure_context(name, Some(color))?;
        }
        store.list_contexts()
    }

    pub fn selected_context(&self) -> Option<&Context> {
        self.contexts.get(self.tab_index)
    }

    pub fn selected_task(&self) -> Option<&Task> {
        self.list_state.selected().and_then(|i| self.tasks.get(i))
    }

    /// Reload the open tasks of the selected context from the store.
    pub fn refresh(&mut self) -> Result<usize, StoreError> {
        let context_id = self.selected_context().map(|c| c.id.clone());
        self.tasks = self.store.list_tasks(
            context_id.as_deref(),
            StatusFilter::Only(TaskStatus::Open),
        )?;
        self.clamp_selection();
        self.last_sync = Some(Instant::now());
        Ok(self.tasks.len())
    }

    fn clamp_selection(&mut self) {
        if self.tasks.is_empty() {
            self.list_state.select(None);
        } else {
            let index = self.list_state.selected().unwrap_or(0);
            self.list_state.select(Some(index.min(self.tasks.len() - 1)));
        }
    }

    // ---------- user actions ----------

    pub fn sync(&mut self) {
        match self.refresh() {
            Ok(count) => {
                let stamp = chrono::Local::now().format("%H:%M:%S");
                self.set_status_message(format!("Synced {stamp} · {count} items"));
            }
            Err(e) => self.set_status_message(format!("Sync failed: {e}")),
        }
    }

    /// Refresh after the sync interval has elapsed (single periodic timer,
    /// driven from the event loop).
    pub fn maybe_auto_sync(&mut self) {
        let due = match self.last_sync {
            Some(at) => at.elapsed() >= self.config.sync_interval(),
            None => true,
        };
        if due {
            self.sync();
        }
    }

    /// Run the daily rollover for today. Reported distinctly from CRUD
    /// failures: a failed run leaves completed phases in place and is safe
    /// to retry as a whole.
    pub fn prepare_day(&mut self) {
        let today = chrono::Local::now().date_naive();
        match Rollover::new(&self.store).prepare_today(today) {
            Ok(summary) => {
                self.set_status_message(format!(
                    "Day prepared ✓ {} migrated · {} routines · {} events",
                    summary.migrated, summary.materialized, summary.reconciled
                ));
                if let Err(e) = self.refresh() {
                    self.set_status_message(format!("Sync failed: {e}"));
                }
            }
            Err(e) => self.set_status_message(format!(
                "Rollover failed ({e}); completed phases kept, retry when the store is back"
            )),
        }
    }

    /// Create the quick-add task at the end of the context's open list.
    pub fn submit_new_task(&mut self) {
        let title = self.input.trim().to_string();
        if title.is_empty() {
            self.mode = Mode::Browse;
            return;
        }
        let Some(context) = self.selected_context().cloned() else {
            self.set_status_message("No context selected".to_string());
            self.mode = Mode::Browse;
            return;
        };

        let result = (|| -> Result<Task, StoreError> {
            let max_position = self.tasks.iter().map(|t| t.position).fold(0.0_f64, f64::max);
            let mut draft = TaskDraft::new(
                title,
                context.id,
                self.store.owner_id()?.to_string(),
                TaskKind::Todo,
            );
            draft.position = max_position + 1.0;
            self.store.create_task(&draft)
        })();

        match result {
            Ok(_) => {
                self.input.clear();
                self.mode = Mode::Browse;
                if let Err(e) = self.refresh() {
                    self.set_status_message(format!("Sync failed: {e}"));
                }
            }
            Err(e) => self.set_status_message(format!("Create task failed: {e}")),
        }
    }

    pub fn toggle_selected_done(&mut self) {
        self.patch_selected("Update", |task| {
            let next = if task.status == TaskStatus::Done {
                TaskStatus::Open
            } else {
                TaskStatus::Done
            };
            TaskPatch::status(next)
        });
    }

    pub fn archive_selected(&mut self) {
        self.mode = Mode::Browse;
        self.patch_selected("Archive", |_| TaskPatch::status(TaskStatus::Archived));
    }

    pub fn cancel_selected(&mut self) {
        self.patch_selected("Cancel", |_| TaskPatch::status(TaskStatus::Cancelled));
    }

    fn patch_selected(&mut self, action: &str, patch_for: impl Fn(&Task) -> TaskPatch) {
        let Some(task) = self.selected_task().cloned() else {
            return;
        };
        match self.store.patch_task(&task.id, &patch_for(&task)) {
            Ok(_) => {
                if let Err(e) = self.refresh() {
                    self.set_status_message(format!("Sync failed: {e}"));
                }
            }
            Err(e) => self.set_status_message(format!("{action} task failed: {e}")),
        }
    }

    // ---------- navigation ----------

    pub fn select_next(&mut self) {
        if self.tasks.is_empty() {
            return;
        }
        let index = self.list_state.selected().unwrap_or(0);
        self.list_state
            .select(Some((index + 1).min(self.tasks.len() - 1)));
    }

    pub fn select_previous(&mut self) {
        let index = self.list_state.selected().unwrap_or(0);
        self.list_state.select(Some(index.saturating_sub(1)));
    }

    pub fn next_tab(&mut self) {
        if self.contexts.is_empty() {
            return;
        }
        self.tab_index = (self.tab_index + 1) % self.contexts.len();
        self.list_state.select(None);
        self.sync();
    }

    pub fn previous_tab(&mut self) {
        if self.contexts.is_empty() {
            return;
        }
        self.tab_index = (self.tab_index + self.contexts.len() - 1) % self.contexts.len();
        self.list_state.select(None);
        self.sync();
    }

    // ---------- status line ----------

    pub fn set_status_message(&mut self, message: String) {
        self.status_message = Some(message);
        self.message_time = Some(Instant::now());
    }

    pub fn check_status_message_timeout(&mut self) {
        if let Some(at) = self.message_time {
            if at.elapsed() >= STATUS_MESSAGE_TIMEOUT {
                self.status_message = None;
                self.message_time = None;
            }
        }
    }
}
