use chrono::{Days, NaiveDate};

use crate::models::{JournalPage, Task, TaskDraft, TaskPatch};
use crate::recurrence;
use crate::store::StoreError;

/// The slice of the record store the rollover engine needs. All methods are
/// scoped to the authenticated owner; implementations compose the owner
/// clause themselves. The trait exists so the engine can run against an
/// in-memory store in tests.
pub trait DailyStore {
    fn find_journal_page(&self, date: NaiveDate) -> Result<Option<JournalPage>, StoreError>;
    fn create_journal_page(&self, date: NaiveDate) -> Result<JournalPage, StoreError>;
    /// Open todos journaled on `date` (half-open day window).
    fn open_todos_on(&self, date: NaiveDate) -> Result<Vec<Task>, StoreError>;
    /// Routine templates with a non-empty recurrence expression.
    fn routines_with_recurrence(&self) -> Result<Vec<Task>, StoreError>;
    /// Whether a child instance of `routine_id` already exists on `date`.
    fn has_routine_instance(&self, routine_id: &str, date: NaiveDate) -> Result<bool, StoreError>;
    /// Event tasks whose start_at falls on `date`.
    fn events_starting_on(&self, date: NaiveDate) -> Result<Vec<Task>, StoreError>;
    fn create_task(&self, draft: &TaskDraft) -> Result<Task, StoreError>;
    fn patch_task(&self, id: &str, patch: &TaskPatch) -> Result<Task, StoreError>;
}

/// What a rollover run did, for the status line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RolloverSummary {
    /// Open todos carried forward from yesterday.
    pub migrated: usize,
    /// Routine instances created for today.
    pub materialized: usize,
    /// Events moved onto today's journal page.
    pub reconciled: usize,
}

/// Daily rollover engine.
///
/// `prepare_today` runs four phases strictly in order; each phase finishes
/// its record-store calls before the next starts. A storage failure in
/// phase N stops phases N+1.. and leaves earlier phases' effects in place;
/// the whole operation is safe to re-run, the duplicate-instance guard in
/// phase 3 keeps a re-run from materializing a routine twice.
pub struct Rollover<'a, S: DailyStore> {
    store: &'a S,
}

impl<'a, S: DailyStore> Rollover<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Ensure exactly one journal page exists for the owner on `date`.
    ///
    /// Looks the page up first and returns it unchanged if present. When the
    /// create loses a race against another client (unique index on
    /// owner+date), the page is re-queried and the winner returned; the
    /// create error only propagates if the re-query comes back empty too.
    pub fn ensure_page(&self, date: NaiveDate) -> Result<JournalPage, StoreError> {
        if let Some(page) = self.store.find_journal_page(date)? {
            return Ok(page);
        }
        match self.store.create_journal_page(date) {
            Ok(page) => Ok(page),
            Err(create_err) => {
                tracing::debug!(%date, error = %create_err, "journal page create lost a race, re-querying");
                match self.store.find_journal_page(date)? {
                    Some(page) => Ok(page),
                    None => Err(create_err),
                }
            }
        }
    }

    /// Prepare the journal for `today`: ensure the page, migrate yesterday's
    /// unfinished todos, materialize due routines, pull today's events onto
    /// today's page.
    pub fn prepare_today(&self, today: NaiveDate) -> Result<RolloverSummary, StoreError> {
        let mut summary = RolloverSummary::default();

        // Phase 1: today's page.
        self.ensure_page(today)?;

        // Phase 2: carry yesterday's open todos forward. Done/cancelled
        // tasks and non-todo kinds stay where they are; due_date is never
        // touched. A re-run on the same day finds nothing here because the
        // tasks already sit on today's page.
        if let Some(yesterday) = today.checked_sub_days(Days::new(1)) {
            for task in self.store.open_todos_on(yesterday)? {
                let patch = TaskPatch::migrate_to(today, task.migrated_count);
                self.store.patch_task(&task.id, &patch)?;
                summary.migrated += 1;
            }
        }

        // Phase 3: expand weekly routines into concrete instances. The
        // existence check guards idempotency; it must run after phase 2
        // since both look at journal_date.
        for routine in self.store.routines_with_recurrence()? {
            if !recurrence::matches_on(&routine.recurrence, today) {
                continue;
            }
            if self.store.has_routine_instance(&routine.id, today)? {
                continue;
            }
            let draft = TaskDraft::instance_of(&routine, today);
            self.store.create_task(&draft)?;
            summary.materialized += 1;
        }

        // Phase 4: events starting today surface on today's page no matter
        // when they were scheduled. Already-correct events get no patch call.
        for event in self.store.events_starting_on(today)? {
            if event.journal_day() == Some(today) {
                continue;
            }
            self.store.patch_task(&event.id, &TaskPatch::journal_on(today))?;
            summary.reconciled += 1;
        }

        tracing::info!(
            %today,
            migrated = summary.migrated,
            materialized = summary.materialized,
            reconciled = summary.reconciled,
            "daily rollover complete"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TaskKind, TaskStatus};
    use std::cell::{Cell, RefCell};

    /// In-memory record store with call counters. Mutation methods can be
    /// armed to fail so phase-abort behavior is observable.
    #[derive(Default)]
    struct MemoryStore {
        tasks: RefCell<Vec<Task>>,
        pages: RefCell<Vec<JournalPage>>,
        next_id: Cell<u64>,
        patch_calls: Cell<usize>,
        page_create_calls: Cell<usize>,
        /// Create fails, but the page still appears (another client won).
        page_create_conflict: Cell<bool>,
        /// Create fails and nothing appears (hard storage failure).
        page_create_broken: Cell<bool>,
        patches_broken: Cell<bool>,
    }

    impl MemoryStore {
        fn alloc_id(&self, prefix: &str) -> String {
            let n = self.next_id.get();
            self.next_id.set(n + 1);
            format!("{prefix}{n}")
        }

        fn rejected(what: &str) -> StoreError {
            StoreError::Rejected {
                collection: what.to_string(),
                status: 400,
                body: "simulated failure".to_string(),
            }
        }

        fn insert_task(&self, task: Task) -> Task {
            self.tasks.borrow_mut().push(task.clone());
            task
        }

        fn task(&self, id: &str) -> Task {
            self.tasks
                .borrow()
                .iter()
                .find(|t| t.id == id)
                .cloned()
                .expect("task exists")
        }

        fn children_of(&self, routine_id: &str, date: NaiveDate) -> Vec<Task> {
            self.tasks
                .borrow()
                .iter()
                .filter(|t| t.parent_task == routine_id && t.journal_day() == Some(date))
                .cloned()
                .collect()
        }
    }

    impl DailyStore for MemoryStore {
        fn find_journal_page(&self, date: NaiveDate) -> Result<Option<JournalPage>, StoreError> {
            let key = date.format("%Y-%m-%d").to_string();
            Ok(self
                .pages
                .borrow()
                .iter()
                .find(|p| p.date.starts_with(&key))
                .cloned())
        }

        fn create_journal_page(&self, date: NaiveDate) -> Result<JournalPage, StoreError> {
            self.page_create_calls.set(self.page_create_calls.get() + 1);
            if self.page_create_broken.get() {
                return Err(Self::rejected("journal_pages"));
            }
            let page = JournalPage {
                id: self.alloc_id("p"),
                date: format!("{} 00:00:00.000Z", date.format("%Y-%m-%d")),
                owner: "u1".to_string(),
            };
            if self.page_create_conflict.get() {
                // Unique-index conflict: the competing page is now visible.
                self.pages.borrow_mut().push(page);
                return Err(Self::rejected("journal_pages"));
            }
            self.pages.borrow_mut().push(page.clone());
            Ok(page)
        }

        fn open_todos_on(&self, date: NaiveDate) -> Result<Vec<Task>, StoreError> {
            Ok(self
                .tasks
                .borrow()
                .iter()
                .filter(|t| {
                    t.kind == TaskKind::Todo
                        && t.status == TaskStatus::Open
                        && t.journal_day() == Some(date)
                })
                .cloned()
                .collect())
        }

        fn routines_with_recurrence(&self) -> Result<Vec<Task>, StoreError> {
            Ok(self
                .tasks
                .borrow()
                .iter()
                .filter(|t| t.kind == TaskKind::Routine && t.has_recurrence())
                .cloned()
                .collect())
        }

        fn has_routine_instance(&self, routine_id: &str, date: NaiveDate) -> Result<bool, StoreError> {
            Ok(!self.children_of(routine_id, date).is_empty())
        }

        fn events_starting_on(&self, date: NaiveDate) -> Result<Vec<Task>, StoreError> {
            Ok(self
                .tasks
                .borrow()
                .iter()
                .filter(|t| t.kind == TaskKind::Event && crate::utils::day_of(&t.start_at) == Some(date))
                .cloned()
                .collect())
        }

        fn create_task(&self, draft: &TaskDraft) -> Result<Task, StoreError> {
            let task = Task {
                id: self.alloc_id("t"),
                title: draft.title.clone(),
                status: draft.status,
                kind: draft.kind,
                notes: draft.notes.clone().unwrap_or_default(),
                priority: draft.priority,
                position: draft.position,
                context: draft.context.clone().unwrap_or_default(),
                owner: draft.owner.clone(),
                journal_date: draft.journal_date.clone().unwrap_or_default(),
                scheduled_for: String::new(),
                due_date: draft.due_date.clone().unwrap_or_default(),
                start_at: draft.start_at.clone().unwrap_or_default(),
                end_at: draft.end_at.clone().unwrap_or_default(),
                recurrence: draft.recurrence.clone().unwrap_or_default(),
                migrated_count: 0,
                parent_task: draft.parent_task.clone().unwrap_or_default(),
            };
            Ok(self.insert_task(task))
        }

        fn patch_task(&self, id: &str, patch: &TaskPatch) -> Result<Task, StoreError> {
            self.patch_calls.set(self.patch_calls.get() + 1);
            if self.patches_broken.get() {
                return Err(Self::rejected("tasks"));
            }
            let mut tasks = self.tasks.borrow_mut();
            let task = tasks
                .iter_mut()
                .find(|t| t.id == id)
                .ok_or_else(|| Self::rejected("tasks"))?;
            if let Some(status) = patch.status {
                task.status = status;
            }
            if let Some(ref journal_date) = patch.journal_date {
                task.journal_date = journal_date.clone();
            }
            if let Some(migrated_count) = patch.migrated_count {
                task.migrated_count = migrated_count;
            }
            Ok(task.clone())
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    // 2024-01-01 was a Monday; yesterday is Sunday 2023-12-31.
    fn monday() -> NaiveDate {
        date(2024, 1, 1)
    }

    fn base_task(id: &str, kind: TaskKind) -> Task {
        Task {
            id: id.to_string(),
            title: format!("task {id}"),
            status: TaskStatus::Open,
            kind,
            notes: String::new(),
            priority: 0,
            position: 1.0,
            context: "c1".to_string(),
            owner: "u1".to_string(),
            journal_date: String::new(),
            scheduled_for: String::new(),
            due_date: String::new(),
            start_at: String::new(),
            end_at: String::new(),
            recurrence: String::new(),
            migrated_count: 0,
            parent_task: String::new(),
        }
    }

    fn todo_on(id: &str, day: &str, status: TaskStatus) -> Task {
        let mut t = base_task(id, TaskKind::Todo);
        t.status = status;
        t.journal_date = day.to_string();
        t
    }

    fn routine(id: &str, recurrence: &str) -> Task {
        let mut t = base_task(id, TaskKind::Routine);
        t.recurrence = recurrence.to_string();
        t
    }

    fn event_at(id: &str, start_at: &str, journal_date: &str) -> Task {
        let mut t = base_task(id, TaskKind::Event);
        t.start_at = start_at.to_string();
        t.journal_date = journal_date.to_string();
        t
    }

    #[test]
    fn ensure_page_returns_existing_page_without_creating() {
        let store = MemoryStore::default();
        store.pages.borrow_mut().push(JournalPage {
            id: "p0".to_string(),
            date: "2024-01-01 00:00:00.000Z".to_string(),
            owner: "u1".to_string(),
        });

        let page = Rollover::new(&store).ensure_page(monday()).unwrap();
        assert_eq!(page.id, "p0");
        assert_eq!(store.page_create_calls.get(), 0);
    }

    #[test]
    fn ensure_page_creates_when_missing() {
        let store = MemoryStore::default();
        let page = Rollover::new(&store).ensure_page(monday()).unwrap();
        assert!(page.date.starts_with("2024-01-01"));
        assert_eq!(store.page_create_calls.get(), 1);
    }

    #[test]
    fn ensure_page_recovers_from_a_lost_create_race() {
        let store = MemoryStore::default();
        store.page_create_conflict.set(true);

        let page = Rollover::new(&store).ensure_page(monday()).unwrap();
        assert!(page.date.starts_with("2024-01-01"));
        assert_eq!(store.pages.borrow().len(), 1);
    }

    #[test]
    fn ensure_page_propagates_create_error_when_requery_is_empty() {
        let store = MemoryStore::default();
        store.page_create_broken.set(true);

        let err = Rollover::new(&store).ensure_page(monday()).unwrap_err();
        assert!(matches!(err, StoreError::Rejected { .. }));
    }

    #[test]
    fn migrates_exactly_yesterdays_open_todos() {
        let store = MemoryStore::default();
        store.insert_task(todo_on("a", "2023-12-31", TaskStatus::Open));
        store.insert_task(todo_on("b", "2023-12-31", TaskStatus::Done));
        store.insert_task(todo_on("c", "2023-12-30", TaskStatus::Open));

        let summary = Rollover::new(&store).prepare_today(monday()).unwrap();
        assert_eq!(summary.migrated, 1);

        let a = store.task("a");
        assert_eq!(a.journal_date, "2024-01-01");
        assert_eq!(a.migrated_count, 1);

        // Done yesterday and open-but-older stay put.
        assert_eq!(store.task("b").journal_date, "2023-12-31");
        assert_eq!(store.task("b").migrated_count, 0);
        assert_eq!(store.task("c").journal_date, "2023-12-30");
    }

    #[test]
    fn migration_increments_an_existing_count() {
        let store = MemoryStore::default();
        let mut stale = todo_on("a", "2023-12-31", TaskStatus::Open);
        stale.migrated_count = 4;
        store.insert_task(stale);

        Rollover::new(&store).prepare_today(monday()).unwrap();
        assert_eq!(store.task("a").migrated_count, 5);
    }

    #[test]
    fn materializes_matching_routines_once() {
        let store = MemoryStore::default();
        store.insert_task(routine("r1", "FREQ=WEEKLY;BYDAY=MO,TU,WE,TH,FR"));

        let engine = Rollover::new(&store);
        let first = engine.prepare_today(monday()).unwrap();
        assert_eq!(first.materialized, 1);

        // Re-running the same day must not create a second instance.
        let second = engine.prepare_today(monday()).unwrap();
        assert_eq!(second.materialized, 0);

        let children = store.children_of("r1", monday());
        assert_eq!(children.len(), 1);
        let child = &children[0];
        assert_eq!(child.kind, TaskKind::Todo);
        assert_eq!(child.status, TaskStatus::Open);
        assert_eq!(child.title, "task r1");
        assert_eq!(child.parent_task, "r1");
    }

    #[test]
    fn skips_routines_that_do_not_fire_today() {
        let store = MemoryStore::default();
        store.insert_task(routine("r1", "FREQ=WEEKLY;BYDAY=SA,SU"));
        store.insert_task(routine("r2", "FREQ=MONTHLY"));
        store.insert_task(routine("r3", "garbage;;;"));

        // Monday: none of these fire, and the broken one doesn't error.
        let summary = Rollover::new(&store).prepare_today(monday()).unwrap();
        assert_eq!(summary.materialized, 0);
    }

    #[test]
    fn reconciles_only_events_not_already_on_todays_page() {
        let store = MemoryStore::default();
        store.insert_task(event_at("e1", "2024-01-01 09:00:00.000Z", "2023-12-28"));
        store.insert_task(event_at("e2", "2024-01-01 14:00:00.000Z", "2024-01-01"));
        store.insert_task(event_at("e3", "2024-01-02 09:00:00.000Z", "2023-12-28"));

        let summary = Rollover::new(&store).prepare_today(monday()).unwrap();
        assert_eq!(summary.reconciled, 1);
        assert_eq!(store.task("e1").journal_date, "2024-01-01");
        // e2 was already correct: exactly one patch call total.
        assert_eq!(store.patch_calls.get(), 1);
        // e3 starts tomorrow and is untouched.
        assert_eq!(store.task("e3").journal_date, "2023-12-28");
    }

    #[test]
    fn a_phase_failure_stops_later_phases() {
        let store = MemoryStore::default();
        store.insert_task(todo_on("a", "2023-12-31", TaskStatus::Open));
        store.insert_task(routine("r1", "FREQ=WEEKLY"));
        store.patches_broken.set(true);

        let err = Rollover::new(&store).prepare_today(monday()).unwrap_err();
        assert!(matches!(err, StoreError::Rejected { .. }));

        // Phase 2 failed, so phase 3 never ran: no instance was created,
        // but the page from phase 1 stays (no rollback).
        assert!(store.children_of("r1", monday()).is_empty());
        assert_eq!(store.pages.borrow().len(), 1);
    }

    #[test]
    fn end_to_end_standup_on_a_monday() {
        let store = MemoryStore::default();
        let mut standup = routine("r1", "FREQ=WEEKLY;BYDAY=MO,TU,WE,TH,FR");
        standup.title = "Standup".to_string();
        store.insert_task(standup);

        let engine = Rollover::new(&store);
        engine.prepare_today(monday()).unwrap();

        assert!(store.find_journal_page(monday()).unwrap().is_some());
        let children = store.children_of("r1", monday());
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].title, "Standup");

        engine.prepare_today(monday()).unwrap();
        assert_eq!(store.children_of("r1", monday()).len(), 1);
    }
}
