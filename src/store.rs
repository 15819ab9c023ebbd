use std::time::Duration;

use chrono::{Days, NaiveDate};
use reqwest::blocking::{Client as HttpClient, Response};
use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::models::{Context, JournalPage, StatusFilter, Task, TaskDraft, TaskPatch};
use crate::rollover::DailyStore;

/// Task listings come back in stable board order: position first, then
/// priority (descending), then creation time.
const TASK_SORT: &str = "position,-priority,created";

const PER_PAGE_TASKS: u32 = 500;
const PER_PAGE_CONTEXTS: u32 = 200;
const PER_PAGE_ONE: u32 = 1;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Login failed: {status} {body}")]
    AuthRejected { status: u16, body: String },
    #[error("Login response missing token or user id")]
    AuthIncomplete,
    #[error("Not authenticated")]
    NotAuthenticated,
    #[error("Record store rejected {collection} request: {status} {body}")]
    Rejected {
        collection: String,
        status: u16,
        body: String,
    },
}

#[derive(Debug, Clone)]
struct Auth {
    token: String,
    user_id: String,
}

/// Paged list envelope returned by the record store; only the items are
/// interesting, paging metadata is ignored.
#[derive(Debug, Deserialize)]
struct RecordPage<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Debug, Serialize)]
struct ContextDraft<'a> {
    name: &'a str,
    owner: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    color: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct PageDraft<'a> {
    date: &'a str,
    owner: &'a str,
}

/// HTTP gateway to the record store. One instance per login session; the
/// base URL, timeout and bearer token live here, not in globals. All task
/// and context queries are scoped to the authenticated user by an owner
/// clause composed into the filter expression.
pub struct Store {
    base_url: String,
    http: HttpClient,
    auth: Option<Auth>,
}

impl Store {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, StoreError> {
        let http = HttpClient::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
            auth: None,
        })
    }

    /// Exchange credentials for a bearer token and the owning-user id.
    /// A non-2xx response or a response missing either field is fatal.
    pub fn login(&mut self, identity: &str, password: &str) -> Result<(), StoreError> {
        let url = format!("{}/api/collections/users/auth-with-password", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "identity": identity, "password": password }))
            .send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::AuthRejected {
                status: status.as_u16(),
                body: response.text().unwrap_or_default(),
            });
        }

        let body: serde_json::Value = response.json()?;
        let token = body["token"].as_str().unwrap_or_default();
        let user_id = body["record"]["id"].as_str().unwrap_or_default();
        if token.is_empty() || user_id.is_empty() {
            return Err(StoreError::AuthIncomplete);
        }
        self.auth = Some(Auth {
            token: token.to_string(),
            user_id: user_id.to_string(),
        });
        Ok(())
    }

    /// Id of the authenticated user.
    pub fn owner_id(&self) -> Result<&str, StoreError> {
        self.auth
            .as_ref()
            .map(|a| a.user_id.as_str())
            .ok_or(StoreError::NotAuthenticated)
    }

    fn auth(&self) -> Result<&Auth, StoreError> {
        self.auth.as_ref().ok_or(StoreError::NotAuthenticated)
    }

    fn check(collection: &str, response: Response) -> Result<Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        Err(StoreError::Rejected {
            collection: collection.to_string(),
            status: status.as_u16(),
            body: response.text().unwrap_or_default(),
        })
    }

    // ---------- generic collection operations ----------

    fn list_records<T: DeserializeOwned>(
        &self,
        collection: &str,
        filter: &str,
        sort: &str,
        per_page: u32,
    ) -> Result<Vec<T>, StoreError> {
        let auth = self.auth()?;
        let url = format!("{}/api/collections/{collection}/records", self.base_url);
        let per_page = per_page.to_string();
        let mut query: Vec<(&str, &str)> = vec![("filter", filter), ("perPage", &per_page)];
        if !sort.is_empty() {
            query.push(("sort", sort));
        }
        let response = self
            .http
            .get(&url)
            .bearer_auth(&auth.token)
            .query(&query)
            .send()?;
        let page: RecordPage<T> = Self::check(collection, response)?.json()?;
        Ok(page.items)
    }

    fn create_record<T: DeserializeOwned>(
        &self,
        collection: &str,
        body: &impl Serialize,
    ) -> Result<T, StoreError> {
        let auth = self.auth()?;
        let url = format!("{}/api/collections/{collection}/records", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&auth.token)
            .json(body)
            .send()?;
        Ok(Self::check(collection, response)?.json()?)
    }

    fn patch_record<T: DeserializeOwned>(
        &self,
        collection: &str,
        id: &str,
        body: &impl Serialize,
    ) -> Result<T, StoreError> {
        let auth = self.auth()?;
        let url = format!("{}/api/collections/{collection}/records/{id}", self.base_url);
        let response = self
            .http
            .patch(&url)
            .bearer_auth(&auth.token)
            .json(body)
            .send()?;
        Ok(Self::check(collection, response)?.json()?)
    }

    // ---------- contexts ----------

    pub fn list_contexts(&self) -> Result<Vec<Context>, StoreError> {
        let filter = owner_clause(self.owner_id()?);
        self.list_records("contexts", &filter, "name", PER_PAGE_CONTEXTS)
    }

    /// Return the context named `name` for this user, creating it first if
    /// it does not exist yet. Matching is by exact name.
    pub fn ensure_context(&self, name: &str, color: Option<&str>) -> Result<Context, StoreError> {
        let owner = self.owner_id()?;
        let filter = format!("name = {} && {}", literal(name), owner_clause(owner));
        let existing: Vec<Context> = self.list_records("contexts", &filter, "", PER_PAGE_ONE)?;
        if let Some(context) = existing.into_iter().next() {
            return Ok(context);
        }
        self.create_record("contexts", &ContextDraft { name, owner, color })
    }

    // ---------- tasks ----------

    pub fn list_tasks(
        &self,
        context_id: Option<&str>,
        status: StatusFilter,
    ) -> Result<Vec<Task>, StoreError> {
        let filter = tasks_filter(self.owner_id()?, context_id, status);
        self.list_records("tasks", &filter, TASK_SORT, PER_PAGE_TASKS)
    }

    pub fn create_task(&self, draft: &TaskDraft) -> Result<Task, StoreError> {
        self.create_record("tasks", draft)
    }

    pub fn patch_task(&self, id: &str, patch: &TaskPatch) -> Result<Task, StoreError> {
        self.patch_record("tasks", id, patch)
    }
}

impl DailyStore for Store {
    fn find_journal_page(&self, date: NaiveDate) -> Result<Option<JournalPage>, StoreError> {
        let filter = format!(
            "{} && {}",
            owner_clause(self.owner_id()?),
            day_range_clause("date", date)
        );
        let pages: Vec<JournalPage> =
            self.list_records("journal_pages", &filter, "", PER_PAGE_ONE)?;
        Ok(pages.into_iter().next())
    }

    fn create_journal_page(&self, date: NaiveDate) -> Result<JournalPage, StoreError> {
        let owner = self.owner_id()?;
        let (start, _) = day_window(date);
        self.create_record("journal_pages", &PageDraft { date: &start, owner })
    }

    fn open_todos_on(&self, date: NaiveDate) -> Result<Vec<Task>, StoreError> {
        let filter = format!(
            "{} && status = \"open\" && kind = \"todo\" && {}",
            owner_clause(self.owner_id()?),
            day_range_clause("journal_date", date)
        );
        self.list_records("tasks", &filter, "", PER_PAGE_TASKS)
    }

    fn routines_with_recurrence(&self) -> Result<Vec<Task>, StoreError> {
        let filter = format!(
            "{} && kind = \"routine\" && recurrence != \"\"",
            owner_clause(self.owner_id()?)
        );
        self.list_records("tasks", &filter, "", PER_PAGE_TASKS)
    }

    fn has_routine_instance(&self, routine_id: &str, date: NaiveDate) -> Result<bool, StoreError> {
        let filter = format!(
            "{} && parent_task = {} && {}",
            owner_clause(self.owner_id()?),
            literal(routine_id),
            day_range_clause("journal_date", date)
        );
        let instances: Vec<Task> = self.list_records("tasks", &filter, "", PER_PAGE_ONE)?;
        Ok(!instances.is_empty())
    }

    fn events_starting_on(&self, date: NaiveDate) -> Result<Vec<Task>, StoreError> {
        let filter = format!(
            "{} && kind = \"event\" && {}",
            owner_clause(self.owner_id()?),
            event_day_clause(date)
        );
        self.list_records("tasks", &filter, "", PER_PAGE_TASKS)
    }

    fn create_task(&self, draft: &TaskDraft) -> Result<Task, StoreError> {
        Store::create_task(self, draft)
    }

    fn patch_task(&self, id: &str, patch: &TaskPatch) -> Result<Task, StoreError> {
        Store::patch_task(self, id, patch)
    }
}

// ---------- filter expression builders ----------

/// Quote a value as a filter literal, escaping backslashes and quotes.
fn literal(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

fn owner_clause(owner: &str) -> String {
    format!("owner = {}", literal(owner))
}

/// UTC bounds of a calendar day as store timestamp literals:
/// `[date 00:00:00Z, date+1 00:00:00Z)`.
fn day_window(date: NaiveDate) -> (String, String) {
    let next = date.checked_add_days(Days::new(1)).unwrap_or(date);
    (
        format!("{} 00:00:00Z", date.format("%Y-%m-%d")),
        format!("{} 00:00:00Z", next.format("%Y-%m-%d")),
    )
}

/// Half-open day window on a date field. Matches both bare dates and
/// timestamps stored inside the day, unlike an exact string comparison.
fn day_range_clause(field: &str, date: NaiveDate) -> String {
    let (start, end) = day_window(date);
    format!("{field} >= \"{start}\" && {field} < \"{end}\"")
}

/// Window for events starting on `date`.
fn event_day_clause(date: NaiveDate) -> String {
    let day = date.format("%Y-%m-%d");
    format!("start_at >= \"{day} 00:00:00Z\" && start_at < \"{day} 23:59:59Z\"")
}

fn status_clause(status: StatusFilter) -> String {
    match status {
        StatusFilter::Only(status) => format!("status = \"{}\"", status.as_str()),
        // "all" is the union of the statuses a board shows; archived tasks
        // are only listed when asked for by name. Parenthesized so the
        // disjunction cannot swallow the surrounding conjunction.
        StatusFilter::All => {
            "(status = \"open\" || status = \"done\" || status = \"cancelled\")".to_string()
        }
    }
}

fn tasks_filter(owner: &str, context_id: Option<&str>, status: StatusFilter) -> String {
    let mut filter = owner_clause(owner);
    if let Some(context_id) = context_id {
        filter.push_str(&format!(" && context = {}", literal(context_id)));
    }
    filter.push_str(&format!(" && {}", status_clause(status)));
    filter
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TaskStatus;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn day_window_is_half_open_across_midnight() {
        let (start, end) = day_window(date(2024, 1, 31));
        assert_eq!(start, "2024-01-31 00:00:00Z");
        assert_eq!(end, "2024-02-01 00:00:00Z");
    }

    #[test]
    fn day_range_clause_uses_both_bounds() {
        assert_eq!(
            day_range_clause("journal_date", date(2024, 3, 5)),
            "journal_date >= \"2024-03-05 00:00:00Z\" && journal_date < \"2024-03-06 00:00:00Z\""
        );
    }

    #[test]
    fn event_clause_covers_the_day() {
        assert_eq!(
            event_day_clause(date(2024, 3, 5)),
            "start_at >= \"2024-03-05 00:00:00Z\" && start_at < \"2024-03-05 23:59:59Z\""
        );
    }

    #[test]
    fn status_all_is_a_parenthesized_union_without_archived() {
        let clause = status_clause(StatusFilter::All);
        assert!(clause.starts_with('(') && clause.ends_with(')'));
        assert!(clause.contains("\"open\""));
        assert!(clause.contains("\"done\""));
        assert!(clause.contains("\"cancelled\""));
        assert!(!clause.contains("archived"));
    }

    #[test]
    fn tasks_filter_composes_owner_context_and_status() {
        assert_eq!(
            tasks_filter("u1", Some("c1"), StatusFilter::Only(TaskStatus::Open)),
            "owner = \"u1\" && context = \"c1\" && status = \"open\""
        );
        assert_eq!(
            tasks_filter("u1", None, StatusFilter::All),
            "owner = \"u1\" && (status = \"open\" || status = \"done\" || status = \"cancelled\")"
        );
    }

    #[test]
    fn literals_escape_quotes_and_backslashes() {
        assert_eq!(literal("plain"), "\"plain\"");
        assert_eq!(literal("a\"b"), "\"a\\\"b\"");
        assert_eq!(literal("a\\b"), "\"a\\\\b\"");
    }

    #[test]
    fn store_refuses_requests_before_login() {
        let store = Store::new("http://localhost:8090", Duration::from_secs(1)).unwrap();
        assert!(matches!(
            store.list_contexts(),
            Err(StoreError::NotAuthenticated)
        ));
        assert!(matches!(store.owner_id(), Err(StoreError::NotAuthenticated)));
    }
}
