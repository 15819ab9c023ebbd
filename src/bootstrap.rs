//! Admin-API bootstrap for the backend collections.
//!
//! Creates or updates the `contexts`, `journal_pages` and `tasks`
//! collections with their field constraints, unique indexes and
//! owner-scoped API rules. Safe to run repeatedly: existing collections
//! are patched in place. The `tasks` collection is upserted twice because
//! the `parent_task` self-relation needs the collection's own id, which
//! only exists after the first pass.

use std::time::Duration;

use reqwest::blocking::{Client as HttpClient, Response};
use serde_json::{Value, json};
use thiserror::Error;

const OWNER_RULE: &str = "owner = @request.auth.id";
const AUTHED_RULE: &str = "@request.auth.id != ''";
const USERS_COLLECTION: &str = "_pb_users_auth_";

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Admin login response missing token")]
    MissingToken,
    #[error("Not logged in as admin")]
    NotLoggedIn,
    #[error("Bootstrap step {step} failed: {status} {body}")]
    Rejected {
        step: String,
        status: u16,
        body: String,
    },
}

pub struct Bootstrap {
    base_url: String,
    http: HttpClient,
    token: Option<String>,
}

impl Bootstrap {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, BootstrapError> {
        let http = HttpClient::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
            token: None,
        })
    }

    pub fn admin_login(&mut self, email: &str, password: &str) -> Result<(), BootstrapError> {
        let url = format!("{}/api/admins/auth-with-password", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&json!({ "identity": email, "password": password }))
            .send()?;
        let body: Value = Self::check("admin login", response)?.json()?;
        let token = body["token"].as_str().unwrap_or_default();
        if token.is_empty() {
            return Err(BootstrapError::MissingToken);
        }
        self.token = Some(token.to_string());
        Ok(())
    }

    /// Upsert all three collections. Returns the names in creation order.
    pub fn run(&self) -> Result<Vec<String>, BootstrapError> {
        let contexts = self.upsert(contexts_spec())?;
        let contexts_id = record_id(&contexts);
        tracing::info!(id = contexts_id, "contexts collection ready");

        let pages = self.upsert(journal_pages_spec())?;
        tracing::info!(id = record_id(&pages), "journal_pages collection ready");

        // Phase 1: tasks without the self-relation.
        let tasks = self.upsert(tasks_spec(contexts_id, None))?;
        let tasks_id = record_id(&tasks).to_string();
        // Phase 2: add parent_task now that the collection id is known.
        self.upsert(tasks_spec(contexts_id, Some(&tasks_id)))?;
        tracing::info!(id = tasks_id, "tasks collection ready");

        Ok(vec![
            "contexts".to_string(),
            "journal_pages".to_string(),
            "tasks".to_string(),
        ])
    }

    fn upsert(&self, spec: Value) -> Result<Value, BootstrapError> {
        let name = spec["name"].as_str().unwrap_or_default().to_string();
        match self.get_collection(&name)? {
            None => self.create_collection(&spec),
            Some(existing) => {
                let id = record_id(&existing).to_string();
                let mut patched = spec;
                // Keep the server's id and name stable across updates.
                patched["id"] = Value::String(id.clone());
                patched["name"] = existing["name"].clone();
                self.update_collection(&id, &patched)
            }
        }
    }

    fn get_collection(&self, name: &str) -> Result<Option<Value>, BootstrapError> {
        let url = format!("{}/api/collections/{name}", self.base_url);
        let response = self
            .http
            .get(&url)
            .bearer_auth(self.token()?)
            .send()?;
        if response.status().as_u16() == 404 {
            return Ok(None);
        }
        Ok(Some(Self::check(&format!("get {name}"), response)?.json()?))
    }

    fn create_collection(&self, spec: &Value) -> Result<Value, BootstrapError> {
        let url = format!("{}/api/collections", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(self.token()?)
            .json(spec)
            .send()?;
        let step = format!("create {}", spec["name"].as_str().unwrap_or_default());
        Ok(Self::check(&step, response)?.json()?)
    }

    fn update_collection(&self, id: &str, spec: &Value) -> Result<Value, BootstrapError> {
        let url = format!("{}/api/collections/{id}", self.base_url);
        let response = self
            .http
            .patch(&url)
            .bearer_auth(self.token()?)
            .json(spec)
            .send()?;
        let step = format!("update {}", spec["name"].as_str().unwrap_or_default());
        Ok(Self::check(&step, response)?.json()?)
    }

    fn token(&self) -> Result<&str, BootstrapError> {
        self.token.as_deref().ok_or(BootstrapError::NotLoggedIn)
    }

    fn check(step: &str, response: Response) -> Result<Response, BootstrapError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        Err(BootstrapError::Rejected {
            step: step.to_string(),
            status: status.as_u16(),
            body: response.text().unwrap_or_default(),
        })
    }
}

fn record_id(value: &Value) -> &str {
    value["id"].as_str().unwrap_or_default()
}

fn owner_field() -> Value {
    json!({
        "name": "owner", "type": "relation", "required": true,
        "options": { "collectionId": USERS_COLLECTION, "cascadeDelete": true, "maxSelect": 1 }
    })
}

fn rules(spec: &mut Value) {
    spec["listRule"] = json!(OWNER_RULE);
    spec["viewRule"] = json!(OWNER_RULE);
    spec["createRule"] = json!(AUTHED_RULE);
    spec["updateRule"] = json!(OWNER_RULE);
    spec["deleteRule"] = json!(OWNER_RULE);
}

pub fn contexts_spec() -> Value {
    let mut spec = json!({
        "name": "contexts",
        "type": "base",
        "schema": [
            { "name": "name", "type": "text", "required": true, "options": { "min": 1, "max": 120 } },
            { "name": "color", "type": "text", "required": false, "options": { "pattern": "^#?[0-9A-Fa-f]{3,8}$" } },
            owner_field()
        ],
        "indexes": [
            "CREATE UNIQUE INDEX idx_contexts_owner_name ON contexts (owner, name)"
        ]
    });
    rules(&mut spec);
    spec
}

pub fn journal_pages_spec() -> Value {
    let mut spec = json!({
        "name": "journal_pages",
        "type": "base",
        "schema": [
            { "name": "date", "type": "date", "required": true, "options": {} },
            owner_field()
        ],
        "indexes": [
            "CREATE UNIQUE INDEX idx_jp_owner_date ON journal_pages (owner, date)"
        ]
    });
    rules(&mut spec);
    spec
}

pub fn tasks_spec(contexts_id: &str, tasks_id: Option<&str>) -> Value {
    let mut schema = vec![
        json!({ "name": "title", "type": "text", "required": true, "options": { "min": 1, "max": 200 } }),
        json!({ "name": "notes", "type": "text", "required": false, "options": { "max": 5000 } }),
        json!({ "name": "status", "type": "select", "required": true,
                "options": { "maxSelect": 1, "values": ["open", "done", "cancelled", "archived"] } }),
        json!({ "name": "kind", "type": "select", "required": true,
                "options": { "maxSelect": 1, "values": ["todo", "event", "routine"] } }),
        json!({ "name": "priority", "type": "number", "required": false, "options": { "min": -5, "max": 5 } }),
        json!({ "name": "position", "type": "number", "required": false, "options": {} }),
        json!({ "name": "context", "type": "relation", "required": true,
                "options": { "collectionId": contexts_id, "cascadeDelete": false, "maxSelect": 1 } }),
        owner_field(),
        json!({ "name": "journal_date", "type": "date", "required": false, "options": {} }),
        json!({ "name": "scheduled_for", "type": "date", "required": false, "options": {} }),
        json!({ "name": "due_date", "type": "date", "required": false, "options": {} }),
        json!({ "name": "start_at", "type": "date", "required": false, "options": {} }),
        json!({ "name": "end_at", "type": "date", "required": false, "options": {} }),
        json!({ "name": "recurrence", "type": "text", "required": false, "options": { "max": 300 } }),
        json!({ "name": "migrated_count", "type": "number", "required": false, "options": { "min": 0, "max": 10000 } }),
    ];
    if let Some(tasks_id) = tasks_id {
        schema.push(json!({
            "name": "parent_task", "type": "relation", "required": false,
            "options": { "collectionId": tasks_id, "cascadeDelete": false, "maxSelect": 1 }
        }));
    }
    let mut spec = json!({
        "name": "tasks",
        "type": "base",
        "schema": schema,
        "indexes": [
            "CREATE INDEX idx_tasks_owner_ctx_date ON tasks (owner, context, journal_date)",
            "CREATE INDEX idx_tasks_owner_status_due ON tasks (owner, status, due_date)",
            "CREATE INDEX idx_tasks_owner_recurrence ON tasks (owner, recurrence)"
        ]
    });
    rules(&mut spec);
    spec
}
