use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use reqwest::header::{CONTENT_TYPE, HeaderValue};
use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;

use super::{StoreError, TaskFilter, TaskStore};
use crate::core::task::{NewTask, Task, TaskPatch};

/// Primary key of the single `app_state` row.
pub const APP_STATE_ROW_ID: &str = "00000000-0000-0000-0000-000000000001";

const TASKS_TABLE: &str = "tasks";
const APP_STATE_TABLE: &str = "app_state";

/// Durable store backed by a PostgREST endpoint (Supabase or plain PostgREST).
#[derive(Clone)]
pub struct RestStore {
    base_url: String,
    api_key: String,
    http: Client,
}

#[derive(Debug, Deserialize)]
struct AppStateRow {
    last_viewed_date: NaiveDate,
}

#[derive(Debug, Serialize)]
struct AppStateUpsert<'a> {
    id: &'a str,
    last_viewed_date: NaiveDate,
    updated_at: chrono::DateTime<Utc>,
}

impl RestStore {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, StoreError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Request(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn request(&self, method: Method, url: &str) -> reqwest::RequestBuilder {
        let builder = self.http.request(method, url).header("apikey", &self.api_key);
        if self.api_key.is_empty() {
            builder
        } else {
            builder.bearer_auth(&self.api_key)
        }
    }

    /// Send and decode a JSON array body, mapping non-2xx to `StoreError::Api`.
    async fn send<T: DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
        what: &str,
    ) -> Result<T, StoreError> {
        let resp = builder
            .send()
            .await
            .map_err(|e| StoreError::Request(format!("{} request failed: {}", what, e)))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| StoreError::Request(format!("Failed to read {} response: {}", what, e)))?;

        if !status.is_success() {
            log::error!("{} failed with status {}: {}", what, status, text);
            return Err(StoreError::from_response(status.as_u16(), &text));
        }

        serde_json::from_str(&text)
            .map_err(|e| StoreError::Decode(format!("{} response: {}", what, e)))
    }
}

/// PostgREST query parameters for a filter.
pub(crate) fn filter_params(filter: &TaskFilter) -> Vec<(&'static str, String)> {
    let mut params = Vec::new();
    if let Some(ref id) = filter.id {
        params.push(("id", format!("eq.{}", id)));
    }
    if let Some(date) = filter.created_date {
        params.push(("created_date", format!("eq.{}", date)));
    }
    if !filter.statuses.is_empty() {
        let list: Vec<&str> = filter.statuses.iter().map(|s| s.as_str()).collect();
        params.push(("status", format!("in.({})", list.join(","))));
    }
    params
}

fn return_representation() -> HeaderValue {
    HeaderValue::from_static("return=representation")
}

#[async_trait]
impl TaskStore for RestStore {
    async fn insert(&self, rows: &[NewTask]) -> Result<Vec<Task>, StoreError> {
        if rows.is_empty() {
            return Err(StoreError::Rejected("tasks array is required".into()));
        }
        let rows = rows
            .iter()
            .cloned()
            .map(NewTask::normalized)
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| StoreError::Rejected("title must not be empty".into()))?;

        let builder = self
            .request(Method::POST, &self.table_url(TASKS_TABLE))
            .header(CONTENT_TYPE, "application/json")
            .header("Prefer", return_representation())
            .json(&rows);
        let inserted: Vec<Task> = self.send(builder, "Insert").await?;
        log::debug!("Inserted {} task row(s)", inserted.len());
        Ok(inserted)
    }

    async fn select(&self, filter: &TaskFilter) -> Result<Vec<Task>, StoreError> {
        let mut params = filter_params(filter);
        params.push(("select", "*".to_string()));
        params.push(("order", "created_at.desc".to_string()));

        let builder = self
            .request(Method::GET, &self.table_url(TASKS_TABLE))
            .query(&params);
        self.send(builder, "Select").await
    }

    async fn update(&self, filter: &TaskFilter, patch: &TaskPatch) -> Result<Vec<Task>, StoreError> {
        if filter.is_unbounded() {
            return Err(StoreError::Rejected("refusing to update every row".into()));
        }
        if patch.is_empty() {
            return Err(StoreError::Rejected("nothing to update".into()));
        }
        if patch.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(StoreError::Rejected("title must not be empty".into()));
        }

        // Status transitions are checked against the current rows; PostgREST
        // itself has no notion of them.
        if let Some(next) = patch.status {
            let current = self.select(filter).await?;
            if let Some(row) = current.iter().find(|t| !t.status.can_transition_to(next)) {
                return Err(StoreError::Rejected(format!(
                    "cannot change status of {} from {} to {}",
                    row.id, row.status, next
                )));
            }
        }

        let mut body = serde_json::to_value(patch)
            .map_err(|e| StoreError::Decode(format!("patch: {}", e)))?;
        if let serde_json::Value::Object(ref mut map) = body {
            map.insert("updated_at".into(), serde_json::json!(Utc::now()));
        }

        let builder = self
            .request(Method::PATCH, &self.table_url(TASKS_TABLE))
            .query(&filter_params(filter))
            .header(CONTENT_TYPE, "application/json")
            .header("Prefer", return_representation())
            .json(&body);
        self.send(builder, "Update").await
    }

    async fn delete(&self, filter: &TaskFilter) -> Result<usize, StoreError> {
        if filter.is_unbounded() {
            return Err(StoreError::Rejected("refusing to delete every row".into()));
        }
        let builder = self
            .request(Method::DELETE, &self.table_url(TASKS_TABLE))
            .query(&filter_params(filter))
            .header("Prefer", return_representation());
        let deleted: Vec<serde_json::Value> = self.send(builder, "Delete").await?;
        Ok(deleted.len())
    }

    async fn last_viewed_date(&self) -> Result<Option<NaiveDate>, StoreError> {
        let builder = self
            .request(Method::GET, &self.table_url(APP_STATE_TABLE))
            .query(&[
                ("id", format!("eq.{}", APP_STATE_ROW_ID)),
                ("select", "last_viewed_date".to_string()),
            ]);
        // A malformed stored date counts as absent.
        let rows: Vec<serde_json::Value> = self.send(builder, "App state").await?;
        Ok(rows
            .into_iter()
            .next()
            .and_then(|row| serde_json::from_value::<AppStateRow>(row).ok())
            .map(|row| row.last_viewed_date))
    }

    async fn set_last_viewed_date(&self, date: NaiveDate) -> Result<(), StoreError> {
        let row = AppStateUpsert {
            id: APP_STATE_ROW_ID,
            last_viewed_date: date,
            updated_at: Utc::now(),
        };
        let builder = self
            .request(Method::POST, &self.table_url(APP_STATE_TABLE))
            .query(&[("on_conflict", "id")])
            .header(CONTENT_TYPE, "application/json")
            .header(
                "Prefer",
                "resolution=merge-duplicates,return=representation",
            )
            .json(&[row]);
        let _: Vec<serde_json::Value> = self.send(builder, "App state upsert").await?;
        Ok(())
    }
}
