pub mod carry_over;
pub mod completion;
pub mod memory;
pub mod ollama;
pub mod rest;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use thiserror::Error;

use crate::core::task::{NewTask, Task, TaskPatch, TaskStatus};

pub use memory::MemoryStore;
pub use rest::RestStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("{message} (status {status})")]
    Api {
        status: u16,
        message: String,
        details: Option<String>,
        hint: Option<String>,
        code: Option<String>,
    },

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("{0}")]
    Rejected(String),
}

impl StoreError {
    /// Build from a PostgREST error body, falling back to the raw text.
    pub fn from_response(status: u16, body: &str) -> Self {
        #[derive(Deserialize)]
        struct Body {
            message: Option<String>,
            details: Option<String>,
            hint: Option<String>,
            code: Option<String>,
        }

        match serde_json::from_str::<Body>(body) {
            Ok(b) => Self::Api {
                status,
                message: b.message.unwrap_or_else(|| format!("HTTP {}", status)),
                details: b.details,
                hint: b.hint,
                code: b.code,
            },
            Err(_) => Self::Api {
                status,
                message: if body.trim().is_empty() {
                    format!("HTTP {}", status)
                } else {
                    body.trim().to_string()
                },
                details: None,
                hint: None,
                code: None,
            },
        }
    }
}

/// Row filter for select, update, and delete. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub id: Option<String>,
    pub created_date: Option<NaiveDate>,
    pub statuses: Vec<TaskStatus>,
}

impl TaskFilter {
    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.statuses.push(status);
        self
    }

    pub fn on_date(mut self, date: NaiveDate) -> Self {
        self.created_date = Some(date);
        self
    }

    pub fn is_unbounded(&self) -> bool {
        self.id.is_none() && self.created_date.is_none() && self.statuses.is_empty()
    }

    pub fn matches(&self, task: &Task) -> bool {
        self.id.as_ref().is_none_or(|id| *id == task.id)
            && self.created_date.is_none_or(|d| d == task.created_date)
            && (self.statuses.is_empty() || self.statuses.contains(&task.status))
    }
}

/// The durable task history plus the `app_state` row.
///
/// A batch insert either lands completely or fails; callers rely on that to
/// leave local state untouched on error.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn insert(&self, rows: &[NewTask]) -> Result<Vec<Task>, StoreError>;

    /// Matching rows, newest `created_at` first.
    async fn select(&self, filter: &TaskFilter) -> Result<Vec<Task>, StoreError>;

    async fn update(&self, filter: &TaskFilter, patch: &TaskPatch) -> Result<Vec<Task>, StoreError>;

    async fn delete(&self, filter: &TaskFilter) -> Result<usize, StoreError>;

    async fn last_viewed_date(&self) -> Result<Option<NaiveDate>, StoreError>;

    async fn set_last_viewed_date(&self, date: NaiveDate) -> Result<(), StoreError>;
}
