use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::local_task::LocalTask;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Active,
    CarryOver,
    Accomplished,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::CarryOver => "carry_over",
            Self::Accomplished => "accomplished",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "active" => Some(Self::Active),
            "carry_over" => Some(Self::CarryOver),
            "accomplished" => Some(Self::Accomplished),
            _ => None,
        }
    }

    /// Parse a comma-separated status list such as `active,carry_over`.
    /// Unknown entries are dropped.
    pub fn parse_list(s: &str) -> Vec<Self> {
        s.split(',').filter_map(Self::parse).collect()
    }

    /// Accomplished rows are history and never change status again.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        match (self, next) {
            (a, b) if *a == b => true,
            (Self::Active, Self::CarryOver) => true,
            (Self::Active | Self::CarryOver, Self::Accomplished) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A row in the durable `tasks` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub created_date: NaiveDate,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert payload for the durable store; the store assigns id and timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub created_date: NaiveDate,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
}

impl NewTask {
    pub fn new(title: impl Into<String>, created_date: NaiveDate) -> Self {
        Self {
            title: title.into(),
            description: None,
            status: TaskStatus::Active,
            created_date,
            due_date: None,
        }
    }

    pub fn from_local(task: &LocalTask, status: TaskStatus) -> Self {
        Self {
            title: task.title.clone(),
            description: task.description.clone(),
            status,
            created_date: task.created_date,
            due_date: task.due_date,
        }
    }

    /// Trim the text fields and reject an empty title.
    pub fn normalized(mut self) -> Option<Self> {
        self.title = self.title.trim().to_string();
        if self.title.is_empty() {
            return None;
        }
        self.description = normalize_description(self.description);
        Some(self)
    }
}

/// Partial update applied to durable rows. `None` leaves a field alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
}

impl TaskPatch {
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.due_date.is_none()
    }

    /// Apply to a row, stamping `updated_at`. Returns false when the status
    /// change is not allowed or the title would be blank; the row is left
    /// untouched in that case.
    pub fn apply(&self, task: &mut Task, now: DateTime<Utc>) -> bool {
        if self.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return false;
        }
        if let Some(status) = self.status {
            if !task.status.can_transition_to(status) {
                return false;
            }
            task.status = status;
        }
        if let Some(ref title) = self.title {
            task.title = title.trim().to_string();
        }
        if let Some(ref description) = self.description {
            task.description = normalize_description(Some(description.clone()));
        }
        if let Some(due) = self.due_date {
            task.due_date = Some(due);
        }
        task.updated_at = now;
        true
    }
}

pub(crate) fn normalize_description(description: Option<String>) -> Option<String> {
    description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
}
