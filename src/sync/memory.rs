use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use uuid::Uuid;

use super::{StoreError, TaskFilter, TaskStore};
use crate::core::task::{NewTask, Task, TaskPatch};

#[derive(Debug, Default)]
struct Tables {
    tasks: Vec<Task>,
    last_viewed_date: Option<NaiveDate>,
}

/// In-process durable store. Used for offline runs and tests; `set_failing`
/// makes every call return an error without touching the tables.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    failing: AtomicBool,
    inserts: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    /// Number of successful insert calls (not rows).
    pub fn insert_calls(&self) -> usize {
        self.inserts.load(Ordering::Relaxed)
    }

    pub fn rows(&self) -> Vec<Task> {
        self.tables().tasks.clone()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::Relaxed) {
            return Err(StoreError::Request("store unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn insert(&self, rows: &[NewTask]) -> Result<Vec<Task>, StoreError> {
        self.check()?;
        let mut normalized = Vec::with_capacity(rows.len());
        for row in rows {
            let row = row
                .clone()
                .normalized()
                .ok_or_else(|| StoreError::Rejected("title must not be empty".into()))?;
            normalized.push(row);
        }

        let now = Utc::now();
        let inserted: Vec<Task> = normalized
            .into_iter()
            .map(|row| Task {
                id: Uuid::new_v4().to_string(),
                title: row.title,
                description: row.description,
                status: row.status,
                created_date: row.created_date,
                due_date: row.due_date,
                created_at: now,
                updated_at: now,
            })
            .collect();

        self.tables().tasks.extend(inserted.iter().cloned());
        self.inserts.fetch_add(1, Ordering::Relaxed);
        Ok(inserted)
    }

    async fn select(&self, filter: &TaskFilter) -> Result<Vec<Task>, StoreError> {
        self.check()?;
        let tables = self.tables();
        // Rows inserted later come first, matching `order=created_at.desc`.
        Ok(tables
            .tasks
            .iter()
            .rev()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect())
    }

    async fn update(&self, filter: &TaskFilter, patch: &TaskPatch) -> Result<Vec<Task>, StoreError> {
        self.check()?;
        let now = Utc::now();
        let mut tables = self.tables();

        let mut staged: Vec<(usize, Task)> = Vec::new();
        for (i, task) in tables.tasks.iter().enumerate().filter(|(_, t)| filter.matches(t)) {
            let mut updated = task.clone();
            if !patch.apply(&mut updated, now) {
                return Err(StoreError::Rejected(format!(
                    "update rejected for {} (status {})",
                    task.id, task.status
                )));
            }
            staged.push((i, updated));
        }

        for (i, updated) in &staged {
            tables.tasks[*i] = updated.clone();
        }
        Ok(staged.into_iter().map(|(_, t)| t).collect())
    }

    async fn delete(&self, filter: &TaskFilter) -> Result<usize, StoreError> {
        self.check()?;
        let mut tables = self.tables();
        let before = tables.tasks.len();
        tables.tasks.retain(|t| !filter.matches(t));
        Ok(before - tables.tasks.len())
    }

    async fn last_viewed_date(&self) -> Result<Option<NaiveDate>, StoreError> {
        self.check()?;
        Ok(self.tables().last_viewed_date)
    }

    async fn set_last_viewed_date(&self, date: NaiveDate) -> Result<(), StoreError> {
        self.check()?;
        self.tables().last_viewed_date = Some(date);
        Ok(())
    }
}
