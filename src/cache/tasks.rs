use std::collections::HashSet;
use std::sync::Arc;

use chrono::NaiveDate;
use uuid::Uuid;

use super::{CacheError, LocalCache};
use crate::core::app_state::AppState;
use crate::core::local_task::{LocalTask, LocalTaskEdit, Suggestion};

pub const ACTIVE_TASKS_KEY: &str = "active_tasks";
pub const APP_STATE_KEY: &str = "app_state";

/// How many times a read-modify-write is retried when another writer got in
/// between the read and the compare-and-set.
const MAX_CAS_ATTEMPTS: usize = 8;

/// Typed view over the local cache: the list of open tasks and the
/// last-viewed-date marker.
#[derive(Clone)]
pub struct TaskCache {
    cache: Arc<dyn LocalCache>,
}

impl TaskCache {
    pub fn new(cache: Arc<dyn LocalCache>) -> Self {
        Self { cache }
    }

    /// All open tasks. Unreadable or malformed storage reads as empty.
    pub fn active_tasks(&self) -> Vec<LocalTask> {
        match self.cache.get(ACTIVE_TASKS_KEY) {
            Ok(Some(raw)) => decode_tasks(&raw).unwrap_or_else(|e| {
                log::error!("Malformed {} in local cache: {}", ACTIVE_TASKS_KEY, e);
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(e) => {
                log::error!("Error reading {} from local cache: {}", ACTIVE_TASKS_KEY, e);
                Vec::new()
            }
        }
    }

    pub fn task(&self, id: &str) -> Option<LocalTask> {
        self.active_tasks().into_iter().find(|t| t.id == id)
    }

    /// The cached marker. Absent, unreadable, or malformed all mean `None`,
    /// which the carry-over checker treats as a first run.
    pub fn app_state(&self) -> Option<AppState> {
        let raw = match self.cache.get(APP_STATE_KEY) {
            Ok(raw) => raw?,
            Err(e) => {
                log::error!("Error reading app state from local cache: {}", e);
                return None;
            }
        };
        match serde_json::from_slice::<AppState>(&raw) {
            Ok(state) => Some(state),
            Err(e) => {
                log::warn!("Ignoring malformed app state in local cache: {}", e);
                None
            }
        }
    }

    pub fn save_app_state(&self, state: AppState) -> Result<(), CacheError> {
        let raw = serde_json::to_vec(&state)?;
        self.cache.set(APP_STATE_KEY, &raw)
    }

    /// Insert or replace by id.
    pub fn save_task(&self, task: LocalTask) -> Result<(), CacheError> {
        self.mutate(|tasks| {
            match tasks.iter_mut().find(|t| t.id == task.id) {
                Some(existing) => *existing = task.clone(),
                None => tasks.push(task.clone()),
            }
            ((), true)
        })
    }

    /// Apply an edit. `Ok(None)` if the task is gone or the edit was rejected.
    pub fn edit_task(&self, id: &str, edit: &LocalTaskEdit) -> Result<Option<LocalTask>, CacheError> {
        self.mutate(|tasks| match tasks.iter_mut().find(|t| t.id == id) {
            Some(task) => {
                let mut edited = task.clone();
                if edit.apply(&mut edited) {
                    *task = edited.clone();
                    (Some(edited), true)
                } else {
                    (None, false)
                }
            }
            None => (None, false),
        })
    }

    pub fn delete_task(&self, id: &str) -> Result<bool, CacheError> {
        self.delete_tasks(&[id.to_string()]).map(|n| n > 0)
    }

    /// Remove every listed id in a single write. Returns how many were present.
    pub fn delete_tasks(&self, ids: &[String]) -> Result<usize, CacheError> {
        let ids: HashSet<&str> = ids.iter().map(String::as_str).collect();
        self.mutate(|tasks| {
            let before = tasks.len();
            tasks.retain(|t| !ids.contains(t.id.as_str()));
            let removed = before - tasks.len();
            (removed, removed > 0)
        })
    }

    /// Move the listed tasks to `date`, keeping ids and suggestions.
    pub fn redate_tasks(&self, ids: &[String], date: NaiveDate) -> Result<usize, CacheError> {
        let ids: HashSet<&str> = ids.iter().map(String::as_str).collect();
        self.mutate(|tasks| {
            let mut moved = 0;
            for task in tasks.iter_mut().filter(|t| ids.contains(t.id.as_str())) {
                task.created_date = date;
                moved += 1;
            }
            (moved, moved > 0)
        })
    }

    /// Pin a suggestion. `Ok(None)` if the task does not exist.
    pub fn add_suggestion(&self, task_id: &str, text: &str) -> Result<Option<Suggestion>, CacheError> {
        self.mutate(|tasks| match tasks.iter_mut().find(|t| t.id == task_id) {
            Some(task) => {
                let (suggestion, added) = task.add_suggestion(text);
                (Some(suggestion), added)
            }
            None => (None, false),
        })
    }

    pub fn remove_suggestion(
        &self,
        task_id: &str,
        suggestion_id: Uuid,
    ) -> Result<Option<Suggestion>, CacheError> {
        self.mutate(|tasks| {
            let removed = tasks
                .iter_mut()
                .find(|t| t.id == task_id)
                .and_then(|t| t.remove_suggestion(suggestion_id));
            let changed = removed.is_some();
            (removed, changed)
        })
    }

    pub fn remove_suggestion_at(
        &self,
        task_id: &str,
        index: usize,
    ) -> Result<Option<Suggestion>, CacheError> {
        self.mutate(|tasks| {
            let removed = tasks
                .iter_mut()
                .find(|t| t.id == task_id)
                .and_then(|t| t.remove_suggestion_at(index));
            let changed = removed.is_some();
            (removed, changed)
        })
    }

    /// Read-modify-write of the task list guarded by compare-and-set. `f`
    /// returns its result and whether it changed anything; unchanged lists
    /// are not written. Malformed storage is an error here rather than being
    /// silently replaced.
    fn mutate<R>(
        &self,
        mut f: impl FnMut(&mut Vec<LocalTask>) -> (R, bool),
    ) -> Result<R, CacheError> {
        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let raw = self.cache.get(ACTIVE_TASKS_KEY)?;
            let mut tasks = match raw {
                Some(ref bytes) => decode_tasks(bytes)?,
                None => Vec::new(),
            };

            let (result, changed) = f(&mut tasks);
            if !changed {
                return Ok(result);
            }

            let encoded = serde_json::to_vec(&tasks)?;
            if self
                .cache
                .compare_and_set(ACTIVE_TASKS_KEY, raw.as_deref(), &encoded)?
            {
                return Ok(result);
            }
            log::debug!(
                "Concurrent write to {}, retrying (attempt {})",
                ACTIVE_TASKS_KEY,
                attempt
            );
        }

        Err(CacheError::Contention {
            key: ACTIVE_TASKS_KEY.to_string(),
            attempts: MAX_CAS_ATTEMPTS,
        })
    }
}

fn decode_tasks(raw: &[u8]) -> Result<Vec<LocalTask>, serde_json::Error> {
    serde_json::from_slice(raw)
}
