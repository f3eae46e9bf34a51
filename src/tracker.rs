use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDate};
use uuid::Uuid;

use crate::cache::{FileCache, TaskCache};
use crate::config::DayrollConfig;
use crate::core::agenda::{self, WeekView};
use crate::core::local_task::{LocalTask, LocalTaskEdit, Suggestion};
use crate::core::task::{NewTask, Task, TaskPatch, TaskStatus};
use crate::error::{Error, Result};
use crate::sync::carry_over::{self, Authority, CarryOverOutcome};
use crate::sync::completion::{self, CompletionOutcome};
use crate::sync::ollama::OllamaClient;
use crate::sync::{MemoryStore, RestStore, TaskFilter, TaskStore};

/// Source of "today". Tests pin it; everything else follows the local clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clock {
    Local,
    Fixed(NaiveDate),
}

impl Clock {
    pub fn today(&self) -> NaiveDate {
        match self {
            Self::Local => Local::now().date_naive(),
            Self::Fixed(date) => *date,
        }
    }
}

/// The working set, the durable history, and the assistant behind one handle.
#[derive(Clone)]
pub struct Tracker {
    cache: TaskCache,
    store: Arc<dyn TaskStore>,
    assistant: OllamaClient,
    authority: Authority,
    clock: Clock,
}

impl Tracker {
    pub fn new(
        cache: TaskCache,
        store: Arc<dyn TaskStore>,
        assistant: OllamaClient,
        authority: Authority,
    ) -> Self {
        Self {
            cache,
            store,
            assistant,
            authority,
            clock: Clock::Local,
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Wire up the file cache, the configured store, and the model client.
    pub fn from_config(config: &DayrollConfig) -> Result<Self> {
        let files = FileCache::open(&config.data_directory)?;
        log::info!("Local cache at {}", files.dir().display());
        let cache = TaskCache::new(Arc::new(files));

        let store: Arc<dyn TaskStore> = if config.store.is_remote() {
            log::info!("Durable store at {}", config.store.url);
            Arc::new(RestStore::new(
                &config.store.url,
                &config.store.api_key,
                Duration::from_secs(config.store.timeout_secs),
            )?)
        } else {
            log::warn!("No store url configured, history is kept in memory only");
            Arc::new(MemoryStore::new())
        };

        let assistant = OllamaClient::new(
            &config.assistant.base_url,
            &config.assistant.model,
            Duration::from_secs(config.assistant.timeout_secs),
        )?;

        Ok(Self::new(cache, store, assistant, config.authority))
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    pub fn authority(&self) -> Authority {
        self.authority
    }

    pub fn cache(&self) -> &TaskCache {
        &self.cache
    }

    pub fn store(&self) -> &dyn TaskStore {
        self.store.as_ref()
    }

    pub fn assistant(&self) -> &OllamaClient {
        &self.assistant
    }

    // --- Rollover and completion ---

    pub async fn carry_over(&self) -> Result<CarryOverOutcome> {
        carry_over::check_and_carry_over(&self.cache, self.store(), self.today(), self.authority)
            .await
    }

    pub async fn mark_done(&self, ids: &[String]) -> Result<CompletionOutcome> {
        if ids.is_empty() {
            return Err(Error::Validation("ids are required".into()));
        }
        completion::mark_done(&self.cache, self.store(), ids).await
    }

    // --- Working set ---

    pub fn open_tasks(&self) -> Vec<LocalTask> {
        self.cache.active_tasks()
    }

    pub fn today_tasks(&self) -> Vec<LocalTask> {
        agenda::today(&self.cache.active_tasks(), self.today())
    }

    pub fn upcoming(&self) -> Vec<LocalTask> {
        agenda::upcoming(&self.cache.active_tasks(), self.today())
    }

    pub fn week_view(&self, anchor: Option<NaiveDate>) -> WeekView {
        let anchor = anchor.unwrap_or_else(|| self.today());
        WeekView::build(&self.cache.active_tasks(), anchor)
    }

    pub fn add_task(
        &self,
        title: &str,
        description: Option<String>,
        due_date: Option<NaiveDate>,
    ) -> Result<LocalTask> {
        let task = LocalTask::new(title, description, due_date, self.today())
            .ok_or_else(|| Error::Validation("title is required".into()))?;
        self.cache.save_task(task.clone())?;
        log::debug!("Added task {}", task.id);
        Ok(task)
    }

    pub fn update_task(&self, id: &str, edit: &LocalTaskEdit) -> Result<LocalTask> {
        if self.cache.task(id).is_none() {
            return Err(Error::NotFound(format!("task {}", id)));
        }
        self.cache
            .edit_task(id, edit)?
            .ok_or_else(|| Error::Validation("title must not be empty".into()))
    }

    /// Drop a task from the working set without archiving it.
    pub fn delete_task(&self, id: &str) -> Result<()> {
        if self.cache.delete_task(id)? {
            Ok(())
        } else {
            Err(Error::NotFound(format!("task {}", id)))
        }
    }

    // --- Suggestions ---

    /// `Ok(None)` when the task is not in the working set.
    pub fn add_suggestion(&self, task_id: &str, text: &str) -> Result<Option<Suggestion>> {
        if text.trim().is_empty() {
            return Err(Error::Validation("suggestion text is required".into()));
        }
        Ok(self.cache.add_suggestion(task_id, text)?)
    }

    pub fn remove_suggestion(&self, task_id: &str, suggestion_id: Uuid) -> Result<Option<Suggestion>> {
        Ok(self.cache.remove_suggestion(task_id, suggestion_id)?)
    }

    pub fn remove_suggestion_at(&self, task_id: &str, index: usize) -> Result<Option<Suggestion>> {
        Ok(self.cache.remove_suggestion_at(task_id, index)?)
    }

    // --- Durable history ---

    pub async fn history(&self, statuses: &[TaskStatus]) -> Result<Vec<Task>> {
        let filter = TaskFilter {
            statuses: statuses.to_vec(),
            ..TaskFilter::default()
        };
        Ok(self.store.select(&filter).await?)
    }

    pub async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        Ok(self.store.select(filter).await?)
    }

    pub async fn create_task(&self, row: NewTask) -> Result<Task> {
        let row = row
            .normalized()
            .ok_or_else(|| Error::Validation("title is required".into()))?;
        self.store
            .insert(std::slice::from_ref(&row))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Validation("store returned no row".into()))
    }

    pub async fn create_tasks(&self, rows: Vec<NewTask>) -> Result<Vec<Task>> {
        if rows.is_empty() {
            return Err(Error::Validation("tasks array is required".into()));
        }
        let rows = rows
            .into_iter()
            .map(NewTask::normalized)
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| Error::Validation("every task needs a title".into()))?;
        Ok(self.store.insert(&rows).await?)
    }

    pub async fn patch_task(&self, id: &str, patch: &TaskPatch) -> Result<Task> {
        if patch.is_empty() {
            return Err(Error::Validation("nothing to update".into()));
        }
        self.store
            .update(&TaskFilter::by_id(id), patch)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(format!("task {}", id)))
    }

    pub async fn remove_history_task(&self, id: &str) -> Result<()> {
        match self.store.delete(&TaskFilter::by_id(id)).await? {
            0 => Err(Error::NotFound(format!("task {}", id))),
            _ => Ok(()),
        }
    }

    // --- Assistant ---

    pub async fn ask_assistant(&self, task_id: &str) -> Result<String> {
        let task = self
            .cache
            .task(task_id)
            .ok_or_else(|| Error::NotFound(format!("task {}", task_id)))?;
        self.ask_about(&task.title, task.description.as_deref()).await
    }

    pub async fn ask_about(&self, title: &str, description: Option<&str>) -> Result<String> {
        if title.trim().is_empty() {
            return Err(Error::Validation("Task data is required".into()));
        }
        Ok(self.assistant.suggest_for_task(title, description).await?)
    }
}
