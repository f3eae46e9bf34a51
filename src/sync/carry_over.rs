//! Daily rollover of unfinished tasks.
//!
//! When the calendar day changes, tasks left over from the last viewed day are
//! written to the durable history with status `carry_over` and stay open under
//! today's date. Which store's `last_viewed_date` decides whether a rollover
//! is due is selected by [`Authority`].

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{TaskFilter, TaskStore};
use crate::cache::TaskCache;
use crate::core::app_state::AppState;
use crate::core::task::{NewTask, TaskStatus};
use crate::error::Result;

/// Which store holds the authoritative last-viewed marker and leftovers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Authority {
    #[default]
    LocalCache,
    DurableStore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RolloverState {
    /// No marker yet: record today, carry nothing.
    FirstRun,
    UpToDate,
    NeedsRollover { stale: NaiveDate },
}

impl RolloverState {
    pub fn evaluate(last_viewed: Option<NaiveDate>, today: NaiveDate) -> Self {
        match last_viewed {
            None => Self::FirstRun,
            Some(last) if last == today => Self::UpToDate,
            Some(stale) => Self::NeedsRollover { stale },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CarryOverOutcome {
    #[serde(flatten)]
    pub state: RolloverState,
    /// Local task ids moved to today, or the new durable row ids when the
    /// durable store is authoritative.
    pub carried: Vec<String>,
}

impl CarryOverOutcome {
    fn nothing(state: RolloverState) -> Self {
        Self {
            state,
            carried: Vec::new(),
        }
    }
}

/// Run the rollover check for `today`.
///
/// A failed durable insert returns the error and leaves the marker and every
/// task date untouched, so the next call retries the same rollover.
pub async fn check_and_carry_over(
    cache: &TaskCache,
    store: &dyn TaskStore,
    today: NaiveDate,
    authority: Authority,
) -> Result<CarryOverOutcome> {
    match authority {
        Authority::LocalCache => carry_over_local(cache, store, today).await,
        Authority::DurableStore => carry_over_durable(cache, store, today).await,
    }
}

async fn carry_over_local(
    cache: &TaskCache,
    store: &dyn TaskStore,
    today: NaiveDate,
) -> Result<CarryOverOutcome> {
    let state = RolloverState::evaluate(cache.app_state().map(|s| s.last_viewed_date), today);
    let stale = match state {
        RolloverState::UpToDate => return Ok(CarryOverOutcome::nothing(state)),
        RolloverState::FirstRun => {
            record_local_marker(cache, today);
            mirror_durable_marker(store, today).await;
            return Ok(CarryOverOutcome::nothing(state));
        }
        RolloverState::NeedsRollover { stale } => stale,
    };

    let leftovers: Vec<_> = cache
        .active_tasks()
        .into_iter()
        .filter(|t| t.is_from(stale))
        .collect();

    if leftovers.is_empty() {
        log::info!("Day changed from {} to {}, nothing to carry over", stale, today);
        record_local_marker(cache, today);
        mirror_durable_marker(store, today).await;
        return Ok(CarryOverOutcome::nothing(state));
    }

    let rows: Vec<NewTask> = leftovers
        .iter()
        .map(|t| NewTask::from_local(t, TaskStatus::CarryOver))
        .collect();
    if let Err(e) = store.insert(&rows).await {
        log::error!("Error saving carry-over tasks to the durable store: {}", e);
        return Err(e.into());
    }

    let carried: Vec<String> = leftovers.into_iter().map(|t| t.id).collect();
    log::info!("Carried over {} task(s) from {} to {}", carried.len(), stale, today);

    // The durable history already has the rows; local failures from here on
    // are reported in the log only.
    if let Err(e) = cache.redate_tasks(&carried, today) {
        log::error!("Carry-over rows saved but local tasks not moved to {}: {}", today, e);
    }
    record_local_marker(cache, today);
    mirror_durable_marker(store, today).await;

    Ok(CarryOverOutcome { state, carried })
}

async fn carry_over_durable(
    cache: &TaskCache,
    store: &dyn TaskStore,
    today: NaiveDate,
) -> Result<CarryOverOutcome> {
    let state = RolloverState::evaluate(store.last_viewed_date().await?, today);
    let stale = match state {
        RolloverState::UpToDate => return Ok(CarryOverOutcome::nothing(state)),
        RolloverState::FirstRun => {
            store.set_last_viewed_date(today).await?;
            mirror_local_marker(cache, today);
            return Ok(CarryOverOutcome::nothing(state));
        }
        RolloverState::NeedsRollover { stale } => stale,
    };

    // Copies made by the previous rollover are today's open tasks, so they
    // roll forward again alongside rows that were never carried.
    let leftovers = store
        .select(
            &TaskFilter::default()
                .on_date(stale)
                .with_status(TaskStatus::Active)
                .with_status(TaskStatus::CarryOver),
        )
        .await?;

    let mut carried = Vec::new();
    if !leftovers.is_empty() {
        let rows: Vec<NewTask> = leftovers
            .iter()
            .map(|t| NewTask {
                title: t.title.clone(),
                description: t.description.clone(),
                status: TaskStatus::CarryOver,
                created_date: today,
                due_date: t.due_date,
            })
            .collect();
        let inserted = store.insert(&rows).await.inspect_err(|e| {
            log::error!("Error saving carry-over tasks to the durable store: {}", e);
        })?;
        carried = inserted.into_iter().map(|t| t.id).collect();
        log::info!("Carried over {} durable task(s) from {} to {}", carried.len(), stale, today);
    }

    store.set_last_viewed_date(today).await?;
    mirror_local_marker(cache, today);

    Ok(CarryOverOutcome { state, carried })
}

async fn mirror_durable_marker(store: &dyn TaskStore, today: NaiveDate) {
    if let Err(e) = store.set_last_viewed_date(today).await {
        log::warn!("Could not update durable last viewed date: {}", e);
    }
}

/// The local marker write is best effort: a failure is logged and the
/// rollover still reports success.
fn record_local_marker(cache: &TaskCache, today: NaiveDate) {
    if let Err(e) = cache.save_app_state(AppState::new(today)) {
        log::error!("Could not save last viewed date {}: {}", today, e);
    }
}

fn mirror_local_marker(cache: &TaskCache, today: NaiveDate) {
    if let Err(e) = cache.save_app_state(AppState::new(today)) {
        log::warn!("Could not update cached last viewed date: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::cache::tasks::{ACTIVE_TASKS_KEY, APP_STATE_KEY};
    use crate::cache::{LocalCache, MemoryCache};
    use crate::core::local_task::LocalTask;
    use crate::sync::MemoryStore;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    struct Fixture {
        memory: Arc<MemoryCache>,
        cache: TaskCache,
        store: MemoryStore,
    }

    impl Fixture {
        fn new() -> Self {
            let memory = Arc::new(MemoryCache::new());
            Self {
                cache: TaskCache::new(memory.clone()),
                memory,
                store: MemoryStore::new(),
            }
        }

        fn seen_on(&self, day: NaiveDate) {
            self.cache.save_app_state(AppState::new(day)).unwrap();
        }

        fn open_task(&self, title: &str, day: NaiveDate) -> LocalTask {
            let task = LocalTask::new(title, None, None, day).unwrap();
            self.cache.save_task(task.clone()).unwrap();
            task
        }

        fn last_viewed(&self) -> Option<NaiveDate> {
            self.cache.app_state().map(|s| s.last_viewed_date)
        }

        async fn run(&self, today: NaiveDate) -> Result<CarryOverOutcome> {
            check_and_carry_over(&self.cache, &self.store, today, Authority::LocalCache).await
        }
    }

    #[test]
    fn state_machine() {
        let today = date(2024, 1, 3);
        assert_eq!(RolloverState::evaluate(None, today), RolloverState::FirstRun);
        assert_eq!(RolloverState::evaluate(Some(today), today), RolloverState::UpToDate);
        assert_eq!(
            RolloverState::evaluate(Some(date(2024, 1, 1)), today),
            RolloverState::NeedsRollover { stale: date(2024, 1, 1) }
        );
    }

    #[tokio::test]
    async fn first_run_sets_marker_and_carries_nothing() {
        let fx = Fixture::new();
        fx.open_task("Old", date(2023, 12, 31));

        let outcome = fx.run(date(2024, 1, 3)).await.unwrap();
        assert_eq!(outcome.state, RolloverState::FirstRun);
        assert!(outcome.carried.is_empty());
        assert_eq!(fx.last_viewed(), Some(date(2024, 1, 3)));
        assert_eq!(fx.store.insert_calls(), 0);
        assert_eq!(fx.cache.active_tasks()[0].created_date, date(2023, 12, 31));
    }

    #[tokio::test]
    async fn three_leftovers_are_carried() {
        let fx = Fixture::new();
        fx.seen_on(date(2024, 1, 1));
        let tasks: Vec<LocalTask> = ["a", "b", "c"]
            .iter()
            .map(|t| fx.open_task(t, date(2024, 1, 1)))
            .collect();
        fx.cache.add_suggestion(&tasks[0].id, "Start early").unwrap();

        let outcome = fx.run(date(2024, 1, 3)).await.unwrap();
        assert_eq!(outcome.state, RolloverState::NeedsRollover { stale: date(2024, 1, 1) });
        assert_eq!(outcome.carried.len(), 3);

        let rows = fx.store.rows();
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.status == TaskStatus::CarryOver));
        assert_eq!(fx.store.insert_calls(), 1);

        let cached = fx.cache.active_tasks();
        assert_eq!(cached.len(), 3);
        for task in &tasks {
            let now = cached.iter().find(|t| t.id == task.id).unwrap();
            assert_eq!(now.created_date, date(2024, 1, 3));
        }
        assert_eq!(fx.cache.task(&tasks[0].id).unwrap().ai_suggestions.len(), 1);
        assert_eq!(fx.last_viewed(), Some(date(2024, 1, 3)));
        assert_eq!(fx.store.last_viewed_date().await.unwrap(), Some(date(2024, 1, 3)));
    }

    #[tokio::test]
    async fn only_the_stale_day_is_selected() {
        let fx = Fixture::new();
        fx.seen_on(date(2024, 1, 2));
        let stale = fx.open_task("stale", date(2024, 1, 2));
        let older = fx.open_task("older", date(2023, 12, 30));

        let outcome = fx.run(date(2024, 1, 3)).await.unwrap();
        assert_eq!(outcome.carried, vec![stale.id]);
        assert_eq!(fx.cache.task(&older.id).unwrap().created_date, date(2023, 12, 30));
    }

    #[tokio::test]
    async fn failed_insert_changes_nothing() {
        let fx = Fixture::new();
        fx.seen_on(date(2024, 1, 1));
        for t in ["a", "b", "c"] {
            fx.open_task(t, date(2024, 1, 1));
        }
        let before = fx.memory.get(ACTIVE_TASKS_KEY).unwrap();
        fx.store.set_failing(true);

        assert!(fx.run(date(2024, 1, 3)).await.is_err());
        assert_eq!(fx.last_viewed(), Some(date(2024, 1, 1)));
        assert!(fx
            .cache
            .active_tasks()
            .iter()
            .all(|t| t.created_date == date(2024, 1, 1)));
        assert_eq!(fx.memory.get(ACTIVE_TASKS_KEY).unwrap(), before);

        // Once the store is back, the same rollover goes through.
        fx.store.set_failing(false);
        let outcome = fx.run(date(2024, 1, 3)).await.unwrap();
        assert_eq!(outcome.carried.len(), 3);
    }

    #[tokio::test]
    async fn second_run_same_day_is_idempotent() {
        let fx = Fixture::new();
        fx.seen_on(date(2024, 1, 1));
        fx.open_task("a", date(2024, 1, 1));
        fx.open_task("b", date(2024, 1, 3));

        fx.run(date(2024, 1, 3)).await.unwrap();
        let inserts = fx.store.insert_calls();
        let tasks = fx.memory.get(ACTIVE_TASKS_KEY).unwrap();
        let state = fx.memory.get(APP_STATE_KEY).unwrap();

        // Any cache write on the second run would now fail the call.
        fx.memory.set_fail_writes(true);
        let outcome = fx.run(date(2024, 1, 3)).await.unwrap();
        assert_eq!(outcome.state, RolloverState::UpToDate);
        assert!(outcome.carried.is_empty());
        assert_eq!(fx.store.insert_calls(), inserts);
        assert_eq!(fx.memory.get(ACTIVE_TASKS_KEY).unwrap(), tasks);
        assert_eq!(fx.memory.get(APP_STATE_KEY).unwrap(), state);
    }

    #[tokio::test]
    async fn no_leftovers_still_advances_marker() {
        let fx = Fixture::new();
        fx.seen_on(date(2024, 1, 1));
        fx.open_task("fresh", date(2024, 1, 3));

        let outcome = fx.run(date(2024, 1, 3)).await.unwrap();
        assert!(outcome.carried.is_empty());
        assert_eq!(fx.store.insert_calls(), 0);
        assert_eq!(fx.last_viewed(), Some(date(2024, 1, 3)));
    }

    #[tokio::test]
    async fn cache_failure_after_insert_is_not_an_error() {
        let fx = Fixture::new();
        fx.seen_on(date(2024, 1, 1));
        fx.open_task("a", date(2024, 1, 1));
        fx.memory.set_fail_writes(true);

        let outcome = fx.run(date(2024, 1, 3)).await.unwrap();
        assert_eq!(outcome.carried.len(), 1);
        assert_eq!(fx.store.rows().len(), 1);
        assert_eq!(fx.last_viewed(), Some(date(2024, 1, 1)));
    }

    #[tokio::test]
    async fn first_run_with_failing_cache_still_mirrors_durable_marker() {
        let fx = Fixture::new();
        fx.memory.set_fail_writes(true);

        let outcome = fx.run(date(2024, 1, 3)).await.unwrap();
        assert_eq!(outcome.state, RolloverState::FirstRun);
        assert!(fx.last_viewed().is_none());
        assert_eq!(fx.store.last_viewed_date().await.unwrap(), Some(date(2024, 1, 3)));
    }

    #[tokio::test]
    async fn no_leftovers_with_failing_cache_still_mirrors_durable_marker() {
        let fx = Fixture::new();
        fx.seen_on(date(2024, 1, 1));
        fx.memory.set_fail_writes(true);

        let outcome = fx.run(date(2024, 1, 3)).await.unwrap();
        assert_eq!(outcome.state, RolloverState::NeedsRollover { stale: date(2024, 1, 1) });
        assert!(outcome.carried.is_empty());
        assert_eq!(fx.last_viewed(), Some(date(2024, 1, 1)));
        assert_eq!(fx.store.last_viewed_date().await.unwrap(), Some(date(2024, 1, 3)));
    }

    #[tokio::test]
    async fn malformed_marker_counts_as_first_run() {
        let fx = Fixture::new();
        fx.memory.set(APP_STATE_KEY, b"not json").unwrap();
        fx.open_task("a", date(2024, 1, 1));

        let outcome = fx.run(date(2024, 1, 3)).await.unwrap();
        assert_eq!(outcome.state, RolloverState::FirstRun);
        assert_eq!(fx.store.insert_calls(), 0);
    }

    #[tokio::test]
    async fn durable_authority_copies_active_rows() {
        let fx = Fixture::new();
        fx.store.set_last_viewed_date(date(2024, 1, 1)).await.unwrap();
        let mut done = NewTask::new("finished", date(2024, 1, 1));
        done.status = TaskStatus::Accomplished;
        fx.store
            .insert(&[
                NewTask::new("open", date(2024, 1, 1)),
                done,
                NewTask::new("older", date(2023, 12, 31)),
            ])
            .await
            .unwrap();

        let outcome =
            check_and_carry_over(&fx.cache, &fx.store, date(2024, 1, 3), Authority::DurableStore)
                .await
                .unwrap();
        assert_eq!(outcome.carried.len(), 1);

        let copies = fx
            .store
            .select(&TaskFilter::default().with_status(TaskStatus::CarryOver))
            .await
            .unwrap();
        assert_eq!(copies.len(), 1);
        assert_eq!(copies[0].title, "open");
        assert_eq!(copies[0].created_date, date(2024, 1, 3));
        assert_eq!(fx.store.last_viewed_date().await.unwrap(), Some(date(2024, 1, 3)));
        assert_eq!(fx.last_viewed(), Some(date(2024, 1, 3)));

        let again =
            check_and_carry_over(&fx.cache, &fx.store, date(2024, 1, 3), Authority::DurableStore)
                .await
                .unwrap();
        assert_eq!(again.state, RolloverState::UpToDate);
        assert_eq!(fx.store.insert_calls(), 2);
    }

    #[tokio::test]
    async fn durable_authority_keeps_rolling_an_open_task_forward() {
        let fx = Fixture::new();
        fx.store.set_last_viewed_date(date(2024, 1, 1)).await.unwrap();
        fx.store.insert(&[NewTask::new("open", date(2024, 1, 1))]).await.unwrap();

        for day in [date(2024, 1, 2), date(2024, 1, 3)] {
            let outcome = check_and_carry_over(&fx.cache, &fx.store, day, Authority::DurableStore)
                .await
                .unwrap();
            assert_eq!(outcome.carried.len(), 1, "rollover to {}", day);
        }

        let latest = fx
            .store
            .select(&TaskFilter::default().on_date(date(2024, 1, 3)))
            .await
            .unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].title, "open");
        assert_eq!(latest[0].status, TaskStatus::CarryOver);
        assert_eq!(fx.store.last_viewed_date().await.unwrap(), Some(date(2024, 1, 3)));
    }

    #[tokio::test]
    async fn durable_authority_failed_insert_keeps_marker() {
        let fx = Fixture::new();
        fx.store.set_last_viewed_date(date(2024, 1, 1)).await.unwrap();
        fx.store.insert(&[NewTask::new("open", date(2024, 1, 1))]).await.unwrap();

        // Fails every call, including the marker read.
        fx.store.set_failing(true);
        let result =
            check_and_carry_over(&fx.cache, &fx.store, date(2024, 1, 3), Authority::DurableStore)
                .await;
        assert!(result.is_err());
        fx.store.set_failing(false);
        assert_eq!(fx.store.last_viewed_date().await.unwrap(), Some(date(2024, 1, 1)));
        assert!(fx.last_viewed().is_none());
    }
}
