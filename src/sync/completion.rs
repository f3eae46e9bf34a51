use std::collections::HashSet;

use serde::Serialize;

use super::TaskStore;
use crate::cache::TaskCache;
use crate::core::task::{NewTask, Task, TaskStatus};
use crate::error::Result;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompletionOutcome {
    /// Durable `accomplished` rows written for the completed tasks.
    pub archived: Vec<Task>,
    /// Requested ids that were not in the working set.
    pub missing: Vec<String>,
}

/// Archive the given open tasks as accomplished and drop them from the
/// working set.
///
/// Unknown ids are skipped. If the durable insert fails the working set is
/// left exactly as it was.
pub async fn mark_done(
    cache: &TaskCache,
    store: &dyn TaskStore,
    ids: &[String],
) -> Result<CompletionOutcome> {
    let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();
    let open = cache.active_tasks();
    let resolved: Vec<_> = open
        .iter()
        .filter(|t| wanted.contains(t.id.as_str()))
        .collect();

    let missing: Vec<String> = ids
        .iter()
        .filter(|id| !resolved.iter().any(|t| t.id == **id))
        .cloned()
        .collect();
    if !missing.is_empty() {
        log::debug!("Skipping {} unknown task id(s) in completion", missing.len());
    }

    if resolved.is_empty() {
        return Ok(CompletionOutcome {
            archived: Vec::new(),
            missing,
        });
    }

    let rows: Vec<NewTask> = resolved
        .iter()
        .map(|t| NewTask::from_local(t, TaskStatus::Accomplished))
        .collect();
    let archived = store.insert(&rows).await.inspect_err(|e| {
        log::error!("Error saving completed tasks to the durable store: {}", e);
    })?;

    let done_ids: Vec<String> = resolved.iter().map(|t| t.id.clone()).collect();
    if let Err(e) = cache.delete_tasks(&done_ids) {
        log::error!("Completed tasks archived but not removed from the working set: {}", e);
    }
    log::info!("Marked {} task(s) done", done_ids.len());

    Ok(CompletionOutcome { archived, missing })
}
