//! Read-only consistency report between the local working set and the
//! durable history. Prints to stdout; logs go to the journal.

use std::collections::{BTreeMap, HashSet};

use dayroll::Tracker;
use dayroll::config::DayrollConfig;
use dayroll::core::task::TaskStatus;
use dayroll::sync::TaskFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut config = DayrollConfig::load(&DayrollConfig::default_path())?;
    config.apply_env();
    dayroll::logging::install("dayroll-check", config.debug_logging)?;

    let tracker = Tracker::from_config(&config)?;
    let today = tracker.today();

    println!("=== Local cache vs durable store ({}) ===\n", today);
    println!("Cache:     {}", config.data_directory.display());
    println!(
        "Store:     {}",
        if config.store.is_remote() { config.store.url.as_str() } else { "(in memory)" }
    );
    println!("Authority: {:?}\n", tracker.authority());

    // Markers
    let local_marker = tracker.cache().app_state();
    let durable_marker = match tracker.store().last_viewed_date().await {
        Ok(marker) => marker,
        Err(e) => {
            println!("Store unreachable: {}", e);
            return Ok(());
        }
    };
    let show = |d: Option<chrono::NaiveDate>| d.map(|d| d.to_string()).unwrap_or_else(|| "-".into());
    println!("Last viewed (local):   {}", show(local_marker.map(|s| s.last_viewed_date)));
    println!("Last viewed (durable): {}", show(durable_marker));
    if local_marker.map(|s| s.last_viewed_date) != durable_marker {
        println!("  MARKERS DIFFER");
    }
    let stale = match local_marker {
        Some(state) if state.is_stale(today) => Some(state.last_viewed_date),
        Some(_) => None,
        None => {
            println!("  No local marker: next check is a first run");
            None
        }
    };

    // Working set
    let open = tracker.open_tasks();
    let mut by_day: BTreeMap<chrono::NaiveDate, usize> = BTreeMap::new();
    for task in &open {
        *by_day.entry(task.created_date).or_default() += 1;
    }
    println!("\nOpen tasks: {}", open.len());
    for (day, count) in &by_day {
        println!("  {}: {}", day, count);
    }

    // Durable history
    let rows = tracker.list_tasks(&TaskFilter::default()).await?;
    println!("\nDurable rows: {}", rows.len());
    for status in [TaskStatus::Active, TaskStatus::CarryOver, TaskStatus::Accomplished] {
        println!("  {}: {}", status, rows.iter().filter(|r| r.status == status).count());
    }

    // Tasks that would be carried again even though a carry_over row for the
    // same day already exists: the cache missed the redate after an insert.
    if let Some(stale) = stale {
        let carried: HashSet<&str> = rows
            .iter()
            .filter(|r| r.status == TaskStatus::CarryOver && r.created_date == stale)
            .map(|r| r.title.as_str())
            .collect();
        let pending: Vec<_> = open.iter().filter(|t| t.is_from(stale)).collect();
        println!("\nRollover due from {}: {} task(s)", stale, pending.len());
        let duplicates: Vec<_> = pending
            .iter()
            .filter(|t| carried.contains(t.title.as_str()))
            .collect();
        if !duplicates.is_empty() {
            println!("  ALREADY CARRIED ({}):", duplicates.len());
            for task in duplicates {
                println!("    {} ({})", task.title, task.id);
            }
        }
    } else if local_marker.is_some() {
        println!("\nUp to date, nothing to roll over");
    }

    // Assistant
    match tracker.assistant().ping().await {
        Ok(()) => println!("\nModel: {} at {} reachable", tracker.assistant().model(), tracker.assistant().base_url()),
        Err(e) => println!("\nModel: {}", e),
    }

    println!("\n=== Done ===");
    Ok(())
}
