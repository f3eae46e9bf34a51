use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;

use super::local_task::LocalTask;

/// One day column of the week view.
#[derive(Debug, Clone, Serialize)]
pub struct DayColumn {
    pub date: NaiveDate,
    pub tasks: Vec<LocalTask>,
}

/// Sunday-to-Saturday view of open tasks by due date.
#[derive(Debug, Clone, Serialize)]
pub struct WeekView {
    pub days: Vec<DayColumn>,
    pub undated: Vec<LocalTask>,
}

impl WeekView {
    pub fn build(tasks: &[LocalTask], anchor: NaiveDate) -> Self {
        let start = week_start(anchor);
        let days = (0..7)
            .map(|offset| {
                let date = start + Duration::days(offset);
                let tasks = tasks
                    .iter()
                    .filter(|t| t.due_date == Some(date))
                    .cloned()
                    .collect();
                DayColumn { date, tasks }
            })
            .collect();

        let undated = tasks
            .iter()
            .filter(|t| t.due_date.is_none())
            .cloned()
            .collect();

        Self { days, undated }
    }

    pub fn total_count(&self) -> usize {
        self.days.iter().map(|d| d.tasks.len()).sum::<usize>() + self.undated.len()
    }
}

/// The Sunday on or before `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    let back = date.weekday().num_days_from_sunday() as i64;
    date - Duration::days(back)
}

/// Tasks created today.
pub fn today(tasks: &[LocalTask], today: NaiveDate) -> Vec<LocalTask> {
    tasks.iter().filter(|t| t.is_from(today)).cloned().collect()
}

/// Tasks due after today, soonest first.
pub fn upcoming(tasks: &[LocalTask], today: NaiveDate) -> Vec<LocalTask> {
    let mut upcoming: Vec<LocalTask> = tasks
        .iter()
        .filter(|t| t.due_date.is_some_and(|d| d > today))
        .cloned()
        .collect();
    upcoming.sort_by_key(|t| t.due_date.unwrap_or(NaiveDate::MAX));
    upcoming
}
