use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// The "last viewed date" marker, kept both in the local cache and in the
/// durable `app_state` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppState {
    pub last_viewed_date: NaiveDate,
}

impl AppState {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            last_viewed_date: date,
        }
    }

    /// Calendar-day comparison only; elapsed time is irrelevant.
    pub fn is_stale(&self, today: NaiveDate) -> bool {
        self.last_viewed_date != today
    }
}
