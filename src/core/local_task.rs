use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use super::task::normalize_description;

/// An AI suggestion pinned to a task. The id stays stable across edits so
/// removals never depend on list position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Suggestion {
    pub id: Uuid,
    pub text: String,
}

impl Suggestion {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
        }
    }
}

// Older caches stored suggestions as bare strings.
impl<'de> Deserialize<'de> for Suggestion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Stored {
            Full { id: Uuid, text: String },
            Bare(String),
        }

        Ok(match Stored::deserialize(deserializer)? {
            Stored::Full { id, text } => Self { id, text },
            Stored::Bare(text) => Self::new(text),
        })
    }
}

/// An open task in the local working set. There is no status field: being in
/// the cache means open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalTask {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub created_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub ai_suggestions: Vec<Suggestion>,
}

impl LocalTask {
    /// Build a task dated `today`. Returns `None` for a blank title.
    pub fn new(
        title: &str,
        description: Option<String>,
        due_date: Option<NaiveDate>,
        today: NaiveDate,
    ) -> Option<Self> {
        let title = title.trim();
        if title.is_empty() {
            return None;
        }
        Some(Self {
            id: new_task_id(),
            title: title.to_string(),
            description: normalize_description(description),
            created_date: today,
            created_at: Utc::now(),
            due_date,
            ai_suggestions: Vec::new(),
        })
    }

    pub fn is_from(&self, date: NaiveDate) -> bool {
        self.created_date == date
    }

    /// Append unless the exact text is already pinned. Returns the stored
    /// suggestion and whether it was newly added.
    pub fn add_suggestion(&mut self, text: &str) -> (Suggestion, bool) {
        if let Some(existing) = self.ai_suggestions.iter().find(|s| s.text == text) {
            return (existing.clone(), false);
        }
        let suggestion = Suggestion::new(text);
        self.ai_suggestions.push(suggestion.clone());
        (suggestion, true)
    }

    pub fn remove_suggestion(&mut self, id: Uuid) -> Option<Suggestion> {
        let pos = self.ai_suggestions.iter().position(|s| s.id == id)?;
        Some(self.ai_suggestions.remove(pos))
    }

    pub fn remove_suggestion_at(&mut self, index: usize) -> Option<Suggestion> {
        if index < self.ai_suggestions.len() {
            Some(self.ai_suggestions.remove(index))
        } else {
            None
        }
    }
}

/// Edits a user can make to an open task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LocalTaskEdit {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// `Some(None)` clears the due date; an absent field leaves it alone.
    #[serde(default, deserialize_with = "present")]
    pub due_date: Option<Option<NaiveDate>>,
}

/// Distinguishes an explicit `null` from a missing field.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl LocalTaskEdit {
    /// Returns false if the edit would blank the title.
    pub fn apply(&self, task: &mut LocalTask) -> bool {
        if let Some(ref title) = self.title {
            let title = title.trim();
            if title.is_empty() {
                return false;
            }
            task.title = title.to_string();
        }
        if let Some(ref description) = self.description {
            task.description = normalize_description(Some(description.clone()));
        }
        if let Some(due_date) = self.due_date {
            task.due_date = due_date;
        }
        true
    }
}

pub fn new_task_id() -> String {
    format!("task_{}", Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 3).unwrap()
    }

    #[test]
    fn new_trims_and_rejects_blank() {
        assert!(LocalTask::new("  ", None, None, today()).is_none());
        let task = LocalTask::new(" Buy milk ", Some("  ".into()), None, today()).unwrap();
        assert_eq!(task.title, "Buy milk");
        assert_eq!(task.description, None);
        assert!(task.id.starts_with("task_"));
        assert!(task.is_from(today()));
    }

    #[test]
    fn duplicate_suggestion_text_is_kept_once() {
        let mut task = LocalTask::new("Plan trip", None, None, today()).unwrap();
        let (first, added) = task.add_suggestion("Book flights");
        assert!(added);
        let (second, added) = task.add_suggestion("Book flights");
        assert!(!added);
        assert_eq!(first.id, second.id);
        assert_eq!(task.ai_suggestions.len(), 1);

        // Exact equality only.
        task.add_suggestion("book flights");
        assert_eq!(task.ai_suggestions.len(), 2);
    }

    #[test]
    fn remove_by_index_out_of_range_is_none() {
        let mut task = LocalTask::new("Plan trip", None, None, today()).unwrap();
        task.add_suggestion("A");
        assert!(task.remove_suggestion_at(0).is_some());
        assert!(task.remove_suggestion_at(0).is_none());
        assert!(task.ai_suggestions.is_empty());
    }

    #[test]
    fn remove_by_id_survives_reordering() {
        let mut task = LocalTask::new("Plan trip", None, None, today()).unwrap();
        let (a, _) = task.add_suggestion("A");
        let (b, _) = task.add_suggestion("B");
        task.remove_suggestion(a.id);
        assert_eq!(task.remove_suggestion(b.id).map(|s| s.text), Some("B".into()));
        assert!(task.remove_suggestion(b.id).is_none());
    }

    #[test]
    fn decodes_legacy_cache_entry() {
        let json = r#"{
            "id": "task_1704067200000_abc123xyz",
            "title": "Legacy",
            "description": null,
            "created_date": "2024-01-01",
            "created_at": "2024-01-01T09:30:00.000Z",
            "ai_suggestions": ["Start small"]
        }"#;
        let task: LocalTask = serde_json::from_str(json).unwrap();
        assert_eq!(task.due_date, None);
        assert_eq!(task.ai_suggestions.len(), 1);
        assert_eq!(task.ai_suggestions[0].text, "Start small");
    }

    #[test]
    fn decodes_entry_without_suggestions() {
        let json = r#"{
            "id": "task_x",
            "title": "Old",
            "created_date": "2024-01-01",
            "created_at": "2024-01-01T09:30:00Z"
        }"#;
        let task: LocalTask = serde_json::from_str(json).unwrap();
        assert!(task.ai_suggestions.is_empty());
    }

    #[test]
    fn edit_cannot_blank_title() {
        let mut task = LocalTask::new("Plan trip", None, None, today()).unwrap();
        let edit = LocalTaskEdit {
            title: Some(" ".into()),
            ..LocalTaskEdit::default()
        };
        assert!(!edit.apply(&mut task));
        assert_eq!(task.title, "Plan trip");
    }

    #[test]
    fn edit_due_date_null_clears_and_absent_keeps() {
        let due = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        let mut task = LocalTask::new("Plan trip", None, Some(due), today()).unwrap();

        let keep: LocalTaskEdit = serde_json::from_str(r#"{"title":"Plan a trip"}"#).unwrap();
        assert_eq!(keep.due_date, None);
        assert!(keep.apply(&mut task));
        assert_eq!(task.due_date, Some(due));

        let clear: LocalTaskEdit = serde_json::from_str(r#"{"due_date":null}"#).unwrap();
        assert_eq!(clear.due_date, Some(None));
        assert!(clear.apply(&mut task));
        assert_eq!(task.due_date, None);

        let set: LocalTaskEdit = serde_json::from_str(r#"{"due_date":"2024-01-09"}"#).unwrap();
        assert!(set.apply(&mut task));
        assert_eq!(task.due_date, NaiveDate::from_ymd_opt(2024, 1, 9));
    }
}
