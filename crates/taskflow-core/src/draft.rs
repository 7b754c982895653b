use serde::{Deserialize, Serialize};

use crate::datetime::{date_for_input, parse_deadline};
use crate::error::{Result, TaskflowError};
use crate::task::{Category, Priority, Task, TaskFields};

/// Form-shaped input for creating or editing a task. Strings stay raw until
/// `validate` normalizes them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TaskDraft {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub deadline: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub completed: bool,
}

impl TaskDraft {
    pub fn new(categories: &[Category]) -> Self {
        Self {
            category: categories
                .first()
                .map(|category| category.id.clone())
                .unwrap_or_default(),
            ..Self::default()
        }
    }

    pub fn from_task(task: &Task) -> Self {
        Self {
            title: task.title.clone(),
            description: task.description.clone().unwrap_or_default(),
            category: task.category.clone(),
            deadline: date_for_input(task.deadline),
            priority: task.priority,
            completed: task.completed,
        }
    }

    pub fn validate(&self) -> Result<TaskFields> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(TaskflowError::Validation(
                "title must not be empty".to_string(),
            ));
        }

        let description = if self.description.trim().is_empty() {
            None
        } else {
            Some(self.description.clone())
        };

        Ok(TaskFields {
            title: title.to_string(),
            description,
            category: self.category.clone(),
            deadline: parse_deadline(&self.deadline)?,
            completed: self.completed,
            priority: self.priority,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};

    use super::TaskDraft;
    use crate::error::TaskflowError;
    use crate::task::{Priority, Task, default_categories};

    #[test]
    fn new_draft_uses_first_category() {
        let draft = TaskDraft::new(&default_categories());
        assert_eq!(draft.category, "1");
        assert_eq!(draft.priority, Priority::Medium);
        assert!(!draft.completed);

        assert_eq!(TaskDraft::new(&[]).category, "");
    }

    #[test]
    fn validate_normalizes_fields() {
        let draft = TaskDraft {
            title: "  Pay rent  ".to_string(),
            description: "   ".to_string(),
            category: "1".to_string(),
            deadline: "2025-02-01".to_string(),
            priority: Priority::High,
            completed: false,
        };
        let fields = draft.validate().unwrap();
        assert_eq!(fields.title, "Pay rent");
        assert_eq!(fields.description, None);
        assert_eq!(fields.deadline, NaiveDate::from_ymd_opt(2025, 2, 1));
    }

    #[test]
    fn validate_rejects_blank_title_and_bad_date() {
        let blank = TaskDraft {
            title: " \t ".to_string(),
            ..TaskDraft::default()
        };
        assert!(matches!(blank.validate(), Err(TaskflowError::Validation(_))));

        let bad_date = TaskDraft {
            title: "x".to_string(),
            deadline: "31/12/2025".to_string(),
            ..TaskDraft::default()
        };
        assert!(matches!(bad_date.validate(), Err(TaskflowError::InvalidDate(_))));
    }

    #[test]
    fn from_task_round_trips_through_validate() {
        let draft = TaskDraft {
            title: "Dentist".to_string(),
            description: "bring card".to_string(),
            category: "4".to_string(),
            deadline: "2025-05-01".to_string(),
            priority: Priority::Low,
            completed: true,
        };
        let task = Task::new(draft.validate().unwrap(), Utc::now());
        assert_eq!(TaskDraft::from_task(&task), draft);
    }
}
