use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::datetime::{deadline_serde, iso_timestamp_serde};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn weight(self) -> u8 {
        match self {
            Priority::Low => 1,
            Priority::Medium => 2,
            Priority::High => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" | "l" => Ok(Priority::Low),
            "medium" | "m" => Ok(Priority::Medium),
            "high" | "h" => Ok(Priority::High),
            other => Err(anyhow::anyhow!("invalid priority: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub color: String,
}

impl Category {
    pub fn new(id: &str, name: &str, color: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            color: color.to_string(),
        }
    }
}

/// Seed list materialized when storage holds no categories.
pub fn default_categories() -> Vec<Category> {
    vec![
        Category::new("1", "Work", "bg-blue-500"),
        Category::new("2", "Personal", "bg-green-500"),
        Category::new("3", "Shopping", "bg-purple-500"),
        Category::new("4", "Health", "bg-red-500"),
    ]
}

/// Validated task content, everything a task carries except identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFields {
    pub title: String,
    pub description: Option<String>,
    pub category: String,
    pub deadline: Option<NaiveDate>,
    pub completed: bool,
    pub priority: Priority,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,

    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub category: String,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "deadline_serde"
    )]
    pub deadline: Option<NaiveDate>,

    #[serde(default)]
    pub completed: bool,

    #[serde(with = "iso_timestamp_serde")]
    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub priority: Priority,
}

impl Task {
    /// `now` is cut to milliseconds, the precision `createdAt` is stored at,
    /// so a saved task loads back equal.
    pub fn new(fields: TaskFields, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: fields.title,
            description: fields.description,
            category: fields.category,
            deadline: fields.deadline,
            completed: fields.completed,
            created_at: now.trunc_subsecs(3),
            priority: fields.priority,
        }
    }

    /// Replaces all content wholesale; `id` and `created_at` stay.
    pub fn apply(&mut self, fields: TaskFields) {
        self.title = fields.title;
        self.description = fields.description;
        self.category = fields.category;
        self.deadline = fields.deadline;
        self.completed = fields.completed;
        self.priority = fields.priority;
    }

    pub fn fields(&self) -> TaskFields {
        TaskFields {
            title: self.title.clone(),
            description: self.description.clone(),
            category: self.category.clone(),
            deadline: self.deadline,
            completed: self.completed,
            priority: self.priority,
        }
    }

    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        !self.completed
            && self
                .deadline
                .map(|deadline| crate::datetime::is_overdue(deadline, today))
                .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};

    use super::{Priority, Task, TaskFields, default_categories};

    #[test]
    fn serializes_in_stored_layout() {
        let now = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        let mut task = Task::new(
            TaskFields {
                title: "Buy milk".to_string(),
                description: None,
                category: "3".to_string(),
                deadline: NaiveDate::from_ymd_opt(2025, 1, 10),
                completed: false,
                priority: Priority::High,
            },
            now,
        );
        task.id = "abc".to_string();

        let value = serde_json::to_value(&task).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "id": "abc",
                "title": "Buy milk",
                "category": "3",
                "deadline": "2025-01-10",
                "completed": false,
                "createdAt": "2025-01-02T03:04:05.000Z",
                "priority": "high"
            })
        );
    }

    #[test]
    fn reads_browser_written_task() {
        let raw = r#"{
            "id": "6f1c",
            "title": "Dentist",
            "description": "bring card",
            "category": "4",
            "deadline": "2024-05-01",
            "completed": true,
            "createdAt": "2024-04-20T17:45:12.345Z",
            "priority": "low"
        }"#;
        let task: Task = serde_json::from_str(raw).unwrap();
        assert_eq!(task.description.as_deref(), Some("bring card"));
        assert_eq!(task.deadline, NaiveDate::from_ymd_opt(2024, 5, 1));
        assert!(task.completed);
        assert_eq!(task.priority, Priority::Low);
        assert_eq!(
            serde_json::to_value(&task).unwrap()["createdAt"],
            "2024-04-20T17:45:12.345Z"
        );
    }

    #[test]
    fn overdue_ignores_completed_and_undated() {
        let now = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let today = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let mut task = Task::new(
            TaskFields {
                title: "A".to_string(),
                description: None,
                category: "1".to_string(),
                deadline: NaiveDate::from_ymd_opt(2020, 1, 1),
                completed: false,
                priority: Priority::Medium,
            },
            now,
        );
        assert!(task.is_overdue(today));

        task.completed = true;
        assert!(!task.is_overdue(today));

        task.completed = false;
        task.deadline = None;
        assert!(!task.is_overdue(today));
    }

    #[test]
    fn default_categories_are_stable() {
        let names: Vec<String> = default_categories().into_iter().map(|c| c.name).collect();
        assert_eq!(names, ["Work", "Personal", "Shopping", "Health"]);
        assert_eq!(default_categories(), default_categories());
    }
}
