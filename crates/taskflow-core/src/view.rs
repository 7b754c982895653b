use std::cmp::Ordering;
use std::fmt;

use chrono::NaiveDate;
use deunicode::deunicode;
use tracing::trace;

use crate::datetime::days_until_deadline;
use crate::task::Task;

const DUE_SOON_DAYS: i64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StatusFilter {
    #[default]
    All,
    Active,
    Completed,
    Overdue,
}

impl StatusFilter {
    /// Unknown tokens fall through to `All`.
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "active" => StatusFilter::Active,
            "completed" | "done" => StatusFilter::Completed,
            "overdue" => StatusFilter::Overdue,
            _ => StatusFilter::All,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StatusFilter::All => "all",
            StatusFilter::Active => "active",
            StatusFilter::Completed => "completed",
            StatusFilter::Overdue => "overdue",
        }
    }

    fn matches(self, task: &Task, today: NaiveDate) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Active => !task.completed,
            StatusFilter::Completed => task.completed,
            StatusFilter::Overdue => task.is_overdue(today),
        }
    }
}

impl fmt::Display for StatusFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortMode {
    Deadline,
    Created,
    Priority,
    Alphabetical,
}

impl SortMode {
    /// `None` for unknown tokens, which leaves the filtered order untouched.
    pub fn parse_lenient(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "deadline" | "due" => Some(SortMode::Deadline),
            "created" | "newest" => Some(SortMode::Created),
            "priority" => Some(SortMode::Priority),
            "alphabetical" | "title" => Some(SortMode::Alphabetical),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SortMode::Deadline => "deadline",
            SortMode::Created => "created",
            SortMode::Priority => "priority",
            SortMode::Alphabetical => "alphabetical",
        }
    }
}

impl fmt::Display for SortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ViewQuery {
    pub search: String,
    pub status: StatusFilter,
    pub category: String,
    pub sort: Option<SortMode>,
}

impl Default for ViewQuery {
    fn default() -> Self {
        Self {
            search: String::new(),
            status: StatusFilter::All,
            category: String::new(),
            sort: Some(SortMode::Deadline),
        }
    }
}

impl ViewQuery {
    /// True when nothing narrows the list, so an empty result means no tasks exist.
    pub fn is_unfiltered(&self) -> bool {
        self.search.is_empty() && self.status == StatusFilter::All && self.category.is_empty()
    }
}

#[tracing::instrument(skip(tasks, query, today), fields(total = tasks.len()))]
pub fn visible_tasks(tasks: &[Task], query: &ViewQuery, today: NaiveDate) -> Vec<Task> {
    let needle = query.search.to_lowercase();

    let mut visible: Vec<Task> = tasks
        .iter()
        .filter(|task| needle.is_empty() || matches_search(task, &needle))
        .filter(|task| query.status.matches(task, today))
        .filter(|task| query.category.is_empty() || task.category == query.category)
        .cloned()
        .collect();

    if let Some(mode) = query.sort {
        // Vec::sort_by is stable; equal keys keep their filtered order.
        visible.sort_by(|a, b| compare_tasks(a, b, mode));
    }

    trace!(visible = visible.len(), "computed visible tasks");
    visible
}

fn matches_search(task: &Task, needle: &str) -> bool {
    task.title.to_lowercase().contains(needle)
        || task
            .description
            .as_deref()
            .map(|description| description.to_lowercase().contains(needle))
            .unwrap_or(false)
}

pub fn compare_tasks(a: &Task, b: &Task, mode: SortMode) -> Ordering {
    match mode {
        SortMode::Deadline => cmp_optional(a.deadline.as_ref(), b.deadline.as_ref()),
        SortMode::Created => b.created_at.cmp(&a.created_at),
        SortMode::Priority => b.priority.weight().cmp(&a.priority.weight()),
        SortMode::Alphabetical => title_key(&a.title)
            .cmp(&title_key(&b.title))
            .then_with(|| a.title.to_lowercase().cmp(&b.title.to_lowercase()))
            .then_with(|| a.title.cmp(&b.title)),
    }
}

/// Primary collation key: accents and case are folded so `Éclair` sits
/// between `apple` and `zebra`. Accented and cased variants are then
/// ordered by the secondary comparisons in `compare_tasks`.
fn title_key(title: &str) -> String {
    deunicode(title).to_lowercase()
}

fn cmp_optional<T: Ord>(left: Option<&T>, right: Option<&T>) -> Ordering {
    match (left, right) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TaskStats {
    pub total: usize,
    pub completed: usize,
    pub active: usize,
    pub overdue: usize,
    pub completion_rate: u8,
}

pub fn task_stats(tasks: &[Task], today: NaiveDate) -> TaskStats {
    let total = tasks.len();
    let completed = tasks.iter().filter(|task| task.completed).count();
    let overdue = tasks.iter().filter(|task| task.is_overdue(today)).count();

    TaskStats {
        total,
        completed,
        active: total - completed,
        overdue,
        completion_rate: completion_rate(completed, total),
    }
}

/// Whole percent, rounded half up; an empty list is 0%.
pub fn completion_rate(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    ((completed as f64 / total as f64) * 100.0).round() as u8
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Urgency {
    Overdue,
    DueSoon,
}

pub fn urgency(task: &Task, today: NaiveDate) -> Option<Urgency> {
    let deadline = task.deadline?;
    if task.completed {
        return None;
    }
    if task.is_overdue(today) {
        return Some(Urgency::Overdue);
    }
    if days_until_deadline(deadline, today) <= DUE_SOON_DAYS {
        return Some(Urgency::DueSoon);
    }
    None
}

/// Holds the last visible list; recomputes when the task revision, the
/// query, or the calendar day changes.
#[derive(Debug, Default)]
pub struct ViewCache {
    key: Option<(u64, ViewQuery, NaiveDate)>,
    value: Vec<Task>,
}

impl ViewCache {
    pub fn get_or_compute(
        &mut self,
        revision: u64,
        tasks: &[Task],
        query: &ViewQuery,
        today: NaiveDate,
    ) -> &[Task] {
        let hit = self
            .key
            .as_ref()
            .map(|(rev, cached_query, day)| {
                *rev == revision && cached_query == query && *day == today
            })
            .unwrap_or(false);

        if !hit {
            trace!(revision, "view cache miss");
            self.value = visible_tasks(tasks, query, today);
            self.key = Some((revision, query.clone(), today));
        }

        &self.value
    }

    pub fn invalidate(&mut self) {
        self.key = None;
    }
}
