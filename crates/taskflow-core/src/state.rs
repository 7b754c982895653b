use chrono::{NaiveDate, Utc};
use tracing::{debug, info, warn};

use crate::draft::TaskDraft;
use crate::error::{Result, TaskflowError};
use crate::storage::{self, CATEGORIES_KEY, KeyValueStore};
use crate::task::{Category, Task, default_categories};
use crate::view::{TaskStats, ViewCache, ViewQuery, task_stats};

/// Owns the authoritative task and category collections. Every successful
/// task mutation writes the full task list back to the store.
#[derive(Debug)]
pub struct AppState<S: KeyValueStore> {
    store: S,
    tasks: Vec<Task>,
    categories: Vec<Category>,
    revision: u64,
    cache: ViewCache,
}

impl<S: KeyValueStore> AppState<S> {
    /// Restores both collections from `store`. With `recover_corrupt`, stored
    /// values that fail to parse are logged and replaced by empty tasks or the
    /// default categories instead of failing.
    #[tracing::instrument(skip(store))]
    pub fn open(mut store: S, recover_corrupt: bool) -> Result<Self> {
        let tasks = match storage::load_tasks(&store) {
            Ok(tasks) => tasks,
            Err(err @ TaskflowError::StorageParse { .. }) if recover_corrupt => {
                warn!(error = %err, "stored tasks are corrupt; starting empty");
                Vec::new()
            }
            Err(err) => return Err(err),
        };

        let categories_missing = store.get(CATEGORIES_KEY)?.is_none();
        let categories = match storage::load_categories(&store) {
            Ok(categories) => categories,
            Err(err @ TaskflowError::StorageParse { .. }) if recover_corrupt => {
                warn!(error = %err, "stored categories are corrupt; using defaults");
                default_categories()
            }
            Err(err) => return Err(err),
        };

        if categories_missing {
            info!(count = categories.len(), "seeding default categories");
            storage::save_categories(&mut store, &categories)?;
        }

        info!(
            tasks = tasks.len(),
            categories = categories.len(),
            "opened task state"
        );

        Ok(Self {
            store,
            tasks,
            categories,
            revision: 0,
            cache: ViewCache::default(),
        })
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    /// Dangling references resolve to `None`.
    pub fn category(&self, id: &str) -> Option<&Category> {
        self.categories.iter().find(|category| category.id == id)
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Expands a unique id prefix to the full task id.
    pub fn resolve_id(&self, prefix: &str) -> Result<String> {
        let prefix = prefix.trim();
        if let Some(task) = self.task(prefix) {
            return Ok(task.id.clone());
        }
        if prefix.is_empty() {
            return Err(TaskflowError::NotFound(prefix.to_string()));
        }

        let mut matches = self.tasks.iter().filter(|task| task.id.starts_with(prefix));
        let Some(first) = matches.next() else {
            return Err(TaskflowError::NotFound(prefix.to_string()));
        };
        if matches.next().is_some() {
            return Err(TaskflowError::AmbiguousId(prefix.to_string()));
        }
        Ok(first.id.clone())
    }

    #[tracing::instrument(skip(self, draft), fields(title = %draft.title))]
    pub fn create_task(&mut self, draft: &TaskDraft) -> Result<Task> {
        let fields = draft.validate()?;
        let task = Task::new(fields, Utc::now());

        let previous = self.tasks.clone();
        self.tasks.push(task.clone());
        self.commit(previous)?;

        info!(id = %task.id, "created task");
        Ok(task)
    }

    #[tracing::instrument(skip(self, draft))]
    pub fn update_task(&mut self, id: &str, draft: &TaskDraft) -> Result<Task> {
        let fields = draft.validate()?;
        let idx = self.position(id)?;

        let previous = self.tasks.clone();
        self.tasks[idx].apply(fields);
        let updated = self.tasks[idx].clone();
        self.commit(previous)?;

        info!("updated task");
        Ok(updated)
    }

    /// Returns the new completion state.
    #[tracing::instrument(skip(self))]
    pub fn toggle_complete(&mut self, id: &str) -> Result<bool> {
        let idx = self.position(id)?;

        let previous = self.tasks.clone();
        let completed = !self.tasks[idx].completed;
        self.tasks[idx].completed = completed;
        self.commit(previous)?;

        info!(completed, "toggled task");
        Ok(completed)
    }

    #[tracing::instrument(skip(self))]
    pub fn delete_task(&mut self, id: &str) -> Result<Task> {
        let idx = self.position(id)?;

        let previous = self.tasks.clone();
        let removed = self.tasks.remove(idx);
        self.commit(previous)?;

        info!("deleted task");
        Ok(removed)
    }

    pub fn visible(&mut self, query: &ViewQuery, today: NaiveDate) -> &[Task] {
        self.cache
            .get_or_compute(self.revision, &self.tasks, query, today)
    }

    pub fn stats(&self, today: NaiveDate) -> TaskStats {
        task_stats(&self.tasks, today)
    }

    fn position(&self, id: &str) -> Result<usize> {
        self.tasks
            .iter()
            .position(|task| task.id == id)
            .ok_or_else(|| TaskflowError::NotFound(id.to_string()))
    }

    /// Post-mutation hook. A failed write restores `previous` so memory never
    /// runs ahead of the store.
    fn commit(&mut self, previous: Vec<Task>) -> Result<()> {
        if let Err(err) = storage::save_tasks(&mut self.store, &self.tasks) {
            warn!(error = %err, "persisting tasks failed; rolling back");
            self.tasks = previous;
            return Err(err);
        }
        self.revision += 1;
        debug!(revision = self.revision, count = self.tasks.len(), "persisted tasks");
        Ok(())
    }
}
