use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::{Result, TaskflowError};
use crate::task::{Category, Task, default_categories};

pub const TASKS_KEY: &str = "todo-tasks";
pub const CATEGORIES_KEY: &str = "todo-categories";

const STORE_FILE_NAME: &str = "taskflow.json";

/// Whole-value string storage, the shape of browser `localStorage`.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// One JSON object of key to string value, rewritten atomically on every set.
#[derive(Debug)]
pub struct FileStore {
    pub data_dir: PathBuf,
    pub path: PathBuf,
}

impl FileStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> Result<Self> {
        let data_dir = data_dir.to_path_buf();
        let path = data_dir.join(STORE_FILE_NAME);
        let io_err = |err: std::io::Error| TaskflowError::StorageWrite {
            key: path.display().to_string(),
            message: err.to_string(),
        };

        fs::create_dir_all(&data_dir).map_err(io_err)?;
        if !path.exists() {
            fs::write(&path, "{}").map_err(io_err)?;
        }

        info!(
            data_dir = %data_dir.display(),
            file = %path.display(),
            "opened file store"
        );

        Ok(Self { data_dir, path })
    }

    fn read_document(&self, key: &str) -> Result<BTreeMap<String, String>> {
        let raw = fs::read_to_string(&self.path).map_err(|err| TaskflowError::StorageRead {
            key: key.to_string(),
            message: format!("{}: {err}", self.path.display()),
        })?;
        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&raw).map_err(|source| TaskflowError::StorageParse {
            key: key.to_string(),
            source,
        })
    }

    /// Moves an unreadable document aside to `taskflow.json.corrupt` and starts
    /// over with an empty one. Returns whether anything was moved.
    #[tracing::instrument(skip(self))]
    pub fn recover_document(&self) -> Result<bool> {
        match self.read_document(STORE_FILE_NAME) {
            Err(TaskflowError::StorageParse { source, .. }) => {
                let backup = self.path.with_extension("json.corrupt");
                warn!(
                    file = %self.path.display(),
                    backup = %backup.display(),
                    error = %source,
                    "store document is corrupt; moving it aside"
                );
                let io_err = |err: std::io::Error| TaskflowError::StorageWrite {
                    key: STORE_FILE_NAME.to_string(),
                    message: err.to_string(),
                };
                fs::rename(&self.path, &backup).map_err(io_err)?;
                fs::write(&self.path, "{}").map_err(io_err)?;
                Ok(true)
            }
            Err(err) => Err(err),
            Ok(_) => Ok(false),
        }
    }

    fn write_document(&self, key: &str, doc: &BTreeMap<String, String>) -> Result<()> {
        let write_err = |message: String| TaskflowError::StorageWrite {
            key: key.to_string(),
            message,
        };

        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let mut temp = NamedTempFile::new_in(dir).map_err(|err| write_err(err.to_string()))?;
        let serialized = serde_json::to_string_pretty(doc)?;
        temp.write_all(serialized.as_bytes())
            .and_then(|_| temp.flush())
            .map_err(|err| write_err(err.to_string()))?;
        temp.persist(&self.path)
            .map_err(|err| write_err(format!("failed to persist {}: {err}", self.path.display())))?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let mut doc = self.read_document(key)?;
        Ok(doc.remove(key))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut doc = self.read_document(key)?;
        doc.insert(key.to_string(), value.to_string());
        self.write_document(key, &doc)
    }
}

#[tracing::instrument(skip(store, tasks))]
pub fn save_tasks<S: KeyValueStore + ?Sized>(store: &mut S, tasks: &[Task]) -> Result<()> {
    debug!(count = tasks.len(), "saving tasks");
    save_json(store, TASKS_KEY, tasks)
}

#[tracing::instrument(skip(store))]
pub fn load_tasks<S: KeyValueStore + ?Sized>(store: &S) -> Result<Vec<Task>> {
    let tasks: Vec<Task> = load_json(store, TASKS_KEY)?.unwrap_or_default();
    debug!(count = tasks.len(), "loaded tasks");
    Ok(tasks)
}

#[tracing::instrument(skip(store, categories))]
pub fn save_categories<S: KeyValueStore + ?Sized>(
    store: &mut S,
    categories: &[Category],
) -> Result<()> {
    debug!(count = categories.len(), "saving categories");
    save_json(store, CATEGORIES_KEY, categories)
}

/// Missing categories fall back to the seed list, never to empty.
#[tracing::instrument(skip(store))]
pub fn load_categories<S: KeyValueStore + ?Sized>(store: &S) -> Result<Vec<Category>> {
    match load_json(store, CATEGORIES_KEY)? {
        Some(categories) => Ok(categories),
        None => {
            debug!("no stored categories; using defaults");
            Ok(default_categories())
        }
    }
}

fn save_json<S, T>(store: &mut S, key: &str, value: &T) -> Result<()>
where
    S: KeyValueStore + ?Sized,
    T: Serialize + ?Sized,
{
    let serialized = serde_json::to_string(value)?;
    store.set(key, &serialized)
}

fn load_json<S, T>(store: &S, key: &str) -> Result<Option<T>>
where
    S: KeyValueStore + ?Sized,
    T: DeserializeOwned,
{
    let Some(raw) = store.get(key)? else {
        return Ok(None);
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|source| TaskflowError::StorageParse {
            key: key.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};
    use tempfile::tempdir;

    use super::*;
    use crate::task::{Priority, TaskFields};

    fn sample_tasks() -> Vec<Task> {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
        vec![
            Task::new(
                TaskFields {
                    title: "Write report".to_string(),
                    description: Some("quarterly".to_string()),
                    category: "1".to_string(),
                    deadline: NaiveDate::from_ymd_opt(2025, 3, 15),
                    completed: false,
                    priority: Priority::High,
                },
                now,
            ),
            Task::new(
                TaskFields {
                    title: "Call mom".to_string(),
                    description: None,
                    category: "2".to_string(),
                    deadline: None,
                    completed: true,
                    priority: Priority::Low,
                },
                now,
            ),
        ]
    }

    #[test]
    fn tasks_round_trip_through_store() {
        let mut store = MemoryStore::new();
        assert!(load_tasks(&store).unwrap().is_empty());

        save_tasks(&mut store, &[]).unwrap();
        assert!(load_tasks(&store).unwrap().is_empty());

        let tasks = sample_tasks();
        save_tasks(&mut store, &tasks).unwrap();
        assert_eq!(load_tasks(&store).unwrap(), tasks);
    }

    #[test]
    fn tasks_created_now_round_trip_exactly() {
        let mut store = MemoryStore::new();
        let fields = TaskFields {
            title: "Stamp".to_string(),
            description: None,
            category: "1".to_string(),
            deadline: None,
            completed: false,
            priority: Priority::Medium,
        };
        let tasks = vec![Task::new(fields, Utc::now())];

        save_tasks(&mut store, &tasks).unwrap();
        assert_eq!(load_tasks(&store).unwrap(), tasks);
    }

    #[test]
    fn categories_default_until_written() {
        let mut store = MemoryStore::new();
        assert_eq!(load_categories(&store).unwrap(), default_categories());
        assert_eq!(load_categories(&store).unwrap(), default_categories());

        let custom = vec![Category::new("9", "Errands", "bg-amber-500")];
        save_categories(&mut store, &custom).unwrap();
        assert_eq!(load_categories(&store).unwrap(), custom);
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let mut store = MemoryStore::new();
        store.set(TASKS_KEY, "[{not json").unwrap();
        let err = load_tasks(&store).unwrap_err();
        assert!(matches!(err, TaskflowError::StorageParse { ref key, .. } if key == TASKS_KEY));
    }

    #[test]
    fn file_store_persists_across_reopen() {
        let temp = tempdir().expect("tempdir");
        let tasks = sample_tasks();
        {
            let mut store = FileStore::open(temp.path()).expect("open store");
            save_tasks(&mut store, &tasks).expect("save tasks");
            save_categories(&mut store, &default_categories()).expect("save categories");
        }

        let store = FileStore::open(temp.path()).expect("reopen store");
        assert_eq!(load_tasks(&store).expect("load tasks"), tasks);
        assert_eq!(
            load_categories(&store).expect("load categories"),
            default_categories()
        );
        assert!(store.get("missing").expect("get").is_none());
    }

    #[test]
    fn broken_store_document_is_moved_aside() {
        let temp = tempdir().expect("tempdir");
        let mut store = FileStore::open(temp.path()).expect("open store");
        fs::write(&store.path, "{ not json").expect("break document");

        let err = store.get(TASKS_KEY).unwrap_err();
        assert!(matches!(err, TaskflowError::StorageParse { .. }));

        assert!(store.recover_document().expect("recover"));
        assert!(temp.path().join("taskflow.json.corrupt").exists());
        assert!(store.get(TASKS_KEY).expect("get").is_none());
        assert!(!store.recover_document().expect("second recover"));

        save_tasks(&mut store, &sample_tasks()).expect("save after recovery");
        assert_eq!(load_tasks(&store).expect("load").len(), 2);
    }
}
