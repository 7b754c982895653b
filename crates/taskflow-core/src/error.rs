use thiserror::Error;

#[derive(Debug, Error)]
pub enum TaskflowError {
    #[error("invalid task: {0}")]
    Validation(String),

    #[error("task not found: {0}")]
    NotFound(String),

    #[error("task id prefix is ambiguous: {0}")]
    AmbiguousId(String),

    #[error("invalid deadline {0:?}: expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("stored value under {key} is not valid JSON")]
    StorageParse {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed reading {key} from storage: {message}")]
    StorageRead { key: String, message: String },

    #[error("failed writing {key} to storage: {message}")]
    StorageWrite { key: String, message: String },

    #[error("failed to serialize value")]
    Serialize(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TaskflowError>;
