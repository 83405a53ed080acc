//! Error types for the persistence layer.

use thiserror::Error;

/// Errors from the raw SurrealDB connection/schema layer.
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("database connection failed: {0}")]
    Connection(String),

    #[error("database query failed: {0}")]
    Query(String),

    #[error("schema setup failed: {0}")]
    SchemaSetup(String),
}

impl From<surrealdb::Error> for ConnectionError {
    fn from(err: surrealdb::Error) -> Self {
        ConnectionError::Query(err.to_string())
    }
}

/// Errors from the store traits (`InventoryStore`, `JobQueue`, `RunStore`, ...).
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("target not found: {0}")]
    TargetNotFound(String),

    #[error("run not found: {0}")]
    RunNotFound(String),

    #[error("run {run_id} is {status}, expected {expected}")]
    InvalidRunState {
        run_id: String,
        status: String,
        expected: String,
    },

    #[error("target {0} already has an active run")]
    ActiveRunExists(String),

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("job {job_id} is {status}, lease action requires queued/running")]
    InvalidJobState { job_id: String, status: String },

    #[error("asset not found: {0}")]
    AssetNotFound(String),

    #[error("service not found: {0}")]
    ServiceNotFound(String),

    #[error("scan not found: {0}")]
    ScanNotFound(String),

    #[error("schedule not found: {0}")]
    ScheduleNotFound(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("backend error: {0}")]
    Backend(#[from] ConnectionError),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<surrealdb::Error> for StoreError {
    fn from(err: surrealdb::Error) -> Self {
        StoreError::Backend(ConnectionError::Query(err.to_string()))
    }
}

pub type ConnResult<T> = std::result::Result<T, ConnectionError>;
pub type StoreResult<T> = std::result::Result<T, StoreError>;
