use thiserror::Error;

/// Convenient result alias for the cold-chain planning library.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level library error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Raised when a plan request cannot start: no pending shipments or no
    /// available vehicles at snapshot time.
    #[error("precondition failed: {message}")]
    PreconditionFailure { message: String },

    /// Raised when request or fixture input fails validation.
    #[error("invalid input: {message}")]
    Validation { message: String },

    /// Raised when a referenced entity does not exist.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// Raised when an optimistic-lock check fails on a route update.
    #[error("stale route update for route {route_id}: expected version {expected}, found {found}")]
    Conflict {
        route_id: i64,
        expected: i64,
        found: i64,
    },

    /// Raised when the solve deadline expired before any solution was found.
    #[error("solver deadline expired before a first solution was found")]
    SolverTimeout,

    /// Raised when hard constraints cannot be met for the given snapshot.
    #[error("plan is infeasible: {message}")]
    Infeasible { message: String },

    /// Raised when thermal projection fails due to invalid parameters.
    #[error("thermal projection failed: {0}")]
    ThermalModel(String),

    /// Raised on unexpected failures inside the worker.
    #[error("internal error: {message}")]
    Internal { message: String },

    /// Wrapper for SQLite errors.
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    /// Wrapper for IO errors.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Wrapper for JSON (de)serialization errors on persisted blobs.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Shortcut for validation failures.
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation {
            message: message.into(),
        }
    }

    /// Shortcut for internal failures.
    pub fn internal(message: impl Into<String>) -> Self {
        Error::Internal {
            message: message.into(),
        }
    }

    /// Whether the worker should retry the task once before failing the job.
    ///
    /// Only unexpected infrastructure failures qualify; domain outcomes
    /// (infeasible, timeout, validation) are final.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Internal { .. } | Error::Sqlite(_) | Error::Io(_) | Error::Json(_)
        )
    }
}
