pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced to the caller of a stage.
///
/// Per-walk and per-community problems are not errors: they are counted in
/// [`crate::simulator::WalkStats`] or recorded on the
/// [`crate::gatekeeper::GatekeeperSet`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No nodes remain after isolated-node and component filtering.
    #[error("graph is empty after filtering")]
    EmptyGraph,

    /// A configuration value is out of range.
    #[error("invalid parameter '{name}': {message}")]
    InvalidParameter {
        name: &'static str,
        message: String,
    },

    /// Two matrices (or a matrix and a partition) disagree on size.
    #[error("dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch {
        expected: usize,
        found: usize,
    },

    #[error("thread pool: {0}")]
    ThreadPool(String),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn invalid(name: &'static str, message: impl Into<String>) -> Self {
        Error::InvalidParameter {
            name,
            message: message.into(),
        }
    }
}
