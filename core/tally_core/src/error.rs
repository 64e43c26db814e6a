use thiserror::Error;

pub type Result<T> = std::result::Result<T, TallyError>;

#[derive(Error, Debug)]
pub enum TallyError {
    /// Idle entry time matched none of `HHhMM`, `HH:MM` or `HHMM`.
    #[error("invalid time format: {0:?}")]
    InvalidTimeFormat(String),

    /// The ledger record could not be written. In-memory state is kept for a retry.
    #[error("persistence write failure: {0}")]
    PersistenceWriteFailure(#[from] rusqlite::Error),

    #[error("backup encoding error: {0}")]
    Backup(#[from] serde_json::Error),
}

impl TallyError {
    /// Stable code used in HTTP error envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            TallyError::InvalidTimeFormat(_) => "invalid_time_format",
            TallyError::PersistenceWriteFailure(_) => "persistence_write_failure",
            TallyError::Backup(_) => "invalid_backup",
        }
    }
}
