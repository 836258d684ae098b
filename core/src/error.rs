use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("message has no Message-ID header")]
    MissingMessageId,
    #[error("invalid sender address: {0}")]
    InvalidAddress(String),
    #[error("unknown mailing list: {0}")]
    UnknownList(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("thread chain corrupt for list {list}: {reason}")]
    CorruptChain { list: String, reason: String },
}

impl CoreError {
    /// Lock contention, worth retrying in a fresh transaction. Constraint
    /// failures are not: under an immediate transaction they repeat.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CoreError::Sqlite(rusqlite::Error::SqliteFailure(err, _))
                if matches!(
                    err.code,
                    rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
                )
        )
    }
}
