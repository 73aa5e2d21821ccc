use thiserror::Error;

#[derive(Error, Debug, Eq, PartialEq)]
pub enum CounterError {
    #[error("counter store is unavailable: {reason}")]
    StoreUnavailable { reason: String },

    #[error("counter record is missing or malformed: {reason}")]
    RecordMissingOrMalformed { reason: String },

    #[error("failed to serialize response: {reason}")]
    SerializationFailure { reason: String },
}

#[derive(Error, Debug)]
pub enum StorageError {
    /// Store could not be reached or refused the operation.
    #[error("storage unavailable: {reason}")]
    Unavailable { reason: String },

    /// Something is broken inside the storage implementation itself.
    #[error("internal storage error: {reason}")]
    InternalError { reason: String },

    #[error("storage is misconfigured: {reason}")]
    Misconfigured { reason: String },

    /// Stored attribute is not an integer the store can add to, or the add would overflow it.
    /// The update was not applied.
    #[error("stored value is malformed: {reason}")]
    MalformedValue { reason: String },
}

impl From<StorageError> for CounterError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::MalformedValue { .. } => Self::RecordMissingOrMalformed { reason: err.to_string() },
            other => Self::StoreUnavailable { reason: other.to_string() },
        }
    }
}

impl From<redis::RedisError> for StorageError {
    fn from(err: redis::RedisError) -> Self {
        let malformed = match err.kind() {
            redis::ErrorKind::TypeError => true,
            // "ERR hash value is not an integer", "ERR increment or decrement would overflow"
            redis::ErrorKind::ResponseError => err.detail()
                .is_some_and(|detail| detail.contains("not an integer") || detail.contains("overflow")),
            redis::ErrorKind::ExtensionError => err.code() == Some("WRONGTYPE"),
            _ => false,
        };

        if malformed {
            Self::MalformedValue { reason: format!("redis rejected the update: {err}") }
        } else {
            Self::Unavailable { reason: format!("redis command failed: {err}") }
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0:?}")]
    FailedToRead(std::io::Error),

    #[error("failed to parse config: {reason}")]
    FailedToParse { reason: String },

    #[error("invalid configuration: {reason}")]
    Invalid { reason: String },
}
