use thiserror::Error;

#[derive(Debug, Error)]
pub enum MrrError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("invalid scenario {bug_id}: {reason}")]
    InvalidScenario { bug_id: String, reason: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type MrrResult<T> = Result<T, MrrError>;
