use thiserror::Error;

#[derive(Error, Debug)]
pub enum StatwatchError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid entity id: {0:?}")]
    InvalidEntityId(String),

    #[error("Unknown category: {0}")]
    UnknownCategory(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
