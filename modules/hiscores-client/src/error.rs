use thiserror::Error;

pub type Result<T> = std::result::Result<T, HiscoresError>;

#[derive(Debug, Error)]
pub enum HiscoresError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Player not found on hiscores: {0}")]
    NotFound(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for HiscoresError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            HiscoresError::Parse(err.to_string())
        } else {
            HiscoresError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for HiscoresError {
    fn from(err: serde_json::Error) -> Self {
        HiscoresError::Parse(err.to_string())
    }
}
