use thiserror::Error;

#[derive(Debug, Error)]
pub enum EventsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid control message: {0}")]
    InvalidControl(String),
}

pub type Result<T> = std::result::Result<T, EventsError>;
