use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unknown dataset: {0}")]
    UnknownDataset(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Fetch error: {0}")]
    Fetch(#[from] crate::network::FetchError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
