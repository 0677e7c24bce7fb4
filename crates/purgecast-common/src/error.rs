use thiserror::Error;

/// Errors produced by the purgecast crates.
#[derive(Error, Debug)]
pub enum PurgecastError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    /// No client has been installed for the named cache. Jobs hitting this
    /// surface as a 500 entry in the response map.
    #[error("No cache client available for {0}")]
    NoClient(String),
}

impl From<serde_json::Error> for PurgecastError {
    fn from(err: serde_json::Error) -> Self {
        PurgecastError::Config(err.to_string())
    }
}

impl From<ini::Error> for PurgecastError {
    fn from(err: ini::Error) -> Self {
        PurgecastError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PurgecastError>;
