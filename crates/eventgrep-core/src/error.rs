//! Error types for EventGrep Core

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// A `contains` search without a window narrow enough to scan.
    #[error("{0}")]
    UnboundedSearch(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn invalid(message: impl Into<String>) -> Self {
        Error::InvalidParameter(message.into())
    }

    /// True for every error the caller caused with bad input.
    ///
    /// `UnboundedSearch` is a specialization of an invalid parameter, so it
    /// reports true here as well.
    pub fn is_invalid_parameter(&self) -> bool {
        matches!(self, Error::InvalidParameter(_) | Error::UnboundedSearch(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
