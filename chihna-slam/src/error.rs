//! Error types for chihna-slam.

use thiserror::Error;

/// Crate-wide error type.
#[derive(Error, Debug)]
pub enum MapError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Map format error: {0}")]
    Format(String),
}

pub type Result<T> = std::result::Result<T, MapError>;
