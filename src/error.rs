//! Error types for the marker icon subsystem
//!
//! The registry and its entries are total; errors only surface on the
//! decode path driven by [`crate::loader`].

use std::io;
use thiserror::Error;

/// Result type for icon operations
pub type Result<T> = std::result::Result<T, IconError>;

/// Errors that can occur while resolving a marker icon
#[derive(Error, Debug)]
pub enum IconError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Image decoding error
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// The decoder cannot handle this kind of source
    #[error("Unsupported icon source: {0}")]
    UnsupportedSource(String),

    /// The decoder ran but produced no usable icon
    #[error("Icon decode failed: {0}")]
    Decode(String),

    /// Async runtime error
    #[error("Async runtime error: {0}")]
    RuntimeError(String),
}

impl From<tokio::task::JoinError> for IconError {
    fn from(err: tokio::task::JoinError) -> Self {
        IconError::RuntimeError(err.to_string())
    }
}
