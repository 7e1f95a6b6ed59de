//! Error types for pulsegrid-index.

use thiserror::Error;

/// Result type alias for index-building operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Index-builder error types.
#[derive(Error, Debug)]
pub enum Error {
    /// Data-model error (extent, scaling, alignment, header).
    #[error(transparent)]
    Core(#[from] pulsegrid_core::Error),

    /// Store-layer error.
    #[error(transparent)]
    Store(#[from] pulsegrid_io::Error),

    /// Scratch-file error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A chunk was submitted after partitioning was sealed.
    #[error("records submitted after partitioning was sealed")]
    Sealed,
}
