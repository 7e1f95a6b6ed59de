//! Error types for pulsegrid-io.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Store-layer error types.
#[derive(Error, Debug)]
pub enum Error {
    /// Data-model error (scaling domain, misaligned chunk, ...).
    #[error(transparent)]
    Core(#[from] pulsegrid_core::Error),

    /// Underlying filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No store exists at the given path.
    #[error("no store at {0}")]
    StoreNotFound(PathBuf),

    /// Write attempted on a store opened read-only.
    #[error("store {0} is open read-only")]
    ReadOnly(PathBuf),

    /// Read attempted on a store still open for writing.
    #[error("store {0} is open for writing")]
    WriteOnly(PathBuf),

    /// Operation attempted after the store was closed.
    #[error("store {0} is closed")]
    Closed(PathBuf),

    /// Chunk content conflicts with data already in the store.
    #[error("invalid chunk: {0}")]
    InvalidChunk(String),

    /// Store content violates the expected layout.
    #[error("invalid store data: {0}")]
    InvalidFormat(String),

    /// HDF5 library error.
    #[cfg(feature = "hdf5")]
    #[error("HDF5 error: {0}")]
    Hdf5(#[from] hdf5::Error),
}
