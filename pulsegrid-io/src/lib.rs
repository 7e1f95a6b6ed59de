//! pulsegrid-io: store drivers for pulse grid spatial indexing.
//!
//! The index builder talks to scratch tiles and the final output through the
//! [`PulseStore`] and [`StoreDriver`] traits. Two drivers are provided: an
//! in-memory one (always available, used heavily in tests) and an HDF5 one
//! behind the `hdf5` feature.

pub mod error;
#[cfg(feature = "hdf5")]
pub mod hdf5;
pub mod memory;
pub mod store;

pub use error::{Error, Result};
#[cfg(feature = "hdf5")]
pub use hdf5::{Hdf5Driver, Hdf5Store};
pub use memory::{MemoryDriver, MemoryStore, StoreSnapshot};
pub use store::{native_int_max_for, OpenMode, PulseStore, StoreDriver};
