//! pulsegrid-index: two-phase grid spatial indexing of pulse data.
//!
//! Phase one partitions an unordered stream of record chunks into
//! rectangular scratch tiles over a global extent; phase two merges the
//! tiles in row-major order into one output store with a spatially-binned
//! layout. Fixed-point scaling of the tiling-key fields is re-derived
//! against the global extent during partitioning so the merged index
//! decodes consistently.
//!
//! [`GridIndexBuilder`] drives the whole pipeline; the phases are also
//! usable on their own through [`Partitioner`] and [`index_and_merge`].

pub mod builder;
pub mod error;
pub mod merge;
pub mod partition;
pub mod progress;
pub mod scaling;
pub mod tiler;
pub mod tiles;

pub use builder::{GridIndexBuilder, GridIndexConfig};
pub use error::{Error, Result};
pub use merge::index_and_merge;
pub use partition::Partitioner;
pub use progress::{NullProgress, Progress};
pub use scaling::{
    copy_scaling, copy_store_scaling, derive_key_scaling, set_scaling_for_coord_field,
};
pub use tiler::{derive_block_size, tile_extents, BLOCKSIZE_N_BLOCKS};
pub use tiles::{Tile, TileSet};
