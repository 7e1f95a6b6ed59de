//! Decomposition of a global extent into rectangular tiles.

use pulsegrid_core::{Error as CoreError, Extent};

use crate::Result;

/// How many blocks the shorter axis is split into when no block size is
/// given.
pub const BLOCKSIZE_N_BLOCKS: f64 = 2.0;

/// Upper bound on an auto-derived block size, in extent units.
const MAX_BLOCK_SIZE: f64 = 200.0;

/// Choose a block size for `extent`: the shorter axis divided by
/// [`BLOCKSIZE_N_BLOCKS`], capped at 200 units and rounded up to a whole
/// number of bins so tile edges stay bin-aligned.
#[must_use]
pub fn derive_block_size(extent: &Extent) -> f64 {
    let shorter = extent.x_range().min(extent.y_range());
    let block = (shorter / BLOCKSIZE_N_BLOCKS).min(MAX_BLOCK_SIZE);
    (block / extent.bin_size).ceil() * extent.bin_size
}

/// Tile `extent` into blocks of `block_size`, row-major from the top-left
/// corner: left to right, then down.
///
/// Tiles in the rightmost column may overhang `x_max`; the partitioner
/// masks against the global extent so out-of-extent coordinates never land
/// in them. The bottom row is
/// clamped to the extent's `y_min` instead of overhanging, so the rows
/// partition the y range exactly.
///
/// # Errors
/// Returns an error if `block_size` is not positive.
pub fn tile_extents(extent: &Extent, block_size: f64) -> Result<Vec<Extent>> {
    if !(block_size > 0.0) {
        return Err(CoreError::InvalidExtent(format!(
            "block_size ({block_size}) must be positive"
        ))
        .into());
    }

    let mut tiles = Vec::new();
    let mut y_max = extent.y_max;
    while y_max > extent.y_min {
        let y_min = (y_max - block_size).max(extent.y_min);
        let mut x_min = extent.x_min;
        while x_min < extent.x_max {
            tiles.push(Extent::new(
                x_min,
                x_min + block_size,
                y_min,
                y_max,
                extent.bin_size,
            )?);
            x_min += block_size;
        }
        y_max -= block_size;
    }
    Ok(tiles)
}
