//! The merge phase: draining scratch tiles into the spatially-binned output.

use pulsegrid_core::{Extent, IndexHeader, PixelGrid};
use pulsegrid_io::{PulseStore, StoreDriver};

use crate::progress::Progress;
use crate::scaling::copy_store_scaling;
use crate::tiles::TileSet;
use crate::Result;

/// Merge the reopened tiles into `output`, strictly in tiler order.
///
/// The output's pixel grid is assigned up front from the global extent.
/// Empty tiles are skipped entirely: no extent assignment, no write. The
/// first populated tile supplies the scaling tables (its key scaling is
/// already global) and triggers the single header write; if every tile is
/// empty the header is still written once, after the loop.
///
/// # Errors
/// Returns an error if a tile read or an output write fails.
pub fn index_and_merge<D: StoreDriver>(
    tiles: &mut TileSet<'_, D>,
    extent: &Extent,
    projection: &str,
    header: &IndexHeader,
    output: &mut dyn PulseStore,
    progress: &mut dyn Progress,
) -> Result<()> {
    output.set_pixel_grid(&PixelGrid::from_extent(extent, projection))?;

    progress.reset();
    progress.set_label_text("Merging...");
    progress.set_total_steps(tiles.len());

    let mut header_written = false;
    for (step, tile) in tiles.tiles_mut().iter_mut().enumerate() {
        if tile.store.total_pulse_count() > 0 {
            if !header_written {
                copy_store_scaling(tile.store.as_ref(), output)?;
                output.set_header(header)?;
                header_written = true;
            }
            output.set_extent(&tile.extent)?;
            let chunk = tile.store.read_all()?;
            output.append(&chunk)?;
        }
        progress.set_progress(step + 1);
    }
    if !header_written {
        output.set_header(header)?;
    }
    Ok(())
}
