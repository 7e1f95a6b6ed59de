//! The split phase: routing record chunks into scratch tiles.

use rayon::prelude::*;

use pulsegrid_core::{Error as CoreError, Extent, IndexMethod, RecordChunk, ScalingSpec};
use pulsegrid_io::StoreDriver;

use crate::scaling::{copy_scaling, derive_key_scaling};
use crate::tiles::TileSet;
use crate::{Error, Result};

/// Which pulse columns supply the tiling key. Only the buildable methods
/// appear here; the constructor rejects the rest.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum KeySource {
    Cartesian,
    Spherical,
    Scan,
}

/// Scaling-initialization state of the split phase.
///
/// The tables are written once, on the first non-empty chunk; afterwards
/// they are read-only until the partitioner is sealed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum InitState {
    NotStarted,
    Initialized,
    Done,
}

/// Routes chunks into the tile whose extent contains their tiling key.
///
/// Chunks may arrive in any order. Records outside the global extent are
/// dropped; records inside it land in exactly one tile.
#[derive(Debug)]
pub struct Partitioner {
    keys: KeySource,
    global: Extent,
    source_scaling: ScalingSpec,
    state: InitState,
}

impl Partitioner {
    /// Create a partitioner for one indexing method over `global`.
    ///
    /// # Errors
    /// Returns an error for indexing methods no grid index can be built for.
    pub fn new(
        method: IndexMethod,
        global: Extent,
        source_scaling: ScalingSpec,
    ) -> Result<Self> {
        let keys = match method {
            IndexMethod::Cartesian => KeySource::Cartesian,
            IndexMethod::Spherical => KeySource::Spherical,
            IndexMethod::Scan => KeySource::Scan,
            IndexMethod::Cylindrical | IndexMethod::Polar => {
                return Err(
                    CoreError::UnsupportedIndexMethod(method.name().to_string()).into(),
                );
            }
        };
        Ok(Self {
            keys,
            global,
            source_scaling,
            state: InitState::NotStarted,
        })
    }

    /// Route one chunk into the tiles.
    ///
    /// The first non-empty chunk triggers the one-time scaling setup on
    /// every tile store: copy-mode propagation of the source tables, then
    /// derive-mode re-scaling of the key fields against the global extent.
    ///
    /// # Errors
    /// Returns an error on misalignment, a scaling failure, a store write
    /// failure, or when called after [`Partitioner::seal`].
    pub fn process_chunk<D: StoreDriver>(
        &mut self,
        tiles: &mut TileSet<'_, D>,
        chunk: &RecordChunk,
    ) -> Result<()> {
        if self.state == InitState::Done {
            return Err(Error::Sealed);
        }
        chunk.validate_alignment().map_err(Error::Core)?;
        if chunk.is_empty() {
            return Ok(());
        }

        if self.state == InitState::NotStarted {
            for tile in tiles.tiles_mut() {
                copy_scaling(&self.source_scaling, tile.store.as_mut())?;
                derive_key_scaling(tile.store.as_mut(), &self.global)?;
            }
            self.state = InitState::Initialized;
        }

        let (key_x, key_y) = self.extract_keys(chunk);
        let extents: Vec<Extent> = tiles.tiles().iter().map(|t| t.extent.clone()).collect();
        // overhanging edge tiles reach past the global bounds, so tile
        // membership alone would admit out-of-extent records
        let global = &self.global;
        let masks: Vec<Vec<bool>> = extents
            .par_iter()
            .map(|extent| {
                key_x
                    .iter()
                    .zip(&key_y)
                    .map(|(&x, &y)| global.contains(x, y) && extent.contains(x, y))
                    .collect()
            })
            .collect();

        for (tile, mask) in tiles.tiles_mut().iter_mut().zip(&masks) {
            if !mask.iter().any(|&m| m) {
                continue;
            }
            let mut sub = chunk.filter(mask)?;
            // the index fields carry the tiling key in the output, whatever
            // columns it came from
            sub.pulses.x_idx = gather(&key_x, mask);
            sub.pulses.y_idx = gather(&key_y, mask);
            tile.store.append(&sub)?;
        }
        Ok(())
    }

    /// End the split phase; further chunks are rejected.
    pub fn seal(&mut self) {
        self.state = InitState::Done;
    }

    fn extract_keys(&self, chunk: &RecordChunk) -> (Vec<f64>, Vec<f64>) {
        let p = &chunk.pulses;
        match self.keys {
            KeySource::Cartesian => (p.x_idx.clone(), p.y_idx.clone()),
            KeySource::Spherical => (p.azimuth.clone(), p.zenith.clone()),
            KeySource::Scan => (
                p.scanline_idx.iter().map(|&v| f64::from(v)).collect(),
                p.scanline.iter().map(|&v| f64::from(v)).collect(),
            ),
        }
    }
}

fn gather(values: &[f64], mask: &[bool]) -> Vec<f64> {
    values
        .iter()
        .zip(mask)
        .filter(|&(_, &m)| m)
        .map(|(&v, _)| v)
        .collect()
}
