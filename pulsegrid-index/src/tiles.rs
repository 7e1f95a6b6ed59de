//! Scratch-tile lifecycle.
//!
//! A [`TileSet`] owns one scratch store per tile extent for the duration of
//! a build. Its `Drop` impl closes and removes every scratch store, so
//! partial builds that bail out with an error leave nothing behind.

use std::path::{Path, PathBuf};

use pulsegrid_core::Extent;
use pulsegrid_io::{PulseStore, StoreDriver};

use crate::{Error, Result};

/// One tile: its extent and the scratch store holding its records.
pub struct Tile {
    /// Region of the global extent this tile covers.
    pub extent: Extent,
    /// Scratch store location.
    pub path: PathBuf,
    pub(crate) store: Box<dyn PulseStore>,
}

impl Tile {
    /// Pulses currently held in the tile's scratch store.
    #[must_use]
    pub fn pulse_count(&self) -> u64 {
        self.store.total_pulse_count()
    }

    /// Points currently held in the tile's scratch store.
    #[must_use]
    pub fn point_count(&self) -> u64 {
        self.store.total_point_count()
    }
}

/// All scratch tiles of one build, in tiler (row-major) order.
pub struct TileSet<'a, D: StoreDriver> {
    driver: &'a D,
    tiles: Vec<Tile>,
}

impl<'a, D: StoreDriver> TileSet<'a, D> {
    /// Create one writable scratch store per extent under `temp_dir`.
    ///
    /// # Errors
    /// Returns an error if a scratch path or store cannot be created.
    pub fn create(driver: &'a D, extents: Vec<Extent>, temp_dir: &Path) -> Result<Self> {
        let mut tiles = Vec::with_capacity(extents.len());
        for extent in extents {
            let path = scratch_path(temp_dir)?;
            let store = driver.create(&path)?;
            tiles.push(Tile {
                extent,
                path,
                store,
            });
        }
        Ok(Self { driver, tiles })
    }

    /// Number of tiles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    /// Returns true when there are no tiles.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Tiles in tiler order.
    #[must_use]
    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    pub(crate) fn tiles_mut(&mut self) -> &mut [Tile] {
        &mut self.tiles
    }

    /// Close every scratch store and reopen it read-only for merging.
    ///
    /// # Errors
    /// Returns an error if a store fails to flush or reopen.
    pub fn reopen_read(&mut self) -> Result<()> {
        for tile in &mut self.tiles {
            tile.store.close()?;
            tile.store = self.driver.open_read(&tile.path)?;
        }
        Ok(())
    }
}

impl<D: StoreDriver> Drop for TileSet<'_, D> {
    fn drop(&mut self) {
        for tile in &mut self.tiles {
            let _ = tile.store.close();
            let _ = self.driver.remove(&tile.path);
        }
    }
}

fn scratch_path(temp_dir: &Path) -> Result<PathBuf> {
    let file = tempfile::Builder::new()
        .prefix("pulsegrid_tile_")
        .suffix(".tile")
        .tempfile_in(temp_dir)?;
    // keep the name reserved; the driver reuses the path
    let (_, path) = file.keep().map_err(|e| Error::Io(e.error))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulsegrid_io::MemoryDriver;

    fn extents() -> Vec<Extent> {
        vec![
            Extent::new(0.0, 50.0, 50.0, 100.0, 1.0).unwrap(),
            Extent::new(50.0, 100.0, 50.0, 100.0, 1.0).unwrap(),
        ]
    }

    #[test]
    fn test_create_and_drop_removes_scratch() {
        let driver = MemoryDriver::new();
        let temp = tempfile::tempdir().unwrap();
        let paths: Vec<PathBuf> = {
            let tiles = TileSet::create(&driver, extents(), temp.path()).unwrap();
            assert_eq!(tiles.len(), 2);
            tiles.tiles().iter().map(|t| t.path.clone()).collect()
        };
        for path in paths {
            assert!(!driver.exists(&path));
            assert!(!path.exists());
        }
    }

    #[test]
    fn test_reopen_read_publishes_written_data() {
        let driver = MemoryDriver::new();
        let temp = tempfile::tempdir().unwrap();
        let mut tiles = TileSet::create(&driver, extents(), temp.path()).unwrap();
        tiles.reopen_read().unwrap();
        // reopened stores are readable and empty
        for tile in tiles.tiles() {
            assert_eq!(tile.pulse_count(), 0);
            assert!(tile.store.read_all().unwrap().is_empty());
        }
    }

    #[test]
    fn test_scratch_paths_are_distinct() {
        let driver = MemoryDriver::new();
        let temp = tempfile::tempdir().unwrap();
        let tiles = TileSet::create(&driver, extents(), temp.path()).unwrap();
        assert_ne!(tiles.tiles()[0].path, tiles.tiles()[1].path);
    }
}
