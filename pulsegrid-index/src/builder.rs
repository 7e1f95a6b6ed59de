//! End-to-end orchestration of the two-phase build.

use std::path::{Path, PathBuf};

use pulsegrid_core::{
    Extent, IndexHeader, IndexMethod, RecordChunk, ScalingSpec, SourceHeader,
    DEFAULT_SPATIAL_REFERENCE,
};
use pulsegrid_io::StoreDriver;

use crate::merge::index_and_merge;
use crate::partition::Partitioner;
use crate::progress::Progress;
use crate::tiler::{derive_block_size, tile_extents};
use crate::tiles::TileSet;
use crate::Result;

/// Build configuration.
#[derive(Clone, Debug)]
pub struct GridIndexConfig {
    /// Indexing method supplying the tiling key.
    pub method: IndexMethod,
    /// Explicit global extent. When set, it wins over the source header
    /// bounds and its bin size overrides `bin_size`.
    pub extent: Option<Extent>,
    /// Bin size used when the extent comes from the source header.
    pub bin_size: f64,
    /// Explicit tile block size; derived from the extent when unset.
    pub block_size: Option<f64>,
    /// Projection of the output. Falls back to the source header, then to
    /// the default spatial reference.
    pub projection: Option<String>,
    /// Directory scratch tiles are created in.
    pub temp_dir: PathBuf,
}

impl GridIndexConfig {
    /// Config with defaults: no explicit extent, block size or projection,
    /// scratch in the system temp directory.
    #[must_use]
    pub fn new(method: IndexMethod, bin_size: f64) -> Self {
        Self {
            method,
            extent: None,
            bin_size,
            block_size: None,
            projection: None,
            temp_dir: std::env::temp_dir(),
        }
    }

    /// Use an explicit global extent.
    #[must_use]
    pub fn with_extent(mut self, extent: Extent) -> Self {
        self.extent = Some(extent);
        self
    }

    /// Use an explicit tile block size.
    #[must_use]
    pub fn with_block_size(mut self, block_size: f64) -> Self {
        self.block_size = Some(block_size);
        self
    }

    /// Use an explicit output projection.
    #[must_use]
    pub fn with_projection(mut self, projection: impl Into<String>) -> Self {
        self.projection = Some(projection.into());
        self
    }

    /// Create scratch tiles under `temp_dir` instead of the system default.
    #[must_use]
    pub fn with_temp_dir(mut self, temp_dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = temp_dir.into();
        self
    }
}

/// Builds a grid spatial index over a stream of record chunks.
pub struct GridIndexBuilder<'a, D: StoreDriver> {
    driver: &'a D,
    config: GridIndexConfig,
}

impl<'a, D: StoreDriver> GridIndexBuilder<'a, D> {
    /// Create a builder producing stores through `driver`.
    pub fn new(driver: &'a D, config: GridIndexConfig) -> Self {
        Self { driver, config }
    }

    /// Run the full build: partition `chunks` into scratch tiles, then
    /// merge them in tiler order into a new store at `output_path`.
    ///
    /// Returns the header written to the output. Scratch tiles are removed
    /// on every exit path, including errors.
    ///
    /// # Errors
    /// Returns an error on an unsupported method, an unresolvable extent,
    /// a scaling failure, or any store failure. Partition-phase errors
    /// abort the whole build.
    pub fn build<I>(
        &self,
        source_header: &SourceHeader,
        source_scaling: &ScalingSpec,
        chunks: I,
        output_path: &Path,
        progress: &mut dyn Progress,
    ) -> Result<IndexHeader>
    where
        I: IntoIterator<Item = RecordChunk>,
    {
        let extent = self.resolve_extent(source_header)?;
        let projection = self.resolve_projection(source_header);
        let block_size = self
            .config
            .block_size
            .unwrap_or_else(|| derive_block_size(&extent));
        let tile_bounds = tile_extents(&extent, block_size)?;

        let mut tiles = TileSet::create(self.driver, tile_bounds, &self.config.temp_dir)?;

        progress.reset();
        progress.set_label_text("Splitting into blocks...");
        let mut partitioner = Partitioner::new(
            self.config.method,
            extent.clone(),
            source_scaling.clone(),
        )?;
        for chunk in chunks {
            partitioner.process_chunk(&mut tiles, &chunk)?;
        }
        partitioner.seal();

        tiles.reopen_read()?;

        // totals come from what actually landed in the tiles, not from the
        // source header
        let number_of_pulses = tiles.tiles().iter().map(|t| t.pulse_count()).sum();
        let number_of_points = tiles.tiles().iter().map(|t| t.point_count()).sum();

        let header = IndexHeader {
            index_tlx: extent.x_min,
            index_tly: extent.y_max,
            number_bins_x: extent.bins_x(),
            number_bins_y: extent.bins_y(),
            index_type: self.config.method.tag(),
            bin_size: extent.bin_size,
            spatial_reference: projection.clone(),
            number_of_pulses,
            number_of_points,
        };

        let mut output = self.driver.create(output_path)?;
        index_and_merge(
            &mut tiles,
            &extent,
            &projection,
            &header,
            output.as_mut(),
            progress,
        )?;
        output.close()?;
        Ok(header)
    }

    fn resolve_extent(&self, source_header: &SourceHeader) -> Result<Extent> {
        if let Some(extent) = &self.config.extent {
            return Ok(extent.clone());
        }
        let (x_min, x_max, y_min, y_max) = source_header.bounds(self.config.method)?;
        Ok(Extent::new(
            x_min,
            x_max,
            y_min,
            y_max,
            self.config.bin_size,
        )?)
    }

    fn resolve_projection(&self, source_header: &SourceHeader) -> String {
        self.config
            .projection
            .clone()
            .or_else(|| source_header.spatial_reference.clone())
            .unwrap_or_else(|| DEFAULT_SPATIAL_REFERENCE.to_string())
    }
}
