//! Rectangular extents and the pixel grid derived from them.

use crate::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A rectangular spatial region plus the bin size of the index built over it.
///
/// Coordinates are in whatever units the configured indexing method uses
/// (metres, degrees, scan indices). Tiles produced by the tiler are plain
/// clones of this type with tighter bounds.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Extent {
    /// Lower x bound (inclusive for membership).
    pub x_min: f64,
    /// Upper x bound (exclusive for membership).
    pub x_max: f64,
    /// Lower y bound (exclusive for membership).
    pub y_min: f64,
    /// Upper y bound (inclusive for membership).
    pub y_max: f64,
    /// Side length of one spatial bin.
    pub bin_size: f64,
}

impl Extent {
    /// Create an extent, checking the bound and bin size invariants.
    ///
    /// # Errors
    /// Returns an error if either axis is empty or `bin_size` is not positive.
    pub fn new(x_min: f64, x_max: f64, y_min: f64, y_max: f64, bin_size: f64) -> Result<Self> {
        if !(x_max > x_min) {
            return Err(Error::InvalidExtent(format!(
                "x_max ({x_max}) must be greater than x_min ({x_min})"
            )));
        }
        if !(y_max > y_min) {
            return Err(Error::InvalidExtent(format!(
                "y_max ({y_max}) must be greater than y_min ({y_min})"
            )));
        }
        if !(bin_size > 0.0) {
            return Err(Error::InvalidExtent(format!(
                "bin_size ({bin_size}) must be positive"
            )));
        }
        Ok(Self {
            x_min,
            x_max,
            y_min,
            y_max,
            bin_size,
        })
    }

    /// Width of the extent along x.
    #[must_use]
    pub fn x_range(&self) -> f64 {
        self.x_max - self.x_min
    }

    /// Height of the extent along y.
    #[must_use]
    pub fn y_range(&self) -> f64 {
        self.y_max - self.y_min
    }

    /// Number of bins along x, rounded up to cover the full range.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn bins_x(&self) -> u64 {
        (self.x_range() / self.bin_size).ceil() as u64
    }

    /// Number of bins along y, rounded up to cover the full range.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn bins_y(&self) -> u64 {
        (self.y_range() / self.bin_size).ceil() as u64
    }

    /// Membership test used for tile assignment.
    ///
    /// The rule is `x in [x_min, x_max)` and `y in (y_min, y_max]`. The
    /// asymmetry between the axes is a contract: adjacent tiles built from
    /// this rule partition the plane with no gaps and no double assignment.
    #[must_use]
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x_min && x < self.x_max && y > self.y_min && y <= self.y_max
    }
}

/// Pixel grid definition assigned to the output store before merging.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PixelGrid {
    /// Lower x bound.
    pub x_min: f64,
    /// Upper x bound.
    pub x_max: f64,
    /// Lower y bound.
    pub y_min: f64,
    /// Upper y bound.
    pub y_max: f64,
    /// Bin resolution along x.
    pub x_res: f64,
    /// Bin resolution along y.
    pub y_res: f64,
    /// Spatial reference the grid is expressed in.
    pub projection: String,
}

impl PixelGrid {
    /// Build a grid definition from a global extent and a projection string.
    #[must_use]
    pub fn from_extent(extent: &Extent, projection: &str) -> Self {
        Self {
            x_min: extent.x_min,
            x_max: extent.x_max,
            y_min: extent.y_min,
            y_max: extent.y_max,
            x_res: extent.bin_size,
            y_res: extent.bin_size,
            projection: projection.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extent_invariants() {
        assert!(Extent::new(0.0, 10.0, 0.0, 10.0, 1.0).is_ok());
        assert!(Extent::new(10.0, 0.0, 0.0, 10.0, 1.0).is_err());
        assert!(Extent::new(0.0, 10.0, 10.0, 10.0, 1.0).is_err());
        assert!(Extent::new(0.0, 10.0, 0.0, 10.0, 0.0).is_err());
        assert!(Extent::new(0.0, 10.0, 0.0, 10.0, -1.0).is_err());
    }

    #[test]
    fn test_bin_counts_round_up() {
        let extent = Extent::new(0.0, 10.5, 0.0, 9.0, 1.0).unwrap();
        assert_eq!(extent.bins_x(), 11);
        assert_eq!(extent.bins_y(), 9);
    }

    #[test]
    fn test_membership_rule_half_open() {
        let extent = Extent::new(0.0, 50.0, 50.0, 100.0, 1.0).unwrap();
        // lower-x inclusive, upper-x exclusive
        assert!(extent.contains(0.0, 60.0));
        assert!(!extent.contains(50.0, 60.0));
        // lower-y exclusive, upper-y inclusive
        assert!(!extent.contains(10.0, 50.0));
        assert!(extent.contains(10.0, 100.0));
        // seam pulse just inside both half-open edges
        assert!(extent.contains(49.9, 50.1));
    }

    #[test]
    fn test_pixel_grid_from_extent() {
        let extent = Extent::new(0.0, 100.0, 0.0, 50.0, 2.0).unwrap();
        let grid = PixelGrid::from_extent(&extent, "WKT");
        assert_eq!(grid.x_res, 2.0);
        assert_eq!(grid.y_res, 2.0);
        assert_eq!(grid.projection, "WKT");
        assert_eq!(grid.x_min, 0.0);
        assert_eq!(grid.y_max, 50.0);
    }
}
