//! Header metadata for source and output stores.

use crate::method::IndexMethod;
use crate::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Fallback spatial reference for indexing methods with no natural
/// projection (spherical, scan). The pixel grid requires something; GDA94 /
/// MGA zone 55 stands in until a better choice exists.
pub const DEFAULT_SPATIAL_REFERENCE: &str = concat!(
    r#"PROJCS["GDA94 / MGA zone 55",GEOGCS["GDA94",DATUM["Geocentric_Datum_of_Australia_1994","#,
    r#"SPHEROID["GRS 1980",6378137,298.257222101]],PRIMEM["Greenwich",0],"#,
    r#"UNIT["degree",0.0174532925199433]],PROJECTION["Transverse_Mercator"],"#,
    r#"PARAMETER["latitude_of_origin",0],PARAMETER["central_meridian",147],"#,
    r#"PARAMETER["scale_factor",0.9996],PARAMETER["false_easting",500000],"#,
    r#"PARAMETER["false_northing",10000000],UNIT["metre",1],AUTHORITY["EPSG","28355"]]"#
);

/// Metadata written exactly once to the spatially-indexed output store.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IndexHeader {
    /// Top-left corner, x.
    pub index_tlx: f64,
    /// Top-left corner, y.
    pub index_tly: f64,
    /// Bin count along x, `ceil(x_range / bin_size)`.
    pub number_bins_x: u64,
    /// Bin count along y, `ceil(y_range / bin_size)`.
    pub number_bins_y: u64,
    /// Indexing method tag, see [`IndexMethod::tag`].
    pub index_type: u16,
    /// Side length of one spatial bin.
    pub bin_size: f64,
    /// Spatial reference the index is expressed in.
    pub spatial_reference: String,
    /// Total pulses written to the output.
    pub number_of_pulses: u64,
    /// Total points written to the output.
    pub number_of_points: u64,
}

/// Bounding and projection metadata read from the unindexed source.
///
/// Only the fields relevant to the configured indexing method need to be
/// present; missing required fields surface as a typed error when the global
/// extent has to be derived from the header.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SourceHeader {
    /// Cartesian bounds.
    pub x_min: Option<f64>,
    /// Cartesian bounds.
    pub x_max: Option<f64>,
    /// Cartesian bounds.
    pub y_min: Option<f64>,
    /// Cartesian bounds.
    pub y_max: Option<f64>,
    /// Spherical bounds.
    pub azimuth_min: Option<f64>,
    /// Spherical bounds.
    pub azimuth_max: Option<f64>,
    /// Spherical bounds.
    pub zenith_min: Option<f64>,
    /// Spherical bounds.
    pub zenith_max: Option<f64>,
    /// Scan bounds.
    pub scanline_idx_min: Option<f64>,
    /// Scan bounds.
    pub scanline_idx_max: Option<f64>,
    /// Scan bounds.
    pub scanline_min: Option<f64>,
    /// Scan bounds.
    pub scanline_max: Option<f64>,
    /// Projection of the source data, when known.
    pub spatial_reference: Option<String>,
}

impl SourceHeader {
    /// Bounding box `(x_min, x_max, y_min, y_max)` for the given method.
    ///
    /// # Errors
    /// Returns an error for methods no grid index can be built for, or when
    /// a required bounding field is absent.
    pub fn bounds(&self, method: IndexMethod) -> Result<(f64, f64, f64, f64)> {
        match method {
            IndexMethod::Cartesian => Ok((
                require(self.x_min, "X_MIN")?,
                require(self.x_max, "X_MAX")?,
                require(self.y_min, "Y_MIN")?,
                require(self.y_max, "Y_MAX")?,
            )),
            IndexMethod::Spherical => Ok((
                require(self.azimuth_min, "AZIMUTH_MIN")?,
                require(self.azimuth_max, "AZIMUTH_MAX")?,
                require(self.zenith_min, "ZENITH_MIN")?,
                require(self.zenith_max, "ZENITH_MAX")?,
            )),
            IndexMethod::Scan => Ok((
                require(self.scanline_idx_min, "SCANLINE_IDX_MIN")?,
                require(self.scanline_idx_max, "SCANLINE_IDX_MAX")?,
                require(self.scanline_min, "SCANLINE_MIN")?,
                require(self.scanline_max, "SCANLINE_MAX")?,
            )),
            IndexMethod::Cylindrical | IndexMethod::Polar => Err(
                Error::UnsupportedIndexMethod(method.name().to_string()),
            ),
        }
    }
}

fn require(value: Option<f64>, name: &'static str) -> Result<f64> {
    value.ok_or(Error::MissingHeaderField(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_cartesian() {
        let header = SourceHeader {
            x_min: Some(0.0),
            x_max: Some(100.0),
            y_min: Some(10.0),
            y_max: Some(90.0),
            ..SourceHeader::default()
        };
        assert_eq!(
            header.bounds(IndexMethod::Cartesian).unwrap(),
            (0.0, 100.0, 10.0, 90.0)
        );
    }

    #[test]
    fn test_bounds_missing_field() {
        let header = SourceHeader {
            x_min: Some(0.0),
            x_max: Some(100.0),
            y_min: Some(10.0),
            ..SourceHeader::default()
        };
        let err = header.bounds(IndexMethod::Cartesian).unwrap_err();
        assert!(matches!(err, Error::MissingHeaderField("Y_MAX")));
    }

    #[test]
    fn test_bounds_unsupported_method() {
        let header = SourceHeader::default();
        let err = header.bounds(IndexMethod::Polar).unwrap_err();
        assert!(matches!(err, Error::UnsupportedIndexMethod(_)));
    }

    #[test]
    fn test_bounds_spherical_uses_angle_fields() {
        let header = SourceHeader {
            azimuth_min: Some(0.0),
            azimuth_max: Some(360.0),
            zenith_min: Some(0.0),
            zenith_max: Some(90.0),
            ..SourceHeader::default()
        };
        assert_eq!(
            header.bounds(IndexMethod::Spherical).unwrap(),
            (0.0, 360.0, 0.0, 90.0)
        );
    }
}
