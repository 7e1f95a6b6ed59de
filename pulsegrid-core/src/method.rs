//! Spatial indexing method selection.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Which pair of pulse fields supplies the tiling key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum IndexMethod {
    /// Horizontal position (`X_IDX`/`Y_IDX`).
    Cartesian,
    /// Azimuth/zenith angles.
    Spherical,
    /// Cylindrical coordinates. Declared by the format but not buildable.
    Cylindrical,
    /// Polar coordinates. Declared by the format but not buildable.
    Polar,
    /// Scan-line position (`SCANLINE_IDX`/`SCANLINE`).
    Scan,
}

impl IndexMethod {
    /// Numeric tag recorded in the output header.
    #[must_use]
    pub fn tag(self) -> u16 {
        match self {
            Self::Cartesian => 1,
            Self::Spherical => 2,
            Self::Cylindrical => 3,
            Self::Polar => 4,
            Self::Scan => 5,
        }
    }

    /// Name used in error messages.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Cartesian => "cartesian",
            Self::Spherical => "spherical",
            Self::Cylindrical => "cylindrical",
            Self::Polar => "polar",
            Self::Scan => "scan",
        }
    }
}
