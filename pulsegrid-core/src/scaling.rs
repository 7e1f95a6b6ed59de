//! Fixed-point quantization (gain/offset) parameters and propagation rules.
//!
//! Stores hold real-valued fields as integers via
//! `stored = round((value - offset) * gain)`. The rule table below is the
//! single source of truth for which fields carry scaling and how the
//! parameters move from a source store to a destination store.

use std::collections::HashMap;

use crate::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Field name constants shared by stores and the index builder.
pub mod fields {
    /// Pulse tiling key, x axis.
    pub const X_IDX: &str = "X_IDX";
    /// Pulse tiling key, y axis.
    pub const Y_IDX: &str = "Y_IDX";
    /// Pulse origin, x.
    pub const X_ORIGIN: &str = "X_ORIGIN";
    /// Pulse origin, y.
    pub const Y_ORIGIN: &str = "Y_ORIGIN";
    /// Pulse origin, z.
    pub const Z_ORIGIN: &str = "Z_ORIGIN";
    /// Pulse origin height.
    pub const H_ORIGIN: &str = "H_ORIGIN";
    /// Pulse azimuth angle.
    pub const AZIMUTH: &str = "AZIMUTH";
    /// Pulse zenith angle.
    pub const ZENITH: &str = "ZENITH";
    /// Scan line number (unscaled integer).
    pub const SCANLINE: &str = "SCANLINE";
    /// Position along the scan line (unscaled integer).
    pub const SCANLINE_IDX: &str = "SCANLINE_IDX";
    /// Point position, x.
    pub const X: &str = "X";
    /// Point position, y.
    pub const Y: &str = "Y";
    /// Point position, z.
    pub const Z: &str = "Z";
    /// Point height above ground.
    pub const HEIGHT: &str = "HEIGHT";
    /// Point classification (unscaled integer).
    pub const CLASSIFICATION: &str = "CLASSIFICATION";
    /// Waveform start range.
    pub const RANGE_TO_WAVEFORM_START: &str = "RANGE_TO_WAVEFORM_START";
}

/// Which family of parallel arrays a field belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ArrayKind {
    /// Pulse-level fields.
    Pulses,
    /// Point-level fields.
    Points,
    /// Waveform-info fields.
    Waveforms,
}

/// A gain/offset pair mapping real values to stored integers.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Scaling {
    /// Multiplier applied after subtracting the offset.
    pub gain: f64,
    /// Value that maps to stored integer zero.
    pub offset: f64,
}

impl Default for Scaling {
    fn default() -> Self {
        Self {
            gain: 1.0,
            offset: 0.0,
        }
    }
}

impl Scaling {
    /// Quantize one value, checking the destination integer range.
    ///
    /// # Errors
    /// Returns an error if the scaled value is negative or exceeds `max_int`.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    #[allow(clippy::cast_precision_loss)]
    pub fn encode(&self, field: &str, value: f64, max_int: u64) -> Result<u64> {
        let scaled = (value - self.offset) * self.gain;
        if scaled < 0.0 {
            return Err(Error::ScalingDomain {
                field: field.to_string(),
                value,
                gain: self.gain,
                offset: self.offset,
            });
        }
        let stored = scaled.round();
        if stored > max_int as f64 {
            return Err(Error::ScalingOverflow {
                field: field.to_string(),
                value,
                gain: self.gain,
                offset: self.offset,
                max_int,
            });
        }
        Ok(stored as u64)
    }

    /// Recover the real value for a stored integer.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn decode(&self, stored: u64) -> f64 {
        stored as f64 / self.gain + self.offset
    }

    /// Derive a gain covering `range` with the full width of the destination
    /// integer field, anchored at `offset`.
    ///
    /// # Errors
    /// Returns an error if `range` is not positive.
    #[allow(clippy::cast_precision_loss)]
    pub fn for_range(field: &str, range: f64, offset: f64, max_int: u64) -> Result<Self> {
        if !(range > 0.0) {
            return Err(Error::EmptyScalingRange {
                field: field.to_string(),
                range,
            });
        }
        Ok(Self {
            gain: max_int as f64 / range,
            offset,
        })
    }
}

/// Per-field scaling parameter table for one store.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ScalingSpec {
    entries: HashMap<(ArrayKind, String), Scaling>,
}

impl ScalingSpec {
    /// Create an empty spec.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Spec carrying the source-format default gains and offsets.
    ///
    /// Coordinate and angle fields use gain 100; `Z`/`HEIGHT` carry a -100
    /// offset so below-datum values stay representable.
    #[must_use]
    pub fn source_defaults() -> Self {
        let mut spec = Self::new();
        for field in [
            fields::X_IDX,
            fields::Y_IDX,
            fields::X_ORIGIN,
            fields::Y_ORIGIN,
            fields::Z_ORIGIN,
            fields::AZIMUTH,
            fields::ZENITH,
        ] {
            spec.set(
                ArrayKind::Pulses,
                field,
                Scaling {
                    gain: 100.0,
                    offset: 0.0,
                },
            );
        }
        for field in [fields::X, fields::Y] {
            spec.set(
                ArrayKind::Points,
                field,
                Scaling {
                    gain: 100.0,
                    offset: 0.0,
                },
            );
        }
        for field in [fields::Z, fields::HEIGHT] {
            spec.set(
                ArrayKind::Points,
                field,
                Scaling {
                    gain: 100.0,
                    offset: -100.0,
                },
            );
        }
        spec.set(
            ArrayKind::Waveforms,
            fields::RANGE_TO_WAVEFORM_START,
            Scaling {
                gain: 100.0,
                offset: 0.0,
            },
        );
        spec
    }

    /// Set the scaling for one field.
    pub fn set(&mut self, kind: ArrayKind, field: &str, scaling: Scaling) {
        self.entries.insert((kind, field.to_string()), scaling);
    }

    /// Look up the scaling for one field.
    #[must_use]
    pub fn get(&self, kind: ArrayKind, field: &str) -> Option<Scaling> {
        self.entries.get(&(kind, field.to_string())).copied()
    }

    /// Scaling for one field, or the identity scaling when unset.
    #[must_use]
    pub fn get_or_default(&self, kind: ArrayKind, field: &str) -> Scaling {
        self.get(kind, field).unwrap_or_default()
    }

    /// Number of entries in the spec.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when no scaling has been set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// How a field's scaling parameters move from source to destination.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScalingMode {
    /// Transfer the source's (gain, offset) verbatim; skip absent fields.
    Copy,
    /// Re-derive the gain from a known value range and the destination's
    /// integer width. Used for the tiling-key fields so their scaling covers
    /// the global extent rather than a tile-local one.
    DeriveRange,
}

/// One entry of the declarative scaling propagation table.
#[derive(Clone, Copy, Debug)]
pub struct ScalingRule {
    /// Field the rule applies to.
    pub field: &'static str,
    /// Array family the field belongs to.
    pub kind: ArrayKind,
    /// Propagation mode.
    pub mode: ScalingMode,
}

/// The fixed set of fields whose scaling is propagated between stores.
pub const SCALING_RULES: &[ScalingRule] = &[
    ScalingRule {
        field: fields::X_IDX,
        kind: ArrayKind::Pulses,
        mode: ScalingMode::DeriveRange,
    },
    ScalingRule {
        field: fields::Y_IDX,
        kind: ArrayKind::Pulses,
        mode: ScalingMode::DeriveRange,
    },
    ScalingRule {
        field: fields::X_ORIGIN,
        kind: ArrayKind::Pulses,
        mode: ScalingMode::Copy,
    },
    ScalingRule {
        field: fields::Y_ORIGIN,
        kind: ArrayKind::Pulses,
        mode: ScalingMode::Copy,
    },
    ScalingRule {
        field: fields::Z_ORIGIN,
        kind: ArrayKind::Pulses,
        mode: ScalingMode::Copy,
    },
    ScalingRule {
        field: fields::H_ORIGIN,
        kind: ArrayKind::Pulses,
        mode: ScalingMode::Copy,
    },
    ScalingRule {
        field: fields::AZIMUTH,
        kind: ArrayKind::Pulses,
        mode: ScalingMode::Copy,
    },
    ScalingRule {
        field: fields::ZENITH,
        kind: ArrayKind::Pulses,
        mode: ScalingMode::Copy,
    },
    ScalingRule {
        field: fields::X,
        kind: ArrayKind::Points,
        mode: ScalingMode::Copy,
    },
    ScalingRule {
        field: fields::Y,
        kind: ArrayKind::Points,
        mode: ScalingMode::Copy,
    },
    ScalingRule {
        field: fields::Z,
        kind: ArrayKind::Points,
        mode: ScalingMode::Copy,
    },
    ScalingRule {
        field: fields::HEIGHT,
        kind: ArrayKind::Points,
        mode: ScalingMode::Copy,
    },
    ScalingRule {
        field: fields::RANGE_TO_WAVEFORM_START,
        kind: ArrayKind::Waveforms,
        mode: ScalingMode::Copy,
    },
];

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_encode_decode_roundtrip() {
        let scaling = Scaling {
            gain: 100.0,
            offset: -100.0,
        };
        let stored = scaling.encode(fields::Z, 12.345, u64::from(u32::MAX)).unwrap();
        assert_relative_eq!(scaling.decode(stored), 12.345, epsilon = 0.01);
    }

    #[test]
    fn test_encode_rejects_negative() {
        let scaling = Scaling {
            gain: 100.0,
            offset: 0.0,
        };
        let err = scaling
            .encode(fields::Z, -0.5, u64::from(u32::MAX))
            .unwrap_err();
        assert!(matches!(err, Error::ScalingDomain { .. }));
    }

    #[test]
    fn test_encode_rejects_overflow() {
        let scaling = Scaling {
            gain: 1000.0,
            offset: 0.0,
        };
        let err = scaling.encode(fields::X, 300.0, 65_535).unwrap_err();
        assert!(matches!(err, Error::ScalingOverflow { .. }));
    }

    #[test]
    fn test_for_range_covers_full_width() {
        let max_int = u64::from(u32::MAX);
        let scaling = Scaling::for_range(fields::X_IDX, 100.0, 0.0, max_int).unwrap();
        // both ends of the range stay representable
        assert_eq!(scaling.encode(fields::X_IDX, 0.0, max_int).unwrap(), 0);
        assert_eq!(
            scaling.encode(fields::X_IDX, 100.0, max_int).unwrap(),
            max_int
        );
    }

    #[test]
    fn test_for_range_rejects_degenerate_range() {
        let err = Scaling::for_range(fields::X_IDX, 0.0, 0.0, u64::from(u32::MAX)).unwrap_err();
        assert!(matches!(err, Error::EmptyScalingRange { .. }));
    }

    #[test]
    fn test_spec_get_set() {
        let mut spec = ScalingSpec::new();
        assert!(spec.is_empty());
        spec.set(
            ArrayKind::Pulses,
            fields::X_IDX,
            Scaling {
                gain: 2.0,
                offset: 1.0,
            },
        );
        let got = spec.get(ArrayKind::Pulses, fields::X_IDX).unwrap();
        assert_eq!(got.gain, 2.0);
        assert_eq!(got.offset, 1.0);
        assert!(spec.get(ArrayKind::Points, fields::X_IDX).is_none());
    }

    #[test]
    fn test_rule_table_modes() {
        let derive: Vec<&str> = SCALING_RULES
            .iter()
            .filter(|r| r.mode == ScalingMode::DeriveRange)
            .map(|r| r.field)
            .collect();
        assert_eq!(derive, vec![fields::X_IDX, fields::Y_IDX]);
    }

    #[test]
    fn test_source_defaults_cover_rule_table() {
        let spec = ScalingSpec::source_defaults();
        // H_ORIGIN deliberately has no default; every other rule field does
        for rule in SCALING_RULES {
            if rule.field == fields::H_ORIGIN {
                assert!(spec.get(rule.kind, rule.field).is_none());
            } else {
                assert!(spec.get(rule.kind, rule.field).is_some(), "{}", rule.field);
            }
        }
    }
}
