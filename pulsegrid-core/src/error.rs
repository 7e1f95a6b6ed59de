//! Error types for pulsegrid-core.

use crate::scaling::ArrayKind;
use thiserror::Error;

/// Result type alias for pulsegrid operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for pulsegrid operations.
#[derive(Error, Debug)]
pub enum Error {
    /// An indexing method the grid index cannot be built for.
    #[error("unsupported indexing method: {0}")]
    UnsupportedIndexMethod(String),

    /// A header field required to derive the bounding box is absent.
    #[error("header field required for bounding box not available: {0}")]
    MissingHeaderField(&'static str),

    /// A gain/offset pair would map a value to a negative stored integer.
    #[error(
        "scaling for {field} maps {value} to a negative stored integer \
         (gain {gain}, offset {offset})"
    )]
    ScalingDomain {
        /// Field the scaling belongs to.
        field: String,
        /// Offending value.
        value: f64,
        /// Gain in effect.
        gain: f64,
        /// Offset in effect.
        offset: f64,
    },

    /// A gain/offset pair would map a value beyond the integer field width.
    #[error(
        "scaling for {field} maps {value} past the representable maximum {max_int} \
         (gain {gain}, offset {offset})"
    )]
    ScalingOverflow {
        /// Field the scaling belongs to.
        field: String,
        /// Offending value.
        value: f64,
        /// Gain in effect.
        gain: f64,
        /// Offset in effect.
        offset: f64,
        /// Largest stored integer the destination can hold.
        max_int: u64,
    },

    /// A scaling gain cannot be derived because the value range is degenerate.
    #[error("cannot derive scaling for {field}: value range {range} is not positive")]
    EmptyScalingRange {
        /// Field the scaling was requested for.
        field: String,
        /// Offending range.
        range: f64,
    },

    /// Extent invariant violation.
    #[error("invalid extent: {0}")]
    InvalidExtent(String),

    /// Parallel sub-arrays of a record chunk are out of step.
    #[error("misaligned record chunk: {0}")]
    Misaligned(String),

    /// A field name not known to the store layout.
    #[error("unknown field {field} for {kind:?}")]
    UnknownField {
        /// Array family the lookup targeted.
        kind: ArrayKind,
        /// Requested field name.
        field: String,
    },
}
