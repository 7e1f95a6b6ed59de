//! Store contract consumed by the partition and merge phases.

use std::path::Path;

use pulsegrid_core::scaling::fields;
use pulsegrid_core::{
    ArrayKind, Error as CoreError, Extent, IndexHeader, PixelGrid, RecordChunk, Scaling,
    ScalingSpec,
};

use crate::Result;

/// Mode a store was opened in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpenMode {
    /// Freshly created, accepts appends.
    Create,
    /// Existing store opened for reading.
    Read,
}

/// A store of pulse records opened in a single mode.
///
/// Scratch tiles and the final output both go through this trait; the index
/// builder never touches the on-disk layout directly. Implementations apply
/// the store's scaling table when persisting scaled fields, so what a reader
/// gets back is the quantized value.
pub trait PulseStore {
    /// Append a record chunk. Create mode only.
    ///
    /// # Errors
    /// Returns an error on mode violation, misalignment, or a scaling
    /// domain/overflow failure while quantizing.
    fn append(&mut self, chunk: &RecordChunk) -> Result<()>;

    /// Read the store's full record set. Read mode only.
    ///
    /// # Errors
    /// Returns an error on mode violation or decode failure.
    fn read_all(&self) -> Result<RecordChunk>;

    /// Total pulses currently held.
    fn total_pulse_count(&self) -> u64;

    /// Total points currently held.
    fn total_point_count(&self) -> u64;

    /// Set the scaling for one field.
    ///
    /// # Errors
    /// Returns an error on mode violation or an unknown field.
    fn set_scaling(&mut self, kind: ArrayKind, field: &str, scaling: Scaling) -> Result<()>;

    /// Scaling for one field, if set.
    fn scaling(&self, kind: ArrayKind, field: &str) -> Option<Scaling>;

    /// Largest stored integer the field's native width can hold.
    ///
    /// # Errors
    /// Returns an error for fields unknown to the store layout.
    fn native_int_max(&self, kind: ArrayKind, field: &str) -> Result<u64>;

    /// Write the header metadata. Allowed exactly once, in Create mode.
    ///
    /// # Errors
    /// Returns an error on mode violation or a repeated write.
    fn set_header(&mut self, header: &IndexHeader) -> Result<()>;

    /// Header metadata, if written.
    fn header(&self) -> Option<IndexHeader>;

    /// Declare the extent the next appends belong to. The output store uses
    /// this to place records into spatial bins.
    ///
    /// # Errors
    /// Returns an error on mode violation.
    fn set_extent(&mut self, extent: &Extent) -> Result<()>;

    /// Assign the output pixel grid definition. Create mode only.
    ///
    /// # Errors
    /// Returns an error on mode violation.
    fn set_pixel_grid(&mut self, grid: &PixelGrid) -> Result<()>;

    /// Flush and close the store. Further operations fail.
    ///
    /// # Errors
    /// Returns an error if flushing fails.
    fn close(&mut self) -> Result<()>;
}

/// Factory for stores of one concrete format.
pub trait StoreDriver {
    /// Create a new store at `path`, open for writing.
    ///
    /// # Errors
    /// Returns an error if the store cannot be created.
    fn create(&self, path: &Path) -> Result<Box<dyn PulseStore>>;

    /// Open an existing store read-only.
    ///
    /// # Errors
    /// Returns an error if the store does not exist or cannot be read.
    fn open_read(&self, path: &Path) -> Result<Box<dyn PulseStore>>;

    /// Remove the store at `path`. Missing stores are not an error.
    ///
    /// # Errors
    /// Returns an error if removal fails for another reason.
    fn remove(&self, path: &Path) -> Result<()>;
}

/// Pulse fields persisted as quantized integers.
pub(crate) const SCALED_PULSE_FIELDS: &[&str] = &[
    fields::X_IDX,
    fields::Y_IDX,
    fields::X_ORIGIN,
    fields::Y_ORIGIN,
    fields::Z_ORIGIN,
    fields::H_ORIGIN,
    fields::AZIMUTH,
    fields::ZENITH,
];

/// Point fields persisted as quantized integers.
pub(crate) const SCALED_POINT_FIELDS: &[&str] =
    &[fields::X, fields::Y, fields::Z, fields::HEIGHT];

/// Waveform fields persisted as quantized integers.
pub(crate) const SCALED_WAVEFORM_FIELDS: &[&str] = &[fields::RANGE_TO_WAVEFORM_START];

/// Native integer width lookup shared by the built-in drivers. All scaled
/// fields and integer columns are 32 bits wide.
///
/// # Errors
/// Returns an error for fields unknown to the store layout.
pub fn native_int_max_for(kind: ArrayKind, field: &str) -> Result<u64> {
    let known = match kind {
        ArrayKind::Pulses => {
            SCALED_PULSE_FIELDS.contains(&field)
                || field == fields::SCANLINE
                || field == fields::SCANLINE_IDX
        }
        ArrayKind::Points => {
            SCALED_POINT_FIELDS.contains(&field) || field == fields::CLASSIFICATION
        }
        ArrayKind::Waveforms => SCALED_WAVEFORM_FIELDS.contains(&field),
    };
    if known {
        Ok(u64::from(u32::MAX))
    } else {
        Err(CoreError::UnknownField {
            kind,
            field: field.to_string(),
        }
        .into())
    }
}

/// Quantize one column through the store's scaling table.
pub(crate) fn encode_column(
    spec: &ScalingSpec,
    kind: ArrayKind,
    field: &str,
    values: &[f64],
) -> Result<Vec<u64>> {
    let scaling = spec.get_or_default(kind, field);
    let max_int = native_int_max_for(kind, field)?;
    let mut out = Vec::with_capacity(values.len());
    for &v in values {
        out.push(scaling.encode(field, v, max_int)?);
    }
    Ok(out)
}

/// Recover real values for one quantized column.
pub(crate) fn decode_column(
    spec: &ScalingSpec,
    kind: ArrayKind,
    field: &str,
    stored: &[u64],
) -> Vec<f64> {
    let scaling = spec.get_or_default(kind, field);
    stored.iter().map(|&s| scaling.decode(s)).collect()
}
