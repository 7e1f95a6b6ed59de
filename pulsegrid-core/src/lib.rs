//! pulsegrid-core: data model for grid spatial indexing of pulse data.
//!
//! This crate provides the foundational types shared by the store drivers
//! and the index builder: spatial extents, structure-of-arrays record
//! batches, fixed-point scaling parameters, and header metadata.
//!

pub mod error;
pub mod extent;
pub mod header;
pub mod method;
pub mod record;
pub mod scaling;

pub use error::{Error, Result};
pub use extent::{Extent, PixelGrid};
pub use header::{IndexHeader, SourceHeader, DEFAULT_SPATIAL_REFERENCE};
pub use method::IndexMethod;
pub use record::{group_offsets, PointBatch, PulseBatch, RecordChunk, WaveformBatch};
pub use scaling::{ArrayKind, Scaling, ScalingMode, ScalingRule, ScalingSpec, SCALING_RULES};
