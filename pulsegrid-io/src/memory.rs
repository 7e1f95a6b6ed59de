//! In-memory store driver backed by a shared path registry.
//!
//! Reproduces the scratch-store lifecycle (create, close, reopen read-only,
//! remove) without touching disk: closing a writable store publishes its
//! data into the registry, reopening snapshots it back out. Scaled fields
//! are genuinely quantized through the store's scaling table, so scaling
//! propagation is observable through this driver.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use pulsegrid_core::scaling::fields;
use pulsegrid_core::{
    ArrayKind, Extent, IndexHeader, PixelGrid, RecordChunk, Scaling, ScalingSpec, WaveformBatch,
};

use crate::store::{
    decode_column, encode_column, native_int_max_for, OpenMode, PulseStore, StoreDriver,
};
use crate::{Error, Result};

type Registry = Arc<Mutex<HashMap<PathBuf, StoreData>>>;

/// Quantized store content as held in the registry.
#[derive(Clone, Debug, Default)]
struct StoreData {
    p_x_idx: Vec<u64>,
    p_y_idx: Vec<u64>,
    p_x_origin: Vec<u64>,
    p_y_origin: Vec<u64>,
    p_z_origin: Vec<u64>,
    p_h_origin: Vec<u64>,
    p_azimuth: Vec<u64>,
    p_zenith: Vec<u64>,
    p_scanline: Vec<u32>,
    p_scanline_idx: Vec<u32>,
    p_point_count: Vec<u32>,

    pt_x: Vec<u64>,
    pt_y: Vec<u64>,
    pt_z: Vec<u64>,
    pt_height: Vec<u64>,
    pt_classification: Vec<u8>,

    wf_range: Vec<u64>,
    wf_transmitted_bins: Vec<u32>,
    wf_received_bins: Vec<u32>,
    transmitted: Vec<u32>,
    received: Vec<u32>,
    has_waveform: Option<bool>,
    has_transmitted: Option<bool>,
    has_received: Option<bool>,

    scaling: ScalingSpec,
    header: Option<IndexHeader>,
    header_writes: usize,
    extent_assignments: Vec<Extent>,
    pixel_grid: Option<PixelGrid>,
}

/// Observable state of a registry entry, for assertions in tests and tools.
#[derive(Clone, Debug)]
pub struct StoreSnapshot {
    /// Header metadata, if written.
    pub header: Option<IndexHeader>,
    /// How many times the header was written.
    pub header_writes: usize,
    /// Every extent assigned before appends, in order.
    pub extent_assignments: Vec<Extent>,
    /// Pixel grid definition, if assigned.
    pub pixel_grid: Option<PixelGrid>,
    /// Pulses held.
    pub pulse_count: u64,
    /// Points held.
    pub point_count: u64,
}

/// Driver producing registry-backed in-memory stores.
#[derive(Clone, Debug, Default)]
pub struct MemoryDriver {
    registry: Registry,
}

impl MemoryDriver {
    /// Create a driver with an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when a closed store exists at `path`.
    #[must_use]
    pub fn exists(&self, path: &Path) -> bool {
        self.lock().contains_key(path)
    }

    /// Observable state of the store at `path`, if any.
    #[must_use]
    pub fn snapshot(&self, path: &Path) -> Option<StoreSnapshot> {
        self.lock().get(path).map(|data| StoreSnapshot {
            header: data.header.clone(),
            header_writes: data.header_writes,
            extent_assignments: data.extent_assignments.clone(),
            pixel_grid: data.pixel_grid.clone(),
            pulse_count: data.p_x_idx.len() as u64,
            point_count: data.pt_x.len() as u64,
        })
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, StoreData>> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StoreDriver for MemoryDriver {
    fn create(&self, path: &Path) -> Result<Box<dyn PulseStore>> {
        Ok(Box::new(MemoryStore {
            registry: Arc::clone(&self.registry),
            path: path.to_path_buf(),
            mode: OpenMode::Create,
            data: StoreData::default(),
            closed: false,
        }))
    }

    fn open_read(&self, path: &Path) -> Result<Box<dyn PulseStore>> {
        let data = self
            .lock()
            .get(path)
            .cloned()
            .ok_or_else(|| Error::StoreNotFound(path.to_path_buf()))?;
        Ok(Box::new(MemoryStore {
            registry: Arc::clone(&self.registry),
            path: path.to_path_buf(),
            mode: OpenMode::Read,
            data,
            closed: false,
        }))
    }

    fn remove(&self, path: &Path) -> Result<()> {
        self.lock().remove(path);
        // placeholder file from scratch-path generation, if any
        let _ = std::fs::remove_file(path);
        Ok(())
    }
}

/// One open handle onto a registry-backed store.
pub struct MemoryStore {
    registry: Registry,
    path: PathBuf,
    mode: OpenMode,
    data: StoreData,
    closed: bool,
}

impl MemoryStore {
    fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::Closed(self.path.clone()));
        }
        Ok(())
    }

    fn check_writable(&self) -> Result<()> {
        self.check_open()?;
        if self.mode != OpenMode::Create {
            return Err(Error::ReadOnly(self.path.clone()));
        }
        Ok(())
    }

    fn check_readable(&self) -> Result<()> {
        self.check_open()?;
        if self.mode != OpenMode::Read {
            return Err(Error::WriteOnly(self.path.clone()));
        }
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, StoreData>> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn adopt_presence(&mut self, chunk: &RecordChunk) -> Result<()> {
        let flags = [
            (chunk.waveform_info.is_some(), &mut self.data.has_waveform, "waveform-info"),
            (chunk.transmitted.is_some(), &mut self.data.has_transmitted, "transmitted"),
            (chunk.received.is_some(), &mut self.data.has_received, "received"),
        ];
        for (present, slot, what) in flags {
            match *slot {
                None => *slot = Some(present),
                Some(existing) if existing != present => {
                    return Err(Error::InvalidChunk(format!(
                        "{what} presence changed between appends"
                    )));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

impl PulseStore for MemoryStore {
    fn append(&mut self, chunk: &RecordChunk) -> Result<()> {
        self.check_writable()?;
        chunk.validate_alignment().map_err(Error::Core)?;
        if chunk.is_empty() {
            return Ok(());
        }
        self.adopt_presence(chunk)?;

        // Quantize everything before touching the stored columns so a
        // scaling failure leaves the store untouched.
        let spec = &self.data.scaling;
        let p = &chunk.pulses;
        let x_idx = encode_column(spec, ArrayKind::Pulses, fields::X_IDX, &p.x_idx)?;
        let y_idx = encode_column(spec, ArrayKind::Pulses, fields::Y_IDX, &p.y_idx)?;
        let x_origin = encode_column(spec, ArrayKind::Pulses, fields::X_ORIGIN, &p.x_origin)?;
        let y_origin = encode_column(spec, ArrayKind::Pulses, fields::Y_ORIGIN, &p.y_origin)?;
        let z_origin = encode_column(spec, ArrayKind::Pulses, fields::Z_ORIGIN, &p.z_origin)?;
        let h_origin = encode_column(spec, ArrayKind::Pulses, fields::H_ORIGIN, &p.h_origin)?;
        let azimuth = encode_column(spec, ArrayKind::Pulses, fields::AZIMUTH, &p.azimuth)?;
        let zenith = encode_column(spec, ArrayKind::Pulses, fields::ZENITH, &p.zenith)?;

        let pt = &chunk.points;
        let pt_x = encode_column(spec, ArrayKind::Points, fields::X, &pt.x)?;
        let pt_y = encode_column(spec, ArrayKind::Points, fields::Y, &pt.y)?;
        let pt_z = encode_column(spec, ArrayKind::Points, fields::Z, &pt.z)?;
        let pt_height = encode_column(spec, ArrayKind::Points, fields::HEIGHT, &pt.height)?;

        let wf_range = match &chunk.waveform_info {
            Some(wf) => encode_column(
                spec,
                ArrayKind::Waveforms,
                fields::RANGE_TO_WAVEFORM_START,
                &wf.range_to_waveform_start,
            )?,
            None => Vec::new(),
        };

        let data = &mut self.data;
        data.p_x_idx.extend(x_idx);
        data.p_y_idx.extend(y_idx);
        data.p_x_origin.extend(x_origin);
        data.p_y_origin.extend(y_origin);
        data.p_z_origin.extend(z_origin);
        data.p_h_origin.extend(h_origin);
        data.p_azimuth.extend(azimuth);
        data.p_zenith.extend(zenith);
        data.p_scanline.extend_from_slice(&p.scanline);
        data.p_scanline_idx.extend_from_slice(&p.scanline_idx);
        data.p_point_count.extend_from_slice(&p.point_count);

        data.pt_x.extend(pt_x);
        data.pt_y.extend(pt_y);
        data.pt_z.extend(pt_z);
        data.pt_height.extend(pt_height);
        data.pt_classification
            .extend_from_slice(&pt.classification);

        if let Some(wf) = &chunk.waveform_info {
            data.wf_range.extend(wf_range);
            data.wf_transmitted_bins
                .extend_from_slice(&wf.transmitted_bins);
            data.wf_received_bins.extend_from_slice(&wf.received_bins);
        }
        if let Some(trans) = &chunk.transmitted {
            data.transmitted.extend_from_slice(trans);
        }
        if let Some(recv) = &chunk.received {
            data.received.extend_from_slice(recv);
        }
        Ok(())
    }

    fn read_all(&self) -> Result<RecordChunk> {
        self.check_readable()?;
        let data = &self.data;
        let spec = &data.scaling;

        let mut chunk = RecordChunk::default();
        chunk.pulses.x_idx = decode_column(spec, ArrayKind::Pulses, fields::X_IDX, &data.p_x_idx);
        chunk.pulses.y_idx = decode_column(spec, ArrayKind::Pulses, fields::Y_IDX, &data.p_y_idx);
        chunk.pulses.x_origin =
            decode_column(spec, ArrayKind::Pulses, fields::X_ORIGIN, &data.p_x_origin);
        chunk.pulses.y_origin =
            decode_column(spec, ArrayKind::Pulses, fields::Y_ORIGIN, &data.p_y_origin);
        chunk.pulses.z_origin =
            decode_column(spec, ArrayKind::Pulses, fields::Z_ORIGIN, &data.p_z_origin);
        chunk.pulses.h_origin =
            decode_column(spec, ArrayKind::Pulses, fields::H_ORIGIN, &data.p_h_origin);
        chunk.pulses.azimuth =
            decode_column(spec, ArrayKind::Pulses, fields::AZIMUTH, &data.p_azimuth);
        chunk.pulses.zenith =
            decode_column(spec, ArrayKind::Pulses, fields::ZENITH, &data.p_zenith);
        chunk.pulses.scanline = data.p_scanline.clone();
        chunk.pulses.scanline_idx = data.p_scanline_idx.clone();
        chunk.pulses.point_count = data.p_point_count.clone();

        chunk.points.x = decode_column(spec, ArrayKind::Points, fields::X, &data.pt_x);
        chunk.points.y = decode_column(spec, ArrayKind::Points, fields::Y, &data.pt_y);
        chunk.points.z = decode_column(spec, ArrayKind::Points, fields::Z, &data.pt_z);
        chunk.points.height =
            decode_column(spec, ArrayKind::Points, fields::HEIGHT, &data.pt_height);
        chunk.points.classification = data.pt_classification.clone();

        if data.has_waveform == Some(true) {
            chunk.waveform_info = Some(WaveformBatch {
                range_to_waveform_start: decode_column(
                    spec,
                    ArrayKind::Waveforms,
                    fields::RANGE_TO_WAVEFORM_START,
                    &data.wf_range,
                ),
                transmitted_bins: data.wf_transmitted_bins.clone(),
                received_bins: data.wf_received_bins.clone(),
            });
        }
        if data.has_transmitted == Some(true) {
            chunk.transmitted = Some(data.transmitted.clone());
        }
        if data.has_received == Some(true) {
            chunk.received = Some(data.received.clone());
        }
        Ok(chunk)
    }

    fn total_pulse_count(&self) -> u64 {
        self.data.p_x_idx.len() as u64
    }

    fn total_point_count(&self) -> u64 {
        self.data.pt_x.len() as u64
    }

    fn set_scaling(&mut self, kind: ArrayKind, field: &str, scaling: Scaling) -> Result<()> {
        self.check_writable()?;
        native_int_max_for(kind, field)?;
        self.data.scaling.set(kind, field, scaling);
        Ok(())
    }

    fn scaling(&self, kind: ArrayKind, field: &str) -> Option<Scaling> {
        self.data.scaling.get(kind, field)
    }

    fn native_int_max(&self, kind: ArrayKind, field: &str) -> Result<u64> {
        native_int_max_for(kind, field)
    }

    fn set_header(&mut self, header: &IndexHeader) -> Result<()> {
        self.check_writable()?;
        if self.data.header_writes > 0 {
            return Err(Error::InvalidFormat(
                "header already written".to_string(),
            ));
        }
        self.data.header = Some(header.clone());
        self.data.header_writes += 1;
        Ok(())
    }

    fn header(&self) -> Option<IndexHeader> {
        self.data.header.clone()
    }

    fn set_extent(&mut self, extent: &Extent) -> Result<()> {
        self.check_writable()?;
        self.data.extent_assignments.push(extent.clone());
        Ok(())
    }

    fn set_pixel_grid(&mut self, grid: &PixelGrid) -> Result<()> {
        self.check_writable()?;
        self.data.pixel_grid = Some(grid.clone());
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        if self.mode == OpenMode::Create {
            let data = std::mem::take(&mut self.data);
            self.lock().insert(self.path.clone(), data);
        }
        self.closed = true;
        Ok(())
    }
}
