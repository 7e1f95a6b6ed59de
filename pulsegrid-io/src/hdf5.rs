//! HDF5 store driver.
//!
//! Layout: one `DATA` group holding `PULSES`, `POINTS` and `WAVEFORMS`
//! column groups plus flat `TRANSMITTED`/`RECEIVED` datasets, and a
//! `HEADER` group carrying the index metadata as attributes. Scaled
//! columns are stored as `u32` with `GAIN`/`OFFSET` attributes on the
//! dataset.

use std::path::{Path, PathBuf};

use hdf5::types::{H5Type, VarLenUnicode};
use hdf5::{Dataset, File, Group};
use ndarray::{s, ArrayView1};

use pulsegrid_core::scaling::fields;
use pulsegrid_core::{
    ArrayKind, Extent, IndexHeader, PixelGrid, RecordChunk, Scaling, ScalingSpec, WaveformBatch,
};

use crate::store::{
    decode_column, encode_column, native_int_max_for, PulseStore, StoreDriver,
    SCALED_POINT_FIELDS, SCALED_PULSE_FIELDS, SCALED_WAVEFORM_FIELDS,
};
use crate::{Error, Result};

const FORMAT_VERSION: &str = "1.0";
const CHUNK_LEN: usize = 65_536;
const DEFLATE_LEVEL: u8 = 1;

const POINT_COUNT_DS: &str = "NUMBER_OF_RETURNS";
const TRANSMITTED_BINS_DS: &str = "NUMBER_OF_WAVEFORM_TRANSMITTED_BINS";
const RECEIVED_BINS_DS: &str = "NUMBER_OF_WAVEFORM_RECEIVED_BINS";

/// Driver producing HDF5-file-backed stores.
#[derive(Clone, Copy, Debug, Default)]
pub struct Hdf5Driver;

impl Hdf5Driver {
    /// Create a new driver.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl StoreDriver for Hdf5Driver {
    fn create(&self, path: &Path) -> Result<Box<dyn PulseStore>> {
        Ok(Box::new(Hdf5Store::create(path)?))
    }

    fn open_read(&self, path: &Path) -> Result<Box<dyn PulseStore>> {
        if !path.exists() {
            return Err(Error::StoreNotFound(path.to_path_buf()));
        }
        Ok(Box::new(Hdf5Store::open_read(path)?))
    }

    fn remove(&self, path: &Path) -> Result<()> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

struct WriteState {
    _file: File,
    data: Group,
    pulses: Group,
    points: Group,
    waveforms: Group,
    header_group: Group,
    scaling: ScalingSpec,
    header: Option<IndexHeader>,
    extent: Option<Extent>,
    pixel_grid: Option<PixelGrid>,
    has_waveform: Option<bool>,
    has_transmitted: Option<bool>,
    has_received: Option<bool>,
    pulse_count: usize,
    point_count: usize,
    waveform_count: usize,
    transmitted_count: usize,
    received_count: usize,
}

struct ReadState {
    _file: File,
    data: Group,
    pulses: Group,
    points: Group,
    waveforms: Group,
    scaling: ScalingSpec,
    header: Option<IndexHeader>,
    pulse_count: u64,
    point_count: u64,
}

enum Inner {
    Write(WriteState),
    Read(ReadState),
}

/// One open handle onto an HDF5-backed store.
pub struct Hdf5Store {
    path: PathBuf,
    inner: Option<Inner>,
}

impl Hdf5Store {
    /// Create a new store at `path`, open for writing.
    ///
    /// # Errors
    /// Returns an error if the file or its datasets cannot be created.
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)?;
        set_attr_str(&file, "pulsegrid_format_version", FORMAT_VERSION)?;

        let data = file.create_group("DATA")?;
        let pulses = data.create_group("PULSES")?;
        let points = data.create_group("POINTS")?;
        let waveforms = data.create_group("WAVEFORMS")?;
        let header_group = file.create_group("HEADER")?;

        for name in SCALED_PULSE_FIELDS {
            create_extendable_dataset::<u32>(&pulses, name)?;
        }
        for name in [fields::SCANLINE, fields::SCANLINE_IDX, POINT_COUNT_DS] {
            create_extendable_dataset::<u32>(&pulses, name)?;
        }
        for name in SCALED_POINT_FIELDS {
            create_extendable_dataset::<u32>(&points, name)?;
        }
        create_extendable_dataset::<u8>(&points, fields::CLASSIFICATION)?;
        for name in SCALED_WAVEFORM_FIELDS {
            create_extendable_dataset::<u32>(&waveforms, name)?;
        }
        create_extendable_dataset::<u32>(&waveforms, TRANSMITTED_BINS_DS)?;
        create_extendable_dataset::<u32>(&waveforms, RECEIVED_BINS_DS)?;
        create_extendable_dataset::<u32>(&data, "TRANSMITTED")?;
        create_extendable_dataset::<u32>(&data, "RECEIVED")?;

        Ok(Self {
            path: path.to_path_buf(),
            inner: Some(Inner::Write(WriteState {
                _file: file,
                data,
                pulses,
                points,
                waveforms,
                header_group,
                scaling: ScalingSpec::new(),
                header: None,
                extent: None,
                pixel_grid: None,
                has_waveform: None,
                has_transmitted: None,
                has_received: None,
                pulse_count: 0,
                point_count: 0,
                waveform_count: 0,
                transmitted_count: 0,
                received_count: 0,
            })),
        })
    }

    /// Open an existing store read-only.
    ///
    /// # Errors
    /// Returns an error if the file is missing or malformed.
    pub fn open_read(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let data = file.group("DATA")?;
        let pulses = data.group("PULSES")?;
        let points = data.group("POINTS")?;
        let waveforms = data.group("WAVEFORMS")?;

        let mut scaling = ScalingSpec::new();
        load_scaling(&pulses, ArrayKind::Pulses, SCALED_PULSE_FIELDS, &mut scaling)?;
        load_scaling(&points, ArrayKind::Points, SCALED_POINT_FIELDS, &mut scaling)?;
        load_scaling(
            &waveforms,
            ArrayKind::Waveforms,
            SCALED_WAVEFORM_FIELDS,
            &mut scaling,
        )?;

        let header = match file.group("HEADER") {
            Ok(group) => read_header_attrs(&group)?,
            Err(_) => None,
        };

        let pulse_count = pulses.dataset(fields::X_IDX)?.size() as u64;
        let point_count = points.dataset(fields::X)?.size() as u64;

        Ok(Self {
            path: path.to_path_buf(),
            inner: Some(Inner::Read(ReadState {
                _file: file,
                data,
                pulses,
                points,
                waveforms,
                scaling,
                header,
                pulse_count,
                point_count,
            })),
        })
    }

    fn write_state(&mut self) -> Result<&mut WriteState> {
        match self.inner.as_mut() {
            Some(Inner::Write(state)) => Ok(state),
            Some(Inner::Read(_)) => Err(Error::ReadOnly(self.path.clone())),
            None => Err(Error::Closed(self.path.clone())),
        }
    }

    fn read_state(&self) -> Result<&ReadState> {
        match self.inner.as_ref() {
            Some(Inner::Read(state)) => Ok(state),
            Some(Inner::Write(_)) => Err(Error::WriteOnly(self.path.clone())),
            None => Err(Error::Closed(self.path.clone())),
        }
    }
}

impl WriteState {
    fn adopt_presence(&mut self, chunk: &RecordChunk) -> Result<()> {
        let flags = [
            (chunk.waveform_info.is_some(), &mut self.has_waveform, "waveform-info"),
            (chunk.transmitted.is_some(), &mut self.has_transmitted, "transmitted"),
            (chunk.received.is_some(), &mut self.has_received, "received"),
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

    fn append(&mut self, chunk: &RecordChunk) -> Result<()> {
        chunk.validate_alignment().map_err(Error::Core)?;
        if chunk.is_empty() {
            return Ok(());
        }
        self.adopt_presence(chunk)?;

        // Quantize everything before the first dataset write so a scaling
        // failure leaves the file untouched.
        let spec = &self.scaling;
        let p = &chunk.pulses;
        let pulse_cols: Vec<(&str, Vec<u32>)> = SCALED_PULSE_FIELDS
            .iter()
            .zip([
                &p.x_idx, &p.y_idx, &p.x_origin, &p.y_origin, &p.z_origin, &p.h_origin,
                &p.azimuth, &p.zenith,
            ])
            .map(|(&field, values)| {
                encode_column(spec, ArrayKind::Pulses, field, values).map(|v| (field, narrow(&v)))
            })
            .collect::<Result<_>>()?;

        let pt = &chunk.points;
        let point_cols: Vec<(&str, Vec<u32>)> = SCALED_POINT_FIELDS
            .iter()
            .zip([&pt.x, &pt.y, &pt.z, &pt.height])
            .map(|(&field, values)| {
                encode_column(spec, ArrayKind::Points, field, values).map(|v| (field, narrow(&v)))
            })
            .collect::<Result<_>>()?;

        let wf_range = match &chunk.waveform_info {
            Some(wf) => narrow(&encode_column(
                spec,
                ArrayKind::Waveforms,
                fields::RANGE_TO_WAVEFORM_START,
                &wf.range_to_waveform_start,
            )?),
            None => Vec::new(),
        };

        for (field, values) in &pulse_cols {
            append_to(&self.pulses, field, self.pulse_count, values)?;
        }
        append_to(&self.pulses, fields::SCANLINE, self.pulse_count, &p.scanline)?;
        append_to(
            &self.pulses,
            fields::SCANLINE_IDX,
            self.pulse_count,
            &p.scanline_idx,
        )?;
        append_to(&self.pulses, POINT_COUNT_DS, self.pulse_count, &p.point_count)?;

        for (field, values) in &point_cols {
            append_to(&self.points, field, self.point_count, values)?;
        }
        append_to(
            &self.points,
            fields::CLASSIFICATION,
            self.point_count,
            &pt.classification,
        )?;

        if let Some(wf) = &chunk.waveform_info {
            append_to(
                &self.waveforms,
                fields::RANGE_TO_WAVEFORM_START,
                self.waveform_count,
                &wf_range,
            )?;
            append_to(
                &self.waveforms,
                TRANSMITTED_BINS_DS,
                self.waveform_count,
                &wf.transmitted_bins,
            )?;
            append_to(
                &self.waveforms,
                RECEIVED_BINS_DS,
                self.waveform_count,
                &wf.received_bins,
            )?;
            self.waveform_count += wf.len();
        }
        if let Some(trans) = &chunk.transmitted {
            append_to(&self.data, "TRANSMITTED", self.transmitted_count, trans)?;
            self.transmitted_count += trans.len();
        }
        if let Some(recv) = &chunk.received {
            append_to(&self.data, "RECEIVED", self.received_count, recv)?;
            self.received_count += recv.len();
        }

        self.pulse_count += p.len();
        self.point_count += pt.len();
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        write_scaling(&self.pulses, ArrayKind::Pulses, SCALED_PULSE_FIELDS, &self.scaling)?;
        write_scaling(&self.points, ArrayKind::Points, SCALED_POINT_FIELDS, &self.scaling)?;
        write_scaling(
            &self.waveforms,
            ArrayKind::Waveforms,
            SCALED_WAVEFORM_FIELDS,
            &self.scaling,
        )?;

        set_attr_flag(&self.data, "HAS_WAVEFORMS", self.has_waveform.unwrap_or(false))?;
        set_attr_flag(
            &self.data,
            "HAS_TRANSMITTED",
            self.has_transmitted.unwrap_or(false),
        )?;
        set_attr_flag(&self.data, "HAS_RECEIVED", self.has_received.unwrap_or(false))?;

        if let Some(header) = &self.header {
            write_header_attrs(&self.header_group, header)?;
        }
        if let Some(extent) = &self.extent {
            set_attr_f64(&self.header_group, "EXTENT_X_MIN", extent.x_min)?;
            set_attr_f64(&self.header_group, "EXTENT_X_MAX", extent.x_max)?;
            set_attr_f64(&self.header_group, "EXTENT_Y_MIN", extent.y_min)?;
            set_attr_f64(&self.header_group, "EXTENT_Y_MAX", extent.y_max)?;
            set_attr_f64(&self.header_group, "EXTENT_BIN_SIZE", extent.bin_size)?;
        }
        if let Some(grid) = &self.pixel_grid {
            set_attr_str(&self.header_group, "GRID_PROJECTION", &grid.projection)?;
            set_attr_f64(&self.header_group, "GRID_X_RES", grid.x_res)?;
            set_attr_f64(&self.header_group, "GRID_Y_RES", grid.y_res)?;
        }
        Ok(())
    }
}

impl PulseStore for Hdf5Store {
    fn append(&mut self, chunk: &RecordChunk) -> Result<()> {
        self.write_state()?.append(chunk)
    }

    fn read_all(&self) -> Result<RecordChunk> {
        let state = self.read_state()?;
        let spec = &state.scaling;

        let mut chunk = RecordChunk::default();
        let scaled_pulses = [
            &mut chunk.pulses.x_idx,
            &mut chunk.pulses.y_idx,
            &mut chunk.pulses.x_origin,
            &mut chunk.pulses.y_origin,
            &mut chunk.pulses.z_origin,
            &mut chunk.pulses.h_origin,
            &mut chunk.pulses.azimuth,
            &mut chunk.pulses.zenith,
        ];
        for (&field, column) in SCALED_PULSE_FIELDS.iter().zip(scaled_pulses) {
            let stored = read_u32_column(&state.pulses, field)?;
            *column = decode_column(spec, ArrayKind::Pulses, field, &stored);
        }
        chunk.pulses.scanline = read_vec::<u32>(&state.pulses, fields::SCANLINE)?;
        chunk.pulses.scanline_idx = read_vec::<u32>(&state.pulses, fields::SCANLINE_IDX)?;
        chunk.pulses.point_count = read_vec::<u32>(&state.pulses, POINT_COUNT_DS)?;

        let scaled_points = [
            &mut chunk.points.x,
            &mut chunk.points.y,
            &mut chunk.points.z,
            &mut chunk.points.height,
        ];
        for (&field, column) in SCALED_POINT_FIELDS.iter().zip(scaled_points) {
            let stored = read_u32_column(&state.points, field)?;
            *column = decode_column(spec, ArrayKind::Points, field, &stored);
        }
        chunk.points.classification = read_vec::<u8>(&state.points, fields::CLASSIFICATION)?;

        if read_attr_flag(&state.data, "HAS_WAVEFORMS")? {
            let stored = read_u32_column(&state.waveforms, fields::RANGE_TO_WAVEFORM_START)?;
            chunk.waveform_info = Some(WaveformBatch {
                range_to_waveform_start: decode_column(
                    spec,
                    ArrayKind::Waveforms,
                    fields::RANGE_TO_WAVEFORM_START,
                    &stored,
                ),
                transmitted_bins: read_vec::<u32>(&state.waveforms, TRANSMITTED_BINS_DS)?,
                received_bins: read_vec::<u32>(&state.waveforms, RECEIVED_BINS_DS)?,
            });
        }
        if read_attr_flag(&state.data, "HAS_TRANSMITTED")? {
            chunk.transmitted = Some(read_vec::<u32>(&state.data, "TRANSMITTED")?);
        }
        if read_attr_flag(&state.data, "HAS_RECEIVED")? {
            chunk.received = Some(read_vec::<u32>(&state.data, "RECEIVED")?);
        }
        Ok(chunk)
    }

    fn total_pulse_count(&self) -> u64 {
        match self.inner.as_ref() {
            Some(Inner::Write(state)) => state.pulse_count as u64,
            Some(Inner::Read(state)) => state.pulse_count,
            None => 0,
        }
    }

    fn total_point_count(&self) -> u64 {
        match self.inner.as_ref() {
            Some(Inner::Write(state)) => state.point_count as u64,
            Some(Inner::Read(state)) => state.point_count,
            None => 0,
        }
    }

    fn set_scaling(&mut self, kind: ArrayKind, field: &str, scaling: Scaling) -> Result<()> {
        native_int_max_for(kind, field)?;
        let state = self.write_state()?;
        state.scaling.set(kind, field, scaling);
        Ok(())
    }

    fn scaling(&self, kind: ArrayKind, field: &str) -> Option<Scaling> {
        match self.inner.as_ref() {
            Some(Inner::Write(state)) => state.scaling.get(kind, field),
            Some(Inner::Read(state)) => state.scaling.get(kind, field),
            None => None,
        }
    }

    fn native_int_max(&self, kind: ArrayKind, field: &str) -> Result<u64> {
        native_int_max_for(kind, field)
    }

    fn set_header(&mut self, header: &IndexHeader) -> Result<()> {
        let state = self.write_state()?;
        if state.header.is_some() {
            return Err(Error::InvalidFormat("header already written".to_string()));
        }
        state.header = Some(header.clone());
        Ok(())
    }

    fn header(&self) -> Option<IndexHeader> {
        match self.inner.as_ref() {
            Some(Inner::Write(state)) => state.header.clone(),
            Some(Inner::Read(state)) => state.header.clone(),
            None => None,
        }
    }

    fn set_extent(&mut self, extent: &Extent) -> Result<()> {
        let state = self.write_state()?;
        state.extent = Some(extent.clone());
        Ok(())
    }

    fn set_pixel_grid(&mut self, grid: &PixelGrid) -> Result<()> {
        let state = self.write_state()?;
        state.pixel_grid = Some(grid.clone());
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        match self.inner.take() {
            Some(Inner::Write(mut state)) => state.finish(),
            Some(Inner::Read(_)) | None => Ok(()),
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn narrow(values: &[u64]) -> Vec<u32> {
    // encode_column already range-checked against the u32 width
    values.iter().map(|&v| v as u32).collect()
}

fn create_extendable_dataset<T: H5Type>(group: &Group, name: &str) -> Result<Dataset> {
    Ok(group
        .new_dataset::<T>()
        .shape((0..,))
        .chunk((CHUNK_LEN,))
        .deflate(DEFLATE_LEVEL)
        .shuffle()
        .create(name)?)
}

fn append_to<T: H5Type>(group: &Group, name: &str, offset: usize, values: &[T]) -> Result<()> {
    if values.is_empty() {
        return Ok(());
    }
    let dataset = group.dataset(name)?;
    let new_len = offset + values.len();
    dataset.resize((new_len,))?;
    dataset.write_slice(ArrayView1::from(values), s![offset..new_len])?;
    Ok(())
}

fn read_vec<T: H5Type>(group: &Group, name: &str) -> Result<Vec<T>> {
    Ok(group.dataset(name)?.read_raw::<T>()?)
}

fn read_u32_column(group: &Group, name: &str) -> Result<Vec<u64>> {
    Ok(read_vec::<u32>(group, name)?
        .into_iter()
        .map(u64::from)
        .collect())
}

fn write_scaling(
    group: &Group,
    kind: ArrayKind,
    scaled_fields: &[&str],
    spec: &ScalingSpec,
) -> Result<()> {
    for &field in scaled_fields {
        if let Some(scaling) = spec.get(kind, field) {
            let dataset = group.dataset(field)?;
            dataset
                .new_attr::<f64>()
                .create("GAIN")?
                .write_scalar(&scaling.gain)?;
            dataset
                .new_attr::<f64>()
                .create("OFFSET")?
                .write_scalar(&scaling.offset)?;
        }
    }
    Ok(())
}

fn load_scaling(
    group: &Group,
    kind: ArrayKind,
    scaled_fields: &[&str],
    spec: &mut ScalingSpec,
) -> Result<()> {
    for &field in scaled_fields {
        let dataset = group.dataset(field)?;
        let gain = read_attr_opt::<f64>(&dataset, "GAIN")?;
        let offset = read_attr_opt::<f64>(&dataset, "OFFSET")?;
        if let (Some(gain), Some(offset)) = (gain, offset) {
            spec.set(kind, field, Scaling { gain, offset });
        }
    }
    Ok(())
}

fn write_header_attrs(group: &Group, header: &IndexHeader) -> Result<()> {
    set_attr_f64(group, "INDEX_TLX", header.index_tlx)?;
    set_attr_f64(group, "INDEX_TLY", header.index_tly)?;
    group
        .new_attr::<u64>()
        .create("NUMBER_BINS_X")?
        .write_scalar(&header.number_bins_x)?;
    group
        .new_attr::<u64>()
        .create("NUMBER_BINS_Y")?
        .write_scalar(&header.number_bins_y)?;
    group
        .new_attr::<u16>()
        .create("INDEX_TYPE")?
        .write_scalar(&header.index_type)?;
    set_attr_f64(group, "BIN_SIZE", header.bin_size)?;
    set_attr_str(group, "SPATIAL_REFERENCE", &header.spatial_reference)?;
    group
        .new_attr::<u64>()
        .create("NUMBER_OF_PULSES")?
        .write_scalar(&header.number_of_pulses)?;
    group
        .new_attr::<u64>()
        .create("NUMBER_OF_POINTS")?
        .write_scalar(&header.number_of_points)?;
    Ok(())
}

fn read_header_attrs(group: &Group) -> Result<Option<IndexHeader>> {
    let Some(index_tlx) = read_attr_opt::<f64>(group, "INDEX_TLX")? else {
        return Ok(None);
    };
    let read_f64 = |name| read_attr_req::<f64>(group, name);
    let read_u64 = |name| read_attr_req::<u64>(group, name);
    Ok(Some(IndexHeader {
        index_tlx,
        index_tly: read_f64("INDEX_TLY")?,
        number_bins_x: read_u64("NUMBER_BINS_X")?,
        number_bins_y: read_u64("NUMBER_BINS_Y")?,
        index_type: read_attr_req::<u16>(group, "INDEX_TYPE")?,
        bin_size: read_f64("BIN_SIZE")?,
        spatial_reference: read_attr_str(group, "SPATIAL_REFERENCE")?,
        number_of_pulses: read_u64("NUMBER_OF_PULSES")?,
        number_of_points: read_u64("NUMBER_OF_POINTS")?,
    }))
}

fn set_attr_f64(group: &Group, name: &str, value: f64) -> Result<()> {
    group
        .new_attr::<f64>()
        .create(name)?
        .write_scalar(&value)?;
    Ok(())
}

fn set_attr_flag(group: &Group, name: &str, value: bool) -> Result<()> {
    group
        .new_attr::<u8>()
        .create(name)?
        .write_scalar(&u8::from(value))?;
    Ok(())
}

fn read_attr_flag(group: &Group, name: &str) -> Result<bool> {
    Ok(read_attr_opt::<u8>(group, name)?.unwrap_or(0) != 0)
}

fn set_attr_str(location: &hdf5::Location, name: &str, value: &str) -> Result<()> {
    let value: VarLenUnicode = value
        .parse()
        .map_err(|e| Error::InvalidFormat(format!("invalid utf-8 attribute: {e}")))?;
    location
        .new_attr::<VarLenUnicode>()
        .create(name)?
        .write_scalar(&value)?;
    Ok(())
}

fn read_attr_str(group: &Group, name: &str) -> Result<String> {
    let value: VarLenUnicode = group.attr(name)?.read_scalar()?;
    Ok(value.to_string())
}

fn read_attr_opt<T: H5Type + Clone>(location: &hdf5::Location, name: &str) -> Result<Option<T>> {
    match location.attr(name) {
        Ok(attr) => Ok(Some(attr.read_scalar::<T>()?)),
        Err(_) => Ok(None),
    }
}

fn read_attr_req<T: H5Type + Clone>(group: &Group, name: &str) -> Result<T> {
    Ok(group.attr(name)?.read_scalar::<T>()?)
}
