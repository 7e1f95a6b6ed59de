//! End-to-end build tests over the in-memory store driver.

use std::path::Path;

use approx::assert_relative_eq;

use pulsegrid_core::scaling::fields;
use pulsegrid_core::{
    ArrayKind, Extent, IndexMethod, RecordChunk, ScalingSpec, SourceHeader, WaveformBatch,
};
use pulsegrid_io::{MemoryDriver, StoreDriver};
use pulsegrid_index::{GridIndexBuilder, GridIndexConfig, NullProgress, Progress};

/// Captures every progress call for assertions.
#[derive(Default)]
struct RecordingProgress {
    labels: Vec<String>,
    totals: Vec<usize>,
    last_step: usize,
    resets: usize,
}

impl Progress for RecordingProgress {
    fn set_total_steps(&mut self, total: usize) {
        self.totals.push(total);
    }

    fn set_progress(&mut self, step: usize) {
        self.last_step = step;
    }

    fn reset(&mut self) {
        self.resets += 1;
    }

    fn set_label_text(&mut self, label: &str) {
        self.labels.push(label.to_string());
    }
}

fn global_extent() -> Extent {
    Extent::new(0.0, 100.0, 0.0, 100.0, 1.0).unwrap()
}

/// One pulse per position, each owning one point and one waveform row with
/// two transmitted and one received sample.
fn chunk_at(positions: &[(f64, f64)]) -> RecordChunk {
    let mut chunk = RecordChunk::default();
    let mut wf = WaveformBatch::default();
    let mut transmitted = Vec::new();
    let mut received = Vec::new();
    for (i, &(x, y)) in positions.iter().enumerate() {
        let i_u32 = u32::try_from(i).unwrap();
        chunk.pulses.x_idx.push(x);
        chunk.pulses.y_idx.push(y);
        chunk.pulses.x_origin.push(x + 0.5);
        chunk.pulses.y_origin.push(y + 0.5);
        chunk.pulses.z_origin.push(30.0);
        chunk.pulses.h_origin.push(2.0);
        chunk.pulses.azimuth.push(x / 2.0);
        chunk.pulses.zenith.push(y / 2.0);
        chunk.pulses.scanline.push(i_u32);
        chunk.pulses.scanline_idx.push(i_u32);
        chunk.pulses.point_count.push(1);
        chunk.points.x.push(x);
        chunk.points.y.push(y);
        chunk.points.z.push(1.25);
        chunk.points.height.push(0.75);
        chunk.points.classification.push(2);
        wf.range_to_waveform_start.push(12.5);
        wf.transmitted_bins.push(2);
        wf.received_bins.push(1);
        transmitted.extend_from_slice(&[i_u32, i_u32 + 1]);
        received.push(i_u32 + 100);
    }
    chunk.waveform_info = Some(wf);
    chunk.transmitted = Some(transmitted);
    chunk.received = Some(received);
    chunk
}

fn config(temp: &tempfile::TempDir) -> GridIndexConfig {
    GridIndexConfig::new(IndexMethod::Cartesian, 1.0)
        .with_extent(global_extent())
        .with_block_size(50.0)
        .with_projection("TEST_WKT")
        .with_temp_dir(temp.path())
}

fn build(
    driver: &MemoryDriver,
    temp: &tempfile::TempDir,
    chunks: Vec<RecordChunk>,
    out: &Path,
    progress: &mut dyn Progress,
) -> pulsegrid_index::Result<pulsegrid_core::IndexHeader> {
    let builder = GridIndexBuilder::new(driver, config(temp));
    builder.build(
        &SourceHeader::default(),
        &ScalingSpec::source_defaults(),
        chunks,
        out,
        progress,
    )
}

#[test]
fn test_end_to_end_build() {
    let driver = MemoryDriver::new();
    let temp = tempfile::tempdir().unwrap();
    let out = Path::new("/out/index");

    // one pulse per tile plus one on the central seam and one outside
    let chunks = vec![
        chunk_at(&[(10.0, 90.0), (60.0, 90.0)]),
        chunk_at(&[(10.0, 10.0), (60.0, 10.0), (49.9, 50.1)]),
        chunk_at(&[(150.0, 90.0)]),
    ];
    let header = build(&driver, &temp, chunks, out, &mut NullProgress).unwrap();

    assert_relative_eq!(header.index_tlx, 0.0);
    assert_relative_eq!(header.index_tly, 100.0);
    assert_eq!(header.number_bins_x, 100);
    assert_eq!(header.number_bins_y, 100);
    assert_eq!(header.index_type, 1);
    assert_eq!(header.spatial_reference, "TEST_WKT");
    // the out-of-extent pulse was dropped
    assert_eq!(header.number_of_pulses, 5);
    assert_eq!(header.number_of_points, 5);

    let snapshot = driver.snapshot(out).unwrap();
    assert_eq!(snapshot.header_writes, 1);
    assert_eq!(snapshot.header.unwrap(), header);
    assert_eq!(snapshot.extent_assignments.len(), 4);
    let grid = snapshot.pixel_grid.unwrap();
    assert_eq!(grid.projection, "TEST_WKT");
    assert_relative_eq!(grid.x_res, 1.0);

    let output = driver.open_read(out).unwrap();
    let merged = output.read_all().unwrap();
    merged.validate_alignment().unwrap();
    assert_eq!(merged.len(), 5);

    // merge follows tiler order: top row left to right, then the bottom row
    let expected_keys = [
        (10.0, 90.0),
        (49.9, 50.1),
        (60.0, 90.0),
        (10.0, 10.0),
        (60.0, 10.0),
    ];
    for (i, &(x, y)) in expected_keys.iter().enumerate() {
        assert_relative_eq!(merged.pulses.x_idx[i], x, epsilon = 1e-6);
        assert_relative_eq!(merged.pulses.y_idx[i], y, epsilon = 1e-6);
    }

    // copy-mode scaling survived the split and merge
    let z = output.scaling(ArrayKind::Points, fields::Z).unwrap();
    assert_relative_eq!(z.gain, 100.0);
    assert_relative_eq!(z.offset, -100.0);
    assert_relative_eq!(merged.points.z[0], 1.25, epsilon = 0.01);

    // ragged waveform groups stayed aligned with their pulses
    let wf = merged.waveform_info.as_ref().unwrap();
    assert_eq!(wf.transmitted_bins, vec![2, 2, 2, 2, 2]);
    assert_eq!(merged.transmitted.as_ref().unwrap().len(), 10);
    assert_eq!(merged.received.as_ref().unwrap().len(), 5);
}

#[test]
fn test_overhang_tile_never_captures_stray_records() {
    let driver = MemoryDriver::new();
    let temp = tempfile::tempdir().unwrap();
    let out = Path::new("/out/overhang");

    // a 0..70 x range with 50-unit blocks puts a tile spanning 50..100 on
    // the right edge; (80, 25) is inside that tile but outside the global
    // extent, so it is dropped rather than quantized past the key range
    let config = GridIndexConfig::new(IndexMethod::Cartesian, 1.0)
        .with_extent(Extent::new(0.0, 70.0, 0.0, 50.0, 1.0).unwrap())
        .with_block_size(50.0)
        .with_projection("TEST_WKT")
        .with_temp_dir(temp.path());
    let builder = GridIndexBuilder::new(&driver, config);
    let header = builder
        .build(
            &SourceHeader::default(),
            &ScalingSpec::source_defaults(),
            vec![chunk_at(&[(10.0, 25.0), (80.0, 25.0)])],
            out,
            &mut NullProgress,
        )
        .unwrap();

    assert_eq!(header.number_of_pulses, 1);
    let merged = driver.open_read(out).unwrap().read_all().unwrap();
    assert_eq!(merged.len(), 1);
    assert_relative_eq!(merged.pulses.x_idx[0], 10.0, epsilon = 1e-6);
}

#[test]
fn test_build_is_deterministic() {
    let driver = MemoryDriver::new();
    let temp = tempfile::tempdir().unwrap();

    let chunks = || {
        vec![
            chunk_at(&[(10.0, 90.0), (60.0, 90.0), (10.0, 10.0)]),
            chunk_at(&[(60.0, 10.0), (30.0, 70.0)]),
        ]
    };
    let first = build(&driver, &temp, chunks(), Path::new("/out/a"), &mut NullProgress).unwrap();
    let second = build(&driver, &temp, chunks(), Path::new("/out/b"), &mut NullProgress).unwrap();
    assert_eq!(first, second);

    let a = driver.open_read(Path::new("/out/a")).unwrap().read_all().unwrap();
    let b = driver.open_read(Path::new("/out/b")).unwrap().read_all().unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_key_scaling_covers_global_extent() {
    let driver = MemoryDriver::new();
    let temp = tempfile::tempdir().unwrap();
    let out = Path::new("/out/scaled");

    build(
        &driver,
        &temp,
        vec![chunk_at(&[(10.0, 90.0)])],
        out,
        &mut NullProgress,
    )
    .unwrap();

    let output = driver.open_read(out).unwrap();
    let x_idx = output.scaling(ArrayKind::Pulses, fields::X_IDX).unwrap();
    // derived over the global 0..100 range, not the tile's 0..50
    assert_relative_eq!(x_idx.offset, 0.0);
    assert_relative_eq!(x_idx.gain, f64::from(u32::MAX) / 100.0);
    let y_idx = output.scaling(ArrayKind::Pulses, fields::Y_IDX).unwrap();
    assert_relative_eq!(y_idx.gain, f64::from(u32::MAX) / 100.0);
}

#[test]
fn test_scan_method_uses_scanline_keys() {
    let driver = MemoryDriver::new();
    let temp = tempfile::tempdir().unwrap();
    let out = Path::new("/out/scan");

    let config = GridIndexConfig::new(IndexMethod::Scan, 1.0)
        .with_extent(Extent::new(0.0, 10.0, 0.0, 10.0, 1.0).unwrap())
        .with_block_size(5.0)
        .with_projection("TEST_WKT")
        .with_temp_dir(temp.path());
    let builder = GridIndexBuilder::new(&driver, config);

    // scanline_idx/scanline are (0, 0) and (1, 1); key (0, 0) fails the
    // exclusive lower-y bound, so only the second pulse is kept
    let header = builder
        .build(
            &SourceHeader::default(),
            &ScalingSpec::source_defaults(),
            vec![chunk_at(&[(2.0, 2.0), (3.0, 3.0)])],
            out,
            &mut NullProgress,
        )
        .unwrap();
    assert_eq!(header.index_type, 5);
    assert_eq!(header.number_of_pulses, 1);

    let merged = driver.open_read(out).unwrap().read_all().unwrap();
    assert_relative_eq!(merged.pulses.x_idx[0], 1.0, epsilon = 1e-6);
    assert_relative_eq!(merged.pulses.y_idx[0], 1.0, epsilon = 1e-6);
}

#[test]
fn test_progress_reports_both_phases() {
    let driver = MemoryDriver::new();
    let temp = tempfile::tempdir().unwrap();
    let mut progress = RecordingProgress::default();

    build(
        &driver,
        &temp,
        vec![chunk_at(&[(10.0, 90.0)])],
        Path::new("/out/progress"),
        &mut progress,
    )
    .unwrap();

    assert_eq!(
        progress.labels,
        vec!["Splitting into blocks...", "Merging..."]
    );
    assert_eq!(progress.resets, 2);
    assert_eq!(progress.totals, vec![4]);
    assert_eq!(progress.last_step, 4);
}

#[test]
fn test_scratch_removed_on_success() {
    let driver = MemoryDriver::new();
    let temp = tempfile::tempdir().unwrap();

    build(
        &driver,
        &temp,
        vec![chunk_at(&[(10.0, 90.0)])],
        Path::new("/out/clean"),
        &mut NullProgress,
    )
    .unwrap();

    assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
}

#[test]
fn test_scratch_removed_on_partition_failure() {
    let driver = MemoryDriver::new();
    let temp = tempfile::tempdir().unwrap();
    let out = Path::new("/out/failed");

    // a point far below the Z offset maps to a negative stored integer
    let mut bad = chunk_at(&[(10.0, 90.0)]);
    bad.points.z[0] = -500.0;

    let err = build(&driver, &temp, vec![bad], out, &mut NullProgress).unwrap_err();
    assert!(matches!(
        err,
        pulsegrid_index::Error::Store(pulsegrid_io::Error::Core(
            pulsegrid_core::Error::ScalingDomain { .. }
        ))
    ));

    // no scratch files, no tile stores, no output
    assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
    assert!(!driver.exists(out));
}

#[test]
fn test_unsupported_method_fails_before_any_work() {
    let driver = MemoryDriver::new();
    let temp = tempfile::tempdir().unwrap();

    let config = GridIndexConfig::new(IndexMethod::Polar, 1.0)
        .with_extent(global_extent())
        .with_temp_dir(temp.path());
    let builder = GridIndexBuilder::new(&driver, config);
    let err = builder
        .build(
            &SourceHeader::default(),
            &ScalingSpec::new(),
            vec![chunk_at(&[(10.0, 90.0)])],
            Path::new("/out/polar"),
            &mut NullProgress,
        )
        .unwrap_err();
    assert!(matches!(
        err,
        pulsegrid_index::Error::Core(pulsegrid_core::Error::UnsupportedIndexMethod(_))
    ));
    assert!(!driver.exists(Path::new("/out/polar")));
    assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
}
