//! Structure of Arrays (`SoA`) record batches.
//!
//! A chunk is a set of parallel arrays aligned by pulse position: each pulse
//! owns a variable-length group of points and, optionally, one waveform-info
//! row plus transmitted/received sample groups. Every operation that selects
//! pulses must filter all of these arrays with the same mask or alignment is
//! lost.

use crate::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Pulse-level columns.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PulseBatch {
    /// Tiling key, x axis.
    pub x_idx: Vec<f64>,
    /// Tiling key, y axis.
    pub y_idx: Vec<f64>,
    /// Sensor origin, x.
    pub x_origin: Vec<f64>,
    /// Sensor origin, y.
    pub y_origin: Vec<f64>,
    /// Sensor origin, z.
    pub z_origin: Vec<f64>,
    /// Sensor origin height.
    pub h_origin: Vec<f64>,
    /// Azimuth angle.
    pub azimuth: Vec<f64>,
    /// Zenith angle.
    pub zenith: Vec<f64>,
    /// Scan line number.
    pub scanline: Vec<u32>,
    /// Position along the scan line.
    pub scanline_idx: Vec<u32>,
    /// Number of points owned by each pulse.
    pub point_count: Vec<u32>,
}

impl PulseBatch {
    /// Creates a new empty batch with specified capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            x_idx: Vec::with_capacity(capacity),
            y_idx: Vec::with_capacity(capacity),
            x_origin: Vec::with_capacity(capacity),
            y_origin: Vec::with_capacity(capacity),
            z_origin: Vec::with_capacity(capacity),
            h_origin: Vec::with_capacity(capacity),
            azimuth: Vec::with_capacity(capacity),
            zenith: Vec::with_capacity(capacity),
            scanline: Vec::with_capacity(capacity),
            scanline_idx: Vec::with_capacity(capacity),
            point_count: Vec::with_capacity(capacity),
        }
    }

    /// Number of pulses in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.x_idx.len()
    }

    /// Returns true if the batch is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.x_idx.is_empty()
    }

    /// Appends all pulses from another batch.
    pub fn append(&mut self, other: &Self) {
        self.x_idx.extend_from_slice(&other.x_idx);
        self.y_idx.extend_from_slice(&other.y_idx);
        self.x_origin.extend_from_slice(&other.x_origin);
        self.y_origin.extend_from_slice(&other.y_origin);
        self.z_origin.extend_from_slice(&other.z_origin);
        self.h_origin.extend_from_slice(&other.h_origin);
        self.azimuth.extend_from_slice(&other.azimuth);
        self.zenith.extend_from_slice(&other.zenith);
        self.scanline.extend_from_slice(&other.scanline);
        self.scanline_idx.extend_from_slice(&other.scanline_idx);
        self.point_count.extend_from_slice(&other.point_count);
    }

    fn push_row_from(&mut self, other: &Self, i: usize) {
        self.x_idx.push(other.x_idx[i]);
        self.y_idx.push(other.y_idx[i]);
        self.x_origin.push(other.x_origin[i]);
        self.y_origin.push(other.y_origin[i]);
        self.z_origin.push(other.z_origin[i]);
        self.h_origin.push(other.h_origin[i]);
        self.azimuth.push(other.azimuth[i]);
        self.zenith.push(other.zenith[i]);
        self.scanline.push(other.scanline[i]);
        self.scanline_idx.push(other.scanline_idx[i]);
        self.point_count.push(other.point_count[i]);
    }

    fn column_lengths_match(&self) -> bool {
        let n = self.x_idx.len();
        self.y_idx.len() == n
            && self.x_origin.len() == n
            && self.y_origin.len() == n
            && self.z_origin.len() == n
            && self.h_origin.len() == n
            && self.azimuth.len() == n
            && self.zenith.len() == n
            && self.scanline.len() == n
            && self.scanline_idx.len() == n
            && self.point_count.len() == n
    }
}

/// Point-level columns, stored flat and grouped by pulse via
/// [`PulseBatch::point_count`].
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PointBatch {
    /// Position, x.
    pub x: Vec<f64>,
    /// Position, y.
    pub y: Vec<f64>,
    /// Position, z.
    pub z: Vec<f64>,
    /// Height above ground.
    pub height: Vec<f64>,
    /// Classification code.
    pub classification: Vec<u8>,
}

impl PointBatch {
    /// Number of points in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.x.len()
    }

    /// Returns true if the batch is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Appends all points from another batch.
    pub fn append(&mut self, other: &Self) {
        self.x.extend_from_slice(&other.x);
        self.y.extend_from_slice(&other.y);
        self.z.extend_from_slice(&other.z);
        self.height.extend_from_slice(&other.height);
        self.classification.extend_from_slice(&other.classification);
    }

    fn extend_range_from(&mut self, other: &Self, start: usize, end: usize) {
        self.x.extend_from_slice(&other.x[start..end]);
        self.y.extend_from_slice(&other.y[start..end]);
        self.z.extend_from_slice(&other.z[start..end]);
        self.height.extend_from_slice(&other.height[start..end]);
        self.classification
            .extend_from_slice(&other.classification[start..end]);
    }

    fn column_lengths_match(&self) -> bool {
        let n = self.x.len();
        self.y.len() == n
            && self.z.len() == n
            && self.height.len() == n
            && self.classification.len() == n
    }
}

/// Waveform-info columns, one row per pulse when present.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct WaveformBatch {
    /// Range from the sensor to the first waveform sample.
    pub range_to_waveform_start: Vec<f64>,
    /// Number of transmitted samples owned by each pulse.
    pub transmitted_bins: Vec<u32>,
    /// Number of received samples owned by each pulse.
    pub received_bins: Vec<u32>,
}

impl WaveformBatch {
    /// Number of waveform-info rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.range_to_waveform_start.len()
    }

    /// Returns true if the batch is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.range_to_waveform_start.is_empty()
    }

    /// Appends all rows from another batch.
    pub fn append(&mut self, other: &Self) {
        self.range_to_waveform_start
            .extend_from_slice(&other.range_to_waveform_start);
        self.transmitted_bins
            .extend_from_slice(&other.transmitted_bins);
        self.received_bins.extend_from_slice(&other.received_bins);
    }

    fn push_row_from(&mut self, other: &Self, i: usize) {
        self.range_to_waveform_start
            .push(other.range_to_waveform_start[i]);
        self.transmitted_bins.push(other.transmitted_bins[i]);
        self.received_bins.push(other.received_bins[i]);
    }

    fn column_lengths_match(&self) -> bool {
        let n = self.range_to_waveform_start.len();
        self.transmitted_bins.len() == n && self.received_bins.len() == n
    }
}

/// A batch of pulse records with their dependent sub-arrays.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RecordChunk {
    /// Pulse columns.
    pub pulses: PulseBatch,
    /// Point columns, grouped by pulse.
    pub points: PointBatch,
    /// Waveform-info rows, aligned with pulses when present.
    pub waveform_info: Option<WaveformBatch>,
    /// Transmitted samples, grouped by pulse via the waveform-info bins.
    pub transmitted: Option<Vec<u32>>,
    /// Received samples, grouped by pulse via the waveform-info bins.
    pub received: Option<Vec<u32>>,
}

impl RecordChunk {
    /// Number of pulses in the chunk.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pulses.len()
    }

    /// Returns true when the chunk holds no pulses.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pulses.is_empty()
    }

    /// Check that every sub-array's length is derivable from the pulse
    /// columns.
    ///
    /// # Errors
    /// Returns an error when a column length disagrees with the pulse count,
    /// the point total, or the waveform bin totals, or when sample arrays are
    /// present without waveform-info to group them.
    pub fn validate_alignment(&self) -> Result<()> {
        if !self.pulses.column_lengths_match() {
            return Err(Error::Misaligned(
                "pulse columns have differing lengths".to_string(),
            ));
        }
        if !self.points.column_lengths_match() {
            return Err(Error::Misaligned(
                "point columns have differing lengths".to_string(),
            ));
        }
        let expected_points: usize = self
            .pulses
            .point_count
            .iter()
            .map(|&c| c as usize)
            .sum();
        if self.points.len() != expected_points {
            return Err(Error::Misaligned(format!(
                "point total {} does not match pulse point counts ({expected_points})",
                self.points.len()
            )));
        }
        match &self.waveform_info {
            Some(wf) => {
                if !wf.column_lengths_match() {
                    return Err(Error::Misaligned(
                        "waveform columns have differing lengths".to_string(),
                    ));
                }
                if wf.len() != self.pulses.len() {
                    return Err(Error::Misaligned(format!(
                        "waveform rows {} do not match pulse count {}",
                        wf.len(),
                        self.pulses.len()
                    )));
                }
                let expected_trans: usize =
                    wf.transmitted_bins.iter().map(|&c| c as usize).sum();
                let expected_recv: usize = wf.received_bins.iter().map(|&c| c as usize).sum();
                if self.transmitted.as_ref().map_or(0, Vec::len) != expected_trans {
                    return Err(Error::Misaligned(
                        "transmitted samples do not match waveform bin counts".to_string(),
                    ));
                }
                if self.received.as_ref().map_or(0, Vec::len) != expected_recv {
                    return Err(Error::Misaligned(
                        "received samples do not match waveform bin counts".to_string(),
                    ));
                }
            }
            None => {
                if self.transmitted.is_some() || self.received.is_some() {
                    return Err(Error::Misaligned(
                        "sample arrays present without waveform-info to group them".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Select a subset of pulses, filtering every parallel sub-array by the
    /// same mask so per-pulse alignment is preserved.
    ///
    /// Ragged groups (points, transmitted/received samples) are gathered via
    /// prefix offsets over the per-pulse counts.
    ///
    /// # Errors
    /// Returns an error when the mask length disagrees with the pulse count.
    pub fn filter(&self, mask: &[bool]) -> Result<Self> {
        if mask.len() != self.pulses.len() {
            return Err(Error::Misaligned(format!(
                "selection mask length {} does not match pulse count {}",
                mask.len(),
                self.pulses.len()
            )));
        }

        let keep = mask.iter().filter(|&&m| m).count();
        let mut out = Self {
            pulses: PulseBatch::with_capacity(keep),
            ..Self::default()
        };

        let point_offsets = group_offsets(&self.pulses.point_count);
        for (i, &m) in mask.iter().enumerate() {
            if !m {
                continue;
            }
            out.pulses.push_row_from(&self.pulses, i);
            out.points
                .extend_range_from(&self.points, point_offsets[i], point_offsets[i + 1]);
        }

        if let Some(wf) = &self.waveform_info {
            let mut wf_out = WaveformBatch::default();
            let trans_offsets = group_offsets(&wf.transmitted_bins);
            let recv_offsets = group_offsets(&wf.received_bins);
            let mut trans_out = self.transmitted.as_ref().map(|_| Vec::new());
            let mut recv_out = self.received.as_ref().map(|_| Vec::new());

            for (i, &m) in mask.iter().enumerate() {
                if !m {
                    continue;
                }
                wf_out.push_row_from(wf, i);
                if let (Some(src), Some(dst)) = (&self.transmitted, &mut trans_out) {
                    dst.extend_from_slice(&src[trans_offsets[i]..trans_offsets[i + 1]]);
                }
                if let (Some(src), Some(dst)) = (&self.received, &mut recv_out) {
                    dst.extend_from_slice(&src[recv_offsets[i]..recv_offsets[i + 1]]);
                }
            }

            out.waveform_info = Some(wf_out);
            out.transmitted = trans_out;
            out.received = recv_out;
        }

        Ok(out)
    }

    /// Appends another chunk.
    ///
    /// Optional sub-array presence is adopted from the first non-empty append;
    /// afterwards it must stay consistent.
    ///
    /// # Errors
    /// Returns an error if `other` is misaligned or its optional-array
    /// presence conflicts with data already held.
    pub fn append(&mut self, other: &Self) -> Result<()> {
        other.validate_alignment()?;
        if other.is_empty() {
            return Ok(());
        }
        if self.is_empty() {
            *self = other.clone();
            return Ok(());
        }

        match (&mut self.waveform_info, &other.waveform_info) {
            (Some(dst), Some(src)) => dst.append(src),
            (None, None) => {}
            _ => {
                return Err(Error::Misaligned(
                    "waveform presence changed between appends".to_string(),
                ));
            }
        }
        append_opt_samples(&mut self.transmitted, &other.transmitted, "transmitted")?;
        append_opt_samples(&mut self.received, &other.received, "received")?;

        self.pulses.append(&other.pulses);
        self.points.append(&other.points);
        Ok(())
    }
}

fn append_opt_samples(
    dst: &mut Option<Vec<u32>>,
    src: &Option<Vec<u32>>,
    what: &str,
) -> Result<()> {
    match (dst, src) {
        (Some(d), Some(s)) => {
            d.extend_from_slice(s);
            Ok(())
        }
        (None, None) => Ok(()),
        _ => Err(Error::Misaligned(format!(
            "{what} sample presence changed between appends"
        ))),
    }
}

/// Prefix offsets over per-pulse group counts; `counts.len() + 1` entries.
#[must_use]
pub fn group_offsets(counts: &[u32]) -> Vec<usize> {
    let mut offsets = Vec::with_capacity(counts.len() + 1);
    let mut total = 0usize;
    offsets.push(0);
    for &c in counts {
        total += c as usize;
        offsets.push(total);
    }
    offsets
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk_with_points(point_counts: &[u32]) -> RecordChunk {
        let n = point_counts.len();
        let mut chunk = RecordChunk::default();
        for (i, &c) in point_counts.iter().enumerate() {
            #[allow(clippy::cast_precision_loss)]
            let v = i as f64;
            chunk.pulses.x_idx.push(v);
            chunk.pulses.y_idx.push(v * 2.0);
            chunk.pulses.x_origin.push(v);
            chunk.pulses.y_origin.push(v);
            chunk.pulses.z_origin.push(v);
            chunk.pulses.h_origin.push(v);
            chunk.pulses.azimuth.push(v);
            chunk.pulses.zenith.push(v);
            chunk.pulses.scanline.push(u32::try_from(i).unwrap());
            chunk.pulses.scanline_idx.push(u32::try_from(i).unwrap());
            chunk.pulses.point_count.push(c);
            for j in 0..c {
                chunk.points.x.push(v + f64::from(j) * 0.1);
                chunk.points.y.push(v);
                chunk.points.z.push(1.0);
                chunk.points.height.push(0.5);
                chunk.points.classification.push(2);
            }
        }
        assert_eq!(chunk.len(), n);
        chunk
    }

    fn add_waveforms(chunk: &mut RecordChunk, trans_bins: &[u32], recv_bins: &[u32]) {
        let mut wf = WaveformBatch::default();
        let mut trans = Vec::new();
        let mut recv = Vec::new();
        for i in 0..chunk.len() {
            wf.range_to_waveform_start.push(10.0);
            wf.transmitted_bins.push(trans_bins[i]);
            wf.received_bins.push(recv_bins[i]);
            for s in 0..trans_bins[i] {
                trans.push(s);
            }
            for s in 0..recv_bins[i] {
                recv.push(s + 100);
            }
        }
        chunk.waveform_info = Some(wf);
        chunk.transmitted = Some(trans);
        chunk.received = Some(recv);
    }

    #[test]
    fn test_group_offsets() {
        assert_eq!(group_offsets(&[2, 0, 3]), vec![0, 2, 2, 5]);
        assert_eq!(group_offsets(&[]), vec![0]);
    }

    #[test]
    fn test_validate_alignment_accepts_consistent_chunk() {
        let mut chunk = chunk_with_points(&[2, 0, 3]);
        add_waveforms(&mut chunk, &[4, 0, 2], &[1, 1, 1]);
        chunk.validate_alignment().unwrap();
    }

    #[test]
    fn test_validate_alignment_rejects_bad_point_total() {
        let mut chunk = chunk_with_points(&[2, 0, 3]);
        chunk.points.x.push(9.9);
        assert!(chunk.validate_alignment().is_err());
    }

    #[test]
    fn test_validate_alignment_rejects_samples_without_waveform() {
        let mut chunk = chunk_with_points(&[1]);
        chunk.transmitted = Some(vec![1, 2, 3]);
        assert!(chunk.validate_alignment().is_err());
    }

    #[test]
    fn test_filter_preserves_point_groups() {
        let chunk = chunk_with_points(&[2, 0, 3, 1]);
        let sub = chunk.filter(&[true, false, true, false]).unwrap();
        assert_eq!(sub.len(), 2);
        assert_eq!(sub.pulses.point_count, vec![2, 3]);
        assert_eq!(sub.points.len(), 5);
        // re-derived counts match the original counts of the selected pulses
        sub.validate_alignment().unwrap();
        // points of pulse 2 start right after pulse 0's two points
        assert_eq!(sub.points.x[2], chunk.points.x[2]);
    }

    #[test]
    fn test_filter_keeps_waveform_alignment() {
        let mut chunk = chunk_with_points(&[1, 1, 1]);
        add_waveforms(&mut chunk, &[2, 3, 1], &[0, 2, 2]);
        let sub = chunk.filter(&[false, true, true]).unwrap();
        sub.validate_alignment().unwrap();
        let wf = sub.waveform_info.unwrap();
        assert_eq!(wf.transmitted_bins, vec![3, 1]);
        assert_eq!(wf.received_bins, vec![2, 2]);
        assert_eq!(sub.transmitted.unwrap().len(), 4);
        assert_eq!(sub.received.unwrap().len(), 4);
    }

    #[test]
    fn test_filter_empty_mask_gives_empty_chunk() {
        let chunk = chunk_with_points(&[2, 1]);
        let sub = chunk.filter(&[false, false]).unwrap();
        assert!(sub.is_empty());
        assert!(sub.points.is_empty());
    }

    #[test]
    fn test_filter_rejects_mismatched_mask() {
        let chunk = chunk_with_points(&[2, 1]);
        let err = chunk.filter(&[true]).unwrap_err();
        assert!(matches!(err, Error::Misaligned(_)));
    }

    #[test]
    fn test_append_adopts_then_enforces_presence() {
        let mut acc = RecordChunk::default();
        let mut with_wf = chunk_with_points(&[1]);
        add_waveforms(&mut with_wf, &[1], &[1]);
        acc.append(&with_wf).unwrap();
        assert!(acc.waveform_info.is_some());

        let without_wf = chunk_with_points(&[1]);
        assert!(acc.append(&without_wf).is_err());
    }

    #[test]
    fn test_append_concatenates() {
        let mut acc = RecordChunk::default();
        acc.append(&chunk_with_points(&[2])).unwrap();
        acc.append(&chunk_with_points(&[0, 3])).unwrap();
        assert_eq!(acc.len(), 3);
        assert_eq!(acc.points.len(), 5);
        acc.validate_alignment().unwrap();
    }
}
