//! Scaling propagation between stores.
//!
//! The rule table in `pulsegrid-core` decides which fields carry scaling.
//! Copy-mode propagation transfers whatever the source has and silently
//! skips absent fields; the tiling-key fields are re-derived against the
//! global extent so every tile (and the merged output) quantizes them over
//! the same range.

use pulsegrid_core::scaling::fields;
use pulsegrid_core::{ArrayKind, Extent, Scaling, ScalingMode, ScalingSpec, SCALING_RULES};
use pulsegrid_io::PulseStore;

use crate::Result;

/// Copy every rule-table scaling present in `src` onto `dst`.
///
/// # Errors
/// Returns an error if the destination rejects a scaling write.
pub fn copy_scaling(src: &ScalingSpec, dst: &mut dyn PulseStore) -> Result<()> {
    for rule in SCALING_RULES {
        if let Some(scaling) = src.get(rule.kind, rule.field) {
            dst.set_scaling(rule.kind, rule.field, scaling)?;
        }
    }
    Ok(())
}

/// Copy every rule-table scaling present in `src` onto `dst`, store to
/// store. Used when merging: the first populated tile already carries the
/// globally-derived key scaling, so a plain copy is correct.
///
/// # Errors
/// Returns an error if the destination rejects a scaling write.
pub fn copy_store_scaling(src: &dyn PulseStore, dst: &mut dyn PulseStore) -> Result<()> {
    for rule in SCALING_RULES {
        if let Some(scaling) = src.scaling(rule.kind, rule.field) {
            dst.set_scaling(rule.kind, rule.field, scaling)?;
        }
    }
    Ok(())
}

/// Derive and set the scaling for one tiling-key field so the full global
/// range maps onto the destination's native integer width, anchored at the
/// range minimum.
///
/// # Errors
/// Returns an error for an unknown field, a degenerate range, or a rejected
/// scaling write.
pub fn set_scaling_for_coord_field(
    store: &mut dyn PulseStore,
    field: &str,
    min: f64,
    max: f64,
) -> Result<()> {
    let max_int = store.native_int_max(ArrayKind::Pulses, field)?;
    let scaling = Scaling::for_range(field, max - min, min, max_int)?;
    store.set_scaling(ArrayKind::Pulses, field, scaling)?;
    Ok(())
}

/// Apply derive-mode re-scaling of the key fields against the global extent.
///
/// # Errors
/// Returns an error if either axis range is degenerate or a write fails.
pub fn derive_key_scaling(store: &mut dyn PulseStore, global: &Extent) -> Result<()> {
    for rule in SCALING_RULES {
        if rule.mode != ScalingMode::DeriveRange {
            continue;
        }
        let (min, max) = if rule.field == fields::X_IDX {
            (global.x_min, global.x_max)
        } else {
            (global.y_min, global.y_max)
        };
        set_scaling_for_coord_field(store, rule.field, min, max)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use pulsegrid_io::{MemoryDriver, StoreDriver};
    use std::path::Path;

    #[test]
    fn test_copy_scaling_skips_absent_fields() {
        let driver = MemoryDriver::new();
        let mut store = driver.create(Path::new("/t0")).unwrap();

        // source defaults deliberately leave H_ORIGIN unset
        let spec = ScalingSpec::source_defaults();
        copy_scaling(&spec, store.as_mut()).unwrap();

        assert!(store.scaling(ArrayKind::Pulses, fields::H_ORIGIN).is_none());
        let z = store.scaling(ArrayKind::Points, fields::Z).unwrap();
        assert_relative_eq!(z.gain, 100.0);
        assert_relative_eq!(z.offset, -100.0);
    }

    #[test]
    fn test_derive_key_scaling_covers_global_extent() {
        let driver = MemoryDriver::new();
        let mut store = driver.create(Path::new("/t1")).unwrap();
        let global = Extent::new(100.0, 300.0, -50.0, 150.0, 1.0).unwrap();

        derive_key_scaling(store.as_mut(), &global).unwrap();

        let max_int = u64::from(u32::MAX);
        let x = store.scaling(ArrayKind::Pulses, fields::X_IDX).unwrap();
        assert_relative_eq!(x.offset, 100.0);
        assert_eq!(x.encode(fields::X_IDX, 100.0, max_int).unwrap(), 0);
        assert_eq!(x.encode(fields::X_IDX, 300.0, max_int).unwrap(), max_int);

        let y = store.scaling(ArrayKind::Pulses, fields::Y_IDX).unwrap();
        assert_relative_eq!(y.offset, -50.0);
        assert_eq!(y.encode(fields::Y_IDX, 150.0, max_int).unwrap(), max_int);
    }

    #[test]
    fn test_copy_store_scaling_transfers_entries() {
        let driver = MemoryDriver::new();
        let src_path = Path::new("/t2");
        let mut src = driver.create(src_path).unwrap();
        src.set_scaling(
            ArrayKind::Points,
            fields::X,
            Scaling {
                gain: 50.0,
                offset: 10.0,
            },
        )
        .unwrap();
        src.close().unwrap();

        let src = driver.open_read(src_path).unwrap();
        let mut dst = driver.create(Path::new("/t3")).unwrap();
        copy_store_scaling(src.as_ref(), dst.as_mut()).unwrap();

        let got = dst.scaling(ArrayKind::Points, fields::X).unwrap();
        assert_relative_eq!(got.gain, 50.0);
        assert_relative_eq!(got.offset, 10.0);
        assert!(dst.scaling(ArrayKind::Points, fields::Y).is_none());
    }
}
