//! Time-sliced field I/O.
//!
//! A timed field is a dataset with one extra trailing dimension, the slice
//! axis. Slices are written one at a time, at the end (append) or over the
//! last slice (replace), and read back as contiguous runs.

use tracing::{debug, instrument};

use crate::array::locate;
use crate::store::{with_group, Backend, DatasetInfo, DatasetSpec, GroupId, Selection};
use crate::util::{DataBuffer, ElementType, Error, Result, Shape};

/// Slice chunk depth of datasets created by slice writes.
pub const SLICE_BLOCK: usize = 1;

/// Where a slice write lands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SliceMode {
    /// Extend the slice axis by one and write the new slice.
    Append,
    /// Overwrite the current last slice.
    ReplaceLast,
}

fn check_layout(name: &str, info: &DatasetInfo, shape: &Shape, etype: ElementType) -> Result<()> {
    if info.vlen || info.etype != etype {
        return Err(Error::TypeMismatch {
            name: name.to_string(),
            expected: etype.to_string(),
            actual: info.etype.to_string(),
        });
    }
    if info.shape.rank() != shape.rank() + 1 || info.shape.leading() != *shape {
        return Err(Error::ShapeMismatch {
            name: name.to_string(),
            expected: format!("{} plus a slice axis", shape),
            actual: info.shape.to_string(),
        });
    }
    Ok(())
}

/// Write one slice of a timed field. `shape` is the slice shape, without
/// the slice axis.
#[instrument(level = "debug", skip(store, data), fields(n = data.len()))]
pub fn put_slice<B: Backend>(
    store: &mut B,
    cpo_path: &str,
    field_path: &str,
    shape: &Shape,
    data: &DataBuffer,
    mode: SliceMode,
) -> Result<()> {
    if shape.num_points() == 0 {
        return Ok(());
    }
    let etype = data.element_type();
    if etype == ElementType::Text {
        return Err(Error::TypeUnsupported { op: "slice write", ty: etype.to_string() });
    }
    let (group_path, name) = locate(cpo_path, field_path);
    if data.len() != shape.num_points() {
        return Err(Error::ShapeMismatch {
            name: name.to_string(),
            expected: format!("{} elements for {}", shape.num_points(), shape),
            actual: format!("{} elements", data.len()),
        });
    }

    let create = mode == SliceMode::Append;
    with_group(store, GroupId::ROOT, &group_path, create, |store, g| {
        if !store.link_exists(g, name)? {
            if mode == SliceMode::ReplaceLast {
                return Err(Error::not_found(format!("{}/{}", group_path, name)));
            }
            let extent = shape.with_trailing(1);
            let chunk = shape.with_trailing(SLICE_BLOCK);
            store.create_dataset(g, name, &DatasetSpec::extensible(etype, extent.clone(), chunk))?;
            store.write(g, name, &Selection::trailing(&extent, 0, 1), data)?;
            debug!(field = name, "created timed field with first slice");
            return Ok(());
        }

        let info = store.dataset_info(g, name)?;
        check_layout(name, &info, shape, etype)?;
        let slices = info.shape.last().unwrap_or(0);
        match mode {
            SliceMode::Append => {
                let extent = shape.with_trailing(slices + 1);
                store.set_extent(g, name, &extent)?;
                store.write(g, name, &Selection::trailing(&extent, slices, 1), data)?;
            }
            SliceMode::ReplaceLast => {
                if slices == 0 {
                    return Err(Error::OutOfRange { name: name.to_string(), start: 0, end: 1, extent: 0 });
                }
                store.write(g, name, &Selection::trailing(&info.shape, slices - 1, 1), data)?;
            }
        }
        Ok(())
    })
}

/// Read `count` consecutive slices starting at `start`.
///
/// `rank` is the slice rank. The result shape is the slice shape followed by
/// `count`, slice axis fastest.
pub fn read_slices<B: Backend>(
    store: &mut B,
    cpo_path: &str,
    field_path: &str,
    etype: ElementType,
    rank: usize,
    start: usize,
    count: usize,
) -> Result<(Shape, DataBuffer)> {
    if etype == ElementType::Text {
        return Err(Error::TypeUnsupported { op: "slice read", ty: etype.to_string() });
    }
    let (group_path, name) = locate(cpo_path, field_path);
    with_group(store, GroupId::ROOT, &group_path, false, |store, g| {
        let info = store.dataset_info(g, name)?;
        if info.shape.rank() != rank + 1 {
            return Err(Error::ShapeMismatch {
                name: name.to_string(),
                expected: format!("rank {}", rank + 1),
                actual: info.shape.to_string(),
            });
        }
        check_layout(name, &info, &info.shape.leading(), etype)?;

        let extent = info.shape.last().unwrap_or(0);
        if start + count > extent {
            return Err(Error::OutOfRange { name: name.to_string(), start, end: start + count, extent });
        }
        let sel = Selection::trailing(&info.shape, start, count);
        let data = store.read(g, name, &sel)?;
        Ok((sel.output_shape(&info.shape), data))
    })
}
