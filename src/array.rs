//! Whole-array field I/O.
//!
//! A field is addressed by an IDS root path plus a relative path whose last
//! segment is the dataset name: `("equilibrium", "profiles/psi")` names
//! dataset `psi` in group `equilibrium/profiles`.
//!
//! Text is special. A scalar text value is packed into fixed
//! [`TEXT_BLOCK`]-byte blocks, NUL padded, and stored as a rank-1 dataset
//! of blocks. A text array (`shape = [n]`) is stored one string per element.

use std::ops::Range;

use tracing::debug;

use crate::store::{with_group, Backend, DatasetSpec, GroupId, Selection};
use crate::util::{path, DataBuffer, ElementType, Error, Result, Shape};

/// Size in bytes of one packed text block.
pub const TEXT_BLOCK: usize = 132;

/// Split a field address into its group path and dataset name.
pub fn locate<'a>(cpo_path: &str, field_path: &'a str) -> (String, &'a str) {
    match path::split_field(field_path) {
        (Some(dir), name) => (path::join(cpo_path, dir), name),
        (None, name) => (cpo_path.to_string(), name),
    }
}

/// Byte ranges of the blocks a text value is packed into.
///
/// One block per [`TEXT_BLOCK`] bytes, at least one. A block never ends
/// inside a multi-byte character, so non-ASCII text may need an extra block.
pub fn text_block_ranges(s: &str) -> Vec<Range<usize>> {
    let mut ranges = Vec::with_capacity(s.len() / TEXT_BLOCK + 1);
    let mut start = 0;
    while start < s.len() {
        let mut end = (start + TEXT_BLOCK).min(s.len());
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        ranges.push(start..end);
        start = end;
    }
    if ranges.is_empty() {
        ranges.push(0..0);
    }
    ranges
}

/// Pack a text value into NUL-padded blocks.
pub fn pack_text(s: &str) -> Vec<String> {
    text_block_ranges(s)
        .into_iter()
        .map(|r| {
            let mut block = String::with_capacity(TEXT_BLOCK);
            block.push_str(&s[r.clone()]);
            block.extend(std::iter::repeat('\0').take(TEXT_BLOCK - r.len()));
            block
        })
        .collect()
}

/// Join packed blocks, truncating at the first NUL.
pub fn unpack_text(blocks: &[String]) -> String {
    let joined: String = blocks.concat();
    match joined.find('\0') {
        Some(end) => joined[..end].to_string(),
        None => joined,
    }
}

/// Write a whole field, replacing whatever was stored under that name.
///
/// A zero element count deletes the old field and stores nothing. With
/// `timed`, the trailing dimension of the new dataset is unlimited and the
/// chunk covers the full shape.
pub fn put_array<B: Backend>(
    store: &mut B,
    cpo_path: &str,
    field_path: &str,
    shape: &Shape,
    timed: bool,
    data: &DataBuffer,
) -> Result<()> {
    let (group_path, name) = locate(cpo_path, field_path);

    // Scalar text becomes a rank-1 dataset of blocks.
    let (shape, data) = match data {
        DataBuffer::Text(v) if shape.is_scalar() => {
            let s = v.first().map(String::as_str).unwrap_or("");
            let blocks = pack_text(s);
            (Shape::d1(blocks.len()), DataBuffer::Text(blocks))
        }
        _ => (shape.clone(), data.clone()),
    };
    if data.len() != shape.num_points() {
        return Err(Error::ShapeMismatch {
            name: name.to_string(),
            expected: format!("{} elements for {}", shape.num_points(), shape),
            actual: format!("{} elements", data.len()),
        });
    }
    if timed && shape.is_scalar() {
        return Err(Error::ShapeMismatch {
            name: name.to_string(),
            expected: "rank of at least 1 for a timed field".into(),
            actual: shape.to_string(),
        });
    }

    with_group(store, GroupId::ROOT, &group_path, true, |store, g| {
        if store.link_exists(g, name)? {
            store.delete_link(g, name)?;
        }
        if shape.num_points() == 0 {
            debug!(group = %group_path, field = name, "empty field, nothing stored");
            return Ok(());
        }

        let spec = if timed {
            DatasetSpec::extensible(data.element_type(), shape.clone(), shape.clone())
        } else {
            DatasetSpec::fixed(data.element_type(), shape.clone())
        };
        store.create_dataset(g, name, &spec)?;
        store.write(g, name, &Selection::All, &data)?;
        debug!(group = %group_path, field = name, shape = %shape, timed, "stored field");
        Ok(())
    })
}

/// Read a whole field.
///
/// `rank` is the rank the caller expects; a scalar text value (`rank` 0) is
/// stored with rank 1 and comes back re-joined as a single string.
pub fn get_array<B: Backend>(
    store: &mut B,
    cpo_path: &str,
    field_path: &str,
    etype: ElementType,
    rank: usize,
) -> Result<(Shape, DataBuffer)> {
    let (group_path, name) = locate(cpo_path, field_path);
    let packed_text = etype == ElementType::Text && rank == 0;
    let stored_rank = if packed_text { 1 } else { rank };

    with_group(store, GroupId::ROOT, &group_path, false, |store, g| {
        let info = store.dataset_info(g, name)?;
        if info.vlen || info.etype != etype {
            return Err(Error::TypeMismatch {
                name: name.to_string(),
                expected: etype.to_string(),
                actual: if info.vlen { format!("variable-length {}", info.etype) } else { info.etype.to_string() },
            });
        }
        if info.shape.rank() != stored_rank {
            return Err(Error::ShapeMismatch {
                name: name.to_string(),
                expected: format!("rank {}", stored_rank),
                actual: info.shape.to_string(),
            });
        }

        let data = store.read(g, name, &Selection::All)?;
        if packed_text {
            let blocks = data.as_text().unwrap_or(&[]);
            return Ok((Shape::scalar(), DataBuffer::text(unpack_text(blocks))));
        }
        Ok((info.shape, data))
    })
}

/// Remove a field. Missing groups or fields are not an error.
pub fn delete_array<B: Backend>(store: &mut B, cpo_path: &str, field_path: &str) -> Result<()> {
    let (group_path, name) = locate(cpo_path, field_path);
    let result = with_group(store, GroupId::ROOT, &group_path, false, |store, g| {
        if store.link_exists(g, name)? {
            store.delete_link(g, name)?;
        }
        Ok(())
    });
    match result {
        Err(e) if e.is_absence() => Ok(()),
        other => other,
    }
}

/// Stored extent of a field.
pub fn get_dimension<B: Backend>(store: &mut B, cpo_path: &str, field_path: &str) -> Result<Shape> {
    let (group_path, name) = locate(cpo_path, field_path);
    with_group(store, GroupId::ROOT, &group_path, false, |store, g| {
        Ok(store.dataset_info(g, name)?.shape)
    })
}
