//! Hyperslab selection for partial dataset I/O.
//!
//! A [`Selection`] describes which elements of a dataset to read or write.
//! Slice I/O only ever needs contiguous blocks, so hyperslabs here carry
//! `start` and `count` per dimension with unit stride.
//!
//! ```ignore
//! // Slices 3..5 of a [4, 10] timed dataset
//! let sel = Selection::slab(&[0, 3], &[4, 2]);
//! assert_eq!(sel.num_elements(&Shape::from(vec![4, 10])), 8);
//! ```

use crate::util::{Error, Result, Shape};

/// Elements of a dataset to access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// The entire dataspace.
    All,
    /// Contiguous block: `start[d]..start[d] + count[d]` in every dimension.
    Hyperslab { start: Vec<usize>, count: Vec<usize> },
}

impl Selection {
    /// Contiguous hyperslab.
    pub fn slab(start: &[usize], count: &[usize]) -> Self {
        Selection::Hyperslab { start: start.to_vec(), count: count.to_vec() }
    }

    /// Slices `start..start + count` along the trailing axis of `shape`,
    /// full range in every other dimension.
    pub fn trailing(shape: &Shape, start: usize, count: usize) -> Self {
        let rank = shape.rank();
        let mut s = vec![0; rank];
        let mut c = shape.sizes().to_vec();
        if rank > 0 {
            s[rank - 1] = start;
            c[rank - 1] = count;
        }
        Selection::Hyperslab { start: s, count: c }
    }

    /// Number of selected elements for a dataspace shape.
    pub fn num_elements(&self, shape: &Shape) -> usize {
        match self {
            Selection::All => shape.num_points(),
            Selection::Hyperslab { count, .. } => count.iter().product(),
        }
    }

    /// Shape of the selected region.
    pub fn output_shape(&self, shape: &Shape) -> Shape {
        match self {
            Selection::All => shape.clone(),
            Selection::Hyperslab { count, .. } => Shape::from_slice(count),
        }
    }

    /// Flat row-major offsets of the selected elements, in row-major order
    /// of the selection.
    pub fn offsets(&self, shape: &Shape) -> Result<Vec<usize>> {
        let (start, count) = match self {
            Selection::All => return Ok((0..shape.num_points()).collect()),
            Selection::Hyperslab { start, count } => (start, count),
        };
        let rank = shape.rank();
        if start.len() != rank || count.len() != rank {
            return Err(Error::store(format!(
                "selection rank {} does not match dataspace rank {}",
                start.len(),
                rank
            )));
        }
        for d in 0..rank {
            if start[d] + count[d] > shape.sizes()[d] {
                return Err(Error::store(format!(
                    "selection {}..{} exceeds dimension {} of {}",
                    start[d],
                    start[d] + count[d],
                    d,
                    shape
                )));
            }
        }

        let total: usize = count.iter().product();
        let strides = shape.strides();
        let mut out = Vec::with_capacity(total);
        if total == 0 {
            return Ok(out);
        }

        // Odometer over the selection, last dimension fastest.
        let mut idx = vec![0usize; rank];
        loop {
            let flat: usize = (0..rank).map(|d| (start[d] + idx[d]) * strides[d]).sum();
            out.push(flat);

            let mut d = rank;
            loop {
                if d == 0 {
                    return Ok(out);
                }
                d -= 1;
                idx[d] += 1;
                if idx[d] < count[d] {
                    break;
                }
                idx[d] = 0;
            }
        }
    }
}
