//! Dataset shapes.
//!
//! A [`Shape`] is the row-major extent of a dataset. For timed datasets the
//! last dimension is the slice axis.

use smallvec::SmallVec;

/// Extent of a dataset or of one slice of it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Shape {
    /// Size of each dimension. Empty means scalar (rank 0).
    dims: SmallVec<[usize; 4]>,
}

impl Shape {
    /// Scalar shape (rank 0).
    pub fn scalar() -> Self {
        Self { dims: SmallVec::new() }
    }

    /// 1D shape.
    pub fn d1(size: usize) -> Self {
        Self { dims: smallvec::smallvec![size] }
    }

    /// Create from a slice of sizes.
    pub fn from_slice(sizes: &[usize]) -> Self {
        Self { dims: SmallVec::from_slice(sizes) }
    }

    /// Shape of `rank` zeros, used for empty reads.
    pub fn zeros(rank: usize) -> Self {
        Self { dims: smallvec::smallvec![0; rank] }
    }

    /// Number of dimensions.
    #[inline]
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Size of one dimension.
    pub fn size(&self, dim: usize) -> Option<usize> {
        self.dims.get(dim).copied()
    }

    /// All dimension sizes.
    pub fn sizes(&self) -> &[usize] {
        &self.dims
    }

    /// Trailing (slice axis) size, if any.
    pub fn last(&self) -> Option<usize> {
        self.dims.last().copied()
    }

    /// Total number of elements. A scalar holds one element.
    pub fn num_points(&self) -> usize {
        self.dims.iter().product()
    }

    #[inline]
    pub fn is_scalar(&self) -> bool {
        self.dims.is_empty()
    }

    /// Set one dimension, extending with ones if needed.
    pub fn set_size(&mut self, dim: usize, size: usize) {
        while self.dims.len() <= dim {
            self.dims.push(1);
        }
        self.dims[dim] = size;
    }

    /// Append a trailing dimension.
    pub fn push(&mut self, size: usize) {
        self.dims.push(size);
    }

    /// Copy of this shape with one more trailing dimension.
    pub fn with_trailing(&self, size: usize) -> Self {
        let mut out = self.clone();
        out.push(size);
        out
    }

    /// All dimensions but the trailing one.
    pub fn leading(&self) -> Self {
        match self.dims.split_last() {
            Some((_, head)) => Self::from_slice(head),
            None => Self::scalar(),
        }
    }

    /// Row-major strides (elements) for each dimension.
    pub fn strides(&self) -> SmallVec<[usize; 4]> {
        let mut strides: SmallVec<[usize; 4]> = smallvec::smallvec![1; self.rank()];
        for d in (0..self.rank().saturating_sub(1)).rev() {
            strides[d] = strides[d + 1] * self.dims[d + 1];
        }
        strides
    }
}

impl From<usize> for Shape {
    fn from(size: usize) -> Self {
        Self::d1(size)
    }
}

impl From<Vec<usize>> for Shape {
    fn from(v: Vec<usize>) -> Self {
        Self { dims: SmallVec::from_vec(v) }
    }
}

impl From<&[usize]> for Shape {
    fn from(v: &[usize]) -> Self {
        Self::from_slice(v)
    }
}

impl std::fmt::Display for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[")?;
        for (i, s) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, " x ")?;
            }
            write!(f, "{}", s)?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar() {
        let s = Shape::scalar();
        assert_eq!(s.rank(), 0);
        assert!(s.is_scalar());
        assert_eq!(s.num_points(), 1);
        assert_eq!(s.to_string(), "[]");
    }

    #[test]
    fn test_trailing() {
        let s = Shape::from(vec![2, 3]);
        let t = s.with_trailing(4);
        assert_eq!(t.sizes(), &[2, 3, 4]);
        assert_eq!(t.last(), Some(4));
        assert_eq!(t.leading(), s);
        assert_eq!(t.num_points(), 24);
        assert_eq!(t.to_string(), "[2 x 3 x 4]");
    }

    #[test]
    fn test_strides_and_zeros() {
        let s = Shape::from(vec![2, 3, 4]);
        assert_eq!(s.strides().as_slice(), &[12, 4, 1]);
        let z = Shape::zeros(2);
        assert_eq!(z.sizes(), &[0, 0]);
        assert_eq!(z.num_points(), 0);
    }
}
