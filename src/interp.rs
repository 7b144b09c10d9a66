//! Slice reads at an arbitrary time.
//!
//! The caller has already located the time vector entries bracketing the
//! requested time; this module reads those one or two slices and combines
//! them according to an [`InterpolationPolicy`].

use crate::slice::read_slices;
use crate::store::Backend;
use crate::util::{DataBuffer, ElementType, Error, Result, Shape};

/// How two bracketing slices are combined.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum InterpolationPolicy {
    /// Linear interpolation between the two slices.
    #[default]
    Interpolation,
    /// Whichever slice is nearer in time; ties go right.
    ClosestSample,
    /// Always the left slice.
    PreviousSample,
}

impl InterpolationPolicy {
    /// Numeric mode code used by the outer dispatcher.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(Self::ClosestSample),
            2 => Some(Self::PreviousSample),
            3 => Some(Self::Interpolation),
            _ => None,
        }
    }
}

/// A requested time and the slice(s) bracketing it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SliceQuery {
    pub time: f64,
    /// (slice index, slice time) at or before `time`.
    pub left: (usize, f64),
    /// Following slice, absent when `left` is the only candidate.
    pub right: Option<(usize, f64)>,
}

impl SliceQuery {
    /// Query answered by a single slice.
    pub fn single(time: f64, index: usize, slice_time: f64) -> Self {
        Self { time, left: (index, slice_time), right: None }
    }

    /// Query bracketed by two slices.
    pub fn between(time: f64, left: (usize, f64), right: (usize, f64)) -> Self {
        Self { time, left, right: Some(right) }
    }

    /// True if the left slice is strictly nearer than the right one.
    pub fn left_is_closer(&self) -> bool {
        match self.right {
            Some((_, t2)) => self.time - self.left.1 < t2 - self.time,
            None => true,
        }
    }

    /// Index of the nearer slice.
    pub fn nearest_index(&self) -> usize {
        match self.right {
            Some((idx2, _)) if !self.left_is_closer() => idx2,
            _ => self.left.0,
        }
    }
}

/// One slice of a field at a requested time.
#[derive(Clone, Debug, PartialEq)]
pub struct InterpolatedSlice {
    pub shape: Shape,
    pub data: DataBuffer,
    /// Time the returned data belongs to.
    pub time: f64,
}

/// Split interleaved `[e0s0, e0s1, e1s0, e1s1, ..]` pairs and combine them.
fn combine<T: Copy>(pairs: &[T], f: impl Fn(T, T) -> T) -> Vec<T> {
    pairs.chunks_exact(2).map(|p| f(p[0], p[1])).collect()
}

fn pick<T>(left: bool) -> impl Fn(T, T) -> T {
    move |a, b| if left { a } else { b }
}

fn lerp(y1: f64, y2: f64, dt: f64) -> f64 {
    y1 + (y2 - y1) * dt
}

/// Read a field at `query.time`.
pub fn get_slice_interpolated<B: Backend>(
    store: &mut B,
    cpo_path: &str,
    field_path: &str,
    etype: ElementType,
    rank: usize,
    query: &SliceQuery,
    policy: InterpolationPolicy,
) -> Result<InterpolatedSlice> {
    if etype == ElementType::Text {
        return Err(Error::TypeUnsupported { op: "interpolated slice read", ty: etype.to_string() });
    }
    let (idx1, t1) = query.left;

    let Some((_, t2)) = query.right else {
        let (shape, data) = read_slices(store, cpo_path, field_path, etype, rank, idx1, 1)?;
        return Ok(InterpolatedSlice { shape: shape.leading(), data, time: t1 });
    };

    let (shape, pairs) = read_slices(store, cpo_path, field_path, etype, rank, idx1, 2)?;
    let take_left = match policy {
        // Coincident samples: nothing to blend.
        InterpolationPolicy::Interpolation if t2 == t1 => Some(true),
        InterpolationPolicy::Interpolation => None,
        InterpolationPolicy::ClosestSample => Some(query.left_is_closer()),
        InterpolationPolicy::PreviousSample => Some(true),
    };

    let text_err = || Error::TypeUnsupported { op: "interpolated slice read", ty: etype.to_string() };
    let (data, time) = match take_left {
        Some(left) => {
            let data = match &pairs {
                DataBuffer::Int(v) => DataBuffer::Int(combine(v, pick(left))),
                DataBuffer::Float(v) => DataBuffer::Float(combine(v, pick(left))),
                DataBuffer::Double(v) => DataBuffer::Double(combine(v, pick(left))),
                DataBuffer::Text(_) => return Err(text_err()),
            };
            (data, if left { t1 } else { t2 })
        }
        None => {
            let dt = (query.time - t1) / (t2 - t1);
            let data = match &pairs {
                DataBuffer::Int(v) => DataBuffer::Int(combine(v, |a, b| lerp(a as f64, b as f64, dt) as i32)),
                DataBuffer::Float(v) => DataBuffer::Float(combine(v, |a, b| lerp(a as f64, b as f64, dt) as f32)),
                DataBuffer::Double(v) => DataBuffer::Double(combine(v, |a, b| lerp(a, b, dt))),
                DataBuffer::Text(_) => return Err(text_err()),
            };
            (data, query.time)
        }
    };

    Ok(InterpolatedSlice { shape: shape.leading(), data, time })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slice::{put_slice, SliceMode};
    use crate::store::ArchiveStore;

    fn store_with(values: &[f64]) -> (tempfile::TempDir, ArchiveStore) {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ArchiveStore::create_new(&dir.path().join("i.hd5")).unwrap();
        for v in values {
            put_slice(&mut store, "ids", "x", &Shape::scalar(), &DataBuffer::from(vec![*v]), SliceMode::Append)
                .unwrap();
        }
        (dir, store)
    }

    #[test]
    fn test_policies() {
        let (_dir, mut store) = store_with(&[2.0, 6.0]);
        let q = SliceQuery::between(1.5, (0, 1.0), (1, 2.0));

        let r = get_slice_interpolated(&mut store, "ids", "x", ElementType::Double, 0, &q, InterpolationPolicy::Interpolation)
            .unwrap();
        assert_eq!(r.data, DataBuffer::Double(vec![4.0]));
        assert_eq!(r.time, 1.5);
        assert!(r.shape.is_scalar());

        // Equidistant: ties go right.
        let r = get_slice_interpolated(&mut store, "ids", "x", ElementType::Double, 0, &q, InterpolationPolicy::ClosestSample)
            .unwrap();
        assert_eq!(r.data, DataBuffer::Double(vec![6.0]));
        assert_eq!(r.time, 2.0);

        let r = get_slice_interpolated(&mut store, "ids", "x", ElementType::Double, 0, &q, InterpolationPolicy::PreviousSample)
            .unwrap();
        assert_eq!(r.data, DataBuffer::Double(vec![2.0]));
        assert_eq!(r.time, 1.0);
    }

    #[test]
    fn test_single_slice_ignores_policy() {
        let (_dir, mut store) = store_with(&[2.0, 6.0]);
        let q = SliceQuery::single(7.0, 1, 2.0);
        let r = get_slice_interpolated(&mut store, "ids", "x", ElementType::Double, 0, &q, InterpolationPolicy::Interpolation)
            .unwrap();
        assert_eq!(r.data, DataBuffer::Double(vec![6.0]));
        assert_eq!(r.time, 2.0);
    }

    #[test]
    fn test_int_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ArchiveStore::create_new(&dir.path().join("n.hd5")).unwrap();
        for v in [[0, 10], [3, -10]] {
            put_slice(&mut store, "ids", "n", &Shape::d1(2), &DataBuffer::from(v.to_vec()), SliceMode::Append)
                .unwrap();
        }
        let q = SliceQuery::between(0.5, (0, 0.0), (1, 1.0));
        let r = get_slice_interpolated(&mut store, "ids", "n", ElementType::Int, 1, &q, InterpolationPolicy::Interpolation)
            .unwrap();
        // 1.5 -> 1, 0.0 -> 0
        assert_eq!(r.data, DataBuffer::Int(vec![1, 0]));
        assert_eq!(r.shape.sizes(), &[2]);
    }

    #[test]
    fn test_coincident_times_take_left() {
        let (_dir, mut store) = store_with(&[2.0, 6.0]);
        let q = SliceQuery::between(1.0, (0, 1.0), (1, 1.0));
        let r = get_slice_interpolated(&mut store, "ids", "x", ElementType::Double, 0, &q, InterpolationPolicy::Interpolation)
            .unwrap();
        assert_eq!(r.data, DataBuffer::Double(vec![2.0]));
        assert_eq!(r.time, 1.0);
    }

    #[test]
    fn test_nearest_index() {
        assert_eq!(SliceQuery::between(1.2, (4, 1.0), (5, 2.0)).nearest_index(), 4);
        assert_eq!(SliceQuery::between(1.5, (4, 1.0), (5, 2.0)).nearest_index(), 5);
        assert_eq!(SliceQuery::single(9.0, 4, 1.0).nearest_index(), 4);
        assert_eq!(InterpolationPolicy::from_code(1), Some(InterpolationPolicy::ClosestSample));
        assert_eq!(InterpolationPolicy::from_code(0), None);
    }

    #[test]
    fn test_text_rejected() {
        let (_dir, mut store) = store_with(&[1.0]);
        let q = SliceQuery::single(0.0, 0, 0.0);
        let err = get_slice_interpolated(&mut store, "ids", "x", ElementType::Text, 0, &q, InterpolationPolicy::Interpolation)
            .unwrap_err();
        assert!(matches!(err, Error::TypeUnsupported { .. }));
    }
}
