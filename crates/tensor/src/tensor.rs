// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use crate::error::TensorError;
use std::ops::Range;
use std::sync::Arc;

/// N-dimensional container over shared storage.
///
/// A tensor is a view: the storage is reference-counted and shared between
/// views, each view carrying its own shape, per-axis broadcast degree and a
/// list of contiguous storage segments. Broadcasting repeats underlying axes
/// logically without copying; a broadcasted view materializes a private copy
/// before any mutation.
#[derive(Debug, Clone)]
pub struct Tensor<T> {
    storage: Arc<Vec<T>>,
    /// Physical ranges of the underlying (pre-broadcast) elements, in
    /// logical row-major order.
    segments: Vec<Range<usize>>,
    /// Cumulative element counts per segment; `offsets[i]` is the number of
    /// underlying elements before segment `i`. Random access is a binary
    /// search here, so it stays logarithmic in the segment count.
    offsets: Vec<usize>,
    shape: Vec<usize>,
    /// Per-axis broadcast degree. Axis `i` holds `shape[i] / broadcast[i]`
    /// underlying elements, each repeated `broadcast[i]` times.
    broadcast: Vec<usize>,
}

fn product(dims: &[usize]) -> usize {
    dims.iter().product()
}

impl<T> Tensor<T> {
    /// Tensor of the given shape filled with clones of `fill`.
    pub fn new(shape: &[usize], fill: T) -> Self
    where
        T: Clone,
    {
        let n = product(shape);
        Self::with_storage(vec![fill; n], shape.to_vec())
    }

    /// Rank-0 tensor holding a single value.
    pub fn scalar(value: T) -> Self {
        Self::with_storage(vec![value], Vec::new())
    }

    /// Builds a tensor from row-major data.
    pub fn from_vec(shape: &[usize], data: Vec<T>) -> Result<Self, TensorError> {
        let expected = product(shape);
        if data.len() != expected {
            return Err(TensorError::ShapeMismatch {
                expected,
                got: data.len(),
            });
        }
        Ok(Self::with_storage(data, shape.to_vec()))
    }

    /// Builds a tensor by evaluating `f` at every row-major leaf index.
    pub fn from_fn(shape: &[usize], mut f: impl FnMut(usize) -> T) -> Self {
        let n = product(shape);
        Self::with_storage((0..n).map(&mut f).collect(), shape.to_vec())
    }

    fn with_storage(data: Vec<T>, shape: Vec<usize>) -> Self {
        let n = data.len();
        let rank = shape.len();
        Tensor {
            storage: Arc::new(data),
            segments: vec![0..n],
            offsets: vec![0, n],
            shape,
            broadcast: vec![1; rank],
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn num_elements(&self) -> usize {
        product(&self.shape)
    }

    pub fn is_broadcasted(&self) -> bool {
        self.broadcast.iter().any(|&b| b != 1)
    }

    fn underlying_dims(&self) -> Vec<usize> {
        self.shape
            .iter()
            .zip(&self.broadcast)
            .map(|(&s, &b)| s / b)
            .collect()
    }

    /// Maps a logical row-major index to its storage position.
    fn physical(&self, logical: usize) -> usize {
        let dims = self.underlying_dims();
        let mut rem = logical;
        let mut u = 0;
        for axis in 0..self.shape.len() {
            let tail: usize = product(&self.shape[axis + 1..]);
            let idx = (rem / tail) % (dims[axis].max(1) * self.broadcast[axis]);
            rem %= tail;
            u = u * dims[axis] + idx % dims[axis].max(1);
        }
        // Scalar tensors have an empty shape and a single element.
        self.locate(u)
    }

    /// Resolves an underlying linear index through the segment table.
    fn locate(&self, u: usize) -> usize {
        let seg = self.offsets.partition_point(|&o| o <= u) - 1;
        self.segments[seg].start + (u - self.offsets[seg])
    }

    /// Reference to the leaf at a full multi-index.
    pub fn get(&self, index: &[usize]) -> Result<&T, TensorError> {
        if index.len() != self.rank() {
            return Err(TensorError::RankMismatch {
                expected: self.rank(),
                got: index.len(),
            });
        }
        let mut linear = 0;
        for (axis, (&i, &dim)) in index.iter().zip(&self.shape).enumerate() {
            if i >= dim {
                return Err(TensorError::IndexOutOfBounds { index: i, size: dim });
            }
            linear = linear * self.shape[axis] + i;
        }
        Ok(&self.storage[self.physical(linear)])
    }

    /// Leaf at position `i` of a rank-1 tensor.
    pub fn at(&self, i: usize) -> Result<&T, TensorError> {
        if self.rank() != 1 {
            return Err(TensorError::RankMismatch {
                expected: 1,
                got: self.rank(),
            });
        }
        self.get(&[i])
    }

    /// Leaf at `(row, col)` of a rank-2 tensor.
    pub fn at2(&self, row: usize, col: usize) -> Result<&T, TensorError> {
        if self.rank() != 2 {
            return Err(TensorError::RankMismatch {
                expected: 2,
                got: self.rank(),
            });
        }
        self.get(&[row, col])
    }

    /// The single leaf of a one-element tensor, if it is one.
    pub fn value(&self) -> Option<&T> {
        if self.num_elements() == 1 {
            Some(&self.storage[self.physical(0)])
        } else {
            None
        }
    }

    /// Visits every logical leaf exactly once, row-major.
    pub fn walk(&self, mut f: impl FnMut(&T)) {
        for i in 0..self.num_elements() {
            f(&self.storage[self.physical(i)]);
        }
    }

    /// References to all logical leaves, row-major.
    pub fn leaves(&self) -> Vec<&T> {
        (0..self.num_elements())
            .map(|i| &self.storage[self.physical(i)])
            .collect()
    }

    /// Clones all logical leaves into a row-major vector.
    pub fn to_vec(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.leaves().into_iter().cloned().collect()
    }

    /// Replaces a broadcasted view with a private contiguous copy holding
    /// one storage element per logical leaf.
    fn decay(&mut self)
    where
        T: Clone,
    {
        let data = self.to_vec();
        let shape = std::mem::take(&mut self.shape);
        *self = Self::with_storage(data, shape);
    }

    /// Guarantees private, contiguous storage in logical order. Broadcasted
    /// or shared views copy; exclusive contiguous tensors are left alone.
    fn make_exclusive(&mut self)
    where
        T: Clone,
    {
        let contiguous = self.segments.len() == 1
            && self.segments[0] == (0..self.storage.len())
            && !self.is_broadcasted();
        if contiguous && Arc::get_mut(&mut self.storage).is_some() {
            return;
        }
        self.decay();
    }

    /// Mutable reference to the leaf at a full multi-index. Broadcasted
    /// views materialize first, so mutation never aliases.
    pub fn get_mut(&mut self, index: &[usize]) -> Result<&mut T, TensorError>
    where
        T: Clone,
    {
        if index.len() != self.rank() {
            return Err(TensorError::RankMismatch {
                expected: self.rank(),
                got: index.len(),
            });
        }
        let mut linear = 0;
        for (&i, &dim) in index.iter().zip(&self.shape) {
            if i >= dim {
                return Err(TensorError::IndexOutOfBounds { index: i, size: dim });
            }
            linear = linear * dim + i;
        }
        self.make_exclusive();
        let storage =
            Arc::get_mut(&mut self.storage).expect("storage is exclusive after make_exclusive");
        Ok(&mut storage[linear])
    }

    /// Visits every leaf mutably exactly once, row-major. Broadcasted views
    /// materialize a contiguous copy first.
    pub fn walk_mut(&mut self, mut f: impl FnMut(&mut T))
    where
        T: Clone,
    {
        self.make_exclusive();
        let storage =
            Arc::get_mut(&mut self.storage).expect("storage is exclusive after make_exclusive");
        for leaf in storage.iter_mut() {
            f(leaf);
        }
    }

    /// Reinterprets the leaves under a new shape with the same element
    /// count. Broadcasted views copy their logical contents first.
    pub fn reshape(&mut self, new_shape: &[usize]) -> Result<(), TensorError>
    where
        T: Clone,
    {
        let expected = self.num_elements();
        let got = product(new_shape);
        if expected != got {
            return Err(TensorError::ShapeMismatch { expected, got });
        }
        if self.is_broadcasted() {
            self.decay();
        }
        self.shape = new_shape.to_vec();
        self.broadcast = vec![1; new_shape.len()];
        Ok(())
    }

    /// Collapses all axes from `axis` onward into one.
    pub fn flatten_from(&mut self, axis: usize) -> Result<(), TensorError>
    where
        T: Clone,
    {
        if axis >= self.rank() {
            return Err(TensorError::RankMismatch {
                expected: axis + 1,
                got: self.rank(),
            });
        }
        if self.broadcast[axis..].iter().any(|&b| b != 1) {
            self.decay();
        }
        let tail = product(&self.shape[axis..]);
        let mut shape = self.shape[..axis].to_vec();
        shape.push(tail);
        let mut broadcast = self.broadcast[..axis].to_vec();
        broadcast.push(1);
        self.shape = shape;
        self.broadcast = broadcast;
        Ok(())
    }

    /// Collapses the whole tensor to rank 1.
    pub fn flatten(&mut self)
    where
        T: Clone,
    {
        if self.is_broadcasted() {
            self.decay();
        }
        self.shape = vec![self.num_elements()];
        self.broadcast = vec![1];
    }

    /// Pure broadcast view. Trailing axes align with the source; every
    /// aligned target dimension must be a positive integer multiple of its
    /// source dimension, leading axes are new.
    pub fn broadcast(&self, new_shape: &[usize]) -> Result<Tensor<T>, TensorError> {
        let mismatch = || TensorError::BroadcastMismatch {
            from: self.shape.clone(),
            to: new_shape.to_vec(),
        };
        if new_shape.len() < self.rank() || new_shape.iter().any(|&d| d == 0) {
            return Err(mismatch());
        }
        let diff = new_shape.len() - self.rank();
        let mut degree = Vec::with_capacity(new_shape.len());
        for (i, &dim) in new_shape.iter().enumerate() {
            if i < diff {
                degree.push(dim);
            } else {
                let src = self.shape[i - diff];
                if src == 0 || dim % src != 0 {
                    return Err(mismatch());
                }
                degree.push(dim / src * self.broadcast[i - diff]);
            }
        }
        Ok(Tensor {
            storage: Arc::clone(&self.storage),
            segments: self.segments.clone(),
            offsets: self.offsets.clone(),
            shape: new_shape.to_vec(),
            broadcast: degree,
        })
    }

    /// Sub-view at position `i` along axis 0, sharing storage.
    pub fn subview(&self, i: usize) -> Result<Tensor<T>, TensorError> {
        if self.rank() == 0 {
            return Err(TensorError::RankMismatch {
                expected: 1,
                got: 0,
            });
        }
        if i >= self.shape[0] {
            return Err(TensorError::IndexOutOfBounds {
                index: i,
                size: self.shape[0],
            });
        }
        let dims = self.underlying_dims();
        let sub_len: usize = product(&dims[1..]);
        let u0 = i % dims[0].max(1);
        let (segments, offsets) = self.slice_segments(u0 * sub_len, (u0 + 1) * sub_len);
        Ok(Tensor {
            storage: Arc::clone(&self.storage),
            segments,
            offsets,
            shape: self.shape[1..].to_vec(),
            broadcast: self.broadcast[1..].to_vec(),
        })
    }

    /// Iterator over axis-0 sub-views. Each step advances a cursor only;
    /// views are built lazily.
    pub fn iter_axis0(&self) -> Axis0Iter<'_, T> {
        Axis0Iter { tensor: self, i: 0 }
    }

    /// Clips the segment table to the underlying range `[start, end)`.
    fn slice_segments(&self, start: usize, end: usize) -> (Vec<Range<usize>>, Vec<usize>) {
        let mut segments = Vec::new();
        let mut offsets = vec![0];
        if start >= end {
            return (segments, offsets);
        }
        let mut covered = 0;
        let first = self.offsets.partition_point(|&o| o <= start) - 1;
        for (seg, range) in self.segments.iter().enumerate().skip(first) {
            let seg_start = self.offsets[seg];
            let seg_len = range.end - range.start;
            if seg_start >= end {
                break;
            }
            let lo = start.max(seg_start) - seg_start;
            let hi = end.min(seg_start + seg_len) - seg_start;
            if lo >= hi {
                continue;
            }
            segments.push(range.start + lo..range.start + hi);
            covered += hi - lo;
            offsets.push(covered);
        }
        (segments, offsets)
    }
}

impl<T: PartialEq> PartialEq for Tensor<T> {
    fn eq(&self, other: &Self) -> bool {
        self.shape == other.shape && self.leaves() == other.leaves()
    }
}

pub struct Axis0Iter<'a, T> {
    tensor: &'a Tensor<T>,
    i: usize,
}

impl<'a, T> Iterator for Axis0Iter<'a, T> {
    type Item = Tensor<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.tensor.rank() == 0 || self.i >= self.tensor.shape()[0] {
            return None;
        }
        let view = self.tensor.subview(self.i).ok()?;
        self.i += 1;
        Some(view)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_fill_and_indexing() {
        let t = Tensor::new(&[2, 3], 7u32);
        assert_eq!(t.shape(), &[2, 3]);
        assert_eq!(t.rank(), 2);
        assert_eq!(t.num_elements(), 6);
        assert_eq!(*t.at2(1, 2).unwrap(), 7);
        assert!(t.at(0).is_err());
    }

    #[test]
    fn from_vec_rejects_bad_shape() {
        let err = Tensor::from_vec(&[2, 2], vec![1, 2, 3]).unwrap_err();
        assert_eq!(err, TensorError::ShapeMismatch { expected: 4, got: 3 });
    }

    #[test]
    fn reshape_preserves_row_major_order() {
        let mut t = Tensor::from_fn(&[2, 3], |i| i);
        t.reshape(&[3, 2]).unwrap();
        assert_eq!(*t.at2(2, 1).unwrap(), 5);
        assert!(t.reshape(&[4, 2]).is_err());
    }

    #[test]
    fn broadcast_repeats_modulo_source() {
        let base = Tensor::from_fn(&[2, 3], |i| i);
        let view = base.broadcast(&[4, 6]).unwrap();
        assert!(view.is_broadcasted());
        for i in 0..4 {
            for j in 0..6 {
                assert_eq!(view.at2(i, j).unwrap(), base.at2(i % 2, j % 3).unwrap());
            }
        }
    }

    #[test]
    fn broadcast_adds_leading_axes() {
        let base = Tensor::from_fn(&[3], |i| i as i64);
        let view = base.broadcast(&[2, 3]).unwrap();
        assert_eq!(view.shape(), &[2, 3]);
        assert_eq!(*view.at2(1, 2).unwrap(), 2);
        assert!(base.broadcast(&[4]).is_err());
        assert!(base.broadcast(&[0, 3]).is_err());
    }

    #[test]
    fn walk_visits_each_logical_leaf_once() {
        let base = Tensor::from_fn(&[2, 2], |i| i);
        let view = base.broadcast(&[4, 2]).unwrap();
        let mut seen = Vec::new();
        view.walk(|&v| seen.push(v));
        assert_eq!(seen, vec![0, 1, 2, 3, 0, 1, 2, 3]);
    }

    #[test]
    fn walk_mut_materializes_broadcast_views() {
        let base = Tensor::from_fn(&[2], |i| i);
        let mut view = base.broadcast(&[4]).unwrap();
        let mut c = 0;
        view.walk_mut(|v| {
            *v = c;
            c += 1;
        });
        assert_eq!(view.to_vec(), vec![0, 1, 2, 3]);
        // the original is untouched
        assert_eq!(base.to_vec(), vec![0, 1]);
    }

    #[test]
    fn mutation_does_not_leak_into_shared_views() {
        let a = Tensor::from_fn(&[3], |i| i);
        let mut b = a.clone();
        *b.get_mut(&[0]).unwrap() = 99;
        assert_eq!(*a.at(0).unwrap(), 0);
        assert_eq!(*b.at(0).unwrap(), 99);
    }

    #[test]
    fn axis0_subviews_share_storage() {
        let t = Tensor::from_fn(&[3, 4], |i| i);
        let rows: Vec<_> = t.iter_axis0().collect();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2].shape(), &[4]);
        assert_eq!(*rows[2].at(1).unwrap(), 9);
    }

    #[test]
    fn subview_of_broadcast_view() {
        let base = Tensor::from_fn(&[2, 2], |i| i);
        let view = base.broadcast(&[6, 2]).unwrap();
        let row4 = view.subview(4).unwrap();
        assert_eq!(row4.to_vec(), vec![0, 1]);
        let row5 = view.subview(5).unwrap();
        assert_eq!(row5.to_vec(), vec![2, 3]);
    }

    #[test]
    fn flatten_from_collapses_trailing_axes() {
        let mut t = Tensor::from_fn(&[2, 3, 4], |i| i);
        t.flatten_from(1).unwrap();
        assert_eq!(t.shape(), &[2, 12]);
        assert_eq!(*t.at2(1, 11).unwrap(), 23);
    }

    #[test]
    fn scalar_tensors() {
        let t = Tensor::scalar(42);
        assert_eq!(t.rank(), 0);
        assert_eq!(t.num_elements(), 1);
        assert_eq!(t.value(), Some(&42));
    }
}
