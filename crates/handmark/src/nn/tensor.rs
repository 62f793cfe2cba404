//! Dense `f32` tensors passed into and out of neural networks.
//!
//! Data is stored contiguously in row-major order. Indexing always selects a *prefix* of the
//! dimensions, which keeps every view contiguous and lets it borrow a plain slice.

use std::fmt;

use anyhow::ensure;
use tinyvec::TinyVec;

type Shape = TinyVec<[usize; 4]>;

/// An owned, N-dimensional array of `f32`s.
#[derive(Clone, PartialEq)]
pub struct Tensor {
    shape: Shape,
    data: Box<[f32]>,
}

/// A borrowed sub-tensor, produced by [`Tensor::index`] or [`TensorView::iter`].
#[derive(Clone, Copy)]
pub struct TensorView<'a> {
    shape: &'a [usize],
    data: &'a [f32],
}

impl Tensor {
    /// Creates a tensor from row-major `data`.
    ///
    /// Fails if the number of elements does not match `shape`.
    pub fn from_vec(shape: &[usize], data: Vec<f32>) -> anyhow::Result<Self> {
        let elements: usize = shape.iter().product();
        ensure!(
            elements == data.len(),
            "tensor of shape {:?} needs {} elements, got {}",
            shape,
            elements,
            data.len(),
        );
        Ok(Self {
            shape: shape.iter().copied().collect(),
            data: data.into_boxed_slice(),
        })
    }

    /// Creates a tensor by calling `f` with the index of every element, in row-major order.
    pub fn from_shape_fn<const N: usize>(
        shape: [usize; N],
        mut f: impl FnMut([usize; N]) -> f32,
    ) -> Self {
        let len = shape.iter().product();
        let mut data = Vec::with_capacity(len);
        let mut index = [0; N];
        for _ in 0..len {
            data.push(f(index));
            // Increment the multi-index like an odometer.
            for (i, size) in index.iter_mut().zip(shape).rev() {
                *i += 1;
                if *i < size {
                    break;
                }
                *i = 0;
            }
        }
        Self {
            shape: shape.iter().copied().collect(),
            data: data.into_boxed_slice(),
        }
    }

    pub(super) fn from_tract(tract: &tract_onnx::prelude::Tensor) -> anyhow::Result<Self> {
        let data = tract.as_slice::<f32>()?.to_vec();
        Self::from_vec(tract.shape(), data)
    }

    pub(super) fn to_tract(&self) -> anyhow::Result<tract_onnx::prelude::Tensor> {
        Ok(tract_onnx::prelude::Tensor::from_shape(
            &self.shape,
            &self.data,
        )?)
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn view(&self) -> TensorView<'_> {
        TensorView {
            shape: &self.shape,
            data: &self.data,
        }
    }

    /// Selects the sub-tensor at `indices`, which index the outermost dimensions.
    ///
    /// # Panics
    ///
    /// Panics if there are more indices than dimensions or an index is out of bounds.
    pub fn index<const N: usize>(&self, indices: [usize; N]) -> TensorView<'_> {
        self.view().index(indices)
    }

    /// Iterates over the sub-tensors along the outermost dimension.
    pub fn iter(&self) -> impl Iterator<Item = TensorView<'_>> + '_ {
        self.view().iter()
    }

    /// Returns the data of a tensor with at most one dimension.
    pub fn as_slice(&self) -> &[f32] {
        self.view().as_slice()
    }

    /// Returns the single value of a zero-dimensional tensor.
    pub fn as_singular(&self) -> f32 {
        self.view().as_singular()
    }
}

impl<'a> TensorView<'a> {
    pub fn shape(&self) -> &'a [usize] {
        self.shape
    }

    /// Like [`Tensor::index`].
    pub fn index<const N: usize>(self, indices: [usize; N]) -> TensorView<'a> {
        assert!(
            N <= self.shape.len(),
            "cannot index tensor of shape {:?} with {} indices",
            self.shape,
            N,
        );
        let mut view = self;
        for index in indices {
            let size = view.shape[0];
            assert!(
                index < size,
                "index {index} out of bounds for dimension of size {size}"
            );
            let stride = view.data.len() / size.max(1);
            view = TensorView {
                shape: &view.shape[1..],
                data: &view.data[index * stride..(index + 1) * stride],
            };
        }
        view
    }

    pub fn iter(self) -> impl Iterator<Item = TensorView<'a>> + 'a {
        let outer = self.shape.first().copied().unwrap_or(0);
        (0..outer).map(move |i| self.index([i]))
    }

    pub fn as_slice(&self) -> &'a [f32] {
        assert!(
            self.shape.len() <= 1,
            "`as_slice` called on tensor of shape {:?}",
            self.shape,
        );
        self.data
    }

    pub fn as_singular(&self) -> f32 {
        assert!(
            self.shape.is_empty(),
            "`as_singular` called on tensor of shape {:?}",
            self.shape,
        );
        self.data[0]
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.view().fmt(f)
    }
}

impl fmt::Debug for TensorView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.shape {
            [] => write!(f, "{}", self.data[0]),
            [_] => f.debug_list().entries(self.data).finish(),
            _ => f.debug_list().entries(self.iter()).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_fn_runs_in_row_major_order() {
        let t = Tensor::from_shape_fn([2, 3], |[y, x]| (y * 10 + x) as f32);
        assert_eq!(t.shape(), &[2, 3]);
        assert_eq!(&*t.data, &[0.0, 1.0, 2.0, 10.0, 11.0, 12.0]);
        assert_eq!(t.index([1]).as_slice(), &[10.0, 11.0, 12.0]);
        assert_eq!(t.index([1, 2]).as_singular(), 12.0);
    }

    #[test]
    fn empty_dimension() {
        let t = Tensor::from_shape_fn([2, 0, 3], |_| unreachable!());
        assert_eq!(t.shape(), &[2, 0, 3]);
        assert_eq!(t.index([1]).iter().count(), 0);
    }

    #[test]
    fn from_vec_checks_length() {
        assert!(Tensor::from_vec(&[1, 63], vec![0.0; 62]).is_err());
        let t = Tensor::from_vec(&[1, 1], vec![0.25]).unwrap();
        assert_eq!(t.index([0, 0]).as_singular(), 0.25);
    }

    #[test]
    fn iterate_outer_dimension() {
        let t = Tensor::from_shape_fn([1, 3, 2], |[_, i, c]| (i * 2 + c) as f32);
        let rows: Vec<_> = t.index([0]).iter().map(|v| v.as_slice().to_vec()).collect();
        assert_eq!(rows, [[0.0, 1.0], [2.0, 3.0], [4.0, 5.0]]);
        assert_eq!(format!("{t:?}"), "[[[0.0, 1.0], [2.0, 3.0], [4.0, 5.0]]]");
    }

    #[test]
    #[should_panic]
    fn out_of_bounds_index() {
        Tensor::from_shape_fn([2], |_| 0.0).index([2]);
    }
}
