use crate::shape::RuntimeShape;

/// Read-only view over a caller-owned buffer and its shape.
#[derive(Debug, Clone, Copy)]
pub struct TensorView<'a, T> {
    pub shape: &'a RuntimeShape,
    pub data: &'a [T],
}

/// Mutable view over a caller-owned output buffer.
#[derive(Debug)]
pub struct TensorViewMut<'a, T> {
    pub shape: &'a RuntimeShape,
    pub data: &'a mut [T],
}

impl<'a, T> TensorView<'a, T> {
    pub fn new(shape: &'a RuntimeShape, data: &'a [T]) -> Self { Self { shape, data } }
}

impl<'a, T> TensorViewMut<'a, T> {
    pub fn new(shape: &'a RuntimeShape, data: &'a mut [T]) -> Self { Self { shape, data } }
}

/// Owned tensor used by the harness, tests and benches to allocate buffers
/// before handing views to the kernels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tensor<T> {
    pub shape: RuntimeShape,
    pub data: Vec<T>,
}

impl<T: Copy + Default> Tensor<T> {
    pub fn zeros(shape: RuntimeShape) -> Self {
        let n = shape.flat_size();
        Self { shape, data: vec![T::default(); n] }
    }

    pub fn filled(shape: RuntimeShape, value: T) -> Self {
        let n = shape.flat_size();
        Self { shape, data: vec![value; n] }
    }

    /// Panics if `data` does not hold exactly `shape.flat_size()` elements.
    pub fn from_vec(shape: RuntimeShape, data: Vec<T>) -> Self {
        assert_eq!(data.len(), shape.flat_size(), "tensor data length does not match shape {:?}", shape.dims_data());
        Self { shape, data }
    }

    pub fn view(&self) -> TensorView<'_, T> { TensorView { shape: &self.shape, data: &self.data } }

    pub fn view_mut(&mut self) -> TensorViewMut<'_, T> { TensorViewMut { shape: &self.shape, data: &mut self.data } }

    pub fn at(&self, b: usize, y: usize, x: usize, c: usize) -> T { self.data[self.shape.offset(b, y, x, c)] }

    pub fn set(&mut self, b: usize, y: usize, x: usize, c: usize, value: T) {
        let idx = self.shape.offset(b, y, x, c);
        self.data[idx] = value;
    }
}
