/// Dimension bookkeeping for rank <= 4 tensors in NHWC order.
///
/// Filters reuse the same layout with the axes read as
/// (out_channel, filter_y, filter_x, in_channel).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeShape {
    dims: [usize; 4],
    rank: usize,
}

impl RuntimeShape {
    pub fn new(dims: &[usize]) -> Self {
        assert!(dims.len() <= 4, "RuntimeShape supports at most 4 dimensions, got {}", dims.len());
        let mut d = [0usize; 4];
        d[..dims.len()].copy_from_slice(dims);
        Self { dims: d, rank: dims.len() }
    }

    pub fn d4(n: usize, h: usize, w: usize, c: usize) -> Self { Self { dims: [n, h, w, c], rank: 4 } }

    pub fn d1(n: usize) -> Self { Self::new(&[n]) }

    pub fn dimensions_count(&self) -> usize { self.rank }

    #[inline]
    pub fn dims(&self, axis: usize) -> usize {
        debug_assert!(axis < self.rank, "axis {} out of range for rank {}", axis, self.rank);
        self.dims[axis]
    }

    pub fn dims_data(&self) -> &[usize] { &self.dims[..self.rank] }

    pub fn flat_size(&self) -> usize { self.dims_data().iter().product() }

    /// Flat element offset of `(i0, i1, i2, i3)`; `((i0*d1 + i1)*d2 + i2)*d3 + i3`.
    #[inline]
    pub fn offset(&self, i0: usize, i1: usize, i2: usize, i3: usize) -> usize {
        debug_assert_eq!(self.rank, 4);
        let d = &self.dims;
        debug_assert!((d[0] == 0 && i0 == 0) || i0 < d[0]);
        debug_assert!((d[1] == 0 && i1 == 0) || i1 < d[1]);
        debug_assert!((d[2] == 0 && i2 == 0) || i2 < d[2]);
        debug_assert!((d[3] == 0 && i3 == 0) || i3 < d[3]);
        ((i0 * d[1] + i1) * d[2] + i2) * d[3] + i3
    }
}

/// Size shared by `a[ia]` and `b[ib]`; the two must agree.
pub fn matching_dim(a: &RuntimeShape, ia: usize, b: &RuntimeShape, ib: usize) -> usize {
    debug_assert_eq!(a.dims(ia), b.dims(ib), "mismatched dims {}[{}] vs {}[{}]", a.dims(ia), ia, b.dims(ib), ib);
    a.dims(ia)
}
