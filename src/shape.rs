//! Shape algebra: broadcasting compatibility/expansion, axis reduction, and
//! the gradient shape-recovery operations used by the autograd engine.
//!
//! A [`Shape`] is a fixed-size `[usize; 4]` where a `0` entry terminates the
//! shape (trailing zeros mean "this axis does not exist"), matching
//! `spec.md` §3's data model exactly.

use crate::diagnostics::fatal;

pub(crate) const MAX_RANK: usize = 4;

/// A rank-≤4 tensor shape. Trailing zero entries mean "this axis does not
/// exist"; an all-zero shape is a scalar with exactly one element.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Shape(pub(crate) [usize; MAX_RANK]);

impl Shape {
    /// Builds a shape from up to four leading dimensions; `dims` must not
    /// contain an interior zero (zeros may only trail).
    pub fn new(dims: &[usize]) -> Self {
        assert!(
            dims.len() <= MAX_RANK,
            "shape violation: rank {} exceeds the maximum supported rank of {MAX_RANK}",
            dims.len()
        );
        let mut out = [0usize; MAX_RANK];
        out[..dims.len()].copy_from_slice(dims);
        let s = Shape(out);
        s.validate();
        s
    }

    /// The scalar shape `[]` (rank 0, one element).
    pub fn scalar() -> Self {
        Shape([0; MAX_RANK])
    }

    fn validate(&self) {
        let mut seen_zero = false;
        for &d in self.0.iter() {
            if d == 0 {
                seen_zero = true;
            } else if seen_zero {
                fatal(format!(
                    "domain violation: shape {self:?} has a nonzero dimension after a zero dimension"
                ));
            }
        }
    }

    /// Number of leading nonzero entries.
    pub fn rank(&self) -> usize {
        self.0.iter().take_while(|&&d| d != 0).count()
    }

    /// The nonzero prefix of the shape, i.e. the dims that actually exist.
    pub fn dims(&self) -> &[usize] {
        &self.0[..self.rank()]
    }

    /// Total number of elements (product of nonzero entries; 1 for a scalar).
    pub fn numel(&self) -> usize {
        if self.rank() == 0 {
            1
        } else {
            self.dims().iter().product()
        }
    }

    /// Row-major strides for the nonzero prefix (last dimension varies
    /// fastest).
    pub(crate) fn strides(&self) -> [usize; MAX_RANK] {
        let r = self.rank();
        let mut strides = [0usize; MAX_RANK];
        let mut acc = 1usize;
        for i in (0..r).rev() {
            strides[i] = acc;
            acc *= self.0[i];
        }
        strides
    }

    /// Python-style negative-index axis normalization. Fatal if out of range.
    pub fn normalize_axis(&self, axis: i32) -> usize {
        normalize_axis_for_rank(axis, self.rank())
    }

    /// Shape with the given axis removed (reduction).
    pub(crate) fn without_axis(&self, axis: usize) -> Shape {
        let r = self.rank();
        assert!(axis < r, "domain violation: axis {axis} out of range for rank {r}");
        let mut out = Vec::with_capacity(r - 1);
        for (i, &d) in self.dims().iter().enumerate() {
            if i != axis {
                out.push(d);
            }
        }
        Shape::new(&out)
    }

    /// Shape with a size-1 axis inserted at `axis`.
    pub(crate) fn with_inserted_axis(&self, axis: usize) -> Shape {
        let mut out = self.dims().to_vec();
        assert!(axis <= out.len(), "domain violation: axis {axis} out of range for insertion");
        out.insert(axis, 1);
        Shape::new(&out)
    }

    pub(crate) fn to_padded(&self, rank: usize) -> [usize; MAX_RANK] {
        let mut out = [1usize; MAX_RANK];
        let r = self.rank();
        let pad = rank.saturating_sub(r);
        for (i, &d) in self.dims().iter().enumerate() {
            out[pad + i] = d;
        }
        out
    }
}

impl std::fmt::Debug for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.dims().iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{d}")?;
        }
        write!(f, "]")
    }
}

pub(crate) fn normalize_axis_for_rank(axis: i32, rank: usize) -> usize {
    let r = rank as i32;
    let normalized = if axis < 0 { axis + r } else { axis };
    if normalized < 0 || normalized >= r {
        fatal(format!(
            "domain violation: axis {axis} out of range for rank {rank}"
        ));
    }
    normalized as usize
}

/// Two shapes are broadcast-compatible iff, after right-aligning and padding
/// the shorter with 1s, every dimension pair satisfies `a == b || a == 1 ||
/// b == 1`. Returns the elementwise-maximum result shape, or `None` if
/// incompatible.
pub(crate) fn broadcast_shapes(a: Shape, b: Shape) -> Option<Shape> {
    let rank = a.rank().max(b.rank());
    if rank > MAX_RANK {
        return None;
    }
    let pa = a.to_padded(rank);
    let pb = b.to_padded(rank);
    let mut out = [0usize; MAX_RANK];
    for i in 0..rank {
        let (da, db) = (pa[i], pb[i]);
        if da != db && da != 1 && db != 1 {
            return None;
        }
        out[i] = da.max(db);
    }
    Some(Shape::new(&out[..rank]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_symmetry() {
        let a = Shape::new(&[2, 3]);
        let b = Shape::new(&[1]);
        assert_eq!(broadcast_shapes(a, b), broadcast_shapes(b, a));
        assert_eq!(broadcast_shapes(a, b).unwrap().dims(), &[2, 3]);
    }

    #[test]
    fn broadcast_incompatible() {
        let a = Shape::new(&[2, 3]);
        let b = Shape::new(&[4]);
        assert!(broadcast_shapes(a, b).is_none());
    }

    #[test]
    fn reduction_rank() {
        let t = Shape::new(&[2, 3, 4]);
        assert_eq!(t.without_axis(1).rank(), 2);
        assert_eq!(t.without_axis(1).dims(), &[2, 4]);
    }

    #[test]
    fn negative_axis_normalization() {
        let s = Shape::new(&[2, 3, 4]);
        assert_eq!(s.normalize_axis(-1), 2);
        assert_eq!(s.normalize_axis(-3), 0);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn negative_axis_out_of_range() {
        let s = Shape::new(&[2, 3]);
        s.normalize_axis(-3);
    }

    #[test]
    fn scalar_is_rank_zero_with_one_element() {
        let s = Shape::scalar();
        assert_eq!(s.rank(), 0);
        assert_eq!(s.numel(), 1);
    }
}
