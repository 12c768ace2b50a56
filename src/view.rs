//! The view protocol shared by local and distributed matrices.
//!
//! A view aliases a rectangular region of another matrix's storage. Unlocked
//! views may write through to the parent; locked views are read-only. The
//! `*_1x2`, `*_2x1` and `*_2x2` forms rebuild a single view from sibling views
//! that are physically adjacent pieces of one allocation, which is what lets
//! the slide steps of blocked algorithms merge partitions without copying.
//!
//! The free functions rebind their first argument in place:
//!
//! ```rust
//! use dist_matrix::{view_region, Matrix};
//!
//! let b = Matrix::<f64>::from_fn(4, 4, |i, j| (i + 4 * j) as f64).unwrap();
//! let mut a = Matrix::default();
//! view_region(&mut a, &b, 1, 2, 2, 2).unwrap();
//! a.set(0, 0, -1.0).unwrap();
//! assert_eq!(b.get(1, 2).unwrap(), -1.0);
//! ```

use crate::Result;

/// Matrices that can produce and merge views of themselves.
///
/// All operations are O(1) and never move data.
pub trait Viewable: Sized {
    fn height(&self) -> usize;

    fn width(&self) -> usize;

    /// Whether this instance is a read-only view.
    fn is_locked(&self) -> bool;

    /// Writable view of the `height x width` region at `(i, j)`.
    ///
    /// Fails with [`DistError::Locked`](crate::DistError::Locked) if `self`
    /// is locked.
    fn view_region(&self, i: usize, j: usize, height: usize, width: usize) -> Result<Self>;

    /// Read-only view of the `height x width` region at `(i, j)`.
    fn locked_view_region(&self, i: usize, j: usize, height: usize, width: usize) -> Result<Self>;

    /// Single view spanning `left` and the adjacent `right`.
    fn view_1x2(left: &Self, right: &Self) -> Result<Self>;

    fn locked_view_1x2(left: &Self, right: &Self) -> Result<Self>;

    /// Single view spanning `top` and the adjacent `bottom`.
    fn view_2x1(top: &Self, bottom: &Self) -> Result<Self>;

    fn locked_view_2x1(top: &Self, bottom: &Self) -> Result<Self>;

    /// Single view spanning four quadrant views.
    fn view_2x2(tl: &Self, tr: &Self, bl: &Self, br: &Self) -> Result<Self> {
        let top = Self::view_1x2(tl, tr)?;
        let bottom = Self::view_1x2(bl, br)?;
        Self::view_2x1(&top, &bottom)
    }

    fn locked_view_2x2(tl: &Self, tr: &Self, bl: &Self, br: &Self) -> Result<Self> {
        let top = Self::locked_view_1x2(tl, tr)?;
        let bottom = Self::locked_view_1x2(bl, br)?;
        Self::locked_view_2x1(&top, &bottom)
    }

    /// Writable view of the whole matrix.
    fn view_all(&self) -> Result<Self> {
        self.view_region(0, 0, self.height(), self.width())
    }

    fn locked_view_all(&self) -> Result<Self> {
        self.locked_view_region(0, 0, self.height(), self.width())
    }
}

/// Whether a protocol step hands out writable or read-only views.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Access {
    Mutable,
    Locked,
}

impl Access {
    pub(crate) fn region<M: Viewable>(
        self,
        a: &M,
        i: usize,
        j: usize,
        height: usize,
        width: usize,
    ) -> Result<M> {
        match self {
            Access::Mutable => a.view_region(i, j, height, width),
            Access::Locked => a.locked_view_region(i, j, height, width),
        }
    }

    pub(crate) fn all<M: Viewable>(self, a: &M) -> Result<M> {
        self.region(a, 0, 0, a.height(), a.width())
    }

    pub(crate) fn join_1x2<M: Viewable>(self, left: &M, right: &M) -> Result<M> {
        match self {
            Access::Mutable => M::view_1x2(left, right),
            Access::Locked => M::locked_view_1x2(left, right),
        }
    }

    pub(crate) fn join_2x1<M: Viewable>(self, top: &M, bottom: &M) -> Result<M> {
        match self {
            Access::Mutable => M::view_2x1(top, bottom),
            Access::Locked => M::locked_view_2x1(top, bottom),
        }
    }

    pub(crate) fn join_2x2<M: Viewable>(self, tl: &M, tr: &M, bl: &M, br: &M) -> Result<M> {
        match self {
            Access::Mutable => M::view_2x2(tl, tr, bl, br),
            Access::Locked => M::locked_view_2x2(tl, tr, bl, br),
        }
    }
}

/// Make `a` a writable view of all of `b`.
pub fn view<M: Viewable>(a: &mut M, b: &M) -> Result<()> {
    let _span = tracing::trace_span!("view", height = b.height(), width = b.width()).entered();
    *a = b.view_all()?;
    Ok(())
}

/// Make `a` a writable view of the `height x width` region of `b` at `(i, j)`.
pub fn view_region<M: Viewable>(
    a: &mut M,
    b: &M,
    i: usize,
    j: usize,
    height: usize,
    width: usize,
) -> Result<()> {
    let _span = tracing::trace_span!("view_region", i, j, height, width).entered();
    *a = b.view_region(i, j, height, width)?;
    Ok(())
}

/// Make `a` a read-only view of all of `b`.
pub fn locked_view<M: Viewable>(a: &mut M, b: &M) -> Result<()> {
    let _span = tracing::trace_span!("locked_view", height = b.height(), width = b.width()).entered();
    *a = b.locked_view_all()?;
    Ok(())
}

pub fn locked_view_region<M: Viewable>(
    a: &mut M,
    b: &M,
    i: usize,
    j: usize,
    height: usize,
    width: usize,
) -> Result<()> {
    let _span = tracing::trace_span!("locked_view_region", i, j, height, width).entered();
    *a = b.locked_view_region(i, j, height, width)?;
    Ok(())
}

/// Make `a` a writable view spanning `b1 | b2`.
pub fn view_1x2<M: Viewable>(a: &mut M, b1: &M, b2: &M) -> Result<()> {
    let _span = tracing::trace_span!("view_1x2").entered();
    *a = M::view_1x2(b1, b2)?;
    Ok(())
}

pub fn locked_view_1x2<M: Viewable>(a: &mut M, b1: &M, b2: &M) -> Result<()> {
    let _span = tracing::trace_span!("locked_view_1x2").entered();
    *a = M::locked_view_1x2(b1, b2)?;
    Ok(())
}

/// Make `a` a writable view spanning `b1` stacked over `b2`.
pub fn view_2x1<M: Viewable>(a: &mut M, b1: &M, b2: &M) -> Result<()> {
    let _span = tracing::trace_span!("view_2x1").entered();
    *a = M::view_2x1(b1, b2)?;
    Ok(())
}

pub fn locked_view_2x1<M: Viewable>(a: &mut M, b1: &M, b2: &M) -> Result<()> {
    let _span = tracing::trace_span!("locked_view_2x1").entered();
    *a = M::locked_view_2x1(b1, b2)?;
    Ok(())
}

pub fn view_2x2<M: Viewable>(a: &mut M, tl: &M, tr: &M, bl: &M, br: &M) -> Result<()> {
    let _span = tracing::trace_span!("view_2x2").entered();
    *a = M::view_2x2(tl, tr, bl, br)?;
    Ok(())
}

pub fn locked_view_2x2<M: Viewable>(a: &mut M, tl: &M, tr: &M, bl: &M, br: &M) -> Result<()> {
    let _span = tracing::trace_span!("locked_view_2x2").entered();
    *a = M::locked_view_2x2(tl, tr, bl, br)?;
    Ok(())
}
