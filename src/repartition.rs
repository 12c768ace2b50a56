//! Repartition / slide steps of blocked algorithms.
//!
//! A blocked kernel keeps a two-way partition whose boundary marks how much of
//! the matrix has been processed. Each iteration *repartitions* it into three
//! pieces, exposing the next panel `A1` of at most `bsize` rows (or columns)
//! at the boundary, works on the panel, then *slides* the boundary past it:
//!
//! ```rust
//! use dist_matrix::{partition_down, repartition_down, slide_partition_down, Matrix};
//!
//! let a = Matrix::<f64>::new(7, 2).unwrap();
//! let (mut at, mut ab) = partition_down(&a, 0).unwrap();
//! while ab.height() > 0 {
//!     let (a0, mut a1, a2) = repartition_down(&at, &ab, 3).unwrap();
//!     a1.fill(a0.height() as f64).unwrap();
//!     (at, ab) = slide_partition_down(&a0, &a1, &a2).unwrap();
//! }
//! assert_eq!(a.get(6, 1).unwrap(), 6.0);
//! ```
//!
//! The loop is driven only by the views' own dimensions. Slides re-merge
//! siblings through the contiguity-checked view joins, so a step given pieces
//! that do not tile the matrix fails instead of drifting.

use crate::partition::Split2x2;
use crate::view::{Access, Viewable};
use crate::Result;

/// The 3x3 block decomposition used by the diagonal steps; `a11` is the
/// active diagonal block.
#[derive(Debug)]
pub struct Split3x3<M> {
    pub a00: M,
    pub a01: M,
    pub a02: M,
    pub a10: M,
    pub a11: M,
    pub a12: M,
    pub a20: M,
    pub a21: M,
    pub a22: M,
}

// ============================================================================
// One-dimensional steps
// ============================================================================

fn repart_down<M: Viewable>(at: &M, ab: &M, bsize: usize, access: Access) -> Result<(M, M, M)> {
    let (m, n) = (ab.height(), ab.width());
    let b = bsize.min(m);
    Ok((
        access.all(at)?,
        access.region(ab, 0, 0, b, n)?,
        access.region(ab, b, 0, m - b, n)?,
    ))
}

fn slide_down<M: Viewable>(a0: &M, a1: &M, a2: &M, access: Access) -> Result<(M, M)> {
    Ok((access.join_2x1(a0, a1)?, access.all(a2)?))
}

fn repart_up<M: Viewable>(at: &M, ab: &M, bsize: usize, access: Access) -> Result<(M, M, M)> {
    let (m, n) = (at.height(), at.width());
    let b = bsize.min(m);
    Ok((
        access.region(at, 0, 0, m - b, n)?,
        access.region(at, m - b, 0, b, n)?,
        access.all(ab)?,
    ))
}

fn slide_up<M: Viewable>(a0: &M, a1: &M, a2: &M, access: Access) -> Result<(M, M)> {
    Ok((access.all(a0)?, access.join_2x1(a1, a2)?))
}

fn repart_right<M: Viewable>(al: &M, ar: &M, bsize: usize, access: Access) -> Result<(M, M, M)> {
    let (m, n) = (ar.height(), ar.width());
    let b = bsize.min(n);
    Ok((
        access.all(al)?,
        access.region(ar, 0, 0, m, b)?,
        access.region(ar, 0, b, m, n - b)?,
    ))
}

fn slide_right<M: Viewable>(a0: &M, a1: &M, a2: &M, access: Access) -> Result<(M, M)> {
    Ok((access.join_1x2(a0, a1)?, access.all(a2)?))
}

fn repart_left<M: Viewable>(al: &M, ar: &M, bsize: usize, access: Access) -> Result<(M, M, M)> {
    let (m, n) = (al.height(), al.width());
    let b = bsize.min(n);
    Ok((
        access.region(al, 0, 0, m, n - b)?,
        access.region(al, 0, n - b, m, b)?,
        access.all(ar)?,
    ))
}

fn slide_left<M: Viewable>(a0: &M, a1: &M, a2: &M, access: Access) -> Result<(M, M)> {
    Ok((access.all(a0)?, access.join_1x2(a1, a2)?))
}

/// Expose the next `bsize` rows below the boundary: `A0 = AT`, `A1` = the
/// first rows of `AB`, `A2` = the rest of `AB`.
pub fn repartition_down<M: Viewable>(at: &M, ab: &M, bsize: usize) -> Result<(M, M, M)> {
    let _span = tracing::trace_span!("repartition_down", bsize).entered();
    repart_down(at, ab, bsize, Access::Mutable)
}

pub fn locked_repartition_down<M: Viewable>(at: &M, ab: &M, bsize: usize) -> Result<(M, M, M)> {
    let _span = tracing::trace_span!("locked_repartition_down", bsize).entered();
    repart_down(at, ab, bsize, Access::Locked)
}

/// Move the boundary below `A1`: `AT = [A0; A1]`, `AB = A2`.
pub fn slide_partition_down<M: Viewable>(a0: &M, a1: &M, a2: &M) -> Result<(M, M)> {
    let _span = tracing::trace_span!("slide_partition_down").entered();
    slide_down(a0, a1, a2, Access::Mutable)
}

pub fn slide_locked_partition_down<M: Viewable>(a0: &M, a1: &M, a2: &M) -> Result<(M, M)> {
    let _span = tracing::trace_span!("slide_locked_partition_down").entered();
    slide_down(a0, a1, a2, Access::Locked)
}

/// Expose the last `bsize` rows above the boundary: `A0` and `A1` split `AT`,
/// `A2 = AB`.
pub fn repartition_up<M: Viewable>(at: &M, ab: &M, bsize: usize) -> Result<(M, M, M)> {
    let _span = tracing::trace_span!("repartition_up", bsize).entered();
    repart_up(at, ab, bsize, Access::Mutable)
}

pub fn locked_repartition_up<M: Viewable>(at: &M, ab: &M, bsize: usize) -> Result<(M, M, M)> {
    let _span = tracing::trace_span!("locked_repartition_up", bsize).entered();
    repart_up(at, ab, bsize, Access::Locked)
}

/// Move the boundary above `A1`: `AT = A0`, `AB = [A1; A2]`.
pub fn slide_partition_up<M: Viewable>(a0: &M, a1: &M, a2: &M) -> Result<(M, M)> {
    let _span = tracing::trace_span!("slide_partition_up").entered();
    slide_up(a0, a1, a2, Access::Mutable)
}

pub fn slide_locked_partition_up<M: Viewable>(a0: &M, a1: &M, a2: &M) -> Result<(M, M)> {
    let _span = tracing::trace_span!("slide_locked_partition_up").entered();
    slide_up(a0, a1, a2, Access::Locked)
}

/// Expose the next `bsize` columns right of the boundary.
pub fn repartition_right<M: Viewable>(al: &M, ar: &M, bsize: usize) -> Result<(M, M, M)> {
    let _span = tracing::trace_span!("repartition_right", bsize).entered();
    repart_right(al, ar, bsize, Access::Mutable)
}

pub fn locked_repartition_right<M: Viewable>(al: &M, ar: &M, bsize: usize) -> Result<(M, M, M)> {
    let _span = tracing::trace_span!("locked_repartition_right", bsize).entered();
    repart_right(al, ar, bsize, Access::Locked)
}

/// `AL = [A0 A1]`, `AR = A2`.
pub fn slide_partition_right<M: Viewable>(a0: &M, a1: &M, a2: &M) -> Result<(M, M)> {
    let _span = tracing::trace_span!("slide_partition_right").entered();
    slide_right(a0, a1, a2, Access::Mutable)
}

pub fn slide_locked_partition_right<M: Viewable>(a0: &M, a1: &M, a2: &M) -> Result<(M, M)> {
    let _span = tracing::trace_span!("slide_locked_partition_right").entered();
    slide_right(a0, a1, a2, Access::Locked)
}

/// Expose the last `bsize` columns left of the boundary.
pub fn repartition_left<M: Viewable>(al: &M, ar: &M, bsize: usize) -> Result<(M, M, M)> {
    let _span = tracing::trace_span!("repartition_left", bsize).entered();
    repart_left(al, ar, bsize, Access::Mutable)
}

pub fn locked_repartition_left<M: Viewable>(al: &M, ar: &M, bsize: usize) -> Result<(M, M, M)> {
    let _span = tracing::trace_span!("locked_repartition_left", bsize).entered();
    repart_left(al, ar, bsize, Access::Locked)
}

/// `AL = A0`, `AR = [A1 A2]`.
pub fn slide_partition_left<M: Viewable>(a0: &M, a1: &M, a2: &M) -> Result<(M, M)> {
    let _span = tracing::trace_span!("slide_partition_left").entered();
    slide_left(a0, a1, a2, Access::Mutable)
}

pub fn slide_locked_partition_left<M: Viewable>(a0: &M, a1: &M, a2: &M) -> Result<(M, M)> {
    let _span = tracing::trace_span!("slide_locked_partition_left").entered();
    slide_left(a0, a1, a2, Access::Locked)
}

// ============================================================================
// Diagonal steps
// ============================================================================

fn repart_down_diagonal<M: Viewable>(
    a: &Split2x2<M>,
    bsize: usize,
    access: Access,
) -> Result<Split3x3<M>> {
    let (m, n) = (a.br.height(), a.br.width());
    let b = bsize.min(m).min(n);
    let (m0, n0) = (a.tl.height(), a.tl.width());
    Ok(Split3x3 {
        a00: access.all(&a.tl)?,
        a01: access.region(&a.tr, 0, 0, m0, b)?,
        a02: access.region(&a.tr, 0, b, m0, n - b)?,
        a10: access.region(&a.bl, 0, 0, b, n0)?,
        a11: access.region(&a.br, 0, 0, b, b)?,
        a12: access.region(&a.br, 0, b, b, n - b)?,
        a20: access.region(&a.bl, b, 0, m - b, n0)?,
        a21: access.region(&a.br, b, 0, m - b, b)?,
        a22: access.region(&a.br, b, b, m - b, n - b)?,
    })
}

fn slide_down_diagonal<M: Viewable>(a: &Split3x3<M>, access: Access) -> Result<Split2x2<M>> {
    Ok(Split2x2 {
        tl: access.join_2x2(&a.a00, &a.a01, &a.a10, &a.a11)?,
        tr: access.join_2x1(&a.a02, &a.a12)?,
        bl: access.join_1x2(&a.a20, &a.a21)?,
        br: access.all(&a.a22)?,
    })
}

fn repart_up_diagonal<M: Viewable>(
    a: &Split2x2<M>,
    bsize: usize,
    access: Access,
) -> Result<Split3x3<M>> {
    let (m, n) = (a.tl.height(), a.tl.width());
    let b = bsize.min(m).min(n);
    let (m2, n2) = (a.br.height(), a.br.width());
    Ok(Split3x3 {
        a00: access.region(&a.tl, 0, 0, m - b, n - b)?,
        a01: access.region(&a.tl, 0, n - b, m - b, b)?,
        a02: access.region(&a.tr, 0, 0, m - b, n2)?,
        a10: access.region(&a.tl, m - b, 0, b, n - b)?,
        a11: access.region(&a.tl, m - b, n - b, b, b)?,
        a12: access.region(&a.tr, m - b, 0, b, n2)?,
        a20: access.region(&a.bl, 0, 0, m2, n - b)?,
        a21: access.region(&a.bl, 0, n - b, m2, b)?,
        a22: access.all(&a.br)?,
    })
}

fn slide_up_diagonal<M: Viewable>(a: &Split3x3<M>, access: Access) -> Result<Split2x2<M>> {
    Ok(Split2x2 {
        tl: access.all(&a.a00)?,
        tr: access.join_1x2(&a.a01, &a.a02)?,
        bl: access.join_2x1(&a.a10, &a.a20)?,
        br: access.join_2x2(&a.a11, &a.a12, &a.a21, &a.a22)?,
    })
}

/// Refine a quadrant split into 3x3 blocks, with `a11` the next
/// `bsize x bsize` block down the diagonal from `tl`.
pub fn repartition_down_diagonal<M: Viewable>(a: &Split2x2<M>, bsize: usize) -> Result<Split3x3<M>> {
    let _span = tracing::trace_span!("repartition_down_diagonal", bsize).entered();
    repart_down_diagonal(a, bsize, Access::Mutable)
}

pub fn locked_repartition_down_diagonal<M: Viewable>(
    a: &Split2x2<M>,
    bsize: usize,
) -> Result<Split3x3<M>> {
    let _span = tracing::trace_span!("locked_repartition_down_diagonal", bsize).entered();
    repart_down_diagonal(a, bsize, Access::Locked)
}

/// Grow `tl` to absorb `a11`.
pub fn slide_partition_down_diagonal<M: Viewable>(a: &Split3x3<M>) -> Result<Split2x2<M>> {
    let _span = tracing::trace_span!("slide_partition_down_diagonal").entered();
    slide_down_diagonal(a, Access::Mutable)
}

pub fn slide_locked_partition_down_diagonal<M: Viewable>(a: &Split3x3<M>) -> Result<Split2x2<M>> {
    let _span = tracing::trace_span!("slide_locked_partition_down_diagonal").entered();
    slide_down_diagonal(a, Access::Locked)
}

/// Refine a quadrant split into 3x3 blocks, with `a11` the last
/// `bsize x bsize` block of `tl` along the diagonal.
pub fn repartition_up_diagonal<M: Viewable>(a: &Split2x2<M>, bsize: usize) -> Result<Split3x3<M>> {
    let _span = tracing::trace_span!("repartition_up_diagonal", bsize).entered();
    repart_up_diagonal(a, bsize, Access::Mutable)
}

pub fn locked_repartition_up_diagonal<M: Viewable>(
    a: &Split2x2<M>,
    bsize: usize,
) -> Result<Split3x3<M>> {
    let _span = tracing::trace_span!("locked_repartition_up_diagonal", bsize).entered();
    repart_up_diagonal(a, bsize, Access::Locked)
}

/// Grow `br` to absorb `a11`.
pub fn slide_partition_up_diagonal<M: Viewable>(a: &Split3x3<M>) -> Result<Split2x2<M>> {
    let _span = tracing::trace_span!("slide_partition_up_diagonal").entered();
    slide_up_diagonal(a, Access::Mutable)
}

pub fn slide_locked_partition_up_diagonal<M: Viewable>(a: &Split3x3<M>) -> Result<Split2x2<M>> {
    let _span = tracing::trace_span!("slide_locked_partition_up_diagonal").entered();
    slide_up_diagonal(a, Access::Locked)
}
