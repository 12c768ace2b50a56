//! Two-way and quadrant partitions.
//!
//! Every function builds views of its argument and never moves data. Split
//! sizes are clamped to the matrix's extent, so passing [`blocksize`] on the
//! last step of a loop is always legal.
//!
//! [`blocksize`]: crate::blocksize

use crate::view::{Access, Viewable};
use crate::Result;

/// Quadrant views `[tl tr; bl br]` of a matrix.
#[derive(Debug)]
pub struct Split2x2<M> {
    pub tl: M,
    pub tr: M,
    pub bl: M,
    pub br: M,
}

fn down<M: Viewable>(a: &M, split: usize, access: Access) -> Result<(M, M)> {
    let (m, n) = (a.height(), a.width());
    let s = split.min(m);
    Ok((
        access.region(a, 0, 0, s, n)?,
        access.region(a, s, 0, m - s, n)?,
    ))
}

fn up<M: Viewable>(a: &M, split: usize, access: Access) -> Result<(M, M)> {
    down(a, a.height() - split.min(a.height()), access)
}

fn right<M: Viewable>(a: &M, split: usize, access: Access) -> Result<(M, M)> {
    let (m, n) = (a.height(), a.width());
    let s = split.min(n);
    Ok((
        access.region(a, 0, 0, m, s)?,
        access.region(a, 0, s, m, n - s)?,
    ))
}

fn left<M: Viewable>(a: &M, split: usize, access: Access) -> Result<(M, M)> {
    right(a, a.width() - split.min(a.width()), access)
}

fn quadrants<M: Viewable>(a: &M, m_cut: usize, n_cut: usize, access: Access) -> Result<Split2x2<M>> {
    let (m, n) = (a.height(), a.width());
    Ok(Split2x2 {
        tl: access.region(a, 0, 0, m_cut, n_cut)?,
        tr: access.region(a, 0, n_cut, m_cut, n - n_cut)?,
        bl: access.region(a, m_cut, 0, m - m_cut, n_cut)?,
        br: access.region(a, m_cut, n_cut, m - m_cut, n - n_cut)?,
    })
}

/// Length of diagonal `offset` (positive above the main diagonal) of an
/// `m x n` matrix.
fn diagonal_length(m: usize, n: usize, offset: isize) -> usize {
    let k = offset.unsigned_abs();
    if offset >= 0 {
        m.min(n.saturating_sub(k))
    } else {
        m.saturating_sub(k).min(n)
    }
}

fn offset_diagonal<M: Viewable>(
    a: &M,
    offset: isize,
    dist: usize,
    access: Access,
) -> Result<Split2x2<M>> {
    let d = dist.min(diagonal_length(a.height(), a.width(), offset));
    let k = offset.unsigned_abs();
    let (m_cut, n_cut) = if offset <= 0 { (k + d, d) } else { (d, k + d) };
    quadrants(a, m_cut, n_cut, access)
}

/// `AT` holds the first `split` rows of `a`, `AB` the rest.
pub fn partition_down<M: Viewable>(a: &M, split: usize) -> Result<(M, M)> {
    let _span = tracing::trace_span!("partition_down", split).entered();
    down(a, split, Access::Mutable)
}

pub fn locked_partition_down<M: Viewable>(a: &M, split: usize) -> Result<(M, M)> {
    let _span = tracing::trace_span!("locked_partition_down", split).entered();
    down(a, split, Access::Locked)
}

/// `AB` holds the last `split` rows of `a`, `AT` the rest.
pub fn partition_up<M: Viewable>(a: &M, split: usize) -> Result<(M, M)> {
    let _span = tracing::trace_span!("partition_up", split).entered();
    up(a, split, Access::Mutable)
}

pub fn locked_partition_up<M: Viewable>(a: &M, split: usize) -> Result<(M, M)> {
    let _span = tracing::trace_span!("locked_partition_up", split).entered();
    up(a, split, Access::Locked)
}

/// `AL` holds the first `split` columns of `a`, `AR` the rest.
pub fn partition_right<M: Viewable>(a: &M, split: usize) -> Result<(M, M)> {
    let _span = tracing::trace_span!("partition_right", split).entered();
    right(a, split, Access::Mutable)
}

pub fn locked_partition_right<M: Viewable>(a: &M, split: usize) -> Result<(M, M)> {
    let _span = tracing::trace_span!("locked_partition_right", split).entered();
    right(a, split, Access::Locked)
}

/// `AR` holds the last `split` columns of `a`, `AL` the rest.
pub fn partition_left<M: Viewable>(a: &M, split: usize) -> Result<(M, M)> {
    let _span = tracing::trace_span!("partition_left", split).entered();
    left(a, split, Access::Mutable)
}

pub fn locked_partition_left<M: Viewable>(a: &M, split: usize) -> Result<(M, M)> {
    let _span = tracing::trace_span!("locked_partition_left", split).entered();
    left(a, split, Access::Locked)
}

/// Quadrants with `tl` of size `d x d` at the top-left corner, `d` clamped to
/// the shorter dimension.
pub fn partition_down_diagonal<M: Viewable>(a: &M, d: usize) -> Result<Split2x2<M>> {
    let _span = tracing::trace_span!("partition_down_diagonal", d).entered();
    let d = d.min(a.height()).min(a.width());
    quadrants(a, d, d, Access::Mutable)
}

pub fn locked_partition_down_diagonal<M: Viewable>(a: &M, d: usize) -> Result<Split2x2<M>> {
    let _span = tracing::trace_span!("locked_partition_down_diagonal", d).entered();
    let d = d.min(a.height()).min(a.width());
    quadrants(a, d, d, Access::Locked)
}

/// Quadrants with `br` of size `d x d` at the bottom-right corner.
pub fn partition_up_diagonal<M: Viewable>(a: &M, d: usize) -> Result<Split2x2<M>> {
    let _span = tracing::trace_span!("partition_up_diagonal", d).entered();
    let d = d.min(a.height()).min(a.width());
    quadrants(a, a.height() - d, a.width() - d, Access::Mutable)
}

pub fn locked_partition_up_diagonal<M: Viewable>(a: &M, d: usize) -> Result<Split2x2<M>> {
    let _span = tracing::trace_span!("locked_partition_up_diagonal", d).entered();
    let d = d.min(a.height()).min(a.width());
    quadrants(a, a.height() - d, a.width() - d, Access::Locked)
}

/// Quadrants cut `dist` entries along diagonal `offset` (positive above the
/// main diagonal, negative below) from the top-left corner.
///
/// With `offset = -2` the cut lands at `(2 + dist, dist)`; with `offset = 3`
/// at `(dist, 3 + dist)`.
pub fn partition_down_offset_diagonal<M: Viewable>(
    a: &M,
    offset: isize,
    dist: usize,
) -> Result<Split2x2<M>> {
    let _span = tracing::trace_span!("partition_down_offset_diagonal", offset, dist).entered();
    offset_diagonal(a, offset, dist, Access::Mutable)
}

pub fn locked_partition_down_offset_diagonal<M: Viewable>(
    a: &M,
    offset: isize,
    dist: usize,
) -> Result<Split2x2<M>> {
    let _span =
        tracing::trace_span!("locked_partition_down_offset_diagonal", offset, dist).entered();
    offset_diagonal(a, offset, dist, Access::Locked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DistError, Matrix};
    use approx::assert_relative_eq;

    fn sample(height: usize, width: usize) -> Matrix<f64> {
        Matrix::from_fn(height, width, |i, j| (i * 10 + j) as f64).unwrap()
    }

    fn dims(m: &Matrix<f64>) -> (usize, usize) {
        (m.height(), m.width())
    }

    #[test]
    fn test_partition_down_and_up() {
        let a = sample(5, 3);
        let (at, ab) = partition_down(&a, 2).unwrap();
        assert_eq!((dims(&at), dims(&ab)), ((2, 3), (3, 3)));
        assert_relative_eq!(ab.get(0, 1).unwrap(), 21.0);

        let (at, ab) = partition_up(&a, 2).unwrap();
        assert_eq!((dims(&at), dims(&ab)), ((3, 3), (2, 3)));
        assert_relative_eq!(ab.get(0, 0).unwrap(), 30.0);
    }

    #[test]
    fn test_split_is_clamped() {
        let a = sample(3, 4);
        let (at, ab) = partition_down(&a, 10).unwrap();
        assert_eq!((dims(&at), dims(&ab)), ((3, 4), (0, 4)));
        let (al, ar) = partition_left(&a, 10).unwrap();
        assert_eq!((dims(&al), dims(&ar)), ((3, 0), (3, 4)));
    }

    #[test]
    fn test_partition_left_and_right() {
        let a = sample(2, 5);
        let (al, ar) = partition_right(&a, 1).unwrap();
        assert_eq!((dims(&al), dims(&ar)), ((2, 1), (2, 4)));
        let (al, ar) = partition_left(&a, 1).unwrap();
        assert_eq!((dims(&al), dims(&ar)), ((2, 4), (2, 1)));
        assert_relative_eq!(ar.get(1, 0).unwrap(), 14.0);
    }

    #[test]
    fn test_diagonal_partitions() {
        let a = sample(4, 6);
        let q = partition_down_diagonal(&a, 3).unwrap();
        assert_eq!(dims(&q.tl), (3, 3));
        assert_eq!(dims(&q.tr), (3, 3));
        assert_eq!(dims(&q.bl), (1, 3));
        assert_eq!(dims(&q.br), (1, 3));

        let q = partition_up_diagonal(&a, 3).unwrap();
        assert_eq!(dims(&q.tl), (1, 3));
        assert_eq!(dims(&q.br), (3, 3));
        assert_relative_eq!(q.br.get(0, 0).unwrap(), 13.0);

        let q = partition_down_diagonal(&a, 9).unwrap();
        assert_eq!(dims(&q.tl), (4, 4));
    }

    #[test]
    fn test_offset_diagonal() {
        let a = sample(5, 5);
        let below = partition_down_offset_diagonal(&a, -2, 1).unwrap();
        assert_eq!(dims(&below.tl), (3, 1));
        let above = partition_down_offset_diagonal(&a, 3, 4).unwrap();
        // Diagonal 3 of a 5x5 matrix has two entries.
        assert_eq!(dims(&above.tl), (2, 5));
        assert_eq!(diagonal_length(5, 5, -7), 0);
    }

    #[test]
    fn test_locked_partitions_are_read_only() {
        let a = sample(3, 3);
        let (mut at, ab) = locked_partition_down(&a, 1).unwrap();
        assert!(at.is_locked() && ab.is_locked());
        assert!(matches!(at.set(0, 0, 1.0), Err(DistError::Locked)));
        assert!(matches!(partition_down(&ab, 1), Err(DistError::Locked)));
        let q = locked_partition_up_diagonal(&ab, 1).unwrap();
        assert!(q.tl.is_locked());
    }

    #[test]
    fn test_partition_views_alias() {
        let a = sample(4, 4);
        let (_, mut ar) = partition_right(&a, 2).unwrap();
        ar.fill(0.0).unwrap();
        assert_relative_eq!(a.get(3, 3).unwrap(), 0.0);
        assert_relative_eq!(a.get(3, 1).unwrap(), 31.0);
    }
}
