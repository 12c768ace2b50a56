//! Two-dimensional process grid.

use std::sync::Arc;

use crate::comm::{Communicator, SelfComm};
use crate::{DistError, Result};

/// How linear ranks map onto grid coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GridOrder {
    /// `rank = row + col * height`.
    #[default]
    ColumnMajor,
    /// `rank = col + row * width`.
    RowMajor,
}

/// An `R x C` arrangement of the processes of a communicator.
///
/// Built once per communicator and shared (via `Arc`) by every matrix that
/// lives on it; it is immutable after construction.
#[derive(Debug)]
pub struct Grid {
    comm: Arc<dyn Communicator>,
    row_comm: Arc<dyn Communicator>,
    col_comm: Arc<dyn Communicator>,
    height: usize,
    width: usize,
    order: GridOrder,
    row: usize,
    col: usize,
    gcd: usize,
    lcm: usize,
    diag_path: usize,
    diag_path_rank: usize,
}

impl Grid {
    /// Build the squarest grid (`height <= width`) covering `comm`.
    pub fn new(comm: Arc<dyn Communicator>) -> Result<Arc<Grid>> {
        let height = squarest_height(comm.size());
        Self::with_height(comm, height)
    }

    /// Build a grid with the given height; the width is `size / height`.
    pub fn with_height(comm: Arc<dyn Communicator>, height: usize) -> Result<Arc<Grid>> {
        let size = comm.size();
        if height == 0 || size == 0 || size % height != 0 {
            return Err(DistError::GridHeight { height, size });
        }
        Self::with_shape(comm, height, size / height, GridOrder::ColumnMajor)
    }

    /// Build a `height x width` grid with an explicit rank ordering.
    pub fn with_shape(
        comm: Arc<dyn Communicator>,
        height: usize,
        width: usize,
        order: GridOrder,
    ) -> Result<Arc<Grid>> {
        let size = comm.size();
        if height == 0 || width == 0 || height * width != size {
            return Err(DistError::GridShape {
                height,
                width,
                size,
            });
        }
        let _span = tracing::debug_span!("grid", height, width, rank = comm.rank()).entered();

        let (row, col) = coords(order, height, width, comm.rank());
        let row_members: Vec<usize> = (0..width)
            .map(|c| rank_of(order, height, width, row, c))
            .collect();
        let col_members: Vec<usize> = (0..height)
            .map(|r| rank_of(order, height, width, r, col))
            .collect();
        let row_comm = comm.split(&row_members)?;
        let col_comm = comm.split(&col_members)?;

        let gcd = gcd(height, width);
        let lcm = size / gcd;
        let diag_path = diag_path(gcd, row, col);
        let diag_path_rank = diag_path_rank(height, width, lcm, gcd, row, col);
        tracing::debug!(row, col, diag_path, diag_path_rank, "process grid ready");

        Ok(Arc::new(Grid {
            comm,
            row_comm,
            col_comm,
            height,
            width,
            order,
            row,
            col,
            gcd,
            lcm,
            diag_path,
            diag_path_rank,
        }))
    }

    /// A 1x1 grid over [`SelfComm`].
    pub fn trivial() -> Result<Arc<Grid>> {
        Self::with_shape(Arc::new(SelfComm::new()), 1, 1, GridOrder::ColumnMajor)
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.height * self.width
    }

    #[inline]
    pub fn order(&self) -> GridOrder {
        self.order
    }

    /// This process's grid row.
    #[inline]
    pub fn row(&self) -> usize {
        self.row
    }

    /// This process's grid column.
    #[inline]
    pub fn col(&self) -> usize {
        self.col
    }

    /// Rank in the grid's communicator.
    #[inline]
    pub fn rank(&self) -> usize {
        self.comm.rank()
    }

    /// Column-major linear rank, used by the `VC` distribution.
    #[inline]
    pub fn vc_rank(&self) -> usize {
        self.row + self.col * self.height
    }

    /// Row-major linear rank, used by the `VR` distribution.
    #[inline]
    pub fn vr_rank(&self) -> usize {
        self.col + self.row * self.width
    }

    #[inline]
    pub fn gcd(&self) -> usize {
        self.gcd
    }

    #[inline]
    pub fn lcm(&self) -> usize {
        self.lcm
    }

    /// Which of the `gcd` diagonal paths this process lies on.
    #[inline]
    pub fn diag_path(&self) -> usize {
        self.diag_path
    }

    /// Position of this process along its diagonal path, in `[0, lcm)`.
    #[inline]
    pub fn diag_path_rank(&self) -> usize {
        self.diag_path_rank
    }

    /// Grid coordinates of a communicator rank.
    pub fn coords_of(&self, rank: usize) -> (usize, usize) {
        coords(self.order, self.height, self.width, rank)
    }

    /// Communicator rank of grid coordinates.
    pub fn rank_of(&self, row: usize, col: usize) -> usize {
        rank_of(self.order, self.height, self.width, row, col)
    }

    /// Communicator over all processes.
    pub fn comm(&self) -> &dyn Communicator {
        self.comm.as_ref()
    }

    /// Processes sharing this process's grid row (ranked by column).
    pub fn row_comm(&self) -> &dyn Communicator {
        self.row_comm.as_ref()
    }

    /// Processes sharing this process's grid column (ranked by row).
    pub fn col_comm(&self) -> &dyn Communicator {
        self.col_comm.as_ref()
    }

    /// Collectives issued so far on the grid's communicators.
    pub fn collective_calls(&self) -> usize {
        self.comm.collective_calls()
            + self.row_comm.collective_calls()
            + self.col_comm.collective_calls()
    }

    /// Whether two handles refer to the same grid object.
    #[inline]
    pub fn same(a: &Arc<Grid>, b: &Arc<Grid>) -> bool {
        Arc::ptr_eq(a, b)
    }
}

fn squarest_height(size: usize) -> usize {
    if size == 0 {
        return 0;
    }
    let mut height = (size as f64).sqrt() as usize;
    while height > 1 && size % height != 0 {
        height -= 1;
    }
    height.max(1)
}

fn coords(order: GridOrder, height: usize, width: usize, rank: usize) -> (usize, usize) {
    match order {
        GridOrder::ColumnMajor => (rank % height, rank / height),
        GridOrder::RowMajor => (rank / width, rank % width),
    }
}

fn rank_of(order: GridOrder, height: usize, width: usize, row: usize, col: usize) -> usize {
    match order {
        GridOrder::ColumnMajor => row + col * height,
        GridOrder::RowMajor => col + row * width,
    }
}

fn gcd(mut a: usize, mut b: usize) -> usize {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Diagonal entry `(k, k)` of a matrix aligned at `(0, p)` lands on process
/// `(k mod R, (k + p) mod C)`; processes on that walk share path `p mod gcd`.
fn diag_path(gcd: usize, row: usize, col: usize) -> usize {
    (col + gcd - row % gcd) % gcd
}

fn diag_path_rank(
    height: usize,
    width: usize,
    lcm: usize,
    gcd: usize,
    row: usize,
    col: usize,
) -> usize {
    let path = diag_path(gcd, row, col);
    let target = (col + width - path) % width;
    (row..lcm)
        .step_by(height)
        .find(|k| k % width == target)
        .unwrap_or(0)
}
