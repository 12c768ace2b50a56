//! Distribution schemes, alignments and shift arithmetic.
//!
//! Along one axis, a distribution deals global indices cyclically over
//! `stride` owners. With alignment `a`, global index `g` belongs to owner
//! `(g + a) mod stride`, so the owner with rank `r` holds the indices
//! `shift, shift + stride, shift + 2 * stride, ...` where
//! `shift = (r - a) mod stride`.

use std::fmt;

use crate::grid::Grid;
use crate::{DistError, Result};

/// How one matrix axis is spread over the process grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dist {
    /// Cyclic over grid rows (the owners of a grid column).
    Mc,
    /// Cyclic over grid columns (the owners of a grid row).
    Mr,
    /// Cyclic over all processes in column-major rank order.
    Vc,
    /// Cyclic over all processes in row-major rank order.
    Vr,
    /// Cyclic over the processes of one diagonal path.
    Md,
    /// Replicated on every process.
    Star,
}

impl Dist {
    /// Number of owners the axis is dealt over.
    #[inline]
    pub fn stride(self, grid: &Grid) -> usize {
        match self {
            Dist::Mc => grid.height(),
            Dist::Mr => grid.width(),
            Dist::Vc | Dist::Vr => grid.size(),
            Dist::Md => grid.lcm(),
            Dist::Star => 1,
        }
    }

    /// This process's owner index along the axis.
    #[inline]
    pub fn rank(self, grid: &Grid) -> usize {
        match self {
            Dist::Mc => grid.row(),
            Dist::Mr => grid.col(),
            Dist::Vc => grid.vc_rank(),
            Dist::Vr => grid.vr_rank(),
            Dist::Md => grid.diag_path_rank(),
            Dist::Star => 0,
        }
    }

    fn uses_grid_rows(self) -> bool {
        !matches!(self, Dist::Mr | Dist::Star)
    }

    fn uses_grid_cols(self) -> bool {
        !matches!(self, Dist::Mc | Dist::Star)
    }

    pub fn name(self) -> &'static str {
        match self {
            Dist::Mc => "MC",
            Dist::Mr => "MR",
            Dist::Vc => "VC",
            Dist::Vr => "VR",
            Dist::Md => "MD",
            Dist::Star => "STAR",
        }
    }
}

impl fmt::Display for Dist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Column and row distribution of a matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Distribution {
    pub col: Dist,
    pub row: Dist,
}

impl Distribution {
    pub const MC_MR: Self = Self::pair(Dist::Mc, Dist::Mr);
    pub const MR_MC: Self = Self::pair(Dist::Mr, Dist::Mc);
    pub const MC_STAR: Self = Self::pair(Dist::Mc, Dist::Star);
    pub const STAR_MC: Self = Self::pair(Dist::Star, Dist::Mc);
    pub const MR_STAR: Self = Self::pair(Dist::Mr, Dist::Star);
    pub const STAR_MR: Self = Self::pair(Dist::Star, Dist::Mr);
    pub const VC_STAR: Self = Self::pair(Dist::Vc, Dist::Star);
    pub const STAR_VC: Self = Self::pair(Dist::Star, Dist::Vc);
    pub const VR_STAR: Self = Self::pair(Dist::Vr, Dist::Star);
    pub const STAR_VR: Self = Self::pair(Dist::Star, Dist::Vr);
    pub const MD_STAR: Self = Self::pair(Dist::Md, Dist::Star);
    pub const STAR_MD: Self = Self::pair(Dist::Star, Dist::Md);
    pub const STAR_STAR: Self = Self::pair(Dist::Star, Dist::Star);

    /// Every valid distribution pair.
    pub const ALL: [Self; 13] = [
        Self::MC_MR,
        Self::MR_MC,
        Self::MC_STAR,
        Self::STAR_MC,
        Self::MR_STAR,
        Self::STAR_MR,
        Self::VC_STAR,
        Self::STAR_VC,
        Self::VR_STAR,
        Self::STAR_VR,
        Self::MD_STAR,
        Self::STAR_MD,
        Self::STAR_STAR,
    ];

    const fn pair(col: Dist, row: Dist) -> Self {
        Self { col, row }
    }

    /// Validated constructor: the two axes must not share a grid dimension.
    pub fn new(col: Dist, row: Dist) -> Result<Self> {
        let d = Self { col, row };
        if d.is_valid() {
            Ok(d)
        } else {
            Err(DistError::InvalidDistribution { col, row })
        }
    }

    pub fn is_valid(self) -> bool {
        !(self.col.uses_grid_rows() && self.row.uses_grid_rows()
            || self.col.uses_grid_cols() && self.row.uses_grid_cols())
    }

    /// Whether some axis is dealt over grid rows.
    pub fn uses_grid_rows(self) -> bool {
        self.col.uses_grid_rows() || self.row.uses_grid_rows()
    }

    /// Whether some axis is dealt over grid columns.
    pub fn uses_grid_cols(self) -> bool {
        self.col.uses_grid_cols() || self.row.uses_grid_cols()
    }

    /// Whether either axis uses the diagonal-path distribution.
    pub fn is_diagonal(self) -> bool {
        self.col == Dist::Md || self.row == Dist::Md
    }
}

impl fmt::Display for Distribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{},{}]", self.col, self.row)
    }
}

// ============================================================================
// Shift arithmetic
// ============================================================================

/// First global index owned by `rank`: `(rank - align) mod stride`.
#[inline]
pub fn shift(rank: usize, align: usize, stride: usize) -> usize {
    (rank + stride - align % stride) % stride
}

/// How many of `shift, shift + stride, ...` fall below `n`.
#[inline]
pub fn local_length(n: usize, shift: usize, stride: usize) -> usize {
    if n > shift {
        (n - shift - 1) / stride + 1
    } else {
        0
    }
}

/// Largest local length any owner can have: `ceil(n / stride)`.
#[inline]
pub fn max_local_length(n: usize, stride: usize) -> usize {
    n.div_ceil(stride)
}

/// Owner index of global index `index` under alignment `align`.
#[inline]
pub fn owner(index: usize, align: usize, stride: usize) -> usize {
    (index + align) % stride
}

// ============================================================================
// Descriptor
// ============================================================================

/// Distribution pair plus the alignment state of one matrix on one process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descriptor {
    distribution: Distribution,
    col_align: usize,
    row_align: usize,
    col_constrained: bool,
    row_constrained: bool,
    diag_path: usize,
    col_stride: usize,
    row_stride: usize,
    col_rank: usize,
    row_rank: usize,
    col_shift: usize,
    row_shift: usize,
    participating: bool,
}

impl Descriptor {
    /// Unconstrained descriptor with zero alignments.
    pub fn new(grid: &Grid, distribution: Distribution) -> Result<Self> {
        Distribution::new(distribution.col, distribution.row)?;
        let mut desc = Self {
            distribution,
            col_align: 0,
            row_align: 0,
            col_constrained: false,
            row_constrained: false,
            diag_path: 0,
            col_stride: distribution.col.stride(grid),
            row_stride: distribution.row.stride(grid),
            col_rank: distribution.col.rank(grid),
            row_rank: distribution.row.rank(grid),
            col_shift: 0,
            row_shift: 0,
            participating: true,
        };
        desc.refresh(grid);
        Ok(desc)
    }

    fn refresh(&mut self, grid: &Grid) {
        self.col_shift = shift(self.col_rank, self.col_align, self.col_stride);
        self.row_shift = shift(self.row_rank, self.row_align, self.row_stride);
        self.participating = !self.distribution.is_diagonal() || grid.diag_path() == self.diag_path;
    }

    #[inline]
    pub fn distribution(&self) -> Distribution {
        self.distribution
    }

    #[inline]
    pub fn col_align(&self) -> usize {
        self.col_align
    }

    #[inline]
    pub fn row_align(&self) -> usize {
        self.row_align
    }

    #[inline]
    pub fn col_shift(&self) -> usize {
        self.col_shift
    }

    #[inline]
    pub fn row_shift(&self) -> usize {
        self.row_shift
    }

    #[inline]
    pub fn col_stride(&self) -> usize {
        self.col_stride
    }

    #[inline]
    pub fn row_stride(&self) -> usize {
        self.row_stride
    }

    /// This process's owner index along the column axis.
    #[inline]
    pub fn col_rank(&self) -> usize {
        self.col_rank
    }

    #[inline]
    pub fn row_rank(&self) -> usize {
        self.row_rank
    }

    #[inline]
    pub fn col_constrained(&self) -> bool {
        self.col_constrained
    }

    #[inline]
    pub fn row_constrained(&self) -> bool {
        self.row_constrained
    }

    /// Diagonal path the `MD` axis lives on (0 for other distributions).
    #[inline]
    pub fn diag_path(&self) -> usize {
        self.diag_path
    }

    /// False only for `MD` matrices on processes off the matrix's path.
    #[inline]
    pub fn participating(&self) -> bool {
        self.participating
    }

    pub(crate) fn set_col_align(&mut self, grid: &Grid, align: usize, constrain: bool) -> Result<()> {
        if align >= self.col_stride {
            return Err(DistError::InvalidAlignment {
                align,
                stride: self.col_stride,
            });
        }
        self.col_align = align;
        self.col_constrained |= constrain;
        self.refresh(grid);
        Ok(())
    }

    pub(crate) fn set_row_align(&mut self, grid: &Grid, align: usize, constrain: bool) -> Result<()> {
        if align >= self.row_stride {
            return Err(DistError::InvalidAlignment {
                align,
                stride: self.row_stride,
            });
        }
        self.row_align = align;
        self.row_constrained |= constrain;
        self.refresh(grid);
        Ok(())
    }

    pub(crate) fn set_diag_path(&mut self, grid: &Grid, path: usize) -> Result<()> {
        if path >= grid.gcd() {
            return Err(DistError::InvalidAlignment {
                align: path,
                stride: grid.gcd(),
            });
        }
        self.diag_path = path;
        self.refresh(grid);
        Ok(())
    }

    /// Back to zero, unconstrained alignments.
    pub(crate) fn reset(&mut self, grid: &Grid) {
        self.col_align = 0;
        self.row_align = 0;
        self.diag_path = 0;
        self.free_alignments();
        self.refresh(grid);
    }

    pub(crate) fn free_alignments(&mut self) {
        self.col_constrained = false;
        self.row_constrained = false;
    }

    /// Local row count of a matrix with `height` global rows.
    #[inline]
    pub fn local_height(&self, height: usize) -> usize {
        if !self.participating && self.distribution.col == Dist::Md {
            return 0;
        }
        local_length(height, self.col_shift, self.col_stride)
    }

    /// Local column count of a matrix with `width` global columns.
    #[inline]
    pub fn local_width(&self, width: usize) -> usize {
        if !self.participating && self.distribution.row == Dist::Md {
            return 0;
        }
        local_length(width, self.row_shift, self.row_stride)
    }

    /// Global row of local row `i_loc`.
    #[inline]
    pub fn global_row(&self, i_loc: usize) -> usize {
        self.col_shift + i_loc * self.col_stride
    }

    /// Global column of local column `j_loc`.
    #[inline]
    pub fn global_col(&self, j_loc: usize) -> usize {
        self.row_shift + j_loc * self.row_stride
    }

    /// Owner index (along the column axis) of global row `i`.
    #[inline]
    pub fn owner_row(&self, i: usize) -> usize {
        owner(i, self.col_align, self.col_stride)
    }

    /// Owner index (along the row axis) of global column `j`.
    #[inline]
    pub fn owner_col(&self, j: usize) -> usize {
        owner(j, self.row_align, self.row_stride)
    }

    /// Local row holding global row `i`, if this process owns it.
    #[inline]
    pub fn local_row(&self, i: usize) -> Option<usize> {
        let owned = self.owner_row(i) == self.col_rank
            && (self.participating || self.distribution.col != Dist::Md);
        owned.then(|| (i - self.col_shift) / self.col_stride)
    }

    /// Local column holding global column `j`, if this process owns it.
    #[inline]
    pub fn local_col(&self, j: usize) -> Option<usize> {
        let owned = self.owner_col(j) == self.row_rank
            && (self.participating || self.distribution.row != Dist::Md);
        owned.then(|| (j - self.row_shift) / self.row_stride)
    }

    /// Descriptor of the submatrix whose top-left corner is global `(i, j)`.
    ///
    /// The submatrix inherits the parent's owners, so its alignments are the
    /// parent's advanced by the offset, and they are fixed.
    pub(crate) fn offset_by(&self, grid: &Grid, i: usize, j: usize) -> Self {
        let mut sub = *self;
        sub.col_align = (self.col_align + i) % self.col_stride;
        sub.row_align = (self.row_align + j) % self.row_stride;
        sub.col_constrained = true;
        sub.row_constrained = true;
        sub.refresh(grid);
        sub
    }

    /// Whether this process holds the primary copy of data replicated over
    /// the grid dimensions the distribution does not use.
    pub(crate) fn is_primary(&self, grid: &Grid) -> bool {
        let d = self.distribution;
        self.participating
            && (d.uses_grid_rows() || grid.row() == 0)
            && (d.uses_grid_cols() || grid.col() == 0)
    }
}
