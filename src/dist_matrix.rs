//! Distributed matrices.
//!
//! A [`DistMatrix`] pairs global dimensions and a [`Descriptor`] with this
//! process's local shard. Views of a distributed matrix are distributed
//! matrices themselves: the descriptor of a view at global offset `(i, j)` has
//! its alignments advanced by `(i, j)`, and its local shard is a view of the
//! parent's local shard starting at the number of owned rows and columns
//! preceding `(i, j)`.
//!
//! Only [`DistMatrix::get_global`], [`DistMatrix::to_global_vec`] and
//! [`DistMatrix::redistribute_from`] communicate. They are collectives over
//! the grid and must be called by every process in the same order.

use std::sync::Arc;

use tracing::debug;

use crate::comm::all_gather;
use crate::dist::{Descriptor, Dist, Distribution};
use crate::grid::Grid;
use crate::matrix::{LocalBuffer, Matrix, ViewState};
use crate::scalar::Scalar;
use crate::view::Viewable;
use crate::{DistError, Result, CHECKED};

/// A matrix spread over a process grid.
#[derive(Debug)]
pub struct DistMatrix<T> {
    grid: Arc<Grid>,
    desc: Descriptor,
    height: usize,
    width: usize,
    origin: (usize, usize),
    local: Matrix<T>,
}

impl<T: Scalar> DistMatrix<T> {
    /// Empty (`0 x 0`) matrix with free alignments.
    pub fn new(grid: &Arc<Grid>, distribution: Distribution) -> Result<Self> {
        Ok(Self {
            grid: Arc::clone(grid),
            desc: Descriptor::new(grid, distribution)?,
            height: 0,
            width: 0,
            origin: (0, 0),
            local: Matrix::default(),
        })
    }

    /// Zero-filled `height x width` matrix with free alignments.
    pub fn with_size(
        grid: &Arc<Grid>,
        distribution: Distribution,
        height: usize,
        width: usize,
    ) -> Result<Self> {
        let mut a = Self::new(grid, distribution)?;
        a.resize(height, width)?;
        Ok(a)
    }

    /// Zero-filled matrix with pinned alignments.
    pub fn with_alignments(
        grid: &Arc<Grid>,
        distribution: Distribution,
        height: usize,
        width: usize,
        col_align: usize,
        row_align: usize,
    ) -> Result<Self> {
        let mut a = Self::new(grid, distribution)?;
        a.align(col_align, row_align)?;
        a.resize(height, width)?;
        Ok(a)
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    #[inline]
    pub fn grid(&self) -> &Arc<Grid> {
        &self.grid
    }

    #[inline]
    pub fn distribution(&self) -> Distribution {
        self.desc.distribution()
    }

    #[inline]
    pub fn descriptor(&self) -> &Descriptor {
        &self.desc
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
    pub fn local_height(&self) -> usize {
        self.local.height()
    }

    #[inline]
    pub fn local_width(&self) -> usize {
        self.local.width()
    }

    /// This process's shard.
    pub fn local(&self) -> &Matrix<T> {
        &self.local
    }

    pub fn local_mut(&mut self) -> &mut Matrix<T> {
        &mut self.local
    }

    /// Global position of element `(0, 0)` within the matrix this one was
    /// carved from.
    #[inline]
    pub fn origin(&self) -> (usize, usize) {
        self.origin
    }

    #[inline]
    pub fn col_align(&self) -> usize {
        self.desc.col_align()
    }

    #[inline]
    pub fn row_align(&self) -> usize {
        self.desc.row_align()
    }

    #[inline]
    pub fn col_shift(&self) -> usize {
        self.desc.col_shift()
    }

    #[inline]
    pub fn row_shift(&self) -> usize {
        self.desc.row_shift()
    }

    #[inline]
    pub fn col_stride(&self) -> usize {
        self.desc.col_stride()
    }

    #[inline]
    pub fn row_stride(&self) -> usize {
        self.desc.row_stride()
    }

    #[inline]
    pub fn diag_path(&self) -> usize {
        self.desc.diag_path()
    }

    /// Whether this process holds any part of the matrix's distribution.
    #[inline]
    pub fn participating(&self) -> bool {
        self.desc.participating()
    }

    #[inline]
    pub fn is_viewing(&self) -> bool {
        self.local.is_viewing()
    }

    #[inline]
    pub fn is_locked(&self) -> bool {
        self.local.is_locked()
    }

    // ------------------------------------------------------------------
    // Index translation
    // ------------------------------------------------------------------

    /// Global row of local row `i_loc`.
    #[inline]
    pub fn global_row(&self, i_loc: usize) -> usize {
        self.desc.global_row(i_loc)
    }

    /// Global column of local column `j_loc`.
    #[inline]
    pub fn global_col(&self, j_loc: usize) -> usize {
        self.desc.global_col(j_loc)
    }

    /// Local row of global row `i`, if owned here.
    #[inline]
    pub fn local_row(&self, i: usize) -> Option<usize> {
        self.desc.local_row(i)
    }

    /// Local column of global column `j`, if owned here.
    #[inline]
    pub fn local_col(&self, j: usize) -> Option<usize> {
        self.desc.local_col(j)
    }

    /// Whether this process holds global entry `(i, j)`.
    pub fn is_local(&self, i: usize, j: usize) -> bool {
        self.local_row(i).is_some() && self.local_col(j).is_some()
    }

    /// Owner index of global row `i` along the column distribution.
    #[inline]
    pub fn owner_row(&self, i: usize) -> usize {
        self.desc.owner_row(i)
    }

    /// Owner index of global column `j` along the row distribution.
    #[inline]
    pub fn owner_col(&self, j: usize) -> usize {
        self.desc.owner_col(j)
    }

    fn check_index(&self, i: usize, j: usize) -> Result<()> {
        if i >= self.height || j >= self.width {
            return Err(DistError::OutOfBounds {
                i,
                j,
                height: self.height,
                width: self.width,
            });
        }
        Ok(())
    }

    fn local_index(&self, i: usize, j: usize) -> Result<(usize, usize)> {
        match (self.local_row(i), self.local_col(j)) {
            (Some(il), Some(jl)) => Ok((il, jl)),
            _ => Err(DistError::NotLocal { i, j }),
        }
    }

    // ------------------------------------------------------------------
    // Shape and alignment
    // ------------------------------------------------------------------

    /// Change the global dimensions; the local shard follows the current
    /// alignments. Views can only be "resized" to their own dimensions.
    pub fn resize(&mut self, height: usize, width: usize) -> Result<()> {
        if self.local.is_viewing() {
            return self.check_view_resize(height, width);
        }
        self.local
            .resize(self.desc.local_height(height), self.desc.local_width(width))?;
        self.height = height;
        self.width = width;
        Ok(())
    }

    /// [`DistMatrix::resize`] with an explicit local leading dimension.
    pub fn resize_with_ldim(&mut self, height: usize, width: usize, ldim: usize) -> Result<()> {
        if self.local.is_viewing() {
            return self.check_view_resize(height, width);
        }
        self.local.resize_with_ldim(
            self.desc.local_height(height),
            self.desc.local_width(width),
            ldim,
        )?;
        self.height = height;
        self.width = width;
        Ok(())
    }

    fn check_view_resize(&self, height: usize, width: usize) -> Result<()> {
        if CHECKED && self.local.is_locked() {
            return Err(DistError::Locked);
        }
        if (height, width) != (self.height, self.width) {
            return Err(DistError::ViewResize {
                height: self.height,
                width: self.width,
                new_height: height,
                new_width: width,
            });
        }
        Ok(())
    }

    /// Become an owning `0 x 0` matrix with free alignments. Storage shared
    /// with other views is left untouched.
    pub fn empty(&mut self) {
        self.desc.reset(&self.grid);
        self.height = 0;
        self.width = 0;
        self.origin = (0, 0);
        self.local.empty();
    }

    /// Pin both alignments.
    ///
    /// Changing an alignment is only legal on an owning matrix without
    /// entries, since existing data would have to move between processes.
    pub fn align(&mut self, col_align: usize, row_align: usize) -> Result<()> {
        self.align_parts(Some(col_align), Some(row_align), None)
    }

    pub fn align_cols(&mut self, col_align: usize) -> Result<()> {
        self.align_parts(Some(col_align), None, None)
    }

    pub fn align_rows(&mut self, row_align: usize) -> Result<()> {
        self.align_parts(None, Some(row_align), None)
    }

    /// Pin the diagonal path of an `MD` matrix.
    pub fn align_diagonal(&mut self, path: usize) -> Result<()> {
        self.align_parts(None, None, Some(path))
    }

    /// Co-locate with `other`: every non-replicated axis of `self` takes the
    /// alignment of the axis of `other` with the same distribution.
    pub fn align_with<U: Scalar>(&mut self, other: &DistMatrix<U>) -> Result<()> {
        if CHECKED && !Grid::same(&self.grid, &other.grid) {
            return Err(DistError::GridMismatch);
        }
        let ours = self.distribution();
        let theirs = other.distribution();
        let pick = |axis: Dist| {
            if axis == Dist::Star {
                None
            } else if theirs.col == axis {
                Some(other.col_align())
            } else if theirs.row == axis {
                Some(other.row_align())
            } else {
                None
            }
        };
        let col = pick(ours.col);
        let row = pick(ours.row);
        let path = (ours.is_diagonal() && theirs.is_diagonal()).then(|| other.diag_path());
        let replicated = ours == Distribution::STAR_STAR;
        if col.is_none() && row.is_none() && !replicated {
            return Err(DistError::IncompatibleAlignment {
                target: ours,
                other: theirs,
            });
        }
        debug!(%ours, %theirs, ?col, ?row, "aligning with operand");
        self.align_parts(col, row, path)
    }

    /// Let the next assignment choose the alignments again.
    pub fn free_alignments(&mut self) {
        if !self.local.is_viewing() {
            self.desc.free_alignments();
        }
    }

    fn alignment_changes(&self, col: Option<usize>, row: Option<usize>, path: Option<usize>) -> bool {
        col.is_some_and(|a| a != self.desc.col_align())
            || row.is_some_and(|a| a != self.desc.row_align())
            || path.is_some_and(|p| p != self.desc.diag_path())
    }

    fn align_parts(
        &mut self,
        col: Option<usize>,
        row: Option<usize>,
        path: Option<usize>,
    ) -> Result<()> {
        if CHECKED && self.alignment_changes(col, row, path) {
            if self.local.is_viewing() {
                return Err(DistError::IllegalRealign(
                    "a view's alignment is fixed by its parent",
                ));
            }
            if self.height > 0 && self.width > 0 {
                return Err(DistError::IllegalRealign(
                    "matrix holds data; empty it before realigning",
                ));
            }
        }
        self.set_alignments(col, row, path, true)
    }

    fn set_alignments(
        &mut self,
        col: Option<usize>,
        row: Option<usize>,
        path: Option<usize>,
        constrain: bool,
    ) -> Result<()> {
        let mut desc = self.desc;
        if let Some(a) = col {
            desc.set_col_align(&self.grid, a, constrain)?;
        }
        if let Some(a) = row {
            desc.set_row_align(&self.grid, a, constrain)?;
        }
        if let Some(p) = path {
            desc.set_diag_path(&self.grid, p)?;
        }
        if !self.local.is_viewing() {
            self.local
                .resize(desc.local_height(self.height), desc.local_width(self.width))?;
        }
        self.desc = desc;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Attach
    // ------------------------------------------------------------------

    /// View external local storage as the shard of a `height x width` matrix
    /// with the given alignments.
    pub fn attach(
        &mut self,
        height: usize,
        width: usize,
        col_align: usize,
        row_align: usize,
        buffer: &LocalBuffer<T>,
        ldim: usize,
    ) -> Result<()> {
        self.attach_as(height, width, col_align, row_align, buffer, ldim, false)
    }

    /// Read-only variant of [`DistMatrix::attach`].
    pub fn locked_attach(
        &mut self,
        height: usize,
        width: usize,
        col_align: usize,
        row_align: usize,
        buffer: &LocalBuffer<T>,
        ldim: usize,
    ) -> Result<()> {
        self.attach_as(height, width, col_align, row_align, buffer, ldim, true)
    }

    #[allow(clippy::too_many_arguments)]
    fn attach_as(
        &mut self,
        height: usize,
        width: usize,
        col_align: usize,
        row_align: usize,
        buffer: &LocalBuffer<T>,
        ldim: usize,
        locked: bool,
    ) -> Result<()> {
        let mut desc = self.desc;
        desc.reset(&self.grid);
        desc.set_col_align(&self.grid, col_align, true)?;
        desc.set_row_align(&self.grid, row_align, true)?;
        let (lh, lw) = (desc.local_height(height), desc.local_width(width));
        let mut local = Matrix::default();
        if locked {
            local.locked_attach(buffer, 0, lh, lw, ldim)?;
        } else {
            local.attach(buffer, 0, lh, lw, ldim)?;
        }
        self.desc = desc;
        self.height = height;
        self.width = width;
        self.origin = (0, 0);
        self.local = local;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Local element access
    // ------------------------------------------------------------------

    /// Read global entry `(i, j)`; fails with [`DistError::NotLocal`] unless
    /// this process owns it.
    pub fn get(&self, i: usize, j: usize) -> Result<T> {
        if CHECKED {
            self.check_index(i, j)?;
        }
        let (il, jl) = self.local_index(i, j)?;
        self.local.get(il, jl)
    }

    pub fn set(&mut self, i: usize, j: usize, value: T) -> Result<()> {
        if CHECKED {
            self.check_index(i, j)?;
        }
        let (il, jl) = self.local_index(i, j)?;
        self.local.set(il, jl, value)
    }

    /// Add `value` to global entry `(i, j)`.
    pub fn update(&mut self, i: usize, j: usize, value: T) -> Result<()> {
        if CHECKED {
            self.check_index(i, j)?;
        }
        let (il, jl) = self.local_index(i, j)?;
        self.local.update(il, jl, value)
    }

    pub fn get_local(&self, i_loc: usize, j_loc: usize) -> Result<T> {
        self.local.get(i_loc, j_loc)
    }

    pub fn set_local(&mut self, i_loc: usize, j_loc: usize, value: T) -> Result<()> {
        self.local.set(i_loc, j_loc, value)
    }

    pub fn update_local(&mut self, i_loc: usize, j_loc: usize, value: T) -> Result<()> {
        self.local.update(i_loc, j_loc, value)
    }

    pub fn fill(&mut self, value: T) -> Result<()> {
        self.local.fill(value)
    }

    /// Set every locally owned entry `(i, j)` to `f(i, j)` (global indices).
    pub fn set_from_fn(&mut self, mut f: impl FnMut(usize, usize) -> T) -> Result<()> {
        let (lh, lw) = (self.local.height(), self.local.width());
        let mut values = Vec::new();
        values.try_reserve(lh * lw)?;
        for jl in 0..lw {
            let j = self.global_col(jl);
            for il in 0..lh {
                values.push(f(self.global_row(il), j));
            }
        }
        self.local.write_col_major(&values)
    }

    /// Overwrite with `other`, which must have the same distribution.
    ///
    /// Never communicates. A destination with free alignments adopts the
    /// source's; a pinned alignment that differs fails with
    /// [`DistError::AlignmentMismatch`], and the caller must use
    /// [`DistMatrix::redistribute_from`] instead.
    pub fn copy_from(&mut self, other: &DistMatrix<T>) -> Result<()> {
        let _span = tracing::trace_span!("copy_from", height = other.height, width = other.width)
            .entered();
        if CHECKED {
            if !Grid::same(&self.grid, &other.grid) {
                return Err(DistError::GridMismatch);
            }
            if self.distribution() != other.distribution() {
                return Err(DistError::DistributionMismatch {
                    expected: self.distribution(),
                    found: other.distribution(),
                });
            }
        }
        let axes = [
            ("column", other.col_align(), self.col_align(), self.desc.col_constrained()),
            ("row", other.row_align(), self.row_align(), self.desc.row_constrained()),
        ];
        let mut adopt = false;
        for (axis, theirs, ours, constrained) in axes {
            if theirs != ours {
                if constrained {
                    return Err(DistError::AlignmentMismatch {
                        axis,
                        expected: ours,
                        found: theirs,
                    });
                }
                adopt = true;
            }
        }
        let path = other.diag_path();
        if path != self.diag_path() {
            if self.local.is_viewing() {
                return Err(DistError::AlignmentMismatch {
                    axis: "diagonal path",
                    expected: self.diag_path(),
                    found: path,
                });
            }
            adopt = true;
        }
        if adopt {
            debug!(
                col_align = other.col_align(),
                row_align = other.row_align(),
                "adopting source alignment"
            );
            self.set_alignments(
                Some(other.col_align()),
                Some(other.row_align()),
                Some(path),
                false,
            )?;
        }
        if (self.height, self.width) != (other.height, other.width) {
            self.resize(other.height, other.width)?;
        }
        self.local.copy_from(&other.local)
    }

    // ------------------------------------------------------------------
    // Collectives
    // ------------------------------------------------------------------

    /// Read any global entry. Collective over the grid.
    pub fn get_global(&self, i: usize, j: usize) -> Result<T> {
        let _span = tracing::trace_span!("get_global", i, j).entered();
        self.check_index(i, j)?;
        let mine = match self.local_index(i, j) {
            Ok((il, jl)) => vec![self.local.get(il, jl)?],
            Err(_) => Vec::new(),
        };
        all_gather(self.grid.comm(), &mine)?
            .into_iter()
            .flatten()
            .next()
            .ok_or_else(|| DistError::Communication(format!("no process owns entry ({i}, {j})")))
    }

    /// The whole matrix in column-major order on every process. Collective
    /// over the grid.
    pub fn to_global_vec(&self) -> Result<Vec<T>> {
        let _span = tracing::trace_span!("to_global_vec", height = self.height, width = self.width)
            .entered();
        let (index, values) = self.gather_entries()?;
        let mut global = Vec::new();
        global.try_reserve(self.height * self.width)?;
        global.resize(self.height * self.width, T::zero());
        for (k, v) in index.into_iter().zip(values) {
            global[k as usize] = v;
        }
        Ok(global)
    }

    /// Overwrite with `other` under this matrix's own distribution and
    /// alignments. Collective over the grid.
    ///
    /// Every entry is gathered once from the processes holding its primary
    /// copy and each process keeps the entries it owns, so the cost is linear
    /// in the global size on every process.
    pub fn redistribute_from<U>(&mut self, other: &DistMatrix<U>) -> Result<()>
    where
        U: Scalar,
        T: From<U>,
    {
        let _span = tracing::debug_span!(
            "redistribute",
            from = %other.distribution(),
            to = %self.distribution(),
            height = other.height,
            width = other.width
        )
        .entered();
        if !Grid::same(&self.grid, &other.grid) {
            return Err(DistError::GridMismatch);
        }
        if (self.height, self.width) != (other.height, other.width) {
            self.resize(other.height, other.width)?;
        }
        let (index, values) = other.gather_entries()?;
        if self.height == 0 {
            return Ok(());
        }
        let lh = self.local.height();
        let mut local = Vec::new();
        local.try_reserve(lh * self.local.width())?;
        local.resize(lh * self.local.width(), T::zero());
        for (k, v) in index.into_iter().zip(values) {
            let k = k as usize;
            let (i, j) = (k % self.height, k / self.height);
            if let (Some(il), Some(jl)) = (self.local_row(i), self.local_col(j)) {
                local[il + jl * lh] = T::from(v);
            }
        }
        self.local.write_col_major(&local)
    }

    /// Column-major global indices and values of every entry, each taken from
    /// exactly one process.
    fn gather_entries(&self) -> Result<(Vec<u64>, Vec<T>)> {
        let mut index = Vec::new();
        let mut values = Vec::new();
        if self.desc.is_primary(&self.grid) {
            values = self.local.to_col_major_vec()?;
            index.try_reserve(values.len())?;
            for jl in 0..self.local.width() {
                let j = self.global_col(jl);
                for il in 0..self.local.height() {
                    index.push((self.global_row(il) + j * self.height) as u64);
                }
            }
        }
        let comm = self.grid.comm();
        let index = all_gather(comm, &index)?.concat();
        let values = all_gather(comm, &values)?.concat();
        if index.len() != values.len() {
            return Err(DistError::Communication(format!(
                "gathered {} indices for {} values",
                index.len(),
                values.len()
            )));
        }
        Ok((index, values))
    }

    // ------------------------------------------------------------------
    // View internals
    // ------------------------------------------------------------------

    fn check_region(&self, i: usize, j: usize, height: usize, width: usize) -> Result<()> {
        if i + height > self.height || j + width > self.width {
            return Err(DistError::SubmatrixOutOfBounds {
                i,
                j,
                height,
                width,
                parent_height: self.height,
                parent_width: self.width,
            });
        }
        Ok(())
    }

    fn region_unchecked(
        &self,
        i: usize,
        j: usize,
        height: usize,
        width: usize,
        state: ViewState,
    ) -> Self {
        let desc = self.desc.offset_by(&self.grid, i, j);
        let (li, lj) = (self.desc.local_height(i), self.desc.local_width(j));
        let (lh, lw) = (desc.local_height(height), desc.local_width(width));
        Self {
            grid: Arc::clone(&self.grid),
            desc,
            height,
            width,
            origin: (self.origin.0 + i, self.origin.1 + j),
            local: self.local.region_unchecked(li, lj, lh, lw, state),
        }
    }

    fn check_siblings(a: &Self, b: &Self) -> Result<()> {
        if !Grid::same(&a.grid, &b.grid) {
            return Err(DistError::GridMismatch);
        }
        if a.distribution() != b.distribution() {
            return Err(DistError::DistributionMismatch {
                expected: a.distribution(),
                found: b.distribution(),
            });
        }
        if a.diag_path() != b.diag_path() {
            return Err(DistError::NonContiguous("diagonal paths differ"));
        }
        Ok(())
    }

    fn check_1x2(left: &Self, right: &Self) -> Result<()> {
        Self::check_siblings(left, right)?;
        if left.height != right.height {
            return Err(DistError::NonContiguous("heights differ"));
        }
        if right.origin != (left.origin.0, left.origin.1 + left.width) {
            return Err(DistError::NonContiguous("blocks are not adjacent"));
        }
        if right.col_align() != left.col_align()
            || right.row_align() != (left.row_align() + left.width) % left.row_stride()
        {
            return Err(DistError::NonContiguous("alignments are not consecutive"));
        }
        Matrix::check_1x2(&left.local, &right.local)
    }

    fn check_2x1(top: &Self, bottom: &Self) -> Result<()> {
        Self::check_siblings(top, bottom)?;
        if top.width != bottom.width {
            return Err(DistError::NonContiguous("widths differ"));
        }
        if bottom.origin != (top.origin.0 + top.height, top.origin.1) {
            return Err(DistError::NonContiguous("blocks are not adjacent"));
        }
        if bottom.row_align() != top.row_align()
            || bottom.col_align() != (top.col_align() + top.height) % top.col_stride()
        {
            return Err(DistError::NonContiguous("alignments are not consecutive"));
        }
        Matrix::check_2x1(&top.local, &bottom.local)
    }

    fn merge_1x2_unchecked(left: &Self, right: &Self, state: ViewState) -> Self {
        Self {
            grid: Arc::clone(&left.grid),
            desc: left.desc.offset_by(&left.grid, 0, 0),
            height: left.height,
            width: left.width + right.width,
            origin: left.origin,
            local: Matrix::merge_1x2_unchecked(&left.local, &right.local, state),
        }
    }

    fn merge_2x1_unchecked(top: &Self, bottom: &Self, state: ViewState) -> Self {
        Self {
            grid: Arc::clone(&top.grid),
            desc: top.desc.offset_by(&top.grid, 0, 0),
            height: top.height + bottom.height,
            width: top.width,
            origin: top.origin,
            local: Matrix::merge_2x1_unchecked(&top.local, &bottom.local, state),
        }
    }

    fn check_writable(&self) -> Result<()> {
        if self.is_locked() {
            return Err(DistError::Locked);
        }
        Ok(())
    }
}

impl<T: Scalar> Viewable for DistMatrix<T> {
    fn height(&self) -> usize {
        self.height
    }

    fn width(&self) -> usize {
        self.width
    }

    fn is_locked(&self) -> bool {
        self.local.is_locked()
    }

    fn view_region(&self, i: usize, j: usize, height: usize, width: usize) -> Result<Self> {
        if CHECKED {
            self.check_writable()?;
            self.check_region(i, j, height, width)?;
        }
        Ok(self.region_unchecked(i, j, height, width, ViewState::View))
    }

    fn locked_view_region(&self, i: usize, j: usize, height: usize, width: usize) -> Result<Self> {
        if CHECKED {
            self.check_region(i, j, height, width)?;
        }
        Ok(self.region_unchecked(i, j, height, width, ViewState::LockedView))
    }

    fn view_1x2(left: &Self, right: &Self) -> Result<Self> {
        if CHECKED {
            left.check_writable()?;
            right.check_writable()?;
            Self::check_1x2(left, right)?;
        }
        Ok(Self::merge_1x2_unchecked(left, right, ViewState::View))
    }

    fn locked_view_1x2(left: &Self, right: &Self) -> Result<Self> {
        if CHECKED {
            Self::check_1x2(left, right)?;
        }
        Ok(Self::merge_1x2_unchecked(left, right, ViewState::LockedView))
    }

    fn view_2x1(top: &Self, bottom: &Self) -> Result<Self> {
        if CHECKED {
            top.check_writable()?;
            bottom.check_writable()?;
            Self::check_2x1(top, bottom)?;
        }
        Ok(Self::merge_2x1_unchecked(top, bottom, ViewState::View))
    }

    fn locked_view_2x1(top: &Self, bottom: &Self) -> Result<Self> {
        if CHECKED {
            Self::check_2x1(top, bottom)?;
        }
        Ok(Self::merge_2x1_unchecked(top, bottom, ViewState::LockedView))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::ThreadComm;
    use crate::partition::partition_down;
    use approx::assert_relative_eq;

    fn on_grid<R, F>(procs: usize, f: F) -> Vec<R>
    where
        R: Send,
        F: Fn(Arc<Grid>) -> R + Sync,
    {
        ThreadComm::run(procs, |comm| f(Grid::new(Arc::new(comm)).unwrap()))
    }

    fn entry(i: usize, j: usize) -> f64 {
        (i * 100 + j) as f64
    }

    #[test]
    fn test_ten_by_ten_on_two_by_two() {
        let out = on_grid(4, |grid| {
            let mut a = DistMatrix::<f64>::with_size(&grid, Distribution::MC_MR, 10, 10).unwrap();
            a.set_from_fn(entry).unwrap();
            let (at, ab) = partition_down(&a, 4).unwrap();
            let rows: Vec<usize> = (0..a.local_height()).map(|k| a.global_row(k)).collect();
            let cols: Vec<usize> = (0..a.local_width()).map(|k| a.global_col(k)).collect();
            let at_rows: Vec<usize> = (0..at.local_height()).map(|k| at.global_row(k)).collect();
            let ab_rows: Vec<usize> =
                (0..ab.local_height()).map(|k| ab.origin().0 + ab.global_row(k)).collect();
            let first_ab = ab.get_local(0, 0).unwrap();
            (
                (grid.row(), grid.col()),
                (a.local_height(), a.local_width()),
                rows,
                cols,
                (at.height(), at.width(), ab.height(), ab.width()),
                at_rows,
                ab_rows,
                first_ab,
            )
        });
        let (coords, local, rows, cols, global, at_rows, ab_rows, first_ab) = &out[0];
        assert_eq!(*coords, (0, 0));
        assert_eq!(*local, (5, 5));
        assert_eq!(rows, &vec![0, 2, 4, 6, 8]);
        assert_eq!(cols, &vec![0, 2, 4, 6, 8]);
        assert_eq!(*global, (4, 10, 6, 10));
        assert_eq!(at_rows, &vec![0, 2]);
        assert_eq!(ab_rows, &vec![4, 6, 8]);
        assert_relative_eq!(*first_ab, entry(4, 0));

        let (coords, local, rows, _, _, at_rows, ab_rows, first_ab) = &out[3];
        assert_eq!(*coords, (1, 1));
        assert_eq!(*local, (5, 5));
        assert_eq!(rows, &vec![1, 3, 5, 7, 9]);
        assert_eq!(at_rows, &vec![1, 3]);
        assert_eq!(ab_rows, &vec![5, 7, 9]);
        assert_relative_eq!(*first_ab, entry(5, 1));
    }

    #[test]
    fn test_local_heights_sum_to_global() {
        for dist in Distribution::ALL {
            let out = on_grid(6, move |grid| {
                let a = DistMatrix::<f64>::with_size(&grid, dist, 13, 7).unwrap();
                let primary = a.desc.is_primary(&grid);
                (a.local_height() * a.local_width(), primary)
            });
            let total: usize = out.iter().filter(|(_, p)| *p).map(|(n, _)| n).sum();
            assert_eq!(total, 13 * 7, "{dist}");
        }
    }

    #[test]
    fn test_alignment_adoption_without_communication() {
        let out = on_grid(4, |grid| {
            let mut y =
                DistMatrix::<f64>::with_alignments(&grid, Distribution::MC_MR, 7, 5, 1, 1).unwrap();
            y.set_from_fn(entry).unwrap();
            let mut x = DistMatrix::<f64>::new(&grid, Distribution::MC_MR).unwrap();
            let before = grid.collective_calls();
            x.align_with(&y).unwrap();
            x.copy_from(&y).unwrap();
            let calls = grid.collective_calls() - before;
            (
                calls,
                x.local().to_col_major_vec().unwrap() == y.local().to_col_major_vec().unwrap(),
                (x.col_align(), x.row_align()),
            )
        });
        for (calls, same, aligns) in out {
            assert_eq!(calls, 0);
            assert!(same);
            assert_eq!(aligns, (1, 1));
        }
    }

    #[test]
    fn test_free_destination_adopts_on_copy() {
        let out = on_grid(4, |grid| {
            let mut y =
                DistMatrix::<f64>::with_alignments(&grid, Distribution::MC_STAR, 6, 2, 1, 0).unwrap();
            y.set_from_fn(entry).unwrap();
            let mut x = DistMatrix::<f64>::with_size(&grid, Distribution::MC_STAR, 3, 3).unwrap();
            x.copy_from(&y).unwrap();
            (x.col_align(), x.descriptor().col_constrained(), x.get(1, 1).ok())
        });
        for (rank, (align, constrained, value)) in out.into_iter().enumerate() {
            assert_eq!(align, 1);
            assert!(!constrained);
            // Row 1 lives on grid row 0 once aligned at 1.
            if rank % 2 == 0 {
                assert_eq!(value, Some(entry(1, 1)));
            } else {
                assert_eq!(value, None);
            }
        }
    }

    #[test]
    fn test_constrained_mismatch_fails() {
        let out = on_grid(4, |grid| {
            let y = DistMatrix::<f64>::with_alignments(&grid, Distribution::MC_MR, 4, 4, 1, 0).unwrap();
            let mut x =
                DistMatrix::<f64>::with_alignments(&grid, Distribution::MC_MR, 4, 4, 0, 0).unwrap();
            let before = grid.collective_calls();
            let err = x.copy_from(&y);
            let wrong_dist = DistMatrix::<f64>::new(&grid, Distribution::MR_MC)
                .unwrap()
                .copy_from(&y);
            (
                matches!(err, Err(DistError::AlignmentMismatch { axis: "column", .. })),
                matches!(wrong_dist, Err(DistError::DistributionMismatch { .. })),
                grid.collective_calls() - before,
            )
        });
        assert!(out.iter().all(|&(a, b, calls)| a && b && calls == 0));
    }

    #[test]
    fn test_align_rules() {
        let grid = Grid::trivial().unwrap();
        let mut a = DistMatrix::<f64>::new(&grid, Distribution::MC_MR).unwrap();
        a.align(0, 0).unwrap();
        assert!(matches!(a.align(1, 0), Err(DistError::InvalidAlignment { .. })));

        let out = on_grid(4, |grid| {
            let mut a = DistMatrix::<f64>::with_size(&grid, Distribution::MC_MR, 3, 3).unwrap();
            let non_empty = matches!(a.align(1, 0), Err(DistError::IllegalRealign(_)));
            let mut view = a.view_region(1, 0, 2, 3).unwrap();
            let view_realign = matches!(view.align(0, 0), Err(DistError::IllegalRealign(_)));
            a.empty();
            a.align(1, 1).unwrap();
            a.resize(3, 3).unwrap();
            (non_empty, view_realign, a.col_align(), view.col_align())
        });
        for (non_empty, view_realign, align, view_align) in out {
            assert!(non_empty);
            assert!(view_realign);
            assert_eq!(align, 1);
            assert_eq!(view_align, 1);
        }
    }

    #[test]
    fn test_align_with_transposed_distribution() {
        let out = on_grid(4, |grid| {
            let y = DistMatrix::<f64>::with_alignments(&grid, Distribution::MC_MR, 2, 2, 1, 0).unwrap();
            let mut x = DistMatrix::<f64>::new(&grid, Distribution::MR_MC).unwrap();
            x.align_with(&y).unwrap();
            let mut z = DistMatrix::<f64>::new(&grid, Distribution::VC_STAR).unwrap();
            let err = z.align_with(&y);
            (
                (x.col_align(), x.row_align()),
                matches!(err, Err(DistError::IncompatibleAlignment { .. })),
            )
        });
        assert!(out.iter().all(|&(aligns, err)| aligns == (0, 1) && err));
    }

    #[test]
    fn test_global_access_is_local_only() {
        let out = on_grid(4, |grid| {
            let mut a = DistMatrix::<f64>::with_size(&grid, Distribution::MC_MR, 4, 4).unwrap();
            let owns = a.is_local(3, 2);
            let set = a.set(3, 2, 9.0);
            let out_of_range = matches!(a.get(4, 0), Err(DistError::OutOfBounds { .. }));
            (owns, set.is_ok(), matches!(set, Err(DistError::NotLocal { i: 3, j: 2 })), out_of_range)
        });
        for (rank, (owns, ok, not_local, out_of_range)) in out.into_iter().enumerate() {
            // (3, 2) lives on grid row 1, grid column 0, which is rank 1.
            assert_eq!(owns, rank == 1);
            assert_eq!(ok, rank == 1);
            assert_eq!(not_local, rank != 1);
            assert!(out_of_range);
        }
    }

    #[test]
    fn test_get_global_and_gather() {
        let out = on_grid(4, |grid| {
            let mut a = DistMatrix::<f64>::with_size(&grid, Distribution::MC_MR, 5, 3).unwrap();
            a.set_from_fn(entry).unwrap();
            (a.get_global(4, 2).unwrap(), a.to_global_vec().unwrap())
        });
        let expected: Vec<f64> = (0..3)
            .flat_map(|j| (0..5).map(move |i| entry(i, j)))
            .collect();
        for (value, global) in out {
            assert_relative_eq!(value, entry(4, 2));
            assert_eq!(global, expected);
        }
    }

    #[test]
    fn test_redistribute_between_distributions() {
        let out = on_grid(6, |grid| {
            let mut a = DistMatrix::<f64>::with_size(&grid, Distribution::MC_MR, 7, 5).unwrap();
            a.set_from_fn(entry).unwrap();
            let mut targets = Vec::new();
            for dist in [
                Distribution::VC_STAR,
                Distribution::STAR_VR,
                Distribution::MD_STAR,
                Distribution::STAR_STAR,
                Distribution::MR_MC,
            ] {
                let mut b = DistMatrix::<f64>::new(&grid, dist).unwrap();
                b.redistribute_from(&a).unwrap();
                let mut ok = true;
                for jl in 0..b.local_width() {
                    for il in 0..b.local_height() {
                        let expected = entry(b.global_row(il), b.global_col(jl));
                        ok &= b.get_local(il, jl).unwrap() == expected;
                    }
                }
                targets.push((ok, b.to_global_vec().unwrap() == a.to_global_vec().unwrap()));
            }
            targets
        });
        for targets in out {
            assert!(targets.iter().all(|&(ok, same)| ok && same));
        }
    }

    #[test]
    fn test_redistribute_widens_element_type() {
        let out = on_grid(2, |grid| {
            let mut a = DistMatrix::<f32>::with_size(&grid, Distribution::VC_STAR, 3, 2).unwrap();
            a.set_from_fn(|i, j| (i + j) as f32).unwrap();
            let mut b = DistMatrix::<f64>::new(&grid, Distribution::STAR_STAR).unwrap();
            b.redistribute_from(&a).unwrap();
            b.get(2, 1).unwrap()
        });
        assert!(out.iter().all(|&v| v == 3.0));
    }

    #[test]
    fn test_view_aliases_parent_shards() {
        let out = on_grid(4, |grid| {
            let mut a = DistMatrix::<f64>::with_size(&grid, Distribution::MC_MR, 6, 6).unwrap();
            let mut v = a.view_region(2, 3, 4, 3).unwrap();
            v.set_from_fn(|i, j| (i * 10 + j) as f64).unwrap();
            a.fill(0.0).unwrap();
            let mut w = a.view_region(2, 3, 4, 3).unwrap();
            w.fill(1.0).unwrap();
            let parent = a.to_global_vec().unwrap();
            let sub = v.get_global(3, 2).unwrap();
            (parent, sub)
        });
        for (parent, sub) in out {
            for j in 0..6 {
                for i in 0..6 {
                    let inside = i >= 2 && j >= 3;
                    assert_eq!(parent[i + 6 * j], if inside { 1.0 } else { 0.0 });
                }
            }
            assert_relative_eq!(sub, 1.0);
        }
    }

    #[test]
    fn test_contiguity_uses_global_positions() {
        let out = on_grid(4, |grid| {
            let a = DistMatrix::<f64>::with_size(&grid, Distribution::MC_MR, 8, 8).unwrap();
            let top = a.view_region(0, 0, 2, 8).unwrap();
            let gap = a.view_region(3, 0, 5, 8).unwrap();
            let next = a.view_region(2, 0, 6, 8).unwrap();
            (
                matches!(DistMatrix::view_2x1(&top, &gap), Err(DistError::NonContiguous(_))),
                DistMatrix::view_2x1(&top, &next).map(|m| (m.height(), m.local_height())).ok(),
            )
        });
        for (rejected, merged) in out {
            assert!(rejected);
            assert_eq!(merged, Some((8, 4)));
        }
    }

    #[test]
    fn test_md_participation() {
        let out = on_grid(4, |grid| {
            let a = DistMatrix::<f64>::with_size(&grid, Distribution::MD_STAR, 6, 3).unwrap();
            (grid.diag_path(), a.participating(), a.local_height())
        });
        let mut total = 0;
        for (path, participating, height) in out {
            assert_eq!(participating, path == 0);
            if !participating {
                assert_eq!(height, 0);
            }
            total += height;
        }
        assert_eq!(total, 6);
    }

    #[test]
    fn test_attach_views_external_storage() {
        let grid = Grid::trivial().unwrap();
        let buffer = LocalBuffer::from_vec((0..6).map(|x| x as f64).collect());
        let mut a = DistMatrix::<f64>::new(&grid, Distribution::MC_MR).unwrap();
        a.attach(2, 3, 0, 0, &buffer, 2).unwrap();
        assert_relative_eq!(a.get(1, 2).unwrap(), 5.0);
        a.set(0, 0, -1.0).unwrap();
        assert_relative_eq!(buffer.to_vec().unwrap()[0], -1.0);
        assert!(matches!(a.resize(3, 3), Err(DistError::ViewResize { .. })));

        let mut b = DistMatrix::<f64>::new(&grid, Distribution::MC_MR).unwrap();
        b.locked_attach(2, 3, 0, 0, &buffer, 2).unwrap();
        assert!(matches!(b.set(0, 0, 1.0), Err(DistError::Locked)));
        assert!(matches!(
            b.attach(4, 3, 0, 0, &buffer, 4),
            Err(DistError::AttachOutOfBounds { .. })
        ));
    }
}
