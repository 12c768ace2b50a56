//! Column-major local storage, owning or viewing.

use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

use crate::scalar::Scalar;
use crate::view::Viewable;
use crate::{DistError, Result, CHECKED};

/// Shared, growable element storage.
///
/// An owning matrix and every view carved out of it hold a handle to the same
/// buffer, so the storage stays alive for as long as its longest-lived view.
/// Growth never shrinks the buffer and never moves data already stored.
#[derive(Debug)]
pub struct LocalBuffer<T> {
    data: Rc<RefCell<Vec<T>>>,
}

impl<T> Clone for LocalBuffer<T> {
    fn clone(&self) -> Self {
        Self {
            data: Rc::clone(&self.data),
        }
    }
}

impl<T: Scalar> Default for LocalBuffer<T> {
    fn default() -> Self {
        Self::from_vec(Vec::new())
    }
}

impl<T: Scalar> LocalBuffer<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer of `len` zeros.
    pub fn zeroed(len: usize) -> Result<Self> {
        let buffer = Self::new();
        buffer.require(len)?;
        Ok(buffer)
    }

    pub fn from_vec(data: Vec<T>) -> Self {
        Self {
            data: Rc::new(RefCell::new(data)),
        }
    }

    /// Number of elements currently allocated.
    pub fn len(&self) -> Result<usize> {
        Ok(self.borrow()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Whether both handles refer to the same allocation.
    #[inline]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.data, &other.data)
    }

    /// Guarantee room for at least `len` elements. New elements are zero.
    pub fn require(&self, len: usize) -> Result<()> {
        let mut data = self.borrow_mut()?;
        if data.len() < len {
            let additional = len - data.len();
            data.try_reserve(additional)?;
            data.resize(len, T::zero());
        }
        Ok(())
    }

    /// Copy of the whole allocation.
    pub fn to_vec(&self) -> Result<Vec<T>> {
        Ok(self.borrow()?.clone())
    }

    pub(crate) fn borrow(&self) -> Result<Ref<'_, Vec<T>>> {
        self.data.try_borrow().map_err(|_| DistError::BufferInUse)
    }

    pub(crate) fn borrow_mut(&self) -> Result<RefMut<'_, Vec<T>>> {
        self.data.try_borrow_mut().map_err(|_| DistError::BufferInUse)
    }
}

/// Whether a matrix owns its storage or aliases another's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewState {
    #[default]
    Owning,
    View,
    /// Read-only alias.
    LockedView,
}

/// Elements spanned by an `height x width` block with leading dimension `ldim`.
#[inline]
pub(crate) fn span(height: usize, width: usize, ldim: usize) -> usize {
    if height == 0 || width == 0 {
        0
    } else {
        (width - 1) * ldim + height
    }
}

/// Dense column-major matrix over a [`LocalBuffer`].
///
/// Element `(i, j)` lives at `offset + i + j * ldim` in the buffer.
#[derive(Debug)]
pub struct Matrix<T> {
    height: usize,
    width: usize,
    ldim: usize,
    offset: usize,
    /// Offset of the owning or attached block this view was cut from.
    origin: usize,
    state: ViewState,
    buffer: LocalBuffer<T>,
}

impl<T: Scalar> Default for Matrix<T> {
    /// An owning `0 x 0` matrix.
    fn default() -> Self {
        Self {
            height: 0,
            width: 0,
            ldim: 1,
            offset: 0,
            origin: 0,
            state: ViewState::Owning,
            buffer: LocalBuffer::new(),
        }
    }
}

impl<T: Scalar> Matrix<T> {
    /// Zero-filled owning matrix.
    pub fn new(height: usize, width: usize) -> Result<Self> {
        Self::with_ldim(height, width, height.max(1))
    }

    /// Zero-filled owning matrix with an explicit leading dimension.
    pub fn with_ldim(height: usize, width: usize, ldim: usize) -> Result<Self> {
        if CHECKED {
            check_ldim(ldim, height)?;
        }
        Ok(Self {
            height,
            width,
            ldim,
            offset: 0,
            origin: 0,
            state: ViewState::Owning,
            buffer: LocalBuffer::zeroed(ldim * width)?,
        })
    }

    /// Owning matrix over column-major `data` of exactly `height * width`
    /// elements.
    pub fn from_col_major(height: usize, width: usize, data: Vec<T>) -> Result<Self> {
        let ldim = height.max(1);
        if data.len() != height * width {
            return Err(DistError::AttachOutOfBounds {
                offset: 0,
                height,
                width,
                ldim,
                len: data.len(),
            });
        }
        Ok(Self {
            height,
            width,
            ldim,
            offset: 0,
            origin: 0,
            state: ViewState::Owning,
            buffer: LocalBuffer::from_vec(data),
        })
    }

    pub fn from_fn(height: usize, width: usize, mut f: impl FnMut(usize, usize) -> T) -> Result<Self> {
        let mut data = Vec::new();
        data.try_reserve(height * width)?;
        for j in 0..width {
            for i in 0..height {
                data.push(f(i, j));
            }
        }
        Self::from_col_major(height, width, data)
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Distance between the starts of consecutive columns.
    #[inline]
    pub fn ldim(&self) -> usize {
        self.ldim
    }

    /// Position of element `(0, 0)` in the buffer.
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    #[inline]
    pub fn state(&self) -> ViewState {
        self.state
    }

    #[inline]
    pub fn is_viewing(&self) -> bool {
        self.state != ViewState::Owning
    }

    #[inline]
    pub fn is_locked(&self) -> bool {
        self.state == ViewState::LockedView
    }

    /// Handle to the underlying storage.
    pub fn buffer_handle(&self) -> &LocalBuffer<T> {
        &self.buffer
    }

    /// Elements allocated in the underlying storage.
    pub fn capacity(&self) -> Result<usize> {
        self.buffer.len()
    }

    // ------------------------------------------------------------------
    // Shape and storage
    // ------------------------------------------------------------------

    /// Change the dimensions.
    ///
    /// An owning matrix grows its buffer when needed (contents are not
    /// preserved in any particular layout). A view keeps its dimensions: the
    /// call succeeds only if they are unchanged, and always fails on a
    /// locked view.
    pub fn resize(&mut self, height: usize, width: usize) -> Result<()> {
        let ldim = if height > self.ldim {
            height.max(1)
        } else {
            self.ldim
        };
        self.resize_with_ldim(height, width, ldim)
    }

    pub fn resize_with_ldim(&mut self, height: usize, width: usize, ldim: usize) -> Result<()> {
        if CHECKED {
            if self.is_locked() {
                return Err(DistError::Locked);
            }
            check_ldim(ldim, height)?;
        }
        if self.is_viewing() {
            if (height, width) != (self.height, self.width) || ldim != self.ldim {
                return Err(DistError::ViewResize {
                    height: self.height,
                    width: self.width,
                    new_height: height,
                    new_width: width,
                });
            }
            return Ok(());
        }
        self.buffer.require(ldim * width)?;
        self.height = height;
        self.width = width;
        self.ldim = ldim;
        Ok(())
    }

    /// Detach from any buffer and become an owning `0 x 0` matrix. The
    /// previously referenced storage is left untouched.
    pub fn empty(&mut self) {
        *self = Self::default();
    }

    /// Alias `height x width` elements of `buffer` starting at `offset`.
    pub fn attach(
        &mut self,
        buffer: &LocalBuffer<T>,
        offset: usize,
        height: usize,
        width: usize,
        ldim: usize,
    ) -> Result<()> {
        self.attach_as(buffer, offset, height, width, ldim, ViewState::View)
    }

    /// Read-only variant of [`Matrix::attach`].
    pub fn locked_attach(
        &mut self,
        buffer: &LocalBuffer<T>,
        offset: usize,
        height: usize,
        width: usize,
        ldim: usize,
    ) -> Result<()> {
        self.attach_as(buffer, offset, height, width, ldim, ViewState::LockedView)
    }

    fn attach_as(
        &mut self,
        buffer: &LocalBuffer<T>,
        offset: usize,
        height: usize,
        width: usize,
        ldim: usize,
        state: ViewState,
    ) -> Result<()> {
        if CHECKED {
            check_ldim(ldim, height)?;
            let len = buffer.len()?;
            if offset + span(height, width, ldim) > len {
                return Err(DistError::AttachOutOfBounds {
                    offset,
                    height,
                    width,
                    ldim,
                    len,
                });
            }
        }
        *self = Self {
            height,
            width,
            ldim,
            offset,
            origin: offset,
            state,
            buffer: buffer.clone(),
        };
        Ok(())
    }

    // ------------------------------------------------------------------
    // Element access
    // ------------------------------------------------------------------

    #[inline]
    fn index(&self, i: usize, j: usize) -> usize {
        self.offset + i + j * self.ldim
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

    fn check_writable(&self) -> Result<()> {
        if self.is_locked() {
            return Err(DistError::Locked);
        }
        Ok(())
    }

    pub fn get(&self, i: usize, j: usize) -> Result<T> {
        if CHECKED {
            self.check_index(i, j)?;
        }
        let data = self.buffer.borrow()?;
        Ok(data[self.index(i, j)])
    }

    pub fn set(&mut self, i: usize, j: usize, value: T) -> Result<()> {
        if CHECKED {
            self.check_writable()?;
            self.check_index(i, j)?;
        }
        let idx = self.index(i, j);
        self.buffer.borrow_mut()?[idx] = value;
        Ok(())
    }

    /// Add `value` to element `(i, j)`.
    pub fn update(&mut self, i: usize, j: usize, value: T) -> Result<()> {
        if CHECKED {
            self.check_writable()?;
            self.check_index(i, j)?;
        }
        let idx = self.index(i, j);
        self.buffer.borrow_mut()?[idx] += value;
        Ok(())
    }

    fn extent(&self) -> std::ops::Range<usize> {
        match span(self.height, self.width, self.ldim) {
            0 => 0..0,
            n => self.offset..self.offset + n,
        }
    }

    fn extent_error(&self, len: usize) -> DistError {
        DistError::AttachOutOfBounds {
            offset: self.offset,
            height: self.height,
            width: self.width,
            ldim: self.ldim,
            len,
        }
    }

    /// Read-only slice starting at element `(0, 0)`; element `(i, j)` is at
    /// `i + j * ldim`.
    ///
    /// The guard keeps the buffer borrowed: writes through other handles fail
    /// with [`DistError::BufferInUse`] until it is dropped.
    pub fn locked_buffer(&self) -> Result<Ref<'_, [T]>> {
        let range = self.extent();
        let data = self.buffer.borrow()?;
        let len = data.len();
        Ref::filter_map(data, |d| d.get(range)).map_err(|_| self.extent_error(len))
    }

    /// Mutable counterpart of [`Matrix::locked_buffer`].
    pub fn buffer(&mut self) -> Result<RefMut<'_, [T]>> {
        if CHECKED {
            self.check_writable()?;
        }
        let range = self.extent();
        let data = self.buffer.borrow_mut()?;
        let len = data.len();
        RefMut::filter_map(data, |d| d.get_mut(range)).map_err(|_| self.extent_error(len))
    }

    pub fn fill(&mut self, value: T) -> Result<()> {
        if CHECKED {
            self.check_writable()?;
        }
        if self.height == 0 || self.width == 0 {
            return Ok(());
        }
        let mut data = self.buffer.borrow_mut()?;
        for j in 0..self.width {
            let start = self.index(0, j);
            data[start..start + self.height].fill(value);
        }
        Ok(())
    }

    /// Copy of the elements in column-major order without padding.
    pub fn to_col_major_vec(&self) -> Result<Vec<T>> {
        let data = self.buffer.borrow()?;
        let mut out = Vec::new();
        out.try_reserve(self.height * self.width)?;
        if self.height == 0 {
            return Ok(out);
        }
        for j in 0..self.width {
            let start = self.index(0, j);
            out.extend_from_slice(&data[start..start + self.height]);
        }
        Ok(out)
    }

    pub(crate) fn write_col_major(&mut self, values: &[T]) -> Result<()> {
        if CHECKED {
            self.check_writable()?;
        }
        let mut data = self.buffer.borrow_mut()?;
        if self.height > 0 {
            for (j, column) in values.chunks(self.height).take(self.width).enumerate() {
                let start = self.offset + j * self.ldim;
                data[start..start + column.len()].copy_from_slice(column);
            }
        }
        Ok(())
    }

    /// Overwrite with the contents of `other`.
    ///
    /// An owning matrix adopts `other`'s dimensions; a view must already match
    /// them. `other` may alias `self`.
    pub fn copy_from(&mut self, other: &Matrix<T>) -> Result<()> {
        let values = other.to_col_major_vec()?;
        if (self.height, self.width) != (other.height, other.width) {
            self.resize(other.height, other.width)?;
        }
        self.write_col_major(&values)
    }

    /// Deep copy into a fresh owning matrix.
    pub fn to_owned_matrix(&self) -> Result<Matrix<T>> {
        Self::from_col_major(self.height, self.width, self.to_col_major_vec()?)
    }

    // ------------------------------------------------------------------
    // View internals
    // ------------------------------------------------------------------

    pub(crate) fn check_region(&self, i: usize, j: usize, height: usize, width: usize) -> Result<()> {
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

    pub(crate) fn region_unchecked(
        &self,
        i: usize,
        j: usize,
        height: usize,
        width: usize,
        state: ViewState,
    ) -> Self {
        Self {
            height,
            width,
            ldim: self.ldim,
            offset: self.offset + i + j * self.ldim,
            origin: self.origin,
            state,
            buffer: self.buffer.clone(),
        }
    }

    fn check_same_storage(&self, other: &Self) -> Result<()> {
        if !self.buffer.ptr_eq(&other.buffer) {
            return Err(DistError::NonContiguous("blocks live in different buffers"));
        }
        if self.ldim != other.ldim {
            return Err(DistError::NonContiguous("leading dimensions differ"));
        }
        if self.origin != other.origin {
            return Err(DistError::NonContiguous("blocks belong to different attachments"));
        }
        Ok(())
    }

    pub(crate) fn check_1x2(left: &Self, right: &Self) -> Result<()> {
        left.check_same_storage(right)?;
        if left.height != right.height {
            return Err(DistError::NonContiguous("heights differ"));
        }
        if right.offset != left.offset + left.width * left.ldim {
            return Err(DistError::NonContiguous("blocks are not adjacent"));
        }
        Ok(())
    }

    pub(crate) fn check_2x1(top: &Self, bottom: &Self) -> Result<()> {
        top.check_same_storage(bottom)?;
        if top.width != bottom.width {
            return Err(DistError::NonContiguous("widths differ"));
        }
        if bottom.offset != top.offset + top.height {
            return Err(DistError::NonContiguous("blocks are not adjacent"));
        }
        // Row of `top` within its column; the merged block must not run past
        // the column end.
        let row = (top.offset - top.origin) % top.ldim;
        if row + top.height + bottom.height > top.ldim {
            return Err(DistError::NonContiguous("merged block wraps into the next column"));
        }
        Ok(())
    }

    pub(crate) fn merge_1x2_unchecked(left: &Self, right: &Self, state: ViewState) -> Self {
        Self {
            height: left.height,
            width: left.width + right.width,
            ldim: left.ldim,
            offset: left.offset,
            origin: left.origin,
            state,
            buffer: left.buffer.clone(),
        }
    }

    pub(crate) fn merge_2x1_unchecked(top: &Self, bottom: &Self, state: ViewState) -> Self {
        Self {
            height: top.height + bottom.height,
            width: top.width,
            ldim: top.ldim,
            offset: top.offset,
            origin: top.origin,
            state,
            buffer: top.buffer.clone(),
        }
    }
}

fn check_ldim(ldim: usize, height: usize) -> Result<()> {
    if ldim < height.max(1) {
        return Err(DistError::LeadingDimension { ldim, height });
    }
    Ok(())
}

impl<T: Scalar> Viewable for Matrix<T> {
    fn height(&self) -> usize {
        self.height
    }

    fn width(&self) -> usize {
        self.width
    }

    fn is_locked(&self) -> bool {
        self.state == ViewState::LockedView
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
    use approx::assert_relative_eq;
    use num_complex::Complex64;

    fn sample(height: usize, width: usize) -> Matrix<f64> {
        Matrix::from_fn(height, width, |i, j| (i * 10 + j) as f64).unwrap()
    }

    #[test]
    fn test_new_is_zeroed() {
        let m = Matrix::<f64>::new(3, 4).unwrap();
        assert_eq!((m.height(), m.width(), m.ldim()), (3, 4, 3));
        assert!(m.to_col_major_vec().unwrap().iter().all(|&x| x == 0.0));
        assert_eq!(m.state(), ViewState::Owning);
    }

    #[test]
    fn test_get_set_update() {
        let mut m = sample(3, 3);
        assert_relative_eq!(m.get(2, 1).unwrap(), 21.0);
        m.set(2, 1, 5.0).unwrap();
        m.update(2, 1, 1.5).unwrap();
        assert_relative_eq!(m.get(2, 1).unwrap(), 6.5);
        assert!(matches!(
            m.get(3, 0),
            Err(DistError::OutOfBounds { i: 3, j: 0, .. })
        ));
    }

    #[test]
    fn test_with_ldim_padding() {
        let mut m = Matrix::<f64>::with_ldim(2, 3, 5).unwrap();
        m.set(1, 2, 4.0).unwrap();
        assert_eq!(m.capacity().unwrap(), 15);
        assert_relative_eq!(m.locked_buffer().unwrap()[1 + 2 * 5], 4.0);
        assert!(matches!(
            Matrix::<f64>::with_ldim(4, 1, 3),
            Err(DistError::LeadingDimension { ldim: 3, height: 4 })
        ));
    }

    #[test]
    fn test_view_aliases_parent() {
        let a = sample(4, 4);
        let mut v = a.view_region(1, 1, 2, 3).unwrap();
        assert_relative_eq!(v.get(0, 0).unwrap(), 11.0);
        v.set(1, 2, -1.0).unwrap();
        assert_relative_eq!(a.get(2, 3).unwrap(), -1.0);
        assert!(v.is_viewing());
    }

    #[test]
    fn test_locked_view_rejects_writes() {
        let a = sample(3, 3);
        let mut v = a.locked_view_region(0, 0, 3, 3).unwrap();
        assert!(matches!(v.set(0, 0, 1.0), Err(DistError::Locked)));
        assert!(matches!(v.update(0, 0, 1.0), Err(DistError::Locked)));
        assert!(matches!(v.fill(1.0), Err(DistError::Locked)));
        assert!(matches!(v.view_region(0, 0, 1, 1), Err(DistError::Locked)));
        assert!(v.locked_view_region(1, 1, 2, 2).is_ok());
    }

    #[test]
    fn test_region_bounds() {
        let a = sample(3, 3);
        assert!(matches!(
            a.view_region(2, 0, 2, 1),
            Err(DistError::SubmatrixOutOfBounds { .. })
        ));
        assert!(a.view_region(3, 3, 0, 0).is_ok());
    }

    #[test]
    fn test_view_resize_rules() {
        let a = sample(4, 4);
        let mut v = a.view_region(0, 0, 2, 2).unwrap();
        assert!(v.resize(2, 2).is_ok());
        assert!(matches!(v.resize(3, 2), Err(DistError::ViewResize { .. })));
        let mut lv = a.locked_view_region(0, 0, 2, 2).unwrap();
        assert!(matches!(lv.resize(2, 2), Err(DistError::Locked)));
    }

    #[test]
    fn test_owning_resize_grows_capacity() {
        let mut m = Matrix::<f64>::new(2, 2).unwrap();
        m.resize(5, 3).unwrap();
        assert_eq!((m.height(), m.ldim()), (5, 5));
        assert!(m.capacity().unwrap() >= 15);
        m.resize(1, 1).unwrap();
        assert_eq!(m.ldim(), 5);
    }

    #[test]
    fn test_empty_detaches_without_touching_parent() {
        let a = sample(2, 2);
        let mut v = a.view_region(0, 0, 2, 2).unwrap();
        v.empty();
        assert_eq!((v.height(), v.width()), (0, 0));
        assert_eq!(v.state(), ViewState::Owning);
        assert_relative_eq!(a.get(1, 1).unwrap(), 11.0);
    }

    #[test]
    fn test_attach_bounds() {
        let buffer = LocalBuffer::<f64>::zeroed(10).unwrap();
        let mut m = Matrix::default();
        m.attach(&buffer, 2, 2, 4, 2).unwrap();
        m.set(1, 3, 7.0).unwrap();
        assert_relative_eq!(buffer.to_vec().unwrap()[9], 7.0);
        assert!(matches!(
            m.attach(&buffer, 3, 2, 4, 2),
            Err(DistError::AttachOutOfBounds { len: 10, .. })
        ));
        let mut locked = Matrix::default();
        locked.locked_attach(&buffer, 0, 10, 1, 10).unwrap();
        assert!(locked.is_locked());
    }

    #[test]
    fn test_contiguity_checks() {
        let a = sample(4, 6);
        let left = a.view_region(0, 0, 4, 2).unwrap();
        let right = a.view_region(0, 2, 4, 4).unwrap();
        let gap = a.view_region(0, 3, 4, 3).unwrap();
        assert!(Matrix::view_1x2(&left, &right).is_ok());
        assert!(matches!(
            Matrix::view_1x2(&left, &gap),
            Err(DistError::NonContiguous(_))
        ));
        let other = sample(4, 6);
        let foreign = other.view_region(0, 2, 4, 4).unwrap();
        assert!(matches!(
            Matrix::view_1x2(&left, &foreign),
            Err(DistError::NonContiguous(_))
        ));
    }

    #[test]
    fn test_2x1_cannot_wrap_columns() {
        let a = sample(3, 3);
        let top = a.view_region(0, 0, 3, 1).unwrap();
        let next_column = a.view_region(0, 1, 3, 1).unwrap();
        assert!(Matrix::view_2x1(&top, &next_column).is_err());
    }

    #[test]
    fn test_2x1_rejects_column_tail_and_next_head() {
        let a = sample(4, 3);
        let tail = a.view_region(2, 0, 2, 1).unwrap();
        let head = a.view_region(0, 1, 2, 1).unwrap();
        assert!(matches!(
            Matrix::view_2x1(&tail, &head),
            Err(DistError::NonContiguous(_))
        ));
        let middle = a.view_region(1, 0, 2, 1).unwrap();
        let last = a.view_region(3, 0, 1, 1).unwrap();
        let merged = Matrix::view_2x1(&middle, &last).unwrap();
        assert_eq!((merged.height(), merged.offset()), (3, 1));
        assert_relative_eq!(merged.get(2, 0).unwrap(), 30.0);
    }

    #[test]
    fn test_2x1_on_attachment_off_column_start() {
        let buffer = LocalBuffer::from_vec((0..12).map(f64::from).collect());
        let mut m = Matrix::default();
        m.attach(&buffer, 3, 2, 2, 4).unwrap();
        let top = m.view_region(0, 0, 1, 2).unwrap();
        let bottom = m.view_region(1, 0, 1, 2).unwrap();
        let merged = Matrix::view_2x1(&top, &bottom).unwrap();
        assert_relative_eq!(merged.get(1, 1).unwrap(), 8.0);
        let mut other = Matrix::default();
        other.attach(&buffer, 4, 1, 2, 4).unwrap();
        assert!(matches!(
            Matrix::view_2x1(&top, &other),
            Err(DistError::NonContiguous(_))
        ));
    }

    #[test]
    fn test_copy_from_aliasing_source() {
        let a = sample(4, 4);
        let mut dst = a.view_region(0, 0, 2, 2).unwrap();
        let src = a.locked_view_region(1, 1, 2, 2).unwrap();
        dst.copy_from(&src).unwrap();
        assert_relative_eq!(a.get(0, 0).unwrap(), 11.0);
        assert_relative_eq!(a.get(1, 1).unwrap(), 22.0);
    }

    #[test]
    fn test_buffer_guard_blocks_writes() {
        let mut a = sample(2, 2);
        let v = a.view_region(0, 0, 2, 2).unwrap();
        let guard = v.locked_buffer().unwrap();
        assert!(matches!(a.set(0, 0, 1.0), Err(DistError::BufferInUse)));
        drop(guard);
        assert!(a.set(0, 0, 1.0).is_ok());
    }

    #[test]
    fn test_complex_elements() {
        let mut m = Matrix::<Complex64>::new(2, 2).unwrap();
        m.fill(Complex64::new(1.0, -1.0)).unwrap();
        m.update(1, 1, Complex64::new(0.5, 0.5)).unwrap();
        let z = m.get(1, 1).unwrap();
        assert_relative_eq!(z.re, 1.5);
        assert_relative_eq!(z.im, -0.5);
    }
}
