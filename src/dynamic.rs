//! Runtime-typed scalars and distributed matrices.
//!
//! Drivers that pick the element type from input data (a file header, a
//! command-line flag) hold an [`AnyDistMatrix`] and dispatch once per
//! operation instead of monomorphizing the whole program.

use std::sync::Arc;

use num_complex::{Complex32, Complex64};

use crate::{DistError, DistMatrix, Distribution, Grid, Result, Scalar, ScalarKind};

/// A scalar whose type is known only at runtime.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AnyScalar {
    F32(f32),
    F64(f64),
    C32(Complex32),
    C64(Complex64),
}

impl AnyScalar {
    pub fn kind(&self) -> ScalarKind {
        match self {
            AnyScalar::F32(_) => ScalarKind::F32,
            AnyScalar::F64(_) => ScalarKind::F64,
            AnyScalar::C32(_) => ScalarKind::C32,
            AnyScalar::C64(_) => ScalarKind::C64,
        }
    }

    /// Extract the value as `T`, which must be exactly its kind.
    pub fn get<T: Scalar>(self) -> Result<T> {
        T::from_any(self).ok_or(DistError::TypeMismatch {
            expected: T::KIND,
            found: self.kind(),
        })
    }

    /// Convert to `T` if that loses nothing (`f32 -> f64`, real -> complex,
    /// `c32 -> c64`).
    pub fn cast<T: Scalar>(self) -> Result<T> {
        let widened = self.widen(T::KIND).ok_or(DistError::TypeMismatch {
            expected: T::KIND,
            found: self.kind(),
        })?;
        widened.get()
    }

    fn widen(self, target: ScalarKind) -> Option<AnyScalar> {
        use AnyScalar::*;
        let v = match (self, target) {
            (v, t) if v.kind() == t => v,
            (F32(x), ScalarKind::F64) => F64(f64::from(x)),
            (F32(x), ScalarKind::C32) => C32(Complex32::new(x, 0.0)),
            (F32(x), ScalarKind::C64) => C64(Complex64::new(f64::from(x), 0.0)),
            (F64(x), ScalarKind::C64) => C64(Complex64::new(x, 0.0)),
            (C32(z), ScalarKind::C64) => C64(Complex64::new(f64::from(z.re), f64::from(z.im))),
            _ => return None,
        };
        Some(v)
    }
}

impl From<f32> for AnyScalar {
    fn from(v: f32) -> Self {
        AnyScalar::F32(v)
    }
}

impl From<f64> for AnyScalar {
    fn from(v: f64) -> Self {
        AnyScalar::F64(v)
    }
}

impl From<Complex32> for AnyScalar {
    fn from(v: Complex32) -> Self {
        AnyScalar::C32(v)
    }
}

impl From<Complex64> for AnyScalar {
    fn from(v: Complex64) -> Self {
        AnyScalar::C64(v)
    }
}

/// A distributed matrix whose element type is chosen at runtime.
#[derive(Debug)]
pub enum AnyDistMatrix {
    F32(DistMatrix<f32>),
    F64(DistMatrix<f64>),
    C32(DistMatrix<Complex32>),
    C64(DistMatrix<Complex64>),
}

/// Run `$body` with `$m` bound to the typed matrix inside `$self`.
macro_rules! dispatch {
    ($self:expr, $m:ident => $body:expr) => {
        match $self {
            AnyDistMatrix::F32($m) => $body,
            AnyDistMatrix::F64($m) => $body,
            AnyDistMatrix::C32($m) => $body,
            AnyDistMatrix::C64($m) => $body,
        }
    };
}

impl AnyDistMatrix {
    /// Empty matrix of element type `kind`.
    pub fn new(kind: ScalarKind, grid: &Arc<Grid>, distribution: Distribution) -> Result<Self> {
        Ok(match kind {
            ScalarKind::F32 => AnyDistMatrix::F32(DistMatrix::new(grid, distribution)?),
            ScalarKind::F64 => AnyDistMatrix::F64(DistMatrix::new(grid, distribution)?),
            ScalarKind::C32 => AnyDistMatrix::C32(DistMatrix::new(grid, distribution)?),
            ScalarKind::C64 => AnyDistMatrix::C64(DistMatrix::new(grid, distribution)?),
        })
    }

    pub fn kind(&self) -> ScalarKind {
        match self {
            AnyDistMatrix::F32(_) => ScalarKind::F32,
            AnyDistMatrix::F64(_) => ScalarKind::F64,
            AnyDistMatrix::C32(_) => ScalarKind::C32,
            AnyDistMatrix::C64(_) => ScalarKind::C64,
        }
    }

    pub fn height(&self) -> usize {
        dispatch!(self, m => m.height())
    }

    pub fn width(&self) -> usize {
        dispatch!(self, m => m.width())
    }

    pub fn local_height(&self) -> usize {
        dispatch!(self, m => m.local_height())
    }

    pub fn local_width(&self) -> usize {
        dispatch!(self, m => m.local_width())
    }

    pub fn distribution(&self) -> Distribution {
        dispatch!(self, m => m.distribution())
    }

    pub fn resize(&mut self, height: usize, width: usize) -> Result<()> {
        dispatch!(self, m => m.resize(height, width))
    }

    /// Set global entry `(i, j)`, widening `value` to the matrix's kind.
    /// Only the owning process may call this.
    pub fn set(&mut self, i: usize, j: usize, value: AnyScalar) -> Result<()> {
        dispatch!(self, m => m.set(i, j, value.cast()?))
    }

    /// Read a locally owned global entry.
    pub fn get(&self, i: usize, j: usize) -> Result<AnyScalar> {
        dispatch!(self, m => m.get(i, j).map(Scalar::into_any))
    }

    /// Read any global entry. Collective over the grid.
    pub fn get_global(&self, i: usize, j: usize) -> Result<AnyScalar> {
        dispatch!(self, m => m.get_global(i, j).map(Scalar::into_any))
    }

    /// Local copy from a matrix of the same kind and distribution.
    pub fn copy_from(&mut self, other: &AnyDistMatrix) -> Result<()> {
        match (self, other) {
            (AnyDistMatrix::F32(a), AnyDistMatrix::F32(b)) => a.copy_from(b),
            (AnyDistMatrix::F64(a), AnyDistMatrix::F64(b)) => a.copy_from(b),
            (AnyDistMatrix::C32(a), AnyDistMatrix::C32(b)) => a.copy_from(b),
            (AnyDistMatrix::C64(a), AnyDistMatrix::C64(b)) => a.copy_from(b),
            (a, b) => Err(DistError::TypeMismatch {
                expected: a.kind(),
                found: b.kind(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_exact_get() {
        let v = AnyScalar::from(1.5f32);
        assert_eq!(v.kind(), ScalarKind::F32);
        assert_relative_eq!(v.get::<f32>().unwrap(), 1.5);
        assert!(matches!(
            v.get::<f64>(),
            Err(DistError::TypeMismatch {
                expected: ScalarKind::F64,
                found: ScalarKind::F32
            })
        ));
    }

    #[test]
    fn test_widening_cast() {
        let v = AnyScalar::F32(2.0);
        assert_relative_eq!(v.cast::<f64>().unwrap(), 2.0);
        assert_eq!(v.cast::<Complex64>().unwrap(), Complex64::new(2.0, 0.0));
        let z = AnyScalar::C32(Complex32::new(1.0, -3.0));
        assert_eq!(z.cast::<Complex64>().unwrap(), Complex64::new(1.0, -3.0));
    }

    #[test]
    fn test_narrowing_cast_rejected() {
        assert!(AnyScalar::F64(1.0).cast::<f32>().is_err());
        assert!(AnyScalar::C64(Complex64::new(1.0, 0.0)).cast::<f64>().is_err());
        assert!(AnyScalar::F64(1.0).cast::<Complex32>().is_err());
    }

    #[test]
    fn test_dist_matrix_dispatch() {
        let grid = Grid::trivial().unwrap();
        let mut a = AnyDistMatrix::new(ScalarKind::C64, &grid, Distribution::MC_MR).unwrap();
        a.resize(3, 2).unwrap();
        assert_eq!((a.height(), a.width()), (3, 2));
        assert_eq!((a.local_height(), a.local_width()), (3, 2));
        assert_eq!(a.distribution(), Distribution::MC_MR);

        a.set(2, 1, AnyScalar::F64(4.0)).unwrap();
        assert_eq!(a.get(2, 1).unwrap(), AnyScalar::C64(Complex64::new(4.0, 0.0)));
        assert_eq!(a.get_global(0, 0).unwrap(), AnyScalar::C64(Complex64::new(0.0, 0.0)));
    }

    #[test]
    fn test_copy_requires_same_kind() {
        let grid = Grid::trivial().unwrap();
        let mut a = AnyDistMatrix::new(ScalarKind::F64, &grid, Distribution::MC_MR).unwrap();
        let mut b = AnyDistMatrix::new(ScalarKind::F64, &grid, Distribution::MC_MR).unwrap();
        b.resize(2, 2).unwrap();
        b.set(1, 1, AnyScalar::F64(7.0)).unwrap();
        a.copy_from(&b).unwrap();
        assert_eq!(a.get(1, 1).unwrap(), AnyScalar::F64(7.0));

        let c = AnyDistMatrix::new(ScalarKind::F32, &grid, Distribution::MC_MR).unwrap();
        assert!(matches!(a.copy_from(&c), Err(DistError::TypeMismatch { .. })));
    }
}
