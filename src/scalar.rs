//! Element types storable in local and distributed matrices.

use std::fmt;
use std::ops::{Add, AddAssign, Mul};

use bytemuck::Pod;
use num_complex::{Complex32, Complex64};
use num_traits::{One, Zero};

use crate::dynamic::AnyScalar;

/// Runtime tag for the supported element types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    F32,
    F64,
    C32,
    C64,
}

impl ScalarKind {
    /// Size of one element in bytes.
    pub fn size_of(self) -> usize {
        match self {
            ScalarKind::F32 => 4,
            ScalarKind::F64 | ScalarKind::C32 => 8,
            ScalarKind::C64 => 16,
        }
    }

    pub fn is_complex(self) -> bool {
        matches!(self, ScalarKind::C32 | ScalarKind::C64)
    }

    pub fn name(self) -> &'static str {
        match self {
            ScalarKind::F32 => "f32",
            ScalarKind::F64 => "f64",
            ScalarKind::C32 => "c32",
            ScalarKind::C64 => "c64",
        }
    }

    /// Whether a value of `self` converts to `target` without losing
    /// precision or information.
    pub fn widens_to(self, target: ScalarKind) -> bool {
        use ScalarKind::*;
        matches!(
            (self, target),
            (F32, F32 | F64 | C32 | C64) | (F64, F64 | C64) | (C32, C32 | C64) | (C64, C64)
        )
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Element type of a matrix.
///
/// `Pod` lets local data travel through the byte-level communicator without
/// reinterpretation hazards.
pub trait Scalar:
    Pod
    + fmt::Debug
    + PartialEq
    + Send
    + Sync
    + Zero
    + One
    + Add<Output = Self>
    + AddAssign
    + Mul<Output = Self>
    + 'static
{
    const KIND: ScalarKind;

    fn into_any(self) -> AnyScalar;

    /// Exact-kind extraction; `None` if `value` holds another kind.
    fn from_any(value: AnyScalar) -> Option<Self>;
}

macro_rules! impl_scalar {
    ($ty:ty, $kind:ident) => {
        impl Scalar for $ty {
            const KIND: ScalarKind = ScalarKind::$kind;

            #[inline]
            fn into_any(self) -> AnyScalar {
                AnyScalar::$kind(self)
            }

            #[inline]
            fn from_any(value: AnyScalar) -> Option<Self> {
                match value {
                    AnyScalar::$kind(v) => Some(v),
                    _ => None,
                }
            }
        }
    };
}

impl_scalar!(f32, F32);
impl_scalar!(f64, F64);
impl_scalar!(Complex32, C32);
impl_scalar!(Complex64, C64);
