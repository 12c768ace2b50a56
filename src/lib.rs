//! Data-distribution engine for distributed dense matrices.
//!
//! A logical `M x N` matrix is spread over a two-dimensional grid of
//! `P = R x C` processes. Every process runs the same program (SPMD) and holds
//! one local shard of every matrix; this crate tracks which global entries each
//! shard owns and provides the zero-copy view machinery that blocked
//! algorithms are written in.
//!
//! # Core Types
//!
//! - [`Grid`]: the `R x C` process mesh and its row/column sub-communicators
//! - [`Dist`] / [`Distribution`] / [`Descriptor`]: per-axis distribution
//!   schemes, alignments and shifts
//! - [`Matrix`] / [`LocalBuffer`]: column-major local storage, owning or viewing
//! - [`DistMatrix`]: global dimensions + descriptor + local shard
//! - [`Viewable`]: the view protocol shared by local and distributed matrices
//!
//! # Blocked algorithms
//!
//! Kernels are written as a partition, followed by a loop of
//! repartition / compute / slide steps:
//!
//! ```rust
//! use dist_matrix::{partition_down, repartition_down, slide_partition_down, Matrix};
//!
//! let a = Matrix::<f64>::from_fn(10, 3, |i, j| (i + 10 * j) as f64).unwrap();
//! let (mut at, mut ab) = partition_down(&a, 0).unwrap();
//! let mut panels = 0;
//! while ab.height() > 0 {
//!     let (a0, a1, a2) = repartition_down(&at, &ab, 4).unwrap();
//!     panels += 1;
//!     assert!(a1.height() <= 4);
//!     (at, ab) = slide_partition_down(&a0, &a1, &a2).unwrap();
//! }
//! assert_eq!(panels, 3);
//! assert_eq!(at.height(), 10);
//! ```
//!
//! # Checked builds
//!
//! Bounds, contiguity, lock and distribution checks run unless the crate is
//! built with the `unchecked` feature ([`CHECKED`]). A program validated in a
//! checked build is assumed correct when run unchecked.

mod comm;
mod config;
mod dist;
mod dist_matrix;
pub mod dynamic;
mod grid;
mod matrix;
mod partition;
mod repartition;
mod scalar;
mod view;

// ============================================================================
// Communication
// ============================================================================
pub use comm::{
    all_gather, all_reduce_sum, all_to_all, broadcast, verify_lockstep, Communicator, SelfComm,
    ThreadComm,
};

// ============================================================================
// Configuration
// ============================================================================
pub use config::{
    blocksize, pop_blocksize, push_blocksize, scoped_blocksize, set_blocksize, BlocksizeGuard,
    BLOCKSIZE_ENV,
};

// ============================================================================
// Grid and distributions
// ============================================================================
pub use dist::{local_length, max_local_length, owner, shift, Descriptor, Dist, Distribution};
pub use grid::{Grid, GridOrder};

// ============================================================================
// Matrices
// ============================================================================
pub use dist_matrix::DistMatrix;
pub use dynamic::{AnyDistMatrix, AnyScalar};
pub use matrix::{LocalBuffer, Matrix, ViewState};
pub use scalar::{Scalar, ScalarKind};

// ============================================================================
// View / partition protocol
// ============================================================================
pub use partition::{
    locked_partition_down, locked_partition_down_diagonal, locked_partition_down_offset_diagonal,
    locked_partition_left, locked_partition_right, locked_partition_up,
    locked_partition_up_diagonal, partition_down, partition_down_diagonal,
    partition_down_offset_diagonal, partition_left, partition_right, partition_up,
    partition_up_diagonal, Split2x2,
};
pub use repartition::{
    locked_repartition_down, locked_repartition_down_diagonal, locked_repartition_left,
    locked_repartition_right, locked_repartition_up, locked_repartition_up_diagonal,
    repartition_down, repartition_down_diagonal, repartition_left, repartition_right,
    repartition_up, repartition_up_diagonal, slide_locked_partition_down,
    slide_locked_partition_down_diagonal, slide_locked_partition_left,
    slide_locked_partition_right, slide_locked_partition_up, slide_locked_partition_up_diagonal,
    slide_partition_down, slide_partition_down_diagonal, slide_partition_left,
    slide_partition_right, slide_partition_up, slide_partition_up_diagonal, Split3x3,
};
pub use view::{
    locked_view, locked_view_1x2, locked_view_2x1, locked_view_2x2, locked_view_region, view,
    view_1x2, view_2x1, view_2x2, view_region, Viewable,
};

// ============================================================================
// Constants
// ============================================================================

/// Whether structural checks are compiled in.
///
/// `true` unless the `unchecked` feature is enabled. Checks never guard memory
/// safety; an unchecked out-of-range access still panics on slice indexing.
pub const CHECKED: bool = !cfg!(feature = "unchecked");

/// Algorithmic blocksize used when neither the environment nor the caller
/// configured one.
pub const DEFAULT_BLOCKSIZE: usize = 128;

// ============================================================================
// Error types
// ============================================================================

/// Errors raised by the distribution engine.
///
/// All of them are structural: they flag programmer errors (mismatched
/// operands, out-of-range regions, non-contiguous views) rather than numerical
/// trouble.
#[derive(Debug, thiserror::Error)]
pub enum DistError {
    /// Requested grid shape does not cover the communicator.
    #[error("grid {height}x{width} does not match communicator of size {size}")]
    GridShape {
        height: usize,
        width: usize,
        size: usize,
    },

    /// Communicator has no processes or a zero grid height was requested.
    #[error("invalid grid height {height} for communicator of size {size}")]
    GridHeight { height: usize, size: usize },

    /// Element index outside the matrix.
    #[error("index ({i}, {j}) out of bounds for {height}x{width} matrix")]
    OutOfBounds {
        i: usize,
        j: usize,
        height: usize,
        width: usize,
    },

    /// Submatrix region outside the parent.
    #[error(
        "submatrix at ({i}, {j}) of size {height}x{width} exceeds {parent_height}x{parent_width} parent"
    )]
    SubmatrixOutOfBounds {
        i: usize,
        j: usize,
        height: usize,
        width: usize,
        parent_height: usize,
        parent_width: usize,
    },

    /// Attach region outside the source buffer.
    #[error("attach of {height}x{width} (ldim {ldim}) at offset {offset} exceeds buffer of {len}")]
    AttachOutOfBounds {
        offset: usize,
        height: usize,
        width: usize,
        ldim: usize,
        len: usize,
    },

    /// Leading dimension smaller than the column height.
    #[error("leading dimension {ldim} is smaller than height {height}")]
    LeadingDimension { ldim: usize, height: usize },

    /// Sibling views are not adjacent pieces of one allocation.
    #[error("non-contiguous view: {0}")]
    NonContiguous(&'static str),

    /// Write access requested through a locked (read-only) view.
    #[error("write to locked view")]
    Locked,

    /// The local buffer is currently borrowed by a caller-held guard.
    #[error("local buffer is already borrowed")]
    BufferInUse,

    /// Both axes of a distribution use the same grid resource.
    #[error("invalid distribution [{col},{row}]")]
    InvalidDistribution { col: Dist, row: Dist },

    /// Operands carry different distributions.
    #[error("distribution mismatch: expected {expected}, found {found}")]
    DistributionMismatch {
        expected: Distribution,
        found: Distribution,
    },

    /// Operands were built on different process grids.
    #[error("operands live on different process grids")]
    GridMismatch,

    /// Constrained alignment differs from the operand's alignment.
    #[error("{axis} alignment mismatch: constrained to {expected}, operand has {found}")]
    AlignmentMismatch {
        axis: &'static str,
        expected: usize,
        found: usize,
    },

    /// No axis of the source distribution can supply an alignment.
    #[error("cannot align {target} with {other}")]
    IncompatibleAlignment {
        target: Distribution,
        other: Distribution,
    },

    /// Alignment outside `[0, stride)`.
    #[error("alignment {align} outside [0, {stride})")]
    InvalidAlignment { align: usize, stride: usize },

    /// Alignment change that would relocate existing data.
    #[error("cannot realign: {0}")]
    IllegalRealign(&'static str),

    /// A view cannot change its dimensions.
    #[error("cannot resize a view from {height}x{width} to {new_height}x{new_width}")]
    ViewResize {
        height: usize,
        width: usize,
        new_height: usize,
        new_width: usize,
    },

    /// Global entry is not owned by this process.
    #[error("entry ({i}, {j}) is not owned by this process")]
    NotLocal { i: usize, j: usize },

    /// Runtime element type does not match.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: ScalarKind,
        found: ScalarKind,
    },

    /// Blocksize must be positive.
    #[error("blocksize must be positive")]
    InvalidBlocksize,

    /// Local buffer growth failed.
    #[error("allocation failed: {0}")]
    Allocation(#[from] std::collections::TryReserveError),

    /// Failure inside the communication layer.
    #[error("communication error: {0}")]
    Communication(String),

    /// Processes diverged from lock-step execution.
    #[error("processes out of lock-step at '{0}'")]
    Desync(String),
}

/// Result type for distribution-engine operations.
pub type Result<T> = std::result::Result<T, DistError>;
