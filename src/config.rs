//! Algorithmic blocksize configuration.
//!
//! Blocked kernels advance their partitions by `blocksize()` rows or columns
//! per step. The value is a per-process stack so a kernel can temporarily
//! override it for a nested call and restore it afterwards.

use std::cell::RefCell;

use crate::{DistError, Result, DEFAULT_BLOCKSIZE};

/// Environment variable overriding [`DEFAULT_BLOCKSIZE`] on first use.
pub const BLOCKSIZE_ENV: &str = "DIST_MATRIX_BLOCKSIZE";

thread_local! {
    static BLOCKSIZE_STACK: RefCell<Vec<usize>> = RefCell::new(vec![initial_blocksize()]);
}

fn initial_blocksize() -> usize {
    std::env::var(BLOCKSIZE_ENV)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|&b| b > 0)
        .unwrap_or(DEFAULT_BLOCKSIZE)
}

/// Current algorithmic blocksize.
pub fn blocksize() -> usize {
    BLOCKSIZE_STACK.with(|stack| stack.borrow().last().copied().unwrap_or(DEFAULT_BLOCKSIZE))
}

/// Replace the blocksize at the top of the stack.
pub fn set_blocksize(bsize: usize) -> Result<()> {
    if bsize == 0 {
        return Err(DistError::InvalidBlocksize);
    }
    BLOCKSIZE_STACK.with(|stack| {
        let mut stack = stack.borrow_mut();
        match stack.last_mut() {
            Some(top) => *top = bsize,
            None => stack.push(bsize),
        }
    });
    Ok(())
}

/// Push a new blocksize, shadowing the current one until [`pop_blocksize`].
pub fn push_blocksize(bsize: usize) -> Result<()> {
    if bsize == 0 {
        return Err(DistError::InvalidBlocksize);
    }
    BLOCKSIZE_STACK.with(|stack| stack.borrow_mut().push(bsize));
    Ok(())
}

/// Pop the most recently pushed blocksize.
///
/// The base entry is never removed; popping it returns `None`.
pub fn pop_blocksize() -> Option<usize> {
    BLOCKSIZE_STACK.with(|stack| {
        let mut stack = stack.borrow_mut();
        if stack.len() > 1 {
            stack.pop()
        } else {
            None
        }
    })
}

/// Restores the previous blocksize when dropped.
#[derive(Debug)]
#[must_use = "the blocksize is restored as soon as the guard is dropped"]
pub struct BlocksizeGuard {
    _private: (),
}

impl Drop for BlocksizeGuard {
    fn drop(&mut self) {
        pop_blocksize();
    }
}

/// Push `bsize` for the lifetime of the returned guard.
pub fn scoped_blocksize(bsize: usize) -> Result<BlocksizeGuard> {
    push_blocksize(bsize)?;
    Ok(BlocksizeGuard { _private: () })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_pop() {
        let base = blocksize();
        push_blocksize(7).unwrap();
        assert_eq!(blocksize(), 7);
        push_blocksize(3).unwrap();
        assert_eq!(blocksize(), 3);
        assert_eq!(pop_blocksize(), Some(3));
        assert_eq!(pop_blocksize(), Some(7));
        assert_eq!(blocksize(), base);
        assert_eq!(pop_blocksize(), None);
        assert_eq!(blocksize(), base);
    }

    #[test]
    fn test_scoped_guard() {
        let base = blocksize();
        {
            let _guard = scoped_blocksize(16).unwrap();
            assert_eq!(blocksize(), 16);
        }
        assert_eq!(blocksize(), base);
    }

    #[test]
    fn test_zero_rejected() {
        assert!(matches!(set_blocksize(0), Err(DistError::InvalidBlocksize)));
        assert!(matches!(push_blocksize(0), Err(DistError::InvalidBlocksize)));
    }

    #[test]
    fn test_set_replaces_top() {
        push_blocksize(10).unwrap();
        set_blocksize(12).unwrap();
        assert_eq!(blocksize(), 12);
        assert_eq!(pop_blocksize(), Some(12));
    }
}
