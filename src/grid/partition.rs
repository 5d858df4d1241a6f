//! Splitting the stack of box rows across ranks.
//!
//! Rows (planes of boxes along the last axis) are assigned contiguously:
//! rank r owns `[lo, hi)`. The default split is the even layout
//! `total/size + 1` for the first `total % size` ranks. An explicit per-rank
//! row count (after a load-balance step) is turned into offsets with a ring
//! exclusive scan: the master starts at zero and each rank forwards
//! `lo + rows` to the rank above.

use crate::comm::{send_recv, Communicator};
use crate::env::Environment;
use crate::error::BoxSieveError;

/// One rank's contiguous slice `[lo, hi)` of the row stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowPartition {
    lo: usize,
    hi: usize,
    total: usize,
}

impl RowPartition {
    #[inline]
    pub fn lo(&self) -> usize {
        self.lo
    }

    #[inline]
    pub fn hi(&self) -> usize {
        self.hi
    }

    /// Number of locally owned rows.
    #[inline]
    pub fn local_rows(&self) -> usize {
        self.hi - self.lo
    }

    /// Total number of rows across all ranks.
    #[inline]
    pub fn total_rows(&self) -> usize {
        self.total
    }
}

/// The even split used when no explicit row counts are requested.
pub(crate) fn even_partition(total_rows: usize, rank: usize, size: usize) -> RowPartition {
    let chunk = total_rows / size;
    let rem = total_rows % size;
    let lo = rank * chunk + rank.min(rem);
    let rows = chunk + usize::from(rank < rem);
    RowPartition {
        lo,
        hi: lo + rows,
        total: total_rows,
    }
}

/// Split `total_rows` across the communicator's ranks.
///
/// With `requested_local_rows`, every rank must pass its own count and the
/// counts must sum to `total_rows`; the mismatch is detected on the top-most
/// rank. Requires `total_rows >= size` (the grid constructor guarantees it).
pub fn partition_rows<C: Communicator>(
    total_rows: usize,
    requested_local_rows: Option<usize>,
    env: &Environment<C>,
) -> Result<RowPartition, BoxSieveError> {
    let (rank, size) = (env.rank(), env.size());
    debug_assert!(total_rows >= size);

    let Some(rows) = requested_local_rows else {
        return Ok(even_partition(total_rows, rank, size));
    };

    let above = (rank + 1 < size).then(|| rank + 1);
    let below = rank.checked_sub(1);

    // Exclusive scan up the rank stack: receive our offset, forward the next.
    let lo = match send_recv(env.comm(), env.tags().partition, None, &[], below, 8)? {
        Some(bytes) => u64::from_le_bytes(bytes.try_into().expect("8-byte row offset")) as usize,
        None => 0,
    };
    let hi = lo + rows;
    send_recv(
        env.comm(),
        env.tags().partition,
        above,
        &(hi as u64).to_le_bytes(),
        None,
        0,
    )?;

    if env.is_top_most() && hi != total_rows {
        return Err(BoxSieveError::PartitionMismatch {
            expected: total_rows,
            got: hi,
        });
    }
    Ok(RowPartition {
        lo,
        hi,
        total: total_rows,
    })
}
