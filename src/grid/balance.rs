//! One-row-at-a-time load balancing between vertically adjacent ranks.
//!
//! Each call, every rank ships its per-row point histogram to the rank above
//! and receives its lower neighbor's. The upper rank of each boundary then
//! decides whether moving the boundary one row up or down strictly reduces
//! the squared load imbalance, and tells the lower rank what it decided. A
//! single pass moves each boundary by at most one row; callers iterate
//! between steps and rebuild the grid with the returned row count.
//!
//! All arithmetic is on integers so both sides of a boundary reach the same
//! decision without rounding concerns.

use super::BoxGrid;
use crate::comm::{send_recv, Communicator};
use crate::env::Environment;
use crate::error::BoxSieveError;

/// Minimum number of rows a rank must own before it may give one up.
const GIVE_FLOOR: usize = 2;

/// Decide how the boundary below this rank moves, from this rank's histogram
/// and the one below. Returns +1 when the lower rank gives us its top row,
/// -1 when we give it our bottom row, 0 otherwise.
fn boundary_move(local: &[u64], below: &[u64]) -> i64 {
    let local_load: i64 = local.iter().map(|&x| x as i64).sum();
    let below_load: i64 = below.iter().map(|&x| x as i64).sum();

    let current = local_load - below_load;
    let current_sq = current * current;

    // Take the lower rank's top row.
    let below_top = below[below.len() - 1] as i64;
    let take = (local_load + below_top) - (below_load - below_top);
    let delta_take = take * take - current_sq;

    // Give the lower rank our bottom row.
    let local_bottom = local[0] as i64;
    let give = (local_load - local_bottom) - (below_load + local_bottom);
    let delta_give = give * give - current_sq;

    let accept_take = delta_take < 0 && below.len() >= GIVE_FLOOR;
    let accept_give = delta_give < 0 && local.len() >= GIVE_FLOOR;

    i64::from(accept_take) - i64::from(accept_give)
}

impl<const DIM: usize> BoxGrid<DIM> {
    /// Run one load-balance pass. `local_distribution` is the histogram of
    /// points per owned row, bottom to top; the return value is the proposed
    /// new number of owned rows for this rank. All ranks must participate.
    pub fn load_balance<C: Communicator>(
        &self,
        env: &Environment<C>,
        local_distribution: &[u64],
    ) -> Result<usize, BoxSieveError> {
        if local_distribution.len() != self.num_local_rows() {
            return Err(BoxSieveError::DistributionLength {
                expected: self.num_local_rows(),
                got: local_distribution.len(),
            });
        }

        let rank = env.rank();
        let below = rank.checked_sub(1);
        let above = (rank + 1 < env.size()).then(|| rank + 1);
        let tags = env.tags();

        // Shift the histograms up the stack so every rank can manage its
        // lower boundary.
        let rows_below = send_recv(
            env.comm(),
            tags.balance_rows,
            above,
            &(local_distribution.len() as u64).to_le_bytes(),
            below,
            8,
        )?
        .map(|b| u64::from_le_bytes(b.try_into().expect("8-byte row count")) as usize);

        let mut payload = Vec::with_capacity(local_distribution.len() * 8);
        for &count in local_distribution {
            payload.extend_from_slice(&count.to_le_bytes());
        }
        let below_distribution = send_recv(
            env.comm(),
            tags.balance_distribution,
            above,
            &payload,
            below,
            rows_below.unwrap_or(0) * 8,
        )?
        .map(|bytes| {
            bytes
                .chunks_exact(8)
                .map(|c| u64::from_le_bytes(c.try_into().expect("u64 row load")))
                .collect::<Vec<_>>()
        });

        // The upper rank of each boundary decides; the decision travels back
        // down, and the decision for our upper boundary arrives from above.
        let local_change = match &below_distribution {
            Some(below_distribution) => boundary_move(local_distribution, below_distribution),
            None => 0,
        };
        let change_from_above = send_recv(
            env.comm(),
            tags.balance_change,
            below,
            &local_change.to_le_bytes(),
            above,
            8,
        )?
        .map(|b| i64::from_le_bytes(b.try_into().expect("8-byte change")))
        .unwrap_or(0);

        let new_rows = local_distribution.len() as i64 + local_change - change_from_above;
        debug_assert!(new_rows >= 1);
        Ok(new_rows as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_load_moves_toward_the_loaded_side() {
        // Below: [10, 10]; here: [0, 0, 0]. Taking the lower top row zeroes
        // the imbalance.
        assert_eq!(boundary_move(&[0, 0, 0], &[10, 10]), 1);
    }

    #[test]
    fn balanced_loads_do_not_move() {
        assert_eq!(boundary_move(&[5, 5], &[5, 5]), 0);
    }

    #[test]
    fn a_single_row_rank_never_gives() {
        // The lower rank owns one row; taking it would empty the rank.
        assert_eq!(boundary_move(&[0, 0], &[10]), 0);
        // Likewise this rank will not give its only row away.
        assert_eq!(boundary_move(&[10], &[0, 0]), 0);
    }

    #[test]
    fn ties_are_rejected() {
        // Giving the empty bottom row leaves the imbalance unchanged; the
        // move must not be accepted or boundaries would oscillate.
        assert_eq!(boundary_move(&[0, 10], &[10]), 0);
    }

    #[test]
    fn give_direction_is_negative() {
        // Here: [2, 9]; below: [1]. Giving our light bottom row takes the
        // imbalance from 10 to 6.
        assert_eq!(boundary_move(&[2, 9], &[1]), -1);
    }
}
