//! Halo slab management and the boundary payload exchange.
//!
//! Each rank mirrors its neighbors' boundary rows in one-box-thick halo
//! slabs. `setup_halo_boxes` allocates the slabs and records which owned
//! boxes feed each neighbor; `update_halo_boxes` flattens those boxes'
//! contents into the two payload vectors the consumer ships. For consumers
//! that do not need custom framing, `exchange_halos` performs the whole
//! symmetric exchange: record counts first, then `(index, location)` records,
//! both LE-encoded, applied into the halo boxes on receipt.

use super::{BoxGrid, GridBox};
use crate::comm::{send_recv, Communicator};
use crate::env::Environment;
use crate::error::BoxSieveError;

/// Bytes per halo point record: a u64 index plus DIM f64 coordinates.
const fn record_len(dim: usize) -> usize {
    8 + 8 * dim
}

fn encode_records<const DIM: usize>(
    indices: &[usize],
    location_of: &impl Fn(usize) -> [f64; DIM],
) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(indices.len() * record_len(DIM));
    for &index in indices {
        bytes.extend_from_slice(&(index as u64).to_le_bytes());
        for x in location_of(index) {
            bytes.extend_from_slice(&x.to_le_bytes());
        }
    }
    bytes
}

fn decode_records<const DIM: usize>(bytes: &[u8]) -> Vec<(usize, [f64; DIM])> {
    debug_assert_eq!(bytes.len() % record_len(DIM), 0);
    bytes
        .chunks_exact(record_len(DIM))
        .map(|chunk| {
            let index = u64::from_le_bytes(chunk[..8].try_into().expect("u64 index")) as usize;
            let mut location = [0.0; DIM];
            for (i, x) in location.iter_mut().enumerate() {
                let at = 8 + 8 * i;
                *x = f64::from_le_bytes(chunk[at..at + 8].try_into().expect("f64 coordinate"));
            }
            (index, location)
        })
        .collect()
}

impl<const DIM: usize> BoxGrid<DIM> {
    /// Allocate the halo slabs on each side where a neighbor rank exists and
    /// record which owned boundary boxes feed them. Idempotent.
    pub fn setup_halo_boxes(&mut self) {
        self.halo_boxes.clear();
        self.halo_map.clear();
        self.halos_left.clear();
        self.halos_right.clear();

        let bpf = self.boxes_per_face();
        let lo = self.partition().lo();
        let hi = self.partition().hi();

        // A rank above: mirror its bottom row above our stack, and send it
        // our top row.
        if self.rank + 1 < self.size {
            for i in 0..bpf {
                self.halo_boxes.push(GridBox::new());
                let global_index = hi * bpf + i;
                self.halo_map.insert(global_index, self.halo_boxes.len() - 1);
                self.halos_right.push(global_index - bpf);
            }
        }

        // A rank below: mirror its top row below our stack, and send it our
        // bottom row.
        if self.rank > 0 {
            for i in 0..bpf {
                self.halo_boxes.push(GridBox::new());
                let global_index = (lo - 1) * bpf + i;
                self.halo_map.insert(global_index, self.halo_boxes.len() - 1);
                self.halos_left.push(global_index + bpf);
            }
        }
    }

    /// Rebuild the two outgoing payload vectors from the current contents of
    /// the boundary boxes.
    pub fn update_halo_boxes(&mut self) {
        let mut left = Vec::new();
        for &box_index in &self.halos_left {
            left.extend(self.box_ref(box_index).points().iter().copied());
        }
        self.halo_nodes_left = left;

        let mut right = Vec::new();
        for &box_index in &self.halos_right {
            right.extend(self.box_ref(box_index).points().iter().copied());
        }
        self.halo_nodes_right = right;
    }

    /// Point indices to serialize to the rank below.
    pub fn halo_nodes_left(&self) -> &[usize] {
        &self.halo_nodes_left
    }

    /// Point indices to serialize to the rank above.
    pub fn halo_nodes_right(&self) -> &[usize] {
        &self.halo_nodes_right
    }

    /// Perform the full symmetric halo exchange with both vertical neighbors:
    /// update the outgoing payloads, clear the halo slabs, ship
    /// `(index, location)` records both ways, and insert what arrives into
    /// the halo boxes.
    ///
    /// Records whose containing box is not a halo box here (points caught
    /// mid-migration by the neighbor) are skipped and counted. Returns the
    /// number of records applied.
    pub fn exchange_halos<C: Communicator>(
        &mut self,
        env: &Environment<C>,
        location_of: impl Fn(usize) -> [f64; DIM],
    ) -> Result<usize, BoxSieveError> {
        self.update_halo_boxes();
        for halo in &mut self.halo_boxes {
            halo.clear_points();
        }

        let below = self.rank.checked_sub(1);
        let above = (self.rank + 1 < self.size).then(|| self.rank + 1);

        let payload_below = encode_records(&self.halo_nodes_left, &location_of);
        let payload_above = encode_records(&self.halo_nodes_right, &location_of);

        let mut applied = 0;
        let mut skipped = 0;
        for (peer, payload) in [(below, payload_below), (above, payload_above)] {
            let count = (payload.len() / record_len(DIM)) as u32;
            let Some(peer) = peer else { continue };

            let incoming_count = send_recv(
                env.comm(),
                env.tags().halo_sizes,
                Some(peer),
                &count.to_le_bytes(),
                Some(peer),
                4,
            )?
            .map(|b| u32::from_le_bytes(b.try_into().expect("u32 count")) as usize)
            .unwrap_or(0);

            let incoming = send_recv(
                env.comm(),
                env.tags().halo_data,
                Some(peer),
                &payload,
                Some(peer),
                incoming_count * record_len(DIM),
            )?
            .unwrap_or_default();

            for (index, location) in decode_records::<DIM>(&incoming) {
                match self.insert_halo_point(index, location) {
                    Ok(_) => applied += 1,
                    Err(_) => skipped += 1,
                }
            }
        }

        if skipped > 0 {
            tracing::debug!(
                rank = self.rank,
                skipped,
                "halo records outside the halo slabs were dropped"
            );
        }
        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_round_trip() {
        let locations = [[0.5, 1.5], [2.0, 0.25]];
        let bytes = encode_records::<2>(&[7, 3], &|i| locations[usize::from(i == 3)]);
        assert_eq!(bytes.len(), 2 * record_len(2));
        let records = decode_records::<2>(&bytes);
        assert_eq!(records, vec![(7, [0.5, 1.5]), (3, [2.0, 0.25])]);
    }

    #[test]
    fn empty_payload_decodes_empty() {
        assert!(decode_records::<3>(&[]).is_empty());
    }
}
