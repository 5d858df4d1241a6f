//! Communication abstraction for intra-process (threaded) and inter-process
//! (MPI) message passing.
//!
//! The box grid only ever talks to its two vertical neighbors, so the surface
//! here is deliberately small: non-blocking `isend`/`irecv` with waitable
//! handles, plus a blocking [`send_recv`] helper with `Option<usize>` peers
//! (the null-destination sentinel that short-circuits at domain boundaries).
//!
//! Wire format conventions (for the grid's protocols):
//! - All integers are LE fixed width (u32 counts, u64 row counts/indices,
//!   i64 signed row changes).
//! - Receivers may truncate to their provided buffer length; protocols that
//!   need exact lengths exchange sizes first.

use crate::error::BoxSieveError;
use once_cell::sync::Lazy;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex};

/// Anything that can be waited on.
pub trait Wait {
    /// Wait for completion and return the received data (if any).
    fn wait(self) -> Option<Vec<u8>>;
}

/// Non-blocking communication interface (minimal by design).
pub trait Communicator: Send + Sync + 'static {
    /// Handle returned by `isend`.
    type SendHandle: Wait;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle;
    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle;

    /// Rank of this process (0..size-1).
    fn rank(&self) -> usize;
    /// Total number of ranks.
    fn size(&self) -> usize;

    /// True on rank 0.
    fn is_master(&self) -> bool {
        self.rank() == 0
    }
    /// True on rank size-1.
    fn is_top_most(&self) -> bool {
        self.rank() + 1 == self.size()
    }

    /// Synchronization barrier (default: no-op for non-MPI comms).
    fn barrier(&self) {}
}

/// Tag newtype for safer tag arithmetic.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct CommTag(u16);

impl CommTag {
    /// Create a new tag from a raw `u16`.
    #[inline]
    pub const fn new(tag: u16) -> Self {
        Self(tag)
    }

    /// Return the underlying `u16` value.
    #[inline]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Safely offset the tag by `dx`, wrapping on overflow.
    #[inline]
    pub const fn offset(self, dx: u16) -> Self {
        Self(self.0.wrapping_add(dx))
    }
}

impl From<u16> for CommTag {
    #[inline]
    fn from(x: u16) -> Self {
        CommTag::new(x)
    }
}

/// Tag layout for the grid's neighbor protocols, derived from one base tag so
/// concurrent grids (or concurrent tests) can be kept apart.
#[derive(Copy, Clone, Debug)]
pub struct GridCommTags {
    /// Ring exclusive scan during row partitioning.
    pub partition: CommTag,
    /// Load balance: row counts to the right.
    pub balance_rows: CommTag,
    /// Load balance: per-row load histograms to the right.
    pub balance_distribution: CommTag,
    /// Load balance: accepted boundary changes to the left.
    pub balance_change: CommTag,
    /// Halo exchange: record counts.
    pub halo_sizes: CommTag,
    /// Halo exchange: point records.
    pub halo_data: CommTag,
}

impl GridCommTags {
    /// Construct tags from a base, assigning deterministic offsets per phase.
    #[inline]
    pub const fn from_base(base: CommTag) -> Self {
        Self {
            partition: base,
            balance_rows: base.offset(1),
            balance_distribution: base.offset(2),
            balance_change: base.offset(3),
            halo_sizes: base.offset(4),
            halo_data: base.offset(5),
        }
    }
}

impl Default for GridCommTags {
    fn default() -> Self {
        Self::from_base(CommTag::new(0x6b70))
    }
}

/// Blocking symmetric exchange with up to two peers.
///
/// Posts the receive first (when `src` is given), starts the send (when
/// `dest` is given), waits for the receive, and only then completes the
/// send — so two ranks exchanging with each other cannot deadlock even on a
/// backend whose sends block until matched. A `None` peer short-circuits
/// that side, so boundary ranks use the same call sites as interior ranks.
/// Returns the received bytes, or `None` when `src` was `None`.
pub fn send_recv<C: Communicator>(
    comm: &C,
    tag: CommTag,
    dest: Option<usize>,
    payload: &[u8],
    src: Option<usize>,
    recv_len: usize,
) -> Result<Option<Vec<u8>>, BoxSieveError> {
    let recv_handle = src.map(|peer| {
        let mut buf = vec![0u8; recv_len];
        comm.irecv(peer, tag.as_u16(), &mut buf)
    });
    let send_handle = dest.map(|peer| comm.isend(peer, tag.as_u16(), payload));

    let received = match (src, recv_handle) {
        (Some(peer), Some(handle)) => {
            let bytes = handle.wait().ok_or_else(|| BoxSieveError::Comm {
                peer,
                reason: "receive completed without data".into(),
            })?;
            if bytes.len() != recv_len {
                return Err(BoxSieveError::Comm {
                    peer,
                    reason: format!("expected {recv_len} bytes, received {}", bytes.len()),
                });
            }
            Some(bytes)
        }
        _ => None,
    };

    if let Some(handle) = send_handle {
        handle.wait();
    }
    Ok(received)
}

/// Compile-time no-op comm for pure serial runs and unit tests.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Wait for () {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

impl Communicator for NoComm {
    type SendHandle = ();
    type RecvHandle = ();

    fn isend(&self, _peer: usize, _tag: u16, _buf: &[u8]) {}

    fn irecv(&self, _peer: usize, _tag: u16, _buf: &mut [u8]) {}

    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }
}

// --- ThreadComm: intra-process / multi-thread ---

type Key = (usize, usize, u16); // (src, dst, tag)

#[derive(Default)]
struct Slot {
    q: VecDeque<Vec<u8>>,
}

struct Mailbox {
    map: Mutex<HashMap<Key, Arc<(Mutex<Slot>, Condvar)>>>,
}

static MAILBOX: Lazy<Mailbox> = Lazy::new(|| Mailbox {
    map: Mutex::new(HashMap::new()),
});

fn mailbox_entry(key: Key) -> Arc<(Mutex<Slot>, Condvar)> {
    let mut g = MAILBOX.map.lock().expect("MAILBOX poisoned");
    g.entry(key)
        .or_insert_with(|| Arc::new((Mutex::new(Slot::default()), Condvar::new())))
        .clone()
}

pub struct LocalSendHandle;

impl Wait for LocalSendHandle {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

pub struct LocalRecvHandle {
    cell: Arc<(Mutex<Slot>, Condvar)>,
    want_len: usize,
}

impl Wait for LocalRecvHandle {
    fn wait(self) -> Option<Vec<u8>> {
        let (lock, cv) = &*self.cell;
        let mut slot = lock.lock().expect("Slot poisoned");
        while slot.q.is_empty() {
            slot = cv.wait(slot).expect("Condvar poisoned");
        }
        let mut msg = slot.q.pop_front().expect("q non-empty");
        msg.truncate(self.want_len.min(msg.len()));
        Some(msg)
    }
}

/// Intra-process SPMD backend: one instance per simulated rank, all sharing a
/// process-wide mailbox. The grid's distributed tests drive one thread per
/// rank with these.
#[derive(Clone, Debug)]
pub struct ThreadComm {
    rank: usize,
    size: usize,
}

impl ThreadComm {
    pub fn new(rank: usize, size: usize) -> Self {
        assert!(rank < size, "rank {rank} out of range for size {size}");
        Self { rank, size }
    }
}

impl Communicator for ThreadComm {
    type SendHandle = LocalSendHandle;
    type RecvHandle = LocalRecvHandle;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle {
        let key = (self.rank, peer, tag);
        let entry = mailbox_entry(key);
        let (lock, cv) = &*entry;
        {
            let mut slot = lock.lock().expect("Slot poisoned");
            slot.q.push_back(buf.to_vec());
        }
        cv.notify_all();
        LocalSendHandle
    }

    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle {
        let key = (peer, self.rank, tag);
        LocalRecvHandle {
            cell: mailbox_entry(key),
            want_len: buf.len(),
        }
    }

    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }
}

// --- MPI backend ---
//
// The grid only ever exchanges short messages with its two vertical
// neighbors, so this backend trades request-object bookkeeping for plain
// blocking MPI calls on owned buffers: `isend` hands the payload to a
// short-lived sender thread that performs a standard-mode send, and `irecv`
// records what to match and performs the blocking receive when the handle is
// waited. No request outlives a safe borrow, so there is nothing to cancel
// and no raw buffer to reclaim. The cost is that MPI must be initialized at
// `Threading::Multiple` (sender threads overlap the receiving main thread),
// which `MpiComm::default` requests and checks.
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::{Communicator, Wait};
    use mpi::collective::CommunicatorCollectives;
    use mpi::environment::Universe;
    use mpi::point_to_point::{Destination, Source};
    use mpi::topology::{Communicator as _, SimpleCommunicator};
    use mpi::Threading;
    use std::sync::Arc;
    use std::thread::JoinHandle;

    /// The world communicator, shared with the sender threads.
    ///
    /// rsmpi does not mark `SimpleCommunicator` thread-shareable; with the
    /// `Threading::Multiple` level established at initialization, concurrent
    /// point-to-point calls on it are permitted by the MPI standard.
    struct World(SimpleCommunicator);

    unsafe impl Send for World {}
    unsafe impl Sync for World {}

    /// MPI world communicator backend.
    pub struct MpiComm {
        _universe: Universe,
        world: Arc<World>,
        rank: usize,
        size: usize,
    }

    unsafe impl Send for MpiComm {}
    unsafe impl Sync for MpiComm {}

    impl Default for MpiComm {
        fn default() -> Self {
            let (universe, threading) = mpi::initialize_with_threading(Threading::Multiple)
                .expect("MPI already initialized");
            assert!(
                threading == Threading::Multiple,
                "the MPI implementation does not provide MPI_THREAD_MULTIPLE"
            );
            let world = universe.world();
            let rank = world.rank() as usize;
            let size = world.size() as usize;
            Self {
                _universe: universe,
                world: Arc::new(World(world)),
                rank,
                size,
            }
        }
    }

    impl Communicator for MpiComm {
        type SendHandle = MpiSendHandle;
        type RecvHandle = MpiRecvHandle;

        fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle {
            let world = Arc::clone(&self.world);
            let message = buf.to_vec();
            let worker = std::thread::spawn(move || {
                world
                    .0
                    .process_at_rank(peer as i32)
                    .send_with_tag(&message[..], i32::from(tag));
            });
            MpiSendHandle {
                worker: Some(worker),
            }
        }

        fn irecv(&self, peer: usize, tag: u16, template: &mut [u8]) -> Self::RecvHandle {
            MpiRecvHandle {
                world: Arc::clone(&self.world),
                peer: peer as i32,
                tag: i32::from(tag),
                want_len: template.len(),
            }
        }

        fn rank(&self) -> usize {
            self.rank
        }
        fn size(&self) -> usize {
            self.size
        }
        fn barrier(&self) {
            self.world.0.barrier();
        }
    }

    /// Joins the sender thread; the buffer it owns dies with it.
    pub struct MpiSendHandle {
        worker: Option<JoinHandle<()>>,
    }

    impl Wait for MpiSendHandle {
        fn wait(mut self) -> Option<Vec<u8>> {
            if let Some(worker) = self.worker.take() {
                worker.join().expect("MPI sender thread panicked");
            }
            None
        }
    }

    impl Drop for MpiSendHandle {
        fn drop(&mut self) {
            // An unwaited send still has to be matched by the peer; the
            // grid's protocols always match, so joining here cannot hang.
            if let Some(worker) = self.worker.take() {
                let _ = worker.join();
            }
        }
    }

    /// A receive that has not been posted yet: matching happens in `wait`,
    /// as one blocking call into an owned vector.
    pub struct MpiRecvHandle {
        world: Arc<World>,
        peer: i32,
        tag: i32,
        want_len: usize,
    }

    impl Wait for MpiRecvHandle {
        fn wait(self) -> Option<Vec<u8>> {
            let (mut data, _status) = self
                .world
                .0
                .process_at_rank(self.peer)
                .receive_vec_with_tag::<u8>(self.tag);
            data.truncate(self.want_len);
            Some(data)
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_comm_round_trip() {
        let tag = CommTag::new(0x7100);
        let c0 = ThreadComm::new(0, 2);
        let c1 = ThreadComm::new(1, 2);

        let msg = b"halo row";
        let _s = c0.isend(1, tag.as_u16(), msg);

        let mut buf = [0u8; 8];
        let h = c1.irecv(0, tag.as_u16(), &mut buf);
        let got = h.wait().unwrap();
        assert_eq!(&got, msg);
    }

    #[test]
    fn thread_comm_fifo_order() {
        let tag = CommTag::new(0x7101);
        let c0 = ThreadComm::new(0, 2);
        let c1 = ThreadComm::new(1, 2);

        for i in 0..10u8 {
            let _ = c0.isend(1, tag.as_u16(), &[i]);
        }
        let mut out = Vec::new();
        for _ in 0..10 {
            let mut b = [0u8; 1];
            let h = c1.irecv(0, tag.as_u16(), &mut b);
            out.push(h.wait().unwrap()[0]);
        }
        assert_eq!(out, (0u8..10u8).collect::<Vec<_>>());
    }

    #[test]
    fn send_recv_null_peers_short_circuit() {
        let comm = NoComm;
        let got = send_recv(&comm, CommTag::new(0x7102), None, &[], None, 4).unwrap();
        assert!(got.is_none());
    }

    #[test]
    fn send_recv_between_thread_ranks() {
        let tag = CommTag::new(0x7103);
        let left = ThreadComm::new(0, 2);
        let right = ThreadComm::new(1, 2);

        // Both ranks send right / receive left in the grid's shift pattern;
        // rank 0 has no left neighbor and rank 1 no right neighbor.
        let t = std::thread::spawn(move || {
            send_recv(&right, tag, None, &[], Some(0), 8).unwrap().unwrap()
        });
        let none = send_recv(&left, tag, Some(1), &42u64.to_le_bytes(), None, 0).unwrap();
        assert!(none.is_none());
        let bytes = t.join().unwrap();
        assert_eq!(u64::from_le_bytes(bytes.try_into().unwrap()), 42);
    }

    #[test]
    fn master_and_top_most_predicates() {
        assert!(NoComm.is_master() && NoComm.is_top_most());
        let mid = ThreadComm::new(1, 3);
        assert!(!mid.is_master() && !mid.is_top_most());
        assert!(ThreadComm::new(2, 3).is_top_most());
    }
}

#[cfg(all(test, feature = "mpi-support"))]
mod mpi_tests {
    use super::*;
    use crate::env::Environment;
    use crate::geometry::DomainExtents;
    use crate::grid::BoxGrid;

    // MPI may only be initialized once per process, so the whole backend is
    // exercised in one test. Run it under `mpirun -n <N>` for a real
    // multi-rank pass; at world size 1 the neighbor legs short-circuit.
    #[test]
    fn mpi_comm_end_to_end() {
        let comm = MpiComm::default();
        let (rank, size) = (comm.rank(), comm.size());
        assert!(rank < size);
        assert_eq!(comm.is_master(), rank == 0);
        assert_eq!(comm.is_top_most(), rank + 1 == size);

        // Handle round trip against ourselves: the sender thread blocks
        // until the receive below matches it, then both complete.
        let tag = CommTag::new(0x7200);
        let send = comm.isend(rank, tag.as_u16(), b"halo row");
        let mut buf = [0u8; 8];
        let got = comm.irecv(rank, tag.as_u16(), &mut buf).wait().unwrap();
        assert_eq!(&got, b"halo row");
        send.wait();

        // The blocking helper with a self peer on both sides.
        let got = send_recv(
            &comm,
            tag.offset(1),
            Some(rank),
            &42u64.to_le_bytes(),
            Some(rank),
            8,
        )
        .unwrap()
        .unwrap();
        assert_eq!(u64::from_le_bytes(got.try_into().unwrap()), 42);

        // The grid protocols run over an MPI environment like any other:
        // two rows per rank, one point in each, halo exchange, pairs, and a
        // quiescent load-balance pass.
        let env = Environment::new(comm, false);
        let mut grid: BoxGrid<1> = BoxGrid::new(
            1.0,
            DomainExtents::new([0.0], [2.0 * size as f64]),
            false,
            None,
            &env,
        )
        .unwrap();
        assert_eq!(grid.num_local_rows(), 2);
        grid.setup_local_boxes_half_only().unwrap();
        grid.setup_halo_boxes();

        // Point i sits at i + 0.5, so index recovers location everywhere.
        let points = [
            (2 * rank, [2.0 * rank as f64 + 0.5]),
            (2 * rank + 1, [2.0 * rank as f64 + 1.5]),
        ];
        for (index, location) in &points {
            grid.insert_point(*index, *location).unwrap();
        }
        let applied = grid.exchange_halos(&env, |i| [i as f64 + 0.5]).unwrap();
        assert_eq!(applied, usize::from(rank > 0) + usize::from(rank + 1 < size));

        let out = grid.calculate_node_pairs(&points).unwrap();
        let expected =
            1 + usize::from(rank > 0) + usize::from(rank + 1 < size);
        assert_eq!(out.pairs.len(), expected);
        assert!(out.pairs.contains(&(2 * rank, 2 * rank + 1)));

        assert_eq!(grid.load_balance(&env, &[1, 1]).unwrap(), 2);
    }
}
