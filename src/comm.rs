//! Communication collectives consumed by the distribution engine.
//!
//! The engine itself never communicates during view, partition or local
//! element access. Collectives are only issued by operations that move data
//! between processes (redistribution, global gathers) and every one of them
//! must be called in lock-step by all members of the communicator: same call
//! sequence, same argument shapes. Divergent control flow deadlocks at the
//! next collective.
//!
//! [`Communicator`] works on byte buffers; the typed helpers in this module
//! ([`all_gather`], [`broadcast`], [`all_reduce_sum`], [`all_to_all`]) move
//! `Pod` data through it.

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use bytemuck::Pod;

use crate::scalar::Scalar;
use crate::{DistError, Result};

/// A group of processes that can run collectives together.
pub trait Communicator: Send + Sync + fmt::Debug {
    /// Rank of this process within the group.
    fn rank(&self) -> usize;

    /// Number of processes in the group.
    fn size(&self) -> usize;

    /// Create a sub-communicator from `members` (ranks in this group, listed
    /// in the new rank order).
    ///
    /// Every listed member must call `split` with the same list, and this
    /// process must be one of them.
    fn split(&self, members: &[usize]) -> Result<Arc<dyn Communicator>>;

    /// Every process contributes `send`; every process receives all
    /// contributions indexed by rank.
    fn all_gather_bytes(&self, send: &[u8]) -> Result<Vec<Vec<u8>>>;

    /// Replace `buf` on every process with the root's `buf`.
    fn broadcast_bytes(&self, buf: &mut Vec<u8>, root: usize) -> Result<()> {
        if root >= self.size() {
            return Err(DistError::Communication(format!(
                "broadcast root {root} outside group of {}",
                self.size()
            )));
        }
        let send = if self.rank() == root {
            buf.clone()
        } else {
            Vec::new()
        };
        let mut parts = self.all_gather_bytes(&send)?;
        *buf = std::mem::take(&mut parts[root]);
        Ok(())
    }

    /// Block until every member has arrived.
    fn barrier(&self) -> Result<()> {
        self.all_gather_bytes(&[]).map(|_| ())
    }

    /// Number of collectives issued on this communicator so far.
    fn collective_calls(&self) -> usize;
}

/// Validate a split member list and return this process's new rank.
fn member_rank(members: &[usize], size: usize, rank: usize) -> Result<usize> {
    let mut seen = vec![false; size];
    for &m in members {
        if m >= size || seen[m] {
            return Err(DistError::Communication(format!(
                "invalid split member {m} for group of {size}"
            )));
        }
        seen[m] = true;
    }
    members.iter().position(|&m| m == rank).ok_or_else(|| {
        DistError::Communication(format!("rank {rank} is not a member of the split"))
    })
}

// ============================================================================
// SelfComm
// ============================================================================

/// The single-process communicator.
#[derive(Debug, Default)]
pub struct SelfComm {
    calls: AtomicUsize,
}

impl SelfComm {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Communicator for SelfComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn split(&self, members: &[usize]) -> Result<Arc<dyn Communicator>> {
        member_rank(members, 1, 0)?;
        Ok(Arc::new(SelfComm::new()))
    }

    fn all_gather_bytes(&self, send: &[u8]) -> Result<Vec<Vec<u8>>> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Ok(vec![send.to_vec()])
    }

    fn collective_calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

// ============================================================================
// ThreadComm
// ============================================================================

#[derive(Debug, Default)]
struct Round {
    generation: u64,
    arrived: usize,
    slots: Vec<Option<Vec<u8>>>,
    result: Arc<Vec<Vec<u8>>>,
    aborted: bool,
}

/// Shared meeting point of one thread group.
#[derive(Debug)]
struct Rendezvous {
    id: u64,
    size: usize,
    round: Mutex<Round>,
    cvar: Condvar,
}

impl Rendezvous {
    fn new(id: u64, size: usize) -> Self {
        Self {
            id,
            size,
            round: Mutex::new(Round {
                slots: vec![None; size],
                ..Round::default()
            }),
            cvar: Condvar::new(),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Round>> {
        self.round
            .lock()
            .map_err(|_| DistError::Communication("rendezvous lock poisoned".into()))
    }

    fn exchange(&self, rank: usize, send: &[u8]) -> Result<Arc<Vec<Vec<u8>>>> {
        let mut round = self.lock()?;
        if round.aborted {
            return Err(aborted());
        }
        round.slots[rank] = Some(send.to_vec());
        round.arrived += 1;
        if round.arrived == self.size {
            let gathered: Vec<Vec<u8>> = round
                .slots
                .iter_mut()
                .map(|slot| slot.take().unwrap_or_default())
                .collect();
            round.result = Arc::new(gathered);
            round.arrived = 0;
            round.generation += 1;
            self.cvar.notify_all();
            return Ok(round.result.clone());
        }
        let generation = round.generation;
        while round.generation == generation && !round.aborted {
            round = self
                .cvar
                .wait(round)
                .map_err(|_| DistError::Communication("rendezvous lock poisoned".into()))?;
        }
        if round.generation == generation {
            return Err(aborted());
        }
        Ok(round.result.clone())
    }

    fn abort(&self) {
        let mut round = self.round.lock().unwrap_or_else(|e| e.into_inner());
        round.aborted = true;
        self.cvar.notify_all();
    }
}

fn aborted() -> DistError {
    DistError::Communication("a peer process aborted".into())
}

type GroupKey = (u64, u64, Vec<usize>);

/// All thread groups created from one world.
#[derive(Debug)]
struct Registry {
    next_id: AtomicU64,
    groups: Mutex<HashMap<GroupKey, Arc<Rendezvous>>>,
}

impl Registry {
    fn new() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            groups: Mutex::new(HashMap::new()),
        }
    }

    /// Shared rendezvous for `key`, created by whichever member asks first.
    ///
    /// Groups no communicator refers to any more are dropped here, so the map
    /// only holds groups with live members.
    fn rendezvous(&self, key: GroupKey) -> Result<Arc<Rendezvous>> {
        let mut groups = self
            .groups
            .lock()
            .map_err(|_| DistError::Communication("registry lock poisoned".into()))?;
        groups.retain(|_, group| Arc::strong_count(group) > 1);
        let size = key.2.len();
        let entry = groups.entry(key).or_insert_with(|| {
            Arc::new(Rendezvous::new(
                self.next_id.fetch_add(1, Ordering::Relaxed),
                size,
            ))
        });
        Ok(entry.clone())
    }

    fn abort_all(&self) {
        let groups = self.groups.lock().unwrap_or_else(|e| e.into_inner());
        for group in groups.values() {
            group.abort();
        }
    }
}

/// In-process communicator where every process is a thread.
///
/// Useful for exercising SPMD code without a message-passing runtime:
///
/// ```rust
/// use dist_matrix::{all_gather, ThreadComm, Communicator};
///
/// let gathered = ThreadComm::run(3, |comm| {
///     all_gather(&comm, &[comm.rank() as u32]).unwrap()
/// });
/// assert_eq!(gathered[2], vec![vec![0], vec![1], vec![2]]);
/// ```
#[derive(Debug)]
pub struct ThreadComm {
    rank: usize,
    rendezvous: Arc<Rendezvous>,
    registry: Arc<Registry>,
    splits: AtomicU64,
    calls: AtomicUsize,
}

impl ThreadComm {
    /// One communicator handle per process of a `size`-process world.
    pub fn world(size: usize) -> Vec<ThreadComm> {
        let registry = Arc::new(Registry::new());
        let key = (u64::MAX, 0, (0..size).collect());
        let rendezvous = match registry.rendezvous(key) {
            Ok(r) => r,
            // A fresh registry cannot be poisoned.
            Err(_) => Arc::new(Rendezvous::new(u64::MAX, size)),
        };
        (0..size)
            .map(|rank| ThreadComm {
                rank,
                rendezvous: rendezvous.clone(),
                registry: registry.clone(),
                splits: AtomicU64::new(0),
                calls: AtomicUsize::new(0),
            })
            .collect()
    }

    /// Run `f` once per process on `size` scoped threads and return the
    /// results in rank order.
    ///
    /// If any process panics, pending collectives on the others fail instead
    /// of blocking, and the first panic is propagated.
    pub fn run<F, R>(size: usize, f: F) -> Vec<R>
    where
        F: Fn(ThreadComm) -> R + Sync,
        R: Send,
    {
        let comms = Self::world(size);
        let registry = comms.first().map(|c| c.registry.clone());
        std::thread::scope(|scope| {
            let f = &f;
            let handles: Vec<_> = comms
                .into_iter()
                .map(|comm| {
                    let registry = registry.clone();
                    scope.spawn(move || {
                        let outcome = panic::catch_unwind(AssertUnwindSafe(|| f(comm)));
                        if outcome.is_err() {
                            if let Some(registry) = registry {
                                registry.abort_all();
                            }
                        }
                        outcome
                    })
                })
                .collect();
            let outcomes: Vec<_> = handles
                .into_iter()
                .map(|h| h.join().unwrap_or_else(|p| Err(p)))
                .collect();
            outcomes
                .into_iter()
                .map(|o| o.unwrap_or_else(|p| panic::resume_unwind(p)))
                .collect()
        })
    }
}

impl Communicator for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.rendezvous.size
    }

    fn split(&self, members: &[usize]) -> Result<Arc<dyn Communicator>> {
        let rank = member_rank(members, self.size(), self.rank)?;
        let seq = self.splits.fetch_add(1, Ordering::Relaxed);
        let rendezvous = self
            .registry
            .rendezvous((self.rendezvous.id, seq, members.to_vec()))?;
        Ok(Arc::new(ThreadComm {
            rank,
            rendezvous,
            registry: self.registry.clone(),
            splits: AtomicU64::new(0),
            calls: AtomicUsize::new(0),
        }))
    }

    fn all_gather_bytes(&self, send: &[u8]) -> Result<Vec<Vec<u8>>> {
        let _span =
            tracing::trace_span!("all_gather", rank = self.rank, bytes = send.len()).entered();
        self.calls.fetch_add(1, Ordering::Relaxed);
        let gathered = self.rendezvous.exchange(self.rank, send)?;
        Ok(gathered.as_ref().clone())
    }

    fn collective_calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

// ============================================================================
// Typed collectives
// ============================================================================

fn decode<T: Pod>(bytes: &[u8]) -> Result<Vec<T>> {
    let size = std::mem::size_of::<T>();
    if size == 0 {
        return Ok(Vec::new());
    }
    if bytes.len() % size != 0 {
        return Err(DistError::Communication(format!(
            "received {} bytes, not a multiple of element size {size}",
            bytes.len()
        )));
    }
    Ok(bytemuck::pod_collect_to_vec(bytes))
}

/// Gather `send` from every process, indexed by rank.
pub fn all_gather<T: Pod>(comm: &dyn Communicator, send: &[T]) -> Result<Vec<Vec<T>>> {
    comm.all_gather_bytes(bytemuck::cast_slice(send))?
        .iter()
        .map(|part| decode(part))
        .collect()
}

/// Replace `buf` on every process with the contents of `buf` on `root`.
pub fn broadcast<T: Pod>(comm: &dyn Communicator, buf: &mut Vec<T>, root: usize) -> Result<()> {
    let mut bytes = if comm.rank() == root {
        bytemuck::cast_slice::<T, u8>(buf).to_vec()
    } else {
        Vec::new()
    };
    comm.broadcast_bytes(&mut bytes, root)?;
    *buf = decode(&bytes)?;
    Ok(())
}

/// Element-wise sum of `values` over all processes, stored back on every
/// process.
pub fn all_reduce_sum<T: Scalar>(comm: &dyn Communicator, values: &mut [T]) -> Result<()> {
    let parts = all_gather(comm, values)?;
    if let Some(bad) = parts.iter().find(|p| p.len() != values.len()) {
        return Err(DistError::Communication(format!(
            "all_reduce length mismatch: {} vs {}",
            bad.len(),
            values.len()
        )));
    }
    for (k, v) in values.iter_mut().enumerate() {
        let mut acc = T::zero();
        for part in &parts {
            acc += part[k];
        }
        *v = acc;
    }
    Ok(())
}

/// Personalized exchange: the first `send_counts[0]` elements of `send` go to
/// rank 0, the next `send_counts[1]` to rank 1, and so on. Returns the chunks
/// received from every rank.
pub fn all_to_all<T: Pod>(
    comm: &dyn Communicator,
    send: &[T],
    send_counts: &[usize],
) -> Result<Vec<Vec<T>>> {
    if send_counts.len() != comm.size() {
        return Err(DistError::Communication(format!(
            "all_to_all expects {} counts, got {}",
            comm.size(),
            send_counts.len()
        )));
    }
    if send_counts.iter().sum::<usize>() != send.len() {
        return Err(DistError::Communication(
            "all_to_all counts do not cover the send buffer".into(),
        ));
    }
    let counts: Vec<u64> = send_counts.iter().map(|&c| c as u64).collect();
    let all_counts = all_gather(comm, &counts)?;
    let all_data = all_gather(comm, send)?;
    let me = comm.rank();
    all_counts
        .iter()
        .zip(all_data.iter())
        .map(|(counts, data)| {
            let start = counts.iter().take(me).sum::<u64>() as usize;
            let len = counts.get(me).copied().unwrap_or(0) as usize;
            data.get(start..start + len)
                .map(|chunk| chunk.to_vec())
                .ok_or_else(|| DistError::Communication("all_to_all chunk out of range".into()))
        })
        .collect()
}

/// Check that every process reached the same program point.
///
/// Gathers a hash of `tag` and fails with [`DistError::Desync`] on every
/// process if any two disagree. Intended for debugging SPMD control flow.
pub fn verify_lockstep(comm: &dyn Communicator, tag: &str) -> Result<()> {
    let hash = fnv1a(tag.as_bytes());
    let all = all_gather(comm, &[hash])?;
    if all.iter().all(|h| h.as_slice() == [hash]) {
        Ok(())
    } else {
        Err(DistError::Desync(tag.to_string()))
    }
}

/// FNV-1a, fixed so every process hashes a tag to the same value;
/// `DefaultHasher` is randomly keyed per process.
fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf2_9ce4_8422_2325u64, |h, &b| {
        (h ^ b as u64).wrapping_mul(0x0000_0100_0000_01b3)
    })
}
