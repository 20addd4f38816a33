use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Barrier;
use std::thread;
use std::time::{Duration, Instant};

use clap::ValueEnum;
use log::{debug, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Tuples and hashing
// ---------------------------------------------------------------------------

/// 16-byte input record: 8-byte key, 8-byte payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tuple {
    pub key: u64,
    pub payload: u64,
}

/// Largest supported fan-out (2^18 partitions).
pub const MAX_HASH_BITS: u32 = 18;

const PAGE_SIZE: usize = 4096;
const TUPLES_PER_PAGE: usize = PAGE_SIZE / std::mem::size_of::<Tuple>();
const MIN_PARTITION_CAPACITY: usize = 16;

/// Partition index: the low `bits` bits of the key.
#[inline]
pub fn partition_of(key: u64, bits: u32) -> usize {
    (key & ((1u64 << bits) - 1)) as usize
}

/// Uniformly random keys with zero payloads, reproducible from `seed`.
pub fn generate_input(count: usize, seed: u64) -> Vec<Tuple> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| Tuple {
            key: rng.gen(),
            payload: 0,
        })
        .collect()
}

/// Slots reserved per partition: the expected share times a headroom
/// factor that grows with the fan-out, since small partitions skew more.
pub fn partition_capacity(tuples: usize, partitions: usize) -> usize {
    let expected = (tuples / partitions.max(1)).max(MIN_PARTITION_CAPACITY);
    let headroom = if partitions >= 1 << 17 {
        7
    } else if partitions >= 1 << 14 {
        4
    } else {
        2
    };
    expected * headroom
}

/// Split `input` into `threads` contiguous chunks; the first
/// `len % threads` chunks take one extra tuple.
pub fn split_chunks(input: &[Tuple], threads: usize) -> Vec<&[Tuple]> {
    let base = input.len() / threads;
    let remainder = input.len() % threads;
    let mut chunks = Vec::with_capacity(threads);
    let mut offset = 0;
    for t in 0..threads {
        let count = base + usize::from(t < remainder);
        chunks.push(&input[offset..offset + count]);
        offset += count;
    }
    chunks
}

// ---------------------------------------------------------------------------
// Run configuration and results
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum BenchError {
    #[error("thread count must be at least 1")]
    NoThreads,

    #[error("{bits} hash bits exceeds the supported maximum of {MAX_HASH_BITS}")]
    TooManyPartitions { bits: u32 },

    #[error("partition {partition} overflowed its {capacity} slots")]
    BufferOverflow { partition: usize, capacity: usize },

    #[error("{threads} threads need {threads} core ids, got {cores}")]
    CoreList { threads: usize, cores: usize },

    #[error("worker thread {0} panicked")]
    WorkerPanicked(usize),
}

/// How worker threads share the output partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Strategy {
    /// One set of partition buffers shared by all threads; slots are
    /// claimed with an atomic fetch-add on each partition's write index.
    Concurrent,
    /// Every thread scatters into its own private partition buffers.
    Independent,
}

/// Which CPU each worker is pinned to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pinning {
    None,
    /// Worker `t` runs on `cores[t]`.
    Cores(Vec<usize>),
    /// Two-socket layout with 16 physical cores and SMT siblings:
    /// fill the even CPUs of each socket first, then the odd siblings.
    PhysicalFirst,
}

impl Pinning {
    pub fn core_for(&self, thread_id: usize) -> Option<usize> {
        match self {
            Pinning::None => None,
            Pinning::Cores(cores) => cores.get(thread_id).copied(),
            Pinning::PhysicalFirst => Some(physical_first_core(thread_id)),
        }
    }

    fn validate(&self, threads: usize) -> Result<(), BenchError> {
        match self {
            Pinning::Cores(cores) if cores.len() != threads => Err(BenchError::CoreList {
                threads,
                cores: cores.len(),
            }),
            _ => Ok(()),
        }
    }
}

fn physical_first_core(thread_id: usize) -> usize {
    match thread_id {
        0..=7 => thread_id * 2,
        8..=15 => (thread_id - 8) * 2 + 16,
        16..=23 => (thread_id - 16) * 2 + 1,
        _ => (thread_id - 24) * 2 + 17,
    }
}

fn pin_current(pinning: &Pinning, thread_id: usize) {
    if let Some(core) = pinning.core_for(thread_id) {
        if !core_affinity::set_for_current(core_affinity::CoreId { id: core }) {
            warn!("could not pin worker {thread_id} to core {core}");
        }
    }
}

/// Outcome of one partitioning pass.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub tuples: usize,
    pub elapsed: Duration,
    /// Tuples written to each partition, summed over threads.
    pub partition_sizes: Vec<usize>,
}

impl RunResult {
    /// Throughput in millions of tuples per second.
    pub fn throughput_mtps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64().max(f64::MIN_POSITIVE);
        self.tuples as f64 / secs / 1e6
    }
}

/// Partition `input` into `2^bits` partitions with `threads` workers.
///
/// Buffers are allocated and touched before the workers are released
/// through a start barrier; only the scatter itself is timed.
pub fn run(
    strategy: Strategy,
    input: &[Tuple],
    threads: usize,
    bits: u32,
    capacity: usize,
    pinning: &Pinning,
) -> Result<RunResult, BenchError> {
    if threads == 0 {
        return Err(BenchError::NoThreads);
    }
    if bits > MAX_HASH_BITS {
        return Err(BenchError::TooManyPartitions { bits });
    }
    pinning.validate(threads)?;

    debug!("{strategy:?}: {} tuples, {threads} threads, {bits} bits, {capacity} slots/partition", input.len());
    let (elapsed, partition_sizes) = match strategy {
        Strategy::Concurrent => run_concurrent(input, threads, bits, capacity, pinning)?,
        Strategy::Independent => run_independent(input, threads, bits, capacity, pinning)?,
    };
    Ok(RunResult {
        tuples: input.len(),
        elapsed,
        partition_sizes,
    })
}

// ---------------------------------------------------------------------------
// Concurrent output: shared buffers, atomic slot claims
// ---------------------------------------------------------------------------

#[repr(align(64))]
struct SharedPartition {
    write_idx: AtomicU32,
    keys: Box<[AtomicU64]>,
    payloads: Box<[AtomicU64]>,
}

impl SharedPartition {
    fn new(capacity: usize) -> Self {
        let part = SharedPartition {
            write_idx: AtomicU32::new(0),
            keys: (0..capacity).map(|_| AtomicU64::new(0)).collect(),
            payloads: (0..capacity).map(|_| AtomicU64::new(0)).collect(),
        };
        for slot in part.keys.iter().step_by(TUPLES_PER_PAGE) {
            slot.store(0, Ordering::Relaxed);
        }
        part
    }
}

fn scatter_shared(chunk: &[Tuple], bits: u32, parts: &[SharedPartition]) -> Result<(), BenchError> {
    for tuple in chunk {
        let partition = partition_of(tuple.key, bits);
        let part = &parts[partition];
        // Each index is claimed exactly once, so relaxed stores never race.
        let idx = part.write_idx.fetch_add(1, Ordering::Relaxed) as usize;
        let (Some(key), Some(payload)) = (part.keys.get(idx), part.payloads.get(idx)) else {
            return Err(BenchError::BufferOverflow {
                partition,
                capacity: part.keys.len(),
            });
        };
        key.store(tuple.key, Ordering::Relaxed);
        payload.store(tuple.payload, Ordering::Relaxed);
    }
    Ok(())
}

fn run_concurrent(
    input: &[Tuple],
    threads: usize,
    bits: u32,
    capacity: usize,
    pinning: &Pinning,
) -> Result<(Duration, Vec<usize>), BenchError> {
    let parts: Vec<SharedPartition> = (0..1usize << bits).map(|_| SharedPartition::new(capacity)).collect();
    let chunks = split_chunks(input, threads);
    let barrier = Barrier::new(threads + 1);

    let (elapsed, outcomes) = thread::scope(|s| {
        let handles: Vec<_> = chunks
            .iter()
            .enumerate()
            .map(|(t, chunk)| {
                let (parts, barrier) = (&parts, &barrier);
                s.spawn(move || {
                    pin_current(pinning, t);
                    barrier.wait();
                    scatter_shared(chunk, bits, parts)
                })
            })
            .collect();

        barrier.wait();
        let start = Instant::now();
        let outcomes: Vec<_> = handles.into_iter().map(|h| h.join()).collect();
        (start.elapsed(), outcomes)
    });

    for (t, outcome) in outcomes.into_iter().enumerate() {
        outcome.map_err(|_| BenchError::WorkerPanicked(t))??;
    }

    let sizes = parts
        .iter()
        .map(|p| p.write_idx.load(Ordering::Relaxed) as usize)
        .collect();
    Ok((elapsed, sizes))
}

// ---------------------------------------------------------------------------
// Independent output: private buffers per thread
// ---------------------------------------------------------------------------

#[repr(align(64))]
#[derive(Debug, Clone)]
struct LocalPartition {
    write_idx: usize,
    data: Vec<Tuple>,
}

fn allocate_local(partitions: usize, capacity: usize) -> Vec<LocalPartition> {
    (0..partitions)
        .map(|_| {
            let mut data = vec![Tuple::default(); capacity];
            for slot in data.iter_mut().step_by(TUPLES_PER_PAGE) {
                slot.key = 0;
            }
            LocalPartition { write_idx: 0, data }
        })
        .collect()
}

fn scatter_private(chunk: &[Tuple], bits: u32, parts: &mut [LocalPartition]) -> Result<(), BenchError> {
    for tuple in chunk {
        let partition = partition_of(tuple.key, bits);
        let part = &mut parts[partition];
        let capacity = part.data.len();
        let Some(slot) = part.data.get_mut(part.write_idx) else {
            return Err(BenchError::BufferOverflow { partition, capacity });
        };
        *slot = *tuple;
        part.write_idx += 1;
    }
    Ok(())
}

fn run_independent(
    input: &[Tuple],
    threads: usize,
    bits: u32,
    capacity: usize,
    pinning: &Pinning,
) -> Result<(Duration, Vec<usize>), BenchError> {
    let partitions = 1usize << bits;
    let chunks = split_chunks(input, threads);
    let barrier = Barrier::new(threads + 1);

    let (elapsed, outcomes) = thread::scope(|s| {
        let handles: Vec<_> = chunks
            .iter()
            .enumerate()
            .map(|(t, chunk)| {
                let barrier = &barrier;
                s.spawn(move || {
                    pin_current(pinning, t);
                    let mut parts = allocate_local(partitions, capacity);
                    barrier.wait();
                    scatter_private(chunk, bits, &mut parts)?;
                    Ok::<_, BenchError>(parts.iter().map(|p| p.write_idx).collect::<Vec<_>>())
                })
            })
            .collect();

        barrier.wait();
        let start = Instant::now();
        let outcomes: Vec<_> = handles.into_iter().map(|h| h.join()).collect();
        (start.elapsed(), outcomes)
    });

    let mut sizes = vec![0usize; partitions];
    for (t, outcome) in outcomes.into_iter().enumerate() {
        let local = outcome.map_err(|_| BenchError::WorkerPanicked(t))??;
        for (total, n) in sizes.iter_mut().zip(local) {
            *total += n;
        }
    }
    Ok((elapsed, sizes))
}
