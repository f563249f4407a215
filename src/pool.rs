//! Memory pool (component A): a fixed-class byte-block allocator with reuse
//! and age-based cleanup.
//!
//! The pool hands out `Vec<u8>` buffers of a standard size, reusing
//! released ones instead of reallocating where possible. Oversized
//! allocations (anything larger than the standard block size) bypass
//! pooling entirely to avoid fragmenting the available list; this mirrors
//! the rationale in the design notes: pooling works because blocks are
//! uniform, and a single oversized buffer kept around defeats that.
//!
//! Zeroing a block on release prevents a new consumer from reading
//! whatever the previous consumer wrote into it.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::error::{EngineError, Result};

/// Opaque handle identifying an allocated block.
pub type BlockId = u64;

struct Block {
    buf: Vec<u8>,
    allocated_at: Instant,
}

struct PoolInner {
    standard_size: usize,
    capacity: usize,
    next_id: BlockId,
    allocated: HashMap<BlockId, Block>,
    available: Vec<Vec<u8>>,
    stats: PoolStats,
}

/// Allocation statistics for a pool.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PoolStats {
    pub allocations: u64,
    pub releases: u64,
    pub hits: u64,
    pub misses: u64,
}

impl PoolStats {
    /// Fraction of allocations served from the available list.
    pub fn hit_rate(&self) -> f64 {
        if self.allocations == 0 {
            0.0
        } else {
            self.hits as f64 / self.allocations as f64
        }
    }
}

/// A thread-safe, fixed-block-size memory pool.
///
/// # Invariants
///
/// - Every block id is in exactly one of {allocated, released-and-recycled,
///   released-and-dropped}; `available` only ever holds buffers of exactly
///   `standard_size` bytes.
/// - `available.len() <= capacity`.
#[derive(Debug)]
pub struct MemoryPool {
    inner: Mutex<PoolInner>,
}

impl std::fmt::Debug for PoolInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolInner")
            .field("standard_size", &self.standard_size)
            .field("capacity", &self.capacity)
            .field("allocated", &self.allocated.len())
            .field("available", &self.available.len())
            .finish()
    }
}

impl MemoryPool {
    /// Creates a pool with the given standard block size and the given
    /// capacity (maximum number of released blocks held in reserve).
    pub fn new(standard_size: usize, capacity: usize) -> Self {
        Self {
            inner: Mutex::new(PoolInner {
                standard_size,
                capacity,
                next_id: 0,
                allocated: HashMap::new(),
                available: Vec::new(),
                stats: PoolStats::default(),
            }),
        }
    }

    /// Allocates a buffer of at least `size` bytes.
    ///
    /// If `size <= standard_size` and a released block is available, it is
    /// reused (a hit). Otherwise a fresh buffer of `max(size, standard_size)`
    /// bytes is created (a miss). Oversized requests always miss.
    pub fn allocate(&self, size: usize) -> Result<(BlockId, Vec<u8>)> {
        let mut inner = self.inner.lock();
        inner.stats.allocations += 1;

        let buf = if size <= inner.standard_size {
            if let Some(reused) = inner.available.pop() {
                inner.stats.hits += 1;
                reused
            } else {
                inner.stats.misses += 1;
                vec![0u8; inner.standard_size.max(size)]
            }
        } else {
            inner.stats.misses += 1;
            vec![0u8; size]
        };

        let id = inner.next_id;
        inner.next_id += 1;
        let len = buf.len();
        let clone_for_return = buf.clone();
        inner.allocated.insert(
            id,
            Block {
                buf,
                allocated_at: Instant::now(),
            },
        );
        trace!(block_id = id, size = len, "pool allocate");
        Ok((id, clone_for_return))
    }

    /// Releases a block back to the pool. Standard-size blocks re-enter the
    /// available list (zeroed) if the pool is under capacity; anything else
    /// is dropped.
    pub fn release(&self, id: BlockId) -> Result<()> {
        let mut inner = self.inner.lock();
        let Some(mut block) = inner.allocated.remove(&id) else {
            return Err(EngineError::Validation(format!(
                "release of unknown block id {id}"
            )));
        };
        inner.stats.releases += 1;

        if block.buf.len() == inner.standard_size && inner.available.len() < inner.capacity {
            for byte in block.buf.iter_mut() {
                *byte = 0;
            }
            inner.available.push(block.buf);
        }
        trace!(block_id = id, "pool release");
        Ok(())
    }

    /// Releases every allocated block whose allocation timestamp is older
    /// than `max_age`. Returns the number of blocks released.
    pub fn cleanup(&self, max_age: Duration) -> usize {
        let stale: Vec<BlockId> = {
            let inner = self.inner.lock();
            inner
                .allocated
                .iter()
                .filter(|(_, b)| b.allocated_at.elapsed() > max_age)
                .map(|(id, _)| *id)
                .collect()
        };
        let mut n = 0;
        for id in stale {
            if self.release(id).is_ok() {
                n += 1;
            }
        }
        if n > 0 {
            debug!(released = n, "pool cleanup released stale blocks");
        }
        n
    }

    /// Current allocation statistics.
    pub fn stats(&self) -> PoolStats {
        self.inner.lock().stats
    }

    /// Number of blocks currently allocated (not yet released).
    pub fn allocated_count(&self) -> usize {
        self.inner.lock().allocated.len()
    }

    /// Number of released blocks currently held in reserve.
    pub fn available_count(&self) -> usize {
        self.inner.lock().available.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_then_release_recycles_standard_blocks() {
        let pool = MemoryPool::new(64, 4);
        let (id, buf) = pool.allocate(64).unwrap();
        assert_eq!(buf.len(), 64);
        assert_eq!(pool.stats().misses, 1);
        pool.release(id).unwrap();
        assert_eq!(pool.available_count(), 1);

        let (_id2, _buf2) = pool.allocate(64).unwrap();
        assert_eq!(pool.stats().hits, 1);
    }

    #[test]
    fn oversized_allocations_bypass_the_pool() {
        let pool = MemoryPool::new(64, 4);
        let (id, buf) = pool.allocate(1024).unwrap();
        assert_eq!(buf.len(), 1024);
        pool.release(id).unwrap();
        // oversized blocks are dropped, not recycled
        assert_eq!(pool.available_count(), 0);
    }

    #[test]
    fn available_never_exceeds_capacity() {
        let pool = MemoryPool::new(16, 2);
        let ids: Vec<_> = (0..4).map(|_| pool.allocate(16).unwrap().0).collect();
        for id in ids {
            pool.release(id).unwrap();
        }
        assert!(pool.available_count() <= 2);
    }

    #[test]
    fn release_zeroes_the_buffer() {
        let pool = MemoryPool::new(8, 4);
        let (id, mut buf) = pool.allocate(8).unwrap();
        buf.iter_mut().for_each(|b| *b = 0xFF);
        // pool keeps its own copy internally; release should zero that copy
        pool.release(id).unwrap();
        let (_id2, buf2) = pool.allocate(8).unwrap();
        assert!(buf2.iter().all(|&b| b == 0));
    }

    #[test]
    fn cleanup_releases_blocks_older_than_max_age() {
        let pool = MemoryPool::new(8, 4);
        let (id, _buf) = pool.allocate(8).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        let released = pool.cleanup(Duration::from_millis(1));
        assert_eq!(released, 1);
        assert_eq!(pool.allocated_count(), 0);
        let _ = id;
    }

    #[test]
    fn hit_rate_reflects_reuse() {
        let pool = MemoryPool::new(8, 4);
        let (id, _) = pool.allocate(8).unwrap();
        pool.release(id).unwrap();
        let _ = pool.allocate(8).unwrap();
        assert!(pool.stats().hit_rate() > 0.0);
    }
}
