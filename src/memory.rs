//! Memory manager (component E): process memory pressure tracking, pooled
//! page allocation, and age-based reclamation.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use sysinfo::{Pid, System};
use tracing::{debug, info, warn};

use crate::pool::MemoryPool;

/// Qualitative memory pressure, derived from current RSS against the
/// configured threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PressureLevel {
    Low,
    Medium,
    High,
    Critical,
}

/// Derives a pressure level from a usage ratio (RSS / budget) and the
/// configured `threshold` (the point at which pressure is "high").
pub fn pressure_level(usage_ratio: f64, threshold: f64) -> PressureLevel {
    if usage_ratio >= threshold * 1.125 {
        PressureLevel::Critical
    } else if usage_ratio >= threshold {
        PressureLevel::High
    } else if usage_ratio >= threshold * 0.75 {
        PressureLevel::Medium
    } else {
        PressureLevel::Low
    }
}

/// A page of arbitrary content tracked by the memory manager.
struct TrackedPage {
    size_mb: f64,
    last_access: Instant,
    data: Arc<Vec<u8>>,
}

struct ManagerInner {
    pages: HashMap<u64, TrackedPage>,
}

/// Page size class, selecting which [`MemoryPool`] backs an allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolClass {
    Small,
    Medium,
    Large,
}

/// Tracks process memory pressure and page lifetimes, and backs page
/// allocation with three size-classed [`MemoryPool`]s.
pub struct MemoryManager {
    system: Mutex<System>,
    pid: Pid,
    threshold: f64,
    budget_bytes: u64,
    small_pool: MemoryPool,
    medium_pool: MemoryPool,
    large_pool: MemoryPool,
    inner: Mutex<ManagerInner>,
    leak_alert_count: Mutex<u32>,
}

impl std::fmt::Debug for MemoryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryManager")
            .field("threshold", &self.threshold)
            .field("budget_bytes", &self.budget_bytes)
            .field("tracked_pages", &self.inner.lock().pages.len())
            .finish()
    }
}

impl MemoryManager {
    pub fn new(
        budget_bytes: u64,
        threshold: f64,
        small_block: u64,
        medium_block: u64,
        large_block: u64,
        pool_capacity: usize,
    ) -> Self {
        let pid = Pid::from_u32(std::process::id());
        Self {
            system: Mutex::new(System::new()),
            pid,
            threshold,
            budget_bytes,
            small_pool: MemoryPool::new(small_block as usize, pool_capacity),
            medium_pool: MemoryPool::new(medium_block as usize, pool_capacity),
            large_pool: MemoryPool::new(large_block as usize, pool_capacity),
            inner: Mutex::new(ManagerInner {
                pages: HashMap::new(),
            }),
            leak_alert_count: Mutex::new(0),
        }
    }

    /// Current process resident set size, in bytes, refreshed on each call.
    pub fn current_rss(&self) -> u64 {
        let mut system = self.system.lock();
        system.refresh_process(self.pid);
        system.process(self.pid).map(|p| p.memory()).unwrap_or(0)
    }

    pub fn usage_ratio(&self) -> f64 {
        if self.budget_bytes == 0 {
            0.0
        } else {
            self.current_rss() as f64 / self.budget_bytes as f64
        }
    }

    pub fn pressure(&self) -> PressureLevel {
        pressure_level(self.usage_ratio(), self.threshold)
    }

    fn pool_for(&self, class: PoolClass) -> &MemoryPool {
        match class {
            PoolClass::Small => &self.small_pool,
            PoolClass::Medium => &self.medium_pool,
            PoolClass::Large => &self.large_pool,
        }
    }

    /// Allocates and tracks a page; returns a weak handle the caller can use
    /// to check liveness without extending the page's lifetime.
    pub fn allocate_page(&self, page: u64, size: usize, class: PoolClass) -> crate::error::Result<Weak<Vec<u8>>> {
        let (_, buf) = self.pool_for(class).allocate(size)?;
        let data = Arc::new(buf);
        let handle = Arc::downgrade(&data);
        let size_mb = size as f64 / (1024.0 * 1024.0);
        self.inner.lock().pages.insert(
            page,
            TrackedPage {
                size_mb,
                last_access: Instant::now(),
                data,
            },
        );
        Ok(handle)
    }

    pub fn touch_page(&self, page: u64) {
        if let Some(tracked) = self.inner.lock().pages.get_mut(&page) {
            tracked.last_access = Instant::now();
        }
    }

    pub fn deallocate_page(&self, page: u64) -> bool {
        self.inner.lock().pages.remove(&page).is_some()
    }

    /// Drops every tracked page idle for longer than `max_age`.
    pub fn cleanup_old(&self, max_age: Duration) -> usize {
        let mut inner = self.inner.lock();
        let before = inner.pages.len();
        inner.pages.retain(|_, p| p.last_access.elapsed() <= max_age);
        let dropped = before - inner.pages.len();
        if dropped > 0 {
            debug!(dropped, "memory manager dropped stale pages");
        }
        dropped
    }

    /// Drops the oldest half of tracked pages and aggressively reclaims
    /// pool blocks, used under critical memory pressure.
    pub fn emergency_cleanup(&self) -> usize {
        let dropped = {
            let mut inner = self.inner.lock();
            let mut ids: Vec<u64> = inner.pages.keys().copied().collect();
            ids.sort_by_key(|id| inner.pages[id].last_access);
            let n_to_drop = ids.len() / 2;
            for id in ids.into_iter().take(n_to_drop) {
                inner.pages.remove(&id);
            }
            n_to_drop
        };
        self.small_pool.cleanup(Duration::ZERO);
        self.medium_pool.cleanup(Duration::ZERO);
        self.large_pool.cleanup(Duration::ZERO);
        warn!(dropped, "memory manager performed emergency cleanup");
        dropped
    }

    /// Runs one scheduled maintenance pass, choosing the cleanup aggressiveness
    /// by current pressure level (§4.E scheduled cleanup table).
    pub fn scheduled_pass(&self) -> usize {
        match self.pressure() {
            PressureLevel::Critical => self.emergency_cleanup(),
            PressureLevel::High => self.cleanup_old(Duration::from_secs(180)),
            PressureLevel::Medium => self.cleanup_old(Duration::from_secs(300)),
            PressureLevel::Low => self.cleanup_old(Duration::from_secs(600)),
        }
    }

    /// Number of pages whose weak handle is still resolvable but which have
    /// been idle for more than 300 seconds — a heuristic indicator that a
    /// caller is holding a strong reference it no longer needs.
    pub fn suspected_leaks(&self) -> Vec<u64> {
        let inner = self.inner.lock();
        let leaks: Vec<u64> = inner
            .pages
            .iter()
            .filter(|(_, p)| {
                Arc::strong_count(&p.data) > 1 && p.last_access.elapsed() > Duration::from_secs(300)
            })
            .map(|(id, _)| *id)
            .collect();
        if leaks.len() > 10 {
            warn!(count = leaks.len(), "suspected page leak count exceeds threshold");
            self.record_leak_alert();
        }
        leaks
    }

    pub fn tracked_page_count(&self) -> usize {
        self.inner.lock().pages.len()
    }

    pub fn tracked_mb(&self) -> f64 {
        self.inner.lock().pages.values().map(|p| p.size_mb).sum()
    }

    pub fn small_pool(&self) -> &MemoryPool {
        &self.small_pool
    }

    pub fn medium_pool(&self) -> &MemoryPool {
        &self.medium_pool
    }

    pub fn large_pool(&self) -> &MemoryPool {
        &self.large_pool
    }

    pub(crate) fn record_leak_alert(&self) -> u32 {
        let mut count = self.leak_alert_count.lock();
        *count += 1;
        info!(total = *count, "leak alert recorded");
        *count
    }
}
