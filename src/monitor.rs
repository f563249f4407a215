//! Performance monitor (component G): periodic snapshots of memory and
//! metrics state, threshold-driven reactions, and trailing recommendations.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::facade::CacheFacade;
use crate::memory::{MemoryManager, PressureLevel};
use crate::metrics::MetricsStore;

/// Number of past snapshots kept for recommendation derivation.
const SNAPSHOT_HISTORY: usize = 10;

/// A point-in-time read of engine health.
#[derive(Debug, Clone, Copy)]
pub struct Snapshot {
    pub memory_pressure: PressureLevel,
    pub usage_ratio: f64,
    pub cache_hit_rate: f64,
    pub cache_utilization: f64,
    pub avg_render_ms: f64,
}

/// An action the monitor took in response to a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum OptimizationEvent {
    DroppedCacheEntries { fraction: f64 },
    DroppedStalePages,
    EmergencyCleanup,
    ReducedQualityMode,
    LoweredConcurrentRenderCap { new_cap: usize },
}

/// Reconfigurable thresholds the monitor reacts to.
#[derive(Debug, Clone, Copy)]
pub struct MonitorThresholds {
    pub render_ms_high: f64,
    pub max_concurrent_renders: usize,
}

impl Default for MonitorThresholds {
    fn default() -> Self {
        Self {
            render_ms_high: 2000.0,
            max_concurrent_renders: 4,
        }
    }
}

struct MonitorState {
    history: VecDeque<Snapshot>,
    thresholds: MonitorThresholds,
    concurrent_render_cap: usize,
    events: Vec<OptimizationEvent>,
}

/// Samples memory and metrics state, reacts to pressure, and accumulates a
/// trailing window of recommendations.
pub struct PerformanceMonitor {
    memory: Arc<MemoryManager>,
    cache: Arc<CacheFacade>,
    metrics: Arc<MetricsStore>,
    state: Mutex<MonitorState>,
}

impl std::fmt::Debug for PerformanceMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerformanceMonitor")
            .field("snapshots", &self.state.lock().history.len())
            .finish()
    }
}

impl PerformanceMonitor {
    pub fn new(memory: Arc<MemoryManager>, cache: Arc<CacheFacade>, metrics: Arc<MetricsStore>) -> Self {
        Self {
            memory,
            cache,
            metrics,
            state: Mutex::new(MonitorState {
                history: VecDeque::new(),
                thresholds: MonitorThresholds::default(),
                concurrent_render_cap: MonitorThresholds::default().max_concurrent_renders,
                events: Vec::new(),
            }),
        }
    }

    pub fn set_thresholds(&self, thresholds: MonitorThresholds) {
        self.state.lock().thresholds = thresholds;
    }

    /// Takes one sample, reacts to it, and records it into the trailing
    /// history. Returns the snapshot plus whatever optimization actions
    /// this pass took.
    pub fn sample(&self) -> (Snapshot, Vec<OptimizationEvent>) {
        let pressure = self.memory.pressure();
        let usage_ratio = self.memory.usage_ratio();
        let cache_stats = self.cache.stats();
        let avg_render_ms = self
            .metrics
            .statistics("render_duration_ms", None)
            .map(|s| s.mean)
            .unwrap_or(0.0);

        let snapshot = Snapshot {
            memory_pressure: pressure,
            usage_ratio,
            cache_hit_rate: cache_stats.hit_rate(),
            cache_utilization: self.cache.utilization(),
            avg_render_ms,
        };

        let mut events = Vec::new();
        match pressure {
            PressureLevel::High => {
                events.push(self.drop_cache_fraction(0.2));
                self.memory.cleanup_old(std::time::Duration::from_secs(180));
                events.push(OptimizationEvent::DroppedStalePages);
            }
            PressureLevel::Critical => {
                events.push(self.drop_cache_fraction(0.5));
                self.memory.emergency_cleanup();
                events.push(OptimizationEvent::EmergencyCleanup);
            }
            _ => {}
        }

        let thresholds = self.state.lock().thresholds;
        if avg_render_ms > thresholds.render_ms_high {
            events.push(OptimizationEvent::ReducedQualityMode);
            let mut state = self.state.lock();
            let new_cap = (state.concurrent_render_cap / 2).max(1);
            state.concurrent_render_cap = new_cap;
            events.push(OptimizationEvent::LoweredConcurrentRenderCap { new_cap });
        }

        if !events.is_empty() {
            warn!(?pressure, events = events.len(), "performance monitor took corrective action");
        } else {
            info!(?pressure, "performance monitor sampled healthy state");
        }

        let mut state = self.state.lock();
        state.history.push_back(snapshot);
        while state.history.len() > SNAPSHOT_HISTORY {
            state.history.pop_front();
        }
        state.events.extend(events.clone());

        (snapshot, events)
    }

    fn drop_cache_fraction(&self, fraction: f64) -> OptimizationEvent {
        self.cache.clear(fraction);
        OptimizationEvent::DroppedCacheEntries { fraction }
    }

    pub fn current_concurrent_render_cap(&self) -> usize {
        self.state.lock().concurrent_render_cap
    }

    /// Recommendations synthesized from the trailing snapshot window.
    pub fn recommendations(&self) -> Vec<String> {
        let state = self.state.lock();
        let mut recs = Vec::new();
        if state.history.is_empty() {
            return recs;
        }

        let avg_hit_rate: f64 =
            state.history.iter().map(|s| s.cache_hit_rate).sum::<f64>() / state.history.len() as f64;
        if avg_hit_rate < 0.5 {
            recs.push("cache hit rate is low; consider increasing cache_size_mb".to_string());
        }

        let high_pressure_count = state
            .history
            .iter()
            .filter(|s| s.memory_pressure >= PressureLevel::High)
            .count();
        if high_pressure_count as f64 / state.history.len() as f64 > 0.5 {
            recs.push("memory pressure is frequently high; consider lowering memory_pressure_threshold or raising the process budget".to_string());
        }

        let avg_render_ms: f64 =
            state.history.iter().map(|s| s.avg_render_ms).sum::<f64>() / state.history.len() as f64;
        if avg_render_ms > state.thresholds.render_ms_high {
            recs.push("render latency is consistently above threshold; consider reducing concurrent render cap or output quality".to_string());
        }

        recs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> PerformanceMonitor {
        let memory = Arc::new(MemoryManager::new(1024 * 1024 * 1024, 0.8, 1024, 4096, 16384, 8));
        let cache = Arc::new(CacheFacade::new(1_000_000, None, 10, 5));
        let metrics = Arc::new(MetricsStore::new());
        PerformanceMonitor::new(memory, cache, metrics)
    }

    #[test]
    fn sample_with_no_pressure_takes_no_action() {
        let monitor = monitor();
        let (_snapshot, events) = monitor.sample();
        assert!(events.is_empty());
    }

    #[test]
    fn recommendations_empty_before_any_sample() {
        let monitor = monitor();
        assert!(monitor.recommendations().is_empty());
    }

    #[test]
    fn history_is_bounded_to_ten_snapshots() {
        let monitor = monitor();
        for _ in 0..15 {
            monitor.sample();
        }
        assert_eq!(monitor.state.lock().history.len(), SNAPSHOT_HISTORY);
    }

    #[test]
    fn thresholds_are_reconfigurable_at_runtime() {
        let monitor = monitor();
        monitor.set_thresholds(MonitorThresholds {
            render_ms_high: 1.0,
            max_concurrent_renders: 2,
        });
        assert_eq!(monitor.state.lock().thresholds.render_ms_high, 1.0);
    }
}
