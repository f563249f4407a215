//! Prefetch planner (component C): an access-pattern learner that produces
//! ranked prefetch candidates.
//!
//! The planner holds no references to actual page data — it only tracks,
//! per page id, a bounded FIFO of recent access timestamps and a decayed
//! weight, and uses those to predict which pages are likely to be touched
//! next. Consumers poll `queue()` for the current ranked list; nothing here
//! triggers I/O.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Decay factor applied to a page's weight on every access: `w <- w*alpha + 1`.
const ALPHA: f64 = 0.9;
/// Window, in seconds, within which a page's recent-access count contributes
/// to the "other tracked page" candidate score.
const COOCCURRENCE_WINDOW_SECS: u64 = 300;

struct PageHistory {
    recent: VecDeque<Instant>,
    weight: f64,
}

/// A scored prefetch candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub page: u64,
    pub score: f64,
}

struct PlannerInner {
    window: usize,
    max_candidates: usize,
    history: HashMap<u64, PageHistory>,
    queue: Vec<Candidate>,
}

/// Learns access patterns and predicts which pages to prefetch next.
#[derive(Debug)]
pub struct PrefetchPlanner {
    inner: Mutex<PlannerInner>,
}

impl std::fmt::Debug for PlannerInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlannerInner")
            .field("tracked_pages", &self.history.len())
            .field("queue_len", &self.queue.len())
            .finish()
    }
}

impl PrefetchPlanner {
    /// `window` bounds the FIFO of recent-access timestamps per page.
    /// `max_candidates` bounds the size of the ranked prefetch queue (N).
    pub fn new(window: usize, max_candidates: usize) -> Self {
        Self {
            inner: Mutex::new(PlannerInner {
                window,
                max_candidates,
                history: HashMap::new(),
                queue: Vec::new(),
            }),
        }
    }

    /// Records an access to `page` and rebuilds the ranked candidate queue.
    pub fn record_access(&self, page: u64) {
        let mut inner = self.inner.lock();
        let window = inner.window;
        let entry = inner
            .history
            .entry(page)
            .or_insert_with(|| PageHistory {
                recent: VecDeque::new(),
                weight: 0.0,
            });
        entry.weight = entry.weight * ALPHA + 1.0;
        entry.recent.push_back(Instant::now());
        while entry.recent.len() > window {
            entry.recent.pop_front();
        }

        inner.queue = Self::rebuild(&inner.history, page, inner.max_candidates);
    }

    fn rebuild(
        history: &HashMap<u64, PageHistory>,
        current: u64,
        max_candidates: usize,
    ) -> Vec<Candidate> {
        let mut candidates: HashMap<u64, f64> = HashMap::new();

        // Sequential successors p+1 .. p+N score 1.0.
        for offset in 1..=max_candidates as u64 {
            candidates.insert(current + offset, 1.0);
        }
        // Immediate predecessor scores 0.3, unless current is 0.
        if current > 0 {
            candidates.entry(current - 1).or_insert(0.3);
        }

        // Every other tracked page with >= 2 recent accesses within the
        // co-occurrence window contributes (recent_count/window)*0.5.
        let now = Instant::now();
        for (&page, hist) in history {
            if page == current {
                continue;
            }
            let recent_count = hist
                .recent
                .iter()
                .filter(|t| now.duration_since(**t) <= Duration::from_secs(COOCCURRENCE_WINDOW_SECS))
                .count();
            if recent_count >= 2 {
                let score = (recent_count as f64 / COOCCURRENCE_WINDOW_SECS as f64) * 0.5;
                let e = candidates.entry(page).or_insert(0.0);
                if score > *e {
                    *e = score;
                }
            }
        }

        let mut ranked: Vec<Candidate> = candidates
            .into_iter()
            .map(|(page, score)| Candidate { page, score })
            .collect();
        ranked.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.page.cmp(&b.page))
        });
        ranked.truncate(max_candidates);
        ranked
    }

    /// The current ranked prefetch queue.
    pub fn queue(&self) -> Vec<Candidate> {
        self.inner.lock().queue.clone()
    }

    /// The decayed weight tracked for `page`, or 0.0 if never seen.
    pub fn weight(&self, page: u64) -> f64 {
        self.inner
            .lock()
            .history
            .get(&page)
            .map(|h| h.weight)
            .unwrap_or(0.0)
    }

    /// Clears all learned history and the current queue.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.history.clear();
        inner.queue.clear();
    }
}
