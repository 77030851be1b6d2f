use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Past this many tracked clients, idle entries are dropped, at most once per
/// window.
const PRUNE_THRESHOLD: usize = 10_000;

/// Sliding-window request limiter keyed by client address.
///
/// A hit is recorded only when it is allowed, so rejected attempts do not
/// extend the lockout.
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    max_hits: usize,
    window: Duration,
    state: Mutex<WindowState>,
}

#[derive(Debug, Default)]
struct WindowState {
    hits: HashMap<String, VecDeque<Instant>>,
    last_pruned: Option<Instant>,
}

impl WindowState {
    fn prune_due(&self, now: Instant, window: Duration) -> bool {
        self.hits.len() > PRUNE_THRESHOLD
            && self
                .last_pruned
                .map_or(true, |last| now.duration_since(last) >= window)
    }
}

impl SlidingWindowLimiter {
    pub fn new(max_hits: usize, window: Duration) -> Self {
        Self {
            max_hits,
            window,
            state: Mutex::new(WindowState::default()),
        }
    }

    /// 100 requests per 15 minutes, applied to every endpoint.
    pub fn general() -> Self {
        Self::new(100, Duration::from_secs(15 * 60))
    }

    /// 5 contact form submissions per hour.
    pub fn contact_form() -> Self {
        Self::new(5, Duration::from_secs(60 * 60))
    }

    pub fn max_hits(&self) -> usize {
        self.max_hits
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record a hit for `key` if it is under the limit. Returns whether the
    /// request may proceed.
    pub fn check(&self, key: &str) -> bool {
        self.check_at(key, Instant::now())
    }

    #[cfg(test)]
    fn tracked_clients(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .hits
            .len()
    }

    fn check_at(&self, key: &str, now: Instant) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        if state.prune_due(now, self.window) {
            let window = self.window;
            state.hits.retain(|_, times| {
                times
                    .back()
                    .is_some_and(|last| now.duration_since(*last) < window)
            });
            state.last_pruned = Some(now);
        }

        let times = state.hits.entry(key.to_string()).or_default();
        while times
            .front()
            .is_some_and(|first| now.duration_since(*first) >= self.window)
        {
            times.pop_front();
        }

        if times.len() >= self.max_hits {
            return false;
        }

        times.push_back(now);
        true
    }
}
