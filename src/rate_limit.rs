use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(334);
pub const KEGG_HOST: &str = "rest.kegg.jp";
pub const KEGG_MIN_INTERVAL: Duration = Duration::from_millis(100);

/// Completion time of the last request to one host.
type HostSlot = Arc<Mutex<Option<Instant>>>;

/// Enforces a minimum gap between requests to the same host.
///
/// The gap is measured from the moment the previous request to that host
/// finished, so two completions are never closer than the host's interval.
/// [`RateLimiter::throttle`] holds the host's slot for the whole request, so
/// threads sharing one limiter take turns per host while other hosts proceed.
/// State is process-local; separate processes do not coordinate.
#[derive(Debug)]
pub struct RateLimiter {
    default_interval: Duration,
    overrides: HashMap<String, Duration>,
    hosts: Mutex<HashMap<String, HostSlot>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl RateLimiter {
    pub fn new(default_interval: Duration) -> Self {
        Self {
            default_interval,
            overrides: HashMap::new(),
            hosts: Mutex::new(HashMap::new()),
        }
    }

    /// Limiter with the per-host intervals the public APIs ask for.
    pub fn with_defaults(default_interval: Duration) -> Self {
        Self::new(default_interval).with_host_interval(KEGG_HOST, KEGG_MIN_INTERVAL)
    }

    pub fn with_host_interval(mut self, host: &str, interval: Duration) -> Self {
        self.overrides.insert(host.to_ascii_lowercase(), interval);
        self
    }

    pub fn interval_for(&self, host: &str) -> Duration {
        self.overrides
            .get(&host.to_ascii_lowercase())
            .copied()
            .unwrap_or(self.default_interval)
    }

    fn slot(&self, host: &str) -> HostSlot {
        lock(&self.hosts)
            .entry(host.to_ascii_lowercase())
            .or_default()
            .clone()
    }

    fn pause(&self, host: &str, last: Option<Instant>) -> Duration {
        let Some(last) = last else {
            return Duration::ZERO;
        };
        let interval = self.interval_for(host);
        let elapsed = last.elapsed();
        if elapsed >= interval {
            return Duration::ZERO;
        }
        let delay = interval - elapsed;
        tracing::trace!(host, delay_ms = delay.as_millis() as u64, "rate limit wait");
        thread::sleep(delay);
        delay
    }

    /// Blocks until a request to `host` may start. Returns the time slept.
    ///
    /// Does not reserve the host; concurrent callers should use `throttle`.
    pub fn wait(&self, host: &str) -> Duration {
        let last = *lock(&self.slot(host));
        self.pause(host, last)
    }

    /// Records that a request to `host` just finished.
    pub fn mark(&self, host: &str) {
        *lock(&self.slot(host)) = Some(Instant::now());
    }

    /// Runs `request` once `host`'s interval has passed, holding the host
    /// until it finishes.
    pub fn throttle<T>(&self, host: &str, request: impl FnOnce() -> T) -> T {
        let slot = self.slot(host);
        let mut last = lock(&slot);
        self.pause(host, *last);
        let result = request();
        *last = Some(Instant::now());
        result
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::with_defaults(DEFAULT_MIN_INTERVAL)
    }
}
