//! Clocks and bounded waits.
//!
//! Every wait has a deadline. A timeout is reported as
//! [`TakeoutError::Timeout`], which callers treat as recoverable.

use crate::dom::{NodeRef, Page};
use crate::error::{Result, TakeoutError};
use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Poll interval used when the page cannot observe mutations
pub const DEFAULT_POLL: Duration = Duration::from_millis(100);

/// Source of time for waits, delays and timeouts
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;

    fn sleep(&self, duration: Duration);
}

/// Wall clock backed by `std::thread::sleep`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

type SleepHook = Box<dyn Fn(usize) + Send + Sync>;

/// Clock that only moves when slept on or advanced; records every sleep
pub struct ManualClock {
    origin: Instant,
    elapsed: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
    on_sleep: Option<SleepHook>,
}

impl std::fmt::Debug for ManualClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualClock")
            .field("elapsed", &self.elapsed())
            .field("sleeps", &self.sleeps.lock().len())
            .finish_non_exhaustive()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            elapsed: Mutex::new(Duration::ZERO),
            sleeps: Mutex::new(Vec::new()),
            on_sleep: None,
        }
    }

    /// Builder method: run `hook` after every sleep with the number of sleeps so far
    pub fn on_sleep<F>(mut self, hook: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.on_sleep = Some(Box::new(hook));
        self
    }

    /// Move time forward without recording a sleep
    pub fn advance(&self, duration: Duration) {
        *self.elapsed.lock() += duration;
    }

    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock()
    }

    /// Every duration passed to [`Clock::sleep`], in order
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().clone()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + *self.elapsed.lock()
    }

    fn sleep(&self, duration: Duration) {
        let count = {
            let mut sleeps = self.sleeps.lock();
            sleeps.push(duration);
            sleeps.len()
        };
        self.advance(duration);
        if let Some(hook) = &self.on_sleep {
            hook(count);
        }
    }
}

/// Call `probe` until it yields a value or `timeout` passes.
///
/// `probe` runs at least once, even with a zero timeout.
pub fn wait_until<T>(
    clock: &dyn Clock,
    timeout: Duration,
    poll: Duration,
    what: &str,
    mut probe: impl FnMut() -> Result<Option<T>>,
) -> Result<T> {
    let deadline = clock.now() + timeout;
    loop {
        if let Some(value) = probe()? {
            return Ok(value);
        }
        let now = clock.now();
        if now >= deadline {
            return Err(TakeoutError::timeout(what, timeout));
        }
        clock.sleep(poll.min(deadline.saturating_duration_since(now)));
    }
}

/// Wait for `selector` under `scope`.
///
/// Uses the page's mutation observer when it has one, polling otherwise.
pub fn wait_for_element(
    page: &dyn Page,
    clock: &dyn Clock,
    scope: Option<&NodeRef>,
    selector: &str,
    timeout: Duration,
) -> Result<NodeRef> {
    if page.observes_mutations() {
        return page
            .wait_for_selector(scope, selector, timeout)?
            .ok_or_else(|| TakeoutError::timeout(selector, timeout));
    }
    wait_until(clock, timeout, DEFAULT_POLL, selector, || page.query(scope, selector))
}

/// Like [`wait_for_element`], but a timeout yields `None`
pub fn find_within(
    page: &dyn Page,
    clock: &dyn Clock,
    scope: Option<&NodeRef>,
    selector: &str,
    timeout: Duration,
) -> Result<Option<NodeRef>> {
    match wait_for_element(page, clock, scope, selector, timeout) {
        Ok(node) => Ok(Some(node)),
        Err(TakeoutError::Timeout { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::MemoryPage;

    #[test]
    fn test_manual_clock_records_sleeps() {
        let clock = ManualClock::new();
        let start = clock.now();
        clock.sleep(Duration::from_millis(300));
        clock.advance(Duration::from_millis(200));
        assert_eq!(clock.now() - start, Duration::from_millis(500));
        assert_eq!(clock.sleeps(), vec![Duration::from_millis(300)]);
    }

    #[test]
    fn test_sleep_hook_sees_running_count() {
        let seen = std::sync::Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        let clock = ManualClock::new().on_sleep(move |count| log.lock().push(count));
        clock.sleep(Duration::from_millis(10));
        clock.advance(Duration::from_millis(10));
        clock.sleep(Duration::from_millis(10));
        assert_eq!(*seen.lock(), vec![1, 2]);
    }

    #[test]
    fn test_wait_until_succeeds_after_polls() {
        let clock = ManualClock::new();
        let mut calls = 0;
        let value = wait_until(&clock, Duration::from_secs(1), Duration::from_millis(50), "thing", || {
            calls += 1;
            Ok(if calls == 3 { Some(calls) } else { None })
        })
        .unwrap();
        assert_eq!(value, 3);
        assert_eq!(clock.elapsed(), Duration::from_millis(100));
    }

    #[test]
    fn test_wait_until_times_out_at_deadline() {
        let clock = ManualClock::new();
        let err = wait_until(&clock, Duration::from_millis(250), Duration::from_millis(100), "tooltip", || {
            Ok(None::<()>)
        })
        .unwrap_err();
        assert!(matches!(err, TakeoutError::Timeout { waited_ms: 250, .. }));
        assert_eq!(clock.elapsed(), Duration::from_millis(250));
    }

    #[test]
    fn test_find_within_maps_timeout_to_none() {
        let page = MemoryPage::new("<div class='present'></div>");
        let clock = ManualClock::new();
        let found = find_within(&page, &clock, None, ".present", Duration::from_secs(1)).unwrap();
        assert!(found.is_some());
        let missing = find_within(&page, &clock, None, ".absent", Duration::from_secs(1)).unwrap();
        assert!(missing.is_none());
        assert_eq!(clock.elapsed(), Duration::from_secs(1));
    }
}
