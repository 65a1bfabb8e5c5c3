// ── Keyed event coalescing ──
//
// Bursts of events sharing a key collapse into one delivery carrying the
// latest payload, emitted once the key has been quiet for the debounce
// window. Entries live in a map addressed by key; their timers live in a
// `DelayQueue` so every key runs on its own clock.

use std::collections::HashMap;
use std::future::poll_fn;
use std::hash::Hash;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio_util::time::{DelayQueue, delay_queue};

use crate::config::MAX_WAIT;

struct Entry<V> {
    payload: V,
    timer: delay_queue::Key,
}

/// Debounce buffer holding at most one pending payload per key.
pub struct EventCoalescer<K, V> {
    quiet_period: Duration,
    entries: HashMap<K, Entry<V>>,
    timers: DelayQueue<K>,
}

impl<K, V> EventCoalescer<K, V>
where
    K: Hash + Eq + Clone,
{
    /// The quiet period is capped at [`MAX_WAIT`]; the timer wheel cannot
    /// schedule further out.
    pub fn new(quiet_period: Duration) -> Self {
        Self {
            quiet_period: quiet_period.min(MAX_WAIT),
            entries: HashMap::new(),
            timers: DelayQueue::new(),
        }
    }

    /// Buffer `payload` under `key`.
    ///
    /// A pending entry for the same key has its payload replaced and its
    /// quiet period restarted; nothing is delivered early.
    pub fn absorb(&mut self, key: K, payload: V) {
        if let Some(entry) = self.entries.get_mut(&key) {
            entry.payload = payload;
            self.timers.reset(&entry.timer, self.quiet_period);
            return;
        }
        let timer = self.timers.insert(key.clone(), self.quiet_period);
        self.entries.insert(key, Entry { payload, timer });
    }

    /// Poll for the next key whose quiet period has elapsed.
    ///
    /// Returns `Ready(None)` when nothing is pending.
    pub fn poll_expired(&mut self, cx: &mut Context<'_>) -> Poll<Option<(K, V)>> {
        loop {
            let Some(expired) = std::task::ready!(self.timers.poll_expired(cx)) else {
                return Poll::Ready(None);
            };
            let key = expired.into_inner();
            if let Some(entry) = self.entries.remove(&key) {
                return Poll::Ready(Some((key, entry.payload)));
            }
        }
    }

    /// Wait for the next delivery. Resolves to `None` immediately when empty.
    pub async fn next_expired(&mut self) -> Option<(K, V)> {
        poll_fn(|cx| self.poll_expired(cx)).await
    }

    /// Drop every pending entry without delivering it.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.timers.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn quiet_period(&self) -> Duration {
        self.quiet_period
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{Instant, advance};

    const QUIET: Duration = Duration::from_millis(300);

    /// Timer wheels tick in whole milliseconds; allow one tick of slack.
    fn assert_elapsed(start: Instant, expected_ms: u64) {
        let elapsed = start.elapsed();
        assert!(
            elapsed >= Duration::from_millis(expected_ms)
                && elapsed <= Duration::from_millis(expected_ms + 2),
            "expected ~{expected_ms}ms, got {elapsed:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn burst_delivers_last_payload_once() {
        let mut coalescer = EventCoalescer::new(QUIET);
        for n in 0..5 {
            coalescer.absorb("a", n);
            advance(Duration::from_millis(50)).await;
        }

        assert_eq!(coalescer.next_expired().await, Some(("a", 4)));
        assert!(coalescer.is_empty());
        assert_eq!(coalescer.next_expired().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn new_arrival_restarts_quiet_period() {
        let mut coalescer = EventCoalescer::new(QUIET);
        let start = Instant::now();

        coalescer.absorb("/a", "first");
        advance(Duration::from_millis(50)).await;
        coalescer.absorb("/a", "second");

        let delivered = coalescer.next_expired().await;
        assert_eq!(delivered, Some(("/a", "second")));
        assert_elapsed(start, 350);
    }

    #[tokio::test(start_paused = true)]
    async fn keys_run_on_independent_timers() {
        let mut coalescer = EventCoalescer::new(QUIET);
        let start = Instant::now();

        coalescer.absorb("a", 1);
        advance(Duration::from_millis(100)).await;
        coalescer.absorb("b", 10);
        coalescer.absorb("b", 11);
        assert_eq!(coalescer.len(), 2);

        assert_eq!(coalescer.next_expired().await, Some(("a", 1)));
        assert_elapsed(start, 300);

        assert_eq!(coalescer.next_expired().await, Some(("b", 11)));
        assert_elapsed(start, 400);
    }

    #[tokio::test(start_paused = true)]
    async fn clear_discards_pending_entries() {
        let mut coalescer = EventCoalescer::new(QUIET);
        coalescer.absorb("a", 1);
        coalescer.absorb("b", 2);
        coalescer.absorb("c", 3);

        coalescer.clear();
        advance(Duration::from_secs(1)).await;

        assert!(coalescer.is_empty());
        assert_eq!(coalescer.next_expired().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_quiet_period_is_capped() {
        let mut coalescer = EventCoalescer::new(Duration::from_millis(100_000_000_000));
        assert_eq!(coalescer.quiet_period(), MAX_WAIT);

        coalescer.absorb("a", 1);
        advance(MAX_WAIT).await;
        assert_eq!(coalescer.next_expired().await, Some(("a", 1)));
    }

    #[tokio::test(start_paused = true)]
    async fn key_can_be_reused_after_delivery() {
        let mut coalescer = EventCoalescer::new(QUIET);
        coalescer.absorb("a", 1);
        assert_eq!(coalescer.next_expired().await, Some(("a", 1)));

        coalescer.absorb("a", 2);
        assert_eq!(coalescer.next_expired().await, Some(("a", 2)));
    }
}
