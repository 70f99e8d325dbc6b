use std::borrow::Borrow;
use std::fmt;
use std::hash::Hash;
use std::ops::ControlFlow;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use quanta::Clock;
use quanta::Instant;
use tracing::debug;
use tracing::trace;

use crate::IntervalThrottleConfig;
use crate::KeyedStrategy;
use crate::LimiterError;
use crate::Reason;
use crate::time;

/// A minimum-gap throttle, keyed by identity.
///
/// Only the most recent admission per identity is remembered. An event is admitted
/// once `min_interval` has elapsed since that admission.
///
/// Entries are never dropped on their own. Configure a `retention` to have
/// admissions opportunistically sweep idle identities, or call
/// [`purge_stale`](Self::purge_stale) yourself.
pub struct IntervalThrottle<K> {
    min_interval: Duration,
    retention: Option<Duration>,
    last_admitted: DashMap<K, Instant>,
    clock: Clock,
    /// A fixed point in time to measure sweeps from.
    anchor: Instant,
    /// Nanos from anchor at which the last sweep started
    last_sweep: AtomicU64,
}

impl<K> fmt::Debug for IntervalThrottle<K>
where
    K: Hash + Eq,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntervalThrottle")
            .field("min_interval", &self.min_interval)
            .field("retention", &self.retention)
            .field("identities", &self.last_admitted.len())
            .finish()
    }
}

impl<K> Default for IntervalThrottle<K>
where
    K: Hash + Eq,
{
    fn default() -> Self {
        Self::from_parts(IntervalThrottleConfig::default(), Clock::new())
    }
}

impl<K> IntervalThrottle<K>
where
    K: Hash + Eq,
{
    /// Creates a new `IntervalThrottle` driven by the system clock.
    ///
    /// # Errors
    ///
    /// Returns [`LimiterError::InvalidConfiguration`] for a zero interval or a
    /// retention shorter than the interval.
    pub fn new(config: IntervalThrottleConfig) -> Result<Self, LimiterError> {
        Self::with_clock(config, Clock::new())
    }

    pub fn with_clock(config: IntervalThrottleConfig, clock: Clock) -> Result<Self, LimiterError> {
        config.validate()?;
        Ok(Self::from_parts(config, clock))
    }

    fn from_parts(config: IntervalThrottleConfig, clock: Clock) -> Self {
        let anchor = clock.now();
        Self {
            min_interval: config.min_interval,
            retention: config.retention,
            last_admitted: DashMap::new(),
            clock,
            anchor,
            last_sweep: AtomicU64::new(0),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    pub fn retention(&self) -> Option<Duration> {
        self.retention
    }

    pub fn len(&self) -> usize {
        self.last_admitted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_admitted.is_empty()
    }

    /// Returns `true` if `identity` has never been admitted, or was last admitted
    /// at least `min_interval` ago.
    pub fn can_send<Q>(&self, identity: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = self.clock.now();
        self.last_admitted
            .get(identity)
            .is_none_or(|last| time::elapsed(now, *last) >= self.min_interval)
    }

    pub fn record<Q>(&self, identity: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
    {
        self.process(identity).is_continue()
    }

    /// Decide and commit one event for `identity` under a single shard lock.
    pub fn process<Q>(&self, identity: &Q) -> ControlFlow<Reason>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
    {
        let now = self.clock.now();

        let outcome = match self.last_admitted.get_mut(identity) {
            Some(mut last) => self.admit(&mut last, now),
            None => match self.last_admitted.entry(identity.to_owned()) {
                Entry::Occupied(mut occupied) => self.admit(occupied.get_mut(), now),
                Entry::Vacant(vacant) => {
                    vacant.insert(now);
                    trace!("throttle admitted first event");
                    ControlFlow::Continue(())
                }
            },
        };

        if outcome.is_continue() {
            self.maybe_sweep(now);
        }
        outcome
    }

    /// Remaining gap before `identity` may be admitted again.
    pub fn time_until_next_allowed<Q>(&self, identity: &Q) -> Duration
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let Some(last) = self.last_admitted.get(identity) else {
            return Duration::ZERO;
        };
        let now = self.clock.now();
        time::remaining(self.min_interval, time::elapsed(now, *last))
    }

    pub fn reset<Q>(&self, identity: &Q)
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.last_admitted.remove(identity);
    }

    pub fn clear(&self) {
        self.last_admitted.clear();
    }

    /// Drop identities idle for at least the retention period (or `min_interval`
    /// when no retention is configured).
    ///
    /// A dropped identity is admitted immediately, exactly as it would have been
    /// had it been kept, so purging never changes any answer.
    ///
    /// Returns the number of identities dropped.
    pub fn purge_stale(&self) -> usize {
        let now = self.clock.now();
        self.purge_older_than(now, self.retention.unwrap_or(self.min_interval))
    }

    fn purge_older_than(&self, now: Instant, age: Duration) -> usize {
        let mut purged = 0;
        self.last_admitted.retain(|_, last| {
            let keep = time::elapsed(now, *last) < age;
            if !keep {
                purged += 1;
            }
            keep
        });
        debug!(
            purged,
            remaining = self.last_admitted.len(),
            "throttle purged stale identities"
        );
        purged
    }

    fn admit(&self, last: &mut Instant, now: Instant) -> ControlFlow<Reason> {
        let elapsed = time::elapsed(now, *last);
        if elapsed >= self.min_interval {
            *last = now;
            trace!(?elapsed, "throttle admitted event");
            ControlFlow::Continue(())
        } else {
            let retry_after = time::remaining(self.min_interval, elapsed);
            trace!(?retry_after, "throttle rejected event");
            ControlFlow::Break(Reason::Overloaded { retry_after })
        }
    }

    /// Sweep at most once per retention period, and only from one caller.
    ///
    /// Must not be called while holding a reference into the map.
    fn maybe_sweep(&self, now: Instant) {
        let Some(retention) = self.retention else {
            return;
        };
        let now_ns = time::nanos(time::elapsed(now, self.anchor));
        let last_sweep = self.last_sweep.load(Ordering::Acquire);

        if now_ns.saturating_sub(last_sweep) < time::nanos(retention) {
            return;
        }
        if self
            .last_sweep
            .compare_exchange(last_sweep, now_ns, Ordering::SeqCst, Ordering::Relaxed)
            .is_ok()
        {
            self.purge_older_than(now, retention);
        }
    }
}

impl<K, Q> KeyedStrategy<Q> for IntervalThrottle<K>
where
    K: Borrow<Q> + Hash + Eq,
    Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
{
    fn can_send(&self, identity: &Q) -> bool {
        IntervalThrottle::can_send(self, identity)
    }

    fn process(&self, identity: &Q) -> ControlFlow<Reason> {
        IntervalThrottle::process(self, identity)
    }

    fn time_until_next_allowed(&self, identity: &Q) -> Duration {
        IntervalThrottle::time_until_next_allowed(self, identity)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use more_asserts::assert_ge;
    use quanta::Mock;

    use super::*;

    fn throttle(config: IntervalThrottleConfig) -> (IntervalThrottle<String>, Arc<Mock>) {
        let (clock, mock) = Clock::mock();
        (IntervalThrottle::with_clock(config, clock).unwrap(), mock)
    }

    fn ten_seconds() -> IntervalThrottleConfig {
        IntervalThrottleConfig::new(Duration::from_secs(10))
    }

    #[test]
    fn it_enforces_the_minimum_gap() {
        let (rl, mock) = throttle(ten_seconds());

        assert!(rl.record("u1"));

        mock.increment(Duration::from_millis(9900));
        assert!(!rl.record("u1"));
        assert_eq!(rl.time_until_next_allowed("u1"), Duration::from_millis(100));

        mock.increment(Duration::from_millis(100));
        assert!(rl.record("u1"), "exactly min_interval later is allowed");
    }

    #[test]
    fn it_admits_unknown_identities_immediately() {
        let (rl, _mock) = throttle(ten_seconds());

        assert!(rl.can_send("nobody"));
        assert_eq!(rl.time_until_next_allowed("nobody"), Duration::ZERO);
        assert!(rl.is_empty(), "queries must not create entries");
    }

    #[test]
    fn it_does_not_extend_the_gap_on_denial() {
        let (rl, mock) = throttle(ten_seconds());

        assert!(rl.record("u1"));
        for _ in 0..9 {
            mock.increment(Duration::from_secs(1));
            assert!(!rl.record("u1"));
        }
        mock.increment(Duration::from_secs(1));
        assert!(rl.record("u1"));
    }

    #[test]
    fn it_keeps_separated_admissions() {
        let (rl, mock) = throttle(IntervalThrottleConfig::new(Duration::from_millis(1500)));

        let mut admitted = vec![];
        for step in 0..100u64 {
            if rl.record("u1") {
                admitted.push(step * 200);
            }
            mock.increment(Duration::from_millis(200));
        }

        assert!(admitted.len() > 1);
        for pair in admitted.windows(2) {
            assert_ge!(pair[1] - pair[0], 1500);
        }
    }

    #[test]
    fn it_keeps_identities_independent() {
        let (rl, mock) = throttle(ten_seconds());

        assert!(rl.record("u1"));
        mock.increment(Duration::from_secs(3));
        assert!(rl.record("u2"));

        assert_eq!(rl.time_until_next_allowed("u1"), Duration::from_secs(7));
        assert_eq!(rl.time_until_next_allowed("u2"), Duration::from_secs(10));
    }

    #[test]
    fn it_floors_the_wait_at_zero() {
        let (rl, mock) = throttle(ten_seconds());

        assert!(rl.record("u1"));
        mock.increment(Duration::from_secs(60));
        assert_eq!(rl.time_until_next_allowed("u1"), Duration::ZERO);
        assert!(rl.can_send("u1"));
    }

    #[test]
    fn it_never_evicts_without_retention() {
        let (rl, mock) = throttle(ten_seconds());

        for id in 0..50 {
            mock.increment(Duration::from_secs(30));
            assert!(rl.record(&format!("user-{id}")));
        }
        assert_eq!(rl.len(), 50);

        // An explicit purge only drops identities that are no longer throttled
        assert_eq!(rl.purge_stale(), 49);
        assert!(!rl.can_send("user-49"));
    }

    #[test]
    fn it_sweeps_opportunistically_with_retention() {
        let (rl, mock) = throttle(ten_seconds().with_retention(Duration::from_secs(30)));

        assert!(rl.record("u1"));
        assert!(rl.record("u2"));
        mock.increment(Duration::from_secs(20));
        assert!(rl.record("u3"));
        assert_eq!(rl.len(), 3, "no sweep before a full retention period");

        mock.increment(Duration::from_secs(15));
        assert!(rl.record("u4"));
        assert_eq!(rl.len(), 2, "u1 and u2 idle for 35s are swept");
        assert!(!rl.can_send("u4"));
        assert!(rl.can_send("u1"));
    }

    #[test]
    fn it_never_sweeps_within_an_unbounded_retention() {
        let (rl, mock) = throttle(ten_seconds().with_retention(Duration::MAX));

        assert!(rl.record("u1"));
        mock.increment(Duration::from_secs(3600));
        assert!(rl.record("u2"));
        assert_eq!(rl.len(), 2);
    }

    #[test]
    fn it_reports_overload_with_retry_hint() {
        let (rl, mock) = throttle(ten_seconds());

        assert_eq!(rl.process("u1"), ControlFlow::Continue(()));
        mock.increment(Duration::from_secs(4));
        assert_eq!(
            rl.process("u1"),
            ControlFlow::Break(Reason::Overloaded {
                retry_after: Duration::from_secs(6)
            })
        );
    }

    #[test]
    fn it_rejects_invalid_configuration() {
        let (clock, _mock) = Clock::mock();
        assert!(
            IntervalThrottle::<String>::with_clock(IntervalThrottleConfig::new(Duration::ZERO), clock)
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_throttle_concurrency() {
        let (rl, _mock) = throttle(ten_seconds());
        let rl = Arc::new(rl);

        let mut handles = vec![];
        for _ in 0..64 {
            let rl_clone = Arc::clone(&rl);
            handles.push(tokio::spawn(async move { rl_clone.record("hot") }));
        }

        let results = futures::future::join_all(handles).await;
        let success_count = results.into_iter().filter(|r| matches!(r, Ok(true))).count();

        assert_eq!(success_count, 1);
    }
}
