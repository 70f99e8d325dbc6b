use std::borrow::Borrow;
use std::collections::VecDeque;
use std::fmt;
use std::hash::Hash;
use std::ops::ControlFlow;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use quanta::Clock;
use quanta::Instant;
use tracing::debug;
use tracing::trace;

use crate::KeyedStrategy;
use crate::LimiterError;
use crate::Reason;
use crate::SlidingWindowConfig;
use crate::time;

/// A Sliding Window Log implementation, keyed by identity.
///
/// Each identity keeps the timestamps of its admitted events, oldest first. An event
/// is admitted while fewer than `max_requests` of them fall inside the trailing
/// window. Timestamps that slide out of the window are dropped from the front of the
/// log whenever the identity is queried, and an identity whose log empties is
/// forgotten, so memory is bounded by the set of recently active identities.
pub struct SlidingWindowLimiter<K> {
    window_size: Duration,
    max_requests: usize,
    /// Admission log per identity. Never holds an empty `VecDeque`.
    entries: DashMap<K, VecDeque<Instant>>,
    clock: Clock,
}

impl<K> fmt::Debug for SlidingWindowLimiter<K>
where
    K: Hash + Eq,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlidingWindowLimiter")
            .field("window_size", &self.window_size)
            .field("max_requests", &self.max_requests)
            .field("identities", &self.entries.len())
            .finish()
    }
}

impl<K> Default for SlidingWindowLimiter<K>
where
    K: Hash + Eq,
{
    fn default() -> Self {
        let config = SlidingWindowConfig::default();
        Self {
            window_size: config.window_size,
            max_requests: config.max_requests,
            entries: DashMap::new(),
            clock: Clock::new(),
        }
    }
}

/// Drop every timestamp that has slid out of the window.
///
/// The log is time ordered, so this only ever removes a prefix and stops at the
/// first entry still inside the window.
fn prune(log: &mut VecDeque<Instant>, now: Instant, window_size: Duration) {
    while let Some(&oldest) = log.front() {
        if time::elapsed(now, oldest) > window_size {
            log.pop_front();
        } else {
            break;
        }
    }
}

impl<K> SlidingWindowLimiter<K>
where
    K: Hash + Eq,
{
    /// Creates a new `SlidingWindowLimiter` driven by the system clock.
    ///
    /// # Errors
    ///
    /// Returns [`LimiterError::InvalidConfiguration`] for a zero window or quota.
    pub fn new(config: SlidingWindowConfig) -> Result<Self, LimiterError> {
        Self::with_clock(config, Clock::new())
    }

    /// Creates a new `SlidingWindowLimiter` which samples time from `clock`.
    pub fn with_clock(config: SlidingWindowConfig, clock: Clock) -> Result<Self, LimiterError> {
        config.validate()?;
        Ok(Self {
            window_size: config.window_size,
            max_requests: config.max_requests,
            entries: DashMap::new(),
            clock,
        })
    }

    pub fn window_size(&self) -> Duration {
        self.window_size
    }

    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    /// Number of identities currently holding at least one timestamp.
    ///
    /// Identities are only pruned when touched, so this may include some whose
    /// timestamps have all expired. Call [`purge_stale`](Self::purge_stale) first for
    /// an exact count.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns `true` if `identity` has spare capacity in the current window.
    pub fn can_send<Q>(&self, identity: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = self.clock.now();
        self.inspect(identity, now, |log| log.len() < self.max_requests)
            .unwrap_or(true)
    }

    /// Records an event for `identity` if it has spare capacity.
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

        if let Some(mut log) = self.entries.get_mut(identity) {
            return self.admit(&mut log, now);
        }

        // Nothing logged yet. Another caller may have raced us here, so decide
        // again under the entry lock.
        match self.entries.entry(identity.to_owned()) {
            Entry::Occupied(mut occupied) => self.admit(occupied.get_mut(), now),
            Entry::Vacant(vacant) => {
                vacant.insert(VecDeque::from([now]));
                trace!(admitted = 1, "sliding window admitted first event");
                ControlFlow::Continue(())
            }
        }
    }

    /// How long until `identity` has capacity again. Zero if it has some now.
    pub fn time_until_next_allowed<Q>(&self, identity: &Q) -> Duration
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = self.clock.now();
        self.inspect(identity, now, |log| self.retry_after(log, now))
            .unwrap_or(Duration::ZERO)
    }

    /// Forget everything recorded for `identity`.
    pub fn reset<Q>(&self, identity: &Q)
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.remove(identity);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Prune every identity and drop those left with nothing in the window.
    ///
    /// Returns the number of identities dropped.
    pub fn purge_stale(&self) -> usize {
        let now = self.clock.now();
        let mut purged = 0;
        self.entries.retain(|_, log| {
            prune(log, now, self.window_size);
            if log.is_empty() {
                purged += 1;
                false
            } else {
                true
            }
        });
        debug!(
            purged,
            remaining = self.entries.len(),
            "sliding window purged stale identities"
        );
        purged
    }

    fn admit(&self, log: &mut VecDeque<Instant>, now: Instant) -> ControlFlow<Reason> {
        prune(log, now, self.window_size);
        if log.len() < self.max_requests {
            log.push_back(now);
            trace!(admitted = log.len(), "sliding window admitted event");
            ControlFlow::Continue(())
        } else {
            let retry_after = self.retry_after(log, now);
            trace!(?retry_after, "sliding window rejected event");
            ControlFlow::Break(Reason::Overloaded { retry_after })
        }
    }

    /// Wait until the oldest logged event leaves the window. Expects a pruned log.
    fn retry_after(&self, log: &VecDeque<Instant>, now: Instant) -> Duration {
        if log.len() < self.max_requests {
            return Duration::ZERO;
        }
        match log.front() {
            // An event sitting exactly on the window edge is still counted, so a
            // full log always reports a non-zero wait.
            Some(&oldest) => time::remaining(self.window_size, time::elapsed(now, oldest))
                .max(Duration::from_nanos(1)),
            None => Duration::ZERO,
        }
    }

    /// Prune the log for `identity` and run `f` over what is left.
    ///
    /// Returns `None` if the identity has nothing in the window, removing its entry
    /// if pruning emptied it.
    fn inspect<Q, R>(
        &self,
        identity: &Q,
        now: Instant,
        f: impl FnOnce(&VecDeque<Instant>) -> R,
    ) -> Option<R>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut log = self.entries.get_mut(identity)?;
        prune(&mut log, now, self.window_size);
        if !log.is_empty() {
            return Some(f(log.value()));
        }
        // Release the shard lock before removing through the map.
        drop(log);
        self.entries.remove_if(identity, |_, log| log.is_empty());
        None
    }
}

impl<K, Q> KeyedStrategy<Q> for SlidingWindowLimiter<K>
where
    K: Borrow<Q> + Hash + Eq,
    Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
{
    fn can_send(&self, identity: &Q) -> bool {
        SlidingWindowLimiter::can_send(self, identity)
    }

    fn process(&self, identity: &Q) -> ControlFlow<Reason> {
        SlidingWindowLimiter::process(self, identity)
    }

    fn time_until_next_allowed(&self, identity: &Q) -> Duration {
        SlidingWindowLimiter::time_until_next_allowed(self, identity)
    }
}
