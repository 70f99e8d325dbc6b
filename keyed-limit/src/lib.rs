//! # keyed-limit
//!
//! `keyed-limit` provides per-identity rate limiting for inbound message streams.
//!
//! ## Core Philosophy
//!
//! Every identity (a user, a connection, a topic) gets its own independent budget.
//! State is held in memory by the limiter instance that owns it, partitioned across
//! [`DashMap`](dashmap::DashMap) shards so that unrelated identities never contend on
//! the same lock. Deciding and committing an admission happens under a single shard
//! lock, so concurrent callers for the same identity can never jointly overrun a quota.
//!
//! ## Key Concepts
//!
//! * **Sliding Window**: [`SlidingWindowLimiter`] admits at most `max_requests`
//!   events per identity within any trailing `window_size`.
//! * **Interval Throttle**: [`IntervalThrottle`] enforces a minimum gap between
//!   consecutive admitted events per identity.
//! * **Lazy Eviction**: Expired timestamps are pruned at the moment an identity is
//!   queried. No background worker threads or timers.
//! * **Injectable Time**: All time is sampled from a [`quanta::Clock`], so tests can
//!   drive a `Clock::mock()` instead of sleeping.
//!
//! ## Example
//!
//! ```rust
//! use keyed_limit::SlidingWindowConfig;
//! use keyed_limit::SlidingWindowLimiter;
//! use std::time::Duration;
//!
//! let config = SlidingWindowConfig::new(2, Duration::from_secs(10));
//! let limiter: SlidingWindowLimiter<String> = SlidingWindowLimiter::new(config).unwrap();
//!
//! assert!(limiter.record("alice"));
//! assert!(limiter.record("alice"));
//! assert!(!limiter.record("alice"));
//! assert!(limiter.time_until_next_allowed("alice") > Duration::ZERO);
//!
//! // Other identities are unaffected
//! assert!(limiter.can_send("bob"));
//! ```

use std::fmt::Debug;
use std::ops::ControlFlow;
use std::time::Duration;

mod config;
mod error;
mod interval_throttle;
mod sliding_window;
mod time;

pub use config::IntervalThrottleConfig;
pub use config::SlidingWindowConfig;
pub use error::LimiterError;
pub use interval_throttle::IntervalThrottle;
pub use sliding_window::SlidingWindowLimiter;

/// Reasons why an event might be rejected by a strategy.
#[derive(Debug, PartialEq)]
pub enum Reason {
    Overloaded { retry_after: Duration },
}

/// The contract shared by all per-identity limiting algorithms.
///
/// `Q` is the borrowed form of the identity a caller passes in, so a limiter keyed
/// by `String` can be queried with `&str`.
pub trait KeyedStrategy<Q: ?Sized>: Debug {
    /// Returns `true` if an event for `identity` would currently be admitted.
    ///
    /// This never records an admission. It may evict expired bookkeeping.
    fn can_send(&self, identity: &Q) -> bool;

    /// Decides and commits a single event for `identity`.
    ///
    /// # Errors
    ///
    /// Returns `Reason` if the identity is over its limit. The `retry_after` hint is
    /// computed under the same lock that made the decision.
    fn process(&self, identity: &Q) -> ControlFlow<Reason>;

    /// Records an event for `identity` if it is admissible.
    ///
    /// Returns `true` on admission. A denied event leaves no trace.
    fn record(&self, identity: &Q) -> bool {
        self.process(identity).is_continue()
    }

    /// How long `identity` must wait before its next event can be admitted.
    ///
    /// Zero means an event would be admitted now.
    fn time_until_next_allowed(&self, identity: &Q) -> Duration;
}
