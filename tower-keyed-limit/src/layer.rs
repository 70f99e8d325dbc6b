use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use tower::Layer;

use crate::service::KeyedRateLimitService;

/// Applies a per-identity rate limit to requests.
///
/// `extractor` maps each request to the identity it is limited under. Every service
/// produced by the layer shares the same limiter, so clones compete for the same
/// per-identity budgets.
#[derive(Debug)]
pub struct KeyedRateLimitLayer<L, F, K>
where
    L: ?Sized,
{
    limiter: Arc<L>,
    extractor: F,
    timeout: Option<Duration>,
    _identity: PhantomData<fn() -> K>,
}

impl<L, F, K> Clone for KeyedRateLimitLayer<L, F, K>
where
    L: ?Sized,
    F: Clone,
{
    fn clone(&self) -> Self {
        Self {
            limiter: Arc::clone(&self.limiter),
            extractor: self.extractor.clone(),
            timeout: self.timeout,
            _identity: PhantomData,
        }
    }
}

impl<L, F, K> KeyedRateLimitLayer<L, F, K>
where
    L: ?Sized,
{
    /// Create a KeyedRateLimitLayer
    pub fn new<Req>(limiter: Arc<L>, extractor: F) -> Self
    where
        F: Fn(&Req) -> K,
    {
        KeyedRateLimitLayer {
            limiter,
            extractor,
            timeout: None,
            _identity: PhantomData,
        }
    }

    /// Bound the time an admitted request may spend in the inner service.
    ///
    /// If the inner service takes longer, the request fails with
    /// `LimitError::Timeout`. Rejected requests are never delayed.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl<L, F, K, S> Layer<S> for KeyedRateLimitLayer<L, F, K>
where
    L: ?Sized,
    F: Clone,
{
    type Service = KeyedRateLimitService<L, F, K, S>;

    fn layer(&self, service: S) -> Self::Service {
        let svc = KeyedRateLimitService::from_parts(
            service,
            self.limiter.clone(),
            self.extractor.clone(),
        );
        match self.timeout {
            Some(timeout) => svc.with_timeout(timeout),
            None => svc,
        }
    }
}
