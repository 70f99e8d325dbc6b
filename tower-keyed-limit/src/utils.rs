use std::sync::Arc;

use tower::ServiceBuilder;
use tower::layer::util::Stack;

use crate::KeyedRateLimitLayer;

/// Service Builder Extension with additional useful functions for tower::ServiceBuilder.
pub trait ServiceBuilderExt<L> {
    /// Add a per-identity rate limit layer
    fn keyed_rate_limit<R, F, K, Req>(
        self,
        limiter: Arc<R>,
        extractor: F,
    ) -> ServiceBuilder<Stack<KeyedRateLimitLayer<R, F, K>, L>>
    where
        R: ?Sized,
        F: Fn(&Req) -> K;
}

impl<L> ServiceBuilderExt<L> for ServiceBuilder<L> {
    fn keyed_rate_limit<R, F, K, Req>(
        self,
        limiter: Arc<R>,
        extractor: F,
    ) -> ServiceBuilder<Stack<KeyedRateLimitLayer<R, F, K>, L>>
    where
        R: ?Sized,
        F: Fn(&Req) -> K,
    {
        self.layer(KeyedRateLimitLayer::new(limiter, extractor))
    }
}
