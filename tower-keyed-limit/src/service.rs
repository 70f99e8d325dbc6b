use std::any::type_name;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::ops::ControlFlow;
use std::pin::Pin;
use std::sync::Arc;
use std::task::Context;
use std::task::Poll;
use std::time::Duration;

use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry::metrics::Counter;
use pin_project_lite::pin_project;
use tokio::time::Timeout;
use tokio::time::timeout;
use tower::BoxError;
use tower::Service;
use tracing::debug;

use keyed_limit::KeyedStrategy;
use keyed_limit::Reason;

use crate::error::LimitError;

#[derive(Clone, Debug)]
struct KeyedRateLimitMetrics {
    admitted: Counter<u64>,
    rejected: Counter<u64>,
    attributes: [KeyValue; 1],
}

/// Rate limits requests per identity, rejecting over-limit requests immediately.
///
/// The identity is extracted from each request in `call`, so readiness is never
/// held back by the limiter: `poll_ready` only reflects the inner service.
pub struct KeyedRateLimitService<L, F, K, S>
where
    L: ?Sized,
{
    inner: S,
    limiter: Arc<L>,
    extractor: F,
    timeout: Option<Duration>,
    instruments: KeyedRateLimitMetrics,
    _identity: PhantomData<fn() -> K>,
}

pin_project! {
    /// Response future of [`KeyedRateLimitService`].
    pub struct ResponseFuture<F> {
        #[pin]
        kind: Kind<F>,
    }
}

pin_project! {
    #[project = KindProj]
    enum Kind<F> {
        Admitted {
            #[pin]
            future: F,
        },
        Timed {
            #[pin]
            future: Timeout<F>,
        },
        Rejected {
            error: LimitError,
        },
    }
}

impl<F> ResponseFuture<F> {
    fn admitted(future: F) -> Self {
        Self {
            kind: Kind::Admitted { future },
        }
    }

    fn timed(future: Timeout<F>) -> Self {
        Self {
            kind: Kind::Timed { future },
        }
    }

    fn rejected(error: LimitError) -> Self {
        Self {
            kind: Kind::Rejected { error },
        }
    }
}

impl<F, T> Future for ResponseFuture<F>
where
    F: Future<Output = Result<T, BoxError>>,
{
    type Output = Result<T, BoxError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.project().kind.project() {
            KindProj::Admitted { future } => future.poll(cx),
            KindProj::Timed { future } => match future.poll(cx) {
                Poll::Ready(Ok(res)) => Poll::Ready(res),
                Poll::Ready(Err(_)) => Poll::Ready(Err(Box::new(LimitError::Timeout))),
                Poll::Pending => Poll::Pending,
            },
            KindProj::Rejected { error } => Poll::Ready(Err(Box::new(error.clone()))),
        }
    }
}

// Manually implement Clone so that neither the limiter nor the identity type need to be Clone
impl<L, F, K, S> Clone for KeyedRateLimitService<L, F, K, S>
where
    L: ?Sized,
    F: Clone,
    S: Clone,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            limiter: Arc::clone(&self.limiter),
            extractor: self.extractor.clone(),
            timeout: self.timeout,
            instruments: self.instruments.clone(),
            _identity: PhantomData,
        }
    }
}

impl<L, F, K, S> fmt::Debug for KeyedRateLimitService<L, F, K, S>
where
    L: fmt::Debug + ?Sized,
    S: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedRateLimitService")
            .field("inner", &self.inner)
            .field("limiter", &self.limiter)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl<L, F, K, S, Req> Service<Req> for KeyedRateLimitService<L, F, K, S>
where
    L: KeyedStrategy<K> + ?Sized,
    F: Fn(&Req) -> K,
    S: Service<Req, Error = BoxError>,
{
    type Response = S::Response;
    type Error = BoxError;
    type Future = ResponseFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let identity = (self.extractor)(&req);

        match self.limiter.process(&identity) {
            ControlFlow::Continue(()) => {
                self.instruments
                    .admitted
                    .add(1, &self.instruments.attributes);
                let future = self.inner.call(req);
                match self.timeout {
                    Some(limit) => ResponseFuture::timed(timeout(limit, future)),
                    None => ResponseFuture::admitted(future),
                }
            }
            ControlFlow::Break(Reason::Overloaded { retry_after }) => {
                self.instruments
                    .rejected
                    .add(1, &self.instruments.attributes);
                debug!(?retry_after, "keyed rate limit rejected request");
                ResponseFuture::rejected(LimitError::RateLimited { retry_after })
            }
        }
    }
}

impl<L, F, K, S> KeyedRateLimitService<L, F, K, S>
where
    L: ?Sized,
{
    pub fn new<Req>(inner: S, limiter: Arc<L>, extractor: F) -> Self
    where
        F: Fn(&Req) -> K,
    {
        Self::from_parts(inner, limiter, extractor)
    }

    pub(crate) fn from_parts(inner: S, limiter: Arc<L>, extractor: F) -> Self {
        let meter = global::meter("keyed_rate_limit_service");
        let instruments = KeyedRateLimitMetrics {
            admitted: meter.u64_counter("admitted").build(),
            rejected: meter.u64_counter("rejected").build(),
            attributes: [KeyValue::new("strategy", type_name::<L>())],
        };

        Self {
            inner,
            limiter,
            extractor,
            timeout: None,
            instruments,
            _identity: PhantomData,
        }
    }

    /// Bound the time an admitted request may spend in the inner service.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn limiter(&self) -> &Arc<L> {
        &self.limiter
    }
}
