//! # Tower Keyed Limit
//!
//! `tower-keyed-limit` plugs the per-identity limiters from [`keyed_limit`] into the
//! [Tower](https://github.com/tower-rs/tower) ecosystem.
//!
//! ## How it works
//!
//! [`KeyedRateLimitLayer`] is built from a shared limiter and an extractor closure that
//! maps each request to its identity (a user id, a session, a source address).
//!
//! 1. **Identity Extraction**: Each request is mapped to its identity when the service
//!    is called. Readiness is never held back by the limiter, so one noisy identity
//!    cannot stall traffic from the others.
//! 2. **Fail Fast**: A request whose identity is over its limit resolves immediately to
//!    [`LimitError::RateLimited`], carrying the `retry_after` hint. The inner service
//!    is never called for it.
//! 3. **Timeouts**: Admitted requests can be bounded with
//!    [`KeyedRateLimitLayer::with_timeout`], failing with [`LimitError::Timeout`].
//!
//! ## Feature Flags
//!
//! - `axum`: Enables `IntoResponse` for [`LimitError`], allowing automatic conversion
//!   to HTTP status codes (429, 408).

mod error;
mod layer;
mod service;
mod utils;


pub use error::LimitError;
pub use layer::KeyedRateLimitLayer;
pub use service::KeyedRateLimitService;
pub use service::ResponseFuture;
pub use utils::ServiceBuilderExt;
