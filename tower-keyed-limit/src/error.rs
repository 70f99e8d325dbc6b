/// Errors produced by the keyed rate limit middleware.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LimitError {
    /// The request's identity is over its limit.
    ///
    /// The duration indicates when the identity may retry.
    /// When the `axum` feature is enabled, this converts to `429 Too Many Requests`
    /// with a `Retry-After` header.
    #[error("Rate limit exceeded; retry after {retry_after:?}")]
    RateLimited {
        /// The duration to wait before retrying.
        retry_after: std::time::Duration,
    },

    /// The request was admitted but the inner service exceeded the configured timeout.
    ///
    /// When the `axum` feature is enabled, this converts to `408 Request Timeout`.
    #[error("Request timed out")]
    Timeout,
}

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for LimitError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;

        let (status, msg, headers) = match self {
            Self::Timeout => (StatusCode::REQUEST_TIMEOUT, self.to_string(), None),
            Self::RateLimited { retry_after } => {
                // Round up so a client never retries early
                let secs = retry_after
                    .as_secs()
                    .saturating_add(u64::from(retry_after.subsec_nanos() > 0))
                    .max(1);
                let val = axum::http::HeaderValue::from(secs);
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    self.to_string(),
                    Some((axum::http::header::RETRY_AFTER, val)),
                )
            }
        };

        let mut response = (status, msg).into_response();
        if let Some((name, value)) = headers {
            response.headers_mut().insert(name, value);
        }
        response
    }
}

#[cfg(all(test, feature = "axum"))]
mod tests {
    use std::time::Duration;

    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    use super::*;

    #[test]
    fn it_maps_rate_limited_to_429_with_retry_after() {
        let response = LimitError::RateLimited {
            retry_after: Duration::from_millis(4200),
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(axum::http::header::RETRY_AFTER),
            Some(&axum::http::HeaderValue::from(5u64))
        );
    }

    #[test]
    fn it_maps_timeout_to_408() {
        let response = LimitError::Timeout.into_response();
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    }
}
