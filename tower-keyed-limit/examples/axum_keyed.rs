use axum::{
    Router, error_handling::HandleErrorLayer, extract::Request, http::StatusCode,
    response::IntoResponse, routing::get,
};
use keyed_limit::{SlidingWindowConfig, SlidingWindowLimiter};
use std::sync::Arc;
use std::time::Duration;
use tower::BoxError;
use tower::ServiceBuilder;
use tower_keyed_limit::{KeyedRateLimitLayer, LimitError};

/// Requests without a user header share one anonymous budget.
fn user_id(req: &Request) -> String {
    req.headers()
        .get("x-user-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("anonymous")
        .to_owned()
}

#[tokio::main]
async fn main() {
    // 1. Setup Strategy: 3 messages per user in any 10 second window
    let config = SlidingWindowConfig::new(3, Duration::from_secs(10));
    let limiter: Arc<SlidingWindowLimiter<String>> =
        Arc::new(SlidingWindowLimiter::new(config).expect("valid configuration"));

    // 2. Setup Keyed Layer
    let keyed_layer = KeyedRateLimitLayer::new(limiter, user_id).with_timeout(Duration::from_secs(2));

    // 3. Build the Router
    let app = Router::new()
        .route("/", get(|| async { "Hello, Keyed!" }))
        .layer(
            ServiceBuilder::new()
                // 1. The outermost layer: catches BoxError and returns Response
                .layer(HandleErrorLayer::new(handle_limit_error))
                // 2. The middle layer: introduces BoxError
                .layer(keyed_layer)
                // 3. Converts the Route's Infallible to BoxError for the keyed layer
                .map_err(BoxError::from),
        );

    // 4. Serve
    let listener = tokio::net::TcpListener::bind("127.0.0.1:3000")
        .await
        .unwrap();
    println!("📡 Listening on http://127.0.0.1:3000 (try: curl -H 'x-user-id: alice' ...)");

    axum::serve(listener, app).await.unwrap();
}

/// The signature must match BoxError -> IntoResponse
async fn handle_limit_error(err: BoxError) -> impl IntoResponse {
    if let Some(limit_err) = err.downcast_ref::<LimitError>() {
        limit_err.clone().into_response()
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal Service Error").into_response()
    }
}
