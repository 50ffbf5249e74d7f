pub mod feed;

use axum::Router;
use axum::http::StatusCode;
use birthcal_core::constants::SERVER_WRITE_TIMEOUT;
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Every path serves the feed.
pub fn router(state: AppState) -> Router {
    Router::new().fallback(feed::serve_feed).with_state(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(write_timeout()),
    )
}

/// Requests still unanswered after [`SERVER_WRITE_TIMEOUT`] get a 408.
fn write_timeout() -> TimeoutLayer {
    TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, SERVER_WRITE_TIMEOUT)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::get;
    use tower::ServiceExt;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_slow_handler_times_out_with_408() {
        let app = Router::new()
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(SERVER_WRITE_TIMEOUT + Duration::from_secs(1)).await;
                    "late"
                }),
            )
            .layer(write_timeout());

        let response = app
            .oneshot(Request::get("/slow").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    }
}
