//! The calendar feed endpoint

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Method, StatusCode, header},
    response::{IntoResponse, Response},
};
use birthcal_core::FeedSnapshot;
use birthcal_core::constants::{
    ALLOWED_METHODS, CACHE_CONTROL_PRIVATE, MIME_TEXT_CALENDAR, RETRY_AFTER_SECONDS,
};
use chrono::DateTime;

use crate::state::AppState;

const MSG_INITIALIZING: &str = "Calendar initializing, please try again shortly.";
const MSG_METHOD_NOT_ALLOWED: &str = "Method Not Allowed";

/// GET/HEAD any path - the current feed with HTTP caching support
pub async fn serve_feed(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
) -> Response {
    if method != Method::GET && method != Method::HEAD {
        return (
            StatusCode::METHOD_NOT_ALLOWED,
            [(header::ALLOW, ALLOWED_METHODS)],
            MSG_METHOD_NOT_ALLOWED,
        )
            .into_response();
    }

    // Lock-free: either the previous or the new feed, never a mix
    let Some(snapshot) = state.cache.load() else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::RETRY_AFTER, RETRY_AFTER_SECONDS)],
            MSG_INITIALIZING,
        )
            .into_response();
    };

    let feed_headers = [
        (header::CONTENT_TYPE, MIME_TEXT_CALENDAR.to_string()),
        (header::X_CONTENT_TYPE_OPTIONS, "nosniff".to_string()),
        (header::CACHE_CONTROL, CACHE_CONTROL_PRIVATE.to_string()),
        (header::ETAG, snapshot.etag().to_string()),
        (header::LAST_MODIFIED, snapshot.last_modified_http()),
    ];

    if is_not_modified(&headers, &snapshot) {
        return (StatusCode::NOT_MODIFIED, feed_headers).into_response();
    }

    let body = if method == Method::HEAD {
        Body::empty()
    } else {
        Body::from(snapshot.data().clone())
    };

    (StatusCode::OK, feed_headers, body).into_response()
}

/// Client cache is current: same entity tag, or fetched no earlier than the last change.
fn is_not_modified(headers: &HeaderMap, snapshot: &FeedSnapshot) -> bool {
    if header_str(headers, header::IF_NONE_MATCH) == Some(snapshot.etag()) {
        return true;
    }

    header_str(headers, header::IF_MODIFIED_SINCE)
        .and_then(|since| DateTime::parse_from_rfc2822(since).ok())
        .is_some_and(|since| snapshot.last_modified() <= since)
}

fn header_str(headers: &HeaderMap, name: header::HeaderName) -> Option<&str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
