use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{info, info_span, Instrument};

use super::ApiError;

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Runs the rest of the stack inside a span tagged with a fresh request id.
pub async fn request_span(request: Request, next: Next) -> Response {
    let request_id = NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed);
    let span = info_span!(
        "request",
        request_id,
        method = %request.method(),
        path = %request.uri().path(),
    );
    async move {
        let response = next.run(request).await;
        info!(status = response.status().as_u16(), "request completed");
        response
    }
    .instrument(span)
    .await
}

pub async fn timeout(State(limit): State<Duration>, request: Request, next: Next) -> Response {
    match tokio::time::timeout(limit, next.run(request)).await {
        Ok(response) => response,
        Err(_) => ApiError::Timeout.into_response(),
    }
}

#[tokio::test]
async fn test_slow_request_times_out() {
    use axum::{middleware::from_fn_with_state, routing::get, Router};

    let router = Router::new()
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                "done"
            }),
        )
        .layer(from_fn_with_state(Duration::from_millis(50), timeout));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    let resp = reqwest::get(format!("http://{addr}/slow")).await.unwrap();
    assert_eq!(resp.status().as_u16(), 408);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "request timed out");
}
