//! HTTP metrics middleware for recording request/response metrics

use std::time::Instant;

use axum::{
    body::Body,
    extract::MatchedPath,
    http::Request,
    middleware::Next,
    response::Response,
};

use crate::infrastructure::observability::record_http_request;

/// Middleware to record HTTP request metrics
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = extract_path(&request);

    let response = next.run(request).await;

    let duration = start.elapsed();
    let status = response.status().as_u16();

    record_http_request(method.as_str(), &path, status, duration);

    response
}

fn extract_path(request: &Request<Body>) -> String {
    request
        .extensions()
        .get::<MatchedPath>()
        .map(|mp| mp.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string())
}

#[cfg(test)]
mod tests {
    use axum::{http::StatusCode, middleware, routing::get, Router};
    use tower::ServiceExt;

    use super::*;

    fn request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[test]
    fn test_extract_path_falls_back_to_uri() {
        assert_eq!(extract_path(&request("/v1/chats/c1/state")), "/v1/chats/c1/state");
    }

    #[tokio::test]
    async fn test_middleware_passes_response_through() {
        let app = Router::new()
            .route("/v1/chats/{chat_id}/state", get(|| async { StatusCode::NO_CONTENT }))
            .layer(middleware::from_fn(metrics_middleware));

        let response = app.oneshot(request("/v1/chats/c1/state")).await.unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }
}
