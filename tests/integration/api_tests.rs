//! API integration tests for the HTTP surface.
//!
//! Tests verify:
//! - Derivative retrieval through the router
//! - Not-found cases (unknown template, missing source, malformed paths)
//! - Error hook on store failures and handler panics
//! - Health check and CORS headers

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use bytes::Bytes;
use http_body_util::BodyExt;
use tower::ServiceExt;

use image_rack::server::ImageResponse;
use image_rack::store::MemoryStore;
use image_rack::{create_router, RouterConfig, ServeError};

use super::test_utils::{
    build_server, build_server_with, create_test_jpeg, create_test_png, dimensions, is_valid_jpeg,
    is_valid_png, Fault, FaultyStore, THUMB_SIZE,
};

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

// =============================================================================
// Derivative Retrieval
// =============================================================================

#[tokio::test]
async fn test_thumb_scenario() {
    let source = MemoryStore::new().with_blob("photos/a.png", create_test_png(64, 32));
    let cache = MemoryStore::new();
    let router = create_router(build_server(&source, &cache), RouterConfig::new());

    let response = router.oneshot(get("/thumb/photos/a.png")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "image/png");

    let length: usize = response.headers()["content-length"]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();

    let body = body_bytes(response).await;
    assert_eq!(body.len(), length);
    assert!(is_valid_png(&body));
    assert_eq!(dimensions(&body), (THUMB_SIZE, THUMB_SIZE / 2));
}

#[tokio::test]
async fn test_jpeg_source_stays_jpeg() {
    let source = MemoryStore::new().with_blob("a.jpg", create_test_jpeg(40, 40));
    let router = create_router(
        build_server(&source, &MemoryStore::new()),
        RouterConfig::new(),
    );

    let response = router.oneshot(get("/thumb/a.jpg")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "image/jpeg");
    let body = body_bytes(response).await;
    assert!(is_valid_jpeg(&body));
    assert_eq!(dimensions(&body), (THUMB_SIZE, THUMB_SIZE));
}

#[tokio::test]
async fn test_query_string_is_ignored() {
    let source = MemoryStore::new().with_blob("a.png", create_test_png(8, 8));
    let cache = MemoryStore::new();
    let router = create_router(build_server(&source, &cache), RouterConfig::new());

    let response = router.oneshot(get("/thumb/a.png?v=12")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_percent_encoded_path() {
    let source = MemoryStore::new().with_blob("my photos/a.png", create_test_png(8, 8));
    let router = create_router(
        build_server(&source, &MemoryStore::new()),
        RouterConfig::new(),
    );

    let response = router.oneshot(get("/thumb/my%20photos/a.png")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_head_request() {
    let source = MemoryStore::new().with_blob("a.png", create_test_png(8, 8));
    let router = create_router(
        build_server(&source, &MemoryStore::new()),
        RouterConfig::new(),
    );

    let request = Request::builder()
        .method(Method::HEAD)
        .uri("/thumb/a.png")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("content-length"));
    assert!(body_bytes(response).await.is_empty());
}

// =============================================================================
// Not Found
// =============================================================================

#[tokio::test]
async fn test_unknown_template_is_not_found() {
    // The source exists, but the template does not
    let source = MemoryStore::new().with_blob("photos/a.png", create_test_png(8, 8));
    let router = create_router(
        build_server(&source, &MemoryStore::new()),
        RouterConfig::new(),
    );

    let response = router.oneshot(get("/nope/photos/a.png")).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response.headers()["content-type"], "text/html");
    assert_eq!(body_bytes(response).await, "File not found");
    assert_eq!(source.stats().has, 0);
}

#[tokio::test]
async fn test_template_names_are_case_sensitive() {
    let source = MemoryStore::new().with_blob("a.png", create_test_png(8, 8));
    let router = create_router(
        build_server(&source, &MemoryStore::new()),
        RouterConfig::new(),
    );

    let response = router.oneshot(get("/THUMB/a.png")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_missing_source_is_not_found() {
    let router = create_router(
        build_server(&MemoryStore::new(), &MemoryStore::new()),
        RouterConfig::new(),
    );

    let response = router.oneshot(get("/thumb/missing.png")).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_bytes(response).await, "File not found");
}

#[tokio::test]
async fn test_malformed_paths_are_not_found() {
    let source = MemoryStore::new().with_blob("a.png", create_test_png(8, 8));
    let server = Arc::new(build_server(&source, &MemoryStore::new()));

    for uri in ["/", "/thumb", "/thumb/", "//a.png"] {
        let router = image_rack::create_shared_router(Arc::clone(&server), RouterConfig::new());
        let response = router.oneshot(get(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "uri: {}", uri);
    }
}

#[tokio::test]
async fn test_custom_not_found_hook() {
    let mut server = build_server(&MemoryStore::new(), &MemoryStore::new());
    server.set_not_found(|response: ImageResponse| {
        response
            .with_header(
                http::header::CONTENT_TYPE,
                http::HeaderValue::from_static("text/plain"),
            )
            .with_body(Bytes::from_static(b"no such image"))
    });
    let router = create_router(server, RouterConfig::new());

    let response = router.oneshot(get("/thumb/missing.png")).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response.headers()["content-type"], "text/plain");
    assert_eq!(body_bytes(response).await, "no such image");
}

// =============================================================================
// Errors
// =============================================================================

#[tokio::test]
async fn test_store_failure_uses_error_response() {
    let source = FaultyStore::new(MemoryStore::new(), Fault::Fail);
    let server = build_server_with(Arc::new(source), Arc::new(MemoryStore::new()));
    let router = create_router(server, RouterConfig::new());

    let response = router.oneshot(get("/thumb/a.png")).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.headers()["content-type"], "text/html");
    assert_eq!(
        body_bytes(response).await,
        "There has been a problem serving this request."
    );
}

#[tokio::test]
async fn test_error_hook_sees_cause() {
    let cache = FaultyStore::new(MemoryStore::new(), Fault::Fail);
    let mut server = build_server_with(Arc::new(MemoryStore::new()), Arc::new(cache));
    server.set_error(|response: ImageResponse, err: &ServeError| {
        let status = match err {
            ServeError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => response.status,
        };
        response.with_status(status)
    });
    let router = create_router(server, RouterConfig::new());

    let response = router.oneshot(get("/thumb/a.png")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_undecodable_source_is_error() {
    let source = MemoryStore::new().with_blob("a.png", &b"this is not a png"[..]);
    let cache = MemoryStore::new();
    let router = create_router(build_server(&source, &cache), RouterConfig::new());

    let response = router.oneshot(get("/thumb/a.png")).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    drop(response);
    assert!(cache.is_empty().await);
}

#[tokio::test]
async fn test_handler_panic_uses_error_hook() {
    let source = FaultyStore::new(MemoryStore::new(), Fault::Panic);
    let mut server = build_server_with(Arc::new(MemoryStore::new()), Arc::new(source));
    server.set_error(|response: ImageResponse, err: &ServeError| {
        assert!(matches!(err, ServeError::Panicked { .. }));
        response.with_status(StatusCode::SERVICE_UNAVAILABLE)
    });
    let router = create_router(server, RouterConfig::new());

    let response = router.oneshot(get("/thumb/a.png")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

// =============================================================================
// Health and CORS
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let router = create_router(
        build_server(&MemoryStore::new(), &MemoryStore::new()),
        RouterConfig::new(),
    );

    let response = router.oneshot(get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(json["status"], "healthy");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_cors_any_origin() {
    let source = MemoryStore::new().with_blob("a.png", create_test_png(4, 4));
    let router = create_router(
        build_server(&source, &MemoryStore::new()),
        RouterConfig::new(),
    );

    let request = Request::builder()
        .uri("/thumb/a.png")
        .header("origin", "https://example.com")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.headers()["access-control-allow-origin"], "*");
}

#[tokio::test]
async fn test_router_without_tracing() {
    let router = create_router(
        build_server(&MemoryStore::new(), &MemoryStore::new()),
        RouterConfig::new().with_tracing(false),
    );

    let response = router.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
