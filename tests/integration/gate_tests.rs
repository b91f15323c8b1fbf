//! Request engine tests, without the HTTP router.
//!
//! Tests verify:
//! - `Dispatch::send_with` delivers the response before the cache write runs
//! - Template re-registration replaces the earlier factory
//! - Route parsing (query strings, percent-encoding) as seen by the engine
//! - Hooks receive the default responses

use std::sync::{Arc, Mutex};

use axum::http::{HeaderValue, Method, StatusCode};

use image_rack::server::{ImageResponse, ResponseBody, ERROR_BODY, NOT_FOUND_BODY};
use image_rack::store::MemoryStore;
use image_rack::transform::{Fit, Grayscale};
use image_rack::{ImageRequest, ServeError};

use super::test_utils::{build_server, create_test_png, dimensions, THUMB_SIZE};

fn request(uri: &str) -> ImageRequest {
    ImageRequest::get(uri.parse().unwrap())
}

#[tokio::test]
async fn test_send_with_delivers_before_cache_write() {
    let source = MemoryStore::new().with_blob("a.png", create_test_png(8, 8));
    let cache = MemoryStore::new();
    let server = build_server(&source, &cache);

    let dispatch = server.run(&request("/thumb/a.png")).await;
    assert!(dispatch.cache_write.is_some());

    let seen_cache_len = Arc::new(Mutex::new(None));
    let observed = Arc::clone(&seen_cache_len);
    let probe = cache.clone();
    let status = dispatch
        .send_with(|response: ImageResponse| async move {
            *observed.lock().unwrap() = Some(probe.len().await);
            response.status
        })
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(*seen_cache_len.lock().unwrap(), Some(0));
    assert!(cache.peek("thumb/a.png").await.is_some());
}

#[tokio::test]
async fn test_cache_hit_has_no_cache_write() {
    let cache = MemoryStore::new().with_blob("thumb/a.png", create_test_png(8, 8));
    let server = build_server(&MemoryStore::new(), &cache);

    let dispatch = server.run(&request("/thumb/a.png")).await;

    assert_eq!(dispatch.response.status, StatusCode::OK);
    assert!(dispatch.cache_write.is_none());
    assert!(matches!(dispatch.response.body, ResponseBody::Stream(_)));
}

#[tokio::test]
async fn test_last_registration_wins() {
    let source = MemoryStore::new().with_blob("a.png", create_test_png(64, 64));
    let mut server = build_server(&source, &MemoryStore::new());
    server.set_template("thumb", || Fit::square(4)).unwrap();

    let dispatch = server.run(&request("/thumb/a.png")).await;
    let body = dispatch.response.full_body().unwrap();

    assert_eq!(dimensions(body), (4, 4));
}

#[tokio::test]
async fn test_registered_template_with_other_name() {
    let source = MemoryStore::new().with_blob("a.png", create_test_png(20, 10));
    let mut server = build_server(&source, &MemoryStore::new());
    server.set_template("grayscale", || Grayscale).unwrap();

    let dispatch = server.run(&request("/grayscale/a.png")).await;
    let body = dispatch.response.full_body().unwrap();

    assert_eq!(dimensions(body), (20, 10));
    assert_eq!(
        dispatch.cache_write.as_ref().map(|w| w.key()),
        Some("grayscale/a.png")
    );
}

#[tokio::test]
async fn test_query_and_percent_encoding() {
    let source = MemoryStore::new().with_blob("dir name/a b.png", create_test_png(32, 32));
    let server = build_server(&source, &MemoryStore::new());

    let dispatch = server
        .run(&request("/thumb/dir%20name/a%20b.png?size=large#top"))
        .await;

    assert_eq!(dispatch.response.status, StatusCode::OK);
    assert_eq!(
        dimensions(dispatch.response.full_body().unwrap()),
        (THUMB_SIZE, THUMB_SIZE)
    );
    assert_eq!(
        dispatch.cache_write.as_ref().map(|w| w.key()),
        Some("thumb/dir name/a b.png")
    );
}

#[tokio::test]
async fn test_post_is_still_served() {
    let source = MemoryStore::new().with_blob("a.png", create_test_png(8, 8));
    let server = build_server(&source, &MemoryStore::new());

    let dispatch = server
        .run(&request("/thumb/a.png").with_method(Method::POST))
        .await;

    assert_eq!(dispatch.response.status, StatusCode::OK);
}

#[tokio::test]
async fn test_default_failure_bodies() {
    let server = build_server(&MemoryStore::new(), &MemoryStore::new());

    let dispatch = server.run(&request("/thumb/missing.png")).await;
    assert_eq!(dispatch.response.status, StatusCode::NOT_FOUND);
    assert_eq!(
        dispatch.response.full_body().map(|b| &b[..]),
        Some(NOT_FOUND_BODY.as_bytes())
    );
    assert!(dispatch.cache_write.is_none());

    let source = MemoryStore::new().with_blob("broken.png", &b"garbage"[..]);
    let server = build_server(&source, &MemoryStore::new());
    let dispatch = server.run(&request("/thumb/broken.png")).await;
    assert_eq!(dispatch.response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        dispatch.response.full_body().map(|b| &b[..]),
        Some(ERROR_BODY.as_bytes())
    );
    assert!(dispatch.cache_write.is_none());
}

#[tokio::test]
async fn test_error_hook_receives_transform_error() {
    let source = MemoryStore::new().with_blob("broken.png", &b"garbage"[..]);
    let mut server = build_server(&source, &MemoryStore::new());
    let causes = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&causes);
    server.set_error(move |response: ImageResponse, err: &ServeError| {
        seen.lock().unwrap().push(err.to_string());
        response.with_header(
            http::header::HeaderName::from_static("x-failure"),
            HeaderValue::from_static("transform"),
        )
    });

    let dispatch = server.run(&request("/thumb/broken.png")).await;

    assert_eq!(dispatch.response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(dispatch.response.headers["x-failure"], "transform");
    assert_eq!(causes.lock().unwrap().len(), 1);
}
