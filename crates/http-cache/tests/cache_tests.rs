//! Cached client against a mock upstream.

use httpmock::prelude::*;
use http_cache::{CachedClient, DiskStore, FetchError, HttpCache, MemoryStore};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

async fn disk_client(dir: &TempDir, ttl: Option<Duration>) -> CachedClient {
    let store = DiskStore::open(dir.path()).await.unwrap();
    let cache = Arc::new(HttpCache::new(Arc::new(store), ttl));
    CachedClient::new(cache, Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_identical_requests_hit_upstream_once() {
    let server = MockServer::start();
    let dir = TempDir::new().unwrap();
    let client = disk_client(&dir, Some(Duration::from_secs(3600))).await;

    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/arcgis/rest/services/Zoning/FeatureServer/0/query")
            .query_param("f", "geojson")
            .query_param("where", "1=1");
        then.status(200)
            .header("Content-Type", "application/json")
            .body(r#"{"type":"FeatureCollection","features":[]}"#);
    });

    let url = server.url("/arcgis/rest/services/Zoning/FeatureServer/0/query");
    let first = client.get(&url, &[("f", "geojson"), ("where", "1=1")]).await.unwrap();
    // Same parameters in a different order
    let second = client.get(&url, &[("where", "1=1"), ("f", "geojson")]).await.unwrap();

    assert_eq!(first, second);
    mock.assert_hits(1);
    assert_eq!(client.cache().stats().hits(), 1);
}

#[tokio::test]
async fn test_credentials_do_not_change_the_key() {
    let server = MockServer::start();
    let dir = TempDir::new().unwrap();
    let client = disk_client(&dir, None).await;

    let mock = server.mock(|when, then| {
        when.method(GET).path("/export");
        then.status(200).body("png");
    });

    let url = server.url("/export");
    client.get(&url, &[("bbox", "0,0,1,1"), ("token", "first")]).await.unwrap();
    client.get(&url, &[("bbox", "0,0,1,1"), ("token", "second")]).await.unwrap();
    mock.assert_hits(1);
}

#[tokio::test]
async fn test_concurrent_identical_misses_are_coalesced() {
    let server = MockServer::start();
    let dir = TempDir::new().unwrap();
    let client = Arc::new(disk_client(&dir, None).await);

    let mock = server.mock(|when, then| {
        when.method(GET).path("/tile/12/1153/1611.png");
        then.status(200)
            .delay(Duration::from_millis(200))
            .body("tile-bytes");
    });

    let url = server.url("/tile/12/1153/1611.png");
    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let client = client.clone();
            let url = url.clone();
            tokio::spawn(async move { client.get::<&str, &str>(&url, &[]).await })
        })
        .collect();

    for result in futures::future::join_all(tasks).await {
        assert_eq!(result.unwrap().unwrap(), bytes::Bytes::from_static(b"tile-bytes"));
    }
    mock.assert_hits(1);
}

#[tokio::test]
async fn test_upstream_errors_are_not_cached() {
    let server = MockServer::start();
    let dir = TempDir::new().unwrap();
    let client = disk_client(&dir, None).await;

    let mut failing = server.mock(|when, then| {
        when.method(GET).path("/flood");
        then.status(503);
    });

    let url = server.url("/flood");
    let err = client.get::<&str, &str>(&url, &[]).await.unwrap_err();
    assert!(matches!(err, FetchError::Status { status: 503, .. }));
    failing.assert_hits(1);
    failing.delete();

    let ok = server.mock(|when, then| {
        when.method(GET).path("/flood");
        then.status(200).body("ok");
    });
    assert_eq!(client.get::<&str, &str>(&url, &[]).await.unwrap(), "ok".as_bytes());
    ok.assert_hits(1);
}

#[tokio::test]
async fn test_expired_entries_are_refetched() {
    let server = MockServer::start();
    let dir = TempDir::new().unwrap();
    let client = disk_client(&dir, Some(Duration::ZERO)).await;

    let mock = server.mock(|when, then| {
        when.method(GET).path("/wms");
        then.status(200).body("map");
    });

    let url = server.url("/wms");
    client.get(&url, &[("REQUEST", "GetMap")]).await.unwrap();
    client.get(&url, &[("REQUEST", "GetMap")]).await.unwrap();
    mock.assert_hits(2);
}

#[tokio::test]
async fn test_post_json_body_order_is_canonical() {
    let server = MockServer::start();
    let store = Arc::new(MemoryStore::new(16));
    let client = CachedClient::new(Arc::new(HttpCache::new(store, None)), Duration::from_secs(5)).unwrap();

    let mock = server.mock(|when, then| {
        when.method(POST).path("/geocode");
        then.status(200).json_body(json!({"results": []}));
    });

    let url = server.url("/geocode");
    let headers = [("Authorization", "Bearer secret".to_string())];
    client
        .post_json(&url, &json!({"address": "123 Main St", "limit": 1}), &headers)
        .await
        .unwrap();
    client
        .post_json(&url, &json!({"limit": 1, "address": "123 Main St"}), &headers)
        .await
        .unwrap();
    mock.assert_hits(1);
}

#[tokio::test]
async fn test_cache_survives_client_restart() {
    let server = MockServer::start();
    let dir = TempDir::new().unwrap();

    let mock = server.mock(|when, then| {
        when.method(GET).path("/soils");
        then.status(200).body("soil");
    });
    let url = server.url("/soils");

    disk_client(&dir, None).await.get::<&str, &str>(&url, &[]).await.unwrap();
    let again = disk_client(&dir, None).await.get::<&str, &str>(&url, &[]).await.unwrap();

    assert_eq!(again, "soil".as_bytes());
    mock.assert_hits(1);
}

#[tokio::test]
async fn test_timeout_is_a_transport_error() {
    let server = MockServer::start();
    let cache = Arc::new(HttpCache::new(Arc::new(MemoryStore::new(4)), None));
    let client = CachedClient::new(cache, Duration::from_millis(100)).unwrap();

    server.mock(|when, then| {
        when.method(GET).path("/slow");
        then.status(200).delay(Duration::from_secs(2)).body("late");
    });

    let err = client.get::<&str, &str>(&server.url("/slow"), &[]).await.unwrap_err();
    assert!(err.is_transient());
    assert!(err.to_string().contains("timed out"));
}
