//! Offline cache integration tests
//!
//! Tests the cache fallback including:
//! - Cache hits without network access
//! - Write-back after a network load
//! - Per-kind offline switches
//! - Cache failures falling through to the network

mod common;

use std::sync::Arc;

use bytes::Bytes;
use common::*;
use resource_loader::cache::{CacheGateway, FilesystemCache, FilesystemCacheConfig};
use resource_loader::config::CacheConfig;
use resource_loader::loader::{LoadOptions, ResourceKind, ResourceSource};
use resource_loader::transport::Payload;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Helper function to create a filesystem cache in a temp dir
fn create_test_cache(temp_dir: &TempDir, textures_offline: bool) -> Arc<FilesystemCache> {
    let config = FilesystemCacheConfig::from(&CacheConfig {
        enabled: true,
        base_path: temp_dir.path().join("offline"),
        max_size_mb: 1,
        scene_offline: true,
        textures_offline,
    });
    Arc::new(FilesystemCache::new(config))
}

/// Test 1: Cache hit for "scene.json" makes zero transport calls
#[tokio::test]
async fn test_cache_hit_no_transport() {
    let transport = Arc::new(ScriptedTransport::new());
    let gateway = Arc::new(CountingGateway::new().with_entry(
        "scene.json",
        Payload::Text("{\"cached\":1}".to_string()),
    ));

    let config = test_config("https://cdn.example.com/", 3);
    let loader = create_scripted_loader(&config, transport.clone());

    let resource = loader
        .load("scene.json", LoadOptions::new().cache(gateway.clone()))
        .wait()
        .await
        .unwrap()
        .unwrap();

    assert_eq!(resource.source, ResourceSource::Cache);
    assert_eq!(resource.payload.as_text(), Some("{\"cached\":1}"));
    assert!(transport.requests().is_empty());
    assert_eq!(gateway.lookups(), 1);
    assert_eq!(gateway.stores(), 0);
}

/// Test 2: Network loads are written back and served offline next time
#[tokio::test]
async fn test_write_back_then_offline_hit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/scene.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"meshes\":[]}"))
        .expect(1)
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let cache = create_test_cache(&temp_dir, true);
    let config = test_config(&format!("{}/", server.uri()), 0);
    let loader = create_http_loader(&config);

    let first = loader
        .load("scene.json", LoadOptions::new().cache(cache.clone()))
        .wait()
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.source, ResourceSource::Transport);

    let second = loader
        .load("scene.json", LoadOptions::new().cache(cache.clone()))
        .wait()
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second.source, ResourceSource::Cache);
    assert_eq!(second.payload, first.payload);

    let stats = cache.stats().await;
    assert_eq!(stats.entries, 1);
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
}

/// Test 3: Textures bypass a cache with textures disabled
#[tokio::test]
async fn test_texture_switch_off() {
    let temp_dir = TempDir::new().unwrap();
    let cache = create_test_cache(&temp_dir, false);
    cache.open().await.unwrap();
    cache
        .store("wood.png", &Payload::Binary(Bytes::from_static(&[9, 9, 9])))
        .await
        .unwrap();

    let transport = Arc::new(ScriptedTransport::new().then_status(200, "network"));
    let config = test_config("", 0);
    let loader = create_scripted_loader(&config, transport.clone());

    let resource = loader
        .load(
            "wood.png",
            LoadOptions::new()
                .kind(ResourceKind::Texture)
                .cache(cache.clone()),
        )
        .wait()
        .await
        .unwrap()
        .unwrap();

    assert_eq!(resource.source, ResourceSource::Transport);
    assert_eq!(transport.requests(), vec!["wood.png".to_string()]);
}

/// Test 4: A cache that fails to open falls through silently
#[tokio::test]
async fn test_cache_open_failure_falls_through() {
    let gateway = Arc::new(CountingGateway::failing_open());
    let transport = Arc::new(ScriptedTransport::new().then_status(200, "network"));
    let config = test_config("", 0);
    let loader = create_scripted_loader(&config, transport);

    let resource = loader
        .load("scene.json", LoadOptions::new().cache(gateway.clone()))
        .wait()
        .await
        .unwrap()
        .unwrap();

    assert_eq!(resource.payload.as_text(), Some("network"));
    assert_eq!(gateway.lookups(), 0);
    assert_eq!(gateway.stores(), 0);
}

/// Test 5: Failed network loads are not written back
#[tokio::test]
async fn test_failed_load_not_stored() {
    let gateway = Arc::new(CountingGateway::new());
    let transport = Arc::new(ScriptedTransport::new().then_status(404, "not found"));
    let config = test_config("", 0);
    let loader = create_scripted_loader(&config, transport);

    let result = loader
        .load("scene.json", LoadOptions::new().cache(gateway.clone()))
        .wait()
        .await;

    assert!(result.is_err());
    assert_eq!(gateway.lookups(), 1);
    assert_eq!(gateway.stores(), 0);
}

/// Test 6: Cached entries survive a new cache instance
#[tokio::test]
async fn test_cache_persists_across_instances() {
    let temp_dir = TempDir::new().unwrap();
    {
        let cache = create_test_cache(&temp_dir, true);
        cache.open().await.unwrap();
        cache
            .store("scene.json", &Payload::Text("persisted".to_string()))
            .await
            .unwrap();
    }

    let transport = Arc::new(ScriptedTransport::new());
    let config = test_config("", 0);
    let loader = create_scripted_loader(&config, transport.clone());
    let cache = create_test_cache(&temp_dir, true);

    let resource = loader
        .load("scene.json", LoadOptions::new().cache(cache))
        .wait()
        .await
        .unwrap()
        .unwrap();

    assert_eq!(resource.payload.as_text(), Some("persisted"));
    assert!(transport.requests().is_empty());
}

/// Test 7: Overlapping loads of one url through a shared cache all get the full payload
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_overlapping_loads_same_url() {
    let body = vec![7u8; 512 * 1024];
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/textures/wood.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let cache = create_test_cache(&temp_dir, true);
    let config = test_config(&format!("{}/", server.uri()), 0);
    let loader = create_http_loader(&config);

    for _ in 0..4 {
        let requests: Vec<_> = (0..8)
            .map(|_| {
                loader.load(
                    "textures/wood.png",
                    LoadOptions::new()
                        .binary(true)
                        .kind(ResourceKind::Texture)
                        .cache(cache.clone()),
                )
            })
            .collect();

        for request in requests {
            let resource = request.wait().await.unwrap().unwrap();
            assert_eq!(resource.payload.as_bytes(), &body[..]);
        }
    }

    let stats = cache.stats().await;
    assert_eq!(stats.entries, 1);
    assert_eq!(stats.total_size_bytes, body.len() as u64);
}
