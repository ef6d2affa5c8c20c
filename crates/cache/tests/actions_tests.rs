//! Integration tests for the Actions cache store and the restore boundary.
//!
//! The cache service and blob storage are both served by wiremock; archives
//! are real tar+zstd streams.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use bcsetup_cache::{
    ActionsCacheStore, ArtifactStore, CacheKeySet, CacheRestorer, CacheService,
    CompressionMethod, Error, RestoreOutcome, StoreConfig, build_store, cache_version,
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const OBJECT: &[u8] = b"cached object";

fn tar_zst(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(zstd::Encoder::new(Vec::new(), 3).unwrap());
    for (name, data) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, *data).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

fn tar_gz(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (name, data) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, *data).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

struct Fixture {
    _temp: TempDir,
    workspace: PathBuf,
    temp_dir: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let workspace = temp.path().join("ws");
        let temp_dir = temp.path().join("runner-temp");
        std::fs::create_dir_all(&workspace).unwrap();
        Self {
            _temp: temp,
            workspace,
            temp_dir,
        }
    }

    fn cache_dir(&self) -> PathBuf {
        self.workspace.join(".buildcache")
    }

    fn store(&self, service: CacheService) -> ActionsCacheStore {
        ActionsCacheStore::new(service, "runtime-token", &self.workspace, &self.temp_dir).unwrap()
    }
}

fn key_set() -> CacheKeySet {
    CacheKeySet::new("exact-123", vec!["generic-".into()])
}

async fn serve_archive(server: &MockServer, at: &str) -> String {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(tar_zst(&[(".buildcache/c/0/object", OBJECT)])),
        )
        .mount(server)
        .await;
    format!("{}{at}", server.uri())
}

fn restored_object(workspace: &Path) -> Vec<u8> {
    std::fs::read(workspace.join(".buildcache/c/0/object")).unwrap()
}

mod v1 {
    use super::*;

    fn service(server: &MockServer) -> CacheService {
        CacheService::V1(format!("{}/", server.uri()))
    }

    #[tokio::test]
    async fn fallback_hit_unpacks_archive() {
        let server = MockServer::start().await;
        let archive_url = serve_archive(&server, "/blob/generic").await;
        Mock::given(method("GET"))
            .and(path("/_apis/artifactcache/cache"))
            .and(query_param("keys", "exact-123,generic-"))
            .and(header("authorization", "Bearer runtime-token"))
            .and(header("accept", "application/json;api-version=6.0-preview.1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "cacheKey": "generic-",
                "archiveLocation": archive_url,
            })))
            .expect(1)
            .mount(&server)
            .await;
        let fx = Fixture::new();
        let store = fx.store(service(&server));

        let outcome = CacheRestorer::new(&store)
            .restore(&key_set(), &fx.cache_dir())
            .await;

        assert_eq!(
            outcome,
            RestoreOutcome::Hit {
                matched_key: "generic-".into(),
                exact: false
            }
        );
        assert_eq!(restored_object(&fx.workspace), OBJECT);
        assert!(!fx.temp_dir.join("cache.tzst").exists());
    }

    #[tokio::test]
    async fn exact_hit_reports_exact() {
        let server = MockServer::start().await;
        let archive_url = serve_archive(&server, "/blob/exact").await;
        Mock::given(method("GET"))
            .and(path("/_apis/artifactcache/cache"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "cacheKey": "exact-123",
                "archiveLocation": archive_url,
            })))
            .mount(&server)
            .await;
        let fx = Fixture::new();
        let store = fx.store(service(&server));

        let outcome = CacheRestorer::new(&store)
            .restore(&key_set(), &fx.cache_dir())
            .await;

        assert!(matches!(outcome, RestoreOutcome::Hit { exact: true, .. }));
    }

    #[tokio::test]
    async fn no_content_is_miss() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/_apis/artifactcache/cache"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;
        let fx = Fixture::new();
        let store = fx.store(service(&server));

        let outcome = CacheRestorer::new(&store)
            .restore(&key_set(), &fx.cache_dir())
            .await;

        assert_eq!(outcome, RestoreOutcome::Miss);
        assert!(!fx.cache_dir().exists());
    }

    #[tokio::test]
    async fn server_error_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        let fx = Fixture::new();
        let store = fx.store(service(&server));

        let outcome = CacheRestorer::new(&store)
            .restore(&key_set(), &fx.cache_dir())
            .await;

        assert!(matches!(outcome, RestoreOutcome::Unavailable { .. }));
    }

    #[tokio::test]
    async fn missing_archive_is_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/_apis/artifactcache/cache"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "cacheKey": "generic-",
                "archiveLocation": format!("{}/blob/gone", server.uri()),
            })))
            .mount(&server)
            .await;
        let fx = Fixture::new();
        let store = fx.store(service(&server));

        let err = store
            .restore(&[fx.cache_dir()], &key_set().lookup_order())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Transport { .. }));
    }

    #[tokio::test]
    async fn slow_lookup_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(204).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;
        let fx = Fixture::new();
        let store = fx
            .store(service(&server))
            .with_lookup_timeout(Duration::from_millis(100));

        let outcome = CacheRestorer::new(&store)
            .restore(&key_set(), &fx.cache_dir())
            .await;

        assert!(matches!(outcome, RestoreOutcome::Unavailable { .. }));
    }

    #[tokio::test]
    async fn invalid_key_never_reaches_service() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(204))
            .expect(0)
            .mount(&server)
            .await;
        let fx = Fixture::new();
        let store = fx.store(service(&server));

        let err = store
            .restore(&[fx.cache_dir()], &["a,b".to_string()])
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InvalidKey { .. }));
    }

    #[tokio::test]
    async fn slow_archive_download_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/blob/slow"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/_apis/artifactcache/cache"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "cacheKey": "generic-",
                "archiveLocation": format!("{}/blob/slow", server.uri()),
            })))
            .mount(&server)
            .await;
        let fx = Fixture::new();
        let store = fx
            .store(service(&server))
            .with_archive_timeout(Duration::from_millis(100));

        let outcome = CacheRestorer::new(&store)
            .restore(&key_set(), &fx.cache_dir())
            .await;

        assert!(matches!(outcome, RestoreOutcome::Unavailable { .. }));
        assert!(!fx.temp_dir.join("cache.tzst").exists());
    }

    #[tokio::test]
    async fn large_archive_is_streamed_intact() {
        let object: Vec<u8> = (0..4 * 1024 * 1024_u32).map(|i| (i % 251) as u8).collect();
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/blob/large"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(tar_zst(&[(".buildcache/c/0/large", &object)])),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/_apis/artifactcache/cache"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "cacheKey": "exact-123",
                "archiveLocation": format!("{}/blob/large", server.uri()),
            })))
            .mount(&server)
            .await;
        let fx = Fixture::new();
        let store = fx.store(service(&server));

        let outcome = CacheRestorer::new(&store)
            .restore(&key_set(), &fx.cache_dir())
            .await;

        assert!(outcome.is_hit());
        assert_eq!(
            std::fs::read(fx.workspace.join(".buildcache/c/0/large")).unwrap(),
            object
        );
    }

    #[tokio::test]
    async fn entry_for_other_directory_is_miss() {
        let server = MockServer::start().await;
        let archive_url = serve_archive(&server, "/blob/generic").await;
        Mock::given(method("GET"))
            .and(path("/_apis/artifactcache/cache"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "cacheKey": "generic-",
                "archiveLocation": archive_url,
            })))
            .mount(&server)
            .await;
        let fx = Fixture::new();
        let store = fx.store(service(&server));
        let elsewhere = fx.workspace.join("elsewhere");

        let outcome = CacheRestorer::new(&store).restore(&key_set(), &elsewhere).await;

        assert_eq!(outcome, RestoreOutcome::Miss);
        assert!(!fx.cache_dir().exists());
    }
}

mod v2 {
    use super::*;

    const LOOKUP: &str =
        "/twirp/github.actions.results.api.v1.CacheService/GetCacheEntryDownloadURL";

    fn service(server: &MockServer) -> CacheService {
        CacheService::V2(format!("{}/", server.uri()))
    }

    #[tokio::test]
    async fn matched_key_is_reported() {
        let server = MockServer::start().await;
        let archive_url = serve_archive(&server, "/signed/generic").await;
        let fx = Fixture::new();
        let version = cache_version(&[fx.cache_dir()], CompressionMethod::Zstd);
        Mock::given(method("POST"))
            .and(path(LOOKUP))
            .and(header("authorization", "Bearer runtime-token"))
            .and(body_json(serde_json::json!({
                "key": "exact-123",
                "restore_keys": ["generic-"],
                "version": version,
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": true,
                "signed_download_url": archive_url,
                "matched_key": "generic-",
            })))
            .expect(1)
            .mount(&server)
            .await;
        let store = fx.store(service(&server));

        let outcome = CacheRestorer::new(&store)
            .restore(&key_set(), &fx.cache_dir())
            .await;

        assert_eq!(outcome.matched_key(), Some("generic-"));
        assert_eq!(restored_object(&fx.workspace), OBJECT);
    }

    #[tokio::test]
    async fn not_ok_is_miss() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(LOOKUP))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": false
            })))
            .mount(&server)
            .await;
        let fx = Fixture::new();
        let store = fx.store(service(&server));

        let outcome = CacheRestorer::new(&store)
            .restore(&key_set(), &fx.cache_dir())
            .await;

        assert_eq!(outcome, RestoreOutcome::Miss);
    }

    #[tokio::test]
    async fn unreachable_service_is_unavailable() {
        let fx = Fixture::new();
        let store = fx
            .store(CacheService::V2("http://127.0.0.1:9/".into()))
            .with_lookup_timeout(Duration::from_secs(2));

        let outcome = CacheRestorer::new(&store)
            .restore(&key_set(), &fx.cache_dir())
            .await;

        assert!(matches!(outcome, RestoreOutcome::Unavailable { .. }));
    }

    #[tokio::test]
    async fn gzip_runner_looks_up_gzip_entries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/signed/gzip"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(tar_gz(&[(".buildcache/c/0/object", OBJECT)])),
            )
            .mount(&server)
            .await;
        let fx = Fixture::new();
        let version = cache_version(&[fx.cache_dir()], CompressionMethod::Gzip);
        Mock::given(method("POST"))
            .and(path(LOOKUP))
            .and(body_json(serde_json::json!({
                "key": "exact-123",
                "restore_keys": ["generic-"],
                "version": version,
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": true,
                "signed_download_url": format!("{}/signed/gzip", server.uri()),
                "matched_key": "generic-",
            })))
            .expect(1)
            .mount(&server)
            .await;
        let config = StoreConfig {
            results_url: Some(format!("{}/", server.uri())),
            runtime_token: Some("runtime-token".into()),
            temp_dir: fx.temp_dir.clone(),
            ..StoreConfig::default()
        }
        .with_compression(CompressionMethod::Gzip);
        let store = build_store(&config, &fx.workspace, Duration::from_secs(5));

        let outcome = CacheRestorer::new(store.as_ref())
            .restore(&key_set(), &fx.cache_dir())
            .await;

        assert_eq!(outcome.matched_key(), Some("generic-"));
        assert_eq!(restored_object(&fx.workspace), OBJECT);
        assert!(!fx.temp_dir.join("cache.tgz").exists());
    }
}
