//! # Integration Tests for ota-api
//!
//! Drives the full router against temporary distribution directories:
//! health probes, credential checks, synchronous and background publishes,
//! task polling, update checks, lock contention, and error mapping.

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use metrics_exporter_prometheus::PrometheusBuilder;
use tempfile::TempDir;
use tower::ServiceExt;

use ota_api::registry::{hash_credential, InMemoryRegistry, RegistryEntry};
use ota_api::state::{AppConfig, AppState};
use ota_core::AppId;
use ota_dist::{ArchiveCodec, DistConfig, Distributor, ZipCodec};

const BOUNDARY: &str = "ota-test-boundary";
const PUBLISHER_KEY: &str = "pub-key";
const CONSUMER_KEY: &str = "con-key";
const OTHER_PUBLISHER_KEY: &str = "other-pub-key";

struct Harness {
    _dir: TempDir,
    app: Router,
    state: AppState,
}

fn registry() -> InMemoryRegistry {
    let registry = InMemoryRegistry::new();
    registry
        .register(RegistryEntry {
            id: AppId::new("test-ota").unwrap(),
            publisher_key_sha256: hash_credential(PUBLISHER_KEY),
            consumer_key_sha256: hash_credential(CONSUMER_KEY),
        })
        .unwrap();
    registry
        .register(RegistryEntry {
            id: AppId::new("other-app").unwrap(),
            publisher_key_sha256: hash_credential(OTHER_PUBLISHER_KEY),
            consumer_key_sha256: hash_credential("other-con-key"),
        })
        .unwrap();
    registry
}

/// Helper: build the test app over a fresh temporary directory.
fn harness_with(configure: impl FnOnce(&mut AppConfig)) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let mut dist = DistConfig::rooted_at(dir.path());
    dist.lock_wait = Duration::from_millis(50);
    let mut config = AppConfig {
        dist,
        ..AppConfig::default()
    };
    configure(&mut config);
    let distributor = Distributor::open(config.dist.clone()).unwrap();
    let state = AppState::new(config, distributor, Arc::new(registry()));
    Harness {
        _dir: dir,
        app: ota_api::app(state.clone()),
        state,
    }
}

fn harness() -> Harness {
    harness_with(|_| {})
}

/// Helper: read response body as string.
async fn body_string(response: axum::http::Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(response: axum::http::Response<Body>) -> serde_json::Value {
    serde_json::from_str(&body_string(response).await).unwrap()
}

/// Zip archive bytes holding `(path, content)` pairs.
fn bundle(files: &[(&str, &str)]) -> Vec<u8> {
    let src = tempfile::tempdir().unwrap();
    for (rel, content) in files {
        let p = src.path().join(rel);
        fs::create_dir_all(p.parent().unwrap()).unwrap();
        fs::write(p, content).unwrap();
    }
    let out = tempfile::tempdir().unwrap();
    let archive = out.path().join("bundle.zip");
    ZipCodec.compress(src.path(), &archive).unwrap();
    fs::read(&archive).unwrap()
}

fn multipart_body(version: Option<&str>, archive: Option<&[u8]>) -> Vec<u8> {
    let mut body = Vec::new();
    if let Some(version) = version {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"versionName\"\r\n\r\n{version}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some(archive) = archive {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"bundle\"; filename=\"bundle.zip\"\r\nContent-Type: application/zip\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(archive);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn publish_request(
    key: Option<&str>,
    query: &str,
    version: Option<&str>,
    archive: Option<&[u8]>,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(format!("/v1/versions{query}"))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        );
    if let Some(key) = key {
        builder = builder.header("x-publisher-key", key);
    }
    builder
        .body(Body::from(multipart_body(version, archive)))
        .unwrap()
}

fn check_request(key: &str, query: &str) -> Request<Body> {
    Request::builder()
        .uri(format!("/v1/versions/update{query}"))
        .header(header::HOST, "ota.test")
        .header("x-consumer-key", key)
        .body(Body::empty())
        .unwrap()
}

async fn publish_and_wait(h: &Harness, version: &str, files: &[(&str, &str)]) -> serde_json::Value {
    let archive = bundle(files);
    let response = h
        .app
        .clone()
        .oneshot(publish_request(
            Some(PUBLISHER_KEY),
            "?wait=true",
            Some(version),
            Some(&archive),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await
}

// -- Health Probes ------------------------------------------------------------

#[tokio::test]
async fn test_liveness_probe() {
    let h = harness();
    let response = h
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/health/liveness")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "ok");
}

#[tokio::test]
async fn test_readiness_probe() {
    let h = harness();
    let response = h
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/health/readiness")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "ready");
}

#[tokio::test]
async fn test_readiness_fails_without_public_dir() {
    let h = harness();
    fs::remove_dir_all(h.state.dist.tree().root()).unwrap();
    let response = h
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/health/readiness")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

// -- Metrics ------------------------------------------------------------------

#[tokio::test]
async fn test_metrics_route_only_mounted_with_handle() {
    let h = harness();
    let response = h
        .app
        .clone()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let handle = PrometheusBuilder::new().build_recorder().handle();
    let app = ota_api::app(h.state.clone().with_metrics(handle));
    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

// -- Authentication -----------------------------------------------------------

#[tokio::test]
async fn test_publish_without_key_is_unauthorized() {
    let h = harness();
    let archive = bundle(&[("a", "1")]);
    let response = h
        .app
        .clone()
        .oneshot(publish_request(None, "", Some("v1"), Some(&archive)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_consumer_key_cannot_publish() {
    let h = harness();
    let archive = bundle(&[("a", "1")]);
    let response = h
        .app
        .clone()
        .oneshot(publish_request(Some(CONSUMER_KEY), "", Some("v1"), Some(&archive)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_update_check_with_unknown_key_is_unauthorized() {
    let h = harness();
    let response = h
        .app
        .clone()
        .oneshot(check_request("nope", "?version=v1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// -- Publish & Update Check ---------------------------------------------------

#[tokio::test]
async fn test_two_version_scenario_over_http() {
    let h = harness();
    let first = publish_and_wait(&h, "v1", &[("a", "1"), ("b", "2")]).await;
    assert_eq!(first["version"], "v1");
    assert_eq!(first["changed"], true);

    let second = publish_and_wait(&h, "v2", &[("a", "1"), ("b", "99"), ("c", "3")]).await;
    assert_eq!(second["previousLatest"], "v1");
    assert_eq!(second["files"], 3);

    let response = h
        .app
        .clone()
        .oneshot(check_request(CONSUMER_KEY, "?version=v1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(
        body["assetBundle"],
        "http://ota.test/public/test-ota/v1/bundle.zip"
    );

    let response = h
        .app
        .clone()
        .oneshot(check_request(CONSUMER_KEY, "?version=v2"))
        .await
        .unwrap();
    assert_eq!(body_string(response).await, "{}");

    let response = h
        .app
        .clone()
        .oneshot(check_request(CONSUMER_KEY, "?version=v0-unknown"))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(
        body["assetBundle"],
        "http://ota.test/public/test-ota/v2/bundle.zip"
    );
}

#[tokio::test]
async fn test_update_check_uses_configured_base_url() {
    let h = harness_with(|config| config.base_url = Some("https://cdn.example.com".into()));
    publish_and_wait(&h, "v1", &[("a", "1")]).await;
    publish_and_wait(&h, "v2", &[("a", "2")]).await;

    let response = h
        .app
        .clone()
        .oneshot(check_request(CONSUMER_KEY, "?version=v1"))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(
        body["assetBundle"],
        "https://cdn.example.com/public/test-ota/v1/bundle.zip"
    );
}

#[tokio::test]
async fn test_update_check_without_versions_has_no_update() {
    let h = harness();
    let response = h
        .app
        .clone()
        .oneshot(check_request(CONSUMER_KEY, "?version=v1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "{}");
}

#[tokio::test]
async fn test_update_check_requires_version() {
    let h = harness();
    let response = h
        .app
        .clone()
        .oneshot(check_request(CONSUMER_KEY, ""))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_background_publish_is_pollable() {
    let h = harness();
    let archive = bundle(&[("a", "1")]);
    let response = h
        .app
        .clone()
        .oneshot(publish_request(Some(PUBLISHER_KEY), "", Some("v1"), Some(&archive)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let location = response
        .headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let task = body_json(response).await;
    assert_eq!(task["status"], "queued");
    assert_eq!(location, format!("/v1/publishes/{}", task["id"].as_str().unwrap()));

    let mut last = serde_json::Value::Null;
    for _ in 0..200 {
        let response = h
            .app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(&location)
                    .header("x-publisher-key", PUBLISHER_KEY)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        last = body_json(response).await;
        if last["status"] == "succeeded" || last["status"] == "failed" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(last["status"], "succeeded", "task: {last}");
    assert_eq!(last["report"]["version"], "v1");

    let app = AppId::new("test-ota").unwrap();
    assert_eq!(h.state.dist.latest(&app).unwrap().unwrap().as_str(), "v1");

    // The task is invisible to other applications.
    let response = h
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri(&location)
                .header("x-publisher-key", OTHER_PUBLISHER_KEY)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_task_is_not_found() {
    let h = harness();
    let response = h
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/v1/publishes/{}", uuid::Uuid::new_v4()))
                .header("x-publisher-key", PUBLISHER_KEY)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

// -- Error Mapping ------------------------------------------------------------

#[tokio::test]
async fn test_publish_while_locked_is_busy() {
    let h = harness();
    let app = AppId::new("test-ota").unwrap();
    let _held = h.state.dist.acquire(&app).await.unwrap();

    let archive = bundle(&[("a", "1")]);
    let response = h
        .app
        .clone()
        .oneshot(publish_request(
            Some(PUBLISHER_KEY),
            "?wait=true",
            Some("v1"),
            Some(&archive),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "PUBLISH_IN_PROGRESS");
}

#[tokio::test]
async fn test_invalid_version_name_is_rejected() {
    let h = harness();
    let archive = bundle(&[("a", "1")]);
    let response = h
        .app
        .clone()
        .oneshot(publish_request(
            Some(PUBLISHER_KEY),
            "?wait=true",
            Some("../escape"),
            Some(&archive),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_missing_bundle_is_rejected() {
    let h = harness();
    let response = h
        .app
        .clone()
        .oneshot(publish_request(Some(PUBLISHER_KEY), "?wait=true", Some("v1"), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_corrupt_bundle_is_invalid_archive() {
    let h = harness();
    let response = h
        .app
        .clone()
        .oneshot(publish_request(
            Some(PUBLISHER_KEY),
            "?wait=true",
            Some("v1"),
            Some(b"not a zip at all"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "INVALID_ARCHIVE");
}

#[cfg(unix)]
#[tokio::test]
async fn test_backslash_entry_is_invalid_archive() {
    let h = harness();
    let src = tempfile::tempdir().unwrap();
    fs::write(src.path().join("dir\\file.txt"), "x").unwrap();
    let out = tempfile::tempdir().unwrap();
    let path = out.path().join("bundle.zip");
    ZipCodec
        .compress_files(src.path(), &["dir\\file.txt"], &path)
        .unwrap();
    let archive = fs::read(&path).unwrap();

    let response = h
        .app
        .clone()
        .oneshot(publish_request(
            Some(PUBLISHER_KEY),
            "?wait=true",
            Some("v1"),
            Some(&archive),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "INVALID_ARCHIVE");
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("dir\\file.txt"));
}

#[tokio::test]
async fn test_republish_with_new_content_conflicts() {
    let h = harness();
    publish_and_wait(&h, "v1", &[("a", "1")]).await;

    let unchanged = publish_and_wait(&h, "v1", &[("a", "1")]).await;
    assert_eq!(unchanged["changed"], false);

    let archive = bundle(&[("a", "different")]);
    let response = h
        .app
        .clone()
        .oneshot(publish_request(
            Some(PUBLISHER_KEY),
            "?wait=true",
            Some("v1"),
            Some(&archive),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "CONFLICT");
}
