//! Integration tests for the crawler
//!
//! These tests use wiremock to stand in for the clustering API and the detail
//! endpoint, and run full crawls over real HTTP.

use chrono::Utc;
use cluster_sweep::config::{parse_config, Config};
use cluster_sweep::crawler::{crawl, Crawler};
use cluster_sweep::output::{open_sinks, write_all, RunInfo};
use cluster_sweep::CrawlError;
use serde_json::{json, Value};
use tempfile::TempDir;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration pointing at the mock server
fn create_test_config(server: &MockServer, output_dir: &TempDir, extra: &str) -> Config {
    parse_config(&format!(
        r#"
[crawler]
concurrency-limit = 4
retry-delay = 10
request-timeout = 5
{extra}

[user-agent]
value = "TestBot/1.0"

[endpoints]
cluster = "{base}/map"
detail = "{base}/d"

[seed]
root-keys = ["A"]

[output]
json-path = "{json}"
database-path = "{db}"
"#,
        extra = extra,
        base = server.uri(),
        json = output_dir.path().join("result.json").display(),
        db = output_dir.path().join("crawl.db").display(),
    ))
    .expect("test config should be valid")
}

fn leaf(key: &str, cluster_key: &str) -> Value {
    json!({"key": key, "cluster_key": cluster_key, "latitude": 35.6, "longitude": 139.7})
}

fn cluster(key: &str) -> Value {
    json!({
        "cluster_key": key,
        "count": 2,
        "latitude": 35.6,
        "longitude": 139.7,
        "min_latitude": 35.5,
        "max_latitude": 35.7,
        "min_longitude": 139.6,
        "max_longitude": 139.8,
    })
}

/// Mounts the tree A -> cluster B -> leaves m1, m2, plus both detail documents
async fn mount_small_tree(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/map"))
        .and(body_json(json!(["A"])))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "markers": [],
            "clusters": {"g0": [cluster("B")]},
        })))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/map"))
        .and(body_json(json!(["B"])))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "markers": {"g0": [leaf("m1", "B"), leaf("m2", "B")]},
            "clusters": [],
        })))
        .mount(server)
        .await;

    for key in ["m1", "m2"] {
        Mock::given(method("GET"))
            .and(path(format!("/d/{}.json", key)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": key})))
            .mount(server)
            .await;
    }
}

async fn requests_to(server: &MockServer, request_path: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|request| request.url.path() == request_path)
        .count()
}

#[tokio::test]
async fn test_full_crawl_writes_outputs() {
    let server = MockServer::start().await;
    mount_small_tree(&server).await;
    let output_dir = TempDir::new().unwrap();
    let config = create_test_config(&server, &output_dir, "");

    let started_at = Utc::now();
    let snapshot = Crawler::new(&config).unwrap().run().await.unwrap();

    let mut leaves: Vec<&str> = snapshot.leaves.iter().map(|l| l.key.as_str()).collect();
    leaves.sort();
    assert_eq!(leaves, vec!["m1", "m2"]);
    assert_eq!(snapshot.clusters.len(), 1);
    assert_eq!(snapshot.documents.len(), 2);

    let mut sinks = open_sinks(&config.output).unwrap();
    let run = RunInfo {
        config_hash: "test".to_string(),
        started_at,
        finished_at: Utc::now(),
    };
    write_all(&mut sinks, &snapshot, &run).unwrap();

    let written: Value =
        serde_json::from_str(&std::fs::read_to_string(&config.output.json_path).unwrap()).unwrap();
    let mut ids: Vec<String> = written
        .as_array()
        .unwrap()
        .iter()
        .map(|document| document["id"].as_str().unwrap().to_string())
        .collect();
    ids.sort();
    assert_eq!(ids, vec!["m1", "m2"]);
    assert!(output_dir.path().join("crawl.db").exists());

    // Every cluster expanded once, every leaf fetched once.
    assert_eq!(requests_to(&server, "/map").await, 2);
    assert_eq!(requests_to(&server, "/d/m1.json").await, 1);
    assert_eq!(requests_to(&server, "/d/m2.json").await, 1);
}

#[tokio::test]
async fn test_rate_limited_request_is_retried_unchanged() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/d/m1.json"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_small_tree(&server).await;

    let output_dir = TempDir::new().unwrap();
    let config = create_test_config(&server, &output_dir, "");
    let snapshot = crawl(&config).await.unwrap();

    assert_eq!(snapshot.documents.len(), 2);
    assert_eq!(requests_to(&server, "/d/m1.json").await, 2);
    assert_eq!(requests_to(&server, "/d/m2.json").await, 1);
}

#[tokio::test]
async fn test_malformed_expansion_is_reissued() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/map"))
        .and(body_json(json!(["B"])))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"error": "busy"})))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/map"))
        .and(body_json(json!(["A"])))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    mount_small_tree(&server).await;

    let output_dir = TempDir::new().unwrap();
    let config = create_test_config(&server, &output_dir, "");
    let snapshot = crawl(&config).await.unwrap();

    assert_eq!(snapshot.leaves.len(), 2);
    assert_eq!(snapshot.clusters.len(), 1);
    assert_eq!(snapshot.documents.len(), 2);

    // A: two 502s and a success. B: one malformed body and a success.
    assert_eq!(requests_to(&server, "/map").await, 5);
}

#[tokio::test]
async fn test_custom_success_statuses_for_cluster_endpoint() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/map"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "markers": {"g0": [leaf("m1", "A")]},
            "clusters": {},
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/d/m1.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "m1"})))
        .mount(&server)
        .await;

    let output_dir = TempDir::new().unwrap();
    let mut config = create_test_config(&server, &output_dir, "");
    config.endpoints.cluster_success_statuses = vec![200, 201];

    let snapshot = crawl(&config).await.unwrap();
    assert_eq!(snapshot.documents.len(), 1);
    assert_eq!(requests_to(&server, "/map").await, 1);
}

#[tokio::test]
async fn test_attempt_cap_gives_up() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/map"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let output_dir = TempDir::new().unwrap();
    let config = create_test_config(&server, &output_dir, "max-attempts = 3");

    let result = crawl(&config).await;

    match result {
        Err(CrawlError::RetriesExhausted { attempts, .. }) => assert_eq!(attempts, 3),
        other => panic!("expected RetriesExhausted, got {:?}", other.map(|s| s.documents.len())),
    }
    assert_eq!(requests_to(&server, "/map").await, 3);
}

#[tokio::test]
async fn test_unusable_first_proxy_falls_back_to_direct() {
    let server = MockServer::start().await;
    mount_small_tree(&server).await;

    let output_dir = TempDir::new().unwrap();
    let mut config = create_test_config(&server, &output_dir, "");
    config.proxy.pool = vec![cluster_sweep::ProxyDescriptor::new("", 8080)];

    let snapshot = crawl(&config).await.unwrap();

    assert_eq!(snapshot.documents.len(), 2);
    assert_eq!(requests_to(&server, "/d/m1.json").await, 1);
}
