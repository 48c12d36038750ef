use axum::Router;
use axum::body::Body;
use http::{Method, Request, StatusCode, header};
use http_body_util::BodyExt;
use tower::ServiceExt;

use etcd_httpsd::services::MemoryStore;
use etcd_httpsd::services::web::{SERVICES_PATH, router};

const WEBAPP: &str = r#"{"service_port":8080,"metrics_port":9090,"metrics_url":"/metrics"}"#;

async fn send(app: Router, method: Method, path: &str) -> (StatusCode, Option<String>, String) {
    let request = Request::builder()
        .method(method)
        .uri(path)
        .body(Body::empty())
        .expect("valid request");
    let response = app.oneshot(request).await.expect("router is infallible");

    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = response
        .into_body()
        .collect()
        .await
        .expect("body readable")
        .to_bytes();

    (status, content_type, String::from_utf8(body.to_vec()).expect("utf-8 body"))
}

#[tokio::test]
async fn test_single_registration_document() {
    let store = MemoryStore::new();
    store.insert("/discovery/webapp/instance-7", WEBAPP);

    let (status, content_type, body) = send(router(store, "/"), Method::GET, SERVICES_PATH).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("application/json"));
    assert_eq!(body, r#"[{"targets":["instance-7:9090"],"labels":{"job":"webapp"}}]"#);
}

#[tokio::test]
async fn test_empty_store_returns_empty_array() {
    let (status, _, body) = send(router(MemoryStore::new(), "/"), Method::GET, SERVICES_PATH).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "[]");
}

#[tokio::test]
async fn test_n_registrations_give_n_groups() {
    let store = MemoryStore::new();
    for i in 0..5 {
        store.insert(
            format!("/discovery/job-{}/host-{i}", i % 2),
            format!(r#"{{"service_port":80,"metrics_port":{},"metrics_url":"/metrics"}}"#, 9000 + i),
        );
    }

    let (status, _, body) = send(router(store, "/"), Method::GET, SERVICES_PATH).await;
    assert_eq!(status, StatusCode::OK);

    let groups: Vec<serde_json::Value> = serde_json::from_str(&body).expect("json array");
    assert_eq!(groups.len(), 5);
    for group in &groups {
        let target = group["targets"][0].as_str().expect("target string");
        let job = group["labels"]["job"].as_str().expect("job label");
        let (host, port) = target.split_once(':').expect("host:port");
        let index: i64 = host.trim_start_matches("host-").parse().expect("index");
        assert_eq!(port, (9000 + index).to_string());
        assert_eq!(job, format!("job-{}", index % 2));
    }
}

#[tokio::test]
async fn test_short_key_is_503_without_partial_results() {
    let store = MemoryStore::new();
    store.insert("/discovery/webapp/instance-7", WEBAPP);
    store.insert("/discovery/stray", WEBAPP);

    let (status, content_type, body) = send(router(store, "/"), Method::GET, SERVICES_PATH).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(content_type.unwrap_or_default().starts_with("text/plain"));
    assert!(body.contains("/discovery/stray"), "body: {body}");
    assert!(!body.contains("instance-7"));
}

#[tokio::test]
async fn test_bad_value_is_503() {
    let store = MemoryStore::new();
    store.insert("/discovery/webapp/instance-7", r#"{"metrics_port":"ninety"}"#);

    let (status, _, body) = send(router(store, "/"), Method::GET, SERVICES_PATH).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body.starts_with("malformed registration value"), "body: {body}");
}

#[tokio::test]
async fn test_unreachable_store_is_503_with_store_message() {
    let store = MemoryStore::new();
    store.fail_listing("dial tcp 10.0.0.1:2379: connect: connection refused");
    let app = router(store.clone(), "/");

    let (status, _, body) = send(app.clone(), Method::GET, SERVICES_PATH).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(
        body,
        "store unavailable: dial tcp 10.0.0.1:2379: connect: connection refused"
    );

    // 单个请求失败不影响后续请求
    store.restore_listing();
    let (status, _, _) = send(app, Method::GET, SERVICES_PATH).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_other_paths_are_404_with_empty_body() {
    let app = router(MemoryStore::new(), "/");

    for path in ["/", "/services/extra", "/targets"] {
        let (status, _, body) = send(app.clone(), Method::GET, path).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "path {path}");
        assert!(body.is_empty());
    }
}

#[tokio::test]
async fn test_prefix_limits_the_listing() {
    let store = MemoryStore::new();
    store.insert("/discovery/webapp/instance-7", WEBAPP);
    store.insert("/other/api/host-1", WEBAPP);

    let (_, _, body) = send(router(store, "/discovery/"), Method::POST, SERVICES_PATH).await;

    assert_eq!(body, r#"[{"targets":["instance-7:9090"],"labels":{"job":"webapp"}}]"#);
}
