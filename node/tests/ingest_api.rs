// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use reservoir_node::config::NodeConfig;
use reservoir_node::server::{
    build_router, flush_once, open_writer, spawn_flusher, SharedWriter, ACK_BODY,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::{tempdir, TempDir};
use tokio::sync::Mutex;
use tower::ServiceExt; // for oneshot

struct TestNode {
    _dir: TempDir,
    log_dir: PathBuf,
    log_path: PathBuf,
    writer: SharedWriter,
    app: Router,
}

/// Node whose Log File lives in a directory that does not exist yet when `writable` is false.
fn test_node(writable: bool, tweak: impl FnOnce(&mut NodeConfig)) -> TestNode {
    let dir = tempdir().unwrap();
    let log_dir = dir.path().join("logs");
    if writable {
        fs::create_dir(&log_dir).unwrap();
    }
    let log_path = log_dir.join("data.txt");

    let mut cfg = NodeConfig::default();
    cfg.log_path = log_path.clone();
    tweak(&mut cfg);

    let writer: SharedWriter = Arc::new(Mutex::new(open_writer(&cfg).unwrap()));
    let app = build_router(writer.clone(), &cfg);
    TestNode {
        _dir: dir,
        log_dir,
        log_path,
        writer,
        app,
    }
}

fn submit(uri: &str, payload: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_LENGTH, payload.len())
        .body(Body::from(payload.to_owned()))
        .unwrap()
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Option<String>, String) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .map(|v| v.to_str().unwrap().to_string());
    let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
    (status, content_type, String::from_utf8(body.to_vec()).unwrap())
}

fn payloads(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|l| l.splitn(3, ' ').nth(2).unwrap().to_string())
        .collect()
}

async fn buffered(node: &TestNode) -> Vec<String> {
    let writer = node.writer.lock().await;
    writer
        .reservoir()
        .iter()
        .map(|r| r.line().splitn(3, ' ').nth(2).unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_submission_is_logged_and_acknowledged() {
    let node = test_node(true, |_| {});

    let (status, content_type, body) = send(&node.app, submit("/", "hello")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("text/plain"));
    assert_eq!(body, ACK_BODY);

    let content = fs::read_to_string(&node.log_path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 1);
    // "YYYY-MM-DD HH:MM:SS hello"
    assert_eq!(lines[0].len(), 19 + 1 + 5);
    assert!(lines[0].ends_with(" hello"));
}

#[tokio::test]
async fn test_buffered_acknowledgment_matches_persisted() {
    let ok_node = test_node(true, |_| {});
    let down_node = test_node(false, |_| {});

    let persisted = send(&ok_node.app, submit("/", "same")).await;
    let buffered_resp = send(&down_node.app, submit("/", "same")).await;

    assert_eq!(persisted, buffered_resp);
    assert_eq!(buffered(&down_node).await, vec!["same"]);
}

#[tokio::test]
async fn test_outage_then_recovery_over_http() {
    let node = test_node(false, |_| {});

    for payload in ["a", "b"] {
        let (status, _, body) = send(&node.app, submit("/", payload)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, ACK_BODY);
    }
    assert_eq!(buffered(&node).await, vec!["a", "b"]);
    assert!(!node.log_path.exists());

    fs::create_dir(&node.log_dir).unwrap();
    let (status, _, _) = send(&node.app, submit("/", "c")).await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(payloads(&node.log_path), vec!["a", "b", "c"]);
    assert!(buffered(&node).await.is_empty());
}

#[tokio::test]
async fn test_any_path_accepts_post() {
    let node = test_node(true, |_| {});

    let (status, _, body) = send(&node.app, submit("/sensors/upload", "x=1")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, ACK_BODY);
    assert_eq!(payloads(&node.log_path), vec!["x=1"]);
}

#[tokio::test]
async fn test_post_to_metrics_path_is_ingested() {
    let node = test_node(true, |_| {});

    let (status, _, body) = send(&node.app, submit("/metrics", "m")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, ACK_BODY);
    assert_eq!(payloads(&node.log_path), vec!["m"]);

    let req = Request::builder()
        .method("GET")
        .uri("/metrics")
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = send(&node.app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payloads(&node.log_path), vec!["m"]);
}

#[tokio::test]
async fn test_other_methods_rejected() {
    let node = test_node(true, |_| {});

    let req = Request::builder()
        .method("GET")
        .uri("/")
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = send(&node.app, req).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

    let req = Request::builder()
        .method("PUT")
        .uri("/upload")
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = send(&node.app, req).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert!(!node.log_path.exists());
}

#[tokio::test]
async fn test_missing_length_is_rejected() {
    let node = test_node(true, |_| {});

    let req = Request::builder()
        .method("POST")
        .uri("/")
        .body(Body::from("no header"))
        .unwrap();
    let (status, _, _) = send(&node.app, req).await;

    assert_eq!(status, StatusCode::LENGTH_REQUIRED);
    assert!(!node.log_path.exists());
}

#[tokio::test]
async fn test_length_mismatch_is_rejected() {
    let node = test_node(true, |_| {});

    let req = Request::builder()
        .method("POST")
        .uri("/")
        .header(header::CONTENT_LENGTH, 13)
        .body(Body::from("short"))
        .unwrap();
    let (status, _, body) = send(&node.app, req).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let err: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(err["error"], "Declared 13 bytes but received 5");
    assert!(!node.log_path.exists());
}

#[tokio::test]
async fn test_oversized_payload_is_rejected() {
    let node = test_node(true, |cfg| cfg.max_payload_bytes = 8);

    let (status, _, _) = send(&node.app, submit("/", "way past the limit")).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(!node.log_path.exists());
}

#[tokio::test]
async fn test_full_reservoir_is_a_server_error() {
    let node = test_node(false, |cfg| cfg.max_buffered_records = Some(1));

    let (status, _, _) = send(&node.app, submit("/", "kept")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, _) = send(&node.app, submit("/", "dropped")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(buffered(&node).await, vec!["kept"]);
}

#[tokio::test]
async fn test_concurrent_submissions_each_logged_once() {
    let node = test_node(true, |_| {});

    let mut handles = Vec::new();
    for i in 0..32 {
        let app = node.app.clone();
        handles.push(tokio::spawn(async move {
            send(&app, submit("/", &format!("p{}", i))).await
        }));
    }
    for handle in handles {
        let (status, _, _) = handle.await.unwrap();
        assert_eq!(status, StatusCode::OK);
    }

    let mut logged = payloads(&node.log_path);
    logged.sort();
    let mut expected: Vec<String> = (0..32).map(|i| format!("p{}", i)).collect();
    expected.sort();
    assert_eq!(logged, expected);
}

#[tokio::test]
async fn test_flush_once_drains_after_recovery() {
    let node = test_node(false, |_| {});
    send(&node.app, submit("/", "a")).await;
    send(&node.app, submit("/", "b")).await;

    assert_eq!(flush_once(&node.writer).await, 2);

    fs::create_dir(&node.log_dir).unwrap();
    assert_eq!(flush_once(&node.writer).await, 0);
    assert_eq!(payloads(&node.log_path), vec!["a", "b"]);
}

#[tokio::test]
async fn test_background_flusher_drains_without_new_submission() {
    let node = test_node(false, |_| {});
    send(&node.app, submit("/", "late")).await;

    let flusher = spawn_flusher(node.writer.clone(), Duration::from_millis(20));
    fs::create_dir(&node.log_dir).unwrap();

    let mut drained = false;
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        if node.writer.lock().await.pending() == 0 {
            drained = true;
            break;
        }
    }
    flusher.abort();

    assert!(drained, "flusher never drained the reservoir");
    assert_eq!(payloads(&node.log_path), vec!["late"]);
}

#[tokio::test]
async fn test_reservoir_snapshot_reloaded_by_new_node() {
    let dir = tempdir().unwrap();
    let log_dir = dir.path().join("logs");
    let snap = dir.path().join("reservoir.json");

    let mut cfg = NodeConfig::default();
    cfg.log_path = log_dir.join("data.txt");
    cfg.reservoir_snapshot_path = Some(snap.clone());

    {
        let writer: SharedWriter = Arc::new(Mutex::new(open_writer(&cfg).unwrap()));
        let app = build_router(writer, &cfg);
        send(&app, submit("/", "before restart")).await;
    }
    assert!(snap.exists());

    fs::create_dir(&log_dir).unwrap();
    let writer: SharedWriter = Arc::new(Mutex::new(open_writer(&cfg).unwrap()));
    let app = build_router(writer, &cfg);
    send(&app, submit("/", "after restart")).await;

    assert_eq!(
        payloads(&cfg.log_path),
        vec!["before restart", "after restart"]
    );
    assert!(!snap.exists());
}
