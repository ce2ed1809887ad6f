//! HTTP API integration tests.
//!
//! A stub scraper worker runs on a free local port and records every
//! payload it receives; the API under test is pointed at it through the
//! `[scraper]` config section.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use chrono::NaiveDate;
use serde_json::{json, Value};
use tempfile::TempDir;

use tweet_harness::config::{Config, ScraperConfig};
use tweet_harness::scraper::HttpScraperGateway;
use tweet_harness::server::{self, AppState};
use tweet_harness::sqlite_store::SqliteStore;
use tweet_harness::{db, migrate};
use tweet_harness_core::gateway::ScraperGateway;
use tweet_harness_core::models::{CriteriaPayload, NewCriteria};
use tweet_harness_core::store::{CriteriaStore, ExecutionStore};

// ─── Helpers ────────────────────────────────────────────────────────

fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn wait_for_server(port: u16) {
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/ping/v1", port);
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return;
            }
        }
    }
    panic!("Server did not become ready within 5 seconds");
}

fn test_config(tmp: &TempDir, port: u16, scraper_url: &str) -> Config {
    let config_content = format!(
        r#"
[db]
path = "{}"

[server]
bind = "127.0.0.1:{}"
request_timeout_secs = 5

[scraper]
url = "{}"
timeout_secs = 2
max_retries = 0
"#,
        tmp.path().join("twh.sqlite").display(),
        port,
        scraper_url
    );
    toml::from_str(&config_content).unwrap()
}

/// Received payloads, shared with the stub scraper.
type Inbox = Arc<Mutex<Vec<CriteriaPayload>>>;

async fn accept(State(inbox): State<Inbox>, Json(payload): Json<CriteriaPayload>) -> StatusCode {
    inbox.lock().unwrap().push(payload);
    StatusCode::NO_CONTENT
}

async fn refuse() -> StatusCode {
    StatusCode::SERVICE_UNAVAILABLE
}

/// Start a stub scraper and return its base URL and inbox.
async fn start_scraper(healthy: bool) -> (String, Inbox) {
    let inbox: Inbox = Arc::default();
    let app = if healthy {
        Router::new()
            .route("/criteria/v1", post(accept))
            .with_state(inbox.clone())
    } else {
        Router::new().route("/criteria/v1", post(refuse))
    };

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), inbox)
}

/// Migrate a fresh database and serve the API on a free port.
async fn start_api(tmp: &TempDir, scraper_url: &str) -> (String, Arc<SqliteStore>) {
    let port = find_free_port();
    let cfg = test_config(tmp, port, scraper_url);
    migrate::run_migrations(&cfg).await.unwrap();

    let store = Arc::new(SqliteStore::new(db::connect(&cfg).await.unwrap()));
    let gateway = Arc::new(HttpScraperGateway::new(&cfg.scraper).unwrap());
    let state = AppState::new(store.clone(), gateway, cfg.server.request_timeout());

    let listener = tokio::net::TcpListener::bind(&cfg.server.bind).await.unwrap();
    tokio::spawn(async move {
        axum::serve(listener, server::router(state)).await.unwrap();
    });
    wait_for_server(port).await;

    (format!("http://127.0.0.1:{}", port), store)
}

fn criteria(name: &str) -> NewCriteria {
    NewCriteria {
        name: name.to_string(),
        all_of_these_words: vec!["rust".to_string()],
        this_exact_phrase: String::new(),
        any_of_these_words: vec![],
        none_of_these_words: vec![],
        these_hashtags: vec!["#rustlang".to_string()],
        language: "en".to_string(),
        since: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        until: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
    }
}

async fn error_code(resp: reqwest::Response) -> String {
    let body: Value = resp.json().await.unwrap();
    body["error"]["code"].as_str().unwrap().to_string()
}

// ─── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_ping() {
    let tmp = TempDir::new().unwrap();
    let (scraper, _) = start_scraper(true).await;
    let (base, _) = start_api(&tmp, &scraper).await;

    let resp = reqwest::get(format!("{}/ping/v1", base)).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_run_migrations_endpoint() {
    let tmp = TempDir::new().unwrap();
    let (scraper, _) = start_scraper(true).await;
    let (base, _) = start_api(&tmp, &scraper).await;

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{}/migrations/run/v1", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);
}

#[tokio::test]
async fn test_enqueue_flow() {
    let tmp = TempDir::new().unwrap();
    let (scraper, inbox) = start_scraper(true).await;
    let (base, store) = start_api(&tmp, &scraper).await;
    let client = reqwest::Client::new();

    let id = store.insert_criteria(&criteria("rust")).await.unwrap();

    let resp = client
        .post(format!("{}/criteria/{}/enqueue/v1", base, id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);

    // The worker acknowledges by recording a PENDING execution.
    let resp = client
        .post(format!("{}/criteria/{}/executions/v1", base, id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let created: Value = resp.json().await.unwrap();
    assert!(created["id"].as_i64().is_some());

    let resp = client
        .post(format!("{}/criteria/{}/enqueue/v1", base, id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);
    assert_eq!(error_code(resp).await, "already_enqueued");

    let resp = client
        .post(format!("{}/criteria/{}/enqueue/v1?forced=true", base, id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);

    let sent = inbox.lock().unwrap().clone();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].id, id);
    assert_eq!(sent[0].these_hashtags, vec!["#rustlang".to_string()]);
}

#[tokio::test]
async fn test_enqueue_unknown_criteria() {
    let tmp = TempDir::new().unwrap();
    let (scraper, inbox) = start_scraper(true).await;
    let (base, _) = start_api(&tmp, &scraper).await;

    let resp = reqwest::Client::new()
        .post(format!("{}/criteria/404/enqueue/v1", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 500);
    assert_eq!(error_code(resp).await, "criteria_retrieval_failed");
    assert!(inbox.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_enqueue_when_scraper_refuses() {
    let tmp = TempDir::new().unwrap();
    let (scraper, _) = start_scraper(false).await;
    let (base, store) = start_api(&tmp, &scraper).await;

    let id = store.insert_criteria(&criteria("rust")).await.unwrap();
    let resp = reqwest::Client::new()
        .post(format!("{}/criteria/{}/enqueue/v1", base, id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 500);
    assert_eq!(error_code(resp).await, "dispatch_failed");
}

#[tokio::test]
async fn test_update_execution_status() {
    let tmp = TempDir::new().unwrap();
    let (scraper, _) = start_scraper(true).await;
    let (base, store) = start_api(&tmp, &scraper).await;
    let client = reqwest::Client::new();

    let criteria_id = store.insert_criteria(&criteria("rust")).await.unwrap();
    let execution_id = store.insert_execution(criteria_id).await.unwrap();

    let resp = client
        .put(format!("{}/executions/{}/status/v1", base, execution_id))
        .json(&json!({ "status": "IN PROGRESS" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);

    let resp = client
        .put(format!("{}/executions/{}/status/v1", base, execution_id))
        .json(&json!({ "status": "DONE" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);
    assert!(store
        .executions_by_statuses(&tweet_harness_core::models::ExecutionStatus::ACTIVE)
        .await
        .unwrap()
        .is_empty());

    let resp = client
        .put(format!("{}/executions/9999/status/v1", base))
        .json(&json!({ "status": "DONE" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    assert_eq!(error_code(resp).await, "not_found");

    let resp = client
        .put(format!("{}/executions/{}/status/v1", base, execution_id))
        .json(&json!({ "status": "SLEEPING" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    assert_eq!(error_code(resp).await, "bad_request");
}

#[tokio::test]
async fn test_ingest_tweets() {
    let tmp = TempDir::new().unwrap();
    let (scraper, _) = start_scraper(true).await;
    let (base, _) = start_api(&tmp, &scraper).await;
    let client = reqwest::Client::new();

    let batch = json!([
        {
            "hash": "t1",
            "is_a_reply": false,
            "text_content": "hello",
            "images": [],
            "search_criteria_id": 1,
            "quote": { "is_a_reply": false, "text_content": "quoted", "images": [] }
        },
        {
            "hash": "t2",
            "text_content": "world",
            "search_criteria_id": 1
        }
    ]);

    let resp = client
        .post(format!("{}/tweets/v1", base))
        .json(&batch)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let summary: Value = resp.json().await.unwrap();
    assert_eq!(summary["received"], 2);
    assert_eq!(summary["inserted"], 2);
    assert_eq!(summary["quotes_touched"], 1);

    let resp = client
        .post(format!("{}/tweets/v1", base))
        .json(&batch)
        .send()
        .await
        .unwrap();
    let summary: Value = resp.json().await.unwrap();
    assert_eq!(summary["inserted"], 0);
    assert_eq!(summary["orphans_removed"], 0);
}

#[tokio::test]
async fn test_ingest_rejects_malformed_body() {
    let tmp = TempDir::new().unwrap();
    let (scraper, _) = start_scraper(true).await;
    let (base, _) = start_api(&tmp, &scraper).await;

    let resp = reqwest::Client::new()
        .post(format!("{}/tweets/v1", base))
        .json(&json!({ "hash": "not-an-array" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    assert_eq!(error_code(resp).await, "bad_request");
}

#[tokio::test]
async fn test_serve_resumes_active_executions() {
    let tmp = TempDir::new().unwrap();
    let (scraper, inbox) = start_scraper(true).await;
    let port = find_free_port();
    let cfg = test_config(&tmp, port, &scraper);
    migrate::run_migrations(&cfg).await.unwrap();

    let store = SqliteStore::new(db::connect(&cfg).await.unwrap());
    let id = store.insert_criteria(&criteria("interrupted")).await.unwrap();
    store.insert_execution(id).await.unwrap();

    let server_cfg = cfg.clone();
    tokio::spawn(async move {
        server::run_server(&server_cfg).await.unwrap();
    });
    wait_for_server(port).await;

    let sent: Vec<i64> = inbox.lock().unwrap().iter().map(|p| p.id).collect();
    assert_eq!(sent, vec![id]);
}

#[tokio::test]
async fn test_malformed_path_and_query_use_error_contract() {
    let tmp = TempDir::new().unwrap();
    let (scraper, inbox) = start_scraper(true).await;
    let (base, store) = start_api(&tmp, &scraper).await;
    let client = reqwest::Client::new();
    let id = store.insert_criteria(&criteria("rust")).await.unwrap();

    let resp = client
        .post(format!("{}/criteria/{}/enqueue/v1?forced=yes", base, id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    assert_eq!(error_code(resp).await, "bad_request");

    let resp = client
        .post(format!("{}/criteria/abc/enqueue/v1", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    assert_eq!(error_code(resp).await, "bad_request");

    let resp = client
        .post(format!("{}/criteria/abc/executions/v1", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    assert_eq!(error_code(resp).await, "bad_request");

    let resp = client
        .put(format!("{}/executions/abc/status/v1", base))
        .json(&json!({ "status": "DONE" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    assert_eq!(error_code(resp).await, "bad_request");

    assert!(inbox.lock().unwrap().is_empty());
}

// ─── Scraper retry policy ───────────────────────────────────────────

/// Stub worker answering with `script` in order, then 204 forever.
/// Returns its base URL and a hit counter.
async fn start_scripted_scraper(script: Vec<StatusCode>) -> (String, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let script = Arc::new(script);
    let app = Router::new().route(
        "/criteria/v1",
        post(move || {
            let counter = counter.clone();
            let script = script.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                script.get(n).copied().unwrap_or(StatusCode::NO_CONTENT)
            }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), hits)
}

fn scripted_gateway(url: &str, max_retries: u32) -> HttpScraperGateway {
    let config = ScraperConfig {
        url: url.to_string(),
        timeout_secs: 2,
        max_retries,
    };
    HttpScraperGateway::new(&config)
        .unwrap()
        .with_base_delay(Duration::from_millis(5))
}

fn payload() -> CriteriaPayload {
    CriteriaPayload::from(&criteria("retry").with_id(1))
}

#[tokio::test]
async fn test_dispatch_retries_server_errors() {
    let (url, hits) = start_scripted_scraper(vec![
        StatusCode::SERVICE_UNAVAILABLE,
        StatusCode::SERVICE_UNAVAILABLE,
    ])
    .await;
    let gateway = scripted_gateway(&url, 2);

    gateway.dispatch(&payload()).await.unwrap();

    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_dispatch_retries_rate_limits() {
    let (url, hits) = start_scripted_scraper(vec![StatusCode::TOO_MANY_REQUESTS]).await;
    let gateway = scripted_gateway(&url, 1);

    gateway.dispatch(&payload()).await.unwrap();

    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_dispatch_gives_up_after_max_retries() {
    let (url, hits) = start_scripted_scraper(vec![StatusCode::BAD_GATEWAY; 5]).await;
    let gateway = scripted_gateway(&url, 2);

    assert!(gateway.dispatch(&payload()).await.is_err());
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_dispatch_does_not_retry_client_errors() {
    let (url, hits) = start_scripted_scraper(vec![StatusCode::BAD_REQUEST]).await;
    let gateway = scripted_gateway(&url, 2);

    let err = gateway.dispatch(&payload()).await.unwrap_err();

    assert!(err.to_string().contains("400"));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}
