//! HTTP server.
//!
//! Exposes search, record save/lookup, batch upload and statistics as a
//! JSON API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/search` | Fuzzy search, `{ "query": "...", "topK": 10 }` |
//! | `POST` | `/records` | Create (no `id`) or edit (`id` set) one record |
//! | `GET`  | `/records` | List records, filtered by query parameters |
//! | `GET`  | `/records/{id}` | Fetch one record |
//! | `GET`  | `/export` | Filtered records as CSV (`text/csv`) |
//! | `POST` | `/uploads` | Ingest a sheet export (`rows` or `sheets`) |
//! | `GET`  | `/stats` | Counts, filter options and recent uploads |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "record not found: ..." } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `rate_limited` (429),
//! `internal` (500). Duplicate saves are not errors: `POST /records`
//! answers 200 with `success: false, isDuplicate: true`.
//!
//! `POST /search` is rate limited per client, identified by the
//! `x-client-id` header (falling back to `x-forwarded-for`).

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use clarion_core::cache::{Clock, RateLimiter, SystemClock};
use clarion_core::filter::RecordFilter;
use clarion_core::models::{IngestSummary, Record, RecordDraft, SaveOutcome, SearchResponse};
use clarion_core::store::RecordStore;

use crate::config::Config;
use crate::export;
use crate::import;
use crate::ingest::ingest_parsed;
use crate::records;
use crate::search::SearchService;
use crate::sqlite_store::SqliteStore;
use crate::stats::{collect_stats, StatsReport};

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    store: Arc<dyn RecordStore>,
    search: Arc<SearchService>,
    limiter: Arc<Mutex<RateLimiter>>,
}

impl AppState {
    pub fn new(config: &Config, store: Arc<dyn RecordStore>) -> Self {
        Self::with_clock(config, store, Arc::new(SystemClock::new()))
    }

    pub fn with_clock(config: &Config, store: Arc<dyn RecordStore>, clock: Arc<dyn Clock>) -> Self {
        let limiter = RateLimiter::new(
            config.server.rate_limit,
            Duration::from_millis(config.server.rate_window_ms),
            clock.clone(),
        );
        Self {
            config: Arc::new(config.clone()),
            search: Arc::new(SearchService::with_clock(config, store.clone(), clock)),
            store,
            limiter: Arc::new(Mutex::new(limiter)),
        }
    }
}

/// Build the router with all routes and CORS.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/search", post(handle_search))
        .route("/records", post(handle_save).get(handle_list))
        .route("/records/{id}", get(handle_get))
        .route("/export", get(handle_export))
        .route("/uploads", post(handle_upload))
        .route("/stats", get(handle_stats))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind`. Runs until the process is
/// terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let store = Arc::new(SqliteStore::open(config).await?);
    let app = router(AppState::new(config, store));

    let bind_addr = config.server.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    println!("clarion server listening on http://{}", bind_addr);
    info!(bind = %bind_addr, "server started");
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

fn rate_limited(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::TOO_MANY_REQUESTS,
        code: "rate_limited",
        message: message.into(),
    }
}

fn internal(err: impl std::fmt::Display) -> AppError {
    warn!(error = %err, "request failed");
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: err.to_string(),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /search ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest {
    #[serde(default)]
    query: String,
    #[serde(default)]
    top_k: Option<usize>,
}

fn client_key(headers: &HeaderMap) -> String {
    ["x-client-id", "x-forwarded-for"]
        .iter()
        .find_map(|name| headers.get(*name).and_then(|v| v.to_str().ok()))
        .map(|v| v.split(',').next().unwrap_or(v).trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "anonymous".to_string())
}

async fn handle_search(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    let client = client_key(&headers);
    let allowed = state
        .limiter
        .lock()
        .map(|mut limiter| limiter.check(&client))
        .unwrap_or(true);
    if !allowed {
        return Err(rate_limited(format!(
            "too many searches from {}; limit is {} per {} ms",
            client, state.config.server.rate_limit, state.config.server.rate_window_ms
        )));
    }

    if matches!(req.top_k, Some(0)) {
        return Err(bad_request("topK must be >= 1"));
    }

    let response = state
        .search
        .search(&req.query, req.top_k)
        .await
        .map_err(internal)?;
    Ok(Json(response))
}

// ============ POST /records, GET /records, GET /records/{id} ============

async fn handle_save(
    State(state): State<AppState>,
    Json(draft): Json<RecordDraft>,
) -> Json<SaveOutcome> {
    let outcome = records::save(state.store.as_ref(), &state.config, draft).await;
    if outcome.success {
        state.search.invalidate();
    }
    Json(outcome)
}

async fn handle_list(
    State(state): State<AppState>,
    Query(filter): Query<RecordFilter>,
) -> Result<Json<Vec<Record>>, AppError> {
    let all = state.store.all_records().await.map_err(internal)?;
    Ok(Json(filter.apply(all)))
}

async fn handle_get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Record>, AppError> {
    match state.store.get_record(&id).await.map_err(internal)? {
        Some(record) => Ok(Json(record)),
        None => Err(not_found(format!("record not found: {}", id))),
    }
}

// ============ GET /export ============

async fn handle_export(
    State(state): State<AppState>,
    Query(filter): Query<RecordFilter>,
) -> Result<Response, AppError> {
    let all = state.store.all_records().await.map_err(internal)?;
    let body = export::to_csv_bytes(&filter.apply(all)).map_err(internal)?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"clarifications.csv\""),
        ],
        body,
    )
        .into_response())
}

// ============ POST /uploads ============

async fn handle_upload(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<IngestSummary>, AppError> {
    let filename = body
        .get("filename")
        .and_then(Value::as_str)
        .unwrap_or("upload.json")
        .to_string();
    let parsed =
        import::parse_document(body, import::REQUIRED_SHEET).map_err(|e| bad_request(e.to_string()))?;

    let summary = ingest_parsed(state.store.as_ref(), &state.config, parsed, &filename)
        .await
        .map_err(internal)?;
    if summary.added_count > 0 {
        state.search.invalidate();
    }
    Ok(Json(summary))
}

// ============ GET /stats ============

async fn handle_stats(State(state): State<AppState>) -> Result<Json<StatsReport>, AppError> {
    collect_stats(state.store.as_ref())
        .await
        .map(Json)
        .map_err(internal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use clarion_core::cache::ManualClock;
    use clarion_core::store::memory::InMemoryStore;
    use serde_json::json;
    use tower::ServiceExt;

    fn test_app() -> (Router, Arc<ManualClock>) {
        let config = parse_config(
            "[db]\npath = \"unused.sqlite\"\n[server]\nrate_limit = 3\nrate_window_ms = 1000\n",
        )
        .unwrap();
        let clock = Arc::new(ManualClock::new());
        let state = AppState::with_clock(&config, Arc::new(InMemoryStore::new()), clock.clone());
        (router(state), clock)
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-client-id", "tester");
        let body = match body {
            Some(v) => {
                builder = builder.header("content-type", "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };
        let response = app
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = test_app();
        let (status, body) = call(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_save_search_and_duplicate() {
        let (app, _) = test_app();
        let record = json!({
            "s_no": 1,
            "module": "Dispatch",
            "scenario_steps": "Dispatcher sees authority conflict near MP 40",
            "status": "Open"
        });

        let (status, first) = call(&app, "POST", "/records", Some(record.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["success"], true);
        let id = first["id"].as_str().unwrap().to_string();

        let (_, dup) = call(&app, "POST", "/records", Some(record)).await;
        assert_eq!(dup["success"], false);
        assert_eq!(dup["isDuplicate"], true);

        let (status, found) = call(
            &app,
            "POST",
            "/search",
            Some(json!({"query": "authroity conflikt", "topK": 5})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(found["results"][0]["id"], id.as_str());
        assert!(found["results"][0]["highlights"]["scenario_steps"]
            .as_str()
            .unwrap()
            .contains("<mark>"));
        assert!(found["stats"]["totalMs"].is_number());

        let (status, fetched) = call(&app, "GET", &format!("/records/{}", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["module"], "Dispatch");
    }

    #[tokio::test]
    async fn test_empty_query_is_empty_response() {
        let (app, _) = test_app();
        let (status, body) = call(&app, "POST", "/search", Some(json!({"query": "  "}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["results"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_missing_record_error_shape() {
        let (app, _) = test_app();
        let (status, body) = call(&app, "GET", "/records/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "not_found");
        assert!(body["error"]["message"].as_str().unwrap().contains("nope"));
    }

    #[tokio::test]
    async fn test_search_rate_limit() {
        let (app, clock) = test_app();
        let q = json!({"query": "signal"});
        for _ in 0..3 {
            let (status, _) = call(&app, "POST", "/search", Some(q.clone())).await;
            assert_eq!(status, StatusCode::OK);
        }
        let (status, body) = call(&app, "POST", "/search", Some(q.clone())).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["error"]["code"], "rate_limited");

        clock.advance(Duration::from_millis(1000));
        let (status, _) = call(&app, "POST", "/search", Some(q)).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_upload_then_stats_and_list() {
        let (app, _) = test_app();
        let body = json!({
            "filename": "tracker.json",
            "sheet": "Clarification",
            "rows": [
                {"S.no": 1, "Module": "Signals", "Scenario/Steps to be Reproduce": "Signal shows wrong aspect", "Status": "Open"},
                {"S.no": 2, "Module": "Yard", "Scenario/Steps to be Reproduce": "Switch fails to throw", "Status": "Closed"},
                {"S.no": 1, "Module": "Signals", "Scenario/Steps to be Reproduce": "Signal shows wrong aspect", "Status": "Open"}
            ]
        });
        let (status, summary) = call(&app, "POST", "/uploads", Some(body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(summary["added_count"], 2);
        assert_eq!(summary["duplicates_skipped"], 1);

        let (_, stats) = call(&app, "GET", "/stats", None).await;
        assert_eq!(stats["total"], 2);
        assert_eq!(stats["resolvedCount"], 1);
        assert_eq!(stats["recentUploads"][0]["filename"], "tracker.json");
        assert_eq!(stats["filterOptions"]["modules"], json!(["Signals", "Yard"]));

        let (_, listed) = call(&app, "GET", "/records?status=Closed", None).await;
        assert_eq!(listed.as_array().unwrap().len(), 1);
        assert_eq!(listed[0]["module"], "Yard");
    }

    #[tokio::test]
    async fn test_export_returns_filtered_csv() {
        let (app, _) = test_app();
        let body = json!({
            "rows": [
                {"S.no": 1, "Module": "Signals", "Scenario/Steps to be Reproduce": "Aspect, \"red\" shown", "Status": "Open", "Date": "2024-03-05"},
                {"S.no": 2, "Module": "Yard", "Scenario/Steps to be Reproduce": "Switch fails to throw", "Status": "Closed"}
            ]
        });
        call(&app, "POST", "/uploads", Some(body)).await;

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/export?status=Open").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/csv; charset=utf-8");
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        let mut lines = text.trim_start_matches('\u{feff}').lines();
        assert!(lines.next().unwrap().starts_with("S.no,Module,"));
        let row = lines.next().unwrap();
        assert!(row.starts_with("1,Signals,\"Aspect, \"\"red\"\" shown\",Open,"));
        assert!(row.contains("05-Mar-2024"));
        assert!(lines.next().is_none());
    }

    #[tokio::test]
    async fn test_upload_rejects_bad_shape() {
        let (app, _) = test_app();
        let (status, body) = call(&app, "POST", "/uploads", Some(json!({"sheet": "Notes", "rows": []}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "bad_request");
    }
}
