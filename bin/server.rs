// Charter Recon - Review API Server
// Read-only JSON over stored match runs and ledger records

use anyhow::Context;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use charter_recon::{
    db::{self, RecordFilter},
    parser, ReconConfig, ReconError, Record, RunSummary, SourceStat, Unmatched,
};
use chrono::NaiveDate;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Bind address when RECON_BIND is not set
const DEFAULT_BIND: &str = "127.0.0.1:3000";

/// Shared application state
#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Connection>>,
}

impl AppState {
    fn conn(&self) -> Result<MutexGuard<'_, Connection>, ApiError> {
        self.db
            .lock()
            .map_err(|_| ApiError::internal("database lock poisoned".to_string()))
    }
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn internal(message: String) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message,
        }
    }

    fn bad_request(message: String) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message,
        }
    }
}

impl From<ReconError> for ApiError {
    fn from(e: ReconError) -> Self {
        match e {
            ReconError::RunNotFound(id) => Self {
                status: StatusCode::NOT_FOUND,
                message: format!("run not found: {}", id),
            },
            other => {
                error!(error = %other, "request failed");
                Self::internal(other.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(self.message),
        };
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

/// Record response (flattened for the review front end)
#[derive(Serialize, Deserialize)]
struct RecordResponse {
    id: Option<i64>,
    source: String,
    source_file: String,
    line_number: usize,
    date: NaiveDate,
    amount_cents: i64,
    description: String,
    reference: Option<String>,
    vendor: Option<String>,
    category: Option<String>,
}

impl From<Record> for RecordResponse {
    fn from(r: Record) -> Self {
        Self {
            id: None,
            source: r.source,
            source_file: r.source_file,
            line_number: r.line_number,
            date: r.date,
            amount_cents: r.amount_cents,
            description: r.description,
            reference: r.reference,
            vendor: r.vendor,
            category: r.category,
        }
    }
}

impl From<db::StoredRecord> for RecordResponse {
    fn from(stored: db::StoredRecord) -> Self {
        let mut response = RecordResponse::from(stored.record);
        response.id = Some(stored.id);
        response
    }
}

#[derive(Serialize)]
struct UnmatchedItem {
    index: usize,
    record: RecordResponse,
}

impl From<Unmatched> for UnmatchedItem {
    fn from(u: Unmatched) -> Self {
        Self {
            index: u.index,
            record: u.record.into(),
        }
    }
}

#[derive(Serialize, Default)]
struct UnmatchedResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    a: Option<Vec<UnmatchedItem>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    b: Option<Vec<UnmatchedItem>>,
}

#[derive(Deserialize)]
struct SideQuery {
    side: Option<String>,
}

#[derive(Deserialize)]
struct RangeQuery {
    from: Option<String>,
    to: Option<String>,
}

fn parse_query_date(raw: Option<&str>, name: &str) -> Result<Option<NaiveDate>, ApiError> {
    raw.map(|s| {
        parser::parse_date(s, parser::DEFAULT_DATE_FORMATS)
            .ok_or_else(|| ApiError::bad_request(format!("invalid {} date: {}", name, s)))
    })
    .transpose()
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/runs - Stored match runs, most recent first
async fn get_runs(State(state): State<AppState>) -> ApiResult<Vec<RunSummary>> {
    let conn = state.conn()?;
    Ok(Json(ApiResponse::ok(db::list_runs(&conn)?)))
}

/// GET /api/runs/:id - One run with pairs and unmatched records
async fn get_run(State(state): State<AppState>, Path(run_id): Path<String>) -> ApiResult<db::RunDetail> {
    let conn = state.conn()?;
    Ok(Json(ApiResponse::ok(db::get_run(&conn, &run_id)?)))
}

/// GET /api/runs/:id/unmatched?side=a|b - Unmatched records of a run
async fn get_run_unmatched(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
    Query(query): Query<SideQuery>,
) -> ApiResult<UnmatchedResponse> {
    let conn = state.conn()?;

    // 404 for unknown runs rather than two empty lists
    db::get_run(&conn, &run_id)?;

    let load = |side: &str| -> Result<Vec<UnmatchedItem>, ApiError> {
        Ok(db::get_unmatched(&conn, &run_id, side)?
            .into_iter()
            .map(UnmatchedItem::from)
            .collect())
    };

    let response = match query.side.as_deref() {
        None => UnmatchedResponse {
            a: Some(load("a")?),
            b: Some(load("b")?),
        },
        Some("a") => UnmatchedResponse {
            a: Some(load("a")?),
            ..Default::default()
        },
        Some("b") => UnmatchedResponse {
            b: Some(load("b")?),
            ..Default::default()
        },
        Some(other) => {
            return Err(ApiError::bad_request(format!("side must be a or b, got {}", other)));
        }
    };

    Ok(Json(ApiResponse::ok(response)))
}

/// GET /api/sources - Per-source record statistics
async fn get_sources(State(state): State<AppState>) -> ApiResult<Vec<SourceStat>> {
    let conn = state.conn()?;
    Ok(Json(ApiResponse::ok(db::get_source_stats(&conn)?)))
}

/// GET /api/sources/:source/records?from=&to= - Ledger records of one source
async fn get_source_records(
    State(state): State<AppState>,
    Path(source): Path<String>,
    Query(range): Query<RangeQuery>,
) -> ApiResult<Vec<RecordResponse>> {
    let decoded = urlencoding::decode(&source)
        .map(|s| s.into_owned())
        .unwrap_or(source);

    let filter = RecordFilter {
        source: Some(decoded.as_str()),
        from: parse_query_date(range.from.as_deref(), "from")?,
        to: parse_query_date(range.to.as_deref(), "to")?,
    };

    let conn = state.conn()?;
    let records = db::get_records(&conn, &filter)?
        .into_iter()
        .map(RecordResponse::from)
        .collect();

    Ok(Json(ApiResponse::ok(records)))
}

fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/runs", get(get_runs))
        .route("/runs/:id", get(get_run))
        .route("/runs/:id/unmatched", get(get_run_unmatched))
        .route("/sources", get(get_sources))
        .route("/sources/:source/records", get(get_source_records))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let config = ReconConfig::load(None).context("Failed to load config")?;
    let db_path = std::env::var_os("RECON_DB")
        .map(std::path::PathBuf::from)
        .unwrap_or(config.db_path);

    if !db_path.exists() {
        anyhow::bail!(
            "Ledger not found at {}. Run `charter-recon import` first.",
            db_path.display()
        );
    }

    let conn = db::open_database(&db_path)
        .with_context(|| format!("Failed to open ledger: {}", db_path.display()))?;
    info!(path = %db_path.display(), "ledger opened");

    let state = AppState {
        db: Arc::new(Mutex::new(conn)),
    };
    let app = build_router(state);

    let addr = std::env::var("RECON_BIND").unwrap_or_else(|_| DEFAULT_BIND.to_string());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("🚀 Server running on http://{}", addr);
    info!("   API: http://{}/api/runs", addr);

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
