// Manual Hunter - Web Server
// REST API over the vehicle store with Axum

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use clap::Parser;
use manual_hunter::store::{self, SourceStat, StoredRun, VehicleStats};
use manual_hunter::{HunterConfig, SortOrder, VehicleRecord, VehicleView};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "hunter-server", version, about = "Manual Hunter REST API")]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "HUNTER_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(short, long, default_value = "0.0.0.0:3000", env = "HUNTER_BIND")]
    bind: String,
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Connection>>,
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

    fn err(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

/// Handler failure, rendered as an `ApiResponse` with no data
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: String) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message,
        }
    }

    fn not_found(message: String) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message,
        }
    }

    fn internal(message: String) -> Self {
        error!("{}", message);
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message,
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::internal(format!("{:#}", err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ApiResponse::<()>::err(self.message))).into_response()
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

impl AppState {
    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> anyhow::Result<T>) -> Result<T, ApiError> {
        let conn = self
            .db
            .lock()
            .map_err(|_| ApiError::internal("Database lock poisoned".to_string()))?;
        Ok(f(&conn)?)
    }
}

#[derive(Debug, Default, Deserialize)]
struct VehicleQuery {
    view: Option<String>,
    sort: Option<String>,
}

#[derive(Serialize)]
struct WatchResponse {
    vin: String,
    is_watched: bool,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/vehicles?view=manual&sort=price
async fn get_vehicles(
    State(state): State<AppState>,
    Query(query): Query<VehicleQuery>,
) -> ApiResult<Vec<VehicleRecord>> {
    let view: VehicleView = match query.view.as_deref() {
        Some(view) => view.parse().map_err(ApiError::bad_request)?,
        None => VehicleView::All,
    };
    let sort: SortOrder = match query.sort.as_deref() {
        Some(sort) => sort.parse().map_err(ApiError::bad_request)?,
        None => SortOrder::Price,
    };

    let vehicles = state.with_conn(|conn| store::list_vehicles(conn, view, sort))?;
    Ok(Json(ApiResponse::ok(vehicles)))
}

/// GET /api/vehicles/:vin
async fn get_vehicle(
    State(state): State<AppState>,
    Path(vin): Path<String>,
) -> ApiResult<VehicleRecord> {
    let vin = vin.to_uppercase();
    match state.with_conn(|conn| store::get_vehicle(conn, &vin))? {
        Some(vehicle) => Ok(Json(ApiResponse::ok(vehicle))),
        None => Err(ApiError::not_found(format!("Unknown VIN: {}", vin))),
    }
}

/// POST /api/vehicles/:vin/seen
async fn mark_seen(State(state): State<AppState>, Path(vin): Path<String>) -> ApiResult<String> {
    let vin = vin.to_uppercase();
    if state.with_conn(|conn| store::mark_seen(conn, &vin))? {
        Ok(Json(ApiResponse::ok(vin)))
    } else {
        Err(ApiError::not_found(format!("Unknown VIN: {}", vin)))
    }
}

/// POST /api/vehicles/:vin/watch - Toggle the watch flag
async fn toggle_watch(
    State(state): State<AppState>,
    Path(vin): Path<String>,
) -> ApiResult<WatchResponse> {
    let vin = vin.to_uppercase();
    match state.with_conn(|conn| store::toggle_watch(conn, &vin))? {
        Some(is_watched) => Ok(Json(ApiResponse::ok(WatchResponse { vin, is_watched }))),
        None => Err(ApiError::not_found(format!("Unknown VIN: {}", vin))),
    }
}

/// GET /api/stats
async fn get_stats(State(state): State<AppState>) -> ApiResult<VehicleStats> {
    let stats = state.with_conn(store::vehicle_stats)?;
    Ok(Json(ApiResponse::ok(stats)))
}

/// GET /api/sources - Breakdown by manual_source
async fn get_sources(State(state): State<AppState>) -> ApiResult<Vec<SourceStat>> {
    let stats = state.with_conn(store::stats_by_source)?;
    Ok(Json(ApiResponse::ok(stats)))
}

/// GET /api/research - Vehicles flagged for manual research
async fn get_research(State(state): State<AppState>) -> ApiResult<Vec<VehicleRecord>> {
    let vehicles = state.with_conn(store::research_needed)?;
    Ok(Json(ApiResponse::ok(vehicles)))
}

/// GET /api/runs - Ten most recent search runs
async fn get_runs(State(state): State<AppState>) -> ApiResult<Vec<StoredRun>> {
    let runs = state.with_conn(|conn| store::recent_runs(conn, 10))?;
    Ok(Json(ApiResponse::ok(runs)))
}

fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/vehicles", get(get_vehicles))
        .route("/vehicles/:vin", get(get_vehicle))
        .route("/vehicles/:vin/seen", post(mark_seen))
        .route("/vehicles/:vin/watch", post(toggle_watch))
        .route("/stats", get(get_stats))
        .route("/sources", get(get_sources))
        .route("/research", get(get_research))
        .route("/runs", get(get_runs))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive())
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hunter_server=info,manual_hunter=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = HunterConfig::load(args.config.as_deref())?;

    info!("🌐 Manual Hunter - Web Server");
    let conn = config.open_store()?;
    info!("✓ Database opened: {}", config.database_path.display());

    let state = AppState {
        db: Arc::new(Mutex::new(conn)),
    };

    let listener = tokio::net::TcpListener::bind(&args.bind).await?;
    info!("🚀 Server running on http://{}", args.bind);
    info!("   API: http://{}/api/vehicles?view=manual", args.bind);

    axum::serve(listener, router(state)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use chrono::Utc;
    use manual_hunter::reconcile::ReconciliationEngine;
    use manual_hunter::{Listing, PatternClassifier};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn test_state() -> AppState {
        let conn = Connection::open_in_memory().unwrap();
        store::setup_database(&conn).unwrap();

        let classifier = PatternClassifier::default();
        let engine = ReconciliationEngine::default();
        for vin in ["JT3LN130XL0012345", "JT3HN86R7W0175125"] {
            let listing = Listing::from_value(json!({ "vin": vin, "price": 8000 }));
            let record = engine.finalize(&listing, &classifier.classify(vin), None);
            store::upsert_at(&conn, &record, Utc::now()).unwrap();
        }

        AppState {
            db: Arc::new(Mutex::new(conn)),
        }
    }

    async fn call(app: Router, method: &str, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().method(method).uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = call(router(test_state()), "GET", "/api/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], "OK");
    }

    #[tokio::test]
    async fn test_vehicle_views() {
        let state = test_state();

        let (status, body) = call(router(state.clone()), "GET", "/api/vehicles").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"].as_array().unwrap().len(), 2);

        let (_, body) = call(router(state.clone()), "GET", "/api/vehicles?view=manual").await;
        let manuals = body["data"].as_array().unwrap();
        assert_eq!(manuals.len(), 1);
        assert_eq!(manuals[0]["vin"], "JT3LN130XL0012345");

        let (status, body) = call(router(state), "GET", "/api/vehicles?view=diesel").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_unknown_vin() {
        let (status, body) = call(router(test_state()), "GET", "/api/vehicles/JT3XX00000X000000").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("Unknown VIN"));
    }

    #[tokio::test]
    async fn test_watch_toggle_and_seen() {
        let state = test_state();

        let (status, body) =
            call(router(state.clone()), "POST", "/api/vehicles/jt3ln130xl0012345/watch").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["is_watched"], true);

        let (status, _) = call(router(state.clone()), "POST", "/api/vehicles/JT3LN130XL0012345/seen").await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = call(router(state.clone()), "GET", "/api/stats").await;
        assert_eq!(body["data"]["watched"], 1);
        assert_eq!(body["data"]["unseen"], 1);

        let (_, body) = call(router(state), "GET", "/api/vehicles/JT3LN130XL0012345").await;
        assert_eq!(body["data"]["tracking"]["is_seen"], true);
    }

    #[tokio::test]
    async fn test_sources_and_runs() {
        let state = test_state();

        let (status, body) = call(router(state.clone()), "GET", "/api/sources").await;
        assert_eq!(status, StatusCode::OK);
        let total: i64 = body["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["count"].as_i64().unwrap())
            .sum();
        assert_eq!(total, 2);

        let (status, body) = call(router(state), "GET", "/api/runs").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["data"].as_array().unwrap().is_empty());
    }
}
