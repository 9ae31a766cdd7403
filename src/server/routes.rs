//! Axum HTTP routes for the analysis API.

use crate::config::AnalyzeRequest;
use crate::error::{ServerError, ServerResult};
use crate::session::SessionManager;
use crate::store::{RedisConnector, StoreConnector};
use crate::tree::SortBy;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

/// Default number of children returned by `expand`
const DEFAULT_EXPAND_LIMIT: usize = 50;

/// Default number of elements in a key preview
const DEFAULT_PREVIEW_LIMIT: usize = 10;

/// Shared application state
pub struct AppState<C: StoreConnector> {
    pub sessions: Arc<SessionManager<C>>,
}

// ─── Route builder ───────────────────────────────────────────────

pub fn build_router<C: StoreConnector>(state: Arc<AppState<C>>) -> Router {
    let api = Router::new()
        .route("/health", get(health))
        .route("/sessions", get(list_sessions::<C>).post(start_session::<C>))
        .route(
            "/sessions/:target",
            get(get_session::<C>).delete(remove_session::<C>),
        )
        .route("/sessions/:target/types", get(session_types::<C>))
        .route("/sessions/:target/size", get(prefix_size::<C>))
        .route("/sessions/:target/expand", get(expand_prefix::<C>))
        .route("/sessions/:target/key", get(inspect_key::<C>));

    Router::new()
        .nest("/api", api)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ─── Handlers ────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "keyspace-analyzer",
    }))
}

async fn list_sessions<C: StoreConnector>(
    State(state): State<Arc<AppState<C>>>,
) -> impl IntoResponse {
    let sessions = state.sessions.list();
    Json(serde_json::json!({
        "count": sessions.len(),
        "sessions": sessions,
    }))
}

async fn start_session<C: StoreConnector>(
    State(state): State<Arc<AppState<C>>>,
    Json(body): Json<AnalyzeRequest>,
) -> ServerResult<impl IntoResponse> {
    let config = body.into_config()?;
    let status = state.sessions.start(config).await?;
    Ok((StatusCode::ACCEPTED, Json(status)))
}

async fn get_session<C: StoreConnector>(
    State(state): State<Arc<AppState<C>>>,
    Path(target): Path<String>,
) -> ServerResult<impl IntoResponse> {
    Ok(Json(state.sessions.status(&target)?))
}

async fn remove_session<C: StoreConnector>(
    State(state): State<Arc<AppState<C>>>,
    Path(target): Path<String>,
) -> ServerResult<impl IntoResponse> {
    state.sessions.remove(&target)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn session_types<C: StoreConnector>(
    State(state): State<Arc<AppState<C>>>,
    Path(target): Path<String>,
) -> ServerResult<impl IntoResponse> {
    let types = state.sessions.types(&target)?;
    Ok(Json(serde_json::json!({ "types": types })))
}

#[derive(Deserialize)]
struct SizeQuery {
    key_type: String,
    #[serde(default)]
    prefix: String,
}

async fn prefix_size<C: StoreConnector>(
    State(state): State<Arc<AppState<C>>>,
    Path(target): Path<String>,
    Query(query): Query<SizeQuery>,
) -> ServerResult<impl IntoResponse> {
    let size = state
        .sessions
        .aggregate_size(&target, &query.key_type, &query.prefix)?;
    Ok(Json(serde_json::json!({
        "key_type": query.key_type,
        "prefix": query.prefix,
        "size": size,
    })))
}

#[derive(Deserialize)]
struct ExpandQuery {
    key_type: String,
    #[serde(default)]
    prefix: String,
    limit: Option<usize>,
    #[serde(default)]
    sort: SortBy,
}

async fn expand_prefix<C: StoreConnector>(
    State(state): State<Arc<AppState<C>>>,
    Path(target): Path<String>,
    Query(query): Query<ExpandQuery>,
) -> ServerResult<impl IntoResponse> {
    let children = state.sessions.expand(
        &target,
        &query.key_type,
        &query.prefix,
        query.limit.unwrap_or(DEFAULT_EXPAND_LIMIT),
        query.sort,
    )?;
    Ok(Json(serde_json::json!({
        "prefix": query.prefix,
        "count": children.len(),
        "children": children,
    })))
}

#[derive(Deserialize)]
struct KeyQuery {
    key: String,
    limit: Option<usize>,
}

async fn inspect_key<C: StoreConnector>(
    State(state): State<Arc<AppState<C>>>,
    Path(target): Path<String>,
    Query(query): Query<KeyQuery>,
) -> ServerResult<impl IntoResponse> {
    let info = state
        .sessions
        .inspect(
            &target,
            &query.key,
            query.limit.unwrap_or(DEFAULT_PREVIEW_LIMIT),
        )
        .await?;
    Ok(Json(info))
}

// ─── Server startup ──────────────────────────────────────────────

/// Start the analysis API against Redis targets
pub async fn serve(bind: &str, port: u16) -> ServerResult<()> {
    let sessions = SessionManager::new(|config| RedisConnector::new(&config.target));
    let router = build_router(Arc::new(AppState { sessions }));

    let addr: SocketAddr = format!("{}:{}", bind, port)
        .parse()
        .map_err(|e| ServerError::Other(format!("Invalid bind address: {}", e)))?;

    eprintln!("Analysis server listening on http://{}", addr);
    eprintln!("API endpoints:");
    eprintln!("  GET    /api/health");
    eprintln!("  GET    /api/sessions");
    eprintln!("  POST   /api/sessions");
    eprintln!("  GET    /api/sessions/:target");
    eprintln!("  DELETE /api/sessions/:target");
    eprintln!("  GET    /api/sessions/:target/types");
    eprintln!("  GET    /api/sessions/:target/size?key_type=&prefix=");
    eprintln!("  GET    /api/sessions/:target/expand?key_type=&prefix=&limit=&sort=");
    eprintln!("  GET    /api/sessions/:target/key?key=&limit=");
    info!(%addr, "Server started");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(ServerError::Io)?;

    eprintln!("\nServer shut down.");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    eprintln!("\nShutting down gracefully...");
}
