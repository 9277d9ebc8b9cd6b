//! HTTP API for task scheduling and answer collection.
//!
//! Routes:
//! - `GET  /api/health`
//! - `GET  /api/project/{project_id}/newtask?offset&user_id&user_ip`
//! - `POST /api/taskrun`
//! - `GET  /api/project/{project_id}/stats`
//! - `GET  /api/project/{project_id}/userprogress?user_id&user_ip`
//!
//! Anonymous requesters that send no `user_ip` are identified by the peer
//! address of the connection.

use axum::{
    Router,
    extract::{ConnectInfo, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::oneshot;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::db::Database;
use crate::error::{ApiError, ApiResult};
use crate::sched::Scheduler;
use crate::types::{NewTaskRun, ProjectStats, Requester, TaskRun, UserProgress};

/// State shared across handlers.
#[derive(Clone)]
pub struct ApiState {
    scheduler: Arc<Scheduler>,
}

impl ApiState {
    pub fn new(scheduler: Arc<Scheduler>) -> Self {
        Self { scheduler }
    }

    fn db(&self) -> &Database {
        self.scheduler.database()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

#[derive(serde::Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Query string for `newtask`.
#[derive(Debug, Default, Deserialize)]
pub struct NewTaskQuery {
    #[serde(default)]
    pub offset: usize,
    pub user_id: Option<i64>,
    pub user_ip: Option<String>,
}

/// Query string identifying a requester.
#[derive(Debug, Default, Deserialize)]
pub struct IdentityQuery {
    pub user_id: Option<i64>,
    pub user_ip: Option<String>,
}

/// The explicit address if non-blank, else the peer's.
fn effective_ip(explicit: Option<&str>, peer: SocketAddr) -> String {
    match explicit.map(str::trim) {
        Some(ip) if !ip.is_empty() => ip.to_string(),
        _ => peer.ip().to_string(),
    }
}

/// Next task for the requester, in the legacy client shape.
async fn new_task(
    State(state): State<ApiState>,
    Path(project_id): Path<i64>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Query(query): Query<NewTaskQuery>,
) -> ApiResult<Json<Value>> {
    let user_ip = effective_ip(query.user_ip.as_deref(), peer);
    let assignment =
        state
            .scheduler
            .new_task(project_id, query.user_id, Some(&user_ip), query.offset)?;
    Ok(Json(assignment.to_legacy_json()))
}

async fn submit_task_run(
    State(state): State<ApiState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Json(mut input): Json<NewTaskRun>,
) -> ApiResult<(StatusCode, Json<TaskRun>)> {
    if input.user_id.is_none() {
        input.user_ip = Some(effective_ip(input.user_ip.as_deref(), peer));
    } else {
        input.user_ip = None;
    }
    let run = state.scheduler.submit_task_run(input)?;
    Ok((StatusCode::CREATED, Json(run)))
}

async fn project_stats(
    State(state): State<ApiState>,
    Path(project_id): Path<i64>,
) -> ApiResult<Json<ProjectStats>> {
    Ok(Json(state.db().project_stats(project_id)?))
}

async fn user_progress(
    State(state): State<ApiState>,
    Path(project_id): Path<i64>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Query(query): Query<IdentityQuery>,
) -> ApiResult<Json<UserProgress>> {
    let user_ip = effective_ip(query.user_ip.as_deref(), peer);
    let requester = Requester::resolve(query.user_id, Some(&user_ip));
    Ok(Json(state.db().user_progress(project_id, &requester)?))
}

/// Build the router with all routes.
pub fn build_router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health))
        .route("/api/project/{project_id}/newtask", get(new_task))
        .route("/api/project/{project_id}/stats", get(project_stats))
        .route("/api/project/{project_id}/userprogress", get(user_progress))
        .route("/api/taskrun", post(submit_task_run))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the server in the background.
///
/// Returns a sender that triggers graceful shutdown and the bound address.
pub async fn start_server(
    scheduler: Arc<Scheduler>,
    bind: &str,
    port: u16,
) -> anyhow::Result<(oneshot::Sender<()>, SocketAddr)> {
    let app = build_router(ApiState::new(scheduler));
    let listener = tokio::net::TcpListener::bind((bind, port)).await?;
    let bound_addr = listener.local_addr()?;

    info!("Scheduler API listening on http://{}", bound_addr);

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
            info!("Scheduler API shutting down");
        })
        .await
        {
            tracing::error!("Scheduler API error: {}", e);
        }
    });

    Ok((shutdown_tx, bound_addr))
}

/// Serve until ctrl-c.
pub async fn serve(scheduler: Arc<Scheduler>, bind: &str, port: u16) -> anyhow::Result<()> {
    let app = build_router(ApiState::new(scheduler));
    let listener = tokio::net::TcpListener::bind((bind, port)).await?;
    info!("Scheduler API listening on http://{}", listener.local_addr()?);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received ctrl-c, shutting down");
    })
    .await?;
    Ok(())
}
