//! HTTP handlers for the Tannoy server.
//!
//! Exposes the channel operations as a small JSON API plus a health
//! endpoint and the admin reconcile trigger. All engine semantics live in
//! `tannoy-core`; handlers only translate HTTP to service calls.

use crate::config::Config;
use crate::error::ApiError;
use crate::metrics;
use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tannoy_core::{ChannelError, ChannelService, PushRecord};
use tokio::net::TcpListener;
use tracing::{error, info};

/// State shared by every handler.
pub struct AppState {
    /// The channel engine.
    pub service: ChannelService,
    /// Server configuration.
    pub config: Config,
}

/// Serve the JSON API until the process is stopped.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound or the server exits.
pub async fn run_server(config: Config, service: ChannelService) -> Result<()> {
    let state = Arc::new(AppState {
        service,
        config: config.clone(),
    });

    // Metrics export failing is not fatal; the API still serves.
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Metrics exporter failed to start: {}", e);
        }
    }

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/channels/:channel_id/members", post(join_handler))
        .route(
            "/channels/:channel_id/members/:player_id",
            delete(quit_handler),
        )
        .route("/channels/:channel_id/push", post(push_handler))
        .route("/channels/:channel_id/msgs", get(history_handler))
        .route("/players/:player_id/connect", post(connect_handler))
        .route("/players/:player_id/disconnect", post(disconnect_handler))
        .route("/admin/reconcile", post(reconcile_handler))
        .with_state(state);

    let addr = config.bind_addr();
    let listener = TcpListener::bind(addr).await?;

    info!("Tannoy server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Count the operation and map its outcome to an HTTP error.
fn track<T>(op: &'static str, result: Result<T, ChannelError>) -> Result<T, ApiError> {
    metrics::record_operation(op);
    result.map_err(|err| {
        metrics::record_operation_error(op);
        ApiError::from(err)
    })
}

/// Health check handler; also refreshes the document-count gauges.
async fn health_handler(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let stats = track("stats", state.service.stats().await)?;
    metrics::set_document_counts(stats.channels, stats.players);

    Ok(Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "max_msg_count": state.config.channels.max_msg_count,
        "channels": stats.channels,
        "players": stats.players,
    })))
}

#[derive(Debug, Deserialize)]
struct JoinBody {
    player_id: String,
    #[serde(default)]
    connector_id: Option<String>,
}

async fn join_handler(
    State(state): State<Arc<AppState>>,
    Path(channel_id): Path<String>,
    Json(body): Json<JoinBody>,
) -> Result<StatusCode, ApiError> {
    track(
        "join",
        state
            .service
            .join(&channel_id, &body.player_id, body.connector_id.as_deref())
            .await,
    )?;
    Ok(StatusCode::NO_CONTENT)
}

async fn quit_handler(
    State(state): State<Arc<AppState>>,
    Path((channel_id, player_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    track("quit", state.service.quit(&channel_id, &player_id).await)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct PushBody {
    #[serde(default)]
    recipients: Option<Vec<String>>,
    route: String,
    msg: Value,
    #[serde(default)]
    persistent: bool,
}

async fn push_handler(
    State(state): State<Arc<AppState>>,
    Path(channel_id): Path<String>,
    Json(body): Json<PushBody>,
) -> Result<StatusCode, ApiError> {
    track(
        "push",
        state
            .service
            .push(
                &channel_id,
                body.recipients.as_deref(),
                &body.route,
                body.msg,
                body.persistent,
            )
            .await,
    )?;
    metrics::record_push(body.persistent);
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    seq: Option<u64>,
    count: Option<usize>,
}

async fn history_handler(
    State(state): State<Arc<AppState>>,
    Path(channel_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<PushRecord>>, ApiError> {
    let records = track(
        "history",
        state
            .service
            .history(&channel_id, query.seq, query.count)
            .await,
    )?;
    Ok(Json(records))
}

#[derive(Debug, Deserialize)]
struct ConnectBody {
    #[serde(default)]
    connector_id: Option<String>,
}

async fn connect_handler(
    State(state): State<Arc<AppState>>,
    Path(player_id): Path<String>,
    Json(body): Json<ConnectBody>,
) -> Result<StatusCode, ApiError> {
    track(
        "connect",
        state
            .service
            .connect(&player_id, body.connector_id.as_deref())
            .await,
    )?;
    Ok(StatusCode::NO_CONTENT)
}

async fn disconnect_handler(
    State(state): State<Arc<AppState>>,
    Path(player_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    track("disconnect", state.service.disconnect(&player_id).await)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn reconcile_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let report = track("reconcile", state.service.reconcile().await)?;
    Ok(Json(report))
}
