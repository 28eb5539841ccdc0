//! Local HTTP API for the presentation layer: read the merged view, forward
//! intents (skip, request, search, reconnect).

use crate::command::CommandClient;
use crate::playback::PlaybackCommand;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use onair_proto::protocol::{basename, MergedViewState, PlaybackState, SourceMode};
use onair_proto::state::ViewStateManager;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

#[derive(Clone)]
pub struct ApiContext {
    pub views: Arc<ViewStateManager>,
    pub commands: CommandClient,
    /// `None` when playback is disabled.
    pub playback_tx: Option<mpsc::Sender<PlaybackCommand>>,
    pub display_limit: usize,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct TrackEntry {
    pub path: String,
    pub name: String,
}

impl TrackEntry {
    fn from_path(path: &str) -> Self {
        Self {
            path: path.to_string(),
            name: basename(path).to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiState {
    pub rev: u64,
    pub playback: PlaybackState,
    pub live: bool,
    pub offline: bool,
    pub now_playing: String,
    pub listeners: u64,
    pub source: SourceMode,
    pub source_label: String,
    pub elapsed_secs: f64,
    pub remaining_secs: f64,
    pub duration_secs: f64,
    pub progress_percent: f64,
    pub queue: Vec<TrackEntry>,
    pub library_size: usize,
    pub search_query: String,
    pub matches: Vec<TrackEntry>,
    pub track_fetched_at: Option<DateTime<Utc>>,
    pub listeners_fetched_at: Option<DateTime<Utc>>,
}

impl ApiState {
    pub fn from_view(view: &MergedViewState, display_limit: usize) -> Self {
        Self {
            rev: view.rev,
            playback: view.playback,
            live: view.playback.is_live(),
            offline: view.playback.is_offline(),
            now_playing: view.listeners.now_playing.clone(),
            listeners: view.listeners.listeners,
            source: view.track.source,
            source_label: view.track.source.label().to_string(),
            elapsed_secs: view.track.elapsed_secs,
            remaining_secs: view.track.remaining_secs,
            duration_secs: view.track.duration_secs,
            progress_percent: view.track.progress_percent(),
            queue: view.track.queue.iter().map(|p| TrackEntry::from_path(p)).collect(),
            library_size: view.library.len(),
            search_query: view.search.query.clone(),
            matches: view
                .search_matches(display_limit)
                .into_iter()
                .map(TrackEntry::from_path)
                .collect(),
            track_fetched_at: view.track_fetched_at,
            listeners_fetched_at: view.listeners_fetched_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub matches: Vec<TrackEntry>,
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    #[serde(default)]
    q: String,
}

#[derive(Debug, Deserialize)]
struct RequestParams {
    #[serde(default)]
    path: String,
}

pub fn router(ctx: ApiContext) -> Router {
    Router::new()
        .route("/api/state", get(get_state))
        .route("/api/library", get(get_library))
        .route("/api/search", get(search))
        .route("/api/skip", get(skip).post(skip))
        .route("/api/request", get(request).post(request))
        .route("/api/reconnect", post(reconnect))
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}

pub fn start_server(
    bind_address: String,
    port: u16,
    ctx: ApiContext,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let addr = format!("{}:{}", bind_address, port);
        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind HTTP server to {}: {}", addr, e);
                return;
            }
        };

        info!("HTTP API listening on http://{}", addr);

        let shutdown = async move { cancel.cancelled().await };
        if let Err(e) = axum::serve(listener, router(ctx))
            .with_graceful_shutdown(shutdown)
            .await
        {
            error!("HTTP server error: {}", e);
        }
    })
}

async fn get_state(State(ctx): State<ApiContext>) -> Json<ApiState> {
    let view = ctx.views.snapshot().await;
    Json(ApiState::from_view(&view, ctx.display_limit))
}

async fn get_library(State(ctx): State<ApiContext>) -> Json<Vec<TrackEntry>> {
    let view = ctx.views.snapshot().await;
    Json(view.library.iter().map(|p| TrackEntry::from_path(p)).collect())
}

async fn search(
    State(ctx): State<ApiContext>,
    Query(params): Query<SearchParams>,
) -> Json<SearchResponse> {
    ctx.views.set_search_query(params.q.clone()).await;
    let view = ctx.views.snapshot().await;
    let matches = view
        .search_matches(ctx.display_limit)
        .into_iter()
        .map(TrackEntry::from_path)
        .collect();
    Json(SearchResponse {
        query: params.q,
        matches,
    })
}

async fn skip(State(ctx): State<ApiContext>) -> StatusCode {
    info!("HTTP API: skip");
    tokio::spawn(async move { ctx.commands.skip().await });
    StatusCode::ACCEPTED
}

async fn request(
    State(ctx): State<ApiContext>,
    Query(params): Query<RequestParams>,
) -> StatusCode {
    if params.path.trim().is_empty() {
        return StatusCode::BAD_REQUEST;
    }
    info!("HTTP API: request {}", params.path);
    let commands = ctx.commands.clone();
    tokio::spawn(async move { commands.request_by_keyword(&params.path).await });
    // the request consumes the search
    ctx.views.clear_search().await;
    StatusCode::ACCEPTED
}

async fn reconnect(State(ctx): State<ApiContext>) -> StatusCode {
    let Some(tx) = ctx.playback_tx else {
        return StatusCode::SERVICE_UNAVAILABLE;
    };
    info!("HTTP API: reconnect");
    if tx.send(PlaybackCommand::Reset).await.is_err() {
        error!("Failed to send reconnect command");
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    StatusCode::ACCEPTED
}
