use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Redirect, Response};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use airwave_proto::platform::image_mime_for_path;
use airwave_proto::protocol::{HealthReport, TrackMetadata};
use airwave_proto::state::StationState;

use crate::hub::BroadcastHub;
use crate::metadata::MetadataResolver;

pub const STREAM_CONTENT_TYPE: &str = "audio/mpeg";

// ── Shared state ──────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct HttpState {
    pub hub: Arc<BroadcastHub>,
    pub station: Arc<StationState>,
    pub resolver: Arc<dyn MetadataResolver>,
    pub placeholder_cover: Option<PathBuf>,
}

/// What `GET /` does.
#[derive(Debug, Clone)]
pub enum IndexPage {
    RedirectToStream,
    Static(PathBuf),
}

pub fn router(state: HttpState, index: IndexPage) -> Router {
    let app = Router::new()
        .route("/stream", get(stream))
        .route("/metadata", get(metadata))
        .route("/albumcover", get(album_cover))
        .route("/health", get(health));

    let app = match index {
        IndexPage::RedirectToStream => app.route("/", get(|| async { Redirect::to("/stream") })),
        IndexPage::Static(dir) => app.fallback_service(ServeDir::new(dir)),
    };

    app.with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

// ── Route handlers ────────────────────────────────────────────────────────────

async fn stream(
    State(state): State<HttpState>,
    peer: Option<ConnectInfo<SocketAddr>>,
) -> Response {
    let subscription = state.hub.subscribe();
    match peer {
        Some(ConnectInfo(addr)) => info!(
            "http: listener {} connected from {} ({} on air)",
            subscription.id(),
            addr,
            state.hub.listener_count()
        ),
        None => info!("http: listener {} connected", subscription.id()),
    }

    let body = Body::from_stream(subscription.into_stream());
    (
        [
            (header::CONTENT_TYPE, STREAM_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
        .into_response()
}

async fn metadata(State(state): State<HttpState>) -> Json<TrackMetadata> {
    Json(state.station.current_metadata().await)
}

async fn album_cover(State(state): State<HttpState>) -> Response {
    let Some(now_playing) = state.station.now_playing().await else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let path = now_playing.path;
    let resolver = Arc::clone(&state.resolver);
    match tokio::task::spawn_blocking(move || resolver.artwork(&path)).await {
        Ok(Ok(Some(art))) => image_response(art.mime_type, art.data),
        Ok(Ok(None)) => placeholder_cover(&state).await,
        Ok(Err(e)) => {
            warn!("http: album cover unavailable: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
        Err(e) => {
            error!("http: album cover task failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn placeholder_cover(state: &HttpState) -> Response {
    let Some(path) = state.placeholder_cover.as_ref() else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match tokio::fs::read(path).await {
        Ok(data) => image_response(image_mime_for_path(path).to_string(), data),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("http: placeholder cover {:?} is missing", path);
            StatusCode::NOT_FOUND.into_response()
        }
        Err(e) => {
            warn!("http: failed to read placeholder cover {:?}: {}", path, e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn image_response(mime_type: String, data: Vec<u8>) -> Response {
    ([(header::CONTENT_TYPE, mime_type)], data).into_response()
}

async fn health(State(state): State<HttpState>) -> Json<HealthReport> {
    let current_track = state.station.now_playing().await.map(|np| np.track);
    Json(HealthReport {
        status: "ok".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        uptime: state.station.uptime().as_secs_f64(),
        listeners: state.hub.listener_count(),
        current_track,
        chunks_published: state.hub.chunks_published(),
        bytes_published: state.hub.bytes_published(),
    })
}

// ── Server startup ────────────────────────────────────────────────────────────

/// Bind `addr` up front so a busy port is a startup error, then serve in the
/// background.
pub async fn start_server(addr: String, app: Router) -> anyhow::Result<tokio::task::JoinHandle<()>> {
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow::anyhow!("failed to bind HTTP server to {}: {}", addr, e))?;
    info!("HTTP server listening on http://{}", addr);

    Ok(tokio::spawn(async move {
        let service = app.into_make_service_with_connect_info::<SocketAddr>();
        if let Err(e) = axum::serve(listener, service).await {
            error!("HTTP server error: {}", e);
        }
    }))
}
