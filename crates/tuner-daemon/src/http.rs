use crate::core::DaemonEvent;
use crate::display::BroadcastSink;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};
use tuner_core::ControllerError;
use tuner_proto::protocol::{Command, DisplayState, StationDescriptor, StationId};

#[derive(Clone)]
struct HttpState {
    display: BroadcastSink,
    stations: Arc<Vec<StationDescriptor>>,
    event_tx: mpsc::Sender<DaemonEvent>,
}

#[derive(Serialize)]
struct StationInfo {
    idx: usize,
    label: String,
    stream_url: String,
    metadata_url: String,
}

pub fn router(
    display: BroadcastSink,
    stations: Vec<StationDescriptor>,
    event_tx: mpsc::Sender<DaemonEvent>,
) -> Router {
    let app_state = HttpState {
        display,
        stations: Arc::new(stations),
        event_tx,
    };

    Router::new()
        .route("/api/state", get(get_state))
        .route("/api/stations", get(get_stations))
        .route("/api/select/:idx", get(select_station).post(select_station))
        .route("/api/stop", get(stop).post(stop))
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}

pub fn start_server(
    bind_address: String,
    port: u16,
    display: BroadcastSink,
    stations: Vec<StationDescriptor>,
    event_tx: mpsc::Sender<DaemonEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let app = router(display, stations, event_tx);

        let addr = format!("{}:{}", bind_address, port);
        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind HTTP server to {}: {}", addr, e);
                return;
            }
        };

        info!("HTTP API server listening on http://{}", addr);

        if let Err(e) = axum::serve(listener, app).await {
            error!("HTTP server error: {}", e);
        }
    })
}

async fn get_state(State(state): State<HttpState>) -> Json<DisplayState> {
    Json(state.display.snapshot())
}

async fn get_stations(State(state): State<HttpState>) -> Json<Vec<StationInfo>> {
    let stations = state
        .stations
        .iter()
        .map(|s| StationInfo {
            idx: s.id.index(),
            label: s.display_label(),
            stream_url: s.stream_url.clone(),
            metadata_url: s.metadata_url.clone(),
        })
        .collect();
    Json(stations)
}

async fn select_station(State(state): State<HttpState>, Path(idx): Path<usize>) -> StatusCode {
    info!("HTTP API: Select station {}", idx);
    dispatch(&state, Command::Select { station: StationId(idx) }).await
}

async fn stop(State(state): State<HttpState>) -> StatusCode {
    info!("HTTP API: Stop");
    dispatch(&state, Command::Stop).await
}

/// Hand `cmd` to the core and wait for it to be applied.
async fn dispatch(state: &HttpState, cmd: Command) -> StatusCode {
    let (reply_tx, reply_rx) = oneshot::channel();
    let event = DaemonEvent::Command {
        cmd,
        reply: Some(reply_tx),
    };
    if state.event_tx.send(event).await.is_err() {
        error!("Failed to send command: core is gone");
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    match reply_rx.await {
        Ok(Ok(())) => StatusCode::OK,
        Ok(Err(e @ ControllerError::UnknownStation(..))) => {
            warn!("HTTP API: {}", e);
            StatusCode::NOT_FOUND
        }
        Err(_) => {
            error!("Command dropped before it was applied");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
