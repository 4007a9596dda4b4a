use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use tuner_core::DisplaySink;
use tuner_proto::protocol::{DisplayEvent, DisplayState, StationDescriptor, StationId};

/// Display sink shared between the controller and the HTTP API.
///
/// Every notification is folded into a `DisplayState` snapshot (what a UI
/// would currently render) and re-broadcast for live subscribers.
#[derive(Clone)]
pub struct BroadcastSink {
    state: Arc<Mutex<DisplayState>>,
    tx: broadcast::Sender<DisplayEvent>,
}

impl BroadcastSink {
    pub fn new(stations: &[StationDescriptor], tx: broadcast::Sender<DisplayEvent>) -> Self {
        Self {
            state: Arc::new(Mutex::new(DisplayState::new(stations))),
            tx,
        }
    }

    pub fn snapshot(&self) -> DisplayState {
        self.lock().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DisplayEvent> {
        self.tx.subscribe()
    }

    fn lock(&self) -> MutexGuard<'_, DisplayState> {
        // a panicking writer leaves the snapshot whole; keep serving it
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish(&self, event: DisplayEvent) {
        self.lock().apply(&event);
        // no receivers is OK
        let _ = self.tx.send(event);
    }
}

impl DisplaySink for BroadcastSink {
    fn on_station_active_changed(&self, station: StationId, active: bool) {
        self.publish(DisplayEvent::StationActiveChanged { station, active });
    }

    fn on_metadata_title(&self, station: StationId, title: &str) {
        self.publish(DisplayEvent::MetadataTitle {
            station,
            title: title.to_string(),
        });
    }
}

/// Log what a listener would see change on screen.
pub fn spawn_display_logger(sink: &BroadcastSink) -> tokio::task::JoinHandle<()> {
    let mut rx = sink.subscribe();
    let sink = sink.clone();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(DisplayEvent::StationActiveChanged { station, active }) => {
                    let snapshot = sink.snapshot();
                    let label = snapshot
                        .stations
                        .get(station.index())
                        .map(|s| s.label.as_str())
                        .unwrap_or("?");
                    info!(
                        "display: {} {} {}",
                        station,
                        label,
                        if active { "on" } else { "off" }
                    );
                }
                Ok(DisplayEvent::MetadataTitle { station, title }) => {
                    info!("display: {} now playing: {}", station, title);
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("display logger lagged, skipped {} events", n);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("display logger: channel closed");
                    break;
                }
            }
        }
    })
}
