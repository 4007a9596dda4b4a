//! The single-active-station state machine.
//!
//! States are `active == None` and `active == Some(id)`.  Every transition
//! into `Some` runs the full `stop()` sequence first, so the display never
//! sees two active rows and at most one poll schedule exists.
//!
//! Titles from the poller arrive as `TitleUpdate`s on a channel owned by the
//! caller, which feeds them back through `handle_title` on the same thread of
//! control that makes transitions.  Each update carries the epoch it was
//! scheduled under and is dropped unless that epoch is still current.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info};
use tuner_proto::protocol::StationId;

use crate::error::ControllerError;
use crate::player::PlayerCache;
use crate::poller::MetadataPoller;
use crate::registry::StationRegistry;
use crate::sink::DisplaySink;

/// A title fetched for `station` by the schedule started at `epoch`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleUpdate {
    pub station: StationId,
    pub epoch: u64,
    pub title: String,
}

pub struct StationController {
    registry: Arc<StationRegistry>,
    players: PlayerCache,
    poller: MetadataPoller,
    sink: Arc<dyn DisplaySink>,
    title_tx: mpsc::UnboundedSender<TitleUpdate>,
    active: Option<StationId>,
    /// Bumped on every play and stop.
    epoch: u64,
}

impl StationController {
    pub fn new(
        registry: Arc<StationRegistry>,
        players: PlayerCache,
        poller: MetadataPoller,
        sink: Arc<dyn DisplaySink>,
        title_tx: mpsc::UnboundedSender<TitleUpdate>,
    ) -> Self {
        Self {
            registry,
            players,
            poller,
            sink,
            title_tx,
            active: None,
            epoch: 0,
        }
    }

    pub fn registry(&self) -> &StationRegistry {
        &self.registry
    }

    pub fn active_station(&self) -> Option<StationId> {
        self.active
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_polling(&self) -> bool {
        self.poller.is_running()
    }

    pub fn is_playing(&self, id: StationId) -> bool {
        self.players.is_playing(id)
    }

    /// A click on a station row.
    ///
    /// Selecting the active station while it is audibly playing turns it off.
    /// Anything else (another station, or the active one while stalled)
    /// stops whatever is active and starts `id` from scratch.
    pub fn select_station(&mut self, id: StationId) -> Result<(), ControllerError> {
        self.registry.lookup(id)?;

        let toggle_off = self.active == Some(id) && self.players.is_playing(id);
        self.stop();

        if toggle_off {
            info!("StationController: {} toggled off", id);
            return Ok(());
        }
        self.play(id)
    }

    /// Deactivate the active station, if any.
    pub fn stop(&mut self) {
        let Some(id) = self.active.take() else {
            return;
        };

        self.epoch += 1;
        self.sink.on_station_active_changed(id, false);
        self.poller.stop();

        if let Some(player) = self.players.get_mut(id) {
            player.stop();
            player.unload();
        }
        info!("StationController: stopped {} (epoch={})", id, self.epoch);
    }

    /// Start `id`, deactivating any other station first.
    pub fn play(&mut self, id: StationId) -> Result<(), ControllerError> {
        let station = self.registry.lookup(id)?;
        let metadata_url = station.metadata_url.clone();
        let title = station.title.clone();

        self.stop();

        self.players.acquire(id)?.play();

        self.epoch += 1;
        self.sink.on_station_active_changed(id, true);
        self.active = Some(id);

        let epoch = self.epoch;
        let tx = self.title_tx.clone();
        self.poller.start(id, metadata_url, move |title| {
            // receiver gone means the owner is shutting down
            let _ = tx.send(TitleUpdate {
                station: id,
                epoch,
                title,
            });
        });

        info!("StationController: playing {} {} (epoch={})", id, title, epoch);
        Ok(())
    }

    /// Forward a poller title to the sink if it belongs to the current
    /// activation.  Returns whether it was forwarded.
    pub fn handle_title(&self, update: TitleUpdate) -> bool {
        if self.active != Some(update.station) || self.epoch != update.epoch {
            debug!(
                "StationController: dropping stale title for {} (epoch {} != {})",
                update.station, update.epoch, self.epoch
            );
            return false;
        }

        self.sink.on_metadata_title(update.station, &update.title);
        true
    }
}
