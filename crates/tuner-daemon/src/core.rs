use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};
use tuner_core::{
    ControllerError, DisplaySink, MetadataFetcher, MetadataPoller, PlayerCache, PlayerFactory,
    StationController, StationRegistry, TitleUpdate,
};
use tuner_proto::config::Config;
use tuner_proto::protocol::{Command, StationDescriptor};

// ── DaemonEvent ───────────────────────────────────────────────────────────────

pub type CommandReply = oneshot::Sender<Result<(), ControllerError>>;

/// All inputs into the DaemonCore loop.
#[derive(Debug)]
pub enum DaemonEvent {
    /// A command from the HTTP API.  `reply`, when present, receives the
    /// outcome once the transition has been applied.
    Command {
        cmd: Command,
        reply: Option<CommandReply>,
    },
    /// Shutdown requested.
    Shutdown,
}

// ── DaemonCore ────────────────────────────────────────────────────────────────

/// Owns the controller.  Commands and poller titles are handled one at a
/// time on this loop, so every transition sees a settled state.
pub struct DaemonCore {
    controller: StationController,
    title_rx: mpsc::UnboundedReceiver<TitleUpdate>,
}

impl DaemonCore {
    pub fn new(
        config: &Config,
        stations: Vec<StationDescriptor>,
        factory: Box<dyn PlayerFactory>,
        fetcher: Arc<dyn MetadataFetcher>,
        sink: Arc<dyn DisplaySink>,
    ) -> Self {
        let registry = Arc::new(StationRegistry::new(stations));
        let players = PlayerCache::new(
            Arc::clone(&registry),
            factory,
            config.player.formats.clone(),
        );
        let poller = MetadataPoller::with_timing(
            fetcher,
            config.metadata.poll_interval(),
            config.metadata.request_timeout(),
        );
        let (title_tx, title_rx) = mpsc::unbounded_channel();

        info!(
            "DaemonCore: {} stations, polling every {:?}",
            registry.len(),
            poller.period()
        );

        Self {
            controller: StationController::new(registry, players, poller, sink, title_tx),
            title_rx,
        }
    }

    /// Run the core event loop.  Returns when a `Shutdown` event is received
    /// or every event sender is gone.
    pub async fn run(mut self, mut event_rx: mpsc::Receiver<DaemonEvent>) -> anyhow::Result<()> {
        info!("DaemonCore: starting event loop");

        loop {
            tokio::select! {
                evt = event_rx.recv() => match evt {
                    None => {
                        info!("DaemonCore: event channel closed, shutting down");
                        break;
                    }
                    Some(DaemonEvent::Shutdown) => {
                        info!("DaemonCore: shutdown requested");
                        break;
                    }
                    Some(DaemonEvent::Command { cmd, reply }) => {
                        info!("DaemonCore: command {:?}", cmd);
                        let result = self.handle_command(cmd);
                        if let Err(e) = &result {
                            error!("DaemonCore: command error: {}", e);
                        }
                        if let Some(reply) = reply {
                            let _ = reply.send(result);
                        }
                    }
                },
                // the controller holds a sender, so this never yields None
                Some(update) = self.title_rx.recv() => {
                    if !self.controller.handle_title(update) {
                        debug!("DaemonCore: title discarded");
                    }
                }
            }
        }

        self.cleanup();
        Ok(())
    }

    fn handle_command(&mut self, cmd: Command) -> Result<(), ControllerError> {
        match cmd {
            Command::Select { station } => self.controller.select_station(station),
            Command::Stop => {
                self.controller.stop();
                Ok(())
            }
        }
    }

    fn cleanup(&mut self) {
        info!("DaemonCore: cleanup, stopping active station");
        self.controller.stop();
    }
}
