#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{mpsc, Semaphore};
use tuner_core::{
    DisplaySink, MetadataError, MetadataFetcher, MetadataPoller, Player, PlayerCache,
    PlayerFactory, StationController, StationRegistry, TitleUpdate,
};
use tuner_proto::protocol::{DisplayEvent, StationDescriptor, StationId, StreamFormat};

// ── display sink ──────────────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<DisplayEvent>>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<DisplayEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn take(&self) -> Vec<DisplayEvent> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }

    pub fn titles(&self) -> Vec<(StationId, String)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                DisplayEvent::MetadataTitle { station, title } => Some((station, title)),
                _ => None,
            })
            .collect()
    }
}

impl DisplaySink for RecordingSink {
    fn on_station_active_changed(&self, station: StationId, active: bool) {
        self.events
            .lock()
            .unwrap()
            .push(DisplayEvent::StationActiveChanged { station, active });
    }

    fn on_metadata_title(&self, station: StationId, title: &str) {
        self.events.lock().unwrap().push(DisplayEvent::MetadataTitle {
            station,
            title: title.to_string(),
        });
    }
}

pub fn active(idx: usize) -> DisplayEvent {
    DisplayEvent::StationActiveChanged {
        station: StationId(idx),
        active: true,
    }
}

pub fn inactive(idx: usize) -> DisplayEvent {
    DisplayEvent::StationActiveChanged {
        station: StationId(idx),
        active: false,
    }
}

// ── players ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerCall {
    Play,
    Stop,
    Unload,
}

/// Shared view of every player the factory has built.
#[derive(Default)]
pub struct PlayerLog {
    pub created: Mutex<Vec<(StationId, StreamFormat)>>,
    pub calls: Mutex<Vec<(StationId, PlayerCall)>>,
    playing: Mutex<HashMap<StationId, bool>>,
    stalled: Mutex<Vec<StationId>>,
}

impl PlayerLog {
    pub fn created_count(&self, id: StationId) -> usize {
        self.created
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| *s == id)
            .count()
    }

    pub fn calls_for(&self, id: StationId) -> Vec<PlayerCall> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| *s == id)
            .map(|(_, c)| *c)
            .collect()
    }

    /// Stations whose `play()` connects but never produces audio.
    pub fn stall(&self, id: StationId) {
        self.stalled.lock().unwrap().push(id);
    }

    /// Simulate a running stream dropping out.
    pub fn drop_out(&self, id: StationId) {
        self.playing.lock().unwrap().insert(id, false);
    }

    pub fn playing_stations(&self) -> Vec<StationId> {
        let mut v: Vec<_> = self
            .playing
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, p)| **p)
            .map(|(id, _)| *id)
            .collect();
        v.sort();
        v
    }
}

pub struct MockPlayer {
    station: StationId,
    log: Arc<PlayerLog>,
}

impl Player for MockPlayer {
    fn play(&mut self) {
        self.log.calls.lock().unwrap().push((self.station, PlayerCall::Play));
        let stalled = self.log.stalled.lock().unwrap().contains(&self.station);
        self.log.playing.lock().unwrap().insert(self.station, !stalled);
    }

    fn stop(&mut self) {
        self.log.calls.lock().unwrap().push((self.station, PlayerCall::Stop));
        self.log.playing.lock().unwrap().insert(self.station, false);
    }

    fn unload(&mut self) {
        self.log.calls.lock().unwrap().push((self.station, PlayerCall::Unload));
    }

    fn is_playing(&self) -> bool {
        self.log
            .playing
            .lock()
            .unwrap()
            .get(&self.station)
            .copied()
            .unwrap_or(false)
    }
}

pub struct MockFactory {
    pub log: Arc<PlayerLog>,
}

const BOTH: [StreamFormat; 2] = [StreamFormat::Mp3, StreamFormat::Aac];

impl PlayerFactory for MockFactory {
    fn supported_formats(&self) -> &[StreamFormat] {
        &BOTH
    }

    fn create(&self, station: &StationDescriptor, format: StreamFormat) -> Box<dyn Player> {
        self.log.created.lock().unwrap().push((station.id, format));
        Box::new(MockPlayer {
            station: station.id,
            log: Arc::clone(&self.log),
        })
    }
}

// ── metadata ──────────────────────────────────────────────────────────────────

/// Answers every fetch with `"<url> #<n>"` and records the URLs asked for.
#[derive(Default)]
pub struct ScriptedFetcher {
    pub requests: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl MetadataFetcher for ScriptedFetcher {
    async fn fetch_title(&self, url: &str) -> Result<String, MetadataError> {
        let mut requests = self.requests.lock().unwrap();
        requests.push(url.to_string());
        Ok(format!("{} #{}", url, requests.len() - 1))
    }
}

/// Each fetch blocks until the test releases a permit.
pub struct GatedFetcher {
    pub gate: Semaphore,
    pub started: Mutex<Vec<String>>,
}

impl GatedFetcher {
    pub fn new() -> Self {
        Self {
            gate: Semaphore::new(0),
            started: Mutex::new(Vec::new()),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.started.lock().unwrap().len()
    }

    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }
}

#[async_trait]
impl MetadataFetcher for GatedFetcher {
    async fn fetch_title(&self, url: &str) -> Result<String, MetadataError> {
        self.started.lock().unwrap().push(url.to_string());
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| MetadataError::Parse(e.to_string()))?;
        permit.forget();
        Ok(format!("late title from {}", url))
    }
}

// ── harness ───────────────────────────────────────────────────────────────────

pub fn stations(n: usize) -> Vec<StationDescriptor> {
    (0..n)
        .map(|i| StationDescriptor {
            id: StationId(i),
            title: format!("Station {}", i),
            frequency: String::new(),
            stream_url: format!("https://radio.test/s{}.mp3", i),
            metadata_url: format!("https://radio.test/s{}.mp3.xspf", i),
        })
        .collect()
}

pub struct Harness {
    pub controller: StationController,
    pub sink: RecordingSink,
    pub players: Arc<PlayerLog>,
    pub titles: mpsc::UnboundedReceiver<TitleUpdate>,
}

impl Harness {
    pub fn new(stations: Vec<StationDescriptor>, fetcher: Arc<dyn MetadataFetcher>) -> Self {
        let registry = Arc::new(StationRegistry::new(stations));
        let players = Arc::new(PlayerLog::default());
        let cache = PlayerCache::new(
            Arc::clone(&registry),
            Box::new(MockFactory {
                log: Arc::clone(&players),
            }),
            BOTH.to_vec(),
        );
        let sink = RecordingSink::default();
        let (title_tx, titles) = mpsc::unbounded_channel();
        let controller = StationController::new(
            registry,
            cache,
            MetadataPoller::new(fetcher),
            Arc::new(sink.clone()),
            title_tx,
        );
        Self {
            controller,
            sink,
            players,
            titles,
        }
    }

    /// Feed queued poller titles through the controller, as an event loop would.
    pub fn pump_titles(&mut self) -> usize {
        let mut forwarded = 0;
        while let Ok(update) = self.titles.try_recv() {
            if self.controller.handle_title(update) {
                forwarded += 1;
            }
        }
        forwarded
    }
}

/// Let spawned poll tasks run until they park again.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}
