/// mpv-backed station players.
///
/// Architecture, per station:
///
/// ```text
///   MpvPlayer (sync, owned by PlayerCache)
///         │  PlayerCommand via unbounded mpsc
///         ▼
///   driver task ── spawns `mpv --idle` lazily on first Play
///         │
///         ├── writer_task   ← receives PendingRequest via mpsc, serialises → socket
///         └── reader_task   ← reads JSON lines from socket
///                                ├── response (has request_id) → matched oneshot::Sender
///                                └── event                     → driver (end-file tracking)
/// ```
///
/// The controller never waits on mpv: commands are queued and the driver
/// applies them in order.  `is_playing` reads a flag the driver keeps current.
///
/// Platform notes:
/// - Unix:   Unix domain sockets
/// - Windows: Named pipes  \\.\pipe\<name>
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info, warn};
use tuner_core::{Player, PlayerFactory};
use tuner_proto::config::PlayerConfig;
use tuner_proto::protocol::{StationDescriptor, StationId, StreamFormat};

#[cfg(unix)]
use tokio::net::UnixStream;

#[cfg(windows)]
use tokio::net::windows::named_pipe::ClientOptions;

// ── global request-id counter ─────────────────────────────────────────────────

static NEXT_REQ_ID: AtomicU64 = AtomicU64::new(1);

const SUPPORTED_FORMATS: [StreamFormat; 2] = [StreamFormat::Mp3, StreamFormat::Aac];

// ── internal channel types ────────────────────────────────────────────────────

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<anyhow::Result<Value>>>>>;

struct PendingRequest {
    req_id: u64,
    payload: String, // serialised JSON line (already has '\n')
    reply: oneshot::Sender<anyhow::Result<Value>>,
}

/// An mpv event that arrived unsolicited (no request_id).
#[derive(Debug, Clone)]
pub struct MpvEvent {
    pub raw: Value,
}

impl MpvEvent {
    /// Returns the event name, e.g. "end-file", "start-file", "file-loaded".
    pub fn event_name(&self) -> Option<&str> {
        self.raw.get("event")?.as_str()
    }

    /// True for an `end-file` mpv did not cause on our request: the stream
    /// ended or failed.  `stop`/`loadfile` produce reason "stop"/"redirect".
    pub fn is_stream_lost(&self) -> bool {
        self.event_name() == Some("end-file")
            && matches!(
                self.raw.get("reason").and_then(|r| r.as_str()),
                Some("eof") | Some("error")
            )
    }
}

// ── IPC handle ────────────────────────────────────────────────────────────────

/// Cloneable handle to the mpv writer task.  Use `send()` to fire a command
/// and await the response.
#[derive(Clone)]
pub struct MpvHandle {
    tx: mpsc::Sender<PendingRequest>,
}

impl MpvHandle {
    pub async fn send(&self, command: Value) -> anyhow::Result<Value> {
        let req_id = NEXT_REQ_ID.fetch_add(1, Ordering::Relaxed);
        let msg = json!({ "command": command, "request_id": req_id });
        let mut raw = serde_json::to_string(&msg)?;
        raw.push('\n');

        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(PendingRequest {
                req_id,
                payload: raw,
                reply: reply_tx,
            })
            .await
            .map_err(|_| anyhow::anyhow!("mpv writer task gone"))?;

        tokio::time::timeout(tokio::time::Duration::from_secs(5), reply_rx)
            .await
            .map_err(|_| anyhow::anyhow!("mpv IPC timeout for req={}", req_id))?
            .map_err(|_| anyhow::anyhow!("mpv reply channel dropped req={}", req_id))?
    }

    /// Open `url`, telling the demuxer which encoding to expect.
    pub async fn load_stream(
        &self,
        url: &str,
        format: StreamFormat,
        volume: f32,
    ) -> anyhow::Result<()> {
        if let Err(e) = self
            .send(json!(["set_property", "demuxer-lavf-format", format.demuxer_name()]))
            .await
        {
            // older mpv builds reject the property at runtime; let lavf probe
            debug!("mpv: demuxer format hint rejected: {}", e);
        }
        self.send(json!(["loadfile", url, "replace"])).await?;
        let vol_pct = (volume * 100.0).clamp(0.0, 100.0);
        if let Err(e) = self.send(json!(["set_property", "volume", vol_pct])).await {
            debug!("mpv: volume not applied: {}", e);
        }
        Ok(())
    }

    pub async fn stop(&self) -> anyhow::Result<()> {
        self.send(json!(["stop"])).await?;
        Ok(())
    }

    /// Drop the playlist entry and any buffered stream data.
    pub async fn unload(&self) -> anyhow::Result<()> {
        self.send(json!(["playlist-clear"])).await?;
        let _ = self.send(json!(["drop-buffers"])).await;
        Ok(())
    }
}

// ── process ───────────────────────────────────────────────────────────────────

/// One mpv child process.
pub struct MpvProcess {
    socket_name: String,
    station_idx: usize,
    cache_secs: u32,
    volume: f32,
    process: Option<tokio::process::Child>,
}

impl MpvProcess {
    pub fn new(station_idx: usize, settings: &PlayerConfig) -> Self {
        Self {
            socket_name: tuner_proto::platform::mpv_socket_name(station_idx),
            station_idx,
            cache_secs: settings.cache_secs,
            volume: settings.volume,
            process: None,
        }
    }

    /// True once a spawned child has exited.  False when none was spawned.
    pub fn exited(&mut self) -> bool {
        match self.process {
            Some(ref mut child) => child.try_wait().ok().flatten().is_some(),
            None => false,
        }
    }

    /// Kill the process if running.
    pub async fn kill(&mut self) {
        if let Some(mut p) = self.process.take() {
            let _ = p.kill().await;
        }
        #[cfg(unix)]
        let _ = tokio::fs::remove_file(&self.socket_name).await;
    }

    fn spawn_child(&mut self) -> anyhow::Result<()> {
        let mpv_binary = tuner_proto::platform::find_mpv_binary()
            .ok_or_else(|| anyhow::anyhow!("mpv binary not found"))?;

        let vol_arg = format!(
            "--volume={}",
            (self.volume * 100.0).clamp(0.0, 100.0).round() as i64
        );
        // live streams go through mpv's demuxer cache rather than a seekable file
        let cache_arg = format!("--cache-secs={}", self.cache_secs.max(1));
        let ipc_arg = tuner_proto::platform::mpv_socket_arg(self.station_idx);

        let child = tokio::process::Command::new(mpv_binary)
            .arg("--no-video")
            .arg("--idle=yes")
            .arg("--cache=yes")
            .arg(cache_arg)
            .arg(&ipc_arg)
            .arg("--quiet")
            .arg(vol_arg)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()?;
        self.process = Some(child);
        Ok(())
    }

    #[cfg(unix)]
    pub async fn spawn_and_connect(
        &mut self,
        event_tx: mpsc::Sender<MpvEvent>,
    ) -> anyhow::Result<MpvHandle> {
        self.kill().await;

        info!("mpv[{}]: spawning new process", self.station_idx);
        self.spawn_child()?;

        let socket_path = std::path::PathBuf::from(&self.socket_name);
        for _ in 0..50 {
            tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
            if socket_path.exists() {
                break;
            }
        }
        if !socket_path.exists() {
            anyhow::bail!("mpv IPC socket did not appear");
        }
        tokio::time::sleep(tokio::time::Duration::from_millis(200)).await;

        let stream = UnixStream::connect(&socket_path).await?;
        info!("mpv[{}]: connected to IPC socket", self.station_idx);

        let (read_half, write_half) = stream.into_split();
        Ok(start_io_tasks(BufReader::new(read_half), write_half, event_tx))
    }

    #[cfg(windows)]
    pub async fn spawn_and_connect(
        &mut self,
        event_tx: mpsc::Sender<MpvEvent>,
    ) -> anyhow::Result<MpvHandle> {
        self.kill().await;

        info!("mpv[{}]: spawning new process", self.station_idx);
        self.spawn_child()?;

        let pipe_path = format!(r"\\.\pipe\{}", self.socket_name);
        for _ in 0..50 {
            tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
            if let Ok(client) = ClientOptions::new().open(&pipe_path) {
                info!("mpv[{}]: connected to named pipe", self.station_idx);
                let (read_half, write_half) = tokio::io::split(client);
                return Ok(start_io_tasks(BufReader::new(read_half), write_half, event_tx));
            }
        }
        anyhow::bail!("mpv named pipe did not appear")
    }
}

fn start_io_tasks<R, W>(
    reader: BufReader<R>,
    writer: W,
    event_tx: mpsc::Sender<MpvEvent>,
) -> MpvHandle
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
    W: tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    // req_id → reply channel.  Writer inserts, reader resolves.
    let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
    let (cmd_tx, cmd_rx) = mpsc::channel::<PendingRequest>(64);

    tokio::spawn(writer_task(writer, cmd_rx, pending.clone()));
    tokio::spawn(reader_task(reader, pending, event_tx));

    MpvHandle { tx: cmd_tx }
}

// ── reader task ───────────────────────────────────────────────────────────────

async fn reader_task<R>(mut reader: BufReader<R>, pending: PendingMap, event_tx: mpsc::Sender<MpvEvent>)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                debug!("mpv reader: connection closed");
                fail_pending(&pending, "mpv IPC connection closed").await;
                break;
            }
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let val: Value = match serde_json::from_str(trimmed) {
                    Ok(v) => v,
                    Err(e) => {
                        debug!("mpv reader: invalid json '{}': {}", trimmed, e);
                        continue;
                    }
                };

                if let Some(req_id) = val.get("request_id").and_then(|v| v.as_u64()) {
                    let mut map = pending.lock().await;
                    if let Some(tx) = map.remove(&req_id) {
                        let result = if val["error"].as_str() == Some("success") {
                            Ok(val)
                        } else {
                            let err = val["error"]
                                .as_str()
                                .unwrap_or("unknown error")
                                .to_string();
                            debug!("mpv reader: response req={} err={}", req_id, err);
                            Err(anyhow::anyhow!("mpv error: {}", err))
                        };
                        let _ = tx.send(result);
                    } else {
                        debug!("mpv reader: response for unknown req={}", req_id);
                    }
                } else {
                    debug!("mpv reader: event {}", trimmed);
                    if event_tx.send(MpvEvent { raw: val }).await.is_err() {
                        break;
                    }
                }
            }
            Err(e) => {
                warn!("mpv reader: read error: {}", e);
                fail_pending(&pending, "mpv IPC read error").await;
                break;
            }
        }
    }
}

async fn fail_pending(pending: &PendingMap, reason: &str) {
    let mut map = pending.lock().await;
    for (_, tx) in map.drain() {
        let _ = tx.send(Err(anyhow::anyhow!("{}", reason)));
    }
}

// ── writer task ───────────────────────────────────────────────────────────────

async fn writer_task<W>(mut writer: W, mut rx: mpsc::Receiver<PendingRequest>, pending: PendingMap)
where
    W: tokio::io::AsyncWrite + Unpin,
{
    while let Some(req) = rx.recv().await {
        // Register reply channel before writing so reader can match it
        pending.lock().await.insert(req.req_id, req.reply);

        debug!("mpv writer: send req={} payload={}", req.req_id, req.payload.trim());
        if let Err(e) = writer.write_all(req.payload.as_bytes()).await {
            warn!("mpv writer: write error: {}", e);
            if let Some(tx) = pending.lock().await.remove(&req.req_id) {
                let _ = tx.send(Err(anyhow::anyhow!("mpv write error: {}", e)));
            }
            break;
        }
    }
    debug!("mpv writer: task exiting");
}

// ── station player ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlayerCommand {
    /// Carries the request sequence number current when `play()` was called.
    Play(u64),
    Stop,
    Unload,
}

/// Playback intent shared between a player and its driver.
///
/// `seq` moves on every `play()`/`stop()`.  The driver only touches `playing`
/// for a `Play` whose sequence number is still the latest, so the outcome of
/// a superseded request never overrides a newer one.
#[derive(Default)]
struct PlayState {
    inner: std::sync::Mutex<Intent>,
}

#[derive(Default)]
struct Intent {
    seq: u64,
    playing: bool,
}

impl PlayState {
    fn lock(&self) -> std::sync::MutexGuard<'_, Intent> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn request(&self, playing: bool) -> u64 {
        let mut intent = self.lock();
        intent.seq += 1;
        intent.playing = playing;
        intent.seq
    }

    fn settle(&self, seq: u64, playing: bool) -> bool {
        let mut intent = self.lock();
        let latest = intent.seq == seq;
        if latest {
            intent.playing = playing;
        }
        latest
    }

    fn lost(&self) {
        self.lock().playing = false;
    }

    fn is_playing(&self) -> bool {
        self.lock().playing
    }
}

/// `Player` for one station, backed by its own mpv process.
pub struct MpvPlayer {
    station: StationId,
    cmd_tx: mpsc::UnboundedSender<PlayerCommand>,
    /// Set on play, cleared on stop or when mpv reports the stream lost.
    state: Arc<PlayState>,
}

impl MpvPlayer {
    /// Start the driver task.  mpv itself is spawned on the first `play`.
    pub fn spawn(station: &StationDescriptor, format: StreamFormat, settings: &PlayerConfig) -> Self {
        let process = MpvProcess::new(station.id.index(), settings);
        Self::start(station, format, settings.volume, process, None)
    }

    fn start(
        station: &StationDescriptor,
        format: StreamFormat,
        volume: f32,
        process: MpvProcess,
        connection: Option<(MpvHandle, mpsc::Receiver<MpvEvent>)>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let state = Arc::new(PlayState::default());
        let (handle, events) = connection.unzip();

        let driver = Driver {
            station: station.id,
            url: station.stream_url.clone(),
            format,
            volume,
            process,
            handle,
            events,
            state: Arc::clone(&state),
        };
        tokio::spawn(driver.run(cmd_rx));

        Self {
            station: station.id,
            cmd_tx,
            state,
        }
    }

    fn command(&self, cmd: PlayerCommand) {
        if self.cmd_tx.send(cmd).is_err() {
            warn!("mpv[{}]: driver gone, dropping {:?}", self.station, cmd);
        }
    }
}

impl Player for MpvPlayer {
    fn play(&mut self) {
        let seq = self.state.request(true);
        self.command(PlayerCommand::Play(seq));
    }

    fn stop(&mut self) {
        self.state.request(false);
        self.command(PlayerCommand::Stop);
    }

    fn unload(&mut self) {
        self.command(PlayerCommand::Unload);
    }

    fn is_playing(&self) -> bool {
        self.state.is_playing()
    }
}

struct Driver {
    station: StationId,
    url: String,
    format: StreamFormat,
    volume: f32,
    process: MpvProcess,
    handle: Option<MpvHandle>,
    events: Option<mpsc::Receiver<MpvEvent>>,
    state: Arc<PlayState>,
}

impl Driver {
    async fn run(mut self, mut cmd_rx: mpsc::UnboundedReceiver<PlayerCommand>) {
        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(cmd) => self.apply(cmd).await,
                    None => break,
                },
                evt = next_event(&mut self.events) => match evt {
                    Some(evt) if evt.is_stream_lost() => {
                        warn!("mpv[{}]: stream ended: {:?}", self.station, evt.raw.get("reason"));
                        self.state.lost();
                    }
                    Some(_) => {}
                    None => {
                        warn!("mpv[{}]: IPC connection lost", self.station);
                        self.disconnect();
                    }
                },
            }
        }
        debug!("mpv[{}]: player dropped, shutting down", self.station);
        self.process.kill().await;
    }

    async fn apply(&mut self, cmd: PlayerCommand) {
        let result = match cmd {
            PlayerCommand::Play(seq) => {
                let result = self.play().await;
                if !self.state.settle(seq, result.is_ok()) {
                    debug!("mpv[{}]: play #{} superseded", self.station, seq);
                }
                result
            }
            PlayerCommand::Stop => match &self.handle {
                Some(handle) => handle.stop().await,
                None => Ok(()),
            },
            PlayerCommand::Unload => match &self.handle {
                Some(handle) => handle.unload().await,
                None => Ok(()),
            },
        };
        if let Err(e) = result {
            warn!("mpv[{}]: {:?} failed: {}", self.station, cmd, e);
        }
    }

    async fn play(&mut self) -> anyhow::Result<()> {
        if self.handle.is_none() || self.process.exited() {
            let (event_tx, event_rx) = mpsc::channel(64);
            let handle = self.process.spawn_and_connect(event_tx).await?;
            self.handle = Some(handle);
            self.events = Some(event_rx);
        }

        if let Some(handle) = &self.handle {
            info!("mpv[{}]: loading {} as {:?}", self.station, self.url, self.format);
            handle.load_stream(&self.url, self.format, self.volume).await?;
        }
        Ok(())
    }

    fn disconnect(&mut self) {
        self.handle = None;
        self.events = None;
        self.state.lost();
    }
}

async fn next_event(events: &mut Option<mpsc::Receiver<MpvEvent>>) -> Option<MpvEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

// ── factory ───────────────────────────────────────────────────────────────────

pub struct MpvPlayerFactory {
    settings: PlayerConfig,
}

impl MpvPlayerFactory {
    pub fn new(settings: PlayerConfig) -> Self {
        Self { settings }
    }
}

impl PlayerFactory for MpvPlayerFactory {
    fn supported_formats(&self) -> &[StreamFormat] {
        &SUPPORTED_FORMATS
    }

    fn create(&self, station: &StationDescriptor, format: StreamFormat) -> Box<dyn Player> {
        Box::new(MpvPlayer::spawn(station, format, &self.settings))
    }
}
