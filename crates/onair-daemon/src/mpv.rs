//! mpv as the audio transport, driven over its JSON IPC socket.
//!
//! Architecture:
//!
//! ```text
//!   MpvDriver::spawn_and_connect()
//!         │
//!         ├── writer_task   ← receives PendingRequest via mpsc, serialises → socket
//!         └── reader_task   ← reads JSON lines from socket
//!                                ├── response (has request_id) → matched oneshot::Sender
//!                                └── event / property-change   → MpvEvent channel
//!                                                                    │
//!   signal_task ◀──────────────────────────────────────────────────────┘
//!         └── SignalTracker turns events into TransportSignal for the
//!             playback controller
//! ```
//!
//! Platform notes:
//! - Unix:   Unix domain sockets
//! - Windows: named pipe `\\.\pipe\onair-mpv`

use crate::playback::{AudioTransport, TransportSignal};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info, warn};

static NEXT_REQ_ID: AtomicU64 = AtomicU64::new(1);

/// Fixed observe_property IDs, matched in property-change events.
pub const OBS_CORE_IDLE: u64 = 1;
pub const OBS_PAUSE: u64 = 2;

const IPC_TIMEOUT: Duration = Duration::from_secs(5);

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<anyhow::Result<Value>>>>>;

struct PendingRequest {
    req_id: u64,
    payload: String, // serialised JSON line, '\n'-terminated
    reply: oneshot::Sender<anyhow::Result<Value>>,
}

/// An event or property-change mpv pushed without being asked.
#[derive(Debug, Clone)]
pub struct MpvEvent {
    pub raw: Value,
}

impl MpvEvent {
    /// `Some((obs_id, data))` for property-change events.
    pub fn as_property_change(&self) -> Option<(u64, &Value)> {
        if self.event_name()? == "property-change" {
            let id = self.raw.get("id")?.as_u64()?;
            let data = self.raw.get("data").unwrap_or(&Value::Null);
            Some((id, data))
        } else {
            None
        }
    }

    /// e.g. "end-file", "start-file", "file-loaded".
    pub fn event_name(&self) -> Option<&str> {
        self.raw.get("event")?.as_str()
    }
}

// ── handle ────────────────────────────────────────────────────────────────────

/// Cloneable handle to the writer task.
#[derive(Clone)]
pub struct MpvHandle {
    tx: mpsc::Sender<PendingRequest>,
}

impl MpvHandle {
    pub async fn send(&self, command: Value) -> anyhow::Result<Value> {
        let req_id = NEXT_REQ_ID.fetch_add(1, Ordering::Relaxed);
        let msg = json!({ "command": command, "request_id": req_id });
        let mut payload = serde_json::to_string(&msg)?;
        payload.push('\n');

        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(PendingRequest {
                req_id,
                payload,
                reply: reply_tx,
            })
            .await
            .map_err(|_| anyhow::anyhow!("mpv writer task gone"))?;

        tokio::time::timeout(IPC_TIMEOUT, reply_rx)
            .await
            .map_err(|_| anyhow::anyhow!("mpv IPC timeout for req={}", req_id))?
            .map_err(|_| anyhow::anyhow!("mpv reply channel dropped req={}", req_id))?
    }

    /// Replace whatever is loaded with `url` and make sure it is not paused.
    pub async fn play_url(&self, url: &str) -> anyhow::Result<()> {
        self.send(json!(["loadfile", url, "replace"])).await?;
        self.send(json!(["set_property", "pause", false])).await?;
        Ok(())
    }

    pub async fn set_mute(&self, muted: bool) -> anyhow::Result<()> {
        self.send(json!(["set_property", "mute", muted])).await?;
        Ok(())
    }

    /// Register the properties the signal tracker needs.  Must follow every
    /// fresh connection.
    pub async fn observe_lifecycle(&self) {
        for (id, name) in [(OBS_CORE_IDLE, "core-idle"), (OBS_PAUSE, "pause")] {
            match self.send(json!(["observe_property", id, name])).await {
                Ok(_) => debug!("mpv: observe_property id={} name={}", id, name),
                Err(e) => warn!("mpv: observe_property {} failed: {}", name, e),
            }
        }
    }
}

// ── driver ────────────────────────────────────────────────────────────────────

/// Owns the mpv child process.
pub struct MpvDriver {
    socket_name: String,
    process: Option<tokio::process::Child>,
    volume: f32,
    /// Carried into every spawn so a respawned process never starts audible
    /// before playback is confirmed.
    muted: bool,
}

impl MpvDriver {
    pub fn new(volume: f32) -> Self {
        Self {
            socket_name: onair_proto::platform::mpv_socket_name(),
            process: None,
            volume,
            muted: false,
        }
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    fn spawn_args(&self) -> Vec<String> {
        vec![
            "--no-video".to_string(),
            "--idle=yes".to_string(),
            "--quiet".to_string(),
            onair_proto::platform::mpv_socket_arg(),
            format!(
                "--volume={}",
                (self.volume * 100.0).clamp(0.0, 100.0).round() as i64
            ),
            format!("--mute={}", if self.muted { "yes" } else { "no" }),
        ]
    }

    pub fn process_alive(&mut self) -> bool {
        match self.process {
            Some(ref mut child) => child.try_wait().ok().flatten().is_none(),
            None => false,
        }
    }

    pub async fn kill(&mut self) {
        if let Some(mut p) = self.process.take() {
            let _ = p.kill().await;
        }
    }

    fn spawn_process(&mut self) -> anyhow::Result<()> {
        let mpv_binary = onair_proto::platform::find_mpv_binary()
            .ok_or_else(|| anyhow::anyhow!("mpv binary not found"))?;

        info!("mpv: spawning {}", mpv_binary.display());
        let child = tokio::process::Command::new(mpv_binary)
            .args(self.spawn_args())
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
        let socket_path = std::path::PathBuf::from(&self.socket_name);
        let _ = tokio::fs::remove_file(&socket_path).await;
        self.spawn_process()?;

        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            if socket_path.exists() {
                break;
            }
        }
        if !socket_path.exists() {
            anyhow::bail!("mpv IPC socket did not appear");
        }
        tokio::time::sleep(Duration::from_millis(200)).await;

        let stream = tokio::net::UnixStream::connect(&socket_path).await?;
        info!("mpv: connected to IPC socket");
        let (read_half, write_half) = stream.into_split();
        Ok(start_io_tasks(read_half, write_half, event_tx))
    }

    #[cfg(windows)]
    pub async fn spawn_and_connect(
        &mut self,
        event_tx: mpsc::Sender<MpvEvent>,
    ) -> anyhow::Result<MpvHandle> {
        use tokio::net::windows::named_pipe::ClientOptions;

        self.kill().await;
        self.spawn_process()?;

        let pipe_path = format!(r"\\.\pipe\{}", self.socket_name);
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            if let Ok(client) = ClientOptions::new().open(&pipe_path) {
                info!("mpv: connected to named pipe");
                let (read_half, write_half) = tokio::io::split(client);
                return Ok(start_io_tasks(read_half, write_half, event_tx));
            }
        }
        anyhow::bail!("mpv named pipe did not appear")
    }
}

fn start_io_tasks<R, W>(read_half: R, write_half: W, event_tx: mpsc::Sender<MpvEvent>) -> MpvHandle
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    // req_id → reply channel, filled by the writer and resolved by the reader
    let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
    let (cmd_tx, cmd_rx) = mpsc::channel::<PendingRequest>(64);

    tokio::spawn(writer_task(write_half, cmd_rx, pending.clone()));
    tokio::spawn(reader_task(BufReader::new(read_half), pending, event_tx));

    MpvHandle { tx: cmd_tx }
}

async fn fail_pending(pending: &PendingMap, reason: &str) {
    let mut map = pending.lock().await;
    for (_, tx) in map.drain() {
        let _ = tx.send(Err(anyhow::anyhow!("{}", reason)));
    }
}

async fn reader_task<R>(mut reader: BufReader<R>, pending: PendingMap, event_tx: mpsc::Sender<MpvEvent>)
where
    R: AsyncRead + Unpin,
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

                match val.get("request_id").and_then(Value::as_u64) {
                    Some(req_id) => {
                        let Some(tx) = pending.lock().await.remove(&req_id) else {
                            debug!("mpv reader: response for unknown req={}", req_id);
                            continue;
                        };
                        let result = if val["error"].as_str() == Some("success") {
                            Ok(val)
                        } else {
                            let err = val["error"].as_str().unwrap_or("unknown error");
                            Err(anyhow::anyhow!("mpv error: {}", err))
                        };
                        let _ = tx.send(result);
                    }
                    None => {
                        debug!("mpv reader: event {}", trimmed);
                        let _ = event_tx.send(MpvEvent { raw: val }).await;
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

async fn writer_task<W>(mut writer: W, mut rx: mpsc::Receiver<PendingRequest>, pending: PendingMap)
where
    W: AsyncWrite + Unpin,
{
    while let Some(req) = rx.recv().await {
        // register before writing so the reader can match the reply
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

// ── lifecycle signals ─────────────────────────────────────────────────────────

/// Folds mpv's property and file events into transport lifecycle signals.
///
/// Audio is flowing once `core-idle` is false while not paused.  A live
/// stream never ends on purpose, so `end-file` with `eof` counts as a
/// failure alongside `error` and `quit`.  Repeats of the same signal are
/// suppressed until the next `start-file`.
#[derive(Debug, Default)]
pub struct SignalTracker {
    core_idle: Option<bool>,
    paused: bool,
    last: Option<TransportSignal>,
}

impl SignalTracker {
    pub fn observe(&mut self, evt: &MpvEvent) -> Option<TransportSignal> {
        if let Some((obs_id, data)) = evt.as_property_change() {
            match obs_id {
                OBS_CORE_IDLE => self.core_idle = data.as_bool(),
                OBS_PAUSE => self.paused = data.as_bool().unwrap_or(false),
                _ => return None,
            }
            return if self.paused {
                self.emit(TransportSignal::Paused)
            } else if self.core_idle == Some(false) {
                self.emit(TransportSignal::Playing)
            } else {
                None
            };
        }

        match evt.event_name() {
            Some("start-file") => {
                self.last = None;
                self.core_idle = Some(true);
                None
            }
            Some("end-file") => {
                self.core_idle = Some(true);
                let reason = evt.raw.get("reason").and_then(Value::as_str).unwrap_or("unknown");
                info!("mpv: end-file reason={}", reason);
                match reason {
                    "error" | "eof" | "quit" => {
                        let detail = evt
                            .raw
                            .get("file_error")
                            .and_then(Value::as_str)
                            .unwrap_or(reason);
                        self.emit(TransportSignal::Error(format!("stream ended: {}", detail)))
                    }
                    _ => None,
                }
            }
            _ => None,
        }
    }

    /// The IPC connection went away.
    pub fn closed(&mut self) -> Option<TransportSignal> {
        self.emit(TransportSignal::Error("mpv IPC closed".to_string()))
    }

    fn emit(&mut self, signal: TransportSignal) -> Option<TransportSignal> {
        let same_kind = matches!(
            (&self.last, &signal),
            (Some(TransportSignal::Playing), TransportSignal::Playing)
                | (Some(TransportSignal::Paused), TransportSignal::Paused)
                | (Some(TransportSignal::Error(_)), TransportSignal::Error(_))
        );
        if same_kind {
            return None;
        }
        self.last = Some(signal.clone());
        Some(signal)
    }
}

async fn signal_task(mut events: mpsc::Receiver<MpvEvent>, signal_tx: mpsc::Sender<TransportSignal>) {
    let mut tracker = SignalTracker::default();
    while let Some(evt) = events.recv().await {
        if let Some(signal) = tracker.observe(&evt) {
            debug!("mpv: signal {:?}", signal);
            if signal_tx.send(signal).await.is_err() {
                return;
            }
        }
    }
    if let Some(signal) = tracker.closed() {
        let _ = signal_tx.send(signal).await;
    }
}

// ── transport ─────────────────────────────────────────────────────────────────

/// `AudioTransport` backed by an mpv child process, spawned on first use and
/// respawned if it dies.
pub struct MpvTransport {
    driver: MpvDriver,
    handle: Option<MpvHandle>,
    signal_tx: mpsc::Sender<TransportSignal>,
}

impl MpvTransport {
    pub fn new(volume: f32, signal_tx: mpsc::Sender<TransportSignal>) -> Self {
        Self {
            driver: MpvDriver::new(volume),
            handle: None,
            signal_tx,
        }
    }

    async fn connected(&mut self) -> anyhow::Result<MpvHandle> {
        if let Some(h) = &self.handle {
            if self.driver.process_alive() {
                return Ok(h.clone());
            }
            warn!("mpv: process died, respawning");
        }

        let (event_tx, event_rx) = mpsc::channel::<MpvEvent>(256);
        let handle = self.driver.spawn_and_connect(event_tx).await?;
        tokio::spawn(signal_task(event_rx, self.signal_tx.clone()));
        handle.observe_lifecycle().await;
        self.handle = Some(handle.clone());
        Ok(handle)
    }

    async fn try_load(&mut self, url: &str) -> anyhow::Result<()> {
        self.connected().await?.play_url(url).await
    }
}

impl AudioTransport for MpvTransport {
    async fn load(&mut self, url: &str) -> anyhow::Result<()> {
        let result = self.try_load(url).await;
        if let Err(e) = &result {
            // nothing inside mpv will report this one
            let _ = self
                .signal_tx
                .send(TransportSignal::Error(format!("load failed: {}", e)))
                .await;
        }
        result
    }

    async fn set_muted(&mut self, muted: bool) -> anyhow::Result<()> {
        self.driver.set_muted(muted);
        self.connected().await?.set_mute(muted).await
    }

    async fn shutdown(&mut self) {
        self.handle = None;
        self.driver.kill().await;
        info!("mpv: stopped");
    }
}
