//! Playback controller: keeps the audio transport on the live
//! stream through transient failures.
//!
//! Driven by transport lifecycle signals:
//!
//! ```text
//!   Idle ──start──▶ Connecting ──Playing──▶ Live ◀──Playing── Paused
//!                        │                   │  └──Paused──▶───┘
//!                        └──────Error────────┴──▶ Reconnecting(n+1) ──(n ≥ max)──▶ Failed
//! ```
//!
//! Each `Error` schedules one retry after `min(base * (n + 1), cap)`.  The
//! growth is linear, not doubling.  A retry that itself fails is swallowed;
//! the transport's next `Error` signal drives the next step.  A pause while
//! reconnecting leaves the scheduled retry in place.  `Failed` only leaves
//! through an explicit reset.

use chrono::Utc;
use onair_proto::config::PlaybackConfig;
use onair_proto::protocol::PlaybackState;
use onair_proto::state::ViewStateManager;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Lifecycle events reported by the audio transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportSignal {
    /// Audio is actually flowing.
    Playing,
    Paused,
    Error(String),
}

/// Intents from outside the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackCommand {
    /// Leave whatever state we are in (including `Failed`) and connect afresh.
    Reset,
}

/// The audio sink.  Implementations report lifecycle changes separately,
/// through the `TransportSignal` channel handed to the controller.
pub trait AudioTransport {
    /// Point the transport at `url` and start playing.
    fn load(&mut self, url: &str) -> impl Future<Output = anyhow::Result<()>> + Send;

    fn set_muted(&mut self, muted: bool) -> impl Future<Output = anyhow::Result<()>> + Send;

    fn shutdown(&mut self) -> impl Future<Output = ()> + Send;
}

/// Linear, capped retry schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub cap: Duration,
    pub max_attempts: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(3000),
            cap: Duration::from_millis(15000),
            max_attempts: 5,
        }
    }
}

impl Backoff {
    pub fn from_config(config: &PlaybackConfig) -> Self {
        Self {
            base: Duration::from_millis(config.base_delay_ms),
            cap: Duration::from_millis(config.delay_cap_ms),
            max_attempts: config.max_attempts,
        }
    }

    /// `min(base * (attempt + 1), cap)`.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base
            .saturating_mul(attempt.saturating_add(1))
            .min(self.cap)
    }

    /// Delay before the next retry, or `None` once `attempt` has reached
    /// the limit.
    pub fn next_retry(&self, attempt: u32) -> Option<Duration> {
        (attempt < self.max_attempts).then(|| self.delay(attempt))
    }
}

/// Append a fresh `nocache` parameter so no cache along the way replays an
/// old stream response.
pub fn cache_busted_url(stream_url: &str, nonce: i64) -> String {
    let sep = if stream_url.contains('?') { '&' } else { '?' };
    format!("{}{}nocache={}", stream_url, sep, nonce)
}

pub struct PlaybackController<T: AudioTransport> {
    transport: T,
    backoff: Backoff,
    stream_url: String,
    autoplay_muted: bool,
    views: Arc<ViewStateManager>,
    state: PlaybackState,
    /// Sole writer of the reconnection counter.
    attempts: u32,
    retry_at: Option<Instant>,
}

impl<T: AudioTransport> PlaybackController<T> {
    pub fn new(
        transport: T,
        backoff: Backoff,
        stream_url: String,
        autoplay_muted: bool,
        views: Arc<ViewStateManager>,
    ) -> Self {
        Self {
            transport,
            backoff,
            stream_url,
            autoplay_muted,
            views,
            state: PlaybackState::Idle,
            attempts: 0,
            retry_at: None,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// When the pending retry fires, if one is scheduled.
    pub fn retry_at(&self) -> Option<Instant> {
        self.retry_at
    }

    /// Session start: autoplay, muted if configured, as browsers demand.
    pub async fn start(&mut self) {
        if self.state != PlaybackState::Idle {
            debug!("playback: start ignored in {:?}", self.state);
            return;
        }
        self.set_state(PlaybackState::Connecting).await;
        if self.autoplay_muted {
            if let Err(e) = self.transport.set_muted(true).await {
                warn!("playback: could not mute before autoplay: {}", e);
            }
        }
        self.connect().await;
    }

    pub async fn handle_signal(&mut self, signal: TransportSignal) {
        if self.state == PlaybackState::Failed {
            debug!("playback: {:?} ignored, controller has failed", signal);
            return;
        }

        match signal {
            TransportSignal::Playing => {
                self.retry_at = None;
                self.attempts = 0;
                self.set_state(PlaybackState::Live).await;
                // only now that audio is confirmed
                if let Err(e) = self.transport.set_muted(false).await {
                    warn!("playback: unmute failed: {}", e);
                }
            }
            TransportSignal::Paused => match self.state {
                PlaybackState::Live | PlaybackState::Connecting => {
                    self.set_state(PlaybackState::Paused).await;
                }
                other => debug!("playback: pause ignored in {:?}", other),
            },
            TransportSignal::Error(reason) => {
                warn!("playback: transport error: {}", reason);
                match self.backoff.next_retry(self.attempts) {
                    Some(delay) => {
                        self.attempts += 1;
                        warn!(
                            "playback: reconnect attempt {}/{} in {:?}",
                            self.attempts, self.backoff.max_attempts, delay
                        );
                        self.retry_at = Some(Instant::now() + delay);
                        self.set_state(PlaybackState::Reconnecting {
                            attempt: self.attempts,
                        })
                        .await;
                    }
                    None => {
                        error!(
                            "playback: giving up after {} reconnect attempts",
                            self.attempts
                        );
                        self.retry_at = None;
                        self.set_state(PlaybackState::Failed).await;
                    }
                }
            }
        }
    }

    /// The backoff timer went off: reload the stream.
    pub async fn fire_retry(&mut self) {
        self.retry_at = None;
        if !matches!(self.state, PlaybackState::Reconnecting { .. }) {
            debug!("playback: retry skipped in {:?}", self.state);
            return;
        }
        info!("playback: reconnecting (attempt {})", self.attempts);
        self.connect().await;
    }

    /// External reset, the only way out of `Failed`.
    pub async fn reset(&mut self) {
        info!("playback: reset from {:?}", self.state);
        self.retry_at = None;
        self.attempts = 0;
        self.set_state(PlaybackState::Idle).await;
        self.start().await;
    }

    /// Drive the controller until `cancel` fires, then shut the transport down.
    pub async fn run(
        mut self,
        mut signals: mpsc::Receiver<TransportSignal>,
        mut commands: mpsc::Receiver<PlaybackCommand>,
        cancel: CancellationToken,
    ) {
        self.start().await;

        loop {
            let retry_at = self.retry_at;
            let retry = async move {
                match retry_at {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("playback: stopping");
                    break;
                }
                Some(signal) = signals.recv() => self.handle_signal(signal).await,
                Some(command) = commands.recv() => match command {
                    PlaybackCommand::Reset => self.reset().await,
                },
                _ = retry => self.fire_retry().await,
            }
        }

        // a pending retry dies with the loop
        self.retry_at = None;
        self.transport.shutdown().await;
    }

    async fn connect(&mut self) {
        let url = cache_busted_url(&self.stream_url, Utc::now().timestamp_millis());
        debug!("playback: loading {}", url);
        if let Err(e) = self.transport.load(&url).await {
            // the transport reports the failure as an Error signal
            debug!("playback: load failed: {}", e);
        }
    }

    async fn set_state(&mut self, next: PlaybackState) {
        if self.state != next {
            info!("playback: {:?} → {:?}", self.state, next);
            self.state = next;
        }
        self.views.set_playback(next).await;
    }
}
