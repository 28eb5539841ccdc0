//! Session wiring: one fetcher, the feed clients, the shared view state, and
//! the long-running tasks that drive them.

use crate::command::CommandClient;
use crate::fetch::Fetcher;
use crate::http::{self, ApiContext};
use crate::library::LibraryClient;
use crate::markup::MarkupClient;
use crate::mpv::MpvTransport;
use crate::playback::{Backoff, PlaybackCommand, PlaybackController, TransportSignal};
use crate::poller::PollScheduler;
use crate::status::StatusClient;
use onair_proto::config::Config;
use onair_proto::state::ViewStateManager;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub struct Session {
    config: Config,
    views: Arc<ViewStateManager>,
    status: StatusClient,
    markup: MarkupClient,
    library: LibraryClient,
    commands: CommandClient,
    cancel: CancellationToken,
}

impl Session {
    pub fn new(config: Config, cancel: CancellationToken) -> anyhow::Result<Self> {
        let fetcher = Fetcher::new(config.polling.request_timeout())?;
        let endpoints = &config.endpoints;

        Ok(Self {
            views: Arc::new(ViewStateManager::new()),
            status: StatusClient::new(fetcher.clone(), endpoints.api_url("status")),
            markup: MarkupClient::new(
                fetcher.clone(),
                endpoints.icecast_status_url.clone(),
                endpoints.mount_heading.clone(),
            ),
            library: LibraryClient::new(fetcher.clone(), endpoints.api_url("library")),
            commands: CommandClient::new(fetcher, endpoints),
            config,
            cancel,
        })
    }

    /// Run until the cancel token fires.  Playback, when enabled, is driven on
    /// the calling task; everything else is spawned.
    pub async fn run(self) -> anyhow::Result<()> {
        // catalog is fetched once per session
        let library = self.library.clone();
        let views = self.views.clone();
        tokio::spawn(async move {
            views.load_library(library.fetch().await).await;
        });

        let poller = PollScheduler::new(
            self.status.clone(),
            self.markup.clone(),
            self.views.clone(),
            self.config.polling.interval(),
            self.cancel.clone(),
        )
        .spawn();

        let playback_channels = self.config.playback.enabled.then(|| {
            let (signal_tx, signal_rx) = mpsc::channel::<TransportSignal>(32);
            let (command_tx, command_rx) = mpsc::channel::<PlaybackCommand>(8);
            (signal_tx, signal_rx, command_tx, command_rx)
        });

        if self.config.http.enabled {
            let ctx = ApiContext {
                views: self.views.clone(),
                commands: self.commands.clone(),
                playback_tx: playback_channels.as_ref().map(|(_, _, tx, _)| tx.clone()),
                display_limit: self.config.search.display_limit,
            };
            http::start_server(
                self.config.http.bind_address.clone(),
                self.config.http.port,
                ctx,
                self.cancel.clone(),
            );
        }

        match playback_channels {
            Some((signal_tx, signal_rx, _command_tx, command_rx)) => {
                let playback = &self.config.playback;
                let controller = PlaybackController::new(
                    MpvTransport::new(playback.volume, signal_tx),
                    Backoff::from_config(playback),
                    self.config.endpoints.stream_url.clone(),
                    playback.autoplay_muted,
                    self.views.clone(),
                );
                controller.run(signal_rx, command_rx, self.cancel.clone()).await;
            }
            None => {
                info!("session: playback disabled");
                self.cancel.cancelled().await;
            }
        }

        let _ = poller.await;
        info!("session: stopped");
        Ok(())
    }
}
