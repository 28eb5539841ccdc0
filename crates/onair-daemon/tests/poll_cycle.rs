use axum::extract::{Query, State};
use axum::routing::get;
use axum::Router;
use onair_daemon::command::CommandClient;
use onair_daemon::fetch::Fetcher;
use onair_daemon::library::LibraryClient;
use onair_daemon::markup::MarkupClient;
use onair_daemon::poller::PollScheduler;
use onair_daemon::status::StatusClient;
use onair_proto::config::EndpointsConfig;
use onair_proto::protocol::SourceMode;
use onair_proto::state::ViewStateManager;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const MOUNT: &str = "Mount Point /stream.mp3";

/// What the fake radio server currently answers with.
#[derive(Default)]
struct Upstream {
    status: String,
    /// Answered to the next `/status` request only, after the delay.
    slow_status: Option<(Duration, String)>,
    slow_status_answered: bool,
    page: String,
    library: String,
    skips: usize,
    keywords: Vec<String>,
}

type Shared = Arc<Mutex<Upstream>>;

async fn serve_status(State(up): State<Shared>) -> String {
    let slow = {
        let mut up = up.lock().unwrap();
        match up.slow_status.take() {
            Some(slow) => slow,
            None => return up.status.clone(),
        }
    };
    let (delay, body) = slow;
    tokio::time::sleep(delay).await;
    up.lock().unwrap().slow_status_answered = true;
    body
}

async fn serve_page(State(up): State<Shared>) -> axum::response::Html<String> {
    axum::response::Html(up.lock().unwrap().page.clone())
}

async fn serve_library(State(up): State<Shared>) -> String {
    up.lock().unwrap().library.clone()
}

async fn serve_skip(State(up): State<Shared>) -> &'static str {
    up.lock().unwrap().skips += 1;
    "ok"
}

async fn serve_next(
    State(up): State<Shared>,
    Query(params): Query<HashMap<String, String>>,
) -> &'static str {
    if let Some(keyword) = params.get("keyword") {
        up.lock().unwrap().keywords.push(keyword.clone());
    }
    "ok"
}

/// Start the fake server on an ephemeral port and return its base URL.
async fn start_upstream(up: Shared) -> String {
    let app = Router::new()
        .route("/config/status", get(serve_status))
        .route("/config/library", get(serve_library))
        .route("/config/skip", get(serve_skip))
        .route("/config/next", get(serve_next))
        .route("/radio/status.xsl", get(serve_page))
        .with_state(up);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn status_body(queue: &str, source: &str, elapsed: &str, duration: &str) -> String {
    json!([
        ["queue", queue],
        ["source", source],
        ["elapsed", elapsed],
        ["remaining", "0"],
        ["duration", duration],
    ])
    .to_string()
}

fn status_page(heading: &str, now_playing: &str, listeners: &str) -> String {
    format!(
        r#"<html><body>
             <div class="roundbox">
               <div class="mounthead"><h3 class="mount">{}</h3></div>
               <div class="mountcont"><table class="yellowkeys"><tbody>
                 <tr><td>Listeners (current):</td><td class="streamstats">{}</td></tr>
                 <tr><td>Currently playing:</td><td class="streamstats">{}</td></tr>
               </tbody></table></div>
             </div>
           </body></html>"#,
        heading, listeners, now_playing
    )
}

struct Harness {
    upstream: Shared,
    base: String,
    fetcher: Fetcher,
    views: Arc<ViewStateManager>,
    cancel: CancellationToken,
}

impl Harness {
    async fn new() -> Self {
        let upstream: Shared = Arc::new(Mutex::new(Upstream {
            status: status_body(r#"["/music/Next One.mp3"]"#, "queue", "30", "120"),
            page: status_page(MOUNT, "Artist - Song", "7"),
            library: json!([["library", r#"["/music/Artist - Song #1.mp3","/music/Other.mp3"]"#]])
                .to_string(),
            ..Upstream::default()
        }));
        let base = start_upstream(upstream.clone()).await;
        Self {
            upstream,
            base,
            fetcher: Fetcher::new(Duration::from_secs(5)).unwrap(),
            views: Arc::new(ViewStateManager::new()),
            cancel: CancellationToken::new(),
        }
    }

    fn endpoints(&self) -> EndpointsConfig {
        EndpointsConfig {
            api_base: format!("{}/config", self.base),
            icecast_status_url: format!("{}/radio/status.xsl", self.base),
            ..EndpointsConfig::default()
        }
    }

    fn scheduler(&self, interval: Duration) -> PollScheduler {
        let endpoints = self.endpoints();
        PollScheduler::new(
            StatusClient::new(self.fetcher.clone(), endpoints.api_url("status")),
            MarkupClient::new(
                self.fetcher.clone(),
                endpoints.icecast_status_url.clone(),
                MOUNT.to_string(),
            ),
            self.views.clone(),
            interval,
            self.cancel.clone(),
        )
    }
}

#[tokio::test]
async fn cycle_commits_both_feeds() {
    let h = Harness::new().await;
    let scheduler = h.scheduler(Duration::from_secs(5));

    let outcome = scheduler.run_cycle(1).await.unwrap();
    assert!(outcome.track_applied);
    assert!(outcome.listeners_applied);

    let view = h.views.snapshot().await;
    assert_eq!(view.track.queue, vec!["/music/Next One.mp3".to_string()]);
    assert_eq!(view.track.source, SourceMode::Queue);
    assert_eq!(view.track.progress_percent(), 25.0);
    assert_eq!(view.listeners.now_playing, "Artist - Song");
    assert_eq!(view.listeners.listeners, 7);
    assert_eq!(view.track_cycle, 1);
    assert_eq!(view.listeners_cycle, 1);
    assert!(view.track_fetched_at.is_some());
}

#[tokio::test]
async fn missing_mount_keeps_previous_snapshot() {
    let h = Harness::new().await;
    let scheduler = h.scheduler(Duration::from_secs(5));
    scheduler.run_cycle(1).await.unwrap();

    {
        let mut up = h.upstream.lock().unwrap();
        up.page = status_page("Mount Point /other.ogg", "Someone Else", "99");
        up.status = status_body("[]", "random", "10", "200");
    }

    let outcome = scheduler.run_cycle(2).await.unwrap();
    assert!(outcome.track_applied);
    assert!(!outcome.listeners_applied);

    let view = h.views.snapshot().await;
    assert_eq!(view.listeners.now_playing, "Artist - Song");
    assert_eq!(view.listeners.listeners, 7);
    assert_eq!(view.listeners_cycle, 1);
    assert_eq!(view.track.source, SourceMode::Random);
    assert!(view.track.queue.is_empty());
}

#[tokio::test]
async fn undecodable_queue_only_stalls_the_track_slice() {
    let h = Harness::new().await;
    let scheduler = h.scheduler(Duration::from_secs(5));
    scheduler.run_cycle(1).await.unwrap();

    {
        let mut up = h.upstream.lock().unwrap();
        up.status = status_body("[not json", "random", "50", "100");
        up.page = status_page(MOUNT, "Artist - Next", "8");
    }

    let outcome = scheduler.run_cycle(2).await.unwrap();
    assert!(!outcome.track_applied);
    assert!(outcome.listeners_applied);

    let view = h.views.snapshot().await;
    assert_eq!(view.track.queue, vec!["/music/Next One.mp3".to_string()]);
    assert_eq!(view.track_cycle, 1);
    assert_eq!(view.listeners.now_playing, "Artist - Next");
    assert_eq!(view.listeners.listeners, 8);
}

#[tokio::test]
async fn late_cycle_does_not_overwrite_newer_data() {
    let h = Harness::new().await;
    let scheduler = h.scheduler(Duration::from_secs(5));
    scheduler.run_cycle(5).await.unwrap();

    h.upstream.lock().unwrap().page = status_page(MOUNT, "Stale", "1");
    let outcome = scheduler.run_cycle(4).await.unwrap();
    assert!(!outcome.changed());

    let view = h.views.snapshot().await;
    assert_eq!(view.listeners.now_playing, "Artist - Song");
    assert_eq!(view.listeners_cycle, 5);
}

#[tokio::test]
async fn overlapping_ticks_keep_the_newest_cycle() {
    let h = Harness::new().await;
    {
        let mut up = h.upstream.lock().unwrap();
        up.slow_status = Some((
            Duration::from_millis(2500),
            status_body("[]", "random", "10", "100"),
        ));
        up.status = status_body("[]", "random", "50", "100");
    }
    let handle = h.scheduler(Duration::from_secs(1)).spawn();

    // cycle 1 is stuck upstream while cycle 2 is issued and commits
    let first_commit = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let cycle = h.views.snapshot().await.track_cycle;
            if cycle != 0 {
                return cycle;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(first_commit, 2);
    assert_eq!(h.views.snapshot().await.track.elapsed_secs, 50.0);

    tokio::time::timeout(Duration::from_secs(5), async {
        while !h.upstream.lock().unwrap().slow_status_answered {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    // the late answer from cycle 1 was dropped on arrival
    let view = h.views.snapshot().await;
    assert!(view.track_cycle >= 2);
    assert_eq!(view.track.elapsed_secs, 50.0);

    h.cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn cancelled_scheduler_discards_results() {
    let h = Harness::new().await;
    let scheduler = h.scheduler(Duration::from_secs(5));
    let rev = h.views.rev().await;

    h.cancel.cancel();
    assert!(scheduler.run_cycle(1).await.is_none());
    assert_eq!(h.views.rev().await, rev);
}

#[tokio::test]
async fn first_cycle_runs_without_waiting_for_the_interval() {
    let h = Harness::new().await;
    let handle = h.scheduler(Duration::from_secs(3600)).spawn();

    let committed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let view = h.views.snapshot().await;
            if view.track_cycle == 1 && view.listeners_cycle == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(committed.is_ok());

    h.cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn library_is_decoded_from_the_nested_encoding() {
    let h = Harness::new().await;
    let library = LibraryClient::new(h.fetcher.clone(), h.endpoints().api_url("library"));

    let catalog = library.fetch().await;
    assert_eq!(
        catalog,
        vec![
            "/music/Artist - Song #1.mp3".to_string(),
            "/music/Other.mp3".to_string()
        ]
    );
}

#[tokio::test]
async fn broken_library_yields_empty_catalog() {
    let h = Harness::new().await;
    h.upstream.lock().unwrap().library = "{}".to_string();
    let library = LibraryClient::new(h.fetcher.clone(), h.endpoints().api_url("library"));

    assert!(library.fetch().await.is_empty());
    assert!(library.try_fetch().await.is_err());
}

#[tokio::test]
async fn commands_reach_the_control_endpoints() {
    let h = Harness::new().await;
    let commands = CommandClient::new(h.fetcher.clone(), &h.endpoints());

    commands.skip().await;
    commands
        .request_by_keyword("/music/Artist - Song #1.mp3")
        .await;

    let up = h.upstream.lock().unwrap();
    assert_eq!(up.skips, 1);
    assert_eq!(up.keywords, vec!["Artist - Song #1.mp3".to_string()]);
}
