//! PollScheduler: one repeating timer driving both status feeds.
//!
//! Every tick issues a cycle with the next sequence number.  The cycle
//! fetches the structured and markup feeds together and commits both
//! outcomes to the view state in one write, so observers never see one feed
//! advanced to a tick while the other is still in flight for it.
//!
//! Cycles are not serialised: a slow cycle keeps running when the next tick
//! fires.  Ordering is restored at commit time, where each feed slice only
//! accepts results from a cycle issued after the one it already holds.
//! Ticks that pile up behind a stalled runtime collapse into one
//! (`MissedTickBehavior::Skip`).
//!
//! Teardown cancels the timer.  In-flight cycles are left to finish but their
//! results are discarded.

use crate::markup::MarkupClient;
use crate::status::StatusClient;
use chrono::Utc;
use onair_proto::state::{CommitOutcome, PollCommit, ViewStateManager};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Clone)]
pub struct PollScheduler {
    status: StatusClient,
    markup: MarkupClient,
    views: Arc<ViewStateManager>,
    interval: Duration,
    cancel: CancellationToken,
}

impl PollScheduler {
    pub fn new(
        status: StatusClient,
        markup: MarkupClient,
        views: Arc<ViewStateManager>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            status,
            markup,
            views,
            interval,
            cancel,
        }
    }

    /// Start the timer.  The first cycle runs immediately.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(self) {
        info!("poller: polling every {:?}", self.interval);
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut next_cycle: u64 = 1;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("poller: stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let cycle = next_cycle;
                    next_cycle += 1;
                    let this = self.clone();
                    tokio::spawn(async move {
                        this.run_cycle(cycle).await;
                    });
                }
            }
        }
    }

    /// Fetch both feeds for `cycle` and commit whatever succeeded.  Returns
    /// `None` if the scheduler was torn down while the requests were out.
    pub async fn run_cycle(&self, cycle: u64) -> Option<CommitOutcome> {
        let issued_at = Utc::now();
        debug!("poller: cycle {} issued", cycle);

        let (track, listeners) = tokio::join!(self.status.fetch(), self.markup.fetch());

        if self.cancel.is_cancelled() {
            debug!("poller: cycle {} finished after teardown, discarded", cycle);
            return None;
        }

        let track = track.map_err(|e| e.report("status feed")).ok();
        let listeners = listeners.map_err(|e| e.report("icecast feed")).ok();

        let outcome = self
            .views
            .commit_poll(PollCommit {
                cycle,
                issued_at,
                track,
                listeners,
            })
            .await;
        debug!("poller: cycle {} committed {:?}", cycle, outcome);
        Some(outcome)
    }
}
