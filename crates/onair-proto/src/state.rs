use crate::protocol::{ListenerSnapshot, MergedViewState, PlaybackState, TrackStatus};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Results of one poll cycle, applied together.  `None` means that feed
/// produced nothing usable this cycle and its slice stays as it was.
#[derive(Debug, Clone)]
pub struct PollCommit {
    /// Issue-order sequence number of the cycle (starts at 1).
    pub cycle: u64,
    pub issued_at: DateTime<Utc>,
    pub track: Option<TrackStatus>,
    pub listeners: Option<ListenerSnapshot>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CommitOutcome {
    pub track_applied: bool,
    pub listeners_applied: bool,
}

impl CommitOutcome {
    pub fn changed(&self) -> bool {
        self.track_applied || self.listeners_applied
    }
}

/// Owns the merged view.  Every mutation goes through one of the commit
/// operations below, each called by exactly one component.
pub struct ViewStateManager {
    state: Arc<RwLock<MergedViewState>>,
}

impl Default for ViewStateManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewStateManager {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(MergedViewState {
                rev: 1,
                ..MergedViewState::default()
            })),
        }
    }

    pub async fn snapshot(&self) -> MergedViewState {
        self.state.read().await.clone()
    }

    pub async fn rev(&self) -> u64 {
        self.state.read().await.rev
    }

    /// Apply both feed slices of a poll cycle under a single write lock.
    /// A slice is only taken if its cycle was issued after the one that
    /// last committed it, so a late response never regresses newer data.
    pub async fn commit_poll(&self, commit: PollCommit) -> CommitOutcome {
        let mut state = self.state.write().await;
        let mut outcome = CommitOutcome::default();

        if let Some(track) = commit.track {
            if commit.cycle > state.track_cycle {
                state.track = track;
                state.track_cycle = commit.cycle;
                state.track_fetched_at = Some(commit.issued_at);
                outcome.track_applied = true;
            } else {
                debug!(
                    "state: dropping status from cycle {} (have {})",
                    commit.cycle, state.track_cycle
                );
            }
        }

        if let Some(listeners) = commit.listeners {
            if commit.cycle > state.listeners_cycle {
                state.listeners = listeners;
                state.listeners_cycle = commit.cycle;
                state.listeners_fetched_at = Some(commit.issued_at);
                outcome.listeners_applied = true;
            } else {
                debug!(
                    "state: dropping listeners from cycle {} (have {})",
                    commit.cycle, state.listeners_cycle
                );
            }
        }

        if outcome.changed() {
            state.rev += 1;
        }
        outcome
    }

    pub async fn set_playback(&self, playback: PlaybackState) {
        let mut state = self.state.write().await;
        if state.playback != playback {
            state.playback = playback;
            state.rev += 1;
        }
    }

    /// The catalog is loaded once per session.  Returns false if a catalog
    /// was already accepted.
    pub async fn load_library(&self, catalog: Vec<String>) -> bool {
        let mut state = self.state.write().await;
        if state.library_loaded {
            warn!("state: library already loaded, ignoring reload");
            return false;
        }
        state.library = catalog;
        state.library_loaded = true;
        state.rev += 1;
        true
    }

    pub async fn set_search_query(&self, query: String) {
        let mut state = self.state.write().await;
        if state.search.query != query {
            state.search.query = query;
            state.rev += 1;
        }
    }

    pub async fn clear_search(&self) {
        self.set_search_query(String::new()).await;
    }
}
