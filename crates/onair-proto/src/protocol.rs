use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where the upstream scheduler is currently picking tracks from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SourceMode {
    /// Playing listener requests.
    Queue,
    /// Shuffling through the library.
    #[default]
    Random,
}

impl SourceMode {
    /// Anything other than the exact text `queue` counts as random.
    pub fn from_wire(raw: &str) -> Self {
        if raw.trim() == "queue" {
            SourceMode::Queue
        } else {
            SourceMode::Random
        }
    }

    /// Badge text shown next to the now-playing title.
    pub fn label(&self) -> &'static str {
        match self {
            SourceMode::Queue => "REQUEST",
            SourceMode::Random => "RANDOM",
        }
    }
}

/// Decoded structured status feed.  Replaced wholesale on every successful
/// poll; `elapsed <= duration` is not enforced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TrackStatus {
    pub queue: Vec<String>,
    pub source: SourceMode,
    pub elapsed_secs: f64,
    pub remaining_secs: f64,
    pub duration_secs: f64,
}

impl TrackStatus {
    /// Progress through the current track, 0..=100.
    pub fn progress_percent(&self) -> f64 {
        progress_percent(self.elapsed_secs, self.duration_secs)
    }
}

/// `0` when there is no duration, otherwise `elapsed / duration` as a
/// percentage capped at 100.
pub fn progress_percent(elapsed_secs: f64, duration_secs: f64) -> f64 {
    if duration_secs > 0.0 {
        (elapsed_secs / duration_secs * 100.0).clamp(0.0, 100.0)
    } else {
        0.0
    }
}

/// What the Icecast status page says about our mount.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ListenerSnapshot {
    /// May legitimately be empty.
    pub now_playing: String,
    pub listeners: u64,
}

/// Audio transport lifecycle as seen by the reconnection controller.
///
/// Transitions:
///   Idle -> Connecting -> Live <-> Paused
///   any -> Reconnecting(n+1) -> Live | Reconnecting(n+2) | Failed
///   Failed is terminal until an external reset.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PlaybackState {
    #[default]
    Idle,
    Connecting,
    Live,
    Paused,
    Reconnecting { attempt: u32 },
    Failed,
}

impl PlaybackState {
    pub fn is_live(&self) -> bool {
        matches!(self, PlaybackState::Live)
    }

    /// Only exhausting every retry is reported to the listener as offline.
    pub fn is_offline(&self) -> bool {
        matches!(self, PlaybackState::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SearchState {
    pub query: String,
}

/// The single composite the presentation layer observes.
///
/// Field groups have exactly one writer each: the poll scheduler owns
/// `track`/`listeners`, the library loader owns `library`, the search intent
/// owns `search`, and the playback controller owns `playback`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MergedViewState {
    /// Monotonic revision counter, incremented on every change.
    #[serde(default)]
    pub rev: u64,
    pub track: TrackStatus,
    pub listeners: ListenerSnapshot,
    pub library: Vec<String>,
    #[serde(default)]
    pub library_loaded: bool,
    pub search: SearchState,
    pub playback: PlaybackState,
    /// Poll cycle that last committed each feed slice.  Later-issued cycles
    /// win; results from earlier cycles never overwrite them.
    #[serde(default)]
    pub track_cycle: u64,
    #[serde(default)]
    pub listeners_cycle: u64,
    pub track_fetched_at: Option<DateTime<Utc>>,
    pub listeners_fetched_at: Option<DateTime<Utc>>,
}

impl MergedViewState {
    /// The first `limit` catalog entries matching the current search query.
    pub fn search_matches(&self, limit: usize) -> Vec<&str> {
        crate::search::bounded_matches(&self.search.query, &self.library, limit)
    }
}

/// Last path segment, used for display and for keyword requests.
pub fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
