//! Fire-and-forget control requests.  Nothing in the response is read; the
//! next poll cycle shows whether the command took effect.

use crate::fetch::Fetcher;
use onair_proto::config::EndpointsConfig;
use onair_proto::protocol::basename;
use tracing::{info, warn};

#[derive(Clone)]
pub struct CommandClient {
    fetcher: Fetcher,
    skip_url: String,
    next_url: String,
}

impl CommandClient {
    pub fn new(fetcher: Fetcher, endpoints: &EndpointsConfig) -> Self {
        Self {
            fetcher,
            skip_url: endpoints.api_url("skip"),
            next_url: endpoints.api_url("next"),
        }
    }

    pub async fn skip(&self) {
        match self.fetcher.get_discard(&self.skip_url).await {
            Ok(()) => info!("command: skip sent"),
            Err(e) => warn!("command: skip failed: {}", e),
        }
    }

    /// Ask the server to queue the track whose filename matches `path`'s
    /// basename.
    pub async fn request_by_keyword(&self, path: &str) {
        let url = self.request_url(path);
        match self.fetcher.get_discard(&url).await {
            Ok(()) => info!("command: requested '{}'", basename(path)),
            Err(e) => warn!("command: request for '{}' failed: {}", basename(path), e),
        }
    }

    pub fn request_url(&self, path: &str) -> String {
        format!(
            "{}?keyword={}",
            self.next_url,
            urlencoding::encode(basename(path))
        )
    }
}
