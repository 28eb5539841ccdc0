//! Library catalog (`GET {api_base}/library`), fetched once per session.
//!
//! The payload is a list whose first entry is a `[key, value]` pair; the
//! value is the catalog, itself encoded as a JSON string.

use crate::error::{FeedError, Result};
use crate::fetch::Fetcher;
use serde_json::Value;
use tracing::{error, info};

#[derive(Clone)]
pub struct LibraryClient {
    fetcher: Fetcher,
    url: String,
}

impl LibraryClient {
    pub fn new(fetcher: Fetcher, url: String) -> Self {
        Self { fetcher, url }
    }

    /// Load the catalog.  Failures are reported and yield an empty catalog.
    pub async fn fetch(&self) -> Vec<String> {
        match self.try_fetch().await {
            Ok(catalog) => {
                info!("library: loaded {} tracks", catalog.len());
                catalog
            }
            Err(e) => {
                error!("library: {}, continuing with an empty catalog", e);
                Vec::new()
            }
        }
    }

    pub async fn try_fetch(&self) -> Result<Vec<String>> {
        let body: Value = self.fetcher.get_json(&self.url).await?;
        decode_library(&body)
    }
}

pub fn decode_library(body: &Value) -> Result<Vec<String>> {
    let entries = body
        .as_array()
        .ok_or_else(|| FeedError::Decode("library: expected a list".to_string()))?;

    let Some(first) = entries.first() else {
        return Ok(Vec::new());
    };

    let encoded = first
        .as_array()
        .and_then(|pair| pair.get(1))
        .ok_or_else(|| FeedError::Decode("library: first entry is not a pair".to_string()))?;

    match encoded {
        Value::String(s) => serde_json::from_str(s)
            .map_err(|e| FeedError::Decode(format!("library: catalog: {}", e))),
        Value::Array(_) => serde_json::from_value(encoded.clone())
            .map_err(|e| FeedError::Decode(format!("library: catalog: {}", e))),
        _ => Err(FeedError::Decode(
            "library: catalog is not an encoded list".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_encoded_catalog() {
        let body = json!([["library", "[\"/a/X.mp3\",\"/a/Y.mp3\"]"]]);
        assert_eq!(decode_library(&body).unwrap(), vec!["/a/X.mp3", "/a/Y.mp3"]);
    }

    #[test]
    fn test_decode_already_decoded_catalog() {
        let body = json!([["library", ["/a/X.mp3"]]]);
        assert_eq!(decode_library(&body).unwrap(), vec!["/a/X.mp3"]);
    }

    #[test]
    fn test_empty_container_is_empty_catalog() {
        assert!(decode_library(&json!([])).unwrap().is_empty());
    }

    #[test]
    fn test_only_first_entry_is_read() {
        let body = json!([["library", "[\"/first.mp3\"]"], ["other", "[\"/second.mp3\"]"]]);
        assert_eq!(decode_library(&body).unwrap(), vec!["/first.mp3"]);
    }

    #[test]
    fn test_malformed_payloads_are_decode_failures() {
        for body in [
            json!({"library": []}),
            json!(["not a pair"]),
            json!([["library"]]),
            json!([["library", "{broken"]]),
            json!([["library", 42]]),
            json!([["library", "[1, 2]"]]),
        ] {
            assert!(
                matches!(decode_library(&body), Err(FeedError::Decode(_))),
                "payload {body}"
            );
        }
    }
}
