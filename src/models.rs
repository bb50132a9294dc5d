//! Core data structures shared across modules

use serde::{Deserialize, Serialize};

/// A content item returned by the discovery collaborator.
///
/// The `id` is the stable identifier the whole engine keys on: the dedup
/// registry, the schedule payload, and the CMS dedupe key all carry it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateItem {
    /// Stable content identifier from the catalog
    pub id: String,

    /// Display title
    pub title: String,

    /// Raw descriptive text (input to the rewrite collaborator)
    #[serde(default)]
    pub summary: String,

    /// Canonical URL of the item at its source, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,

    /// Free-form classification tags
    #[serde(default)]
    pub tags: Vec<String>,
}

impl CandidateItem {
    /// Create a candidate with just an id and title (tests, fixtures)
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            summary: String::new(),
            source_url: None,
            tags: Vec::new(),
        }
    }
}

/// The opaque snapshot a schedule entry carries: everything the publish
/// call needs, captured at scheduling time so the entry stays executable
/// even if the discovery source changes or disappears.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishPayload {
    /// Stable content identifier (doubles as the CMS dedupe key)
    pub content_id: String,

    /// Post title
    pub title: String,

    /// Publish-ready body text
    pub body: String,

    /// Tags forwarded to the CMS
    #[serde(default)]
    pub tags: Vec<String>,

    /// Source URL, kept for attribution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
}

impl PublishPayload {
    /// Deterministic key the remote CMS can use to reject accidental re-sends
    pub fn dedupe_key(&self) -> &str {
        &self.content_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_item_new() {
        let item = CandidateItem::new("d_590748", "Sample Work");
        assert_eq!(item.id, "d_590748");
        assert_eq!(item.title, "Sample Work");
        assert!(item.summary.is_empty());
        assert!(item.tags.is_empty());
    }

    #[test]
    fn test_payload_dedupe_key_is_content_id() {
        let payload = PublishPayload {
            content_id: "d_590748".to_string(),
            title: "Sample Work".to_string(),
            body: "Body".to_string(),
            tags: vec![],
            source_url: None,
        };
        assert_eq!(payload.dedupe_key(), "d_590748");
    }

    #[test]
    fn test_candidate_item_deserialize_defaults() {
        let item: CandidateItem =
            serde_json::from_str(r#"{"id": "d_1", "title": "T"}"#).unwrap();
        assert!(item.summary.is_empty());
        assert!(item.source_url.is_none());
        assert!(item.tags.is_empty());
    }
}
