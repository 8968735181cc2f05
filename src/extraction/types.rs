//! Core types for conversation discovery and extraction.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::stability::StabilityReport;

/// Category of a discovered listing entry.
///
/// Gems are pre-built assistant configurations. They appear in listings next
/// to real conversations but carry no dialogue history of their own, so they
/// are listed and never extracted.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandleKind {
    /// A persisted user/assistant dialogue.
    Conversation,
    /// A pre-built assistant configuration.
    Gem,
}

impl HandleKind {
    /// Classify a listing title.
    ///
    /// Gem titles carry a colon (`"S SystemEdge: planner"`); conversation
    /// titles do not.
    #[must_use]
    pub fn classify(title: &str) -> Self {
        if title.contains(':') {
            Self::Gem
        } else {
            Self::Conversation
        }
    }
}

/// Which listing surface an in-page element index refers to.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingSurface {
    /// The search listing page.
    Search,
    /// The landing-page sidebar (fallback path).
    Sidebar,
}

/// How a discovered entry can be opened.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Locator {
    /// A direct address.
    Url(String),
    /// Position within a listing surface's clickable elements, for entries
    /// the site renders without an address.
    Element {
        /// Surface the index was observed on.
        surface: ListingSurface,
        /// Zero-based position within that surface's clickables.
        index: usize,
    },
}

/// A discovered-but-not-yet-opened listing entry.
///
/// Created transiently during a discovery pass; only persisted if the caller
/// chooses to extract it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConversationHandle {
    /// Display title as rendered in the listing.
    pub title: String,
    /// Navigable locator.
    pub locator: Locator,
    /// Entry category, derived from the title.
    pub kind: HandleKind,
}

impl ConversationHandle {
    /// Create a handle, classifying it from its title.
    #[must_use]
    pub fn new(title: impl Into<String>, locator: Locator) -> Self {
        let title = title.into();
        let kind = HandleKind::classify(&title);
        Self {
            title,
            locator,
            kind,
        }
    }
}

/// Message sender role, inferred from the container structure.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    /// A user turn.
    User,
    /// An assistant turn.
    Assistant,
}

/// One turn of dialogue.
///
/// The timestamp is the wall-clock time of scraping; the source UI does not
/// reliably expose original send times.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    /// Identifier derived from the page's own element id where present.
    pub id: String,
    /// Sender role.
    pub sender: Sender,
    /// Message content; code blocks, tables, and lists survive as markdown.
    pub content: String,
    /// When this message was scraped.
    pub extracted_at: DateTime<Utc>,
}

/// The persisted unit: one complete extraction of one conversation.
///
/// Immutable after write. Repeated extractions of the same source produce
/// independent records distinguished by timestamp.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExtractedConversation {
    /// Conversation title.
    pub title: String,
    /// Source address.
    pub url: String,
    /// When the extraction ran.
    pub extracted_at: DateTime<Utc>,
    /// Derived message count, always equal to `messages.len()`.
    pub message_count: usize,
    /// Ordered message sequence, top-to-bottom as loaded.
    pub messages: Vec<Message>,
}

impl ExtractedConversation {
    /// Create a record, deriving the message count.
    #[must_use]
    pub fn new(title: impl Into<String>, url: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            extracted_at: Utc::now(),
            message_count: messages.len(),
            messages,
        }
    }
}

/// Paths of the artifacts one extraction produced.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArtifactSet {
    /// Raw markup artifact.
    pub raw_html: PathBuf,
    /// Converted markdown artifact; absent when conversion failed.
    pub markdown: Option<PathBuf>,
    /// JSON metadata artifact.
    pub metadata: PathBuf,
}

/// Metadata record persisted alongside the raw and converted artifacts.
///
/// Cross-references both artifact locations and carries the full message
/// sequence, so the analyzer can run without the live page.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConversationRecord {
    /// The extracted conversation.
    #[serde(flatten)]
    pub conversation: ExtractedConversation,
    /// Raw markup artifact location.
    pub raw_html_file: PathBuf,
    /// Markdown artifact location, when conversion succeeded.
    pub markdown_file: Option<PathBuf>,
    /// Character count of the raw markup.
    pub raw_chars: usize,
    /// Character count of the markdown rendering.
    pub markdown_chars: Option<usize>,
    /// Stability signals observed while the page settled.
    #[serde(default)]
    pub stability: Option<StabilityReport>,
}

/// Result flag for a single extraction operation.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// Extraction completed and artifacts were written.
    Success,
    /// Extraction fell below the minimum-content heuristic; no artifacts.
    LowConfidence,
    /// Extraction could not complete.
    Failed,
}

/// Structured result of one extraction, distinguishing "nothing found" from
/// "degraded" from "could not even attempt".
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExtractOutcome {
    /// Result flag.
    pub status: OutcomeStatus,
    /// Human-readable detail.
    pub message: String,
    /// The extracted conversation, when one was produced.
    pub conversation: Option<ExtractedConversation>,
    /// Written artifacts, when any were produced.
    pub artifacts: Option<ArtifactSet>,
    /// Stability signals, when the page was reached.
    pub stability: Option<StabilityReport>,
}

impl ExtractOutcome {
    /// Successful outcome.
    #[must_use]
    pub fn success(
        message: impl Into<String>,
        conversation: ExtractedConversation,
        artifacts: ArtifactSet,
        stability: StabilityReport,
    ) -> Self {
        Self {
            status: OutcomeStatus::Success,
            message: message.into(),
            conversation: Some(conversation),
            artifacts: Some(artifacts),
            stability: Some(stability),
        }
    }

    /// Below-threshold outcome; surfaced as a warning, never as a silent
    /// empty success.
    #[must_use]
    pub fn low_confidence(message: impl Into<String>, stability: StabilityReport) -> Self {
        Self {
            status: OutcomeStatus::LowConfidence,
            message: message.into(),
            conversation: None,
            artifacts: None,
            stability: Some(stability),
        }
    }

    /// Failed outcome.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Failed,
            message: message.into(),
            conversation: None,
            artifacts: None,
            stability: None,
        }
    }
}

/// Per-item result within a batch operation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchItem {
    /// Listing title of the item.
    pub title: String,
    /// Result flag for this item.
    pub status: OutcomeStatus,
    /// Human-readable detail.
    pub message: String,
    /// Written artifacts, when any were produced.
    pub artifacts: Option<ArtifactSet>,
}

/// Result of a batch operation that continues past individual failures.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchOutcome {
    /// Per-item outcomes in processing order.
    pub items: Vec<BatchItem>,
    /// Number of items attempted.
    pub attempted: usize,
    /// Number of items that produced artifacts.
    pub succeeded: usize,
}

impl BatchOutcome {
    /// Build a batch outcome, deriving the counters.
    #[must_use]
    pub fn from_items(items: Vec<BatchItem>) -> Self {
        let attempted = items.len();
        let succeeded = items
            .iter()
            .filter(|i| i.status == OutcomeStatus::Success)
            .count();
        Self {
            items,
            attempted,
            succeeded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gem_classification_requires_colon() {
        assert_eq!(HandleKind::classify("Project Plan"), HandleKind::Conversation);
        assert_eq!(HandleKind::classify("S SystemEdge: planner"), HandleKind::Gem);
        assert_eq!(HandleKind::classify("Notes"), HandleKind::Conversation);
    }

    #[test]
    fn test_every_gem_has_colon_and_no_conversation_does() {
        let titles = [
            "Project Plan",
            "S SystemEdge: planner",
            "Notes",
            "Writing coach: essays",
            "Debugging session",
        ];
        for title in titles {
            let handle = ConversationHandle::new(
                title,
                Locator::Element {
                    surface: ListingSurface::Search,
                    index: 0,
                },
            );
            match handle.kind {
                HandleKind::Gem => assert!(handle.title.contains(':')),
                HandleKind::Conversation => assert!(!handle.title.contains(':')),
            }
        }
    }

    #[test]
    fn test_message_count_is_derived() {
        let messages = vec![
            Message {
                id: "m1".to_string(),
                sender: Sender::User,
                content: "hello".to_string(),
                extracted_at: Utc::now(),
            },
            Message {
                id: "m2".to_string(),
                sender: Sender::Assistant,
                content: "hi there".to_string(),
                extracted_at: Utc::now(),
            },
        ];
        let conversation = ExtractedConversation::new("Title", "https://example.com", messages);
        assert_eq!(conversation.message_count, conversation.messages.len());
        assert_eq!(conversation.message_count, 2);
    }

    #[test]
    fn test_batch_outcome_counters() {
        let items = vec![
            BatchItem {
                title: "a".to_string(),
                status: OutcomeStatus::Success,
                message: String::new(),
                artifacts: None,
            },
            BatchItem {
                title: "b".to_string(),
                status: OutcomeStatus::Failed,
                message: "no content".to_string(),
                artifacts: None,
            },
            BatchItem {
                title: "c".to_string(),
                status: OutcomeStatus::LowConfidence,
                message: "too short".to_string(),
                artifacts: None,
            },
        ];
        let batch = BatchOutcome::from_items(items);
        assert_eq!(batch.attempted, 3);
        assert_eq!(batch.succeeded, 1);
    }
}
