//! Artifact writing and markup-to-markdown conversion.
//!
//! Every successful extraction produces three artifacts sharing one
//! `structured_<slug>_<timestamp>` stem: the raw markup with a metadata
//! header, a markdown rendering, and a JSON record cross-referencing both.
//! A conversion failure is caught locally: the raw artifact is still written
//! so no extraction work is lost, the markdown artifact is omitted, and a
//! warning is surfaced. Uniqueness relies on the timestamp component alone;
//! two extractions within the same clock tick may collide.

use std::path::PathBuf;

use super::error::ExtractError;
use super::stability::StabilityReport;
use super::types::{ArtifactSet, ConversationRecord, ExtractedConversation, Sender};

/// Artifact stem prefix.
const ARTIFACT_KIND: &str = "structured";

/// Maximum slug length in the artifact stem.
const MAX_SLUG_CHARS: usize = 50;

/// Result of persisting one extraction.
#[derive(Clone, Debug)]
pub struct WrittenArtifacts {
    /// Paths of the written files.
    pub artifacts: ArtifactSet,
    /// The persisted metadata record.
    pub record: ConversationRecord,
    /// Set when markdown conversion failed and its artifact was omitted.
    pub conversion_warning: Option<String>,
}

/// Writes extraction artifacts under one output directory.
pub struct ArtifactWriter {
    output_dir: PathBuf,
}

impl ArtifactWriter {
    /// Create a writer rooted at the given directory.
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Persist one extraction as raw markup, markdown, and metadata.
    ///
    /// # Errors
    /// Returns an error if the directory or a file cannot be written. A
    /// markdown conversion failure is not an error; it is reported through
    /// [`WrittenArtifacts::conversion_warning`].
    pub fn write(
        &self,
        conversation: &ExtractedConversation,
        filtered_html: &str,
        stability: Option<StabilityReport>,
    ) -> Result<WrittenArtifacts, ExtractError> {
        std::fs::create_dir_all(&self.output_dir)?;

        let stem = artifact_stem(conversation);
        let raw_path = self.output_dir.join(format!("{stem}.html"));
        let markdown_path = self.output_dir.join(format!("{stem}.md"));
        let metadata_path = self.output_dir.join(format!("{stem}.json"));

        let raw_document = render_raw_document(conversation, filtered_html);
        std::fs::write(&raw_path, &raw_document)?;
        tracing::info!("raw markup saved to {}", raw_path.display());

        let (markdown_file, markdown_chars, conversion_warning) =
            match convert_markdown(conversation, filtered_html) {
                Ok(markdown) => {
                    std::fs::write(&markdown_path, &markdown)?;
                    tracing::info!("markdown saved to {}", markdown_path.display());
                    (Some(markdown_path), Some(markdown.chars().count()), None)
                }
                Err(e) => {
                    let warning = format!("markdown conversion failed: {e}");
                    tracing::warn!("{warning}");
                    (None, None, Some(warning))
                }
            };

        let record = ConversationRecord {
            conversation: conversation.clone(),
            raw_html_file: raw_path.clone(),
            markdown_file: markdown_file.clone(),
            raw_chars: raw_document.chars().count(),
            markdown_chars,
            stability,
        };
        std::fs::write(&metadata_path, serde_json::to_string_pretty(&record)?)?;
        tracing::info!("metadata saved to {}", metadata_path.display());

        Ok(WrittenArtifacts {
            artifacts: ArtifactSet {
                raw_html: raw_path,
                markdown: markdown_file,
                metadata: metadata_path,
            },
            record,
            conversion_warning,
        })
    }
}

/// Render the structured markdown document for a conversation.
///
/// # Errors
/// Returns [`ExtractError::ConversionFailed`] when the conversion routine
/// yields nothing for non-empty markup.
pub fn convert_markdown(
    conversation: &ExtractedConversation,
    filtered_html: &str,
) -> Result<String, ExtractError> {
    let probe = html2md::parse_html(filtered_html);
    if probe.trim().is_empty() && !filtered_html.trim().is_empty() {
        return Err(ExtractError::ConversionFailed);
    }

    let mut doc = format!(
        "# {}\n\n**Extracted:** {}\n**URL:** {}\n**Messages:** {}\n\n---\n\n",
        conversation.title,
        conversation.extracted_at.to_rfc3339(),
        conversation.url,
        conversation.message_count,
    );

    for (index, message) in conversation.messages.iter().enumerate() {
        let sender = match message.sender {
            Sender::User => "User",
            Sender::Assistant => "Assistant",
        };
        doc.push_str(&format!(
            "## {sender} (Message {})\n\n{}\n\n---\n\n",
            index + 1,
            message.content,
        ));
    }

    Ok(doc)
}

/// Render the raw markup artifact with its metadata header.
fn render_raw_document(conversation: &ExtractedConversation, filtered_html: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n    <meta charset=\"UTF-8\">\n    \
         <title>{title}</title>\n</head>\n<body>\n    <h1>{title}</h1>\n    \
         <p><strong>Extracted:</strong> {extracted}</p>\n    \
         <p><strong>URL:</strong> {url}</p>\n    \
         <p><strong>Messages:</strong> {count}</p>\n    <hr>\n{body}\n</body>\n</html>\n",
        title = conversation.title,
        extracted = conversation.extracted_at.to_rfc3339(),
        url = conversation.url,
        count = conversation.message_count,
        body = filtered_html,
    )
}

/// Stem shared by the three artifacts of one extraction.
fn artifact_stem(conversation: &ExtractedConversation) -> String {
    format!(
        "{ARTIFACT_KIND}_{}_{}",
        slugify(&conversation.title),
        conversation.extracted_at.format("%Y%m%d_%H%M%S"),
    )
}

/// Filesystem-safe slug of a title.
fn slugify(title: &str) -> String {
    let slug: String = title
        .trim()
        .chars()
        .filter_map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                Some(c)
            } else if c.is_whitespace() {
                Some('_')
            } else {
                None
            }
        })
        .take(MAX_SLUG_CHARS)
        .collect();

    if slug.is_empty() {
        "conversation".to_string()
    } else {
        slug
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::types::Message;
    use chrono::Utc;

    fn sample_conversation() -> ExtractedConversation {
        let messages = vec![
            Message {
                id: "c0".to_string(),
                sender: Sender::User,
                content: "How should the retry budget be sized?".to_string(),
                extracted_at: Utc::now(),
            },
            Message {
                id: "c0".to_string(),
                sender: Sender::Assistant,
                content: "Three attempts with exponential backoff is plenty here.".to_string(),
                extracted_at: Utc::now(),
            },
        ];
        ExtractedConversation::new("Retry budget sizing", "https://example.com/app/abc", messages)
    }

    #[test]
    fn test_write_produces_three_cross_referenced_artifacts() {
        let Ok(dir) = tempfile::tempdir() else {
            return;
        };
        let writer = ArtifactWriter::new(dir.path());
        let conversation = sample_conversation();

        let written = writer.write(&conversation, "<div><p>body</p></div>", None);
        assert!(written.is_ok());
        let Ok(written) = written else {
            return;
        };

        assert!(written.artifacts.raw_html.exists());
        assert!(written.artifacts.metadata.exists());
        assert!(written.conversion_warning.is_none());
        assert!(written.artifacts.markdown.as_ref().is_some_and(|p| p.exists()));

        let raw = std::fs::read_to_string(&written.artifacts.metadata).unwrap_or_default();
        let parsed: Result<ConversationRecord, _> = serde_json::from_str(&raw);
        assert!(parsed.is_ok());
        if let Ok(record) = parsed {
            assert_eq!(record.conversation.message_count, record.conversation.messages.len());
            assert_eq!(record.conversation.message_count, 2);
            assert_eq!(record.raw_html_file, written.artifacts.raw_html);
            assert_eq!(record.markdown_file, written.artifacts.markdown);
            assert!(record.raw_chars > 0);
        }
    }

    #[test]
    fn test_artifact_stem_embeds_kind_slug_and_timestamp() {
        let conversation = sample_conversation();
        let stem = artifact_stem(&conversation);

        assert!(stem.starts_with("structured_Retry_budget_sizing_"));
        let timestamp = conversation.extracted_at.format("%Y%m%d_%H%M%S").to_string();
        assert!(stem.ends_with(&timestamp));
    }

    #[test]
    fn test_slugify_strips_unsafe_characters() {
        assert_eq!(slugify("S SystemEdge: planner"), "S_SystemEdge_planner");
        assert_eq!(slugify("a/b\\c?d"), "abcd");
        assert_eq!(slugify("   "), "conversation");
        assert_eq!(slugify(&"x".repeat(80)).chars().count(), 50);
    }

    #[test]
    fn test_markdown_document_structure() {
        let conversation = sample_conversation();
        let markdown = convert_markdown(&conversation, "<p>body</p>");

        assert!(markdown.is_ok());
        if let Ok(doc) = markdown {
            assert!(doc.starts_with("# Retry budget sizing"));
            assert!(doc.contains("**Messages:** 2"));
            assert!(doc.contains("## User (Message 1)"));
            assert!(doc.contains("## Assistant (Message 2)"));
        }
    }

    #[test]
    fn test_markdown_conversion_of_empty_markup_is_not_an_error() {
        let conversation = sample_conversation();
        let markdown = convert_markdown(&conversation, "");
        assert!(markdown.is_ok());
    }
}
