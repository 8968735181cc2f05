//! Offline analysis over previously persisted extraction artifacts.
//!
//! Purely a read-and-compute pass: every `structured_*.json` record in the
//! output directory is loaded, per-conversation statistics are computed, and
//! everything is aggregated into a summary. Nothing is mutated and the whole
//! result is recomputed from scratch on every run. A record that fails to
//! parse is skipped with a warning, not fatal to the batch.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::extraction::types::{ConversationRecord, Sender};
use crate::extraction::ExtractError;

/// Fixed technical-term dictionary, matched case-insensitively as words.
const TECHNICAL_TERM_PATTERNS: &[&str] = &[
    r"\b(?:API|SDK|CLI|JWT|OAuth|HTTP|HTTPS|REST|GraphQL|JSON|XML|YAML|SQL|NoSQL)\b",
    r"\b(?:Docker|Kubernetes|AWS|GCP|Azure|GitHub|GitLab)\b",
    r"\b(?:Python|JavaScript|TypeScript|Java|Rust|Go|Ruby|PHP)\b",
    r"\b(?:React|Vue|Angular|Express|Django|Flask|FastAPI)\b",
    r"\b(?:MongoDB|PostgreSQL|MySQL|Redis|Elasticsearch|Kafka)\b",
    r"\b(?:Playwright|Selenium|Puppeteer|Cypress)\b",
    r"\b(?:AI|ML|LLM|NLP|GPT|BERT|Transformer)\b",
];

/// Code detection patterns: fenced blocks, inline code, HTML code tags.
const CODE_PATTERNS: &[&str] = &[r"(?s)```.*?```", r"`[^`\n]+`", r"(?s)<code>.*?</code>"];

/// Qualitative shape of one conversation.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationPattern {
    /// Roughly even split between user and assistant turns.
    Balanced,
    /// Mostly user turns, typically question streams.
    UserDriven,
    /// Mostly assistant turns with long responses.
    AssistantHeavy,
    /// Wide spread of technical vocabulary.
    Technical,
    /// Dominated by code examples.
    CodeHeavy,
}

impl ConversationPattern {
    /// Stable label used in summaries.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Balanced => "balanced",
            Self::UserDriven => "user-driven",
            Self::AssistantHeavy => "assistant-heavy",
            Self::Technical => "technical",
            Self::CodeHeavy => "code-heavy",
        }
    }
}

/// Statistics for one persisted conversation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConversationStats {
    /// Conversation title.
    pub title: String,
    /// Total messages.
    pub total_messages: usize,
    /// User turns.
    pub user_messages: usize,
    /// Assistant turns.
    pub assistant_messages: usize,
    /// Mean message length in characters.
    pub avg_message_length: f64,
    /// Longest message length.
    pub max_message_length: usize,
    /// Code block and inline code occurrences.
    pub code_blocks: usize,
    /// Question marks in user turns.
    pub questions_asked: usize,
    /// Distinct technical terms, uppercased.
    pub technical_terms: Vec<String>,
    /// Distinct topic tags.
    pub topics: Vec<String>,
    /// Qualitative classification.
    pub pattern: ConversationPattern,
}

/// Aggregate over a whole artifact directory.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AnalysisSummary {
    /// Conversations analyzed.
    pub total_conversations: usize,
    /// Records that failed to parse and were skipped.
    pub skipped_files: usize,
    /// Messages across all conversations.
    pub total_messages: usize,
    /// User turns across all conversations.
    pub total_user_messages: usize,
    /// Assistant turns across all conversations.
    pub total_assistant_messages: usize,
    /// Mean messages per conversation.
    pub avg_messages_per_conversation: f64,
    /// Most common technical terms with counts, descending.
    pub top_technical_terms: Vec<(String, usize)>,
    /// Most common topic tags with counts, descending.
    pub top_topics: Vec<(String, usize)>,
    /// Pattern label frequencies, descending.
    pub patterns: Vec<(String, usize)>,
    /// Titles of the analyzed conversations.
    pub titles: Vec<String>,
    /// When the analysis ran.
    pub generated_at: DateTime<Utc>,
}

/// One persisted extraction, as shown by the listing operation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExtractListing {
    /// Conversation title.
    pub title: String,
    /// Source address.
    pub url: String,
    /// When the extraction ran.
    pub extracted_at: DateTime<Utc>,
    /// Message count recorded in the metadata.
    pub message_count: usize,
    /// Metadata file path.
    pub metadata_file: PathBuf,
}

/// Analyzer over a directory of persisted artifacts.
pub struct Analyzer {
    extracts_dir: PathBuf,
    term_patterns: Vec<Regex>,
    code_patterns: Vec<Regex>,
    topic_keywords: Vec<(String, Vec<String>)>,
}

impl Analyzer {
    /// Create an analyzer rooted at the given artifact directory.
    ///
    /// # Errors
    /// Returns an error if a dictionary pattern fails to compile.
    pub fn new(extracts_dir: impl Into<PathBuf>) -> Result<Self, ExtractError> {
        let term_patterns = TECHNICAL_TERM_PATTERNS
            .iter()
            .map(|pattern| Regex::new(&format!("(?i){pattern}")))
            .collect::<Result<Vec<_>, _>>()?;
        let code_patterns = CODE_PATTERNS
            .iter()
            .map(|pattern| Regex::new(pattern))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            extracts_dir: extracts_dir.into(),
            term_patterns,
            code_patterns,
            topic_keywords: default_topic_keywords(),
        })
    }

    /// Analyze every parseable record in the directory.
    ///
    /// # Errors
    /// Returns an error only if the directory itself cannot be read.
    pub fn analyze_all(&self) -> Result<(AnalysisSummary, Vec<ConversationStats>), ExtractError> {
        let mut stats = Vec::new();
        let mut skipped = 0usize;

        for path in metadata_files(&self.extracts_dir)? {
            match crate::extraction::load_record(&path) {
                Ok(record) => stats.push(self.analyze_record(&record)),
                Err(e) => {
                    tracing::warn!("skipping unparseable record {}: {e}", path.display());
                    skipped += 1;
                }
            }
        }

        let summary = summarize(&stats, skipped);
        Ok((summary, stats))
    }

    /// Compute statistics for a single record.
    #[must_use]
    pub fn analyze_record(&self, record: &ConversationRecord) -> ConversationStats {
        let conversation = &record.conversation;

        let mut user_messages = 0usize;
        let mut assistant_messages = 0usize;
        let mut questions_asked = 0usize;
        let mut code_blocks = 0usize;
        let mut lengths = Vec::with_capacity(conversation.messages.len());
        let mut terms = Vec::new();
        let mut topics = Vec::new();

        for message in &conversation.messages {
            let content = &message.content;
            lengths.push(content.chars().count());

            match message.sender {
                Sender::User => {
                    user_messages += 1;
                    questions_asked += content.matches('?').count();
                }
                Sender::Assistant => assistant_messages += 1,
            }

            for pattern in &self.code_patterns {
                code_blocks += pattern.find_iter(content).count();
            }
            for pattern in &self.term_patterns {
                terms.extend(
                    pattern
                        .find_iter(content)
                        .map(|m| m.as_str().to_uppercase()),
                );
            }

            let lower = content.to_lowercase();
            for (topic, keywords) in &self.topic_keywords {
                if keywords.iter().any(|k| lower.contains(k.as_str())) {
                    topics.push(topic.clone());
                }
            }
        }

        let technical_terms = dedup_sorted(terms);
        let topics = dedup_sorted(topics);

        let total_messages = conversation.messages.len();
        let total_chars: usize = lengths.iter().sum();
        let avg_message_length = if total_messages == 0 {
            0.0
        } else {
            total_chars as f64 / total_messages as f64
        };

        let pattern = classify_pattern(
            total_messages,
            user_messages,
            code_blocks,
            technical_terms.len(),
        );

        ConversationStats {
            title: conversation.title.clone(),
            total_messages,
            user_messages,
            assistant_messages,
            avg_message_length,
            max_message_length: lengths.iter().copied().max().unwrap_or(0),
            code_blocks,
            questions_asked,
            technical_terms,
            topics,
            pattern,
        }
    }
}

/// List persisted extractions, newest first.
///
/// # Errors
/// Returns an error if the directory cannot be read.
pub fn list_extracts(extracts_dir: &Path) -> Result<Vec<ExtractListing>, ExtractError> {
    let mut listings = Vec::new();

    for path in metadata_files(extracts_dir)? {
        match crate::extraction::load_record(&path) {
            Ok(record) => listings.push(ExtractListing {
                title: record.conversation.title,
                url: record.conversation.url,
                extracted_at: record.conversation.extracted_at,
                message_count: record.conversation.message_count,
                metadata_file: path,
            }),
            Err(e) => tracing::warn!("skipping unparseable record {}: {e}", path.display()),
        }
    }

    listings.sort_by(|a, b| b.extracted_at.cmp(&a.extracted_at));
    Ok(listings)
}

/// Qualitative classification of one conversation.
#[must_use]
pub fn classify_pattern(
    total_messages: usize,
    user_messages: usize,
    code_blocks: usize,
    unique_terms: usize,
) -> ConversationPattern {
    if code_blocks > 5 {
        return ConversationPattern::CodeHeavy;
    }
    if unique_terms > 10 {
        return ConversationPattern::Technical;
    }
    if total_messages == 0 {
        return ConversationPattern::Balanced;
    }

    let user_ratio = user_messages as f64 / total_messages as f64;
    if user_ratio > 0.6 {
        ConversationPattern::UserDriven
    } else if user_ratio < 0.3 {
        ConversationPattern::AssistantHeavy
    } else {
        ConversationPattern::Balanced
    }
}

/// Aggregate per-conversation statistics into a summary.
fn summarize(stats: &[ConversationStats], skipped_files: usize) -> AnalysisSummary {
    let total_conversations = stats.len();
    let total_messages: usize = stats.iter().map(|s| s.total_messages).sum();
    let total_user_messages: usize = stats.iter().map(|s| s.user_messages).sum();
    let total_assistant_messages: usize = stats.iter().map(|s| s.assistant_messages).sum();

    let avg_messages_per_conversation = if total_conversations == 0 {
        0.0
    } else {
        total_messages as f64 / total_conversations as f64
    };

    let top_technical_terms = frequency_table(
        stats.iter().flat_map(|s| s.technical_terms.iter().cloned()),
        10,
    );
    let top_topics = frequency_table(stats.iter().flat_map(|s| s.topics.iter().cloned()), 10);
    let patterns = frequency_table(
        stats.iter().map(|s| s.pattern.label().to_string()),
        usize::MAX,
    );

    AnalysisSummary {
        total_conversations,
        skipped_files,
        total_messages,
        total_user_messages,
        total_assistant_messages,
        avg_messages_per_conversation,
        top_technical_terms,
        top_topics,
        patterns,
        titles: stats.iter().map(|s| s.title.clone()).collect(),
        generated_at: Utc::now(),
    }
}

/// Metadata files in the directory, in name order for determinism.
fn metadata_files(dir: &Path) -> Result<Vec<PathBuf>, ExtractError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension().is_some_and(|ext| ext == "json")
                && path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.starts_with("structured_"))
        })
        .collect();

    files.sort();
    Ok(files)
}

/// Count occurrences and keep the `limit` most frequent, descending.
fn frequency_table<I>(values: I, limit: usize) -> Vec<(String, usize)>
where
    I: Iterator<Item = String>,
{
    let mut counts: HashMap<String, usize> = HashMap::new();
    for value in values {
        *counts.entry(value).or_insert(0) += 1;
    }

    let mut table: Vec<(String, usize)> = counts.into_iter().collect();
    table.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    table.truncate(limit);
    table
}

/// Sorted, deduplicated copy of the values.
fn dedup_sorted(mut values: Vec<String>) -> Vec<String> {
    values.sort();
    values.dedup();
    values
}

/// Fixed topic-keyword dictionary.
fn default_topic_keywords() -> Vec<(String, Vec<String>)> {
    [
        ("authentication", vec!["auth", "login", "token", "jwt", "oauth", "credential"]),
        ("automation", vec!["playwright", "selenium", "automation", "script", "bot"]),
        ("architecture", vec!["architecture", "design", "pattern", "structure", "component"]),
        ("deployment", vec!["deploy", "docker", "kubernetes", "container"]),
        ("database", vec!["database", "sql", "mongodb", "postgresql", "redis"]),
        ("api", vec!["api", "endpoint", "rest", "graphql", "microservice"]),
        ("frontend", vec!["frontend", "ui", "react", "vue", "angular"]),
        ("backend", vec!["backend", "server", "django", "flask"]),
        ("testing", vec!["test", "unit", "integration", "e2e"]),
        ("security", vec!["security", "encryption", "ssl", "tls", "vulnerability"]),
        ("performance", vec!["performance", "optimization", "cache", "latency"]),
        ("monitoring", vec!["monitoring", "logging", "metrics", "observability"]),
    ]
    .into_iter()
    .map(|(topic, keywords)| {
        (
            topic.to_string(),
            keywords.into_iter().map(String::from).collect(),
        )
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::types::{ExtractedConversation, Message};

    fn message(sender: Sender, content: &str) -> Message {
        Message {
            id: "m".to_string(),
            sender,
            content: content.to_string(),
            extracted_at: Utc::now(),
        }
    }

    fn record(title: &str, messages: Vec<Message>) -> ConversationRecord {
        ConversationRecord {
            conversation: ExtractedConversation::new(title, "https://example.com/app/x", messages),
            raw_html_file: PathBuf::from("structured_x.html"),
            markdown_file: None,
            raw_chars: 0,
            markdown_chars: None,
            stability: None,
        }
    }

    #[test]
    fn test_pattern_classification_thresholds() {
        assert_eq!(classify_pattern(10, 5, 6, 0), ConversationPattern::CodeHeavy);
        assert_eq!(classify_pattern(10, 5, 0, 11), ConversationPattern::Technical);
        assert_eq!(classify_pattern(10, 7, 0, 0), ConversationPattern::UserDriven);
        assert_eq!(classify_pattern(10, 2, 0, 0), ConversationPattern::AssistantHeavy);
        assert_eq!(classify_pattern(10, 5, 0, 0), ConversationPattern::Balanced);
        assert_eq!(classify_pattern(0, 0, 0, 0), ConversationPattern::Balanced);
    }

    #[test]
    fn test_record_statistics() {
        let Ok(analyzer) = Analyzer::new("unused") else {
            return;
        };
        let record = record(
            "API discussion",
            vec![
                message(Sender::User, "How should the REST API handle retries?"),
                message(
                    Sender::Assistant,
                    "Wrap the HTTP client and cap attempts:\n```rust\nlet n = 3;\n```",
                ),
            ],
        );

        let stats = analyzer.analyze_record(&record);
        assert_eq!(stats.total_messages, 2);
        assert_eq!(stats.user_messages, 1);
        assert_eq!(stats.assistant_messages, 1);
        assert_eq!(stats.questions_asked, 1);
        assert!(stats.code_blocks >= 1);
        assert!(stats.technical_terms.contains(&"REST".to_string()));
        assert!(stats.technical_terms.contains(&"API".to_string()));
        assert!(stats.topics.contains(&"api".to_string()));
    }

    #[test]
    fn test_analyze_all_skips_unparseable_records() {
        let Ok(dir) = tempfile::tempdir() else {
            return;
        };
        let writer = crate::extraction::convert::ArtifactWriter::new(dir.path());
        let conversation = ExtractedConversation::new(
            "Queue design",
            "https://example.com/app/q",
            vec![
                message(Sender::User, "What queue depth should the worker pool use?"),
                message(Sender::Assistant, "Size it from the p99 service time."),
            ],
        );
        assert!(writer.write(&conversation, "<p>body</p>", None).is_ok());

        // A metadata-shaped file that is not valid JSON.
        let broken = dir.path().join("structured_broken_20240101_000000.json");
        assert!(std::fs::write(&broken, "{ not json").is_ok());

        let Ok(analyzer) = Analyzer::new(dir.path()) else {
            return;
        };
        let result = analyzer.analyze_all();
        assert!(result.is_ok());
        if let Ok((summary, stats)) = result {
            assert_eq!(summary.total_conversations, 1);
            assert_eq!(summary.skipped_files, 1);
            assert_eq!(summary.total_messages, 2);
            assert_eq!(stats.len(), 1);
        }
    }

    #[test]
    fn test_summary_counts_match_records() {
        let Ok(analyzer) = Analyzer::new("unused") else {
            return;
        };
        let records = [
            record(
                "One",
                vec![
                    message(Sender::User, "First question about deployment?"),
                    message(Sender::Assistant, "Deploy with the container pipeline."),
                ],
            ),
            record(
                "Two",
                vec![message(Sender::Assistant, "A single assistant note.")],
            ),
        ];

        let stats: Vec<ConversationStats> =
            records.iter().map(|r| analyzer.analyze_record(r)).collect();
        let summary = summarize(&stats, 0);

        assert_eq!(summary.total_conversations, 2);
        assert_eq!(summary.total_messages, 3);
        assert_eq!(summary.total_user_messages, 1);
        assert_eq!(summary.total_assistant_messages, 2);
        assert!((summary.avg_messages_per_conversation - 1.5).abs() < f64::EPSILON);
        assert_eq!(summary.titles, vec!["One".to_string(), "Two".to_string()]);
    }

    #[test]
    fn test_empty_directory_is_empty_result() {
        let Ok(dir) = tempfile::tempdir() else {
            return;
        };
        let listings = list_extracts(dir.path());
        assert!(listings.is_ok());
        if let Ok(listings) = listings {
            assert!(listings.is_empty());
        }
    }
}
