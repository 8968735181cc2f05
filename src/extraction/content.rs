//! Conversation content extraction and boilerplate filtering.
//!
//! The target site's DOM is undocumented and shifts between releases, so
//! message containers are located through an ordered chain of structural
//! selectors, first non-empty match wins. Within the matched containers the
//! sender role is structural: a `user-query` element marks a user turn, a
//! `model-response` element an assistant turn. Anything matching the
//! boilerplate denylist or falling under the minimum length is discarded.

use chromiumoxide::Page;
use chrono::Utc;
use scraper::{ElementRef, Html, Selector};

use super::config::ExtractionConfig;
use super::error::ExtractError;
use super::types::{Message, Sender};

/// Structural selectors for message containers, most specific first.
const CONTAINER_SELECTORS: &[&str] = &[
    "div.conversation-container",
    "[data-message-id]",
    "article",
    "[role='article']",
    ".conversation-turn",
    ".chat-message",
];

/// Script returning the markup of the conversation region.
const REGION_JS: &str = r"(() => {
  const history = document.querySelector('#chat-history');
  if (history) { return history.outerHTML; }
  const main = document.querySelector('main');
  return main ? main.outerHTML : document.body.outerHTML;
})()";

/// Result of parsing one conversation region.
#[derive(Clone, Debug)]
pub struct ParsedContent {
    /// Messages in page order, boilerplate removed.
    pub messages: Vec<Message>,
    /// Markup of the kept message containers, for the raw artifact.
    pub filtered_html: String,
    /// Which container selector matched, if any did.
    pub matched_selector: Option<String>,
}

impl ParsedContent {
    /// Total characters of filtered message content.
    #[must_use]
    pub fn total_content_chars(&self) -> usize {
        self.messages.iter().map(|m| m.content.chars().count()).sum()
    }
}

/// Denylist-and-length predicate over scraped text.
///
/// This is deliberately not a semantic classifier: the source site offers no
/// ground truth, so the filter is a configurable list that can be updated
/// without touching extraction logic, plus a length threshold. It will both
/// under- and over-filter when the UI changes.
#[derive(Clone, Debug)]
pub struct BoilerplateFilter {
    navigation_labels: Vec<String>,
    suggestion_prompts: Vec<String>,
    greeting_prefixes: Vec<String>,
    min_chars: usize,
}

impl BoilerplateFilter {
    /// Build the filter from the extraction configuration.
    #[must_use]
    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self {
            navigation_labels: config.navigation_labels.clone(),
            suggestion_prompts: config.suggestion_prompts.clone(),
            greeting_prefixes: config.greeting_prefixes.clone(),
            min_chars: config.min_message_chars,
        }
    }

    /// Whether the text matches the denylist, regardless of length.
    #[must_use]
    pub fn matches_denylist(&self, text: &str) -> bool {
        let trimmed = text.trim();
        if self.navigation_labels.iter().any(|label| label == trimmed) {
            return true;
        }
        if self
            .suggestion_prompts
            .iter()
            .any(|prompt| trimmed.contains(prompt.as_str()))
        {
            return true;
        }
        self.greeting_prefixes
            .iter()
            .any(|prefix| trimmed.starts_with(prefix.as_str()))
    }

    /// Whether the text should be dropped from extracted content.
    #[must_use]
    pub fn is_boilerplate(&self, text: &str) -> bool {
        let trimmed = text.trim();
        trimmed.chars().count() < self.min_chars || self.matches_denylist(trimmed)
    }

    /// Whether a listing entry label is UI noise rather than an entry.
    #[must_use]
    pub fn is_listing_noise(&self, text: &str) -> bool {
        let trimmed = text.trim();
        trimmed.is_empty() || self.navigation_labels.iter().any(|label| label == trimmed)
    }
}

/// Read the conversation region's markup from the live page.
///
/// # Errors
/// Returns an error if the page evaluation fails.
pub async fn read_region_html(page: &Page) -> Result<String, ExtractError> {
    page.evaluate(REGION_JS)
        .await?
        .into_value::<String>()
        .map_err(|e| ExtractError::HtmlParse(format!("region markup: {e}")))
}

/// Parse a conversation region into filtered messages.
///
/// Tries the container selector chain; if no selector matches any element
/// the whole region becomes one undifferentiated assistant block.
#[must_use]
pub fn parse_region(region_html: &str, filter: &BoilerplateFilter) -> ParsedContent {
    let document = Html::parse_document(region_html);

    for selector_str in CONTAINER_SELECTORS {
        let Ok(selector) = Selector::parse(selector_str) else {
            continue;
        };
        let containers: Vec<ElementRef<'_>> = document.select(&selector).collect();
        if containers.is_empty() {
            continue;
        }

        tracing::debug!(
            "matched {} containers with selector {selector_str}",
            containers.len()
        );
        let (messages, filtered_html) = parse_containers(&containers, filter);
        return ParsedContent {
            messages,
            filtered_html,
            matched_selector: Some((*selector_str).to_string()),
        };
    }

    tracing::debug!("no container selector matched, using undifferentiated region");
    fallback_block(region_html, filter)
}

/// Extract messages from matched containers, keeping page order.
fn parse_containers(
    containers: &[ElementRef<'_>],
    filter: &BoilerplateFilter,
) -> (Vec<Message>, String) {
    let mut messages = Vec::new();
    let mut filtered_html = String::new();

    for (index, container) in containers.iter().enumerate() {
        let id = container
            .value()
            .attr("id")
            .map_or_else(|| format!("turn-{index}"), String::from);

        let before = messages.len();

        if let Some(content) = user_turn_content(*container) {
            if !filter.is_boilerplate(&content) {
                messages.push(Message {
                    id: id.clone(),
                    sender: Sender::User,
                    content,
                    extracted_at: Utc::now(),
                });
            }
        }

        if let Some(content) = assistant_turn_content(*container) {
            if !filter.is_boilerplate(&content) {
                messages.push(Message {
                    id: id.clone(),
                    sender: Sender::Assistant,
                    content,
                    extracted_at: Utc::now(),
                });
            }
        }

        // Containers without role markers still carry a whole turn each.
        if messages.len() == before {
            let text = visible_text(*container);
            if !filter.is_boilerplate(&text) {
                messages.push(Message {
                    id,
                    sender: infer_sender(*container),
                    content: element_markdown(*container),
                    extracted_at: Utc::now(),
                });
            } else {
                continue;
            }
        }

        filtered_html.push_str(&format!(
            "<div class=\"message-{index}\">{}</div>\n",
            container.html()
        ));
    }

    (messages, filtered_html)
}

/// Content of the container's user turn, if it has one.
fn user_turn_content(container: ElementRef<'_>) -> Option<String> {
    let user_query = Selector::parse("user-query").ok()?;
    let query_line = Selector::parse("p.query-text-line").ok()?;

    let query = container.select(&user_query).next()?;

    let lines: Vec<String> = query
        .select(&query_line)
        .map(|line| collapse_ws(&line.text().collect::<String>()))
        .filter(|line| !line.is_empty())
        .collect();

    let content = if lines.is_empty() {
        collapse_ws(&query.text().collect::<String>())
    } else {
        lines.join("\n")
    };

    (!content.is_empty()).then_some(content)
}

/// Content of the container's assistant turn, if it has one.
fn assistant_turn_content(container: ElementRef<'_>) -> Option<String> {
    let model_response = Selector::parse("model-response").ok()?;
    let message_content = Selector::parse("message-content").ok()?;
    let markdown_div = Selector::parse("div.markdown").ok()?;

    let response = container.select(&model_response).next()?;

    let body = response
        .select(&message_content)
        .next()
        .and_then(|content| content.select(&markdown_div).next().or(Some(content)))
        .unwrap_or(response);

    let content = element_markdown(body);
    (!content.is_empty()).then_some(content)
}

/// Structural role inference for containers without explicit turn markers.
fn infer_sender(container: ElementRef<'_>) -> Sender {
    let tag = container.value().name().to_ascii_lowercase();
    let class = container
        .value()
        .attr("class")
        .unwrap_or_default()
        .to_ascii_lowercase();

    if tag.contains("user")
        || tag.contains("query")
        || class.contains("user")
        || class.contains("query")
    {
        Sender::User
    } else {
        Sender::Assistant
    }
}

/// Whole region as one undifferentiated block.
fn fallback_block(region_html: &str, filter: &BoilerplateFilter) -> ParsedContent {
    let markdown = html2md::parse_html(region_html);

    // Denylist lines only; the length rule would eat legitimate short lines
    // of code or prose inside the block.
    let content = normalize_markdown(
        &markdown
            .lines()
            .filter(|line| !filter.matches_denylist(line))
            .collect::<Vec<_>>()
            .join("\n"),
    );

    let messages = if content.is_empty() {
        Vec::new()
    } else {
        vec![Message {
            id: "content".to_string(),
            sender: Sender::Assistant,
            content,
            extracted_at: Utc::now(),
        }]
    };

    ParsedContent {
        messages,
        filtered_html: region_html.to_string(),
        matched_selector: None,
    }
}

/// Markdown rendering of an element, falling back to its visible text.
fn element_markdown(element: ElementRef<'_>) -> String {
    let markdown = normalize_markdown(&html2md::parse_html(&element.inner_html()));
    if markdown.is_empty() {
        visible_text(element)
    } else {
        markdown
    }
}

/// Visible text of an element with collapsed whitespace.
fn visible_text(element: ElementRef<'_>) -> String {
    collapse_ws(&element.text().collect::<String>())
}

/// Collapse all whitespace runs into single spaces.
fn collapse_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Trim trailing whitespace per line and collapse runs of blank lines.
fn normalize_markdown(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut blank_run = 0usize;

    for line in text.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        result.push_str(line);
        result.push('\n');
    }

    result.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::config::ExtractionConfig;

    fn filter() -> BoilerplateFilter {
        BoilerplateFilter::from_config(&ExtractionConfig::default())
    }

    fn turn_html(index: usize, question: &str, answer: &str) -> String {
        format!(
            "<div class=\"conversation-container\" id=\"c{index}\">\
             <user-query><p class=\"query-text-line\">{question}</p></user-query>\
             <model-response><message-content><div class=\"markdown\">\
             <p>{answer}</p></div></message-content></model-response></div>"
        )
    }

    fn conversation_html(turns: usize) -> String {
        let mut html = String::from("<main id=\"chat-history\">");
        for i in 0..turns {
            html.push_str(&turn_html(
                i,
                &format!("How does feature number {i} behave under load?"),
                &format!("Feature number {i} degrades gracefully when the queue saturates."),
            ));
        }
        html.push_str("</main>");
        html
    }

    #[test]
    fn test_structured_turns_produce_ordered_roles() {
        let parsed = parse_region(&conversation_html(2), &filter());

        assert_eq!(parsed.messages.len(), 4);
        assert_eq!(parsed.messages[0].sender, Sender::User);
        assert_eq!(parsed.messages[1].sender, Sender::Assistant);
        assert_eq!(parsed.messages[2].sender, Sender::User);
        assert_eq!(parsed.messages[3].sender, Sender::Assistant);
        assert_eq!(parsed.matched_selector.as_deref(), Some("div.conversation-container"));
    }

    #[test]
    fn test_message_ids_come_from_container_ids() {
        let parsed = parse_region(&conversation_html(1), &filter());
        assert!(parsed.messages.iter().all(|m| m.id == "c0"));
    }

    #[test]
    fn test_suggestion_prompts_are_dropped() {
        let html = format!(
            "<main>{}<div class=\"conversation-container\" id=\"sugg\">\
             <user-query><p class=\"query-text-line\">Compare teachings of two philosophers</p>\
             </user-query></div></main>",
            turn_html(0, "What is the retry budget for the ingest job?", "Three attempts with exponential backoff.")
        );
        let parsed = parse_region(&html, &filter());

        assert_eq!(parsed.messages.len(), 2);
        assert!(parsed.messages.iter().all(|m| m.id == "c0"));
        assert!(!parsed.filtered_html.contains("sugg"));
    }

    #[test]
    fn test_short_fragments_are_dropped() {
        let html = "<main><div class=\"conversation-container\" id=\"c0\">\
                    <user-query><p class=\"query-text-line\">ok</p></user-query>\
                    </div></main>";
        let parsed = parse_region(html, &filter());
        assert!(parsed.messages.is_empty());
    }

    #[test]
    fn test_repeated_parse_is_identical() {
        let html = conversation_html(10);
        let first = parse_region(&html, &filter());
        let second = parse_region(&html, &filter());

        assert_eq!(first.messages.len(), 20);
        assert_eq!(second.messages.len(), 20);
        for (a, b) in first.messages.iter().zip(second.messages.iter()) {
            assert_eq!(a.sender, b.sender);
            assert_eq!(a.content, b.content);
            assert_eq!(a.id, b.id);
        }
    }

    #[test]
    fn test_unstructured_region_becomes_single_block() {
        let html = "<main><div><p>The deployment pipeline publishes the container image \
                    and then rolls the staging environment before production.</p></div></main>";
        let parsed = parse_region(html, &filter());

        assert_eq!(parsed.messages.len(), 1);
        assert_eq!(parsed.messages[0].sender, Sender::Assistant);
        assert!(parsed.matched_selector.is_none());
        assert!(parsed.messages[0].content.contains("deployment pipeline"));
    }

    #[test]
    fn test_filter_rules() {
        let filter = filter();
        assert!(filter.is_boilerplate("New chat"));
        assert!(filter.is_boilerplate("Would you like to Compare teachings of historical figures?"));
        assert!(filter.is_boilerplate("Hello, Duc"));
        assert!(filter.is_boilerplate("too short"));
        assert!(!filter.is_boilerplate("A perfectly ordinary message about build caching."));
    }

    #[test]
    fn test_code_blocks_survive_as_markdown() {
        let html = "<main><div class=\"conversation-container\" id=\"c0\">\
                    <model-response><message-content><div class=\"markdown\">\
                    <p>Use this snippet to register the handler:</p>\
                    <pre><code>let app = Router::new().route(\"/health\", get(health));</code></pre>\
                    </div></message-content></model-response></div></main>";
        let parsed = parse_region(html, &filter());

        assert_eq!(parsed.messages.len(), 1);
        assert!(parsed.messages[0].content.contains("Router::new()"));
    }

    #[test]
    fn test_forty_char_region_falls_under_content_minimum() {
        let html = "<main><div class=\"conversation-container\" id=\"c0\">\
                    <user-query><p class=\"query-text-line\">\
                    This reply is forty characters long okay\
                    </p></user-query></div></main>";
        let parsed = parse_region(html, &filter());

        assert_eq!(parsed.messages.len(), 1);
        assert_eq!(parsed.total_content_chars(), 40);
        assert!(parsed.total_content_chars() < ExtractionConfig::default().min_total_chars);
    }

    #[test]
    fn test_total_content_chars_sums_messages() {
        let parsed = parse_region(&conversation_html(2), &filter());
        let expected: usize = parsed
            .messages
            .iter()
            .map(|m| m.content.chars().count())
            .sum();
        assert_eq!(parsed.total_content_chars(), expected);
        assert!(parsed.total_content_chars() > 100);
    }
}
