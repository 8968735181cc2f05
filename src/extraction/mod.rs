//! Conversation discovery and extraction against a live browser session.
//!
//! This module provides the full extraction workflow:
//! - Attaching to an already-authenticated browser over CDP
//! - Page stability heuristics for client-rendered content
//! - Conversation and gem discovery through the search page
//! - Full-history loading for virtualized message lists
//! - Boilerplate-filtered content extraction
//! - Raw/markdown/metadata artifact persistence

pub mod browser;
pub mod config;
pub mod content;
pub mod convert;
pub mod discovery;
pub mod error;
pub mod history;
pub mod stability;
pub mod types;

pub use config::ExtractorConfig;
pub use content::BoilerplateFilter;
pub use error::ExtractError;
pub use stability::StabilityReport;
pub use types::{
    BatchItem, BatchOutcome, ConversationHandle, ExtractOutcome, ExtractedConversation,
    HandleKind, ListingSurface, Locator, Message, OutcomeStatus, Sender,
};

use url::Url;

use browser::BrowserSession;
use convert::ArtifactWriter;
use types::ConversationRecord;

/// Main service coordinating discovery and extraction.
///
/// Each operation owns one browser session for one linear sequence of
/// navigate, wait, and read steps, and releases it on every exit path.
/// Extractions run one at a time; no concurrent pattern is offered.
pub struct ExtractorService {
    config: ExtractorConfig,
    filter: BoilerplateFilter,
    writer: ArtifactWriter,
}

impl ExtractorService {
    /// Create a service with the given configuration.
    #[must_use]
    pub fn new(config: ExtractorConfig) -> Self {
        let filter = BoilerplateFilter::from_config(&config.extraction);
        let writer = ArtifactWriter::new(config.extraction.output_dir.clone());
        Self {
            config,
            filter,
            writer,
        }
    }

    /// Create a service with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(ExtractorConfig::default())
    }

    /// The configuration this service runs with.
    #[must_use]
    pub const fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Discover conversations and gems, optionally filtered by a query.
    ///
    /// # Errors
    /// Returns an error when no browser is reachable or no listing surface
    /// loads. An empty listing is an empty result, not an error.
    pub async fn discover(
        &self,
        query: Option<&str>,
    ) -> Result<Vec<ConversationHandle>, ExtractError> {
        let session = BrowserSession::connect(&self.config.browser).await?;
        let result = discovery::discover(&session, &self.config, &self.filter, query).await;
        session.close();
        result
    }

    /// Extract a conversation by its direct address.
    ///
    /// # Errors
    /// Returns an error for an invalid address or an unreachable browser;
    /// everything else is reported through the outcome.
    pub async fn extract_url(
        &self,
        url: &str,
        title: Option<&str>,
    ) -> Result<ExtractOutcome, ExtractError> {
        Url::parse(url)?;

        let session = BrowserSession::connect(&self.config.browser).await?;
        if let Err(e) = session.goto(url, &self.config.browser).await {
            // Navigation timeouts are not fatal; extract whatever is there.
            tracing::warn!("navigation degraded: {e}");
        }
        let outcome = self.extract_loaded(&session, title).await;
        session.close();
        Ok(outcome)
    }

    /// Extract a previously discovered entry.
    ///
    /// Gems are refused: they are assistant configurations without dialogue
    /// history.
    ///
    /// # Errors
    /// Returns an error only when no browser is reachable; everything else
    /// is reported through the outcome.
    pub async fn extract_handle(
        &self,
        handle: &ConversationHandle,
    ) -> Result<ExtractOutcome, ExtractError> {
        if handle.kind == HandleKind::Gem {
            return Ok(ExtractOutcome::failed(format!(
                "'{}' is a gem and has no extractable dialogue",
                handle.title
            )));
        }

        match &handle.locator {
            Locator::Url(url) => self.extract_url(url, Some(&handle.title)).await,
            Locator::Element { surface, index } => {
                self.extract_clicked(*surface, *index, &handle.title).await
            }
        }
    }

    /// Discover with a query and extract the first `count` conversations.
    ///
    /// Individual failures do not stop the batch; each item reports its own
    /// outcome. Only an unreachable browser aborts the whole run.
    ///
    /// # Errors
    /// Returns an error when no browser is reachable or discovery itself
    /// fails.
    pub async fn run_flow(&self, query: &str, count: usize) -> Result<BatchOutcome, ExtractError> {
        let handles = self.discover(Some(query)).await?;
        tracing::info!("discovered {} entries for '{query}'", handles.len());

        let mut items = Vec::new();
        for handle in eligible_handles(&handles, count) {
            tracing::info!("extracting '{}'", handle.title);
            match self.extract_handle(handle).await {
                Ok(outcome) => items.push(BatchItem {
                    title: handle.title.clone(),
                    status: outcome.status,
                    message: outcome.message,
                    artifacts: outcome.artifacts,
                }),
                Err(e) if e.is_fatal_for_batch() => return Err(e),
                Err(e) => items.push(BatchItem {
                    title: handle.title.clone(),
                    status: OutcomeStatus::Failed,
                    message: e.to_string(),
                    artifacts: None,
                }),
            }
        }

        Ok(BatchOutcome::from_items(items))
    }

    /// Navigate to a listing surface and extract the entry at `index`.
    async fn extract_clicked(
        &self,
        surface: ListingSurface,
        index: usize,
        title: &str,
    ) -> Result<ExtractOutcome, ExtractError> {
        let session = BrowserSession::connect(&self.config.browser).await?;
        let outcome = self
            .extract_clicked_with_session(&session, surface, index, title)
            .await;
        session.close();
        Ok(outcome)
    }

    async fn extract_clicked_with_session(
        &self,
        session: &BrowserSession,
        surface: ListingSurface,
        index: usize,
        title: &str,
    ) -> ExtractOutcome {
        let (listing_url, selector) = match surface {
            ListingSurface::Search => (
                self.config.extraction.search_url(),
                discovery::GENERIC_CLICKABLES,
            ),
            ListingSurface::Sidebar => (self.config.extraction.app_url(), "button"),
        };

        if let Err(e) = session.goto(&listing_url, &self.config.browser).await {
            return ExtractOutcome::failed(format!("listing page unreachable: {e}"));
        }
        stability::settle(session.page(), &self.config).await;

        if surface == ListingSurface::Sidebar {
            discovery::open_sidebar(session, &self.config).await;
        }

        let elements = match session.page().find_elements(selector).await {
            Ok(elements) => elements,
            Err(e) => return ExtractOutcome::failed(format!("listing scan failed: {e}")),
        };
        let Some(element) = elements.get(index) else {
            return ExtractOutcome::failed(format!(
                "entry index {index} not present in listing of {} elements",
                elements.len()
            ));
        };

        if let Err(e) = element.click().await {
            return ExtractOutcome::failed(format!("could not open '{title}': {e}"));
        }

        self.extract_loaded(session, Some(title)).await
    }

    /// Run the load, read, filter, and persist steps against the page the
    /// session currently shows.
    async fn extract_loaded(
        &self,
        session: &BrowserSession,
        title: Option<&str>,
    ) -> ExtractOutcome {
        // Let the initial view settle before driving the virtualized list.
        stability::settle(session.page(), &self.config).await;

        let stability_report = match history::load_full_history(session, &self.config).await {
            Ok(report) => report,
            Err(e) => return ExtractOutcome::failed(format!("history load failed: {e}")),
        };

        let region_html = match content::read_region_html(session.page()).await {
            Ok(html) => html,
            Err(e) => return ExtractOutcome::failed(format!("could not read page content: {e}")),
        };

        let parsed = content::parse_region(&region_html, &self.filter);
        let total = parsed.total_content_chars();
        if total < self.config.extraction.min_total_chars {
            tracing::warn!(
                "extraction below content minimum: {total} < {}",
                self.config.extraction.min_total_chars
            );
            return ExtractOutcome::low_confidence(
                format!(
                    "only {total} characters of filtered content (minimum {}); \
                     nothing was persisted",
                    self.config.extraction.min_total_chars
                ),
                stability_report,
            );
        }

        let url = session
            .current_url()
            .await
            .unwrap_or_else(|| "unknown".to_string());
        let title = match title {
            Some(title) => title.to_string(),
            None => session
                .page_title()
                .await
                .unwrap_or_else(|| "Conversation".to_string()),
        };

        let conversation = ExtractedConversation::new(title, url, parsed.messages);
        match self
            .writer
            .write(&conversation, &parsed.filtered_html, Some(stability_report))
        {
            Ok(written) => {
                let mut message = format!("extracted {} messages", conversation.message_count);
                if let Some(warning) = written.conversion_warning {
                    message.push_str(&format!("; {warning}"));
                }
                if !stability_report.is_confident() {
                    message.push_str("; stability heuristics disagreed, content may be partial");
                }
                ExtractOutcome::success(message, conversation, written.artifacts, stability_report)
            }
            Err(e) => ExtractOutcome::failed(format!("could not persist artifacts: {e}")),
        }
    }
}

/// First `count` conversation-kind handles, preserving listing order.
#[must_use]
pub fn eligible_handles(handles: &[ConversationHandle], count: usize) -> Vec<&ConversationHandle> {
    handles
        .iter()
        .filter(|handle| handle.kind == HandleKind::Conversation)
        .take(count)
        .collect()
}

/// Load a persisted metadata record.
///
/// # Errors
/// Returns an error if the file cannot be read or parsed.
pub fn load_record(path: &std::path::Path) -> Result<ConversationRecord, ExtractError> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_creation() {
        let service = ExtractorService::with_defaults();
        assert_eq!(service.config().browser.cdp_port, config::DEFAULT_CDP_PORT);
    }

    #[test]
    fn test_eligible_handles_skip_gems_and_respect_count() {
        let handles = vec![
            ConversationHandle::new("Writing coach: essays", Locator::Url("https://a".into())),
            ConversationHandle::new("Thread one about retries", Locator::Url("https://b".into())),
            ConversationHandle::new("Thread two about batching", Locator::Url("https://c".into())),
            ConversationHandle::new("Thread three about caching", Locator::Url("https://d".into())),
        ];

        let eligible = eligible_handles(&handles, 2);
        assert_eq!(eligible.len(), 2);
        assert_eq!(eligible[0].title, "Thread one about retries");
        assert_eq!(eligible[1].title, "Thread two about batching");
    }

    #[tokio::test]
    async fn test_gem_extraction_is_refused_without_a_browser() {
        let service = ExtractorService::with_defaults();
        let gem = ConversationHandle::new("Coach: essays", Locator::Url("https://a".into()));

        let outcome = service.extract_handle(&gem).await;
        assert!(outcome.is_ok());
        if let Ok(outcome) = outcome {
            assert_eq!(outcome.status, OutcomeStatus::Failed);
            assert!(outcome.message.contains("gem"));
        }
    }

    #[test]
    fn test_invalid_url_is_rejected_before_connecting() {
        let service = ExtractorService::with_defaults();
        let result = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map(|rt| rt.block_on(service.extract_url("not a url", None)));

        assert!(matches!(result, Ok(Err(ExtractError::InvalidUrl(_)))));
    }
}
