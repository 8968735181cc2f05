//! Conversation discovery over the target site's listing surfaces.
//!
//! The primary path drives the search page: navigate, optionally submit a
//! query, wait for stability, then scan the listing into handles. Entries
//! with a colon in their title are gems (pre-built assistant configurations
//! with no dialogue history); everything else is a conversation. The
//! sidebar path on the landing page is kept only as a fallback: it produces
//! an incomplete, gem-polluted list.

use chromiumoxide::Element;
use url::Url;

use super::browser::BrowserSession;
use super::config::ExtractorConfig;
use super::content::BoilerplateFilter;
use super::error::ExtractError;
use super::stability;
use super::types::{ConversationHandle, ListingSurface, Locator};

/// Anchor selectors likely to address conversations directly, tried first.
const ANCHOR_SELECTORS: &[&str] = &[
    "a[href*='/app/']",
    "a[href*='conversation']",
    "a[href*='/c/']",
];

/// Generic clickables scanned when no anchor selector yields entries.
pub(crate) const GENERIC_CLICKABLES: &str = "div[role='button'], button, a";

/// Search input selectors, most specific first.
const SEARCH_INPUT_SELECTORS: &[&str] = &[
    "input[type='search']",
    "input[type='text']",
    "input[placeholder*='search']",
    "input[placeholder*='Search']",
    "textarea",
    "[role='searchbox']",
];

/// Sidebar toggle on the landing page.
const SIDEBAR_MENU_BUTTON: &str = "button[data-test-id='side-nav-menu-button']";

/// Minimum title length for anchor-derived entries.
const MIN_ANCHOR_TITLE_CHARS: usize = 10;

/// Minimum title length for generic clickable entries.
const MIN_GENERIC_TITLE_CHARS: usize = 20;

/// Maximum stored title length.
const MAX_TITLE_CHARS: usize = 200;

/// Discover conversations through the search page, falling back to the
/// sidebar listing when the search surface is unreachable.
///
/// Zero entries is an empty result, not an error: the caller decides whether
/// that means an empty account or a broken selector.
///
/// # Errors
/// Returns an error when neither listing surface can be reached.
pub async fn discover(
    session: &BrowserSession,
    config: &ExtractorConfig,
    filter: &BoilerplateFilter,
    query: Option<&str>,
) -> Result<Vec<ConversationHandle>, ExtractError> {
    if let Err(e) = session.goto(&config.extraction.search_url(), &config.browser).await {
        tracing::warn!("search page unreachable ({e}), falling back to sidebar listing");
        return discover_sidebar(session, config, filter, query).await;
    }
    stability::settle(session.page(), config).await;

    if let Some(query) = query {
        if submit_query(session, query).await? {
            stability::settle(session.page(), config).await;
        } else {
            tracing::warn!("no search input found, falling back to sidebar listing");
            return discover_sidebar(session, config, filter, Some(query)).await;
        }
    }

    let handles = scan_search_listing(session, filter, &config.extraction.base_url).await?;
    if handles.is_empty() {
        tracing::warn!("search listing yielded no entries; empty account or changed markup");
    }
    Ok(handles)
}

/// Discover conversations from the landing-page sidebar.
///
/// Documented as incomplete and gem-polluted; queries are applied as a
/// client-side case-insensitive substring filter because this surface has no
/// search input of its own.
///
/// # Errors
/// Returns an error when the landing page cannot be reached.
pub async fn discover_sidebar(
    session: &BrowserSession,
    config: &ExtractorConfig,
    filter: &BoilerplateFilter,
    query: Option<&str>,
) -> Result<Vec<ConversationHandle>, ExtractError> {
    session.goto(&config.extraction.app_url(), &config.browser).await?;
    stability::settle(session.page(), config).await;

    open_sidebar(session, config).await;

    let buttons = session.page().find_elements("button").await?;
    let mut handles = Vec::new();

    for (index, button) in buttons.iter().enumerate() {
        let Some(title) = element_title(button).await else {
            continue;
        };
        if !sidebar_entry_plausible(&title, filter) {
            continue;
        }
        handles.push(ConversationHandle::new(
            truncate_title(&title),
            Locator::Element {
                surface: ListingSurface::Sidebar,
                index,
            },
        ));
    }

    Ok(match query {
        Some(query) => filter_by_query(handles, query),
        None => handles,
    })
}

/// Fill the first matching search input and submit.
///
/// Returns `false` when no input was found.
///
/// # Errors
/// Returns an error if interacting with a found input fails.
pub async fn submit_query(session: &BrowserSession, query: &str) -> Result<bool, ExtractError> {
    for selector in SEARCH_INPUT_SELECTORS {
        let Ok(input) = session.page().find_element(*selector).await else {
            continue;
        };
        tracing::debug!("entering query through {selector}");
        input.click().await?;
        input.type_str(query).await?;
        input.press_key("Enter").await?;
        return Ok(true);
    }
    Ok(false)
}

/// Scan the search listing into handles: anchors first, generic clickables
/// as the second chain link.
async fn scan_search_listing(
    session: &BrowserSession,
    filter: &BoilerplateFilter,
    base_url: &str,
) -> Result<Vec<ConversationHandle>, ExtractError> {
    for selector in ANCHOR_SELECTORS {
        let Ok(anchors) = session.page().find_elements(*selector).await else {
            continue;
        };
        if anchors.is_empty() {
            continue;
        }

        let mut handles = Vec::new();
        for anchor in &anchors {
            let Some(title) = element_title(anchor).await else {
                continue;
            };
            if title.chars().count() < MIN_ANCHOR_TITLE_CHARS || filter.is_listing_noise(&title) {
                continue;
            }
            let Some(href) = element_href(anchor).await else {
                continue;
            };
            handles.push(ConversationHandle::new(
                truncate_title(&title),
                Locator::Url(resolve_href(base_url, &href)),
            ));
        }

        if !handles.is_empty() {
            tracing::debug!("found {} entries with selector {selector}", handles.len());
            return Ok(handles);
        }
    }

    // No addressable entries; fall back to any clickable with plausible text.
    let clickables = session.page().find_elements(GENERIC_CLICKABLES).await?;
    let mut handles = Vec::new();

    for (index, element) in clickables.iter().enumerate() {
        let Some(title) = element_title(element).await else {
            continue;
        };
        let chars = title.chars().count();
        if chars < MIN_GENERIC_TITLE_CHARS || chars > MAX_TITLE_CHARS {
            continue;
        }
        if filter.is_listing_noise(&title) {
            continue;
        }

        let locator = match element_href(element).await {
            Some(href) => Locator::Url(resolve_href(base_url, &href)),
            None => Locator::Element {
                surface: ListingSurface::Search,
                index,
            },
        };
        handles.push(ConversationHandle::new(truncate_title(&title), locator));
    }

    Ok(handles)
}

/// Open the landing-page sidebar if its toggle is present.
pub(crate) async fn open_sidebar(session: &BrowserSession, config: &ExtractorConfig) {
    match session.page().find_element(SIDEBAR_MENU_BUTTON).await {
        Ok(button) => {
            if let Err(e) = button.click().await {
                tracing::warn!("could not open sidebar: {e}");
                return;
            }
            stability::settle(session.page(), config).await;
        }
        Err(_) => tracing::debug!("sidebar toggle not found, assuming sidebar is open"),
    }
}

/// Case-insensitive substring filter over handle titles.
#[must_use]
pub fn filter_by_query(handles: Vec<ConversationHandle>, query: &str) -> Vec<ConversationHandle> {
    let needle = query.to_lowercase();
    handles
        .into_iter()
        .filter(|handle| handle.title.to_lowercase().contains(&needle))
        .collect()
}

/// Whether a sidebar button label looks like a listing entry.
///
/// Gem labels (with a colon) are short, conversation labels a little longer;
/// model pickers and product labels are excluded outright.
fn sidebar_entry_plausible(title: &str, filter: &BoilerplateFilter) -> bool {
    if filter.is_listing_noise(title) {
        return false;
    }
    if title.starts_with("2.5") || title.starts_with("Gemini") {
        return false;
    }
    let chars = title.chars().count();
    if title.contains(':') {
        chars > 5
    } else {
        chars > 10
    }
}

/// Trimmed element text, when the element has any.
async fn element_title(element: &Element) -> Option<String> {
    match element.inner_text().await {
        Ok(Some(text)) => {
            let trimmed = text.trim().to_string();
            (!trimmed.is_empty()).then_some(trimmed)
        }
        Ok(None) => None,
        Err(e) => {
            tracing::debug!("could not read element text: {e}");
            None
        }
    }
}

/// Element `href`, when present and non-empty.
async fn element_href(element: &Element) -> Option<String> {
    match element.attribute("href").await {
        Ok(Some(href)) if !href.trim().is_empty() => Some(href),
        Ok(_) => None,
        Err(e) => {
            tracing::debug!("could not read element href: {e}");
            None
        }
    }
}

/// Resolve a potentially relative listing address against the site base.
fn resolve_href(base_url: &str, href: &str) -> String {
    if let Ok(absolute) = Url::parse(href) {
        return absolute.to_string();
    }
    Url::parse(base_url)
        .ok()
        .and_then(|base| base.join(href).ok())
        .map_or_else(|| href.to_string(), |resolved| resolved.to_string())
}

/// Clamp a title to the stored maximum.
fn truncate_title(title: &str) -> String {
    title.chars().take(MAX_TITLE_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::config::ExtractionConfig;
    use crate::extraction::types::HandleKind;

    fn handle(title: &str) -> ConversationHandle {
        ConversationHandle::new(
            title,
            Locator::Element {
                surface: ListingSurface::Sidebar,
                index: 0,
            },
        )
    }

    #[test]
    fn test_query_filter_is_case_insensitive_substring() {
        let matching = [
            "Dynamic programming notes",
            "study DYnamo tables",
            "everydy typo thread",
            "dy shorthand",
            "Cloudy deployments",
            "Hardy spaces refresher",
            "speedy retrieval plan",
            "the dyad pattern",
            "comedy script draft",
            "DY quarterly review",
        ];
        let other = [
            "Project Plan",
            "Notes",
            "Build caching",
            "Retry budgets",
            "Queue design",
        ];

        let handles = matching
            .iter()
            .chain(other.iter())
            .map(|t| handle(t))
            .collect::<Vec<_>>();

        let filtered = filter_by_query(handles, "dy");
        assert_eq!(filtered.len(), 10);
        for found in &filtered {
            assert!(found.title.to_lowercase().contains("dy"));
        }
    }

    #[test]
    fn test_sidebar_plausibility_rules() {
        let filter = BoilerplateFilter::from_config(&ExtractionConfig::default());

        assert!(sidebar_entry_plausible("Debugging the ingest job", &filter));
        assert!(sidebar_entry_plausible("Coach: essays", &filter));
        assert!(!sidebar_entry_plausible("New chat", &filter));
        assert!(!sidebar_entry_plausible("2.5 Pro", &filter));
        assert!(!sidebar_entry_plausible("Gemini Advanced", &filter));
        assert!(!sidebar_entry_plausible("short", &filter));
    }

    #[test]
    fn test_discovered_entries_keep_site_order_and_kind() {
        let handles = vec![
            handle("Most recent thread about batching"),
            handle("Writing coach: essays"),
            handle("Older thread about retries"),
        ];
        let filtered = filter_by_query(handles, "t");

        assert_eq!(filtered.len(), 3);
        assert_eq!(filtered[0].kind, HandleKind::Conversation);
        assert_eq!(filtered[1].kind, HandleKind::Gem);
        assert_eq!(filtered[2].kind, HandleKind::Conversation);
        assert_eq!(filtered[0].title, "Most recent thread about batching");
    }

    #[test]
    fn test_title_truncation() {
        let long = "x".repeat(500);
        assert_eq!(truncate_title(&long).chars().count(), 200);
    }

    #[test]
    fn test_relative_hrefs_resolve_against_base() {
        assert_eq!(
            resolve_href("https://gemini.google.com", "/app/868452c61789e8d8"),
            "https://gemini.google.com/app/868452c61789e8d8"
        );
        assert_eq!(
            resolve_href("https://gemini.google.com", "https://other.example/app/x"),
            "https://other.example/app/x"
        );
    }
}
