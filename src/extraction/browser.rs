//! Connection to an already-running browser over the DevTools protocol.
//!
//! The extractor never launches a browser of its own: it attaches to the
//! operator's existing instance so the authenticated session is reused. The
//! first existing page is driven when one is open, otherwise a fresh page is
//! created.

use chromiumoxide::browser::Browser;
use chromiumoxide::Page;
use futures::StreamExt;

use super::config::BrowserConfig;
use super::error::ExtractError;

/// A live session against an already-open browser.
///
/// Owns the protocol event loop task. The session is the one shared resource
/// of an extraction flow and must be released on every exit path; dropping
/// or calling [`BrowserSession::close`] detaches from the browser without
/// terminating it.
pub struct BrowserSession {
    browser: Browser,
    handler_task: tokio::task::JoinHandle<()>,
    page: Page,
}

impl BrowserSession {
    /// Attach to the browser listening at the configured debugging endpoint.
    ///
    /// # Errors
    /// Returns [`ExtractError::ConnectionUnavailable`] if nothing is
    /// listening there. This is not retried; the operator must start the
    /// browser first.
    pub async fn connect(config: &BrowserConfig) -> Result<Self, ExtractError> {
        let endpoint = config.cdp_url();
        let ws_url = resolve_websocket_url(&endpoint).await?;

        let (browser, mut handler) = Browser::connect(ws_url)
            .await
            .map_err(|e| ExtractError::ConnectionUnavailable(format!("{endpoint}: {e}")))?;

        let handler_task = tokio::task::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = match browser.pages().await {
            Ok(pages) if !pages.is_empty() => {
                tracing::debug!("reusing first of {} existing pages", pages.len());
                pages.into_iter().next().ok_or_else(|| {
                    ExtractError::ConnectionUnavailable(endpoint.clone())
                })?
            }
            Ok(_) => {
                tracing::debug!("no open pages, creating one");
                browser.new_page("about:blank").await?
            }
            Err(e) => {
                handler_task.abort();
                return Err(ExtractError::Cdp(e));
            }
        };

        tracing::info!("connected to browser at {endpoint}");
        Ok(Self {
            browser,
            handler_task,
            page,
        })
    }

    /// The page this session drives.
    #[must_use]
    pub const fn page(&self) -> &Page {
        &self.page
    }

    /// Navigate the session page, bounded by the configured deadline.
    ///
    /// # Errors
    /// Returns [`ExtractError::Navigation`] on timeout or protocol failure.
    pub async fn goto(&self, url: &str, config: &BrowserConfig) -> Result<(), ExtractError> {
        tracing::info!("navigating to {url}");
        match tokio::time::timeout(config.nav_timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(ExtractError::Navigation(format!("{url}: {e}"))),
            Err(_) => Err(ExtractError::Navigation(format!(
                "{url}: no load signal within {:?}",
                config.nav_timeout
            ))),
        }
    }

    /// Current address of the session page, when the browser reports one.
    pub async fn current_url(&self) -> Option<String> {
        match self.page.url().await {
            Ok(url) => url,
            Err(e) => {
                tracing::debug!("could not read page url: {e}");
                None
            }
        }
    }

    /// Title of the session page, when the browser reports one.
    pub async fn page_title(&self) -> Option<String> {
        match self.page.get_title().await {
            Ok(title) => title,
            Err(e) => {
                tracing::debug!("could not read page title: {e}");
                None
            }
        }
    }

    /// Release the debugging connection.
    ///
    /// Detaches only; the operator's browser keeps running.
    pub fn close(self) {
        drop(self.browser);
        self.handler_task.abort();
        tracing::debug!("browser session released");
    }
}

/// Ask the debugging endpoint for its browser-level websocket address.
///
/// A browser that is not running (or runs without remote debugging) fails
/// here, before any protocol traffic.
async fn resolve_websocket_url(endpoint: &str) -> Result<String, ExtractError> {
    let version_url = format!("{endpoint}/json/version");

    let response = reqwest::get(&version_url)
        .await
        .map_err(|e| ExtractError::ConnectionUnavailable(format!("{endpoint}: {e}")))?;
    let info: serde_json::Value = response
        .json()
        .await
        .map_err(|e| ExtractError::ConnectionUnavailable(format!("{endpoint}: {e}")))?;

    info.get("webSocketDebuggerUrl")
        .and_then(|value| value.as_str())
        .map(String::from)
        .ok_or_else(|| {
            ExtractError::ConnectionUnavailable(format!(
                "{endpoint}: endpoint did not report a websocket address"
            ))
        })
}
