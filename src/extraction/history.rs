//! Loading the full message history of an open conversation.
//!
//! The target virtualizes its message list: earlier turns only materialize
//! as the view approaches them. There is no completion signal, so the loader
//! issues a bounded number of jump-to-top inputs with a pause between each.
//! Content-length stability is the real termination condition; the
//! repetition cap is a safety bound, which means very long histories can be
//! truncated silently.

use std::time::Duration;

use super::browser::BrowserSession;
use super::config::ExtractorConfig;
use super::error::ExtractError;
use super::stability::{self, StabilityReport};

/// Jump-to-top repetitions to run before consulting the length signal.
const WARMUP_ATTEMPTS: u32 = 3;

/// Scroll the conversation to its top until the history stops growing or
/// the repetition cap is hit, then settle.
///
/// # Errors
/// Returns an error if the page has no body to send key input to.
pub async fn load_full_history(
    session: &BrowserSession,
    config: &ExtractorConfig,
) -> Result<StabilityReport, ExtractError> {
    let page = session.page();
    let body = page.find_element("body").await?;
    let pause = Duration::from_millis(config.extraction.scroll_delay_ms);

    let mut last_length: Option<u64> = None;

    for attempt in 0..config.extraction.max_scroll_attempts {
        if let Err(e) = body.press_key("Home").await {
            tracing::debug!("Home key dispatch failed: {e}");
        }
        if let Err(e) = page.evaluate("window.scrollTo(0, 0)").await {
            tracing::debug!("scrollTo failed: {e}");
        }
        tokio::time::sleep(pause).await;

        if attempt < WARMUP_ATTEMPTS {
            continue;
        }

        let length = match sample_length(session).await {
            Ok(length) => length,
            Err(e) => {
                tracing::debug!("length sample failed during history load: {e}");
                continue;
            }
        };
        if let Some(previous) = last_length {
            if previous.abs_diff(length) < config.extraction.stability_threshold as u64 {
                tracing::debug!("history stopped growing after {attempt} jumps");
                break;
            }
        }
        last_length = Some(length);
    }

    Ok(stability::settle(page, config).await)
}

/// Current visible text length of the page.
async fn sample_length(session: &BrowserSession) -> Result<u64, ExtractError> {
    session
        .page()
        .evaluate("((document.body && document.body.innerText) || '').length")
        .await?
        .into_value::<u64>()
        .map_err(|e| ExtractError::HtmlParse(format!("length sample: {e}")))
}
