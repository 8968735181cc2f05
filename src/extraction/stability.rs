//! Heuristics deciding when a dynamically-loading page has settled.
//!
//! The target is a client-rendered application that streams part of its
//! content over a persistent connection, so neither a load event nor network
//! observation alone is reliable. Two complementary signals are used: a
//! network-quiet heuristic over the page's resource entries, and polling of
//! the total visible text length. Timeouts are not fatal; callers receive a
//! report and judge usability themselves.

use std::future::Future;
use std::time::Duration;

use chromiumoxide::Page;
use serde::{Deserialize, Serialize};

use super::config::ExtractorConfig;
use super::error::ExtractError;

/// Consecutive identical resource-count samples required for network quiet.
const QUIET_POLLS: u32 = 3;

/// Interval between resource-count samples.
const NETWORK_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Expression returning the number of resource entries the page has loaded.
const RESOURCE_COUNT_JS: &str = "performance.getEntriesByType('resource').length";

/// Expression returning the length of the page's visible text.
const TEXT_LENGTH_JS: &str = "((document.body && document.body.innerText) || '').length";

/// What the waiter observed while the page settled.
///
/// When the two heuristics disagree the result is not fully trusted; callers
/// see that through [`StabilityReport::is_confident`] and the persisted
/// metadata.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct StabilityReport {
    /// The network-quiet heuristic succeeded within its deadline.
    pub network_quiet: bool,
    /// The content-length polling heuristic converged.
    pub content_stable: bool,
}

impl StabilityReport {
    /// Both heuristics agree the page has settled.
    #[must_use]
    pub const fn is_confident(&self) -> bool {
        self.network_quiet && self.content_stable
    }
}

/// Block the current flow until the page looks settled, then wait the
/// configured settle buffer for client-side rendering to catch up.
pub async fn settle(page: &Page, config: &ExtractorConfig) -> StabilityReport {
    let network_quiet = wait_for_network_quiet(page, config.browser.network_timeout).await;
    if !network_quiet {
        tracing::warn!(
            "network did not go quiet within {:?}, proceeding with current content",
            config.browser.network_timeout
        );
    }

    let content_stable = wait_for_content_stable(page, config).await;
    if !content_stable {
        tracing::warn!("visible text length kept changing, result may be partial");
    }

    tokio::time::sleep(config.browser.settle_buffer).await;

    let report = StabilityReport {
        network_quiet,
        content_stable,
    };
    if !report.is_confident() {
        tracing::warn!(
            network_quiet = report.network_quiet,
            content_stable = report.content_stable,
            "stability heuristics disagree, flagging low confidence"
        );
    }
    report
}

/// Wait until no new resource entries appear for a quiet interval, bounded
/// by `timeout`. Returns whether quiet was reached.
pub async fn wait_for_network_quiet(page: &Page, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    let mut last_count: Option<u64> = None;
    let mut quiet_polls = 0u32;

    while tokio::time::Instant::now() < deadline {
        let count = match sample_number(page, RESOURCE_COUNT_JS).await {
            Ok(count) => count,
            Err(e) => {
                tracing::debug!("resource count sample failed: {e}");
                return false;
            }
        };

        if last_count == Some(count) {
            quiet_polls += 1;
            if quiet_polls >= QUIET_POLLS {
                return true;
            }
        } else {
            quiet_polls = 0;
        }
        last_count = Some(count);

        tokio::time::sleep(NETWORK_POLL_INTERVAL).await;
    }

    false
}

/// Poll the page's visible text length until two consecutive samples differ
/// by less than the configured threshold. Returns whether that happened
/// within the sample budget.
pub async fn wait_for_content_stable(page: &Page, config: &ExtractorConfig) -> bool {
    let interval = Duration::from_millis(config.extraction.poll_interval_ms);
    poll_until_stable(
        || sample_number(page, TEXT_LENGTH_JS),
        interval,
        config.extraction.stability_threshold,
        config.extraction.max_stability_samples,
    )
    .await
}

/// Generic bounded stability poll over any length sampler.
///
/// Stable means two consecutive samples differ by less than `threshold`.
/// The sample budget is the hard termination bound; a page that never stops
/// reporting new content still ends the poll after `max_samples` samples.
pub async fn poll_until_stable<F, Fut>(
    mut sample: F,
    interval: Duration,
    threshold: usize,
    max_samples: u32,
) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<u64, ExtractError>>,
{
    let mut last: Option<u64> = None;

    for _ in 0..max_samples {
        let length = match sample().await {
            Ok(length) => length,
            Err(e) => {
                tracing::debug!("content length sample failed: {e}");
                return false;
            }
        };

        if let Some(previous) = last {
            if previous.abs_diff(length) < threshold as u64 {
                return true;
            }
        }
        last = Some(length);

        tokio::time::sleep(interval).await;
    }

    false
}

/// Evaluate a numeric expression in the page.
async fn sample_number(page: &Page, expression: &str) -> Result<u64, ExtractError> {
    page.evaluate(expression)
        .await?
        .into_value::<u64>()
        .map_err(|e| ExtractError::HtmlParse(format!("numeric evaluation: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[tokio::test]
    async fn test_poll_terminates_when_content_never_stabilizes() {
        let calls = AtomicU64::new(0);
        let stable = poll_until_stable(
            || {
                // Each sample jumps by far more than the threshold.
                let length = calls.fetch_add(1, Ordering::SeqCst) * 10_000;
                async move { Ok(length) }
            },
            Duration::from_millis(1),
            50,
            8,
        )
        .await;

        assert!(!stable);
        assert_eq!(calls.load(Ordering::SeqCst), 8);
    }

    #[tokio::test]
    async fn test_poll_detects_stability_early() {
        let calls = AtomicU64::new(0);
        let stable = poll_until_stable(
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                // Grows for two samples, then plateaus.
                let length = if n < 2 { n * 1_000 } else { 2_000 };
                async move { Ok(length) }
            },
            Duration::from_millis(1),
            50,
            12,
        )
        .await;

        assert!(stable);
        assert!(calls.load(Ordering::SeqCst) < 12);
    }

    #[tokio::test]
    async fn test_poll_gives_up_on_sampler_error() {
        let stable = poll_until_stable(
            || async { Err(ExtractError::HtmlParse("gone".to_string())) },
            Duration::from_millis(1),
            50,
            4,
        )
        .await;
        assert!(!stable);
    }

    #[test]
    fn test_confidence_requires_both_signals() {
        let confident = StabilityReport {
            network_quiet: true,
            content_stable: true,
        };
        assert!(confident.is_confident());

        let disagreeing = StabilityReport {
            network_quiet: true,
            content_stable: false,
        };
        assert!(!disagreeing.is_confident());
    }
}
