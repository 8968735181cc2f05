//! Application state shared across all request handlers.

use std::sync::Arc;

use crate::extraction::ExtractorConfig;

/// Shared application state.
pub struct AppState {
    /// Resolved extractor configuration.
    pub config: ExtractorConfig,
}

impl AppState {
    /// Create application state from configuration resolved at startup.
    ///
    /// # Errors
    /// Returns an error if configuration resolution fails.
    pub fn new() -> Result<Arc<Self>, Box<dyn std::error::Error + Send + Sync>> {
        let config = ExtractorConfig::load(None)
            .map_err(|e| format!("failed to resolve configuration: {e}"))?;
        Ok(Arc::new(Self { config }))
    }

    /// Create application state from an explicit configuration.
    #[must_use]
    pub fn with_config(config: ExtractorConfig) -> Arc<Self> {
        Arc::new(Self { config })
    }
}
