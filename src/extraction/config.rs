//! Configuration for the extraction module.
//!
//! Defaults are resolved once at process start (defaults, then an optional
//! JSON config file, then environment overrides) and the resulting value
//! object is handed to each component at construction.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::ExtractError;

/// Default Chrome DevTools Protocol port.
pub const DEFAULT_CDP_PORT: u16 = 9222;

/// Default config file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "gemini_config.json";

/// Complete configuration for the extractor.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// Browser connection settings.
    pub browser: BrowserConfig,
    /// Extraction behavior settings.
    pub extraction: ExtractionConfig,
}

impl ExtractorConfig {
    /// Create a config with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve configuration from defaults, an optional JSON file, and the
    /// process environment, in that order.
    ///
    /// A missing file is not an error; a present but malformed file is.
    ///
    /// # Errors
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load(config_file: Option<&Path>) -> Result<Self, ExtractError> {
        let path = config_file
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            serde_json::from_str(&raw)
                .map_err(|e| ExtractError::Config(format!("{}: {e}", path.display())))?
        } else {
            Self::default()
        };

        config.apply_env_from(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply environment overrides through a lookup function.
    ///
    /// Unparseable values are logged and skipped rather than aborting
    /// startup.
    pub fn apply_env_from<F>(&mut self, get: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = get("GEMINI_CDP_PORT") {
            match port.parse::<u16>() {
                Ok(p) => self.browser.cdp_port = p,
                Err(_) => tracing::warn!("ignoring invalid GEMINI_CDP_PORT: {port}"),
            }
        }
        if let Some(dir) = get("GEMINI_USER_DATA_DIR") {
            self.browser.user_data_dir = PathBuf::from(dir);
        }
        if let Some(timeout) = get("GEMINI_TIMEOUT") {
            match timeout.parse::<u64>() {
                Ok(ms) => self.browser.network_timeout = Duration::from_millis(ms),
                Err(_) => tracing::warn!("ignoring invalid GEMINI_TIMEOUT: {timeout}"),
            }
        }
        if let Some(dir) = get("GEMINI_OUTPUT_DIR") {
            self.extraction.output_dir = PathBuf::from(dir);
        }
        if let Some(base) = get("GEMINI_BASE_URL") {
            self.extraction.base_url = base;
        }
    }

    /// Write the configuration as pretty JSON.
    ///
    /// # Errors
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, path: &Path) -> Result<(), ExtractError> {
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(path, raw)?;
        Ok(())
    }

    /// Set the CDP port.
    #[must_use]
    pub const fn with_cdp_port(mut self, port: u16) -> Self {
        self.browser.cdp_port = port;
        self
    }

    /// Set the output directory for persisted artifacts.
    #[must_use]
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.extraction.output_dir = dir.into();
        self
    }

    /// Set the base URL of the target site.
    #[must_use]
    pub fn with_base_url(mut self, base: impl Into<String>) -> Self {
        self.extraction.base_url = base.into();
        self
    }
}

/// Browser connection settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Chrome DevTools Protocol port on localhost.
    pub cdp_port: u16,
    /// Chrome profile directory the operator's browser runs with.
    pub user_data_dir: PathBuf,
    /// Deadline for a single page navigation.
    #[serde(with = "duration_millis")]
    pub nav_timeout: Duration,
    /// Deadline for the network-quiet heuristic.
    #[serde(with = "duration_millis")]
    pub network_timeout: Duration,
    /// Fixed buffer after stability so client-side rendering catches up.
    #[serde(with = "duration_millis")]
    pub settle_buffer: Duration,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            cdp_port: DEFAULT_CDP_PORT,
            user_data_dir: default_user_data_dir(),
            nav_timeout: Duration::from_secs(15),
            network_timeout: Duration::from_secs(10),
            settle_buffer: Duration::from_secs(2),
        }
    }
}

impl BrowserConfig {
    /// Debugging endpoint address for the configured port.
    #[must_use]
    pub fn cdp_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.cdp_port)
    }
}

/// Extraction behavior settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Directory persisted artifacts are written to.
    pub output_dir: PathBuf,
    /// Base URL of the target site.
    pub base_url: String,
    /// Upper bound on jump-to-top repetitions while loading history.
    pub max_scroll_attempts: u32,
    /// Pause between jump-to-top repetitions, in milliseconds.
    pub scroll_delay_ms: u64,
    /// Interval between visible-text-length samples, in milliseconds.
    pub poll_interval_ms: u64,
    /// Two consecutive samples closer than this count as stable.
    pub stability_threshold: usize,
    /// Upper bound on content-length samples per wait.
    pub max_stability_samples: u32,
    /// Minimum text length for a candidate message element.
    pub min_message_chars: usize,
    /// Minimum total filtered text below which an extraction is reported as
    /// low confidence instead of a silent empty success.
    pub min_total_chars: usize,
    /// Exact-match navigation and section labels excluded from listings and
    /// message content.
    pub navigation_labels: Vec<String>,
    /// Substrings marking canned suggestion prompts.
    pub suggestion_prompts: Vec<String>,
    /// Prefixes marking personalized greeting banners.
    pub greeting_prefixes: Vec<String>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("gemini_extracts"),
            base_url: "https://gemini.google.com".to_string(),
            max_scroll_attempts: 15,
            scroll_delay_ms: 300,
            poll_interval_ms: 500,
            stability_threshold: 50,
            max_stability_samples: 12,
            min_message_chars: 20,
            min_total_chars: 100,
            navigation_labels: default_navigation_labels(),
            suggestion_prompts: default_suggestion_prompts(),
            greeting_prefixes: vec!["Hello,".to_string()],
        }
    }
}

impl ExtractionConfig {
    /// URL of the search listing page.
    #[must_use]
    pub fn search_url(&self) -> String {
        format!("{}/search", self.base_url.trim_end_matches('/'))
    }

    /// URL of the landing page carrying the sidebar listing.
    #[must_use]
    pub fn app_url(&self) -> String {
        format!("{}/app", self.base_url.trim_end_matches('/'))
    }
}

/// Default Chrome profile path under the operator's home directory.
fn default_user_data_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from("ChromeProfiles").join("default"),
        |dirs| dirs.home_dir().join("ChromeProfiles").join("default"),
    )
}

/// Labels the target UI renders between and around listing entries.
fn default_navigation_labels() -> Vec<String> {
    [
        "New chat",
        "Search for chats",
        "Settings & help",
        "Sign in",
        "Main menu",
        "Invite a friend",
        "PRO",
        "Gemini",
        "Try Gemini Advanced",
        "Today",
        "Yesterday",
        "Recent",
        "Chats",
        "Menu",
        "Settings",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Canned suggestion prompts the target UI injects next to real turns.
fn default_suggestion_prompts() -> Vec<String> {
    [
        "Compare teachings",
        "Analyze consequences",
        "Illustrate Python",
        "Simulate a virtual",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Serde module for `Duration` as integer milliseconds.
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        u64::try_from(duration.as_millis())
            .unwrap_or(u64::MAX)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ExtractorConfig::default();
        assert_eq!(config.browser.cdp_port, DEFAULT_CDP_PORT);
        assert_eq!(config.extraction.output_dir, PathBuf::from("gemini_extracts"));
        assert_eq!(config.extraction.max_scroll_attempts, 15);
        assert_eq!(config.extraction.min_total_chars, 100);
    }

    #[test]
    fn test_config_builder() {
        let config = ExtractorConfig::new()
            .with_cdp_port(9333)
            .with_output_dir("out")
            .with_base_url("https://example.com/");

        assert_eq!(config.browser.cdp_port, 9333);
        assert_eq!(config.extraction.output_dir, PathBuf::from("out"));
        assert_eq!(config.extraction.search_url(), "https://example.com/search");
        assert_eq!(config.extraction.app_url(), "https://example.com/app");
    }

    #[test]
    fn test_env_overrides() {
        let mut config = ExtractorConfig::default();
        config.apply_env_from(|key| match key {
            "GEMINI_CDP_PORT" => Some("9444".to_string()),
            "GEMINI_OUTPUT_DIR" => Some("elsewhere".to_string()),
            "GEMINI_TIMEOUT" => Some("5000".to_string()),
            _ => None,
        });

        assert_eq!(config.browser.cdp_port, 9444);
        assert_eq!(config.extraction.output_dir, PathBuf::from("elsewhere"));
        assert_eq!(config.browser.network_timeout, Duration::from_millis(5000));
    }

    #[test]
    fn test_invalid_env_value_is_skipped() {
        let mut config = ExtractorConfig::default();
        config.apply_env_from(|key| match key {
            "GEMINI_CDP_PORT" => Some("not-a-port".to_string()),
            _ => None,
        });
        assert_eq!(config.browser.cdp_port, DEFAULT_CDP_PORT);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let Ok(dir) = tempfile::tempdir() else {
            return;
        };
        let path = dir.path().join("gemini_config.json");

        let config = ExtractorConfig::new().with_cdp_port(9555);
        assert!(config.save(&path).is_ok());

        let loaded = ExtractorConfig::load(Some(&path));
        assert!(loaded.is_ok());
        if let Ok(loaded) = loaded {
            assert_eq!(loaded.browser.cdp_port, 9555);
        }
    }
}
