//! Sync client configuration.

use std::time::Duration;

use url::Url;

use crate::error::{SyncError, SyncResult};

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Default number of retry attempts after the initial request.
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Default base delay for exponential backoff.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Configuration for [`crate::SyncClient`].
///
/// `base_url` and `nonce` are required; everything else has a default.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Base URL of the settings endpoint, e.g.
    /// `https://admin.example.com/styler/v1`.
    pub base_url: String,
    /// Initial auth nonce attached to every request.
    pub nonce: String,
    /// Per-request timeout; a request with no response within this
    /// budget counts as a transport failure.
    pub timeout: Duration,
    /// Retry attempts after the initial request (retryable failures
    /// only).
    pub max_retries: u32,
    /// Base delay for exponential backoff between attempts.
    pub retry_delay: Duration,
    /// Enables verbose per-request logging.
    pub debug: bool,
}

impl SyncConfig {
    /// Create a configuration with the required fields and defaults
    /// for the rest.
    #[must_use]
    pub fn new(base_url: impl Into<String>, nonce: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            nonce: nonce.into(),
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            debug: false,
        }
    }

    /// Set the per-request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the retry budget.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the base backoff delay.
    #[must_use]
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Enable or disable verbose logging.
    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Validate the configuration, normalizing the base URL.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Configuration`] when `base_url` is missing
    /// or unparseable, or when `nonce` is missing.
    pub(crate) fn validate(&self) -> SyncResult<String> {
        if self.base_url.is_empty() {
            return Err(SyncError::Configuration("base_url is required".into()));
        }
        if self.nonce.is_empty() {
            return Err(SyncError::Configuration("nonce is required".into()));
        }

        Url::parse(&self.base_url)
            .map_err(|e| SyncError::Configuration(format!("invalid base_url: {e}")))?;

        Ok(self.base_url.trim_end_matches('/').to_string())
    }
}
