use reqwest::StatusCode;

/// Errors that can occur while fetching, parsing or saving financial pages.
#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    /// Transport-level HTTP failure (DNS, connect, timeout, body read).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The site refused the request, usually anti-scraping protection.
    #[error("access forbidden ({status}) for {url}, possible anti-scraping")]
    Blocked { url: String, status: StatusCode },

    /// The page does not exist.
    #[error("page not found (404): {url}")]
    NotFound { url: String },

    /// Still rate limited after every retry.
    #[error("rate limit exceeded (429) for {url} after {attempts} attempts")]
    RateLimited { url: String, attempts: u32 },

    /// Any other non-success status.
    #[error("unexpected status {status} for {url}")]
    Status { url: String, status: StatusCode },

    /// Headless browser could not be launched or driven.
    #[error("browser error: {0}")]
    Browser(String),

    /// A blocking task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// CSS selector or content parse failure.
    #[error("parse error: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Yahoo Finance error: {0}")]
    Quote(#[from] yahoo_finance_api::YahooError),

    /// Neither the fast request nor the browser produced a page.
    #[error("both fast and browser methods failed (fast: {fast}; browser: {browser})")]
    AllTiersFailed { fast: String, browser: String },
}

impl ScrapeError {
    /// Whether retrying the same request could succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_body() || e.is_request(),
            Self::Status { status, .. } => status.is_server_error(),
            Self::RateLimited { .. } => true,
            _ => false,
        }
    }
}

pub type Result<T, E = ScrapeError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_transient_client_errors_are_not() {
        let server = ScrapeError::Status {
            url: "https://example.com".into(),
            status: StatusCode::BAD_GATEWAY,
        };
        let blocked = ScrapeError::Blocked {
            url: "https://example.com".into(),
            status: StatusCode::FORBIDDEN,
        };
        assert!(server.is_transient());
        assert!(!blocked.is_transient());
        assert!(!ScrapeError::NotFound { url: "x".into() }.is_transient());
    }

    #[test]
    fn all_tiers_failed_mentions_both_reasons() {
        let err = ScrapeError::AllTiersFailed {
            fast: "timeout".into(),
            browser: "chrome missing".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("timeout"));
        assert!(msg.contains("chrome missing"));
    }
}
