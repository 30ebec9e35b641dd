use thiserror::Error;

/// Errors that abort a crawl run
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Authentication failed: no login endpoint accepted the credentials")]
    AuthenticationFailed,

    #[error("Invalid crawl plan: {0}")]
    InvalidPlan(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Request failed during setup: {0}")]
    Fetch(#[from] FetchError),
}

/// Errors scoped to a single request
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Connection limiter was closed")]
    GateClosed,
}

impl FetchError {
    /// Whether another attempt could plausibly succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Http(_))
    }
}
