use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONNECTION, REFERER,
    UPGRADE_INSECURE_REQUESTS,
};
use tracing::warn;
use url::Url;

use crate::cli::config::HttpSettings;
use crate::error::CrawlError;

/// Header carrying the anti-forgery token on login submissions
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Headers sent with every request of a session, next to the User-Agent.
///
/// `Accept-Encoding` is left to reqwest, which advertises and decodes
/// gzip/deflate itself.
pub fn browser_headers(settings: &HttpSettings) -> Result<HeaderMap, CrawlError> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_str(&settings.accept)?);
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_str(&settings.accept_language)?);
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert(UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));
    headers.insert(HeaderName::from_static("dnt"), HeaderValue::from_static("1"));

    Ok(headers)
}

/// Per-request headers for a login form submission
pub fn login_headers(referer: &Url, token: Option<&str>) -> HeaderMap {
    let mut headers = HeaderMap::new();

    match HeaderValue::from_str(referer.as_str()) {
        Ok(value) => {
            headers.insert(REFERER, value);
        }
        Err(e) => warn!("Skipping Referer header: {}", e),
    }

    if let Some(token) = token {
        match HeaderValue::from_str(token) {
            Ok(value) => {
                headers.insert(HeaderName::from_static(CSRF_HEADER), value);
            }
            Err(_) => warn!("CSRF token is not a valid header value; sending it as a form field only"),
        }
    }

    headers
}
