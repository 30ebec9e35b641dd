use reqwest::header::HeaderMap;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tracing::debug;
use url::Url;

use crate::cli::config::HttpSettings;
use crate::error::{CrawlError, FetchError};
use crate::http::headers::browser_headers;

/// Caps on concurrent connections held by one session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionLimits {
    pub total: usize,
    pub per_host: usize,
}

impl ConnectionLimits {
    pub fn new(total: usize, per_host: usize) -> Self {
        Self {
            total: total.max(1),
            per_host: per_host.max(1),
        }
    }

    pub fn from_settings(settings: &HttpSettings) -> Self {
        Self::new(settings.max_connections, settings.max_connections_per_host)
    }

    /// Raise both caps so that `concurrency` requests never wait on the pool
    pub fn at_least(self, concurrency: usize) -> Self {
        Self::new(self.total.max(concurrency), self.per_host.max(concurrency))
    }
}

/// Semaphores enforcing [`ConnectionLimits`]
struct ConnectionGate {
    total: Arc<Semaphore>,
    per_host_limit: usize,
    per_host: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl ConnectionGate {
    fn new(limits: ConnectionLimits) -> Self {
        Self {
            total: Arc::new(Semaphore::new(limits.total)),
            per_host_limit: limits.per_host,
            per_host: Mutex::new(HashMap::new()),
        }
    }

    async fn acquire(&self, url: &Url) -> Result<[OwnedSemaphorePermit; 2], FetchError> {
        let host_key = format!(
            "{}:{}",
            url.host_str().unwrap_or_default(),
            url.port_or_known_default().unwrap_or_default()
        );

        let host_semaphore = {
            let mut hosts = self.per_host.lock().await;
            hosts
                .entry(host_key)
                .or_insert_with(|| Arc::new(Semaphore::new(self.per_host_limit)))
                .clone()
        };

        // Host first, so a request parked on a busy host holds no global slot
        let host_permit = host_semaphore
            .acquire_owned()
            .await
            .map_err(|_| FetchError::GateClosed)?;
        let total_permit = self
            .total
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| FetchError::GateClosed)?;

        Ok([host_permit, total_permit])
    }
}

/// A fully read response
#[derive(Debug, Clone)]
pub struct PageResponse {
    pub status: StatusCode,
    /// URL after redirects
    pub url: Url,
    pub body: String,
}

/// Authenticated transport context shared by every request of a run.
///
/// Cookies set by the site (the login in particular) live in the client's
/// cookie jar. Dropping the session releases the pooled connections.
pub struct Session {
    client: Client,
    base_url: Url,
    gate: ConnectionGate,
}

impl Session {
    /// Build a session against `base_url`
    pub fn open(
        base_url: &str,
        settings: &HttpSettings,
        limits: ConnectionLimits,
    ) -> Result<Self, CrawlError> {
        let base_url = Url::parse(base_url)?;

        let client = Client::builder()
            .cookie_store(true)
            .user_agent(settings.user_agent.as_str())
            .default_headers(browser_headers(settings)?)
            .timeout(Duration::from_secs(settings.timeout_secs))
            .pool_max_idle_per_host(limits.per_host)
            .build()
            .map_err(CrawlError::Client)?;

        debug!(
            base_url = %base_url,
            total = limits.total,
            per_host = limits.per_host,
            "Session opened"
        );

        Ok(Self {
            client,
            base_url,
            gate: ConnectionGate::new(limits),
        })
    }

    /// Resolve a path against the session's origin
    pub fn url(&self, path: &str) -> Result<Url, url::ParseError> {
        self.base_url.join(path)
    }

    /// Profile page URL for `id`, from a template containing `{id}`
    pub fn profile_url(&self, template: &str, id: u32) -> Result<Url, url::ParseError> {
        self.url(&template.replace("{id}", &id.to_string()))
    }

    pub async fn get(&self, url: Url) -> Result<PageResponse, FetchError> {
        let request = self.client.get(url.clone());
        self.execute(&url, request).await
    }

    /// POST a form-encoded body, following redirects
    pub async fn post_form<T: Serialize + ?Sized>(
        &self,
        url: Url,
        form: &T,
        headers: HeaderMap,
    ) -> Result<PageResponse, FetchError> {
        let request = self.client.post(url.clone()).headers(headers).form(form);
        self.execute(&url, request).await
    }

    async fn execute(&self, url: &Url, request: RequestBuilder) -> Result<PageResponse, FetchError> {
        let _permits = self.gate.acquire(url).await?;

        let response = request.send().await?;
        let status = response.status();
        let final_url = response.url().clone();
        let body = response.text().await?;

        debug!(url = %url, status = status.as_u16(), bytes = body.len(), "Request completed");

        Ok(PageResponse {
            status,
            url: final_url,
            body,
        })
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        debug!(base_url = %self.base_url, "Session released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_limits_are_raised_to_concurrency() {
        let limits = ConnectionLimits::new(10, 5).at_least(8);
        assert_eq!(limits, ConnectionLimits::new(10, 8));

        let limits = ConnectionLimits::new(0, 0);
        assert_eq!(limits, ConnectionLimits::new(1, 1));
    }

    #[test]
    fn test_profile_url_substitutes_id() {
        let session = Session::open(
            "https://example.com",
            &HttpSettings::default(),
            ConnectionLimits::new(2, 2),
        )
        .unwrap();

        let url = session.profile_url("/jobsearcher/{id}", 42).unwrap();
        assert_eq!(url.as_str(), "https://example.com/jobsearcher/42");
    }

    #[test]
    fn test_open_rejects_bad_base_url() {
        let result = Session::open("not a url", &HttpSettings::default(), ConnectionLimits::new(1, 1));
        assert!(matches!(result, Err(CrawlError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_cookies_persist_across_requests() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/set"))
            .respond_with(ResponseTemplate::new(200).insert_header("Set-Cookie", "sid=abc; Path=/"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/check"))
            .and(wiremock::matchers::header("cookie", "sid=abc"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let session =
            Session::open(&server.uri(), &HttpSettings::default(), ConnectionLimits::new(2, 2)).unwrap();

        session.get(session.url("/set").unwrap()).await.unwrap();
        let page = session.get(session.url("/check").unwrap()).await.unwrap();

        assert_eq!(page.status, StatusCode::OK);
        assert_eq!(page.body, "ok");
    }
}
