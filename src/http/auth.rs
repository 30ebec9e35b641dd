//! Login against the target site.
//!
//! The login page is fetched once to pick up the anti-forgery token and the
//! form's `action`. Candidate endpoints are then tried in order until a
//! [`LoginSuccessDetector`] accepts the response.

use reqwest::StatusCode;
use scraper::{Html, Selector};
use std::collections::HashSet;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::cli::config::{Credentials, SiteSettings};
use crate::error::CrawlError;
use crate::http::headers::login_headers;
use crate::http::session::Session;

/// Form field carrying the anti-forgery token
const TOKEN_FIELD: &str = "_token";

/// What a login submission produced
#[derive(Debug)]
pub struct LoginAttempt<'a> {
    pub status: StatusCode,
    /// URL after redirects
    pub final_url: &'a Url,
    pub body: &'a str,
    pub login_page: &'a Url,
    /// Where the form was submitted
    pub endpoint: &'a Url,
}

/// Decides whether a login submission left the session authenticated
pub trait LoginSuccessDetector: Send + Sync {
    fn is_authenticated(&self, attempt: &LoginAttempt<'_>) -> bool;
}

/// Keyword heuristic: status 200/302, an authenticated-area keyword in the
/// URL or body, and not left on the login page or the submission endpoint.
#[derive(Debug, Clone)]
pub struct KeywordSuccessDetector {
    keywords: Vec<String>,
}

impl KeywordSuccessDetector {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| k.as_ref().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }
}

impl LoginSuccessDetector for KeywordSuccessDetector {
    fn is_authenticated(&self, attempt: &LoginAttempt<'_>) -> bool {
        if !matches!(attempt.status.as_u16(), 200 | 302) {
            return false;
        }

        // Still on the form, wherever it was rendered
        if same_page(attempt.final_url, attempt.login_page)
            || same_page(attempt.final_url, attempt.endpoint)
        {
            return false;
        }

        let url = attempt.final_url.as_str().to_lowercase();
        let body = attempt.body.to_lowercase();

        self.keywords
            .iter()
            .any(|keyword| url.contains(keyword.as_str()) || body.contains(keyword.as_str()))
    }
}

fn same_page(a: &Url, b: &Url) -> bool {
    a.scheme() == b.scheme()
        && a.host_str() == b.host_str()
        && a.port_or_known_default() == b.port_or_known_default()
        && a.path().trim_end_matches('/') == b.path().trim_end_matches('/')
}

/// Token and submission target scraped from the login page
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LoginForm {
    pub token: Option<String>,
    pub action: Option<Url>,
}

impl LoginForm {
    pub fn parse(body: &str, base: &Url) -> Self {
        let document = Html::parse_document(body);

        let token = first_attr(&document, r#"meta[name="csrf-token"]"#, "content")
            .or_else(|| first_attr(&document, r#"input[name="_token"]"#, "value"));

        Self {
            token,
            action: login_action(&document, base),
        }
    }
}

fn first_attr(document: &Html, css: &str, attr: &str) -> Option<String> {
    let selector = Selector::parse(css).ok()?;
    document
        .select(&selector)
        .filter_map(|element| element.value().attr(attr))
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

/// `action` of the first form holding a password input
fn login_action(document: &Html, base: &Url) -> Option<Url> {
    let forms = Selector::parse("form").ok()?;
    let password = Selector::parse(r#"input[type="password"]"#).ok()?;

    let form = document
        .select(&forms)
        .find(|form| form.select(&password).next().is_some())?;
    let action = form.value().attr("action")?.trim();
    if action.is_empty() {
        return None;
    }

    match base.join(action) {
        Ok(url) => Some(url),
        Err(e) => {
            warn!("Ignoring unparseable login form action '{}': {}", action, e);
            None
        }
    }
}

enum EndpointResult {
    Accepted,
    MethodNotAllowed,
    Rejected { status: StatusCode, final_url: Url },
    Failed(crate::error::FetchError),
}

/// Establishes an authenticated session
pub struct Authenticator {
    login_path: String,
    fallback_endpoints: Vec<String>,
    login_field: String,
    password_field: String,
    detector: Box<dyn LoginSuccessDetector>,
}

impl Authenticator {
    pub fn new(site: &SiteSettings) -> Self {
        Self {
            login_path: site.login_path.clone(),
            fallback_endpoints: site.login_endpoints.clone(),
            login_field: site.login_field.clone(),
            password_field: site.password_field.clone(),
            detector: Box::new(KeywordSuccessDetector::new(&site.success_keywords)),
        }
    }

    /// Replace the success heuristic
    pub fn with_detector(mut self, detector: impl LoginSuccessDetector + 'static) -> Self {
        self.detector = Box::new(detector);
        self
    }

    /// Log in on `session`.
    ///
    /// `Ok(false)` means every candidate endpoint was tried without success.
    /// Only a failure to fetch the login page itself is an error.
    pub async fn authenticate(
        &self,
        session: &Session,
        credentials: &Credentials,
    ) -> Result<bool, CrawlError> {
        let login_page = session.url(&self.login_path)?;
        info!("Fetching login page: {}", login_page);

        let page = session.get(login_page.clone()).await?;
        let form = LoginForm::parse(&page.body, &page.url);

        match &form.token {
            Some(token) => debug!("Found CSRF token ({} chars)", token.len()),
            None => warn!("No CSRF token found on login page, submitting without one"),
        }

        info!("Attempting login as {}", credentials.login);

        for endpoint in self.endpoints(session, form.action.clone()) {
            let result = self
                .try_endpoint(session, &endpoint, &login_page, credentials, form.token.as_deref())
                .await;

            match result {
                EndpointResult::Accepted => {
                    info!("Login successful via {}", endpoint);
                    return Ok(true);
                }
                EndpointResult::MethodNotAllowed => {
                    debug!("Endpoint {} does not accept POST, skipping", endpoint);
                }
                EndpointResult::Rejected { status, final_url } => {
                    warn!(
                        "Login not accepted at {} (status {}, landed on {})",
                        endpoint, status, final_url
                    );
                }
                EndpointResult::Failed(e) => {
                    warn!("Login request to {} failed: {}", endpoint, e);
                }
            }
        }

        error!("Login failed on every candidate endpoint");
        Ok(false)
    }

    /// Form action first, then configured fallbacks; lazily resolved, deduplicated
    fn endpoints<'a>(
        &'a self,
        session: &'a Session,
        action: Option<Url>,
    ) -> impl Iterator<Item = Url> + 'a {
        let mut seen = HashSet::new();

        action
            .into_iter()
            .chain(self.fallback_endpoints.iter().filter_map(move |path| {
                match session.url(path) {
                    Ok(url) => Some(url),
                    Err(e) => {
                        warn!("Skipping invalid login endpoint '{}': {}", path, e);
                        None
                    }
                }
            }))
            .filter(move |url| seen.insert(url.clone()))
    }

    async fn try_endpoint(
        &self,
        session: &Session,
        endpoint: &Url,
        login_page: &Url,
        credentials: &Credentials,
        token: Option<&str>,
    ) -> EndpointResult {
        let mut form = vec![
            (self.login_field.as_str(), credentials.login.as_str()),
            (self.password_field.as_str(), credentials.password.as_str()),
        ];
        if let Some(token) = token {
            form.push((TOKEN_FIELD, token));
        }

        debug!("Submitting login form to {}", endpoint);
        let response = match session
            .post_form(endpoint.clone(), &form, login_headers(login_page, token))
            .await
        {
            Ok(response) => response,
            Err(e) => return EndpointResult::Failed(e),
        };

        if response.status == StatusCode::METHOD_NOT_ALLOWED {
            return EndpointResult::MethodNotAllowed;
        }

        let attempt = LoginAttempt {
            status: response.status,
            final_url: &response.url,
            body: &response.body,
            login_page,
            endpoint,
        };

        if self.detector.is_authenticated(&attempt) {
            EndpointResult::Accepted
        } else {
            EndpointResult::Rejected {
                status: response.status,
                final_url: response.url.clone(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::config::HttpSettings;
    use crate::http::session::ConnectionLimits;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const LOGIN_PAGE: &str = r#"
        <html>
        <head><meta name="csrf-token" content="tok123"></head>
        <body>
            <form method="post">
                <input type="hidden" name="_token" value="tok123">
                <input type="email" name="email">
                <input type="password" name="password">
            </form>
        </body>
        </html>
    "#;

    struct RejectAll;

    impl LoginSuccessDetector for RejectAll {
        fn is_authenticated(&self, _attempt: &LoginAttempt<'_>) -> bool {
            false
        }
    }

    fn site(endpoints: &[&str]) -> SiteSettings {
        SiteSettings {
            login_endpoints: endpoints.iter().map(|e| e.to_string()).collect(),
            ..SiteSettings::default()
        }
    }

    fn credentials() -> Credentials {
        Credentials::new("user@example.com", "secret")
    }

    async fn serve_login_page(server: &MockServer, body: &str) {
        Mock::given(method("GET"))
            .and(path("/login"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(server)
            .await;
    }

    async fn serve_dashboard(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/dashboard"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<a href=\"/logout\">Logout</a>"))
            .mount(server)
            .await;
    }

    fn session_for(server: &MockServer) -> Session {
        Session::open(&server.uri(), &HttpSettings::default(), ConnectionLimits::new(4, 4)).unwrap()
    }

    fn attempt<'a>(
        status: u16,
        final_url: &'a Url,
        body: &'a str,
        login_page: &'a Url,
        endpoint: &'a Url,
    ) -> LoginAttempt<'a> {
        LoginAttempt {
            status: StatusCode::from_u16(status).unwrap(),
            final_url,
            body,
            login_page,
            endpoint,
        }
    }

    #[test]
    fn test_keyword_detector() {
        let detector = KeywordSuccessDetector::new(["dashboard", "Logout"]);
        let login = Url::parse("https://example.com/login").unwrap();
        let dashboard = Url::parse("https://example.com/dashboard").unwrap();
        let home = Url::parse("https://example.com/home").unwrap();
        let post = Url::parse("https://example.com/loginu").unwrap();

        assert!(detector.is_authenticated(&attempt(200, &dashboard, "", &login, &post)));
        assert!(detector.is_authenticated(&attempt(200, &home, "<a>LOGOUT</a>", &login, &post)));
        assert!(!detector.is_authenticated(&attempt(200, &home, "welcome", &login, &post)));
        // Keyword present but still on the login page or the endpoint
        assert!(!detector.is_authenticated(&attempt(200, &login, "logout", &login, &post)));
        assert!(!detector.is_authenticated(&attempt(200, &post, "logout", &login, &post)));
        assert!(!detector.is_authenticated(&attempt(500, &dashboard, "logout", &login, &post)));
    }

    #[test]
    fn test_token_prefers_meta_tag() {
        let base = Url::parse("https://example.com").unwrap();
        let body = r#"<meta name="csrf-token" content="from-meta"><input name="_token" value="from-input">"#;
        assert_eq!(LoginForm::parse(body, &base).token.as_deref(), Some("from-meta"));

        let body = r#"<form><input name="_token" value="from-input"></form>"#;
        assert_eq!(LoginForm::parse(body, &base).token.as_deref(), Some("from-input"));

        assert_eq!(LoginForm::parse("<p>nothing</p>", &base).token, None);
    }

    #[test]
    fn test_form_action_resolved_against_base() {
        let base = Url::parse("https://example.com").unwrap();
        let body = r#"
            <form action="/search"><input name="q"></form>
            <form action="/session/create"><input type="password" name="password"></form>
        "#;

        let form = LoginForm::parse(body, &base);
        assert_eq!(form.action.unwrap().as_str(), "https://example.com/session/create");

        let body = r#"<form action=""><input type="password" name="password"></form>"#;
        assert_eq!(LoginForm::parse(body, &base).action, None);
    }

    #[tokio::test]
    async fn test_falls_back_after_method_not_allowed() {
        let server = MockServer::start().await;
        serve_login_page(&server, LOGIN_PAGE).await;
        serve_dashboard(&server).await;

        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .respond_with(ResponseTemplate::new(405))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/signin"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", "/dashboard"))
            .expect(1)
            .mount(&server)
            .await;

        let session = session_for(&server);
        let authenticator = Authenticator::new(&site(&["/auth/login", "/signin"]));

        assert!(authenticator.authenticate(&session, &credentials()).await.unwrap());
    }

    #[tokio::test]
    async fn test_token_sent_as_field_and_header() {
        let server = MockServer::start().await;
        serve_login_page(&server, LOGIN_PAGE).await;

        Mock::given(method("POST"))
            .and(path("/signin"))
            .and(header("x-csrf-token", "tok123"))
            .and(body_string_contains("_token=tok123"))
            .and(body_string_contains("email=user%40example.com"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", "/dashboard"))
            .expect(1)
            .mount(&server)
            .await;
        serve_dashboard(&server).await;

        let session = session_for(&server);
        let authenticator = Authenticator::new(&site(&["/signin"]));

        assert!(authenticator.authenticate(&session, &credentials()).await.unwrap());
    }

    #[tokio::test]
    async fn test_form_action_tried_first() {
        let server = MockServer::start().await;
        let page = r#"<form action="/custom-login"><input type="password" name="password"></form>"#;
        serve_login_page(&server, page).await;

        serve_dashboard(&server).await;

        Mock::given(method("POST"))
            .and(path("/custom-login"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", "/dashboard"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/signin"))
            .respond_with(ResponseTemplate::new(200).set_body_string("your dashboard"))
            .expect(0)
            .mount(&server)
            .await;

        let session = session_for(&server);
        let authenticator = Authenticator::new(&site(&["/signin"]));

        assert!(authenticator.authenticate(&session, &credentials()).await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_token_is_not_fatal() {
        let server = MockServer::start().await;
        serve_login_page(&server, "<form><input type=\"password\" name=\"password\"></form>").await;
        serve_dashboard(&server).await;

        Mock::given(method("POST"))
            .and(path("/signin"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", "/dashboard"))
            .mount(&server)
            .await;

        let session = session_for(&server);
        let authenticator = Authenticator::new(&site(&["/signin"]));

        assert!(authenticator.authenticate(&session, &credentials()).await.unwrap());
    }

    #[tokio::test]
    async fn test_bounced_back_to_login_page_fails() {
        let server = MockServer::start().await;
        serve_login_page(&server, &format!("{}<p>profile</p>", LOGIN_PAGE)).await;

        Mock::given(method("POST"))
            .and(path("/signin"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", "/login"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .respond_with(ResponseTemplate::new(200).set_body_string("Invalid credentials"))
            .mount(&server)
            .await;

        let session = session_for(&server);
        let authenticator = Authenticator::new(&site(&["/signin", "/auth/login", "/missing"]));

        assert!(!authenticator.authenticate(&session, &credentials()).await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_login_rendered_at_endpoint_is_rejected() {
        let server = MockServer::start().await;
        serve_login_page(&server, LOGIN_PAGE).await;

        Mock::given(method("POST"))
            .and(path("/loginu"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "These credentials do not match our records. <a href=\"/jobsearcher\">Candidates</a>",
            ))
            .expect(1)
            .mount(&server)
            .await;

        let session = session_for(&server);
        let authenticator = Authenticator::new(&site(&["/loginu"]));

        assert!(!authenticator.authenticate(&session, &credentials()).await.unwrap());
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_falls_through_to_next() {
        let server = MockServer::start().await;
        serve_login_page(&server, LOGIN_PAGE).await;
        serve_dashboard(&server).await;

        Mock::given(method("POST"))
            .and(path("/signin"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", "/dashboard"))
            .expect(1)
            .mount(&server)
            .await;

        let session = session_for(&server);
        let authenticator = Authenticator::new(&site(&["http://127.0.0.1:9/x", "/signin"]));

        assert!(authenticator.authenticate(&session, &credentials()).await.unwrap());
    }

    #[tokio::test]
    async fn test_custom_detector_overrides_heuristic() {
        let server = MockServer::start().await;
        serve_login_page(&server, LOGIN_PAGE).await;
        serve_dashboard(&server).await;

        Mock::given(method("POST"))
            .and(path("/signin"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", "/dashboard"))
            .mount(&server)
            .await;

        let session = session_for(&server);
        let authenticator = Authenticator::new(&site(&["/signin"])).with_detector(RejectAll);

        assert!(!authenticator.authenticate(&session, &credentials()).await.unwrap());
    }

    #[tokio::test]
    async fn test_unreachable_login_page_is_an_error() {
        let session = Session::open(
            "http://127.0.0.1:9",
            &HttpSettings {
                timeout_secs: 2,
                ..HttpSettings::default()
            },
            ConnectionLimits::new(1, 1),
        )
        .unwrap();
        let authenticator = Authenticator::new(&site(&["/signin"]));

        let result = authenticator.authenticate(&session, &credentials()).await;
        assert!(matches!(result, Err(CrawlError::Fetch(_))));
    }
}
