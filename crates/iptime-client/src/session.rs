//! Router session client.
//!
//! The admin interface is a browser flow: GET the login page, POST the login
//! form, carry the session cookie, and talk to `timepro.cgi` from then on.
//! [`RouterClient`] replays that flow. Depending on firmware revision the
//! router confirms a login four different ways, all of them handled in
//! [`RouterClient::login`].
//!
//! One client is one logical session. It is not meant to be shared across
//! concurrent logical sessions; the HTTP facade builds a fresh client per
//! incoming request instead.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use regex::Regex;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{
    HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, REFERER, USER_AGENT,
};
use reqwest::redirect::Policy;
use reqwest::{Client, Method, StatusCode, Url};
use tracing::{debug, error, info};

use crate::config::RouterConfig;
use crate::error::{ClientError, Result};

/// Login landing page; also the referer every CGI request carries.
const LOGIN_SESSION_PATH: &str = "/sess-bin/login_session.cgi";

/// Login form submission endpoint.
const LOGIN_HANDLER_PATH: &str = "/sess-bin/login_handler.cgi";

/// Session teardown endpoint.
const LOGOUT_PATH: &str = "/sess-bin/logout.cgi";

/// Session cookie name on current firmware.
const SESSION_COOKIE: &str = "efm_session_id";

/// Session cookie name on older firmware.
const LEGACY_SESSION_COOKIE: &str = "sess_id";

/// Fixed timeout applied to every router request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Browser identity presented to the router. The admin pages serve degraded
/// markup to unknown agents.
const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Placeholder value the stock login form posts in its `default_passwd`
/// field. The Korean literal is part of the wire contract.
const DEFAULT_PASSWD_FIELD: &str = "초기암호:admin(변경필요)";

/// One cookie session against one router.
///
/// Holds the HTTP client, the cookie jar and the authenticated flag. All
/// methods take `&self`; the session pair sits behind a lock because the
/// rules fetch swaps it wholesale on session timeout.
pub struct RouterClient {
    config: RouterConfig,
    base: Url,
    session: RwLock<CookieSession>,
    logged_in: AtomicBool,
}

/// HTTP client + jar pair, replaced together on inline re-login.
struct CookieSession {
    http: Client,
    jar: Arc<Jar>,
}

impl CookieSession {
    fn new() -> Result<Self> {
        let jar = Arc::new(Jar::default());
        let http = Client::builder()
            .default_headers(session_headers())
            .cookie_provider(Arc::clone(&jar))
            .danger_accept_invalid_certs(true)
            .redirect(Policy::none())
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { http, jar })
    }
}

/// Fields scraped off the login landing page script. Informational; the
/// login form itself always posts with captcha disabled.
#[derive(Debug, Default)]
struct SessionInfo {
    captcha_on: Option<String>,
    default_login: Option<String>,
    session_id: Option<String>,
}

impl RouterClient {
    /// Creates a client for the given router. No traffic happens until
    /// [`login`](Self::login).
    pub fn new(config: RouterConfig) -> Result<Self> {
        let base = Url::parse(&config.base_url)
            .map_err(|e| ClientError::InvalidUrl(e.to_string()))?;
        Ok(Self {
            config,
            base,
            session: RwLock::new(CookieSession::new()?),
            logged_in: AtomicBool::new(false),
        })
    }

    /// The config this client was built with.
    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Whether the last login/logout left the session authenticated.
    pub fn is_authenticated(&self) -> bool {
        self.logged_in.load(Ordering::SeqCst)
    }

    /// Logs in by replaying the admin login form. Never retries.
    ///
    /// Success is read off the response the way a browser would execute it,
    /// first applicable signal wins:
    ///
    /// 1. a `setCookie('...')` script carries the session id, which is
    ///    stored into the jar by hand
    /// 2. a `top.location` redirect that does not point back at the login
    ///    page
    /// 3. a plain 200 while the jar already holds a session cookie
    /// 4. a plain 200 whose body references the admin frameset
    ///
    /// Transport failures are logged and yield `false`.
    pub async fn login(&self) -> bool {
        match self.try_login().await {
            Ok(ok) => ok,
            Err(e) => {
                error!(error = %e, "login request failed");
                false
            }
        }
    }

    async fn try_login(&self) -> Result<bool> {
        // Best effort; some firmware answers this only mid-session.
        match self.fetch_session_info().await {
            Ok(session_info) => debug!(?session_info, "login page session info"),
            Err(e) => debug!(error = %e, "session info fetch failed, using defaults"),
        }

        let http = self.http();
        let response = http
            .post(self.url_for(LOGIN_HANDLER_PATH))
            .header(REFERER, self.referer())
            .form(&login_form(&self.config.username, &self.config.password))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if body.contains("setCookie") {
            if let Some(session_id) = extract_session_id(&body) {
                debug!("session id extracted from login script");
                self.store_session_cookie(&session_id);
                self.logged_in.store(true, Ordering::SeqCst);
                return Ok(true);
            }
        } else if body.contains("top.location") && !body.contains("login_session") {
            info!("login accepted (redirect script)");
            self.logged_in.store(true, Ordering::SeqCst);
            return Ok(true);
        } else if status == StatusCode::OK {
            if self.has_session_cookie() {
                info!("login accepted (session cookie)");
                self.logged_in.store(true, Ordering::SeqCst);
                return Ok(true);
            }
            if body.contains("timepro.cgi") {
                info!("login accepted (admin page)");
                self.logged_in.store(true, Ordering::SeqCst);
                return Ok(true);
            }
        }

        error!(%status, "login rejected");
        Ok(false)
    }

    /// Ends the admin session. The router confirms only with a plain 200.
    pub async fn logout(&self) -> bool {
        match self.try_logout().await {
            Ok(ok) => ok,
            Err(e) => {
                error!(error = %e, "logout request failed");
                false
            }
        }
    }

    async fn try_logout(&self) -> Result<bool> {
        let http = self.http();
        let response = http.get(self.url_for(LOGOUT_PATH)).send().await?;
        if response.status() != StatusCode::OK {
            return Ok(false);
        }
        self.logged_in.store(false, Ordering::SeqCst);
        debug!("logged out");
        Ok(true)
    }

    /// Issues a CGI request and returns the body on success.
    ///
    /// GET sends `params` as the query string, anything else form-posts
    /// them. 200 and 502 both count as success: some firmware answers CGI
    /// actions through a broken internal upstream and still carries the
    /// page. Failures are logged and collapse into `None`.
    pub async fn request(
        &self,
        path: &str,
        params: &[(&str, String)],
        method: Method,
    ) -> Option<String> {
        match self.try_request(path, params, method).await {
            Ok(body) => Some(body),
            Err(e) => {
                error!(%path, error = %e, "router request failed");
                None
            }
        }
    }

    async fn try_request(
        &self,
        path: &str,
        params: &[(&str, String)],
        method: Method,
    ) -> Result<String> {
        let http = self.http();
        let url = self.url_for(path);

        let request = if method == Method::GET {
            let mut builder = http.get(&url);
            if !params.is_empty() {
                builder = builder.query(params);
            }
            builder
        } else {
            http.post(&url).form(params)
        };

        let response = request.header(REFERER, self.referer()).send().await?;
        let status = response.status();
        if status == StatusCode::OK || status == StatusCode::BAD_GATEWAY {
            Ok(response.text().await?)
        } else {
            Err(ClientError::UnexpectedStatus(status))
        }
    }

    /// Replaces the cookie session with a brand-new jar and client. Used by
    /// the session-timeout recovery in the rules fetch; the marker page
    /// means the old cookie is dead and the router wants the login form
    /// replayed on a clean session.
    pub(crate) fn reset_session(&self) -> Result<()> {
        let fresh = CookieSession::new()?;
        *self.session.write().unwrap() = fresh;
        Ok(())
    }

    /// Replays the login form on the current session without interpreting
    /// the response. Pairs with [`reset_session`](Self::reset_session).
    pub(crate) async fn replay_login(&self) -> Result<()> {
        let http = self.http();
        http.post(self.url_for(LOGIN_HANDLER_PATH))
            .form(&login_form(&self.config.username, &self.config.password))
            .send()
            .await?;
        Ok(())
    }

    /// Clone of the current HTTP client; cheap, and keeps lock guards from
    /// living across awaits.
    pub(crate) fn http(&self) -> Client {
        self.session.read().unwrap().http.clone()
    }

    /// Joins a CGI path onto the base URL.
    pub(crate) fn url_for(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.config.base_url, path)
        } else {
            format!("{}/{}", self.config.base_url, path)
        }
    }

    fn referer(&self) -> String {
        format!("{}{}", self.config.base_url, LOGIN_SESSION_PATH)
    }

    async fn fetch_session_info(&self) -> Result<SessionInfo> {
        let http = self.http();
        let response = http
            .get(self.url_for(LOGIN_SESSION_PATH))
            .send()
            .await?
            .error_for_status()?;
        let body = response.text().await?;
        Ok(parse_session_info(&body))
    }

    fn store_session_cookie(&self, session_id: &str) {
        let cookie = format!(
            "{SESSION_COOKIE}={session_id}; Domain={}; Path=/",
            self.config.host_without_port()
        );
        self.session
            .read()
            .unwrap()
            .jar
            .add_cookie_str(&cookie, &self.base);
    }

    fn has_session_cookie(&self) -> bool {
        let session = self.session.read().unwrap();
        let Some(header) = session.jar.cookies(&self.base) else {
            return false;
        };
        let Ok(cookies) = header.to_str() else {
            return false;
        };
        cookies.split(';').any(|pair| {
            let name = pair.trim().split('=').next().unwrap_or_default();
            name == SESSION_COOKIE || name == LEGACY_SESSION_COOKIE
        })
    }
}

/// Headers every session presents; the admin CGI checks the browser-ness of
/// its callers.
fn session_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
    );
    headers.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_static("ko-KR,ko;q=0.9,en;q=0.8"),
    );
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers
}

/// Login form posted to `login_handler.cgi`. Captcha fields ride along
/// disabled; captcha-enabled routers are out of scope and fail the login.
fn login_form(username: &str, password: &str) -> Vec<(&'static str, String)> {
    vec![
        ("init_status", "1".to_string()),
        ("captcha_on", "0".to_string()),
        ("captcha_file", String::new()),
        ("username", username.to_string()),
        ("passwd", password.to_string()),
        ("default_passwd", DEFAULT_PASSWD_FIELD.to_string()),
        ("captcha_code", String::new()),
    ]
}

/// Pulls the session id out of the `setCookie('...')` script the login
/// handler answers with.
fn extract_session_id(body: &str) -> Option<String> {
    Regex::new(r"setCookie\('([^']+)'\)")
        .expect("valid session cookie pattern")
        .captures(body)
        .map(|captures| captures[1].to_string())
}

fn parse_session_info(body: &str) -> SessionInfo {
    let field = |pattern: &str| {
        Regex::new(pattern)
            .expect("valid session info pattern")
            .captures(body)
            .map(|captures| captures[1].to_string())
    };
    SessionInfo {
        captcha_on: field(r#"captcha_on\s*=\s*"(\d+)""#),
        default_login: field(r#"default_login\s*=\s*"([^"]+)""#),
        session_id: field(r#"session_id\s*=\s*"([^"]+)""#),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;

    use axum::extract::Query;
    use axum::http::{header, HeaderMap as AxumHeaderMap, StatusCode as AxumStatus};
    use axum::routing::{get, post};
    use axum::Router;
    use std::collections::HashMap;

    fn client_for(base: &str) -> RouterClient {
        RouterClient::new(RouterConfig::new(base, "admin", "pw")).unwrap()
    }

    async fn echo_cookies(headers: AxumHeaderMap) -> String {
        headers
            .get(header::COOKIE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string()
    }

    // ==================== Parsing Tests ====================

    #[test]
    fn extracts_session_id_from_cookie_script() {
        let body = "<script>setCookie('abc123'); top.location = '/';</script>";
        assert_eq!(extract_session_id(body), Some("abc123".to_string()));
        assert_eq!(extract_session_id("<script>setCookie();</script>"), None);
    }

    #[test]
    fn parses_session_info_fields() {
        let body = r#"
            <script>
            var captcha_on = "1";
            var default_login = "admin";
            var session_id = "deadbeef";
            </script>
        "#;
        let info = parse_session_info(body);
        assert_eq!(info.captcha_on.as_deref(), Some("1"));
        assert_eq!(info.default_login.as_deref(), Some("admin"));
        assert_eq!(info.session_id.as_deref(), Some("deadbeef"));

        let empty = parse_session_info("<html>nothing here</html>");
        assert!(empty.captcha_on.is_none());
        assert!(empty.session_id.is_none());
    }

    #[test]
    fn login_form_posts_credentials_with_captcha_disabled() {
        let form = login_form("admin", "hunter2");
        let lookup: HashMap<&str, &str> = form
            .iter()
            .map(|(key, value)| (*key, value.as_str()))
            .collect();
        assert_eq!(lookup["init_status"], "1");
        assert_eq!(lookup["captcha_on"], "0");
        assert_eq!(lookup["captcha_code"], "");
        assert_eq!(lookup["username"], "admin");
        assert_eq!(lookup["passwd"], "hunter2");
        assert_eq!(lookup["default_passwd"], DEFAULT_PASSWD_FIELD);
    }

    // ==================== Login Flow Tests ====================

    #[tokio::test]
    async fn login_stores_session_cookie_from_script() {
        let app = Router::new()
            .route(
                "/sess-bin/login_handler.cgi",
                post(|| async { "<script>setCookie('abc123');</script>" }),
            )
            .route("/echo-cookies", get(echo_cookies));
        let base = testutil::serve(app).await;

        let client = client_for(&base);
        assert!(client.login().await);
        assert!(client.is_authenticated());

        let cookies = client.request("/echo-cookies", &[], Method::GET).await;
        assert!(cookies.unwrap().contains("efm_session_id=abc123"));
    }

    #[tokio::test]
    async fn login_accepts_redirect_script() {
        let app = Router::new().route(
            "/sess-bin/login_handler.cgi",
            post(|| async { "<html><script>top.location = '/cgi/main.html';</script></html>" }),
        );
        let base = testutil::serve(app).await;

        let client = client_for(&base);
        assert!(client.login().await);
        assert!(client.is_authenticated());
    }

    #[tokio::test]
    async fn login_accepts_cookie_set_by_landing_page() {
        let app = Router::new()
            .route(
                "/sess-bin/login_session.cgi",
                get(|| async {
                    (
                        [(header::SET_COOKIE, "efm_session_id=zzz; Path=/")],
                        r#"<script>var session_id = "zzz";</script>"#,
                    )
                }),
            )
            .route("/sess-bin/login_handler.cgi", post(|| async { "<html>ok</html>" }));
        let base = testutil::serve(app).await;

        let client = client_for(&base);
        assert!(client.login().await);
        assert!(client.is_authenticated());
    }

    #[tokio::test]
    async fn login_accepts_admin_page_body() {
        let app = Router::new().route(
            "/sess-bin/login_handler.cgi",
            post(|| async { r#"<html><a href="/sess-bin/timepro.cgi?tmenu=main">admin</a></html>"# }),
        );
        let base = testutil::serve(app).await;

        let client = client_for(&base);
        assert!(client.login().await);
    }

    #[tokio::test]
    async fn login_rejects_plain_login_page() {
        let app = Router::new().route(
            "/sess-bin/login_handler.cgi",
            post(|| async { "<html>please sign in</html>" }),
        );
        let base = testutil::serve(app).await;

        let client = client_for(&base);
        assert!(!client.login().await);
        assert!(!client.is_authenticated());
    }

    #[tokio::test]
    async fn login_rejects_garbled_cookie_script() {
        // A setCookie marker without an extractable id decides the outcome;
        // later signals are not consulted.
        let app = Router::new().route(
            "/sess-bin/login_handler.cgi",
            post(|| async { "<script>setCookie();</script>" }),
        );
        let base = testutil::serve(app).await;

        let client = client_for(&base);
        assert!(!client.login().await);
    }

    #[tokio::test]
    async fn login_survives_unreachable_router() {
        let client = client_for("http://127.0.0.1:1");
        assert!(!client.login().await);
        assert!(!client.is_authenticated());
    }

    // ==================== Request Tests ====================

    #[tokio::test]
    async fn request_returns_body_on_bad_gateway() {
        let app = Router::new().route(
            "/half-broken",
            get(|| async { (AxumStatus::BAD_GATEWAY, "gateway fell over but here is the page") }),
        );
        let base = testutil::serve(app).await;

        let client = client_for(&base);
        let body = client.request("/half-broken", &[], Method::GET).await;
        assert_eq!(
            body.as_deref(),
            Some("gateway fell over but here is the page")
        );
    }

    #[tokio::test]
    async fn request_collapses_unexpected_statuses() {
        let app = Router::new();
        let base = testutil::serve(app).await;

        let client = client_for(&base);
        assert!(client.request("/missing", &[], Method::GET).await.is_none());
    }

    #[tokio::test]
    async fn request_carries_referer_and_query() {
        let app = Router::new().route(
            "/cgi",
            get(
                |Query(params): Query<HashMap<String, String>>, headers: AxumHeaderMap| async move {
                    let referer = headers
                        .get(header::REFERER)
                        .and_then(|value| value.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    format!("{}|{}", referer, params["tmenu"])
                },
            ),
        );
        let base = testutil::serve(app).await;

        let client = client_for(&base);
        let body = client
            .request("cgi", &[("tmenu", "iframe".to_string())], Method::GET)
            .await
            .unwrap();
        assert_eq!(body, format!("{base}/sess-bin/login_session.cgi|iframe"));
    }

    // ==================== Logout Tests ====================

    #[tokio::test]
    async fn logout_clears_authenticated_flag() {
        let app = Router::new()
            .route(
                "/sess-bin/login_handler.cgi",
                post(|| async { "<script>setCookie('abc123');</script>" }),
            )
            .route("/sess-bin/logout.cgi", get(|| async { "bye" }));
        let base = testutil::serve(app).await;

        let client = client_for(&base);
        assert!(client.login().await);
        assert!(client.logout().await);
        assert!(!client.is_authenticated());
    }

    #[tokio::test]
    async fn logout_requires_plain_200() {
        let app = Router::new().route(
            "/sess-bin/logout.cgi",
            get(|| async { (AxumStatus::BAD_GATEWAY, "no") }),
        );
        let base = testutil::serve(app).await;

        let client = client_for(&base);
        assert!(!client.logout().await);
    }
}
