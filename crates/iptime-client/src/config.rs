//! Router connection configuration.

use std::env;

/// Router address used when `IPTIME_ROUTER_IP` is unset.
pub const DEFAULT_ROUTER_IP: &str = "http://192.168.0.1";

/// Admin account the stock firmware ships with.
pub const DEFAULT_USERNAME: &str = "admin";

/// Admin password the stock firmware ships with.
pub const DEFAULT_PASSWORD: &str = "admin";

/// Connection settings for one router.
///
/// Built once and handed to [`RouterClient`](crate::RouterClient) by value;
/// nothing mutates it mid-run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterConfig {
    /// Authority part of the admin URL, port included when given.
    pub host: String,
    /// Base URL without a trailing slash, e.g. `http://192.168.0.1`.
    pub base_url: String,
    /// Admin account name.
    pub username: String,
    /// Admin password.
    pub password: String,
}

impl RouterConfig {
    /// Creates a config from a host string.
    ///
    /// A plain host (`192.168.0.1`, `router.lan:8080`) is reached over plain
    /// HTTP. Input already carrying an `http://` or `https://` scheme is
    /// used as the base URL verbatim.
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        let raw = host.into();
        let trimmed = raw.trim_end_matches('/');
        let (host, base_url) = match trimmed
            .strip_prefix("http://")
            .or_else(|| trimmed.strip_prefix("https://"))
        {
            Some(rest) => {
                let authority = rest.split('/').next().unwrap_or_default().to_string();
                (authority, trimmed.to_string())
            }
            None => (trimmed.to_string(), format!("http://{trimmed}")),
        };

        Self {
            host,
            base_url,
            username: username.into(),
            password: password.into(),
        }
    }

    /// Reads `IPTIME_ROUTER_IP`, `IPTIME_USERNAME` and `IPTIME_PASSWORD`,
    /// falling back to the stock-firmware defaults.
    pub fn from_env() -> Self {
        let host = env::var("IPTIME_ROUTER_IP").unwrap_or_else(|_| DEFAULT_ROUTER_IP.to_string());
        let username = env::var("IPTIME_USERNAME").unwrap_or_else(|_| DEFAULT_USERNAME.to_string());
        let password = env::var("IPTIME_PASSWORD").unwrap_or_else(|_| DEFAULT_PASSWORD.to_string());
        Self::new(host, username, password)
    }

    /// Host with any `:port` suffix stripped; the domain the manual session
    /// cookie is scoped to.
    pub fn host_without_port(&self) -> &str {
        self.host.split(':').next().unwrap_or_default()
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self::new(DEFAULT_ROUTER_IP, DEFAULT_USERNAME, DEFAULT_PASSWORD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_host_gets_http_base() {
        let config = RouterConfig::new("192.168.0.1", "admin", "pw");
        assert_eq!(config.host, "192.168.0.1");
        assert_eq!(config.base_url, "http://192.168.0.1");
    }

    #[test]
    fn scheme_prefixed_host_is_used_verbatim() {
        let config = RouterConfig::new("https://router.example.com:8443", "admin", "pw");
        assert_eq!(config.base_url, "https://router.example.com:8443");
        assert_eq!(config.host, "router.example.com:8443");
        assert_eq!(config.host_without_port(), "router.example.com");
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let config = RouterConfig::new("http://192.168.0.1/", "admin", "pw");
        assert_eq!(config.base_url, "http://192.168.0.1");
        assert_eq!(config.host, "192.168.0.1");
    }

    #[test]
    fn host_without_port_keeps_plain_hosts() {
        let config = RouterConfig::new("router.lan:8080", "admin", "pw");
        assert_eq!(config.host, "router.lan:8080");
        assert_eq!(config.host_without_port(), "router.lan");

        let config = RouterConfig::new("192.168.0.1", "admin", "pw");
        assert_eq!(config.host_without_port(), "192.168.0.1");
    }

    #[test]
    fn default_matches_stock_firmware() {
        let config = RouterConfig::default();
        assert_eq!(config.base_url, "http://192.168.0.1");
        assert_eq!(config.username, "admin");
        assert_eq!(config.password, "admin");
    }
}
