use std::time::Duration;

/// Default User-Agent string for HTTP requests
pub const DEFAULT_USER_AGENT: &str = concat!("courier-http/", env!("CARGO_PKG_VERSION"));

/// Default redirect ceiling when none is configured.
pub const DEFAULT_MAX_REDIRECTS: usize = 10;

/// TLS root certificate configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum TlsRootConfig {
    /// Use Mozilla's root certificates (webpki-roots, no OS dependency)
    #[default]
    WebPki,
    /// Use OS native root certificate store
    Native,
}

/// Transport security configuration
///
/// Controls whether the client enforces TLS or allows insecure HTTP.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportSecurity {
    /// Require TLS for all connections (HTTPS only) - default and recommended
    #[default]
    TlsOnly,
    /// Allow insecure HTTP connections (for testing with mock servers only)
    ///
    /// **WARNING**: This should only be used for local testing with mock servers.
    /// Never use in production as it exposes traffic to interception.
    AllowInsecureHttp,
}

/// Where the client's proxy comes from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProxySetting {
    /// Never proxy, even when proxy environment variables are set.
    None,
    /// Use `HTTP_PROXY`/`HTTPS_PROXY` from the environment (default).
    #[default]
    FromEnv,
    /// Route everything through this proxy URL.
    Explicit(String),
}

/// Configuration for redirect behavior.
///
/// Redirects are followed up to `max_redirects` hops; the hop that would
/// exceed the ceiling is returned inside the error so callers can still
/// inspect it.
#[derive(Debug, Clone)]
pub struct RedirectConfig {
    /// Maximum number of redirects to follow (default: 10)
    ///
    /// Set to `0` to disable redirect following entirely.
    pub max_redirects: usize,

    /// Carry the original request's headers onto redirect hops (default: false)
    ///
    /// When `false`, each redirect hop is issued with a fresh header set
    /// containing only the client's User-Agent. When `true`, the first
    /// request's headers are replayed on every hop, including any
    /// Authorization header. Only enable this when every possible redirect
    /// target is trusted.
    pub forward_headers: bool,
}

impl Default for RedirectConfig {
    fn default() -> Self {
        Self {
            max_redirects: DEFAULT_MAX_REDIRECTS,
            forward_headers: false,
        }
    }
}

impl RedirectConfig {
    /// Create a configuration that disables redirect following
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            max_redirects: 0,
            ..Default::default()
        }
    }
}

/// Overall HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Default per-request timeout (default: None, wait indefinitely)
    ///
    /// Covers the whole exchange including every redirect hop. A request can
    /// override this with its own timeout.
    pub request_timeout: Option<Duration>,

    /// Maximum response body size in bytes (default: 10 MB)
    ///
    /// Applied by the buffering body readers; streaming via `into_body()`
    /// is not limited.
    pub max_body_size: usize,

    /// User-Agent header value sent when the request doesn't set its own
    pub user_agent: String,

    /// Transport security mode (default: `TlsOnly`)
    ///
    /// Use `AllowInsecureHttp` only for testing with local mock servers.
    pub transport: TransportSecurity,

    /// TLS root certificate strategy (default: `WebPki`)
    pub tls_roots: TlsRootConfig,

    /// Skip server certificate verification (default: false)
    ///
    /// **WARNING**: Disables the protection TLS provides against
    /// man-in-the-middle attacks. Only for test endpoints with self-signed
    /// certificates.
    pub insecure_tls: bool,

    /// Proxy selection (default: from environment)
    pub proxy: ProxySetting,

    /// Redirect policy configuration
    pub redirect: RedirectConfig,

    /// Timeout for idle connections in the pool (default: 90 seconds)
    ///
    /// Set to `None` to use hyper-util's default idle timeout.
    pub pool_idle_timeout: Option<Duration>,

    /// Maximum number of idle connections per host (default: 32)
    ///
    /// Setting this to `0` disables connection reuse entirely.
    pub pool_max_idle_per_host: usize,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: None,
            max_body_size: 10 * 1024 * 1024, // 10 MB
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            transport: TransportSecurity::TlsOnly,
            tls_roots: TlsRootConfig::default(),
            insecure_tls: false,
            proxy: ProxySetting::FromEnv,
            redirect: RedirectConfig::default(),
            pool_idle_timeout: Some(Duration::from_secs(90)),
            pool_max_idle_per_host: 32,
        }
    }
}

impl HttpClientConfig {
    /// Create configuration for testing with mock servers (allows insecure HTTP)
    ///
    /// Ignores proxy environment variables so tests behave the same on
    /// developer machines behind corporate proxies.
    ///
    /// **WARNING**: This configuration allows plain HTTP connections.
    /// Use only for local testing with mock servers, never in production.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            request_timeout: Some(Duration::from_secs(10)),
            max_body_size: 1024 * 1024, // 1 MB
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            transport: TransportSecurity::AllowInsecureHttp,
            tls_roots: TlsRootConfig::default(),
            insecure_tls: false,
            proxy: ProxySetting::None,
            redirect: RedirectConfig::default(),
            pool_idle_timeout: Some(Duration::from_secs(10)),
            pool_max_idle_per_host: 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_client_config_defaults() {
        let config = HttpClientConfig::default();
        assert!(config.request_timeout.is_none());
        assert_eq!(config.max_body_size, 10 * 1024 * 1024);
        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
        assert_eq!(config.transport, TransportSecurity::TlsOnly);
        assert_eq!(config.proxy, ProxySetting::FromEnv);
        assert!(!config.insecure_tls);
        assert_eq!(config.redirect.max_redirects, DEFAULT_MAX_REDIRECTS);
        assert!(!config.redirect.forward_headers);
    }

    #[test]
    fn test_http_client_config_for_testing() {
        let config = HttpClientConfig::for_testing();
        assert_eq!(config.transport, TransportSecurity::AllowInsecureHttp);
        assert_eq!(config.proxy, ProxySetting::None);
    }

    #[test]
    fn test_redirect_config_disabled() {
        let config = RedirectConfig::disabled();
        assert_eq!(config.max_redirects, 0);
    }
}
