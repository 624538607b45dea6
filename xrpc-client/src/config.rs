//! Client configuration.

use crate::endpoint::Endpoint;
use crate::error::ClientError;
use reqwest::header::{HeaderName, HeaderValue};
use std::path::PathBuf;
use std::time::Duration;
use xrpc_protocol::Capabilities;

/// Default `User-Agent` header.
pub const DEFAULT_USER_AGENT: &str = concat!("xrpc/", env!("CARGO_PKG_VERSION"));

/// Default cap on the size of a response body.
pub const DEFAULT_MAX_RESPONSE_SIZE: usize = 16 * 1024 * 1024;

/// Headers the client or the HTTP layer sets itself.
const RESERVED_HEADERS: &[&str] = &[
    "host",
    "content-type",
    "content-length",
    "transfer-encoding",
    "connection",
];

/// TLS configuration for `https://` endpoints.
#[derive(Debug, Clone, Default)]
pub struct TlsClientConfig {
    /// Path to PEM-encoded CA certificate(s) for server verification.
    /// If None, the bundled web PKI roots are used.
    pub ca_cert_path: Option<PathBuf>,
    /// Path to PEM-encoded client certificate (for mTLS).
    pub client_cert_path: Option<PathBuf>,
    /// Path to PEM-encoded client private key (for mTLS).
    pub client_key_path: Option<PathBuf>,
    /// Skip server certificate verification (INSECURE - development only).
    pub insecure: bool,
    /// Name the server certificate must match (defaults to the endpoint host).
    pub server_name: Option<String>,
}

impl TlsClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ca_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_cert_path = Some(path.into());
        self
    }

    pub fn with_client_cert(
        mut self,
        cert_path: impl Into<PathBuf>,
        key_path: impl Into<PathBuf>,
    ) -> Self {
        self.client_cert_path = Some(cert_path.into());
        self.client_key_path = Some(key_path.into());
        self
    }

    pub fn with_insecure(mut self) -> Self {
        self.insecure = true;
        self
    }

    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = Some(name.into());
        self
    }
}

/// Basic authentication credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Client configuration. Read-only once the client is built.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server endpoint.
    pub endpoint: Endpoint,
    /// Optional protocol behaviors.
    pub capabilities: Capabilities,
    /// `User-Agent` header value.
    pub user_agent: String,
    /// Extra request headers, in insertion order.
    pub headers: Vec<(String, String)>,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Socket read timeout.
    pub read_timeout: Duration,
    /// Largest response body accepted, in bytes.
    pub max_response_size: usize,
    /// TLS settings for `https://` endpoints.
    pub tls: TlsClientConfig,
    /// Initial basic authentication credentials.
    pub credentials: Option<Credentials>,
}

impl ClientConfig {
    pub fn new(url: &str) -> Result<Self, ClientError> {
        Ok(Self::from_endpoint(Endpoint::new(url)?))
    }

    pub fn from_endpoint(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            capabilities: Capabilities::new(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            headers: Vec::new(),
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
            max_response_size: DEFAULT_MAX_RESPONSE_SIZE,
            tls: TlsClientConfig::default(),
            credentials: None,
        }
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Adds a custom header, replacing any earlier value for the same name.
    ///
    /// The name must be an HTTP token and the value must not contain control
    /// characters. `Host`, `Content-Type`, `Content-Length`,
    /// `Transfer-Encoding` and `Connection` cannot be set.
    pub fn with_header(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<Self, ClientError> {
        let name = name.into();
        let value = value.into();
        let header = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| ClientError::InvalidHeader(format!("invalid header name {:?}", name)))?;
        HeaderValue::from_str(&value)
            .map_err(|_| ClientError::InvalidHeader(format!("invalid value for header {}", name)))?;

        if RESERVED_HEADERS.contains(&header.as_str()) {
            return Err(ClientError::ReservedHeader(name));
        }
        if header == reqwest::header::USER_AGENT {
            self.user_agent = value;
            return Ok(self);
        }
        match self
            .headers
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(&name))
        {
            Some(slot) => slot.1 = value,
            None => self.headers.push((name, value)),
        }
        Ok(self)
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_max_response_size(mut self, bytes: usize) -> Self {
        self.max_response_size = bytes;
        self
    }

    pub fn with_tls(mut self, tls: TlsClientConfig) -> Self {
        self.tls = tls;
        self
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials = Some(Credentials {
            username: username.into(),
            password: password.into(),
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ClientConfig::new("http://localhost:8080/RPC2").unwrap();
        assert_eq!(config.endpoint.port(), 8080);
        assert_eq!(config.capabilities, Capabilities::new());
        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
        assert!(config.user_agent.starts_with("xrpc/"));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.read_timeout, Duration::from_secs(30));
        assert_eq!(config.max_response_size, DEFAULT_MAX_RESPONSE_SIZE);
        assert!(config.headers.is_empty());
        assert!(config.credentials.is_none());
    }

    #[test]
    fn test_invalid_url() {
        assert!(matches!(
            ClientConfig::new("gopher://x"),
            Err(ClientError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_reserved_headers() {
        for name in [
            "Host",
            "content-type",
            "Content-Length",
            "Transfer-Encoding",
            "connection",
        ] {
            let result = ClientConfig::new("http://h/").unwrap().with_header(name, "x");
            assert!(matches!(result, Err(ClientError::ReservedHeader(_))), "{}", name);
        }
    }

    #[test]
    fn test_header_names_must_be_tokens() {
        for name in ["X-A\r\nX-Injected", "X A", "", "X:A", "X-\u{e9}"] {
            let result = ClientConfig::new("http://h/").unwrap().with_header(name, "1");
            assert!(matches!(result, Err(ClientError::InvalidHeader(_))), "{:?}", name);
        }
    }

    #[test]
    fn test_header_values_reject_line_breaks() {
        for value in ["a\r\nX-Injected: 1", "a\nb", "a\0b"] {
            let result = ClientConfig::new("http://h/").unwrap().with_header("X-A", value);
            assert!(matches!(result, Err(ClientError::InvalidHeader(_))), "{:?}", value);
        }
        let config = ClientConfig::new("http://h/")
            .unwrap()
            .with_header("X-A", "tab\tand spaces")
            .unwrap();
        assert_eq!(config.headers.len(), 1);
    }

    #[test]
    fn test_custom_header_replaces() {
        let config = ClientConfig::new("http://h/")
            .unwrap()
            .with_header("X-Token", "a")
            .unwrap()
            .with_header("x-token", "b")
            .unwrap();
        assert_eq!(config.headers, vec![("X-Token".to_string(), "b".to_string())]);
    }

    #[test]
    fn test_user_agent_header_sets_user_agent() {
        let config = ClientConfig::new("http://h/")
            .unwrap()
            .with_header("User-Agent", "custom/1.0")
            .unwrap();
        assert_eq!(config.user_agent, "custom/1.0");
        assert!(config.headers.is_empty());
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let config = ClientConfig::new("http://h/")
            .unwrap()
            .with_credentials("alice", "s3cret");
        let debug = format!("{:?}", config.credentials.unwrap());
        assert!(debug.contains("alice"));
        assert!(!debug.contains("s3cret"));
    }

    #[test]
    fn test_tls_builder() {
        let tls = TlsClientConfig::new()
            .with_ca_cert("/tmp/ca.pem")
            .with_client_cert("/tmp/c.pem", "/tmp/k.pem")
            .with_server_name("rpc.internal");
        assert_eq!(tls.ca_cert_path, Some(PathBuf::from("/tmp/ca.pem")));
        assert!(tls.client_key_path.is_some());
        assert!(!tls.insecure);
        assert!(TlsClientConfig::new().with_insecure().insecure);
    }
}
