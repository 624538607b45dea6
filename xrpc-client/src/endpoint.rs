//! Server endpoint addressing.

use crate::error::ClientError;
use reqwest::Url;
use std::fmt;
use std::str::FromStr;

/// URL scheme of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn default_port(&self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }
}

/// An `http://` or `https://` URL without credentials or fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    url: Url,
    scheme: Scheme,
}

impl Endpoint {
    pub fn new(url: &str) -> Result<Self, ClientError> {
        let mut parsed = Url::parse(url).map_err(|e| ClientError::invalid_url(url, e.to_string()))?;
        let scheme = match parsed.scheme() {
            "http" => Scheme::Http,
            "https" => Scheme::Https,
            _ => {
                return Err(ClientError::invalid_url(
                    url,
                    "only http:// and https:// URLs are supported",
                ))
            }
        };
        if parsed.host_str().map_or(true, str::is_empty) {
            return Err(ClientError::invalid_url(url, "missing host"));
        }
        if !parsed.username().is_empty() || parsed.password().is_some() {
            return Err(ClientError::invalid_url(
                url,
                "credentials in the URL are not supported, use the client's login data",
            ));
        }
        parsed.set_fragment(None);
        Ok(Self {
            url: parsed,
            scheme,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn is_tls(&self) -> bool {
        self.scheme == Scheme::Https
    }

    /// Host name or IP address; IPv6 addresses keep their brackets.
    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }

    pub fn port(&self) -> u16 {
        self.url
            .port_or_known_default()
            .unwrap_or_else(|| self.scheme.default_port())
    }

    /// Path plus query, always starting with `/`.
    pub fn path(&self) -> String {
        match self.url.query() {
            Some(query) => format!("{}?{}", self.url.path(), query),
            None => self.url.path().to_string(),
        }
    }
}

impl FromStr for Endpoint {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Endpoint::new(s)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}
