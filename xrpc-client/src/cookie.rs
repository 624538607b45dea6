//! Session cookies.

use crate::transport::{Connection, ResponseHead};
use parking_lot::RwLock;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::HeaderValue;
use reqwest::Url;
use std::io;

/// Cookie store for one client. Does nothing unless enabled.
///
/// Storage, expiry and domain/path matching follow RFC 6265 through
/// reqwest's cookie jar.
#[derive(Debug, Default)]
pub struct CookieJar {
    enabled: bool,
    store: RwLock<Jar>,
}

impl CookieJar {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            store: RwLock::new(Jar::default()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// `Cookie` header value for a request to `url`, or `None` when there is
    /// nothing to send.
    pub fn header_value(&self, url: &Url) -> Option<String> {
        if !self.enabled {
            return None;
        }
        let value = self.store.read().cookies(url)?;
        value.to_str().ok().map(str::to_string)
    }

    /// Value of the cookie `name` that would be sent to `url`.
    pub fn get(&self, url: &Url, name: &str) -> Option<String> {
        self.header_value(url)?.split("; ").find_map(|pair| {
            let (n, v) = pair.split_once('=')?;
            (n == name).then(|| v.to_string())
        })
    }

    pub fn apply(&self, conn: &mut dyn Connection, url: &Url) -> io::Result<()> {
        match self.header_value(url) {
            Some(value) => conn.set_header("Cookie", &value),
            None => Ok(()),
        }
    }

    /// Merges the response's `Set-Cookie` headers into the jar.
    pub fn capture(&self, head: &ResponseHead, url: &Url) {
        if !self.enabled {
            return;
        }
        let values: Vec<HeaderValue> = head
            .header_values("set-cookie")
            .filter_map(|raw| match HeaderValue::from_str(raw) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!("Ignoring malformed Set-Cookie header {:?}", raw);
                    None
                }
            })
            .collect();
        if !values.is_empty() {
            self.store.read().set_cookies(&mut values.iter(), url);
        }
    }

    pub fn clear(&self) {
        *self.store.write() = Jar::default();
    }
}
