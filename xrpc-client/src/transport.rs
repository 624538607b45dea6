//! Transport abstraction consumed by the call executor.
//!
//! A [`Transport`] opens one [`Connection`] per call. The executor sets
//! request headers, sends the body, inspects the response head and reads
//! the body. Any connection can be aborted from another thread through its
//! [`AbortHandle`], which makes pending I/O on it fail promptly.
//!
//! `open` does no network I/O. Name resolution, connect and the TLS
//! handshake happen inside [`Connection::send`], after the executor has
//! attached the abort handle to the call's cancel token.

use crate::endpoint::Endpoint;
use std::io::{self, Read};
use std::sync::Arc;

/// Opens connections to an endpoint.
pub trait Transport: Send + Sync {
    fn open(&self, endpoint: &Endpoint) -> io::Result<Box<dyn Connection>>;
}

/// One request/response exchange.
pub trait Connection: Send {
    /// Sets a request header, replacing any earlier value with the same name.
    ///
    /// Fails with `InvalidInput` for names or values HTTP cannot carry.
    fn set_header(&mut self, name: &str, value: &str) -> io::Result<()>;

    /// Returns a handle that can abort this connection from another thread.
    fn abort_handle(&self) -> AbortHandle;

    /// Connects, writes the request and reads the response status and headers.
    fn send(&mut self, body: &[u8]) -> io::Result<ResponseHead>;

    /// Returns the response body stream. Only valid after [`Connection::send`].
    fn into_body(self: Box<Self>) -> Box<dyn Read + Send>;
}

/// Aborts an open connection.
///
/// Must be idempotent and safe to call while another thread is blocked in
/// I/O on the connection.
pub trait Abort: Send + Sync {
    fn abort(&self);
}

pub type AbortHandle = Arc<dyn Abort>;

/// Status and headers of an HTTP response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: u16,
    headers: Vec<(String, String)>,
}

impl ResponseHead {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.push_header(name, value);
        self
    }

    pub fn push_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push((name.into(), value.into()));
    }

    /// First value of a header, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All values of a header, in arrival order.
    pub fn header_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }
}
