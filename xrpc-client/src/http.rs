//! HTTP(S) transport built on `reqwest`.
//!
//! Requests run on a small tokio runtime owned by the transport; callers
//! block on them from their own thread. Each step of an exchange (connect,
//! TLS handshake, request write, every body chunk) races the connection's
//! abort signal, so an abort fails whatever step is in progress at once.

use crate::config::{ClientConfig, TlsClientConfig};
use crate::endpoint::Endpoint;
use crate::error::ClientError;
use crate::tls::create_tls_config;
use crate::transport::{Abort, AbortHandle, Connection, ResponseHead, Transport};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{redirect, Url};
use std::future::Future;
use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Runtime;
use tokio::sync::Notify;

/// Opens HTTP(S) connections with the client's timeouts and TLS settings.
pub struct HttpTransport {
    client: reqwest::Client,
    runtime: Arc<Runtime>,
}

impl HttpTransport {
    /// Builds a transport. Custom TLS settings only apply to `https://`
    /// endpoints.
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let tls = if config.endpoint.is_tls() {
            create_tls_config(&config.tls)?
        } else {
            create_tls_config(&TlsClientConfig::default())?
        };

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("xrpc-io")
            .enable_all()
            .build()?;

        let client = {
            let _guard = runtime.enter();
            reqwest::Client::builder()
                .use_preconfigured_tls(tls)
                .connect_timeout(config.connect_timeout)
                .read_timeout(config.read_timeout)
                .pool_max_idle_per_host(0)
                .redirect(redirect::Policy::none())
                .no_proxy()
                .build()
                .map_err(|e| ClientError::Transport(io::Error::other(e)))?
        };

        Ok(Self {
            client,
            runtime: Arc::new(runtime),
        })
    }
}

impl Transport for HttpTransport {
    fn open(&self, endpoint: &Endpoint) -> io::Result<Box<dyn Connection>> {
        Ok(Box::new(HttpConnection {
            client: self.client.clone(),
            runtime: self.runtime.clone(),
            url: endpoint.url().clone(),
            headers: HeaderMap::new(),
            abort: Arc::new(RequestAbort::default()),
            response: None,
        }))
    }
}

/// Abort signal shared by a connection and its body reader.
#[derive(Default)]
struct RequestAbort {
    aborted: AtomicBool,
    notify: Notify,
}

impl RequestAbort {
    fn check(&self) -> io::Result<()> {
        if self.aborted.load(Ordering::Acquire) {
            return Err(aborted());
        }
        Ok(())
    }

    /// Drives `fut` to completion unless the connection is aborted first.
    fn run<F: Future>(&self, runtime: &Runtime, fut: F) -> io::Result<F::Output> {
        self.check()?;
        runtime.block_on(async {
            tokio::select! {
                biased;
                _ = self.notify.notified() => Err(aborted()),
                out = fut => Ok(out),
            }
        })
    }
}

impl Abort for RequestAbort {
    fn abort(&self) {
        if !self.aborted.swap(true, Ordering::AcqRel) {
            // Stores a permit when nothing is waiting yet.
            self.notify.notify_one();
        }
    }
}

fn aborted() -> io::Error {
    io::Error::new(io::ErrorKind::ConnectionAborted, "connection aborted")
}

/// Converts a reqwest failure, keeping the kind of the underlying I/O error.
fn io_error(e: reqwest::Error) -> io::Error {
    let kind = if e.is_timeout() {
        io::ErrorKind::TimedOut
    } else {
        source_kind(&e).unwrap_or(io::ErrorKind::Other)
    };
    io::Error::new(kind, e)
}

fn source_kind(e: &(dyn std::error::Error + 'static)) -> Option<io::ErrorKind> {
    let mut source = e.source();
    while let Some(err) = source {
        if let Some(io) = err.downcast_ref::<io::Error>() {
            return Some(io.kind());
        }
        source = err.source();
    }
    None
}

fn invalid_input(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, msg)
}

struct HttpConnection {
    client: reqwest::Client,
    runtime: Arc<Runtime>,
    url: Url,
    headers: HeaderMap,
    abort: Arc<RequestAbort>,
    response: Option<reqwest::Response>,
}

impl Connection for HttpConnection {
    fn set_header(&mut self, name: &str, value: &str) -> io::Result<()> {
        let header = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| invalid_input(format!("invalid header name {:?}", name)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| invalid_input(format!("invalid value for header {}", name)))?;
        self.headers.insert(header, value);
        Ok(())
    }

    fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    fn send(&mut self, body: &[u8]) -> io::Result<ResponseHead> {
        tracing::debug!("POST {} ({} bytes)", self.url, body.len());
        let request = self
            .client
            .post(self.url.clone())
            .headers(std::mem::take(&mut self.headers))
            .body(body.to_vec())
            .send();
        let response = self.abort.run(&self.runtime, request)?.map_err(io_error)?;

        let mut head = ResponseHead::new(response.status().as_u16());
        for (name, value) in response.headers() {
            head.push_header(
                name.as_str(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            );
        }
        tracing::debug!("Response {} from {}", head.status, self.url);
        self.response = Some(response);
        Ok(head)
    }

    fn into_body(self: Box<Self>) -> Box<dyn Read + Send> {
        Box::new(ResponseBody {
            response: self.response,
            runtime: self.runtime,
            abort: self.abort,
            chunk: Vec::new(),
            pos: 0,
        })
    }
}

/// Blocking reader over the chunks of a response body.
struct ResponseBody {
    response: Option<reqwest::Response>,
    runtime: Arc<Runtime>,
    abort: Arc<RequestAbort>,
    chunk: Vec<u8>,
    pos: usize,
}

impl Read for ResponseBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.pos == self.chunk.len() {
            let Some(response) = self.response.as_mut() else {
                return Ok(0);
            };
            match self.abort.run(&self.runtime, response.chunk())?.map_err(io_error)? {
                Some(chunk) => {
                    self.chunk = chunk.to_vec();
                    self.pos = 0;
                }
                None => {
                    self.response = None;
                    return Ok(0);
                }
            }
        }

        let n = buf.len().min(self.chunk.len() - self.pos);
        buf[..n].copy_from_slice(&self.chunk[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}
