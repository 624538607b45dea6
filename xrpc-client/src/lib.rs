//! # xrpc-client
//!
//! XML-RPC client library.
//!
//! This crate provides:
//! - Blocking calls over HTTP/1.1, plain or TLS, through `reqwest`
//! - Asynchronous calls on worker threads with cancellation by id
//! - Basic authentication, session cookies and custom headers
//! - A [`Transport`] trait for plugging in other transports

pub mod auth;
pub mod cancel;
pub mod client;
pub mod config;
pub mod cookie;
pub mod endpoint;
pub mod error;
pub mod executor;
pub mod http;
pub mod registry;
pub mod tls;
pub mod transport;

pub use cancel::CancelToken;
pub use client::Client;
pub use config::{
    ClientConfig, Credentials, TlsClientConfig, DEFAULT_MAX_RESPONSE_SIZE, DEFAULT_USER_AGENT,
};
pub use endpoint::{Endpoint, Scheme};
pub use error::ClientError;
pub use executor::Executor;
pub use http::HttpTransport;
pub use registry::{CallListener, CallRegistry};
pub use transport::{Abort, AbortHandle, Connection, ResponseHead, Transport};

pub use xrpc_protocol::{Capabilities, Fault, MethodCall, MethodResponse, Struct, Value};
