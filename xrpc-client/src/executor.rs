//! Call execution.
//!
//! [`Executor::execute`] performs one complete XML-RPC exchange on the
//! calling thread. Both the blocking [`crate::Client::call`] and the worker
//! threads spawned by the [`crate::CallRegistry`] go through it.

use crate::auth::Authentication;
use crate::cancel::CancelToken;
use crate::config::ClientConfig;
use crate::cookie::CookieJar;
use crate::error::ClientError;
use crate::transport::Transport;
use std::io::{self, Read};
use std::sync::Arc;
use xrpc_protocol::{MethodCall, MethodResponse, TYPE_XML};

/// Shared state for executing calls against one endpoint.
pub struct Executor {
    config: Arc<ClientConfig>,
    transport: Arc<dyn Transport>,
    auth: Authentication,
    cookies: CookieJar,
}

impl Executor {
    pub fn new(config: Arc<ClientConfig>, transport: Arc<dyn Transport>) -> Self {
        let auth = Authentication::new(config.credentials.clone());
        let cookies = CookieJar::new(config.capabilities.cookies_enabled());
        Self {
            config,
            transport,
            auth,
            cookies,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn auth(&self) -> &Authentication {
        &self.auth
    }

    pub fn cookies(&self) -> &CookieJar {
        &self.cookies
    }

    /// Executes one call.
    ///
    /// A fault returned by the server is a successful outcome. Once `cancel`
    /// has been tripped the result is always [`ClientError::Canceled`].
    pub fn execute(
        &self,
        call: &MethodCall,
        cancel: Option<&CancelToken>,
    ) -> Result<MethodResponse, ClientError> {
        let result = self.exchange(call, cancel);
        match cancel {
            Some(token) => {
                token.detach();
                if token.is_canceled() {
                    tracing::debug!("Call {} canceled", call.method_name());
                    return Err(ClientError::Canceled);
                }
                result
            }
            None => result,
        }
    }

    fn exchange(
        &self,
        call: &MethodCall,
        cancel: Option<&CancelToken>,
    ) -> Result<MethodResponse, ClientError> {
        let caps = self.config.capabilities;
        let body = call.to_xml(caps)?;

        if cancel.is_some_and(|t| t.is_canceled()) {
            return Err(ClientError::Canceled);
        }

        let endpoint = &self.config.endpoint;
        tracing::debug!("Calling {} on {}", call.method_name(), endpoint);
        let mut conn = self.transport.open(endpoint)?;
        if let Some(token) = cancel {
            if !token.attach(conn.abort_handle()) {
                return Err(ClientError::Canceled);
            }
        }

        conn.set_header("Content-Type", TYPE_XML)?;
        conn.set_header("User-Agent", &self.config.user_agent)?;
        for (name, value) in &self.config.headers {
            conn.set_header(name, value)?;
        }
        self.auth.apply(conn.as_mut())?;
        self.cookies.apply(conn.as_mut(), endpoint.url())?;

        let head = conn.send(body.as_bytes())?;

        if head.status != 200 && !caps.ignores_status_code() {
            return Err(ClientError::HttpStatus {
                status: head.status,
            });
        }
        if caps.is_strict() {
            let content_type = head.content_type();
            if !content_type.is_some_and(|ct| ct.trim_start().starts_with(TYPE_XML)) {
                return Err(ClientError::ContentType(content_type.map(str::to_string)));
            }
        }

        let limit = self.config.max_response_size;
        let mut response = Vec::new();
        conn.into_body()
            .take((limit as u64).saturating_add(1))
            .read_to_end(&mut response)?;
        if response.len() > limit {
            return Err(ClientError::Transport(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("response body exceeds {} bytes", limit),
            )));
        }
        tracing::debug!(
            "Received {} bytes for {}",
            response.len(),
            call.method_name()
        );

        self.cookies.capture(&head, endpoint.url());

        Ok(MethodResponse::parse(&response, caps)?)
    }
}
