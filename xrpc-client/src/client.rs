//! High-level client API.

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::executor::Executor;
use crate::http::HttpTransport;
use crate::registry::{CallListener, CallRegistry};
use crate::transport::Transport;
use std::sync::Arc;
use xrpc_protocol::{Capabilities, MethodCall, MethodResponse, Value};

/// XML-RPC client bound to one endpoint.
pub struct Client {
    executor: Arc<Executor>,
    registry: CallRegistry,
}

impl Client {
    /// Creates a client using the HTTP(S) transport.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let transport = HttpTransport::new(&config)?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Creates a client using a custom transport.
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        let executor = Arc::new(Executor::new(Arc::new(config), transport));
        Self {
            registry: CallRegistry::new(executor.clone()),
            executor,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        self.executor.config()
    }

    pub fn capabilities(&self) -> Capabilities {
        self.executor.config().capabilities
    }

    // =========================================================================
    // Calls
    // =========================================================================

    /// Calls `method` and blocks until the result arrives.
    ///
    /// A fault reported by the server is returned as [`ClientError::Fault`].
    pub fn call(&self, method: &str, params: &[Value]) -> Result<Value, ClientError> {
        let call = MethodCall::new(method, params.to_vec());
        match self.executor.execute(&call, None)? {
            MethodResponse::Success(value) => Ok(value),
            MethodResponse::Fault(fault) => Err(ClientError::Fault(fault)),
        }
    }

    /// Calls `method` and returns the raw response, leaving faults in place.
    pub fn call_raw(&self, method: &str, params: &[Value]) -> Result<MethodResponse, ClientError> {
        let call = MethodCall::new(method, params.to_vec());
        self.executor.execute(&call, None)
    }

    /// Starts an asynchronous call and returns its id.
    ///
    /// The outcome is delivered to `listener` on the call's own thread.
    pub fn call_async(
        &self,
        listener: Arc<dyn CallListener>,
        method: &str,
        params: Vec<Value>,
    ) -> i64 {
        self.registry
            .dispatch(listener, MethodCall::new(method, params))
    }

    /// Cancels an asynchronous call and waits for it to stop.
    ///
    /// Unknown or completed ids are ignored. Returns whether a call was found.
    pub fn cancel(&self, id: i64) -> bool {
        self.registry.cancel(id)
    }

    /// Number of asynchronous calls still running.
    pub fn in_flight(&self) -> usize {
        self.registry.len()
    }

    // =========================================================================
    // Session state
    // =========================================================================

    /// Sets basic authentication credentials for subsequent calls.
    pub fn set_credentials(&self, username: impl Into<String>, password: impl Into<String>) {
        self.executor.auth().set_credentials(username, password);
    }

    pub fn clear_credentials(&self) {
        self.executor.auth().clear();
    }

    /// Drops all session cookies.
    pub fn clear_cookies(&self) {
        self.executor.cookies().clear();
    }
}
