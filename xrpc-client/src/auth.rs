//! HTTP basic authentication.

use crate::config::Credentials;
use crate::transport::Connection;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use parking_lot::RwLock;
use std::io;

/// Credentials applied to every request, changeable at runtime.
#[derive(Debug, Default)]
pub struct Authentication {
    credentials: RwLock<Option<Credentials>>,
}

impl Authentication {
    pub fn new(credentials: Option<Credentials>) -> Self {
        Self {
            credentials: RwLock::new(credentials),
        }
    }

    pub fn set_credentials(&self, username: impl Into<String>, password: impl Into<String>) {
        *self.credentials.write() = Some(Credentials {
            username: username.into(),
            password: password.into(),
        });
    }

    pub fn clear(&self) {
        *self.credentials.write() = None;
    }

    pub fn is_set(&self) -> bool {
        self.credentials.read().is_some()
    }

    /// `Authorization` header value for the current credentials.
    pub fn header_value(&self) -> Option<String> {
        self.credentials.read().as_ref().map(|c| {
            let token = STANDARD.encode(format!("{}:{}", c.username, c.password));
            format!("Basic {}", token)
        })
    }

    pub fn apply(&self, conn: &mut dyn Connection) -> io::Result<()> {
        match self.header_value() {
            Some(value) => conn.set_header("Authorization", &value),
            None => Ok(()),
        }
    }
}
