//! Command execution.

use crate::json::{format_json, from_value, parse_param};
use crate::ConnectionArgs;
use colored::Colorize;
use std::error::Error;
use std::time::Duration;
use xrpc_client::{Capabilities, Client, ClientConfig, TlsClientConfig};
use xrpc_protocol::{MethodCall, Value};

/// Calls `method` on `url` and returns the formatted result.
pub fn call(
    url: &str,
    method: &str,
    params: &[String],
    caps: Capabilities,
    conn: &ConnectionArgs,
) -> Result<String, Box<dyn Error>> {
    let config = client_config(url, caps, conn)?;
    let params = parse_params(params)?;

    tracing::debug!("Calling {} with {} params", method, params.len());
    let client = Client::new(config)?;
    let result = client.call(method, &params)?;
    Ok(format_json(&from_value(&result)))
}

/// Renders the request document without sending it.
pub fn render(
    method: &str,
    params: &[String],
    caps: Capabilities,
) -> Result<String, Box<dyn Error>> {
    let call = MethodCall::new(method, parse_params(params)?);
    Ok(call.to_xml(caps)?)
}

fn parse_params(params: &[String]) -> Result<Vec<Value>, Box<dyn Error>> {
    params
        .iter()
        .enumerate()
        .map(|(i, arg)| {
            parse_param(arg)
                .map_err(|e| -> Box<dyn Error> { format!("parameter {}: {}", i + 1, e).into() })
        })
        .collect()
}

/// Builds the client configuration from command-line options.
pub fn client_config(
    url: &str,
    caps: Capabilities,
    conn: &ConnectionArgs,
) -> Result<ClientConfig, Box<dyn Error>> {
    let mut config = ClientConfig::new(url)?
        .with_capabilities(caps)
        .with_connect_timeout(Duration::from_secs(conn.connect_timeout))
        .with_read_timeout(Duration::from_secs(conn.timeout));

    if let Some(ref agent) = conn.user_agent {
        config = config.with_user_agent(agent);
    }
    for header in &conn.header {
        let (name, value) = header
            .split_once(':')
            .ok_or_else(|| format!("invalid header {:?}, expected NAME:VALUE", header))?;
        config = config.with_header(name.trim(), value.trim())?;
    }
    if let Some(ref user) = conn.user {
        config = config.with_credentials(user, conn.password.clone().unwrap_or_default());
    }

    if conn.ca_cert.is_some() || conn.client_cert.is_some() || conn.client_key.is_some() || conn.insecure {
        let mut tls = TlsClientConfig::new();
        tls.ca_cert_path = conn.ca_cert.clone();
        match (&conn.client_cert, &conn.client_key) {
            (Some(cert), Some(key)) => tls = tls.with_client_cert(cert, key),
            (None, None) => {}
            _ => return Err("--client-cert and --client-key must be used together".into()),
        }
        tls.insecure = conn.insecure;
        if !config.endpoint.is_tls() {
            eprintln!(
                "{}: TLS options are ignored for {}",
                "Warning".yellow(),
                config.endpoint
            );
        }
        config = config.with_tls(tls);
    }
    if let Some(ref name) = conn.server_name {
        config.tls.server_name = Some(name.clone());
    }

    Ok(config)
}
