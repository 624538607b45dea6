//! xrpc - Command-line XML-RPC client
//!
//! Calls a remote method, or renders the request document it would send.

mod commands;
mod json;

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use xrpc_client::{Capabilities, ClientError};

#[derive(Parser)]
#[command(name = "xrpc")]
#[command(about = "Command-line XML-RPC client")]
#[command(version)]
struct Cli {
    // ===== Protocol Options =====
    /// Validate method names and require text/xml responses
    #[arg(long, global = true)]
    strict: bool,

    /// Allow 64-bit integers (<i8>)
    #[arg(long = "i8", global = true)]
    i8: bool,

    /// Allow nil values (<nil/>)
    #[arg(long, global = true)]
    nil: bool,

    /// Keep session cookies between requests
    #[arg(long, global = true)]
    cookies: bool,

    /// Parse the response body regardless of the HTTP status
    #[arg(long, global = true)]
    ignore_status: bool,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn capabilities(&self) -> Capabilities {
        let mut caps = Capabilities::new();
        if self.strict {
            caps = caps.with_strict();
        }
        if self.i8 {
            caps = caps.with_i8();
        }
        if self.nil {
            caps = caps.with_nil();
        }
        if self.cookies {
            caps = caps.with_cookies();
        }
        if self.ignore_status {
            caps = caps.with_ignore_status_code();
        }
        caps
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Call a remote method and print the result as JSON
    Call {
        /// Server URL (http:// or https://)
        url: String,

        /// Method name
        method: String,

        /// Parameters as JSON (or @file.json); other text is sent as a string
        params: Vec<String>,

        #[command(flatten)]
        conn: ConnectionArgs,
    },

    /// Print the request document without sending it
    Render {
        /// Method name
        method: String,

        /// Parameters as JSON (or @file.json); other text is sent as a string
        params: Vec<String>,
    },
}

#[derive(Args)]
struct ConnectionArgs {
    /// Basic authentication user
    #[arg(short, long, env = "XRPC_USER")]
    user: Option<String>,

    /// Basic authentication password
    #[arg(short, long, env = "XRPC_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Extra request header (NAME:VALUE), repeatable
    #[arg(short = 'H', long)]
    header: Vec<String>,

    /// User-Agent header
    #[arg(long)]
    user_agent: Option<String>,

    /// Read timeout in seconds
    #[arg(long, default_value = "30")]
    timeout: u64,

    /// Connect timeout in seconds
    #[arg(long, default_value = "10")]
    connect_timeout: u64,

    // ===== TLS Options =====
    /// Path to CA certificate for server verification
    #[arg(long, env = "XRPC_CA_CERT")]
    ca_cert: Option<PathBuf>,

    /// Path to client certificate (for mTLS)
    #[arg(long, env = "XRPC_CLIENT_CERT")]
    client_cert: Option<PathBuf>,

    /// Path to client private key (for mTLS)
    #[arg(long, env = "XRPC_CLIENT_KEY")]
    client_key: Option<PathBuf>,

    /// Skip server certificate verification (INSECURE)
    #[arg(long, short = 'k')]
    insecure: bool,

    /// Name the server certificate must match (defaults to the URL host)
    #[arg(long)]
    server_name: Option<String>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let caps = cli.capabilities();

    let result = match &cli.command {
        Commands::Call {
            url,
            method,
            params,
            conn,
        } => commands::call(url, method, params, caps, conn),
        Commands::Render { method, params } => commands::render(method, params, caps),
    };

    match result {
        Ok(output) => println!("{}", output),
        Err(e) => {
            match e.downcast_ref::<ClientError>() {
                Some(ClientError::Fault(fault)) => {
                    eprintln!("{} {}", "Fault".red().bold(), fault);
                }
                _ => eprintln!("{}: {}", "Error".red(), e),
            }
            std::process::exit(1);
        }
    }

    Ok(())
}
