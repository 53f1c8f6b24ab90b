//! Startup configuration for the proxy.
//!
//! The configuration is assembled once, at process start, from command-line
//! flags via [`clap`]. It is handed by reference into the supervisor and
//! never mutated afterwards. This module is the thin "config provider"
//! collaborator described by the design: it does no validation beyond what
//! `clap` itself performs, deferring the blacklist-file check to
//! [`crate::blacklist::Blacklist::load`], which is the actual authority on
//! that error.

use std::path::PathBuf;

use clap::Parser;

/// A local forward proxy that fragments TLS ClientHello records to evade
/// SNI-based DPI.
#[derive(Parser, Debug, Clone)]
#[command(name = "nodpi-proxy", version, about)]
pub struct Cli {
    /// Address to bind the proxy listener on.
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Port to bind the proxy listener on.
    #[arg(long, default_value_t = 8080)]
    pub port: u16,

    /// Path to a newline-delimited list of blacklisted host fragments.
    #[arg(long, default_value = "blacklist.txt")]
    pub blacklist: PathBuf,

    /// Fragment every CONNECT payload regardless of blacklist match.
    #[arg(long)]
    pub no_blacklist: bool,

    /// Path to write the access log (one line per completed connection).
    #[arg(long)]
    pub log_access: Option<PathBuf>,

    /// Path to write the error log (traces for failed connections).
    #[arg(long)]
    pub log_error: Option<PathBuf>,

    /// Suppress the periodic stats line on stdout.
    #[arg(long)]
    pub quiet: bool,

    /// Emit a `[NON-CRITICAL]` line to stderr for every recovered error.
    #[arg(long)]
    pub verbose: bool,
}

/// Immutable configuration value derived from [`Cli`].
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub blacklist_path: PathBuf,
    pub no_blacklist: bool,
    pub log_access: Option<PathBuf>,
    pub log_error: Option<PathBuf>,
    pub quiet: bool,
    pub verbose: bool,
}

impl From<Cli> for Config {
    fn from(cli: Cli) -> Self {
        Config {
            host: cli.host,
            port: cli.port,
            blacklist_path: cli.blacklist,
            no_blacklist: cli.no_blacklist,
            log_access: cli.log_access,
            log_error: cli.log_error,
            quiet: cli.quiet,
            verbose: cli.verbose,
        }
    }
}

impl Config {
    /// Parses `std::env::args()` into a validated [`Config`].
    ///
    /// No I/O is performed here; the blacklist path is only checked when
    /// [`crate::blacklist::Blacklist::load`] is called.
    pub fn load() -> Config {
        Cli::parse().into()
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
