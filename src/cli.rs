//! Command line interface for the `metered_listener` echo server.

use std::net::SocketAddr;

use clap::Parser;

/// Command line arguments for the `metered_listener` binary.
#[derive(Debug, Parser)]
#[command(
    name = "metered_listener",
    version,
    about = "TCP echo server reporting accept and open connection metrics"
)]
pub struct Cli {
    /// Address to accept connections on.
    #[arg(short, long, default_value = "127.0.0.1:7878")]
    pub bind: SocketAddr,
    /// Milliseconds between two metric flushes.
    #[arg(long, default_value_t = 10_000)]
    pub flush_interval_ms: u64,
    /// Prefix for the emitted metric names.
    #[arg(long, default_value = "http")]
    pub prefix: String,
    /// Serve Prometheus metrics on this address instead of logging them.
    #[arg(long)]
    pub prometheus: Option<SocketAddr>,
}
