use std::path::PathBuf;

use clap::Parser;

/// Relay configuration, from flags or environment variables.
#[derive(Debug, Clone, Parser)]
#[command(name = "plain-state-relay", version, about)]
pub struct Config {
    /// Interface to bind.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,
    #[arg(long, env = "PORT", default_value_t = 5000)]
    pub port: u16,
    /// Directory served for every path that is not a relay route.
    #[arg(long, env = "STATIC_DIR", default_value = "client")]
    pub static_dir: PathBuf,
    /// Frames kept for replay to peers that join later.
    #[arg(long, env = "RELAY_HISTORY_LIMIT", default_value_t = 10_000)]
    pub history_limit: usize,
    /// Frames a slow peer may fall behind before it starts missing them.
    #[arg(long, env = "RELAY_CHANNEL_CAPACITY", default_value_t = 1024)]
    pub channel_capacity: usize,
}

impl Config {
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
