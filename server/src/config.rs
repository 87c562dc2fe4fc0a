//! Command line configuration of the server binary.

use crate::error::ServerError;
use clap::Parser;
use std::time::Duration;

/// Galaxy simulation server speaking JSON-RPC over WebSocket
#[derive(Parser, Debug, Clone, PartialEq)]
#[clap(author, version, about)]
pub struct ServerConfig {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    pub host: String,
    /// Server port to listen on
    #[clap(short, long, default_value_t = shared::DEFAULT_PORT)]
    pub port: u16,
    /// Fixed simulation step in milliseconds
    #[clap(long, default_value_t = 10)]
    pub step_ms: u64,
    /// Maximum number of concurrent connections
    #[clap(long, default_value_t = 32)]
    pub max_clients: usize,
    /// Pause between stopping the simulation and the transport on shutdown
    #[clap(long, default_value_t = 2000)]
    pub shutdown_grace_ms: u64,
    /// Number of generated star systems besides Sol
    #[clap(long, default_value_t = 24)]
    pub star_systems: usize,
    /// Seed for the generated star systems
    #[clap(long, default_value_t = 42)]
    pub seed: u64,
    /// Log at debug level unless RUST_LOG says otherwise
    #[clap(short, long)]
    pub verbose: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: shared::DEFAULT_PORT,
            step_ms: 10,
            max_clients: 32,
            shutdown_grace_ms: 2000,
            star_systems: 24,
            seed: 42,
            verbose: false,
        }
    }
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn step(&self) -> Duration {
        Duration::from_millis(self.step_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Default `env_logger` filter for this configuration.
    pub fn log_filter(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else {
            "info"
        }
    }

    pub fn validate(&self) -> Result<(), ServerError> {
        if self.step_ms == 0 {
            return Err(ServerError::InvalidConfig(
                "step must be at least 1 ms".to_string(),
            ));
        }
        if self.max_clients == 0 {
            return Err(ServerError::InvalidConfig(
                "max clients must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
