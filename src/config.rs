//! Process bootstrap surface: CLI argument parsing and the resulting
//! runtime configuration.

use std::path::PathBuf;

use clap::Parser;

/// `rq-server <port>` — listens on `0.0.0.0:<port>`, serving out of the
/// current working directory. No other flags.
#[derive(Debug, Parser)]
#[command(name = "rq-server", version, about = "Durable multi-queue message broker")]
pub struct Cli {
    /// TCP port to listen on.
    pub port: u16,
}

/// Runtime configuration for one server process. There is no configuration
/// file or environment variable surface; everything here comes from the
/// single CLI argument and the process's working directory.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub working_dir: PathBuf,
}

impl Config {
    pub fn new(port: u16, working_dir: PathBuf) -> Self {
        Self { port, working_dir }
    }

    pub fn bind_addr(&self) -> std::net::SocketAddr {
        std::net::SocketAddr::from(([0, 0, 0, 0], self.port))
    }
}
