// crates/server/src/config.rs
//! Server configuration from command-line flags and `JOBDECK_*` variables.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use clap::Parser;

/// Default port for the server.
pub const DEFAULT_PORT: u16 = 47900;

/// Job orchestration and replication log server.
#[derive(Parser, Debug, Clone)]
#[command(name = "jobdeck", version, about)]
pub struct Config {
    /// Address to bind.
    #[arg(long, env = "JOBDECK_HOST", default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    pub host: IpAddr,

    /// Port to bind.
    #[arg(long, env = "JOBDECK_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Buffer size of the job and sync event channels. Slow subscribers
    /// that fall further behind miss events.
    #[arg(long, env = "JOBDECK_EVENT_CAPACITY", default_value_t = 256)]
    pub event_capacity: usize,

    /// Start the first job of a group as soon as it is enqueued.
    #[arg(
        long,
        env = "JOBDECK_AUTO_START",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub auto_start: bool,

    /// JSON array of operations replayed by a backfill. Without it,
    /// backfills replay nothing.
    #[arg(long, env = "JOBDECK_BACKFILL_FILE")]
    pub backfill_file: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, env = "JOBDECK_LOG_JSON")]
    pub log_json: bool,
}

impl Config {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
            event_capacity: 256,
            auto_start: true,
            backfill_file: None,
            log_json: false,
        }
    }
}
