// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub bind_addr: SocketAddr,
    /// Append-only Log File.
    pub log_path: PathBuf,
    /// Fsync every record before counting it as written.
    pub sync_writes: bool,
    /// Reservoir capacity; `None` is unbounded.
    pub max_buffered_records: Option<usize>,
    /// Side file mirroring the reservoir across restarts.
    pub reservoir_snapshot_path: Option<PathBuf>,
    /// Retry the reservoir in the background; `None` waits for the next submission.
    pub flush_interval_secs: Option<u64>,
    pub max_payload_bytes: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            log_path: PathBuf::from("data.txt"),
            sync_writes: false,
            max_buffered_records: None,
            reservoir_snapshot_path: None,
            flush_interval_secs: None,
            max_payload_bytes: 2 * 1024 * 1024,
        }
    }
}

/// Command-line flags, each also settable through its `RESERVOIR_*` variable.
#[derive(Parser, Debug)]
#[command(name = "reservoir-node", about = "Timestamped append-only ingest server")]
pub struct CliArgs {
    #[arg(long, env = "RESERVOIR_BIND", default_value = "0.0.0.0:8000")]
    pub bind: SocketAddr,

    #[arg(long, env = "RESERVOIR_LOG_PATH", default_value = "data.txt")]
    pub log_path: PathBuf,

    #[arg(long, env = "RESERVOIR_SYNC_WRITES")]
    pub sync_writes: bool,

    #[arg(long, env = "RESERVOIR_MAX_BUFFERED")]
    pub max_buffered_records: Option<usize>,

    #[arg(long, env = "RESERVOIR_SNAPSHOT_PATH")]
    pub reservoir_snapshot: Option<PathBuf>,

    #[arg(long, env = "RESERVOIR_FLUSH_INTERVAL_SECS")]
    pub flush_interval_secs: Option<u64>,

    #[arg(long, env = "RESERVOIR_MAX_PAYLOAD_BYTES", default_value_t = 2 * 1024 * 1024)]
    pub max_payload_bytes: usize,
}

impl From<&CliArgs> for NodeConfig {
    fn from(args: &CliArgs) -> Self {
        Self {
            bind_addr: args.bind,
            log_path: args.log_path.clone(),
            sync_writes: args.sync_writes,
            max_buffered_records: args.max_buffered_records,
            reservoir_snapshot_path: args.reservoir_snapshot.clone(),
            // Zero would spin the flusher.
            flush_interval_secs: args.flush_interval_secs.filter(|secs| *secs > 0),
            max_payload_bytes: args.max_payload_bytes,
        }
    }
}
