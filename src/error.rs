//! Error kinds for the durable queue store.
//!
//! `ProtocolError` has no dedicated type here: per the command contract,
//! validation failures are plain `String`s destined straight for the wire.

use std::path::PathBuf;

use snafu::Snafu;

/// Failures parsing or loading a single `.rec` / `.rec.tmp` block file.
#[derive(Debug, Snafu)]
pub enum BlockError {
    #[snafu(display("invalid block filename: {}", path.display()))]
    InvalidBlockFilename { path: PathBuf },

    #[snafu(display("{}: broken records block, not enough data", path.display()))]
    BrokenBlock { path: PathBuf },

    #[snafu(display("i/o error reading block {}: {source}", path.display()))]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Failures writing a new record to disk.
#[derive(Debug, Snafu)]
pub enum StorageError {
    #[snafu(display("can't write record to {}: {source}", path.display()))]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("can't rename {} to {}: {source}", from.display(), to.display()))]
    Rename {
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
}

/// Failures looking up a record by position within a queue.
#[derive(Debug, Snafu)]
pub enum QueueError {
    #[snafu(display("position {pos} not found in queue '{queue}'"))]
    PositionNotFound { queue: String, pos: u64 },

    #[snafu(transparent)]
    Block { source: BlockError },
}
