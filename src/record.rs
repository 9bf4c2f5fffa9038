//! Immutable records and the on-disk blocks that hold ranges of them.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Instant;

use regex::Regex;
use snafu::{ensure, OptionExt, ResultExt};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::error::{BlockError, BrokenBlockSnafu, InvalidBlockFilenameSnafu, IoSnafu};

static BLOCK_FILENAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([^.]+)\.(\d+)\.(\d+)\.rec(\.tmp)?$").expect("block filename regex is valid")
});

/// An immutable (position, payload) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub pos: u64,
    pub data: String,
}

impl Record {
    pub fn new(pos: u64, data: impl Into<String>) -> Self {
        Self {
            pos,
            data: data.into(),
        }
    }
}

/// Metadata (and optional in-memory cache) for one `.rec` file on disk.
#[derive(Debug)]
pub struct RecordsBlock {
    path: PathBuf,
    name: String,
    first: u64,
    last: u64,
    tmp: bool,
    records: Option<Vec<Record>>,
    last_access: Instant,
}

impl RecordsBlock {
    /// Parses a block's metadata from its filename. Does not touch the file contents.
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self, BlockError> {
        let path = path.into();
        let filename = path
            .file_name()
            .and_then(|f| f.to_str())
            .context(InvalidBlockFilenameSnafu { path: path.clone() })?;

        let caps = BLOCK_FILENAME_PATTERN
            .captures(filename)
            .context(InvalidBlockFilenameSnafu { path: path.clone() })?;

        let name = caps[1].to_string();
        let first: u64 = caps[2]
            .parse()
            .ok()
            .context(InvalidBlockFilenameSnafu { path: path.clone() })?;
        let last: u64 = caps[3]
            .parse()
            .ok()
            .context(InvalidBlockFilenameSnafu { path: path.clone() })?;
        let tmp = caps.get(4).is_some();

        ensure!(
            first <= last,
            InvalidBlockFilenameSnafu { path: path.clone() }
        );

        Ok(Self {
            path,
            name,
            first,
            last,
            tmp,
            records: None,
            last_access: Instant::now(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn first(&self) -> u64 {
        self.first
    }

    pub fn last(&self) -> u64 {
        self.last
    }

    pub fn is_tmp(&self) -> bool {
        self.tmp
    }

    pub fn is_loaded(&self) -> bool {
        self.records.is_some()
    }

    pub fn last_access(&self) -> Instant {
        self.last_access
    }

    /// Loads the block's records from disk if not already resident.
    ///
    /// Refreshes the access timestamp unconditionally, even on a cache hit.
    pub async fn load(&mut self) -> Result<(), BlockError> {
        self.last_access = Instant::now();

        if self.records.is_some() {
            return Ok(());
        }

        let file = File::open(&self.path).await.context(IoSnafu {
            path: self.path.clone(),
        })?;
        let mut lines = BufReader::new(file).lines();

        let expected = (self.last - self.first + 1) as usize;
        let mut records = Vec::with_capacity(expected);
        let mut pos = self.first;

        while records.len() < expected {
            match lines.next_line().await.context(IoSnafu {
                path: self.path.clone(),
            })? {
                Some(line) => {
                    records.push(Record::new(pos, line));
                    pos += 1;
                }
                None => break,
            }
        }

        ensure!(
            records.len() == expected,
            BrokenBlockSnafu {
                path: self.path.clone()
            }
        );

        self.records = Some(records);
        Ok(())
    }

    /// Drops the in-memory record vector. Idempotent; the disk file is untouched.
    pub fn unload(&mut self) {
        self.records = None;
    }

    pub fn records(&self) -> Option<&[Record]> {
        self.records.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_final_block_filename() {
        let rb = RecordsBlock::from_path("/data/orders.10.19.rec").unwrap();
        assert_eq!(rb.name(), "orders");
        assert_eq!(rb.first(), 10);
        assert_eq!(rb.last(), 19);
        assert!(!rb.is_tmp());
    }

    #[test]
    fn parses_tmp_block_filename() {
        let rb = RecordsBlock::from_path("/data/orders.10.19.rec.tmp").unwrap();
        assert!(rb.is_tmp());
    }

    #[test]
    fn rejects_non_matching_filename() {
        assert!(RecordsBlock::from_path("/data/orders.rec").is_err());
        assert!(RecordsBlock::from_path("/data/orders.txt").is_err());
    }

    #[test]
    fn rejects_first_greater_than_last() {
        assert!(RecordsBlock::from_path("/data/orders.9.3.rec").is_err());
    }

    #[tokio::test]
    async fn load_reads_exact_range() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("q.0.2.rec");
        tokio::fs::write(&path, "a\nb\nc\n").await.unwrap();

        let mut rb = RecordsBlock::from_path(&path).unwrap();
        rb.load().await.unwrap();
        let records = rb.records().unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0], Record::new(0, "a"));
        assert_eq!(records[2], Record::new(2, "c"));
    }

    #[tokio::test]
    async fn load_ignores_trailing_extra_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("q.0.1.rec");
        tokio::fs::write(&path, "a\nb\nc\n").await.unwrap();

        let mut rb = RecordsBlock::from_path(&path).unwrap();
        rb.load().await.unwrap();
        assert_eq!(rb.records().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn load_fails_on_truncated_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("q.0.2.rec");
        tokio::fs::write(&path, "a\nb\n").await.unwrap();

        let mut rb = RecordsBlock::from_path(&path).unwrap();
        assert!(rb.load().await.is_err());
    }

    #[tokio::test]
    async fn load_is_idempotent_and_bumps_access_time() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("q.0.0.rec");
        tokio::fs::write(&path, "a\n").await.unwrap();

        let mut rb = RecordsBlock::from_path(&path).unwrap();
        rb.load().await.unwrap();
        let first_access = rb.last_access();
        rb.unload();
        assert!(!rb.is_loaded());
        rb.load().await.unwrap();
        assert!(rb.last_access() >= first_access);
    }
}
