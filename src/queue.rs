//! A named, append-only sequence of records: an on-disk block prefix plus
//! an in-memory tail of recently pushed single-record files.

use std::path::PathBuf;

use snafu::ResultExt;
use tokio::io::AsyncWriteExt;

use crate::error::{PositionNotFoundSnafu, QueueError, RenameSnafu, StorageError, WriteSnafu};
use crate::record::{Record, RecordsBlock};

#[derive(Debug)]
pub struct Queue {
    name: String,
    dir: PathBuf,
    /// Ascending by `first`, pairwise contiguous, never overlapping the tail.
    blocks: Vec<RecordsBlock>,
    /// In-memory records immediately following the last block, one per
    /// single-record file still awaiting compaction.
    tail: Vec<Record>,
}

impl Queue {
    pub fn new(name: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            dir: dir.into(),
            blocks: Vec::new(),
            tail: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn empty(&self) -> bool {
        self.blocks.is_empty() && self.tail.is_empty()
    }

    pub fn first(&self) -> u64 {
        if let Some(block) = self.blocks.first() {
            block.first()
        } else if let Some(record) = self.tail.first() {
            record.pos
        } else {
            0
        }
    }

    pub fn last(&self) -> u64 {
        if let Some(record) = self.tail.last() {
            record.pos
        } else if let Some(block) = self.blocks.last() {
            block.last()
        } else {
            0
        }
    }

    pub fn blocks(&self) -> &[RecordsBlock] {
        &self.blocks
    }

    /// Writes `data` to a new single-record block file via temp-file +
    /// atomic rename, then appends it to the in-memory tail.
    pub async fn push(&mut self, data: &str) -> Result<u64, StorageError> {
        let pos = if self.empty() { 0 } else { self.last() + 1 };
        let stem = format!("{}.{}.{}", self.name, pos, pos);
        let final_path = self.dir.join(format!("{stem}.rec"));
        let tmp_path = self.dir.join(format!("{stem}.rec.tmp"));

        if let Err(source) = write_record_file(&tmp_path, data).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(source);
        }

        if let Err(source) = tokio::fs::rename(&tmp_path, &final_path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return RenameSnafu {
                from: tmp_path,
                to: final_path,
                source,
            }
            .fail();
        }

        let record = Record::new(pos, data.to_string());
        self.tail.push(record);
        Ok(pos)
    }

    /// Fallible lookup by position. Never returns a dangling reference: a
    /// miss is reported as `PositionNotFound`, translated by the caller
    /// (`POP`) into a protocol-level error string.
    pub async fn at(&mut self, pos: u64) -> Result<Record, QueueError> {
        if let (Some(first), Some(last)) = (self.tail.first(), self.tail.last()) {
            if pos >= first.pos && pos <= last.pos {
                return Ok(self.tail[(pos - first.pos) as usize].clone());
            }
        }

        for block in self.blocks.iter_mut() {
            if pos >= block.first() && pos <= block.last() {
                block.load().await?;
                let idx = (pos - block.first()) as usize;
                return Ok(block
                    .records()
                    .expect("block was just loaded")[idx]
                    .clone());
            }
        }

        PositionNotFoundSnafu {
            queue: self.name.clone(),
            pos,
        }
        .fail()
    }

    /// Recovery-only: prepends a block to the head of `blocks`.
    ///
    /// The descending-`last` scan order in `QueueStore::load` means blocks
    /// are discovered from newest-ending to oldest, so prepending keeps
    /// `blocks` sorted ascending by `first`.
    pub(crate) fn prepend_block(&mut self, block: RecordsBlock) {
        self.blocks.insert(0, block);
    }

    /// Recovery-only: collapses a single-record block's file back into the
    /// in-memory tail (it was a pushed-but-not-yet-blocked record).
    ///
    /// Blocks are discovered in descending-`last` order, so each recovered
    /// record is older than whatever is already in the tail; it goes at the
    /// front to keep the tail ascending.
    pub(crate) fn restore_tail_record(&mut self, record: Record) {
        self.tail.insert(0, record);
    }
}

async fn write_record_file(path: &std::path::Path, data: &str) -> Result<(), StorageError> {
    let mut file = tokio::fs::File::create(path).await.context(WriteSnafu {
        path: path.to_path_buf(),
    })?;
    file.write_all(data.as_bytes())
        .await
        .context(WriteSnafu {
            path: path.to_path_buf(),
        })?;
    file.write_all(b"\n").await.context(WriteSnafu {
        path: path.to_path_buf(),
    })?;
    file.flush().await.context(WriteSnafu {
        path: path.to_path_buf(),
    })?;
    Ok(())
}
