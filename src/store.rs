//! The set of all queues: startup recovery and name-based lookup/create.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::warn;

use crate::queue::Queue;
use crate::record::RecordsBlock;

/// The set of all queues, keyed by name. Queues live for the process
/// lifetime once created; callers share them via the returned `Arc`.
#[derive(Debug)]
pub struct QueueStore {
    dir: PathBuf,
    queues: DashMap<String, Arc<Mutex<Queue>>>,
}

impl QueueStore {
    /// Creates an empty store rooted at `dir`, without scanning it.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            queues: DashMap::new(),
        }
    }

    pub fn working_dir(&self) -> &std::path::Path {
        &self.dir
    }

    /// Looks up a queue by name, creating an empty one if absent. The name
    /// is assumed pre-validated by the caller (the command layer).
    pub fn queue(&self, name: &str) -> Arc<Mutex<Queue>> {
        self.queues
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Queue::new(name, self.dir.clone()))))
            .clone()
    }

    /// Queue names in ascending order, for `LIST` and `DUMP`.
    pub fn queue_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.queues.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    /// Restart recovery: scans `dir` for block files and reconstructs every
    /// queue's block list and tail. Must be called once before serving
    /// requests.
    pub async fn load(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        let store = Self::new(dir.clone());

        let mut found = Vec::new();
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !entry.file_type().await?.is_file() {
                continue;
            }
            match RecordsBlock::from_path(&path) {
                Ok(block) => found.push(block),
                Err(_) => continue, // not a block filename; not ours to manage
            }
        }

        // Ascending name, then descending `last` (widest-latest block
        // first, so redundant narrow blocks get discarded below), then
        // ascending `first`, then non-tmp before tmp.
        found.sort_by(|a, b| {
            a.name()
                .cmp(b.name())
                .then_with(|| b.last().cmp(&a.last()))
                .then_with(|| a.first().cmp(&b.first()))
                .then_with(|| a.is_tmp().cmp(&b.is_tmp()))
        });

        let mut broken_queues: HashSet<String> = HashSet::new();

        for mut block in found {
            if block.is_tmp() {
                if let Err(error) = tokio::fs::remove_file(block.path()).await {
                    warn!(path = %block.path().display(), %error, "failed to remove stale temp block during recovery");
                }
                continue;
            }

            if broken_queues.contains(block.name()) {
                continue;
            }

            let queue_handle = store.queue(block.name());
            let mut queue = queue_handle.lock().await;

            if queue.blocks().is_empty() && block.first() == block.last() {
                // Case A: the pushed-but-not-yet-blocked tail record.
                match block.load().await {
                    Ok(()) => {
                        let record = block.records().expect("just loaded")[0].clone();
                        queue.restore_tail_record(record);
                    }
                    Err(error) => {
                        warn!(path = %block.path().display(), %error, "broken records block skipped during recovery");
                    }
                }
                continue;
            }

            if let Some(front) = queue.blocks().first() {
                if block.first() >= front.first() && block.last() <= front.last() {
                    // Case B: duplicate/subrange of an already-installed block.
                    continue;
                }
            }

            if !queue.empty() && block.last() + 1 != queue.first() {
                // Case C: gap detected. Stop installing further blocks for
                // this queue; already-installed blocks and the tail stand.
                warn!(queue = block.name(), "broken sequence detected in queue during recovery");
                broken_queues.insert(block.name().to_string());
                continue;
            }

            // Case D: contiguous with the current front; prepend.
            queue.prepend_block(block);
        }

        Ok(store)
    }
}
