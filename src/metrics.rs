//! A counter bag keyed by arbitrary string, dumped at shutdown.
//!
//! Keys are fully dynamic (one per command/queue pairing), so counters live
//! in a concurrent map rather than behind a fixed set of named statics.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

#[derive(Debug, Default)]
pub struct MetricsSink {
    counters: DashMap<String, AtomicU64>,
}

impl MetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments `key` by `n`, creating the counter on first use. A `n` of
    /// zero is a no-op.
    pub fn increment(&self, key: impl AsRef<str>, n: u64) {
        if n == 0 {
            return;
        }

        match self.counters.get(key.as_ref()) {
            Some(counter) => {
                counter.fetch_add(n, Ordering::Relaxed);
            }
            None => {
                self.counters
                    .entry(key.as_ref().to_string())
                    .or_insert_with(|| AtomicU64::new(0))
                    .fetch_add(n, Ordering::Relaxed);
            }
        }
    }

    pub fn get(&self, key: &str) -> u64 {
        self.counters
            .get(key)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Emits `prefix.key = value` lines, one per counter, sorted by key.
    pub fn dump(&self, prefix: &str, out: &mut impl io::Write) -> io::Result<()> {
        let mut entries: Vec<(String, u64)> = self
            .counters
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().load(Ordering::Relaxed)))
            .collect();
        entries.sort();

        for (key, value) in entries {
            if prefix.is_empty() {
                writeln!(out, "{key} = {value}")?;
            } else {
                writeln!(out, "{prefix}.{key} = {value}")?;
            }
        }
        Ok(())
    }
}
