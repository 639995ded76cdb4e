//! # Engine — UndertowKV Write Path
//!
//! The orchestrator that ties together the [`memlevel`], [`writeiter`], and
//! [`run`] crates into the write half of an LSM index.
//!
//! ```text
//! Client
//!   |
//!   v
//! ┌──────────────────────────────────────────────────┐
//! │                    INDEX                         │
//! │                                                  │
//! │ write.rs → version += 1 → MemLevel insert        │
//! │              |                                   │
//! │              |  (dump threshold exceeded?)       │
//! │              |            yes                    │
//! │              v                                   │
//! │           dump() ── WriteIterator ──▶ new run    │
//! │              |                                   │
//! │              |  (run count >= trigger?)          │
//! │              |            yes                    │
//! │              v                                   │
//! │           compact() ─ WriteIterator ─▶ one run   │
//! │                       (last level)               │
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module         | Purpose                                            |
//! |----------------|----------------------------------------------------|
//! | [`lib.rs`]     | `Index` struct, constructor, accessors, `Drop`     |
//! | [`write`]      | `replace()`, `delete()`, `upsert()` + masked forms |
//! | [`dump`]       | memory level → new run through a write iterator    |
//! | [`compaction`] | all runs → one run, last-level elisions on         |
//!
//! ## Levels
//!
//! ```text
//! ┌────────────────────────────┐  ← freshest
//! │ MEMORY LEVEL               │
//! ├────────────────────────────┤  ← from dumps (newest first)
//! │ RUNS                       │
//! └────────────────────────────┘
//! ```
//!
//! Durability (WAL, manifest) is deliberately absent: on open the index
//! rebuilds its run stack by scanning the data directory, newest first.

mod compaction;
mod dump;
mod write;

use anyhow::Result;
use memlevel::MemLevel;
use run::Run;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use stmt::{KeyDef, UpsertApplier};

/// Maximum allowed key size in bytes (64 KiB).
pub const MAX_KEY_SIZE: usize = 64 * 1024;
/// Maximum allowed row size in bytes (10 MiB).
pub const MAX_ROW_SIZE: usize = 10 * 1024 * 1024;

/// Default memory-level byte size that triggers an automatic dump.
pub const DEFAULT_DUMP_THRESHOLD: usize = 1024 * 1024;

/// Default number of runs that triggers automatic compaction after a dump.
/// Set to `0` to disable auto-compaction.
pub const DEFAULT_RUN_COMPACTION_TRIGGER: usize = 4;

/// The write half of one LSM index: a memory level, a newest-first stack of
/// runs, and the machinery to move statements downwards.
///
/// # Write path
///
/// 1. Assign the next monotonic version.
/// 2. Insert the statement into the memory level.
/// 3. If the level's `approx_size` crosses the dump threshold, dump it to a
///    new run; if the run count then crosses the compaction trigger, compact.
///
/// # Horizons
///
/// `dump` and `compact` take the oldest version still visible to an active
/// reader. Statements newer than that are carried verbatim; everything at or
/// below it is collapsed by the write iterator.
pub struct Index {
    pub(crate) dir: PathBuf,
    pub(crate) key_def: Arc<dyn KeyDef>,
    pub(crate) applier: Arc<dyn UpsertApplier>,
    pub(crate) is_primary: bool,
    pub(crate) index_column_mask: u64,
    pub(crate) mem: MemLevel,
    /// Runs ordered newest first.
    pub(crate) runs: Vec<Run>,
    /// Current monotonic statement version.
    pub(crate) version: i64,
    /// Next run file sequence number.
    pub(crate) run_seq: u64,
    pub(crate) dump_threshold: usize,
    pub(crate) run_compaction_trigger: usize,
}

impl std::fmt::Debug for Index {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Index")
            .field("dir", &self.dir)
            .field("is_primary", &self.is_primary)
            .field("version", &self.version)
            .field("mem_entries", &self.mem.len())
            .field("mem_size", &self.mem.approx_size())
            .field("run_count", &self.runs.len())
            .field("dump_threshold", &self.dump_threshold)
            .field("run_compaction_trigger", &self.run_compaction_trigger)
            .finish()
    }
}

impl Index {
    /// Opens (or creates) an index rooted at `dir`.
    ///
    /// Existing `.run` files are loaded newest first (the file name embeds
    /// the run sequence number); leftover `.run.tmp` files from interrupted
    /// dumps are removed; the version counter resumes past the largest
    /// version found on disk.
    pub fn open<P: AsRef<Path>>(
        dir: P,
        key_def: Arc<dyn KeyDef>,
        applier: Arc<dyn UpsertApplier>,
        is_primary: bool,
        index_column_mask: u64,
    ) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Self::cleanup_tmp_files(&dir);

        let mut paths: Vec<PathBuf> = std::fs::read_dir(&dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|x| x == "run").unwrap_or(false))
            .collect();
        // Newest first: names embed the run sequence number.
        paths.sort();
        paths.reverse();

        let mut runs = Vec::new();
        let mut version = 0i64;
        let mut run_seq = 0u64;
        for path in &paths {
            let run = Run::open(path)?;
            version = version.max(run.max_version());
            run_seq = run_seq.max(Self::parse_run_seq(path).map_or(0, |s| s + 1));
            runs.push(run);
        }

        Ok(Self {
            mem: MemLevel::new(key_def.clone()),
            dir,
            key_def,
            applier,
            is_primary,
            index_column_mask,
            runs,
            version,
            run_seq,
            dump_threshold: DEFAULT_DUMP_THRESHOLD,
            run_compaction_trigger: DEFAULT_RUN_COMPACTION_TRIGGER,
        })
    }

    fn cleanup_tmp_files(dir: &Path) {
        if let Ok(entries) = std::fs::read_dir(dir) {
            for entry in entries.filter_map(|e| e.ok()) {
                let path = entry.path();
                if path.extension().map(|x| x == "tmp").unwrap_or(false) {
                    let _ = std::fs::remove_file(&path);
                }
            }
        }
    }

    fn parse_run_seq(path: &Path) -> Option<u64> {
        path.file_stem()?
            .to_str()?
            .strip_prefix("run-")?
            .parse()
            .ok()
    }

    pub(crate) fn next_run_path(&mut self) -> PathBuf {
        let seq = self.run_seq;
        self.run_seq += 1;
        self.dir.join(format!("run-{seq:012}.run"))
    }

    /// Returns the current monotonic version.
    #[must_use]
    pub fn version(&self) -> i64 {
        self.version
    }

    /// Number of on-disk runs.
    #[must_use]
    pub fn run_count(&self) -> usize {
        self.runs.len()
    }

    /// Number of statements in the memory level.
    #[must_use]
    pub fn mem_len(&self) -> usize {
        self.mem.len()
    }

    /// Approximate byte size of the memory level.
    #[must_use]
    pub fn mem_size(&self) -> usize {
        self.mem.approx_size()
    }

    /// Returns the current dump threshold in bytes.
    #[must_use]
    pub fn dump_threshold(&self) -> usize {
        self.dump_threshold
    }

    /// Updates the dump threshold. Useful for testing or runtime tuning.
    pub fn set_dump_threshold(&mut self, threshold: usize) {
        self.dump_threshold = threshold;
    }

    /// Returns the run-count trigger for automatic compaction.
    #[must_use]
    pub fn run_compaction_trigger(&self) -> usize {
        self.run_compaction_trigger
    }

    /// Updates the compaction trigger. Set to `0` to disable.
    pub fn set_run_compaction_trigger(&mut self, trigger: usize) {
        self.run_compaction_trigger = trigger;
    }
}

/// Best-effort dump on drop.
///
/// Without a WAL the memory level is all that holds recent writes, so a
/// dropped index dumps what it can. Errors are ignored — Drop cannot
/// propagate them.
impl Drop for Index {
    fn drop(&mut self) {
        if !self.mem.is_empty() {
            let horizon = self.version;
            let _ = self.dump(horizon);
        }
    }
}

#[cfg(test)]
mod tests;
