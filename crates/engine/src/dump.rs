/// Dump: memory level → new run.
///
/// The frozen level goes through a [`WriteIterator`] so that horizon
/// collapsing, upsert squashing, and the level elisions all happen on the
/// way out. The run is written streaming — memory usage is bounded by one
/// statement, not the level size.
use anyhow::Result;
use run::{Run, RunWriter};
use std::sync::Arc;
use tracing::{debug, info};

use crate::Index;
use memlevel::MemLevel;
use writeiter::WriteIterator;

impl Index {
    /// Dumps the memory level into a new run.
    ///
    /// `oldest_version` is the horizon: statements newer than it are carried
    /// verbatim. Returns the new run, or `None` when the level was empty or
    /// every statement was elided (e.g. a level of tombstones dumped with no
    /// runs below).
    ///
    /// After a successful dump the memory level is reset and, if the run
    /// count reached the compaction trigger, compaction runs.
    pub fn dump(&mut self, oldest_version: i64) -> Result<Option<Run>> {
        if self.mem.is_empty() {
            return Ok(None);
        }

        let frozen = Arc::new(std::mem::replace(
            &mut self.mem,
            MemLevel::new(self.key_def.clone()),
        ));
        debug!(
            statements = frozen.len(),
            bytes = frozen.approx_size(),
            oldest_version,
            "dump started"
        );

        // Dumping straight onto nothing makes this the last level.
        let is_last_level = self.runs.is_empty();
        let mut iter = WriteIterator::new(
            self.key_def.clone(),
            self.applier.clone(),
            self.is_primary,
            self.index_column_mask,
            is_last_level,
            oldest_version,
        );
        iter.add_memory(frozen)?;

        let path = self.next_run_path();
        let mut writer = RunWriter::create(&path)?;
        while let Some(statement) = iter.next()? {
            writer.push(statement)?;
        }

        if writer.count() == 0 {
            // Everything was elided; no run file is produced.
            drop(writer);
            debug!("dump produced no statements");
            return Ok(None);
        }

        let run = writer.finish()?;
        info!(
            path = %run.path().display(),
            statements = run.entry_count(),
            "dump finished"
        );
        self.runs.insert(0, run.clone());

        if self.run_compaction_trigger > 0 && self.runs.len() >= self.run_compaction_trigger {
            self.compact(oldest_version)?;
        }
        Ok(Some(run))
    }
}
