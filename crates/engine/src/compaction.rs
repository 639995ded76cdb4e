/// Compaction: merges all runs into a single run.
///
/// Uses a [`WriteIterator`] with last-level elisions enabled: after a full
/// compaction nothing older remains below, so tombstones at or below the
/// horizon disappear and unresolved upserts are finalized. The result is
/// written atomically (temp file + rename) before the old run files are
/// deleted.
use anyhow::Result;
use run::RunWriter;
use tracing::{debug, info};

use crate::Index;
use writeiter::WriteIterator;

impl Index {
    /// Compacts all runs into a single run.
    ///
    /// `oldest_version` is the horizon: statements newer than it are carried
    /// verbatim, everything else collapses. A compaction whose output is
    /// empty simply deletes the old runs.
    ///
    /// # When to compact
    ///
    /// Called automatically when the run count reaches
    /// `run_compaction_trigger` after a dump, or manually by the caller.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure during merge, write, or cleanup; the
    /// old runs are kept intact in that case.
    pub fn compact(&mut self, oldest_version: i64) -> Result<()> {
        if self.runs.len() <= 1 {
            return Ok(()); // nothing to compact
        }

        debug!(runs = self.runs.len(), oldest_version, "compaction started");

        // A full compaction has no older data below its output.
        let mut iter = WriteIterator::new(
            self.key_def.clone(),
            self.applier.clone(),
            self.is_primary,
            self.index_column_mask,
            true,
            oldest_version,
        );
        for run in &self.runs {
            iter.add_run(run)?;
        }

        let path = self.next_run_path();
        let mut writer = RunWriter::create(&path)?;
        while let Some(statement) = iter.next()? {
            writer.push(statement)?;
        }
        drop(iter);

        let new_run = if writer.count() == 0 {
            // All statements were elided: the index is empty below the
            // memory level.
            drop(writer);
            None
        } else {
            Some(writer.finish()?)
        };

        // The new run is in place (or provably empty); drop the old files.
        let old: Vec<_> = std::mem::take(&mut self.runs);
        for run in &old {
            let _ = std::fs::remove_file(run.path());
        }
        if let Some(run) = new_run {
            info!(
                path = %run.path().display(),
                statements = run.entry_count(),
                "compaction finished"
            );
            self.runs.push(run);
        } else {
            info!("compaction finished: all statements elided");
        }
        Ok(())
    }
}
