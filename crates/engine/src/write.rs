/// Mutations: `replace()`, `delete()`, `upsert()` and their masked forms.
///
/// Every mutation assigns the next monotonic version and lands in the
/// memory level. When the level's byte size crosses the dump threshold, it
/// is dumped to a new run with the current version as the horizon (no
/// reader tracking lives at this layer).
use anyhow::Result;
use stmt::{Statement, UpdateOp};

use crate::{Index, MAX_KEY_SIZE, MAX_ROW_SIZE};

impl Index {
    /// Inserts or overwrites a full row.
    pub fn replace(&mut self, key: Vec<u8>, row: Vec<u8>) -> Result<()> {
        self.check_key_row(&key, &row)?;
        let version = self.next_version()?;
        self.commit(Statement::replace(key, row, version))
    }

    /// A replace produced by an update operation; `column_mask` records the
    /// columns the update touched so secondary indexes can elide it.
    pub fn replace_masked(&mut self, key: Vec<u8>, row: Vec<u8>, column_mask: u64) -> Result<()> {
        self.check_key_row(&key, &row)?;
        let version = self.next_version()?;
        self.commit(Statement::replace(key, row, version).with_column_mask(column_mask))
    }

    /// Deletes a key by writing a tombstone.
    pub fn delete(&mut self, key: Vec<u8>) -> Result<()> {
        self.check_key(&key)?;
        let version = self.next_version()?;
        self.commit(Statement::delete(key, version))
    }

    /// A delete produced by an update operation, with its column mask.
    pub fn delete_masked(&mut self, key: Vec<u8>, column_mask: u64) -> Result<()> {
        self.check_key(&key)?;
        let version = self.next_version()?;
        self.commit(Statement::delete(key, version).with_column_mask(column_mask))
    }

    /// Writes a deferred update: insert `row` if the key has no older data,
    /// otherwise apply `ops` to it. Resolution happens during dump or
    /// compaction, not here.
    pub fn upsert(&mut self, key: Vec<u8>, row: Vec<u8>, ops: Vec<UpdateOp>) -> Result<()> {
        self.check_key_row(&key, &row)?;
        let version = self.next_version()?;
        self.commit(Statement::upsert(key, row, ops, version))
    }

    fn check_key(&self, key: &[u8]) -> Result<()> {
        anyhow::ensure!(!key.is_empty(), "key must not be empty");
        anyhow::ensure!(
            key.len() <= MAX_KEY_SIZE,
            "key too large: {} bytes (max {})",
            key.len(),
            MAX_KEY_SIZE
        );
        Ok(())
    }

    fn check_key_row(&self, key: &[u8], row: &[u8]) -> Result<()> {
        self.check_key(key)?;
        anyhow::ensure!(
            row.len() <= MAX_ROW_SIZE,
            "row too large: {} bytes (max {})",
            row.len(),
            MAX_ROW_SIZE
        );
        Ok(())
    }

    fn next_version(&mut self) -> Result<i64> {
        self.version = self
            .version
            .checked_add(1)
            .ok_or_else(|| anyhow::anyhow!("version overflow (i64::MAX reached)"))?;
        Ok(self.version)
    }

    fn commit(&mut self, statement: Statement) -> Result<()> {
        self.mem.insert(statement);

        // Maybe dump the memory level to a run.
        if self.mem.approx_size() >= self.dump_threshold {
            let horizon = self.version;
            self.dump(horizon)?;
        }
        Ok(())
    }
}
