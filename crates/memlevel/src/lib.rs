//! # MemLevel — Ordered In-Memory Level
//!
//! The in-memory stage of the write path: an ordered container of committed
//! statements awaiting dump to an on-disk run. Unlike a read-optimized
//! memtable, a level keeps **every** version of a key — collapsing history
//! against the read horizon is the write iterator's job, not the level's.
//!
//! Statements are stored as `Arc<Statement>` so that a dump can stream them
//! without copying: [`MemStream`] hands out shared handles, and any consumer
//! that needs a statement past the stream's next advance just clones the
//! `Arc`.
//!
//! Ordering is (key ascending under the level's [`KeyDef`], version
//! descending, terminal before UPSERT) — the order the write iterator
//! expects from every source.

use std::cmp::Ordering;
use std::sync::Arc;

use stmt::{KeyDef, Statement, StmtHandle, StmtStream, StmtType};

/// Sort order of statements within a level.
fn stmt_order(kd: &dyn KeyDef, a: &Statement, b: &Statement) -> Ordering {
    kd.compare(a.key(), b.key())
        .then_with(|| b.version().cmp(&a.version()))
        .then_with(|| {
            let ua = a.stmt_type() == StmtType::Upsert;
            let ub = b.stmt_type() == StmtType::Upsert;
            ua.cmp(&ub)
        })
}

/// An ordered in-memory level of statements.
#[derive(Debug)]
pub struct MemLevel {
    key_def: Arc<dyn KeyDef>,
    stmts: Vec<Arc<Statement>>,
    approx_size: usize,
    min_version: Option<i64>,
    max_version: Option<i64>,
}

impl MemLevel {
    pub fn new(key_def: Arc<dyn KeyDef>) -> Self {
        Self {
            key_def,
            stmts: Vec::new(),
            approx_size: 0,
            min_version: None,
            max_version: None,
        }
    }

    /// Inserts a committed statement, keeping the level ordered. Multiple
    /// versions of the same key coexist.
    pub fn insert(&mut self, statement: Statement) {
        self.approx_size += statement.approx_size();
        let v = statement.version();
        self.min_version = Some(self.min_version.map_or(v, |m| m.min(v)));
        self.max_version = Some(self.max_version.map_or(v, |m| m.max(v)));

        let stmt = Arc::new(statement);
        let kd = self.key_def.as_ref();
        let pos = self
            .stmts
            .partition_point(|s| stmt_order(kd, s, &stmt) != Ordering::Greater);
        self.stmts.insert(pos, stmt);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.stmts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stmts.is_empty()
    }

    /// Rough payload footprint in bytes; feeds the dump trigger.
    #[must_use]
    pub fn approx_size(&self) -> usize {
        self.approx_size
    }

    /// Smallest statement version in the level, if any.
    #[must_use]
    pub fn min_version(&self) -> Option<i64> {
        self.min_version
    }

    /// Largest statement version in the level, if any.
    #[must_use]
    pub fn max_version(&self) -> Option<i64> {
        self.max_version
    }

    /// Ordered iterator over the level's statements.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Statement>> {
        self.stmts.iter()
    }

    fn stmt_at(&self, pos: usize) -> Option<&Arc<Statement>> {
        self.stmts.get(pos)
    }
}

/// A pull-only stream over a frozen level. Yields shared handles in the
/// level's stored order.
pub struct MemStream {
    level: Option<Arc<MemLevel>>,
    pos: usize,
}

impl MemStream {
    pub fn open(level: Arc<MemLevel>) -> Self {
        Self {
            level: Some(level),
            pos: 0,
        }
    }
}

impl StmtStream for MemStream {
    fn next(&mut self) -> anyhow::Result<Option<StmtHandle>> {
        let Some(level) = self.level.as_ref() else {
            return Ok(None);
        };
        match level.stmt_at(self.pos) {
            Some(s) => {
                self.pos += 1;
                Ok(Some(StmtHandle::Shared(s.clone())))
            }
            None => Ok(None),
        }
    }

    fn close(&mut self) {
        // Drops the level reference; further `next` calls report exhaustion.
        self.level = None;
    }
}
