//! Test doubles and builders shared by the write iterator tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::{WriteIterator, WriteIterError};
use stmt::row::{encode_row, int_field};
use stmt::{
    ApplyError, BytewiseKeys, KeyDef, RowApplier, Statement, StmtHandle, StmtStream, UpdateOp,
    UpsertApplier,
};

pub fn bkey(n: u8) -> Vec<u8> {
    vec![n]
}

/// One-field row holding a string payload.
pub fn srow(s: &str) -> Vec<u8> {
    encode_row(&[s.as_bytes()])
}

/// One-field row holding an integer counter.
pub fn crow(v: i64) -> Vec<u8> {
    encode_row(&[&int_field(v)])
}

pub fn rep(key: u8, version: i64, payload: &str) -> Statement {
    Statement::replace(bkey(key), srow(payload), version)
}

pub fn del(key: u8, version: i64) -> Statement {
    Statement::delete(bkey(key), version)
}

/// UPSERT incrementing the counter field, with `default` as its row image.
pub fn add_ups(key: u8, version: i64, default: i64, delta: i64) -> Statement {
    Statement::upsert(
        bkey(key),
        crow(default),
        vec![UpdateOp::Add { field: 0, delta }],
        version,
    )
}

/// A primary-index iterator with no column mask.
pub fn new_iter(is_last_level: bool, oldest_version: i64) -> WriteIterator {
    WriteIterator::new(
        Arc::new(BytewiseKeys),
        Arc::new(RowApplier),
        true,
        0,
        is_last_level,
        oldest_version,
    )
}

pub fn new_secondary_iter(index_column_mask: u64, oldest_version: i64) -> WriteIterator {
    WriteIterator::new(
        Arc::new(BytewiseKeys),
        Arc::new(RowApplier),
        false,
        index_column_mask,
        false,
        oldest_version,
    )
}

/// Drains the iterator, cloning each yielded statement.
pub fn drain(iter: &mut WriteIterator) -> Vec<Statement> {
    let mut out = Vec::new();
    while let Some(s) = iter.next().expect("drain without errors") {
        out.push(s.clone());
    }
    out
}

/// A scripted stream over a fixed statement list, with optional error
/// injection and a close flag for teardown assertions.
pub struct StubStream {
    items: Vec<StmtHandle>,
    pos: usize,
    fail_at: Option<usize>,
    closed: Arc<AtomicBool>,
}

impl StubStream {
    pub fn new(items: Vec<StmtHandle>) -> Self {
        Self {
            items,
            pos: 0,
            fail_at: None,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Memory-level flavor: every statement is shared.
    pub fn shared(stmts: Vec<Statement>) -> Self {
        Self::new(
            stmts
                .into_iter()
                .map(|s| StmtHandle::Shared(Arc::new(s)))
                .collect(),
        )
    }

    /// Shared flavor over statements the test keeps references to.
    pub fn from_arcs(stmts: Vec<Arc<Statement>>) -> Self {
        Self::new(stmts.into_iter().map(StmtHandle::Shared).collect())
    }

    /// Run flavor: every statement is handed over by value.
    pub fn owned(stmts: Vec<Statement>) -> Self {
        Self::new(stmts.into_iter().map(StmtHandle::Owned).collect())
    }

    /// Makes the `pos`-th advance fail (0-based).
    pub fn fail_at(mut self, pos: usize) -> Self {
        self.fail_at = Some(pos);
        self
    }

    pub fn closed_flag(&self) -> Arc<AtomicBool> {
        self.closed.clone()
    }
}

impl StmtStream for StubStream {
    fn next(&mut self) -> anyhow::Result<Option<StmtHandle>> {
        if self.closed.load(Ordering::SeqCst) {
            return Ok(None);
        }
        if self.fail_at == Some(self.pos) {
            anyhow::bail!("injected stream failure at {}", self.pos);
        }
        let item = self.items.get(self.pos).cloned();
        if item.is_some() {
            self.pos += 1;
        }
        Ok(item)
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Applier double that logs every fold before delegating to [`RowApplier`].
pub struct RecordingApplier {
    pub log: Arc<Mutex<Vec<String>>>,
}

impl RecordingApplier {
    pub fn new() -> (Arc<Self>, Arc<Mutex<Vec<String>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        (Arc::new(Self { log: log.clone() }), log)
    }
}

impl UpsertApplier for RecordingApplier {
    fn apply(
        &self,
        upsert: &Statement,
        base: Option<&Statement>,
        key_def: &dyn KeyDef,
        is_primary: bool,
    ) -> Result<Arc<Statement>, ApplyError> {
        let entry = match base {
            None => format!("v{} onto none", upsert.version()),
            Some(b) => format!("v{} onto {:?}@v{}", upsert.version(), b.stmt_type(), b.version()),
        };
        self.log.lock().expect("log lock").push(entry);
        RowApplier.apply(upsert, base, key_def, is_primary)
    }
}

/// Applier double that always fails.
pub struct FailingApplier;

impl UpsertApplier for FailingApplier {
    fn apply(
        &self,
        _upsert: &Statement,
        _base: Option<&Statement>,
        _key_def: &dyn KeyDef,
        _is_primary: bool,
    ) -> Result<Arc<Statement>, ApplyError> {
        Err(ApplyError::NotInteger(0))
    }
}

/// Convenience matcher for error kinds.
pub fn is_stream_error(e: &WriteIterError) -> bool {
    matches!(e, WriteIterError::Stream(_))
}
