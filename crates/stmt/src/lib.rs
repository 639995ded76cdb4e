//! # Stmt — Statement Data Model
//!
//! The shared vocabulary of the UndertowKV write path. Every component —
//! memory levels, on-disk runs, the write iterator, the engine — speaks in
//! [`Statement`]s:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ Statement                                                │
//! │                                                          │
//! │ key (opaque bytes, ordered by a KeyDef)                  │
//! │ version (i64, strictly increasing per commit)            │
//! │ type: REPLACE | DELETE | UPSERT                          │
//! │ column_mask (u64, nonzero only for update-produced       │
//! │              REPLACE/DELETE)                             │
//! │ row (encoded row image; empty for DELETE)                │
//! │ ops (deferred update operations; UPSERT only)            │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module     | Purpose                                                |
//! |------------|--------------------------------------------------------|
//! | [`lib.rs`] | `Statement`, `StmtType`, `StmtHandle`, `StmtStream`    |
//! | [`key`]    | `KeyDef` ordering trait + bytewise default             |
//! | [`row`]    | Length-prefixed row codec                              |
//! | [`upsert`] | `UpdateOp`, `UpsertApplier` trait, `RowApplier`        |
//!
//! ## Ownership discipline
//!
//! Statements produced by a memory level are heap-allocated and shared
//! (`Arc`); statements decoded from a run live only until the producing
//! stream advances again. [`StmtHandle`] makes the distinction explicit so
//! that a consumer holding a statement across an advance must either clone
//! the `Arc` (cheap) or take ownership of the decoded value (materialize).

pub mod key;
pub mod row;
pub mod upsert;

pub use key::{BytewiseKeys, KeyDef};
pub use row::{decode_row, encode_row, field_as_i64, int_field, RowError};
pub use upsert::{ApplyError, RowApplier, UpdateOp, UpsertApplier};

use std::ops::Deref;
use std::sync::Arc;

/// Statement type. The closed set of mutations the write path understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StmtType {
    /// Full row replacement (also the result of an insert).
    Replace,
    /// Tombstone. Shadows all older versions of the key.
    Delete,
    /// Deferred update: must be folded onto an older statement (or onto
    /// nothing, at the last level) to produce a terminal REPLACE/DELETE.
    Upsert,
}

/// A single versioned mutation of one key.
///
/// Immutable once constructed. The per-type constructors enforce the shape
/// invariants: DELETE carries no row, only UPSERT carries ops, and only
/// REPLACE/DELETE may carry a nonzero column mask.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    key: Vec<u8>,
    version: i64,
    stmt_type: StmtType,
    column_mask: u64,
    row: Vec<u8>,
    ops: Vec<UpdateOp>,
}

impl Statement {
    /// Creates a REPLACE statement carrying a full row image.
    pub fn replace(key: Vec<u8>, row: Vec<u8>, version: i64) -> Self {
        Self {
            key,
            version,
            stmt_type: StmtType::Replace,
            column_mask: 0,
            row,
            ops: Vec::new(),
        }
    }

    /// Creates a DELETE tombstone.
    pub fn delete(key: Vec<u8>, version: i64) -> Self {
        Self {
            key,
            version,
            stmt_type: StmtType::Delete,
            column_mask: 0,
            row: Vec::new(),
            ops: Vec::new(),
        }
    }

    /// Creates an UPSERT: a default row image plus the deferred operations
    /// to apply if an older version of the key exists.
    pub fn upsert(key: Vec<u8>, row: Vec<u8>, ops: Vec<UpdateOp>, version: i64) -> Self {
        Self {
            key,
            version,
            stmt_type: StmtType::Upsert,
            column_mask: 0,
            row,
            ops,
        }
    }

    /// Attaches the column mask of the update operation that produced this
    /// statement. Meaningful only for REPLACE/DELETE; an UPSERT never
    /// carries a mask.
    #[must_use]
    pub fn with_column_mask(mut self, mask: u64) -> Self {
        debug_assert!(self.stmt_type != StmtType::Upsert);
        self.column_mask = mask;
        self
    }

    #[must_use]
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    #[must_use]
    pub fn version(&self) -> i64 {
        self.version
    }

    #[must_use]
    pub fn stmt_type(&self) -> StmtType {
        self.stmt_type
    }

    /// Column mask of the update that produced this statement, or zero.
    #[must_use]
    pub fn column_mask(&self) -> u64 {
        self.column_mask
    }

    /// Encoded row image. Empty for DELETE.
    #[must_use]
    pub fn row(&self) -> &[u8] {
        &self.row
    }

    /// Deferred update operations. Empty unless this is an UPSERT.
    #[must_use]
    pub fn ops(&self) -> &[UpdateOp] {
        &self.ops
    }

    /// `true` for REPLACE and DELETE, `false` for UPSERT.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.stmt_type != StmtType::Upsert
    }

    /// Rough in-memory footprint, used for dump-threshold accounting.
    #[must_use]
    pub fn approx_size(&self) -> usize {
        self.key.len() + self.row.len()
    }
}

/// A statement as handed out by a stream.
///
/// `Shared` statements come from memory levels and are reference-counted;
/// holding one past the stream's next advance is a cheap `Arc` clone.
/// `Owned` statements were decoded from a run into this handle; the handle
/// is the only owner, so retaining the statement means keeping (or cloning)
/// the handle itself.
#[derive(Debug, Clone)]
pub enum StmtHandle {
    Shared(Arc<Statement>),
    Owned(Statement),
}

impl StmtHandle {
    /// `true` when the underlying statement is reference-counted.
    #[must_use]
    pub fn is_shared(&self) -> bool {
        matches!(self, StmtHandle::Shared(_))
    }
}

impl Deref for StmtHandle {
    type Target = Statement;

    fn deref(&self) -> &Statement {
        match self {
            StmtHandle::Shared(s) => s,
            StmtHandle::Owned(s) => s,
        }
    }
}

impl From<Arc<Statement>> for StmtHandle {
    fn from(s: Arc<Statement>) -> Self {
        StmtHandle::Shared(s)
    }
}

/// A lazy, ordered, pull-only producer of statements over one source.
///
/// Implementations yield statements in (key ascending, version descending)
/// order and return `None` once exhausted. No fairness or blocking
/// semantics are assumed: `next` may perform I/O and may fail.
pub trait StmtStream {
    /// Advances to the next statement. `Ok(None)` means the stream is
    /// exhausted; after that, `next` must keep returning `Ok(None)`.
    fn next(&mut self) -> anyhow::Result<Option<StmtHandle>>;

    /// Releases underlying resources. Idempotent; implementations also
    /// invoke it from `Drop`.
    fn close(&mut self);
}

#[cfg(test)]
mod tests;
