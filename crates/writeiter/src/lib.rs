//! # WriteIter — The Dump/Compaction Merge Iterator
//!
//! Merges several ordered statement sources into the single ordered stream
//! that a dump or compaction writes out as a new run.
//!
//! ```text
//! memory level ──MemStream──┐
//! memory level ──MemStream──┤     ┌──────────────┐
//! run ───────────RunStream──┼────▶│ source heap  │──▶ next()
//! run ───────────RunStream──┘     │ (key asc,    │      │
//!                                 │  version dsc)│      ▼
//!                                 └──────────────┘  horizon check
//!                                                       │
//!                                          ┌────────────┴───────────┐
//!                                          ▼                        ▼
//!                                   above horizon:          at/below horizon:
//!                                   yield verbatim          squash upserts,
//!                                                           drop no-op
//!                                                           secondary updates
//!                                                           and last-level
//!                                                           tombstones
//! ```
//!
//! ## What "squash" means
//!
//! All statements at or below the oldest visible version collapse into at
//! most one statement per key: the newest one, with any chain of deferred
//! updates (UPSERTs) folded down through the injected
//! [`UpsertApplier`](stmt::UpsertApplier). The squash is bounded by a
//! key-boundary sentinel pushed into the source heap, so the loop never
//! compares keys itself — when the sentinel surfaces, every remaining
//! statement belongs to a later key.
//!
//! ## Level policy
//!
//! Writing the *last* level (nothing older below) licenses two elisions:
//! an unresolved UPSERT is finalized without a base, and a DELETE is dropped
//! entirely — there is nothing left for it to shadow. Secondary indexes
//! additionally drop REPLACE/DELETE statements whose column mask proves the
//! indexed columns never changed.
//!
//! ## Ownership
//!
//! Memory-level statements are shared (`Arc`); run statements are owned by
//! whoever holds the decoded handle. The iterator owns at most one current
//! statement at a time, updated through a single chokepoint, and releases
//! everything on drop — after any error, teardown is the only valid
//! operation and it never fails.

mod heap;
mod iter;

pub use iter::WriteIterator;

use thiserror::Error;

/// Failures surfaced by the write iterator.
#[derive(Debug, Error)]
pub enum WriteIterError {
    /// Bookkeeping growth failed (source table or heap).
    #[error("out of memory: {0}")]
    OutOfMemory(&'static str),

    /// An underlying source failed to read or decode.
    #[error("stream error: {0}")]
    Stream(anyhow::Error),

    /// Folding a deferred update failed.
    #[error("upsert apply failed: {0}")]
    Apply(#[from] stmt::ApplyError),
}

#[cfg(test)]
mod tests;
