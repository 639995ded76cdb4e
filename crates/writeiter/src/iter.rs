//! The write iterator.

use std::cmp::Ordering;
use std::sync::Arc;

use memlevel::{MemLevel, MemStream};
use run::{Run, RunStream};
use stmt::{KeyDef, Statement, StmtHandle, StmtStream, StmtType, UpsertApplier};

use crate::heap::{Slot, SrcHeap};
use crate::WriteIterError;

/// A registered input: one stream plus its current statement. A source with
/// `current == None` has exhausted and is no longer in the heap.
struct WriteSource {
    stream: Box<dyn StmtStream>,
    current: Option<StmtHandle>,
}

/// An update that did not touch any of the index's columns produces a
/// REPLACE/DELETE that a secondary index can drop during dump: the indexed
/// key did not change. Primary indexes store non-indexed fields too, so
/// they never skip.
fn can_skip_update(index_column_mask: u64, stmt_column_mask: u64) -> bool {
    index_column_mask & stmt_column_mask == 0
}

/// Heap order over slots: key ascending under the key definition, then
/// version descending (newer first), then terminal statements before
/// deferred updates. The key-boundary sentinel borrows the iterator's
/// current key and loses to every real statement of that key.
fn slot_less(
    sources: &[Option<WriteSource>],
    current: Option<&Statement>,
    key_def: &dyn KeyDef,
    a: Slot,
    b: Slot,
) -> bool {
    debug_assert!(!(a == Slot::KeyBound && b == Slot::KeyBound));
    let stmt_of = |s: Slot| -> &Statement {
        match s {
            Slot::KeyBound => current.expect("boundary only exists during a squash"),
            Slot::Src(i) => sources[i]
                .as_ref()
                .and_then(|src| src.current.as_deref())
                .expect("heap entries have a current statement"),
        }
    };
    let sa = stmt_of(a);
    let sb = stmt_of(b);

    match key_def.compare(sa.key(), sb.key()) {
        Ordering::Less => return true,
        Ordering::Greater => return false,
        Ordering::Equal => {}
    }

    // The boundary sits after every real statement of its key.
    if a == Slot::KeyBound {
        return false;
    }
    if b == Slot::KeyBound {
        return true;
    }

    match sa.version().cmp(&sb.version()) {
        Ordering::Greater => return true,
        Ordering::Less => return false,
        Ordering::Equal => {}
    }

    // Equal key and version: terminal statements outrank deferred updates.
    sa.is_terminal() && !sb.is_terminal()
}

/// Merges several ordered statement sources — memory levels and runs — into
/// the single ordered stream a dump or compaction writes out.
///
/// For each key, statements arrive newest first. Anything above the oldest
/// visible version passes through verbatim; at and below that horizon the
/// newest statement is kept, deferred updates are squashed into it, and the
/// level policy drops redundant tombstones and no-op secondary-index
/// updates.
///
/// Single-owner and pull-only: one caller drives [`next`](Self::next) until
/// it yields `None`, then drops the iterator (or drops it early — teardown
/// is always safe and releases every source).
pub struct WriteIterator {
    /// Source table. Slots are cleared as streams exhaust; indices stay
    /// stable because the heap refers to sources by index.
    sources: Vec<Option<WriteSource>>,
    heap: SrcHeap,
    /// The statement to be yielded by the ongoing `next` call, or the one
    /// yielded by the previous call.
    current: Option<StmtHandle>,
    key_def: Arc<dyn KeyDef>,
    applier: Arc<dyn UpsertApplier>,
    /// Set if this iterator writes a primary index.
    is_primary: bool,
    /// Columns the target index depends on.
    index_column_mask: u64,
    /// No level older than the one being written exists.
    is_last_level: bool,
    /// Oldest version still visible to an active reader; newer statements
    /// are preserved verbatim.
    oldest_version: i64,
}

impl WriteIterator {
    /// Creates an empty iterator. Register inputs with
    /// [`add_memory`](Self::add_memory) / [`add_run`](Self::add_run) before
    /// the first [`next`](Self::next) call.
    pub fn new(
        key_def: Arc<dyn KeyDef>,
        applier: Arc<dyn UpsertApplier>,
        is_primary: bool,
        index_column_mask: u64,
        is_last_level: bool,
        oldest_version: i64,
    ) -> Self {
        Self {
            sources: Vec::new(),
            heap: SrcHeap::new(),
            current: None,
            key_def,
            applier,
            is_primary,
            index_column_mask,
            is_last_level,
            oldest_version,
        }
    }

    /// Registers a memory level as a source.
    pub fn add_memory(&mut self, level: Arc<MemLevel>) -> Result<(), WriteIterError> {
        self.add_stream(Box::new(MemStream::open(level)))
    }

    /// Registers an on-disk run as a source.
    pub fn add_run(&mut self, run: &Run) -> Result<(), WriteIterError> {
        let stream = RunStream::open(run).map_err(WriteIterError::Stream)?;
        self.add_stream(Box::new(stream))
    }

    /// Registers an arbitrary stream as a source. A stream that is empty on
    /// its first advance is closed and discarded silently; on any failure
    /// the stream is closed and the error propagates, leaving the iterator
    /// usable without that source.
    pub fn add_stream(&mut self, mut stream: Box<dyn StmtStream>) -> Result<(), WriteIterError> {
        let first = match stream.next() {
            Ok(first) => first,
            Err(e) => {
                stream.close();
                return Err(WriteIterError::Stream(e));
            }
        };
        let Some(first) = first else {
            stream.close();
            return Ok(());
        };

        if self.sources.try_reserve(1).is_err() {
            stream.close();
            return Err(WriteIterError::OutOfMemory("source table"));
        }
        let idx = self.sources.len();
        self.sources.push(Some(WriteSource {
            stream,
            current: Some(first),
        }));

        let sources = &self.sources;
        let current = self.current.as_deref();
        let key_def = &*self.key_def;
        if self
            .heap
            .push(Slot::Src(idx), |a, b| {
                slot_less(sources, current, key_def, a, b)
            })
            .is_err()
        {
            let mut src = self.sources.pop().flatten().expect("just pushed");
            src.stream.close();
            return Err(WriteIterError::OutOfMemory("source heap"));
        }
        Ok(())
    }

    /// Number of live (non-exhausted) sources.
    #[must_use]
    pub fn source_count(&self) -> usize {
        self.sources.iter().filter(|s| s.is_some()).count()
    }

    #[cfg(test)]
    pub(crate) fn heap_len(&self) -> usize {
        self.heap.len()
    }

    /// The single chokepoint updating the iterator's current statement.
    /// Dropping the previous handle releases its reference, if it held one.
    fn set_current(&mut self, stmt: Option<StmtHandle>) {
        if let (Some(prev), Some(new)) = (self.current.as_deref(), stmt.as_deref()) {
            debug_assert!(
                self.key_def.compare(prev.key(), new.key()) == Ordering::Less
                    || prev.version() >= new.version(),
                "must advance in key or fall in version"
            );
        }
        self.current = stmt;
    }

    /// Advances the top source past its current statement: re-sifts the top
    /// on success, removes and destroys the source on exhaustion. On a
    /// stream error the source stays registered and is destroyed at
    /// teardown.
    fn step(&mut self) -> Result<(), WriteIterError> {
        let top = self.heap.peek().expect("step on a non-empty heap");
        let Slot::Src(idx) = top else {
            unreachable!("the key boundary is never stepped");
        };

        let next = self.sources[idx]
            .as_mut()
            .expect("heap entries are live sources")
            .stream
            .next();
        match next {
            Err(e) => Err(WriteIterError::Stream(e)),
            Ok(Some(handle)) => {
                self.sources[idx]
                    .as_mut()
                    .expect("live source")
                    .current = Some(handle);
                let sources = &self.sources;
                let current = self.current.as_deref();
                let key_def = &*self.key_def;
                self.heap
                    .sift_top(|a, b| slot_less(sources, current, key_def, a, b));
                Ok(())
            }
            Ok(None) => {
                {
                    let sources = &self.sources;
                    let current = self.current.as_deref();
                    let key_def = &*self.key_def;
                    self.heap
                        .remove(Slot::Src(idx), |a, b| slot_less(sources, current, key_def, a, b));
                }
                let mut src = self.sources[idx].take().expect("live source");
                src.stream.close();
                Ok(())
            }
        }
    }

    /// Folds every remaining statement of the current key into the current
    /// statement and leaves the heap positioned past that key.
    ///
    /// The key-boundary sentinel marks where statements of the next key
    /// begin: reaching it ends the squash without another key comparison.
    /// While the current statement is still an UPSERT, each real statement
    /// under the boundary serves as a fold base; at the boundary itself the
    /// upsert is finalized without a base if no older level remains below.
    fn squash_current_key(&mut self) -> Result<(), WriteIterError> {
        debug_assert!(self.current.is_some());
        {
            let sources = &self.sources;
            let current = self.current.as_deref();
            let key_def = &*self.key_def;
            if self
                .heap
                .push(Slot::KeyBound, |a, b| {
                    slot_less(sources, current, key_def, a, b)
                })
                .is_err()
            {
                return Err(WriteIterError::OutOfMemory("source heap"));
            }
        }

        let result = loop {
            let top = self.heap.peek().expect("heap holds at least the boundary");
            let at_bound = top == Slot::KeyBound;

            let current_is_upsert = self
                .current
                .as_deref()
                .map(Statement::stmt_type)
                == Some(StmtType::Upsert);
            if current_is_upsert && (!at_bound || self.is_last_level) {
                let applied = {
                    let base = match top {
                        Slot::KeyBound => None,
                        Slot::Src(i) => self.sources[i]
                            .as_ref()
                            .and_then(|src| src.current.as_deref()),
                    };
                    self.applier.apply(
                        self.current.as_deref().expect("checked above"),
                        base,
                        &*self.key_def,
                        self.is_primary,
                    )
                };
                match applied {
                    Ok(stmt) => self.set_current(Some(StmtHandle::Shared(stmt))),
                    Err(e) => break Err(WriteIterError::Apply(e)),
                }
            }

            if at_bound {
                break Ok(());
            }
            if let Err(e) = self.step() {
                break Err(e);
            }
        };

        // The boundary never survives a squash, error or not.
        let sources = &self.sources;
        let current = self.current.as_deref();
        let key_def = &*self.key_def;
        self.heap
            .remove(Slot::KeyBound, |a, b| slot_less(sources, current, key_def, a, b));
        result
    }

    /// Returns the next statement to write, or `None` at end of stream.
    ///
    /// The returned borrow lives until the next call on the iterator. After
    /// an error the iterator is only good for teardown.
    pub fn next(&mut self) -> Result<Option<&Statement>, WriteIterError> {
        loop {
            let Some(top) = self.heap.peek() else {
                return Ok(None);
            };
            let Slot::Src(idx) = top else {
                unreachable!("no squash is in progress between next calls");
            };

            // Capture the top statement and immediately advance its source.
            // The handle transfers wholesale, so a run-decoded statement is
            // materialized by the move itself.
            let candidate = self.sources[idx]
                .as_mut()
                .expect("heap entries are live sources")
                .current
                .take()
                .expect("heap entries have a current statement");
            self.set_current(Some(candidate));
            self.step()?;

            let stmt = self.current.as_deref().expect("set above");
            if stmt.version() > self.oldest_version {
                // Still visible to an active reader: preserved verbatim.
                break;
            }

            // The candidate is the newest version at or below the horizon.
            if stmt.is_terminal()
                && !self.is_primary
                && stmt.column_mask() != 0
                && can_skip_update(self.index_column_mask, stmt.column_mask())
            {
                continue;
            }

            self.squash_current_key()?;

            let stmt = self.current.as_deref().expect("survives a squash");
            if stmt.stmt_type() == StmtType::Delete && self.is_last_level {
                // Nothing older remains for the tombstone to shadow.
                continue;
            }
            break;
        }
        Ok(self.current.as_deref())
    }
}

impl Drop for WriteIterator {
    fn drop(&mut self) {
        self.set_current(None);
        for slot in self.sources.iter_mut() {
            if let Some(mut src) = slot.take() {
                src.current = None;
                src.stream.close();
            }
        }
    }
}
