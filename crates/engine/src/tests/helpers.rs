use crate::Index;
use run::{Run, RunStream};
use std::path::Path;
use std::sync::Arc;
use stmt::row::{encode_row, int_field};
use stmt::{BytewiseKeys, RowApplier, Statement, StmtStream};

/// A primary-index `Index` with auto-compaction disabled, so tests can count
/// runs deterministically.
pub fn open_index(dir: &Path) -> Index {
    let mut idx = Index::open(dir, Arc::new(BytewiseKeys), Arc::new(RowApplier), true, 0)
        .expect("open index");
    idx.set_run_compaction_trigger(0);
    idx
}

pub fn crow(v: i64) -> Vec<u8> {
    encode_row(&[&int_field(v)])
}

pub fn srow(s: &str) -> Vec<u8> {
    encode_row(&[s.as_bytes()])
}

/// Reads a whole run back into memory.
pub fn read_all(run: &Run) -> Vec<Statement> {
    let mut stream = RunStream::open(run).expect("open run stream");
    let mut out = Vec::new();
    while let Some(h) = stream.next().expect("read run") {
        out.push((*h).clone());
    }
    out
}
