use super::helpers::*;
use memlevel::MemLevel;
use run::{Run, RunWriter};
use std::sync::Arc;
use stmt::{BytewiseKeys, Statement};
use tempfile::tempdir;

// -------------------- Basic merge --------------------

#[test]
fn simple_merge_across_two_sources() {
    let mut it = new_iter(false, 10);
    it.add_stream(Box::new(StubStream::shared(vec![
        rep(1, 12, "a1"),
        rep(3, 12, "a3"),
    ])))
    .unwrap();
    it.add_stream(Box::new(StubStream::shared(vec![rep(2, 12, "b2")])))
        .unwrap();

    let out = drain(&mut it);
    let keys: Vec<&[u8]> = out.iter().map(Statement::key).collect();
    assert_eq!(keys, vec![&[1u8][..], &[2u8][..], &[3u8][..]]);
    assert_eq!(out[0].row(), srow("a1"));
    assert_eq!(out[1].row(), srow("b2"));
    assert_eq!(out[2].row(), srow("a3"));
}

#[test]
fn versions_above_horizon_are_all_preserved_newest_first() {
    let mut it = new_iter(false, 10);
    it.add_stream(Box::new(StubStream::shared(vec![rep(1, 15, "new")])))
        .unwrap();
    it.add_stream(Box::new(StubStream::shared(vec![rep(1, 14, "old")])))
        .unwrap();

    let out = drain(&mut it);
    assert_eq!(out.len(), 2);
    assert_eq!(out[0].version(), 15);
    assert_eq!(out[1].version(), 14);
}

#[test]
fn empty_iterator_yields_none() {
    let mut it = new_iter(false, 10);
    assert!(it.next().unwrap().is_none());
    // End of stream is sticky.
    assert!(it.next().unwrap().is_none());
}

#[test]
fn empty_source_is_discarded_silently() {
    let mut it = new_iter(false, 10);
    it.add_stream(Box::new(StubStream::shared(vec![]))).unwrap();
    assert_eq!(it.source_count(), 0);
    assert!(it.next().unwrap().is_none());
}

// -------------------- Ordering invariants --------------------

#[test]
fn output_is_monotone_in_key_and_version() {
    // Three interleaved sources, everything above the horizon so every
    // statement passes through.
    let mut it = new_iter(false, 0);
    it.add_stream(Box::new(StubStream::shared(vec![
        rep(1, 30, "x"),
        rep(4, 28, "x"),
        rep(7, 31, "x"),
    ])))
    .unwrap();
    it.add_stream(Box::new(StubStream::owned(vec![
        rep(1, 25, "y"),
        rep(4, 33, "y"),
        rep(5, 21, "y"),
    ])))
    .unwrap();
    it.add_stream(Box::new(StubStream::shared(vec![del(4, 40), del(6, 22)])))
        .unwrap();

    let out = drain(&mut it);
    assert_eq!(out.len(), 8);
    for pair in out.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        assert!(a.key() <= b.key());
        if a.key() == b.key() {
            assert!(a.version() > b.version(), "equal keys fall in version");
        }
    }
}

#[test]
fn heap_never_exceeds_live_sources_plus_boundary() {
    let mut it = new_iter(false, 0);
    for src in 0..4u8 {
        it.add_stream(Box::new(StubStream::shared(vec![
            rep(src, 10 + i64::from(src), "v"),
            rep(src + 4, 20 + i64::from(src), "v"),
        ])))
        .unwrap();
    }

    while it.next().unwrap().is_some() {
        assert!(it.heap_len() <= it.source_count() + 1);
    }
    assert_eq!(it.heap_len(), 0);
    assert_eq!(it.source_count(), 0);
}

// -------------------- Real sources --------------------

#[test]
fn merges_a_memory_level_with_a_run_file() {
    let dir = tempdir().unwrap();

    let mut level = MemLevel::new(Arc::new(BytewiseKeys));
    level.insert(rep(2, 31, "mem"));
    level.insert(rep(1, 32, "mem"));

    let path = dir.path().join("0001.run");
    let mut w = RunWriter::create(&path).unwrap();
    w.push(&rep(1, 12, "disk")).unwrap();
    w.push(&rep(3, 13, "disk")).unwrap();
    let run: Run = w.finish().unwrap();

    let mut it = new_iter(false, 20);
    it.add_memory(Arc::new(level)).unwrap();
    it.add_run(&run).unwrap();

    let out = drain(&mut it);
    // key 1 keeps both statements: version 32 is above the horizon, and
    // version 12 is the newest version an old reader can still see.
    let summary: Vec<(u8, i64)> = out.iter().map(|s| (s.key()[0], s.version())).collect();
    assert_eq!(summary, vec![(1, 32), (1, 12), (2, 31), (3, 13)]);
}
