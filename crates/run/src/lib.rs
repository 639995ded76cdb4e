//! # Run — Immutable Sorted On-Disk Statement File
//!
//! A run is the on-disk stage of the write path: the ordered, merged output
//! of a dump or compaction. Runs are *write-once, read-many* — once renamed
//! into place they are never modified, only replaced by a later compaction.
//!
//! ## File layout
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │ DATA SECTION (ordered statement records)                      │
//! │                                                               │
//! │ body_len (u32) | crc32 (u32) | body                           │
//! │                                                               │
//! │ body:                                                         │
//! │   key_len (u32) | key | version (i64) | type (u8)             │
//! │   column_mask (u64) | row_len (u32) | row                     │
//! │   UPSERT only: ops_count (u32), then per op:                  │
//! │     tag (u8) | field (u32) | value_len (u32) + value  (assign)│
//! │     tag (u8) | field (u32) | delta (i64)              (add)   │
//! │                                                               │
//! │ ... repeated for each statement ...                           │
//! │                                                               │
//! │ The CRC32 covers the body only. body_len excludes itself      │
//! │ and the CRC.                                                  │
//! ├───────────────────────────────────────────────────────────────┤
//! │ FOOTER (always last 20 bytes)                                 │
//! │                                                               │
//! │ entry_count (u64 LE) | max_version (i64 LE)                   │
//! │ magic (u32 LE) "RUN1"                                         │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! All integers are little-endian. Statements appear in (key ascending,
//! version descending) order — the writer trusts its input, which is always
//! a write iterator.
//!
//! Consumers read runs strictly sequentially through [`RunStream`]; there is
//! no index section because the write path never does point lookups here.

mod format;
mod stream;
mod writer;

pub use format::{FOOTER_BYTES, RUN_MAGIC};
pub use stream::RunStream;
pub use writer::RunWriter;

use anyhow::{bail, Result};
use byteorder::{LittleEndian, ReadBytesExt};
use std::fs::File;
use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// An open handle to a run file. Validates the footer on open; streams are
/// opened separately so several consumers can scan the same run.
#[derive(Debug, Clone)]
pub struct Run {
    path: PathBuf,
    entry_count: u64,
    max_version: i64,
}

impl Run {
    /// Opens a run file and validates its footer.
    ///
    /// # Errors
    ///
    /// Fails if the file is shorter than a footer, the magic does not match,
    /// or the file cannot be read.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut f = File::open(&path)?;
        let filesize = f.metadata()?.len();
        if filesize < FOOTER_BYTES {
            bail!("run file too small: {} bytes", filesize);
        }

        f.seek(SeekFrom::Start(filesize - FOOTER_BYTES))?;
        let entry_count = f.read_u64::<LittleEndian>()?;
        let max_version = f.read_i64::<LittleEndian>()?;
        let magic = f.read_u32::<LittleEndian>()?;
        if magic != RUN_MAGIC {
            bail!("bad run magic: {:#010x}", magic);
        }

        Ok(Self {
            path,
            entry_count,
            max_version,
        })
    }

    pub(crate) fn from_parts(path: PathBuf, entry_count: u64, max_version: i64) -> Self {
        Self {
            path,
            entry_count,
            max_version,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of statements in the data section.
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    /// Largest statement version stored in this run.
    #[must_use]
    pub fn max_version(&self) -> i64 {
        self.max_version
    }
}
