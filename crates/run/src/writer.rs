//! Streaming run writer.

use anyhow::{bail, Result};
use byteorder::{LittleEndian, WriteBytesExt};
use crc32fast::Hasher as Crc32;
use std::fs::{rename, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::format::{encode_body, RUN_MAGIC};
use crate::Run;
use stmt::Statement;

/// Writes a run file one statement at a time.
///
/// Statements must already be merged and ordered — the writer's only caller
/// is a dump or compaction draining a write iterator. The file is written to
/// a `.tmp` sibling, fsynced, and atomically renamed into place by
/// [`finish`](RunWriter::finish). A writer dropped before `finish` removes
/// its temp file.
pub struct RunWriter {
    /// `None` only once `finish` has taken the handle (or in `Drop`).
    file: Option<BufWriter<File>>,
    path: PathBuf,
    tmp_path: PathBuf,
    /// Reusable scratch buffer to avoid allocation on every record.
    buf: Vec<u8>,
    count: u64,
    max_version: i64,
}

impl RunWriter {
    /// Creates the temp file for a run that will live at `path`.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let tmp_path = path.with_extension("run.tmp");
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;
        Ok(Self {
            file: Some(BufWriter::new(file)),
            path,
            tmp_path,
            buf: Vec::with_capacity(256),
            count: 0,
            max_version: i64::MIN,
        })
    }

    /// Appends one statement record.
    ///
    /// Layout: `[body_len: u32 LE][crc32: u32 LE][body bytes...]` — the CRC
    /// covers the body only.
    pub fn push(&mut self, statement: &Statement) -> Result<()> {
        self.buf.clear();
        encode_body(&mut self.buf, statement);

        let mut hasher = Crc32::new();
        hasher.update(&self.buf);
        let crc = hasher.finalize();

        let file = self.file.as_mut().expect("writer open until finish");
        file.write_u32::<LittleEndian>(self.buf.len() as u32)?;
        file.write_u32::<LittleEndian>(crc)?;
        file.write_all(&self.buf)?;

        self.count += 1;
        self.max_version = self.max_version.max(statement.version());
        Ok(())
    }

    /// Number of statements pushed so far.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Writes the footer, fsyncs, and atomically renames the run into place.
    ///
    /// # Errors
    ///
    /// Refuses to finalize an empty run; fails on any I/O error. The temp
    /// file is removed on every failure path.
    pub fn finish(mut self) -> Result<Run> {
        if self.count == 0 {
            // Drop removes the temp file.
            bail!("refusing to write an empty run");
        }

        let write_res = (|| {
            let file = self.file.as_mut().expect("writer open until finish");
            file.write_u64::<LittleEndian>(self.count)?;
            file.write_i64::<LittleEndian>(self.max_version)?;
            file.write_u32::<LittleEndian>(RUN_MAGIC)?;
            file.flush()?;
            file.get_ref().sync_all()?;
            anyhow::Ok(())
        })();

        // Close the handle before rename or cleanup.
        drop(self.file.take());
        if let Err(e) = write_res {
            let _ = std::fs::remove_file(&self.tmp_path);
            return Err(e);
        }
        if let Err(e) = rename(&self.tmp_path, &self.path) {
            let _ = std::fs::remove_file(&self.tmp_path);
            return Err(e.into());
        }

        Ok(Run::from_parts(
            std::mem::take(&mut self.path),
            self.count,
            self.max_version,
        ))
    }
}

impl Drop for RunWriter {
    fn drop(&mut self) {
        // An unfinished writer leaves no partial file behind.
        if self.file.take().is_some() {
            let _ = std::fs::remove_file(&self.tmp_path);
        }
    }
}
