//! Sequential run stream.

use anyhow::{bail, Context, Result};
use byteorder::{LittleEndian, ReadBytesExt};
use crc32fast::Hasher as Crc32;
use std::fs::File;
use std::io::{BufReader, Read};

use crate::format::{decode_body, MAX_BODY_BYTES};
use crate::Run;
use stmt::{StmtHandle, StmtStream};

/// Scans a run's data section front to back, decoding one statement per
/// advance.
///
/// The decoded statement is handed over as an owned handle: the stream keeps
/// nothing, so the consumer decides whether to keep it (materialize) or let
/// it go before the next advance.
pub struct RunStream {
    /// `None` once closed or exhausted.
    file: Option<BufReader<File>>,
    /// Records left to read, per the footer.
    remaining: u64,
    /// Reusable body buffer.
    buf: Vec<u8>,
}

impl RunStream {
    /// Opens a stream over `run`'s data section.
    pub fn open(run: &Run) -> Result<Self> {
        let file = File::open(run.path())
            .with_context(|| format!("open run {}", run.path().display()))?;
        Ok(Self {
            file: Some(BufReader::new(file)),
            remaining: run.entry_count(),
            buf: Vec::new(),
        })
    }

    fn read_record(&mut self) -> Result<StmtHandle> {
        let file = self.file.as_mut().expect("stream open");

        let body_len = file.read_u32::<LittleEndian>()? as usize;
        if body_len > MAX_BODY_BYTES {
            bail!("corrupt run: record body of {} bytes", body_len);
        }
        let stored_crc = file.read_u32::<LittleEndian>()?;

        self.buf.resize(body_len, 0);
        file.read_exact(&mut self.buf)?;

        let mut hasher = Crc32::new();
        hasher.update(&self.buf);
        let actual_crc = hasher.finalize();
        if actual_crc != stored_crc {
            bail!(
                "CRC32 mismatch in run record: expected {:#010x}, got {:#010x} (data corruption)",
                stored_crc,
                actual_crc
            );
        }

        let statement = decode_body(&self.buf)?;
        Ok(StmtHandle::Owned(statement))
    }
}

impl StmtStream for RunStream {
    fn next(&mut self) -> Result<Option<StmtHandle>> {
        if self.remaining == 0 || self.file.is_none() {
            self.close();
            return Ok(None);
        }
        let stmt = self.read_record()?;
        self.remaining -= 1;
        Ok(Some(stmt))
    }

    fn close(&mut self) {
        self.file = None;
        self.remaining = 0;
    }
}
