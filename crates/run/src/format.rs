//! Shared format constants and the record body codec.

use anyhow::{bail, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

use stmt::{Statement, StmtType, UpdateOp};

pub const RUN_MAGIC: u32 = 0x5255_4E31; // "RUN1"
pub const FOOTER_BYTES: u64 = 8 /*entry_count*/ + 8 /*max_version*/ + 4 /*magic*/;

/// Maximum key size we'll allocate during decode (64 KiB).
pub const MAX_KEY_BYTES: usize = 64 * 1024;
/// Maximum row size we'll allocate during decode (10 MiB).
pub const MAX_ROW_BYTES: usize = 10 * 1024 * 1024;
/// Maximum record body size; anything larger is treated as corruption.
pub const MAX_BODY_BYTES: usize = MAX_KEY_BYTES + MAX_ROW_BYTES + 1024 * 1024;

const TYPE_REPLACE: u8 = 0;
const TYPE_DELETE: u8 = 1;
const TYPE_UPSERT: u8 = 2;

const OP_ASSIGN: u8 = 0;
const OP_ADD: u8 = 1;

fn type_tag(t: StmtType) -> u8 {
    match t {
        StmtType::Replace => TYPE_REPLACE,
        StmtType::Delete => TYPE_DELETE,
        StmtType::Upsert => TYPE_UPSERT,
    }
}

/// Serializes a statement into a record body (no length prefix, no CRC).
pub(crate) fn encode_body(buf: &mut Vec<u8>, s: &Statement) {
    buf.write_u32::<LittleEndian>(s.key().len() as u32)
        .expect("write to Vec");
    buf.extend_from_slice(s.key());
    buf.write_i64::<LittleEndian>(s.version()).expect("write to Vec");
    buf.write_u8(type_tag(s.stmt_type())).expect("write to Vec");
    buf.write_u64::<LittleEndian>(s.column_mask())
        .expect("write to Vec");
    buf.write_u32::<LittleEndian>(s.row().len() as u32)
        .expect("write to Vec");
    buf.extend_from_slice(s.row());
    if s.stmt_type() == StmtType::Upsert {
        buf.write_u32::<LittleEndian>(s.ops().len() as u32)
            .expect("write to Vec");
        for op in s.ops() {
            match op {
                UpdateOp::Assign { field, value } => {
                    buf.write_u8(OP_ASSIGN).expect("write to Vec");
                    buf.write_u32::<LittleEndian>(*field).expect("write to Vec");
                    buf.write_u32::<LittleEndian>(value.len() as u32)
                        .expect("write to Vec");
                    buf.extend_from_slice(value);
                }
                UpdateOp::Add { field, delta } => {
                    buf.write_u8(OP_ADD).expect("write to Vec");
                    buf.write_u32::<LittleEndian>(*field).expect("write to Vec");
                    buf.write_i64::<LittleEndian>(*delta).expect("write to Vec");
                }
            }
        }
    }
}

/// Decodes one record body back into a statement.
pub(crate) fn decode_body(body: &[u8]) -> Result<Statement> {
    let mut cur = Cursor::new(body);

    let key_len = cur.read_u32::<LittleEndian>()? as usize;
    if key_len > MAX_KEY_BYTES {
        bail!("corrupt record: key_len {} exceeds maximum", key_len);
    }
    let mut key = vec![0u8; key_len];
    std::io::Read::read_exact(&mut cur, &mut key)?;

    let version = cur.read_i64::<LittleEndian>()?;
    let tag = cur.read_u8()?;
    let column_mask = cur.read_u64::<LittleEndian>()?;

    let row_len = cur.read_u32::<LittleEndian>()? as usize;
    if row_len > MAX_ROW_BYTES {
        bail!("corrupt record: row_len {} exceeds maximum", row_len);
    }
    let mut row = vec![0u8; row_len];
    std::io::Read::read_exact(&mut cur, &mut row)?;

    let stmt = match tag {
        TYPE_REPLACE => Statement::replace(key, row, version).with_column_mask(column_mask),
        TYPE_DELETE => Statement::delete(key, version).with_column_mask(column_mask),
        TYPE_UPSERT => {
            let ops_count = cur.read_u32::<LittleEndian>()? as usize;
            let mut ops = Vec::with_capacity(ops_count.min(1024));
            for _ in 0..ops_count {
                let op_tag = cur.read_u8()?;
                let field = cur.read_u32::<LittleEndian>()?;
                match op_tag {
                    OP_ASSIGN => {
                        let len = cur.read_u32::<LittleEndian>()? as usize;
                        if len > MAX_ROW_BYTES {
                            bail!("corrupt record: op value of {} bytes", len);
                        }
                        let mut value = vec![0u8; len];
                        std::io::Read::read_exact(&mut cur, &mut value)?;
                        ops.push(UpdateOp::Assign { field, value });
                    }
                    OP_ADD => {
                        let delta = cur.read_i64::<LittleEndian>()?;
                        ops.push(UpdateOp::Add { field, delta });
                    }
                    other => bail!("corrupt record: unknown op tag {}", other),
                }
            }
            Statement::upsert(key, row, ops, version)
        }
        other => bail!("corrupt record: unknown statement type {}", other),
    };
    Ok(stmt)
}
