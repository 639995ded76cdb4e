//! Row codec.
//!
//! A row is a flat sequence of length-prefixed fields:
//!
//! ```text
//! [field_count: u32 LE] then per field: [len: u32 LE][bytes]
//! ```
//!
//! The codec is deliberately dumb — no schema, no types. Integer fields are
//! a convention: an 8-byte field holding an `i64` in little-endian, which is
//! what arithmetic update operations expect (see [`crate::upsert`]).

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;
use thiserror::Error;

/// Maximum number of fields we'll decode from one row. Guards against
/// allocating on a corrupt length prefix.
pub const MAX_ROW_FIELDS: usize = 4096;
/// Maximum size of a single decoded field (10 MiB).
pub const MAX_FIELD_BYTES: usize = 10 * 1024 * 1024;

/// Errors produced while decoding a row.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RowError {
    /// The buffer ended before the declared fields did.
    #[error("truncated row")]
    Truncated,

    /// A length prefix exceeded the decode guards.
    #[error("row field of {0} bytes exceeds maximum")]
    FieldTooLarge(usize),

    /// The declared field count exceeded the decode guards.
    #[error("row with {0} fields exceeds maximum")]
    TooManyFields(usize),
}

/// Encodes `fields` into a row buffer.
pub fn encode_row(fields: &[&[u8]]) -> Vec<u8> {
    let total: usize = fields.iter().map(|f| 4 + f.len()).sum();
    let mut buf = Vec::with_capacity(4 + total);
    buf.write_u32::<LittleEndian>(fields.len() as u32)
        .expect("write to Vec");
    for f in fields {
        buf.write_u32::<LittleEndian>(f.len() as u32)
            .expect("write to Vec");
        buf.extend_from_slice(f);
    }
    buf
}

/// Decodes a row buffer back into its fields.
pub fn decode_row(buf: &[u8]) -> Result<Vec<Vec<u8>>, RowError> {
    let mut cur = Cursor::new(buf);
    let count = cur
        .read_u32::<LittleEndian>()
        .map_err(|_| RowError::Truncated)? as usize;
    if count > MAX_ROW_FIELDS {
        return Err(RowError::TooManyFields(count));
    }
    let mut fields = Vec::with_capacity(count);
    for _ in 0..count {
        let len = cur
            .read_u32::<LittleEndian>()
            .map_err(|_| RowError::Truncated)? as usize;
        if len > MAX_FIELD_BYTES {
            return Err(RowError::FieldTooLarge(len));
        }
        let pos = cur.position() as usize;
        let field = buf.get(pos..pos + len).ok_or(RowError::Truncated)?;
        fields.push(field.to_vec());
        cur.set_position((pos + len) as u64);
    }
    Ok(fields)
}

/// Encodes an `i64` as the conventional 8-byte integer field.
#[must_use]
pub fn int_field(v: i64) -> Vec<u8> {
    v.to_le_bytes().to_vec()
}

/// Reads a field back as an `i64`, if it has the conventional shape.
#[must_use]
pub fn field_as_i64(field: &[u8]) -> Option<i64> {
    let bytes: [u8; 8] = field.try_into().ok()?;
    Some(i64::from_le_bytes(bytes))
}
