//! Deferred updates and their folding.
//!
//! An UPSERT statement carries a default row image plus a list of
//! [`UpdateOp`]s. Folding an UPSERT onto an older statement for the same key
//! produces either a terminal statement or a combined UPSERT:
//!
//! ```text
//! apply(U, REPLACE(r))  -> REPLACE(r with U.ops applied)
//! apply(U, DELETE)      -> REPLACE(U's own row image)
//! apply(U, none)        -> REPLACE(U's own row image)     (last level)
//! apply(U_new, U_old)   -> UPSERT(U_new.ops applied to U_old's row image,
//!                                 U_old.ops ++ U_new.ops)
//! ```
//!
//! The combined UPSERT keeps both outcomes intact: if older data turns up,
//! the concatenated ops replay in commit order on top of it; if nothing
//! older exists, the combined row image is exactly "insert the oldest
//! default image, then apply every later update".
//!
//! The result always takes the *newer* statement's version, carries no
//! column mask, and is shared (reference-counted).

use crate::key::KeyDef;
use crate::row::{decode_row, encode_row, field_as_i64, int_field, RowError};
use crate::{Statement, StmtType};
use std::sync::Arc;
use thiserror::Error;

/// One deferred update operation against a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOp {
    /// Overwrite a field with the given bytes.
    Assign { field: u32, value: Vec<u8> },
    /// Add `delta` to an 8-byte little-endian integer field.
    Add { field: u32, delta: i64 },
}

/// Errors produced while folding an UPSERT.
#[derive(Debug, Error)]
pub enum ApplyError {
    /// An operation referenced a field the row does not have.
    #[error("update references field {field} but the row has {width} fields")]
    FieldOutOfRange { field: u32, width: usize },

    /// An arithmetic operation hit a field that is not an integer field.
    #[error("arithmetic update on non-integer field {0}")]
    NotInteger(u32),

    /// The base statement's row image failed to decode.
    #[error("base row is malformed: {0}")]
    Row(#[from] RowError),
}

/// Folds an UPSERT statement onto an optional older statement for the same
/// key.
///
/// Injected into the write iterator at construction so tests can substitute
/// a double that records the fold order.
pub trait UpsertApplier: Send + Sync {
    /// `base` is an older statement for the same key, or `None` when no
    /// older data exists below (last level). `is_primary` is forwarded for
    /// appliers that treat primary and secondary indexes differently.
    fn apply(
        &self,
        upsert: &Statement,
        base: Option<&Statement>,
        key_def: &dyn KeyDef,
        is_primary: bool,
    ) -> Result<Arc<Statement>, ApplyError>;
}

/// The stock applier: folds [`UpdateOp`]s against the row codec.
#[derive(Debug, Default, Clone, Copy)]
pub struct RowApplier;

impl RowApplier {
    fn apply_ops(fields: &mut Vec<Vec<u8>>, ops: &[UpdateOp]) -> Result<(), ApplyError> {
        for op in ops {
            match op {
                UpdateOp::Assign { field, value } => {
                    let idx = *field as usize;
                    let width = fields.len();
                    let slot = fields.get_mut(idx).ok_or(ApplyError::FieldOutOfRange {
                        field: *field,
                        width,
                    })?;
                    *slot = value.clone();
                }
                UpdateOp::Add { field, delta } => {
                    let idx = *field as usize;
                    let width = fields.len();
                    let slot = fields
                        .get_mut(idx)
                        .ok_or(ApplyError::FieldOutOfRange { field: *field, width })?;
                    let cur = field_as_i64(slot).ok_or(ApplyError::NotInteger(*field))?;
                    *slot = int_field(cur.wrapping_add(*delta));
                }
            }
        }
        Ok(())
    }
}

impl UpsertApplier for RowApplier {
    fn apply(
        &self,
        upsert: &Statement,
        base: Option<&Statement>,
        key_def: &dyn KeyDef,
        _is_primary: bool,
    ) -> Result<Arc<Statement>, ApplyError> {
        debug_assert_eq!(upsert.stmt_type(), StmtType::Upsert);
        if let Some(b) = base {
            debug_assert_eq!(
                key_def.compare(upsert.key(), b.key()),
                std::cmp::Ordering::Equal
            );
            debug_assert!(upsert.version() >= b.version());
        }

        let stmt = match base {
            // No older data, or a tombstone shadowing it: the upsert acts as
            // an insert of its own row image.
            None => Statement::replace(
                upsert.key().to_vec(),
                upsert.row().to_vec(),
                upsert.version(),
            ),
            Some(b) if b.stmt_type() == StmtType::Delete => Statement::replace(
                upsert.key().to_vec(),
                upsert.row().to_vec(),
                upsert.version(),
            ),
            Some(b) if b.stmt_type() == StmtType::Replace => {
                let mut fields = decode_row(b.row())?;
                Self::apply_ops(&mut fields, upsert.ops())?;
                let refs: Vec<&[u8]> = fields.iter().map(|f| f.as_slice()).collect();
                Statement::replace(upsert.key().to_vec(), encode_row(&refs), upsert.version())
            }
            Some(b) => {
                // Two deferred updates. The no-base outcome is "insert the
                // older image, then apply the newer ops" — fold that into
                // the combined row image now; the with-base outcome replays
                // the whole history in commit order, so ops chain
                // oldest-first.
                let mut fields = decode_row(b.row())?;
                Self::apply_ops(&mut fields, upsert.ops())?;
                let refs: Vec<&[u8]> = fields.iter().map(|f| f.as_slice()).collect();
                let mut ops = b.ops().to_vec();
                ops.extend_from_slice(upsert.ops());
                Statement::upsert(upsert.key().to_vec(), encode_row(&refs), ops, upsert.version())
            }
        };
        Ok(Arc::new(stmt))
    }
}
