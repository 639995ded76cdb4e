use super::*;
use crate::row::{encode_row, int_field};

fn counter_row(v: i64) -> Vec<u8> {
    encode_row(&[&int_field(v)])
}

fn add_op(delta: i64) -> UpdateOp {
    UpdateOp::Add { field: 0, delta }
}

// -------------------- Statement shape --------------------

#[test]
fn constructors_enforce_shape() {
    let r = Statement::replace(b"k".to_vec(), counter_row(1), 10);
    assert_eq!(r.stmt_type(), StmtType::Replace);
    assert!(r.is_terminal());
    assert!(r.ops().is_empty());
    assert_eq!(r.column_mask(), 0);

    let d = Statement::delete(b"k".to_vec(), 11);
    assert_eq!(d.stmt_type(), StmtType::Delete);
    assert!(d.row().is_empty());

    let u = Statement::upsert(b"k".to_vec(), counter_row(0), vec![add_op(1)], 12);
    assert_eq!(u.stmt_type(), StmtType::Upsert);
    assert!(!u.is_terminal());
    assert_eq!(u.ops().len(), 1);
}

#[test]
fn column_mask_builder() {
    let r = Statement::replace(b"k".to_vec(), counter_row(1), 1).with_column_mask(0b0101);
    assert_eq!(r.column_mask(), 0b0101);
}

#[test]
fn approx_size_counts_key_and_row() {
    let r = Statement::replace(b"key".to_vec(), vec![0u8; 10], 1);
    assert_eq!(r.approx_size(), 13);
}

// -------------------- StmtHandle --------------------

#[test]
fn shared_handle_derefs_and_counts() {
    let stmt = std::sync::Arc::new(Statement::delete(b"k".to_vec(), 1));
    let h = StmtHandle::from(stmt.clone());
    assert!(h.is_shared());
    assert_eq!(h.version(), 1);
    assert_eq!(std::sync::Arc::strong_count(&stmt), 2);
    drop(h);
    assert_eq!(std::sync::Arc::strong_count(&stmt), 1);
}

#[test]
fn owned_handle_derefs() {
    let h = StmtHandle::Owned(Statement::replace(b"k".to_vec(), counter_row(5), 3));
    assert!(!h.is_shared());
    assert_eq!(h.stmt_type(), StmtType::Replace);
}

// -------------------- RowApplier: terminal folds --------------------

#[test]
fn upsert_onto_replace_applies_ops() {
    let kd = BytewiseKeys;
    let base = Statement::replace(b"k".to_vec(), counter_row(5), 10);
    let up = Statement::upsert(b"k".to_vec(), counter_row(0), vec![add_op(1)], 18);

    let out = RowApplier.apply(&up, Some(&base), &kd, true).unwrap();
    assert_eq!(out.stmt_type(), StmtType::Replace);
    assert_eq!(out.version(), 18);
    let fields = decode_row(out.row()).unwrap();
    assert_eq!(field_as_i64(&fields[0]), Some(6));
}

#[test]
fn upsert_with_no_base_becomes_its_own_image() {
    let kd = BytewiseKeys;
    let up = Statement::upsert(b"k".to_vec(), counter_row(7), vec![add_op(1)], 18);

    let out = RowApplier.apply(&up, None, &kd, true).unwrap();
    assert_eq!(out.stmt_type(), StmtType::Replace);
    // The default image is inserted as-is; the ops only apply to existing data.
    let fields = decode_row(out.row()).unwrap();
    assert_eq!(field_as_i64(&fields[0]), Some(7));
}

#[test]
fn upsert_onto_delete_acts_as_insert() {
    let kd = BytewiseKeys;
    let base = Statement::delete(b"k".to_vec(), 9);
    let up = Statement::upsert(b"k".to_vec(), counter_row(3), vec![add_op(10)], 18);

    let out = RowApplier.apply(&up, Some(&base), &kd, true).unwrap();
    assert_eq!(out.stmt_type(), StmtType::Replace);
    let fields = decode_row(out.row()).unwrap();
    assert_eq!(field_as_i64(&fields[0]), Some(3));
}

// -------------------- RowApplier: upsert chains --------------------

#[test]
fn upsert_onto_upsert_combines_ops_oldest_first() {
    let kd = BytewiseKeys;
    let older = Statement::upsert(b"k".to_vec(), counter_row(100), vec![add_op(1)], 10);
    let newer = Statement::upsert(b"k".to_vec(), counter_row(0), vec![add_op(2)], 11);

    let combined = RowApplier.apply(&newer, Some(&older), &kd, true).unwrap();
    assert_eq!(combined.stmt_type(), StmtType::Upsert);
    assert_eq!(combined.version(), 11);
    // The combined image is "insert the older image, then apply the newer
    // ops"; the ops chain replays in commit order.
    let fields = decode_row(combined.row()).unwrap();
    assert_eq!(field_as_i64(&fields[0]), Some(102));
    assert_eq!(combined.ops(), &[add_op(1), add_op(2)]);
}

#[test]
fn chain_fold_matches_sequential_application() {
    // Chain (newest first): U3(+3), U2(+2), U1(+1), base REPLACE(10).
    // Folding U3 onto U2 onto U1 onto the base must equal 10+1+2+3.
    let kd = BytewiseKeys;
    let base = Statement::replace(b"k".to_vec(), counter_row(10), 1);
    let u1 = Statement::upsert(b"k".to_vec(), counter_row(0), vec![add_op(1)], 2);
    let u2 = Statement::upsert(b"k".to_vec(), counter_row(0), vec![add_op(2)], 3);
    let u3 = Statement::upsert(b"k".to_vec(), counter_row(0), vec![add_op(3)], 4);

    let a = RowApplier.apply(&u3, Some(&u2), &kd, true).unwrap();
    let b = RowApplier.apply(&a, Some(&u1), &kd, true).unwrap();
    let out = RowApplier.apply(&b, Some(&base), &kd, true).unwrap();

    assert_eq!(out.stmt_type(), StmtType::Replace);
    assert_eq!(out.version(), 4);
    let fields = decode_row(out.row()).unwrap();
    assert_eq!(field_as_i64(&fields[0]), Some(16));
}

// -------------------- RowApplier: assign and errors --------------------

#[test]
fn assign_overwrites_field() {
    let kd = BytewiseKeys;
    let base = Statement::replace(b"k".to_vec(), encode_row(&[b"old", b"keep"]), 1);
    let up = Statement::upsert(
        b"k".to_vec(),
        encode_row(&[]),
        vec![UpdateOp::Assign {
            field: 0,
            value: b"new".to_vec(),
        }],
        2,
    );

    let out = RowApplier.apply(&up, Some(&base), &kd, true).unwrap();
    let fields = decode_row(out.row()).unwrap();
    assert_eq!(fields[0], b"new");
    assert_eq!(fields[1], b"keep");
}

#[test]
fn out_of_range_field_fails() {
    let kd = BytewiseKeys;
    let base = Statement::replace(b"k".to_vec(), counter_row(1), 1);
    let up = Statement::upsert(b"k".to_vec(), encode_row(&[]), vec![UpdateOp::Add { field: 5, delta: 1 }], 2);

    let err = RowApplier.apply(&up, Some(&base), &kd, true).unwrap_err();
    assert!(matches!(err, ApplyError::FieldOutOfRange { field: 5, .. }));
}

#[test]
fn arithmetic_on_non_integer_field_fails() {
    let kd = BytewiseKeys;
    let base = Statement::replace(b"k".to_vec(), encode_row(&[b"text"]), 1);
    let up = Statement::upsert(b"k".to_vec(), encode_row(&[]), vec![add_op(1)], 2);

    let err = RowApplier.apply(&up, Some(&base), &kd, true).unwrap_err();
    assert!(matches!(err, ApplyError::NotInteger(0)));
}

#[test]
fn malformed_base_row_fails() {
    let kd = BytewiseKeys;
    let mut bad = counter_row(1);
    bad.truncate(bad.len() - 1);
    let base = Statement::replace(b"k".to_vec(), bad, 1);
    let up = Statement::upsert(b"k".to_vec(), encode_row(&[]), vec![add_op(1)], 2);

    let err = RowApplier.apply(&up, Some(&base), &kd, true).unwrap_err();
    assert!(matches!(err, ApplyError::Row(_)));
}
