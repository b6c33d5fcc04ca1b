//! Custom assertion helpers for testing.
//!
//! Provides assertion functions for common storage testing patterns. Each
//! helper panics with a descriptive message instead of returning an error.

use btree::{IndexTree, TreeStats};
use buffer::Pager;
use common::{DbError, DbResult, RecordId};
use record::RecordStore;

/// Assert that a tree passes its structural checks and return its shape.
///
/// # Example
///
/// ```
/// use testsupport::prelude::*;
/// use testsupport::test_tree;
/// use types::SqlType;
///
/// test_tree!(tree, types: [SqlType::Int]);
/// assert_eq!(assert_tree_valid(&tree).height, 0);
/// ```
pub fn assert_tree_valid<P: Pager>(tree: &IndexTree<P>) -> TreeStats {
    match tree.check_invariants() {
        Ok(stats) => stats,
        Err(e) => panic!("index tree is corrupt: {e}"),
    }
}

/// Assert that a record store's header agrees with its occupancy bitmap.
pub fn assert_store_valid<P: Pager>(store: &RecordStore<P>) {
    if let Err(e) = store.check_invariants() {
        panic!("record store is corrupt: {e}");
    }
}

/// Assert that the tree's entries are exactly `expected`, in any order.
pub fn assert_tree_rids<P: Pager>(tree: &IndexTree<P>, expected: &[RecordId]) {
    let mut actual: Vec<RecordId> = tree
        .scan_all()
        .expect("scan failed")
        .into_iter()
        .map(|(_, rid)| rid)
        .collect();
    let mut expected = expected.to_vec();
    actual.sort();
    expected.sort();
    pretty_assertions::assert_eq!(actual, expected);
}

/// Assert that an operation failed with a constraint violation.
///
/// # Example
///
/// ```
/// use testsupport::prelude::*;
/// use common::DbError;
///
/// assert_constraint(Err::<(), _>(DbError::Constraint("duplicate".into())));
/// ```
pub fn assert_constraint<T: std::fmt::Debug>(result: DbResult<T>) {
    match result {
        Err(DbError::Constraint(_)) => {}
        other => panic!("expected a constraint violation, got {other:?}"),
    }
}

/// Assert that an operation failed because a store or key ran out of room.
pub fn assert_capacity<T: std::fmt::Debug>(result: DbResult<T>) {
    match result {
        Err(DbError::Capacity(_)) => {}
        other => panic!("expected a capacity error, got {other:?}"),
    }
}
