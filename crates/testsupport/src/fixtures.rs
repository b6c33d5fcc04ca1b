//! Common test fixtures: index options, keys, record payloads, and record ids.

use btree::IndexOptions;
use common::{ColumnId, RecordId};
use types::{SqlType, Value};

/// Options for an index on table `test` whose key columns are `types`, in order.
///
/// # Example
///
/// ```
/// use testsupport::prelude::*;
/// use types::SqlType;
///
/// let options = index_options(vec![SqlType::Int, SqlType::Date], Some(4), None);
/// assert_eq!(options.column_ids, vec![0, 1]);
/// ```
pub fn index_options(
    types: Vec<SqlType>,
    leaf_order: Option<u32>,
    internal_order: Option<u32>,
) -> IndexOptions {
    let column_ids = (0..types.len() as ColumnId).collect();
    IndexOptions::builder()
        .table_name("test")
        .column_ids(column_ids)
        .column_types(types)
        .maybe_leaf_order(leaf_order)
        .maybe_internal_order(internal_order)
        .build()
}

/// Single-column integer key.
pub fn int_key(v: i32) -> Vec<Value> {
    vec![Value::Int(v)]
}

/// Two-column integer key.
pub fn pair_key(a: i32, b: i32) -> Vec<Value> {
    vec![Value::Int(a), Value::Int(b)]
}

/// Deterministic record payload of `len` bytes derived from `seed`.
///
/// # Example
///
/// ```
/// use testsupport::prelude::*;
///
/// assert_eq!(record_bytes(3, 1), vec![1, 2, 3]);
/// ```
pub fn record_bytes(len: usize, seed: u32) -> Vec<u8> {
    (0..len)
        .map(|i| (seed as usize + i) as u8)
        .collect()
}

/// Record id of linear slot `n` in a store with `slots_per_page` slots per page.
pub fn rid(n: u32, slots_per_page: u32) -> RecordId {
    RecordId::from_linear(u64::from(n), slots_per_page)
}
