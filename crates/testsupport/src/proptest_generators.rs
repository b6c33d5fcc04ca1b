//! Property-based test generators using proptest.
//!
//! Provides strategies for column types, typed key values, relational
//! operators, record payloads, and sequences of index operations.

use proptest::prelude::*;
use types::{CmpOp, SqlType, Value};

/// Strategy for key column types with narrow text widths.
pub fn arb_key_type() -> impl Strategy<Value = SqlType> {
    prop_oneof![
        Just(SqlType::Int),
        Just(SqlType::Long),
        Just(SqlType::Float),
        Just(SqlType::Date),
        (1u16..=16).prop_map(SqlType::Char),
        (1u16..=16).prop_map(SqlType::VarChar),
        (1u8..=18, 0u8..=4).prop_map(|(precision, scale)| SqlType::Decimal { precision, scale }),
    ]
}

/// Strategy for non-null values that fit a column of type `ty`.
///
/// # Example
///
/// ```
/// use proptest::prelude::*;
/// use testsupport::proptest_generators::arb_value_for;
/// use types::{SqlType, Value};
///
/// proptest! {
///     #[test]
///     fn chars_fit(v in arb_value_for(SqlType::Char(4))) {
///         let Value::Text(s) = v else { panic!("not text") };
///         prop_assert!(s.len() <= 4);
///     }
/// }
/// ```
pub fn arb_value_for(ty: SqlType) -> BoxedStrategy<Value> {
    match ty {
        SqlType::Int => any::<i32>().prop_map(Value::Int).boxed(),
        SqlType::Long => any::<i64>().prop_map(Value::Long).boxed(),
        SqlType::Float => (-1.0e9..1.0e9f64).prop_map(Value::Float).boxed(),
        SqlType::Date => (0..50_000i32).prop_map(Value::Date).boxed(),
        SqlType::Decimal { .. } => any::<i64>().prop_map(Value::Decimal).boxed(),
        SqlType::Char(len) | SqlType::VarChar(len) => {
            prop::collection::vec(b'a'..=b'z', 0..=len as usize)
                .prop_map(|bytes| Value::Text(bytes.into_iter().map(char::from).collect()))
                .boxed()
        }
    }
}

/// Strategy for complete keys of the given column types.
pub fn arb_key(types: Vec<SqlType>) -> impl Strategy<Value = Vec<Value>> {
    types.into_iter().map(arb_value_for).collect::<Vec<_>>()
}

/// Strategy for a key layout of one to three columns with up to `max_keys` keys.
pub fn arb_schema_with_keys(
    max_keys: usize,
) -> impl Strategy<Value = (Vec<SqlType>, Vec<Vec<Value>>)> {
    prop::collection::vec(arb_key_type(), 1..=3).prop_flat_map(move |types| {
        let keys = prop::collection::vec(arb_key(types.clone()), 0..max_keys);
        (Just(types), keys)
    })
}

/// Strategy for every relational operator, including `Any`.
pub fn arb_cmp_op() -> impl Strategy<Value = CmpOp> {
    prop_oneof![
        Just(CmpOp::Eq),
        Just(CmpOp::Ne),
        Just(CmpOp::Gt),
        Just(CmpOp::Ge),
        Just(CmpOp::Lt),
        Just(CmpOp::Le),
        Just(CmpOp::Any),
    ]
}

/// Strategy for record payloads no longer than `max_len`.
pub fn arb_record(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// One step of a randomized index workload.
#[derive(Clone, Debug)]
pub enum TreeOp {
    /// Insert an integer key under a fresh record id.
    Insert(i32),
    /// Remove a live entry chosen by index modulo the live count.
    Remove(usize),
}

/// Strategy for index workloads over keys in `0..key_range`, biased towards inserts.
pub fn arb_tree_ops(key_range: i32, max_len: usize) -> impl Strategy<Value = Vec<TreeOp>> {
    let op = prop_oneof![
        3 => (0..key_range).prop_map(TreeOp::Insert),
        2 => any::<usize>().prop_map(TreeOp::Remove),
    ];
    prop::collection::vec(op, 1..max_len)
}
