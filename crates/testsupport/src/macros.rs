//! Test setup macros for reducing boilerplate across the workspace's test suites.
//!
//! Each setup macro creates a temporary directory that lives until the end of
//! the enclosing scope, then binds the requested component to the given name:
//! - `test_pager!` for a shared page cache
//! - `test_store!` for a record store
//! - `test_tree!` for an index tree
//!
//! `key!` builds key value lists.

/// Creates a shared page cache over a temporary directory.
///
/// # Syntax
///
/// ```text
/// test_pager!(pager_var)
/// test_pager!(pager_var, capacity: pages)
/// ```
///
/// # Examples
///
/// ```
/// use testsupport::test_pager;
/// use buffer::Pager;
///
/// test_pager!(pager, capacity: 2);
/// let file = pager.borrow_mut().open_file("scratch.dat").unwrap();
/// let pid = pager.borrow_mut().allocate_page(file).unwrap();
/// assert_eq!(pid.0, 0);
/// ```
#[macro_export]
macro_rules! test_pager {
    ($pager:ident) => {
        $crate::test_pager!($pager, capacity: 16);
    };

    ($pager:ident, capacity: $cap:expr) => {
        let _dir = ::tempfile::tempdir().unwrap();
        let $pager = ::buffer::shared(::buffer::FilePager::new(_dir.path(), $cap));
    };
}

/// Creates an empty record store named `test.tbl`.
///
/// # Syntax
///
/// ```text
/// test_store!(store_var, record_length: len)
/// test_store!(store_var, record_length: len, slots_per_page: spp)
/// ```
///
/// # Examples
///
/// ```
/// use testsupport::test_store;
///
/// test_store!(store, record_length: 8, slots_per_page: 4);
/// let rid = store.insert(b"abc").unwrap();
/// assert_eq!(store.get(rid).unwrap().data, b"abc\0\0\0\0\0");
/// ```
#[macro_export]
macro_rules! test_store {
    ($store:ident, record_length: $len:expr) => {
        $crate::test_pager!(_pager);
        #[allow(unused_mut)]
        let mut $store = ::record::RecordStore::create(
            _pager,
            "test.tbl",
            ::record::StoreOptions::builder().record_length($len).build(),
        )
        .unwrap();
    };

    ($store:ident, record_length: $len:expr, slots_per_page: $spp:expr) => {
        $crate::test_pager!(_pager);
        #[allow(unused_mut)]
        let mut $store = ::record::RecordStore::create(
            _pager,
            "test.tbl",
            ::record::StoreOptions::builder()
                .record_length($len)
                .slots_per_page($spp)
                .build(),
        )
        .unwrap();
    };
}

/// Creates an empty index tree named `test.idx` over the given column types.
///
/// Without explicit orders the node capacities fill a page.
///
/// # Syntax
///
/// ```text
/// test_tree!(tree_var, types: [Type1, Type2, ...])
/// test_tree!(tree_var, types: [Type1, ...], leaf_order: l, internal_order: i)
/// ```
///
/// # Examples
///
/// ```
/// use testsupport::{key, test_tree};
/// use common::RecordId;
/// use types::SqlType;
///
/// test_tree!(tree, types: [SqlType::Int, SqlType::Char(8)]);
/// tree.insert(&key![types::Value::Int(1), types::Value::Text("a".into())], RecordId::new(1, 0))
///     .unwrap();
/// assert_eq!(tree.find(&key![int: 1]).unwrap().len(), 1);
/// ```
#[macro_export]
macro_rules! test_tree {
    ($tree:ident, types: [$($ty:expr),+ $(,)?]) => {
        $crate::test_pager!(_pager);
        #[allow(unused_mut)]
        let mut $tree = ::btree::IndexTree::create(
            _pager,
            "test.idx",
            $crate::fixtures::index_options(vec![$($ty),+], None, None),
        )
        .unwrap();
    };

    ($tree:ident, types: [$($ty:expr),+ $(,)?], leaf_order: $leaf:expr, internal_order: $internal:expr) => {
        $crate::test_pager!(_pager);
        #[allow(unused_mut)]
        let mut $tree = ::btree::IndexTree::create(
            _pager,
            "test.idx",
            $crate::fixtures::index_options(vec![$($ty),+], Some($leaf), Some($internal)),
        )
        .unwrap();
    };
}

/// Builds the value list of an index key.
///
/// # Syntax
///
/// ```text
/// key![Value1, Value2, ...]     // Mixed values
/// key![int: 1, 2, 3]            // All Int
/// key![text: "alice", "bob"]    // All Text
/// ```
///
/// # Examples
///
/// ```
/// use testsupport::key;
/// use types::Value;
///
/// assert_eq!(key![int: 1, 2], vec![Value::Int(1), Value::Int(2)]);
/// assert_eq!(key![text: "a"], vec![Value::Text("a".into())]);
/// ```
#[macro_export]
macro_rules! key {
    // All integers
    [int: $($val:expr),+ $(,)?] => {
        vec![$(::types::Value::Int($val)),+]
    };

    // All text
    [text: $($val:expr),+ $(,)?] => {
        vec![$(::types::Value::Text($val.to_string())),+]
    };

    // Mixed values
    [$($val:expr),+ $(,)?] => {
        vec![$($val),+]
    };
}
