use super::*;
use buffer::shared;
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use tempfile::{TempDir, tempdir};

fn int_tree(leaf_order: Option<u32>, internal_order: Option<u32>) -> (TempDir, IndexTree) {
    let dir = tempdir().unwrap();
    let pager = shared(FilePager::new(dir.path(), 32));
    let options = IndexOptions::builder()
        .table_name("t")
        .column_ids(vec![0])
        .column_types(vec![SqlType::Int])
        .maybe_leaf_order(leaf_order)
        .maybe_internal_order(internal_order)
        .build();
    let tree = IndexTree::create(pager, "t.idx", options).unwrap();
    (dir, tree)
}

fn pair_tree(leaf_order: u32) -> (TempDir, IndexTree) {
    let dir = tempdir().unwrap();
    let pager = shared(FilePager::new(dir.path(), 32));
    let options = IndexOptions::builder()
        .table_name("t")
        .column_ids(vec![0, 1])
        .column_types(vec![SqlType::Int, SqlType::Int])
        .leaf_order(leaf_order)
        .internal_order(3)
        .build();
    let tree = IndexTree::create(pager, "t.idx", options).unwrap();
    (dir, tree)
}

fn k(v: i32) -> Vec<Value> {
    vec![Value::Int(v)]
}

fn rid(n: u32) -> RecordId {
    RecordId::new(n / 8 + 1, n % 8)
}

fn enc(v: i32) -> Vec<u8> {
    v.to_le_bytes().to_vec()
}

fn leaf_keys(tree: &IndexTree, page: PageId) -> Vec<i32> {
    tree.read_leaf(page)
        .unwrap()
        .entries
        .iter()
        .map(|(key, _)| i32::from_le_bytes([key[0], key[1], key[2], key[3]]))
        .collect()
}

fn scanned_keys(tree: &IndexTree) -> Vec<i32> {
    tree.scan_all()
        .unwrap()
        .into_iter()
        .map(|(values, _)| match values[0] {
            Value::Int(v) => v,
            ref other => panic!("unexpected key {other:?}"),
        })
        .collect()
}

#[test]
fn create_empty_index() {
    let (_dir, tree) = int_tree(None, None);
    assert!(tree.find(&k(1)).unwrap().is_empty());
    assert!(tree.is_empty());
    assert_eq!(tree.height(), 0);
    assert_eq!(tree.check_invariants().unwrap(), TreeStats::default());
    assert_eq!(tree.layout().leaf_cap, 340);
    assert_eq!(tree.layout().internal_cap, 511);
}

#[test]
fn insert_and_search_single_key() {
    let (_dir, mut tree) = int_tree(None, None);
    tree.insert(&k(42), rid(0)).unwrap();

    assert_eq!(tree.find(&k(42)).unwrap(), vec![rid(0)]);
    assert!(tree.find(&k(99)).unwrap().is_empty());
    assert!(tree.contains(&k(42), rid(0)).unwrap());
    assert!(!tree.contains(&k(42), rid(1)).unwrap());
    assert_eq!(tree.height(), 1);
}

#[test]
fn insert_multiple_keys_in_order() {
    let (_dir, mut tree) = int_tree(Some(4), Some(4));
    for i in 0..50 {
        tree.insert(&k(i), rid(i as u32)).unwrap();
    }
    for i in 0..50 {
        assert_eq!(tree.find(&k(i)).unwrap(), vec![rid(i as u32)]);
    }
    let stats = tree.check_invariants().unwrap();
    assert_eq!(stats.entries, 50);
    assert!(stats.height >= 3);
}

#[test]
fn insert_multiple_keys_reverse_order() {
    let (_dir, mut tree) = int_tree(Some(4), Some(4));
    for i in (0..50).rev() {
        tree.insert(&k(i), rid(i as u32)).unwrap();
    }
    assert_eq!(scanned_keys(&tree), (0..50).collect::<Vec<_>>());
    tree.check_invariants().unwrap();
}

#[test]
fn duplicate_keys_span_leaves() {
    let (_dir, mut tree) = int_tree(Some(2), Some(3));
    tree.insert(&k(1), rid(100)).unwrap();
    for slot in 0..10 {
        tree.insert(&k(7), rid(slot)).unwrap();
    }
    tree.insert(&k(9), rid(101)).unwrap();
    tree.check_invariants().unwrap();

    let mut found = tree.find(&k(7)).unwrap();
    found.sort();
    assert_eq!(found, (0..10).map(rid).collect::<Vec<_>>());

    for slot in (0..10).rev() {
        assert!(tree.contains(&k(7), rid(slot)).unwrap());
        assert!(tree.remove(&k(7), rid(slot)).unwrap());
        assert!(!tree.contains(&k(7), rid(slot)).unwrap());
        tree.check_invariants().unwrap();
    }
    assert_eq!(scanned_keys(&tree), vec![1, 9]);
}

#[test]
fn delete_existing_key() {
    let (_dir, mut tree) = int_tree(None, None);
    tree.insert(&k(42), rid(0)).unwrap();
    assert!(tree.remove(&k(42), rid(0)).unwrap());
    assert!(tree.find(&k(42)).unwrap().is_empty());
    assert_eq!(tree.len(), 0);

    // The emptied root leaf stays in place.
    assert_eq!(tree.height(), 1);
    let stats = tree.check_invariants().unwrap();
    assert_eq!(stats.leaves, 1);
}

#[test]
fn delete_absent_entry_is_noop() {
    let (_dir, mut tree) = int_tree(None, None);
    assert!(!tree.remove(&k(42), rid(0)).unwrap());

    tree.insert(&k(42), rid(0)).unwrap();
    assert!(!tree.remove(&k(42), rid(1)).unwrap());
    assert!(!tree.remove(&k(41), rid(0)).unwrap());
    assert_eq!(tree.len(), 1);
}

#[test]
fn leaf_capacity_three_splits_once() {
    let (_dir, mut tree) = int_tree(Some(3), None);
    for (n, key) in [5, 3, 8, 1, 9, 2].into_iter().enumerate() {
        tree.insert(&k(key), rid(n as u32)).unwrap();
    }

    let stats = tree.check_invariants().unwrap();
    assert_eq!(
        stats,
        TreeStats {
            height: 2,
            leaves: 2,
            internal_nodes: 1,
            entries: 6,
        }
    );
    let root = tree.read_internal(tree.header.root_page).unwrap();
    assert_eq!(root.keys, vec![enc(5)]);
    assert_eq!(leaf_keys(&tree, root.children[0]), vec![1, 2, 3]);
    assert_eq!(leaf_keys(&tree, root.children[1]), vec![5, 8, 9]);
    assert_eq!(tree.find(&k(5)).unwrap(), vec![rid(0)]);
}

#[test]
fn underflow_borrows_then_merges_and_collapses_root() {
    let (_dir, mut tree) = int_tree(Some(3), None);
    for (n, key) in [5, 3, 8, 1, 9, 2].into_iter().enumerate() {
        tree.insert(&k(key), rid(n as u32)).unwrap();
    }
    // rids follow insertion position: 5->0 3->1 8->2 1->3 9->4 2->5
    tree.remove(&k(3), rid(1)).unwrap();
    tree.remove(&k(1), rid(3)).unwrap();
    assert_eq!(tree.check_invariants().unwrap().leaves, 2);

    // Emptying the left leaf takes 5 from its right sibling.
    tree.remove(&k(2), rid(5)).unwrap();
    let root = tree.read_internal(tree.header.root_page).unwrap();
    assert_eq!(root.keys, vec![enc(8)]);
    assert_eq!(leaf_keys(&tree, root.children[0]), vec![5]);
    assert_eq!(leaf_keys(&tree, root.children[1]), vec![8, 9]);
    tree.check_invariants().unwrap();

    // Emptying the right leaf merges it away and the root collapses.
    tree.remove(&k(8), rid(2)).unwrap();
    tree.remove(&k(9), rid(4)).unwrap();
    let stats = tree.check_invariants().unwrap();
    assert_eq!(
        stats,
        TreeStats {
            height: 1,
            leaves: 1,
            internal_nodes: 0,
            entries: 1,
        }
    );
    assert_eq!(leaf_keys(&tree, tree.header.root_page), vec![5]);
}

#[test]
fn even_leaf_capacity_keeps_a_single_entry() {
    let (_dir, mut tree) = int_tree(Some(4), None);
    for i in 1..=5 {
        tree.insert(&k(i), rid(i as u32)).unwrap();
    }
    let root = tree.read_internal(tree.header.root_page).unwrap();
    assert_eq!(leaf_keys(&tree, root.children[1]), vec![4, 5]);

    // One entry is still enough for a leaf of capacity 4.
    tree.remove(&k(5), rid(5)).unwrap();
    assert_eq!(leaf_keys(&tree, root.children[0]), vec![1, 2, 3]);
    assert_eq!(leaf_keys(&tree, root.children[1]), vec![4]);
    tree.check_invariants().unwrap();

    tree.remove(&k(4), rid(4)).unwrap();
    let root = tree.read_internal(tree.header.root_page).unwrap();
    assert_eq!(root.keys, vec![enc(3)]);
    assert_eq!(leaf_keys(&tree, root.children[0]), vec![1, 2]);
    assert_eq!(leaf_keys(&tree, root.children[1]), vec![3]);
    assert_eq!(tree.check_invariants().unwrap().leaves, 2);
}

#[test]
fn leaf_capacity_two_grows_and_shrinks() {
    let (_dir, mut tree) = int_tree(Some(2), Some(3));
    for i in 1..=10 {
        tree.insert(&k(i), rid(i as u32)).unwrap();
    }
    assert_eq!(
        tree.check_invariants().unwrap(),
        TreeStats {
            height: 3,
            leaves: 5,
            internal_nodes: 3,
            entries: 10,
        }
    );

    for i in 1..=10 {
        assert!(tree.remove(&k(i), rid(i as u32)).unwrap());
        let stats = tree.check_invariants().unwrap();
        assert_eq!(stats.entries, 10 - i as usize);
        assert_eq!(scanned_keys(&tree), (i + 1..=10).collect::<Vec<_>>());
    }
    assert_eq!(tree.height(), 1);
    assert!(tree.is_empty());

    // Freed nodes are reused by later growth.
    for i in 0..10 {
        tree.insert(&k(i), rid(i as u32)).unwrap();
    }
    assert_eq!(tree.nodes.exploited_slots(), 1 + 8);
    tree.check_invariants().unwrap();
}

#[test]
fn simple_delete_keeps_stale_separator() {
    let (_dir, mut tree) = int_tree(Some(3), None);
    for (n, key) in [5, 3, 8, 1, 9, 2].into_iter().enumerate() {
        tree.insert(&k(key), rid(n as u32)).unwrap();
    }

    // 5 is the right leaf's first key; removing it leaves the leaf above its minimum.
    assert!(tree.remove(&k(5), rid(0)).unwrap());
    let root = tree.read_internal(tree.header.root_page).unwrap();
    assert_eq!(root.keys, vec![enc(5)]);
    assert_eq!(leaf_keys(&tree, root.children[1]), vec![8, 9]);

    assert!(tree.find(&k(5)).unwrap().is_empty());
    assert_eq!(tree.find(&k(8)).unwrap(), vec![rid(2)]);
    assert_eq!(
        tree.value_select(&[], Some(&Value::Int(4)), CmpOp::Ge, None, CmpOp::Any)
            .unwrap(),
        vec![rid(2), rid(4)]
    );

    tree.insert(&k(6), rid(6)).unwrap();
    assert_eq!(leaf_keys(&tree, root.children[1]), vec![6, 8, 9]);
    tree.check_invariants().unwrap();
}

#[test]
fn unique_index_rejects_duplicates() {
    let dir = tempdir().unwrap();
    let pager = shared(FilePager::new(dir.path(), 8));
    let options = IndexOptions::builder()
        .table_name("users")
        .column_ids(vec![2])
        .column_types(vec![SqlType::Int])
        .unique(true)
        .build();
    let mut tree = IndexTree::create(pager, "users_pk.idx", options).unwrap();

    tree.insert(&k(1), rid(0)).unwrap();
    let err = tree.insert(&k(1), rid(1)).unwrap_err();
    assert!(matches!(err, DbError::Constraint(_)));
    assert_eq!(tree.len(), 1);
    assert!(tree.is_unique());
}

#[test]
fn nulls_need_a_nullable_column() {
    let dir = tempdir().unwrap();
    let pager = shared(FilePager::new(dir.path(), 8));
    let options = |mask| {
        IndexOptions::builder()
            .table_name("t")
            .column_ids(vec![0, 1])
            .column_types(vec![SqlType::Int, SqlType::Long])
            .null_mask(mask)
            .build()
    };
    let mut strict = IndexTree::create(pager.clone(), "a.idx", options(0b01)).unwrap();
    let err = strict
        .insert(&[Value::Int(1), Value::Null], rid(0))
        .unwrap_err();
    assert!(matches!(err, DbError::Constraint(_)));
    strict.insert(&[Value::Null, Value::Long(3)], rid(0)).unwrap();

    let mut lenient = IndexTree::create(pager, "b.idx", options(0b10)).unwrap();
    lenient.insert(&[Value::Int(1), Value::Null], rid(0)).unwrap();
    assert_eq!(lenient.find(&[Value::Int(1)]).unwrap(), vec![rid(0)]);
}

#[test]
fn nulls_stay_distinct_from_zero_values() {
    let dir = tempdir().unwrap();
    let pager = shared(FilePager::new(dir.path(), 8));
    let options = IndexOptions::builder()
        .table_name("t")
        .column_ids(vec![0])
        .column_types(vec![SqlType::Int])
        .null_mask(0b1)
        .unique(true)
        .leaf_order(2)
        .internal_order(3)
        .build();
    let mut tree = IndexTree::create(pager.clone(), "n.idx", options).unwrap();
    assert_eq!(tree.schema().key_len(), 5);

    tree.insert(&[Value::Null], rid(0)).unwrap();
    assert_eq!(tree.scan_all().unwrap(), vec![(vec![Value::Null], rid(0))]);
    assert!(tree.find(&k(0)).unwrap().is_empty());

    tree.insert(&k(0), rid(1)).unwrap();
    tree.insert(&[Value::Null], rid(2)).unwrap();
    tree.insert(&k(-5), rid(3)).unwrap();
    let err = tree.insert(&k(0), rid(4)).unwrap_err();
    assert!(matches!(err, DbError::Constraint(_)));

    assert_eq!(tree.find(&k(0)).unwrap(), vec![rid(1)]);
    assert_eq!(tree.find(&[Value::Null]).unwrap(), vec![rid(0), rid(2)]);
    let expected = vec![
        (vec![Value::Null], rid(0)),
        (vec![Value::Null], rid(2)),
        (k(-5), rid(3)),
        (k(0), rid(1)),
    ];
    assert_eq!(tree.scan_all().unwrap(), expected);
    assert_eq!(
        tree.value_select(&[], Some(&Value::Int(-10)), CmpOp::Gt, None, CmpOp::Any)
            .unwrap(),
        vec![rid(3), rid(1)]
    );
    tree.check_invariants().unwrap();

    assert!(tree.remove(&[Value::Null], rid(0)).unwrap());
    tree.flush().unwrap();
    drop(tree);
    let tree = IndexTree::open(pager, "n.idx").unwrap();
    assert_eq!(tree.header().record_length, 5);
    assert_eq!(tree.find(&[Value::Null]).unwrap(), vec![rid(2)]);
    assert!(!tree.contains(&k(0), rid(2)).unwrap());
}

#[test]
fn nullable_columns_carry_a_presence_byte() {
    let schema = KeySchema::with_null_mask(vec![SqlType::Int, SqlType::Char(3)], 0b11);
    assert_eq!(schema.key_len(), 9);
    assert_eq!(schema.column_width(1), 4);

    let nulls = schema.encode(&[Value::Null, Value::Null]).unwrap();
    let zeros = schema
        .encode(&[Value::Int(0), Value::Text(String::new())])
        .unwrap();
    assert_eq!(nulls, vec![0; 9]);
    assert_eq!(zeros, vec![1, 0, 0, 0, 0, 1, 0, 0, 0]);
    assert_eq!(schema.decode(&nulls).unwrap(), vec![Value::Null, Value::Null]);
    assert_eq!(
        schema.decode(&zeros).unwrap(),
        vec![Value::Int(0), Value::Text(String::new())]
    );
    assert_eq!(schema.compare(&nulls, &zeros), Ordering::Less);
    assert_eq!(schema.compare(&nulls, &nulls), Ordering::Equal);

    let strict = KeySchema::new(vec![SqlType::Int]);
    assert!(strict.encode(&[Value::Null]).is_err());

    let header = IndexHeader {
        record_length: 13,
        entry_count: 0,
        null_mask: 0b10,
        internal_order: 4,
        leaf_order: 4,
        internal_cap: 4,
        leaf_cap: 4,
        root_page: PageId::NONE,
        unique: false,
        column_types: vec![SqlType::Int, SqlType::Long],
        table_name: "t".into(),
        column_ids: vec![0, 1],
    };
    let buf = header.encode().unwrap();
    assert_eq!(&buf[40..48], &[4, 0, 0, 0, 9, 0, 0, 0]);
    assert_eq!(IndexHeader::decode(&buf).unwrap(), header);
}

#[test]
fn invalid_orders_are_rejected() {
    let dir = tempdir().unwrap();
    let pager = shared(FilePager::new(dir.path(), 8));
    let base = || {
        IndexOptions::builder()
            .table_name("t")
            .column_ids(vec![0])
            .column_types(vec![SqlType::Int])
    };
    let err = IndexTree::create(pager.clone(), "a.idx", base().leaf_order(1).build());
    assert!(matches!(err, Err(DbError::Config(_))));
    let err = IndexTree::create(pager.clone(), "b.idx", base().internal_order(2).build());
    assert!(matches!(err, Err(DbError::Config(_))));

    let wide = IndexOptions::builder()
        .table_name("t")
        .column_ids(vec![0])
        .column_types(vec![SqlType::Char(4000)])
        .build();
    let err = IndexTree::create(pager.clone(), "c.idx", wide);
    assert!(matches!(err, Err(DbError::Capacity(_))));

    let mismatched = IndexOptions::builder()
        .table_name("t")
        .column_ids(vec![0, 1])
        .column_types(vec![SqlType::Int])
        .build();
    let err = IndexTree::create(pager, "d.idx", mismatched);
    assert!(matches!(err, Err(DbError::Config(_))));
}

#[test]
fn orders_above_the_page_limit_are_clamped() {
    let (_dir, tree) = int_tree(Some(10_000), Some(10_000));
    assert_eq!(tree.header().leaf_order, 10_000);
    assert_eq!(tree.layout().leaf_cap, 340);
    assert_eq!(tree.layout().internal_cap, 511);
}

#[test]
fn text_keys() {
    let dir = tempdir().unwrap();
    let pager = shared(FilePager::new(dir.path(), 8));
    let options = IndexOptions::builder()
        .table_name("people")
        .column_ids(vec![1])
        .column_types(vec![SqlType::VarChar(16)])
        .leaf_order(2)
        .build();
    let mut tree = IndexTree::create(pager, "people_name.idx", options).unwrap();

    let names = ["dave", "alice", "charlie", "bob", "al"];
    for (slot, name) in names.iter().enumerate() {
        tree.insert(&[Value::Text(name.to_string())], rid(slot as u32))
            .unwrap();
    }

    let results = tree.find(&[Value::Text("charlie".into())]).unwrap();
    assert_eq!(results, vec![rid(2)]);
    let ordered: Vec<_> = tree
        .scan_all()
        .unwrap()
        .into_iter()
        .map(|(values, _)| values[0].clone())
        .collect();
    let expected: Vec<_> = ["al", "alice", "bob", "charlie", "dave"]
        .into_iter()
        .map(|s| Value::Text(s.into()))
        .collect();
    assert_eq!(ordered, expected);
    tree.check_invariants().unwrap();
}

#[test]
fn composite_prefix_and_range_queries() {
    let (_dir, mut tree) = pair_tree(3);
    let mut n = 0;
    for dept in 1..=3 {
        for emp in 1..=5 {
            tree.insert(&[Value::Int(dept), Value::Int(emp)], rid(n))
                .unwrap();
            n += 1;
        }
    }
    tree.check_invariants().unwrap();

    // dept 2 occupies rids 5..10
    assert_eq!(
        tree.find(&[Value::Int(2)]).unwrap(),
        (5..10).map(rid).collect::<Vec<_>>()
    );
    assert_eq!(
        tree.find(&[Value::Int(2), Value::Int(4)]).unwrap(),
        vec![rid(8)]
    );
    assert_eq!(
        tree.value_select(
            &[Value::Int(2)],
            Some(&Value::Int(2)),
            CmpOp::Gt,
            Some(&Value::Int(4)),
            CmpOp::Le,
        )
        .unwrap(),
        vec![rid(7), rid(8)]
    );
    assert_eq!(
        tree.value_select(&[Value::Int(3)], None, CmpOp::Any, Some(&Value::Int(3)), CmpOp::Lt)
            .unwrap(),
        vec![rid(10), rid(11)]
    );
    assert_eq!(
        tree.value_select(&[Value::Int(1)], Some(&Value::Int(3)), CmpOp::Ne, None, CmpOp::Any)
            .unwrap(),
        vec![rid(0), rid(1), rid(3), rid(4)]
    );
    assert_eq!(
        tree.value_select(&[], Some(&Value::Int(3)), CmpOp::Eq, None, CmpOp::Any)
            .unwrap(),
        (10..15).map(rid).collect::<Vec<_>>()
    );
    assert!(
        tree.value_select(
            &[Value::Int(1), Value::Int(1)],
            Some(&Value::Int(1)),
            CmpOp::Eq,
            None,
            CmpOp::Any
        )
        .is_err()
    );
}

#[test]
fn persistence_across_open() {
    let dir = tempdir().unwrap();
    {
        let pager = shared(FilePager::new(dir.path(), 4));
        let options = IndexOptions::builder()
            .table_name("orders")
            .column_ids(vec![3])
            .column_types(vec![SqlType::Int])
            .leaf_order(8)
            .build();
        let mut tree = IndexTree::create(pager, "orders.idx", options).unwrap();
        for i in 0..200 {
            tree.insert(&k(i * 7 % 200), rid(i as u32)).unwrap();
        }
        tree.flush().unwrap();
    }

    let pager = shared(FilePager::new(dir.path(), 4));
    let tree = IndexTree::open(pager, "orders.idx").unwrap();
    assert_eq!(tree.len(), 200);
    assert_eq!(tree.table_name(), "orders");
    assert_eq!(tree.column_ids(), &[3]);
    assert_eq!(tree.layout().leaf_cap, 8);
    assert_eq!(tree.check_invariants().unwrap().height, tree.height());
    assert_eq!(scanned_keys(&tree), (0..200).collect::<Vec<_>>());
    assert_eq!(tree.find(&k(7)).unwrap(), vec![rid(1)]);
}

#[test]
fn open_rejects_plain_record_store() {
    let dir = tempdir().unwrap();
    let pager = shared(FilePager::new(dir.path(), 4));
    let options = StoreOptions::builder().record_length(16).build();
    RecordStore::create(pager.clone(), "t.tbl", options).unwrap();
    assert!(matches!(
        IndexTree::open(pager, "t.tbl"),
        Err(DbError::Index(_))
    ));
}

#[test]
fn many_inserts_trigger_splits() {
    let (_dir, mut tree) = int_tree(None, None);
    let count = 2_000;
    for i in 0..count {
        // 7919 is prime, so this visits every key once in scrambled order.
        tree.insert(&k(i * 7919 % count), rid(i as u32)).unwrap();
    }
    let stats = tree.check_invariants().unwrap();
    assert_eq!(stats.entries, count as usize);
    assert_eq!(stats.height, 2);
    for i in (0..count).step_by(97) {
        assert_eq!(tree.find(&k(i)).unwrap().len(), 1, "key {i} not found");
    }
}

#[test]
fn header_layout_is_bit_exact() {
    let header = IndexHeader {
        record_length: 12,
        entry_count: 3,
        null_mask: 0,
        internal_order: 4,
        leaf_order: 5,
        internal_cap: 4,
        leaf_cap: 5,
        root_page: PageId(2),
        unique: true,
        column_types: vec![SqlType::Int, SqlType::Long],
        table_name: "ab".into(),
        column_ids: vec![7, 9],
    };
    let buf = header.encode().unwrap();
    assert_eq!(buf.len(), header.encoded_len());
    let words: Vec<u32> = buf[..40]
        .chunks(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    assert_eq!(words, vec![12, 3, 0, 4, 5, 4, 5, 2, 1, 2]);
    // widths, then (tag, param) pairs, then the name, then column ids
    assert_eq!(&buf[40..48], &[4, 0, 0, 0, 8, 0, 0, 0]);
    assert_eq!(&buf[64..70], &[2, 0, 0, 0, b'a', b'b']);
    assert_eq!(&buf[70..], &[7, 0, 9, 0]);
    assert_eq!(IndexHeader::decode(&buf).unwrap(), header);

    assert!(IndexHeader::decode(&buf[..50]).is_err());
}

#[test]
fn key_schema_orders_columns() {
    let schema = KeySchema::new(vec![SqlType::Char(4), SqlType::Int]);
    assert_eq!(schema.key_len(), 8);

    let a = schema
        .encode(&[Value::Text("ab".into()), Value::Int(5)])
        .unwrap();
    let b = schema
        .encode(&[Value::Text("abc".into()), Value::Int(-1)])
        .unwrap();
    assert_eq!(&a[..4], b"ab\0\0");
    assert_eq!(schema.compare(&a, &b), Ordering::Less);
    assert_eq!(schema.compare_column(1, &a, &b), Ordering::Greater);
    assert_eq!(schema.compare_prefix(&a, &a, 1), Ordering::Equal);
    assert!(schema.satisfies(&a, &b, &[CmpOp::Lt, CmpOp::Gt]));
    assert!(schema.satisfies(&a, &b, &[CmpOp::Ne]));
    assert!(!schema.satisfies(&a, &b, &[CmpOp::Any, CmpOp::Le]));
    assert_eq!(
        schema.decode(&b).unwrap(),
        vec![Value::Text("abc".into()), Value::Int(-1)]
    );

    assert!(schema.encode(&[Value::Text("abcde".into()), Value::Int(1)]).is_err());
    assert!(schema.encode(&[Value::Int(1), Value::Int(1)]).is_err());
    assert!(schema.encode(&[Value::Text("a".into())]).is_err());
    assert_eq!(schema.encode_prefix(&[Value::Text("a".into())]).unwrap().len(), 4);
}

#[derive(Clone, Debug)]
enum Op {
    Insert(i32),
    Remove(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0..40i32).prop_map(Op::Insert),
        2 => any::<usize>().prop_map(Op::Remove),
    ]
}

fn cmp_op() -> impl Strategy<Value = CmpOp> {
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

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn tree_matches_model(
        ops in proptest::collection::vec(op(), 1..200),
        leaf_order in 2u32..6,
        internal_order in 3u32..6,
    ) {
        let (_dir, mut tree) = int_tree(Some(leaf_order), Some(internal_order));
        let mut model: Vec<(i32, RecordId)> = Vec::new();
        let mut next = 0u32;

        for op in ops {
            match op {
                Op::Insert(key) => {
                    tree.insert(&k(key), rid(next)).unwrap();
                    model.push((key, rid(next)));
                    next += 1;
                }
                Op::Remove(pick) if !model.is_empty() => {
                    let (key, r) = model.swap_remove(pick % model.len());
                    prop_assert!(tree.remove(&k(key), r).unwrap());
                    prop_assert!(!tree.contains(&k(key), r).unwrap());
                }
                Op::Remove(pick) => {
                    prop_assert!(!tree.remove(&k(pick as i32 % 40), rid(0)).unwrap());
                }
            }
            let stats = tree.check_invariants().unwrap();
            prop_assert_eq!(stats.entries, model.len());
        }

        let mut scanned: Vec<(i32, RecordId)> = tree
            .scan_all()
            .unwrap()
            .into_iter()
            .map(|(values, r)| match values[0] {
                Value::Int(v) => (v, r),
                _ => (i32::MIN, r),
            })
            .collect();
        let keys: Vec<i32> = scanned.iter().map(|(key, _)| *key).collect();
        prop_assert!(keys.windows(2).all(|w| w[0] <= w[1]));
        scanned.sort();
        model.sort();
        prop_assert_eq!(scanned, model);
    }

    #[test]
    fn value_select_matches_brute_force(
        rows in proptest::collection::vec((0..4i32, 0..12i32), 0..80),
        prefix in proptest::option::of(0..4i32),
        begin in proptest::option::of(0..12i32),
        lower in cmp_op(),
        end in proptest::option::of(0..12i32),
        upper in cmp_op(),
    ) {
        let (_dir, mut tree) = pair_tree(3);
        for (n, (a, b)) in rows.iter().enumerate() {
            tree.insert(&[Value::Int(*a), Value::Int(*b)], rid(n as u32)).unwrap();
        }

        let eq: Vec<Value> = prefix.iter().map(|a| Value::Int(*a)).collect();
        let begin_value = begin.map(Value::Int);
        let end_value = end.map(Value::Int);
        let mut got = tree
            .value_select(&eq, begin_value.as_ref(), lower, end_value.as_ref(), upper)
            .unwrap();
        got.sort();

        let expected: Vec<RecordId> = rows
            .iter()
            .enumerate()
            .filter(|(_, (a, b))| {
                let ranged = match prefix {
                    Some(p) if *a != p => return false,
                    Some(_) => *b,
                    None => *a,
                };
                begin.is_none_or(|v| lower.holds(ranged.cmp(&v)))
                    && end.is_none_or(|v| upper.holds(ranged.cmp(&v)))
            })
            .map(|(n, _)| rid(n as u32))
            .collect();
        let mut expected = expected;
        expected.sort();
        prop_assert_eq!(got, expected);
    }
}
