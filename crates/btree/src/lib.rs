//! B+Tree index over fixed-width composite keys.
//!
//! Nodes are records of a dedicated [`RecordStore`] whose slots are one page
//! wide, so a node is addressed by its record page number. Record 0 holds the
//! [`IndexHeader`], which leaves node number 0 free to act as the null pointer.
//!
//! Nodes carry no parent pointers. Every mutation descends from the root and
//! keeps the path it took; rebalancing walks that path back up.

mod header;
mod key;
mod node;

pub use header::IndexHeader;
pub use key::KeySchema;
pub use node::{BTreeNode, NodeLayout, NodeType};

use std::cmp::Ordering;

use buffer::{FilePager, Pager, SharedPager};
use common::{ColumnId, DbError, DbResult, PageId, RecordId};
use record::{RecordStore, StoreOptions};
use storage::PAGE_SIZE;
use tracing::{debug, trace};
use types::{CmpOp, SqlType, Value};

const HEADER_RECORD: RecordId = RecordId {
    page_id: PageId(0),
    slot: 0,
};
const MIN_LEAF_ORDER: u32 = 2;
const MIN_INTERNAL_ORDER: u32 = 3;

type Entries = Vec<(Vec<u8>, RecordId)>;

/// Shape of a new index.
#[derive(Clone, Debug, bon::Builder)]
pub struct IndexOptions {
    /// Table whose records the index points into.
    #[builder(into)]
    pub table_name: String,
    pub column_ids: Vec<ColumnId>,
    pub column_types: Vec<SqlType>,
    /// Bit `i` set when key column `i` may hold nulls.
    #[builder(default)]
    pub null_mask: u32,
    #[builder(default)]
    pub unique: bool,
    /// Cap on leaf entries. `None` fills the page.
    pub leaf_order: Option<u32>,
    /// Cap on internal-node children. `None` fills the page.
    pub internal_order: Option<u32>,
}

/// Shape summary returned by [`IndexTree::check_invariants`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TreeStats {
    pub height: u32,
    pub leaves: usize,
    pub internal_nodes: usize,
    pub entries: usize,
}

/// One step of a root-to-leaf descent.
#[derive(Clone, Copy, Debug)]
struct PathEntry {
    page: PageId,
    child_idx: usize,
}

struct Leaf {
    page: PageId,
    entries: Entries,
    prev: PageId,
    next: PageId,
}

struct Internal {
    page: PageId,
    keys: Vec<Vec<u8>>,
    children: Vec<PageId>,
}

/// Position inside the leaf chain. Holds a copy of the current leaf.
struct Cursor {
    page: PageId,
    entries: Entries,
    next: PageId,
    pos: usize,
}

impl Cursor {
    fn entry(&self) -> Option<&(Vec<u8>, RecordId)> {
        self.entries.get(self.pos)
    }
}

/// A persistent B+Tree mapping composite keys to record ids.
///
/// Duplicate keys are allowed unless the index is unique; entries with equal
/// keys are told apart by their record id.
pub struct IndexTree<P: Pager = FilePager> {
    nodes: RecordStore<P>,
    header: IndexHeader,
    schema: KeySchema,
    layout: NodeLayout,
    height: u32,
}

impl<P: Pager> IndexTree<P> {
    /// Create an empty index in a fresh file, replacing any file of the same name.
    pub fn create(pager: SharedPager<P>, name: &str, options: IndexOptions) -> DbResult<Self> {
        if options.column_types.is_empty()
            || options.column_types.len() != options.column_ids.len()
        {
            return Err(DbError::Config(format!(
                "index needs one type per column, got {} types for {} columns",
                options.column_types.len(),
                options.column_ids.len()
            )));
        }
        let schema = KeySchema::with_null_mask(options.column_types.clone(), options.null_mask);
        let key_len = schema.key_len();
        let max_leaf = NodeLayout::max_leaf_cap(key_len) as u32;
        let max_internal = NodeLayout::max_internal_cap(key_len) as u32;
        if max_leaf < MIN_LEAF_ORDER || max_internal < MIN_INTERNAL_ORDER {
            return Err(DbError::Capacity(format!(
                "{key_len}-byte keys leave no room for a usable node"
            )));
        }
        let leaf_order = order(options.leaf_order, MIN_LEAF_ORDER, max_leaf, "leaf")?;
        let internal_order = order(
            options.internal_order,
            MIN_INTERNAL_ORDER,
            max_internal,
            "internal",
        )?;

        let header = IndexHeader {
            record_length: key_len as u32,
            entry_count: 0,
            null_mask: options.null_mask,
            internal_order,
            leaf_order,
            internal_cap: internal_order.min(max_internal),
            leaf_cap: leaf_order.min(max_leaf),
            root_page: PageId::NONE,
            unique: options.unique,
            column_types: options.column_types,
            table_name: options.table_name,
            column_ids: options.column_ids,
        };
        let encoded = header.encode()?;

        let store_options = StoreOptions::builder()
            .record_length(PAGE_SIZE as u32)
            .slots_per_page(1)
            .build();
        let mut nodes = RecordStore::create(pager, name, store_options)?;
        let rid = nodes.insert(&encoded)?;
        if rid != HEADER_RECORD {
            return Err(DbError::Index(format!("index header landed at {rid}")));
        }

        let layout = layout_of(&header);
        debug!(
            name,
            key_len,
            leaf_cap = layout.leaf_cap,
            internal_cap = layout.internal_cap,
            "index created"
        );
        Ok(Self {
            nodes,
            header,
            schema,
            layout,
            height: 0,
        })
    }

    /// Open an existing index.
    pub fn open(pager: SharedPager<P>, name: &str) -> DbResult<Self> {
        let nodes = RecordStore::open(pager, name)?;
        if nodes.record_length() != PAGE_SIZE || nodes.slots_per_page() != 1 {
            return Err(DbError::Index(format!("{name} is not an index file")));
        }
        let header = IndexHeader::decode(&nodes.get(HEADER_RECORD)?.data)?;
        let layout = layout_of(&header);
        let key_len = layout.key_len;
        let leaf_range = MIN_LEAF_ORDER as usize..=NodeLayout::max_leaf_cap(key_len);
        let internal_range = MIN_INTERNAL_ORDER as usize..=NodeLayout::max_internal_cap(key_len);
        if !leaf_range.contains(&layout.leaf_cap) || !internal_range.contains(&layout.internal_cap)
        {
            return Err(DbError::Index(format!(
                "{name} records capacities leaf {} / internal {} for {key_len}-byte keys",
                layout.leaf_cap, layout.internal_cap
            )));
        }

        let schema = KeySchema::with_null_mask(header.column_types.clone(), header.null_mask);
        let mut tree = Self {
            nodes,
            header,
            schema,
            layout,
            height: 0,
        };
        tree.height = tree.measure_height()?;
        debug!(name, entries = tree.len(), height = tree.height, "index opened");
        Ok(tree)
    }

    pub fn header(&self) -> &IndexHeader {
        &self.header
    }

    pub fn schema(&self) -> &KeySchema {
        &self.schema
    }

    pub fn layout(&self) -> NodeLayout {
        self.layout
    }

    pub fn table_name(&self) -> &str {
        &self.header.table_name
    }

    pub fn column_ids(&self) -> &[ColumnId] {
        &self.header.column_ids
    }

    pub fn is_unique(&self) -> bool {
        self.header.unique
    }

    /// Number of entries.
    pub fn len(&self) -> u32 {
        self.header.entry_count
    }

    pub fn is_empty(&self) -> bool {
        self.header.entry_count == 0
    }

    /// Levels from root to leaf; 0 before the first insert.
    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn flush(&self) -> DbResult<()> {
        self.nodes.flush()
    }

    /// Add an entry. Fails with `Constraint` on a duplicate key in a unique
    /// index or a null in a column that does not allow it. Keys holding a
    /// null never count as duplicates.
    pub fn insert(&mut self, values: &[Value], rid: RecordId) -> DbResult<()> {
        if let Some(col) =
            (0..values.len()).find(|&c| values[c].is_null() && !self.schema.is_nullable(c))
        {
            return Err(DbError::Constraint(format!(
                "column {col} of index on {} does not allow nulls",
                self.header.table_name
            )));
        }
        let key = self.schema.encode(values)?;
        if self.header.unique && !values.iter().any(Value::is_null) && self.key_exists(&key)? {
            return Err(DbError::Constraint(format!(
                "duplicate key {values:?} in unique index on {}",
                self.header.table_name
            )));
        }

        if self.header.root_page.is_none() {
            let root = self.alloc_node(&BTreeNode::Leaf {
                entries: vec![(key, rid)],
                prev: PageId::NONE,
                next: PageId::NONE,
            })?;
            self.header.root_page = root;
            self.height = 1;
            debug!(root = root.0, "root leaf created");
        } else {
            let (path, leaf_page) = self.descend(&key, self.schema.column_count())?;
            let mut leaf = self.read_leaf(leaf_page)?;
            // Equal keys keep their insertion order.
            let pos = leaf
                .entries
                .iter()
                .position(|(k, _)| self.schema.compare(k, &key).is_gt())
                .unwrap_or(leaf.entries.len());
            leaf.entries.insert(pos, (key, rid));

            if leaf.entries.len() <= self.layout.leaf_cap {
                self.write_leaf(&leaf)?;
            } else {
                let (separator, right) = self.split_leaf(leaf)?;
                self.insert_into_parent(path, separator, right)?;
            }
        }

        self.header.entry_count += 1;
        self.save_header()
    }

    /// Remove the entry `(values, rid)`. Returns false when it is absent.
    pub fn remove(&mut self, values: &[Value], rid: RecordId) -> DbResult<bool> {
        let key = self.schema.encode(values)?;
        let Some((leaf_page, pos)) = self.locate_entry(&key, rid)? else {
            return Ok(false);
        };
        let path = self.locate_path(&key, leaf_page)?.ok_or_else(|| {
            DbError::Index(format!("leaf {} is unreachable from the root", leaf_page.0))
        })?;

        let mut leaf = self.read_leaf(leaf_page)?;
        leaf.entries.remove(pos);
        if path.is_empty() || leaf.entries.len() >= self.layout.leaf_min() {
            // The parent separator is left alone even if it was this key.
            self.write_leaf(&leaf)?;
        } else {
            self.rebalance_leaf(path, leaf)?;
        }

        self.header.entry_count -= 1;
        self.save_header()?;
        Ok(true)
    }

    /// Whether the exact entry `(values, rid)` is present.
    pub fn contains(&self, values: &[Value], rid: RecordId) -> DbResult<bool> {
        let key = self.schema.encode(values)?;
        Ok(self.locate_entry(&key, rid)?.is_some())
    }

    /// Record ids of all entries whose leading columns equal `prefix`.
    pub fn find(&self, prefix: &[Value]) -> DbResult<Vec<RecordId>> {
        self.value_select(prefix, None, CmpOp::Any, None, CmpOp::Any)
    }

    /// Range query over one column following an equality-matched prefix.
    ///
    /// Returns the record ids of entries whose first `eq.len()` columns equal
    /// `eq` and whose next column `c` satisfies `c <lower> begin` and
    /// `c <upper> end`. A missing bound matches everything.
    pub fn value_select(
        &self,
        eq: &[Value],
        begin: Option<&Value>,
        lower: CmpOp,
        end: Option<&Value>,
        upper: CmpOp,
    ) -> DbResult<Vec<RecordId>> {
        let ranged = eq.len();
        let ncols = self.schema.column_count();
        if ranged > ncols || (ranged == ncols && (begin.is_some() || end.is_some())) {
            return Err(DbError::Index(format!(
                "range over column {ranged} of a {ncols}-column key"
            )));
        }

        let eq_key = self.schema.encode_prefix(eq)?;
        let bound_key = |bound: Option<&Value>| {
            bound
                .map(|value| {
                    let mut values = eq.to_vec();
                    values.push(value.clone());
                    self.schema.encode_prefix(&values)
                })
                .transpose()
        };
        let lower_key = bound_key(begin)?;
        let upper_key = bound_key(end)?;
        let ops_with = |op: CmpOp| {
            let mut ops = vec![CmpOp::Eq; ranged];
            ops.push(op);
            ops
        };
        let (lower_ops, upper_ops) = (ops_with(lower), ops_with(upper));

        let cursor = match &lower_key {
            Some(key) if lower.bounds_below() => self.seek(key, ranged + 1)?,
            _ if ranged > 0 => self.seek(&eq_key, ranged)?,
            _ => self.seek_first()?,
        };
        let Some(mut cursor) = cursor else {
            return Ok(Vec::new());
        };

        let mut out = Vec::new();
        while let Some((key, rid)) = cursor.entry() {
            if self.schema.compare_prefix(key, &eq_key, ranged).is_ne() {
                break;
            }
            let past = |bound: &Option<Vec<u8>>, op: CmpOp| {
                bound.as_ref().is_some_and(|b| {
                    past_upper_bound(op, self.schema.compare_column(ranged, key, b))
                })
            };
            if past(&lower_key, lower) || past(&upper_key, upper) {
                break;
            }
            let hit = lower_key
                .as_ref()
                .is_none_or(|b| self.schema.satisfies(key, b, &lower_ops))
                && upper_key
                    .as_ref()
                    .is_none_or(|b| self.schema.satisfies(key, b, &upper_ops));
            if hit {
                out.push(*rid);
            }
            self.move_next(&mut cursor)?;
        }
        trace!(matches = out.len(), "value select");
        Ok(out)
    }

    /// Every entry in key order, read along the leaf chain.
    pub fn scan_all(&self) -> DbResult<Vec<(Vec<Value>, RecordId)>> {
        let mut out = Vec::with_capacity(self.len() as usize);
        let Some(mut cursor) = self.seek_first()? else {
            return Ok(out);
        };
        while let Some((key, rid)) = cursor.entry() {
            out.push((self.schema.decode(key)?, *rid));
            self.move_next(&mut cursor)?;
        }
        Ok(out)
    }

    /// Walk the whole tree and verify its structure.
    ///
    /// Checks that every leaf sits at the same depth, node occupancy stays
    /// within bounds, keys respect their separators, and the leaf chain is
    /// sorted and holds exactly `len()` entries.
    pub fn check_invariants(&self) -> DbResult<TreeStats> {
        let mut stats = TreeStats {
            height: self.height,
            ..TreeStats::default()
        };
        if self.header.root_page.is_none() {
            if self.height != 0 || self.header.entry_count != 0 {
                return Err(DbError::Index("tree without root has entries".into()));
            }
            return Ok(stats);
        }

        let mut leaves = Vec::new();
        self.check_node(self.header.root_page, 1, None, None, &mut stats, &mut leaves)?;

        let mut prev = PageId::NONE;
        let mut last: Option<Vec<u8>> = None;
        for (idx, page) in leaves.iter().enumerate() {
            let leaf = self.read_leaf(*page)?;
            let next = leaves.get(idx + 1).copied().unwrap_or(PageId::NONE);
            if leaf.prev != prev || leaf.next != next {
                return Err(DbError::Index(format!(
                    "leaf {} links ({}, {}), expected ({}, {})",
                    page.0, leaf.prev.0, leaf.next.0, prev.0, next.0
                )));
            }
            for (key, _) in &leaf.entries {
                if let Some(last) = &last
                    && self.schema.compare(last, key).is_gt()
                {
                    return Err(DbError::Index(format!("leaf {} is out of order", page.0)));
                }
                last = Some(key.clone());
            }
            prev = *page;
        }

        if stats.entries != self.header.entry_count as usize {
            return Err(DbError::Index(format!(
                "leaf chain holds {} entries, header counts {}",
                stats.entries, self.header.entry_count
            )));
        }
        Ok(stats)
    }

    fn check_node(
        &self,
        page: PageId,
        depth: u32,
        lower: Option<&[u8]>,
        upper: Option<&[u8]>,
        stats: &mut TreeStats,
        leaves: &mut Vec<PageId>,
    ) -> DbResult<()> {
        let is_root = depth == 1;
        let in_bounds = |key: &[u8]| {
            lower.is_none_or(|lo| self.schema.compare(key, lo).is_ge())
                && upper.is_none_or(|hi| self.schema.compare(key, hi).is_le())
        };
        match self.read_node(page)? {
            BTreeNode::Leaf { entries, .. } => {
                if depth != self.height {
                    return Err(DbError::Index(format!(
                        "leaf {} at depth {depth} in a tree of height {}",
                        page.0, self.height
                    )));
                }
                let occupancy = self.layout.leaf_min()..=self.layout.leaf_cap;
                if !is_root && !occupancy.contains(&entries.len()) {
                    return Err(DbError::Index(format!(
                        "leaf {} holds {} entries, allowed {occupancy:?}",
                        page.0,
                        entries.len()
                    )));
                }
                if let Some((_, rid)) = entries.iter().find(|(k, _)| !in_bounds(k.as_slice())) {
                    return Err(DbError::Index(format!(
                        "entry {rid} in leaf {} lies outside its separators",
                        page.0
                    )));
                }
                stats.leaves += 1;
                stats.entries += entries.len();
                leaves.push(page);
            }
            BTreeNode::Internal { keys, children } => {
                let occupancy = self.layout.internal_min()..=self.layout.max_internal_keys();
                if keys.is_empty() || (!is_root && !occupancy.contains(&keys.len())) {
                    return Err(DbError::Index(format!(
                        "internal node {} holds {} keys, allowed {occupancy:?}",
                        page.0,
                        keys.len()
                    )));
                }
                let ordered = keys
                    .windows(2)
                    .all(|w| self.schema.compare(&w[0], &w[1]).is_le());
                if !ordered || !keys.iter().all(|k| in_bounds(k.as_slice())) {
                    return Err(DbError::Index(format!(
                        "separators of node {} are out of order",
                        page.0
                    )));
                }
                stats.internal_nodes += 1;
                for (idx, child) in children.iter().enumerate() {
                    let lo = match idx {
                        0 => lower,
                        _ => Some(keys[idx - 1].as_slice()),
                    };
                    let hi = keys.get(idx).map(Vec::as_slice).or(upper);
                    self.check_node(*child, depth + 1, lo, hi, stats, leaves)?;
                }
            }
        }
        Ok(())
    }

    // ---- Descent and the leaf chain ----

    /// Follow the first separator not less than `key` down to a leaf.
    fn descend(&self, key: &[u8], ncols: usize) -> DbResult<(Vec<PathEntry>, PageId)> {
        let mut path = Vec::with_capacity(self.height as usize);
        let mut page = self.header.root_page;
        loop {
            match self.read_node(page)? {
                BTreeNode::Internal { keys, children } => {
                    let child_idx = keys
                        .iter()
                        .position(|k| self.schema.compare_prefix(k, key, ncols).is_ge())
                        .unwrap_or(keys.len());
                    path.push(PathEntry { page, child_idx });
                    page = children[child_idx];
                }
                BTreeNode::Leaf { .. } => {
                    trace!(leaf = page.0, depth = path.len(), "descended");
                    return Ok((path, page));
                }
            }
        }
    }

    /// Cursor at the first entry whose leading `ncols` columns are not less
    /// than `key`. `None` when the tree has no nodes.
    fn seek(&self, key: &[u8], ncols: usize) -> DbResult<Option<Cursor>> {
        if self.header.root_page.is_none() {
            return Ok(None);
        }
        let (_, page) = self.descend(key, ncols)?;
        let leaf = self.read_leaf(page)?;
        let pos = leaf
            .entries
            .iter()
            .position(|(k, _)| self.schema.compare_prefix(k, key, ncols).is_ge())
            .unwrap_or(leaf.entries.len());
        self.cursor_at(leaf, pos).map(Some)
    }

    fn seek_first(&self) -> DbResult<Option<Cursor>> {
        if self.header.root_page.is_none() {
            return Ok(None);
        }
        let mut page = self.header.root_page;
        while let BTreeNode::Internal { children, .. } = self.read_node(page)? {
            page = children[0];
        }
        let leaf = self.read_leaf(page)?;
        self.cursor_at(leaf, 0).map(Some)
    }

    fn cursor_at(&self, leaf: Leaf, pos: usize) -> DbResult<Cursor> {
        let mut cursor = Cursor {
            page: leaf.page,
            entries: leaf.entries,
            next: leaf.next,
            pos,
        };
        self.settle(&mut cursor)?;
        Ok(cursor)
    }

    fn move_next(&self, cursor: &mut Cursor) -> DbResult<()> {
        cursor.pos += 1;
        self.settle(cursor)
    }

    /// Follow next pointers while the cursor is past the end of its leaf.
    fn settle(&self, cursor: &mut Cursor) -> DbResult<()> {
        while cursor.pos >= cursor.entries.len() && !cursor.next.is_none() {
            let leaf = self.read_leaf(cursor.next)?;
            *cursor = Cursor {
                page: leaf.page,
                entries: leaf.entries,
                next: leaf.next,
                pos: 0,
            };
        }
        Ok(())
    }

    fn key_exists(&self, key: &[u8]) -> DbResult<bool> {
        let found = self.seek(key, self.schema.column_count())?;
        Ok(found
            .as_ref()
            .and_then(Cursor::entry)
            .is_some_and(|(k, _)| self.schema.compare(k, key).is_eq()))
    }

    /// Leaf and position of the exact entry `(key, rid)`.
    fn locate_entry(&self, key: &[u8], rid: RecordId) -> DbResult<Option<(PageId, usize)>> {
        let Some(mut cursor) = self.seek(key, self.schema.column_count())? else {
            return Ok(None);
        };
        while let Some((k, r)) = cursor.entry() {
            if self.schema.compare(k, key).is_ne() {
                break;
            }
            if *r == rid {
                return Ok(Some((cursor.page, cursor.pos)));
            }
            self.move_next(&mut cursor)?;
        }
        Ok(None)
    }

    /// Root-to-parent path of `target`, searching only subtrees whose
    /// separators admit `key`.
    fn locate_path(&self, key: &[u8], target: PageId) -> DbResult<Option<Vec<PathEntry>>> {
        let mut path = Vec::with_capacity(self.height as usize);
        let found = self.path_to(self.header.root_page, key, target, &mut path)?;
        Ok(found.then_some(path))
    }

    fn path_to(
        &self,
        page: PageId,
        key: &[u8],
        target: PageId,
        path: &mut Vec<PathEntry>,
    ) -> DbResult<bool> {
        if page == target {
            return Ok(true);
        }
        let BTreeNode::Internal { keys, children } = self.read_node(page)? else {
            return Ok(false);
        };
        let first_ge = keys
            .iter()
            .position(|k| self.schema.compare(k, key).is_ge())
            .unwrap_or(keys.len());
        let first_gt = keys
            .iter()
            .position(|k| self.schema.compare(k, key).is_gt())
            .unwrap_or(keys.len());
        for child_idx in first_ge..=first_gt {
            path.push(PathEntry { page, child_idx });
            if self.path_to(children[child_idx], key, target, path)? {
                return Ok(true);
            }
            path.pop();
        }
        Ok(false)
    }

    fn measure_height(&self) -> DbResult<u32> {
        if self.header.root_page.is_none() {
            return Ok(0);
        }
        let mut height = 1;
        let mut page = self.header.root_page;
        while let BTreeNode::Internal { children, .. } = self.read_node(page)? {
            page = children[0];
            height += 1;
        }
        Ok(height)
    }

    // ---- Splits ----

    /// Move the upper half of an overfull leaf into a new right sibling.
    /// Returns the separator to promote and the sibling's page.
    fn split_leaf(&mut self, mut leaf: Leaf) -> DbResult<(Vec<u8>, PageId)> {
        let keep = leaf.entries.len().div_ceil(2);
        let right_entries = leaf.entries.split_off(keep);
        let separator = right_entries
            .first()
            .map(|(k, _)| k.clone())
            .ok_or_else(|| DbError::Index("leaf split produced an empty sibling".into()))?;

        let right = self.alloc_node(&BTreeNode::Leaf {
            entries: right_entries,
            prev: leaf.page,
            next: leaf.next,
        })?;
        if !leaf.next.is_none() {
            self.set_prev(leaf.next, right)?;
        }
        leaf.next = right;
        self.write_leaf(&leaf)?;
        debug!(left = leaf.page.0, right = right.0, "leaf split");
        Ok((separator, right))
    }

    /// Insert `separator`/`right` into each ancestor on `path`, splitting full
    /// ancestors and growing a new root when the old one splits.
    fn insert_into_parent(
        &mut self,
        mut path: Vec<PathEntry>,
        mut separator: Vec<u8>,
        mut right: PageId,
    ) -> DbResult<()> {
        while let Some(PathEntry { page, child_idx }) = path.pop() {
            let mut node = self.read_internal(page)?;
            node.keys.insert(child_idx, separator);
            node.children.insert(child_idx + 1, right);
            if node.keys.len() <= self.layout.max_internal_keys() {
                return self.write_internal(&node);
            }

            let mid = node.keys.len() / 2;
            let right_keys = node.keys.split_off(mid + 1);
            let right_children = node.children.split_off(mid + 1);
            separator = node
                .keys
                .pop()
                .ok_or_else(|| DbError::Index("internal split without a median".into()))?;
            right = self.alloc_node(&BTreeNode::Internal {
                keys: right_keys,
                children: right_children,
            })?;
            self.write_internal(&node)?;
            debug!(left = page.0, right = right.0, "internal split");
        }

        let old_root = self.header.root_page;
        let root = self.alloc_node(&BTreeNode::Internal {
            keys: vec![separator],
            children: vec![old_root, right],
        })?;
        self.header.root_page = root;
        self.height += 1;
        debug!(root = root.0, height = self.height, "root split");
        Ok(())
    }

    // ---- Underflow ----

    fn rebalance_leaf(&mut self, mut path: Vec<PathEntry>, mut leaf: Leaf) -> DbResult<()> {
        let Some(PathEntry {
            page: parent_page,
            child_idx: i,
        }) = path.pop()
        else {
            return self.write_leaf(&leaf);
        };
        let mut parent = self.read_internal(parent_page)?;
        let min = self.layout.leaf_min();

        let mut left = match i.checked_sub(1) {
            Some(l) => Some(self.read_leaf(parent.children[l])?),
            None => None,
        };
        if let Some(left) = left.as_mut().filter(|l| l.entries.len() > min)
            && let Some(moved) = left.entries.pop()
        {
            leaf.entries.insert(0, moved);
            parent.keys[i - 1] = leaf.entries[0].0.clone();
            self.write_leaf(left)?;
            self.write_leaf(&leaf)?;
            debug!(from = left.page.0, to = leaf.page.0, "leaf borrowed from left");
            return self.write_internal(&parent);
        }

        let mut right = match parent.children.get(i + 1) {
            Some(&r) => Some(self.read_leaf(r)?),
            None => None,
        };
        if let Some(right) = right.as_mut().filter(|r| r.entries.len() > min) {
            let moved = right.entries.remove(0);
            leaf.entries.push(moved);
            parent.keys[i] = right.entries[0].0.clone();
            self.write_leaf(right)?;
            self.write_leaf(&leaf)?;
            debug!(from = right.page.0, to = leaf.page.0, "leaf borrowed from right");
            return self.write_internal(&parent);
        }

        if let Some(mut left) = left {
            left.entries.append(&mut leaf.entries);
            left.next = leaf.next;
            if !leaf.next.is_none() {
                self.set_prev(leaf.next, left.page)?;
            }
            self.write_leaf(&left)?;
            self.release_node(leaf.page)?;
            parent.keys.remove(i - 1);
            parent.children.remove(i);
            debug!(into = left.page.0, freed = leaf.page.0, "leaves merged");
        } else if let Some(mut right) = right {
            leaf.entries.append(&mut right.entries);
            leaf.next = right.next;
            if !right.next.is_none() {
                self.set_prev(right.next, leaf.page)?;
            }
            self.write_leaf(&leaf)?;
            self.release_node(right.page)?;
            parent.keys.remove(i);
            parent.children.remove(i + 1);
            debug!(into = leaf.page.0, freed = right.page.0, "leaves merged");
        } else {
            return Err(DbError::Index(format!(
                "internal node {} has a single child",
                parent.page.0
            )));
        }
        self.rebalance_internal(path, parent)
    }

    /// Write back an internal node that just lost a key, fixing underflow by
    /// rotating through the parent or merging with a sibling.
    fn rebalance_internal(&mut self, mut path: Vec<PathEntry>, mut node: Internal) -> DbResult<()> {
        let Some(PathEntry {
            page: parent_page,
            child_idx: i,
        }) = path.pop()
        else {
            if node.keys.is_empty() {
                let child = node.children[0];
                self.release_node(node.page)?;
                self.header.root_page = child;
                self.height -= 1;
                debug!(root = child.0, height = self.height, "root collapsed");
                return Ok(());
            }
            return self.write_internal(&node);
        };
        let min = self.layout.internal_min();
        if node.keys.len() >= min {
            return self.write_internal(&node);
        }
        let mut parent = self.read_internal(parent_page)?;

        let mut left = match i.checked_sub(1) {
            Some(l) => Some(self.read_internal(parent.children[l])?),
            None => None,
        };
        if let Some(left) = left.as_mut().filter(|l| l.keys.len() > min)
            && let (Some(key), Some(child)) = (left.keys.pop(), left.children.pop())
        {
            let separator = std::mem::replace(&mut parent.keys[i - 1], key);
            node.keys.insert(0, separator);
            node.children.insert(0, child);
            self.write_internal(left)?;
            self.write_internal(&node)?;
            debug!(from = left.page.0, to = node.page.0, "internal rotated right");
            return self.write_internal(&parent);
        }

        let mut right = match parent.children.get(i + 1) {
            Some(&r) => Some(self.read_internal(r)?),
            None => None,
        };
        if let Some(right) = right.as_mut().filter(|r| r.keys.len() > min) {
            let key = right.keys.remove(0);
            let child = right.children.remove(0);
            let separator = std::mem::replace(&mut parent.keys[i], key);
            node.keys.push(separator);
            node.children.push(child);
            self.write_internal(right)?;
            self.write_internal(&node)?;
            debug!(from = right.page.0, to = node.page.0, "internal rotated left");
            return self.write_internal(&parent);
        }

        if let Some(mut left) = left {
            let separator = parent.keys.remove(i - 1);
            parent.children.remove(i);
            left.keys.push(separator);
            left.keys.append(&mut node.keys);
            left.children.append(&mut node.children);
            self.write_internal(&left)?;
            self.release_node(node.page)?;
            debug!(into = left.page.0, freed = node.page.0, "internal nodes merged");
        } else if let Some(mut right) = right {
            let separator = parent.keys.remove(i);
            parent.children.remove(i + 1);
            node.keys.push(separator);
            node.keys.append(&mut right.keys);
            node.children.append(&mut right.children);
            self.write_internal(&node)?;
            self.release_node(right.page)?;
            debug!(into = node.page.0, freed = right.page.0, "internal nodes merged");
        } else {
            return Err(DbError::Index(format!(
                "internal node {} has a single child",
                parent.page.0
            )));
        }
        self.rebalance_internal(path, parent)
    }

    // ---- Node storage ----

    fn read_node(&self, page: PageId) -> DbResult<BTreeNode> {
        if page.is_none() {
            return Err(DbError::Index("followed a null node pointer".into()));
        }
        let record = self.nodes.get(node_rid(page))?;
        self.layout.decode(&record.data)
    }

    fn read_leaf(&self, page: PageId) -> DbResult<Leaf> {
        match self.read_node(page)? {
            BTreeNode::Leaf {
                entries,
                prev,
                next,
            } => Ok(Leaf {
                page,
                entries,
                prev,
                next,
            }),
            BTreeNode::Internal { .. } => Err(wrong_kind(page, NodeType::Leaf)),
        }
    }

    fn read_internal(&self, page: PageId) -> DbResult<Internal> {
        match self.read_node(page)? {
            BTreeNode::Internal { keys, children } => Ok(Internal {
                page,
                keys,
                children,
            }),
            BTreeNode::Leaf { .. } => Err(wrong_kind(page, NodeType::Internal)),
        }
    }

    fn write_leaf(&mut self, leaf: &Leaf) -> DbResult<()> {
        let mut buf = vec![0u8; PAGE_SIZE];
        self.layout
            .encode_leaf(&leaf.entries, leaf.prev, leaf.next, &mut buf)?;
        self.nodes.update(node_rid(leaf.page), &buf)
    }

    fn write_internal(&mut self, node: &Internal) -> DbResult<()> {
        let mut buf = vec![0u8; PAGE_SIZE];
        self.layout
            .encode_internal(&node.keys, &node.children, &mut buf)?;
        self.nodes.update(node_rid(node.page), &buf)
    }

    fn set_prev(&mut self, page: PageId, prev: PageId) -> DbResult<()> {
        let mut leaf = self.read_leaf(page)?;
        leaf.prev = prev;
        self.write_leaf(&leaf)
    }

    fn alloc_node(&mut self, node: &BTreeNode) -> DbResult<PageId> {
        let mut buf = vec![0u8; PAGE_SIZE];
        self.layout.encode(node, &mut buf)?;
        let rid = self.nodes.insert(&buf)?;
        trace!(page = rid.page_id.0, kind = ?node.node_type(), "node allocated");
        Ok(rid.page_id)
    }

    fn release_node(&mut self, page: PageId) -> DbResult<()> {
        if !self.nodes.delete(node_rid(page))? {
            return Err(DbError::Index(format!("node {} was already free", page.0)));
        }
        Ok(())
    }

    fn save_header(&mut self) -> DbResult<()> {
        let buf = self.header.encode()?;
        self.nodes.update(HEADER_RECORD, &buf)
    }
}

fn node_rid(page: PageId) -> RecordId {
    RecordId {
        page_id: page,
        slot: 0,
    }
}

fn layout_of(header: &IndexHeader) -> NodeLayout {
    NodeLayout {
        key_len: header.record_length as usize,
        internal_cap: header.internal_cap as usize,
        leaf_cap: header.leaf_cap as usize,
    }
}

fn order(requested: Option<u32>, min: u32, max: u32, kind: &str) -> DbResult<u32> {
    match requested {
        Some(order) if order < min => Err(DbError::Config(format!(
            "{kind} order {order} is below the minimum of {min}"
        ))),
        Some(order) => Ok(order),
        None => Ok(max),
    }
}

/// True when `op` fails for this ordering and every later key in ascending
/// order fails too.
fn past_upper_bound(op: CmpOp, ord: Ordering) -> bool {
    op.bounds_above() && !op.holds(ord) && ord.is_ge()
}

fn wrong_kind(page: PageId, expected: NodeType) -> DbError {
    DbError::Index(format!("node {} is not {expected:?}", page.0))
}

#[cfg(test)]
mod tests;
