//! B+Tree node definitions and their page layout.
//!
//! Every node fills one page. The first byte holds the node kind and bytes
//! 4..8 the entry count; the rest depends on the kind:
//!
//! ```text
//! internal: | hdr | key[0] .. key[cap-2]        | child[0] .. child[cap-1] |
//! leaf:     | hdr | (key, page, slot)[0 .. cap]  | prev | next |
//! ```

use common::{DbError, DbResult, PageId, RecordId};
use storage::{PAGE_SIZE, codec};

const KIND_INTERNAL: u8 = 1;
const KIND_LEAF: u8 = 2;
const NODE_HEADER: usize = 8;
const PTR_WIDTH: usize = 4;
const RID_WIDTH: usize = 8;

/// The type of a B+Tree node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeType {
    Internal,
    Leaf,
}

/// A B+Tree node, either internal or leaf.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BTreeNode {
    /// Internal node with `n` separator keys and `n + 1` children.
    Internal {
        keys: Vec<Vec<u8>>,
        children: Vec<PageId>,
    },
    /// Leaf node with entries in key order, linked to its neighbours.
    Leaf {
        entries: Vec<(Vec<u8>, RecordId)>,
        prev: PageId,
        next: PageId,
    },
}

impl BTreeNode {
    pub fn new_leaf() -> Self {
        Self::Leaf {
            entries: Vec::new(),
            prev: PageId::NONE,
            next: PageId::NONE,
        }
    }

    pub fn new_internal(keys: Vec<Vec<u8>>, children: Vec<PageId>) -> Self {
        Self::Internal { keys, children }
    }

    pub fn node_type(&self) -> NodeType {
        match self {
            Self::Internal { .. } => NodeType::Internal,
            Self::Leaf { .. } => NodeType::Leaf,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Self::Leaf { .. })
    }

    /// Separator keys of an internal node, entries of a leaf.
    pub fn len(&self) -> usize {
        match self {
            Self::Internal { keys, .. } => keys.len(),
            Self::Leaf { entries, .. } => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Node capacities for one key width.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NodeLayout {
    pub key_len: usize,
    /// Maximum children of an internal node; it holds one key fewer.
    pub internal_cap: usize,
    pub leaf_cap: usize,
}

impl NodeLayout {
    /// Largest internal fan-out a page allows for `key_len`-byte keys.
    pub fn max_internal_cap(key_len: usize) -> usize {
        (PAGE_SIZE - NODE_HEADER + key_len) / (key_len + PTR_WIDTH)
    }

    /// Largest leaf capacity a page allows for `key_len`-byte keys.
    pub fn max_leaf_cap(key_len: usize) -> usize {
        (PAGE_SIZE - NODE_HEADER - 2 * PTR_WIDTH) / (key_len + RID_WIDTH)
    }

    /// Fewest entries a non-root leaf may hold: `ceil(leaf_cap / 2) - 1`, but
    /// never zero so that no leaf is left empty.
    pub fn leaf_min(&self) -> usize {
        self.leaf_cap.div_ceil(2).saturating_sub(1).max(1)
    }

    /// Fewest keys a non-root internal node may hold.
    pub fn internal_min(&self) -> usize {
        (self.internal_cap - 1) / 2
    }

    pub fn max_internal_keys(&self) -> usize {
        self.internal_cap - 1
    }

    fn children_offset(&self) -> usize {
        NODE_HEADER + self.max_internal_keys() * self.key_len
    }

    fn entry_width(&self) -> usize {
        self.key_len + RID_WIDTH
    }

    fn links_offset(&self) -> usize {
        NODE_HEADER + self.leaf_cap * self.entry_width()
    }

    pub fn decode(&self, buf: &[u8]) -> DbResult<BTreeNode> {
        let kind = *buf
            .first()
            .ok_or_else(|| DbError::Index("empty node buffer".into()))?;
        let size = codec::read_u32(buf, 4)? as usize;
        match kind {
            KIND_INTERNAL => {
                if size > self.max_internal_keys() {
                    return Err(corrupt("internal", size));
                }
                let keys = (0..size)
                    .map(|i| {
                        codec::slice(buf, NODE_HEADER + i * self.key_len, self.key_len)
                            .map(<[u8]>::to_vec)
                    })
                    .collect::<DbResult<Vec<_>>>()?;
                let base = self.children_offset();
                let children = (0..=size)
                    .map(|i| codec::read_u32(buf, base + i * PTR_WIDTH).map(PageId))
                    .collect::<DbResult<Vec<_>>>()?;
                Ok(BTreeNode::Internal { keys, children })
            }
            KIND_LEAF => {
                if size > self.leaf_cap {
                    return Err(corrupt("leaf", size));
                }
                let entries = (0..size)
                    .map(|i| -> DbResult<(Vec<u8>, RecordId)> {
                        let at = NODE_HEADER + i * self.entry_width();
                        let key = codec::slice(buf, at, self.key_len)?.to_vec();
                        let page = codec::read_u32(buf, at + self.key_len)?;
                        let slot = codec::read_u32(buf, at + self.key_len + 4)?;
                        Ok((key, RecordId::new(page, slot)))
                    })
                    .collect::<DbResult<Vec<_>>>()?;
                let links = self.links_offset();
                Ok(BTreeNode::Leaf {
                    entries,
                    prev: PageId(codec::read_u32(buf, links)?),
                    next: PageId(codec::read_u32(buf, links + PTR_WIDTH)?),
                })
            }
            other => Err(DbError::Index(format!("unknown node kind {other}"))),
        }
    }

    /// Write `node` over the front of `buf`. Unused slots are left as they were.
    pub fn encode(&self, node: &BTreeNode, buf: &mut [u8]) -> DbResult<()> {
        match node {
            BTreeNode::Internal { keys, children } => self.encode_internal(keys, children, buf),
            BTreeNode::Leaf {
                entries,
                prev,
                next,
            } => self.encode_leaf(entries, *prev, *next, buf),
        }
    }

    pub fn encode_internal(
        &self,
        keys: &[Vec<u8>],
        children: &[PageId],
        buf: &mut [u8],
    ) -> DbResult<()> {
        if keys.len() > self.max_internal_keys() || children.len() != keys.len() + 1 {
            return Err(DbError::Index(format!(
                "internal node with {} keys and {} children does not fit",
                keys.len(),
                children.len()
            )));
        }
        header(buf, KIND_INTERNAL, keys.len())?;
        for (i, key) in keys.iter().enumerate() {
            self.put_key(buf, NODE_HEADER + i * self.key_len, key)?;
        }
        let base = self.children_offset();
        for (i, child) in children.iter().enumerate() {
            codec::write_u32(buf, base + i * PTR_WIDTH, child.0)?;
        }
        Ok(())
    }

    pub fn encode_leaf(
        &self,
        entries: &[(Vec<u8>, RecordId)],
        prev: PageId,
        next: PageId,
        buf: &mut [u8],
    ) -> DbResult<()> {
        if entries.len() > self.leaf_cap {
            return Err(corrupt("leaf", entries.len()));
        }
        header(buf, KIND_LEAF, entries.len())?;
        for (i, (key, rid)) in entries.iter().enumerate() {
            let at = NODE_HEADER + i * self.entry_width();
            self.put_key(buf, at, key)?;
            codec::write_u32(buf, at + self.key_len, rid.page_id.0)?;
            codec::write_u32(buf, at + self.key_len + 4, rid.slot)?;
        }
        let links = self.links_offset();
        codec::write_u32(buf, links, prev.0)?;
        codec::write_u32(buf, links + PTR_WIDTH, next.0)
    }

    fn put_key(&self, buf: &mut [u8], at: usize, key: &[u8]) -> DbResult<()> {
        if key.len() != self.key_len {
            return Err(DbError::Index(format!(
                "key of {} bytes in a {}-byte slot",
                key.len(),
                self.key_len
            )));
        }
        codec::slice_mut(buf, at, self.key_len)?.copy_from_slice(key);
        Ok(())
    }
}

fn header(buf: &mut [u8], kind: u8, size: usize) -> DbResult<()> {
    codec::slice_mut(buf, 0, NODE_HEADER)?.fill(0);
    buf[0] = kind;
    codec::write_u32(buf, 4, size as u32)
}

fn corrupt(kind: &str, size: usize) -> DbError {
    DbError::Index(format!("{kind} node size {size} exceeds its capacity"))
}
