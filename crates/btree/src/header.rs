//! Index metadata stored in the node store's reserved first record.

use bytes::{Buf, BufMut};
use common::{ColumnId, DbError, DbResult, PageId};
use storage::PAGE_SIZE;
use types::SqlType;

use crate::key::{nullable, slot_width};

/// Fixed words ahead of the per-column arrays.
const FIXED_WORDS: usize = 10;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexHeader {
    /// Key width: the sum of the indexed column slot widths.
    pub record_length: u32,
    pub entry_count: u32,
    pub null_mask: u32,
    pub internal_order: u32,
    pub leaf_order: u32,
    /// Maximum children of an internal node.
    pub internal_cap: u32,
    /// Maximum entries of a leaf.
    pub leaf_cap: u32,
    /// `PageId::NONE` while the tree has no nodes.
    pub root_page: PageId,
    pub unique: bool,
    pub column_types: Vec<SqlType>,
    pub table_name: String,
    pub column_ids: Vec<ColumnId>,
}

impl IndexHeader {
    /// Per-column key slot widths; nullable columns carry a presence byte.
    pub fn slot_widths(&self) -> impl Iterator<Item = usize> + '_ {
        self.column_types
            .iter()
            .enumerate()
            .map(|(col, ty)| slot_width(*ty, nullable(self.null_mask, col)))
    }

    pub fn encoded_len(&self) -> usize {
        let n = self.column_types.len();
        4 * FIXED_WORDS + n * 4 + n * 8 + 4 + self.table_name.len() + n * 2
    }

    pub fn encode(&self) -> DbResult<Vec<u8>> {
        if self.column_types.len() != self.column_ids.len() {
            return Err(DbError::Index(format!(
                "{} column types for {} column ids",
                self.column_types.len(),
                self.column_ids.len()
            )));
        }
        let len = self.encoded_len();
        if len > PAGE_SIZE {
            return Err(DbError::Capacity(format!(
                "index header needs {len} bytes, a page holds {PAGE_SIZE}"
            )));
        }

        let mut buf = Vec::with_capacity(len);
        for word in [
            self.record_length,
            self.entry_count,
            self.null_mask,
            self.internal_order,
            self.leaf_order,
            self.internal_cap,
            self.leaf_cap,
            self.root_page.0,
            self.unique as u32,
            self.column_types.len() as u32,
        ] {
            buf.put_u32_le(word);
        }
        for width in self.slot_widths() {
            buf.put_u32_le(width as u32);
        }
        for ty in &self.column_types {
            let (tag, param) = ty.to_tag();
            buf.put_u32_le(tag);
            buf.put_u32_le(param);
        }
        buf.put_u32_le(self.table_name.len() as u32);
        buf.put_slice(self.table_name.as_bytes());
        for id in &self.column_ids {
            buf.put_u16_le(*id);
        }
        Ok(buf)
    }

    pub fn decode(mut buf: &[u8]) -> DbResult<Self> {
        need(buf, 4 * FIXED_WORDS)?;
        let record_length = buf.get_u32_le();
        let entry_count = buf.get_u32_le();
        let null_mask = buf.get_u32_le();
        let internal_order = buf.get_u32_le();
        let leaf_order = buf.get_u32_le();
        let internal_cap = buf.get_u32_le();
        let leaf_cap = buf.get_u32_le();
        let root_page = PageId(buf.get_u32_le());
        let unique = buf.get_u32_le() != 0;
        let columns = buf.get_u32_le() as usize;

        need(buf, columns * 12)?;
        let widths: Vec<u32> = (0..columns).map(|_| buf.get_u32_le()).collect();
        let mut column_types = Vec::with_capacity(columns);
        for (col, width) in widths.into_iter().enumerate() {
            let (tag, param) = (buf.get_u32_le(), buf.get_u32_le());
            let ty = SqlType::from_tag(tag, param)
                .ok_or_else(|| DbError::Index(format!("unknown column type tag {tag}")))?;
            if slot_width(ty, nullable(null_mask, col)) as u32 != width {
                return Err(DbError::Index(format!(
                    "column {ty:?} recorded with width {width}"
                )));
            }
            column_types.push(ty);
        }

        need(buf, 4)?;
        let name_len = buf.get_u32_le() as usize;
        need(buf, name_len)?;
        let table_name = String::from_utf8(buf.copy_to_bytes(name_len).to_vec())
            .map_err(|e| DbError::Index(format!("table name is not utf-8: {e}")))?;

        need(buf, columns * 2)?;
        let column_ids = (0..columns).map(|_| buf.get_u16_le()).collect();

        let header = Self {
            record_length,
            entry_count,
            null_mask,
            internal_order,
            leaf_order,
            internal_cap,
            leaf_cap,
            root_page,
            unique,
            column_types,
            table_name,
            column_ids,
        };
        let key_len: usize = header.slot_widths().sum();
        if key_len != record_length as usize {
            return Err(DbError::Index(format!(
                "key length {record_length} disagrees with columns ({key_len})"
            )));
        }
        Ok(header)
    }
}

fn need(buf: &[u8], len: usize) -> DbResult<()> {
    if buf.remaining() < len {
        return Err(DbError::Index(format!(
            "index header truncated: need {len} bytes, {} left",
            buf.remaining()
        )));
    }
    Ok(())
}
