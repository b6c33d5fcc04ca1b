//! Composite keys: fixed-width concatenations of encoded column values.
//!
//! A nullable column's slot starts with a presence byte (0 for null, 1 for a
//! value), so nulls sort ahead of every value and never collide with one.

use std::cmp::Ordering;

use common::{DbError, DbResult};
use types::{CmpOp, SqlType, Value, compare_encoded};

/// Column types of an index key and where each column sits inside it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeySchema {
    types: Vec<SqlType>,
    nullable: Vec<bool>,
    offsets: Vec<usize>,
    key_len: usize,
}

impl KeySchema {
    /// Schema whose columns all reject nulls.
    pub fn new(types: Vec<SqlType>) -> Self {
        Self::with_null_mask(types, 0)
    }

    /// Schema where bit `i` of `null_mask` makes column `i` nullable.
    pub fn with_null_mask(types: Vec<SqlType>, null_mask: u32) -> Self {
        let nullable: Vec<bool> = (0..types.len()).map(|c| nullable(null_mask, c)).collect();
        let mut offsets = Vec::with_capacity(types.len());
        let mut key_len = 0;
        for (ty, flag) in types.iter().zip(&nullable) {
            offsets.push(key_len);
            key_len += slot_width(*ty, *flag);
        }
        Self {
            types,
            nullable,
            offsets,
            key_len,
        }
    }

    pub fn types(&self) -> &[SqlType] {
        &self.types
    }

    pub fn column_count(&self) -> usize {
        self.types.len()
    }

    pub fn is_nullable(&self, col: usize) -> bool {
        self.nullable.get(col).copied().unwrap_or(false)
    }

    /// Bytes column `col` occupies inside a key, presence byte included.
    pub fn column_width(&self, col: usize) -> usize {
        slot_width(self.types[col], self.nullable[col])
    }

    /// Width in bytes of a complete key.
    pub fn key_len(&self) -> usize {
        self.key_len
    }

    /// Encode a complete key. Exactly one value per column is required.
    pub fn encode(&self, values: &[Value]) -> DbResult<Vec<u8>> {
        if values.len() != self.types.len() {
            return Err(DbError::Index(format!(
                "key has {} columns, index has {}",
                values.len(),
                self.types.len()
            )));
        }
        self.encode_prefix(values)
    }

    /// Encode the leading `values.len()` columns of a key.
    ///
    /// The result is only meaningful to comparisons that look at no more than
    /// that many columns.
    pub fn encode_prefix(&self, values: &[Value]) -> DbResult<Vec<u8>> {
        if values.len() > self.types.len() {
            return Err(DbError::Index(format!(
                "prefix of {} columns exceeds key of {}",
                values.len(),
                self.types.len()
            )));
        }
        let mut out = Vec::with_capacity(self.key_len);
        for ((ty, flag), value) in self.types.iter().zip(&self.nullable).zip(values) {
            match (*flag, value) {
                (true, Value::Null) => out.resize(out.len() + slot_width(*ty, true), 0),
                (true, value) => {
                    out.push(1);
                    encode_value(*ty, value, &mut out)?;
                }
                (false, value) => encode_value(*ty, value, &mut out)?,
            }
        }
        Ok(out)
    }

    pub fn decode(&self, key: &[u8]) -> DbResult<Vec<Value>> {
        if key.len() < self.key_len {
            return Err(DbError::Index(format!(
                "key of {} bytes is shorter than {}",
                key.len(),
                self.key_len
            )));
        }
        (0..self.types.len())
            .map(|col| {
                let ty = self.types[col];
                let mut offset = self.offsets[col];
                if self.nullable[col] {
                    if key[offset] == 0 {
                        return Ok(Value::Null);
                    }
                    offset += 1;
                }
                decode_value(ty, &key[offset..offset + ty.width()])
            })
            .collect()
    }

    /// Order of column `col` between two keys. Nulls equal each other and
    /// precede every value.
    pub fn compare_column(&self, col: usize, a: &[u8], b: &[u8]) -> Ordering {
        let mut offset = self.offsets[col];
        if self.nullable[col] {
            let (a_set, b_set) = (a[offset] != 0, b[offset] != 0);
            if !(a_set && b_set) {
                return a_set.cmp(&b_set);
            }
            offset += 1;
        }
        compare_encoded(self.types[col], &a[offset..], &b[offset..])
    }

    /// Lexicographic order over the first `ncols` columns.
    pub fn compare_prefix(&self, a: &[u8], b: &[u8], ncols: usize) -> Ordering {
        (0..ncols.min(self.types.len()))
            .map(|col| self.compare_column(col, a, b))
            .find(|ord| ord.is_ne())
            .unwrap_or(Ordering::Equal)
    }

    pub fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        self.compare_prefix(a, b, self.types.len())
    }

    /// Whether `a[i] <ops[i]> b[i]` holds for every column that has an operator.
    pub fn satisfies(&self, a: &[u8], b: &[u8], ops: &[CmpOp]) -> bool {
        ops.iter()
            .enumerate()
            .take(self.types.len())
            .all(|(col, op)| *op == CmpOp::Any || op.holds(self.compare_column(col, a, b)))
    }
}

/// Whether bit `col` of `mask` is set.
pub(crate) fn nullable(mask: u32, col: usize) -> bool {
    u32::try_from(col)
        .ok()
        .and_then(|col| mask.checked_shr(col))
        .is_some_and(|bits| bits & 1 == 1)
}

pub(crate) fn slot_width(ty: SqlType, nullable: bool) -> usize {
    ty.width() + usize::from(nullable)
}

fn mismatch(ty: SqlType, value: &Value) -> DbError {
    DbError::Index(format!("value {value:?} does not fit column type {ty:?}"))
}

fn encode_value(ty: SqlType, value: &Value, out: &mut Vec<u8>) -> DbResult<()> {
    let start = out.len();
    match (ty, value) {
        (SqlType::Int, Value::Int(v)) | (SqlType::Date, Value::Date(v)) => {
            out.extend_from_slice(&v.to_le_bytes())
        }
        (SqlType::Long, Value::Long(v)) | (SqlType::Decimal { .. }, Value::Decimal(v)) => {
            out.extend_from_slice(&v.to_le_bytes())
        }
        (SqlType::Long, Value::Int(v)) => out.extend_from_slice(&i64::from(*v).to_le_bytes()),
        (SqlType::Float, Value::Float(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (SqlType::Char(len), Value::Text(s)) => {
            if s.len() > len as usize {
                return Err(mismatch(ty, value));
            }
            out.extend_from_slice(s.as_bytes());
            out.resize(start + len as usize, 0);
        }
        (SqlType::VarChar(max), Value::Text(s)) => {
            if s.len() > max as usize {
                return Err(mismatch(ty, value));
            }
            out.extend_from_slice(&(s.len() as u16).to_le_bytes());
            out.extend_from_slice(s.as_bytes());
            out.resize(start + ty.width(), 0);
        }
        _ => return Err(mismatch(ty, value)),
    }
    Ok(())
}

fn decode_value(ty: SqlType, bytes: &[u8]) -> DbResult<Value> {
    let value = match ty {
        SqlType::Int => Value::Int(i32::from_le_bytes(le(bytes))),
        SqlType::Date => Value::Date(i32::from_le_bytes(le(bytes))),
        SqlType::Long => Value::Long(i64::from_le_bytes(le(bytes))),
        SqlType::Decimal { .. } => Value::Decimal(i64::from_le_bytes(le(bytes))),
        SqlType::Float => Value::Float(f64::from_le_bytes(le(bytes))),
        SqlType::Char(_) => {
            let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
            Value::Text(text(&bytes[..end])?)
        }
        SqlType::VarChar(_) => {
            let len = u16::from_le_bytes([bytes[0], bytes[1]]) as usize;
            let payload = bytes
                .get(2..2 + len)
                .ok_or_else(|| DbError::Index(format!("varchar length {len} overruns its slot")))?;
            Value::Text(text(payload)?)
        }
    };
    Ok(value)
}

fn le<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut buf = [0u8; N];
    buf.copy_from_slice(&bytes[..N]);
    buf
}

fn text(bytes: &[u8]) -> DbResult<String> {
    String::from_utf8(bytes.to_vec())
        .map_err(|e| DbError::Index(format!("key text is not utf-8: {e}")))
}
