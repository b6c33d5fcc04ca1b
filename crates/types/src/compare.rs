//! Ordering of fixed-width encoded column values.

use std::cmp::Ordering;

use crate::SqlType;

/// Relational operator applied between a stored value (left) and a probe (right).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    /// Matches every value.
    Any,
}

impl CmpOp {
    /// Whether `left <op> right` holds given `left.cmp(right)`.
    pub fn holds(self, ord: Ordering) -> bool {
        match self {
            CmpOp::Eq => ord == Ordering::Equal,
            CmpOp::Ne => ord != Ordering::Equal,
            CmpOp::Gt => ord == Ordering::Greater,
            CmpOp::Ge => ord != Ordering::Less,
            CmpOp::Lt => ord == Ordering::Less,
            CmpOp::Le => ord != Ordering::Greater,
            CmpOp::Any => true,
        }
    }

    /// Logical negation. `Any` has no complement and maps to itself.
    pub fn negate(self) -> Self {
        match self {
            CmpOp::Eq => CmpOp::Ne,
            CmpOp::Ne => CmpOp::Eq,
            CmpOp::Gt => CmpOp::Le,
            CmpOp::Ge => CmpOp::Lt,
            CmpOp::Lt => CmpOp::Ge,
            CmpOp::Le => CmpOp::Gt,
            CmpOp::Any => CmpOp::Any,
        }
    }

    /// True when the operator can only fail for values above the probe, so an
    /// ascending scan may stop at the first failure past it.
    pub fn bounds_above(self) -> bool {
        matches!(self, CmpOp::Eq | CmpOp::Lt | CmpOp::Le)
    }

    /// True when the operator can only fail for values below the probe, so an
    /// ascending scan may start at the probe.
    pub fn bounds_below(self) -> bool {
        matches!(self, CmpOp::Eq | CmpOp::Gt | CmpOp::Ge)
    }
}

fn le_i32(bytes: &[u8]) -> i32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[..4]);
    i32::from_le_bytes(buf)
}

fn le_i64(bytes: &[u8]) -> i64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    i64::from_le_bytes(buf)
}

fn le_f64(bytes: &[u8]) -> f64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    f64::from_le_bytes(buf)
}

fn varchar_payload(bytes: &[u8]) -> &[u8] {
    let len = u16::from_le_bytes([bytes[0], bytes[1]]) as usize;
    let end = (2 + len).min(bytes.len());
    &bytes[2..end]
}

/// Compare two encoded values of the same declared type.
///
/// Both slices must be at least `ty.width()` bytes long.
pub fn compare_encoded(ty: SqlType, a: &[u8], b: &[u8]) -> Ordering {
    match ty {
        SqlType::Int | SqlType::Date => le_i32(a).cmp(&le_i32(b)),
        SqlType::Long | SqlType::Decimal { .. } => le_i64(a).cmp(&le_i64(b)),
        SqlType::Float => le_f64(a).total_cmp(&le_f64(b)),
        SqlType::Char(len) => {
            let len = len as usize;
            a[..len].cmp(&b[..len])
        }
        SqlType::VarChar(_) => varchar_payload(a).cmp(varchar_payload(b)),
    }
}
