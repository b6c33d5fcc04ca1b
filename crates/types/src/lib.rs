mod compare;

pub use compare::{compare_encoded, CmpOp};

/// Declared type of an indexed column.
///
/// Every type has a fixed encoded width so that composite keys can be laid
/// out as plain concatenations of column slots.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SqlType {
    /// 32-bit signed integer.
    Int,
    /// 64-bit signed integer.
    Long,
    /// IEEE 754 double.
    Float,
    /// Fixed character column, NUL padded to `len` bytes.
    Char(u16),
    /// Variable character column stored inline: u16 length then up to `max` bytes.
    VarChar(u16),
    /// Packed decimal stored as an unscaled i64.
    Decimal { precision: u8, scale: u8 },
    /// Days since 1970-01-01.
    Date,
}

impl SqlType {
    /// Number of bytes a value of this type occupies inside a key.
    pub fn width(&self) -> usize {
        match self {
            SqlType::Int | SqlType::Date => 4,
            SqlType::Long | SqlType::Float | SqlType::Decimal { .. } => 8,
            SqlType::Char(len) => *len as usize,
            SqlType::VarChar(max) => *max as usize + 2,
        }
    }

    /// Numeric tag and parameter used by on-disk headers.
    pub fn to_tag(self) -> (u32, u32) {
        match self {
            SqlType::Int => (1, 0),
            SqlType::Long => (2, 0),
            SqlType::Float => (3, 0),
            SqlType::Char(len) => (4, len as u32),
            SqlType::VarChar(max) => (5, max as u32),
            SqlType::Decimal { precision, scale } => (6, ((precision as u32) << 8) | scale as u32),
            SqlType::Date => (7, 0),
        }
    }

    pub fn from_tag(tag: u32, param: u32) -> Option<Self> {
        let ty = match tag {
            1 => SqlType::Int,
            2 => SqlType::Long,
            3 => SqlType::Float,
            4 => SqlType::Char(u16::try_from(param).ok()?),
            5 => SqlType::VarChar(u16::try_from(param).ok()?),
            6 => SqlType::Decimal {
                precision: (param >> 8) as u8,
                scale: param as u8,
            },
            7 => SqlType::Date,
            _ => return None,
        };
        Some(ty)
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Value {
    Int(i32),
    Long(i64),
    Float(f64),
    Text(String),
    /// Unscaled decimal; the scale comes from the column type.
    Decimal(i64),
    Date(i32),
    Null,
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}
