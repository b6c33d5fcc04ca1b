//! Pure byte-level accessors for page layouts.
//!
//! All integers are little-endian. Fixed-width structs are serialized with
//! bincode's legacy configuration, which writes every integer at its full
//! width with no length prefixes, so a struct of `n` u32 fields occupies
//! exactly `4 * n` bytes.

use bincode::config::{self, Config};
use bincode::serde::{decode_from_slice, encode_into_slice};
use common::{DbError, DbResult};
use serde::{Serialize, de::DeserializeOwned};

fn bincode_config() -> impl Config {
    config::legacy()
}

fn out_of_bounds(offset: usize, len: usize, size: usize) -> DbError {
    DbError::Storage(format!(
        "range {offset}..{} outside {size}-byte buffer",
        offset.saturating_add(len)
    ))
}

pub fn slice(buf: &[u8], offset: usize, len: usize) -> DbResult<&[u8]> {
    let end = offset
        .checked_add(len)
        .filter(|end| *end <= buf.len())
        .ok_or_else(|| out_of_bounds(offset, len, buf.len()))?;
    Ok(&buf[offset..end])
}

pub fn slice_mut(buf: &mut [u8], offset: usize, len: usize) -> DbResult<&mut [u8]> {
    let size = buf.len();
    let end = offset
        .checked_add(len)
        .filter(|end| *end <= size)
        .ok_or_else(|| out_of_bounds(offset, len, size))?;
    Ok(&mut buf[offset..end])
}

pub fn read_u32(buf: &[u8], offset: usize) -> DbResult<u32> {
    let bytes = slice(buf, offset, 4)?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

pub fn write_u32(buf: &mut [u8], offset: usize, value: u32) -> DbResult<()> {
    slice_mut(buf, offset, 4)?.copy_from_slice(&value.to_le_bytes());
    Ok(())
}

/// Serialize a fixed-width struct at the front of `buf`, returning the byte count.
pub fn encode_fixed<T: Serialize>(value: &T, buf: &mut [u8]) -> DbResult<usize> {
    encode_into_slice(value, buf, bincode_config())
        .map_err(|e| DbError::Storage(format!("encode failed: {e}")))
}

/// Deserialize a fixed-width struct from the front of `buf`.
pub fn decode_fixed<T: DeserializeOwned>(buf: &[u8]) -> DbResult<T> {
    let (value, _) = decode_from_slice(buf, bincode_config())
        .map_err(|e| DbError::Storage(format!("decode failed: {e}")))?;
    Ok(value)
}
