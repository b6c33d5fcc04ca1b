//! Occupancy bitmap helpers. Bit `i` lives in byte `i / 8`, most significant
//! bit first; a set bit marks an occupied slot.

#[inline]
fn mask(bit: u64) -> u8 {
    0x80 >> (bit % 8)
}

pub fn is_set(bits: &[u8], bit: u64) -> bool {
    bits.get((bit / 8) as usize)
        .is_some_and(|byte| byte & mask(bit) != 0)
}

pub fn set(bits: &mut [u8], bit: u64) {
    if let Some(byte) = bits.get_mut((bit / 8) as usize) {
        *byte |= mask(bit);
    }
}

pub fn clear(bits: &mut [u8], bit: u64) {
    if let Some(byte) = bits.get_mut((bit / 8) as usize) {
        *byte &= !mask(bit);
    }
}

/// First unset bit below `limit`. Whole `0xFF` bytes are skipped before
/// scanning bits.
pub fn first_clear(bits: &[u8], limit: u64) -> Option<u64> {
    for (idx, byte) in bits.iter().enumerate() {
        let base = idx as u64 * 8;
        if base >= limit {
            return None;
        }
        if *byte == 0xFF {
            continue;
        }
        let hit = base + byte.leading_ones() as u64;
        return (hit < limit).then_some(hit);
    }
    None
}

/// First set bit in `from..limit`. Whole zero bytes are skipped.
pub fn next_set(bits: &[u8], from: u64, limit: u64) -> Option<u64> {
    let mut pos = from;
    while pos < limit {
        let idx = (pos / 8) as usize;
        let byte = bits.get(idx)? & (0xFF >> (pos % 8));
        if byte == 0 {
            pos = (idx as u64 + 1) * 8;
            continue;
        }
        let hit = idx as u64 * 8 + byte.leading_zeros() as u64;
        return (hit < limit).then_some(hit);
    }
    None
}

/// Number of set bits in `0..limit`.
pub fn count_set(bits: &[u8], limit: u64) -> u64 {
    let mut count = 0;
    let mut pos = 0;
    while let Some(hit) = next_set(bits, pos, limit) {
        count += 1;
        pos = hit + 1;
    }
    count
}
