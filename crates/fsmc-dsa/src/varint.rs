//! LEB128 varints and zigzag mapping for the compressed wire format.

use alloc::vec::Vec;

/// Longest encoding of a `u64` (ceil(64 / 7)).
pub const MAX_VARINT_LEN: usize = 10;

pub fn write_u64(out: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        out.push((value as u8 & 0x7F) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

/// Decodes a varint from the front of `input`.
///
/// Returns the value and the number of bytes consumed, or `None` when the
/// input is truncated or the encoding overflows 64 bits.
pub fn read_u64(input: &[u8]) -> Option<(u64, usize)> {
    let mut value = 0u64;
    for (i, &byte) in input.iter().take(MAX_VARINT_LEN).enumerate() {
        let chunk = (byte & 0x7F) as u64;
        let shift = 7 * i as u32;
        if shift == 63 && chunk > 1 {
            return None;
        }
        value |= chunk << shift;
        if byte & 0x80 == 0 {
            return Some((value, i + 1));
        }
    }
    None
}

/// Feeds bytes one at a time, for readers that are not slice-backed.
pub fn read_u64_with<E>(
    mut next: impl FnMut() -> Result<u8, E>,
    overflow: impl FnOnce() -> E,
) -> Result<u64, E> {
    let mut value = 0u64;
    for i in 0..MAX_VARINT_LEN {
        let byte = next()?;
        let chunk = (byte & 0x7F) as u64;
        let shift = 7 * i as u32;
        if shift == 63 && chunk > 1 {
            break;
        }
        value |= chunk << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(overflow())
}

#[inline(always)]
pub fn zigzag_encode(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

#[inline(always)]
pub fn zigzag_decode(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_values_survive() {
        for value in [0u64, 1, 127, 128, 300, u32::MAX as u64, u64::MAX] {
            let mut buf = Vec::new();
            write_u64(&mut buf, value);
            assert!(buf.len() <= MAX_VARINT_LEN);
            assert_eq!(read_u64(&buf), Some((value, buf.len())));
        }
    }

    #[test]
    fn truncated_and_overlong_inputs_are_rejected() {
        assert_eq!(read_u64(&[0x80]), None);
        assert_eq!(read_u64(&[]), None);
        assert_eq!(read_u64(&[0xFF; 11]), None);
        // Tenth byte may only contribute the top bit.
        let mut overlong = [0xFFu8; 10];
        overlong[9] = 0x02;
        assert_eq!(read_u64(&overlong), None);
    }

    #[test]
    fn zigzag_keeps_small_magnitudes_small() {
        assert_eq!(zigzag_encode(0), 0);
        assert_eq!(zigzag_encode(-1), 1);
        assert_eq!(zigzag_encode(1), 2);
        assert_eq!(zigzag_encode(-2), 3);
        for value in [i64::MIN, -36, 0, 25, i64::MAX] {
            assert_eq!(zigzag_decode(zigzag_encode(value)), value);
        }
    }
}
