//! Length-limited canonical Huffman codes over a small leaf set.
//!
//! Only code lengths ever matter: both sides derive the same lengths from the
//! same weights, and canonical assignment turns lengths into codes.

use bitstream_io::{BitRead, BitWrite};
use fsmc_core::{CodecError, Result};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::io;

pub const MAX_CODE_LEN: u32 = 32;

/// Unrestricted Huffman lengths. Ties resolve on node index, leaves first,
/// which makes the result a pure function of `weights`.
fn huffman_lengths(weights: &[u64]) -> Vec<u32> {
    let n = weights.len();
    match n {
        0 => return Vec::new(),
        1 => return vec![1],
        _ => {}
    }

    let mut parent = vec![usize::MAX; 2 * n - 1];
    let mut heap: BinaryHeap<Reverse<(u64, usize)>> = weights
        .iter()
        .enumerate()
        .map(|(i, &w)| Reverse((w, i)))
        .collect();

    let mut next = n;
    while heap.len() > 1 {
        let (Some(Reverse((wa, a))), Some(Reverse((wb, b)))) = (heap.pop(), heap.pop()) else {
            break;
        };
        parent[a] = next;
        parent[b] = next;
        heap.push(Reverse((wa.saturating_add(wb), next)));
        next += 1;
    }

    // Parents are always created after their children.
    let root = next - 1;
    let mut depth = vec![0u32; next];
    for node in (0..root).rev() {
        depth[node] = depth[parent[node]] + 1;
    }
    depth.truncate(n);
    depth
}

/// Huffman lengths capped at `max_len` bits.
///
/// When the optimal tree is too deep every weight is halved (never below 1)
/// and the tree rebuilt; all-equal weights give a balanced tree, so this
/// terminates for any leaf count below `2^max_len`.
pub fn code_lengths(weights: &[u64], max_len: u32) -> Vec<u32> {
    let mut weights = weights.to_vec();
    loop {
        let lengths = huffman_lengths(&weights);
        if lengths.iter().all(|&l| l <= max_len) {
            return lengths;
        }
        weights.iter_mut().for_each(|w| *w = (*w >> 1).max(1));
    }
}

/// Canonical prefix code: leaf index -> (code, length) plus the per-length
/// tables needed to decode bit by bit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixCode {
    codes: Vec<(u32, u32)>,
    /// Leaves ordered by (length, index).
    canonical: Vec<usize>,
    /// Indexed by length.
    first_code: Vec<u64>,
    first_index: Vec<usize>,
    count: Vec<u64>,
    max_len: u32,
}

impl PrefixCode {
    pub fn from_weights(weights: &[u64]) -> Self {
        Self::from_lengths(&code_lengths(weights, MAX_CODE_LEN))
    }

    pub fn from_lengths(lengths: &[u32]) -> Self {
        let max_len = lengths.iter().copied().max().unwrap_or(0);
        let slots = max_len as usize + 1;

        let mut count = vec![0u64; slots];
        for &len in lengths {
            count[len as usize] += 1;
        }
        count[0] = 0;

        let mut first_code = vec![0u64; slots];
        let mut code = 0u64;
        for len in 1..slots {
            code = (code + count[len - 1]) << 1;
            first_code[len] = code;
        }

        let mut canonical: Vec<usize> = (0..lengths.len()).filter(|&i| lengths[i] > 0).collect();
        canonical.sort_by_key(|&i| (lengths[i], i));

        let mut first_index = vec![0usize; slots];
        let mut next_code = first_code.clone();
        let mut codes = vec![(0u32, 0u32); lengths.len()];
        for (position, &leaf) in canonical.iter().enumerate() {
            let len = lengths[leaf] as usize;
            if next_code[len] == first_code[len] {
                first_index[len] = position;
            }
            codes[leaf] = (next_code[len] as u32, len as u32);
            next_code[len] += 1;
        }

        Self {
            codes,
            canonical,
            first_code,
            first_index,
            count,
            max_len,
        }
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// `(code, length)` of `leaf`.
    pub fn code(&self, leaf: usize) -> Option<(u32, u32)> {
        self.codes.get(leaf).copied()
    }

    pub fn lengths(&self) -> impl Iterator<Item = u32> + '_ {
        self.codes.iter().map(|&(_, len)| len)
    }

    pub fn write<W: BitWrite>(&self, writer: &mut W, leaf: usize) -> io::Result<()> {
        let (code, len) = self.code(leaf).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, format!("leaf {} not in code", leaf))
        })?;
        writer.write(len, code)
    }

    /// Reads one codeword. Running out of bits, or a bit pattern no leaf
    /// owns, is a desync.
    pub fn read<R: BitRead>(&self, reader: &mut R) -> Result<usize> {
        let mut code = 0u64;
        for len in 1..=self.max_len as usize {
            let bit = reader
                .read_bit()
                .map_err(|_| CodecError::Desync("prefix code truncated".into()))?;
            code = (code << 1) | bit as u64;
            let offset = code.wrapping_sub(self.first_code[len]);
            if code >= self.first_code[len] && offset < self.count[len] {
                return Ok(self.canonical[self.first_index[len] + offset as usize]);
            }
        }
        Err(CodecError::Desync("bit pattern matches no code".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitstream_io::{BigEndian, BitReader, BitWriter};

    fn kraft_sum(lengths: &[u32]) -> f64 {
        lengths.iter().map(|&l| 2f64.powi(-(l as i32))).sum()
    }

    #[test]
    fn test_heavier_leaves_get_shorter_codes() {
        let lengths = code_lengths(&[100, 50, 10, 1, 1], MAX_CODE_LEN);
        assert!(lengths[0] <= lengths[1]);
        assert!(lengths[1] <= lengths[2]);
        assert!(lengths[2] <= lengths[3]);
        assert!((kraft_sum(&lengths) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_length_limit_holds() {
        // Fibonacci weights produce the deepest possible tree.
        let mut weights = vec![1u64, 1];
        for i in 2..40 {
            let next = weights[i - 1] + weights[i - 2];
            weights.push(next);
        }
        let lengths = code_lengths(&weights, 12);
        assert!(lengths.iter().all(|&l| l <= 12));
        assert!(kraft_sum(&lengths) <= 1.0 + 1e-12);
    }

    #[test]
    fn test_single_leaf() {
        let code = PrefixCode::from_weights(&[7]);
        assert_eq!(code.code(0), Some((0, 1)));
    }

    #[test]
    fn test_write_then_read_every_leaf() {
        let code = PrefixCode::from_weights(&[40, 3, 3, 9, 1, 22, 5]);
        let mut writer = BitWriter::endian(Vec::new(), BigEndian);
        for leaf in 0..code.len() {
            code.write(&mut writer, leaf).unwrap();
        }
        writer.byte_align().unwrap();
        let bytes = writer.into_writer();

        let mut reader = BitReader::endian(bytes.as_slice(), BigEndian);
        for leaf in 0..code.len() {
            assert_eq!(code.read(&mut reader).unwrap(), leaf);
        }
    }

    #[test]
    fn test_truncated_input_is_desync() {
        let code = PrefixCode::from_weights(&[1, 1, 1, 1, 1, 1, 1, 1, 1]);
        let mut reader = BitReader::endian(&[0u8; 0][..], BigEndian);
        assert!(matches!(code.read(&mut reader), Err(CodecError::Desync(_))));
    }
}
