use sha2::{Digest, Sha256};

pub const BLOCK_CHECKSUM_LEN: usize = 4;

/// Truncated SHA-256 over the concatenation of `parts`.
///
/// Guards every coded-bits block: a flipped bit anywhere in the block fails
/// the check before the decoder interprets a single code.
pub fn block_checksum(parts: &[&[u8]]) -> [u8; BLOCK_CHECKSUM_LEN] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    let full = hasher.finalize();
    let mut out = [0u8; BLOCK_CHECKSUM_LEN];
    out.copy_from_slice(&full[..BLOCK_CHECKSUM_LEN]);
    out
}

/// Stable 64-bit fingerprint of a serialized ranking.
pub fn fingerprint(bytes: &[u8]) -> u64 {
    let full = Sha256::digest(bytes);
    let mut head = [0u8; 8];
    head.copy_from_slice(&full[..8]);
    u64::from_le_bytes(head)
}
