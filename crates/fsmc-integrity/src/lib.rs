//! # fsmc-integrity: Content Digests
//!
//! Deterministic SHA-256 digests over symbol sequences. Equal digests are
//! necessary but not sufficient proof of a correct decode; the tool's use is
//! diagnostic, not cryptographic.

pub mod checksum;

pub use checksum::{block_checksum, fingerprint, BLOCK_CHECKSUM_LEN};

use fsmc_core::Symbol;
use sha2::{Digest, Sha256};
use std::fmt;

pub const DIGEST_LEN: usize = 32;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct IntegrityDigest([u8; DIGEST_LEN]);

impl IntegrityDigest {
    pub fn from_bytes(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }
}

impl fmt::Debug for IntegrityDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IntegrityDigest({})", self)
    }
}

impl fmt::Display for IntegrityDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Incremental digest so the encoder can hash symbols as they stream past.
///
/// ## Canonical Form
/// Each symbol is hashed as a kind tag followed by a fixed-layout payload:
/// `0x00 byte`, `0x01 i64-le`, `0x02 len:u64-le utf8`. Two sequences hash
/// equal only if they agree on kind, value and boundaries.
#[derive(Clone, Default)]
pub struct DigestBuilder {
    hasher: Sha256,
    symbols: u64,
}

impl DigestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, symbol: &Symbol) {
        match symbol {
            Symbol::Byte(b) => {
                self.hasher.update([0x00, *b]);
            }
            Symbol::Number(n) => {
                self.hasher.update([0x01]);
                self.hasher.update(n.to_le_bytes());
            }
            Symbol::Token(t) => {
                self.hasher.update([0x02]);
                self.hasher.update((t.len() as u64).to_le_bytes());
                self.hasher.update(t.as_bytes());
            }
        }
        self.symbols += 1;
    }

    pub fn symbols(&self) -> u64 {
        self.symbols
    }

    pub fn finalize(self) -> IntegrityDigest {
        IntegrityDigest(self.hasher.finalize().into())
    }
}

pub fn digest(symbols: &[Symbol]) -> IntegrityDigest {
    let mut builder = DigestBuilder::new();
    for symbol in symbols {
        builder.update(symbol);
    }
    builder.finalize()
}

pub fn verify(original_digest: &IntegrityDigest, decompressed: &[Symbol]) -> bool {
    digest(decompressed) == *original_digest
}

pub fn verify_integrity(original: &[Symbol], decompressed: &[Symbol]) -> bool {
    verify(&digest(original), decompressed)
}
