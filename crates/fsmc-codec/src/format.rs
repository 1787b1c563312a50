//! Container layout.
//!
//! ```text
//! header   := "FSMC" version:u8 mode:u8 flags:u8 window:varint top_k:varint
//!             rebuild_interval:varint weighting:u8 decay:f64-le
//!             preseed_len:varint raw_symbol* checksum:[u8; 4]
//! segment  := SNAPSHOT epoch:varint at_symbol:varint k:varint id:varint* fingerprint:u64-le
//!                      code:[u8; 4]
//!           | BLOCK count:varint prefix_len:varint arith_len:varint prefix arith checksum:[u8; 4]
//!           | END total:varint digest:[u8; 32]?
//! ```
//!
//! `top_k = 0` stands for "derived from the alphabet". Header and block
//! checksums cover the raw bytes they follow, so no single damaged byte in
//! either can be parsed as a different valid value. `code` is the digest of
//! the prefix code lengths the encoder installed.

use fsmc_core::{CodecConfig, CodecError, PositionWeighting, Result, Symbol, SymbolMode};
use fsmc_dsa::varint;
use fsmc_integrity::{block_checksum, BLOCK_CHECKSUM_LEN, DIGEST_LEN};

pub const MAGIC: &[u8; 4] = b"FSMC";
pub const VERSION: u8 = 1;

pub const TAG_END: u8 = 0x00;
pub const TAG_SNAPSHOT: u8 = 0x01;
pub const TAG_BLOCK: u8 = 0x02;

const FLAG_ESCAPE: u8 = 0b01;
const FLAG_DIGEST: u8 = 0b10;

/// Longest token accepted off the wire.
pub const MAX_TOKEN_LEN: u64 = 1 << 20;

/// Forward-only reader over a complete stream.
pub struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn read_u8(&mut self) -> Option<u8> {
        let byte = *self.data.get(self.pos)?;
        self.pos += 1;
        Some(byte)
    }

    pub fn read_varint(&mut self) -> Option<u64> {
        let (value, used) = varint::read_u64(&self.data[self.pos..])?;
        self.pos += used;
        Some(value)
    }

    pub fn read_bytes(&mut self, len: usize) -> Option<&'a [u8]> {
        if len > self.remaining() {
            return None;
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Some(bytes)
    }

    pub fn read_array<const N: usize>(&mut self) -> Option<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Some(out)
    }

    /// Bytes consumed since position `start`.
    pub fn since(&self, start: usize) -> &'a [u8] {
        &self.data[start.min(self.pos)..self.pos]
    }
}

fn desync(what: &str) -> CodecError {
    CodecError::Desync(format!("truncated {}", what))
}

/// Raw symbol encoding shared by the header preseed and the escape path.
pub fn write_raw_symbol(symbol: &Symbol, out: &mut Vec<u8>) {
    match symbol {
        Symbol::Byte(b) => out.push(*b),
        Symbol::Number(n) => varint::write_u64(out, varint::zigzag_encode(*n)),
        Symbol::Token(t) => {
            varint::write_u64(out, t.len() as u64);
            out.extend_from_slice(t.as_bytes());
        }
    }
}

/// Inverse of [`write_raw_symbol`] over a byte source.
pub fn read_raw_symbol(
    mode: SymbolMode,
    mut next: impl FnMut() -> Result<u8>,
) -> Result<Symbol> {
    let overflow = || CodecError::Desync("raw varint overflow".into());
    match mode {
        SymbolMode::Byte => Ok(Symbol::Byte(next()?)),
        SymbolMode::Numeric => {
            let raw = varint::read_u64_with(&mut next, overflow)?;
            Ok(Symbol::Number(varint::zigzag_decode(raw)))
        }
        SymbolMode::Token => {
            let len = varint::read_u64_with(&mut next, overflow)?;
            if len > MAX_TOKEN_LEN {
                return Err(CodecError::Desync(format!("token length {} over limit", len)));
            }
            let bytes = (0..len).map(|_| next()).collect::<Result<Vec<u8>>>()?;
            let text = String::from_utf8(bytes)
                .map_err(|_| CodecError::Desync("token is not valid UTF-8".into()))?;
            Ok(Symbol::Token(text))
        }
    }
}

/// Everything the decoder needs to rebuild the encoder's model.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamHeader {
    pub mode: SymbolMode,
    pub window: usize,
    pub top_k: Option<usize>,
    pub rebuild_interval: usize,
    pub weighting: PositionWeighting,
    pub decay: f64,
    pub escape: bool,
    pub append_digest: bool,
    /// Alphabet admitted before the first symbol, in id order.
    pub preseed: Vec<Symbol>,
}

impl StreamHeader {
    pub fn new(config: &CodecConfig, preseed: Vec<Symbol>) -> Self {
        Self {
            mode: config.mode,
            window: config.window,
            top_k: config.top_k,
            rebuild_interval: config.rebuild_interval,
            weighting: config.weighting,
            decay: config.decay,
            escape: config.escape,
            append_digest: config.append_digest,
            preseed,
        }
    }

    /// Codec parameters implied by the header. Batching knobs keep their
    /// defaults; they never reach the wire.
    pub fn to_config(&self) -> CodecConfig {
        CodecConfig {
            mode: self.mode,
            window: self.window,
            top_k: self.top_k,
            rebuild_interval: self.rebuild_interval,
            weighting: self.weighting,
            decay: self.decay,
            escape: self.escape,
            append_digest: self.append_digest,
            alphabet: self.preseed.clone(),
            ..CodecConfig::default()
        }
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        let start = out.len();
        out.extend_from_slice(MAGIC);
        out.push(VERSION);
        out.push(self.mode.wire_tag());
        let mut flags = 0;
        if self.escape {
            flags |= FLAG_ESCAPE;
        }
        if self.append_digest {
            flags |= FLAG_DIGEST;
        }
        out.push(flags);
        varint::write_u64(out, self.window as u64);
        varint::write_u64(out, self.top_k.unwrap_or(0) as u64);
        varint::write_u64(out, self.rebuild_interval as u64);
        out.push(self.weighting.wire_tag());
        out.extend_from_slice(&self.decay.to_le_bytes());
        varint::write_u64(out, self.preseed.len() as u64);
        for symbol in &self.preseed {
            write_raw_symbol(symbol, out);
        }
        let checksum = block_checksum(&[&out[start..]]);
        out.extend_from_slice(&checksum);
    }

    pub fn read(cursor: &mut ByteCursor<'_>) -> Result<Self> {
        let truncated = || CodecError::Format("truncated header".into());
        let start = cursor.position();

        let magic = cursor.read_array::<4>().ok_or_else(truncated)?;
        if &magic != MAGIC {
            return Err(CodecError::Format("bad magic".into()));
        }
        let version = cursor.read_u8().ok_or_else(truncated)?;
        if version != VERSION {
            return Err(CodecError::Format(format!("unsupported version {}", version)));
        }
        let mode_tag = cursor.read_u8().ok_or_else(truncated)?;
        let mode = SymbolMode::from_wire_tag(mode_tag)
            .ok_or_else(|| CodecError::Format(format!("unknown mode tag {}", mode_tag)))?;
        let flags = cursor.read_u8().ok_or_else(truncated)?;
        if flags & !(FLAG_ESCAPE | FLAG_DIGEST) != 0 {
            return Err(CodecError::Format(format!("unknown flags {:#04x}", flags)));
        }
        let window = read_usize(cursor).ok_or_else(truncated)?;
        let top_k = read_usize(cursor).ok_or_else(truncated)?;
        let rebuild_interval = read_usize(cursor).ok_or_else(truncated)?;
        let weighting_tag = cursor.read_u8().ok_or_else(truncated)?;
        let weighting = PositionWeighting::from_wire_tag(weighting_tag)
            .ok_or_else(|| CodecError::Format(format!("unknown weighting tag {}", weighting_tag)))?;
        let decay = f64::from_le_bytes(cursor.read_array::<8>().ok_or_else(truncated)?);

        let preseed_len = cursor.read_varint().ok_or_else(truncated)?;
        // Every raw symbol takes at least one byte.
        if preseed_len > cursor.remaining() as u64 {
            return Err(CodecError::Format(format!(
                "preseed of {} symbols exceeds stream length",
                preseed_len
            )));
        }
        let mut preseed = Vec::with_capacity(preseed_len as usize);
        for _ in 0..preseed_len {
            let symbol = read_raw_symbol(mode, || cursor.read_u8().ok_or_else(truncated))
                .map_err(|e| CodecError::Format(format!("preseed: {}", e)))?;
            preseed.push(symbol);
        }
        let computed = block_checksum(&[cursor.since(start)]);
        let stored = cursor.read_array::<BLOCK_CHECKSUM_LEN>().ok_or_else(truncated)?;
        if stored != computed {
            return Err(CodecError::Format("header checksum mismatch".into()));
        }

        let header = Self {
            mode,
            window,
            top_k: (top_k > 0).then_some(top_k),
            rebuild_interval,
            weighting,
            decay,
            escape: flags & FLAG_ESCAPE != 0,
            append_digest: flags & FLAG_DIGEST != 0,
            preseed,
        };
        header
            .to_config()
            .validate()
            .map_err(|e| CodecError::Format(format!("header parameters: {}", e)))?;
        Ok(header)
    }
}

fn read_usize(cursor: &mut ByteCursor<'_>) -> Option<usize> {
    cursor.read_varint().and_then(|v| usize::try_from(v).ok())
}

/// Announces the code table installed before symbol `at_symbol`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub epoch: u64,
    pub at_symbol: u64,
    pub ranked: Vec<u32>,
    pub fingerprint: u64,
    /// Digest of the installed prefix code lengths.
    pub code_digest: [u8; BLOCK_CHECKSUM_LEN],
}

impl Snapshot {
    pub fn write(&self, out: &mut Vec<u8>) {
        out.push(TAG_SNAPSHOT);
        varint::write_u64(out, self.epoch);
        varint::write_u64(out, self.at_symbol);
        varint::write_u64(out, self.ranked.len() as u64);
        for &id in &self.ranked {
            varint::write_u64(out, id as u64);
        }
        out.extend_from_slice(&self.fingerprint.to_le_bytes());
        out.extend_from_slice(&self.code_digest);
    }

    /// Reads the body; the tag is already consumed.
    pub fn read(cursor: &mut ByteCursor<'_>) -> Result<Self> {
        let epoch = cursor.read_varint().ok_or_else(|| desync("snapshot"))?;
        let at_symbol = cursor.read_varint().ok_or_else(|| desync("snapshot"))?;
        let k = cursor.read_varint().ok_or_else(|| desync("snapshot"))?;
        if k > cursor.remaining() as u64 {
            return Err(CodecError::Desync(format!("snapshot claims {} ranked ids", k)));
        }
        let mut ranked = Vec::with_capacity(k as usize);
        for _ in 0..k {
            let id = cursor.read_varint().ok_or_else(|| desync("snapshot"))?;
            let id = u32::try_from(id)
                .map_err(|_| CodecError::Desync(format!("snapshot id {} out of range", id)))?;
            ranked.push(id);
        }
        let fingerprint = u64::from_le_bytes(cursor.read_array::<8>().ok_or_else(|| desync("snapshot"))?);
        let code_digest = cursor
            .read_array::<BLOCK_CHECKSUM_LEN>()
            .ok_or_else(|| desync("snapshot"))?;
        Ok(Self {
            epoch,
            at_symbol,
            ranked,
            fingerprint,
            code_digest,
        })
    }
}

/// One checksummed unit of coded symbols.
#[derive(Debug, Clone, Copy)]
pub struct Block<'a> {
    pub count: u64,
    pub prefix: &'a [u8],
    pub arith: &'a [u8],
}

impl<'a> Block<'a> {
    pub fn write(&self, out: &mut Vec<u8>) {
        out.push(TAG_BLOCK);
        let start = out.len();
        varint::write_u64(out, self.count);
        varint::write_u64(out, self.prefix.len() as u64);
        varint::write_u64(out, self.arith.len() as u64);
        out.extend_from_slice(self.prefix);
        out.extend_from_slice(self.arith);
        let checksum = block_checksum(&[&out[start..]]);
        out.extend_from_slice(&checksum);
    }

    /// Reads the body and verifies its checksum; the tag is already consumed.
    pub fn read(cursor: &mut ByteCursor<'a>) -> Result<Self> {
        let start = cursor.position();
        let count = cursor.read_varint().ok_or_else(|| desync("block"))?;
        let prefix_len = read_usize(cursor).ok_or_else(|| desync("block"))?;
        let arith_len = read_usize(cursor).ok_or_else(|| desync("block"))?;
        let prefix = cursor.read_bytes(prefix_len).ok_or_else(|| desync("block"))?;
        let arith = cursor.read_bytes(arith_len).ok_or_else(|| desync("block"))?;
        let computed = block_checksum(&[cursor.since(start)]);
        let stored = cursor
            .read_array::<BLOCK_CHECKSUM_LEN>()
            .ok_or_else(|| desync("block"))?;
        if stored != computed {
            return Err(CodecError::Desync("block checksum mismatch".into()));
        }
        Ok(Self {
            count,
            prefix,
            arith,
        })
    }
}

/// Closing segment: symbol total and, if flagged, the content digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndMarker {
    pub total: u64,
    pub digest: Option<[u8; DIGEST_LEN]>,
}

impl EndMarker {
    pub fn write(&self, out: &mut Vec<u8>) {
        out.push(TAG_END);
        varint::write_u64(out, self.total);
        if let Some(digest) = &self.digest {
            out.extend_from_slice(digest);
        }
    }

    pub fn read(cursor: &mut ByteCursor<'_>, with_digest: bool) -> Result<Self> {
        let total = cursor.read_varint().ok_or_else(|| desync("end marker"))?;
        let digest = if with_digest {
            Some(cursor.read_array::<DIGEST_LEN>().ok_or_else(|| desync("end marker"))?)
        } else {
            None
        };
        Ok(Self { total, digest })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_carries_config_and_preseed() {
        let config = CodecConfig {
            mode: SymbolMode::Token,
            window: 512,
            top_k: Some(24),
            decay: 0.5,
            weighting: PositionWeighting::Fractal,
            ..CodecConfig::default()
        };
        let header = StreamHeader::new(&config, vec![Symbol::from("GET"), Symbol::from(" ")]);
        let mut bytes = Vec::new();
        header.write(&mut bytes);

        let mut cursor = ByteCursor::new(&bytes);
        assert_eq!(StreamHeader::read(&mut cursor).unwrap(), header);
        assert!(cursor.is_empty());
    }

    #[test]
    fn test_header_rejects_bad_magic() {
        let mut bytes = Vec::new();
        StreamHeader::new(&CodecConfig::default(), Vec::new()).write(&mut bytes);
        bytes[0] = b'X';
        assert!(matches!(
            StreamHeader::read(&mut ByteCursor::new(&bytes)),
            Err(CodecError::Format(_))
        ));
    }

    #[test]
    fn test_header_rejects_zero_window() {
        let header = StreamHeader {
            window: 0,
            ..StreamHeader::new(&CodecConfig::default(), Vec::new())
        };
        let mut bytes = Vec::new();
        header.write(&mut bytes);
        assert!(matches!(
            StreamHeader::read(&mut ByteCursor::new(&bytes)),
            Err(CodecError::Format(_))
        ));
    }

    #[test]
    fn test_block_checksum_catches_flip() {
        let mut bytes = Vec::new();
        Block {
            count: 3,
            prefix: &[0b1010_0000, 0xFF],
            arith: &[0x12],
        }
        .write(&mut bytes);
        bytes[5] ^= 0x04;
        let mut cursor = ByteCursor::new(&bytes[1..]);
        assert!(matches!(Block::read(&mut cursor), Err(CodecError::Desync(_))));
    }

    #[test]
    fn test_header_checksum_catches_every_flip() {
        let config = CodecConfig {
            window: 300,
            top_k: Some(8),
            rebuild_interval: 64,
            ..CodecConfig::default()
        };
        let header = StreamHeader::new(&config, vec![Symbol::Byte(b'a'), Symbol::Byte(b'z')]);
        let mut bytes = Vec::new();
        header.write(&mut bytes);

        for at in 0..bytes.len() {
            for mask in [0x01u8, 0x10, 0x80] {
                let mut damaged = bytes.clone();
                damaged[at] ^= mask;
                match StreamHeader::read(&mut ByteCursor::new(&damaged)) {
                    Err(CodecError::Format(_)) => {}
                    other => panic!("byte {} mask {:#04x} read as {:?}", at, mask, other),
                }
            }
        }
    }

    #[test]
    fn test_block_checksum_covers_raw_count_bytes() {
        let mut bytes = Vec::new();
        Block {
            count: 3,
            prefix: &[0b1010_0000],
            arith: &[],
        }
        .write(&mut bytes);
        assert_eq!(bytes[1], 0x03);
        // Same count, spelled as a two-byte varint.
        let mut padded = vec![bytes[0], 0x83, 0x00];
        padded.extend_from_slice(&bytes[2..]);
        let mut cursor = ByteCursor::new(&padded[1..]);
        assert!(matches!(Block::read(&mut cursor), Err(CodecError::Desync(_))));
    }

    #[test]
    fn test_snapshot_carries_code_digest() {
        let snapshot = Snapshot {
            epoch: 2,
            at_symbol: 128,
            ranked: vec![4, 0, 9],
            fingerprint: 0xDEAD_BEEF,
            code_digest: [1, 2, 3, 4],
        };
        let mut bytes = Vec::new();
        snapshot.write(&mut bytes);
        let mut cursor = ByteCursor::new(&bytes[1..]);
        assert_eq!(Snapshot::read(&mut cursor).unwrap(), snapshot);
        assert!(cursor.is_empty());
    }

    #[test]
    fn test_raw_numeric_symbol() {
        let mut bytes = Vec::new();
        write_raw_symbol(&Symbol::Number(-300), &mut bytes);
        let mut iter = bytes.into_iter();
        let symbol = read_raw_symbol(SymbolMode::Numeric, || {
            iter.next().ok_or_else(|| CodecError::Desync("eof".into()))
        })
        .unwrap();
        assert_eq!(symbol, Symbol::Number(-300));
    }
}
