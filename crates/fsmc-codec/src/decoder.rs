use crate::arith::ArithDecoder;
use crate::format::{
    read_raw_symbol, Block, ByteCursor, EndMarker, Snapshot, StreamHeader, TAG_BLOCK, TAG_END,
    TAG_SNAPSHOT,
};
use crate::model::SymbolId;
use crate::replay::ModelReplay;
use crate::table::Leaf;
use bitstream_io::{BigEndian, BitRead, BitReader};
use fsmc_core::{CodecError, Result, Symbol};
use fsmc_integrity::{DigestBuilder, IntegrityDigest};

/// What one prefix codeword resolved to.
enum Decoded {
    Known(SymbolId),
    Novel(Symbol),
}

/// Replays the encoder's model over a complete stream.
///
/// The decoder trusts nothing: every segment is bounds-checked against the
/// bytes actually present, every block is checksummed, and every snapshot is
/// re-derived from local state before it is accepted.
pub struct Decoder<'a> {
    cursor: ByteCursor<'a>,
    header: StreamHeader,
    replay: ModelReplay,
    digest: DigestBuilder,
    output: Vec<Symbol>,
}

impl<'a> Decoder<'a> {
    pub fn new(data: &'a [u8]) -> Result<Self> {
        let mut cursor = ByteCursor::new(data);
        let header = StreamHeader::read(&mut cursor)?;
        let replay = ModelReplay::new(&header)?;
        Ok(Self {
            cursor,
            header,
            replay,
            digest: DigestBuilder::new(),
            output: Vec::new(),
        })
    }

    pub fn header(&self) -> &StreamHeader {
        &self.header
    }

    /// Decodes a whole stream produced by [`crate::Encoder`].
    pub fn decode(data: &'a [u8]) -> Result<Vec<Symbol>> {
        let result = Self::new(data).and_then(Self::run);
        if let Err(e) = &result {
            tracing::warn!("Decoder: {}", e);
        }
        result
    }

    fn run(mut self) -> Result<Vec<Symbol>> {
        loop {
            let tag = self
                .cursor
                .read_u8()
                .ok_or_else(|| CodecError::Desync("stream ends without end marker".into()))?;
            match tag {
                TAG_SNAPSHOT => self.apply_snapshot()?,
                TAG_BLOCK => self.decode_block()?,
                TAG_END => return self.finish(),
                other => {
                    return Err(CodecError::Desync(format!(
                        "unknown segment tag {:#04x} at offset {}",
                        other,
                        self.cursor.position() - 1
                    )))
                }
            }
        }
    }

    fn apply_snapshot(&mut self) -> Result<()> {
        let snapshot = Snapshot::read(&mut self.cursor)?;
        tracing::trace!("Decoder: snapshot epoch {} at symbol {}", snapshot.epoch, snapshot.at_symbol);
        let position = self.replay.position();
        if snapshot.at_symbol != position || position % self.replay.rebuild_interval() != 0 {
            return Err(CodecError::Desync(format!(
                "snapshot at symbol {} but decoder is at {}",
                snapshot.at_symbol, position
            )));
        }
        if snapshot.epoch != self.replay.next_epoch() {
            return Err(CodecError::Desync(format!(
                "snapshot epoch {} but expected {}",
                snapshot.epoch,
                self.replay.next_epoch()
            )));
        }
        let table = self.replay.rebuild();
        if table.ranked() != snapshot.ranked.as_slice() || table.fingerprint() != snapshot.fingerprint {
            return Err(CodecError::Desync(format!(
                "ranking mismatch at epoch {}",
                snapshot.epoch
            )));
        }
        if table.code_digest() != snapshot.code_digest {
            return Err(CodecError::Desync(format!(
                "code length mismatch at epoch {}",
                snapshot.epoch
            )));
        }
        self.replay.install(table);
        Ok(())
    }

    fn decode_block(&mut self) -> Result<()> {
        let block = Block::read(&mut self.cursor)?;
        tracing::trace!(
            "Decoder: block of {} symbols at symbol {}",
            block.count,
            self.replay.position()
        );
        let mut prefix = BitReader::endian(block.prefix, BigEndian);
        let mut arith = ArithDecoder::new(block.arith)?;

        for _ in 0..block.count {
            let decoded = {
                let table = self
                    .replay
                    .table()
                    .ok_or_else(|| CodecError::Desync("block before first snapshot".into()))?;
                let leaf = table.code().read(&mut prefix)?;
                match table.leaf(leaf) {
                    Some(Leaf::Symbol(id)) => Decoded::Known(id),
                    Some(Leaf::Residual) => {
                        let freqs = self.replay.residual_frequencies()?;
                        let target = arith.target(freqs.total())?;
                        let (index, cum, freq) = freqs.find(target)?;
                        arith.consume(cum, freq, freqs.total())?;
                        let id = table
                            .residual_id(index)
                            .ok_or_else(|| CodecError::Desync("residual index out of range".into()))?;
                        Decoded::Known(id)
                    }
                    Some(Leaf::Escape) => {
                        let symbol = read_raw_symbol(self.header.mode, || {
                            prefix
                                .read::<u8>(8)
                                .map_err(|_| CodecError::Desync("escaped symbol truncated".into()))
                        })?;
                        if self.replay.model().lookup(&symbol).is_some() {
                            return Err(CodecError::Desync(format!("escape for known {}", symbol)));
                        }
                        Decoded::Novel(symbol)
                    }
                    None => return Err(CodecError::Desync(format!("leaf {} out of range", leaf))),
                }
            };

            let symbol = match decoded {
                Decoded::Known(id) => {
                    self.replay.advance_known(id)?;
                    self.replay
                        .model()
                        .symbol(id)
                        .cloned()
                        .ok_or_else(|| CodecError::Desync(format!("symbol id {} unknown", id)))?
                }
                Decoded::Novel(symbol) => {
                    self.replay.advance(&symbol)?;
                    symbol
                }
            };
            self.digest.update(&symbol);
            self.output.push(symbol);
        }
        Ok(())
    }

    fn finish(mut self) -> Result<Vec<Symbol>> {
        let end = EndMarker::read(&mut self.cursor, self.header.append_digest)?;
        let decoded = self.replay.position();
        if end.total != decoded {
            return Err(CodecError::Desync(format!(
                "end marker counts {} symbols, decoded {}",
                end.total, decoded
            )));
        }
        if let Some(stored) = end.digest {
            if IntegrityDigest::from_bytes(stored) != self.digest.finalize() {
                return Err(CodecError::IntegrityMismatch);
            }
        }
        if !self.cursor.is_empty() {
            return Err(CodecError::Desync(format!(
                "{} trailing bytes after end marker",
                self.cursor.remaining()
            )));
        }
        Ok(self.output)
    }
}
