use crate::arith::ArithEncoder;
use crate::format::{write_raw_symbol, Block, EndMarker, Snapshot, StreamHeader, MAX_TOKEN_LEN};
use crate::replay::{ModelReplay, Step};
use bitstream_io::{BigEndian, BitWrite, BitWriter};
use bytes::Bytes;
use fsmc_core::{CodecConfig, CodecError, Result, Symbol};
use fsmc_integrity::DigestBuilder;
use std::collections::HashSet;

/// Coded symbols accumulated since the last block boundary.
struct OpenBlock {
    count: u64,
    prefix: BitWriter<Vec<u8>, BigEndian>,
    arith: ArithEncoder,
}

impl OpenBlock {
    fn new() -> Self {
        Self {
            count: 0,
            prefix: BitWriter::endian(Vec::new(), BigEndian),
            arith: ArithEncoder::new(),
        }
    }
}

/// Incremental stream encoder.
///
/// Symbols go in one at a time; `flush` hands out every byte produced so far
/// (closing the open block), and `finish` appends the end marker. The
/// concatenation of all returned chunks is one decodable stream no matter
/// where the flushes fell.
pub struct Encoder {
    replay: ModelReplay,
    header: StreamHeader,
    out: Vec<u8>,
    block: Option<OpenBlock>,
    digest: DigestBuilder,
    header_written: bool,
    poisoned: bool,
    emitted: u64,
}

impl Encoder {
    pub fn new(config: &CodecConfig) -> Result<Self> {
        Self::with_preseed(config, &[])
    }

    /// `calibrated` symbols join the alphabet after the configured ones, in
    /// order, before the first symbol is coded.
    pub fn with_preseed(config: &CodecConfig, calibrated: &[Symbol]) -> Result<Self> {
        config.validate()?;
        let mut preseed = config.initial_alphabet();
        let mut seen: HashSet<Symbol> = preseed.iter().cloned().collect();
        for symbol in calibrated {
            if symbol.mode() != config.mode {
                return Err(CodecError::ModeMismatch {
                    expected: config.mode,
                    found: symbol.mode(),
                });
            }
            if seen.insert(symbol.clone()) {
                preseed.push(symbol.clone());
            }
        }

        let header = StreamHeader::new(config, preseed);
        Ok(Self {
            replay: ModelReplay::new(&header)?,
            header,
            out: Vec::new(),
            block: None,
            digest: DigestBuilder::new(),
            header_written: false,
            poisoned: false,
            emitted: 0,
        })
    }

    pub fn header(&self) -> &StreamHeader {
        &self.header
    }

    /// Symbols accepted so far.
    pub fn symbols(&self) -> u64 {
        self.replay.position()
    }

    /// Bytes handed out by `flush` so far.
    pub fn bytes_emitted(&self) -> u64 {
        self.emitted
    }

    pub fn replay(&self) -> &ModelReplay {
        &self.replay
    }

    /// Encodes one symbol.
    ///
    /// `UnknownSymbol` and `ModeMismatch` reject the symbol and leave the
    /// encoder usable. Any other failure closes the stream.
    pub fn encode_symbol(&mut self, symbol: &Symbol) -> Result<()> {
        if self.poisoned {
            return Err(CodecError::StreamClosed);
        }
        if let Symbol::Token(text) = symbol {
            if text.len() as u64 > MAX_TOKEN_LEN {
                return Err(CodecError::CapacityExceeded(format!(
                    "token of {} bytes over the {} byte limit",
                    text.len(),
                    MAX_TOKEN_LEN
                )));
            }
        }
        match self.encode_inner(symbol) {
            Ok(()) => Ok(()),
            Err(e @ (CodecError::UnknownSymbol(_) | CodecError::ModeMismatch { .. })) => Err(e),
            Err(e) => {
                self.poisoned = true;
                tracing::error!("Encoder: stream closed after error: {}", e);
                Err(e)
            }
        }
    }

    pub fn encode_batch(&mut self, symbols: &[Symbol]) -> Result<()> {
        for symbol in symbols {
            self.encode_symbol(symbol)?;
        }
        Ok(())
    }

    fn encode_inner(&mut self, symbol: &Symbol) -> Result<()> {
        if symbol.mode() != self.header.mode {
            return Err(CodecError::ModeMismatch {
                expected: self.header.mode,
                found: symbol.mode(),
            });
        }
        // Reject before any marker or bit is written.
        if !self.header.escape && self.replay.model().lookup(symbol).is_none() {
            return Err(CodecError::UnknownSymbol(symbol.to_string()));
        }
        self.write_header();

        if self.replay.at_check_point() {
            if let Some(table) = self.replay.propose() {
                self.close_block()?;
                Snapshot {
                    epoch: table.epoch(),
                    at_symbol: self.replay.position(),
                    ranked: table.ranked().to_vec(),
                    fingerprint: table.fingerprint(),
                    code_digest: table.code_digest(),
                }
                .write(&mut self.out);
                self.replay.install(table);
            }
        }

        let step = self.replay.classify(symbol)?;
        let table = self
            .replay
            .table()
            .ok_or_else(|| CodecError::Desync("no code table installed".into()))?;
        let block = self.block.get_or_insert_with(OpenBlock::new);
        match step {
            Step::Prefix(leaf) => table.code().write(&mut block.prefix, leaf)?,
            Step::Residual(index) => {
                let leaf = table
                    .residual_leaf()
                    .ok_or_else(|| CodecError::Desync("residual leaf missing".into()))?;
                let freqs = self.replay.residual_frequencies()?;
                let (cum, freq) = freqs.interval(index);
                table.code().write(&mut block.prefix, leaf)?;
                block.arith.encode(cum, freq, freqs.total())?;
            }
            Step::Escape => {
                let leaf = table
                    .escape_leaf()
                    .ok_or_else(|| CodecError::UnknownSymbol(symbol.to_string()))?;
                table.code().write(&mut block.prefix, leaf)?;
                let mut raw = Vec::new();
                write_raw_symbol(symbol, &mut raw);
                for byte in raw {
                    block.prefix.write(8, byte)?;
                }
            }
        }
        block.count += 1;

        self.replay.advance(symbol)?;
        self.digest.update(symbol);
        Ok(())
    }

    fn write_header(&mut self) {
        if !self.header_written {
            self.header.write(&mut self.out);
            self.header_written = true;
        }
    }

    fn close_block(&mut self) -> Result<()> {
        let Some(mut block) = self.block.take() else {
            return Ok(());
        };
        if block.count == 0 {
            return Ok(());
        }
        block.prefix.byte_align()?;
        let prefix = block.prefix.into_writer();
        let arith = block.arith.finish()?;
        tracing::debug!(
            "Encoder: block of {} symbols ({} prefix + {} arith bytes)",
            block.count,
            prefix.len(),
            arith.len()
        );
        Block {
            count: block.count,
            prefix: &prefix,
            arith: &arith,
        }
        .write(&mut self.out);
        Ok(())
    }

    /// Closes the open block and returns every byte not yet handed out.
    pub fn flush(&mut self) -> Result<Bytes> {
        if self.poisoned {
            return Err(CodecError::StreamClosed);
        }
        self.write_header();
        if let Err(e) = self.close_block() {
            self.poisoned = true;
            return Err(e);
        }
        let chunk = Bytes::from(std::mem::take(&mut self.out));
        self.emitted += chunk.len() as u64;
        Ok(chunk)
    }

    /// Flushes and appends the end marker (plus digest, if enabled).
    pub fn finish(mut self) -> Result<Bytes> {
        if self.poisoned {
            return Err(CodecError::StreamClosed);
        }
        self.write_header();
        self.close_block()?;
        let total = self.replay.position();
        let digest = self
            .header
            .append_digest
            .then(|| *self.digest.clone().finalize().as_bytes());
        EndMarker { total, digest }.write(&mut self.out);
        self.emitted += self.out.len() as u64;
        tracing::debug!(
            "Encoder: finished {} symbols in {} bytes",
            total,
            self.emitted
        );
        Ok(Bytes::from(self.out))
    }
}
