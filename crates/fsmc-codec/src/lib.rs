//! # fsmc-codec: Hybrid FSM-Weighted Entropy Coder
//!
//! A sliding-window first-order model ranks symbols by position-weighted
//! information content. The top-K get a canonical prefix code; everything
//! else goes through a context-conditioned arithmetic coder. Code tables are
//! rebuilt on a fixed symbol schedule, so the decoder can replay every
//! decision from its own copy of the model.

pub mod arith;
pub mod decoder;
pub mod encoder;
pub mod format;
pub mod huffman;
pub mod model;
pub mod replay;
pub mod scorer;
pub mod table;

pub use decoder::Decoder;
pub use encoder::Encoder;
pub use format::StreamHeader;
pub use model::{Observation, SymbolId, SymbolModel};
pub use scorer::{FsmScorer, RankedSymbol, Ranking};
pub use table::{CodeTable, Leaf};

use bytes::Bytes;
use fsmc_core::{
    detokenize, tokenize, BlobStore, CodecConfig, CodecError, CompressionReport, FileStore,
    Result, Symbol, SymbolMode,
};
use std::path::Path;
use std::time::Instant;

/// Summary of an `analyze` pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationReport {
    /// Symbols fed to the calibration model so far.
    pub symbols: u64,
    /// Distinct symbols seen.
    pub alphabet: usize,
    /// Transitions currently inside the calibration window.
    pub transitions: u64,
    /// Mean `log2(1 / P(next | context))` over the window, in bits.
    pub entropy_bits: f64,
}

/// Calibrate-then-compress facade.
///
/// `analyze` warms a private model over sample data; the resulting alphabet
/// ordering travels in the stream header, so compressed output stays
/// self-describing. Compression itself never mutates the codec: each call
/// opens a fresh encoder.
pub struct Codec {
    config: CodecConfig,
    calibration: Option<SymbolModel>,
}

impl Codec {
    pub fn new(config: CodecConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            calibration: None,
        })
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    /// Feeds `stream` to the calibration model. Repeated calls accumulate.
    pub fn analyze(&mut self, stream: &[Symbol]) -> Result<CalibrationReport> {
        let window = self.config.window;
        let model = self.calibration.get_or_insert_with(|| SymbolModel::new(window));
        for symbol in stream {
            if symbol.mode() != self.config.mode {
                return Err(CodecError::ModeMismatch {
                    expected: self.config.mode,
                    found: symbol.mode(),
                });
            }
            model.observe(symbol)?;
        }

        let mut bits = 0.0;
        let mut previous = None;
        for slot in model.window().iter() {
            if let Some(context) = previous {
                let total = model.context_total(context);
                let count = model.transition_count(context, slot.id);
                if total > 0 && count > 0 {
                    bits += (total as f64 / count as f64).log2();
                }
            }
            previous = Some(slot.id);
        }
        let transitions = model.aggregate_transitions();
        let report = CalibrationReport {
            symbols: model.observed(),
            alphabet: model.alphabet_len(),
            transitions,
            entropy_bits: if transitions == 0 {
                0.0
            } else {
                bits / transitions as f64
            },
        };
        tracing::debug!(
            "Codec: calibrated over {} symbols ({} distinct, {:.3} bits/transition)",
            report.symbols,
            report.alphabet,
            report.entropy_bits
        );
        Ok(report)
    }

    /// Alphabet learned by `analyze`: ranked symbols first, then the rest in
    /// first-seen order.
    pub fn calibrated_alphabet(&self) -> Vec<Symbol> {
        let Some(model) = &self.calibration else {
            return Vec::new();
        };
        let ranking = FsmScorer::new(self.config.weighting, self.config.decay).rank(model);
        let mut placed = vec![false; model.alphabet_len()];
        let mut order = Vec::with_capacity(model.alphabet_len());
        for id in ranking.ids() {
            placed[id as usize] = true;
            order.extend(model.symbol(id).cloned());
        }
        for (id, symbol) in model.alphabet().iter().enumerate() {
            if !placed[id] {
                order.push(symbol.clone());
            }
        }
        order
    }

    /// Fresh encoder seeded with the configured and calibrated alphabets.
    pub fn encoder(&self) -> Result<Encoder> {
        Encoder::with_preseed(&self.config, &self.calibrated_alphabet())
    }

    pub fn compress(&self, stream: &[Symbol]) -> Result<Bytes> {
        let mut encoder = self.encoder()?;
        encoder.encode_batch(stream)?;
        encoder.finish()
    }

    pub fn compress_with_report(&self, stream: &[Symbol]) -> Result<(Bytes, CompressionReport)> {
        let started = Instant::now();
        let compressed = self.compress(stream)?;
        let report = CompressionReport {
            symbols: stream.len() as u64,
            original_bytes: stream.iter().map(raw_size).sum(),
            compressed_bytes: compressed.len() as u64,
            elapsed: started.elapsed(),
        };
        tracing::info!(
            "Codec: {} symbols, {} -> {} bytes (ratio {:.3})",
            report.symbols,
            report.original_bytes,
            report.compressed_bytes,
            report.ratio()
        );
        Ok((compressed, report))
    }

    /// Decodes a stream. The stream header, not `self.config`, decides the
    /// model parameters.
    pub fn decode(&self, bytes: &[u8]) -> Result<Vec<Symbol>> {
        Decoder::decode(bytes)
    }

    pub fn compress_bytes(&self, data: &[u8]) -> Result<Bytes> {
        self.expect_mode(SymbolMode::Byte)?;
        let symbols: Vec<Symbol> = data.iter().copied().map(Symbol::Byte).collect();
        self.compress(&symbols)
    }

    pub fn decode_bytes(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        self.decode(bytes)?
            .into_iter()
            .map(|symbol| match symbol {
                Symbol::Byte(b) => Ok(b),
                other => Err(CodecError::ModeMismatch {
                    expected: SymbolMode::Byte,
                    found: other.mode(),
                }),
            })
            .collect()
    }

    pub fn compress_numbers(&self, data: &[i64]) -> Result<Bytes> {
        self.expect_mode(SymbolMode::Numeric)?;
        let symbols: Vec<Symbol> = data.iter().copied().map(Symbol::Number).collect();
        self.compress(&symbols)
    }

    pub fn decode_numbers(&self, bytes: &[u8]) -> Result<Vec<i64>> {
        self.decode(bytes)?
            .into_iter()
            .map(|symbol| match symbol {
                Symbol::Number(n) => Ok(n),
                other => Err(CodecError::ModeMismatch {
                    expected: SymbolMode::Numeric,
                    found: other.mode(),
                }),
            })
            .collect()
    }

    /// Tokenizes `text` and compresses the tokens.
    pub fn compress_text(&self, text: &str) -> Result<Bytes> {
        self.expect_mode(SymbolMode::Token)?;
        self.compress(&tokenize(text))
    }

    pub fn decode_text(&self, bytes: &[u8]) -> Result<String> {
        let symbols = self.decode(bytes)?;
        detokenize(&symbols).ok_or(CodecError::ModeMismatch {
            expected: SymbolMode::Token,
            found: symbols
                .iter()
                .map(Symbol::mode)
                .find(|mode| *mode != SymbolMode::Token)
                .unwrap_or(SymbolMode::Token),
        })
    }

    pub fn save_compressed(&self, bytes: &[u8], path: impl AsRef<Path>) -> Result<()> {
        FileStore::new(path.as_ref()).put(bytes)
    }

    pub fn load_compressed(&self, path: impl AsRef<Path>) -> Result<Bytes> {
        Ok(Bytes::from(FileStore::new(path.as_ref()).get()?))
    }

    pub fn verify_integrity(original: &[Symbol], decompressed: &[Symbol]) -> bool {
        fsmc_integrity::verify_integrity(original, decompressed)
    }

    fn expect_mode(&self, mode: SymbolMode) -> Result<()> {
        if self.config.mode != mode {
            return Err(CodecError::ModeMismatch {
                expected: self.config.mode,
                found: mode,
            });
        }
        Ok(())
    }
}

/// Size of a symbol in its natural uncompressed form.
fn raw_size(symbol: &Symbol) -> u64 {
    match symbol {
        Symbol::Byte(_) => 1,
        Symbol::Number(_) => 8,
        Symbol::Token(t) => t.len() as u64,
    }
}
