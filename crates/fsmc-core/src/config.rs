use crate::error::{CodecError, Result};
use crate::symbol::{Symbol, SymbolMode};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Upper bound on `window`. Keeps the arithmetic coder's frequency total
/// well inside its 30-bit budget.
pub const MAX_WINDOW: usize = 1 << 24;

/// Position-in-window weight `w(j)` applied to FSM scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionWeighting {
    /// `w(j) = j / (L - 1)`: recent positions weigh up to 1.
    Linear,
    /// `w(j) = 1`.
    Uniform,
    /// `w(j) = 1 + log2(j)`: log-scale depth weighting across window scales.
    Fractal,
}

impl PositionWeighting {
    pub fn wire_tag(self) -> u8 {
        match self {
            PositionWeighting::Linear => 0,
            PositionWeighting::Uniform => 1,
            PositionWeighting::Fractal => 2,
        }
    }

    pub fn from_wire_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(PositionWeighting::Linear),
            1 => Some(PositionWeighting::Uniform),
            2 => Some(PositionWeighting::Fractal),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    pub mode: SymbolMode,
    /// Sliding window size W.
    pub window: usize,
    /// Max batched symbols before a forced flush.
    pub buffer_size: usize,
    /// Max latency (ms) between a symbol's arrival and its flush.
    pub threshold_ms: u64,
    /// Prefix-coded set size. `None` derives it from the alphabet size.
    pub top_k: Option<usize>,
    /// Symbols between ranking checks.
    pub rebuild_interval: usize,
    pub weighting: PositionWeighting,
    /// Exponential decay rate in `f_d = exp(-decay * age / W)`.
    pub decay: f64,
    /// Enables the raw escape path for symbols outside the alphabet.
    pub escape: bool,
    /// Appends the SHA-256 integrity digest after the end marker.
    pub append_digest: bool,
    /// Alphabet admitted before the first symbol.
    pub alphabet: Vec<Symbol>,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            mode: SymbolMode::Byte,
            window: 256,
            buffer_size: 1024,
            threshold_ms: 50,
            top_k: None,
            rebuild_interval: 64,
            weighting: PositionWeighting::Linear,
            decay: 1.0,
            escape: true,
            append_digest: true,
            alphabet: Vec::new(),
        }
    }
}

impl CodecConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: CodecConfig = toml::from_str(raw)
            .map_err(|e| CodecError::Configuration(format!("invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Fails fast on parameters no stream could be processed with.
    pub fn validate(&self) -> Result<()> {
        if self.window == 0 || self.window > MAX_WINDOW {
            return Err(CodecError::Configuration(format!(
                "window must be in 1..={}, got {}",
                MAX_WINDOW, self.window
            )));
        }
        if self.buffer_size == 0 {
            return Err(CodecError::Configuration("buffer_size must be positive".into()));
        }
        if self.threshold_ms == 0 {
            return Err(CodecError::Configuration("threshold_ms must be positive".into()));
        }
        if self.rebuild_interval == 0 {
            return Err(CodecError::Configuration("rebuild_interval must be positive".into()));
        }
        if self.top_k == Some(0) {
            return Err(CodecError::Configuration("top_k must be positive when set".into()));
        }
        if !self.decay.is_finite() || self.decay < 0.0 {
            return Err(CodecError::Configuration(format!(
                "decay must be finite and non-negative, got {}",
                self.decay
            )));
        }

        let mut seen = HashSet::with_capacity(self.alphabet.len());
        for symbol in &self.alphabet {
            if symbol.mode() != self.mode {
                return Err(CodecError::Configuration(format!(
                    "alphabet entry {} does not match {:?} mode",
                    symbol, self.mode
                )));
            }
            if !seen.insert(symbol) {
                return Err(CodecError::Configuration(format!(
                    "duplicate alphabet entry {}",
                    symbol
                )));
            }
        }

        if !self.escape && self.mode != SymbolMode::Byte && self.alphabet.is_empty() {
            return Err(CodecError::Configuration(
                "escape disabled: numeric and token modes need an explicit alphabet".into(),
            ));
        }
        Ok(())
    }

    /// Alphabet admitted before the first symbol.
    ///
    /// Byte mode without escape implicitly covers all 256 values.
    pub fn initial_alphabet(&self) -> Vec<Symbol> {
        if !self.escape && self.mode == SymbolMode::Byte && self.alphabet.is_empty() {
            return (0..=255u8).map(Symbol::Byte).collect();
        }
        self.alphabet.clone()
    }
}
