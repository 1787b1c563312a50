pub mod config;
pub mod error;
pub mod symbol;
pub mod collab;

pub use config::{CodecConfig, PositionWeighting, MAX_WINDOW};
pub use error::{CodecError, Result};
pub use symbol::{detokenize, tokenize, Symbol, SymbolMode};
pub use collab::{BlobStore, CompressionReport, FileStore};

/// A fluent builder for codec configurations.
///
/// Every setter is infallible; `build` runs the full validation so an
/// invalid window or latency budget fails before any stream is opened.
pub struct CodecBuilder {
    pub config: CodecConfig,
}

impl CodecBuilder {
    pub fn new() -> Self {
        Self {
            config: CodecConfig::default(),
        }
    }

    pub fn mode(mut self, mode: SymbolMode) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn window(mut self, window: usize) -> Self {
        self.config.window = window;
        self
    }

    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.config.buffer_size = buffer_size;
        self
    }

    pub fn threshold_ms(mut self, threshold_ms: u64) -> Self {
        self.config.threshold_ms = threshold_ms;
        self
    }

    pub fn top_k(mut self, top_k: usize) -> Self {
        self.config.top_k = Some(top_k);
        self
    }

    pub fn rebuild_interval(mut self, interval: usize) -> Self {
        self.config.rebuild_interval = interval;
        self
    }

    pub fn weighting(mut self, weighting: PositionWeighting) -> Self {
        self.config.weighting = weighting;
        self
    }

    pub fn decay(mut self, decay: f64) -> Self {
        self.config.decay = decay;
        self
    }

    pub fn escape(mut self, enabled: bool) -> Self {
        self.config.escape = enabled;
        self
    }

    pub fn append_digest(mut self, enabled: bool) -> Self {
        self.config.append_digest = enabled;
        self
    }

    pub fn alphabet(mut self, alphabet: Vec<Symbol>) -> Self {
        self.config.alphabet = alphabet;
        self
    }

    /// Overrides the whole configuration.
    pub fn with_config(mut self, config: CodecConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<CodecConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for CodecBuilder {
    fn default() -> Self {
        Self::new()
    }
}
