use crate::symbol::SymbolMode;
use thiserror::Error;

pub type Result<T> = core::result::Result<T, CodecError>;

#[derive(Debug, Error)]
pub enum CodecError {
    /// Invalid construction parameters. Raised before any symbol is processed.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A symbol outside the configured alphabet arrived with the escape path disabled.
    #[error("unknown symbol {0} and escape path is disabled")]
    UnknownSymbol(String),

    #[error("symbol kind mismatch: codec runs in {expected:?} mode, got {found:?}")]
    ModeMismatch {
        expected: SymbolMode,
        found: SymbolMode,
    },

    /// The decoder lost lockstep with the encoder. Fatal, never retried.
    #[error("decoder desync: {0}")]
    Desync(String),

    #[error("integrity digest mismatch after decode")]
    IntegrityMismatch,

    #[error("malformed stream: {0}")]
    Format(String),

    #[error("capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// A controller flush failed; the original error is returned from `close`.
    #[error("flush failed: {0}")]
    FlushFailed(String),

    #[error("stream closed")]
    StreamClosed,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CodecError {
    /// True for failures that leave the model state untrustworthy.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CodecError::Desync(_) | CodecError::IntegrityMismatch | CodecError::Format(_)
        )
    }
}
