use fsmc_core::CodecConfig;
use tokio::time::{Duration, Instant};

/// Decides when a batch of buffered symbols must be flushed.
pub trait FlushPolicy: Send + 'static {
    /// Flush now because the batch reached its size bound.
    fn is_full(&self, batched: usize) -> bool;

    /// Latest instant a batch whose oldest symbol arrived at `arrival` may wait.
    fn deadline(&self, arrival: Instant) -> Instant;

    /// Most symbols accepted and not yet flushed.
    fn capacity(&self) -> usize;
}

/// Size-or-age trigger: flush at `buffer_size` symbols or `threshold` after
/// the oldest pending arrival, whichever comes first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DualTrigger {
    pub buffer_size: usize,
    pub threshold: Duration,
}

impl DualTrigger {
    pub fn from_config(config: &CodecConfig) -> Self {
        Self {
            buffer_size: config.buffer_size.max(1),
            threshold: Duration::from_millis(config.threshold_ms),
        }
    }
}

impl FlushPolicy for DualTrigger {
    #[inline]
    fn is_full(&self, batched: usize) -> bool {
        batched >= self.buffer_size
    }

    #[inline]
    fn deadline(&self, arrival: Instant) -> Instant {
        arrival + self.threshold
    }

    fn capacity(&self) -> usize {
        self.buffer_size
    }
}
