use crate::policy::{DualTrigger, FlushPolicy};
use bytes::Bytes;
use fsmc_codec::Encoder;
use fsmc_core::{CodecConfig, CodecError, Result, Symbol};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

/// Totals reported when a stream closes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamSummary {
    pub symbols: u64,
    pub flushes: u64,
    pub bytes_out: u64,
}

type FailureSlot = Arc<Mutex<Option<String>>>;

/// A symbol accepted by the controller. The permit is returned once the
/// symbol has been flushed.
struct Pending {
    accepted: Instant,
    symbol: Symbol,
    permit: OwnedSemaphorePermit,
}

/// Handle to a background flush task.
///
/// ## Latency Bound
/// Every symbol is flushed no later than `threshold_ms` after `push`
/// accepted it. At most `buffer_size` symbols are accepted and not yet
/// flushed at any moment, counting both the queue and the batch being
/// assembled; `push` waits for room and `try_push` fails without it. The
/// chunks written to
/// the sink concatenate into one stream that [`fsmc_codec::Decoder`] reads
/// back exactly.
pub struct StreamController {
    tx: mpsc::Sender<Pending>,
    slots: Arc<Semaphore>,
    failure: FailureSlot,
    task: JoinHandle<Result<StreamSummary>>,
}

impl StreamController {
    /// Spawns the flush task on the current Tokio runtime.
    pub fn spawn(config: CodecConfig, sink: mpsc::UnboundedSender<Bytes>) -> Result<Self> {
        let encoder = Encoder::new(&config)?;
        Ok(Self::spawn_with(encoder, DualTrigger::from_config(&config), sink))
    }

    /// Spawns around a prepared encoder (e.g. one seeded by calibration).
    pub fn spawn_with<P: FlushPolicy>(
        encoder: Encoder,
        policy: P,
        sink: mpsc::UnboundedSender<Bytes>,
    ) -> Self {
        let capacity = policy.capacity().max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let slots = Arc::new(Semaphore::new(capacity));
        let failure: FailureSlot = Arc::new(Mutex::new(None));
        let worker = FlushWorker {
            batch: Vec::with_capacity(capacity),
            held: Vec::with_capacity(capacity),
            encoder,
            rx,
            sink,
            policy,
            failure: failure.clone(),
            deadline: None,
            summary: StreamSummary::default(),
        };
        let task = tokio::spawn(worker.run());
        Self {
            tx,
            slots,
            failure,
            task,
        }
    }

    fn closed_error(&self) -> CodecError {
        match self.failure.lock().as_ref() {
            Some(message) => CodecError::FlushFailed(message.clone()),
            None => CodecError::StreamClosed,
        }
    }

    /// Queues a symbol, waiting while `buffer_size` symbols are unflushed.
    pub async fn push(&self, symbol: Symbol) -> Result<()> {
        if self.failure.lock().is_some() {
            return Err(self.closed_error());
        }
        let permit = self
            .slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| self.closed_error())?;
        // A flush may have failed while we waited for room.
        if self.failure.lock().is_some() {
            return Err(self.closed_error());
        }
        let pending = Pending {
            accepted: Instant::now(),
            symbol,
            permit,
        };
        self.tx.send(pending).await.map_err(|_| self.closed_error())
    }

    /// Queues a symbol without waiting. A full buffer is reported as
    /// `CapacityExceeded`; the symbol is dropped.
    pub fn try_push(&self, symbol: Symbol) -> Result<()> {
        if self.failure.lock().is_some() {
            return Err(self.closed_error());
        }
        let permit = self.slots.clone().try_acquire_owned().map_err(|e| match e {
            TryAcquireError::NoPermits => CodecError::CapacityExceeded("stream buffer full".into()),
            TryAcquireError::Closed => self.closed_error(),
        })?;
        let pending = Pending {
            accepted: Instant::now(),
            symbol,
            permit,
        };
        self.tx.try_send(pending).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                CodecError::CapacityExceeded("stream buffer full".into())
            }
            mpsc::error::TrySendError::Closed(_) => self.closed_error(),
        })
    }

    /// Permits left before `push` starts waiting.
    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    /// Flushes what is pending, writes the end marker and waits for the task.
    /// A flush failure is returned here in its original form.
    pub async fn close(self) -> Result<StreamSummary> {
        drop(self.tx);
        self.task
            .await
            .map_err(|e| CodecError::FlushFailed(format!("flush task aborted: {}", e)))?
    }
}

struct FlushWorker<P> {
    encoder: Encoder,
    rx: mpsc::Receiver<Pending>,
    sink: mpsc::UnboundedSender<Bytes>,
    policy: P,
    failure: FailureSlot,
    batch: Vec<Symbol>,
    /// One permit per batched symbol, released on flush.
    held: Vec<OwnedSemaphorePermit>,
    /// Flush deadline of the oldest pending symbol.
    deadline: Option<Instant>,
    summary: StreamSummary,
}

impl<P: FlushPolicy> FlushWorker<P> {
    async fn run(mut self) -> Result<StreamSummary> {
        let result = match self.drive().await {
            Ok(()) => self.finish(),
            Err(e) => Err(e),
        };
        if let Err(e) = &result {
            if e.is_fatal() {
                tracing::error!("StreamController: {}", e);
            } else {
                tracing::warn!("StreamController: {}", e);
            }
        }
        result
    }

    async fn drive(&mut self) -> Result<()> {
        loop {
            let deadline = self.deadline;
            tokio::select! {
                biased;
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.flush()?;
                }
                received = self.rx.recv() => match received {
                    Some(Pending { accepted, symbol, permit }) => {
                        if self.batch.is_empty() {
                            self.deadline = Some(self.policy.deadline(accepted));
                        }
                        self.batch.push(symbol);
                        self.held.push(permit);
                        if self.policy.is_full(self.batch.len()) {
                            self.flush()?;
                        }
                    }
                    None => {
                        if !self.batch.is_empty() {
                            self.flush()?;
                        }
                        return Ok(());
                    }
                }
            }
        }
    }

    fn flush(&mut self) -> Result<()> {
        self.deadline = None;
        let outcome = self
            .encoder
            .encode_batch(&self.batch)
            .and_then(|()| self.encoder.flush())
            .and_then(|chunk| emit(&self.sink, &mut self.summary, chunk));
        self.batch.clear();
        self.held.clear();
        if let Err(e) = &outcome {
            *self.failure.lock() = Some(e.to_string());
        }
        outcome?;
        self.summary.symbols = self.encoder.symbols();
        self.summary.flushes += 1;
        Ok(())
    }

    fn finish(self) -> Result<StreamSummary> {
        let FlushWorker {
            encoder,
            sink,
            failure,
            mut summary,
            ..
        } = self;
        summary.symbols = encoder.symbols();
        let outcome = encoder
            .finish()
            .and_then(|tail| emit(&sink, &mut summary, tail));
        if let Err(e) = outcome {
            *failure.lock() = Some(e.to_string());
            return Err(e);
        }
        tracing::info!(
            "StreamController: closed after {} symbols, {} flushes, {} bytes",
            summary.symbols,
            summary.flushes,
            summary.bytes_out
        );
        Ok(summary)
    }
}

fn emit(sink: &mpsc::UnboundedSender<Bytes>, summary: &mut StreamSummary, chunk: Bytes) -> Result<()> {
    if chunk.is_empty() {
        return Ok(());
    }
    summary.bytes_out += chunk.len() as u64;
    sink.send(chunk)
        .map_err(|_| CodecError::FlushFailed("output sink closed".into()))
}
