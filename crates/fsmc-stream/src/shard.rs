use crate::controller::{StreamController, StreamSummary};
use bytes::Bytes;
use fsmc_core::{CodecConfig, CodecError, Result, Symbol};
use futures::future::join_all;
use tokio::sync::mpsc;

/// Independent streams keyed by partition.
///
/// Each shard owns its own model, encoder and flush task; nothing is shared
/// between them, so shards scale across cores without contention. Partition
/// `p` always lands on shard `p % shards`.
pub struct ShardedStreams {
    shards: Vec<StreamController>,
}

impl ShardedStreams {
    /// `sink_for(i)` supplies the output channel of shard `i`.
    pub fn spawn(
        config: CodecConfig,
        shards: usize,
        mut sink_for: impl FnMut(usize) -> mpsc::UnboundedSender<Bytes>,
    ) -> Result<Self> {
        if shards == 0 {
            return Err(CodecError::Configuration("at least one shard is required".into()));
        }
        let shards = (0..shards)
            .map(|i| StreamController::spawn(config.clone(), sink_for(i)))
            .collect::<Result<Vec<_>>>()?;
        tracing::info!("ShardedStreams: spawned {} shards", shards.len());
        Ok(Self { shards })
    }

    pub fn len(&self) -> usize {
        self.shards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }

    #[inline]
    pub fn shard_for(&self, partition: u64) -> usize {
        (partition % self.shards.len() as u64) as usize
    }

    pub async fn push(&self, partition: u64, symbol: Symbol) -> Result<()> {
        self.shards[self.shard_for(partition)].push(symbol).await
    }

    /// Closes every shard concurrently. Summaries come back in shard order;
    /// the first failure wins.
    pub async fn close_all(self) -> Result<Vec<StreamSummary>> {
        join_all(self.shards.into_iter().map(StreamController::close))
            .await
            .into_iter()
            .collect()
    }
}
