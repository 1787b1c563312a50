//! # fsmc-stream: Latency-Bounded Streaming
//!
//! Wraps an [`fsmc_codec::Encoder`] in a Tokio task that batches incoming
//! symbols and flushes on a size bound or an age bound, whichever trips
//! first. Output chunks go to an unbounded channel in stream order.

pub mod controller;
pub mod policy;
pub mod shard;

pub use controller::{StreamController, StreamSummary};
pub use policy::{DualTrigger, FlushPolicy};
pub use shard::ShardedStreams;
