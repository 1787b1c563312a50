use fsmc_codec::Decoder;
use fsmc_core::{tokenize, CodecBuilder, SymbolMode};
use fsmc_stream::StreamController;
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config = CodecBuilder::new()
        .mode(SymbolMode::Token)
        .window(256)
        .buffer_size(64)
        .threshold_ms(20)
        .build()?;

    let (sink, mut chunks) = mpsc::unbounded_channel();
    let controller = StreamController::spawn(config, sink)?;

    let collector = tokio::spawn(async move {
        let mut stream = Vec::new();
        while let Some(chunk) = chunks.recv().await {
            tracing::debug!("chunk: {} bytes", chunk.len());
            stream.extend_from_slice(&chunk);
        }
        stream
    });

    let mut sent = Vec::new();
    for i in 0..50 {
        let line = format!("ts={} level=info route=/orders/{} status=200\n", i, i % 5);
        for token in tokenize(&line) {
            controller.push(token.clone()).await?;
            sent.push(token);
        }
        sleep(Duration::from_millis(3)).await;
    }

    let summary = controller.close().await?;
    let stream = collector.await?;
    let decoded = Decoder::decode(&stream)?;

    tracing::info!(
        "{} symbols in {} flushes, {} bytes; decoded intact: {}",
        summary.symbols,
        summary.flushes,
        summary.bytes_out,
        decoded == sent
    );
    Ok(())
}
