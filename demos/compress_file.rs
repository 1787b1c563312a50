use fsmc_codec::Codec;
use fsmc_core::{CodecConfig, Symbol};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let mut args = std::env::args().skip(1);
    let input = args.next().ok_or("usage: compress_file <input> [config.toml]")?;
    let config = match args.next() {
        Some(path) => CodecConfig::from_file(path)?,
        None => CodecConfig::default(),
    };

    let data = std::fs::read(&input)?;
    let symbols: Vec<Symbol> = data.iter().copied().map(Symbol::Byte).collect();

    let mut codec = Codec::new(config)?;
    // Calibrate on the first 4 KiB.
    let calibration = codec.analyze(&symbols[..symbols.len().min(4096)])?;
    tracing::info!(
        "calibrated: {} distinct symbols, {:.3} bits/transition",
        calibration.alphabet, calibration.entropy_bits
    );

    let (compressed, report) = codec.compress_with_report(&symbols)?;
    let output = format!("{}.fsmc", input);
    codec.save_compressed(&compressed, &output)?;

    let restored = codec.decode(&codec.load_compressed(&output)?)?;
    if !Codec::verify_integrity(&symbols, &restored) {
        return Err("round trip failed".into());
    }

    tracing::info!(
        "{} -> {} ({} -> {} bytes, ratio {:.3}, {:.1} MiB/s)",
        input,
        output,
        report.original_bytes,
        report.compressed_bytes,
        report.ratio(),
        report.throughput_mib_s()
    );
    Ok(())
}
