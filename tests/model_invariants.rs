//! # Model Invariants: Sliding-Window Accounting
//!
//! Checks the paired increment/decrement bookkeeping against a brute-force
//! recount of the window, and that identical input always yields identical
//! rankings and bitstreams.

use fsmc_codec::{Codec, FsmScorer, SymbolModel};
use fsmc_core::{CodecBuilder, PositionWeighting, Symbol, MAX_WINDOW};
use fsmc_dsa::START_CONTEXT;
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::time::Instant;

fn recount(model: &SymbolModel) -> BTreeMap<(u32, u32), u32> {
    let mut counts = BTreeMap::new();
    let slots: Vec<u32> = model.window().iter().map(|slot| slot.id).collect();
    for pair in slots.windows(2) {
        *counts.entry((pair[0], pair[1])).or_insert(0) += 1;
    }
    counts
}

fn assert_matches_recount(model: &SymbolModel) {
    let expected = recount(model);
    let snapshot = model.snapshot();
    for (&(context, next), &count) in &expected {
        assert_eq!(snapshot.count(context, next), count, "{} -> {}", context, next);
    }
    let total: u32 = expected.values().sum();
    assert_eq!(snapshot.aggregate(), total as u64);
}

/// Aggregate transitions equal min(n, W - 1) at every step.
#[test]
fn test_aggregate_tracks_window() {
    let t = Instant::now();

    for window in [1usize, 2, 3, 10, 100] {
        let mut model = SymbolModel::new(window);
        for n in 1..=300u64 {
            let symbol = Symbol::Byte(((n * 31) % 17) as u8);
            model.observe(&symbol).unwrap();
            assert_eq!(
                model.aggregate_transitions(),
                n.min(window as u64 - 1),
                "window={} n={}",
                window,
                n
            );
        }
        assert_matches_recount(&model);
    }

    let overhead = t.elapsed();
    println!("test_aggregate_tracks_window: Testing Overhead = {:?}", overhead);
}

/// The stream start is a real context until it slides out.
#[test]
fn test_start_context_counted_then_evicted() {
    let mut model = SymbolModel::new(3);
    model.observe(&Symbol::Byte(b'x')).unwrap();
    let x = model.lookup(&Symbol::Byte(b'x')).unwrap();
    assert_eq!(model.transition_count(START_CONTEXT, x), 1);

    model.observe(&Symbol::Byte(b'y')).unwrap();
    model.observe(&Symbol::Byte(b'z')).unwrap();
    assert_eq!(model.transition_count(START_CONTEXT, x), 0);
    assert_eq!(model.aggregate_transitions(), 2);
}

/// A snapshot is a frozen copy; later observations do not leak into it.
#[test]
fn test_snapshot_is_immutable() {
    let mut model = SymbolModel::new(8);
    for &b in b"abab" {
        model.observe(&Symbol::Byte(b)).unwrap();
    }
    let frozen = model.snapshot();
    let before = frozen.aggregate();
    for &b in b"cdcdcdcd" {
        model.observe(&Symbol::Byte(b)).unwrap();
    }
    assert_eq!(frozen.aggregate(), before);
    assert_ne!(model.snapshot(), frozen);
}

/// Identical input gives identical rankings for every weighting.
#[test]
fn test_ranking_determinism() {
    let t = Instant::now();

    let data = b"she sells sea shells by the sea shore, the shells she sells are sea shells";
    for weighting in [
        PositionWeighting::Linear,
        PositionWeighting::Uniform,
        PositionWeighting::Fractal,
    ] {
        let scorer = FsmScorer::new(weighting, 1.5);
        let build = || {
            let mut model = SymbolModel::new(48);
            for &b in data.iter() {
                model.observe(&Symbol::Byte(b)).unwrap();
            }
            scorer.rank(&model)
        };
        assert_eq!(build(), build());
    }

    let overhead = t.elapsed();
    println!("test_ranking_determinism: Testing Overhead = {:?}", overhead);
}

/// A declared window far beyond the stream length only pays for what the
/// stream fills, on the encoding side and when a decoder honors the header.
#[test]
fn test_oversized_window_allocates_on_demand() {
    let t = Instant::now();

    let mut model = SymbolModel::new(MAX_WINDOW);
    for &b in b"short stream" {
        model.observe(&Symbol::Byte(b)).unwrap();
    }
    assert!(model.window().allocated() < 64, "allocated {}", model.window().allocated());

    let codec = Codec::new(CodecBuilder::new().window(MAX_WINDOW).build().unwrap()).unwrap();
    let compressed = codec.compress_bytes(b"short stream").unwrap();
    assert_eq!(codec.decode_bytes(&compressed).unwrap(), b"short stream".to_vec());

    let overhead = t.elapsed();
    println!("test_oversized_window_allocates_on_demand: Testing Overhead = {:?}", overhead);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_counts_match_window(data in proptest::collection::vec(0u8..12, 0..400), window in 1usize..40) {
        let mut model = SymbolModel::new(window);
        for &b in &data {
            model.observe(&Symbol::Byte(b)).unwrap();
        }
        prop_assert_eq!(
            model.aggregate_transitions(),
            (data.len() as u64).min(window as u64 - 1)
        );
        let expected = recount(&model);
        for (&(context, next), &count) in &expected {
            prop_assert_eq!(model.transition_count(context, next), count);
        }
    }

    #[test]
    fn prop_bytes_round_trip(
        data in proptest::collection::vec(any::<u8>(), 0..600),
        window in 1usize..96,
        interval in 1usize..80,
        top_k in proptest::option::of(1usize..24),
        escape in any::<bool>(),
    ) {
        let mut builder = CodecBuilder::new()
            .window(window)
            .rebuild_interval(interval)
            .escape(escape);
        if let Some(k) = top_k {
            builder = builder.top_k(k);
        }
        let codec = Codec::new(builder.build().unwrap()).unwrap();
        let compressed = codec.compress_bytes(&data).unwrap();
        prop_assert_eq!(codec.decode_bytes(&compressed).unwrap(), data);
    }

    #[test]
    fn prop_numbers_round_trip(
        data in proptest::collection::vec(-50i64..50, 0..400),
        window in 1usize..64,
        weighting in prop_oneof![
            Just(PositionWeighting::Linear),
            Just(PositionWeighting::Uniform),
            Just(PositionWeighting::Fractal),
        ],
    ) {
        let config = CodecBuilder::new()
            .mode(fsmc_core::SymbolMode::Numeric)
            .window(window)
            .weighting(weighting)
            .build()
            .unwrap();
        let codec = Codec::new(config).unwrap();
        let compressed = codec.compress_numbers(&data).unwrap();
        prop_assert_eq!(codec.decode_numbers(&compressed).unwrap(), data);
    }
}
