use criterion::{black_box, criterion_group, criterion_main, Criterion};
use fsmc_codec::{FsmScorer, SymbolModel};
use fsmc_core::{PositionWeighting, Symbol};

fn model_observe(c: &mut Criterion) {
    let symbols: Vec<Symbol> = (0..4096u32).map(|i| Symbol::Byte((i * 37 % 61) as u8)).collect();

    c.bench_function("model_observe_w256", |b| {
        let mut model = SymbolModel::new(256);
        let mut i = 0;
        b.iter(|| {
            model.observe(black_box(&symbols[i % symbols.len()])).unwrap();
            i += 1;
        })
    });
}

fn model_rank(c: &mut Criterion) {
    let mut model = SymbolModel::new(1024);
    for i in 0..8192u32 {
        model.observe(&Symbol::Byte((i * i % 97) as u8)).unwrap();
    }
    let scorer = FsmScorer::new(PositionWeighting::Linear, 1.0);

    c.bench_function("model_rank_w1024", |b| b.iter(|| scorer.rank(black_box(&model))));
}

criterion_group!(benches, model_observe, model_rank);
criterion_main!(benches);
