use criterion::{Criterion, criterion_group, criterion_main};
use docs_rag::embeddings::chunking::{ChunkingConfig, chunk_text};
use std::hint::black_box;

fn sample_document(words: usize) -> String {
    const VOCABULARY: &[&str] = &[
        "the", "GPIO", "register", "clock", "enable", "pin", "voltage", "reset", "UART", "baud",
        "divisor", "interrupt", "handler", "DMA", "channel", "buffer",
    ];

    (0..words)
        .map(|i| VOCABULARY[(i * 7 + i / 3) % VOCABULARY.len()])
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let document = sample_document(100_000);
    let config = ChunkingConfig::default();

    c.bench_function("chunking", |b| {
        b.iter(|| chunk_text(black_box(&document), black_box(&config)))
    });

    let no_overlap = ChunkingConfig {
        chunk_size: 256,
        overlap: 0,
    };
    c.bench_function("chunking_no_overlap", |b| {
        b.iter(|| chunk_text(black_box(&document), black_box(&no_overlap)))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
