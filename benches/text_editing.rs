//! Benchmarks for position-addressed text edits

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use crudearch::text;

fn sample_text(rows: usize) -> String {
    (0..rows)
        .map(|i| format!("row {:05}: the quick brown fox jumps over the lazy dog", i))
        .collect::<Vec<_>>()
        .join("\n")
}

fn benchmark_insert_at_position(c: &mut Criterion) {
    let mut group = c.benchmark_group("text_insert_at_position");

    for rows in [100, 1000, 10000].iter() {
        let text = sample_text(*rows);
        group.bench_with_input(BenchmarkId::from_parameter(rows), &text, |b, text| {
            b.iter(|| black_box(text::insert_at_position(text, "xyz", rows / 2, 10).unwrap()));
        });
    }

    group.finish();
}

fn benchmark_remove_column(c: &mut Criterion) {
    let mut group = c.benchmark_group("text_remove_column");

    for rows in [100, 1000, 10000].iter() {
        let text = sample_text(*rows);
        group.bench_with_input(BenchmarkId::from_parameter(rows), &text, |b, text| {
            b.iter(|| black_box(text::remove_columns(text, &[(0, 4), (11, 21)]).unwrap()));
        });
    }

    group.finish();
}

fn benchmark_replace(c: &mut Criterion) {
    let text = sample_text(10000);
    c.bench_function("text_replace_10000_rows", |b| {
        b.iter(|| black_box(text::replace(&text, "fox", "cat")));
    });
}

criterion_group!(benches, benchmark_insert_at_position, benchmark_remove_column, benchmark_replace);
criterion_main!(benches);
