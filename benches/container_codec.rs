//! Benchmarks for whole-archive encode/decode

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use crudearch::EntryStore;

fn build_store(entries: usize, payload_len: usize) -> EntryStore {
    let mut store = EntryStore::create();
    for i in 0..entries {
        store
            .add_binary(&format!("blob_{}.bin", i), vec![i as u8; payload_len])
            .unwrap();
    }
    store
}

fn benchmark_save(c: &mut Criterion) {
    let mut group = c.benchmark_group("container_save");

    for entries in [10, 100, 1000].iter() {
        let store = build_store(*entries, 4096);
        group.throughput(Throughput::Bytes((*entries * 4096) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(entries), &store, |b, store| {
            b.iter(|| black_box(store.save().unwrap()));
        });
    }

    group.finish();
}

fn benchmark_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("container_load");

    for entries in [10, 100, 1000].iter() {
        let bytes = build_store(*entries, 4096).save().unwrap();
        group.throughput(Throughput::Bytes(bytes.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(entries), &bytes, |b, bytes| {
            b.iter(|| black_box(EntryStore::load(bytes).unwrap()));
        });
    }

    group.finish();
}

fn benchmark_json_metadata(c: &mut Criterion) {
    let mut store = EntryStore::create();
    for i in 0..200 {
        store
            .add_json(&format!("doc_{}.json", i), &serde_json::json!({"id": i, "tags": ["a", "b"]}))
            .unwrap();
    }
    let bytes = store.save().unwrap();

    c.bench_function("container_roundtrip_json_200", |b| {
        b.iter(|| black_box(EntryStore::load(&bytes).unwrap().save().unwrap()));
    });
}

criterion_group!(benches, benchmark_save, benchmark_load, benchmark_json_metadata);
criterion_main!(benches);
