use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use lsm_memtable::types::ValueType;
use lsm_memtable::{LookupKey, MemTable};

fn benchmark_sequential_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("memtable_sequential_insert");

    for size in [100, 1_000, 10_000].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let mt = MemTable::new();
                mt.ref_();
                for i in 0..size {
                    let key = format!("key{i:08}");
                    mt.add(i as u64, ValueType::Value, key.as_bytes(), b"value");
                }
                black_box(&mt);
                mt.unref();
            });
        });
    }

    group.finish();
}

fn benchmark_random_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("memtable_random_insert");

    for size in [100, 1_000, 10_000].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let mt = MemTable::new();
                mt.ref_();
                use rand::seq::SliceRandom;
                let mut order: Vec<u32> = (0..size as u32).collect();
                order.shuffle(&mut rand::thread_rng());
                for (seq, i) in order.into_iter().enumerate() {
                    let key = format!("key{i:08}");
                    mt.add(seq as u64, ValueType::Value, key.as_bytes(), b"value");
                }
                black_box(&mt);
                mt.unref();
            });
        });
    }

    group.finish();
}

fn benchmark_point_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("memtable_point_lookup");

    for size in [1_000, 10_000, 100_000].iter() {
        let mt = MemTable::new();
        mt.ref_();
        for i in 0..*size {
            let key = format!("key{i:08}");
            mt.add(i as u64, ValueType::Value, key.as_bytes(), b"value");
        }

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let mid_key = format!("key{:08}", size / 2);
            b.iter(|| {
                let lk = LookupKey::new(mid_key.as_bytes(), size as u64);
                black_box(mt.get(&lk).unwrap());
            });
        });
        mt.unref();
    }

    group.finish();
}

fn benchmark_overwrite(c: &mut Criterion) {
    let mut group = c.benchmark_group("memtable_overwrite");

    group.throughput(Throughput::Elements(1_000));
    group.bench_function("overwrite_1000", |b| {
        b.iter(|| {
            let mt = MemTable::new();
            mt.ref_();
            for i in 0..1_000 {
                let key = format!("key{i:08}");
                mt.add(i as u64, ValueType::Value, key.as_bytes(), b"initial");
            }
            for i in 0..1_000 {
                let key = format!("key{i:08}");
                mt.add(1_000 + i as u64, ValueType::Value, key.as_bytes(), b"updated");
            }
            black_box(&mt);
            mt.unref();
        });
    });

    group.finish();
}

fn benchmark_full_iteration(c: &mut Criterion) {
    let mut group = c.benchmark_group("memtable_full_iteration");

    for size in [1_000, 10_000].iter() {
        let mt = MemTable::new();
        mt.ref_();
        for i in 0..*size {
            let key = format!("key{i:08}");
            mt.add(i as u64, ValueType::Value, key.as_bytes(), b"value");
        }

        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let mut iter = mt.new_iterator();
                iter.seek_to_first();
                let mut count = 0usize;
                while iter.valid() {
                    black_box(iter.value());
                    count += 1;
                    iter.next();
                }
                black_box(count);
            });
        });
        mt.unref();
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_sequential_insert,
    benchmark_random_insert,
    benchmark_point_lookup,
    benchmark_overwrite,
    benchmark_full_iteration
);
criterion_main!(benches);
