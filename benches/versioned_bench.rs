//! Benchmarks comparing the persistent map against `im::OrdMap` for
//! versioned workloads: plain lookups, mutation with history retention, and
//! time travel back to an old version.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::{seq::SliceRandom, thread_rng, Rng};

use im::OrdMap as ImOrdMap;
use verso::{Persistent, PersistentMap};

const MAP_SIZES: [usize; 3] = [1 << 6, 1 << 8, 1 << 10];

fn populated(size: usize) -> (PersistentMap<usize, usize>, ImOrdMap<usize, usize>) {
    let mut keys: Vec<usize> = (0..size).collect();
    keys.shuffle(&mut thread_rng());

    let mut map = PersistentMap::new();
    let mut im_map = ImOrdMap::new();
    for &key in &keys {
        map.insert(key, key);
        im_map.insert(key, key);
    }
    (map, im_map)
}

pub fn lookup_comparison(c: &mut Criterion) {
    let mut group = c.benchmark_group("lookup_comparison");
    group.throughput(Throughput::Elements(1));

    for size in MAP_SIZES {
        let (map, im_map) = populated(size);

        group.bench_with_input(BenchmarkId::new("verso_map", size), &size, |b, &size| {
            let mut rng = thread_rng();
            b.iter(|| {
                let key = rng.gen_range(0..size);
                std::hint::black_box(map.get(&key));
            })
        });

        group.bench_with_input(BenchmarkId::new("im_ordmap", size), &size, |b, &size| {
            let mut rng = thread_rng();
            b.iter(|| {
                let key = rng.gen_range(0..size);
                std::hint::black_box(im_map.get(&key));
            })
        });
    }

    group.finish();
}

pub fn versioned_insert_comparison(c: &mut Criterion) {
    let mut group = c.benchmark_group("versioned_insert");
    group.throughput(Throughput::Elements(1));

    for size in MAP_SIZES {
        group.bench_with_input(BenchmarkId::new("verso_map", size), &size, |b, &size| {
            let (mut map, _) = populated(size);
            let mut rng = thread_rng();
            b.iter(|| {
                let key = rng.gen_range(0..size);
                let value = rng.gen_range(0..usize::MAX);
                map.insert(key, value);
            })
        });

        // im's equivalent of retaining every version: keep a clone per step.
        group.bench_with_input(BenchmarkId::new("im_ordmap", size), &size, |b, &size| {
            let (_, im_map) = populated(size);
            let mut rng = thread_rng();
            let mut history = vec![im_map];
            b.iter(|| {
                let key = rng.gen_range(0..size);
                let value = rng.gen_range(0..usize::MAX);
                let mut next = history.last().unwrap().clone();
                next.insert(key, value);
                history.push(next);
            })
        });
    }

    group.finish();
}

pub fn time_travel(c: &mut Criterion) {
    let mut group = c.benchmark_group("time_travel");
    group.throughput(Throughput::Elements(1));

    for size in MAP_SIZES {
        let mut map = PersistentMap::new();
        let mut versions = Vec::with_capacity(size);
        for key in 0..size {
            map.insert(key, key);
            versions.push(map.version());
        }

        group.bench_with_input(BenchmarkId::new("verso_map", size), &size, |b, &size| {
            let mut rng = thread_rng();
            b.iter(|| {
                let pick = rng.gen_range(0..size);
                let at = map.with_version(versions[pick].clone());
                std::hint::black_box(at.get(&pick));
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    lookup_comparison,
    versioned_insert_comparison,
    time_travel
);
criterion_main!(benches);
