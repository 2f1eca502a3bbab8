use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use layercache::{Cache, CacheConfig, MemoryCache, SharedCache};
use layercache_decorators::{CompressCache, HashKeyCache, LruCache, SerializeCache};

fn engine(id: &str) -> SharedCache<Vec<u8>> {
    MemoryCache::<Vec<u8>>::started(CacheConfig::with_id(id)).unwrap()
}

fn bench_engine_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_get");
    group.sample_size(50);
    group.throughput(Throughput::Elements(1));

    group.bench_function("get_1kb_hit", |b| {
        let cache = engine("bench-engine");
        let data = vec![b'x'; 1024];
        let keys: Vec<String> = (0..100).map(|i| format!("k{i}")).collect();
        for key in &keys {
            cache.put(key, data.clone()).unwrap();
        }

        let mut counter = 0;
        b.iter(|| {
            black_box(cache.get(&keys[counter % 100]).unwrap());
            counter += 1;
        });
    });

    group.finish();
}

fn bench_lru_mixed_50_50(c: &mut Criterion) {
    let mut group = c.benchmark_group("lru_mixed");
    group.sample_size(50);
    group.throughput(Throughput::Elements(1));

    group.bench_function("50_read_50_write_bounded", |b| {
        let cache = LruCache::new(engine("bench-lru"), 64).unwrap();
        let data = vec![b'x'; 1024];
        let keys: Vec<String> = (0..100).map(|i| format!("k{i}")).collect();
        for key in &keys {
            cache.put(key, data.clone()).unwrap();
        }

        let mut counter = 0usize;
        b.iter(|| {
            let key = &keys[counter % 100];
            if counter % 2 == 0 {
                black_box(cache.get(key).ok());
            } else {
                black_box(cache.put(key, data.clone()).ok());
            }
            counter += 1;
        });
    });

    group.finish();
}

fn bench_full_stack(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_stack");
    group.sample_size(50);
    group.throughput(Throughput::Elements(1));

    group.bench_function("typed_get_through_compress_and_hash", |b| {
        let hashed: SharedCache<Vec<u8>> = Arc::new(HashKeyCache::new(engine("bench-stack")));
        let packed: SharedCache<Vec<u8>> = Arc::new(CompressCache::new(hashed));
        let typed: SerializeCache<Vec<u64>> = SerializeCache::new(packed);
        let record: Vec<u64> = (0..128).collect();
        let keys: Vec<String> = (0..100).map(|i| format!("rec:{i}")).collect();
        for key in &keys {
            typed.put(key, record.clone()).unwrap();
        }

        let mut counter = 0;
        b.iter(|| {
            black_box(typed.get(&keys[counter % 100]).unwrap());
            counter += 1;
        });
    });

    group.finish();
}

criterion_group!(benches, bench_engine_get, bench_lru_mixed_50_50, bench_full_stack);
criterion_main!(benches);
