use criterion::{black_box, criterion_group, criterion_main, Criterion};
use request_coordinator::coordination::{DedupCache, ThrottleLimiter};
use request_coordinator::RequestDescriptor;
use serde_json::json;
use std::time::Duration;
use tokio::time::Instant;

fn benchmark_signature_building(c: &mut Criterion) {
    let op = RequestDescriptor::post(
        "/api/leads/search/?page=2&sort=name",
        json!({
            "filters": { "status": ["new", "contacted"], "owner": 42 },
            "limit": 50,
        }),
    );

    c.bench_function("signature_building", |b| {
        b.iter(|| black_box(&op).signature())
    });
}

fn benchmark_dedup_lookup(c: &mut Criterion) {
    let cache = DedupCache::new(Duration::from_secs(300));
    let now = Instant::now();
    for i in 0..1_000 {
        cache.put_at(
            RequestDescriptor::get(format!("/api/leads/{i}")).signature(),
            json!({ "id": i }),
            now,
        );
    }
    let hit = RequestDescriptor::get("/api/leads/500").signature();

    c.bench_function("dedup_lookup_hit", |b| {
        b.iter(|| cache.get(black_box(&hit), Duration::from_secs(1), now))
    });
}

fn benchmark_throttle_check(c: &mut Criterion) {
    let limiter = ThrottleLimiter::new();
    let signature = RequestDescriptor::get("/api/analytics").signature();
    let now = Instant::now();

    c.bench_function("throttle_check", |b| {
        b.iter(|| limiter.allow(black_box(&signature), Duration::from_millis(500), now))
    });
}

criterion_group!(
    benches,
    benchmark_signature_building,
    benchmark_dedup_lookup,
    benchmark_throttle_check
);
criterion_main!(benches);
