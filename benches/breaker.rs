//! Circuit breaker hot-path benchmarks
//!
//! Measures the overhead the breaker adds around an operation that does
//! no work, in the closed state and when rejecting while open.

use callguard::{Breaker, CallError};
use criterion::{Criterion, criterion_group, criterion_main};

fn bench_closed_success(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("runtime");
    let breaker = Breaker::new();

    c.bench_function("breaker_closed_success", |b| {
        b.iter(|| {
            rt.block_on(breaker.run(|| async { Ok(()) }))
                .expect("closed breaker admits")
        })
    });
}

fn bench_open_rejection(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("runtime");
    let breaker = Breaker::new().with_max_failures(1);
    rt.block_on(async {
        let _ = breaker.run(|| async { Err(CallError::app("oops")) }).await;
    });

    c.bench_function("breaker_open_rejection", |b| {
        b.iter(|| {
            let err = rt
                .block_on(breaker.run(|| async { Ok(()) }))
                .expect_err("open breaker rejects");
            assert_eq!(err, CallError::BreakerOpen);
        })
    });
}

fn bench_snapshot(c: &mut Criterion) {
    let breaker = Breaker::new();

    c.bench_function("breaker_snapshot", |b| b.iter(|| breaker.snapshot()));
}

criterion_group!(
    benches,
    bench_closed_success,
    bench_open_rejection,
    bench_snapshot
);
criterion_main!(benches);
