use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use dispatchnet::dispatch::{await_all, Dispatcher, NoopCallback};
use dispatchnet::http::{Exchange, ExchangeContext, HttpResponse, RequestDescriptor, Transport};
use dispatchnet::socket::pool::{ConnectionPool, DestinationKey};
use http::{HeaderMap, StatusCode, Version};
use std::sync::Arc;

/// Lease bookkeeping without any I/O.
fn benchmark_pool_operations(c: &mut Criterion) {
    let pool = ConnectionPool::new(256, 6).unwrap();
    let destination = DestinationKey::new("http", "example.com", 80);

    c.bench_function("pool_try_acquire_release", |b| {
        b.iter(|| {
            let lease = pool.try_acquire(black_box(&destination));
            drop(black_box(lease));
        })
    });

    c.bench_function("pool_stats", |b| {
        b.iter(|| {
            let _ = black_box(pool.active_count());
            let _ = black_box(pool.stats());
        })
    });
}

struct Immediate;

impl Transport for Immediate {
    fn execute(&self, _request: Arc<RequestDescriptor>, _ctx: ExchangeContext) -> Exchange {
        Box::pin(async {
            Ok(HttpResponse::new(StatusCode::OK, Version::HTTP_11, HeaderMap::new(), Bytes::new()))
        })
    }
}

/// Submit-to-barrier overhead with an in-memory transport.
fn benchmark_dispatch(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let dispatcher = runtime.block_on(async {
        Dispatcher::builder().max_total(16).max_per_destination(4).transport(Immediate).build().unwrap()
    });
    let request = RequestDescriptor::get("http://bench.test/").build().unwrap();

    c.bench_function("dispatch_100_in_memory", |b| {
        b.to_async(&runtime).iter(|| async {
            let handles = dispatcher
                .submit_all((0..100).map(|_| request.clone()), NoopCallback)
                .unwrap();
            black_box(await_all(handles).await)
        })
    });
}

criterion_group!(benches, benchmark_pool_operations, benchmark_dispatch);
criterion_main!(benches);
