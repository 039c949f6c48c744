use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use command_system::CommandBus;

#[derive(Debug, Clone, Copy)]
struct Tick(u64);

#[derive(Debug, Clone, Copy)]
struct Score(u64);

fn bus_with_listeners(listeners: usize) -> (CommandBus, Arc<AtomicU64>) {
    let bus = CommandBus::default();
    let total = Arc::new(AtomicU64::new(0));

    for i in 0..listeners as u64 {
        let sink = Arc::clone(&total);
        bus.listen_fn(move |tick: &Tick| {
            sink.fetch_add(tick.0 + i, Ordering::Relaxed);
        });
        bus.listen_request_fn(move |tick: &Tick| Score(tick.0 * i));
    }

    (bus, total)
}

fn bench_trigger(c: &mut Criterion) {
    let mut group = c.benchmark_group("trigger");

    for listeners in [1usize, 10, 100] {
        let (bus, _total) = bus_with_listeners(listeners);
        group.throughput(Throughput::Elements(listeners as u64));
        group.bench_with_input(BenchmarkId::from_parameter(listeners), &listeners, |b, _| {
            b.iter(|| bus.trigger(black_box(Tick(1))).unwrap());
        });
    }

    group.finish();
}

fn bench_trigger_request(c: &mut Criterion) {
    let mut group = c.benchmark_group("trigger_request");

    for listeners in [1usize, 10, 100] {
        let (bus, _total) = bus_with_listeners(listeners);
        group.throughput(Throughput::Elements(listeners as u64));
        group.bench_with_input(BenchmarkId::from_parameter(listeners), &listeners, |b, _| {
            b.iter(|| {
                let scores = bus.trigger_request::<Tick, Score>(black_box(Tick(2))).unwrap();
                black_box(scores.len())
            });
        });
    }

    group.finish();
}

fn bench_listen_unlisten(c: &mut Criterion) {
    let (bus, _total) = bus_with_listeners(100);

    c.bench_function("listen_unlisten", |b| {
        b.iter(|| {
            let sub = bus.listen_fn(|_: &Tick| {});
            bus.unlisten(sub).unwrap();
        });
    });
}

criterion_group!(benches, bench_trigger, bench_trigger_request, bench_listen_unlisten);
criterion_main!(benches);
