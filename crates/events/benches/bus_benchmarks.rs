use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use chantier_events::{EventBus, EventDraft, EventFilter, EventType, Severity};

fn offer_signed(n: u64) -> EventDraft {
    EventDraft::new(EventType::OfferSigned, "offer", format!("off-{n}"))
        .with_severity(Severity::Success)
        .with_project_id("p-1")
}

/// Publish latency as the number of (matching) subscribers grows.
fn bench_publish_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("publish_fan_out");
    group.throughput(Throughput::Elements(1));

    for subscribers in [0usize, 1, 10, 100].iter() {
        group.bench_with_input(
            BenchmarkId::new("matching_subscribers", subscribers),
            subscribers,
            |b, &count| {
                let bus = EventBus::new();
                for _ in 0..count {
                    bus.subscribe_fn(
                        |ev| {
                            black_box(ev.entity_id());
                            Ok(())
                        },
                        None,
                    );
                }

                let mut n = 0u64;
                b.iter(|| {
                    n += 1;
                    black_box(bus.publish(offer_signed(n)));
                });
            },
        );
    }

    group.finish();
}

/// Filter evaluation cost when most subscribers reject the event.
fn bench_publish_filtered(c: &mut Criterion) {
    let mut group = c.benchmark_group("publish_filtered");

    group.bench_function("100_non_matching_filters", |b| {
        let bus = EventBus::new();
        for i in 0..100 {
            bus.subscribe_fn(
                |_| Ok(()),
                Some(
                    EventFilter::all()
                        .event_types([EventType::TaskOverdue])
                        .project_ids([format!("p-{i}")]),
                ),
            );
        }

        let mut n = 0u64;
        b.iter(|| {
            n += 1;
            black_box(bus.publish(offer_signed(n)));
        });
    });

    group.finish();
}

/// Catch-up read over a full history.
fn bench_recent_events(c: &mut Criterion) {
    let mut group = c.benchmark_group("recent_events");

    for capacity in [100usize, 1000].iter() {
        group.throughput(Throughput::Elements(*capacity as u64));
        group.bench_with_input(BenchmarkId::new("filtered_snapshot", capacity), capacity, |b, &cap| {
            let bus = EventBus::with_capacity(cap);
            for n in 0..cap as u64 {
                bus.publish(offer_signed(n));
            }
            let filter = EventFilter::all().entities(["offer"]).severities([Severity::Success]);

            b.iter(|| black_box(bus.recent_events(None, Some(&filter))));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_publish_fan_out,
    bench_publish_filtered,
    bench_recent_events
);
criterion_main!(benches);
