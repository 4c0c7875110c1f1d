use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use chrono::Utc;
use chantier_events::{DomainEvent, EventDraft, EventType};
use chantier_infra::invalidation::invalidation_for;
use chantier_infra::preload::default_chains;

fn sample_events(n: usize) -> Vec<DomainEvent> {
    (0..n)
        .map(|i| {
            let ty = EventType::ALL[i % EventType::ALL.len()];
            EventDraft::new(ty, "offer", format!("off-{i}"))
                .with_project_id(format!("p-{}", i % 17))
                .with_new_status("en_cours")
                .with_query_key(["offers"])
                .normalize(Utc::now())
        })
        .collect()
}

fn bench_invalidation_mapping(c: &mut Criterion) {
    let mut group = c.benchmark_group("invalidation_mapping");
    for size in [100usize, 1_000] {
        let events = sample_events(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &events, |b, events| {
            b.iter(|| {
                for ev in events {
                    black_box(invalidation_for(ev));
                }
            })
        });
    }
    group.finish();
}

fn bench_chain_planning(c: &mut Criterion) {
    let chains = default_chains();
    let events = sample_events(1_000);

    c.bench_function("chain_match_and_plan", |b| {
        let filters: Vec<_> = chains.iter().map(|ch| ch.filter()).collect();
        b.iter(|| {
            for ev in &events {
                for (chain, filter) in chains.iter().zip(&filters) {
                    if filter.matches(ev) {
                        black_box(chain.plan(ev));
                    }
                }
            }
        })
    });
}

criterion_group!(benches, bench_invalidation_mapping, bench_chain_planning);
criterion_main!(benches);
