//! Performance benchmarks for grimoire-engine

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use grimoire_engine::model::Campaign;
use grimoire_engine::{EntityStore, PushPlan, ReconcileMode, Reconciler, RemoteEntity};

fn campaign(i: usize) -> Campaign {
    let mut campaign = Campaign::titled(format!("Campaign {i}"));
    campaign.concept = format!("Concept for campaign {i}");
    campaign.add_section("Intro", "Once upon a time");
    campaign
}

fn pulled(size: usize, offset: usize) -> Vec<RemoteEntity<Campaign>> {
    (0..size)
        .map(|i| RemoteEntity::new((i + offset) as i64 + 1, campaign(i + offset)))
        .collect()
}

/// A store of `size` clean records with every tenth one edited.
fn populated_store(size: usize) -> EntityStore<Campaign> {
    let mut store = EntityStore::new();
    Reconciler::default()
        .reconcile(&mut store, pulled(size, 0))
        .unwrap();
    let edited: Vec<_> = store
        .all()
        .into_iter()
        .step_by(10)
        .map(|r| r.local_id())
        .collect();
    for id in edited {
        let _ = store.update(id, |c| c.title.push_str(" (edited)"));
    }
    store
}

fn bench_store_operations(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_operations");

    group.bench_function("create", |b| {
        let mut store = EntityStore::new();
        b.iter(|| store.create(black_box(Campaign::titled("Bench"))))
    });

    group.bench_function("update", |b| {
        let mut store = populated_store(1000);
        let id = store.get_by_remote(500).unwrap().local_id();
        b.iter(|| store.update(black_box(id), |c| c.concept.push('x')))
    });

    group.bench_function("get_by_remote", |b| {
        let store = populated_store(1000);
        b.iter(|| store.get_by_remote(black_box(500)).map(|r| r.revision()))
    });

    group.bench_function("query_dirty", |b| {
        let store = populated_store(1000);
        b.iter(|| store.dirty().len())
    });

    group.bench_function("push_plan", |b| {
        let store = populated_store(1000);
        b.iter(|| PushPlan::from_store(black_box(&store)))
    });

    group.finish();
}

fn bench_reconciliation(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconciliation");

    for size in [100, 1000, 5000].iter() {
        for mode in [ReconcileMode::PreserveDirty, ReconcileMode::ReplaceAll] {
            let name = format!("{mode:?}");
            group.bench_with_input(BenchmarkId::new(name, size), size, |b, &size| {
                let base = populated_store(size);
                let snapshot = base.export_state();
                // Half overlaps the local ids, half is new.
                let incoming = pulled(size, size / 2);

                b.iter(|| {
                    let mut store = EntityStore::new();
                    store.import_state(snapshot.clone()).unwrap();
                    Reconciler::new(mode).reconcile(&mut store, black_box(incoming.clone()))
                })
            });
        }
    }

    group.finish();
}

fn bench_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot");

    for size in [100, 1000].iter() {
        group.bench_with_input(BenchmarkId::new("export", size), size, |b, &size| {
            let store = populated_store(size);
            b.iter(|| store.export_state())
        });

        group.bench_with_input(BenchmarkId::new("to_json", size), size, |b, &size| {
            let snapshot = populated_store(size).export_state();
            b.iter(|| snapshot.to_json())
        });

        group.bench_with_input(BenchmarkId::new("import", size), size, |b, &size| {
            let snapshot = populated_store(size).export_state();
            b.iter(|| {
                let mut store = EntityStore::new();
                store.import_state(black_box(snapshot.clone()))
            })
        });
    }

    group.finish();
}

fn bench_serialization(c: &mut Criterion) {
    let mut group = c.benchmark_group("serialization");

    group.bench_function("entity_to_json", |b| {
        let entity = RemoteEntity::new(1, campaign(1));
        b.iter(|| serde_json::to_string(black_box(&entity)))
    });

    group.bench_function("entity_list_from_json", |b| {
        let json = serde_json::to_string(&pulled(100, 0)).unwrap();
        b.iter(|| serde_json::from_str::<Vec<RemoteEntity<Campaign>>>(black_box(&json)))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_store_operations,
    bench_reconciliation,
    bench_snapshot,
    bench_serialization,
);
criterion_main!(benches);
