//! Performance benchmarks for stow-engine

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::{json, Value};
use stow_engine::{build_patch, merge_pending_changes, ChangedEntry, Overlay};

fn persisted(n: usize) -> Vec<(String, Value)> {
    (0..n)
        .map(|i| (format!("todo/{:06}", i * 2), json!({"text": "persisted", "sort": i})))
        .collect()
}

fn overlay_with_writes(n: usize) -> Overlay {
    let mut overlay = Overlay::new();
    for i in 0..n {
        let key = format!("todo/{:06}", i * 3);
        if i % 4 == 0 {
            overlay.delete(key);
        } else {
            overlay.put(key, json!({"text": "pending", "sort": i}));
        }
    }
    overlay
}

fn bench_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge");

    for size in [100usize, 1_000, 10_000] {
        let source = persisted(size);
        let overlay = overlay_with_writes(size / 10);

        group.bench_with_input(BenchmarkId::new("merge_pending", size), &size, |b, _| {
            b.iter(|| {
                merge_pending_changes(black_box(source.clone()), overlay.pending_from(""))
                    .count()
            })
        });
    }

    group.finish();
}

fn bench_overlay(c: &mut Criterion) {
    let mut group = c.benchmark_group("overlay");

    group.bench_function("put_1000", |b| {
        b.iter(|| overlay_with_writes(black_box(1_000)))
    });

    group.bench_function("checkpoint_restore", |b| {
        let mut overlay = overlay_with_writes(1_000);
        b.iter(|| {
            let checkpoint = overlay.checkpoint();
            overlay.put("todo/scratch", json!(1));
            overlay.restore(black_box(checkpoint));
        })
    });

    group.finish();
}

fn bench_patch(c: &mut Criterion) {
    let entries: Vec<ChangedEntry> = (0..1_000)
        .map(|i| ChangedEntry {
            key: format!("todo/{:06}", i),
            value: json!({"sort": i}),
            deleted: i % 5 == 0,
            version: i as i64,
        })
        .collect();

    c.bench_function("build_patch_1000", |b| {
        b.iter(|| build_patch(black_box(entries.clone())))
    });
}

criterion_group!(benches, bench_merge, bench_overlay, bench_patch);
criterion_main!(benches);
