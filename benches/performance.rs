//! Performance benchmarks for the state tree.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;
use statetree::{PathKey, StateTree, Value};

/// Map with `width` keys `k0..`, each holding `{"value": i}`.
fn wide_state(width: usize) -> Value {
    Value::map((0..width).map(|i| (format!("k{}", i), Value::from(json!({ "value": i })))))
}

/// Chain of nested maps `d.d.d...` ending in `{"leaf": 0}`.
fn deep_state(depth: usize) -> Value {
    (0..depth).fold(Value::from(json!({"leaf": 0})), |inner, _| {
        Value::map([("d", inner)])
    })
}

/// Write cost with many unrelated subscribers: only one of them overlaps
/// the written path.
fn bench_set_with_subscribers(c: &mut Criterion) {
    let mut group = c.benchmark_group("set_with_subscribers");

    for subscribers in [10, 100, 1000, 10000] {
        group.bench_with_input(
            BenchmarkId::new("subscribers", subscribers),
            &subscribers,
            |b, &count| {
                let tree = StateTree::new();
                let node = tree.create_node(wide_state(count));
                let subs: Vec<_> = (0..count)
                    .map(|i| {
                        node.subscribe(format!("k{}.value", i), |new, _| {
                            black_box(new);
                        })
                        .unwrap()
                    })
                    .collect();

                let mut n = 0i64;
                b.iter(|| {
                    n += 1;
                    node.set("k0.value", n).unwrap();
                });
                drop(subs);
            },
        );
    }

    group.finish();
}

/// Write cost as the data tree gets deeper.
fn bench_deep_set(c: &mut Criterion) {
    let mut group = c.benchmark_group("deep_set");

    for depth in [4, 16, 64] {
        group.bench_with_input(BenchmarkId::new("depth", depth), &depth, |b, &depth| {
            let tree = StateTree::new();
            let node = tree.create_node(deep_state(depth));
            let path = PathKey::new(
                std::iter::repeat("d")
                    .take(depth)
                    .chain(std::iter::once("leaf")),
            );
            let _sub = node.subscribe(&path, |_, _| {}).unwrap();

            let mut n = 0i64;
            b.iter(|| {
                n += 1;
                node.set(&path, n).unwrap();
            });
        });
    }

    group.finish();
}

/// Fan-out to many listeners under one replaced container.
fn bench_broadcast_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("broadcast_fanout");

    for width in [10, 100, 1000] {
        group.bench_with_input(BenchmarkId::new("width", width), &width, |b, &width| {
            let tree = StateTree::new();
            let node = tree.create_node(json!({ "list": [] }));
            let subs: Vec<_> = (0..width)
                .map(|i| node.subscribe(format!("list[{}]", i), |_, _| {}).unwrap())
                .collect();

            let mut n = 0i64;
            b.iter(|| {
                n += 1;
                let items = vec![Value::from(n); width];
                node.set("list", items).unwrap();
            });
            drop(subs);
        });
    }

    group.finish();
}

fn bench_path_parse(c: &mut Criterion) {
    c.bench_function("path_parse", |b| {
        b.iter(|| PathKey::parse(black_box("rows[12].cells[3].style.border.color")).unwrap())
    });
}

fn bench_child_propagation(c: &mut Criterion) {
    c.bench_function("child_propagation", |b| {
        let tree = StateTree::new();
        let root = tree.create_node(json!({}));
        let mut parent = root.clone();
        for level in 0..8 {
            let child = tree.create_node(json!({ "value": 0 }));
            parent.set_child(&format!("level{}", level), &child).unwrap();
            parent = child;
        }
        let _sub = root.subscribe("", |_, _| {}).unwrap();

        let mut n = 0i64;
        b.iter(|| {
            n += 1;
            parent.set("value", n).unwrap();
        });
    });
}

criterion_group!(
    benches,
    bench_set_with_subscribers,
    bench_deep_set,
    bench_broadcast_fanout,
    bench_path_parse,
    bench_child_propagation,
);
criterion_main!(benches);
