use arbor_tree::{Arena, NodeId, NodeOptions, Package};
use criterion::{Criterion, black_box, criterion_group, criterion_main};

/// A flat tree of `width` packages that each depend on the next one.
fn flat_tree(width: usize) -> (Arena, NodeId, Vec<NodeId>) {
    let mut arena = Arena::new();
    let mut package = Package::named("root", "1.0.0");
    for i in 0..width {
        package = package.with_dependency(format!("pkg-{i}"), "^1");
    }
    let root = arena.create_node(NodeOptions::at("/bench", package)).unwrap();
    let nodes = (0..width)
        .map(|i| {
            let package = Package::named(format!("pkg-{i}"), "1.0.0")
                .with_dependency(format!("pkg-{}", (i + 1) % width), "^1");
            arena.create_node(NodeOptions::child(root, package)).unwrap()
        })
        .collect();
    (arena, root, nodes)
}

fn build_benchmark(c: &mut Criterion) {
    c.bench_function("Arena::create_node (200 children)", |b| {
        b.iter(|| flat_tree(black_box(200)))
    });
}

fn move_benchmark(c: &mut Criterion) {
    c.bench_function("Arena::set_parent (nest and hoist)", |b| {
        let (mut arena, root, nodes) = flat_tree(200);
        let (holder, moved) = (nodes[0], nodes[100]);
        b.iter(|| {
            arena.set_parent(black_box(moved), Some(holder));
            arena.set_parent(black_box(moved), Some(root));
        })
    });

    c.bench_function("Arena::set_root (across trees)", |b| {
        let (mut arena, _, nodes) = flat_tree(200);
        let other = arena
            .create_node(NodeOptions::at("/other", Package::named("other", "1.0.0")))
            .unwrap();
        let moved = nodes[50];
        let home = arena.node(moved).parent().unwrap();
        b.iter(|| {
            arena.set_parent(black_box(moved), Some(other));
            arena.set_parent(black_box(moved), Some(home));
        })
    });
}

fn check_benchmark(c: &mut Criterion) {
    let (mut arena, root, _) = flat_tree(500);
    c.bench_function("Arena::tree_check (500 nodes)", |b| {
        b.iter(|| arena.tree_check(black_box(root)).unwrap())
    });
    c.bench_function("Arena::calc_dep_flags (500 nodes)", |b| {
        b.iter(|| {
            arena.reset_dep_flags(root);
            arena.calc_dep_flags(black_box(root), true);
        })
    });
}

criterion_group!(benches, build_benchmark, move_benchmark, check_benchmark);
criterion_main!(benches);
