use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ngac::{
    ops, Decider, GraphMut, MemGraph, MemProhibitions, NodeType, OperationVocabulary,
    PReviewDecider, Prohibition, ProhibitionSubject, Properties,
};

/// Build `pcs` policy classes, each with a `depth`-deep chain of object
/// attributes; `width` objects hang off the bottom of every chain
fn layered_graph(pcs: usize, depth: usize, width: usize) -> (MemGraph, MemProhibitions) {
    let mut graph = MemGraph::new();
    let p = Properties::new;

    for pc in 0..pcs {
        let pc_name = format!("pc{}", pc);
        graph.create_policy_class(&pc_name, p()).unwrap();
        graph
            .create_node(&format!("ua{}", pc), NodeType::UserAttribute, p(), &pc_name, &[])
            .unwrap();

        let mut parent = pc_name.clone();
        for level in 0..depth {
            let name = format!("oa{}_{}", pc, level);
            graph
                .create_node(&name, NodeType::ObjectAttribute, p(), &parent, &[])
                .unwrap();
            parent = name;
        }
        graph
            .associate(&format!("ua{}", pc), &format!("oa{}_0", pc), ops!["read", "write"])
            .unwrap();
    }

    let user_parents: Vec<String> = (1..pcs).map(|pc| format!("ua{}", pc)).collect();
    let user_parents: Vec<&str> = user_parents.iter().map(String::as_str).collect();
    graph
        .create_node("u", NodeType::User, p(), "ua0", &user_parents)
        .unwrap();

    let leaves: Vec<String> = (0..pcs).map(|pc| format!("oa{}_{}", pc, depth - 1)).collect();
    let leaves: Vec<&str> = leaves.iter().map(String::as_str).collect();
    for i in 0..width {
        graph
            .create_node(&format!("o{}", i), NodeType::Object, p(), leaves[0], &leaves[1..])
            .unwrap();
    }

    let mut prohibitions = MemProhibitions::new();
    prohibitions
        .create(
            Prohibition::builder("no-write", ProhibitionSubject::Node("ua0".into()))
                .operation("write")
                .container(&format!("oa0_{}", depth - 1), false)
                .container("o0", true)
                .intersection(true)
                .build(),
        )
        .unwrap();

    (graph, prohibitions)
}

/// Benchmark a single decision as the graph deepens
fn bench_list(c: &mut Criterion) {
    let vocabulary = OperationVocabulary::new(["read", "write"]);
    let mut group = c.benchmark_group("list");

    for depth in [4, 16, 64] {
        let (graph, prohibitions) = layered_graph(3, depth, 10);
        let decider = PReviewDecider::new(&graph, &prohibitions, &vocabulary);

        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, _| {
            b.iter(|| black_box(decider.list("u", "", black_box("o5")).unwrap()));
        });
    }

    group.finish();
}

/// Benchmark capability lists over many objects
fn bench_capability_list(c: &mut Criterion) {
    let vocabulary = OperationVocabulary::new(["read", "write"]);
    let mut group = c.benchmark_group("capability_list");

    for width in [10, 100, 1_000] {
        let (graph, prohibitions) = layered_graph(2, 8, width);
        let decider = PReviewDecider::new(&graph, &prohibitions, &vocabulary);

        group.throughput(Throughput::Elements(width as u64));
        group.bench_with_input(BenchmarkId::from_parameter(width), &width, |b, _| {
            b.iter(|| black_box(decider.capability_list("u", "").unwrap()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_list, bench_capability_list);
criterion_main!(benches);
