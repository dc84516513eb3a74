#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use stratalog::{parse_program, Constant, KnowledgeBase, Reasoner};

fn edge(from: usize, to: usize) -> Vec<Constant> {
    vec![
        Constant::Named(format!("node_{from}")),
        Constant::Named(format!("node_{to}")),
    ]
}

/// Benchmark for adding facts to the base
fn bench_add_facts(c: &mut Criterion) {
    c.bench_function("add_facts", |b| {
        b.iter(|| {
            let mut kb = KnowledgeBase::new();
            for i in 0..1000 {
                kb.add_fact("edge", black_box(edge(i, i + 1))).unwrap();
            }
            black_box(kb)
        });
    });
}

/// Benchmark for a single non-recursive rule
fn bench_simple_rule_evaluation(c: &mut Criterion) {
    c.bench_function("simple_rule_evaluation", |b| {
        b.iter(|| {
            let mut kb = parse_program("path(?X, ?Y) :- edge(?X, ?Y) .").unwrap();
            for i in 0..100 {
                kb.add_fact("edge", edge(i, i + 1)).unwrap();
            }
            let mut reasoner = Reasoner::new(kb);
            reasoner.reason().unwrap();
            black_box(reasoner.fact_count("path"))
        });
    });
}

/// Benchmark for transitive closure over a linear chain
fn bench_transitive_closure(c: &mut Criterion) {
    c.bench_function("transitive_closure", |b| {
        b.iter(|| {
            let mut kb = parse_program(
                "path(?X, ?Y) :- edge(?X, ?Y) . \
                 path(?X, ?Z) :- path(?X, ?Y), edge(?Y, ?Z) . ",
            )
            .unwrap();
            for i in 0..50 {
                kb.add_fact("edge", edge(i, i + 1)).unwrap();
            }
            let mut reasoner = Reasoner::new(kb);
            reasoner.reason().unwrap();
            black_box(reasoner.fact_count("path"))
        });
    });
}

/// Benchmark for a two-stratum program with negation
fn bench_stratified_negation(c: &mut Criterion) {
    c.bench_function("stratified_negation", |b| {
        b.iter(|| {
            let mut kb = parse_program(
                "reach(?X, ?Y) :- edge(?X, ?Y) . \
                 reach(?X, ?Z) :- reach(?X, ?Y), edge(?Y, ?Z) . \
                 stranded(?Y) :- node(?Y), ~reach(node_0, ?Y) . ",
            )
            .unwrap();
            for i in 0..30 {
                kb.add_fact("node", vec![Constant::Named(format!("node_{i}"))])
                    .unwrap();
                // node_0 reaches only the even-numbered component
                if i % 2 == 0 {
                    kb.add_fact("edge", edge(i, (i + 2) % 30)).unwrap();
                }
            }
            let mut reasoner = Reasoner::new(kb);
            reasoner.reason().unwrap();
            black_box(reasoner.fact_count("stranded"))
        });
    });
}

/// Benchmark for fact retrieval
fn bench_fact_retrieval(c: &mut Criterion) {
    let mut kb = KnowledgeBase::new();
    for i in 0..10000 {
        kb.add_fact(
            "large_relation",
            vec![
                Constant::Named(format!("item_{i}")),
                Constant::Named(format!("value_{}", i % 100)),
            ],
        )
        .unwrap();
    }

    c.bench_function("fact_retrieval", |b| {
        b.iter(|| black_box(kb.facts("large_relation").count()));
    });
}

criterion_group!(
    benches,
    bench_add_facts,
    bench_simple_rule_evaluation,
    bench_transitive_closure,
    bench_stratified_negation,
    bench_fact_retrieval
);
criterion_main!(benches);
