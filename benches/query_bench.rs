#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use stratalog::{parse_atom, parse_program, Constant, Reasoner};

fn setup_large_graph() -> Reasoner {
    let mut kb = parse_program(
        "path(?X, ?Y) :- edge(?X, ?Y) . \
         path(?X, ?Z) :- path(?X, ?Y), edge(?Y, ?Z) . ",
    )
    .unwrap();

    // a graph with 200 nodes, three outgoing edges each
    for i in 0..200 {
        for j in 0..3 {
            let next = (i + j + 1) % 200;
            kb.add_fact(
                "edge",
                vec![
                    Constant::Named(format!("node_{i}")),
                    Constant::Named(format!("node_{next}")),
                ],
            )
            .unwrap();
        }
    }

    let mut reasoner = Reasoner::new(kb);
    reasoner.reason().unwrap();
    reasoner
}

fn query_specific_paths(c: &mut Criterion) {
    let reasoner = setup_large_graph();
    let query = parse_atom("path(node_0, ?X)").unwrap();

    c.bench_function("query_specific_paths", |b| {
        b.iter(|| {
            let answers: Vec<_> = reasoner.answer(&query, false).unwrap().collect();
            black_box(answers)
        });
    });
}

fn query_existence_check(c: &mut Criterion) {
    let reasoner = setup_large_graph();
    let query = parse_atom("path(node_0, node_100)").unwrap();

    c.bench_function("query_existence_check", |b| {
        b.iter(|| black_box(reasoner.ask(&query).unwrap()));
    });
}

fn query_all_paths_distinct(c: &mut Criterion) {
    let reasoner = setup_large_graph();
    let query = parse_atom("path(?X, ?Y)").unwrap();

    c.bench_function("query_all_paths_distinct", |b| {
        b.iter(|| {
            let answers: Vec<_> = reasoner.answer(&query, true).unwrap().collect();
            black_box(answers)
        });
    });
}

criterion_group!(
    benches,
    query_specific_paths,
    query_existence_check,
    query_all_paths_distinct
);
criterion_main!(benches);
