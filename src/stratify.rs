//! Stratification analysis for programs with negation.
//!
//! Assigns every predicate to a stratum so that negation is only ever applied
//! to predicates whose extent is already final. A program admits such an
//! assignment exactly when no dependency cycle contains a negative edge.

use std::collections::VecDeque;

use indexmap::{IndexMap, IndexSet};

use crate::error::{Error, Result};
use crate::term::Rule;

/// Outcome of the analysis: a stratum per predicate and, per stratum, the
/// indices of the rules whose heads live there.
#[derive(Debug, Clone, Default)]
pub(crate) struct Stratification {
    pub(crate) predicate_strata: IndexMap<String, usize>,
    pub(crate) rule_strata: Vec<Vec<usize>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EdgeKind {
    Positive,
    Negative,
}

/// Predicate dependency graph: an edge head → body-predicate per body
/// literal, labeled by the literal's sign.
#[derive(Debug, Default)]
struct DependencyGraph {
    predicates: IndexSet<String>,
    edges: IndexMap<String, Vec<(String, EdgeKind)>>,
}

impl DependencyGraph {
    fn add_edge(&mut self, from: &str, to: &str, kind: EdgeKind) {
        self.predicates.insert(from.to_string());
        self.predicates.insert(to.to_string());
        self.edges
            .entry(from.to_string())
            .or_default()
            .push((to.to_string(), kind));
    }

    fn dependencies(&self, from: &str) -> &[(String, EdgeKind)] {
        self.edges.get(from).map_or(&[], Vec::as_slice)
    }
}

/// Analyzes a rule set over the given predicate universe.
///
/// # Errors
///
/// [`Error::CyclicNegation`] if any dependency cycle contains a negative
/// edge.
pub(crate) fn analyze<'a>(
    rules: &[Rule],
    predicates: impl Iterator<Item = &'a str>,
) -> Result<Stratification> {
    let graph = build_graph(rules, predicates);

    if let Some(cycle) = find_negative_cycle(&graph) {
        return Err(Error::CyclicNegation {
            cycle: cycle.join(" -> "),
        });
    }

    let predicate_strata = compute_strata(&graph);
    let stratum_count = predicate_strata.values().max().copied().unwrap_or(0) + 1;
    let mut rule_strata = vec![Vec::new(); stratum_count];
    for (index, rule) in rules.iter().enumerate() {
        let stratum = predicate_strata
            .get(&rule.head.predicate)
            .copied()
            .unwrap_or(0);
        rule_strata[stratum].push(index);
    }

    Ok(Stratification {
        predicate_strata,
        rule_strata,
    })
}

fn build_graph<'a>(rules: &[Rule], predicates: impl Iterator<Item = &'a str>) -> DependencyGraph {
    let mut graph = DependencyGraph::default();
    for name in predicates {
        graph.predicates.insert(name.to_string());
    }
    for rule in rules {
        for literal in &rule.body {
            let kind = if literal.negated {
                EdgeKind::Negative
            } else {
                EdgeKind::Positive
            };
            graph.add_edge(&rule.head.predicate, &literal.atom.predicate, kind);
        }
    }
    graph
}

/// Finds a cycle containing a negative edge, if one exists.
///
/// For every negative edge `from -~> to`, a path `to ->* from` closes an
/// illegal cycle. The returned list starts and ends at `from`.
fn find_negative_cycle(graph: &DependencyGraph) -> Option<Vec<String>> {
    for from in &graph.predicates {
        for (to, kind) in graph.dependencies(from) {
            if *kind == EdgeKind::Negative {
                if let Some(path) = path_between(graph, to, from) {
                    let mut cycle = vec![from.clone()];
                    cycle.extend(path);
                    return Some(cycle);
                }
            }
        }
    }
    None
}

/// Breadth-first path from `start` to `goal` along dependency edges.
fn path_between(graph: &DependencyGraph, start: &str, goal: &str) -> Option<Vec<String>> {
    if start == goal {
        return Some(vec![start.to_string()]);
    }
    let mut parents: IndexMap<String, String> = IndexMap::new();
    let mut seen: IndexSet<String> = IndexSet::new();
    seen.insert(start.to_string());
    let mut queue = VecDeque::new();
    queue.push_back(start.to_string());

    while let Some(node) = queue.pop_front() {
        for (next, _) in graph.dependencies(&node) {
            if seen.insert(next.clone()) {
                parents.insert(next.clone(), node.clone());
                if next == goal {
                    let mut path = vec![goal.to_string()];
                    let mut current = goal;
                    while let Some(parent) = parents.get(current) {
                        path.push(parent.clone());
                        current = parent;
                    }
                    path.reverse();
                    return Some(path);
                }
                queue.push_back(next.clone());
            }
        }
    }
    None
}

/// Fixpoint stratum assignment: a predicate must sit at least as high as its
/// positive dependencies and strictly above its negative ones. Terminates
/// because negative cycles were ruled out, bounding every stratum by the
/// predicate count.
fn compute_strata(graph: &DependencyGraph) -> IndexMap<String, usize> {
    let mut strata: IndexMap<String, usize> = graph
        .predicates
        .iter()
        .map(|predicate| (predicate.clone(), 0))
        .collect();

    let mut changed = true;
    while changed {
        changed = false;
        for predicate in &graph.predicates {
            let mut required = strata[predicate];
            for (dependency, kind) in graph.dependencies(predicate) {
                let dependency_stratum = strata.get(dependency).copied().unwrap_or(0);
                let needed = match kind {
                    EdgeKind::Positive => dependency_stratum,
                    EdgeKind::Negative => dependency_stratum + 1,
                };
                required = required.max(needed);
            }
            if required > strata[predicate] {
                strata.insert(predicate.clone(), required);
                changed = true;
            }
        }
    }
    strata
}
