//! Streaming query answers.
//!
//! [`Answers`] is a forward-only, lazy iterator over the binding tuples that
//! match a query pattern against the materialized base. It holds only a
//! shared borrow of the base: dropping it (or letting it fall out of scope,
//! even mid-iteration) releases the underlying cursor. A fresh call to
//! [`crate::Reasoner::answer`] restarts from the beginning.

use indexmap::IndexSet;
use smallvec::SmallVec;

use crate::engine::{match_atom, Binding};
use crate::kb::KnowledgeBase;
use crate::term::{Atom, Constant, Term, Tuple};

/// Lazy sequence of binding tuples for one query.
///
/// Each item binds the query's distinct variables, in the order they first
/// appear in the query atom. A query with no variables yields one empty
/// tuple per matching fact (or exactly one with `distinct`).
#[derive(Debug)]
pub struct Answers<'a> {
    query: Atom,
    variables: Vec<String>,
    candidates: std::vec::IntoIter<&'a Tuple>,
    seen: Option<IndexSet<Tuple>>,
}

impl<'a> Answers<'a> {
    pub(crate) fn over(kb: &'a KnowledgeBase, query: &Atom, distinct: bool) -> Self {
        let mut variables = Vec::new();
        for term in &query.terms {
            if let Term::Variable(name) = term {
                if !variables.iter().any(|existing| existing == name) {
                    variables.push(name.clone());
                }
            }
        }
        let candidates = match kb.store().facts(&query.predicate) {
            Some(facts) => kb.store().candidates(query, facts, &Binding::new()),
            None => Vec::new(),
        };
        Self {
            query: query.clone(),
            variables,
            candidates: candidates.into_iter(),
            seen: distinct.then(IndexSet::new),
        }
    }

    /// The emitted variable names, in emission order.
    #[must_use]
    pub fn variables(&self) -> &[String] {
        &self.variables
    }
}

impl Iterator for Answers<'_> {
    type Item = Vec<Constant>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let tuple = self.candidates.next()?;
            let Some(binding) = match_atom(&self.query, tuple, &Binding::new()) else {
                continue;
            };
            let positions: SmallVec<[&Constant; 4]> = self
                .variables
                .iter()
                .filter_map(|name| binding.get(name))
                .collect();
            let answer: Vec<Constant> = positions.into_iter().cloned().collect();
            if let Some(seen) = &mut self.seen {
                if !seen.insert(answer.clone()) {
                    continue;
                }
            }
            return Some(answer);
        }
    }
}
