//! The reasoner: computes all consequences of a knowledge base.
//!
//! Materialization processes strata in dependency order. Within a stratum,
//! evaluation is semi-naive: the first round joins over all known facts, and
//! every later round restricts one body literal at a time to the facts newly
//! derived in the previous round, so work stays proportional to genuinely new
//! derivations. Negated literals are checked against extents that
//! stratification has already finalized.

use indexmap::{IndexMap, IndexSet};
use log::{debug, info};

use crate::error::{Error, Result};
use crate::kb::{KnowledgeBase, State};
use crate::query::Answers;
use crate::term::{Atom, Constant, Rule, Term, Tuple};

/// Variable-to-constant assignments accumulated while joining body literals.
pub(crate) type Binding = IndexMap<String, Constant>;

/// Which facts a body literal sees during one rule evaluation.
enum FactView<'a> {
    /// All facts known so far (first round of a stratum).
    Full,
    /// The previous round's delta at one body position, all facts elsewhere.
    Delta {
        delta: &'a IndexMap<String, IndexSet<Tuple>>,
        position: usize,
    },
}

/// Matches an atom against a stored tuple, extending `binding`.
///
/// Returns `None` on any mismatch: differing arity, a constant that differs
/// from the tuple, or a variable already bound to a different value. Repeated
/// variables in the atom must therefore unify.
pub(crate) fn match_atom(atom: &Atom, tuple: &[Constant], binding: &Binding) -> Option<Binding> {
    if atom.terms.len() != tuple.len() {
        return None;
    }
    let mut extended = binding.clone();
    for (term, value) in atom.terms.iter().zip(tuple) {
        match term {
            Term::Constant(expected) => {
                if expected != value {
                    return None;
                }
            }
            Term::Variable(name) => {
                if let Some(bound) = extended.get(name) {
                    if bound != value {
                        return None;
                    }
                } else {
                    extended.insert(name.clone(), value.clone());
                }
            }
        }
    }
    Some(extended)
}

/// Instantiates the head under a binding. `None` only for unbound head
/// variables, which safety checking has already ruled out.
fn ground_head(head: &Atom, binding: &Binding) -> Option<Tuple> {
    head.terms
        .iter()
        .map(|term| match term {
            Term::Constant(value) => Some(value.clone()),
            Term::Variable(name) => binding.get(name).cloned(),
        })
        .collect()
}

/// Owns a knowledge base through materialization and answers queries over
/// the result.
///
/// Dropping the reasoner releases the base and everything in it; answer
/// iterators only borrow it, so they cannot outlive the session.
#[derive(Debug)]
pub struct Reasoner {
    kb: KnowledgeBase,
    fact_limit: Option<usize>,
    derived_count: usize,
}

impl Reasoner {
    /// Wraps a loaded knowledge base.
    #[must_use]
    pub fn new(kb: KnowledgeBase) -> Self {
        Self {
            kb,
            fact_limit: None,
            derived_count: 0,
        }
    }

    /// Like [`Reasoner::new`], but materialization fails with
    /// [`Error::Resource`] once more than `limit` facts have been derived.
    #[must_use]
    pub fn with_fact_limit(kb: KnowledgeBase, limit: usize) -> Self {
        Self {
            kb,
            fact_limit: Some(limit),
            derived_count: 0,
        }
    }

    /// Read access to the underlying base.
    #[must_use]
    pub fn knowledge_base(&self) -> &KnowledgeBase {
        &self.kb
    }

    /// Number of stored facts for a predicate (zero if unknown).
    #[must_use]
    pub fn fact_count(&self, predicate: &str) -> usize {
        self.kb.fact_count(predicate)
    }

    /// Runs materialization to fixpoint.
    ///
    /// Stratifies the base first if the caller has not done so. The result is
    /// deterministic for fixed input, and re-running on a materialized base
    /// derives nothing new.
    ///
    /// # Errors
    ///
    /// [`Error::CyclicNegation`] from implied stratification, or
    /// [`Error::Resource`] if a configured fact limit is exceeded.
    pub fn reason(&mut self) -> Result<()> {
        if self.kb.state() == State::Open {
            self.kb.stratify()?;
        }
        let strata: Vec<Vec<usize>> = self.kb.strata().to_vec();
        for (stratum, rule_indices) in strata.iter().enumerate() {
            self.materialize_stratum(stratum, rule_indices)?;
        }
        self.kb.mark_materialized();
        info!(
            "materialization complete: {} facts derived",
            self.derived_count
        );
        Ok(())
    }

    /// Streams bindings for every stored fact matching the query pattern.
    ///
    /// Constant positions must match exactly; variable positions are emitted
    /// in the order the variables first appear in the atom. With `distinct`,
    /// duplicate binding tuples are suppressed. Querying an unknown predicate
    /// yields an empty sequence.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`] if the base is not yet materialized.
    pub fn answer(&self, query: &Atom, distinct: bool) -> Result<Answers<'_>> {
        if self.kb.state() != State::Materialized {
            return Err(Error::InvalidState {
                operation: "answer a query",
                state: self.kb.state().name(),
            });
        }
        Ok(Answers::over(&self.kb, query, distinct))
    }

    /// Whether at least one fact matches the query pattern.
    ///
    /// # Errors
    ///
    /// Same as [`Reasoner::answer`].
    pub fn ask(&self, query: &Atom) -> Result<bool> {
        let mut answers = self.answer(query, false)?;
        Ok(answers.next().is_some())
    }

    /// Semi-naive fixpoint over one stratum's rules.
    fn materialize_stratum(&mut self, stratum: usize, rule_indices: &[usize]) -> Result<()> {
        let rules: Vec<Rule> = rule_indices
            .iter()
            .map(|&index| self.kb.rules()[index].clone())
            .collect();

        let mut delta: IndexMap<String, IndexSet<Tuple>> = IndexMap::new();
        let mut changed = false;
        for rule in &rules {
            let derived = self.evaluate_rule(rule, &FactView::Full);
            changed |= self.absorb(&rule.head.predicate, derived, &mut delta)?;
        }

        let mut rounds = 1usize;
        while changed {
            changed = false;
            rounds += 1;
            let current = std::mem::take(&mut delta);
            for rule in &rules {
                let derived = self.evaluate_semi_naive(rule, &current);
                changed |= self.absorb(&rule.head.predicate, derived, &mut delta)?;
            }
        }
        debug!("stratum {stratum} reached fixpoint after {rounds} rounds");
        Ok(())
    }

    /// Inserts derived tuples, recording the genuinely new ones in `delta`.
    fn absorb(
        &mut self,
        predicate: &str,
        derived: IndexSet<Tuple>,
        delta: &mut IndexMap<String, IndexSet<Tuple>>,
    ) -> Result<bool> {
        let mut changed = false;
        for tuple in derived {
            if self.kb.insert_derived(predicate, tuple.clone()) {
                self.derived_count += 1;
                if let Some(limit) = self.fact_limit {
                    if self.derived_count > limit {
                        return Err(Error::Resource {
                            message: format!(
                                "derived more than the configured limit of {limit} facts"
                            ),
                        });
                    }
                }
                delta
                    .entry(predicate.to_string())
                    .or_default()
                    .insert(tuple);
                changed = true;
            }
        }
        Ok(changed)
    }

    /// One semi-naive pass: the union of evaluations that pin the delta to
    /// each positive body position in turn.
    fn evaluate_semi_naive(
        &self,
        rule: &Rule,
        delta: &IndexMap<String, IndexSet<Tuple>>,
    ) -> IndexSet<Tuple> {
        let mut derived = IndexSet::new();
        for (position, literal) in rule.body.iter().enumerate() {
            if literal.negated {
                continue;
            }
            derived.extend(self.evaluate_rule(rule, &FactView::Delta { delta, position }));
        }
        derived
    }

    /// Joins the positive body literals left to right, then filters the
    /// accumulated bindings through the negated literals, then grounds the
    /// head. Negated predicates live in strictly earlier strata, so their
    /// extents are final by the time this runs.
    fn evaluate_rule(&self, rule: &Rule, view: &FactView<'_>) -> IndexSet<Tuple> {
        let store = self.kb.store();
        let mut bindings: Vec<Binding> = vec![Binding::new()];

        for (position, literal) in rule.body.iter().enumerate() {
            if literal.negated {
                continue;
            }
            let facts = match view {
                FactView::Full => store.facts(&literal.atom.predicate),
                FactView::Delta {
                    delta,
                    position: delta_position,
                } => {
                    if position == *delta_position {
                        delta.get(&literal.atom.predicate)
                    } else {
                        store.facts(&literal.atom.predicate)
                    }
                }
            };
            let Some(facts) = facts else {
                return IndexSet::new();
            };
            if facts.is_empty() {
                return IndexSet::new();
            }

            let mut extended = Vec::new();
            for binding in &bindings {
                for tuple in store.candidates(&literal.atom, facts, binding) {
                    if let Some(next) = match_atom(&literal.atom, tuple, binding) {
                        extended.push(next);
                    }
                }
            }
            if extended.is_empty() {
                return IndexSet::new();
            }
            bindings = extended;
        }

        bindings.retain(|binding| {
            rule.body
                .iter()
                .filter(|literal| literal.negated)
                .all(|literal| !self.holds(&literal.atom, binding))
        });

        bindings
            .into_iter()
            .filter_map(|binding| ground_head(&rule.head, &binding))
            .collect()
    }

    /// Whether the atom, grounded under the binding, is a stored fact.
    fn holds(&self, atom: &Atom, binding: &Binding) -> bool {
        let tuple: Option<Tuple> = atom
            .terms
            .iter()
            .map(|term| match term {
                Term::Constant(value) => Some(value.clone()),
                Term::Variable(name) => binding.get(name).cloned(),
            })
            .collect();
        match tuple {
            Some(tuple) => self.kb.store().contains(&atom.predicate, &tuple),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse_atom, parse_into, parse_program};
    use crate::source::{MemorySourceAdapter, SourceRegistry};

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn reasoned(text: &str) -> Reasoner {
        let kb = parse_program(text).unwrap();
        let mut reasoner = Reasoner::new(kb);
        reasoner.reason().unwrap();
        reasoner
    }

    fn sorted_facts(reasoner: &Reasoner, predicate: &str) -> Vec<Tuple> {
        let mut facts: Vec<Tuple> = reasoner
            .knowledge_base()
            .facts(predicate)
            .cloned()
            .collect();
        facts.sort();
        facts
    }

    fn named(values: &[&str]) -> Tuple {
        values
            .iter()
            .map(|value| Constant::Named((*value).to_string()))
            .collect()
    }

    #[test]
    fn test_transitive_closure() {
        init_logging();
        let reasoner = reasoned(
            "sub(a, b) . sub(b, c) . \n\
             anc(?X, ?Y) :- sub(?X, ?Y) . \n\
             anc(?X, ?Z) :- anc(?X, ?Y), sub(?Y, ?Z) . \n",
        );
        assert_eq!(
            sorted_facts(&reasoner, "anc"),
            vec![named(&["a", "b"]), named(&["a", "c"]), named(&["b", "c"])]
        );
    }

    #[test]
    fn test_longer_chain_closure() {
        let reasoner = reasoned(
            "sub(a, b) . sub(b, c) . sub(c, d) . sub(d, e) . \n\
             anc(?X, ?Y) :- sub(?X, ?Y) . \n\
             anc(?X, ?Z) :- anc(?X, ?Y), sub(?Y, ?Z) . \n",
        );
        // all ordered pairs along the chain
        assert_eq!(reasoner.fact_count("anc"), 10);
        assert!(sorted_facts(&reasoner, "anc").contains(&named(&["a", "e"])));
    }

    #[test]
    fn test_multi_literal_join() {
        let reasoner = reasoned(
            "edge(n1, n2) . edge(n2, n3) . edge(n3, n4) . \n\
             triangle(?X, ?Y, ?Z) :- edge(?X, ?Y), edge(?Y, ?Z) . \n",
        );
        assert_eq!(
            sorted_facts(&reasoner, "triangle"),
            vec![named(&["n1", "n2", "n3"]), named(&["n2", "n3", "n4"])]
        );
    }

    #[test]
    fn test_repeated_variable_requires_unification() {
        let reasoner = reasoned(
            "likes(alice, pizza) . likes(bob, bob) . \n\
             narcissist(?X) :- likes(?X, ?X) . \n",
        );
        assert_eq!(sorted_facts(&reasoner, "narcissist"), vec![named(&["bob"])]);
    }

    #[test]
    fn test_negation_as_failure() {
        let reasoner = reasoned(
            "person(a) . person(b) . hasX(a) . \n\
             noX(?Y) :- person(?Y), ~hasX(?Y) . \n",
        );
        assert_eq!(sorted_facts(&reasoner, "noX"), vec![named(&["b"])]);
    }

    #[test]
    fn test_negation_sees_derived_facts_of_earlier_strata() {
        let reasoner = reasoned(
            "edge(a, b) . edge(b, c) . node(a) . node(b) . node(c) . \n\
             reach(?X, ?Y) :- edge(?X, ?Y) . \n\
             reach(?X, ?Z) :- reach(?X, ?Y), edge(?Y, ?Z) . \n\
             unreached(?Y) :- node(?Y), ~reach(a, ?Y) . \n",
        );
        // a reaches b and c; only a itself is unreached from a
        assert_eq!(sorted_facts(&reasoner, "unreached"), vec![named(&["a"])]);
    }

    #[test]
    fn test_cyclic_negation_is_rejected() {
        let kb = parse_program(
            "q(a) . \n\
             p(?X) :- q(?X), ~r(?X) . \n\
             r(?X) :- q(?X), ~p(?X) . \n",
        )
        .unwrap();
        let mut reasoner = Reasoner::new(kb);
        assert!(matches!(
            reasoner.reason().unwrap_err(),
            Error::CyclicNegation { .. }
        ));
    }

    #[test]
    fn test_materialization_is_idempotent() {
        let kb = parse_program(
            "sub(a, b) . sub(b, c) . \n\
             anc(?X, ?Y) :- sub(?X, ?Y) . \n\
             anc(?X, ?Z) :- anc(?X, ?Y), sub(?Y, ?Z) . \n",
        )
        .unwrap();
        let mut reasoner = Reasoner::new(kb);
        reasoner.reason().unwrap();
        let before = sorted_facts(&reasoner, "anc");
        reasoner.reason().unwrap();
        assert_eq!(sorted_facts(&reasoner, "anc"), before);
    }

    #[test]
    fn test_rule_with_constant_head_and_negative_body() {
        let reasoner = reasoned(
            "q(b) . \n\
             flag(missing) :- q(b), ~q(a) . \n",
        );
        assert_eq!(sorted_facts(&reasoner, "flag"), vec![named(&["missing"])]);
    }

    #[test]
    fn test_constant_subtypes_do_not_join() {
        // the named constant 1 and the string '1' are different values
        let reasoner = reasoned(
            "a(one) . a(1) . b('1') . \n\
             both(?X) :- a(?X), b(?X) . \n",
        );
        assert_eq!(reasoner.fact_count("both"), 0);
    }

    #[test]
    fn test_fact_limit_aborts_materialization() {
        let kb = parse_program(
            "sub(a, b) . sub(b, c) . sub(c, d) . sub(d, e) . \n\
             anc(?X, ?Y) :- sub(?X, ?Y) . \n\
             anc(?X, ?Z) :- anc(?X, ?Y), sub(?Y, ?Z) . \n",
        )
        .unwrap();
        let mut reasoner = Reasoner::with_fact_limit(kb, 2);
        assert!(matches!(
            reasoner.reason().unwrap_err(),
            Error::Resource { .. }
        ));
    }

    #[test]
    fn test_query_before_materialization_is_invalid() {
        let kb = parse_program("p(a) .").unwrap();
        let reasoner = Reasoner::new(kb);
        let query = parse_atom("p(?X)").unwrap();
        assert!(matches!(
            reasoner.answer(&query, false).unwrap_err(),
            Error::InvalidState { .. }
        ));
    }

    #[test]
    fn test_ask_on_derived_facts() {
        let reasoner = reasoned(
            "sub(a, b) . sub(b, c) . \n\
             anc(?X, ?Y) :- sub(?X, ?Y) . \n\
             anc(?X, ?Z) :- anc(?X, ?Y), sub(?Y, ?Z) . \n",
        );
        assert!(reasoner.ask(&parse_atom("anc(a, c)").unwrap()).unwrap());
        assert!(!reasoner.ask(&parse_atom("anc(c, a)").unwrap()).unwrap());
    }

    #[test]
    fn test_determinism_across_builds() {
        let text = "edge(a, b) . edge(b, c) . edge(c, a) . edge(b, d) . \n\
                    path(?X, ?Y) :- edge(?X, ?Y) . \n\
                    path(?X, ?Z) :- path(?X, ?Y), edge(?Y, ?Z) . \n";
        let first = reasoned(text);
        let second = reasoned(text);
        assert_eq!(sorted_facts(&first, "path"), sorted_facts(&second, "path"));
    }

    #[test]
    fn test_multi_source_pipeline() {
        init_logging();
        let dir = tempfile::tempdir().unwrap();
        let csv_path = dir.path().join("subgenres.csv");
        std::fs::write(&csv_path, "AlternativeRock,RockMusic\nIndieRock,RockMusic\n").unwrap();
        let nt_path = dir.path().join("mapping.nt");
        std::fs::write(
            &nt_path,
            "<http://wd/Q1> <http://example.org/musicBrainzId> \"mb-radiohead\" .\n",
        )
        .unwrap();

        let mut kb = parse_program(&format!(
            "@source subgenre[2] : load-csv('{}') . \n\
             genre(Radiohead, AlternativeRock) . \n\
             genre(Boygenius, IndieRock) . \n\
             genre(?A, ?G2) :- genre(?A, ?G), subgenre(?G, ?G2) . \n",
            csv_path.display()
        ))
        .unwrap();
        parse_into(
            &mut kb,
            &format!(
                "@source homepage[2] : sparql(<http://wd/sparql>) . \n\
                 @source wdToMb[3] : load-rdf('{}') . \n\
                 musicBrainzId(Radiohead, 'mb-radiohead') . \n\
                 musicBrainzId(Boygenius, 'mb-boygenius') . \n\
                 artistWikidata(?A, ?W) :- musicBrainzId(?A, ?Id), wdToMb(?W, <http://example.org/musicBrainzId>, ?Id) . \n\
                 artistHomepage(?A, ?U) :- artistWikidata(?A, ?W), homepage(?W, ?U) . \n\
                 withHomepage(?A) :- artistHomepage(?A, ?U) . \n\
                 withoutHomepage(?A) :- musicBrainzId(?A, ?Id), ~withHomepage(?A) . \n",
                nt_path.display()
            ),
        )
        .unwrap();

        let mut registry = SourceRegistry::with_builtins();
        registry.register(
            "sparql",
            Box::new(MemorySourceAdapter::new(vec![vec![
                Constant::Iri("http://wd/Q1".to_string()),
                Constant::Iri("http://radiohead.com".to_string()),
            ]])),
        );
        kb.load_sources(&registry).unwrap();

        let mut reasoner = Reasoner::new(kb);
        reasoner.reason().unwrap();

        let rockers: Vec<Tuple> = reasoner
            .answer(&parse_atom("genre(?A, RockMusic)").unwrap(), true)
            .unwrap()
            .collect();
        assert_eq!(rockers.len(), 2);

        let homepages: Vec<Tuple> = reasoner
            .answer(&parse_atom("artistHomepage(?A, ?U)").unwrap(), true)
            .unwrap()
            .collect();
        assert_eq!(
            homepages,
            vec![vec![
                Constant::Named("Radiohead".to_string()),
                Constant::Iri("http://radiohead.com".to_string())
            ]]
        );

        let missing: Vec<Tuple> = reasoner
            .answer(&parse_atom("withoutHomepage(?A)").unwrap(), true)
            .unwrap()
            .collect();
        assert_eq!(
            missing,
            vec![vec![Constant::Named("Boygenius".to_string())]]
        );
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn closure_facts(edges: &[(u8, u8)]) -> Vec<Tuple> {
            let mut kb = parse_program(
                "path(?X, ?Y) :- edge(?X, ?Y) . \n\
                 path(?X, ?Z) :- path(?X, ?Y), edge(?Y, ?Z) . \n",
            )
            .unwrap();
            for (from, to) in edges {
                kb.add_fact(
                    "edge",
                    vec![
                        Constant::Named(format!("n{from}")),
                        Constant::Named(format!("n{to}")),
                    ],
                )
                .unwrap();
            }
            let mut reasoner = Reasoner::new(kb);
            reasoner.reason().unwrap();
            let mut facts: Vec<Tuple> = reasoner
                .knowledge_base()
                .facts("path")
                .cloned()
                .collect();
            facts.sort();
            facts
        }

        proptest! {
            #[test]
            fn prop_materialization_is_deterministic(
                edges in proptest::collection::vec((0u8..6, 0u8..6), 0..16)
            ) {
                prop_assert_eq!(closure_facts(&edges), closure_facts(&edges));
            }

            #[test]
            fn prop_rerun_adds_no_facts(
                edges in proptest::collection::vec((0u8..5, 0u8..5), 0..12)
            ) {
                let mut kb = parse_program(
                    "path(?X, ?Y) :- edge(?X, ?Y) . \n\
                     path(?X, ?Z) :- path(?X, ?Y), edge(?Y, ?Z) . \n",
                )
                .unwrap();
                for (from, to) in &edges {
                    kb.add_fact(
                        "edge",
                        vec![
                            Constant::Named(format!("n{from}")),
                            Constant::Named(format!("n{to}")),
                        ],
                    )
                    .unwrap();
                }
                let mut reasoner = Reasoner::new(kb);
                reasoner.reason().unwrap();
                let before = reasoner.fact_count("path");
                reasoner.reason().unwrap();
                prop_assert_eq!(reasoner.fact_count("path"), before);
            }
        }
    }
}
