//! The knowledge base: predicates, rules, source declarations and facts.
//!
//! A base moves through three lifecycle phases. While *open* it accepts
//! rules, facts and source declarations and can load its sources. After
//! [`KnowledgeBase::stratify`] it is frozen; the reasoner then materializes
//! all consequences into it, after which it is an immutable read view for
//! queries.

use indexmap::{IndexMap, IndexSet};
use log::{debug, info};

use crate::error::{Error, Result};
use crate::source::{SourceDecl, SourceRegistry};
use crate::stratify;
use crate::term::{Atom, Constant, Rule, Term, Tuple};

/// Lifecycle phase of a [`KnowledgeBase`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum State {
    Open,
    Stratified,
    Materialized,
}

impl State {
    pub(crate) fn name(self) -> &'static str {
        match self {
            State::Open => "open",
            State::Stratified => "stratified",
            State::Materialized => "materialized",
        }
    }
}

/// Per-predicate metadata. Arity is fixed at first sight.
#[derive(Debug, Clone)]
struct PredicateInfo {
    arity: usize,
    has_source: bool,
    is_rule_head: bool,
    stratum: usize,
}

/// Index for fast fact lookup by argument position and value.
///
/// For `edge(a,b), edge(a,c), edge(b,c)`:
/// - position 0 maps `a -> {(a,b), (a,c)}`, `b -> {(b,c)}`
/// - position 1 maps `b -> {(a,b)}`, `c -> {(a,c), (b,c)}`
#[derive(Debug, Clone)]
struct PredicateIndex {
    by_position: Vec<IndexMap<Constant, IndexSet<Tuple>>>,
}

impl PredicateIndex {
    fn new(arity: usize) -> Self {
        Self {
            by_position: (0..arity).map(|_| IndexMap::new()).collect(),
        }
    }

    fn add_tuple(&mut self, tuple: &[Constant]) {
        for (position, value) in tuple.iter().enumerate() {
            if position < self.by_position.len() {
                self.by_position[position]
                    .entry(value.clone())
                    .or_default()
                    .insert(tuple.to_vec());
            }
        }
    }

    fn tuples_with(&self, position: usize, value: &Constant) -> Option<&IndexSet<Tuple>> {
        self.by_position
            .get(position)
            .and_then(|position_map| position_map.get(value))
    }
}

/// Deduplicated fact storage, partitioned by predicate, with per-position
/// indexes. Insertion is idempotent: a tuple equal to a stored one is a no-op.
#[derive(Debug, Clone, Default)]
pub(crate) struct FactStore {
    facts_by_pred: IndexMap<String, IndexSet<Tuple>>,
    indexes_by_pred: IndexMap<String, PredicateIndex>,
}

impl FactStore {
    /// Returns true if the tuple was new.
    pub(crate) fn insert(&mut self, predicate: &str, tuple: Tuple) -> bool {
        let facts = self.facts_by_pred.entry(predicate.to_string()).or_default();
        if facts.insert(tuple.clone()) {
            self.indexes_by_pred
                .entry(predicate.to_string())
                .or_insert_with(|| PredicateIndex::new(tuple.len()))
                .add_tuple(&tuple);
            true
        } else {
            false
        }
    }

    pub(crate) fn facts(&self, predicate: &str) -> Option<&IndexSet<Tuple>> {
        self.facts_by_pred.get(predicate)
    }

    pub(crate) fn contains(&self, predicate: &str, tuple: &Tuple) -> bool {
        self.facts_by_pred
            .get(predicate)
            .is_some_and(|facts| facts.contains(tuple))
    }

    /// Narrows `facts` to tuples that can still match `atom` under `binding`,
    /// using the most selective position index available.
    ///
    /// Every atom position holding a constant or an already-bound variable is
    /// an index candidate; the smallest result set wins. A bound value absent
    /// from the index matches nothing. With no usable index position the full
    /// set is returned and matching falls to the caller.
    pub(crate) fn candidates<'a>(
        &'a self,
        atom: &Atom,
        facts: &'a IndexSet<Tuple>,
        binding: &IndexMap<String, Constant>,
    ) -> Vec<&'a Tuple> {
        let Some(index) = self.indexes_by_pred.get(&atom.predicate) else {
            return facts.iter().collect();
        };

        let mut options: smallvec::SmallVec<[(usize, &IndexSet<Tuple>); 4]> =
            smallvec::SmallVec::new();
        for (position, term) in atom.terms.iter().enumerate() {
            let value = match term {
                Term::Constant(value) => Some(value),
                Term::Variable(name) => binding.get(name),
            };
            if let Some(value) = value {
                match index.tuples_with(position, value) {
                    Some(indexed) => options.push((indexed.len(), indexed)),
                    None => return Vec::new(),
                }
            }
        }

        match options.into_iter().min_by_key(|(size, _)| *size) {
            Some((_, selected)) => selected
                .iter()
                .filter(|tuple| facts.contains(*tuple))
                .collect(),
            None => facts.iter().collect(),
        }
    }
}

/// The mutable container of declared predicates, rules and facts.
///
/// Owns all predicate metadata and the pool of interned constants (the
/// Herbrand universe of the loaded program). The reasoner and the answer
/// iterators only ever borrow read views of it.
#[derive(Debug)]
pub struct KnowledgeBase {
    predicates: IndexMap<String, PredicateInfo>,
    rules: Vec<Rule>,
    sources: Vec<SourceDecl>,
    constants: IndexSet<Constant>,
    store: FactStore,
    strata: Vec<Vec<usize>>,
    state: State,
}

impl Default for KnowledgeBase {
    fn default() -> Self {
        Self::new()
    }
}

impl KnowledgeBase {
    /// Creates an empty, open base.
    #[must_use]
    pub fn new() -> Self {
        Self {
            predicates: IndexMap::new(),
            rules: Vec::new(),
            sources: Vec::new(),
            constants: IndexSet::new(),
            store: FactStore::default(),
            strata: Vec::new(),
            state: State::Open,
        }
    }

    fn ensure_open(&self, operation: &'static str) -> Result<()> {
        if self.state == State::Open {
            Ok(())
        } else {
            Err(Error::InvalidState {
                operation,
                state: self.state.name(),
            })
        }
    }

    /// Registers a predicate at the given arity, or checks it against the
    /// arity fixed earlier.
    fn touch_predicate(&mut self, name: &str, arity: usize) -> Result<()> {
        match self.predicates.get(name) {
            Some(info) if info.arity != arity => Err(Error::ArityConflict {
                predicate: name.to_string(),
                expected: info.arity,
                found: arity,
            }),
            Some(_) => Ok(()),
            None => {
                self.predicates.insert(
                    name.to_string(),
                    PredicateInfo {
                        arity,
                        has_source: false,
                        is_rule_head: false,
                        stratum: 0,
                    },
                );
                Ok(())
            }
        }
    }

    fn intern(&mut self, value: &Constant) {
        if !self.constants.contains(value) {
            self.constants.insert(value.clone());
        }
    }

    /// Declares a predicate at a fixed arity without giving it facts, rules
    /// or a source.
    ///
    /// Predicates are also registered implicitly at first use; this exists
    /// for callers that want the arity pinned up front.
    ///
    /// # Errors
    ///
    /// [`Error::ArityConflict`] if the predicate was already seen at a
    /// different arity, or [`Error::InvalidState`] once the base is
    /// stratified.
    pub fn declare_predicate(&mut self, name: &str, arity: usize) -> Result<()> {
        self.ensure_open("declare a predicate")?;
        self.touch_predicate(name, arity)
    }

    /// Declares an external source for a predicate.
    ///
    /// # Errors
    ///
    /// [`Error::RoleConflict`] if the predicate is already a rule head,
    /// [`Error::ArityConflict`] on an arity mismatch, or
    /// [`Error::InvalidState`] once the base is stratified.
    pub fn declare_source(&mut self, decl: SourceDecl) -> Result<()> {
        self.ensure_open("declare a source")?;
        self.touch_predicate(&decl.predicate, decl.arity)?;
        if let Some(info) = self.predicates.get_mut(&decl.predicate) {
            if info.is_rule_head {
                return Err(Error::RoleConflict {
                    predicate: decl.predicate,
                });
            }
            info.has_source = true;
        }
        self.sources.push(decl);
        Ok(())
    }

    /// Adds a rule.
    ///
    /// # Errors
    ///
    /// [`Error::UnsafeRule`] if a head variable or a negated-literal variable
    /// does not occur in a positive body literal, [`Error::RoleConflict`] if
    /// the head predicate is source-declared, [`Error::ArityConflict`] on an
    /// arity mismatch, or [`Error::InvalidState`] once stratified.
    pub fn add_rule(&mut self, rule: Rule) -> Result<()> {
        self.ensure_open("add a rule")?;
        check_safety(&rule)?;
        self.touch_predicate(&rule.head.predicate, rule.head.terms.len())?;
        for literal in &rule.body {
            self.touch_predicate(&literal.atom.predicate, literal.atom.terms.len())?;
        }
        if let Some(info) = self.predicates.get_mut(&rule.head.predicate) {
            if info.has_source {
                return Err(Error::RoleConflict {
                    predicate: rule.head.predicate.clone(),
                });
            }
            info.is_rule_head = true;
        }
        let constants: Vec<Constant> = rule
            .head
            .terms
            .iter()
            .chain(rule.body.iter().flat_map(|literal| literal.atom.terms.iter()))
            .filter_map(|term| term.as_constant().cloned())
            .collect();
        for value in &constants {
            self.intern(value);
        }
        self.rules.push(rule);
        Ok(())
    }

    /// Adds a ground fact. Returns true if the tuple was new.
    ///
    /// # Errors
    ///
    /// [`Error::ArityConflict`] on an arity mismatch, or
    /// [`Error::InvalidState`] once the base is stratified.
    pub fn add_fact(&mut self, predicate: &str, tuple: Tuple) -> Result<bool> {
        self.ensure_open("add a fact")?;
        self.touch_predicate(predicate, tuple.len())?;
        for value in &tuple {
            self.intern(value);
        }
        Ok(self.store.insert(predicate, tuple))
    }

    /// Loads every declared source through the registry and merges the
    /// resulting facts in.
    ///
    /// All declarations are loaded before any batch is committed: a failing
    /// source leaves the stored fact set untouched.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownSourceKind`] or [`Error::Source`] from the registry,
    /// or [`Error::InvalidState`] once the base is stratified.
    pub fn load_sources(&mut self, registry: &SourceRegistry) -> Result<()> {
        self.ensure_open("load sources")?;
        let mut batches = Vec::with_capacity(self.sources.len());
        for decl in &self.sources {
            let rows = registry.load(decl)?;
            debug!(
                "loaded {} facts for '{}' via {}",
                rows.len(),
                decl.predicate,
                decl.kind
            );
            batches.push((decl.predicate.clone(), rows));
        }
        for (predicate, rows) in batches {
            for tuple in rows {
                for value in &tuple {
                    self.intern(value);
                }
                self.store.insert(&predicate, tuple);
            }
        }
        Ok(())
    }

    /// Computes the predicate dependency graph and assigns strata, then
    /// freezes the base against further additions.
    ///
    /// # Errors
    ///
    /// [`Error::CyclicNegation`] if a dependency cycle contains a negative
    /// edge, or [`Error::InvalidState`] if called twice.
    pub fn stratify(&mut self) -> Result<()> {
        self.ensure_open("stratify")?;
        let outcome = stratify::analyze(&self.rules, self.predicates.keys().map(String::as_str))?;
        for (name, stratum) in &outcome.predicate_strata {
            if let Some(info) = self.predicates.get_mut(name) {
                info.stratum = *stratum;
            }
        }
        info!(
            "stratified {} predicates into {} strata",
            self.predicates.len(),
            outcome.rule_strata.len()
        );
        self.strata = outcome.rule_strata;
        self.state = State::Stratified;
        Ok(())
    }

    /// Number of stored facts for a predicate (zero if unknown).
    #[must_use]
    pub fn fact_count(&self, predicate: &str) -> usize {
        self.store.facts(predicate).map_or(0, IndexSet::len)
    }

    /// Iterates over the stored facts of a predicate.
    pub fn facts<'a>(&'a self, predicate: &str) -> impl Iterator<Item = &'a Tuple> + 'a {
        self.store.facts(predicate).into_iter().flatten()
    }

    /// Iterates over all declared predicate names.
    pub fn predicates(&self) -> impl Iterator<Item = &str> {
        self.predicates.keys().map(String::as_str)
    }

    /// The arity fixed for a predicate, if it is known.
    #[must_use]
    pub fn arity(&self, predicate: &str) -> Option<usize> {
        self.predicates.get(predicate).map(|info| info.arity)
    }

    /// The stratum assigned to a predicate. Meaningful after stratification.
    #[must_use]
    pub fn stratum_of(&self, predicate: &str) -> Option<usize> {
        self.predicates.get(predicate).map(|info| info.stratum)
    }

    /// All rules, in addition order.
    #[must_use]
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// All source declarations, in addition order.
    #[must_use]
    pub fn sources(&self) -> &[SourceDecl] {
        &self.sources
    }

    /// Size of the Herbrand universe: distinct constants seen so far.
    #[must_use]
    pub fn universe_size(&self) -> usize {
        self.constants.len()
    }

    pub(crate) fn state(&self) -> State {
        self.state
    }

    pub(crate) fn strata(&self) -> &[Vec<usize>] {
        &self.strata
    }

    pub(crate) fn store(&self) -> &FactStore {
        &self.store
    }

    /// Inserts a derived fact during materialization, bypassing the
    /// lifecycle gate. Arity is guaranteed by rule head validation.
    pub(crate) fn insert_derived(&mut self, predicate: &str, tuple: Tuple) -> bool {
        self.store.insert(predicate, tuple)
    }

    pub(crate) fn mark_materialized(&mut self) {
        self.state = State::Materialized;
    }
}

/// Rejects rules whose head variables, or negated-literal variables, do not
/// occur in any positive body literal. Unsafe rules would have infinite
/// groundings.
fn check_safety(rule: &Rule) -> Result<()> {
    let positive_vars: IndexSet<&str> = rule
        .body
        .iter()
        .filter(|literal| !literal.negated)
        .flat_map(|literal| literal.atom.variables())
        .collect();

    for variable in rule.head.variables() {
        if !positive_vars.contains(variable) {
            return Err(Error::UnsafeRule {
                rule: rule.to_string(),
                variable: variable.to_string(),
            });
        }
    }
    for literal in rule.body.iter().filter(|literal| literal.negated) {
        for variable in literal.atom.variables() {
            if !positive_vars.contains(variable) {
                return Err(Error::UnsafeRule {
                    rule: rule.to_string(),
                    variable: variable.to_string(),
                });
            }
        }
    }
    Ok(())
}
