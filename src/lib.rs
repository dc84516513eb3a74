//! # Stratalog
//!
//! A Datalog reasoner with stratified negation and external data sources.
//!
//! ## Features
//!
//! - Rule-language parsing with incremental composition
//! - Pluggable source adapters (`load-csv`, `load-rdf`, custom kinds)
//! - Semi-naive materialization over stratified rules
//! - Lazy, streaming query answers with optional duplicate elimination
//!
//! ## Example
//!
//! ```rust
//! use stratalog::{parse_atom, parse_program, Reasoner};
//!
//! let kb = parse_program(
//!     "sub(a, b) . sub(b, c) . \
//!      anc(?X, ?Y) :- sub(?X, ?Y) . \
//!      anc(?X, ?Z) :- anc(?X, ?Y), sub(?Y, ?Z) . ",
//! )
//! .unwrap();
//!
//! let mut reasoner = Reasoner::new(kb);
//! reasoner.reason().unwrap();
//!
//! let query = parse_atom("anc(a, ?Y)").unwrap();
//! let answers: Vec<_> = reasoner.answer(&query, true).unwrap().collect();
//! assert_eq!(answers.len(), 2);
//! ```

/// The reasoner and its materialization procedure.
pub mod engine;
/// Error taxonomy for the whole pipeline.
pub mod error;
/// The knowledge base: predicates, rules, sources and facts.
pub mod kb;
/// Rule-language parsing.
pub mod parser;
/// Streaming query answers.
pub mod query;
/// Source adapters and their registry.
pub mod source;
mod stratify;
/// Terms, atoms, literals and rules.
pub mod term;

pub use engine::Reasoner;
pub use error::{Error, Result};
pub use kb::KnowledgeBase;
pub use parser::{parse_atom, parse_into, parse_program};
pub use query::Answers;
pub use source::{
    CsvSourceAdapter, MemorySourceAdapter, RdfSourceAdapter, SourceAdapter, SourceDecl,
    SourceRegistry,
};
pub use term::{Atom, Constant, Literal, Rule, Term, Tuple};
