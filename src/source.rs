//! Source adapters: pluggable loaders that materialize external data into
//! fact tuples.
//!
//! A [`SourceDecl`] binds a predicate to an adapter kind plus configuration
//! arguments; the [`SourceRegistry`] dispatches on the kind string. Two kinds
//! are built in: `load-csv` for tabular files and `load-rdf` for N-Triples
//! files. Remote kinds (e.g. a `sparql` endpoint client) are registered by
//! the caller; transport is outside this crate.

use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};

use anyhow::{anyhow, Context};
use indexmap::IndexMap;
use log::debug;
use nom::branch::alt;
use nom::bytes::complete::{escaped_transform, is_not, tag, take_while1};
use nom::character::complete::{char as pchar, multispace0};
use nom::combinator::{all_consuming, map, opt, recognize, value};
use nom::sequence::{delimited, pair, tuple};
use nom::IResult;

use crate::error::{Error, Result};
use crate::term::{Constant, Tuple};

/// Binds a predicate name and arity to an adapter kind and its configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDecl {
    /// The predicate the loaded facts belong to
    pub predicate: String,
    /// The declared arity; every loaded row must match it
    pub arity: usize,
    /// The adapter kind, e.g. `load-csv`
    pub kind: String,
    /// Adapter-specific arguments (file path, endpoint, query text, …)
    pub args: Vec<Constant>,
}

/// A loader for one adapter kind.
///
/// Implementations report failures as [`anyhow::Error`]; the registry wraps
/// them with the declaration's predicate name. Transient-failure handling is
/// the adapter's concern; the engine treats any error as terminal for the
/// load attempt.
pub trait SourceAdapter: fmt::Debug {
    /// Materializes all facts for the declaration.
    ///
    /// # Errors
    ///
    /// Any adapter-specific failure (missing file, malformed row, transport
    /// failure).
    fn load(&self, decl: &SourceDecl) -> anyhow::Result<Vec<Tuple>>;
}

/// Dispatches source declarations to registered adapters by kind string.
#[derive(Debug)]
pub struct SourceRegistry {
    adapters: IndexMap<String, Box<dyn SourceAdapter>>,
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl SourceRegistry {
    /// An empty registry with no adapters at all.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            adapters: IndexMap::new(),
        }
    }

    /// A registry with the built-in `load-csv` and `load-rdf` adapters.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register("load-csv", Box::new(CsvSourceAdapter));
        registry.register("load-rdf", Box::new(RdfSourceAdapter));
        registry
    }

    /// Registers an adapter for a kind, replacing any previous one.
    pub fn register(&mut self, kind: &str, adapter: Box<dyn SourceAdapter>) {
        self.adapters.insert(kind.to_string(), adapter);
    }

    /// Loads a declaration through its adapter and validates row arity.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownSourceKind`] if no adapter matches,
    /// [`Error::Source`] for adapter failures or rows whose width differs
    /// from the declared arity.
    pub fn load(&self, decl: &SourceDecl) -> Result<Vec<Tuple>> {
        let adapter = self
            .adapters
            .get(&decl.kind)
            .ok_or_else(|| Error::UnknownSourceKind {
                kind: decl.kind.clone(),
            })?;
        let rows = adapter.load(decl).map_err(|cause| Error::Source {
            predicate: decl.predicate.clone(),
            cause,
        })?;
        for (number, row) in rows.iter().enumerate() {
            if row.len() != decl.arity {
                return Err(Error::Source {
                    predicate: decl.predicate.clone(),
                    cause: anyhow!(
                        "row {} has {} values, declared arity is {}",
                        number + 1,
                        row.len(),
                        decl.arity
                    ),
                });
            }
        }
        debug!("source '{}' produced {} rows", decl.predicate, rows.len());
        Ok(rows)
    }
}

/// The single quoted-string path argument every file-based adapter takes.
fn path_argument(decl: &SourceDecl) -> anyhow::Result<&str> {
    match decl.args.as_slice() {
        [Constant::Str(path)] => Ok(path),
        _ => Err(anyhow!(
            "{} expects a single quoted file path argument",
            decl.kind
        )),
    }
}

/// Interprets a raw field the way the rule language reads a token: integers
/// become integer constants, identifier-shaped values become named constants,
/// everything else a string. Keeps CSV data joinable with inline facts.
fn field_constant(field: &str) -> Constant {
    if let Ok(number) = field.parse::<i64>() {
        return Constant::Int(number);
    }
    let mut chars = field.chars();
    let identifier = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if identifier {
        Constant::Named(field.to_string())
    } else {
        Constant::Str(field.to_string())
    }
}

/// Built-in `load-csv` adapter: one fact per record, no header row.
#[derive(Debug, Default, Clone, Copy)]
pub struct CsvSourceAdapter;

impl SourceAdapter for CsvSourceAdapter {
    fn load(&self, decl: &SourceDecl) -> anyhow::Result<Vec<Tuple>> {
        let path = path_argument(decl)?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(path)
            .with_context(|| format!("opening '{path}'"))?;
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.with_context(|| format!("reading '{path}'"))?;
            rows.push(record.iter().map(field_constant).collect());
        }
        Ok(rows)
    }
}

/// Built-in `load-rdf` adapter: N-Triples lines become arity-3 facts.
///
/// IRIs load as IRI constants, literals as string constants (language tags
/// and datatype suffixes are dropped), blank nodes as named constants.
#[derive(Debug, Default, Clone, Copy)]
pub struct RdfSourceAdapter;

impl SourceAdapter for RdfSourceAdapter {
    fn load(&self, decl: &SourceDecl) -> anyhow::Result<Vec<Tuple>> {
        let path = path_argument(decl)?;
        let file = File::open(path).with_context(|| format!("opening '{path}'"))?;
        let mut rows = Vec::new();
        for (number, line) in BufReader::new(file).lines().enumerate() {
            let line = line.with_context(|| format!("reading '{path}'"))?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let triple = parse_triple(trimmed).ok_or_else(|| {
                anyhow!("'{path}' line {}: not an N-Triples statement", number + 1)
            })?;
            rows.push(triple);
        }
        Ok(rows)
    }
}

fn spaced<'a, O, F>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}

fn parse_triple(line: &str) -> Option<Tuple> {
    let result: IResult<&str, Tuple> = all_consuming(map(
        tuple((
            spaced(node),
            spaced(node),
            spaced(node),
            spaced(pchar('.')),
        )),
        |(subject, predicate, object, _)| vec![subject, predicate, object],
    ))(line);
    result.ok().map(|(_, triple)| triple)
}

fn node(input: &str) -> IResult<&str, Constant> {
    alt((
        map(delimited(pchar('<'), is_not(">"), pchar('>')), |iri: &str| {
            Constant::Iri(iri.to_string())
        }),
        map(
            pair(literal_text, opt(literal_suffix)),
            |(text, _suffix)| Constant::Str(text),
        ),
        map(
            recognize(pair(
                tag("_:"),
                take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_'),
            )),
            |label: &str| Constant::Named(label.to_string()),
        ),
    ))(input)
}

fn literal_text(input: &str) -> IResult<&str, String> {
    let escaped = escaped_transform(
        is_not("\\\""),
        '\\',
        alt((
            map(tag("\\"), |_| "\\"),
            map(tag("\""), |_| "\""),
            map(tag("n"), |_| "\n"),
            map(tag("t"), |_| "\t"),
            map(tag("r"), |_| "\r"),
        )),
    );
    alt((
        map(tag("\"\""), |_| String::new()),
        delimited(pchar('"'), escaped, pchar('"')),
    ))(input)
}

fn literal_suffix(input: &str) -> IResult<&str, ()> {
    alt((
        value(
            (),
            pair(
                pchar('@'),
                take_while1(|c: char| c.is_ascii_alphanumeric() || c == '-'),
            ),
        ),
        value(
            (),
            tuple((tag("^^"), pchar('<'), is_not(">"), pchar('>'))),
        ),
    ))(input)
}

/// Serves a fixed set of tuples.
///
/// Useful in tests, and as a stand-in for remote query endpoints when the
/// caller has already fetched the data.
#[derive(Debug, Default, Clone)]
pub struct MemorySourceAdapter {
    rows: Vec<Tuple>,
}

impl MemorySourceAdapter {
    /// Wraps pre-materialized rows.
    #[must_use]
    pub fn new(rows: Vec<Tuple>) -> Self {
        Self { rows }
    }
}

impl SourceAdapter for MemorySourceAdapter {
    fn load(&self, _decl: &SourceDecl) -> anyhow::Result<Vec<Tuple>> {
        Ok(self.rows.clone())
    }
}
