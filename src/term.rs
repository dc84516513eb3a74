use std::fmt;

/// A ground value appearing in facts, rules and queries.
///
/// Subtypes never compare equal across tags: the integer `1`, the name `1`
/// and the string `'1'` are three distinct values. There is no coercion.
#[derive(Debug, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Constant {
    /// A bare named constant (e.g. `Radiohead`)
    Named(String),
    /// A quoted string literal (e.g. `'a74b1b7f-71a5'`)
    Str(String),
    /// A bracketed IRI (e.g. `<http://example.org/musicBrainzId>`)
    Iri(String),
    /// A signed integer literal
    Int(i64),
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Named(name) => write!(f, "{name}"),
            Constant::Str(text) => {
                write!(f, "'{}'", text.replace('\\', "\\\\").replace('\'', "\\'"))
            }
            Constant::Iri(iri) => write!(f, "<{iri}>"),
            Constant::Int(value) => write!(f, "{value}"),
        }
    }
}

/// The stored form of a fact: one constant per predicate position.
pub type Tuple = Vec<Constant>;

/// A term of an atom: either a variable or a constant.
///
/// Variables are scoped to a single rule or query; constants are global.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Term {
    /// A variable that unifies with constants (written `?Name`)
    Variable(String),
    /// A concrete value
    Constant(Constant),
}

impl Term {
    /// Shorthand for a variable term.
    #[must_use]
    pub fn var(name: &str) -> Self {
        Term::Variable(name.to_string())
    }

    /// Shorthand for a named-constant term.
    #[must_use]
    pub fn named(name: &str) -> Self {
        Term::Constant(Constant::Named(name.to_string()))
    }

    /// Shorthand for a string-constant term.
    #[must_use]
    pub fn string(text: &str) -> Self {
        Term::Constant(Constant::Str(text.to_string()))
    }

    /// Shorthand for an IRI-constant term.
    #[must_use]
    pub fn iri(iri: &str) -> Self {
        Term::Constant(Constant::Iri(iri.to_string()))
    }

    /// Shorthand for an integer-constant term.
    #[must_use]
    pub fn int(value: i64) -> Self {
        Term::Constant(Constant::Int(value))
    }

    /// Returns the variable name if this term is a variable.
    #[must_use]
    pub fn as_variable(&self) -> Option<&str> {
        match self {
            Term::Variable(name) => Some(name),
            Term::Constant(_) => None,
        }
    }

    /// Returns the constant if this term is ground.
    #[must_use]
    pub fn as_constant(&self) -> Option<&Constant> {
        match self {
            Term::Variable(_) => None,
            Term::Constant(value) => Some(value),
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Variable(name) => write!(f, "?{name}"),
            Term::Constant(value) => write!(f, "{value}"),
        }
    }
}

/// A predicate applied to an ordered sequence of terms (e.g. `genre(?A, ?G)`).
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Atom {
    /// The predicate name
    pub predicate: String,
    /// The arguments; arity is fixed per predicate
    pub terms: Vec<Term>,
}

impl Atom {
    /// Builds an atom from a predicate name and terms.
    #[must_use]
    pub fn new(predicate: &str, terms: Vec<Term>) -> Self {
        Atom {
            predicate: predicate.to_string(),
            terms,
        }
    }

    /// Iterates over the variable names of this atom, in position order.
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.terms.iter().filter_map(Term::as_variable)
    }

    /// Converts an all-constant atom into its stored tuple.
    ///
    /// Returns `None` if any term is a variable.
    #[must_use]
    pub fn to_tuple(&self) -> Option<Tuple> {
        self.terms
            .iter()
            .map(|term| term.as_constant().cloned())
            .collect()
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.predicate)?;
        for (position, term) in self.terms.iter().enumerate() {
            if position > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{term}")?;
        }
        write!(f, ")")
    }
}

/// A body atom, optionally negated (written with a leading `~`).
///
/// Negated literals may appear only in rule bodies.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Literal {
    /// The underlying atom
    pub atom: Atom,
    /// Whether the literal is negated
    pub negated: bool,
}

impl Literal {
    /// A positive body literal.
    #[must_use]
    pub fn positive(atom: Atom) -> Self {
        Literal {
            atom,
            negated: false,
        }
    }

    /// A negated body literal.
    #[must_use]
    pub fn negative(atom: Atom) -> Self {
        Literal {
            atom,
            negated: true,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            write!(f, "~")?;
        }
        write!(f, "{}", self.atom)
    }
}

/// A rule: one head atom derived from a conjunction of body literals.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Rule {
    /// The conclusion of the rule
    pub head: Atom,
    /// The conditions that must all hold
    pub body: Vec<Literal>,
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} :- ", self.head)?;
        for (position, literal) in self.body.iter().enumerate() {
            if position > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{literal}")?;
        }
        write!(f, " .")
    }
}
