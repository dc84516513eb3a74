use thiserror::Error;

/// Convenience alias for fallible operations in this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// All failures surfaced by the parse / load / stratify / materialize / query
/// pipeline.
///
/// Every build-phase error aborts knowledge-base construction; no partially
/// built base remains usable. Nothing is retried internally.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed rule text.
    #[error("parse error at line {line}: {message}")]
    Parse {
        /// 1-based line of the offending statement
        line: usize,
        /// What went wrong
        message: String,
    },

    /// A head variable, or a variable of a negated literal, does not occur in
    /// any positive body literal.
    #[error("unsafe rule '{rule}': variable ?{variable} does not occur in a positive body literal")]
    UnsafeRule {
        /// The rejected rule, rendered
        rule: String,
        /// The offending variable name
        variable: String,
    },

    /// A predicate is declared both extensional (via a source) and
    /// intensional (as a rule head).
    #[error("predicate '{predicate}' is declared both as a source and as a rule head")]
    RoleConflict {
        /// The conflicted predicate name
        predicate: String,
    },

    /// A predicate was used with two different arities.
    #[error("predicate '{predicate}' used with arity {found}, but declared with arity {expected}")]
    ArityConflict {
        /// The predicate name
        predicate: String,
        /// The arity fixed at first sight
        expected: usize,
        /// The conflicting arity
        found: usize,
    },

    /// A source adapter failed to materialize its facts.
    #[error("source for predicate '{predicate}' failed to load")]
    Source {
        /// The predicate whose declaration failed
        predicate: String,
        /// The adapter-specific cause
        #[source]
        cause: anyhow::Error,
    },

    /// A source declaration names an adapter kind nobody registered.
    #[error("no source adapter registered for kind '{kind}'")]
    UnknownSourceKind {
        /// The unresolved kind string
        kind: String,
    },

    /// The program has a dependency cycle through negation and admits no
    /// stratification.
    #[error("negation cycle through {cycle}; the program cannot be stratified")]
    CyclicNegation {
        /// A predicate cycle containing a negative edge, rendered
        cycle: String,
    },

    /// An operation was attempted out of lifecycle order.
    #[error("cannot {operation}: knowledge base is {state}")]
    InvalidState {
        /// What was attempted
        operation: &'static str,
        /// The lifecycle state that forbids it
        state: &'static str,
    },

    /// Fatal resource exhaustion during materialization.
    #[error("resource limit exceeded during materialization: {message}")]
    Resource {
        /// What was exhausted
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_error_preserves_cause() {
        let error = Error::Source {
            predicate: "subgenre".to_string(),
            cause: anyhow::anyhow!("file not found"),
        };
        assert!(error.to_string().contains("subgenre"));
        let source = std::error::Error::source(&error).expect("cause chained");
        assert!(source.to_string().contains("file not found"));
    }

    #[test]
    fn test_parse_error_reports_line() {
        let error = Error::Parse {
            line: 7,
            message: "expected '.'".to_string(),
        };
        assert_eq!(error.to_string(), "parse error at line 7: expected '.'");
    }
}
