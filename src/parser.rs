//! Parser for the rule language.
//!
//! A program is a sequence of `.`-terminated statements:
//!
//! - source declarations: `@source subgenre[2] : load-csv('resources/music-subgenres.csv') .`
//! - facts: `genre(Radiohead, AlternativeRock) .`
//! - rules: `genre(?A, ?G2) :- genre(?A, ?G), subgenre(?G, ?G2) .`
//!
//! Body literals may be negated with a leading `~`. Variables are written
//! `?Name`; constants are bare names, `'quoted strings'`, `<bracketed IRIs>`
//! or signed integers. `%` starts a comment that runs to the end of the line.

use nom::branch::alt;
use nom::bytes::complete::{escaped_transform, is_not, tag, take_while, take_while1};
use nom::character::complete::{char as pchar, digit1, multispace0};
use nom::combinator::{all_consuming, map, map_res, opt, recognize};
use nom::multi::{separated_list0, separated_list1};
use nom::sequence::{delimited, pair, preceded, tuple};
use nom::IResult;

use crate::error::{Error, Result};
use crate::kb::KnowledgeBase;
use crate::source::SourceDecl;
use crate::term::{Atom, Constant, Literal, Rule, Term};

/// Parses a complete program into a fresh knowledge base.
///
/// # Errors
///
/// Returns [`Error::Parse`] for malformed text, or any error raised while the
/// parsed statements are added to the base (unsafe rules, role conflicts,
/// arity conflicts).
pub fn parse_program(text: &str) -> Result<KnowledgeBase> {
    let mut kb = KnowledgeBase::new();
    parse_into(&mut kb, text)?;
    Ok(kb)
}

/// Parses an additional program fragment into an existing base.
///
/// Rules and source declarations accumulate across fragments. On error the
/// base may hold a prefix of the fragment; per the build contract the caller
/// must discard it and restart.
///
/// # Errors
///
/// Same as [`parse_program`].
pub fn parse_into(kb: &mut KnowledgeBase, text: &str) -> Result<()> {
    for statement in split_statements(text)? {
        match parse_statement(&statement.text, statement.line)? {
            Statement::Source(decl) => kb.declare_source(decl)?,
            Statement::Rule(rule) => kb.add_rule(rule)?,
            Statement::Fact(atom) => {
                let tuple = atom.to_tuple().ok_or_else(|| Error::Parse {
                    line: statement.line,
                    message: format!("fact '{atom}' must not contain variables"),
                })?;
                kb.add_fact(&atom.predicate, tuple)?;
            }
        }
    }
    Ok(())
}

/// Parses a single atom pattern, e.g. `genre(?Artist, RockMusic)`.
///
/// This is the entry point for query patterns; it needs no program context
/// and no trailing `.`.
///
/// # Errors
///
/// Returns [`Error::Parse`] if the text is not exactly one atom.
pub fn parse_atom(text: &str) -> Result<Atom> {
    match all_consuming(ws(atom))(text) {
        Ok((_, atom)) => Ok(atom),
        Err(error) => Err(Error::Parse {
            line: 1,
            message: describe(text, &error),
        }),
    }
}

/// One parsed statement of a program.
#[derive(Debug)]
enum Statement {
    Source(SourceDecl),
    Rule(Rule),
    Fact(Atom),
}

/// A raw statement: its text (terminator stripped, comments removed) and its
/// starting line.
#[derive(Debug)]
struct RawStatement {
    line: usize,
    text: String,
}

/// Splits program text into `.`-terminated statements, tracking line numbers.
///
/// The terminator search must respect quoted strings, IRIs and comments: a
/// `.` inside `'resources/music-subgenres.csv'` or `<http://example.org>` is
/// content, not punctuation. Comment text is dropped even mid-statement.
fn split_statements(text: &str) -> Result<Vec<RawStatement>> {
    #[derive(PartialEq)]
    enum Mode {
        Normal,
        Comment,
        Quote,
        QuoteEscape,
        Iri,
    }

    let mut statements = Vec::new();
    let mut mode = Mode::Normal;
    let mut line = 1usize;
    let mut buffer = String::new();
    let mut started = false;
    let mut statement_line = 1usize;

    for ch in text.chars() {
        if ch == '\n' {
            line += 1;
        }
        match mode {
            Mode::Comment => {
                if ch == '\n' {
                    mode = Mode::Normal;
                }
            }
            Mode::Quote => {
                buffer.push(ch);
                if ch == '\\' {
                    mode = Mode::QuoteEscape;
                } else if ch == '\'' {
                    mode = Mode::Normal;
                }
            }
            Mode::QuoteEscape => {
                buffer.push(ch);
                mode = Mode::Quote;
            }
            Mode::Iri => {
                buffer.push(ch);
                if ch == '>' {
                    mode = Mode::Normal;
                }
            }
            Mode::Normal => match ch {
                '%' => mode = Mode::Comment,
                '.' => {
                    if started {
                        statements.push(RawStatement {
                            line: statement_line,
                            text: std::mem::take(&mut buffer),
                        });
                        started = false;
                    } else {
                        return Err(Error::Parse {
                            line,
                            message: "statement terminator '.' with no statement".to_string(),
                        });
                    }
                }
                c if c.is_whitespace() => {
                    if started {
                        buffer.push(c);
                    }
                }
                c => {
                    if !started {
                        started = true;
                        statement_line = line;
                        buffer.clear();
                    }
                    buffer.push(c);
                    if c == '\'' {
                        mode = Mode::Quote;
                    } else if c == '<' {
                        mode = Mode::Iri;
                    }
                }
            },
        }
    }

    match mode {
        Mode::Quote | Mode::QuoteEscape => {
            return Err(Error::Parse {
                line,
                message: "unterminated string constant".to_string(),
            })
        }
        Mode::Iri => {
            return Err(Error::Parse {
                line,
                message: "unterminated IRI constant".to_string(),
            })
        }
        Mode::Normal | Mode::Comment => {}
    }
    if started {
        return Err(Error::Parse {
            line: statement_line,
            message: "missing '.' statement terminator".to_string(),
        });
    }
    Ok(statements)
}

fn parse_statement(text: &str, line: usize) -> Result<Statement> {
    let parser = alt((
        map(source_decl, Statement::Source),
        map(rule, Statement::Rule),
        map(atom, Statement::Fact),
    ));
    match all_consuming(ws(parser))(text) {
        Ok((_, statement)) => Ok(statement),
        Err(error) => Err(Error::Parse {
            line,
            message: describe(text, &error),
        }),
    }
}

fn describe(text: &str, error: &nom::Err<nom::error::Error<&str>>) -> String {
    match error {
        nom::Err::Error(inner) | nom::Err::Failure(inner) => {
            let rest = inner.input.trim();
            if rest.is_empty() {
                format!("unexpected end of statement in '{}'", text.trim())
            } else {
                let snippet: String = rest.chars().take(24).collect();
                format!("unexpected input near '{snippet}'")
            }
        }
        nom::Err::Incomplete(_) => "incomplete statement".to_string(),
    }
}

fn ws<'a, O, F>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn identifier(input: &str) -> IResult<&str, String> {
    map(
        recognize(pair(
            take_while1(is_ident_start),
            take_while(is_ident_continue),
        )),
        str::to_string,
    )(input)
}

/// Adapter kind names additionally allow `-`, as in `load-csv`.
fn kind_name(input: &str) -> IResult<&str, String> {
    map(
        recognize(pair(
            take_while1(is_ident_start),
            take_while(|c: char| is_ident_continue(c) || c == '-'),
        )),
        str::to_string,
    )(input)
}

fn quoted_text(input: &str) -> IResult<&str, String> {
    let escaped = escaped_transform(
        is_not("\\'"),
        '\\',
        alt((
            map(tag("\\"), |_| "\\"),
            map(tag("'"), |_| "'"),
            map(tag("n"), |_| "\n"),
            map(tag("t"), |_| "\t"),
        )),
    );
    alt((
        map(tag("''"), |_| String::new()),
        delimited(pchar('\''), escaped, pchar('\'')),
    ))(input)
}

fn iri_text(input: &str) -> IResult<&str, String> {
    map(delimited(pchar('<'), is_not(">"), pchar('>')), |iri: &str| {
        iri.to_string()
    })(input)
}

fn integer(input: &str) -> IResult<&str, i64> {
    map_res(recognize(pair(opt(pchar('-')), digit1)), str::parse)(input)
}

fn constant(input: &str) -> IResult<&str, Constant> {
    alt((
        map(integer, Constant::Int),
        map(quoted_text, Constant::Str),
        map(iri_text, Constant::Iri),
        map(identifier, Constant::Named),
    ))(input)
}

fn term(input: &str) -> IResult<&str, Term> {
    alt((
        map(preceded(pchar('?'), identifier), Term::Variable),
        map(constant, Term::Constant),
    ))(input)
}

fn atom(input: &str) -> IResult<&str, Atom> {
    map(
        pair(
            ws(identifier),
            delimited(
                pchar('('),
                separated_list1(pchar(','), ws(term)),
                pchar(')'),
            ),
        ),
        |(predicate, terms)| Atom { predicate, terms },
    )(input)
}

fn literal(input: &str) -> IResult<&str, Literal> {
    map(pair(opt(ws(pchar('~'))), atom), |(negation, atom)| Literal {
        atom,
        negated: negation.is_some(),
    })(input)
}

fn rule(input: &str) -> IResult<&str, Rule> {
    map(
        tuple((
            atom,
            ws(tag(":-")),
            separated_list1(ws(pchar(',')), literal),
        )),
        |(head, _, body)| Rule { head, body },
    )(input)
}

fn arity(input: &str) -> IResult<&str, usize> {
    map_res(digit1, str::parse)(input)
}

fn source_decl(input: &str) -> IResult<&str, SourceDecl> {
    map(
        tuple((
            ws(tag("@source")),
            ws(identifier),
            delimited(ws(pchar('[')), arity, ws(pchar(']'))),
            ws(pchar(':')),
            ws(kind_name),
            delimited(
                pchar('('),
                separated_list0(pchar(','), ws(constant)),
                pchar(')'),
            ),
        )),
        |(_, predicate, arity, _, kind, args)| SourceDecl {
            predicate,
            arity,
            kind,
            args,
        },
    )(input)
}
