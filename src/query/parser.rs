//! Glob pattern parser using nom.
//!
//! Grammar:
//!
//! ```text
//! pattern   = segment ("." segment)*
//! segment   = atom+
//! atom      = "*" | "?" | "<" char "-" char ">" | "{" alt ("," alt)* "}"
//!           | "\" char | literal
//! ```
//!
//! A `.` always separates segments: it cannot appear inside `{}` or `<>`
//! and cannot be escaped. A backslash makes any other character literal.

use super::ast::{Atom, Query};
use crate::core::{QuarryError, Result};
use nom::{
    branch::alt,
    bytes::complete::take_while1,
    character::complete::{anychar, char},
    combinator::{all_consuming, map, value as nom_value, verify},
    multi::{many1, separated_list1},
    sequence::{delimited, preceded, separated_pair},
    IResult,
};
use regex::Regex;

/// Characters with a meaning outside of braces and ranges.
fn is_meta(c: char) -> bool {
    matches!(c, '*' | '?' | '<' | '>' | '{' | '}' | '\\' | '.')
}

/// Compile a glob pattern.
pub fn parse_glob(pattern: &str) -> Result<Query> {
    if pattern.is_empty() {
        return Err(QuarryError::pattern(pattern, "empty pattern"));
    }

    match all_consuming(segments)(pattern) {
        Ok((_, segments)) => {
            let segments: Vec<Vec<Atom>> = segments.into_iter().map(merge_literals).collect();
            let regex = compile(&segments)
                .map_err(|e| QuarryError::pattern(pattern, e.to_string()))?;
            Ok(Query {
                pattern: pattern.to_string(),
                segments,
                regex,
            })
        },
        Err(nom::Err::Error(e) | nom::Err::Failure(e)) => {
            let offset = pattern.len() - e.input.len();
            Err(QuarryError::pattern(
                pattern,
                format!("unexpected input at offset {}", offset),
            ))
        },
        Err(nom::Err::Incomplete(_)) => Err(QuarryError::pattern(pattern, "incomplete pattern")),
    }
}

fn segments(input: &str) -> IResult<&str, Vec<Vec<Atom>>> {
    separated_list1(char('.'), many1(atom))(input)
}

fn atom(input: &str) -> IResult<&str, Atom> {
    alt((
        nom_value(Atom::AnySegment, char('*')),
        nom_value(Atom::AnyChar, char('?')),
        range,
        alternation,
        escaped,
        literal,
    ))(input)
}

/// `<a-b>` with `a <= b`
fn range(input: &str) -> IResult<&str, Atom> {
    map(
        verify(
            delimited(char('<'), separated_pair(range_bound, char('-'), range_bound), char('>')),
            |(lo, hi): &(char, char)| lo <= hi,
        ),
        |(lo, hi)| Atom::Range(lo, hi),
    )(input)
}

fn range_bound(input: &str) -> IResult<&str, char> {
    verify(anychar, |c: &char| *c != '.' && *c != '>')(input)
}

/// `{x,y,z}`; alternatives are plain text
fn alternation(input: &str) -> IResult<&str, Atom> {
    map(
        delimited(char('{'), separated_list1(char(','), alternative), char('}')),
        |alternatives: Vec<&str>| {
            Atom::Alternation(alternatives.into_iter().map(str::to_string).collect())
        },
    )(input)
}

fn alternative(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| !is_meta(c) && c != ',')(input)
}

fn escaped(input: &str) -> IResult<&str, Atom> {
    map(preceded(char('\\'), verify(anychar, |c: &char| *c != '.')), |c| {
        Atom::Literal(c.to_string())
    })(input)
}

fn literal(input: &str) -> IResult<&str, Atom> {
    map(take_while1(|c: char| !is_meta(c)), |s: &str| Atom::Literal(s.to_string()))(input)
}

/// Anchored regex equivalent to `segments`. `*` and `?` never cross a dot.
fn compile(segments: &[Vec<Atom>]) -> std::result::Result<Regex, regex::Error> {
    let mut source = String::from("^");
    for (i, atoms) in segments.iter().enumerate() {
        if i > 0 {
            source.push_str(r"\.");
        }
        for atom in atoms {
            match atom {
                Atom::Literal(text) => source.push_str(&regex::escape(text)),
                Atom::AnySegment => source.push_str("[^.]+"),
                Atom::AnyChar => source.push_str("[^.]"),
                Atom::Range(lo, hi) => {
                    source.push('[');
                    source.push_str(&regex::escape(&lo.to_string()));
                    source.push('-');
                    source.push_str(&regex::escape(&hi.to_string()));
                    source.push(']');
                },
                Atom::Alternation(alternatives) => {
                    let escaped: Vec<String> =
                        alternatives.iter().map(|text| regex::escape(text)).collect();
                    source.push_str("(?:");
                    source.push_str(&escaped.join("|"));
                    source.push(')');
                },
            }
        }
    }
    source.push('$');
    Regex::new(&source)
}

/// Join adjacent literals produced by escapes, e.g. `a\*b` -> `a*b`.
fn merge_literals(atoms: Vec<Atom>) -> Vec<Atom> {
    let mut merged: Vec<Atom> = Vec::with_capacity(atoms.len());
    for atom in atoms {
        if let (Some(Atom::Literal(prev)), Atom::Literal(next)) = (merged.last_mut(), &atom) {
            prev.push_str(next);
            continue;
        }
        merged.push(atom);
    }
    merged
}
