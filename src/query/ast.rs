//! Compiled form of a Graphite glob pattern.

use regex::Regex;
use std::fmt;

/// One matching unit inside a path segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Atom {
    /// Exact text
    Literal(String),
    /// `*`: one or more characters of the segment
    AnySegment,
    /// `?`: exactly one character
    AnyChar,
    /// `<a-b>`: one character in the inclusive range
    Range(char, char),
    /// `{x,y,z}`: exactly one of the alternatives
    Alternation(Vec<String>),
}

/// A compiled glob: one atom sequence per dot-delimited segment, plus the
/// anchored regular expression evaluated by [`Query::matches`].
///
/// Immutable once compiled and cheap to share between queries.
#[derive(Debug, Clone)]
pub struct Query {
    pub(crate) pattern: String,
    pub(crate) segments: Vec<Vec<Atom>>,
    pub(crate) regex: Regex,
}

impl PartialEq for Query {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern && self.segments == other.segments
    }
}

impl Eq for Query {}

impl Query {
    /// The source pattern.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Per-segment atoms.
    pub fn segments(&self) -> &[Vec<Atom>] {
        &self.segments
    }

    /// Number of dot-delimited segments a matching path has.
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Depth of the leaf nodes this query can match.
    pub fn depth(&self) -> usize {
        self.segments.len().saturating_sub(1)
    }

    /// True when the pattern has no wildcards and names exactly one path.
    pub fn is_literal(&self) -> bool {
        self.segments
            .iter()
            .flatten()
            .all(|atom| matches!(atom, Atom::Literal(_)))
    }

    /// The single path a literal query names.
    pub fn literal_path(&self) -> Option<String> {
        if !self.is_literal() {
            return None;
        }
        let segments: Vec<String> = self
            .segments
            .iter()
            .map(|atoms| atoms.iter().map(ToString::to_string).collect())
            .collect();
        Some(segments.join("."))
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Atom::Literal(s) => f.write_str(s),
            Atom::AnySegment => f.write_str("*"),
            Atom::AnyChar => f.write_str("?"),
            Atom::Range(lo, hi) => write!(f, "<{}-{}>", lo, hi),
            Atom::Alternation(alternatives) => write!(f, "{{{}}}", alternatives.join(",")),
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pattern)
    }
}
