//! Graphite glob queries over dotted metric paths.
//!
//! A pattern such as `servers.web<1-3>.{cpu,mem}.*` is compiled once into a
//! [`Query`] and evaluated against candidate paths. Supported atoms:
//!
//! | Syntax      | Matches                                   |
//! |-------------|-------------------------------------------|
//! | `*`         | one or more characters within a segment   |
//! | `?`         | exactly one character                     |
//! | `<a-b>`     | one character in the inclusive range      |
//! | `{x,y}`     | exactly one of the literal alternatives   |
//! | `\c`        | the literal character `c`                 |
//!
//! A query only ever matches paths with the same number of segments.

pub mod ast;
pub mod matcher;
pub mod parser;

pub use ast::{Atom, Query};
pub use parser::parse_glob;

impl std::str::FromStr for Query {
    type Err = crate::core::QuarryError;

    fn from_str(pattern: &str) -> Result<Self, Self::Err> {
        parse_glob(pattern)
    }
}
