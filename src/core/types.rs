//! Core domain types for metric intake.

use std::fmt;

/// One `(path, value, timestamp)` sample.
///
/// Handlers keep a single point per connection and refill it for every
/// sample, so the path buffer is reused across samples.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MetricPoint {
    /// Dotted metric path, e.g. `servers.web1.load`.
    pub path: String,
    /// Sample value.
    pub value: f64,
    /// Epoch seconds.
    pub timestamp: u32,
}

impl MetricPoint {
    /// Create a new point.
    pub fn new<S: Into<String>>(path: S, value: f64, timestamp: u32) -> Self {
        Self {
            path: path.into(),
            value,
            timestamp,
        }
    }

    /// Overwrite this point in place, reusing the path allocation.
    pub fn refill(&mut self, path: &str, value: f64, timestamp: u32) {
        self.path.clear();
        self.path.push_str(path);
        self.value = value;
        self.timestamp = timestamp;
    }
}

impl fmt::Display for MetricPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.path, self.value, self.timestamp)
    }
}

/// Wire protocol a connection speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// Whitespace-delimited `path value timestamp` triples.
    Plaintext,
    /// Length-prefixed pickled batches.
    Pickle,
}

impl Protocol {
    /// Short name used in log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Plaintext => "plaintext",
            Protocol::Pickle => "pickle",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
