//! Evaluation of compiled glob queries against concrete paths.

use super::ast::Query;

impl Query {
    /// True when `path` has exactly as many segments as the pattern and
    /// every segment satisfies its atoms.
    ///
    /// Runs in time linear in the length of `path` whatever the number of
    /// wildcards.
    pub fn matches(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }
}

#[cfg(test)]
mod tests {
    use crate::query::parse_glob;
    use std::time::{Duration, Instant};

    fn matches(pattern: &str, path: &str) -> bool {
        parse_glob(pattern).unwrap().matches(path)
    }

    #[test]
    fn test_any_segment_anchors_segment_count() {
        assert!(matches("a.*.c", "a.b.c"));
        assert!(matches("a.*.c", "a.xyz.c"));
        assert!(!matches("a.*.c", "a.b.d.c"));
        assert!(!matches("a.*.c", "a.c"));
        assert!(!matches("a.*.c", "a..c"));
    }

    #[test]
    fn test_range() {
        assert!(matches("a.<b-d>", "a.b"));
        assert!(matches("a.<b-d>", "a.c"));
        assert!(matches("a.<b-d>", "a.d"));
        assert!(!matches("a.<b-d>", "a.e"));
        assert!(!matches("a.<b-d>", "a.bb"));
    }

    #[test]
    fn test_alternation() {
        assert!(matches("cpu.{user,system}", "cpu.user"));
        assert!(matches("cpu.{user,system}", "cpu.system"));
        assert!(!matches("cpu.{user,system}", "cpu.idle"));
        assert!(!matches("cpu.{user,system}", "cpu.users"));
        // A shorter alternative must not shadow a longer one.
        assert!(matches("x.{a,ab}c", "x.abc"));
    }

    #[test]
    fn test_any_char() {
        assert!(matches("web?.load", "web1.load"));
        assert!(!matches("web?.load", "web.load"));
        assert!(!matches("web?.load", "web10.load"));
    }

    #[test]
    fn test_wildcard_inside_segment_backtracks() {
        assert!(matches("a.cpu*idle", "a.cpu0idle"));
        assert!(matches("a.cpu*idle", "a.cpu_idle_idle"));
        assert!(!matches("a.cpu*idle", "a.cpuidle"));
        assert!(matches("a.*_*", "a.x_y_z"));
    }

    #[test]
    fn test_literal_is_exact() {
        assert!(matches("servers.web1.load", "servers.web1.load"));
        assert!(!matches("servers.web1.load", "servers.web1.load5"));
        assert!(!matches("servers.web1", "servers.web1.load"));
    }

    #[test]
    fn test_multibyte_characters() {
        assert!(matches("m.?", "m.é"));
        assert!(matches("m.*", "m.日本"));
        assert!(matches("m.<α-ω>", "m.λ"));
    }

    #[test]
    fn test_many_wildcards_on_long_segment() {
        let pattern = format!("m.{}b", "*a".repeat(12));
        let path = format!("m.{}", "a".repeat(5000));

        let started = Instant::now();
        assert!(!matches(&pattern, &path));
        assert!(matches(&pattern, &format!("{}b", path)));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_regex_metacharacters_in_literals() {
        assert!(matches("a.b+c", "a.b+c"));
        assert!(!matches("a.b+c", "a.bbc"));
        assert!(matches("a.{x|y,z}", "a.x|y"));
        assert!(!matches("a.{x|y,z}", "a.x"));
        assert!(matches("a.<[-]>", "a.]"));
    }
}
