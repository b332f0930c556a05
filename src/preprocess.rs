//! Line preprocessing: escape stripping and constant-time length gates.
//!
//! Everything here runs before any parser sees the line.

use lazy_static::lazy_static;
use regex::Regex;
use std::borrow::Cow;

/// Default minimum trimmed length of a line that can carry a diagnostic.
pub const DEFAULT_MIN_LINE_LENGTH: usize = 3;

/// Default maximum byte length; longer lines are minified code or data dumps.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 4096;

lazy_static! {
    /// GitHub Actions runner timestamp prefix.
    static ref RUNNER_TIMESTAMP: Regex =
        Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:\.\d{1,9})?Z ").unwrap();
}

/// Length bounds applied to every line before pattern matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineLimits {
    pub min_len: usize,
    pub max_len: usize,
}

impl Default for LineLimits {
    fn default() -> Self {
        Self {
            min_len: DEFAULT_MIN_LINE_LENGTH,
            max_len: DEFAULT_MAX_LINE_LENGTH,
        }
    }
}

/// Outcome of the length gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Accept,
    TooShort,
    TooLong,
}

impl LineLimits {
    pub fn check(&self, line: &str) -> Gate {
        if line.len() > self.max_len {
            return Gate::TooLong;
        }
        if line.trim().len() < self.min_len {
            return Gate::TooShort;
        }
        Gate::Accept
    }
}

/// Strip ANSI escapes, a runner timestamp prefix, and trailing line endings.
pub fn clean(raw: &str) -> Cow<'_, str> {
    let raw = raw.trim_end_matches(['\n', '\r']);

    let stripped: Cow<'_, str> = if raw.contains('\x1b') {
        Cow::Owned(strip_ansi_escapes::strip_str(raw))
    } else {
        Cow::Borrowed(raw)
    };

    match RUNNER_TIMESTAMP.find(&stripped) {
        Some(m) => Cow::Owned(stripped[m.end()..].to_string()),
        None => stripped,
    }
}

/// Force compilation of this module's static patterns.
pub(crate) fn initialize_patterns() {
    lazy_static::initialize(&RUNNER_TIMESTAMP);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_strips_ansi() {
        let raw = "\x1b[31merror\x1b[0m: something broke";
        assert_eq!(clean(raw), "error: something broke");
    }

    #[test]
    fn test_clean_borrows_plain_lines() {
        let raw = "plain line";
        assert!(matches!(clean(raw), Cow::Borrowed(_)));
    }

    #[test]
    fn test_clean_strips_runner_timestamp() {
        let raw = "2024-03-01T12:34:56.1234567Z npm ERR! code ENOSPC\r\n";
        assert_eq!(clean(raw), "npm ERR! code ENOSPC");
    }

    #[test]
    fn test_length_gate() {
        let limits = LineLimits::default();
        assert_eq!(limits.check(""), Gate::TooShort);
        assert_eq!(limits.check("   \t "), Gate::TooShort);
        assert_eq!(limits.check("ab"), Gate::TooShort);
        assert_eq!(limits.check("abc"), Gate::Accept);
        assert_eq!(limits.check(&"x".repeat(DEFAULT_MAX_LINE_LENGTH)), Gate::Accept);
        assert_eq!(limits.check(&"x".repeat(DEFAULT_MAX_LINE_LENGTH + 1)), Gate::TooLong);
    }
}
