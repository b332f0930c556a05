//! Three-tier noise classification.
//!
//! A [`NoiseTable`] checks literal prefixes, then literal substrings, then
//! regular expressions. Literal tables are matched against the trimmed,
//! ASCII-lowercased line and must be written in lowercase.
//!
//! Every regex in a table must be anchored (`^`) and use bounded
//! repetition only.

use lazy_static::lazy_static;
use regex::Regex;

/// Which tier matched, for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoiseTier {
    Prefix,
    Substring,
    Pattern,
}

/// A set of benign-output patterns.
pub struct NoiseTable {
    prefixes: &'static [&'static str],
    substrings: &'static [&'static str],
    patterns: Vec<Regex>,
}

impl NoiseTable {
    /// Build a table. Panics on an invalid pattern; tables are static data
    /// compiled once, so a bad pattern is a programming error.
    pub fn new(
        prefixes: &'static [&'static str],
        substrings: &'static [&'static str],
        patterns: &[&str],
    ) -> Self {
        let patterns = patterns
            .iter()
            .map(|p| Regex::new(p).unwrap_or_else(|e| panic!("noise pattern {:?}: {}", p, e)))
            .collect();
        Self {
            prefixes,
            substrings,
            patterns,
        }
    }

    /// Classify a line, returning the tier that matched.
    pub fn classify(&self, line: &str) -> Option<NoiseTier> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }
        let lower = trimmed.to_ascii_lowercase();

        if self.prefixes.iter().any(|p| lower.starts_with(p)) {
            return Some(NoiseTier::Prefix);
        }
        if self.substrings.iter().any(|s| lower.contains(s)) {
            return Some(NoiseTier::Substring);
        }
        if self.patterns.iter().any(|r| r.is_match(trimmed)) {
            return Some(NoiseTier::Pattern);
        }
        None
    }

    pub fn is_noise(&self, line: &str) -> bool {
        self.classify(line).is_some()
    }

    /// Compiled regex tier, exposed for pattern-hygiene tests.
    pub fn patterns(&self) -> &[Regex] {
        &self.patterns
    }
}

lazy_static! {
    /// Benign output shared by every toolchain: progress, banners, summaries.
    pub static ref SHARED_NOISE: NoiseTable = NoiseTable::new(
        &[
            "all tests passed",
            "all checks passed",
            "build succeeded",
            "build successful",
            "successfully built",
            "successfully installed",
            "successfully tagged",
            "✓",
            "✔",
            "√",
            "[info]",
            "info:",
            "[debug]",
            "debug:",
            "##[group]",
            "##[endgroup]",
            "##[debug]",
            "::group::",
            "::endgroup::",
            "::debug::",
            "done in ",
            "✨  done",
            "run actions/",
            "post job cleanup",
            "cleaning up orphan processes",
            "complete job",
        ],
        &[
            "all tests passed",
            "no issues found",
            "0 problems",
            "0 errors, 0 warnings",
            "0 vulnerabilities",
            "tests passed",
        ],
        &[
            // progress bars: [=====>    ] 45% / ###### 100%
            r"^\[?[=#>\-. ]{4,200}\]?\s{0,4}\d{1,3}(?:\.\d{1,2})?%",
            // bare percentages and counters: 45% / (12/340)
            r"^\(?\d{1,6}(?:/\d{1,6})?\)?\s{0,4}\d{0,3}%?$",
            // separator rules made only of punctuation
            r"^[\-=_*#~.+]{3,400}$",
            // clock-stamped status lines from watch modes: [12:00:00 PM] ...
            r"^\[\d{1,2}:\d{2}:\d{2}(?: ?[AaPp][Mm])?\] ",
        ],
    );
}

/// Check a line against the shared table.
pub fn is_shared_noise(line: &str) -> bool {
    SHARED_NOISE.is_noise(line)
}

/// Force compilation of the shared noise table.
pub(crate) fn initialize_patterns() {
    lazy_static::initialize(&SHARED_NOISE);
}
