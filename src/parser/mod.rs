//! Tool parser contract and shared building blocks.
//!
//! This module provides:
//! - `ToolParser` trait: the capability set every recognizer implements
//! - `Probe`: the explicit result of a confidence probe, handed to `extract`
//! - `ParserRegistry`: the dispatcher that arbitrates between parsers
//! - Tool-specific implementations under `languages`, plus the
//!   infrastructure and fallback recognizers
//!
//! # Adding a New Parser
//!
//! Implement `ToolParser` in a new module, give it a priority in
//! [`priority`], and add it to [`default_parsers`].

pub mod accumulator;
pub mod generic;
pub mod infrastructure;
pub mod languages;
pub mod registry;

pub use accumulator::{Accumulator, AccumulatorLimits, MultiLine};
pub use generic::GenericParser;
pub use infrastructure::InfrastructureParser;
pub use languages::{EslintParser, GoParser, PythonParser, RustParser, TypeScriptParser};

use languages::{go, javascript, python, rust_lang, typescript};
pub use registry::ParserRegistry;

use crate::context::ParseContext;
use crate::noise::NoiseTable;
use crate::record::{ErrorRecord, Severity};

/// Static tie-break priorities. Higher wins when confidences are equal.
///
/// Only the ordering is meaningful: language parsers above infrastructure
/// detection, infrastructure above the fallback.
pub mod priority {
    pub const TYPESCRIPT: i32 = 100;
    pub const RUST: i32 = 95;
    pub const ESLINT: i32 = 90;
    pub const GO: i32 = 85;
    pub const PYTHON: i32 = 80;
    pub const INFRASTRUCTURE: i32 = 50;
    pub const GENERIC: i32 = 0;
}

/// Fields pulled out of a header line during a probe.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeadFields {
    pub file: Option<String>,
    pub line: Option<u32>,
    pub column: Option<u32>,
    pub severity: Option<Severity>,
    pub code: Option<String>,
    pub message: Option<String>,
    /// Secondary tag, such as a lint's symbolic name.
    pub detail: Option<String>,
}

/// Result of a successful confidence probe.
///
/// `form` names the grammar that matched (parser-specific), and `fields`
/// holds what the probe already captured, so `extract` commits without
/// re-matching. A probe is a plain value: nothing is cached on the parser.
#[derive(Debug, Clone, PartialEq)]
pub struct Probe {
    pub confidence: f32,
    pub form: &'static str,
    pub fields: HeadFields,
}

impl Probe {
    pub fn new(confidence: f32, form: &'static str, fields: HeadFields) -> Self {
        Self {
            confidence: confidence.clamp(0.0, 1.0),
            form,
            fields,
        }
    }
}

/// What an extract call produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    /// A finished record.
    Record(ErrorRecord),
    /// The line opened a multi-line block; the record comes later.
    Pending,
    /// The line was claimed but carries no record of its own
    /// (e.g. a file header that only updates the context).
    Consumed,
}

/// Answer of an open block to the next line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuation {
    /// The line belongs to the block and was consumed.
    Consumed,
    /// The line belongs to the block and closes it.
    Completed,
    /// The line is not part of the block; it will be re-dispatched.
    Boundary,
}

/// Capability set of a log-line recognizer.
///
/// Probes must not change externally observable state. Parsers never fail:
/// a line they cannot handle simply probes to `None`.
pub trait ToolParser: Send {
    /// Stable identifier (e.g. "eslint", "rust").
    fn id(&self) -> &'static str;

    /// Static priority used to break confidence ties.
    fn priority(&self) -> i32;

    /// Score a line. `None` means zero confidence.
    fn probe(&self, line: &str, ctx: &ParseContext) -> Option<Probe>;

    /// Commit to a line previously probed by this parser.
    fn extract(&mut self, line: &str, probe: Probe, ctx: &mut ParseContext) -> Extraction;

    /// Whether the line is benign output for this tool.
    fn is_noise(&self, line: &str) -> bool {
        self.noise_table().map(|t| t.is_noise(line)).unwrap_or(false)
    }

    /// Exported noise table, letting the dispatcher pre-filter lines.
    fn noise_table(&self) -> Option<&'static NoiseTable> {
        None
    }

    /// Whether this parser can hold multi-line state.
    fn is_multi_line(&self) -> bool {
        false
    }

    /// Whether a multi-line block is currently open.
    fn is_accumulating(&self) -> bool {
        false
    }

    /// Offer the next line to an open block. Must run in time linear in
    /// the line length.
    fn continue_block(&mut self, _line: &str, _ctx: &ParseContext) -> Continuation {
        Continuation::Boundary
    }

    /// Close the open block and produce its record.
    fn finish(&mut self, _ctx: &ParseContext) -> Option<ErrorRecord> {
        None
    }

    /// Drop any open block without producing a record.
    fn reset(&mut self) {}
}

/// All built-in parsers, with the given accumulator ceilings.
pub fn default_parsers(limits: AccumulatorLimits) -> Vec<Box<dyn ToolParser>> {
    vec![
        Box::new(TypeScriptParser::new()),
        Box::new(RustParser::new(limits)),
        Box::new(EslintParser::new()),
        Box::new(GoParser::new(limits)),
        Box::new(PythonParser::new(limits)),
        Box::new(InfrastructureParser::new()),
        Box::new(GenericParser::new()),
    ]
}

/// Identifiers of the built-in parsers.
pub fn builtin_parser_ids() -> &'static [&'static str] {
    &[
        "typescript",
        "rust",
        "eslint",
        "go",
        "python",
        "infrastructure",
        "generic",
    ]
}

/// Compile every static pattern table up front.
///
/// Tables are otherwise built on first use. Calling this before timing work
/// or fanning out to worker threads keeps the one-off cost in one place.
pub fn initialize_patterns() {
    crate::preprocess::initialize_patterns();
    crate::noise::initialize_patterns();
    typescript::initialize_patterns();
    rust_lang::initialize_patterns();
    javascript::initialize_patterns();
    go::initialize_patterns();
    python::initialize_patterns();
    infrastructure::initialize_patterns();
    generic::initialize_patterns();
}

/// Capture group `i` as an owned string.
pub(crate) fn cap(caps: &regex::Captures<'_>, i: usize) -> Option<String> {
    caps.get(i).map(|m| m.as_str().to_string())
}

/// Capture group `i` as a string slice.
pub(crate) fn cap_str<'a>(caps: &regex::Captures<'a>, i: usize) -> Option<&'a str> {
    caps.get(i).map(|m| m.as_str())
}

/// Look up the longest prefix of `code` present in a severity table.
pub(crate) fn lookup_prefix<V: Copy>(table: &phf::Map<&'static str, V>, code: &str) -> Option<V> {
    (1..=code.len())
        .rev()
        .filter(|&i| code.is_char_boundary(i))
        .find_map(|i| table.get(&code[..i]).copied())
}

#[cfg(test)]
mod tests {
    use super::*;
    use phf::phf_map;

    static TABLE: phf::Map<&'static str, Severity> = phf_map! {
        "E" => Severity::Warning,
        "E9" => Severity::Error,
        "F" => Severity::Error,
    };

    #[test]
    fn test_lookup_prefix_prefers_longest() {
        assert_eq!(lookup_prefix(&TABLE, "E501"), Some(Severity::Warning));
        assert_eq!(lookup_prefix(&TABLE, "E999"), Some(Severity::Error));
        assert_eq!(lookup_prefix(&TABLE, "F401"), Some(Severity::Error));
        assert_eq!(lookup_prefix(&TABLE, "Z100"), None);
        assert_eq!(lookup_prefix(&TABLE, ""), None);
    }

    #[test]
    fn test_probe_confidence_is_clamped() {
        let p = Probe::new(1.5, "x", HeadFields::default());
        assert_eq!(p.confidence, 1.0);
        let p = Probe::new(-0.5, "x", HeadFields::default());
        assert_eq!(p.confidence, 0.0);
    }

    #[test]
    fn test_default_parsers_match_builtin_ids() {
        let parsers = default_parsers(AccumulatorLimits::default());
        let ids: Vec<_> = parsers.iter().map(|p| p.id()).collect();
        assert_eq!(ids, builtin_parser_ids());
    }

    #[test]
    fn test_priority_ordering() {
        assert!(priority::PYTHON > priority::INFRASTRUCTURE);
        assert!(priority::INFRASTRUCTURE > priority::GENERIC);
    }

    #[test]
    fn test_every_pattern_table_compiles() {
        initialize_patterns();
        assert!(!crate::noise::SHARED_NOISE.patterns().is_empty());

        let ctx = ParseContext::new();
        let line = "src/main.rs:10:5: error: something failed";
        for parser in default_parsers(AccumulatorLimits::default()) {
            let _ = parser.probe(line, &ctx);
            let _ = parser.is_noise(line);
            if let Some(table) = parser.noise_table() {
                assert!(!table.patterns().is_empty(), "{} has no noise patterns", parser.id());
            }
        }
    }
}
