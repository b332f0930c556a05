//! Universal fallback recognizer.
//!
//! Only surfaces error shapes no specific parser claimed, and only when the
//! line carries a strong structural signal: an explicit severity keyword at
//! line start, a `file:line:col:` location with a real extension, or a
//! process-death phrase. Anything any noise table knows is rejected.
//! Records are always `unknown` and flagged for telemetry.

use lazy_static::lazy_static;
use regex::Regex;

use crate::context::ParseContext;
use crate::noise::{NoiseTable, SHARED_NOISE};
use crate::parser::infrastructure;
use crate::parser::languages::{go, javascript, python, rust_lang, typescript};
use crate::parser::{cap, priority, Extraction, HeadFields, Probe, ToolParser};
use crate::record::{parse_number, Category, ErrorRecord, Severity, Source};

/// Fixed fallback score. Only its position below every specific parser
/// matters.
pub const FALLBACK_CONFIDENCE: f32 = 0.2;

const FORM_KEYWORD: &str = "keyword";
const FORM_LOCATION: &str = "location";
const FORM_CRASH: &str = "crash";

lazy_static! {
    static ref KEYWORD: Regex = Regex::new(
        r"^(?i:(error|fatal|panic))(?:\[([0-9A-Za-z_\-.]{1,64})\])?: (.{3,2000})$"
    ).unwrap();

    static ref LOCATION: Regex = Regex::new(
        r"^((?:[A-Za-z]:)?[0-9A-Za-z_./\\\-]{0,500}\.[A-Za-z][A-Za-z0-9]{0,9}):(\d{1,7}):(\d{1,7}):? (.{3,2000})$"
    ).unwrap();

    static ref CRASH: Regex = Regex::new(
        r"^(?:.{0,300}[:\d] )?(Segmentation fault|Bus error|Aborted|Illegal instruction)(?: \(core dumped\))?$"
    ).unwrap();

    static ref ASSERTION: Regex = Regex::new(
        r"^(?:.{0,500}: )?Assertion [`'].{1,500}' failed\.?$"
    ).unwrap();

    static ref OUT_OF_MEMORY: Regex = Regex::new(
        r"^(?:.{0,200}: )?(?:[Oo]ut of memory|Cannot allocate memory)(?:[.!:].{0,300})?$"
    ).unwrap();
}

/// Every table a line is checked against before the fallback considers it.
fn all_noise_tables() -> [&'static NoiseTable; 7] {
    [
        &SHARED_NOISE,
        &typescript::NOISE,
        &javascript::NOISE,
        &rust_lang::NOISE,
        &go::NOISE,
        &python::NOISE,
        &infrastructure::NOISE,
    ]
}

/// Severity implied by the start of a free-form message.
fn severity_of(message: &str) -> Severity {
    let head = message.trim_start();
    let lower = head.get(..head.len().min(8)).unwrap_or(head).to_ascii_lowercase();
    if lower.starts_with("warning") || lower.starts_with("warn:") {
        Severity::Warning
    } else {
        Severity::Error
    }
}

/// Conservative fallback parser. Always ranks last.
#[derive(Debug, Default)]
pub struct GenericParser;

impl GenericParser {
    pub fn new() -> Self {
        Self
    }
}

impl ToolParser for GenericParser {
    fn id(&self) -> &'static str {
        "generic"
    }

    fn priority(&self) -> i32 {
        priority::GENERIC
    }

    fn is_noise(&self, line: &str) -> bool {
        all_noise_tables().iter().any(|t| t.is_noise(line))
    }

    fn probe(&self, line: &str, _ctx: &ParseContext) -> Option<Probe> {
        let trimmed = line.trim();

        if let Some(c) = KEYWORD.captures(trimmed) {
            let keyword = c.get(1).map(|m| m.as_str()).unwrap_or("error");
            let fields = HeadFields {
                code: cap(&c, 2),
                message: c.get(3).map(|m| m.as_str().trim().to_string()),
                detail: Some(keyword.to_ascii_lowercase()),
                severity: Some(Severity::Error),
                ..HeadFields::default()
            };
            return Some(Probe::new(FALLBACK_CONFIDENCE, FORM_KEYWORD, fields));
        }

        if let Some(c) = LOCATION.captures(trimmed) {
            let message = c.get(4).map(|m| m.as_str().trim().to_string());
            let fields = HeadFields {
                file: cap(&c, 1),
                line: parse_number(c.get(2).map(|m| m.as_str())),
                column: parse_number(c.get(3).map(|m| m.as_str())),
                severity: message.as_deref().map(severity_of),
                message,
                ..HeadFields::default()
            };
            return Some(Probe::new(FALLBACK_CONFIDENCE, FORM_LOCATION, fields));
        }

        if CRASH.is_match(trimmed) || ASSERTION.is_match(trimmed) || OUT_OF_MEMORY.is_match(trimmed) {
            let fields = HeadFields {
                message: Some(trimmed.to_string()),
                severity: Some(Severity::Error),
                ..HeadFields::default()
            };
            return Some(Probe::new(FALLBACK_CONFIDENCE, FORM_CRASH, fields));
        }

        None
    }

    fn extract(&mut self, line: &str, probe: Probe, ctx: &mut ParseContext) -> Extraction {
        let HeadFields {
            file,
            line: line_no,
            column,
            severity,
            code,
            message,
            ..
        } = probe.fields;

        let message = message.unwrap_or_else(|| line.trim().to_string());
        tracing::debug!(form = probe.form, message = %message, "unrecognized error shape");

        let record = ErrorRecord::builder(
            message,
            severity.unwrap_or(Severity::Error),
            Category::Unknown,
            Source::Generic,
        )
        .file(file)
        .location(line_no, column)
        .rule_id(code)
        .unknown_pattern()
        .build(ctx);

        Extraction::Record(record)
    }
}

/// Force compilation of this module's static patterns.
pub(crate) fn initialize_patterns() {
    lazy_static::initialize(&KEYWORD);
    lazy_static::initialize(&LOCATION);
    lazy_static::initialize(&CRASH);
    lazy_static::initialize(&ASSERTION);
    lazy_static::initialize(&OUT_OF_MEMORY);
}
