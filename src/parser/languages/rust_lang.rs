//! rustc, Clippy and cargo diagnostics.
//!
//! A diagnostic block starts at an `error[E0308]: ...` / `warning: ...`
//! header and collects the `-->` location, source gutter lines and
//! `= note:` / `= help:` lines that follow, ending at a blank line.
//!
//! Also recognized:
//! - `thread 'main' panicked at src/main.rs:2:5:` (message on the next line)
//! - `test tests::it_works ... FAILED`
//! - cargo dependency-resolution failures

use lazy_static::lazy_static;
use phf::{phf_map, phf_set};
use regex::Regex;

use crate::context::ParseContext;
use crate::noise::{self, NoiseTable};
use crate::parser::{
    cap, cap_str, priority, Accumulator, AccumulatorLimits, Continuation, Extraction, HeadFields,
    MultiLine, Probe, ToolParser,
};
use crate::record::{parse_number, Category, ErrorRecord, Severity, Source};

const FORM_CODED: &str = "coded-header";
const FORM_PLAIN: &str = "plain-header";
const FORM_PANIC: &str = "panic";
const FORM_TEST_PANIC: &str = "test-panic";
const FORM_TEST_FAILED: &str = "test-failed";

lazy_static! {
    static ref HEADER: Regex = Regex::new(
        r"^(error|warning)(?:\[([A-Za-z][0-9A-Za-z_:]{0,100})\])?: (.{1,2000})$"
    ).unwrap();

    /// Both panic formats: message after the location (1.73+) or quoted before it.
    static ref PANIC: Regex = Regex::new(
        r"^thread '([^']{1,300})' panicked at (?:'(.{0,2000})', )?([^\s:'][^:']{0,500}):(\d{1,7}):(\d{1,7}):?$"
    ).unwrap();

    static ref TEST_FAILED: Regex =
        Regex::new(r"^test ([0-9A-Za-z_:]{1,300}) \.\.\. FAILED$").unwrap();

    static ref LOCATION: Regex = Regex::new(
        r"^\s{0,12}--> ([^\s:][^:]{0,500}):(\d{1,7}):(\d{1,7})$"
    ).unwrap();

    static ref SECONDARY_LOCATION: Regex = Regex::new(r"^\s{0,12}::: ").unwrap();

    static ref GUTTER: Regex = Regex::new(r"^\s{0,12}\d{0,7}\s{0,4}\|").unwrap();

    static ref ELLIPSIS: Regex = Regex::new(r"^\s{0,12}\.\.\.$").unwrap();

    static ref NOTE: Regex = Regex::new(
        r"^\s{0,12}(?:= )?(note|help)(?:\[[0-9A-Za-z_:]{0,50}\])?: (.{0,2000})$"
    ).unwrap();

    static ref LINT_ATTR: Regex =
        Regex::new(r"#\[(warn|deny|forbid)\(([0-9A-Za-z_:]{1,200})\)\]").unwrap();

    static ref CLIPPY_URL: Regex =
        Regex::new(r"rust-clippy/[0-9A-Za-z_\-./]{0,100}#([a-z_]{1,100})").unwrap();

    static ref ERROR_CODE: Regex = Regex::new(r"^E\d{4}$").unwrap();

    static ref DEPENDENCY_MESSAGE: Regex = Regex::new(
        r"^(?:failed to select a version|no matching package named|failed to load source for dependency|failed to download|failed to get `|failed to resolve patches|cyclic package dependency|could not find `[^`]{1,200}` in registry|the lock file [^ ]{1,500} needs to be updated)"
    ).unwrap();

    pub(crate) static ref NOISE: NoiseTable = NoiseTable::new(
        &[
            "compiling ",
            "checking ",
            "finished ",
            "running ",
            "downloaded ",
            "downloading ",
            "updating ",
            "fresh ",
            "documenting ",
            "installing ",
            "installed ",
            "locking ",
            "adding ",
            "blocking waiting",
            "doc-tests ",
            "test result: ok",
            "for more information about this error",
            "some errors have detailed explanations",
            "error: aborting due to",
            "error: could not compile",
            "error: test failed, to rerun pass",
            "warning: build failed, waiting for other jobs",
        ],
        &["will be replaced by crlf", "will be replaced by lf"],
        &[
            r"^warning: .{1,300} generated \d{1,6} warnings?",
            r"^test [0-9A-Za-z_:]{1,300} \.\.\. (?:ok|ignored)$",
            r"^running \d{1,6} tests?$",
            r"^warning: \d{1,6} warnings? emitted$",
        ],
    );
}

/// Lints whose warnings almost always indicate a real bug.
static ESCALATED_LINTS: phf::Set<&'static str> = phf_set! {
    "unused_must_use",
    "unconditional_recursion",
    "overflowing_literals",
    "arithmetic_overflow",
    "unconditional_panic",
    "clippy::unwrap_used",
    "clippy::expect_used",
    "clippy::panic",
    "clippy::todo",
    "clippy::unimplemented",
    "clippy::dbg_macro",
};

/// Error codes with a more specific category than `compile`.
static CODE_CATEGORIES: phf::Map<&'static str, Category> = phf_map! {
    "E0463" => Category::Dependency,
    "E0460" => Category::Dependency,
    "E0514" => Category::Dependency,
    "E0519" => Category::Dependency,
};

/// What kind of block is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Diagnostic,
    Cargo,
    Panic { test: bool },
}

/// Parser for Rust toolchain output.
#[derive(Debug, Default)]
pub struct RustParser {
    state: MultiLine<BlockKind>,
    limits: AccumulatorLimits,
}

impl RustParser {
    pub fn new(limits: AccumulatorLimits) -> Self {
        Self {
            state: MultiLine::Idle,
            limits,
        }
    }

    fn is_header(line: &str) -> bool {
        HEADER.is_match(line) || PANIC.is_match(line) || TEST_FAILED.is_match(line)
    }
}

/// Whether a lint belongs to the documentation family.
fn is_docs_lint(lint: &str) -> bool {
    lint.starts_with("rustdoc::")
        || lint.contains("missing_docs")
        || lint.contains("missing_doc_")
        || lint.ends_with("_doc")
        || lint == "clippy::doc_markdown"
}

/// Offer a line to an open compiler diagnostic. `None` means unrecognized.
fn continue_diagnostic(acc: &mut Accumulator, line: &str) -> Option<Continuation> {
    if let Some(c) = LOCATION.captures(line) {
        if acc.head.file.is_none() {
            acc.head.file = cap(&c, 1);
            acc.head.line = parse_number(cap_str(&c, 2));
            acc.head.column = parse_number(cap_str(&c, 3));
        }
        acc.push(line);
        return Some(Continuation::Consumed);
    }

    if let Some(c) = NOTE.captures(line) {
        let text = cap_str(&c, 2).unwrap_or_default();
        if cap_str(&c, 1) == Some("help") {
            if let Some(lint) = CLIPPY_URL.captures(text).and_then(|u| cap(&u, 1)) {
                acc.head.code.get_or_insert_with(|| format!("clippy::{}", lint));
            } else {
                acc.push_help(text);
            }
        } else {
            if let Some(attr) = LINT_ATTR.captures(text) {
                if acc.head.code.is_none() {
                    acc.head.code = cap(&attr, 2);
                }
                if matches!(cap_str(&attr, 1), Some("deny" | "forbid")) {
                    acc.head.severity = Some(Severity::Error);
                }
            }
            acc.push_note(text);
        }
        acc.push(line);
        return Some(Continuation::Consumed);
    }

    if SECONDARY_LOCATION.is_match(line) || GUTTER.is_match(line) || ELLIPSIS.is_match(line) {
        acc.push(line);
        return Some(Continuation::Consumed);
    }

    None
}

/// Offer a line to an open panic block.
fn continue_panic(acc: &mut Accumulator, line: &str) -> Option<Continuation> {
    if acc.head.message.is_none() {
        acc.head.message = Some(line.trim().to_string());
        acc.push(line);
        return Some(Continuation::Consumed);
    }
    let indented = line.starts_with(char::is_whitespace);
    if indented || line.starts_with("note: ") || line.starts_with("stack backtrace:") {
        acc.push(line);
        return Some(Continuation::Consumed);
    }
    None
}

impl ToolParser for RustParser {
    fn id(&self) -> &'static str {
        "rust"
    }

    fn priority(&self) -> i32 {
        priority::RUST
    }

    fn noise_table(&self) -> Option<&'static NoiseTable> {
        Some(&NOISE)
    }

    fn is_multi_line(&self) -> bool {
        true
    }

    fn is_accumulating(&self) -> bool {
        self.state.is_active()
    }

    fn probe(&self, line: &str, _ctx: &ParseContext) -> Option<Probe> {
        let line = line.trim_end();

        if let Some(c) = HEADER.captures(line) {
            let code = cap(&c, 2);
            let (confidence, form) = if code.is_some() {
                (0.9, FORM_CODED)
            } else if cap_str(&c, 1) == Some("error") {
                (0.55, FORM_PLAIN)
            } else {
                (0.45, FORM_PLAIN)
            };
            let fields = HeadFields {
                severity: cap_str(&c, 1).map(Severity::from_word),
                code,
                message: cap(&c, 3),
                ..HeadFields::default()
            };
            return Some(Probe::new(confidence, form, fields));
        }

        if let Some(c) = PANIC.captures(line) {
            let thread = cap_str(&c, 1).unwrap_or_default();
            let form = if thread != "main" && thread.contains("::") {
                FORM_TEST_PANIC
            } else {
                FORM_PANIC
            };
            let fields = HeadFields {
                file: cap(&c, 3),
                line: parse_number(cap_str(&c, 4)),
                column: parse_number(cap_str(&c, 5)),
                severity: Some(Severity::Error),
                code: None,
                message: cap(&c, 2).filter(|m| !m.is_empty()),
                detail: cap(&c, 1),
            };
            return Some(Probe::new(0.9, form, fields));
        }

        TEST_FAILED.captures(line).map(|c| {
            let fields = HeadFields {
                code: cap(&c, 1),
                severity: Some(Severity::Error),
                ..HeadFields::default()
            };
            Probe::new(0.85, FORM_TEST_FAILED, fields)
        })
    }

    fn extract(&mut self, line: &str, probe: Probe, ctx: &mut ParseContext) -> Extraction {
        let line = line.trim_end();
        let kind = match probe.form {
            FORM_TEST_FAILED => {
                let test = probe.fields.code.unwrap_or_default();
                let record = ErrorRecord::builder(
                    format!("test {} failed", test),
                    Severity::Error,
                    Category::Test,
                    Source::Cargo,
                )
                .rule_id(Some(test))
                .build(ctx);
                return Extraction::Record(record);
            }
            FORM_PANIC => BlockKind::Panic { test: false },
            FORM_TEST_PANIC => BlockKind::Panic { test: true },
            _ => {
                let message = probe.fields.message.as_deref().unwrap_or_default();
                if DEPENDENCY_MESSAGE.is_match(message) {
                    BlockKind::Cargo
                } else {
                    BlockKind::Diagnostic
                }
            }
        };

        let acc = Accumulator::new(line, probe.fields, self.limits);
        self.state.begin(kind, acc);
        Extraction::Pending
    }

    fn continue_block(&mut self, line: &str, _ctx: &ParseContext) -> Continuation {
        let Some((kind, acc)) = self.state.get_mut() else {
            return Continuation::Boundary;
        };
        let line = line.trim_end();

        if line.trim().is_empty() {
            return if matches!(kind, BlockKind::Panic { .. }) && acc.head.message.is_none() {
                Continuation::Consumed
            } else {
                Continuation::Completed
            };
        }
        if Self::is_header(line) {
            return Continuation::Boundary;
        }

        let recognized = match kind {
            BlockKind::Diagnostic => continue_diagnostic(acc, line),
            BlockKind::Panic { .. } => continue_panic(acc, line),
            BlockKind::Cargo => None,
        };
        if let Some(answer) = recognized {
            return answer;
        }

        if NOISE.is_noise(line) || noise::is_shared_noise(line) {
            return Continuation::Boundary;
        }
        match kind {
            // resolution failures print unindented detail lines
            BlockKind::Cargo => {
                acc.push(line);
                Continuation::Consumed
            }
            BlockKind::Diagnostic
                if acc.head.file.is_none() && line.starts_with(char::is_whitespace) =>
            {
                acc.push(line);
                Continuation::Consumed
            }
            _ => Continuation::Boundary,
        }
    }

    fn finish(&mut self, ctx: &ParseContext) -> Option<ErrorRecord> {
        let (kind, acc) = self.state.take()?;
        let truncated = acc.is_truncated();
        let trace = (acc.line_count() > 1).then(|| acc.stack_trace());
        let help = acc.help().to_vec();
        let has_notes = !acc.notes().is_empty() || !help.is_empty();
        let head = acc.head;
        let message = head.message.unwrap_or_default();

        let builder = match kind {
            BlockKind::Panic { test } => {
                let category = if test { Category::Test } else { Category::Runtime };
                ErrorRecord::builder(message, Severity::Error, category, Source::Rustc)
            }
            BlockKind::Cargo => {
                ErrorRecord::builder(message, Severity::Error, Category::Dependency, Source::Cargo)
            }
            BlockKind::Diagnostic => {
                let code = head.code.as_deref();
                let is_error_code = code.map(|c| ERROR_CODE.is_match(c)).unwrap_or(false);
                let lint = code.filter(|_| !is_error_code);
                let mut severity = head.severity.unwrap_or(Severity::Error);

                let (category, source) = if let Some(lint) = lint {
                    if ESCALATED_LINTS.contains(lint) {
                        severity = Severity::Error;
                    }
                    let source = if lint.starts_with("clippy::") {
                        Source::Clippy
                    } else {
                        Source::Rustc
                    };
                    if is_docs_lint(lint) {
                        (Category::Docs, source)
                    } else {
                        (Category::Lint, source)
                    }
                } else if let Some(category) = code.and_then(|c| CODE_CATEGORIES.get(c)) {
                    (*category, Source::Rustc)
                } else if is_error_code || head.file.is_some() || has_notes {
                    (Category::Compile, Source::Rustc)
                } else if severity == Severity::Warning {
                    // `warning:` is too common across tools to report without evidence
                    return None;
                } else {
                    // a bare `error: ...` with nothing rustc-specific around it
                    tracing::debug!(message = %message, "unrecognized error shape");
                    return Some(
                        ErrorRecord::builder(message, severity, Category::Unknown, Source::Generic)
                            .stack_trace(trace, truncated)
                            .unknown_pattern()
                            .build(ctx),
                    );
                };
                ErrorRecord::builder(message, severity, category, source)
            }
        };

        Some(
            builder
                .file(head.file)
                .location(head.line, head.column)
                .rule_id(head.code)
                .stack_trace(trace, truncated)
                .suggestions(help)
                .build(ctx),
        )
    }

    fn reset(&mut self) {
        self.state.reset();
    }
}

/// Force compilation of this module's static patterns.
pub(crate) fn initialize_patterns() {
    lazy_static::initialize(&HEADER);
    lazy_static::initialize(&PANIC);
    lazy_static::initialize(&TEST_FAILED);
    lazy_static::initialize(&LOCATION);
    lazy_static::initialize(&SECONDARY_LOCATION);
    lazy_static::initialize(&GUTTER);
    lazy_static::initialize(&ELLIPSIS);
    lazy_static::initialize(&NOTE);
    lazy_static::initialize(&LINT_ATTR);
    lazy_static::initialize(&CLIPPY_URL);
    lazy_static::initialize(&ERROR_CODE);
    lazy_static::initialize(&DEPENDENCY_MESSAGE);
    lazy_static::initialize(&NOISE);
}
