//! Go compiler, `go test`, golangci-lint and runtime panic output.

use lazy_static::lazy_static;
use phf::phf_map;
use regex::Regex;

use crate::context::ParseContext;
use crate::noise::{self, NoiseTable};
use crate::parser::{
    cap, cap_str, lookup_prefix, priority, Accumulator, AccumulatorLimits, Continuation,
    Extraction, HeadFields, MultiLine, Probe, ToolParser,
};
use crate::record::{parse_number, Category, ErrorRecord, Severity, Source};

const FORM_COMPILE: &str = "compile";
const FORM_LINTER: &str = "golangci";
const FORM_TEST_LOG: &str = "test-log";
const FORM_TEST_FAIL: &str = "test-fail";
const FORM_PANIC: &str = "panic";
const FORM_FATAL: &str = "fatal";
const FORM_MODULE: &str = "module";

lazy_static! {
    static ref LOCATION: Regex = Regex::new(
        r"^((?:\.{1,2}/)?[^\s:][^:]{0,500}\.go):(\d{1,7})(?::(\d{1,7}))?: (.{1,2000})$"
    ).unwrap();

    /// Trailing `(linter)` or `(SA1019)` annotation.
    static ref TRAILER: Regex = Regex::new(r" \(([A-Za-z][0-9A-Za-z_\-]{0,50})\)$").unwrap();

    static ref LEADING_CODE: Regex = Regex::new(r"^([A-Z]{1,3}\d{3,4}): ").unwrap();

    static ref CODE_SHAPE: Regex = Regex::new(r"^[A-Z]{1,3}\d{3,4}$").unwrap();

    static ref TEST_LOG: Regex = Regex::new(
        r"^\s{1,16}([0-9A-Za-z_\-./]{1,300}_test\.go):(\d{1,7}): (.{0,2000})$"
    ).unwrap();

    static ref TEST_FAIL: Regex =
        Regex::new(r"^--- FAIL: ([0-9A-Za-z_/\-.#]{1,300})(?: \(\d{1,6}(?:\.\d{1,4})?s\))?$").unwrap();

    static ref TEST_PASS: Regex = Regex::new(r"^--- (?:PASS|SKIP): ").unwrap();

    static ref PANIC: Regex = Regex::new(r"^panic: (.{1,2000})$").unwrap();

    static ref FATAL: Regex = Regex::new(r"^fatal error: (.{1,2000})$").unwrap();

    /// Module resolution failures; other `go:` lines are progress chatter.
    static ref MODULE: Regex = Regex::new(
        r"^go: (.{0,500}(?:missing go\.sum entry|unknown revision|cannot find module providing package|no required module provides package|updates to go\.mod needed|invalid version|ambiguous import|requires go >=|checksum mismatch|errors parsing go\.mod|malformed module path).{0,1500})$"
    ).unwrap();

    static ref GOROUTINE: Regex = Regex::new(r"^goroutine \d{1,10} \[").unwrap();

    static ref FRAME_LOCATION: Regex = Regex::new(
        r"^\s{1,8}([^\s:][^:]{0,500}\.go):(\d{1,7})(?: \+0x[0-9a-f]{1,16})?$"
    ).unwrap();

    static ref FRAME_CALL: Regex = Regex::new(
        r"^(?:created by \S{1,500}(?: in goroutine \d{1,10})?|\S{1,500}\(.{0,1000}\))$"
    ).unwrap();

    pub(crate) static ref NOISE: NoiseTable = NoiseTable::new(
        &[
            "=== run",
            "=== pause",
            "=== cont",
            "=== name",
            "--- pass",
            "--- skip",
            "ok  ",
            "ok\t",
            "?   ",
            "go: downloading",
            "go: finding",
            "go: extracting",
            "go: added ",
            "go: upgraded ",
            "go: found ",
            "go: creating new go.mod",
            "go: to add module requirements",
            "coverage: ",
            "exit status ",
            "level=info",
            "level=debug",
        ],
        &["[no test files]", "0 issues."],
        &[
            r"^PASS$",
            r"^FAIL$",
            r"^FAIL\s{1,8}\S{1,300}(?:\s{1,8}(?:\d{1,6}\.\d{1,4}s|\[[0-9A-Za-z_ ]{1,40}\]))?$",
            r"^# [0-9A-Za-z_.\-/]{1,300}(?: \[[0-9A-Za-z_.\-/ ]{1,300}\])?$",
            r"^\d{1,6} issues?:?$",
        ],
    );
}

/// golangci-lint linters and the severity their findings carry.
static LINTER_SEVERITY: phf::Map<&'static str, Severity> = phf_map! {
    "typecheck" => Severity::Error,
    "govet" => Severity::Error,
    "staticcheck" => Severity::Error,
    "errcheck" => Severity::Error,
    "gosec" => Severity::Error,
    "bodyclose" => Severity::Error,
    "sqlclosecheck" => Severity::Error,
    "ineffassign" => Severity::Warning,
    "unused" => Severity::Warning,
    "gosimple" => Severity::Warning,
    "stylecheck" => Severity::Warning,
    "revive" => Severity::Warning,
    "gofmt" => Severity::Warning,
    "gofumpt" => Severity::Warning,
    "goimports" => Severity::Warning,
    "misspell" => Severity::Warning,
    "godot" => Severity::Warning,
    "lll" => Severity::Warning,
    "gocyclo" => Severity::Warning,
    "gocognit" => Severity::Warning,
    "dupl" => Severity::Warning,
    "goconst" => Severity::Warning,
    "unparam" => Severity::Warning,
    "prealloc" => Severity::Warning,
    "nakedret" => Severity::Warning,
    "whitespace" => Severity::Warning,
};

/// staticcheck / gosec code prefixes.
static CODE_SEVERITY: phf::Map<&'static str, Severity> = phf_map! {
    "SA" => Severity::Error,
    "S1" => Severity::Warning,
    "ST" => Severity::Warning,
    "QF" => Severity::Warning,
    "U1" => Severity::Warning,
    "G" => Severity::Error,
};

fn linter_category(linter: &str, code: Option<&str>) -> Category {
    if code.map(|c| c.starts_with('G')).unwrap_or(false) {
        return Category::Security;
    }
    match linter {
        "typecheck" => Category::Compile,
        "gosec" => Category::Security,
        "godot" => Category::Docs,
        "depguard" | "gomoddirectives" | "gomodguard" => Category::Dependency,
        _ => Category::Lint,
    }
}

/// What kind of block is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GoBlock {
    /// `panic:` or `fatal error:` with its goroutine dump.
    Crash { goroutines: bool },
    /// `go test -v` log lines printed before the test's verdict. A passing
    /// verdict discards them.
    TestLog { passed: bool },
    /// `--- FAIL:` and its indented test log.
    TestFailure,
}

/// Parser for Go toolchain output.
#[derive(Debug, Default)]
pub struct GoParser {
    state: MultiLine<GoBlock>,
    limits: AccumulatorLimits,
}

impl GoParser {
    pub fn new(limits: AccumulatorLimits) -> Self {
        Self {
            state: MultiLine::Idle,
            limits,
        }
    }

    fn is_header(line: &str) -> bool {
        PANIC.is_match(line) || FATAL.is_match(line) || TEST_FAIL.is_match(line)
    }
}

fn continue_crash(goroutines: &mut bool, acc: &mut Accumulator, line: &str) -> Continuation {
    if line.trim().is_empty() {
        // the runtime separates the panic message from the first goroutine
        return if *goroutines {
            Continuation::Completed
        } else {
            Continuation::Consumed
        };
    }
    if GOROUTINE.is_match(line) {
        *goroutines = true;
        acc.push(line);
        return Continuation::Consumed;
    }
    if let Some(c) = FRAME_LOCATION.captures(line) {
        if acc.head.file.is_none() {
            acc.head.file = cap(&c, 1);
            acc.head.line = parse_number(cap_str(&c, 2));
        }
        acc.push(line);
        return Continuation::Consumed;
    }
    if line.starts_with("[signal ") || line.starts_with(char::is_whitespace) {
        acc.push(line);
        return Continuation::Consumed;
    }
    if *goroutines && FRAME_CALL.is_match(line) && !noise::is_shared_noise(line) {
        acc.push(line);
        return Continuation::Consumed;
    }
    Continuation::Boundary
}

fn continue_test(acc: &mut Accumulator, line: &str) -> Continuation {
    if line.trim().is_empty() {
        return Continuation::Completed;
    }
    if !line.starts_with(char::is_whitespace) {
        return Continuation::Boundary;
    }
    if let Some(c) = TEST_LOG.captures(line) {
        if acc.head.file.is_none() {
            acc.head.file = cap(&c, 1);
            acc.head.line = parse_number(cap_str(&c, 2));
            acc.head.message = cap(&c, 3).filter(|m| !m.trim().is_empty());
        }
    }
    acc.push(line);
    Continuation::Consumed
}

impl ToolParser for GoParser {
    fn id(&self) -> &'static str {
        "go"
    }

    fn priority(&self) -> i32 {
        priority::GO
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

        if let Some(c) = TEST_LOG.captures(line) {
            let fields = HeadFields {
                file: cap(&c, 1),
                line: parse_number(cap_str(&c, 2)),
                message: cap(&c, 3),
                severity: Some(Severity::Error),
                ..HeadFields::default()
            };
            return Some(Probe::new(0.8, FORM_TEST_LOG, fields));
        }

        if let Some(c) = LOCATION.captures(line) {
            let message = cap_str(&c, 4).unwrap_or_default();
            let mut fields = HeadFields {
                file: cap(&c, 1),
                line: parse_number(cap_str(&c, 2)),
                column: parse_number(cap_str(&c, 3)),
                ..HeadFields::default()
            };

            if let Some(t) = TRAILER.captures(message) {
                let tag = cap_str(&t, 1).unwrap_or_default();
                let body = &message[..t.get(0).map(|m| m.start()).unwrap_or(message.len())];
                fields.message = Some(body.to_string());
                fields.code = Some(tag.to_string());
                return Some(Probe::new(0.92, FORM_LINTER, fields));
            }

            fields.message = Some(message.to_string());
            return Some(Probe::new(0.9, FORM_COMPILE, fields));
        }

        if let Some(c) = TEST_FAIL.captures(line) {
            let fields = HeadFields {
                code: cap(&c, 1),
                severity: Some(Severity::Error),
                ..HeadFields::default()
            };
            return Some(Probe::new(0.9, FORM_TEST_FAIL, fields));
        }

        if let Some(c) = PANIC.captures(line) {
            let fields = HeadFields {
                message: cap(&c, 1),
                severity: Some(Severity::Error),
                ..HeadFields::default()
            };
            return Some(Probe::new(0.9, FORM_PANIC, fields));
        }

        if let Some(c) = FATAL.captures(line) {
            let fields = HeadFields {
                message: cap(&c, 1),
                severity: Some(Severity::Error),
                ..HeadFields::default()
            };
            return Some(Probe::new(0.85, FORM_FATAL, fields));
        }

        MODULE.captures(line).map(|c| {
            let fields = HeadFields {
                message: cap(&c, 1),
                severity: Some(Severity::Error),
                ..HeadFields::default()
            };
            Probe::new(0.7, FORM_MODULE, fields)
        })
    }

    fn extract(&mut self, line: &str, probe: Probe, ctx: &mut ParseContext) -> Extraction {
        let line = line.trim_end();
        let HeadFields {
            file,
            line: line_no,
            column,
            code,
            message,
            ..
        } = probe.fields.clone();
        let message_text = message.unwrap_or_default();

        let builder = match probe.form {
            FORM_PANIC | FORM_FATAL => {
                let acc = Accumulator::new(line, probe.fields, self.limits);
                self.state.begin(GoBlock::Crash { goroutines: false }, acc);
                return Extraction::Pending;
            }
            FORM_TEST_FAIL => {
                let acc = Accumulator::new(line, probe.fields, self.limits);
                self.state.begin(GoBlock::TestFailure, acc);
                return Extraction::Pending;
            }
            FORM_TEST_LOG => {
                let acc = Accumulator::new(line, probe.fields, self.limits);
                self.state.begin(GoBlock::TestLog { passed: false }, acc);
                return Extraction::Pending;
            }
            FORM_MODULE => ErrorRecord::builder(
                message_text,
                Severity::Error,
                Category::Dependency,
                Source::Go,
            )
            .suggestion("Run `go mod tidy` and commit go.mod and go.sum"),
            FORM_LINTER => {
                let tag = code.unwrap_or_default();
                let (linter, code) = if CODE_SHAPE.is_match(&tag) {
                    ("staticcheck".to_string(), Some(tag))
                } else {
                    let leading = LEADING_CODE.captures(&message_text).and_then(|c| cap(&c, 1));
                    (tag, leading)
                };
                let severity = code
                    .as_deref()
                    .and_then(|c| lookup_prefix(&CODE_SEVERITY, c))
                    .or_else(|| LINTER_SEVERITY.get(linter.as_str()).copied())
                    .unwrap_or(Severity::Error);
                let category = linter_category(&linter, code.as_deref());
                ErrorRecord::builder(message_text, severity, category, Source::GolangciLint)
                    .file(file)
                    .location(line_no, column)
                    .rule_id(Some(code.unwrap_or(linter)))
            }
            _ => ErrorRecord::builder(message_text, Severity::Error, Category::Compile, Source::Go)
                .file(file)
                .location(line_no, column),
        };

        Extraction::Record(builder.build(ctx))
    }

    fn continue_block(&mut self, line: &str, _ctx: &ParseContext) -> Continuation {
        let Some((kind, acc)) = self.state.get_mut() else {
            return Continuation::Boundary;
        };
        let line = line.trim_end();

        if matches!(kind, GoBlock::TestLog { .. }) {
            if let Some(c) = TEST_FAIL.captures(line) {
                acc.head.code = cap(&c, 1);
                acc.push(line);
                *kind = GoBlock::TestFailure;
                return Continuation::Consumed;
            }
            if TEST_PASS.is_match(line) {
                *kind = GoBlock::TestLog { passed: true };
                return Continuation::Completed;
            }
        }
        if Self::is_header(line) || NOISE.is_noise(line) {
            return Continuation::Boundary;
        }
        match kind {
            GoBlock::Crash { goroutines } => continue_crash(goroutines, acc, line),
            GoBlock::TestLog { .. } | GoBlock::TestFailure => continue_test(acc, line),
        }
    }

    fn finish(&mut self, ctx: &ParseContext) -> Option<ErrorRecord> {
        let (kind, acc) = self.state.take()?;
        let truncated = acc.is_truncated();
        let trace = acc.stack_trace();
        let head = acc.head;

        let builder = match kind {
            GoBlock::Crash { .. } => ErrorRecord::builder(
                head.message.unwrap_or_default(),
                Severity::Error,
                Category::Runtime,
                Source::Go,
            ),
            GoBlock::TestLog { passed: true } => return None,
            GoBlock::TestLog { passed: false } => ErrorRecord::builder(
                head.message.unwrap_or_default(),
                Severity::Error,
                Category::Test,
                Source::GoTest,
            ),
            GoBlock::TestFailure => {
                let name = head.code.clone().unwrap_or_default();
                let message = head
                    .message
                    .unwrap_or_else(|| format!("{} failed", name));
                ErrorRecord::builder(message, Severity::Error, Category::Test, Source::GoTest)
            }
        };

        Some(
            builder
                .file(head.file)
                .location(head.line, head.column)
                .rule_id(head.code)
                .stack_trace(Some(trace), truncated)
                .build(ctx),
        )
    }

    fn reset(&mut self) {
        self.state.reset();
    }
}

/// Force compilation of this module's static patterns.
pub(crate) fn initialize_patterns() {
    lazy_static::initialize(&LOCATION);
    lazy_static::initialize(&TRAILER);
    lazy_static::initialize(&LEADING_CODE);
    lazy_static::initialize(&CODE_SHAPE);
    lazy_static::initialize(&TEST_LOG);
    lazy_static::initialize(&TEST_FAIL);
    lazy_static::initialize(&TEST_PASS);
    lazy_static::initialize(&PANIC);
    lazy_static::initialize(&FATAL);
    lazy_static::initialize(&MODULE);
    lazy_static::initialize(&GOROUTINE);
    lazy_static::initialize(&FRAME_LOCATION);
    lazy_static::initialize(&FRAME_CALL);
    lazy_static::initialize(&NOISE);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(lines: &[&str]) -> Vec<ErrorRecord> {
        let mut parser = GoParser::new(AccumulatorLimits::default());
        let mut ctx = ParseContext::new();
        let mut out = Vec::new();

        for line in lines {
            if parser.is_accumulating() {
                match parser.continue_block(line, &ctx) {
                    Continuation::Consumed => continue,
                    Continuation::Completed => {
                        out.extend(parser.finish(&ctx));
                        continue;
                    }
                    Continuation::Boundary => out.extend(parser.finish(&ctx)),
                }
            }
            if parser.is_noise(line) {
                continue;
            }
            if let Some(probe) = parser.probe(line, &ctx) {
                if let Extraction::Record(r) = parser.extract(line, probe, &mut ctx) {
                    out.push(r);
                }
            }
        }
        out.extend(parser.finish(&ctx));
        out
    }

    #[test]
    fn test_compile_error() {
        let records = run(&["./main.go:12:5: undefined: foo"]);
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.file(), Some("./main.go"));
        assert_eq!(r.line(), Some(12));
        assert_eq!(r.column(), Some(5));
        assert_eq!(r.category(), Category::Compile);
        assert_eq!(r.message(), "undefined: foo");
    }

    #[test]
    fn test_golangci_linter_severity() {
        let records = run(&[
            "pkg/a.go:3:2: ineffectual assignment to err (ineffassign)",
            "pkg/b.go:9:1: Error return value of `f.Close` is not checked (errcheck)",
            "pkg/c.go:4:8: G101: Potential hardcoded credentials (gosec)",
        ]);
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].severity(), Severity::Warning);
        assert_eq!(records[0].rule_id(), Some("ineffassign"));
        assert_eq!(records[0].message(), "ineffectual assignment to err");
        assert_eq!(records[1].severity(), Severity::Error);
        assert_eq!(records[2].category(), Category::Security);
        assert_eq!(records[2].rule_id(), Some("G101"));
    }

    #[test]
    fn test_staticcheck_code_trailer() {
        let records =
            run(&["main.go:5:2: strings.Title has been deprecated since Go 1.18 (SA1019)"]);
        assert_eq!(records[0].rule_id(), Some("SA1019"));
        assert_eq!(records[0].severity(), Severity::Error);
        assert_eq!(records[0].category(), Category::Lint);
    }

    #[test]
    fn test_panic_stack() {
        let lines = [
            "panic: runtime error: index out of range [5] with length 3",
            "goroutine 1 [running]:",
            "main.main()",
            "\t/app/main.go:8 +0x1d",
            "",
        ];
        let records = run(&lines);
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.category(), Category::Runtime);
        assert_eq!(r.file(), Some("/app/main.go"));
        assert_eq!(r.line(), Some(8));
        assert!(!r.column_known());
        assert_eq!(r.stack_trace(), Some(lines[..4].join("\n").as_str()));
    }

    #[test]
    fn test_panic_blank_before_goroutine() {
        let records = run(&[
            "panic: boom",
            "",
            "goroutine 1 [running]:",
            "main.main()",
            "\t/app/main.go:8 +0x1d",
            "exit status 2",
        ]);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].line(), Some(8));
    }

    #[test]
    fn test_fatal_error_deadlock() {
        let records = run(&[
            "fatal error: all goroutines are asleep - deadlock!",
            "",
            "goroutine 1 [chan receive]:",
            "main.main()",
            "\t/app/main.go:5 +0x2c",
        ]);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message(), "all goroutines are asleep - deadlock!");
    }

    #[test]
    fn test_failed_test_block() {
        let records = run(&[
            "--- FAIL: TestAdd (0.00s)",
            "    math_test.go:15: expected 4, got 5",
            "FAIL",
            "FAIL\texample.com/math\t0.005s",
        ]);
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.category(), Category::Test);
        assert_eq!(r.rule_id(), Some("TestAdd"));
        assert_eq!(r.file(), Some("math_test.go"));
        assert_eq!(r.line(), Some(15));
        assert_eq!(r.message(), "expected 4, got 5");
    }

    #[test]
    fn test_verbose_log_is_adopted_by_verdict() {
        let records = run(&[
            "=== RUN   TestParse",
            "    parse_test.go:21: expected 3 items, got 2",
            "--- FAIL: TestParse (0.00s)",
            "FAIL",
        ]);
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.rule_id(), Some("TestParse"));
        assert_eq!(r.message(), "expected 3 items, got 2");
        assert_eq!(r.file(), Some("parse_test.go"));
        assert_eq!(r.line(), Some(21));
    }

    #[test]
    fn test_verbose_log_of_passing_test_is_dropped() {
        let records = run(&[
            "=== RUN   TestDecode",
            "    decode_test.go:8: decoded 3 records",
            "--- PASS: TestDecode (0.00s)",
            "PASS",
        ]);
        assert!(records.is_empty());
    }

    #[test]
    fn test_orphan_test_log_is_still_reported() {
        let records = run(&["    store_test.go:40: connection refused"]);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].category(), Category::Test);
        assert_eq!(records[0].file(), Some("store_test.go"));
        assert_eq!(records[0].rule_id(), None);
    }

    #[test]
    fn test_module_init_output_is_quiet() {
        let records = run(&[
            "go: creating new go.mod: module example.com/m",
            "go: to add module requirements and sums:",
            "\tgo mod tidy",
            "go: example.com/m imports rsc.io/quote: ambiguous import: found package in multiple modules",
        ]);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].category(), Category::Dependency);
        assert!(records[0].message().contains("ambiguous import"));
    }

    #[test]
    fn test_module_error_is_dependency() {
        let records = run(&["go: example.com/x@v1.2.3: missing go.sum entry for go.mod file"]);
        assert_eq!(records[0].category(), Category::Dependency);
        assert!(!records[0].suggestions().is_empty());
    }

    #[test]
    fn test_noise_corpus() {
        let parser = GoParser::new(AccumulatorLimits::default());
        let ctx = ParseContext::new();
        for line in [
            "=== RUN   TestAdd",
            "--- PASS: TestAdd (0.00s)",
            "PASS",
            "ok  \texample.com/math\t0.005s",
            "?   \texample.com/cmd\t[no test files]",
            "go: downloading github.com/stretchr/testify v1.8.4",
            "go: creating new go.mod: module example.com/m",
            "go: to add module requirements and sums:",
            "# example.com/math",
            "coverage: 81.2% of statements",
            "0 issues.",
            "level=info msg=\"[runner] linters took 1.2s\"",
        ] {
            assert!(
                parser.is_noise(line) || parser.probe(line, &ctx).is_none(),
                "{:?}",
                line
            );
        }
    }
}
