//! Python tracebacks and the common Python tooling formats.
//!
//! - `Traceback (most recent call last):` blocks, ending at the exception line
//! - pytest `FAILED` / `ERROR` summary lines and `file.py:N: ExcType` locations
//! - mypy: `file.py:N: error: message  [code]`
//! - ruff / flake8: `file.py:N:C: F401 message`
//! - pylint: `file.py:N:C: C0114: message (missing-module-docstring)`

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

const FORM_TRACEBACK: &str = "traceback";
const FORM_PYTEST_SUMMARY: &str = "pytest-summary";
const FORM_PYTEST_LOCATION: &str = "pytest-location";
const FORM_MYPY: &str = "mypy";
const FORM_RUFF: &str = "ruff";
const FORM_PYLINT: &str = "pylint";

lazy_static! {
    static ref TRACEBACK: Regex =
        Regex::new(r"^Traceback \(most recent call last\):$").unwrap();

    static ref FRAME: Regex = Regex::new(
        r#"^\s{1,8}File "([^"]{1,500})", line (\d{1,7})(?:, in .{1,300})?$"#
    ).unwrap();

    static ref EXCEPTION: Regex =
        Regex::new(r"^([A-Za-z_][0-9A-Za-z_.]{0,200})(?:: (.{0,2000}))?$").unwrap();

    static ref PYTEST_SUMMARY: Regex = Regex::new(
        r"^(FAILED|ERROR) ([^\s:]{1,500}\.py)(?:::(\S{1,500}?))?(?: - (.{1,2000}))?$"
    ).unwrap();

    static ref PYTEST_LOCATION: Regex = Regex::new(
        r"^([^\s:][^:]{0,500}\.py):(\d{1,7}): ([A-Za-z_][0-9A-Za-z_.]{0,200})$"
    ).unwrap();

    static ref MYPY: Regex = Regex::new(
        r"^([^\s:][^:]{0,500}\.pyi?):(\d{1,7})(?::(\d{1,7}))?: (error|warning|note): (.{1,2000}?)(?:  \[([0-9A-Za-z_\-]{1,100})\])?$"
    ).unwrap();

    static ref RUFF: Regex = Regex::new(
        r"^([^\s:][^:]{0,500}\.pyi?):(\d{1,7}):(\d{1,7}): ([A-Z]{1,4}\d{1,4}) (?:\[\*\] )?(.{1,2000})$"
    ).unwrap();

    static ref PYLINT: Regex = Regex::new(
        r"^([^\s:][^:]{0,500}\.py):(\d{1,7}):(\d{1,7}): ([CRWEFI]\d{4}): (.{1,2000}?)(?: \(([0-9A-Za-z_\-]{1,100})\))?$"
    ).unwrap();

    pub(crate) static ref NOISE: NoiseTable = NoiseTable::new(
        &[
            "collecting ",
            "collected ",
            "platform ",
            "rootdir:",
            "plugins:",
            "cachedir:",
            "configfile:",
            "testpaths:",
            "success: no issues found",
            "requirement already satisfied",
            "your code has been rated at 10",
            "************* module ",
            "during handling of the above exception",
            "the above exception was the direct cause",
            "[*] ",
        ],
        &[" passed in ", "no issues found"],
        &[
            // session banners and result footers
            r"^={2,100} .{1,300} ={2,100}$",
            r"^_{2,100} .{1,300} _{2,100}$",
            // progress dots: tests/test_a.py ..F.  [ 50%]
            r"^(?:[0-9A-Za-z_/.\-]{1,500}\.py )?[.sxXFE]{1,500}\s{0,200}(?:\[\s{0,3}\d{1,3}%\])?$",
            r"(?i)^found \d{1,6} errors? in \d{1,6} files?",
            r"^Found \d{1,6} errors?\.",
            r"^-{2,100}$",
        ],
    );
}

/// ruff / flake8 code prefixes; the longest matching prefix wins.
static RUFF_SEVERITY: phf::Map<&'static str, Severity> = phf_map! {
    "E" => Severity::Warning,
    "E9" => Severity::Error,
    "W" => Severity::Warning,
    "F" => Severity::Error,
    "F401" => Severity::Warning,
    "F841" => Severity::Warning,
    "C" => Severity::Warning,
    "I" => Severity::Warning,
    "N" => Severity::Warning,
    "D" => Severity::Warning,
    "B" => Severity::Warning,
    "UP" => Severity::Warning,
    "SIM" => Severity::Warning,
    "S" => Severity::Error,
    "PLE" => Severity::Error,
    "PLW" => Severity::Warning,
    "PLC" => Severity::Warning,
    "PLR" => Severity::Warning,
    "ANN" => Severity::Warning,
};

/// pylint message letters.
static PYLINT_SEVERITY: phf::Map<&'static str, Severity> = phf_map! {
    "C" => Severity::Warning,
    "R" => Severity::Warning,
    "W" => Severity::Warning,
    "I" => Severity::Warning,
    "E" => Severity::Error,
    "F" => Severity::Error,
};

/// Exception types with a category other than `runtime`.
static EXCEPTION_CATEGORIES: phf::Map<&'static str, Category> = phf_map! {
    "SyntaxError" => Category::Compile,
    "IndentationError" => Category::Compile,
    "TabError" => Category::Compile,
    "ImportError" => Category::Dependency,
    "ModuleNotFoundError" => Category::Dependency,
};

/// Category for an exception type, ignoring any module qualification.
pub fn exception_category(exc: &str) -> Category {
    let short = exc.rsplit('.').next().unwrap_or(exc);
    EXCEPTION_CATEGORIES
        .get(short)
        .copied()
        .unwrap_or(Category::Runtime)
}

fn ruff_category(code: &str) -> Category {
    if code.starts_with("E9") {
        Category::Compile
    } else if code.starts_with('D') {
        Category::Docs
    } else if code.starts_with('S') && !code.starts_with("SIM") {
        Category::Security
    } else {
        Category::Lint
    }
}

fn pylint_category(code: &str, symbol: Option<&str>) -> Category {
    match (code, symbol) {
        ("E0401", _) | (_, Some("import-error")) => Category::Dependency,
        (_, Some(s)) if s.ends_with("-docstring") => Category::Docs,
        ("E0001", _) => Category::Compile,
        _ => Category::Lint,
    }
}

const MISSING_MODULE_HINT: &str = "Install the missing module or add it to the project's requirements";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PyBlock {
    Traceback,
}

/// Parser for Python output.
#[derive(Debug, Default)]
pub struct PythonParser {
    state: MultiLine<PyBlock>,
    limits: AccumulatorLimits,
}

impl PythonParser {
    pub fn new(limits: AccumulatorLimits) -> Self {
        Self {
            state: MultiLine::Idle,
            limits,
        }
    }

    fn is_header(line: &str) -> bool {
        TRACEBACK.is_match(line) || PYTEST_SUMMARY.is_match(line)
    }
}

impl ToolParser for PythonParser {
    fn id(&self) -> &'static str {
        "python"
    }

    fn priority(&self) -> i32 {
        priority::PYTHON
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

        if TRACEBACK.is_match(line) {
            return Some(Probe::new(0.95, FORM_TRACEBACK, HeadFields::default()));
        }

        if let Some(c) = PYTEST_SUMMARY.captures(line) {
            let fields = HeadFields {
                severity: Some(Severity::Error),
                file: cap(&c, 2),
                code: match (cap_str(&c, 2), cap_str(&c, 3)) {
                    (Some(file), Some(test)) => Some(format!("{}::{}", file, test)),
                    (file, None) => file.map(str::to_string),
                    _ => None,
                },
                message: cap(&c, 4),
                ..HeadFields::default()
            };
            return Some(Probe::new(0.9, FORM_PYTEST_SUMMARY, fields));
        }

        if let Some(c) = PYLINT.captures(line) {
            let fields = HeadFields {
                file: cap(&c, 1),
                line: parse_number(cap_str(&c, 2)),
                column: parse_number(cap_str(&c, 3)),
                code: cap(&c, 4),
                message: cap(&c, 5),
                detail: cap(&c, 6),
                severity: None,
            };
            return Some(Probe::new(0.92, FORM_PYLINT, fields));
        }

        if let Some(c) = RUFF.captures(line) {
            let fields = HeadFields {
                file: cap(&c, 1),
                line: parse_number(cap_str(&c, 2)),
                column: parse_number(cap_str(&c, 3)),
                code: cap(&c, 4),
                message: cap(&c, 5),
                ..HeadFields::default()
            };
            return Some(Probe::new(0.9, FORM_RUFF, fields));
        }

        if let Some(c) = MYPY.captures(line) {
            // notes elaborate on the preceding error
            if cap_str(&c, 4) == Some("note") {
                return None;
            }
            let fields = HeadFields {
                file: cap(&c, 1),
                line: parse_number(cap_str(&c, 2)),
                column: parse_number(cap_str(&c, 3)),
                severity: cap_str(&c, 4).map(Severity::from_word),
                message: cap(&c, 5),
                code: cap(&c, 6),
                detail: None,
            };
            return Some(Probe::new(0.9, FORM_MYPY, fields));
        }

        PYTEST_LOCATION.captures(line).map(|c| {
            let fields = HeadFields {
                file: cap(&c, 1),
                line: parse_number(cap_str(&c, 2)),
                code: cap(&c, 3),
                severity: Some(Severity::Error),
                ..HeadFields::default()
            };
            Probe::new(0.8, FORM_PYTEST_LOCATION, fields)
        })
    }

    fn extract(&mut self, line: &str, probe: Probe, ctx: &mut ParseContext) -> Extraction {
        if probe.form == FORM_TRACEBACK {
            let acc = Accumulator::new(line.trim_end(), probe.fields, self.limits);
            self.state.begin(PyBlock::Traceback, acc);
            return Extraction::Pending;
        }

        let HeadFields {
            file,
            line: line_no,
            column,
            severity,
            code,
            message,
            detail,
        } = probe.fields;
        let message = message.unwrap_or_default();

        let builder = match probe.form {
            FORM_PYTEST_SUMMARY => {
                let message = if message.is_empty() {
                    format!("{} failed", code.as_deref().unwrap_or("test"))
                } else {
                    message
                };
                let category = if message.contains("ModuleNotFoundError")
                    || message.contains("ImportError")
                {
                    Category::Dependency
                } else {
                    Category::Test
                };
                ErrorRecord::builder(message, Severity::Error, category, Source::Pytest)
            }
            FORM_PYTEST_LOCATION => {
                let exc = code.clone().unwrap_or_default();
                let category = match exception_category(&exc) {
                    Category::Runtime => Category::Test,
                    other => other,
                };
                ErrorRecord::builder(exc, Severity::Error, category, Source::Pytest)
            }
            FORM_MYPY => {
                let category = if code.as_deref().map(|c| c.starts_with("import")).unwrap_or(false)
                {
                    Category::Dependency
                } else {
                    Category::TypeCheck
                };
                ErrorRecord::builder(
                    message,
                    severity.unwrap_or(Severity::Error),
                    category,
                    Source::Mypy,
                )
            }
            FORM_RUFF => {
                let code_str = code.as_deref().unwrap_or_default();
                let severity = lookup_prefix(&RUFF_SEVERITY, code_str).unwrap_or(Severity::Error);
                ErrorRecord::builder(message, severity, ruff_category(code_str), Source::Ruff)
            }
            _ => {
                let code_str = code.as_deref().unwrap_or_default();
                let severity = lookup_prefix(&PYLINT_SEVERITY, code_str).unwrap_or(Severity::Error);
                let category = pylint_category(code_str, detail.as_deref());
                ErrorRecord::builder(message, severity, category, Source::Pylint)
            }
        };

        Extraction::Record(
            builder
                .file(file)
                .location(line_no, column)
                .rule_id(code)
                .build(ctx),
        )
    }

    fn continue_block(&mut self, line: &str, _ctx: &ParseContext) -> Continuation {
        let Some((_, acc)) = self.state.get_mut() else {
            return Continuation::Boundary;
        };
        let line = line.trim_end();

        if line.trim().is_empty() {
            return Continuation::Completed;
        }
        if let Some(c) = FRAME.captures(line) {
            // the innermost frame is reported last
            acc.head.file = cap(&c, 1);
            acc.head.line = parse_number(cap_str(&c, 2));
            acc.push(line);
            return Continuation::Consumed;
        }
        if line.starts_with(char::is_whitespace) {
            acc.push(line);
            return Continuation::Consumed;
        }
        if Self::is_header(line) || NOISE.is_noise(line) || noise::is_shared_noise(line) {
            return Continuation::Boundary;
        }
        if let Some(c) = EXCEPTION.captures(line) {
            acc.head.code = cap(&c, 1);
            acc.head.message = Some(line.to_string());
            acc.push(line);
            return Continuation::Completed;
        }
        Continuation::Boundary
    }

    fn finish(&mut self, ctx: &ParseContext) -> Option<ErrorRecord> {
        let (_, acc) = self.state.take()?;
        let truncated = acc.is_truncated();
        let trace = acc.stack_trace();
        let head = acc.head;

        let category = head
            .code
            .as_deref()
            .map(exception_category)
            .unwrap_or(Category::Runtime);
        let message = head
            .message
            .unwrap_or_else(|| "Traceback (most recent call last)".to_string());

        let mut builder = ErrorRecord::builder(message, Severity::Error, category, Source::Python)
            .file(head.file)
            .location(head.line, None)
            .rule_id(head.code)
            .stack_trace(Some(trace), truncated);
        if category == Category::Dependency {
            builder = builder.suggestion(MISSING_MODULE_HINT);
        }
        Some(builder.build(ctx))
    }

    fn reset(&mut self) {
        self.state.reset();
    }
}

/// Force compilation of this module's static patterns.
pub(crate) fn initialize_patterns() {
    lazy_static::initialize(&TRACEBACK);
    lazy_static::initialize(&FRAME);
    lazy_static::initialize(&EXCEPTION);
    lazy_static::initialize(&PYTEST_SUMMARY);
    lazy_static::initialize(&PYTEST_LOCATION);
    lazy_static::initialize(&MYPY);
    lazy_static::initialize(&RUFF);
    lazy_static::initialize(&PYLINT);
    lazy_static::initialize(&NOISE);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(lines: &[&str]) -> Vec<ErrorRecord> {
        let mut parser = PythonParser::new(AccumulatorLimits::default());
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
    fn test_traceback_uses_innermost_frame() {
        let lines = [
            "Traceback (most recent call last):",
            "  File \"/app/main.py\", line 10, in <module>",
            "    main()",
            "  File \"/app/util.py\", line 3, in main",
            "    int(\"x\")",
            "ValueError: invalid literal for int() with base 10: 'x'",
        ];
        let records = run(&lines);
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.file(), Some("/app/util.py"));
        assert_eq!(r.line(), Some(3));
        assert!(!r.column_known());
        assert_eq!(r.rule_id(), Some("ValueError"));
        assert_eq!(r.category(), Category::Runtime);
        assert_eq!(r.message(), lines[5]);
        assert_eq!(r.stack_trace(), Some(lines.join("\n").as_str()));
    }

    #[test]
    fn test_import_error_is_dependency() {
        let records = run(&[
            "Traceback (most recent call last):",
            "  File \"app.py\", line 1, in <module>",
            "    import requests",
            "ModuleNotFoundError: No module named 'requests'",
            "Error: Process completed with exit code 1.",
        ]);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].category(), Category::Dependency);
        assert!(!records[0].suggestions().is_empty());
    }

    #[test]
    fn test_syntax_error_is_compile() {
        let records = run(&[
            "Traceback (most recent call last):",
            "  File \"x.py\", line 3",
            "    def f(",
            "         ^",
            "SyntaxError: '(' was never closed",
        ]);
        assert_eq!(records[0].category(), Category::Compile);
    }

    #[test]
    fn test_truncated_traceback_still_terminates() {
        let mut parser = PythonParser::new(AccumulatorLimits {
            max_lines: 4,
            max_bytes: 1024,
        });
        let ctx = ParseContext::new();
        let header = "Traceback (most recent call last):";
        let probe = parser.probe(header, &ctx).unwrap();
        let mut ctx = ctx;
        assert_eq!(parser.extract(header, probe, &mut ctx), Extraction::Pending);

        for i in 0..50 {
            let frame = format!("  File \"m{}.py\", line {}, in f", i, i + 1);
            assert_eq!(parser.continue_block(&frame, &ctx), Continuation::Consumed);
        }
        assert_eq!(
            parser.continue_block("RuntimeError: deep", &ctx),
            Continuation::Completed
        );
        let r = parser.finish(&ctx).unwrap();
        assert!(r.stack_trace_truncated());
        assert_eq!(r.stack_trace().unwrap().lines().count(), 4);
        assert_eq!(r.line(), Some(50));
    }

    #[test]
    fn test_pytest_summary() {
        let records = run(&["FAILED tests/test_math.py::test_add - assert 1 == 2"]);
        let r = &records[0];
        assert_eq!(r.category(), Category::Test);
        assert_eq!(r.file(), Some("tests/test_math.py"));
        assert_eq!(r.rule_id(), Some("tests/test_math.py::test_add"));
        assert_eq!(r.message(), "assert 1 == 2");
    }

    #[test]
    fn test_pytest_location() {
        let records = run(&["tests/test_math.py:7: AssertionError"]);
        assert_eq!(records[0].line(), Some(7));
        assert_eq!(records[0].category(), Category::Test);
    }

    #[test]
    fn test_mypy() {
        let records = run(&[
            "src/app.py:12: error: Incompatible return value type (got \"int\", expected \"str\")  [return-value]",
            "src/app.py:12: note: See https://mypy.rtfd.io",
            "src/db.py:1: error: Library stubs not installed for \"yaml\"  [import-untyped]",
        ]);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].rule_id(), Some("return-value"));
        assert_eq!(records[0].category(), Category::TypeCheck);
        assert_eq!(records[1].category(), Category::Dependency);
    }

    #[test]
    fn test_ruff_prefix_table() {
        let records = run(&[
            "app.py:1:8: F401 [*] `os` imported but unused",
            "app.py:3:1: E999 SyntaxError: invalid syntax",
            "app.py:5:1: D103 Missing docstring in public function",
            "app.py:9:5: S105 Possible hardcoded password",
            "app.py:9:5: XYZ123 Some plugin rule",
        ]);
        assert_eq!(records[0].severity(), Severity::Warning);
        assert_eq!(records[0].message(), "`os` imported but unused");
        assert_eq!(records[1].category(), Category::Compile);
        assert_eq!(records[1].severity(), Severity::Error);
        assert_eq!(records[2].category(), Category::Docs);
        assert_eq!(records[3].category(), Category::Security);
        assert_eq!(records[4].severity(), Severity::Error);
    }

    #[test]
    fn test_pylint() {
        let records = run(&[
            "app.py:1:0: C0114: Missing module docstring (missing-module-docstring)",
            "app.py:2:0: E0401: Unable to import 'flask' (import-error)",
        ]);
        assert_eq!(records[0].severity(), Severity::Warning);
        assert_eq!(records[0].category(), Category::Docs);
        assert_eq!(records[0].rule_id(), Some("C0114"));
        assert_eq!(records[1].severity(), Severity::Error);
        assert_eq!(records[1].category(), Category::Dependency);
    }

    #[test]
    fn test_noise_corpus() {
        let parser = PythonParser::new(AccumulatorLimits::default());
        let ctx = ParseContext::new();
        for line in [
            "============================= test session starts ==============================",
            "platform linux -- Python 3.12.1, pytest-8.0.0, pluggy-1.4.0",
            "rootdir: /app",
            "collected 12 items",
            "tests/test_math.py ....                                                  [ 33%]",
            "============================== 12 passed in 0.21s ==============================",
            "Success: no issues found in 14 source files",
            "Your code has been rated at 10.00/10 (previous run: 9.80/10, +0.20)",
            "Requirement already satisfied: pip in /usr/lib/python3/dist-packages (23.0)",
            "Found 2 errors.",
        ] {
            assert!(
                parser.is_noise(line) || parser.probe(line, &ctx).is_none(),
                "{:?}",
                line
            );
        }
    }
}
