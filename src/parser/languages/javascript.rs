//! ESLint output in the stylish, compact and unix formats.
//!
//! Stylish output prints a file header line followed by indented rows:
//!
//! ```text
//! src/index.js
//!   8:11  error  'x' is never reassigned  prefer-const
//! ```
//!
//! The header only updates the context's last-known file; each row becomes
//! its own record and inherits that file.

use lazy_static::lazy_static;
use phf::phf_map;
use regex::Regex;

use crate::context::ParseContext;
use crate::noise::NoiseTable;
use crate::parser::{cap, priority, Extraction, HeadFields, Probe, ToolParser};
use crate::record::{parse_number, Category, ErrorRecord, Severity, Source};

const FORM_HEADER: &str = "file-header";
const FORM_ROW: &str = "stylish-row";
const FORM_COMPACT: &str = "compact";
const FORM_UNIX: &str = "unix";

lazy_static! {
    static ref FILE_HEADER: Regex = Regex::new(
        r"^((?:[A-Za-z]:)?[^\s:]{0,500}\.(?:js|jsx|mjs|cjs|ts|tsx|mts|cts|vue|svelte|astro))$"
    ).unwrap();

    static ref ROW_WITH_RULE: Regex = Regex::new(
        r"^\s{1,12}(\d{1,7}):(\d{1,7})\s{1,8}(error|warning)\s{1,8}(.{1,2000}?)\s{2,16}(@?[A-Za-z][0-9A-Za-z_\-./@]{0,200})$"
    ).unwrap();

    static ref ROW: Regex = Regex::new(
        r"^\s{1,12}(\d{1,7}):(\d{1,7})\s{1,8}(error|warning)\s{1,8}(.{1,2000})$"
    ).unwrap();

    static ref COMPACT: Regex = Regex::new(
        r"^([^\s:][^:]{0,500}): line (\d{1,7}), col (\d{1,7}), (Error|Warning) - (.{1,2000}?)(?: \((@?[A-Za-z][0-9A-Za-z_\-./@]{0,200})\))?$"
    ).unwrap();

    static ref UNIX: Regex = Regex::new(
        r"^([^\s:][^:]{0,500}):(\d{1,7}):(\d{1,7}): (.{1,2000}?) \[(Error|Warning)(?:/(@?[A-Za-z][0-9A-Za-z_\-./@]{0,200}))?\]$"
    ).unwrap();

    pub(crate) static ref NOISE: NoiseTable = NoiseTable::new(
        &["> eslint", "$ eslint", "eslint v", "npx eslint"],
        &["potentially fixable with the", "no eslint warnings or errors"],
        &[
            // summary footer; the rows were reported individually
            r"^[✖xX]\s{1,4}\d{1,6} problems? \(",
            r"(?i)^\d{1,6} problems? \(\d{1,6} errors?, \d{1,6} warnings?\)",
        ],
    );
}

/// Rules that map to something more specific than `lint`.
static RULE_CATEGORIES: phf::Map<&'static str, Category> = phf_map! {
    "no-eval" => Category::Security,
    "no-implied-eval" => Category::Security,
    "no-new-func" => Category::Security,
    "no-script-url" => Category::Security,
    "react/no-danger" => Category::Security,
    "react/no-danger-with-children" => Category::Security,
    "valid-jsdoc" => Category::Docs,
    "require-jsdoc" => Category::Docs,
    "import/no-unresolved" => Category::Dependency,
    "import/no-extraneous-dependencies" => Category::Dependency,
    "n/no-missing-import" => Category::Dependency,
    "n/no-missing-require" => Category::Dependency,
    "node/no-missing-import" => Category::Dependency,
    "node/no-missing-require" => Category::Dependency,
};

/// Category for an ESLint rule id (or for a rule-less message).
pub fn category_for_rule(rule: Option<&str>, message: &str) -> Category {
    let Some(rule) = rule else {
        if message.starts_with("Parsing error") {
            return Category::Compile;
        }
        return Category::Lint;
    };
    if let Some(category) = RULE_CATEGORIES.get(rule) {
        return *category;
    }
    if rule.starts_with("security/") || rule.starts_with("no-unsanitized/") {
        return Category::Security;
    }
    if rule.starts_with("jsdoc/") || rule.starts_with("tsdoc/") {
        return Category::Docs;
    }
    Category::Lint
}

/// Parser for ESLint reports.
#[derive(Debug, Default)]
pub struct EslintParser;

impl EslintParser {
    pub fn new() -> Self {
        Self
    }
}

fn row_fields(c: &regex::Captures<'_>, rule: Option<String>) -> HeadFields {
    HeadFields {
        file: None,
        line: parse_number(c.get(1).map(|m| m.as_str())),
        column: parse_number(c.get(2).map(|m| m.as_str())),
        severity: c.get(3).map(|m| Severity::from_word(m.as_str())),
        code: rule,
        message: c.get(4).map(|m| m.as_str().trim_end().to_string()),
        detail: None,
    }
}

impl ToolParser for EslintParser {
    fn id(&self) -> &'static str {
        "eslint"
    }

    fn priority(&self) -> i32 {
        priority::ESLINT
    }

    fn noise_table(&self) -> Option<&'static NoiseTable> {
        Some(&NOISE)
    }

    fn probe(&self, line: &str, ctx: &ParseContext) -> Option<Probe> {
        let trimmed = line.trim_end();

        if let Some(c) = ROW_WITH_RULE.captures(trimmed) {
            let fields = row_fields(&c, cap(&c, 5));
            return Some(row_probe(fields, ctx));
        }
        if let Some(c) = ROW.captures(trimmed) {
            let fields = row_fields(&c, None);
            return Some(row_probe(fields, ctx));
        }

        if let Some(c) = COMPACT.captures(trimmed) {
            let fields = HeadFields {
                file: cap(&c, 1),
                line: parse_number(c.get(2).map(|m| m.as_str())),
                column: parse_number(c.get(3).map(|m| m.as_str())),
                severity: c.get(4).map(|m| Severity::from_word(m.as_str())),
                message: cap(&c, 5),
                code: cap(&c, 6),
                detail: None,
            };
            return Some(Probe::new(0.9, FORM_COMPACT, fields));
        }

        if let Some(c) = UNIX.captures(trimmed) {
            let fields = HeadFields {
                file: cap(&c, 1),
                line: parse_number(c.get(2).map(|m| m.as_str())),
                column: parse_number(c.get(3).map(|m| m.as_str())),
                message: cap(&c, 4),
                severity: c.get(5).map(|m| Severity::from_word(m.as_str())),
                code: cap(&c, 6),
                detail: None,
            };
            return Some(Probe::new(0.9, FORM_UNIX, fields));
        }

        FILE_HEADER.captures(trimmed).map(|c| {
            let fields = HeadFields {
                file: cap(&c, 1),
                ..HeadFields::default()
            };
            Probe::new(0.5, FORM_HEADER, fields)
        })
    }

    fn extract(&mut self, _line: &str, probe: Probe, ctx: &mut ParseContext) -> Extraction {
        let HeadFields {
            file,
            line,
            column,
            severity,
            code,
            message,
            ..
        } = probe.fields;

        if probe.form == FORM_HEADER {
            if let Some(file) = file {
                ctx.set_last_file(file);
            }
            return Extraction::Consumed;
        }

        let file = file.or_else(|| ctx.last_file().map(str::to_string));
        let message = message.unwrap_or_default();
        let category = category_for_rule(code.as_deref(), &message);

        let record = ErrorRecord::builder(
            message,
            severity.unwrap_or(Severity::Error),
            category,
            Source::Eslint,
        )
        .file(file)
        .location(line, column)
        .rule_id(code)
        .build(ctx);

        Extraction::Record(record)
    }
}

/// Rows are far more trustworthy once a header has named their file.
fn row_probe(fields: HeadFields, ctx: &ParseContext) -> Probe {
    let confidence = if ctx.last_file().is_some() { 0.9 } else { 0.6 };
    Probe::new(confidence, FORM_ROW, fields)
}

/// Force compilation of this module's static patterns.
pub(crate) fn initialize_patterns() {
    lazy_static::initialize(&FILE_HEADER);
    lazy_static::initialize(&ROW_WITH_RULE);
    lazy_static::initialize(&ROW);
    lazy_static::initialize(&COMPACT);
    lazy_static::initialize(&UNIX);
    lazy_static::initialize(&NOISE);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(parser: &mut EslintParser, ctx: &mut ParseContext, line: &str) -> Option<Extraction> {
        let probe = parser.probe(line, ctx)?;
        Some(parser.extract(line, probe, ctx))
    }

    fn record(extraction: Option<Extraction>) -> ErrorRecord {
        match extraction {
            Some(Extraction::Record(r)) => r,
            other => panic!("expected a record, got {:?}", other),
        }
    }

    #[test]
    fn test_stylish_header_then_row() {
        let mut parser = EslintParser::new();
        let mut ctx = ParseContext::new();

        assert_eq!(
            feed(&mut parser, &mut ctx, "src/index.js"),
            Some(Extraction::Consumed)
        );
        assert_eq!(ctx.last_file(), Some("src/index.js"));

        let r = record(feed(
            &mut parser,
            &mut ctx,
            "  8:11  error  'x' is never reassigned  prefer-const",
        ));
        assert_eq!(r.file(), Some("src/index.js"));
        assert_eq!(r.line(), Some(8));
        assert_eq!(r.column(), Some(11));
        assert_eq!(r.rule_id(), Some("prefer-const"));
        assert_eq!(r.message(), "'x' is never reassigned");
        assert_eq!(r.category(), Category::Lint);
    }

    #[test]
    fn test_row_confidence_depends_on_known_file() {
        let parser = EslintParser::new();
        let mut ctx = ParseContext::new();
        let row = "  1:1  warning  Unexpected console statement  no-console";

        let without = parser.probe(row, &ctx).unwrap().confidence;
        ctx.set_last_file("a.js");
        let with = parser.probe(row, &ctx).unwrap().confidence;
        assert!(with > without);
    }

    #[test]
    fn test_row_without_rule() {
        let mut parser = EslintParser::new();
        let mut ctx = ParseContext::new();
        ctx.set_last_file("src/broken.ts");
        let r = record(feed(
            &mut parser,
            &mut ctx,
            "  3:7  error  Parsing error: Unexpected token )",
        ));
        assert_eq!(r.rule_id(), None);
        assert_eq!(r.category(), Category::Compile);
    }

    #[test]
    fn test_scoped_rule_and_security() {
        let mut parser = EslintParser::new();
        let mut ctx = ParseContext::new();
        ctx.set_last_file("src/a.ts");
        let r = record(feed(
            &mut parser,
            &mut ctx,
            "  12:3  warning  Unsafe call of an `any` typed value  @typescript-eslint/no-unsafe-call",
        ));
        assert_eq!(r.rule_id(), Some("@typescript-eslint/no-unsafe-call"));
        assert_eq!(r.severity(), Severity::Warning);

        let r = record(feed(
            &mut parser,
            &mut ctx,
            "  4:1  error  eval can be harmful  no-eval",
        ));
        assert_eq!(r.category(), Category::Security);
    }

    #[test]
    fn test_compact_format() {
        let mut parser = EslintParser::new();
        let mut ctx = ParseContext::new();
        let r = record(feed(
            &mut parser,
            &mut ctx,
            "/repo/src/a.js: line 3, col 5, Error - Missing JSDoc comment. (jsdoc/require-jsdoc)",
        ));
        assert_eq!(r.file(), Some("/repo/src/a.js"));
        assert_eq!(r.rule_id(), Some("jsdoc/require-jsdoc"));
        assert_eq!(r.category(), Category::Docs);
        assert_eq!(r.message(), "Missing JSDoc comment.");
    }

    #[test]
    fn test_unix_format() {
        let mut parser = EslintParser::new();
        let mut ctx = ParseContext::new();
        let r = record(feed(
            &mut parser,
            &mut ctx,
            "src/a.js:3:5: 'foo' is not defined. [Error/no-undef]",
        ));
        assert_eq!(r.file(), Some("src/a.js"));
        assert_eq!(r.rule_id(), Some("no-undef"));
        assert_eq!(r.severity(), Severity::Error);
    }

    #[test]
    fn test_noise_corpus() {
        let parser = EslintParser::new();
        let ctx = ParseContext::new();
        for line in [
            "✖ 3 problems (3 errors, 0 warnings)",
            "  2 errors and 0 warnings potentially fixable with the `--fix` option.",
            "> eslint . --ext .ts",
            "ESLint v8.57.0",
            "Linting 42 files",
        ] {
            assert!(
                parser.is_noise(line) || parser.probe(line, &ctx).is_none(),
                "{:?}",
                line
            );
        }
    }
}
