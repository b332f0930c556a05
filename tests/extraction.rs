//! End-to-end extraction tests.
//!
//! These feed literal lines and the CI log fixtures in `testdata/` through
//! the full pipeline and check the records that come out.

use std::path::PathBuf;

use logsieve::parser::ParserRegistry;
use logsieve::{extract, extract_with, Category, ErrorRecord, ParseContext, Severity, Source};

fn testdata_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("testdata")
}

fn extract_fixture(name: &str) -> Vec<ErrorRecord> {
    let text = std::fs::read_to_string(testdata_path().join(name)).expect("fixture should exist");
    extract(&text)
}

fn rule_ids(records: &[ErrorRecord]) -> Vec<Option<&str>> {
    records.iter().map(|r| r.rule_id()).collect()
}

// =============================================================================
// Single-scenario tests
// =============================================================================

#[test]
fn test_typescript_paren_diagnostic() {
    let records =
        extract("src/app.ts(10,5): error TS2322: Type 'string' is not assignable to type 'number'.");
    assert_eq!(records.len(), 1);
    let r = &records[0];
    assert_eq!(r.category(), Category::TypeCheck);
    assert_eq!(r.severity(), Severity::Error);
    assert_eq!(r.rule_id(), Some("TS2322"));
    assert_eq!(r.file(), Some("src/app.ts"));
    assert_eq!(r.line(), Some(10));
    assert_eq!(r.column(), Some(5));
}

#[test]
fn test_eslint_row_inherits_header_file() {
    let records = extract("src/index.js\n  8:11  error  'x' is never reassigned  prefer-const\n");
    assert_eq!(records.len(), 1);
    let r = &records[0];
    assert_eq!(r.file(), Some("src/index.js"));
    assert_eq!(r.line(), Some(8));
    assert_eq!(r.column(), Some(11));
    assert_eq!(r.rule_id(), Some("prefer-const"));
}

#[test]
fn test_go_panic_with_goroutine_dump() {
    let lines = [
        "panic: runtime error: index out of range",
        "goroutine 1 [running]:",
        "main.main()",
        "\t/app/main.go:12 +0x1d",
        "",
    ];
    let records = extract_with(lines, ParserRegistry::new(), ParseContext::new());
    assert_eq!(records.len(), 1);
    let r = &records[0];
    assert_eq!(r.category(), Category::Runtime);
    assert_eq!(r.file(), Some("/app/main.go"));
    assert_eq!(r.line(), Some(12));
    assert!(!r.column_known());

    let trace = r.stack_trace().expect("panic should carry a trace");
    assert_eq!(trace, lines[..4].join("\n"));
}

#[test]
fn test_npm_error_code() {
    let records = extract("npm ERR! code ENOSPC");
    assert_eq!(records.len(), 1);
    let r = &records[0];
    assert_eq!(r.category(), Category::Infrastructure);
    assert_eq!(r.rule_id(), Some("enospc"));
    assert!(!r.suggestions().is_empty());
    assert!(!r.suggestions()[0].is_empty());
}

#[test]
fn test_pure_noise_yields_nothing() {
    assert!(extract("All tests passed!").is_empty());
}

#[test]
fn test_bare_keyword_sentence_is_not_an_error() {
    assert!(extract("Retrying request after an error occurred upstream").is_empty());
}

#[test]
fn test_fallback_flags_unknown_pattern() {
    let records = extract("fatal: not a git repository (or any of the parent directories): .git");
    assert_eq!(records.len(), 1);
    assert!(records[0].unknown_pattern());
    assert_eq!(records[0].source(), Source::Generic);
    assert_eq!(records[0].category(), Category::Unknown);
}

#[test]
fn test_specific_parser_beats_fallback() {
    // the fallback also matches `file:line:col: message`
    let records = extract("internal/api/handler.go:33:12: Error return value is not checked (errcheck)");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].source(), Source::GolangciLint);
    assert!(!records[0].unknown_pattern());
}

#[test]
fn test_closed_block_precedes_boundary_line_record() {
    let log = "\
error[E0308]: mismatched types
  --> src/main.rs:10:18
src/app.ts(1,1): error TS2304: Cannot find name 'x'.
";
    let records = extract(log);
    assert_eq!(rule_ids(&records), vec![Some("E0308"), Some("TS2304")]);
}

#[test]
fn test_workflow_attribution() {
    let ctx = ParseContext::new()
        .with_job("build")
        .with_step("typecheck")
        .with_action("tsc");
    let records = extract_with(
        ["src/app.ts(1,1): error TS2304: Cannot find name 'x'."],
        ParserRegistry::new(),
        ctx,
    );
    let workflow = records[0].workflow().expect("workflow should be attached");
    assert_eq!(workflow.job.as_deref(), Some("build"));
    assert_eq!(workflow.step.as_deref(), Some("typecheck"));
    assert_eq!(workflow.action.as_deref(), Some("tsc"));
}

#[test]
fn test_verbose_go_test_failure_is_reported_once() {
    let log = "\
=== RUN   TestParse
    parse_test.go:21: expected 3 items, got 2
--- FAIL: TestParse (0.00s)
FAIL
";
    let records = extract(log);
    assert_eq!(records.len(), 1);
    let r = &records[0];
    assert_eq!(r.source(), Source::GoTest);
    assert_eq!(r.rule_id(), Some("TestParse"));
    assert_eq!(r.message(), "expected 3 items, got 2");
    assert_eq!(r.file(), Some("parse_test.go"));
    assert_eq!(r.line(), Some(21));
}

#[test]
fn test_go_mod_init_output_is_quiet() {
    let log = "go: creating new go.mod: module example.com/m\ngo: to add module requirements and sums:\n\tgo mod tidy\n";
    assert!(extract(log).is_empty());
}

#[test]
fn test_bare_tool_messages() {
    assert!(extract("warning: redirecting to https://github.com/org/repo.git/").is_empty());

    let records = extract("error: Recipe `build` failed on line 12 with exit code 1");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].category(), Category::Unknown);
    assert!(records[0].unknown_pattern());
}

#[test]
fn test_disabled_fallback() {
    let mut registry = ParserRegistry::new();
    assert!(registry.disable("generic"));
    let records = extract_with(["Segmentation fault (core dumped)"], registry, ParseContext::new());
    assert!(records.is_empty());
}

// =============================================================================
// Fixture logs
// =============================================================================

#[test]
fn test_node_job_fixture() {
    let records = extract_fixture("node_job.log");
    assert_eq!(
        rule_ids(&records),
        vec![
            Some("TS2322"),
            Some("TS2307"),
            Some("exit-2"),
            Some("prefer-const"),
            Some("no-console"),
            None,
            Some("enospc"),
            Some("exit-1"),
        ]
    );

    // ANSI colors and runner timestamps are gone before matching
    assert_eq!(records[0].file(), Some("src/app.ts"));
    assert_eq!(records[1].category(), Category::Dependency);
    assert!(!records[1].suggestions().is_empty());

    assert_eq!(records[3].file(), Some("/home/runner/work/app/app/src/index.js"));
    assert_eq!(records[3].message(), "'x' is never reassigned. Use 'const' instead");
    assert_eq!(records[4].severity(), Severity::Warning);
    assert_eq!(records[4].message(), "Unexpected console statement");

    assert_eq!(records[5].file(), Some("/home/runner/work/app/app/src/util.ts"));
    assert_eq!(records[5].category(), Category::Compile);

    assert!(records[6..]
        .iter()
        .all(|r| r.category() == Category::Infrastructure));
}

#[test]
fn test_rust_job_fixture() {
    let records = extract_fixture("rust_job.log");
    assert_eq!(
        rule_ids(&records),
        vec![
            Some("unused_variables"),
            Some("E0308"),
            Some("clippy::if_same_then_else"),
            Some("tests::parses_config"),
            None,
        ]
    );

    let unused = &records[0];
    assert_eq!(unused.severity(), Severity::Warning);
    assert_eq!(unused.category(), Category::Lint);
    assert_eq!(unused.file(), Some("src/lib.rs"));
    assert_eq!((unused.line(), unused.column()), (Some(4), Some(9)));

    let mismatch = &records[1];
    assert_eq!(mismatch.category(), Category::Compile);
    assert_eq!(mismatch.source(), Source::Rustc);
    assert_eq!(mismatch.file(), Some("src/main.rs"));
    assert!(mismatch
        .stack_trace()
        .unwrap()
        .contains("expected `u32`, found `&str`"));

    assert_eq!(records[2].source(), Source::Clippy);
    assert_eq!(records[2].severity(), Severity::Warning);

    assert_eq!(records[3].category(), Category::Test);

    let panic = &records[4];
    assert_eq!(panic.category(), Category::Test);
    assert_eq!(panic.message(), "assertion `left == right` failed");
    assert_eq!(panic.file(), Some("src/config.rs"));
    assert_eq!(panic.line(), Some(42));
}

#[test]
fn test_go_job_fixture() {
    let records = extract_fixture("go_job.log");
    let categories: Vec<Category> = records.iter().map(|r| r.category()).collect();
    assert_eq!(
        categories,
        vec![
            Category::Dependency,
            Category::Compile,
            Category::Compile,
            Category::Lint,
            Category::Lint,
            Category::Security,
            Category::Test,
            Category::Test,
            Category::Runtime,
        ]
    );

    assert_eq!(records[1].message(), "undefined: sqlx");
    assert_eq!(records[3].rule_id(), Some("errcheck"));
    assert_eq!(records[4].rule_id(), Some("SA1019"));
    assert_eq!(records[5].rule_id(), Some("G104"));

    let test = &records[6];
    assert_eq!(test.rule_id(), Some("TestParse"));
    assert_eq!(test.message(), "expected 3 items, got 2");
    assert_eq!(test.file(), Some("parse_test.go"));

    // `go test -v` prints the log before the verdict
    let verbose = &records[7];
    assert_eq!(verbose.rule_id(), Some("TestEncode"));
    assert_eq!(verbose.message(), "got \"a\", want \"b\"");
    assert_eq!(verbose.file(), Some("encode_test.go"));
    assert_eq!(verbose.line(), Some(33));

    let panic = &records[8];
    assert_eq!(
        panic.file(),
        Some("/home/runner/work/app/app/internal/queue/queue.go")
    );
    assert_eq!(panic.line(), Some(44));
    assert!(panic.stack_trace().unwrap().contains("goroutine 7 [running]:"));
}

#[test]
fn test_python_job_fixture() {
    let records = extract_fixture("python_job.log");
    let sources: Vec<Source> = records.iter().map(|r| r.source()).collect();
    assert_eq!(
        sources,
        vec![
            Source::Pytest,
            Source::Pytest,
            Source::Python,
            Source::Mypy,
            Source::Ruff,
            Source::Ruff,
        ]
    );

    assert_eq!(records[1].rule_id(), Some("tests/test_api.py::test_create_user"));
    assert_eq!(records[1].message(), "AssertionError: assert 1 == 2");

    let traceback = &records[2];
    assert_eq!(traceback.category(), Category::Dependency);
    assert_eq!(traceback.file(), Some("/home/runner/work/svc/svc/svc/cli.py"));
    assert_eq!(traceback.line(), Some(8));
    assert_eq!(traceback.stack_trace().unwrap().lines().count(), 6);

    assert_eq!(records[3].rule_id(), Some("return-value"));
    assert_eq!(records[3].category(), Category::TypeCheck);

    assert_eq!(records[4].severity(), Severity::Warning);
    assert_eq!(records[5].category(), Category::Security);
}

#[test]
fn test_clean_job_fixture() {
    let records = extract_fixture("clean_job.log");
    assert!(records.is_empty(), "unexpected records: {:#?}", records);
}

#[test]
fn test_records_follow_input_order() {
    let mut text = String::new();
    for name in ["rust_job.log", "go_job.log", "python_job.log"] {
        text.push_str(&std::fs::read_to_string(testdata_path().join(name)).unwrap());
    }
    let combined = extract(&text);
    let separate: Vec<ErrorRecord> = ["rust_job.log", "go_job.log", "python_job.log"]
        .iter()
        .flat_map(|name| extract_fixture(name))
        .collect();
    assert_eq!(combined, separate);
}
