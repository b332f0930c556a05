//! Output formatting for scan results.
//!
//! Supports three output formats:
//! - Pretty: colored terminal output for human readability
//! - JSON: structured output for programmatic consumption
//! - SARIF: Static Analysis Results Interchange Format for code scanning

use colored::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use crate::config::FailOn;
use crate::record::{Category, ErrorRecord, Severity};

/// Records extracted from one log.
#[derive(Debug, Clone, Serialize)]
pub struct LogReport {
    /// File path, or `-` for standard input.
    pub name: String,
    pub records: Vec<ErrorRecord>,
}

/// Output format selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Pretty,
    Json,
    Sarif,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pretty" => Ok(OutputFormat::Pretty),
            "json" => Ok(OutputFormat::Json),
            "sarif" => Ok(OutputFormat::Sarif),
            _ => Err(format!(
                "invalid format {:?}, must be 'pretty', 'json', or 'sarif'",
                s
            )),
        }
    }
}

// =============================================================================
// Summary
// =============================================================================

/// Record counts across every scanned log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub logs: usize,
    pub errors: usize,
    pub warnings: usize,
    /// Records only the fallback recognized.
    pub unknown_patterns: usize,
    pub truncated: usize,
    pub by_category: BTreeMap<Category, usize>,
}

impl Summary {
    pub fn from_reports(reports: &[LogReport]) -> Self {
        let mut summary = Summary {
            logs: reports.len(),
            ..Summary::default()
        };
        for record in reports.iter().flat_map(|r| r.records.iter()) {
            match record.severity() {
                Severity::Error => summary.errors += 1,
                Severity::Warning => summary.warnings += 1,
            }
            if record.unknown_pattern() {
                summary.unknown_patterns += 1;
            }
            if record.message_truncated() || record.stack_trace_truncated() {
                summary.truncated += 1;
            }
            *summary.by_category.entry(record.category()).or_insert(0) += 1;
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.errors + self.warnings
    }

    /// Whether the counts fail a scan at the given threshold.
    pub fn failed(&self, fail_on: FailOn) -> bool {
        (self.errors > 0 && fail_on.trips(Severity::Error))
            || (self.warnings > 0 && fail_on.trips(Severity::Warning))
    }
}

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{} {}", n, word)
    } else {
        format!("{} {}s", n, word)
    }
}

// =============================================================================
// JSON Format
// =============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonReport<'a> {
    version: &'static str,
    fail_on: &'static str,
    passed: bool,
    summary: &'a Summary,
    logs: &'a [LogReport],
}

/// Write results in JSON format.
pub fn write_json<W: Write>(out: &mut W, reports: &[LogReport], fail_on: FailOn) -> anyhow::Result<()> {
    let summary = Summary::from_reports(reports);
    let report = JsonReport {
        version: env!("CARGO_PKG_VERSION"),
        fail_on: fail_on.as_str(),
        passed: !summary.failed(fail_on),
        summary: &summary,
        logs: reports,
    };
    serde_json::to_writer_pretty(&mut *out, &report)?;
    writeln!(out)?;
    Ok(())
}

// =============================================================================
// SARIF Format
// =============================================================================

const SARIF_VERSION: &str = "2.1.0";
const SARIF_SCHEMA: &str = "https://raw.githubusercontent.com/oasis-tcs/sarif-spec/master/Schemata/sarif-schema-2.1.0.json";
const TOOL_NAME: &str = "logsieve";
const INFO_URI: &str = "https://github.com/zen-systems/logsieve";

#[derive(Serialize)]
struct SarifReport {
    version: String,
    #[serde(rename = "$schema")]
    schema: String,
    runs: Vec<SarifRun>,
}

#[derive(Serialize)]
struct SarifRun {
    tool: SarifTool,
    results: Vec<SarifResult>,
}

#[derive(Serialize)]
struct SarifTool {
    driver: SarifDriver,
}

#[derive(Serialize)]
struct SarifDriver {
    name: String,
    version: String,
    #[serde(rename = "informationUri")]
    information_uri: String,
    rules: Vec<SarifRule>,
}

#[derive(Serialize)]
struct SarifRule {
    id: String,
    #[serde(rename = "shortDescription")]
    short_description: SarifMessage,
    #[serde(rename = "defaultConfiguration")]
    default_config: SarifRuleConfig,
}

#[derive(Serialize)]
struct SarifRuleConfig {
    level: String,
}

#[derive(Serialize)]
struct SarifResult {
    #[serde(rename = "ruleId")]
    rule_id: String,
    level: String,
    message: SarifMessage,
    locations: Vec<SarifLocation>,
    properties: SarifProperties,
}

#[derive(Serialize)]
struct SarifProperties {
    category: Category,
    source: String,
    log: String,
}

#[derive(Serialize)]
struct SarifMessage {
    text: String,
}

#[derive(Serialize)]
struct SarifLocation {
    #[serde(rename = "physicalLocation")]
    physical_location: SarifPhysicalLocation,
}

#[derive(Serialize)]
struct SarifPhysicalLocation {
    #[serde(rename = "artifactLocation")]
    artifact_location: SarifArtifact,
    #[serde(skip_serializing_if = "Option::is_none")]
    region: Option<SarifRegion>,
}

#[derive(Serialize)]
struct SarifArtifact {
    uri: String,
}

#[derive(Serialize)]
struct SarifRegion {
    #[serde(rename = "startLine")]
    start_line: u32,
    #[serde(rename = "startColumn", skip_serializing_if = "Option::is_none")]
    start_column: Option<u32>,
}

/// Rule id used in SARIF: the tool's own code, or source/category when the
/// tool gave none.
fn sarif_rule_id(record: &ErrorRecord) -> String {
    match record.rule_id() {
        Some(rule) => rule.to_string(),
        None => format!("{}/{}", record.source(), record.category()),
    }
}

fn map_severity_to_level(severity: Severity) -> &'static str {
    match severity {
        Severity::Error => "error",
        Severity::Warning => "warning",
    }
}

/// Path as it should appear in a SARIF artifact URI: relative to `base`
/// when it lies under it, forward slashes throughout.
fn make_relative_uri(file: &str, base: Option<&Path>) -> String {
    let relative = base
        .and_then(|base| Path::new(file).strip_prefix(base).ok())
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|| file.to_string());
    relative.replace('\\', "/")
}

fn sarif_location(record: &ErrorRecord, base: Option<&Path>) -> Option<SarifLocation> {
    let file = record.file()?;
    let region = record.line().filter(|&l| l > 0).map(|start_line| SarifRegion {
        start_line,
        start_column: record.column().filter(|&c| c > 0),
    });
    Some(SarifLocation {
        physical_location: SarifPhysicalLocation {
            artifact_location: SarifArtifact {
                uri: make_relative_uri(file, base),
            },
            region,
        },
    })
}

/// Write results in SARIF format.
pub fn write_sarif<W: Write>(out: &mut W, reports: &[LogReport], base: Option<&Path>) -> anyhow::Result<()> {
    let mut rule_levels: BTreeMap<String, Severity> = BTreeMap::new();
    let mut results = Vec::new();

    for report in reports {
        for record in &report.records {
            let rule_id = sarif_rule_id(record);
            let level = rule_levels.entry(rule_id.clone()).or_insert(record.severity());
            *level = (*level).max(record.severity());

            results.push(SarifResult {
                rule_id,
                level: map_severity_to_level(record.severity()).to_string(),
                message: SarifMessage {
                    text: record.message().to_string(),
                },
                locations: sarif_location(record, base).into_iter().collect(),
                properties: SarifProperties {
                    category: record.category(),
                    source: record.source().to_string(),
                    log: report.name.clone(),
                },
            });
        }
    }

    tracing::debug!(rules = rule_levels.len(), results = results.len(), "writing sarif");

    let rules = rule_levels
        .into_iter()
        .map(|(id, level)| SarifRule {
            short_description: SarifMessage { text: id.clone() },
            id,
            default_config: SarifRuleConfig {
                level: map_severity_to_level(level).to_string(),
            },
        })
        .collect();

    let report = SarifReport {
        version: SARIF_VERSION.to_string(),
        schema: SARIF_SCHEMA.to_string(),
        runs: vec![SarifRun {
            tool: SarifTool {
                driver: SarifDriver {
                    name: TOOL_NAME.to_string(),
                    version: env!("CARGO_PKG_VERSION").to_string(),
                    information_uri: INFO_URI.to_string(),
                    rules,
                },
            },
            results,
        }],
    };

    serde_json::to_writer_pretty(&mut *out, &report)?;
    writeln!(out)?;
    Ok(())
}

// =============================================================================
// Pretty Format
// =============================================================================

/// Write results in pretty (human-readable) format.
pub fn write_pretty<W: Write>(out: &mut W, reports: &[LogReport], fail_on: FailOn) -> anyhow::Result<()> {
    let summary = Summary::from_reports(reports);

    writeln!(out)?;
    writeln!(out, "  {} v{}", "logsieve".cyan().bold(), env!("CARGO_PKG_VERSION"))?;
    writeln!(out)?;

    for report in reports {
        write_log(out, report)?;
    }

    if !summary.by_category.is_empty() {
        writeln!(out, "  {}", "Categories:".bold())?;
        for (category, count) in &summary.by_category {
            writeln!(out, "    {:<16} {:>4}", category.as_str(), count)?;
        }
        writeln!(out)?;
    }

    write_final_status(out, &summary, fail_on)?;
    writeln!(out)?;
    Ok(())
}

fn write_log<W: Write>(out: &mut W, report: &LogReport) -> anyhow::Result<()> {
    let errors = report
        .records
        .iter()
        .filter(|r| r.severity() == Severity::Error)
        .count();
    let warnings = report.records.len() - errors;

    write!(out, "  {}", report.name.bold())?;
    if report.records.is_empty() {
        writeln!(out, "  {}", "no errors found".green())?;
        writeln!(out)?;
        return Ok(());
    }
    writeln!(
        out,
        "  {}",
        format!("({}, {})", plural(errors, "error"), plural(warnings, "warning")).dimmed()
    )?;
    writeln!(out)?;

    for record in &report.records {
        write_record(out, record)?;
    }
    Ok(())
}

fn write_record<W: Write>(out: &mut W, record: &ErrorRecord) -> anyhow::Result<()> {
    match record.severity() {
        Severity::Error => write!(out, "    {} ", "ERROR".red())?,
        Severity::Warning => write!(out, "    {} ", "WARN ".yellow())?,
    }
    write!(out, "  {:<15}", record.category().as_str().dimmed())?;
    if let Some(rule) = record.rule_id() {
        write!(out, "{} ", rule.dimmed())?;
    }
    if let Some(file) = record.file() {
        write!(out, "{}", file.blue())?;
        if let Some(line) = record.line() {
            write!(out, "{}", format!(":{}", line).dimmed())?;
            if let Some(column) = record.column() {
                write!(out, "{}", format!(":{}", column).dimmed())?;
            }
        }
    }
    writeln!(out)?;

    writeln!(out, "            {}", record.message())?;
    for suggestion in record.suggestions() {
        writeln!(out, "            {} {}", "help:".cyan(), suggestion)?;
    }
    if let Some(workflow) = record.workflow() {
        let parts: Vec<&str> = [&workflow.job, &workflow.step, &workflow.action]
            .into_iter()
            .filter_map(|p| p.as_deref())
            .collect();
        writeln!(out, "            {}", format!("in {}", parts.join(" / ")).dimmed())?;
    }
    writeln!(out)?;
    Ok(())
}

fn write_final_status<W: Write>(out: &mut W, summary: &Summary, fail_on: FailOn) -> anyhow::Result<()> {
    if summary.failed(fail_on) {
        write!(out, "  {}", "✗ FAIL".red())?;
    } else {
        write!(out, "  {}", "✓ PASS".green())?;
    }
    write!(
        out,
        "  {}, {} in {}",
        plural(summary.errors, "error"),
        plural(summary.warnings, "warning"),
        plural(summary.logs, "log")
    )?;
    if summary.unknown_patterns > 0 {
        write!(
            out,
            "  {}",
            format!("({} unrecognized)", summary.unknown_patterns).dimmed()
        )?;
    }
    writeln!(out, "  {}", format!("fail-on: {}", fail_on.as_str()).dimmed())?;
    Ok(())
}
