//! Error record model.
//!
//! An [`ErrorRecord`] is the only thing the engine hands to its caller. It is
//! produced once, through [`ErrorRecordBuilder`], and has no setters: the
//! consumer owns it outright and nothing inside the engine keeps a reference.

use serde::{Deserialize, Serialize};

use crate::context::ParseContext;

/// Severity levels for extracted diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
        }
    }

    /// Map a tool's severity word. Anything unrecognized is an error so that
    /// unknown issues are never silently downgraded.
    pub fn from_word(word: &str) -> Self {
        match word.to_ascii_lowercase().as_str() {
            "warning" | "warn" | "w" => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "error" => Ok(Severity::Error),
            "warning" => Ok(Severity::Warning),
            _ => Err(format!("unknown severity: {}", s)),
        }
    }
}

/// What kind of problem a record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "lint")]
    Lint,
    #[serde(rename = "type-check")]
    TypeCheck,
    #[serde(rename = "compile")]
    Compile,
    #[serde(rename = "test")]
    Test,
    #[serde(rename = "runtime")]
    Runtime,
    #[serde(rename = "infrastructure")]
    Infrastructure,
    #[serde(rename = "config")]
    Config,
    #[serde(rename = "metadata")]
    Metadata,
    #[serde(rename = "security")]
    Security,
    #[serde(rename = "dependency")]
    Dependency,
    #[serde(rename = "docs")]
    Docs,
    #[serde(rename = "unknown")]
    Unknown,
}

impl Category {
    pub const ALL: [Category; 12] = [
        Category::Lint,
        Category::TypeCheck,
        Category::Compile,
        Category::Test,
        Category::Runtime,
        Category::Infrastructure,
        Category::Config,
        Category::Metadata,
        Category::Security,
        Category::Dependency,
        Category::Docs,
        Category::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Lint => "lint",
            Category::TypeCheck => "type-check",
            Category::Compile => "compile",
            Category::Test => "test",
            Category::Runtime => "runtime",
            Category::Infrastructure => "infrastructure",
            Category::Config => "config",
            Category::Metadata => "metadata",
            Category::Security => "security",
            Category::Dependency => "dependency",
            Category::Docs => "docs",
            Category::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Category::ALL.iter().copied().find(|c| c.as_str() == s)
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The tool that produced a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Source {
    Eslint,
    Typescript,
    Rustc,
    Clippy,
    Cargo,
    Go,
    GoTest,
    GolangciLint,
    Python,
    Pytest,
    Mypy,
    Ruff,
    Pylint,
    Infrastructure,
    Generic,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Eslint => "eslint",
            Source::Typescript => "typescript",
            Source::Rustc => "rustc",
            Source::Clippy => "clippy",
            Source::Cargo => "cargo",
            Source::Go => "go",
            Source::GoTest => "go-test",
            Source::GolangciLint => "golangci-lint",
            Source::Python => "python",
            Source::Pytest => "pytest",
            Source::Mypy => "mypy",
            Source::Ruff => "ruff",
            Source::Pylint => "pylint",
            Source::Infrastructure => "infrastructure",
            Source::Generic => "generic",
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Workflow attribution copied from the [`ParseContext`] at creation time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

impl WorkflowContext {
    pub fn is_empty(&self) -> bool {
        self.job.is_none() && self.step.is_none() && self.action.is_none()
    }
}

/// A single extracted diagnostic. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    message: String,
    file: Option<String>,
    line: Option<u32>,
    column: Option<u32>,
    severity: Severity,
    category: Category,
    source: Source,
    rule_id: Option<String>,
    stack_trace: Option<String>,
    suggestions: Vec<String>,
    workflow: Option<WorkflowContext>,
    line_known: bool,
    column_known: bool,
    message_truncated: bool,
    stack_trace_truncated: bool,
    unknown_pattern: bool,
}

impl ErrorRecord {
    /// Start building a record.
    pub fn builder(
        message: impl Into<String>,
        severity: Severity,
        category: Category,
        source: Source,
    ) -> ErrorRecordBuilder {
        ErrorRecordBuilder::new(message, severity, category, source)
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn file(&self) -> Option<&str> {
        self.file.as_deref()
    }

    pub fn line(&self) -> Option<u32> {
        self.line
    }

    pub fn column(&self) -> Option<u32> {
        self.column
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn source(&self) -> Source {
        self.source
    }

    pub fn rule_id(&self) -> Option<&str> {
        self.rule_id.as_deref()
    }

    pub fn stack_trace(&self) -> Option<&str> {
        self.stack_trace.as_deref()
    }

    pub fn suggestions(&self) -> &[String] {
        &self.suggestions
    }

    pub fn workflow(&self) -> Option<&WorkflowContext> {
        self.workflow.as_ref()
    }

    /// True when the line number came from the log. A line of `0` with this
    /// flag set is a real (if odd) location, not a placeholder.
    pub fn line_known(&self) -> bool {
        self.line_known
    }

    pub fn column_known(&self) -> bool {
        self.column_known
    }

    pub fn message_truncated(&self) -> bool {
        self.message_truncated
    }

    pub fn stack_trace_truncated(&self) -> bool {
        self.stack_trace_truncated
    }

    /// Set only by the fallback parser.
    pub fn unknown_pattern(&self) -> bool {
        self.unknown_pattern
    }

    /// Stable key for grouping identical findings (ignores workflow attribution).
    pub fn key(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            self.source,
            self.file.as_deref().unwrap_or(""),
            self.rule_id.as_deref().unwrap_or(""),
            self.message
        )
    }
}

/// Upper bound on a record's message, in bytes.
pub const MAX_MESSAGE_BYTES: usize = 2048;

/// Upper bound on the number of suggestions carried by one record.
pub const MAX_SUGGESTIONS: usize = 8;

/// Mutable form of [`ErrorRecord`]; parsers fill this in and then freeze it.
#[derive(Debug, Clone)]
pub struct ErrorRecordBuilder {
    pub message: String,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub column: Option<u32>,
    pub severity: Severity,
    pub category: Category,
    pub source: Source,
    pub rule_id: Option<String>,
    pub stack_trace: Option<String>,
    pub suggestions: Vec<String>,
    pub stack_trace_truncated: bool,
    pub unknown_pattern: bool,
}

impl ErrorRecordBuilder {
    pub fn new(
        message: impl Into<String>,
        severity: Severity,
        category: Category,
        source: Source,
    ) -> Self {
        Self {
            message: message.into(),
            file: None,
            line: None,
            column: None,
            severity,
            category,
            source,
            rule_id: None,
            stack_trace: None,
            suggestions: Vec::new(),
            stack_trace_truncated: false,
            unknown_pattern: false,
        }
    }

    pub fn file(mut self, file: Option<impl Into<String>>) -> Self {
        self.file = file.map(Into::into);
        self
    }

    pub fn location(mut self, line: Option<u32>, column: Option<u32>) -> Self {
        self.line = line;
        self.column = column;
        self
    }

    pub fn rule_id(mut self, rule: Option<impl Into<String>>) -> Self {
        self.rule_id = rule.map(Into::into);
        self
    }

    pub fn stack_trace(mut self, trace: Option<String>, truncated: bool) -> Self {
        self.stack_trace = trace;
        self.stack_trace_truncated = truncated;
        self
    }

    pub fn suggestion(mut self, text: impl Into<String>) -> Self {
        if self.suggestions.len() < MAX_SUGGESTIONS {
            self.suggestions.push(text.into());
        }
        self
    }

    pub fn suggestions<I, S>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for item in items {
            self = self.suggestion(item);
        }
        self
    }

    pub fn unknown_pattern(mut self) -> Self {
        self.unknown_pattern = true;
        self
    }

    /// Freeze into an [`ErrorRecord`], attaching workflow attribution from `ctx`.
    pub fn build(self, ctx: &ParseContext) -> ErrorRecord {
        let (message, message_truncated) = clamp_message(self.message.trim());
        let workflow = ctx.workflow();
        let file = self.file.filter(|f| !f.is_empty());

        ErrorRecord {
            message,
            file,
            line_known: self.line.is_some(),
            column_known: self.column.is_some(),
            line: self.line,
            column: self.column,
            severity: self.severity,
            category: self.category,
            source: self.source,
            rule_id: self.rule_id.filter(|r| !r.is_empty()),
            stack_trace: self.stack_trace.filter(|s| !s.is_empty()),
            suggestions: self.suggestions,
            workflow: (!workflow.is_empty()).then_some(workflow),
            message_truncated,
            stack_trace_truncated: self.stack_trace_truncated,
            unknown_pattern: self.unknown_pattern,
        }
    }
}

/// Cut a message to [`MAX_MESSAGE_BYTES`] on a char boundary.
fn clamp_message(message: &str) -> (String, bool) {
    if message.len() <= MAX_MESSAGE_BYTES {
        return (message.to_string(), false);
    }
    let mut end = MAX_MESSAGE_BYTES;
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    (message[..end].to_string(), true)
}

/// Parse a decimal location component. Overlong digit runs yield `None`.
pub(crate) fn parse_number(text: Option<&str>) -> Option<u32> {
    text.and_then(|t| t.parse::<u32>().ok())
}
