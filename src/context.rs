//! Per-line ambient state supplied by the caller.

use crate::record::WorkflowContext;

/// Context carried alongside each line.
///
/// Job, step and action names are set by the caller and only read by the
/// engine. The last-known file slot is the one piece parsers may write: a
/// file header line (e.g. ESLint's stylish format) records its path here so
/// that the indented rows below it inherit the file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseContext {
    pub job: Option<String>,
    pub step: Option<String>,
    pub action: Option<String>,
    last_file: Option<String>,
}

impl ParseContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_job(mut self, job: impl Into<String>) -> Self {
        self.job = Some(job.into());
        self
    }

    pub fn with_step(mut self, step: impl Into<String>) -> Self {
        self.step = Some(step.into());
        self
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    /// File most recently announced by a header line, if any.
    pub fn last_file(&self) -> Option<&str> {
        self.last_file.as_deref()
    }

    pub fn set_last_file(&mut self, file: impl Into<String>) {
        self.last_file = Some(file.into());
    }

    pub fn clear_last_file(&mut self) {
        self.last_file = None;
    }

    /// Switch to a new workflow step. The remembered file belongs to the
    /// previous step's output and is dropped.
    pub fn enter_step(&mut self, step: impl Into<String>) {
        self.step = Some(step.into());
        self.last_file = None;
    }

    pub fn workflow(&self) -> WorkflowContext {
        WorkflowContext {
            job: self.job.clone(),
            step: self.step.clone(),
            action: self.action.clone(),
        }
    }
}
